//! Notification fixtures seeded into every test server.

use super::constants::*;
use notification_sync::{Notification, NotificationCategory};

/// Three notifications, newest first: two unread info, one read error.
pub fn seed_notifications() -> Vec<Notification> {
    let mut read = Notification::new(
        NOTIFICATION_2_ID,
        NotificationCategory::Error,
        "Download failed",
        "The album could not be downloaded",
        1_700_000_200,
    );
    read.is_read = true;
    read.read_at = Some(1_700_000_250);

    vec![
        Notification::new(
            NOTIFICATION_1_ID,
            NotificationCategory::Info,
            "New release",
            "A new album is available",
            1_700_000_300,
        ),
        read,
        Notification::new(
            NOTIFICATION_3_ID,
            NotificationCategory::Info,
            "Welcome",
            "Thanks for signing up",
            1_700_000_100,
        ),
    ]
}

/// A notification as the server would push it.
pub fn pushed_notification(id: &str, category: NotificationCategory) -> Notification {
    Notification::new(id, category, "Pushed", "Delivered over the channel", 1_700_000_400)
}

/// The second account's list: a single unread warning.
pub fn other_account_notifications() -> Vec<Notification> {
    vec![Notification::new(
        OTHER_NOTIFICATION_ID,
        NotificationCategory::Warning,
        "Storage almost full",
        "Only 5% of your library quota is left",
        1_700_000_150,
    )]
}
