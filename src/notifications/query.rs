//! Read-only projections over a notification list.
//!
//! Every function returns a fresh `Vec`; none of them hold on to the input.

use super::models::{Notification, NotificationCategory};

pub fn filter<P>(notifications: &[Notification], predicate: P) -> Vec<Notification>
where
    P: Fn(&Notification) -> bool,
{
    notifications
        .iter()
        .filter(|n| predicate(n))
        .cloned()
        .collect()
}

/// Case-insensitive substring match over title and message. A blank query matches all.
pub fn search(notifications: &[Notification], text: &str) -> Vec<Notification> {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return notifications.to_vec();
    }
    filter(notifications, |n| {
        n.title.to_lowercase().contains(&needle) || n.message.to_lowercase().contains(&needle)
    })
}

/// Notifications created within `[start, end]` (Unix seconds, inclusive).
pub fn by_date_range(notifications: &[Notification], start: i64, end: i64) -> Vec<Notification> {
    if start > end {
        return Vec::new();
    }
    filter(notifications, |n| n.created_at >= start && n.created_at <= end)
}

pub fn by_category(
    notifications: &[Notification],
    category: NotificationCategory,
) -> Vec<Notification> {
    filter(notifications, |n| n.category == category)
}

pub fn unread(notifications: &[Notification]) -> Vec<Notification> {
    filter(notifications, |n| !n.is_read)
}
