//! Notification data models

use serde::{Deserialize, Serialize};

/// Notification category enum
///
/// Only used for stats bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationCategory {
    pub const ALL: [NotificationCategory; 4] = [
        NotificationCategory::Info,
        NotificationCategory::Success,
        NotificationCategory::Warning,
        NotificationCategory::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Info => "info",
            NotificationCategory::Success => "success",
            NotificationCategory::Warning => "warning",
            NotificationCategory::Error => "error",
        }
    }
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(alias = "type")]
    pub category: NotificationCategory,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub read_at: Option<i64>,
    pub created_at: i64,
}

impl Notification {
    /// Create an unread notification.
    pub fn new(
        id: impl Into<String>,
        category: NotificationCategory,
        title: impl Into<String>,
        message: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            message: message.into(),
            category,
            is_read: false,
            read_at: None,
            created_at,
        }
    }

    /// Mark as read at `now`. Already-read entries keep their original `read_at`.
    ///
    /// Returns true if the entry changed.
    pub(crate) fn mark_read_at(&mut self, now: i64) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.read_at = Some(now);
        true
    }

    /// Restore the `is_read <=> read_at` invariant on data coming from outside.
    pub(crate) fn normalized(mut self, now: i64) -> Self {
        match (self.is_read, self.read_at) {
            (true, None) => self.read_at = Some(now),
            (false, Some(_)) => self.read_at = None,
            _ => {}
        }
        self
    }
}

/// One page of notifications as returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    #[serde(default, alias = "total")]
    pub total_count: Option<u64>,
}

impl NotificationPage {
    pub fn new(notifications: Vec<Notification>) -> Self {
        let total_count = Some(notifications.len() as u64);
        Self {
            notifications,
            total_count,
        }
    }

    /// Server-reported total, falling back to the page length.
    pub fn total(&self) -> u64 {
        self.total_count
            .unwrap_or(self.notifications.len() as u64)
    }
}
