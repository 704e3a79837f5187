//! Derived notification statistics.

use std::collections::BTreeMap;

use serde::Serialize;

use super::models::{Notification, NotificationCategory};

/// Counts derived from the current notification list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationStats {
    pub total: usize,
    pub unread: usize,
    /// Always holds an entry for every category.
    pub by_category: BTreeMap<NotificationCategory, usize>,
}

impl Default for NotificationStats {
    fn default() -> Self {
        Self {
            total: 0,
            unread: 0,
            by_category: NotificationCategory::ALL.iter().map(|c| (*c, 0)).collect(),
        }
    }
}

impl NotificationStats {
    pub fn count(&self, category: NotificationCategory) -> usize {
        self.by_category.get(&category).copied().unwrap_or(0)
    }
}

/// Compute stats for a notification list.
pub fn compute_stats(notifications: &[Notification]) -> NotificationStats {
    let mut stats = NotificationStats::default();
    for notification in notifications {
        stats.total += 1;
        if !notification.is_read {
            stats.unread += 1;
        }
        *stats.by_category.entry(notification.category).or_insert(0) += 1;
    }
    stats
}
