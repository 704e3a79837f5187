//! In-memory notification store for a single session.
//!
//! Entries are kept newest-first. Every mutation is applied in full or not at all,
//! and leaves `is_read == read_at.is_some()` for every entry.

use std::collections::HashSet;

use super::models::Notification;

/// A full copy of the store contents, used to undo an optimistic write.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoreSnapshot(Vec<Notification>);

#[derive(Debug, Clone, Default)]
pub struct NotificationStore {
    entries: Vec<Notification>,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole collection, keeping the given order.
    ///
    /// If the same id appears more than once only the first occurrence is kept.
    pub fn replace_all(&mut self, list: Vec<Notification>) {
        self.replace_all_at(list, now());
    }

    pub fn replace_all_at(&mut self, list: Vec<Notification>, now: i64) {
        let mut seen = HashSet::with_capacity(list.len());
        self.entries = list
            .into_iter()
            .filter(|n| seen.insert(n.id.clone()))
            .map(|n| n.normalized(now))
            .collect();
    }

    /// Insert a push-delivered notification at the head.
    ///
    /// A notification whose id is already present replaces the existing entry in place.
    pub fn prepend(&mut self, notification: Notification) {
        self.prepend_at(notification, now());
    }

    pub fn prepend_at(&mut self, notification: Notification, now: i64) {
        let notification = notification.normalized(now);
        match self.position(&notification.id) {
            Some(index) => self.entries[index] = notification,
            None => self.entries.insert(0, notification),
        }
    }

    /// Mark a single notification as read. Unknown ids are ignored.
    ///
    /// Returns true if an entry changed.
    pub fn mark_read(&mut self, id: &str) -> bool {
        self.mark_read_at(id, now())
    }

    pub fn mark_read_at(&mut self, id: &str, now: i64) -> bool {
        match self.position(id) {
            Some(index) => self.entries[index].mark_read_at(now),
            None => false,
        }
    }

    /// Mark every unread notification as read. Returns how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        self.mark_all_read_at(now())
    }

    pub fn mark_all_read_at(&mut self, now: i64) -> usize {
        self.entries
            .iter_mut()
            .map(|n| n.mark_read_at(now))
            .filter(|changed| *changed)
            .count()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot(self.entries.clone())
    }

    pub fn rollback_to(&mut self, snapshot: StoreSnapshot) {
        self.entries = snapshot.0;
    }

    /// Newest notification, if any.
    pub fn latest(&self) -> Option<&Notification> {
        self.entries.first()
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.entries.iter().find(|n| n.id == id)
    }

    pub fn as_slice(&self) -> &[Notification] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|n| !n.is_read).count()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|n| n.id == id)
    }
}
