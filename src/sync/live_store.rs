//! Session-scoped wrapper around the notification store.
//!
//! Every mutation recomputes stats and publishes them. Once the session is
//! killed, mutations are discarded so late completions cannot touch it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::debug;

use crate::notifications::{compute_stats, NotificationStats, NotificationStore};

pub(crate) struct LiveStore {
    store: Mutex<NotificationStore>,
    stats: Arc<watch::Sender<NotificationStats>>,
    alive: AtomicBool,
}

impl LiveStore {
    pub(crate) fn new(stats: Arc<watch::Sender<NotificationStats>>) -> Self {
        stats.send_replace(NotificationStats::default());
        Self {
            store: Mutex::new(NotificationStore::new()),
            stats,
            alive: AtomicBool::new(true),
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub(crate) fn kill(&self) {
        let _store = self.store.lock().unwrap();
        self.alive.store(false, Ordering::SeqCst);
    }

    /// Apply `f` and publish fresh stats. Returns `None` for a dead session.
    pub(crate) fn mutate<R>(&self, f: impl FnOnce(&mut NotificationStore) -> R) -> Option<R> {
        let mut store = self.store.lock().unwrap();
        // Checked under the lock so a concurrent kill() cannot interleave.
        if !self.is_alive() {
            debug!("Discarding mutation on a stopped session");
            return None;
        }
        let result = f(&mut store);
        self.stats.send_replace(compute_stats(store.as_slice()));
        Some(result)
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&NotificationStore) -> R) -> R {
        let store = self.store.lock().unwrap();
        f(&store)
    }
}
