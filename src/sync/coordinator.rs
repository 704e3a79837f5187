//! Sync coordinator.
//!
//! Ties one authenticated session to the push channel, the REST API and the
//! in-memory store. Push events and REST results both land in the same store;
//! writes are applied optimistically and reconciled when the server disagrees.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::live_store::LiveStore;
use crate::api::NotificationApi;
use crate::channel::messages::msg_types::{
    CONNECTION_STATE_CHANGED, NOTIFICATIONS_SNAPSHOT, NOTIFICATION_CREATED, NOTIFICATION_READ,
};
use crate::channel::messages::payloads::{NotificationRef, SnapshotPayload};
use crate::channel::{
    handler, ChannelHandle, ClientMessage, ConnectionManager, ConnectionState, EventDispatcher,
    PushTransport, ReconnectPolicy, Subscription,
};
use crate::config::{ReconcileStrategy, SyncSettings};
use crate::error::{ApiError, SyncError, SyncResult};
use crate::notifications::{
    query, Notification, NotificationCategory, NotificationStats, StoreSnapshot,
};
use crate::session::{Session, SessionCredentials};

/// Everything that lives exactly as long as one started session.
struct ActiveSession {
    store: Arc<LiveStore>,
    credentials: SessionCredentials,
    subscriptions: Vec<Subscription>,
    poller: CancellationToken,
}

pub struct SyncCoordinator {
    api: Arc<dyn NotificationApi>,
    connection: ConnectionManager,
    settings: SyncSettings,
    /// Serializes `start()` and `stop()` so session swaps are atomic.
    lifecycle: Mutex<()>,
    active: Mutex<Option<ActiveSession>>,
    stats: Arc<watch::Sender<NotificationStats>>,
    connection_state: Arc<watch::Sender<ConnectionState>>,
}

impl SyncCoordinator {
    pub fn new(
        api: Arc<dyn NotificationApi>,
        transport: Arc<dyn PushTransport>,
        settings: SyncSettings,
    ) -> Self {
        let dispatcher = Arc::new(EventDispatcher::new());
        let connection = ConnectionManager::new(
            transport,
            dispatcher,
            ReconnectPolicy::new(&settings.reconnect),
            settings.connect_attempts,
        );
        let (stats, _) = watch::channel(NotificationStats::default());
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            api,
            connection,
            settings,
            lifecycle: Mutex::new(()),
            active: Mutex::new(None),
            stats: Arc::new(stats),
            connection_state: Arc::new(connection_state),
        }
    }

    /// Start syncing for `session`, replacing any session already running.
    ///
    /// The session stays wired even when the push channel cannot be opened:
    /// the error is returned, but `fetch()` and the mutations keep working and
    /// the channel keeps retrying in the background. If `stop()` or another
    /// `start()` takes over before the channel opens, this returns
    /// [`SyncError::SessionSuperseded`].
    ///
    /// Must not be called from a dispatcher handler.
    pub async fn start(&self, session: &Session) -> SyncResult<()> {
        let credentials = session.credentials().ok_or_else(|| {
            warn!("Refusing to start sync without an authenticated session");
            SyncError::SyncUnavailable
        })?;

        let (store, attempt) = {
            let _lifecycle = self.lifecycle.lock().unwrap();
            if self.teardown() {
                info!("Sync session already active, restarting");
            }

            let store = Arc::new(LiveStore::new(self.stats.clone()));
            let subscriptions = self.subscribe(&store);
            let poller = self.spawn_state_poller();
            *self.active.lock().unwrap() = Some(ActiveSession {
                store: store.clone(),
                credentials: credentials.clone(),
                subscriptions,
                poller,
            });
            (store, self.connection.begin_connect(&credentials))
        };
        info!(
            "Sync session started for user {}",
            credentials.user_id.as_deref().unwrap_or("<unknown>")
        );

        let result = attempt.finished().await;
        if !self.is_current(&store) {
            info!("Sync session was replaced before its push channel opened");
            return Err(SyncError::SessionSuperseded);
        }
        result.map_err(|e| {
            warn!("Push channel unavailable, continuing with REST only: {}", e);
            SyncError::from(e)
        })
    }

    /// Tear the session down. Safe to call at any time, any number of times.
    ///
    /// Must not be called from a dispatcher handler.
    pub fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().unwrap();
        if self.teardown() {
            info!("Sync session stopped");
        }
    }

    /// Replace the local list with the server's.
    pub async fn fetch(&self) -> SyncResult<()> {
        let (store, credentials) = self.live_session()?;
        self.fetch_into(&store, &credentials)
            .await
            .map_err(SyncError::FetchFailed)
    }

    /// Mark one notification read, optimistically.
    pub async fn mark_as_read(&self, id: &str) -> SyncResult<()> {
        let (store, credentials) = self.live_session()?;
        let rollback = self.settings.reconcile_strategy == ReconcileStrategy::Rollback;
        let snapshot = store
            .mutate(|s| {
                let snapshot = rollback.then(|| s.snapshot());
                if !s.mark_read(id) {
                    debug!("mark_as_read({}) changed nothing locally", id);
                }
                snapshot
            })
            .flatten();

        self.send_command(ClientMessage::mark_read(id));

        match self.api.mark_read(&credentials, id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Server rejected mark_as_read({}): {}", id, e);
                self.reconcile(&store, &credentials, snapshot, e).await
            }
        }
    }

    /// Mark everything read, optimistically.
    pub async fn mark_all_as_read(&self) -> SyncResult<()> {
        let (store, credentials) = self.live_session()?;
        let rollback = self.settings.reconcile_strategy == ReconcileStrategy::Rollback;
        let snapshot = store
            .mutate(|s| {
                let snapshot = rollback.then(|| s.snapshot());
                let changed = s.mark_all_read();
                debug!("mark_all_as_read marked {} notifications locally", changed);
                snapshot
            })
            .flatten();

        self.send_command(ClientMessage::mark_all_read());

        match self.api.mark_all_read(&credentials).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Server rejected mark_all_as_read: {}", e);
                self.reconcile(&store, &credentials, snapshot, e).await
            }
        }
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.read(|list| list.to_vec())
    }

    pub fn filter<P>(&self, predicate: P) -> Vec<Notification>
    where
        P: Fn(&Notification) -> bool,
    {
        self.read(|list| query::filter(list, predicate))
    }

    pub fn search(&self, text: &str) -> Vec<Notification> {
        self.read(|list| query::search(list, text))
    }

    pub fn by_date_range(&self, start: i64, end: i64) -> Vec<Notification> {
        self.read(|list| query::by_date_range(list, start, end))
    }

    pub fn by_category(&self, category: NotificationCategory) -> Vec<Notification> {
        self.read(|list| query::by_category(list, category))
    }

    pub fn unread(&self) -> Vec<Notification> {
        self.read(query::unread)
    }

    /// Most recently added notification.
    pub fn latest(&self) -> Option<Notification> {
        self.current_store()
            .and_then(|store| store.read(|s| s.latest().cloned()))
    }

    pub fn stats(&self) -> NotificationStats {
        self.stats.borrow().clone()
    }

    pub fn unread_count(&self) -> usize {
        self.stats.borrow().unread
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<NotificationStats> {
        self.stats.subscribe()
    }

    /// Connection state as last observed by the coordinator.
    pub fn connection_state(&self) -> ConnectionState {
        *self.connection_state.borrow()
    }

    pub fn subscribe_connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection_state.subscribe()
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().unwrap().is_some()
    }

    /// The dispatcher push events are delivered through. Hosts may subscribe
    /// their own handlers; the coordinator only removes the ones it added.
    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        self.connection.dispatcher()
    }

    fn current_store(&self) -> Option<Arc<LiveStore>> {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .map(|active| active.store.clone())
    }

    /// Store and credentials of the running session.
    fn live_session(&self) -> SyncResult<(Arc<LiveStore>, SessionCredentials)> {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .map(|active| (active.store.clone(), active.credentials.clone()))
            .ok_or(SyncError::SyncUnavailable)
    }

    fn is_current(&self, store: &Arc<LiveStore>) -> bool {
        self.current_store()
            .map(|current| Arc::ptr_eq(&current, store))
            .unwrap_or(false)
    }

    /// Release the active session and close the channel. Caller holds `lifecycle`.
    ///
    /// Returns true if a session was active.
    fn teardown(&self) -> bool {
        let active = self.active.lock().unwrap().take();
        let was_active = active.is_some();
        if let Some(active) = active {
            let dispatcher = self.connection.dispatcher();
            for subscription in &active.subscriptions {
                dispatcher.unsubscribe(subscription);
            }
            active.poller.cancel();
            active.store.kill();
            self.stats.send_replace(NotificationStats::default());
        }
        self.connection.disconnect();
        self.connection_state
            .send_replace(ConnectionState::Disconnected);
        was_active
    }

    fn read(&self, f: impl FnOnce(&[Notification]) -> Vec<Notification>) -> Vec<Notification> {
        self.current_store()
            .map(|store| store.read(|s| f(s.as_slice())))
            .unwrap_or_default()
    }

    async fn fetch_into(
        &self,
        store: &LiveStore,
        credentials: &SessionCredentials,
    ) -> Result<(), ApiError> {
        let page = self.api.list(credentials).await.map_err(|e| {
            warn!("Failed to fetch notifications: {}", e);
            e
        })?;

        let count = page.notifications.len();
        if store
            .mutate(|s| s.replace_all(page.notifications))
            .is_some()
        {
            debug!("Replaced local list with {} notifications", count);
        }
        Ok(())
    }

    async fn reconcile(
        &self,
        store: &LiveStore,
        credentials: &SessionCredentials,
        snapshot: Option<StoreSnapshot>,
        cause: ApiError,
    ) -> SyncResult<()> {
        match self.settings.reconcile_strategy {
            ReconcileStrategy::Refetch => match self.fetch_into(store, credentials).await {
                Ok(()) => {
                    info!("Reconciled with server after rejected write");
                    Ok(())
                }
                Err(fetch) => {
                    error!(
                        "Reconciliation fetch failed, local state may be stale: {}",
                        fetch
                    );
                    Err(SyncError::MutationReconciliationFailed {
                        mutation: cause,
                        fetch,
                    })
                }
            },
            ReconcileStrategy::Rollback => {
                if let Some(snapshot) = snapshot {
                    store.mutate(|s| s.rollback_to(snapshot));
                }
                Err(SyncError::MutationRejected(cause))
            }
        }
    }

    fn send_command(&self, message: ClientMessage) {
        if self.connection.state() != ConnectionState::Connected {
            return;
        }
        if let Err(e) = self.connection.send(message) {
            debug!("Push command not sent, relying on REST: {}", e);
        }
    }

    fn subscribe(&self, store: &Arc<LiveStore>) -> Vec<Subscription> {
        let dispatcher = self.connection.dispatcher();
        let mut subscriptions = Vec::with_capacity(4);

        let weak = Arc::downgrade(store);
        subscriptions.push(dispatcher.on(
            NOTIFICATION_CREATED,
            handler(move |payload| {
                let Some(store) = weak.upgrade() else { return };
                match serde_json::from_value::<Notification>(payload.clone()) {
                    Ok(notification) => {
                        debug!("Pushed notification {}", notification.id);
                        store.mutate(|s| s.prepend(notification));
                    }
                    Err(e) => warn!("Ignoring malformed {} payload: {}", NOTIFICATION_CREATED, e),
                }
            }),
        ));

        let weak = Arc::downgrade(store);
        subscriptions.push(dispatcher.on(
            NOTIFICATIONS_SNAPSHOT,
            handler(move |payload| {
                let Some(store) = weak.upgrade() else { return };
                match serde_json::from_value::<SnapshotPayload>(payload.clone()) {
                    Ok(snapshot) => {
                        let list = snapshot.into_notifications();
                        debug!("Pushed snapshot of {} notifications", list.len());
                        store.mutate(|s| s.replace_all(list));
                    }
                    Err(e) => warn!(
                        "Ignoring malformed {} payload: {}",
                        NOTIFICATIONS_SNAPSHOT, e
                    ),
                }
            }),
        ));

        let weak = Arc::downgrade(store);
        subscriptions.push(dispatcher.on(
            NOTIFICATION_READ,
            handler(move |payload| {
                let Some(store) = weak.upgrade() else { return };
                match serde_json::from_value::<NotificationRef>(payload.clone()) {
                    Ok(NotificationRef { id }) => {
                        store.mutate(|s| s.mark_read(&id));
                    }
                    Err(e) => warn!("Ignoring malformed {} payload: {}", NOTIFICATION_READ, e),
                }
            }),
        ));

        let channel = self.connection.handle();
        let mirror = self.connection_state.clone();
        subscriptions.push(dispatcher.on(
            CONNECTION_STATE_CHANGED,
            handler(move |payload| {
                let state = payload
                    .as_str()
                    .and_then(ConnectionState::parse)
                    .unwrap_or_else(|| channel.state());
                mirror_state(&mirror, state);
                if state == ConnectionState::Connected {
                    request_snapshot(&channel);
                }
            }),
        ));

        subscriptions
    }

    /// Periodically re-reads the channel state in case a transition event was missed.
    fn spawn_state_poller(&self) -> CancellationToken {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let channel = self.connection.handle();
        let mirror = self.connection_state.clone();
        let period = self.settings.state_poll_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => mirror_state(&mirror, channel.state()),
                }
            }
            debug!("Connection state poller stopped");
        });

        cancel
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn mirror_state(mirror: &watch::Sender<ConnectionState>, state: ConnectionState) {
    mirror.send_if_modified(|current| {
        if *current == state {
            return false;
        }
        *current = state;
        true
    });
}

fn request_snapshot(channel: &ChannelHandle) {
    match channel.send(ClientMessage::request_notifications()) {
        Ok(()) => debug!("Requested notification snapshot"),
        Err(e) => debug!("Could not request snapshot: {}", e),
    }
}
