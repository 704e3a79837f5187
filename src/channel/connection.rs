//! Push channel connection manager.
//!
//! Owns the transport link for one session. A supervisor task opens the link,
//! pumps inbound messages into the [`EventDispatcher`] and reopens the link with
//! backoff whenever it drops, until [`ConnectionManager::disconnect`] is called.
//!
//! Every state transition is emitted locally as
//! [`CONNECTION_STATE_CHANGED`](super::messages::msg_types::CONNECTION_STATE_CHANGED).

use std::sync::{Arc, Mutex, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dispatcher::EventDispatcher;
use super::messages::msg_types::{CONNECTION_RETRY_SCHEDULED, CONNECTION_STATE_CHANGED};
use super::messages::payloads::RetryScheduled;
use super::messages::{ClientMessage, ServerMessage};
use super::reconnect::ReconnectPolicy;
use super::transport::{PushTransport, TransportLink};
use crate::error::ChannelError;
use crate::session::SessionCredentials;

/// Push channel connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "disconnected" => Some(ConnectionState::Disconnected),
            "connecting" => Some(ConnectionState::Connecting),
            "connected" => Some(ConnectionState::Connected),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `connect()` callers wait on.
#[derive(Debug, Clone, Default)]
struct Progress {
    state: ConnectionState,
    /// Set when the current connect budget is exhausted or the manager was disconnected.
    failure: Option<String>,
}

struct Supervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    outbound: Option<mpsc::Sender<ClientMessage>>,
    supervisor: Option<Supervisor>,
    /// Consecutive failed opens since the last `connect()` call or successful open.
    failures: u32,
}

struct Shared {
    transport: Arc<dyn PushTransport>,
    dispatcher: Arc<EventDispatcher>,
    policy: ReconnectPolicy,
    connect_attempts: u32,
    inner: Mutex<Inner>,
    state: watch::Sender<ConnectionState>,
    progress: watch::Sender<Progress>,
}

impl Shared {
    /// Publish `next`. Caller holds the `inner` lock.
    fn publish(&self, next: ConnectionState) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            self.progress.send_modify(|p| {
                p.state = next;
                if next == ConnectionState::Connected {
                    p.failure = None;
                }
            });
        }
        changed
    }

    fn announce(&self, state: ConnectionState) {
        info!("Push channel {}", state);
        self.dispatcher
            .emit(CONNECTION_STATE_CHANGED, &serde_json::json!(state.as_str()));
    }

    /// Apply a transition requested by the supervisor owning `cancel`.
    ///
    /// Returns false if that supervisor has been cancelled in the meantime.
    fn transition(&self, next: ConnectionState, cancel: &CancellationToken) -> bool {
        let changed = {
            let _inner = self.inner.lock().unwrap();
            if cancel.is_cancelled() {
                return false;
            }
            self.publish(next)
        };
        if changed {
            self.announce(next);
        }
        true
    }

    fn attach(&self, outbound: mpsc::Sender<ClientMessage>, cancel: &CancellationToken) -> bool {
        let changed = {
            let mut inner = self.inner.lock().unwrap();
            if cancel.is_cancelled() {
                return false;
            }
            inner.outbound = Some(outbound);
            inner.failures = 0;
            self.publish(ConnectionState::Connected)
        };
        if changed {
            self.announce(ConnectionState::Connected);
        }
        true
    }

    fn detach(&self) {
        self.inner.lock().unwrap().outbound = None;
    }

    /// Count a failed open. True exactly when this failure exhausts the connect budget.
    fn record_failure(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.failures = inner.failures.saturating_add(1);
        inner.failures == self.connect_attempts
    }

    fn fail_waiters(&self, reason: String) {
        self.progress.send_modify(|p| p.failure = Some(reason));
    }

    fn current_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn send(&self, message: ClientMessage) -> Result<(), ChannelError> {
        let inner = self.inner.lock().unwrap();
        let outbound = inner.outbound.as_ref().ok_or(ChannelError::NotConnected)?;
        outbound.try_send(message).map_err(|e| {
            warn!("Dropping outbound command: {}", e);
            ChannelError::NotConnected
        })
    }

    /// Forward inbound messages until the link closes (false) or we are cancelled (true).
    async fn pump(
        &self,
        inbound: &mut mpsc::Receiver<ServerMessage>,
        cancel: &CancellationToken,
    ) -> bool {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return true,
                message = inbound.recv() => match message {
                    Some(message) => {
                        debug!("Push message {}", message.msg_type);
                        self.dispatcher.emit(&message.msg_type, &message.payload);
                    }
                    None => return false,
                },
            }
        }
    }
}

async fn supervise(shared: Arc<Shared>, credentials: SessionCredentials, cancel: CancellationToken) {
    let mut attempt: u32 = 0;

    loop {
        if !shared.transition(ConnectionState::Connecting, &cancel) {
            return;
        }

        let opened = tokio::select! {
            _ = cancel.cancelled() => return,
            result = shared.transport.open(&credentials) => result,
        };

        let exhausted = match opened {
            Ok(TransportLink {
                mut inbound,
                outbound,
            }) => {
                attempt = 0;
                if !shared.attach(outbound, &cancel) {
                    return;
                }
                let cancelled = shared.pump(&mut inbound, &cancel).await;
                shared.detach();
                if cancelled {
                    return;
                }
                warn!("Push channel closed, scheduling reconnect");
                if !shared.transition(ConnectionState::Disconnected, &cancel) {
                    return;
                }
                None
            }
            Err(e) => {
                warn!("Push channel open failed: {}", e);
                if !shared.transition(ConnectionState::Disconnected, &cancel) {
                    return;
                }
                let reason = match e {
                    ChannelError::Unavailable(reason) => reason,
                    other => other.to_string(),
                };
                shared.record_failure().then_some(reason)
            }
        };

        let delay = shared.policy.delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!("Reconnect attempt {} in {:?}", attempt, delay);
        let retry = RetryScheduled {
            attempt,
            delay_ms: delay.as_millis() as u64,
        };
        shared.dispatcher.emit(
            CONNECTION_RETRY_SCHEDULED,
            &serde_json::to_value(retry).unwrap_or(serde_json::Value::Null),
        );

        if let Some(reason) = exhausted {
            warn!(
                "Push channel unavailable after {} attempts, retrying in background",
                shared.connect_attempts
            );
            shared.fail_waiters(reason);
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Weak handle to a connection manager, safe to capture in dispatcher handlers.
#[derive(Clone)]
pub struct ChannelHandle {
    shared: Weak<Shared>,
}

impl ChannelHandle {
    pub fn send(&self, message: ClientMessage) -> Result<(), ChannelError> {
        match self.shared.upgrade() {
            Some(shared) => shared.send(message),
            None => Err(ChannelError::NotConnected),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared
            .upgrade()
            .map(|shared| shared.current_state())
            .unwrap_or_default()
    }
}

/// Outcome of a [`ConnectionManager::begin_connect`] call.
pub struct ConnectAttempt {
    progress: watch::Receiver<Progress>,
}

impl ConnectAttempt {
    /// Wait until the channel is open or the connect budget is spent.
    pub async fn finished(mut self) -> Result<(), ChannelError> {
        let outcome = self
            .progress
            .wait_for(|p| p.state == ConnectionState::Connected || p.failure.is_some())
            .await
            .map(|p| (*p).clone());

        match outcome {
            Ok(p) if p.state == ConnectionState::Connected => Ok(()),
            Ok(p) => Err(ChannelError::Unavailable(p.failure.unwrap_or_default())),
            Err(_) => Err(ChannelError::Unavailable(
                "connection manager dropped".to_string(),
            )),
        }
    }
}

/// Manages the push channel for one session.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager. `connect_attempts` is the number of consecutive failed opens
    /// after which `connect()` gives up (the supervisor keeps retrying).
    pub fn new(
        transport: Arc<dyn PushTransport>,
        dispatcher: Arc<EventDispatcher>,
        policy: ReconnectPolicy,
        connect_attempts: u32,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (progress, _) = watch::channel(Progress::default());
        Self {
            shared: Arc::new(Shared {
                transport,
                dispatcher,
                policy,
                connect_attempts: connect_attempts.max(1),
                inner: Mutex::new(Inner::default()),
                state,
                progress,
            }),
        }
    }

    /// Open the push channel, or wait for the one already opening.
    pub async fn connect(&self, credentials: &SessionCredentials) -> Result<(), ChannelError> {
        self.begin_connect(credentials).finished().await
    }

    /// Start (or join) the supervisor without waiting for the outcome.
    ///
    /// Resets the connect budget. The returned [`ConnectAttempt`] resolves the
    /// same way `connect()` does.
    pub fn begin_connect(&self, credentials: &SessionCredentials) -> ConnectAttempt {
        let progress = self.shared.progress.subscribe();
        let mut inner = self.shared.inner.lock().unwrap();
        inner.failures = 0;
        self.shared.progress.send_modify(|p| p.failure = None);

        let running = inner
            .supervisor
            .as_ref()
            .map(|s| !s.handle.is_finished())
            .unwrap_or(false);
        if running {
            debug!("connect() while {}, joining running supervisor", self.state());
        } else {
            let cancel = CancellationToken::new();
            let handle = tokio::spawn(supervise(
                self.shared.clone(),
                credentials.clone(),
                cancel.clone(),
            ));
            inner.supervisor = Some(Supervisor { cancel, handle });
        }

        ConnectAttempt { progress }
    }

    /// Close the channel and cancel any pending reconnect.
    pub fn disconnect(&self) {
        let changed = {
            let mut inner = self.shared.inner.lock().unwrap();
            inner.outbound = None;
            inner.failures = 0;
            if let Some(supervisor) = inner.supervisor.take() {
                supervisor.cancel.cancel();
                supervisor.handle.abort();
            }
            self.shared.publish(ConnectionState::Disconnected)
        };
        self.shared
            .fail_waiters("disconnected before the channel opened".to_string());
        if changed {
            self.shared.announce(ConnectionState::Disconnected);
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.current_state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Fire-and-forget command over the open link.
    pub fn send(&self, message: ClientMessage) -> Result<(), ChannelError> {
        self.shared.send(message)
    }

    pub fn handle(&self) -> ChannelHandle {
        ChannelHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.shared.dispatcher
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.shared.inner.lock() {
            if let Some(supervisor) = inner.supervisor.take() {
                supervisor.cancel.cancel();
                supervisor.handle.abort();
            }
        }
    }
}
