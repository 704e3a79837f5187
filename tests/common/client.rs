//! Sync client construction for end-to-end tests
//!
//! Builds coordinators wired to a [`TestServer`] over real HTTP and WebSocket.
//! When the wiring changes, update only this file.

use super::constants::*;
use super::server::TestServer;
use notification_sync::channel::{handler, EventDispatcher};
use notification_sync::config::ReconnectSettings;
use notification_sync::{
    HttpNotificationApi, Session, SyncCoordinator, SyncSettings, WebSocketTransport,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Settings with short backoff so reconnect tests finish quickly.
pub fn test_settings(server: &TestServer) -> SyncSettings {
    SyncSettings {
        api_base_url: Some(server.base_url.clone()),
        channel_url: Some(server.ws_url.clone()),
        request_timeout_sec: REQUEST_TIMEOUT_SECS,
        reconnect: ReconnectSettings {
            initial_backoff_ms: TEST_INITIAL_BACKOFF_MS,
            max_backoff_ms: TEST_MAX_BACKOFF_MS,
            backoff_multiplier: 2.0,
        },
        connect_attempts: 3,
        state_poll_interval: Duration::from_millis(50),
        ..SyncSettings::default()
    }
}

/// A coordinator talking to `server` with `settings`.
pub fn coordinator_with(server: &TestServer, settings: SyncSettings) -> SyncCoordinator {
    let api = HttpNotificationApi::new(&server.base_url, settings.request_timeout_sec)
        .expect("Failed to build API client");
    let transport = WebSocketTransport::new(&server.ws_url, settings.channel_buffer);
    SyncCoordinator::new(Arc::new(api), Arc::new(transport), settings)
}

/// A coordinator with the default test settings and a valid token.
pub fn coordinator(server: &TestServer) -> SyncCoordinator {
    coordinator_with(server, test_settings(server))
}

pub fn test_session() -> Session {
    Session::authenticated(TEST_USER_ID, TEST_TOKEN)
}

/// Session of the second account on the test server.
pub fn other_session() -> Session {
    Session::authenticated(OTHER_USER_ID, OTHER_TOKEN)
}

/// Polls `condition` until it holds.
///
/// # Panics
///
/// Panics with `what` if the condition doesn't hold within the timeout.
pub async fn wait_until<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    let start = std::time::Instant::now();
    while !condition() {
        if start.elapsed() > Duration::from_millis(CONDITION_TIMEOUT_MS) {
            panic!("Timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Records every payload emitted for `event`.
pub fn record_events(
    dispatcher: &EventDispatcher,
    event: &str,
) -> Arc<Mutex<Vec<serde_json::Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    dispatcher.on(
        event,
        handler(move |payload| sink.lock().unwrap().push(payload.clone())),
    );
    seen
}

/// Starts `sync` and waits for the snapshot the server pushes on connect, so
/// later writes can't race it.
pub async fn start_synced(sync: &SyncCoordinator, server: &TestServer) {
    sync.start(&test_session())
        .await
        .expect("Failed to start sync");
    let expected = server.notifications().len();
    wait_until("initial snapshot", || sync.stats().total == expected).await;
}
