//! Test server lifecycle management
//!
//! Spawns an in-process notification backend: the REST endpoints plus the
//! WebSocket push channel, backed by an in-memory list. Failure switches let
//! tests make either side misbehave.

use super::constants::*;
use super::fixtures::{other_account_notifications, seed_notifications};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use notification_sync::channel::msg_types;
use notification_sync::channel::{ClientMessage, ServerMessage};
use notification_sync::notifications::NotificationPage;
use notification_sync::Notification;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};

/// Which account a bearer token belongs to.
#[derive(Clone, Copy)]
enum Account {
    Primary,
    Other,
}

/// Shared state behind the test server's routes.
struct ServerState {
    notifications: Mutex<Vec<Notification>>,
    other_notifications: Mutex<Vec<Notification>>,
    received: Mutex<Vec<ClientMessage>>,
    fail_list: AtomicBool,
    fail_mark_read: AtomicBool,
    refuse_channel: AtomicBool,
    list_delay_ms: AtomicU64,
    list_calls: AtomicUsize,
    channel_opens: AtomicUsize,
    push: broadcast::Sender<ServerMessage>,
    kick: watch::Sender<u64>,
}

impl ServerState {
    fn list(&self, account: Account) -> &Mutex<Vec<Notification>> {
        match account {
            Account::Primary => &self.notifications,
            Account::Other => &self.other_notifications,
        }
    }

    fn handle_client_message(
        &self,
        account: Account,
        message: ClientMessage,
    ) -> Option<ServerMessage> {
        let reply = match message.msg_type.as_str() {
            msg_types::REQUEST_NOTIFICATIONS => {
                let list = self.list(account).lock().unwrap().clone();
                Some(ServerMessage::new(
                    msg_types::NOTIFICATIONS_SNAPSHOT,
                    json!({ "notifications": list }),
                ))
            }
            _ => None,
        };
        self.received.lock().unwrap().push(message);
        reply
    }
}

fn authorized(headers: &HeaderMap) -> Option<Account> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())?
        .strip_prefix("Bearer ")?;
    match token {
        TEST_TOKEN => Some(Account::Primary),
        OTHER_TOKEN => Some(Account::Other),
        _ => None,
    }
}

async fn list_notifications(
    headers: HeaderMap,
    State(state): State<Arc<ServerState>>,
) -> Response {
    let Some(account) = authorized(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    state.list_calls.fetch_add(1, Ordering::SeqCst);

    let delay = state.list_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if state.fail_list.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "list unavailable").into_response();
    }

    let list = state.list(account).lock().unwrap().clone();
    Json(NotificationPage::new(list)).into_response()
}

async fn mark_read(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<ServerState>>,
) -> Response {
    let Some(account) = authorized(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    if state.fail_mark_read.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "mark read unavailable").into_response();
    }

    let mut notifications = state.list(account).lock().unwrap();
    match notifications.iter_mut().find(|n| n.id == id) {
        Some(notification) => {
            if !notification.is_read {
                notification.is_read = true;
                notification.read_at = Some(1_700_001_000);
            }
            StatusCode::NO_CONTENT.into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn mark_all_read(headers: HeaderMap, State(state): State<Arc<ServerState>>) -> Response {
    let Some(account) = authorized(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    if state.fail_mark_read.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "mark read unavailable").into_response();
    }

    for notification in state.list(account).lock().unwrap().iter_mut() {
        if !notification.is_read {
            notification.is_read = true;
            notification.read_at = Some(1_700_001_000);
        }
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<ServerState>>,
) -> Response {
    state.channel_opens.fetch_add(1, Ordering::SeqCst);
    if state.refuse_channel.load(Ordering::SeqCst) {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    let Some(account) = authorized(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    ws.on_upgrade(move |socket| handle_socket(socket, state, account))
}

async fn send_message(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &ServerMessage,
) -> bool {
    match serde_json::to_string(message) {
        Ok(json) => sink.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => false,
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>, account: Account) {
    let (mut sink, mut stream) = socket.split();
    let mut pushed = state.push.subscribe();
    let mut kick = state.kick.subscribe();

    loop {
        tokio::select! {
            _ = kick.changed() => break,
            message = pushed.recv() => match message {
                Ok(message) => {
                    if !send_message(&mut sink, &message).await {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let Ok(message) = serde_json::from_str::<ClientMessage>(&text) else {
                        continue;
                    };
                    if let Some(reply) = state.handle_client_message(account, message) {
                        if !send_message(&mut sink, &reply).await {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sink.close().await;
}

/// Test server instance with an in-memory notification list
///
/// When dropped, the server shuts down and every open channel is closed.
pub struct TestServer {
    /// Base URL for REST requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// WebSocket URL of the push channel
    pub ws_url: String,

    state: Arc<ServerState>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server seeded with the fixture notifications
    pub async fn spawn() -> Self {
        Self::spawn_with(seed_notifications()).await
    }

    /// Spawns a new test server on a random port with `notifications`
    ///
    /// # Panics
    ///
    /// Panics if port binding fails or the server doesn't become ready in time.
    pub async fn spawn_with(notifications: Vec<Notification>) -> Self {
        let (push, _) = broadcast::channel(64);
        let (kick, _) = watch::channel(0);
        let state = Arc::new(ServerState {
            notifications: Mutex::new(notifications),
            other_notifications: Mutex::new(other_account_notifications()),
            received: Mutex::new(Vec::new()),
            fail_list: AtomicBool::new(false),
            fail_mark_read: AtomicBool::new(false),
            refuse_channel: AtomicBool::new(false),
            list_delay_ms: AtomicU64::new(0),
            list_calls: AtomicUsize::new(0),
            channel_opens: AtomicUsize::new(0),
            push,
            kick,
        });

        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .route("/v1/user/notifications", get(list_notifications))
            .route("/v1/user/notifications/read-all", post(mark_all_read))
            .route("/v1/user/notifications/{id}/read", post(mark_read))
            .route("/v1/ws", get(ws_handler))
            .with_state(state.clone());

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url: format!("http://127.0.0.1:{}", port),
            ws_url: format!("ws://127.0.0.1:{}/v1/ws", port),
            state,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }

    /// Push a message to every open channel, waiting for at least one listener.
    pub async fn push(&self, message: ServerMessage) {
        let start = std::time::Instant::now();
        while self.state.push.receiver_count() == 0 {
            if start.elapsed() > Duration::from_millis(CONDITION_TIMEOUT_MS) {
                panic!("No channel connected to push {}", message.msg_type);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.state
            .push
            .send(message)
            .expect("Failed to push message");
    }

    /// Push `notification.created` for `notification`.
    pub async fn push_created(&self, notification: &Notification) {
        self.push(ServerMessage::new(msg_types::NOTIFICATION_CREATED, notification))
            .await;
    }

    /// Close every open channel from the server side.
    pub fn kick_connections(&self) {
        self.state.kick.send_modify(|generation| *generation += 1);
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.state.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_mark_read(&self, fail: bool) {
        self.state.fail_mark_read.store(fail, Ordering::SeqCst);
    }

    /// Answer channel upgrades with 503 while set.
    pub fn set_refuse_channel(&self, refuse: bool) {
        self.state.refuse_channel.store(refuse, Ordering::SeqCst);
    }

    pub fn set_list_delay(&self, delay: Duration) {
        self.state
            .list_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of channel upgrade requests seen so far, refused or not.
    pub fn channel_opens(&self) -> usize {
        self.state.channel_opens.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.state.list_calls.load(Ordering::SeqCst)
    }

    /// Commands received over the channel, in arrival order.
    pub fn received_commands(&self) -> Vec<ClientMessage> {
        self.state.received.lock().unwrap().clone()
    }

    /// The server-side list of the primary account.
    pub fn notifications(&self) -> Vec<Notification> {
        self.state.notifications.lock().unwrap().clone()
    }

    /// The server-side list of the second account.
    pub fn other_notifications(&self) -> Vec<Notification> {
        self.state.other_notifications.lock().unwrap().clone()
    }

    /// Replace the primary account's list without telling any client.
    pub fn set_notifications(&self, notifications: Vec<Notification>) {
        *self.state.notifications.lock().unwrap() = notifications;
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.kick_connections();
        if let Some(tx) = self._shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
