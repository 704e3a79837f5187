//! Push channel message types.
//!
//! Defines the generic message envelope format used for all push channel traffic.
//! Feature-specific payloads are carried as JSON values, allowing extensibility.

use serde::{Deserialize, Serialize};

/// Server -> Client message envelope.
///
/// The `msg_type` field is used for routing through the
/// [`EventDispatcher`](super::EventDispatcher).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerMessage {
    /// Message type identifier (e.g., "notification.created")
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Feature-specific payload (JSON value)
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ServerMessage {
    /// Create a new server message with the given type and payload.
    pub fn new(msg_type: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Client -> Server command envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientMessage {
    /// Command type identifier
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Command payload (JSON value)
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ClientMessage {
    pub fn new(msg_type: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Create a command with a null payload.
    pub fn empty(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: serde_json::Value::Null,
        }
    }

    /// Ask the server to push the current notification list.
    pub fn request_notifications() -> Self {
        Self::empty(msg_types::REQUEST_NOTIFICATIONS)
    }

    pub fn mark_read(id: &str) -> Self {
        Self::new(msg_types::MARK_READ, payloads::NotificationRef { id: id.to_string() })
    }

    pub fn mark_all_read() -> Self {
        Self::empty(msg_types::MARK_ALL_READ)
    }
}

/// Reserved message type constants.
pub mod msg_types {
    /// A single notification was created (server -> client).
    pub const NOTIFICATION_CREATED: &str = "notification.created";
    /// Full list snapshot (server -> client).
    pub const NOTIFICATIONS_SNAPSHOT: &str = "notifications.snapshot";
    /// A notification was read on another device (server -> client).
    pub const NOTIFICATION_READ: &str = "notification.read";

    /// Request the current notification list (client -> server).
    pub const REQUEST_NOTIFICATIONS: &str = "notifications.request";
    /// Mark one notification read (client -> server).
    pub const MARK_READ: &str = "notification.mark_read";
    /// Mark every notification read (client -> server).
    pub const MARK_ALL_READ: &str = "notifications.mark_all_read";

    /// Connection state transition, emitted locally by the connection manager.
    pub const CONNECTION_STATE_CHANGED: &str = "connection.state_changed";
    /// Reconnect attempt scheduled, emitted locally by the connection manager.
    pub const CONNECTION_RETRY_SCHEDULED: &str = "connection.retry_scheduled";
}

/// Payload shapes carried in the envelopes.
pub mod payloads {
    use serde::{Deserialize, Serialize};

    use crate::notifications::{Notification, NotificationPage};

    /// Payload referencing a notification by id.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct NotificationRef {
        pub id: String,
    }

    /// Snapshot payloads come either as a page object or as a bare array.
    #[derive(Debug, Clone, Deserialize, PartialEq)]
    #[serde(untagged)]
    pub enum SnapshotPayload {
        Page(NotificationPage),
        List(Vec<Notification>),
    }

    impl SnapshotPayload {
        pub fn into_notifications(self) -> Vec<Notification> {
            match self {
                SnapshotPayload::Page(page) => page.notifications,
                SnapshotPayload::List(list) => list,
            }
        }
    }

    /// Payload of `connection.retry_scheduled`.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    pub struct RetryScheduled {
        pub attempt: u32,
        pub delay_ms: u64,
    }
}
