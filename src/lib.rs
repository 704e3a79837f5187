//! Notification Sync Library
//!
//! Keeps a client-side list of user notifications in sync with the backend,
//! combining a push channel with the REST API.

pub mod api;
pub mod channel;
pub mod config;
pub mod error;
pub mod notifications;
pub mod session;
pub mod sync;

// Re-export commonly used types for convenience
pub use api::{HttpNotificationApi, NotificationApi};
pub use channel::{ConnectionState, EventDispatcher, PushTransport, WebSocketTransport};
pub use config::{ReconcileStrategy, SyncSettings};
pub use error::{ApiError, ChannelError, SyncError, SyncResult};
pub use notifications::{Notification, NotificationCategory, NotificationStats};
pub use session::Session;
pub use sync::SyncCoordinator;
