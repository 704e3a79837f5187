//! Push channel: transport, connection lifecycle and event dispatch.

pub mod connection;
pub mod dispatcher;
pub mod messages;
pub mod reconnect;
pub mod transport;

pub use connection::{ChannelHandle, ConnectAttempt, ConnectionManager, ConnectionState};
pub use dispatcher::{handler, EventDispatcher, Handler, Subscription};
pub use messages::{msg_types, ClientMessage, ServerMessage};
pub use reconnect::ReconnectPolicy;
pub use transport::{PushTransport, TransportLink, WebSocketTransport};

#[cfg(any(test, feature = "mock"))]
pub use transport::MockPushTransport;
