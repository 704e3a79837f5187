//! Error types for the notification sync engine.
//!
//! Transient channel failures never leave the connection manager; everything that
//! reaches a caller is one of the [`SyncError`] variants.

use thiserror::Error;

/// Errors raised by the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The transport could not be established (or was torn down before it opened).
    #[error("Push channel unavailable: {0}")]
    Unavailable(String),

    /// There is no open link to send on.
    #[error("Push channel is not connected")]
    NotConnected,
}

/// Errors raised by the REST notification API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Notification not found: {0}")]
    NotFound(String),

    #[error("Unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// Errors surfaced by the [`SyncCoordinator`](crate::sync::SyncCoordinator).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("{0}")]
    ChannelUnavailable(#[from] ChannelError),

    /// The engine was used without an authenticated session.
    #[error("No authenticated session")]
    SyncUnavailable,

    #[error("Failed to fetch notifications: {0}")]
    FetchFailed(#[source] ApiError),

    /// An optimistic write was not confirmed and the follow-up fetch failed too.
    /// Local state may be stale.
    #[error("Reconciliation failed after {mutation}: {fetch}")]
    MutationReconciliationFailed { mutation: ApiError, fetch: ApiError },

    /// The session was stopped or replaced by another `start()` before its
    /// push channel opened.
    #[error("Sync session was stopped or replaced while starting")]
    SessionSuperseded,

    /// An optimistic write was not confirmed and has been rolled back.
    #[error("Mutation rejected and rolled back: {0}")]
    MutationRejected(#[source] ApiError),
}

impl SyncError {
    /// True when the local view may have diverged from the server.
    pub fn is_degraded(&self) -> bool {
        matches!(self, SyncError::MutationReconciliationFailed { .. })
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
