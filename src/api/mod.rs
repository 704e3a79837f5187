//! REST notification API consumed by the sync engine.

mod client;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::notifications::NotificationPage;
use crate::session::SessionCredentials;

pub use client::HttpNotificationApi;

/// Pull side of the notification backend.
///
/// Every call carries the credentials of the session it is made for, so one
/// client can serve consecutive sessions without mixing their data.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Current notification list, newest first.
    async fn list(&self, credentials: &SessionCredentials) -> Result<NotificationPage, ApiError>;

    /// Mark one notification read. Fails with [`ApiError::NotFound`] for unknown ids.
    async fn mark_read(&self, credentials: &SessionCredentials, id: &str) -> Result<(), ApiError>;

    async fn mark_all_read(&self, credentials: &SessionCredentials) -> Result<(), ApiError>;
}
