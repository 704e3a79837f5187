//! HTTP client for the notification REST API.

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use std::time::Duration;
use tracing::debug;

use super::NotificationApi;
use crate::error::ApiError;
use crate::notifications::NotificationPage;
use crate::session::SessionCredentials;

/// HTTP client for the user notification endpoints.
pub struct HttpNotificationApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotificationApi {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the API (e.g., "https://example.org")
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(
        base_url: impl Into<String>,
        timeout_sec: u64,
    ) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/user/notifications{}", self.base_url, path)
    }

    async fn check(response: Response, id: Option<&str>) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            if let Some(id) = id {
                return Err(ApiError::NotFound(id.to_string()));
            }
        }
        let message = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn list(&self, credentials: &SessionCredentials) -> Result<NotificationPage, ApiError> {
        let response = self
            .client
            .get(self.url(""))
            .bearer_auth(&credentials.token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let response = Self::check(response, None).await?;

        let page: NotificationPage = response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        debug!(
            "Fetched {} notifications (total {})",
            page.notifications.len(),
            page.total()
        );
        Ok(page)
    }

    async fn mark_read(&self, credentials: &SessionCredentials, id: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/{}/read", urlencoding::encode(id))))
            .bearer_auth(&credentials.token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Self::check(response, Some(id)).await?;
        Ok(())
    }

    async fn mark_all_read(&self, credentials: &SessionCredentials) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url("/read-all"))
            .bearer_auth(&credentials.token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Self::check(response, None).await?;
        Ok(())
    }
}
