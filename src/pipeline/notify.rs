//! Completion event sent to an external webhook once every chunk is stored.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use tracing::warn;
use url::Url;

pub const DEFAULT_WEBHOOK_URL: &str = "https://parrot-giving-daily.ngrok-free.app/webhook-test/upload-lead";

const SYNC_MESSAGE: &str = "Data synced successfully";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Invalid webhook URL '{0}'")]
    InvalidEndpoint(String),

    #[error("Webhook notification failed: {0}")]
    NotificationFailed(String),
}

/// Body of the completion event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    message: &'static str,
    pub total_rows: usize,
}

impl SyncSummary {
    pub fn new(total_rows: usize) -> Self {
        SyncSummary { message: SYNC_MESSAGE, total_rows }
    }
}

/// Parses a webhook address up front so a bad one fails before any record is written.
pub fn parse_endpoint(endpoint: &str) -> Result<Url, NotificationError> {
    Url::parse(endpoint)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .ok_or_else(|| NotificationError::InvalidEndpoint(endpoint.to_owned()))
}

/// Delivers at most one POST per call. Failures are reported, never retried.
#[derive(Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new() -> Result<Self, NotificationError> {
        let http = reqwest::Client::builder()
            .user_agent(format!("sheet-sync/{}", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| NotificationError::NotificationFailed(error.to_string()))?;
        Ok(WebhookNotifier { http })
    }

    pub async fn notify(&self, endpoint: &Url, summary: &SyncSummary) -> Result<(), NotificationError> {
        let response = self
            .http
            .post(endpoint.clone())
            .json(summary)
            .send()
            .await
            .map_err(|error| {
                warn!(%endpoint, %error, "webhook unreachable");
                NotificationError::NotificationFailed(error.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%endpoint, status = status.as_u16(), "webhook refused notification");
            return Err(NotificationError::NotificationFailed(format!("HTTP {}", status.as_u16())));
        }
        info!(%endpoint, total_rows = summary.total_rows, "webhook notified");
        Ok(())
    }
}
