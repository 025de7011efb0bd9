//! Outbound webhook notifications for terminal document outcomes.
//!
//! Delivery is best-effort and fully decoupled from the pipeline: a failed
//! or disabled notification is logged and counted, never returned to the
//! caller as an error.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use docpipe_core::defaults;
use docpipe_core::models::{DocumentRecord, ItemOutcome, OutcomeStatus};

/// Payload posted to the configured endpoint for each terminal outcome.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub document_id: String,
    pub filename: String,
    pub storage_key: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

impl WebhookPayload {
    fn from_outcome(document: &DocumentRecord, outcome: &ItemOutcome) -> Self {
        Self {
            document_id: document.id.clone(),
            filename: document.filename.clone(),
            storage_key: document.storage_key.clone(),
            status: outcome.status,
            error: outcome.error.clone(),
            timestamp: outcome.completed_at.to_rfc3339(),
        }
    }
}

/// Counters for delivered and undeliverable notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifierStats {
    pub sent: u64,
    pub failed: u64,
}

/// Fire-and-forget notifier for processing outcomes.
///
/// Construct with [`WebhookNotifier::new`] to point at an endpoint, or
/// [`WebhookNotifier::disabled`] when no endpoint is configured; the
/// disabled notifier accepts every call and does nothing.
pub struct WebhookNotifier {
    client: Client,
    url: Option<String>,
    max_attempts: u32,
    sent: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(defaults::WEBHOOK_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            url: Some(url.into()),
            max_attempts: defaults::WEBHOOK_MAX_ATTEMPTS,
            sent: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn disabled() -> Self {
        Self {
            client: Client::new(),
            url: None,
            max_attempts: defaults::WEBHOOK_MAX_ATTEMPTS,
            sent: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Read `DOCPIPE_WEBHOOK_URL`; absent or empty means disabled.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        match std::env::var("DOCPIPE_WEBHOOK_URL") {
            Ok(url) if !url.trim().is_empty() => Self::new(url),
            _ => Self::disabled(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.url.is_some()
    }

    pub fn stats(&self) -> NotifierStats {
        NotifierStats {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Dispatch a notification for a terminal outcome. Returns immediately;
    /// the HTTP exchange runs on a background task.
    pub fn notify(&self, document: &DocumentRecord, outcome: &ItemOutcome) {
        let url = match &self.url {
            Some(url) => url.clone(),
            None => {
                debug!(document_id = %document.id, "Webhook disabled, skipping notification");
                return;
            }
        };

        let payload = WebhookPayload::from_outcome(document, outcome);
        let client = self.client.clone();
        let max_attempts = self.max_attempts;
        let sent = self.sent.clone();
        let failed = self.failed.clone();

        tokio::spawn(async move {
            for attempt in 1..=max_attempts {
                match client.post(&url).json(&payload).send().await {
                    Ok(response) if response.status().is_success() => {
                        info!(
                            document_id = %payload.document_id,
                            attempt,
                            "Webhook notification delivered"
                        );
                        sent.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                    Ok(response) => {
                        warn!(
                            document_id = %payload.document_id,
                            attempt,
                            status = %response.status(),
                            "Webhook endpoint returned non-success status"
                        );
                    }
                    Err(e) => {
                        warn!(
                            document_id = %payload.document_id,
                            attempt,
                            error = %e,
                            "Webhook request failed"
                        );
                    }
                }
            }
            failed.fetch_add(1, Ordering::Relaxed);
        });
    }
}
