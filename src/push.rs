//! ntfy push notifications.
//!
//! Best-effort: a single POST per event, no retries, no delivery
//! confirmation beyond logging the HTTP status.

use std::time::Duration;

use reqwest::Client;
use tracing::{info, warn};

use crate::error::Result;

const FALLBACK_TITLE: &str = "Claude Code";
const FALLBACK_TAGS: &str = "robot";

pub struct NtfyClient {
    client: Client,
    url: String,
    priority: u8,
    tags: String,
}

impl NtfyClient {
    pub fn new(server: &str, topic: &str, priority: u8, tags: &str) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            url: format!("{}/{topic}", server.trim_end_matches('/')),
            priority: priority.clamp(1, 5),
            tags: ascii_header(tags, FALLBACK_TAGS),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn send(&self, title: &str, text: &str) -> Result<()> {
        info!("Sending push notification: {title} - {text}");
        let resp = self
            .client
            .post(&self.url)
            .header("Title", ascii_header(title, FALLBACK_TITLE))
            .header("Priority", self.priority.to_string())
            .header("Tags", &self.tags)
            .body(text.as_bytes().to_vec())
            .send()
            .await?;

        match resp.error_for_status() {
            Ok(_) => {
                info!("Push notification sent to {}", self.url);
                Ok(())
            }
            Err(e) => {
                warn!("Push notification failed: {e}");
                Err(e.into())
            }
        }
    }
}

/// HTTP headers must be ASCII; drop everything else.
fn ascii_header(value: &str, fallback: &str) -> String {
    let cleaned: String = value.chars().filter(char::is_ascii).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        fallback.to_string()
    } else {
        cleaned.to_string()
    }
}
