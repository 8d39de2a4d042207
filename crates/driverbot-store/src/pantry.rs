//! Pantry basket store: the document lives in one getpantry.cloud basket.
//! `GET` returns the basket, `POST` replaces it. Eventually consistent: a read
//! right after a write may still return the previous version.

use std::time::Duration;

use async_trait::async_trait;
use driverbot_core::config::StoreConfig;
use driverbot_core::error::{DriverBotError, Result};
use driverbot_core::{Document, StateStore};

/// Pantry-backed document store.
pub struct PantryStore {
    client: reqwest::Client,
    url: String,
}

impl PantryStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        if config.pantry_id.trim().is_empty() {
            return Err(DriverBotError::Config(
                "store.pantry_id is required for the pantry backend".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DriverBotError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: basket_url(&config.pantry_base, &config.pantry_id, &config.basket),
        })
    }
}

fn basket_url(base: &str, pantry_id: &str, basket: &str) -> String {
    format!("{}/{}/basket/{}", base.trim_end_matches('/'), pantry_id, basket)
}

/// Pantry answers 400 with a "does not exist" style body for a basket that was
/// never written.
fn is_missing_basket(status: reqwest::StatusCode, body: &str) -> bool {
    if status == reqwest::StatusCode::NOT_FOUND {
        return true;
    }
    let body = body.to_ascii_lowercase();
    status == reqwest::StatusCode::BAD_REQUEST
        && (body.contains("does not exist") || body.contains("could not get basket"))
}

#[async_trait]
impl StateStore for PantryStore {
    fn name(&self) -> &str {
        "pantry"
    }

    async fn load_raw(&self) -> Result<serde_json::Value> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| DriverBotError::StoreUnavailable(format!("Pantry GET failed: {e}")))?;

        let status = resp.status();
        if status.is_success() {
            let value = resp.json::<serde_json::Value>().await.map_err(|e| {
                DriverBotError::StoreUnavailable(format!("Pantry returned unreadable body: {e}"))
            })?;
            return Ok(value);
        }

        let body = resp.text().await.unwrap_or_default();
        if is_missing_basket(status, &body) {
            tracing::info!("📭 Pantry basket not created yet, starting from an empty document");
            return Ok(serde_json::Value::Null);
        }
        Err(DriverBotError::StoreUnavailable(format!(
            "Pantry GET {status}: {body}"
        )))
    }

    async fn save(&self, doc: &Document) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(doc)
            .send()
            .await
            .map_err(|e| DriverBotError::StoreUnavailable(format!("Pantry POST failed: {e}")))?;

        if resp.status().is_success() {
            tracing::debug!(
                "💾 Saved document to Pantry ({} groups, {} scheduled)",
                doc.groups.len(),
                doc.scheduled_queue.len()
            );
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(DriverBotError::StoreUnavailable(format!(
                "Pantry POST {status}: {body}"
            )))
        }
    }
}
