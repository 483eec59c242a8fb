//! REST client for one analytics service instance
//!
//! Every request carries basic auth from the host descriptor.

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::{EventSearchQuery, SourceApi, TargetApi};
use crate::config::HostConfig;
use crate::models::{Event, EventSearchResponse, ScopeItem, ValidationResponse};

/// Pseudo-scopes the source reports for events without a usable scope
const IGNORED_SOURCE_SCOPES: [&str; 3] = ["", "_missing", "_filtered"];

#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl RestClient {
    pub fn new(host: &HostConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .context("Failed to build RestClient")?;

        Ok(Self {
            client,
            base_url: host.api_root(),
            username: host.username.clone(),
            password: host.password.clone(),
        })
    }

    #[inline]
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    #[inline]
    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        req.basic_auth(&self.username, Some(&self.password))
    }

    async fn ensure_success(resp: Response, what: &str) -> Result<Response> {
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("{} {}: {}", what, status, text));
        }
        Ok(resp)
    }

    /// Scopes referenced by events stored on this instance
    pub async fn list_event_scopes(&self) -> Result<Vec<String>> {
        let resp = self
            .authed(self.client.get(self.url("/query/event/scope")))
            .send()
            .await
            .context("GET /query/event/scope failed")?;
        let resp = Self::ensure_success(resp, "GET /query/event/scope").await?;

        let counts = resp
            .json::<HashMap<String, Value>>()
            .await
            .context("Failed to parse event scope aggregation")?;

        let mut scopes: Vec<String> = counts
            .into_keys()
            .filter(|s| !IGNORED_SOURCE_SCOPES.contains(&s.as_str()))
            .collect();
        scopes.sort();
        Ok(scopes)
    }
}

#[async_trait::async_trait]
impl SourceApi for RestClient {
    async fn search_events(&self, query: &EventSearchQuery) -> Result<EventSearchResponse> {
        let resp = self
            .authed(self.client.post(self.url("/events/search")))
            .json(query)
            .send()
            .await
            .context("POST /events/search failed")?;
        let resp = Self::ensure_success(resp, "POST /events/search").await?;

        let page = resp
            .json::<EventSearchResponse>()
            .await
            .context("Failed to parse events search response")?;
        debug!(
            count = page.list.len(),
            total = ?page.total_size,
            "events page received"
        );
        Ok(page)
    }
}

#[async_trait::async_trait]
impl TargetApi for RestClient {
    async fn validate_events(&self, events: &[Event]) -> Result<ValidationResponse> {
        let resp = self
            .authed(self.client.post(self.url("/jsonSchema/validateEvents")))
            .json(events)
            .send()
            .await
            .context("POST /jsonSchema/validateEvents failed")?;
        let resp = Self::ensure_success(resp, "POST /jsonSchema/validateEvents").await?;

        resp.json::<ValidationResponse>()
            .await
            .context("Failed to parse validateEvents response")
    }

    async fn create_scope(&self, scope: &str) -> Result<bool> {
        let resp = self
            .authed(self.client.post(self.url("/scopes")))
            .json(&ScopeItem::new(scope))
            .send()
            .await
            .with_context(|| format!("POST /scopes failed for {}", scope))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(true);
        }
        let text = resp.text().await.unwrap_or_default();
        warn!(scope, %status, body = %text, "scope creation rejected");
        Ok(false)
    }

    async fn list_scopes(&self) -> Result<Vec<String>> {
        let resp = self
            .authed(self.client.get(self.url("/scopes")))
            .send()
            .await
            .context("GET /scopes failed")?;
        let resp = Self::ensure_success(resp, "GET /scopes").await?;

        let items = resp
            .json::<Vec<ScopeItem>>()
            .await
            .context("Failed to parse scopes response")?;

        Ok(items
            .into_iter()
            .filter(|s| s.item_type == ScopeItem::ITEM_TYPE)
            .map(|s| s.item_id)
            .collect())
    }
}
