//! HTTP adapter for a remote research engine.
//!
//! Implements [`ResearchEngine`] against a service that exposes
//! `POST /research` (gather a context for a job) and `POST /report`
//! (synthesize a report from a context), with an optional bearer token.
//! Transport and protocol faults surface as engine errors; the executor
//! turns those into failed run records.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::research::{ResearchContext, ResearchEngine, ResearchJob, ResearchReport};

/// Remote research engine reached over HTTP.
pub struct HttpResearchEngine {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpResearchEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
            client: reqwest::Client::new(),
        }
    }

    async fn post_json<B, T>(&self, route: &str, body: &B) -> anyhow::Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{route}", self.base_url);
        let mut request = self.client.post(&url).json(body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("engine connection error: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read body".into());
            warn!(%status, route, "engine request failed");
            return Err(map_http_error(status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| anyhow::anyhow!("engine response decode error: {e}"))
    }
}

#[async_trait]
impl ResearchEngine for HttpResearchEngine {
    fn name(&self) -> &'static str {
        "http"
    }

    /// One `POST /research` round trip carrying the whole job.
    ///
    /// The remote call is all-or-nothing: if the token fires before the
    /// response lands, the request is dropped and an empty incomplete
    /// context comes back, which downstream treats as a partial run.
    async fn conduct_research(
        &self,
        job: &ResearchJob,
        cancel: &CancellationToken,
    ) -> anyhow::Result<ResearchContext> {
        let request = self.post_json::<_, ResearchContext>("/research", job);
        tokio::pin!(request);

        tokio::select! {
            result = &mut request => result,
            () = cancel.cancelled() => {
                debug!(query = %job.query, "research request cancelled before completion");
                Ok(ResearchContext {
                    query: job.query.clone(),
                    ..ResearchContext::default()
                })
            }
        }
    }

    async fn write_report(&self, context: &ResearchContext) -> anyhow::Result<ResearchReport> {
        self.post_json("/report", context).await
    }

    /// `GET /health`; an unreachable engine reports unhealthy, not an error.
    async fn health_check(&self) -> anyhow::Result<bool> {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(e) => {
                debug!(error = %e, "engine health probe failed");
                Ok(false)
            }
        }
    }
}

/// Map HTTP error responses to engine errors.
fn map_http_error(status: reqwest::StatusCode, body: &str) -> anyhow::Error {
    let detail = extract_error_message(body);
    match status.as_u16() {
        401 | 403 => anyhow::anyhow!("engine rejected credentials: {detail}"),
        429 => anyhow::anyhow!("engine rate limit exceeded: {detail}"),
        s if s >= 500 => anyhow::anyhow!("engine internal error: {detail}"),
        _ => anyhow::anyhow!("engine returned HTTP {status}: {detail}"),
    }
}

/// Pull a readable message out of an `{"error": ...}` body, falling back
/// to the raw body truncated to something log-friendly.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| {
            if body.is_empty() {
                "no response body".to_owned()
            } else {
                body.chars().take(300).collect()
            }
        })
}
