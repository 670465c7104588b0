//! HTTP client for the local knowledge engine.
//!
//! The engine's internals (chunking, embedding, ranking) are its own
//! business; the bridge only speaks the status/query/ingest contract.

use async_trait::async_trait;
use serde_json::{json, Value};

use quill_bridge::KnowledgeStore;
use quill_types::{IngestReceipt, KnowledgeHit, KnowledgeStatus};

pub struct KnowledgeClient {
    base_url: String,
    api_token: Option<String>,
    client: reqwest::Client,
}

impl KnowledgeClient {
    pub fn new(base_url: &str, api_token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Attach both auth schemes so the client works against the engine in
    /// headless mode (Bearer) and behind the desktop shell (x-quill-token).
    fn authed(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => rb.header("x-quill-token", token).bearer_auth(token),
            None => rb,
        }
    }

    async fn expect_json(&self, response: reqwest::Response) -> anyhow::Result<Value> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "knowledge engine returned {status}: {}",
                body.chars().take(300).collect::<String>()
            );
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl KnowledgeStore for KnowledgeClient {
    async fn status(&self) -> anyhow::Result<KnowledgeStatus> {
        let response = self
            .authed(self.client.get(self.endpoint("/status")))
            .send()
            .await?;
        let body = self.expect_json(response).await?;
        Ok(serde_json::from_value(body)?)
    }

    async fn query(&self, query: &str, limit: u32) -> anyhow::Result<Vec<KnowledgeHit>> {
        let response = self
            .authed(self.client.post(self.endpoint("/query")))
            .json(&json!({ "query": query, "limit": limit }))
            .send()
            .await?;
        let body = self.expect_json(response).await?;
        Ok(serde_json::from_value(body["hits"].clone())?)
    }

    async fn ingest_document(&self, file_path: &str) -> anyhow::Result<IngestReceipt> {
        let response = self
            .authed(self.client.post(self.endpoint("/ingest")))
            .json(&json!({ "filePath": file_path }))
            .send()
            .await?;
        let body = self.expect_json(response).await?;
        Ok(serde_json::from_value(body)?)
    }
}
