//! Provider-agnostic model inference.
//!
//! Routes chat turns to OpenAI-compatible, Anthropic or Ollama endpoints,
//! handling per-provider request shapes, auth headers and stream decoding.

use anyhow::Context;
use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};

use quill_bridge::{AgentTurn, ChatTurn, ModelInference, TokenStream};
use quill_types::{AgentTaskResponse, ChatResponse, ChatRole, ModelInfo, ProviderId};

use crate::config::ProvidersConfig;

/// Longest upstream error body echoed into an error message.
const MAX_ERROR_BODY: usize = 300;

pub struct ProviderRouter {
    providers: ProvidersConfig,
    client: reqwest::Client,
}

impl ProviderRouter {
    pub fn new(providers: ProvidersConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { providers, client }
    }

    /// Pick the provider for a turn: the requested one if enabled, else the
    /// configured default, else the first enabled provider.
    fn resolve(&self, requested: Option<ProviderId>) -> anyhow::Result<ProviderId> {
        if let Some(provider) = requested {
            if self.providers.settings(provider).enabled {
                return Ok(provider);
            }
            anyhow::bail!("provider {} is not enabled", provider.as_str());
        }
        if let Some(default) = self.providers.default_provider {
            if self.providers.settings(default).enabled {
                return Ok(default);
            }
        }
        ProviderId::ALL
            .into_iter()
            .find(|p| self.providers.settings(*p).enabled)
            .context("no model provider is enabled")
    }

    fn completions_url(&self, provider: ProviderId) -> String {
        let endpoint = self.providers.settings(provider).endpoint.trim_end_matches('/');
        let path = match provider {
            ProviderId::Openai => "/v1/chat/completions",
            ProviderId::Anthropic => "/v1/messages",
            ProviderId::Ollama => "/api/chat",
        };
        format!("{endpoint}{path}")
    }

    fn apply_headers(
        &self,
        provider: ProviderId,
        rb: reqwest::RequestBuilder,
    ) -> reqwest::RequestBuilder {
        let api_key = self.providers.settings(provider).api_key.as_deref();
        match provider {
            ProviderId::Openai => match api_key {
                Some(key) => rb.bearer_auth(key),
                None => rb,
            },
            ProviderId::Anthropic => {
                let rb = rb.header("anthropic-version", "2023-06-01");
                match api_key {
                    Some(key) => rb.header("x-api-key", key),
                    None => rb,
                }
            }
            // Ollama runs locally and needs no auth.
            ProviderId::Ollama => rb,
        }
    }

    fn format_request(&self, provider: ProviderId, turn: &ChatTurn, stream: bool) -> Value {
        let mut messages: Vec<Value> = turn
            .history
            .iter()
            .map(|entry| json!({ "role": role_str(entry.role), "content": entry.content }))
            .collect();
        messages.push(json!({ "role": "user", "content": turn.message }));

        match provider {
            ProviderId::Openai => json!({
                "model": turn.model,
                "messages": messages,
                "max_tokens": turn.max_tokens.unwrap_or(4096),
                "stream": stream,
            }),
            ProviderId::Anthropic => {
                let system: Vec<&str> = turn
                    .history
                    .iter()
                    .filter(|entry| entry.role == ChatRole::System)
                    .map(|entry| entry.content.as_str())
                    .collect();
                let messages: Vec<&Value> = messages
                    .iter()
                    .filter(|m| m["role"] != "system")
                    .collect();

                let mut body = json!({
                    "model": turn.model,
                    "messages": messages,
                    "max_tokens": turn.max_tokens.unwrap_or(4096),
                    "stream": stream,
                });
                if !system.is_empty() {
                    body["system"] = Value::String(system.join("\n\n"));
                }
                body
            }
            ProviderId::Ollama => json!({
                "model": turn.model,
                "messages": messages,
                "stream": stream,
            }),
        }
    }

    fn parse_response(
        &self,
        provider: ProviderId,
        turn: &ChatTurn,
        response: &Value,
    ) -> ChatResponse {
        let content = match provider {
            ProviderId::Openai => response["choices"][0]["message"]["content"]
                .as_str()
                .unwrap_or(""),
            ProviderId::Anthropic => response["content"][0]["text"].as_str().unwrap_or(""),
            ProviderId::Ollama => response["message"]["content"].as_str().unwrap_or(""),
        };
        let model = response["model"].as_str().unwrap_or(&turn.model);
        ChatResponse {
            response: content.to_string(),
            model: model.to_string(),
            provider: provider.as_str().to_string(),
        }
    }

    async fn completion(&self, turn: &ChatTurn, stream: bool) -> anyhow::Result<reqwest::Response> {
        let provider = self.resolve(turn.provider)?;
        let url = self.completions_url(provider);
        let body = self.format_request(provider, turn, stream);
        let response = self
            .apply_headers(provider, self.client.post(&url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{} is unreachable", provider.as_str()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "{} returned {status}: {}",
                provider.as_str(),
                truncate_body(&body)
            );
        }
        Ok(response)
    }
}

#[async_trait]
impl ModelInference for ProviderRouter {
    async fn chat(&self, turn: ChatTurn) -> anyhow::Result<ChatResponse> {
        let provider = self.resolve(turn.provider)?;
        let response = self.completion(&turn, false).await?;
        let body: Value = response.json().await.context("response decode failed")?;
        Ok(self.parse_response(provider, &turn, &body))
    }

    async fn agent_task(&self, turn: AgentTurn) -> anyhow::Result<AgentTaskResponse> {
        // Tool orchestration itself lives behind the model service; the
        // bridge contract only bounds the vocabulary and step budget.
        let preamble = if turn.tools.is_empty() {
            format!("Work the task in at most {} steps.", turn.max_steps)
        } else {
            format!(
                "Work the task in at most {} steps. Available tools: {}.",
                turn.max_steps,
                turn.tools.join(", ")
            )
        };
        let chat_turn = ChatTurn {
            message: turn.prompt,
            model: turn.model,
            provider: turn.provider,
            history: vec![quill_types::ChatMessageEntry {
                role: ChatRole::System,
                content: preamble,
            }],
            max_tokens: None,
        };
        let response = self.chat(chat_turn).await?;
        Ok(AgentTaskResponse {
            response: response.response,
            steps_used: 1,
        })
    }

    async fn stream_chat(&self, turn: ChatTurn) -> anyhow::Result<TokenStream> {
        let provider = self.resolve(turn.provider)?;
        let response = self.completion(&turn, true).await?;
        let mut bytes = response.bytes_stream();

        let stream = try_stream! {
            let mut line_buf = String::new();
            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.context("stream read failed")?;
                line_buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = line_buf.find('\n') {
                    let line = line_buf[..pos].trim_end_matches('\r').to_string();
                    line_buf = line_buf[pos + 1..].to_string();
                    match decode_stream_line(provider, &line) {
                        StreamLine::Delta(delta) => yield delta,
                        StreamLine::Done => break 'outer,
                        StreamLine::Skip => {}
                    }
                }
            }
        };
        Ok(stream.boxed())
    }

    async fn list_models(&self, provider: Option<ProviderId>) -> anyhow::Result<Vec<ModelInfo>> {
        let targets: Vec<ProviderId> = match provider {
            Some(p) => vec![self.resolve(Some(p))?],
            None => ProviderId::ALL
                .into_iter()
                .filter(|p| self.providers.settings(*p).enabled)
                .collect(),
        };

        let mut models = Vec::new();
        for target in targets {
            match target {
                ProviderId::Ollama => {
                    let endpoint = self
                        .providers
                        .settings(target)
                        .endpoint
                        .trim_end_matches('/')
                        .to_string();
                    let response = self
                        .client
                        .get(format!("{endpoint}/api/tags"))
                        .send()
                        .await
                        .context("ollama is unreachable")?;
                    let body: Value = response.json().await.context("ollama tag decode failed")?;
                    if let Some(entries) = body["models"].as_array() {
                        for entry in entries {
                            if let Some(name) = entry["name"].as_str() {
                                models.push(ModelInfo {
                                    id: name.to_string(),
                                    provider: target.as_str().to_string(),
                                });
                            }
                        }
                    }
                }
                _ => {
                    if let Some(model) = &self.providers.settings(target).default_model {
                        models.push(ModelInfo {
                            id: model.clone(),
                            provider: target.as_str().to_string(),
                        });
                    }
                }
            }
        }
        Ok(models)
    }
}

fn role_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    }
}

fn truncate_body(body: &str) -> String {
    let mut out: String = body.chars().take(MAX_ERROR_BODY).collect();
    if out.len() < body.len() {
        out.push('…');
    }
    out
}

enum StreamLine {
    Delta(String),
    Done,
    Skip,
}

/// Decode one line of a streaming response body.
///
/// OpenAI and Anthropic speak SSE (`data: {...}` lines); Ollama emits one
/// JSON object per line.
fn decode_stream_line(provider: ProviderId, line: &str) -> StreamLine {
    match provider {
        ProviderId::Openai => {
            let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                return StreamLine::Skip;
            };
            if data == "[DONE]" {
                return StreamLine::Done;
            }
            let Ok(event) = serde_json::from_str::<Value>(data) else {
                return StreamLine::Skip;
            };
            match event["choices"][0]["delta"]["content"].as_str() {
                Some(delta) if !delta.is_empty() => StreamLine::Delta(delta.to_string()),
                _ => StreamLine::Skip,
            }
        }
        ProviderId::Anthropic => {
            let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                return StreamLine::Skip;
            };
            let Ok(event) = serde_json::from_str::<Value>(data) else {
                return StreamLine::Skip;
            };
            match event["type"].as_str() {
                Some("content_block_delta") => match event["delta"]["text"].as_str() {
                    Some(delta) if !delta.is_empty() => StreamLine::Delta(delta.to_string()),
                    _ => StreamLine::Skip,
                },
                Some("message_stop") => StreamLine::Done,
                _ => StreamLine::Skip,
            }
        }
        ProviderId::Ollama => {
            let Ok(event) = serde_json::from_str::<Value>(line) else {
                return StreamLine::Skip;
            };
            if event["done"].as_bool() == Some(true) {
                return StreamLine::Done;
            }
            match event["message"]["content"].as_str() {
                Some(delta) if !delta.is_empty() => StreamLine::Delta(delta.to_string()),
                _ => StreamLine::Skip,
            }
        }
    }
}
