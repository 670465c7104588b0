//! The command dispatcher: the only code path permitted to cross the
//! boundary on behalf of a named operation.
//!
//! Per call: descriptor lookup → admission check → schema validation →
//! forward to the host collaborator → normalize the outcome. The first
//! three stages resolve locally and never touch a collaborator; collaborator
//! failures are surfaced, never retried.

use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use quill_observability::redact_text;
use quill_types::{
    bound_message, BridgeError, BridgeEvent, CallEnvelope, GetSettingRequest,
    IngestKnowledgeDocumentRequest, ListModelsRequest, QueryKnowledgeRequest, Result,
    RunAgentTaskRequest, RunShellCommandRequest, SendChatMessageRequest, SetSettingRequest,
    StartChatStreamRequest, StopChatStreamRequest, StreamEndReason,
};

use crate::admission::AdmissionController;
use crate::events::EventBus;
use crate::host::{AgentTurn, ChatTurn, HostCapabilities};
use crate::streams::StreamRegistry;
use crate::surface::{channel, CapabilitySurface};

/// Default timeout applied when `runShellCommand` omits one. Within the
/// validated [1000, 300000] ms policy range.
const DEFAULT_SHELL_TIMEOUT_MS: u64 = 30_000;

/// Longest channel name echoed back in an unknown-channel error.
const MAX_ECHOED_CHANNEL: usize = 100;

pub struct Dispatcher {
    surface: CapabilitySurface,
    admission: AdmissionController,
    host: HostCapabilities,
    events: EventBus,
    streams: StreamRegistry,
}

impl Dispatcher {
    pub fn new(host: HostCapabilities) -> Self {
        Self {
            surface: CapabilitySurface::standard(),
            admission: AdmissionController::new(),
            host,
            events: EventBus::new(),
            streams: StreamRegistry::default(),
        }
    }

    pub fn surface(&self) -> &CapabilitySurface {
        &self.surface
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Dispatch one call. Rejections are terminal and local; only sanitized
    /// payloads ever reach a host collaborator.
    pub async fn invoke(&self, channel_name: &str, payload: Value) -> Result<Value> {
        let Some(descriptor) = self.surface.descriptor(channel_name) else {
            // No admission increment: probing unknown names must not burn
            // quota for real channels. The name is untrusted; redact in logs.
            tracing::warn!(channel = %redact_text(channel_name), "unknown channel requested");
            let mut echoed: String = channel_name.chars().take(MAX_ECHOED_CHANNEL).collect();
            if echoed.len() < channel_name.len() {
                echoed.push('…');
            }
            return Err(BridgeError::UnknownChannel(echoed));
        };

        let envelope = CallEnvelope::new(descriptor.name);

        self.admission
            .check(descriptor.rate_limit_key, descriptor.ceiling)?;

        let sanitized = descriptor
            .schema
            .validate(descriptor.name, &payload)
            .map_err(|err| {
                tracing::warn!(
                    call_id = %envelope.call_id,
                    channel = descriptor.name,
                    "payload rejected: {err}"
                );
                err
            })?;

        tracing::debug!(call_id = %envelope.call_id, channel = descriptor.name, "dispatching");
        let result = self.forward(descriptor.name, sanitized).await;
        match &result {
            Ok(_) => {
                tracing::debug!(call_id = %envelope.call_id, channel = descriptor.name, "completed");
            }
            Err(err) => {
                tracing::warn!(
                    call_id = %envelope.call_id,
                    channel = descriptor.name,
                    error = %err,
                    "call failed"
                );
            }
        }
        result
    }

    async fn forward(&self, name: &'static str, sanitized: Value) -> Result<Value> {
        match name {
            channel::SEND_CHAT_MESSAGE => self.send_chat_message(parse(name, sanitized)?).await,
            channel::RUN_AGENT_TASK => self.run_agent_task(parse(name, sanitized)?).await,
            channel::START_CHAT_STREAM => self.start_chat_stream(parse(name, sanitized)?).await,
            channel::STOP_CHAT_STREAM => self.stop_chat_stream(parse(name, sanitized)?),
            channel::LIST_MODELS => self.list_models(parse(name, sanitized)?).await,
            channel::GET_KNOWLEDGE_STATUS => self.get_knowledge_status().await,
            channel::QUERY_KNOWLEDGE => self.query_knowledge(parse(name, sanitized)?).await,
            channel::INGEST_KNOWLEDGE_DOCUMENT => {
                self.ingest_knowledge_document(parse(name, sanitized)?).await
            }
            channel::GET_SETTING => self.get_setting(parse(name, sanitized)?).await,
            channel::SET_SETTING => self.set_setting(parse(name, sanitized)?).await,
            channel::READ_FILE => self.read_file(parse(name, sanitized)?).await,
            channel::WRITE_FILE => self.write_file(parse(name, sanitized)?).await,
            channel::LIST_DIRECTORY => self.list_directory(parse(name, sanitized)?).await,
            channel::CREATE_DIRECTORY => self.create_directory(parse(name, sanitized)?).await,
            channel::DELETE_FILE => self.delete_file(parse(name, sanitized)?).await,
            channel::RUN_SHELL_COMMAND => self.run_shell_command(parse(name, sanitized)?).await,
            channel::GET_RATE_LIMIT_SNAPSHOT => self.get_rate_limit_snapshot(),
            channel::LOG_CLIENT_ERROR => self.log_client_error(parse(name, sanitized)?),
            // Descriptor table and this match are built from the same
            // constants; a miss here means a descriptor was added without a
            // forwarding arm.
            other => Err(BridgeError::UnknownChannel(other.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Model inference
    // -----------------------------------------------------------------------

    async fn send_chat_message(&self, req: SendChatMessageRequest) -> Result<Value> {
        let turn = ChatTurn {
            message: req.message,
            model: req.model,
            provider: req.provider,
            history: req.history,
            max_tokens: req.max_tokens,
        };
        let response = self
            .host
            .model
            .chat(turn)
            .await
            .map_err(|e| BridgeError::capability(channel::SEND_CHAT_MESSAGE, e.to_string()))?;
        ok_with(channel::SEND_CHAT_MESSAGE, &response)
    }

    async fn run_agent_task(&self, req: RunAgentTaskRequest) -> Result<Value> {
        let turn = AgentTurn {
            prompt: req.prompt,
            model: req.model,
            provider: req.provider,
            tools: req.tools,
            max_steps: req.max_steps,
        };
        let response = self
            .host
            .model
            .agent_task(turn)
            .await
            .map_err(|e| BridgeError::capability(channel::RUN_AGENT_TASK, e.to_string()))?;
        ok_with(channel::RUN_AGENT_TASK, &response)
    }

    async fn start_chat_stream(&self, req: StartChatStreamRequest) -> Result<Value> {
        let Some(cancel) = self.streams.register(&req.stream_id) else {
            return Err(BridgeError::capability(
                channel::START_CHAT_STREAM,
                format!("stream `{}` is already active", req.stream_id),
            ));
        };

        let turn = ChatTurn {
            message: req.message,
            model: req.model,
            provider: req.provider,
            history: req.history,
            max_tokens: None,
        };
        let model = self.host.model.clone();
        let events = self.events.clone();
        let registry = self.streams.clone();
        let stream_id = req.stream_id.clone();

        tokio::spawn(async move {
            match model.stream_chat(turn).await {
                Err(e) => {
                    events.publish(BridgeEvent::ChatError {
                        stream_id: stream_id.clone(),
                        message: bound_message(e.to_string()),
                    });
                }
                Ok(mut tokens) => {
                    let mut reason = StreamEndReason::Complete;
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => {
                                reason = StreamEndReason::Stopped;
                                break;
                            }
                            next = tokens.next() => match next {
                                Some(Ok(delta)) => {
                                    events.publish(BridgeEvent::ChatToken {
                                        stream_id: stream_id.clone(),
                                        delta,
                                    });
                                }
                                Some(Err(e)) => {
                                    events.publish(BridgeEvent::ChatError {
                                        stream_id: stream_id.clone(),
                                        message: bound_message(e.to_string()),
                                    });
                                    registry.remove(&stream_id);
                                    return;
                                }
                                None => break,
                            }
                        }
                    }
                    events.publish(BridgeEvent::ChatDone {
                        stream_id: stream_id.clone(),
                        reason,
                    });
                }
            }
            registry.remove(&stream_id);
        });

        Ok(json!({ "success": true, "streamId": req.stream_id }))
    }

    fn stop_chat_stream(&self, req: StopChatStreamRequest) -> Result<Value> {
        if self.streams.cancel(&req.stream_id) {
            Ok(json!({ "success": true, "streamId": req.stream_id }))
        } else {
            Err(BridgeError::capability(
                channel::STOP_CHAT_STREAM,
                format!("no active stream `{}`", req.stream_id),
            ))
        }
    }

    async fn list_models(&self, req: ListModelsRequest) -> Result<Value> {
        let models = self
            .host
            .model
            .list_models(req.provider)
            .await
            .map_err(|e| BridgeError::capability(channel::LIST_MODELS, e.to_string()))?;
        Ok(json!({ "success": true, "models": models }))
    }

    // -----------------------------------------------------------------------
    // Knowledge store
    // -----------------------------------------------------------------------

    async fn get_knowledge_status(&self) -> Result<Value> {
        let status = self
            .host
            .knowledge
            .status()
            .await
            .map_err(|e| BridgeError::capability(channel::GET_KNOWLEDGE_STATUS, e.to_string()))?;
        ok_with(channel::GET_KNOWLEDGE_STATUS, &status)
    }

    async fn query_knowledge(&self, req: QueryKnowledgeRequest) -> Result<Value> {
        let limit = req.limit.unwrap_or(10);
        let hits = self
            .host
            .knowledge
            .query(&req.query, limit)
            .await
            .map_err(|e| BridgeError::capability(channel::QUERY_KNOWLEDGE, e.to_string()))?;
        Ok(json!({ "success": true, "hits": hits }))
    }

    async fn ingest_knowledge_document(
        &self,
        req: IngestKnowledgeDocumentRequest,
    ) -> Result<Value> {
        let receipt = self
            .host
            .knowledge
            .ingest_document(&req.file_path)
            .await
            .map_err(|e| {
                BridgeError::capability(channel::INGEST_KNOWLEDGE_DOCUMENT, e.to_string())
            })?;
        ok_with(channel::INGEST_KNOWLEDGE_DOCUMENT, &receipt)
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    async fn get_setting(&self, req: GetSettingRequest) -> Result<Value> {
        let value = self
            .host
            .settings
            .get(&req.key)
            .await
            .map_err(|e| BridgeError::capability(channel::GET_SETTING, e.to_string()))?;
        Ok(json!({
            "success": true,
            "key": req.key,
            "value": value.unwrap_or(Value::Null),
        }))
    }

    async fn set_setting(&self, req: SetSettingRequest) -> Result<Value> {
        self.host
            .settings
            .set(&req.key, req.value)
            .await
            .map_err(|e| BridgeError::capability(channel::SET_SETTING, e.to_string()))?;
        Ok(json!({ "success": true, "key": req.key }))
    }

    // -----------------------------------------------------------------------
    // Filesystem & shell
    // -----------------------------------------------------------------------

    async fn read_file(&self, req: quill_types::ReadFileRequest) -> Result<Value> {
        let content = self
            .host
            .files
            .read_file(&req.file_path)
            .await
            .map_err(|e| BridgeError::capability(channel::READ_FILE, e.to_string()))?;
        Ok(json!({ "success": true, "filePath": req.file_path, "content": content }))
    }

    async fn write_file(&self, req: quill_types::WriteFileRequest) -> Result<Value> {
        self.host
            .files
            .write_file(&req.file_path, &req.content)
            .await
            .map_err(|e| BridgeError::capability(channel::WRITE_FILE, e.to_string()))?;
        Ok(json!({ "success": true, "filePath": req.file_path }))
    }

    async fn list_directory(&self, req: quill_types::ListDirectoryRequest) -> Result<Value> {
        let entries = self
            .host
            .files
            .list_directory(&req.dir_path)
            .await
            .map_err(|e| BridgeError::capability(channel::LIST_DIRECTORY, e.to_string()))?;
        Ok(json!({ "success": true, "dirPath": req.dir_path, "entries": entries }))
    }

    async fn create_directory(&self, req: quill_types::CreateDirectoryRequest) -> Result<Value> {
        self.host
            .files
            .create_directory(&req.dir_path)
            .await
            .map_err(|e| BridgeError::capability(channel::CREATE_DIRECTORY, e.to_string()))?;
        Ok(json!({ "success": true, "dirPath": req.dir_path }))
    }

    async fn delete_file(&self, req: quill_types::DeleteFileRequest) -> Result<Value> {
        self.host
            .files
            .delete_file(&req.file_path)
            .await
            .map_err(|e| BridgeError::capability(channel::DELETE_FILE, e.to_string()))?;
        Ok(json!({ "success": true, "filePath": req.file_path }))
    }

    async fn run_shell_command(&self, req: RunShellCommandRequest) -> Result<Value> {
        let timeout_ms = req.timeout_ms.unwrap_or(DEFAULT_SHELL_TIMEOUT_MS);
        let output = self
            .host
            .shell
            .run(&req.command, timeout_ms)
            .await
            .map_err(|e| BridgeError::capability(channel::RUN_SHELL_COMMAND, e.to_string()))?;
        ok_with(channel::RUN_SHELL_COMMAND, &output)
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    fn get_rate_limit_snapshot(&self) -> Result<Value> {
        // The admission check for this very call already ran, so the
        // snapshot always contains its own bucket. Intentional: the
        // diagnostic channel is not exempt.
        Ok(json!({ "success": true, "records": self.admission.snapshot() }))
    }

    fn log_client_error(&self, req: quill_types::LogClientErrorRequest) -> Result<Value> {
        tracing::warn!(
            target: "quill.client",
            context = req.context.as_deref().unwrap_or(""),
            "{}",
            req.message
        );
        Ok(json!({ "success": true }))
    }
}

fn parse<T: DeserializeOwned>(channel_name: &str, sanitized: Value) -> Result<T> {
    serde_json::from_value(sanitized).map_err(|e| {
        tracing::debug!(channel = channel_name, "sanitized payload decode failed: {e}");
        BridgeError::validation(channel_name, "payload decode failed")
    })
}

/// Serialize an operation response and stamp the uniform success marker.
fn ok_with<T: Serialize>(channel_name: &str, response: &T) -> Result<Value> {
    let mut value = serde_json::to_value(response)
        .map_err(|e| BridgeError::capability(channel_name, e.to_string()))?;
    match &mut value {
        Value::Object(map) => {
            map.insert("success".to_string(), Value::Bool(true));
            Ok(value)
        }
        _ => Ok(json!({ "success": true, "result": value })),
    }
}
