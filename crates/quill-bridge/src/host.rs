//! Contracts for the host collaborators reachable through the bridge.
//!
//! The dispatcher forwards sanitized payloads to these traits and nothing
//! else. Implementations live host-side (`quill-host`); the untrusted side
//! never holds a reference to any of them.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use quill_types::{
    AgentTaskResponse, ChatMessageEntry, ChatResponse, DirEntryInfo, IngestReceipt, KnowledgeHit,
    KnowledgeStatus, ModelInfo, ProviderId, ShellOutput,
};

/// Token deltas produced by a streaming generation.
pub type TokenStream = BoxStream<'static, anyhow::Result<String>>;

/// One validated chat turn, ready to forward to a model provider.
#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub message: String,
    pub model: String,
    pub provider: Option<ProviderId>,
    pub history: Vec<ChatMessageEntry>,
    pub max_tokens: Option<u32>,
}

/// One validated bounded agent task.
#[derive(Debug, Clone)]
pub struct AgentTurn {
    pub prompt: String,
    pub model: String,
    pub provider: Option<ProviderId>,
    pub tools: Vec<String>,
    pub max_steps: u32,
}

#[async_trait]
pub trait ModelInference: Send + Sync {
    async fn chat(&self, turn: ChatTurn) -> anyhow::Result<ChatResponse>;

    async fn agent_task(&self, turn: AgentTurn) -> anyhow::Result<AgentTaskResponse>;

    /// Begin a streaming generation. The returned stream yields token deltas
    /// until the generation finishes or the caller drops it.
    async fn stream_chat(&self, turn: ChatTurn) -> anyhow::Result<TokenStream>;

    async fn list_models(&self, provider: Option<ProviderId>) -> anyhow::Result<Vec<ModelInfo>>;
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn status(&self) -> anyhow::Result<KnowledgeStatus>;

    async fn query(&self, query: &str, limit: u32) -> anyhow::Result<Vec<KnowledgeHit>>;

    async fn ingest_document(&self, file_path: &str) -> anyhow::Result<IngestReceipt>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()>;
}

#[async_trait]
pub trait FileAccess: Send + Sync {
    async fn read_file(&self, path: &str) -> anyhow::Result<String>;

    async fn write_file(&self, path: &str, content: &str) -> anyhow::Result<()>;

    async fn list_directory(&self, path: &str) -> anyhow::Result<Vec<DirEntryInfo>>;

    async fn create_directory(&self, path: &str) -> anyhow::Result<()>;

    async fn delete_file(&self, path: &str) -> anyhow::Result<()>;
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a shell command, enforcing the given timeout host-side.
    async fn run(&self, command: &str, timeout_ms: u64) -> anyhow::Result<ShellOutput>;
}

/// The full set of collaborators the dispatcher can forward to.
#[derive(Clone)]
pub struct HostCapabilities {
    pub model: Arc<dyn ModelInference>,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub files: Arc<dyn FileAccess>,
    pub shell: Arc<dyn CommandRunner>,
}
