//! Spy collaborators for exercising the dispatch path without real hosts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::Value;

use quill_types::{
    AgentTaskResponse, ChatResponse, DirEntryInfo, IngestReceipt, KnowledgeHit, KnowledgeStatus,
    ModelInfo, ProviderId, ShellOutput,
};

use crate::host::{
    AgentTurn, ChatTurn, CommandRunner, FileAccess, HostCapabilities, KnowledgeStore,
    ModelInference, SettingsStore, TokenStream,
};

#[derive(Default)]
pub(crate) struct Counters {
    pub model: AtomicUsize,
    pub knowledge: AtomicUsize,
    pub settings: AtomicUsize,
    pub files: AtomicUsize,
    pub shell: AtomicUsize,
}

impl Counters {
    pub fn model_calls(&self) -> usize {
        self.model.load(Ordering::SeqCst)
    }
    pub fn files_calls(&self) -> usize {
        self.files.load(Ordering::SeqCst)
    }
    pub fn shell_calls(&self) -> usize {
        self.shell.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub(crate) enum StreamMode {
    /// Yield these deltas, then finish.
    Tokens(Vec<&'static str>),
    /// Yield one delta, then stay pending until cancelled.
    Hang,
}

struct SpyModel {
    counters: Arc<Counters>,
    stream_mode: StreamMode,
}

#[async_trait]
impl ModelInference for SpyModel {
    async fn chat(&self, turn: ChatTurn) -> anyhow::Result<ChatResponse> {
        self.counters.model.fetch_add(1, Ordering::SeqCst);
        Ok(ChatResponse {
            response: "pong".to_string(),
            model: turn.model,
            provider: turn
                .provider
                .unwrap_or(ProviderId::Ollama)
                .as_str()
                .to_string(),
        })
    }

    async fn agent_task(&self, _turn: AgentTurn) -> anyhow::Result<AgentTaskResponse> {
        self.counters.model.fetch_add(1, Ordering::SeqCst);
        Ok(AgentTaskResponse {
            response: "done".to_string(),
            steps_used: 1,
        })
    }

    async fn stream_chat(&self, _turn: ChatTurn) -> anyhow::Result<TokenStream> {
        self.counters.model.fetch_add(1, Ordering::SeqCst);
        match &self.stream_mode {
            StreamMode::Tokens(deltas) => {
                let deltas: Vec<anyhow::Result<String>> =
                    deltas.iter().map(|d| Ok(d.to_string())).collect();
                Ok(stream::iter(deltas).boxed())
            }
            StreamMode::Hang => Ok(stream::iter(vec![Ok("a".to_string())])
                .chain(stream::pending())
                .boxed()),
        }
    }

    async fn list_models(&self, _provider: Option<ProviderId>) -> anyhow::Result<Vec<ModelInfo>> {
        self.counters.model.fetch_add(1, Ordering::SeqCst);
        Ok(vec![ModelInfo {
            id: "m1".to_string(),
            provider: "ollama".to_string(),
        }])
    }
}

struct SpyKnowledge {
    counters: Arc<Counters>,
}

#[async_trait]
impl KnowledgeStore for SpyKnowledge {
    async fn status(&self) -> anyhow::Result<KnowledgeStatus> {
        self.counters.knowledge.fetch_add(1, Ordering::SeqCst);
        Ok(KnowledgeStatus {
            state: "ready".to_string(),
            documents: 42,
            last_indexed_at: None,
        })
    }

    async fn query(&self, query: &str, limit: u32) -> anyhow::Result<Vec<KnowledgeHit>> {
        self.counters.knowledge.fetch_add(1, Ordering::SeqCst);
        let _ = limit;
        Ok(vec![KnowledgeHit {
            document_id: "doc-1".to_string(),
            snippet: format!("about: {query}"),
            score: 0.9,
        }])
    }

    async fn ingest_document(&self, file_path: &str) -> anyhow::Result<IngestReceipt> {
        self.counters.knowledge.fetch_add(1, Ordering::SeqCst);
        let _ = file_path;
        Ok(IngestReceipt {
            document_id: "doc-1".to_string(),
            chunks: 3,
        })
    }
}

struct MemorySettings {
    counters: Arc<Counters>,
    data: Mutex<HashMap<String, Value>>,
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        self.counters.settings.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .data
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        self.counters.settings.fetch_add(1, Ordering::SeqCst);
        self.data
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }
}

struct SpyFiles {
    counters: Arc<Counters>,
    fail: bool,
}

impl SpyFiles {
    fn outcome<T>(&self, value: T) -> anyhow::Result<T> {
        self.counters.files.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("no such file or directory");
        }
        Ok(value)
    }
}

#[async_trait]
impl FileAccess for SpyFiles {
    async fn read_file(&self, _path: &str) -> anyhow::Result<String> {
        self.outcome("contents".to_string())
    }

    async fn write_file(&self, _path: &str, _content: &str) -> anyhow::Result<()> {
        self.outcome(())
    }

    async fn list_directory(&self, _path: &str) -> anyhow::Result<Vec<DirEntryInfo>> {
        self.outcome(vec![DirEntryInfo {
            name: "notes.md".to_string(),
            is_dir: false,
            size: 12,
        }])
    }

    async fn create_directory(&self, _path: &str) -> anyhow::Result<()> {
        self.outcome(())
    }

    async fn delete_file(&self, _path: &str) -> anyhow::Result<()> {
        self.outcome(())
    }
}

struct SpyShell {
    counters: Arc<Counters>,
}

#[async_trait]
impl CommandRunner for SpyShell {
    async fn run(&self, _command: &str, _timeout_ms: u64) -> anyhow::Result<ShellOutput> {
        self.counters.shell.fetch_add(1, Ordering::SeqCst);
        Ok(ShellOutput {
            stdout: "hi\n".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            duration_ms: 1,
        })
    }
}

pub(crate) fn spy_host(stream_mode: StreamMode, fail_files: bool) -> (HostCapabilities, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let host = HostCapabilities {
        model: Arc::new(SpyModel {
            counters: counters.clone(),
            stream_mode,
        }),
        knowledge: Arc::new(SpyKnowledge {
            counters: counters.clone(),
        }),
        settings: Arc::new(MemorySettings {
            counters: counters.clone(),
            data: Mutex::new(HashMap::new()),
        }),
        files: Arc::new(SpyFiles {
            counters: counters.clone(),
            fail: fail_files,
        }),
        shell: Arc::new(SpyShell {
            counters: counters.clone(),
        }),
    };
    (host, counters)
}

pub(crate) fn default_spy_host() -> (HostCapabilities, Arc<Counters>) {
    spy_host(StreamMode::Tokens(vec!["he", "ll", "o"]), false)
}
