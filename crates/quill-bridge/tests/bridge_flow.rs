//! End-to-end flow over the public bridge API: expose the surface against a
//! mock untrusted context, then drive calls and subscriptions the way a
//! renderer would.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};

use quill_bridge::{
    crash_channel, AgentTurn, ChatTurn, CommandRunner, Dispatcher, ExposedSurface,
    ExposureController, FileAccess, HostCapabilities, KnowledgeStore, ModelInference,
    SettingsStore, TokenStream, UntrustedContext,
};
use quill_types::{
    AgentTaskResponse, BridgeError, BridgeEvent, ChatResponse, DirEntryInfo, IngestReceipt,
    KnowledgeHit, KnowledgeStatus, ModelInfo, ProviderId, ShellOutput, CHAT_STREAM_CHANNEL,
};

struct StubModel;

#[async_trait]
impl ModelInference for StubModel {
    async fn chat(&self, turn: ChatTurn) -> anyhow::Result<ChatResponse> {
        Ok(ChatResponse {
            response: format!("echo: {}", turn.message),
            model: turn.model,
            provider: "ollama".to_string(),
        })
    }

    async fn agent_task(&self, _turn: AgentTurn) -> anyhow::Result<AgentTaskResponse> {
        Ok(AgentTaskResponse {
            response: "done".to_string(),
            steps_used: 1,
        })
    }

    async fn stream_chat(&self, _turn: ChatTurn) -> anyhow::Result<TokenStream> {
        let deltas: Vec<anyhow::Result<String>> =
            vec![Ok("to".to_string()), Ok("ken".to_string())];
        Ok(stream::iter(deltas).boxed())
    }

    async fn list_models(&self, _provider: Option<ProviderId>) -> anyhow::Result<Vec<ModelInfo>> {
        Ok(vec![ModelInfo {
            id: "m1".to_string(),
            provider: "ollama".to_string(),
        }])
    }
}

struct StubKnowledge;

#[async_trait]
impl KnowledgeStore for StubKnowledge {
    async fn status(&self) -> anyhow::Result<KnowledgeStatus> {
        Ok(KnowledgeStatus {
            state: "ready".to_string(),
            documents: 7,
            last_indexed_at: None,
        })
    }

    async fn query(&self, _query: &str, _limit: u32) -> anyhow::Result<Vec<KnowledgeHit>> {
        Ok(Vec::new())
    }

    async fn ingest_document(&self, _file_path: &str) -> anyhow::Result<IngestReceipt> {
        Ok(IngestReceipt {
            document_id: "d1".to_string(),
            chunks: 1,
        })
    }
}

struct StubSettings;

#[async_trait]
impl SettingsStore for StubSettings {
    async fn get(&self, _key: &str) -> anyhow::Result<Option<Value>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Value) -> anyhow::Result<()> {
        Ok(())
    }
}

struct StubFiles {
    reads: AtomicUsize,
}

#[async_trait]
impl FileAccess for StubFiles {
    async fn read_file(&self, _path: &str) -> anyhow::Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok("content".to_string())
    }

    async fn write_file(&self, _path: &str, _content: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn list_directory(&self, _path: &str) -> anyhow::Result<Vec<DirEntryInfo>> {
        Ok(Vec::new())
    }

    async fn create_directory(&self, _path: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn delete_file(&self, _path: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

struct StubShell;

#[async_trait]
impl CommandRunner for StubShell {
    async fn run(&self, _command: &str, _timeout_ms: u64) -> anyhow::Result<ShellOutput> {
        Ok(ShellOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
            duration_ms: 0,
        })
    }
}

struct PassiveContext;

impl UntrustedContext for PassiveContext {
    fn isolation_active(&self) -> bool {
        true
    }

    fn publish_surface(&self, _global: &str, _surface: ExposedSurface) -> anyhow::Result<()> {
        Ok(())
    }

    fn render_fatal(&self, _message: &str) {}
}

fn exposed_surface() -> (ExposedSurface, Arc<StubFiles>) {
    let files = Arc::new(StubFiles {
        reads: AtomicUsize::new(0),
    });
    let host = HostCapabilities {
        model: Arc::new(StubModel),
        knowledge: Arc::new(StubKnowledge),
        settings: Arc::new(StubSettings),
        files: files.clone(),
        shell: Arc::new(StubShell),
    };
    let (crash, _crash_rx) = crash_channel();
    let controller = ExposureController::new(crash);
    let surface = controller
        .expose(&PassiveContext, Arc::new(Dispatcher::new(host)))
        .expect("exposure must succeed with isolation active");
    (surface, files)
}

#[tokio::test]
async fn chat_round_trip_through_the_exposed_surface() {
    let (surface, _) = exposed_surface();
    let result = surface
        .invoke(
            "sendChatMessage",
            json!({ "message": "hi", "model": "m1", "history": [] }),
        )
        .await
        .unwrap();
    assert_eq!(result["success"], true);
    assert_eq!(result["response"], "echo: hi");
}

#[tokio::test]
async fn rejected_payloads_never_reach_the_host() {
    let (surface, files) = exposed_surface();
    let err = surface
        .invoke("readFile", json!({ "filePath": "a".repeat(501) }))
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::Validation { .. }));
    assert_eq!(files.reads.load(Ordering::SeqCst), 0);

    surface
        .invoke("readFile", json!({ "filePath": "notes.md" }))
        .await
        .unwrap();
    assert_eq!(files.reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn subscription_streams_tokens_from_an_invoked_generation() {
    let (surface, _) = exposed_surface();
    let collected: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = collected.clone();
    let sub = surface.subscribe(CHAT_STREAM_CHANNEL, move |event| {
        if let BridgeEvent::ChatToken { delta, .. } = event {
            sink.lock().unwrap().push(delta);
        }
    });

    surface
        .invoke(
            "startChatStream",
            json!({ "streamId": "s1", "message": "hi", "model": "m1" }),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(*collected.lock().unwrap(), vec!["to", "ken"]);
    sub.dispose();
    sub.dispose();
    assert!(sub.is_disposed());
}

#[tokio::test]
async fn channel_vocabulary_is_enumerable_and_closed() {
    let (surface, _) = exposed_surface();
    let channels = surface.channels();
    assert!(channels.contains(&"runShellCommand"));
    assert!(!channels.contains(&"openDevTools"));

    let err = surface.invoke("openDevTools", json!({})).await.unwrap_err();
    assert!(matches!(err, BridgeError::UnknownChannel(_)));
}
