//! Headless host shell for the Quill command bridge.
//!
//! Speaks JSON lines over stdio: one request object per line in
//! (`{"id", "channel", "payload"}`), one response object per line out.
//! Push events are forwarded as `{"event": ...}` lines. The desktop webview
//! shell wires the same surface into its isolated renderer; this binary is
//! the development and integration harness for everything behind it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};

use quill_bridge::{
    crash_channel, Dispatcher, ExposedSurface, ExposureController, UntrustedContext,
};
use quill_host::HostConfig;
use quill_observability::init_process_logging;
use quill_types::CHAT_STREAM_CHANNEL;

#[derive(Parser, Debug)]
#[command(name = "quill-shell")]
#[command(about = "Headless host shell for the Quill command bridge")]
struct Cli {
    /// Workspace directory exposed through the filesystem capability.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Path to the host config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// State directory for settings and logs.
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

/// The stdio rendition of the untrusted context. Process separation is the
/// isolation boundary here; `QUILL_BRIDGE_ISOLATION=off` exists so the
/// fail-closed startup path can be exercised end-to-end.
struct StdioContext {
    isolated: bool,
}

impl StdioContext {
    fn new() -> Self {
        let isolated = !matches!(
            std::env::var("QUILL_BRIDGE_ISOLATION").as_deref(),
            Ok("off") | Ok("0") | Ok("false")
        );
        Self { isolated }
    }
}

impl UntrustedContext for StdioContext {
    fn isolation_active(&self) -> bool {
        self.isolated
    }

    fn publish_surface(&self, global_name: &str, surface: ExposedSurface) -> anyhow::Result<()> {
        // The peer on the other end of stdio learns the vocabulary from the
        // ready line; the surface handle itself stays in this process.
        println!(
            "{}",
            json!({
                "event": "ready",
                "global": global_name,
                "channels": surface.channels(),
            })
        );
        Ok(())
    }

    fn render_fatal(&self, message: &str) {
        println!("{}", json!({ "event": "fatal", "message": message }));
        eprintln!("{message}");
    }
}

#[derive(Debug, Deserialize)]
struct WireRequest {
    #[serde(default)]
    id: Option<Value>,
    channel: String,
    #[serde(default)]
    payload: Value,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = HostConfig::load(cli.config.as_deref()).await?;
    if let Some(workspace) = cli.workspace {
        config.workspace_root = workspace;
    }
    if let Some(state_dir) = cli.state_dir {
        config.state_dir = state_dir;
    }

    let (_guard, log_info) =
        init_process_logging("shell", &config.logs_dir(), config.log_retention_days)?;
    tracing::info!(logs_dir = %log_info.logs_dir, "quill-shell starting");

    let host = quill_host::standard_host(&config)
        .await
        .context("host capability setup failed")?;
    let dispatcher = Arc::new(Dispatcher::new(host));

    let (crash_reporter, mut crash_rx) = crash_channel();
    tokio::spawn(async move {
        while let Some(report) = crash_rx.recv().await {
            tracing::error!(
                stage = %report.stage,
                message = %report.message,
                "bridge exposure crash reported"
            );
        }
    });

    let controller = ExposureController::new(crash_reporter);
    let ctx = StdioContext::new();
    let surface = match controller.expose(&ctx, dispatcher) {
        Ok(surface) => surface,
        Err(e) => {
            // Fail closed: no capability is reachable from here on.
            tracing::error!(error = %e, "bridge exposure refused; shutting down");
            std::process::exit(1);
        }
    };

    // Forward push events to the untrusted peer.
    let _events = surface.subscribe(CHAT_STREAM_CHANNEL, |event| {
        if let Ok(line) = serde_json::to_string(&json!({ "event": event })) {
            println!("{line}");
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        let request: WireRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(_) => {
                println!("{}", json!({ "error": "malformed request line" }));
                continue;
            }
        };

        let surface = surface.clone();
        tokio::spawn(async move {
            let outcome = match surface.invoke(&request.channel, request.payload).await {
                Ok(result) => result,
                Err(e) => e.to_wire(),
            };
            let response = json!({ "id": request.id, "result": outcome });
            println!("{response}");
        });
    }

    tracing::info!("stdin closed; quill-shell exiting");
    Ok(())
}
