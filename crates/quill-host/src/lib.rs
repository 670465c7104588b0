// Quill host capabilities
//
// Default implementations of the collaborator contracts the bridge forwards
// to: model inference, knowledge store, settings persistence, workspace
// filesystem access and bounded shell execution.

mod config;
mod files;
mod knowledge;
mod model;
mod settings;
mod shell;

use std::sync::Arc;

use quill_bridge::HostCapabilities;

pub use config::{HostConfig, ProviderSettings, ProvidersConfig};
pub use files::WorkspaceFiles;
pub use knowledge::KnowledgeClient;
pub use model::ProviderRouter;
pub use settings::JsonSettings;
pub use shell::HostShell;

/// Wire up the standard host collaborators from one config.
pub async fn standard_host(config: &HostConfig) -> anyhow::Result<HostCapabilities> {
    let settings = JsonSettings::open(config.settings_path()).await?;
    Ok(HostCapabilities {
        model: Arc::new(ProviderRouter::new(config.providers.clone())),
        knowledge: Arc::new(KnowledgeClient::new(
            &config.knowledge_url,
            config.knowledge_token.clone(),
        )),
        settings: Arc::new(settings),
        files: Arc::new(WorkspaceFiles::new(&config.workspace_root)),
        shell: Arc::new(HostShell::new(&config.workspace_root)),
    })
}
