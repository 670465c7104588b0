//! Host configuration: one JSON file plus environment overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use quill_types::ProviderId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    #[serde(default)]
    pub enabled: bool,
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub default_model: Option<String>,
}

impl ProviderSettings {
    fn disabled(endpoint: &str) -> Self {
        Self {
            enabled: false,
            endpoint: endpoint.to_string(),
            api_key: None,
            default_model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersConfig {
    #[serde(default = "default_openai")]
    pub openai: ProviderSettings,
    #[serde(default = "default_anthropic")]
    pub anthropic: ProviderSettings,
    #[serde(default = "default_ollama")]
    pub ollama: ProviderSettings,
    #[serde(default)]
    pub default_provider: Option<ProviderId>,
}

fn default_openai() -> ProviderSettings {
    ProviderSettings::disabled("https://api.openai.com")
}

fn default_anthropic() -> ProviderSettings {
    ProviderSettings::disabled("https://api.anthropic.com")
}

fn default_ollama() -> ProviderSettings {
    ProviderSettings {
        // Local by default; no key needed.
        enabled: true,
        endpoint: "http://localhost:11434".to_string(),
        api_key: None,
        default_model: Some("llama3.2".to_string()),
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            openai: default_openai(),
            anthropic: default_anthropic(),
            ollama: default_ollama(),
            default_provider: None,
        }
    }
}

impl ProvidersConfig {
    pub fn settings(&self, provider: ProviderId) -> &ProviderSettings {
        match provider {
            ProviderId::Openai => &self.openai,
            ProviderId::Anthropic => &self.anthropic,
            ProviderId::Ollama => &self.ollama,
        }
    }

    fn settings_mut(&mut self, provider: ProviderId) -> &mut ProviderSettings {
        match provider {
            ProviderId::Openai => &mut self.openai,
            ProviderId::Anthropic => &mut self.anthropic,
            ProviderId::Ollama => &mut self.ollama,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    #[serde(default = "default_workspace")]
    pub workspace_root: PathBuf,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_knowledge_url")]
    pub knowledge_url: String,
    #[serde(default)]
    pub knowledge_token: Option<String>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default = "default_retention")]
    pub log_retention_days: u64,
}

fn default_workspace() -> PathBuf {
    PathBuf::from(".")
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("quill")
}

fn default_knowledge_url() -> String {
    "http://127.0.0.1:4821".to_string()
}

fn default_retention() -> u64 {
    7
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            workspace_root: default_workspace(),
            state_dir: default_state_dir(),
            knowledge_url: default_knowledge_url(),
            knowledge_token: None,
            providers: ProvidersConfig::default(),
            log_retention_days: default_retention(),
        }
    }
}

impl HostConfig {
    /// Load from `path` (or the default location) and apply environment
    /// overrides. A missing file yields the defaults.
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_state_dir().join("config.json"));

        let mut config = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HostConfig::default(),
            Err(e) => return Err(e.into()),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(workspace) = std::env::var("QUILL_WORKSPACE") {
            self.workspace_root = PathBuf::from(workspace);
        }
        if let Ok(state_dir) = std::env::var("QUILL_STATE_DIR") {
            self.state_dir = PathBuf::from(state_dir);
        }
        if let Ok(url) = std::env::var("QUILL_KNOWLEDGE_URL") {
            self.knowledge_url = url;
        }
        if let Ok(token) = std::env::var("QUILL_KNOWLEDGE_TOKEN") {
            self.knowledge_token = Some(token);
        }

        // API keys come from the environment, never from the config file.
        let mappings = [
            (ProviderId::Openai, "OPENAI_API_KEY"),
            (ProviderId::Anthropic, "ANTHROPIC_API_KEY"),
        ];
        for (provider, var) in mappings {
            if let Ok(key) = std::env::var(var) {
                if !key.is_empty() {
                    let settings = self.providers.settings_mut(provider);
                    settings.api_key = Some(key);
                    settings.enabled = true;
                }
            }
        }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.state_dir.join("settings.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }
}
