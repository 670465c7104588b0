//! Small JSON blob persistence for user settings.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use quill_bridge::SettingsStore;

pub struct JsonSettings {
    path: PathBuf,
    cache: RwLock<Map<String, Value>>,
}

impl JsonSettings {
    /// Open (or create) the settings file at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let cache = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Map<String, Value>>(&bytes).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "settings file unreadable, starting empty: {e}");
                Map::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            cache: RwLock::new(cache),
        })
    }

    async fn persist(&self, snapshot: &Map<String, Value>) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for JsonSettings {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
        Ok(self.cache.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> anyhow::Result<()> {
        let snapshot = {
            let mut cache = self.cache.write().await;
            cache.insert(key.to_string(), value);
            cache.clone()
        };
        self.persist(&snapshot).await
    }
}
