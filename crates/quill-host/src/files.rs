//! Workspace-rooted filesystem access.
//!
//! Every path from the untrusted side is relative to the workspace root;
//! absolute paths and parent traversal are rejected before any I/O.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use quill_bridge::FileAccess;
use quill_types::DirEntryInfo;

/// Largest file the bridge will read back across the boundary.
const MAX_READ_BYTES: u64 = 1_000_000;

pub struct WorkspaceFiles {
    root: PathBuf,
}

impl WorkspaceFiles {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, raw: &str) -> anyhow::Result<PathBuf> {
        let path = Path::new(raw);
        if path.is_absolute() {
            anyhow::bail!("absolute paths are not allowed");
        }
        if path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            anyhow::bail!("path may not traverse outside the workspace");
        }
        Ok(self.root.join(path))
    }
}

#[async_trait]
impl FileAccess for WorkspaceFiles {
    async fn read_file(&self, path: &str) -> anyhow::Result<String> {
        let resolved = self.resolve(path)?;
        let metadata = fs::metadata(&resolved).await?;
        if metadata.len() > MAX_READ_BYTES {
            anyhow::bail!(
                "file is {} bytes, larger than the {MAX_READ_BYTES} byte read limit",
                metadata.len()
            );
        }
        Ok(fs::read_to_string(&resolved).await?)
    }

    async fn write_file(&self, path: &str, content: &str) -> anyhow::Result<()> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&resolved, content).await?;
        Ok(())
    }

    async fn list_directory(&self, path: &str) -> anyhow::Result<Vec<DirEntryInfo>> {
        let resolved = self.resolve(path)?;
        let mut reader = fs::read_dir(&resolved).await?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let metadata = entry.metadata().await?;
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: metadata.is_dir(),
                size: metadata.len(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn create_directory(&self, path: &str) -> anyhow::Result<()> {
        let resolved = self.resolve(path)?;
        fs::create_dir_all(&resolved).await?;
        Ok(())
    }

    async fn delete_file(&self, path: &str) -> anyhow::Result<()> {
        let resolved = self.resolve(path)?;
        let metadata = fs::symlink_metadata(&resolved).await?;
        if metadata.is_dir() {
            anyhow::bail!("refusing to delete a directory through deleteFile");
        }
        fs::remove_file(&resolved).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> (tempfile::TempDir, WorkspaceFiles) {
        let dir = tempfile::tempdir().unwrap();
        let files = WorkspaceFiles::new(dir.path());
        (dir, files)
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (_dir, files) = workspace();
        files.write_file("notes/today.md", "hello").await.unwrap();
        let content = files.read_file("notes/today.md").await.unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn absolute_paths_are_rejected() {
        let (_dir, files) = workspace();
        let err = files.read_file("/etc/passwd").await.unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[tokio::test]
    async fn parent_traversal_is_rejected() {
        let (_dir, files) = workspace();
        let err = files.read_file("../outside.txt").await.unwrap_err();
        assert!(err.to_string().contains("outside the workspace"));
        let err = files.write_file("a/../../b.txt", "x").await.unwrap_err();
        assert!(err.to_string().contains("outside the workspace"));
    }

    #[tokio::test]
    async fn oversized_files_are_not_read() {
        let (dir, files) = workspace();
        let big = "x".repeat((MAX_READ_BYTES + 1) as usize);
        std::fs::write(dir.path().join("big.txt"), big).unwrap();
        let err = files.read_file("big.txt").await.unwrap_err();
        assert!(err.to_string().contains("read limit"));
    }

    #[tokio::test]
    async fn list_directory_reports_entries_sorted() {
        let (_dir, files) = workspace();
        files.write_file("b.txt", "b").await.unwrap();
        files.write_file("a.txt", "a").await.unwrap();
        files.create_directory("sub").await.unwrap();

        let entries = files.list_directory(".").await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert!(entries[2].is_dir);
    }

    #[tokio::test]
    async fn delete_file_refuses_directories() {
        let (_dir, files) = workspace();
        files.create_directory("sub").await.unwrap();
        let err = files.delete_file("sub").await.unwrap_err();
        assert!(err.to_string().contains("directory"));

        files.write_file("gone.txt", "x").await.unwrap();
        files.delete_file("gone.txt").await.unwrap();
        assert!(files.read_file("gone.txt").await.is_err());
    }
}
