//! Local filesystem backend confined to a sandbox root.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, instrument};

use crate::error::{Result, StorageError};
use crate::path::SandboxRoot;
use crate::traits::{DirEntry, FileStore};

const HASH_CHUNK: usize = 64 * 1024;

/// File store backed by a directory on local disk.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: SandboxRoot,
}

impl LocalFileStore {
    pub fn new(root: SandboxRoot) -> Self {
        Self { root }
    }

    /// The sandbox this store is confined to.
    pub fn root(&self) -> &SandboxRoot {
        &self.root
    }

    /// Ensure parent directories exist for a path.
    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

/// Map an I/O `NotFound` to the storage-level variant, keeping the
/// client-facing path in the message.
fn not_found(requested: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(requested.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    #[instrument(skip(self), fields(path = %path))]
    async fn read(&self, path: &str) -> Result<String> {
        let fs_path = self.root.resolve(path).await?;
        debug!("Reading {:?}", fs_path);
        fs::read_to_string(&fs_path).await.map_err(not_found(path))
    }

    #[instrument(skip(self, content), fields(path = %path, size = content.len()))]
    async fn write(&self, path: &str, content: &str) -> Result<()> {
        let fs_path = self.root.resolve(path).await?;
        self.ensure_parent(&fs_path).await?;

        debug!("Writing {} bytes to {:?}", content.len(), fs_path);
        fs::write(&fs_path, content).await?;
        Ok(())
    }

    #[instrument(skip(self, content), fields(path = %path, size = content.len()))]
    async fn append(&self, path: &str, content: &str) -> Result<()> {
        let fs_path = self.root.resolve(path).await?;
        self.ensure_parent(&fs_path).await?;

        debug!("Appending {} bytes to {:?}", content.len(), fs_path);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&fs_path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let fs_path = self.root.resolve(path).await?;
        let metadata = fs::metadata(&fs_path).await.map_err(not_found(path))?;
        if !metadata.is_dir() {
            return Err(StorageError::NotADirectory(path.to_string()));
        }

        let mut entries = fs::read_dir(&fs_path).await?;
        let mut results = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            results.push(DirEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_directory: file_type.is_dir(),
            });
        }
        results.sort_by(|a, b| a.name.cmp(&b.name));

        debug!("Listed {} entries in {:?}", results.len(), fs_path);
        Ok(results)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn delete(&self, path: &str) -> Result<()> {
        let fs_path = self.root.resolve(path).await?;
        if fs_path == self.root.path() {
            return Err(StorageError::InvalidPath(
                "refusing to delete the workspace root".to_string(),
            ));
        }

        let metadata = fs::symlink_metadata(&fs_path)
            .await
            .map_err(not_found(path))?;
        debug!("Deleting {:?}", fs_path);
        if metadata.is_dir() {
            fs::remove_dir(&fs_path).await?;
        } else {
            fs::remove_file(&fs_path).await?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn make_dir(&self, path: &str) -> Result<()> {
        let fs_path = self.root.resolve(path).await?;
        debug!("Creating directory {:?}", fs_path);
        fs::create_dir_all(&fs_path).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn hash(&self, path: &str) -> Result<String> {
        let fs_path = self.root.resolve(path).await?;
        let mut file = fs::File::open(&fs_path).await.map_err(not_found(path))?;

        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; HASH_CHUNK];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalFileStore) {
        let temp = TempDir::new().unwrap();
        let root = SandboxRoot::open(temp.path(), false).unwrap();
        (temp, LocalFileStore::new(root))
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let (_temp, store) = store();
        store.write("notes/today.md", "# hello\n").await.unwrap();
        assert_eq!(store.read("notes/today.md").await.unwrap(), "# hello\n");
    }

    #[tokio::test]
    async fn test_hash_matches_sha256_of_content() {
        let (_temp, store) = store();
        store.write("a.txt", "abc").await.unwrap();
        assert_eq!(
            store.hash("a.txt").await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_append_creates_and_extends() {
        let (_temp, store) = store();
        store.append("log.txt", "one\n").await.unwrap();
        store.append("log.txt", "two\n").await.unwrap();
        assert_eq!(store.read("log.txt").await.unwrap(), "one\ntwo\n");
    }

    #[tokio::test]
    async fn test_list_sorted_with_dirs() {
        let (_temp, store) = store();
        store.write("b.txt", "b").await.unwrap();
        store.write("a.txt", "a").await.unwrap();
        store.make_dir("sub").await.unwrap();

        let entries = store.list(".").await.unwrap();
        assert_eq!(
            entries,
            vec![
                DirEntry { name: "a.txt".into(), is_directory: false },
                DirEntry { name: "b.txt".into(), is_directory: false },
                DirEntry { name: "sub".into(), is_directory: true },
            ]
        );
    }

    #[tokio::test]
    async fn test_list_file_is_not_directory() {
        let (_temp, store) = store();
        store.write("a.txt", "a").await.unwrap();
        let err = store.list("a.txt").await.unwrap_err();
        assert!(matches!(err, StorageError::NotADirectory(_)));
    }

    #[tokio::test]
    async fn test_read_missing() {
        let (_temp, store) = store();
        let err = store.read("missing.txt").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Path not found: missing.txt");
    }

    #[tokio::test]
    async fn test_delete_file_and_empty_dir() {
        let (temp, store) = store();
        store.write("gone.txt", "x").await.unwrap();
        store.make_dir("empty").await.unwrap();

        store.delete("gone.txt").await.unwrap();
        store.delete("empty").await.unwrap();
        assert!(!temp.path().join("gone.txt").exists());
        assert!(!temp.path().join("empty").exists());

        assert!(store.delete("gone.txt").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_root_refused() {
        let (temp, store) = store();
        let err = store.delete(".").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidPath(_)));
        assert!(temp.path().exists());
    }

    #[tokio::test]
    async fn test_write_outside_root_leaves_no_file() {
        let (temp, store) = store();
        let err = store.write("../outside", "nope").await.unwrap_err();
        assert!(err.is_outside_root());
        let parent = temp.path().parent().unwrap();
        assert!(!parent.join("outside").exists());
    }
}
