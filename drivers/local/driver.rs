use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader};

use crate::storage::meta::{self, sidecar_path};
use crate::storage::{resolve_range, BoxReader, FileInfo, Metadata, Result, Store, StoreError, DEFAULT_PERM};

/// Copy buffer for `stream_to_file` (1MB) / 流式写入缓冲区
const STREAM_BUFFER_SIZE: usize = 1024 * 1024;

/// Local driver configuration / 本地驱动配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Paths are resolved under this directory when set; otherwise they are
    /// used as given (relative to the working directory) / 根目录（可选）
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Permission bits for created files and directories (unix, before umask) / 创建权限
    #[serde(default = "default_perm")]
    pub perm: u32,
}

fn default_perm() -> u32 {
    DEFAULT_PERM
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self { root: None, perm: default_perm() }
    }
}

pub struct LocalDriver {
    root: Option<PathBuf>,
    perm: u32,
}

impl LocalDriver {
    pub fn new(config: LocalConfig) -> Result<Self> {
        let root = match config.root {
            Some(root) => {
                if !root.exists() {
                    std::fs::create_dir_all(&root)?;
                }
                Some(root.canonicalize()?)
            }
            None => None,
        };
        Ok(Self { root, perm: config.perm })
    }

    /// Get root directory / 获取根目录
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Map a store path to a filesystem path, rejecting traversal outside the root / 规范化路径
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let root = match &self.root {
            Some(root) => root,
            None => return Ok(PathBuf::from(path)),
        };

        let path = path.trim_start_matches('/').replace('\\', "/");
        let normalized: Vec<&str> = path.split('/').filter(|s| !s.is_empty() && *s != ".").collect();
        if normalized.iter().any(|c| *c == "..") {
            return Err(StoreError::InvalidPath(format!("{} escapes the root directory", path)));
        }

        Ok(root.join(normalized.join("/")))
    }

    async fn create(&self, path: &Path) -> std::io::Result<tokio::fs::File> {
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(self.perm);
        options.open(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut file = self.create(path).await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    async fn size_of(path: &Path) -> Option<u64> {
        tokio::fs::metadata(path).await.ok().map(|m| m.len())
    }

    async fn exists_non_empty(path: &Path) -> bool {
        matches!(Self::size_of(path).await, Some(size) if size > 0)
    }
}

fn file_info(path: &Path, metadata: &std::fs::Metadata) -> FileInfo {
    let is_dir = metadata.is_dir();

    #[cfg(unix)]
    let mode = {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o7777
    };
    #[cfg(not(unix))]
    let mode = if is_dir {
        crate::storage::DEFAULT_DIR_MODE
    } else {
        crate::storage::DEFAULT_FILE_MODE
    };

    FileInfo {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        size: metadata.len(),
        modified: metadata.modified().ok().map(chrono::DateTime::from),
        is_dir,
        mode,
    }
}

#[async_trait]
impl Store for LocalDriver {
    fn name(&self) -> &str {
        "local"
    }

    async fn is_exist(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(full_path) => Self::exists_non_empty(&full_path).await,
            Err(_) => false,
        }
    }

    async fn create_file(&self, path: &str, data: &[u8], meta: Option<&Metadata>) -> Result<()> {
        if let Some(meta) = meta {
            let meta_path = self.resolve(&sidecar_path(path))?;
            self.write(&meta_path, &meta::encode(meta)).await?;
        }
        let full_path = self.resolve(path)?;
        self.write(&full_path, data).await
    }

    async fn stream_to_file(&self, stream: BoxReader, path: &str) -> Result<()> {
        let full_path = self.resolve(path)?;
        let mut file = self.create(&full_path).await?;
        let mut reader = BufReader::with_capacity(STREAM_BUFFER_SIZE, stream);

        let written = tokio::io::copy_buf(&mut reader, &mut file).await?;
        file.flush().await?;

        tracing::debug!("Local stream written: {:?} ({} bytes)", full_path, written);
        Ok(())
    }

    async fn get_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let full_path = self.resolve(path)?;
        if !Self::exists_non_empty(&full_path).await {
            return Ok(None);
        }
        Ok(Some(tokio::fs::read(&full_path).await?))
    }

    async fn get_file_partially(&self, path: &str, offset: u64, length: i64) -> Result<Option<Vec<u8>>> {
        let full_path = self.resolve(path)?;
        let size = match Self::size_of(&full_path).await {
            Some(size) if size > 0 => size,
            _ => return Ok(None),
        };

        let (start, len) = resolve_range(offset, length, size);
        let mut buf = Vec::with_capacity(len as usize);
        if len > 0 {
            let mut file = tokio::fs::File::open(&full_path).await?;
            file.seek(SeekFrom::Start(start)).await?;
            file.take(len).read_to_end(&mut buf).await?;
        }
        Ok(Some(buf))
    }

    async fn file_reader(&self, path: &str, offset: u64, length: i64) -> Result<BoxReader> {
        let full_path = self.resolve(path)?;
        let mut file = tokio::fs::File::open(&full_path).await?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }

        if length > 0 {
            Ok(Box::new(file.take(length as u64)))
        } else {
            Ok(Box::new(file))
        }
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        let meta_path = self.resolve(&sidecar_path(path))?;
        if let Err(e) = tokio::fs::remove_file(&meta_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove metadata {:?}: {}", meta_path, e);
            }
        }

        let full_path = self.resolve(path)?;
        tokio::fs::remove_file(&full_path).await?;
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<(FileInfo, Option<Metadata>)> {
        let full_path = self.resolve(path)?;
        let metadata = tokio::fs::metadata(&full_path).await?;
        let info = file_info(&full_path, &metadata);

        let meta_path = self.resolve(&sidecar_path(path))?;
        if !Self::exists_non_empty(&meta_path).await {
            return Ok((info, None));
        }

        let raw = tokio::fs::read(&meta_path).await?;
        Ok((info, Some(meta::decode(&raw))))
    }

    async fn clear_dir(&self, path: &str) -> Result<()> {
        let full_path = self.resolve(path)?;
        let mut entries = tokio::fs::read_dir(&full_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let entry_path = entry.path();
            if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&entry_path).await?;
            } else {
                tokio::fs::remove_file(&entry_path).await?;
            }
        }

        Ok(())
    }

    async fn mkdir_all(&self, path: &str) -> Result<()> {
        let full_path = self.resolve(path)?;
        let mut builder = tokio::fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(self.perm);
        builder.create(&full_path).await?;
        Ok(())
    }
}
