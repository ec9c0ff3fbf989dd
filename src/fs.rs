//! Filesystem-style surface over one backend / 文件系统接口

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};

use crate::config::{BackendConfig, ReadAheadMode};
use crate::error::{Error, Result};
use crate::fetch::RangeFetcher;
use crate::metadata::MetadataEngine;
use crate::storage::{BackendBox, BackendRegistry, ByteRange, ObjectInfo, RangeRequest};
use crate::upload::UploadSession;

/// Object store client bound to one protocol and configuration / 文件系统
pub struct FileSystem {
    config: BackendConfig,
    backend: BackendBox,
    fetcher: Arc<RangeFetcher>,
    metadata: Arc<MetadataEngine>,
}

impl FileSystem {
    /// Build with the built-in drivers / 使用内置驱动创建
    pub fn new(protocol: &str, config: BackendConfig) -> Result<Self> {
        Self::with_registry(&BackendRegistry::default(), protocol, config)
    }

    pub fn with_registry(registry: &BackendRegistry, protocol: &str, config: BackendConfig) -> Result<Self> {
        let backend = registry.create_backend(protocol, &config)?;
        tracing::debug!("FileSystem ready: protocol={} backend={}", protocol, backend.name());
        Ok(Self::with_backend(backend, config))
    }

    /// Wrap an existing backend instance / 包装已有后端
    pub fn with_backend(backend: BackendBox, config: BackendConfig) -> Self {
        Self {
            fetcher: Arc::new(RangeFetcher::new(backend.clone(), &config)),
            metadata: Arc::new(MetadataEngine::new(backend.clone(), &config)),
            backend,
            config,
        }
    }

    pub fn backend(&self) -> &BackendBox {
        &self.backend
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Bytes `[start, end)` of one object; `(0, 0)` reads it whole / 读取范围
    pub async fn cat(&self, path: &str, start: u64, end: u64) -> Result<Bytes> {
        self.fetcher.fetch(path, ByteRange::new(start, end)).await
    }

    /// Parallel ranged reads, results in input order / 并发范围读取
    pub async fn cat_ranges(&self, paths: &[String], starts: &[u64], ends: &[u64]) -> Result<Vec<Bytes>> {
        if paths.len() != starts.len() || paths.len() != ends.len() {
            return Err(Error::Protocol(format!(
                "cat_ranges needs equal lengths, got {} paths, {} starts, {} ends",
                paths.len(),
                starts.len(),
                ends.len()
            )));
        }
        let requests: Vec<RangeRequest> = paths
            .iter()
            .zip(starts.iter().zip(ends.iter()))
            .map(|(path, (start, end))| RangeRequest::new(path.as_str(), *start, *end))
            .collect();
        self.fetcher.fetch_all(&requests).await
    }

    /// Whole objects keyed by path / 批量读取整个对象
    pub async fn cat_many(&self, paths: &[String]) -> Result<HashMap<String, Bytes>> {
        let requests: Vec<RangeRequest> = paths.iter().map(|p| RangeRequest::whole(p.as_str())).collect();
        let data = self.fetcher.fetch_all(&requests).await?;
        Ok(paths.iter().cloned().zip(data).collect())
    }

    pub async fn stat(&self, path: &str) -> Result<ObjectInfo> {
        self.metadata.stat(path).await
    }

    pub async fn info(&self, path: &str) -> Result<ObjectInfo> {
        self.stat(path).await
    }

    pub async fn find(&self, prefix: &str) -> Result<Vec<String>> {
        self.metadata.find(prefix).await
    }

    pub async fn find_detail(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        self.metadata.find_detail(prefix).await
    }

    /// Open by mode string, `rb` or `wb` / 按模式打开
    pub async fn open(&self, path: &str, mode: &str) -> Result<FileHandle> {
        match mode {
            "rb" | "r" => Ok(FileHandle::Read(self.open_read(path).await?)),
            "wb" | "w" => Ok(FileHandle::Write(self.open_write(path)?)),
            other => Err(Error::Config(format!("unsupported open mode: {}", other))),
        }
    }

    pub async fn open_read(&self, path: &str) -> Result<FileReader> {
        let info = self.metadata.stat(path).await?;
        Ok(FileReader {
            fetcher: self.fetcher.clone(),
            path: path.to_string(),
            size: info.size,
            pos: 0,
            mode: self.config.read_ahead,
            block_size: self.config.block_size as u64,
            cache: Bytes::new(),
            cache_start: 0,
        })
    }

    pub fn open_write(&self, path: &str) -> Result<UploadSession> {
        UploadSession::new(self.backend.clone(), path, &self.config)
    }

    /// Write a whole object with one request / 整体写入
    pub async fn pipe(&self, path: &str, data: Bytes) -> Result<()> {
        let what = format!("put {}", path);
        self.fetcher
            .retry_policy()
            .run(&what, || self.backend.put(path, data.clone()))
            .await
    }

    /// Concurrent `pipe`, failing on the first error / 并发写入多个对象
    pub async fn pipe_many(&self, objects: HashMap<String, Bytes>) -> Result<()> {
        stream::iter(objects)
            .map(|(path, data)| async move { self.pipe(&path, data).await })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }

    /// Download objects to local files concurrently / 并发下载到本地文件
    pub async fn get(&self, paths: &[String], local_paths: &[PathBuf]) -> Result<()> {
        if paths.len() != local_paths.len() {
            return Err(Error::Protocol(format!(
                "get needs equal lengths, got {} paths and {} local paths",
                paths.len(),
                local_paths.len()
            )));
        }
        stream::iter(paths.iter().zip(local_paths.iter()))
            .map(|(path, local)| async move { self.get_one(path, local).await })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }

    async fn get_one(&self, path: &str, local: &Path) -> Result<()> {
        let data = self.fetcher.fetch(path, ByteRange::whole()).await?;
        if let Some(parent) = local.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(local, &data).await?;
        tracing::debug!("Downloaded {} -> {} ({} bytes)", path, local.display(), data.len());
        Ok(())
    }
}

/// Handle returned by [`FileSystem::open`] / 文件句柄
pub enum FileHandle {
    Read(FileReader),
    Write(UploadSession),
}

impl FileHandle {
    pub fn into_reader(self) -> Option<FileReader> {
        match self {
            FileHandle::Read(r) => Some(r),
            FileHandle::Write(_) => None,
        }
    }

    pub fn into_writer(self) -> Option<UploadSession> {
        match self {
            FileHandle::Write(w) => Some(w),
            FileHandle::Read(_) => None,
        }
    }
}

/// Seekable read handle backed by ranged fetches / 可定位读取句柄
pub struct FileReader {
    fetcher: Arc<RangeFetcher>,
    path: String,
    size: u64,
    pos: u64,
    mode: ReadAheadMode,
    block_size: u64,
    cache: Bytes,
    cache_start: u64,
}

impl FileReader {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Move the read position; positions past the end are allowed and read nothing
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        self.pos = target.ok_or_else(|| Error::Protocol(format!("seek before start of {}", self.path)))?;
        Ok(self.pos)
    }

    /// Read up to `len` bytes at the current position / 读取数据
    pub async fn read(&mut self, len: usize) -> Result<Bytes> {
        if len == 0 || self.pos >= self.size {
            return Ok(Bytes::new());
        }
        let end = self.size.min(self.pos + len as u64);
        let cache_end = self.cache_start + self.cache.len() as u64;
        if self.pos < self.cache_start || end > cache_end {
            self.fill(end).await?;
        }

        let from = (self.pos - self.cache_start) as usize;
        let to = ((end - self.cache_start) as usize).min(self.cache.len());
        let data = self.cache.slice(from.min(to)..to);
        self.pos += data.len() as u64;
        Ok(data)
    }

    /// Read from the current position to the end / 读取剩余全部数据
    pub async fn read_to_end(&mut self) -> Result<Bytes> {
        let remaining = self.size.saturating_sub(self.pos) as usize;
        self.read(remaining).await
    }

    async fn fill(&mut self, end: u64) -> Result<()> {
        let (start, stop) = match self.mode {
            ReadAheadMode::None => (self.pos, end),
            ReadAheadMode::Readahead => (self.pos, self.size.min(end.max(self.pos + self.block_size))),
            ReadAheadMode::All => (0, self.size),
        };
        tracing::debug!("Reader fill {} [{}, {})", self.path, start, stop);
        self.cache = self.fetcher.fetch(&self.path, ByteRange::new(start, stop)).await?;
        self.cache_start = start;
        Ok(())
    }
}
