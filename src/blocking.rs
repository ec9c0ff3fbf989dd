//! Blocking wrapper for callers outside an async runtime / 同步调用封装
//!
//! The wrapper owns a multi-threaded tokio runtime and can be shared between OS threads.
//! It must not be used (or dropped) from inside another tokio runtime.

use std::collections::HashMap;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tokio::runtime::{Builder, Runtime};

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::fs::{FileReader, FileSystem};
use crate::storage::{BackendBox, ObjectInfo};
use crate::upload::{UploadSession, UploadState};

pub struct BlockingFileSystem {
    runtime: Arc<Runtime>,
    fs: FileSystem,
}

fn build_runtime() -> Result<Arc<Runtime>> {
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .thread_name("rangefs-io")
        .build()
        .map_err(|e| Error::Config(format!("failed to start runtime: {}", e)))?;
    Ok(Arc::new(runtime))
}

impl BlockingFileSystem {
    pub fn new(protocol: &str, config: BackendConfig) -> Result<Self> {
        Ok(Self {
            runtime: build_runtime()?,
            fs: FileSystem::new(protocol, config)?,
        })
    }

    pub fn with_backend(backend: BackendBox, config: BackendConfig) -> Result<Self> {
        Ok(Self {
            runtime: build_runtime()?,
            fs: FileSystem::with_backend(backend, config),
        })
    }

    /// Async filesystem behind this wrapper / 底层异步接口
    pub fn inner(&self) -> &FileSystem {
        &self.fs
    }

    pub fn cat(&self, path: &str, start: u64, end: u64) -> Result<Bytes> {
        self.runtime.block_on(self.fs.cat(path, start, end))
    }

    pub fn cat_ranges(&self, paths: &[String], starts: &[u64], ends: &[u64]) -> Result<Vec<Bytes>> {
        self.runtime.block_on(self.fs.cat_ranges(paths, starts, ends))
    }

    pub fn cat_many(&self, paths: &[String]) -> Result<HashMap<String, Bytes>> {
        self.runtime.block_on(self.fs.cat_many(paths))
    }

    pub fn stat(&self, path: &str) -> Result<ObjectInfo> {
        self.runtime.block_on(self.fs.stat(path))
    }

    pub fn info(&self, path: &str) -> Result<ObjectInfo> {
        self.stat(path)
    }

    pub fn find(&self, prefix: &str) -> Result<Vec<String>> {
        self.runtime.block_on(self.fs.find(prefix))
    }

    pub fn find_detail(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        self.runtime.block_on(self.fs.find_detail(prefix))
    }

    pub fn pipe(&self, path: &str, data: impl Into<Bytes>) -> Result<()> {
        self.runtime.block_on(self.fs.pipe(path, data.into()))
    }

    pub fn pipe_many(&self, objects: HashMap<String, Bytes>) -> Result<()> {
        self.runtime.block_on(self.fs.pipe_many(objects))
    }

    pub fn get(&self, paths: &[String], local_paths: &[PathBuf]) -> Result<()> {
        self.runtime.block_on(self.fs.get(paths, local_paths))
    }

    pub fn open_read(&self, path: &str) -> Result<BlockingReader> {
        let inner = self.runtime.block_on(self.fs.open_read(path))?;
        Ok(BlockingReader {
            runtime: self.runtime.clone(),
            inner,
        })
    }

    pub fn open_write(&self, path: &str) -> Result<BlockingWriter> {
        Ok(BlockingWriter {
            runtime: self.runtime.clone(),
            inner: self.fs.open_write(path)?,
        })
    }
}

fn io_error(e: Error) -> io::Error {
    let kind = match e.kind() {
        crate::ErrorKind::NotFound => io::ErrorKind::NotFound,
        crate::ErrorKind::Auth => io::ErrorKind::PermissionDenied,
        crate::ErrorKind::TransientNetwork => io::ErrorKind::TimedOut,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, e)
}

/// `std::io::Read + Seek` over a [`FileReader`] / 同步读取句柄
pub struct BlockingReader {
    runtime: Arc<Runtime>,
    inner: FileReader,
}

impl BlockingReader {
    pub fn size(&self) -> u64 {
        self.inner.size()
    }
}

impl Read for BlockingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self
            .runtime
            .block_on(self.inner.read(buf.len()))
            .map_err(io_error)?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}

impl Seek for BlockingReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos).map_err(io_error)
    }
}

/// `std::io::Write` over an [`UploadSession`]; call [`BlockingWriter::close`] to finish
pub struct BlockingWriter {
    runtime: Arc<Runtime>,
    inner: UploadSession,
}

impl BlockingWriter {
    pub fn close(&mut self) -> Result<()> {
        self.runtime.block_on(self.inner.close())
    }

    pub fn abort(&mut self) -> Result<()> {
        self.runtime.block_on(self.inner.abort())
    }

    pub fn state(&self) -> UploadState {
        self.inner.state()
    }

    pub fn upload_id(&self) -> Option<&str> {
        self.inner.upload_id()
    }
}

impl Write for BlockingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.runtime.block_on(self.inner.write(buf)).map_err(io_error)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.runtime.block_on(self.inner.flush()).map_err(io_error)
    }
}
