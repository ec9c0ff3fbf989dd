//! Multipart upload orchestrator / 分片上传编排
//!
//! Bytes are buffered until the buffer grows past `block_size`; then a multipart upload is
//! started and full blocks are sent as parts numbered from 1. `close` either writes the
//! whole buffer with one `put` or uploads the remainder as the final part and completes.
//!
//! A failed part or completion leaves the session open with the unsent bytes still
//! buffered. Retry with [`UploadSession::flush`] or [`UploadSession::close`]; writing the
//! same bytes again would duplicate them. Nothing is aborted automatically, call
//! [`UploadSession::abort`] or clean up [`UploadSession::upload_id`] out of band.

use bytes::{Bytes, BytesMut};

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::storage::{BackendBox, CompletedPart};

/// 上传会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Empty,
    Buffering,
    OneShotComplete,
    MultipartActive,
    MultipartComplete,
    Aborted,
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadState::OneShotComplete | UploadState::MultipartComplete | UploadState::Aborted
        )
    }
}

/// Single-writer upload handle / 上传句柄
pub struct UploadSession {
    backend: BackendBox,
    retry: RetryPolicy,
    resource: String,
    block_size: usize,
    buffer: BytesMut,
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
    next_part: u32,
    state: UploadState,
    bytes_written: u64,
}

impl UploadSession {
    /// Open a writer; fails with `ConfigError` when `block_size` is below the backend's
    /// minimum part size.
    pub fn new(backend: BackendBox, resource: impl Into<String>, config: &BackendConfig) -> Result<Self> {
        let resource = resource.into();
        let caps = backend.capabilities();
        if !caps.can_put {
            return Err(Error::unsupported(backend.name(), "writing"));
        }
        if let Some(min) = caps.min_part_size {
            if config.block_size < min {
                return Err(Error::Config(format!(
                    "block_size {} is below the {} minimum part size {}",
                    config.block_size,
                    backend.name(),
                    min
                )));
            }
        }

        Ok(Self {
            retry: RetryPolicy::from_config(config),
            block_size: config.block_size,
            buffer: BytesMut::new(),
            upload_id: None,
            parts: Vec::new(),
            next_part: 1,
            state: UploadState::Empty,
            bytes_written: 0,
            backend,
            resource,
        })
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    /// Remote multipart upload id once one was started / 分片上传ID
    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    /// Parts acknowledged so far, ascending / 已上传分片
    pub fn parts(&self) -> &[CompletedPart] {
        &self.parts
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.state.is_terminal() {
            return Err(Error::upload_state(
                &self.resource,
                format!("{} on {:?} session", operation, self.state),
            ));
        }
        Ok(())
    }

    /// Append bytes, uploading every full block beyond the threshold / 写入数据
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.ensure_open("write")?;
        self.buffer.extend_from_slice(data);
        self.bytes_written += data.len() as u64;
        if self.state == UploadState::Empty && !self.buffer.is_empty() {
            self.state = UploadState::Buffering;
        }
        self.upload_full_blocks().await?;
        Ok(data.len())
    }

    /// Upload whatever full blocks are pending / 上传待发送的完整块
    pub async fn flush(&mut self) -> Result<()> {
        self.ensure_open("flush")?;
        self.upload_full_blocks().await
    }

    async fn upload_full_blocks(&mut self) -> Result<()> {
        while self.buffer.len() > self.block_size {
            self.upload_next_part(self.block_size).await?;
        }
        Ok(())
    }

    async fn start_multipart(&mut self) -> Result<String> {
        if let Some(id) = &self.upload_id {
            return Ok(id.clone());
        }
        let resource = self.resource.as_str();
        // Single attempt: a repeated init may create a second remote upload
        let id = self
            .retry
            .once(self.backend.init_upload(resource))
            .await
            .map_err(|e| {
                tracing::warn!(
                    "Multipart init failed for {}, the service may hold an unreported upload: {}",
                    resource,
                    e
                );
                Error::upload_failed(resource, "init", e)
            })?;

        tracing::debug!("Multipart upload started: {} upload_id={}", self.resource, id);
        self.upload_id = Some(id.clone());
        self.state = UploadState::MultipartActive;
        Ok(id)
    }

    /// Send the first `len` buffered bytes as the next part; the buffer only advances
    /// once the part is acknowledged.
    async fn upload_next_part(&mut self, len: usize) -> Result<()> {
        let upload_id = self.start_multipart().await?;
        let part_number = self.next_part;
        let data = Bytes::copy_from_slice(&self.buffer[..len]);

        tracing::debug!(
            "Uploading part: {} part={} size={}",
            self.resource,
            part_number,
            len
        );
        let what = format!("upload part {} of {}", part_number, self.resource);
        let backend = &self.backend;
        let resource = self.resource.as_str();
        let etag = self
            .retry
            .run(&what, || backend.upload_part(resource, &upload_id, part_number, data.clone()))
            .await
            .map_err(|e| Error::upload_failed(resource, format!("upload part {}", part_number), e))?;

        let _ = self.buffer.split_to(len);
        self.parts.push(CompletedPart { part_number, etag });
        self.next_part += 1;
        Ok(())
    }

    /// Finish the object / 完成上传
    pub async fn close(&mut self) -> Result<()> {
        self.ensure_open("close")?;
        self.upload_full_blocks().await?;

        let Some(upload_id) = self.upload_id.clone() else {
            let what = format!("put {}", self.resource);
            let backend = &self.backend;
            let resource = self.resource.as_str();
            let data = Bytes::copy_from_slice(&self.buffer);
            self.retry
                .run(&what, || backend.put(resource, data.clone()))
                .await
                .map_err(|e| Error::upload_failed(resource, "put", e))?;

            tracing::debug!("Object written in one request: {} size={}", self.resource, data.len());
            self.buffer.clear();
            self.state = UploadState::OneShotComplete;
            return Ok(());
        };

        if !self.buffer.is_empty() {
            let len = self.buffer.len();
            self.upload_next_part(len).await?;
        }

        let what = format!("complete upload {}", self.resource);
        let backend = &self.backend;
        let resource = self.resource.as_str();
        let parts = self.parts.as_slice();
        self.retry
            .run(&what, || backend.complete_upload(resource, &upload_id, parts))
            .await
            .map_err(|e| Error::upload_failed(resource, "complete", e))?;

        tracing::info!(
            "Multipart upload complete: {} parts={} size={}",
            self.resource,
            self.parts.len(),
            self.bytes_written
        );
        self.state = UploadState::MultipartComplete;
        Ok(())
    }

    /// Discard the session and any started remote upload / 取消上传
    pub async fn abort(&mut self) -> Result<()> {
        self.ensure_open("abort")?;
        if let Some(upload_id) = self.upload_id.clone() {
            let what = format!("abort upload {}", self.resource);
            let backend = &self.backend;
            let resource = self.resource.as_str();
            self.retry
                .run(&what, || backend.abort_upload(resource, &upload_id))
                .await
                .map_err(|e| Error::upload_failed(resource, "abort", e))?;
            tracing::debug!("Multipart upload aborted: {} upload_id={}", self.resource, upload_id);
        }
        self.buffer.clear();
        self.state = UploadState::Aborted;
        Ok(())
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        if let Some(id) = &self.upload_id {
            tracing::warn!(
                "Upload of {} dropped before close, multipart upload {} left dangling",
                self.resource,
                id
            );
        } else if !self.buffer.is_empty() {
            tracing::warn!(
                "Upload of {} dropped before close, {} buffered bytes discarded",
                self.resource,
                self.buffer.len()
            );
        }
    }
}
