//! Concurrent range fetching / 并发范围读取
//!
//! A batch keeps request order in its results no matter which request finishes first.
//! The first member that fails after its retries fails the whole batch and the requests
//! still in flight are dropped.

use bytes::Bytes;
use futures::stream::{self, StreamExt};

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::storage::{BackendBox, ByteRange, RangeRequest};

pub struct RangeFetcher {
    backend: BackendBox,
    retry: RetryPolicy,
    max_concurrency: usize,
}

impl RangeFetcher {
    pub fn new(backend: BackendBox, config: &BackendConfig) -> Self {
        Self {
            backend,
            retry: RetryPolicy::from_config(config),
            max_concurrency: config.max_concurrency.max(1),
        }
    }

    pub fn backend(&self) -> &BackendBox {
        &self.backend
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetch one range with retries / 读取单个范围
    pub async fn fetch(&self, resource: &str, range: ByteRange) -> Result<Bytes> {
        if range.is_empty() {
            return Ok(Bytes::new());
        }
        let what = format!("GET {} [{}, {})", resource, range.start, range.end);
        self.retry
            .run(&what, || self.backend.range_fetch(resource, range))
            .await
            .map_err(|e| e.with_range(resource, range.start, range.end))
    }

    /// Fetch a batch, results in request order / 批量读取，结果与请求顺序一致
    pub async fn fetch_all(&self, requests: &[RangeRequest]) -> Result<Vec<Bytes>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(
            "Fetching {} ranges via {} (concurrency {})",
            requests.len(),
            self.backend.name(),
            self.max_concurrency
        );

        let mut slots: Vec<Option<Bytes>> = vec![None; requests.len()];
        let mut results = stream::iter(requests.iter().enumerate())
            .map(|(index, req)| async move { (index, self.fetch(&req.resource, req.range).await) })
            .buffer_unordered(self.max_concurrency);

        while let Some((index, result)) = results.next().await {
            match result {
                Ok(data) => slots[index] = Some(data),
                Err(e) => {
                    tracing::debug!("Range batch failed at request {}: {}", index, e);
                    return Err(e);
                }
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| Error::Protocol(format!("range request {} produced no result", index)))
            })
            .collect()
    }
}
