#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use rangefs::{
    BackendBox, BackendConfig, ByteRange, Capability, CompletedPart, Error, ListPage, ObjectBackend,
    ObjectInfo, Result,
};

/// Wraps a backend and injects delays and failures into `range_fetch`
pub struct UnreliableBackend {
    inner: BackendBox,
    /// Transient failures handed out per (resource, range) before it succeeds
    fail_first: u32,
    attempts: Mutex<HashMap<(String, ByteRange), u32>>,
    /// Upper bound of a random delay added to every fetch
    max_delay: Duration,
    /// Resources that always fail with `NotFound`
    broken: Vec<String>,
    /// Resources whose fetch sleeps this long before answering
    stalled: Option<(String, Duration)>,
    pub fetches: AtomicU64,
}

impl UnreliableBackend {
    pub fn new(inner: BackendBox) -> Self {
        Self {
            inner,
            fail_first: 0,
            attempts: Mutex::new(HashMap::new()),
            max_delay: Duration::ZERO,
            broken: Vec::new(),
            stalled: None,
            fetches: AtomicU64::new(0),
        }
    }

    pub fn fail_first(mut self, n: u32) -> Self {
        self.fail_first = n;
        self
    }

    pub fn random_delay(mut self, max: Duration) -> Self {
        self.max_delay = max;
        self
    }

    pub fn broken(mut self, resource: &str) -> Self {
        self.broken.push(resource.to_string());
        self
    }

    pub fn stalled(mut self, resource: &str, delay: Duration) -> Self {
        self.stalled = Some((resource.to_string(), delay));
        self
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    fn delay(&self) -> Duration {
        if self.max_delay.is_zero() {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(0..=self.max_delay.as_millis() as u64);
        Duration::from_millis(ms)
    }
}

#[async_trait]
impl ObjectBackend for UnreliableBackend {
    fn name(&self) -> &str {
        "unreliable"
    }

    fn capabilities(&self) -> Capability {
        self.inner.capabilities()
    }

    async fn range_fetch(&self, resource: &str, range: ByteRange) -> Result<Bytes> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay()).await;

        if let Some((stalled, delay)) = &self.stalled {
            if stalled == resource {
                tokio::time::sleep(*delay).await;
            }
        }
        if self.broken.iter().any(|b| b == resource) {
            return Err(Error::NotFound(resource.to_string()));
        }
        let attempt = {
            let mut attempts = self.attempts.lock();
            let n = attempts.entry((resource.to_string(), range)).or_insert(0);
            *n += 1;
            *n
        };
        if attempt <= self.fail_first {
            return Err(Error::TransientNetwork(format!(
                "simulated failure {} of {}",
                attempt, resource
            )));
        }
        self.inner.range_fetch(resource, range).await
    }

    async fn stat(&self, resource: &str) -> Result<ObjectInfo> {
        self.inner.stat(resource).await
    }

    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage> {
        self.inner.list_page(prefix, continuation).await
    }

    async fn init_upload(&self, resource: &str) -> Result<String> {
        self.inner.init_upload(resource).await
    }

    async fn upload_part(&self, resource: &str, upload_id: &str, part_number: u32, data: Bytes) -> Result<String> {
        self.inner.upload_part(resource, upload_id, part_number, data).await
    }

    async fn complete_upload(&self, resource: &str, upload_id: &str, parts: &[CompletedPart]) -> Result<()> {
        self.inner.complete_upload(resource, upload_id, parts).await
    }

    async fn abort_upload(&self, resource: &str, upload_id: &str) -> Result<()> {
        self.inner.abort_upload(resource, upload_id).await
    }

    async fn put(&self, resource: &str, data: Bytes) -> Result<()> {
        self.inner.put(resource, data).await
    }
}

/// Backend whose part uploads fail while `failing` is set
pub struct FlakyUploads {
    pub inner: BackendBox,
    pub failing: Arc<std::sync::atomic::AtomicBool>,
}

#[async_trait]
impl ObjectBackend for FlakyUploads {
    fn name(&self) -> &str {
        "flaky-uploads"
    }

    fn capabilities(&self) -> Capability {
        self.inner.capabilities()
    }

    async fn range_fetch(&self, resource: &str, range: ByteRange) -> Result<Bytes> {
        self.inner.range_fetch(resource, range).await
    }

    async fn init_upload(&self, resource: &str) -> Result<String> {
        self.inner.init_upload(resource).await
    }

    async fn upload_part(&self, resource: &str, upload_id: &str, part_number: u32, data: Bytes) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Auth("part upload rejected".into()));
        }
        self.inner.upload_part(resource, upload_id, part_number, data).await
    }

    async fn complete_upload(&self, resource: &str, upload_id: &str, parts: &[CompletedPart]) -> Result<()> {
        self.inner.complete_upload(resource, upload_id, parts).await
    }

    async fn abort_upload(&self, resource: &str, upload_id: &str) -> Result<()> {
        self.inner.abort_upload(resource, upload_id).await
    }

    async fn put(&self, resource: &str, data: Bytes) -> Result<()> {
        self.inner.put(resource, data).await
    }
}

/// Backend whose first `init_upload` registers the upload and then hangs for `stall`
pub struct SlowFirstInit {
    pub inner: BackendBox,
    pub stall: Duration,
    pub inits: AtomicU32,
}

impl SlowFirstInit {
    pub fn new(inner: BackendBox, stall: Duration) -> Self {
        Self {
            inner,
            stall,
            inits: AtomicU32::new(0),
        }
    }

    pub fn init_count(&self) -> u32 {
        self.inits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectBackend for SlowFirstInit {
    fn name(&self) -> &str {
        "slow-first-init"
    }

    fn capabilities(&self) -> Capability {
        self.inner.capabilities()
    }

    async fn range_fetch(&self, resource: &str, range: ByteRange) -> Result<Bytes> {
        self.inner.range_fetch(resource, range).await
    }

    async fn init_upload(&self, resource: &str) -> Result<String> {
        let first = self.inits.fetch_add(1, Ordering::SeqCst) == 0;
        let id = self.inner.init_upload(resource).await?;
        if first {
            tokio::time::sleep(self.stall).await;
        }
        Ok(id)
    }

    async fn upload_part(&self, resource: &str, upload_id: &str, part_number: u32, data: Bytes) -> Result<String> {
        self.inner.upload_part(resource, upload_id, part_number, data).await
    }

    async fn complete_upload(&self, resource: &str, upload_id: &str, parts: &[CompletedPart]) -> Result<()> {
        self.inner.complete_upload(resource, upload_id, parts).await
    }

    async fn abort_upload(&self, resource: &str, upload_id: &str) -> Result<()> {
        self.inner.abort_upload(resource, upload_id).await
    }

    async fn put(&self, resource: &str, data: Bytes) -> Result<()> {
        self.inner.put(resource, data).await
    }
}

/// Deterministic payload of `len` bytes
pub fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Fast retries for tests
pub fn quick_config() -> BackendConfig {
    BackendConfig {
        retry_backoff_ms: 1,
        max_backoff_ms: 10,
        ..BackendConfig::default()
    }
}
