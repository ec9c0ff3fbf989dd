//! In-memory object store / 内存对象存储
//!
//! Objects live in a sorted map so listings come back in key order like S3.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::storage::{ByteRange, Capability, CompletedPart, ListPage, ObjectBackend, ObjectInfo};
use crate::utils::strip_protocol;

const DEFAULT_PAGE_SIZE: usize = 1000;

struct PendingUpload {
    resource: String,
    parts: BTreeMap<u32, (String, Bytes)>,
}

/// Memory driver / 内存驱动
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<String, Bytes>>,
    uploads: Mutex<HashMap<String, PendingUpload>>,
    page_size: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            uploads: Mutex::new(HashMap::new()),
            page_size: page_size.max(1),
        }
    }

    fn key(resource: &str) -> String {
        strip_protocol(resource, &["memory"]).trim_start_matches('/').to_string()
    }

    /// Upload ids started but neither completed nor aborted / 未完成的分片上传
    pub fn pending_uploads(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.uploads.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn etag_of(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn capabilities(&self) -> Capability {
        Capability {
            can_range_read: true,
            can_stat: true,
            can_list: true,
            can_multipart_upload: true,
            can_put: true,
            min_part_size: None,
        }
    }

    async fn range_fetch(&self, resource: &str, range: ByteRange) -> Result<Bytes> {
        let key = Self::key(resource);
        let objects = self.objects.read();
        let data = objects
            .get(&key)
            .ok_or_else(|| Error::NotFound(key.clone()))?;
        let (start, end) = range.clamp(data.len() as u64);
        Ok(data.slice(start..end))
    }

    async fn stat(&self, resource: &str) -> Result<ObjectInfo> {
        let key = Self::key(resource);
        let objects = self.objects.read();
        let data = objects
            .get(&key)
            .ok_or_else(|| Error::NotFound(key.clone()))?;
        Ok(ObjectInfo::file(key.clone(), data.len() as u64).with_etag(Some(etag_of(data))))
    }

    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage> {
        let prefix = Self::key(prefix);
        let objects = self.objects.read();
        let lower = match continuation {
            Some(after) => Bound::Excluded(after),
            None => Bound::Included(prefix.clone()),
        };

        let mut page = ListPage::default();
        for (key, data) in objects.range((lower, Bound::Unbounded)) {
            if !key.starts_with(&prefix) {
                break;
            }
            if page.objects.len() == self.page_size {
                page.next = page.objects.last().map(|o| o.name.clone());
                break;
            }
            page.objects.push(ObjectInfo::file(key.clone(), data.len() as u64));
        }
        Ok(page)
    }

    async fn init_upload(&self, resource: &str) -> Result<String> {
        let upload_id = uuid::Uuid::new_v4().to_string();
        self.uploads.lock().insert(
            upload_id.clone(),
            PendingUpload {
                resource: Self::key(resource),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        resource: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String> {
        let key = Self::key(resource);
        let mut uploads = self.uploads.lock();
        let upload = uploads
            .get_mut(upload_id)
            .filter(|u| u.resource == key)
            .ok_or_else(|| Error::NotFound(format!("no such upload {} for {}", upload_id, key)))?;
        if part_number == 0 {
            return Err(Error::Protocol("part numbers start at 1".into()));
        }
        let etag = etag_of(&data);
        upload.parts.insert(part_number, (etag.clone(), data));
        Ok(etag)
    }

    async fn complete_upload(
        &self,
        resource: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let key = Self::key(resource);
        let mut uploads = self.uploads.lock();
        let upload = uploads
            .get(upload_id)
            .filter(|u| u.resource == key)
            .ok_or_else(|| Error::NotFound(format!("no such upload {} for {}", upload_id, key)))?;
        if parts.is_empty() {
            return Err(Error::Protocol("complete_upload needs at least one part".into()));
        }

        let mut body = BytesMut::new();
        let mut previous = 0;
        for part in parts {
            if part.part_number <= previous {
                return Err(Error::Protocol(format!(
                    "parts out of order: {} after {}",
                    part.part_number, previous
                )));
            }
            previous = part.part_number;
            match upload.parts.get(&part.part_number) {
                Some((etag, data)) if *etag == part.etag => body.extend_from_slice(data),
                _ => {
                    return Err(Error::Protocol(format!(
                        "part {} missing or etag mismatch",
                        part.part_number
                    )))
                }
            }
        }

        uploads.remove(upload_id);
        self.objects.write().insert(key, body.freeze());
        Ok(())
    }

    async fn abort_upload(&self, _resource: &str, upload_id: &str) -> Result<()> {
        self.uploads.lock().remove(upload_id);
        Ok(())
    }

    async fn put(&self, resource: &str, data: Bytes) -> Result<()> {
        self.objects.write().insert(Self::key(resource), data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_range() {
        let backend = MemoryBackend::new();
        backend.put("memory://a/b", Bytes::from_static(b"0123456789")).await.unwrap();
        let got = backend.range_fetch("a/b", ByteRange::new(2, 5)).await.unwrap();
        assert_eq!(&got[..], b"234");
        let all = backend.range_fetch("/a/b", ByteRange::whole()).await.unwrap();
        assert_eq!(all.len(), 10);
        let err = backend.range_fetch("a/c", ByteRange::whole()).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_list_pages() {
        let backend = MemoryBackend::with_page_size(2);
        for name in ["p/1", "p/2", "p/3", "q/1"] {
            backend.put(name, Bytes::from_static(b"x")).await.unwrap();
        }
        let first = backend.list_page("p/", None).await.unwrap();
        assert_eq!(first.objects.len(), 2);
        assert_eq!(first.next.as_deref(), Some("p/2"));
        let second = backend.list_page("p/", first.next).await.unwrap();
        assert_eq!(second.objects.len(), 1);
        assert_eq!(second.objects[0].name, "p/3");
        assert!(second.next.is_none());
    }

    #[tokio::test]
    async fn test_complete_rejects_bad_etag() {
        let backend = MemoryBackend::new();
        let id = backend.init_upload("b/k").await.unwrap();
        backend.upload_part("b/k", &id, 1, Bytes::from_static(b"abc")).await.unwrap();
        let parts = vec![CompletedPart { part_number: 1, etag: "nope".into() }];
        assert!(backend.complete_upload("b/k", &id, &parts).await.is_err());
        assert_eq!(backend.pending_uploads(), vec![id.clone()]);
        backend.abort_upload("b/k", &id).await.unwrap();
        assert!(backend.pending_uploads().is_empty());
    }
}
