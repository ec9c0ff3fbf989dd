use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Half-open byte interval `[start, end)` / 字节范围
///
/// `(0, 0)` is the whole object and `end == 0` with `start > 0` reads to the end of the
/// object. Any other `end <= start` is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn whole() -> Self {
        Self { start: 0, end: 0 }
    }

    pub fn is_whole(&self) -> bool {
        self.start == 0 && self.end == 0
    }

    pub fn is_open_ended(&self) -> bool {
        self.end == 0
    }

    /// True when nothing needs to be fetched / 空范围
    pub fn is_empty(&self) -> bool {
        self.end != 0 && self.end <= self.start
    }

    /// Inclusive last byte, `None` when open-ended / 包含的最后一个字节
    pub fn last_byte(&self) -> Option<u64> {
        if self.end == 0 {
            None
        } else {
            Some(self.end - 1)
        }
    }

    /// Value of an HTTP `Range` header, `None` for the whole object / HTTP Range 头
    pub fn http_header(&self) -> Option<String> {
        if self.is_whole() {
            return None;
        }
        Some(match self.last_byte() {
            Some(last) => format!("bytes={}-{}", self.start, last),
            None => format!("bytes={}-", self.start),
        })
    }

    /// Clamp against an object of `size` bytes, returning local slice bounds
    pub fn clamp(&self, size: u64) -> (usize, usize) {
        if self.is_empty() {
            return (0, 0);
        }
        let start = self.start.min(size);
        let end = if self.end == 0 { size } else { self.end.min(size) };
        (start as usize, end.max(start) as usize)
    }
}

/// One member of a range batch / 范围请求
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeRequest {
    pub resource: String,
    pub range: ByteRange,
}

impl RangeRequest {
    pub fn new(resource: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            resource: resource.into(),
            range: ByteRange::new(start, end),
        }
    }

    pub fn whole(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            range: ByteRange::whole(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectType {
    File,
}

/// Object metadata snapshot / 对象元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl ObjectInfo {
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            object_type: ObjectType::File,
            etag: None,
            last_modified: None,
        }
    }

    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }

    pub fn with_last_modified(mut self, last_modified: Option<String>) -> Self {
        self.last_modified = last_modified;
        self
    }
}

/// One page of a prefix listing / 列表分页
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectInfo>,
    /// Token for the next page, `None` on the last page / 下一页令牌
    pub next: Option<String>,
}

/// Acknowledged part of a multipart upload / 已完成分片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Backend capability declaration / 后端能力声明
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    /// Support range reading / 支持范围读取
    pub can_range_read: bool,
    /// Support object metadata lookup / 支持元数据查询
    pub can_stat: bool,
    /// Support prefix listing / 支持前缀列表
    pub can_list: bool,
    /// Support multipart upload (init/part/complete) / 支持分片上传
    pub can_multipart_upload: bool,
    /// Support one-shot put / 支持整体上传
    pub can_put: bool,
    /// Smallest non-final part accepted by the service / 最小分片大小
    pub min_part_size: Option<usize>,
}

impl Default for Capability {
    fn default() -> Self {
        Self {
            can_range_read: true,
            can_stat: false,
            can_list: false,
            can_multipart_upload: false,
            can_put: false,
            min_part_size: None,
        }
    }
}

/// Storage backend interface (primitive operations only) / 存储后端接口
///
/// Identifiers are `bucket/key` (or `container/blob`) for object stores and full URLs for
/// HTTP. Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Backend name / 后端名称
    fn name(&self) -> &str;

    /// Backend capabilities / 后端能力
    fn capabilities(&self) -> Capability;

    /// Fetch `range` of `resource` / 读取范围数据
    async fn range_fetch(&self, resource: &str, range: ByteRange) -> Result<Bytes>;

    /// Object metadata / 获取元数据
    async fn stat(&self, resource: &str) -> Result<ObjectInfo> {
        let _ = resource;
        Err(Error::unsupported(self.name(), "stat"))
    }

    /// One page of objects whose identifier starts with `prefix` / 列出一页对象
    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage> {
        let _ = (prefix, continuation);
        Err(Error::unsupported(self.name(), "list"))
    }

    /// Start a multipart upload, returning its id / 初始化分片上传
    async fn init_upload(&self, resource: &str) -> Result<String> {
        let _ = resource;
        Err(Error::unsupported(self.name(), "multipart upload"))
    }

    /// Upload one part, returning its completion token / 上传分片
    async fn upload_part(
        &self,
        resource: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String> {
        let _ = (resource, upload_id, part_number, data);
        Err(Error::unsupported(self.name(), "multipart upload"))
    }

    /// Finalize with parts in ascending part-number order / 完成分片上传
    async fn complete_upload(
        &self,
        resource: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let _ = (resource, upload_id, parts);
        Err(Error::unsupported(self.name(), "multipart upload"))
    }

    /// Discard a started multipart upload / 取消分片上传
    async fn abort_upload(&self, resource: &str, upload_id: &str) -> Result<()> {
        let _ = (resource, upload_id);
        Err(Error::unsupported(self.name(), "multipart upload"))
    }

    /// Write a whole object in one request / 整体上传
    async fn put(&self, resource: &str, data: Bytes) -> Result<()> {
        let _ = (resource, data);
        Err(Error::unsupported(self.name(), "put"))
    }
}

pub mod manager;

pub use manager::{BackendBox, BackendRegistry, DriverFactory};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header() {
        assert_eq!(ByteRange::whole().http_header(), None);
        assert_eq!(ByteRange::new(1, 41).http_header().as_deref(), Some("bytes=1-40"));
        assert_eq!(ByteRange::new(0, 1).http_header().as_deref(), Some("bytes=0-0"));
        assert_eq!(ByteRange::new(10, 0).http_header().as_deref(), Some("bytes=10-"));
    }

    #[test]
    fn test_range_clamp() {
        assert_eq!(ByteRange::whole().clamp(100), (0, 100));
        assert_eq!(ByteRange::new(1, 41).clamp(100), (1, 41));
        assert_eq!(ByteRange::new(90, 120).clamp(100), (90, 100));
        assert_eq!(ByteRange::new(150, 200).clamp(100), (100, 100));
        assert_eq!(ByteRange::new(50, 0).clamp(100), (50, 100));
        assert!(ByteRange::new(5, 5).is_empty());
        assert_eq!(ByteRange::new(7, 3).clamp(100), (0, 0));
    }

    #[test]
    fn test_object_info_serializes_type() {
        let info = ObjectInfo::file("bucket/key", 12);
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["type"], "file");
        assert_eq!(value["size"], 12);
        assert!(value.get("etag").is_none());
    }
}
