//! GCS API 数据类型

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::storage::ObjectInfo;

/// Object resource of the JSON API / 对象元数据
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsObject {
    pub name: String,
    /// The JSON API reports sizes as decimal strings
    pub size: String,
    #[serde(default)]
    pub etag: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
}

impl GcsObject {
    pub fn into_info(self, bucket: &str) -> Result<ObjectInfo> {
        let size = self
            .size
            .parse::<u64>()
            .map_err(|_| Error::Protocol(format!("invalid object size: {}", self.size)))?;
        Ok(ObjectInfo::file(format!("{}/{}", bucket, self.name), size)
            .with_etag(self.etag)
            .with_last_modified(self.updated))
    }
}

/// objects.list response / 列表响应
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListObjectsResponse {
    #[serde(default)]
    pub items: Vec<GcsObject>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// XML API multipart initiation result / 分片上传初始化结果
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InitiateMultipartUploadResult {
    pub upload_id: String,
}
