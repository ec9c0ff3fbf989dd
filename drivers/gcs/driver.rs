//! GCS 驱动实现
//!
//! JSON API for downloads, metadata, listing and simple uploads; the S3-compatible XML API
//! for multipart uploads, since resumable sessions cannot take numbered parts.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::RANGE;
use reqwest::{Client, Method, RequestBuilder};
use urlencoding::encode;

use super::types::{GcsObject, InitiateMultipartUploadResult, ListObjectsResponse};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::storage::{ByteRange, Capability, CompletedPart, ListPage, ObjectBackend, ObjectInfo};
use crate::utils::{check_response, header_str, read_range_body, split_bucket_key, split_bucket_prefix, strip_protocol};

const DEFAULT_HOST: &str = "https://storage.googleapis.com";

/// GCS minimum part size for XML multipart uploads (5 MiB) / 最小分片大小
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// GCS 驱动
pub struct GcsBackend {
    client: Client,
    host: String,
    token: Option<String>,
    project: Option<String>,
    requester_pays: bool,
    page_size: Option<usize>,
}

impl GcsBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let token = if config.anon {
            None
        } else {
            Some(config.token.clone().ok_or_else(|| {
                Error::Config("GCS needs an access token unless anon=true".into())
            })?)
        };
        if config.requester_pays && config.project.is_none() {
            return Err(Error::Config("requester_pays on GCS needs a billing project".into()));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(config.max_concurrency)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            host: config
                .endpoint_url
                .as_deref()
                .unwrap_or(DEFAULT_HOST)
                .trim_end_matches('/')
                .to_string(),
            token,
            project: config.project.clone(),
            requester_pays: config.requester_pays,
            page_size: config.page_size,
        })
    }

    fn path(resource: &str) -> &str {
        strip_protocol(resource, &["gs", "gcs"])
    }

    /// 添加认证头与计费项目
    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut req = self.client.request(method, url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
            if let Some(project) = &self.project {
                req = req.header("x-goog-user-project", project);
            }
        }
        if self.requester_pays {
            if let Some(project) = &self.project {
                req = req.query(&[("userProject", project)]);
            }
        }
        req
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/storage/v1/b/{}/o/{}", self.host, bucket, encode(key))
    }

    /// XML API object URL, `/` kept between segments / XML接口地址
    fn xml_url(&self, bucket: &str, key: &str) -> String {
        let key: Vec<String> = key.split('/').map(|s| encode(s).into_owned()).collect();
        format!("{}/{}/{}", self.host, bucket, key.join("/"))
    }
}

fn complete_body(parts: &[CompletedPart]) -> String {
    let mut body = String::from("<CompleteMultipartUpload>");
    for part in parts {
        body.push_str(&format!(
            "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
            part.part_number,
            quick_xml::escape::escape(part.etag.as_str())
        ));
    }
    body.push_str("</CompleteMultipartUpload>");
    body
}

#[async_trait]
impl ObjectBackend for GcsBackend {
    fn name(&self) -> &str {
        "gcs"
    }

    fn capabilities(&self) -> Capability {
        Capability {
            can_range_read: true,
            can_stat: true,
            can_list: true,
            can_multipart_upload: true,
            can_put: true,
            min_part_size: Some(MIN_PART_SIZE),
        }
    }

    async fn range_fetch(&self, resource: &str, range: ByteRange) -> Result<Bytes> {
        let (bucket, key) = split_bucket_key(Self::path(resource))?;
        let url = format!("{}/download/storage/v1/b/{}/o/{}", self.host, bucket, encode(key));
        let mut req = self.request(Method::GET, &url).query(&[("alt", "media")]);
        if let Some(value) = range.http_header() {
            req = req.header(RANGE, value);
        }
        tracing::debug!("GCS GET {}/{} range={:?}", bucket, key, range);
        read_range_body(req.send().await?, resource).await
    }

    async fn stat(&self, resource: &str) -> Result<ObjectInfo> {
        let (bucket, key) = split_bucket_key(Self::path(resource))?;
        let resp = self.request(Method::GET, &self.object_url(bucket, key)).send().await?;
        let resp = check_response(resp, resource).await?;
        let object: GcsObject = serde_json::from_slice(&resp.bytes().await?)?;
        object.into_info(bucket)
    }

    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage> {
        let (bucket, key_prefix) = split_bucket_prefix(Self::path(prefix))?;
        let url = format!("{}/storage/v1/b/{}/o", self.host, bucket);
        let mut req = self.request(Method::GET, &url).query(&[("prefix", key_prefix)]);
        if let Some(token) = &continuation {
            req = req.query(&[("pageToken", token)]);
        }
        if let Some(size) = self.page_size {
            req = req.query(&[("maxResults", size)]);
        }

        tracing::debug!("GCS list {}/{} token={:?}", bucket, key_prefix, continuation);
        let resp = check_response(req.send().await?, prefix).await?;
        let page: ListObjectsResponse = serde_json::from_slice(&resp.bytes().await?)?;
        let objects = page
            .items
            .into_iter()
            .filter(|o| !o.name.ends_with('/'))
            .map(|o| o.into_info(bucket))
            .collect::<Result<Vec<_>>>()?;
        Ok(ListPage {
            objects,
            next: page.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn init_upload(&self, resource: &str) -> Result<String> {
        let (bucket, key) = split_bucket_key(Self::path(resource))?;
        let url = format!("{}?uploads", self.xml_url(bucket, key));
        let resp = self
            .request(Method::POST, &url)
            .header("content-length", "0")
            .send()
            .await?;
        let resp = check_response(resp, resource).await?;
        let body = resp.text().await?;
        let init: InitiateMultipartUploadResult = quick_xml::de::from_str(&body)?;
        tracing::debug!("GCS分片上传开始: {}, upload_id={}", resource, init.upload_id);
        Ok(init.upload_id)
    }

    async fn upload_part(
        &self,
        resource: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String> {
        let (bucket, key) = split_bucket_key(Self::path(resource))?;
        let resp = self
            .request(Method::PUT, &self.xml_url(bucket, key))
            .query(&[("partNumber", part_number.to_string()), ("uploadId", upload_id.to_string())])
            .body(data)
            .send()
            .await?;
        let resp = check_response(resp, resource).await?;
        header_str(&resp, "etag")
            .ok_or_else(|| Error::Protocol(format!("{}: part {} has no ETag", resource, part_number)))
    }

    async fn complete_upload(
        &self,
        resource: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let (bucket, key) = split_bucket_key(Self::path(resource))?;
        let resp = self
            .request(Method::POST, &self.xml_url(bucket, key))
            .query(&[("uploadId", upload_id)])
            .body(complete_body(parts))
            .send()
            .await?;
        check_response(resp, resource).await?;
        Ok(())
    }

    async fn abort_upload(&self, resource: &str, upload_id: &str) -> Result<()> {
        let (bucket, key) = split_bucket_key(Self::path(resource))?;
        let resp = self
            .request(Method::DELETE, &self.xml_url(bucket, key))
            .query(&[("uploadId", upload_id)])
            .send()
            .await?;
        check_response(resp, resource).await?;
        Ok(())
    }

    async fn put(&self, resource: &str, data: Bytes) -> Result<()> {
        let (bucket, key) = split_bucket_key(Self::path(resource))?;
        let url = format!("{}/upload/storage/v1/b/{}/o", self.host, bucket);
        let resp = self
            .request(Method::POST, &url)
            .query(&[("uploadType", "media"), ("name", key)])
            .body(data)
            .send()
            .await?;
        check_response(resp, resource).await?;
        Ok(())
    }
}
