//! Azure Blob Storage 驱动实现
//!
//! 分片上传映射到块 Blob：upload_part = Put Block，complete = Put Block List。
//! 未提交的块由服务端自动清理，因此 abort 无需请求。

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use reqwest::{Client, Method, Response};
use url::Url;

use super::sign::{gmt_date, SharedKey, API_VERSION};
use super::types::{block_list_body, EnumerationResults};
use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::storage::{ByteRange, Capability, CompletedPart, ListPage, ObjectBackend, ObjectInfo};
use crate::utils::{
    check_response, content_length, header_str, read_range_body, split_bucket_key, split_bucket_prefix,
    strip_protocol, trim_etag,
};

/// Azure 驱动
pub struct AzureBackend {
    client: Client,
    endpoint: Url,
    signer: Option<SharedKey>,
    page_size: Option<usize>,
}

impl AzureBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let endpoint = match (&config.endpoint_url, &config.account) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, Some(account)) => format!("https://{}.blob.core.windows.net", account),
            (None, None) => {
                return Err(Error::Config("Azure needs an account name or endpoint_url".into()))
            }
        };
        let endpoint = Url::parse(&endpoint)
            .map_err(|e| Error::Config(format!("invalid Azure endpoint {}: {}", endpoint, e)))?;

        let signer = if config.anon {
            None
        } else {
            match (&config.account, &config.key) {
                (Some(account), Some(key)) => Some(SharedKey::new(account, key)?),
                _ => {
                    return Err(Error::Config(
                        "Azure needs account and key unless anon=true".into(),
                    ))
                }
            }
        };

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(config.max_concurrency)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            signer,
            page_size: config.page_size,
        })
    }

    fn path(resource: &str) -> &str {
        strip_protocol(resource, &["az", "abfs", "azure"])
    }

    /// `{endpoint}/{container}/{blob}` with each segment percent-encoded / 构造对象地址
    fn blob_url(&self, container: &str, blob: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("endpoint cannot be a base: {}", self.endpoint)))?
            .pop_if_empty()
            .push(container)
            .extend(blob.split('/'));
        Ok(url)
    }

    fn container_url(&self, container: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("endpoint cannot be a base: {}", self.endpoint)))?
            .pop_if_empty()
            .push(container);
        Ok(url)
    }

    /// Sign (unless anonymous) and send / 签名并发送请求
    async fn send(
        &self,
        method: Method,
        url: Url,
        mut headers: Vec<(String, String)>,
        body: Option<Bytes>,
    ) -> Result<Response> {
        headers.push(("x-ms-date".to_string(), gmt_date()));
        headers.push(("x-ms-version".to_string(), API_VERSION.to_string()));
        let length = body.as_ref().map(|b| b.len()).unwrap_or(0);

        let authorization = match &self.signer {
            Some(signer) => Some(signer.authorization(method.as_str(), &url, &headers, length)?),
            None => None,
        };

        let mut req = self.client.request(method, url);
        for (name, value) in &headers {
            req = req.header(name.as_str(), value.as_str());
        }
        if let Some(auth) = authorization {
            req = req.header("Authorization", auth);
        }
        if let Some(body) = body {
            req = req.body(body);
        }
        Ok(req.send().await?)
    }
}

/// Block ids must have equal length within one blob / 块ID
fn block_id(upload_id: &str, part_number: u32) -> String {
    BASE64.encode(format!("{}-{:06}", upload_id, part_number))
}

#[async_trait]
impl ObjectBackend for AzureBackend {
    fn name(&self) -> &str {
        "azure"
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
        let (container, blob) = split_bucket_key(Self::path(resource))?;
        let url = self.blob_url(container, blob)?;
        let mut headers = Vec::new();
        if let Some(value) = range.http_header() {
            headers.push(("x-ms-range".to_string(), value));
        }
        tracing::debug!("Azure GET {}/{} range={:?}", container, blob, range);
        let resp = self.send(Method::GET, url, headers, None).await?;
        read_range_body(resp, resource).await
    }

    async fn stat(&self, resource: &str) -> Result<ObjectInfo> {
        let path = Self::path(resource);
        let (container, blob) = split_bucket_key(path)?;
        let url = self.blob_url(container, blob)?;
        let resp = self.send(Method::HEAD, url, Vec::new(), None).await?;
        let resp = check_response(resp, resource).await?;
        let size = content_length(&resp)
            .ok_or_else(|| Error::Protocol(format!("{} has no content length", resource)))?;
        Ok(ObjectInfo::file(path.trim_start_matches('/'), size)
            .with_etag(header_str(&resp, "etag").as_deref().map(trim_etag))
            .with_last_modified(header_str(&resp, "last-modified")))
    }

    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage> {
        let (container, blob_prefix) = split_bucket_prefix(Self::path(prefix))?;
        let mut url = self.container_url(container)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("restype", "container").append_pair("comp", "list");
            if !blob_prefix.is_empty() {
                query.append_pair("prefix", blob_prefix);
            }
            if let Some(marker) = &continuation {
                query.append_pair("marker", marker);
            }
            if let Some(size) = self.page_size {
                query.append_pair("maxresults", &size.to_string());
            }
        }

        tracing::debug!("Azure list {}/{} marker={:?}", container, blob_prefix, continuation);
        let resp = self.send(Method::GET, url, Vec::new(), None).await?;
        let resp = check_response(resp, prefix).await?;
        let body = resp.text().await?;
        let result: EnumerationResults = quick_xml::de::from_str(&body)?;
        let next = result.next();
        Ok(ListPage {
            objects: result
                .blobs
                .blob
                .into_iter()
                .map(|b| b.into_info(container))
                .collect(),
            next,
        })
    }

    async fn init_upload(&self, resource: &str) -> Result<String> {
        split_bucket_key(Self::path(resource))?;
        let upload_id = uuid::Uuid::new_v4().simple().to_string();
        tracing::debug!("Azure块上传开始: {}, upload_id={}", resource, upload_id);
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        resource: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String> {
        let (container, blob) = split_bucket_key(Self::path(resource))?;
        let id = block_id(upload_id, part_number);
        let mut url = self.blob_url(container, blob)?;
        url.query_pairs_mut()
            .append_pair("comp", "block")
            .append_pair("blockid", &id);
        let resp = self.send(Method::PUT, url, Vec::new(), Some(data)).await?;
        check_response(resp, resource).await?;
        Ok(id)
    }

    async fn complete_upload(
        &self,
        resource: &str,
        _upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let (container, blob) = split_bucket_key(Self::path(resource))?;
        let mut url = self.blob_url(container, blob)?;
        url.query_pairs_mut().append_pair("comp", "blocklist");
        let body = block_list_body(parts.iter().map(|p| p.etag.as_str()));
        let resp = self.send(Method::PUT, url, Vec::new(), Some(Bytes::from(body))).await?;
        check_response(resp, resource).await?;
        tracing::debug!("Azure块上传完成: {}, blocks={}", resource, parts.len());
        Ok(())
    }

    async fn abort_upload(&self, resource: &str, upload_id: &str) -> Result<()> {
        tracing::debug!("Azure块上传取消: {}, upload_id={}", resource, upload_id);
        Ok(())
    }

    async fn put(&self, resource: &str, data: Bytes) -> Result<()> {
        let (container, blob) = split_bucket_key(Self::path(resource))?;
        let url = self.blob_url(container, blob)?;
        let headers = vec![("x-ms-blob-type".to_string(), "BlockBlob".to_string())];
        let resp = self.send(Method::PUT, url, headers, Some(data)).await?;
        check_response(resp, resource).await?;
        Ok(())
    }
}
