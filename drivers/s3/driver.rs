//! S3驱动核心实现
//!
//! 设计原则：
//! - 只提供原语（range_fetch, stat, list_page, 分片上传等）
//! - 每个存储桶一个客户端句柄，缓存有上限，可失效
//! - 分页与重试由上层引擎负责
//! - 列表与分片上传走预签名地址 + reqwest，先检查状态码再解析响应体

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use moka::sync::Cache;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use s3::bucket::Bucket;
use s3::error::S3Error;
use s3::serde_types::Part;
use url::Url;

use super::config::{S3Config, S3Credentials, MIN_PART_SIZE};
use super::types::ListBucketResult;
use crate::error::{Error, ErrorKind, Result};
use crate::storage::{ByteRange, Capability, CompletedPart, ListPage, ObjectBackend, ObjectInfo};
use crate::utils::{
    check_response, classify_status, header_str, split_bucket_key, split_bucket_prefix, strip_protocol,
    trim_etag,
};

const BUCKET_CACHE_CAPACITY: u64 = 64;
const CONTENT_TYPE: &str = "application/octet-stream";
/// 预签名有效期（秒）
const PRESIGN_EXPIRY_SECS: u32 = 3600;

/// HTTP verb of a presigned request / 预签名方法
#[derive(Debug, Clone, Copy)]
enum Verb {
    Get,
    Put,
}

/// S3驱动
pub struct S3Backend {
    config: S3Config,
    client: Client,
    buckets: Cache<String, Arc<Bucket>>,
}

impl S3Backend {
    /// 创建新的S3驱动实例
    pub fn new(config: S3Config) -> Result<Self> {
        // 提前校验凭证，配置错误在构造时暴露
        config.build_credentials()?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(config.max_concurrency)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            client,
            buckets: Cache::builder().max_capacity(BUCKET_CACHE_CAPACITY).build(),
        })
    }

    fn path(resource: &str) -> &str {
        strip_protocol(resource, &["s3", "s3a"])
    }

    /// 获取（或创建）存储桶客户端
    fn bucket(&self, name: &str) -> Result<Arc<Bucket>> {
        self.buckets
            .try_get_with(name.to_string(), || self.open_bucket(name))
            .map_err(|e| Arc::try_unwrap(e).unwrap_or_else(|e| Error::Config(e.to_string())))
    }

    fn open_bucket(&self, name: &str) -> Result<Arc<Bucket>> {
        let credentials = self.config.build_credentials()?;
        let mut bucket = Bucket::new(name, self.config.region(), credentials)
            .map_err(|e| Error::Config(format!("failed to create S3 bucket {}: {}", name, e)))?;
        if self.config.force_path_style {
            bucket = bucket.with_path_style();
        }
        if self.config.requester_pays {
            bucket.add_header("x-amz-request-payer", "requester");
        }
        tracing::debug!("S3存储桶客户端创建: {}", name);
        Ok(Arc::from(bucket))
    }

    /// Drop the cached client for `bucket` / 使缓存失效
    pub fn invalidate_bucket(&self, bucket: &str) {
        self.buckets.invalidate(bucket);
    }

    /// Rejected credentials may have been rotated; rebuild on next use
    fn wrap_err(&self, bucket: &str, resource: &str, e: S3Error) -> Error {
        self.note_auth(bucket, s3_error(resource, e))
    }

    fn note_auth(&self, bucket: &str, err: Error) -> Error {
        if err.kind() == ErrorKind::Auth {
            self.invalidate_bucket(bucket);
        }
        err
    }

    fn check_status(&self, bucket: &str, resource: &str, status: u16, body: &[u8]) -> Result<()> {
        if (200..300).contains(&status) {
            return Ok(());
        }
        let status = StatusCode::from_u16(status)
            .map_err(|_| Error::Protocol(format!("{} returned invalid status {}", resource, status)))?;
        let err = classify_status(status, resource, &String::from_utf8_lossy(body));
        Err(self.note_auth(bucket, err))
    }

    /// 请求地址：有凭证时预签名，匿名时直接拼接
    async fn request_url(
        &self,
        bucket: &Bucket,
        bucket_name: &str,
        verb: Verb,
        key: &str,
        mut query: HashMap<String, String>,
    ) -> Result<String> {
        if self.config.requester_pays {
            query.insert("x-amz-request-payer".to_string(), "requester".to_string());
        }
        if let S3Credentials::Anonymous = self.config.credentials {
            return self.plain_url(bucket_name, key, &query);
        }
        let path = if key.is_empty() { "/" } else { key };
        let signed = match verb {
            Verb::Get => bucket.presign_get(path, PRESIGN_EXPIRY_SECS, Some(query)).await,
            Verb::Put => bucket.presign_put(path, PRESIGN_EXPIRY_SECS, None, Some(query)).await,
        };
        signed.map_err(|e| self.wrap_err(bucket_name, key, e))
    }

    /// Unsigned URL in path or virtual-host style / 未签名地址
    fn plain_url(&self, bucket: &str, key: &str, query: &HashMap<String, String>) -> Result<String> {
        let endpoint = &self.config.endpoint;
        let mut url = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("invalid S3 endpoint {}: {}", endpoint, e)))?;
        if !self.config.force_path_style {
            let host = url
                .host_str()
                .ok_or_else(|| Error::Config(format!("S3 endpoint has no host: {}", endpoint)))?;
            let host = format!("{}.{}", bucket, host);
            url.set_host(Some(&host))
                .map_err(|e| Error::Config(format!("invalid S3 host {}: {}", host, e)))?;
        }
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::Config(format!("endpoint cannot be a base: {}", endpoint)))?;
            segments.pop_if_empty();
            if self.config.force_path_style {
                segments.push(bucket);
            }
            if !key.is_empty() {
                segments.extend(key.split('/'));
            }
        }
        if !query.is_empty() {
            let mut pairs: Vec<(&String, &String)> = query.iter().collect();
            pairs.sort();
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url.into())
    }

    /// 发送请求并检查状态码
    async fn send(&self, bucket: &str, resource: &str, req: RequestBuilder) -> Result<Response> {
        let resp = req.send().await?;
        check_response(resp, resource)
            .await
            .map_err(|e| self.note_auth(bucket, e))
    }
}

/// Map a rust-s3 error onto the taxonomy / 错误映射
///
/// Only connection level failures are transient. Anything rust-s3 failed to parse or
/// build is a protocol error.
fn s3_error(resource: &str, e: S3Error) -> Error {
    match e {
        S3Error::HttpFailWithBody(status, body) => match StatusCode::from_u16(status) {
            Ok(status) => classify_status(status, resource, &body),
            Err(_) => Error::Protocol(format!("{} returned invalid status {}", resource, status)),
        },
        S3Error::Credentials(e) => Error::Config(format!("S3 credentials: {}", e)),
        e @ (S3Error::Reqwest(_) | S3Error::Io(_) | S3Error::Http(_)) => {
            Error::TransientNetwork(format!("{}: {}", resource, e))
        }
        other => Error::Protocol(format!("{}: {}", resource, other)),
    }
}

#[async_trait]
impl ObjectBackend for S3Backend {
    fn name(&self) -> &str {
        "s3"
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
        let (bucket_name, key) = split_bucket_key(Self::path(resource))?;
        let bucket = self.bucket(bucket_name)?;

        tracing::debug!("S3 GET {}/{} range={:?}", bucket_name, key, range);
        let response = match range.last_byte() {
            _ if range.is_whole() => bucket.get_object(key).await,
            None => bucket.get_object_range(key, range.start, None).await,
            // rust-s3 不接受 start == end 的闭区间，多取一个字节再截断
            Some(last) if last == range.start => {
                bucket.get_object_range(key, range.start, Some(last + 1)).await
            }
            Some(last) => bucket.get_object_range(key, range.start, Some(last)).await,
        }
        .map_err(|e| self.wrap_err(bucket_name, resource, e))?;

        if response.status_code() == StatusCode::RANGE_NOT_SATISFIABLE.as_u16() {
            return Ok(Bytes::new());
        }
        self.check_status(bucket_name, resource, response.status_code(), response.bytes())?;

        let mut data = Bytes::copy_from_slice(response.bytes());
        if let Some(last) = range.last_byte() {
            let wanted = (last - range.start + 1) as usize;
            if data.len() > wanted {
                data.truncate(wanted);
            }
        }
        Ok(data)
    }

    async fn stat(&self, resource: &str) -> Result<ObjectInfo> {
        let path = Self::path(resource);
        let (bucket_name, key) = split_bucket_key(path)?;
        let bucket = self.bucket(bucket_name)?;

        let (head, status) = bucket
            .head_object(key)
            .await
            .map_err(|e| self.wrap_err(bucket_name, resource, e))?;
        self.check_status(bucket_name, resource, status, &[])?;

        let size = head
            .content_length
            .ok_or_else(|| Error::Protocol(format!("{} has no content length", resource)))?;
        Ok(ObjectInfo::file(path, size.max(0) as u64)
            .with_etag(head.e_tag.as_deref().map(trim_etag))
            .with_last_modified(head.last_modified))
    }

    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage> {
        let (bucket_name, key_prefix) = split_bucket_prefix(Self::path(prefix))?;
        let bucket = self.bucket(bucket_name)?;

        let mut query = HashMap::from([("list-type".to_string(), "2".to_string())]);
        if !key_prefix.is_empty() {
            query.insert("prefix".to_string(), key_prefix.to_string());
        }
        if let Some(token) = &continuation {
            query.insert("continuation-token".to_string(), token.clone());
        }
        if let Some(max_keys) = self.config.max_keys {
            query.insert("max-keys".to_string(), max_keys.to_string());
        }

        tracing::debug!("S3 list {}/{} token={:?}", bucket_name, key_prefix, continuation);
        let url = self.request_url(&bucket, bucket_name, Verb::Get, "", query).await?;
        let resp = self.send(bucket_name, prefix, self.client.get(url)).await?;
        let body = resp.text().await?;
        let result: ListBucketResult = quick_xml::de::from_str(&body)?;

        let next = result.next();
        let objects = result
            .contents
            .into_iter()
            .filter(|obj| !obj.key.ends_with('/'))
            .map(|obj| obj.into_info(bucket_name))
            .collect();
        Ok(ListPage { objects, next })
    }

    async fn init_upload(&self, resource: &str) -> Result<String> {
        let (bucket_name, key) = split_bucket_key(Self::path(resource))?;
        let bucket = self.bucket(bucket_name)?;

        let init = bucket
            .initiate_multipart_upload(key, CONTENT_TYPE)
            .await
            .map_err(|e| self.wrap_err(bucket_name, resource, e))?;
        if init.upload_id.is_empty() {
            return Err(Error::Protocol(format!("{}: empty upload id", resource)));
        }
        tracing::debug!("S3分片上传开始: key={}, upload_id={}", key, init.upload_id);
        Ok(init.upload_id)
    }

    async fn upload_part(
        &self,
        resource: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String> {
        let (bucket_name, key) = split_bucket_key(Self::path(resource))?;
        let bucket = self.bucket(bucket_name)?;

        let query = HashMap::from([
            ("partNumber".to_string(), part_number.to_string()),
            ("uploadId".to_string(), upload_id.to_string()),
        ]);
        let url = self.request_url(&bucket, bucket_name, Verb::Put, key, query).await?;

        tracing::debug!("S3上传分片: key={}, part={}, size={}", key, part_number, data.len());
        let resp = self.send(bucket_name, resource, self.client.put(url).body(data)).await?;
        header_str(&resp, "etag")
            .filter(|etag| !etag.is_empty())
            .ok_or_else(|| Error::Protocol(format!("{}: part {} has no ETag", resource, part_number)))
    }

    async fn complete_upload(
        &self,
        resource: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let (bucket_name, key) = split_bucket_key(Self::path(resource))?;
        let bucket = self.bucket(bucket_name)?;

        let parts: Vec<Part> = parts
            .iter()
            .map(|p| Part {
                part_number: p.part_number,
                etag: p.etag.clone(),
            })
            .collect();
        let response = bucket
            .complete_multipart_upload(key, upload_id, parts)
            .await
            .map_err(|e| self.wrap_err(bucket_name, resource, e))?;
        self.check_status(bucket_name, resource, response.status_code(), response.bytes())?;

        tracing::debug!("S3分片上传完成: key={}", key);
        Ok(())
    }

    async fn abort_upload(&self, resource: &str, upload_id: &str) -> Result<()> {
        let (bucket_name, key) = split_bucket_key(Self::path(resource))?;
        let bucket = self.bucket(bucket_name)?;
        bucket
            .abort_upload(key, upload_id)
            .await
            .map_err(|e| self.wrap_err(bucket_name, resource, e))
    }

    async fn put(&self, resource: &str, data: Bytes) -> Result<()> {
        let (bucket_name, key) = split_bucket_key(Self::path(resource))?;
        let bucket = self.bucket(bucket_name)?;

        let response = bucket
            .put_object(key, &data)
            .await
            .map_err(|e| self.wrap_err(bucket_name, resource, e))?;
        self.check_status(bucket_name, resource, response.status_code(), response.bytes())
    }
}
