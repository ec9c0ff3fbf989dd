//! Backend configuration / 后端配置
//!
//! Options arrive already resolved from the caller (credentials, region, endpoint...).
//! Unknown keys are rejected instead of silently ignored.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default block size, also the S3 minimum part size (5 MiB) / 默认块大小
pub const DEFAULT_BLOCK_SIZE: usize = 5 * 1024 * 1024;

/// Read-ahead behaviour of read handles / 读取预取模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReadAheadMode {
    /// Fetch exactly what each read asks for / 不预取
    None,
    /// Fetch at least one block past the read position / 按块预取
    #[default]
    Readahead,
    /// Fetch the whole object on first read / 一次性读取全部
    All,
}

impl FromStr for ReadAheadMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(ReadAheadMode::None),
            "readahead" => Ok(ReadAheadMode::Readahead),
            "all" => Ok(ReadAheadMode::All),
            other => Err(Error::Config(format!("unknown read-ahead mode: {}", other))),
        }
    }
}

/// Backend configuration (immutable after construction) / 后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Named credential profile (S3) / 凭证配置名
    #[serde(default)]
    pub profile: Option<String>,
    /// Access key id (S3) or account key (Azure) / 访问密钥
    #[serde(default)]
    pub key: Option<String>,
    /// Secret access key (S3) / 私密密钥
    #[serde(default)]
    pub secret: Option<String>,
    /// Session token (S3 temporary credentials) / 会话令牌
    #[serde(default)]
    pub session_token: Option<String>,
    /// OAuth bearer token (GCS) / 访问令牌
    #[serde(default)]
    pub token: Option<String>,
    /// Storage account name (Azure) / 存储账户
    #[serde(default)]
    pub account: Option<String>,
    /// Billing project (GCS requester pays) / 计费项目
    #[serde(default)]
    pub project: Option<String>,
    /// Region, `us-east-1` when absent / 区域
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint override (MinIO, emulators...) / 自定义端点
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Unsigned requests / 匿名访问
    #[serde(default)]
    pub anon: bool,
    /// Bill the requester instead of the bucket owner / 请求者付费
    #[serde(default)]
    pub requester_pays: bool,
    /// Write block threshold and read-ahead block / 块大小
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    #[serde(default)]
    pub read_ahead: ReadAheadMode,
    /// HTTP method override (HTTP backend only) / HTTP方法
    #[serde(default)]
    pub method: Option<String>,
    /// Extra request headers (HTTP backend only) / 附加请求头
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Requests in flight per batch / 最大并发数
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Retries of a transient failure before it is surfaced / 最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Per-request timeout in seconds / 单请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Objects per listing page (memory backend, S3 max-keys) / 每页数量
    #[serde(default)]
    pub page_size: Option<usize>,
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_max_concurrency() -> usize {
    64
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    5_000
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            profile: None,
            key: None,
            secret: None,
            session_token: None,
            token: None,
            account: None,
            project: None,
            region: None,
            endpoint_url: None,
            anon: false,
            requester_pays: false,
            block_size: default_block_size(),
            read_ahead: ReadAheadMode::default(),
            method: None,
            headers: HashMap::new(),
            max_concurrency: default_max_concurrency(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            page_size: None,
        }
    }
}

impl BackendConfig {
    /// Parse from a JSON object, rejecting unrecognized options / 从JSON解析
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: BackendConfig = serde_json::from_value(value)
            .map_err(|e| Error::Config(format!("invalid backend options: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(s)
            .map_err(|e| Error::Config(format!("invalid backend options: {}", e)))?;
        Self::from_value(value)
    }

    /// Checks that do not depend on the protocol / 通用校验
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::Config("block_size must be positive".into()));
        }
        if self.max_concurrency == 0 {
            return Err(Error::Config("max_concurrency must be positive".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be positive".into()));
        }
        if self.page_size == Some(0) {
            return Err(Error::Config("page_size must be positive".into()));
        }
        Ok(())
    }

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or("us-east-1")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
