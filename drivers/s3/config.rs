//! S3驱动配置

use s3::creds::Credentials;
use s3::Region;

use crate::config::BackendConfig;
use crate::error::{Error, Result};

/// S3 minimum part size except for the last part (5 MiB) / 最小分片大小
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Credential source resolved from the backend options / 凭证来源
#[derive(Debug, Clone)]
pub enum S3Credentials {
    Anonymous,
    Static {
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
    },
    Profile(String),
}

/// S3配置
#[derive(Debug, Clone)]
pub struct S3Config {
    /// 区域
    pub region: String,
    /// S3端点地址
    /// AWS: https://s3.{region}.amazonaws.com
    /// MinIO: http://localhost:9000
    pub endpoint: String,
    /// 强制使用路径风格（而非虚拟主机风格）
    /// 自定义端点时默认开启
    pub force_path_style: bool,
    pub credentials: S3Credentials,
    /// 请求者付费
    pub requester_pays: bool,
    /// 每页最大对象数
    pub max_keys: Option<usize>,
    /// 每个主机保留的空闲连接数
    pub max_concurrency: usize,
}

impl S3Config {
    pub fn from_backend_config(config: &BackendConfig) -> Result<Self> {
        let credentials = if config.anon {
            S3Credentials::Anonymous
        } else if let (Some(key), Some(secret)) = (&config.key, &config.secret) {
            S3Credentials::Static {
                access_key_id: key.clone(),
                secret_access_key: secret.clone(),
                session_token: config.session_token.clone(),
            }
        } else if config.key.is_some() || config.secret.is_some() {
            return Err(Error::Config("S3 needs both key and secret".into()));
        } else if let Some(profile) = &config.profile {
            S3Credentials::Profile(profile.clone())
        } else {
            return Err(Error::Config(
                "S3 needs key/secret, a profile, or anon=true".into(),
            ));
        };

        let region = config.region().to_string();
        let (endpoint, force_path_style) = match &config.endpoint_url {
            Some(url) => (url.trim_end_matches('/').to_string(), true),
            None => (format!("https://s3.{}.amazonaws.com", region), false),
        };

        Ok(Self {
            region,
            endpoint,
            force_path_style,
            credentials,
            requester_pays: config.requester_pays,
            max_keys: config.page_size,
            max_concurrency: config.max_concurrency,
        })
    }

    pub fn region(&self) -> Region {
        Region::Custom {
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
        }
    }

    /// Build rust-s3 credentials / 创建S3凭证
    pub fn build_credentials(&self) -> Result<Credentials> {
        let creds = match &self.credentials {
            S3Credentials::Anonymous => Credentials::anonymous(),
            S3Credentials::Static {
                access_key_id,
                secret_access_key,
                session_token,
            } => Credentials::new(
                Some(access_key_id.as_str()),
                Some(secret_access_key.as_str()),
                session_token.as_deref(),
                None,
                None,
            ),
            S3Credentials::Profile(profile) => Credentials::from_profile(Some(profile.as_str())),
        };
        creds.map_err(|e| Error::Config(format!("failed to create S3 credentials: {}", e)))
    }
}
