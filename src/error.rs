//! Error taxonomy / 错误分类
//!
//! Adapter errors are produced with one of the plain kinds below. Engines wrap them in a
//! context variant (`Range`, `UploadState`) that keeps the adapter error as `source()`.
//! `kind()` sees through `Range`; `root_kind()` also sees through `UploadState`.

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kind, independent of any context wrapping / 错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Auth,
    NotFound,
    TransientNetwork,
    Protocol,
    UploadState,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Auth => "AuthError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::TransientNetwork => "TransientNetworkError",
            ErrorKind::Protocol => "ProtocolError",
            ErrorKind::UploadState => "UploadStateError",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid configuration, fatal at construction / 配置错误
    #[error("config error: {0}")]
    Config(String),

    /// Credentials rejected by the remote service / 认证失败
    #[error("auth error: {0}")]
    Auth(String),

    /// Resource absent, never retried / 资源不存在
    #[error("not found: {0}")]
    NotFound(String),

    /// Timeout, reset or server-side hiccup, retryable / 临时网络错误
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// Malformed response or unsupported capability / 协议错误
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Failure while fetching one member of a range batch
    #[error("{resource} [{start}, {end}): {source}")]
    Range {
        resource: String,
        start: u64,
        end: u64,
        #[source]
        source: Box<Error>,
    },

    /// Illegal transition or failed step of an upload session / 上传状态错误
    #[error("upload of {resource} failed at {stage}{}", .source.as_ref().map(|e| format!(": {}", e)).unwrap_or_default())]
    UploadState {
        resource: String,
        stage: String,
        #[source]
        source: Option<Box<Error>>,
    },
}

impl Error {
    pub fn unsupported(backend: &str, operation: &str) -> Self {
        Error::Protocol(format!("{} backend does not support {}", backend, operation))
    }

    pub fn upload_state(resource: &str, stage: impl Into<String>) -> Self {
        Error::UploadState {
            resource: resource.to_string(),
            stage: stage.into(),
            source: None,
        }
    }

    pub fn upload_failed(resource: &str, stage: impl Into<String>, source: Error) -> Self {
        Error::UploadState {
            resource: resource.to_string(),
            stage: stage.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn with_range(self, resource: &str, start: u64, end: u64) -> Self {
        Error::Range {
            resource: resource.to_string(),
            start,
            end,
            source: Box::new(self),
        }
    }

    /// Innermost taxonomy kind. An upload step failure reports `UploadState` even when the
    /// adapter error underneath is transient; use [`Error::root_kind`] to see that one.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::Auth(_) => ErrorKind::Auth,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::TransientNetwork(_) => ErrorKind::TransientNetwork,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::Range { source, .. } => source.kind(),
            Error::UploadState { .. } => ErrorKind::UploadState,
        }
    }

    /// Kind of the adapter error at the bottom of the chain
    pub fn root_kind(&self) -> ErrorKind {
        match self {
            Error::Range { source, .. } => source.root_kind(),
            Error::UploadState { source: Some(source), .. } => source.root_kind(),
            other => other.kind(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientNetwork
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            Error::TransientNetwork(e.to_string())
        } else if e.is_builder() {
            Error::Config(e.to_string())
        } else {
            Error::Protocol(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(e.to_string()),
            std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::Interrupted => Error::TransientNetwork(e.to_string()),
            _ => Error::Protocol(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(format!("invalid JSON: {}", e))
    }
}

impl From<quick_xml::DeError> for Error {
    fn from(e: quick_xml::DeError) -> Self {
        Error::Protocol(format!("invalid XML: {}", e))
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Error::TransientNetwork(format!("request timed out: {}", e))
    }
}
