//! Path and response helpers shared by the drivers / 驱动共用的路径与响应工具

use bytes::Bytes;
use reqwest::{Response, StatusCode};

use crate::error::{Error, Result};

/// Remove a `scheme://` prefix if present / 移除协议前缀
/// `s3://bucket/key` -> `bucket/key`
pub fn strip_protocol<'a>(path: &'a str, protocols: &[&str]) -> &'a str {
    for protocol in protocols {
        if let Some(rest) = path.strip_prefix(protocol).and_then(|p| p.strip_prefix("://")) {
            return rest;
        }
    }
    path
}

/// Remove whatever `scheme://` prefix is present / 移除任意协议前缀
pub fn strip_scheme(path: &str) -> &str {
    path.split_once("://").map(|(_, rest)| rest).unwrap_or(path)
}

/// Split `bucket/key` into its parts / 拆分存储桶与对象键
pub fn split_bucket_key(path: &str) -> Result<(&str, &str)> {
    let path = path.trim_start_matches('/');
    match path.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok((bucket, key)),
        _ => Err(Error::Protocol(format!("bad path, expected bucket/key: {}", path))),
    }
}

/// Split a listing prefix; the key part may be empty / 拆分列表前缀
pub fn split_bucket_prefix(path: &str) -> Result<(&str, &str)> {
    let path = path.trim_start_matches('/');
    let (bucket, prefix) = path.split_once('/').unwrap_or((path, ""));
    if bucket.is_empty() {
        return Err(Error::Protocol("bad path, bucket name is empty".to_string()));
    }
    Ok((bucket, prefix))
}

/// Map an HTTP failure status onto the error taxonomy / 按状态码分类错误
pub fn classify_status(status: StatusCode, resource: &str, detail: &str) -> Error {
    let msg = if detail.is_empty() {
        format!("{} returned {}", resource, status)
    } else {
        format!("{} returned {}: {}", resource, status, truncate(detail, 512))
    };
    match status.as_u16() {
        401 | 403 => Error::Auth(msg),
        404 => Error::NotFound(msg),
        408 | 429 => Error::TransientNetwork(msg),
        s if s >= 500 => Error::TransientNetwork(msg),
        _ => Error::Protocol(msg),
    }
}

/// Pass a successful response through, turn anything else into an error / 检查响应状态
pub async fn check_response(resp: Response, resource: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify_status(status, resource, &body))
}

/// Read a ranged GET body; 416 means the range starts past the end and yields no bytes
pub async fn read_range_body(resp: Response, resource: &str) -> Result<Bytes> {
    if resp.status() == StatusCode::RANGE_NOT_SATISFIABLE {
        return Ok(Bytes::new());
    }
    let resp = check_response(resp, resource).await?;
    Ok(resp.bytes().await?)
}

pub fn header_str(resp: &Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Content length from headers / 从响应头获取长度
pub fn content_length(resp: &Response) -> Option<u64> {
    header_str(resp, "content-length").and_then(|v| v.parse().ok())
}

/// Strip surrounding quotes from an ETag / 去掉ETag引号
pub fn trim_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_protocol() {
        assert_eq!(strip_protocol("s3://bucket/key", &["s3", "s3a"]), "bucket/key");
        assert_eq!(strip_protocol("s3a://bucket/key", &["s3", "s3a"]), "bucket/key");
        assert_eq!(strip_protocol("bucket/key", &["s3"]), "bucket/key");
        assert_eq!(strip_protocol("gs://b/k", &["s3"]), "gs://b/k");
        assert_eq!(strip_scheme("gs://b/k"), "b/k");
        assert_eq!(strip_scheme("b/k"), "b/k");
    }

    #[test]
    fn test_split_bucket_key() {
        assert_eq!(split_bucket_key("bucket/a/b.bin").unwrap(), ("bucket", "a/b.bin"));
        assert_eq!(split_bucket_key("/bucket/key").unwrap(), ("bucket", "key"));
        assert!(split_bucket_key("bucket").is_err());
        assert!(split_bucket_key("bucket/").is_err());
        assert_eq!(split_bucket_prefix("bucket").unwrap(), ("bucket", ""));
        assert_eq!(split_bucket_prefix("bucket/dir/").unwrap(), ("bucket", "dir/"));
        assert!(split_bucket_prefix("").is_err());
    }

    #[test]
    fn test_classify_status() {
        use crate::ErrorKind;
        let kind = |code: u16| classify_status(StatusCode::from_u16(code).unwrap(), "r", "").kind();
        assert_eq!(kind(403), ErrorKind::Auth);
        assert_eq!(kind(401), ErrorKind::Auth);
        assert_eq!(kind(404), ErrorKind::NotFound);
        assert_eq!(kind(503), ErrorKind::TransientNetwork);
        assert_eq!(kind(429), ErrorKind::TransientNetwork);
        assert_eq!(kind(400), ErrorKind::Protocol);
    }

    #[test]
    fn test_trim_etag() {
        assert_eq!(trim_etag("\"abc\""), "abc");
        assert_eq!(trim_etag("abc"), "abc");
    }
}
