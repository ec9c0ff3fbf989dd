//! Azure Shared Key 签名
//!
//! StringToSign = VERB + 11 standard header slots + CanonicalizedHeaders + CanonicalizedResource.
//! Only Content-Length is ever set among the standard slots; ranges go through `x-ms-range`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

pub const API_VERSION: &str = "2021-08-06";

/// Account name plus decoded account key / 账户共享密钥
pub struct SharedKey {
    account: String,
    key: Vec<u8>,
}

impl SharedKey {
    pub fn new(account: &str, key: &str) -> Result<Self> {
        let key = BASE64
            .decode(key.trim())
            .map_err(|e| Error::Config(format!("Azure account key is not valid base64: {}", e)))?;
        Ok(Self {
            account: account.to_string(),
            key,
        })
    }

    /// Build the string to sign / 构造待签名字符串
    ///
    /// `headers` must already hold every `x-ms-*` header that will be sent.
    pub fn string_to_sign(
        &self,
        method: &str,
        url: &Url,
        headers: &[(String, String)],
        content_length: usize,
    ) -> String {
        let length = if content_length == 0 {
            String::new()
        } else {
            content_length.to_string()
        };

        let mut ms_headers: Vec<(String, &str)> = headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.as_str()))
            .filter(|(k, _)| k.starts_with("x-ms-"))
            .collect();
        ms_headers.sort();
        let canonical_headers: String = ms_headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
            .collect();

        let mut resource = format!("/{}{}", self.account, url.path());
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.to_lowercase(), v.into_owned()))
            .collect();
        params.sort();
        for (k, v) in params {
            resource.push_str(&format!("\n{}:{}", k, v));
        }

        // Content-Encoding, Content-Language, Content-Length, Content-MD5, Content-Type, Date,
        // If-Modified-Since, If-Match, If-None-Match, If-Unmodified-Since, Range
        format!(
            "{}\n\n\n{}\n\n\n\n\n\n\n\n\n{}{}",
            method, length, canonical_headers, resource
        )
    }

    /// `Authorization` header value / 授权头
    pub fn authorization(
        &self,
        method: &str,
        url: &Url,
        headers: &[(String, String)],
        content_length: usize,
    ) -> Result<String> {
        let string_to_sign = self.string_to_sign(method, url, headers, content_length);
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| Error::Config(format!("invalid Azure account key: {}", e)))?;
        mac.update(string_to_sign.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());
        Ok(format!("SharedKey {}:{}", self.account, signature))
    }
}

/// RFC 1123 date for `x-ms-date` / 获取GMT日期字符串
pub fn gmt_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
