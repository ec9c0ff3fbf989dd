//! S3 XML 数据类型

use serde::Deserialize;

use crate::storage::ObjectInfo;
use crate::utils::trim_etag;

/// ListObjectsV2 response / 列表响应
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListBucketResult {
    #[serde(default)]
    pub contents: Vec<S3Object>,
    #[serde(default)]
    pub next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct S3Object {
    pub key: String,
    pub size: u64,
    #[serde(rename = "ETag", default)]
    pub e_tag: Option<String>,
    #[serde(default)]
    pub last_modified: Option<String>,
}

impl S3Object {
    pub fn into_info(self, bucket: &str) -> ObjectInfo {
        ObjectInfo::file(format!("{}/{}", bucket, self.key), self.size)
            .with_etag(self.e_tag.as_deref().map(trim_etag))
            .with_last_modified(self.last_modified)
    }
}

impl ListBucketResult {
    /// 下一页令牌，最后一页为空
    pub fn next(&self) -> Option<String> {
        self.next_continuation_token.clone().filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_result() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>data</Name>
  <Prefix>dir/</Prefix>
  <KeyCount>2</KeyCount>
  <MaxKeys>2</MaxKeys>
  <IsTruncated>true</IsTruncated>
  <Contents>
    <Key>dir/a.bin</Key>
    <LastModified>2024-01-01T00:00:00.000Z</LastModified>
    <ETag>"9b2cf535f27731c974343645a3985328"</ETag>
    <Size>12</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <Contents>
    <Key>dir/b.bin</Key>
    <Size>0</Size>
  </Contents>
  <NextContinuationToken>1ueGcxLPRx1Tr/XYExHnhbYLgveDs2J/wm36Hy4vbOwM=</NextContinuationToken>
</ListBucketResult>"#;
        let result: ListBucketResult = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(
            result.next().as_deref(),
            Some("1ueGcxLPRx1Tr/XYExHnhbYLgveDs2J/wm36Hy4vbOwM=")
        );
        let infos: Vec<ObjectInfo> = result.contents.into_iter().map(|o| o.into_info("data")).collect();
        assert_eq!(infos[0].name, "data/dir/a.bin");
        assert_eq!(infos[0].size, 12);
        assert_eq!(infos[0].etag.as_deref(), Some("9b2cf535f27731c974343645a3985328"));
        assert_eq!(infos[1].etag, None);
    }

    #[test]
    fn test_last_page_has_no_token() {
        let xml = r#"<ListBucketResult><Name>data</Name><IsTruncated>false</IsTruncated></ListBucketResult>"#;
        let result: ListBucketResult = quick_xml::de::from_str(xml).unwrap();
        assert!(result.contents.is_empty());
        assert_eq!(result.next(), None);
    }
}
