//! Azure Blob XML 数据类型

use serde::Deserialize;

use crate::storage::ObjectInfo;
use crate::utils::trim_etag;

/// List Blobs response / 列表响应
#[derive(Debug, Deserialize)]
pub struct EnumerationResults {
    #[serde(rename = "Blobs", default)]
    pub blobs: Blobs,
    #[serde(rename = "NextMarker", default)]
    pub next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Blobs {
    #[serde(rename = "Blob", default)]
    pub blob: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
pub struct BlobItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Properties")]
    pub properties: BlobProperties,
}

#[derive(Debug, Deserialize)]
pub struct BlobProperties {
    #[serde(rename = "Content-Length")]
    pub content_length: u64,
    #[serde(rename = "Etag", default)]
    pub etag: Option<String>,
    #[serde(rename = "Last-Modified", default)]
    pub last_modified: Option<String>,
}

impl BlobItem {
    pub fn into_info(self, container: &str) -> ObjectInfo {
        ObjectInfo::file(format!("{}/{}", container, self.name), self.properties.content_length)
            .with_etag(self.properties.etag.as_deref().map(trim_etag))
            .with_last_modified(self.properties.last_modified)
    }
}

impl EnumerationResults {
    /// Continuation marker, absent on the last page / 下一页标记
    pub fn next(&self) -> Option<String> {
        self.next_marker.clone().filter(|m| !m.is_empty())
    }
}

/// Put Block List body, blocks committed in the given order / 提交块列表
pub fn block_list_body<'a>(block_ids: impl Iterator<Item = &'a str>) -> String {
    let mut body = String::from(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>"#);
    for id in block_ids {
        body.push_str("<Latest>");
        body.push_str(&quick_xml::escape::escape(id));
        body.push_str("</Latest>");
    }
    body.push_str("</BlockList>");
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enumeration() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://acct.blob.core.windows.net/" ContainerName="data">
  <Prefix>dir/</Prefix>
  <Blobs>
    <Blob>
      <Name>dir/a.bin</Name>
      <Properties>
        <Last-Modified>Mon, 01 Jan 2024 00:00:00 GMT</Last-Modified>
        <Etag>0x8DB</Etag>
        <Content-Length>12</Content-Length>
        <BlobType>BlockBlob</BlobType>
      </Properties>
    </Blob>
  </Blobs>
  <NextMarker>2!abc</NextMarker>
</EnumerationResults>"#;
        let result: EnumerationResults = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(result.next().as_deref(), Some("2!abc"));
        let info = result.blobs.blob.into_iter().next().unwrap().into_info("data");
        assert_eq!(info.name, "data/dir/a.bin");
        assert_eq!(info.size, 12);
        assert_eq!(info.etag.as_deref(), Some("0x8DB"));
    }

    #[test]
    fn test_last_page_has_no_marker() {
        let xml = r#"<EnumerationResults ContainerName="data"><Blobs></Blobs><NextMarker></NextMarker></EnumerationResults>"#;
        let result: EnumerationResults = quick_xml::de::from_str(xml).unwrap();
        assert!(result.blobs.blob.is_empty());
        assert_eq!(result.next(), None);
    }

    #[test]
    fn test_block_list_body() {
        assert_eq!(
            block_list_body(["a", "b"].into_iter()),
            r#"<?xml version="1.0" encoding="utf-8"?><BlockList><Latest>a</Latest><Latest>b</Latest></BlockList>"#
        );
    }
}
