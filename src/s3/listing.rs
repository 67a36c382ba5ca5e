// ListObjectsV2 request building and response parsing

use serde::Deserialize;

use crate::error::ProxyError;

#[derive(Debug, Deserialize)]
struct ListBucketResult {
    #[serde(rename = "Contents", default)]
    contents: Vec<ListedContents>,
}

#[derive(Debug, Deserialize)]
struct ListedContents {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "Size", default)]
    size: u64,
    #[serde(rename = "ETag", default)]
    etag: String,
}

/// One object from a ListObjectsV2 result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
    /// ETag with surrounding quotes removed
    pub etag: String,
}

/// Query string for a ListObjectsV2 call restricted to `prefix`
pub fn list_objects_v2_query(prefix: &str, max_keys: u32) -> String {
    format!(
        "list-type=2&max-keys={}&prefix={}",
        max_keys,
        urlencoding::encode(prefix)
    )
}

pub fn parse_list_objects_v2(xml: &str) -> Result<Vec<ListedObject>, ProxyError> {
    let result: ListBucketResult = quick_xml::de::from_str(xml)
        .map_err(|e| ProxyError::MetadataLookup(format!("invalid listing response: {}", e)))?;

    Ok(result
        .contents
        .into_iter()
        .map(|c| ListedObject {
            key: c.key,
            size: c.size,
            etag: c.etag.trim_matches('"').to_string(),
        })
        .collect())
}
