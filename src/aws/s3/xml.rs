// Copyright 2016 LambdaStack All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Library Documentation
//!
//! The §6 wire XML schemas, as `quick-xml`/`serde` derived structs. The
//! teacher hand-rolled a `FooParser`/`FooWriter` pair per type
//! (`aws::s3::writeparse`); here the same typed, round-trippable bindings
//! are expressed with `serde` derives, matching how every XML-speaking
//! crate in the retrieval pack does it.

use serde::{Deserialize, Serialize};

use crate::aws::errors::s3_error::ErrorDetail;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename = "CreateBucketConfiguration")]
pub struct CreateBucketConfiguration {
    #[serde(rename = "LocationConstraint")]
    pub location_constraint: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Owner {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "DisplayName")]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentsEntry {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "LastModified")]
    pub last_modified: String,
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "StorageClass", default)]
    pub storage_class: String,
    #[serde(rename = "Owner", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Owner>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommonPrefixEntry {
    #[serde(rename = "Prefix")]
    pub prefix: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "ListBucketResult")]
pub struct ListBucketResult {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Prefix", default)]
    pub prefix: String,
    #[serde(rename = "Marker", default)]
    pub marker: String,
    #[serde(rename = "NextMarker", default, skip_serializing_if = "Option::is_none")]
    pub next_marker: Option<String>,
    #[serde(rename = "MaxKeys")]
    pub max_keys: u32,
    #[serde(rename = "Delimiter", default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(rename = "IsTruncated")]
    pub is_truncated: bool,
    #[serde(rename = "Contents", default)]
    pub contents: Vec<ContentsEntry>,
    #[serde(rename = "CommonPrefixes", default)]
    pub common_prefixes: Vec<CommonPrefixEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "ListBucketResult")]
pub struct ListBucketResultV2 {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Prefix", default)]
    pub prefix: String,
    #[serde(rename = "ContinuationToken", default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
    #[serde(rename = "NextContinuationToken", default, skip_serializing_if = "Option::is_none")]
    pub next_continuation_token: Option<String>,
    #[serde(rename = "StartAfter", default, skip_serializing_if = "Option::is_none")]
    pub start_after: Option<String>,
    #[serde(rename = "KeyCount", default)]
    pub key_count: u32,
    #[serde(rename = "MaxKeys")]
    pub max_keys: u32,
    #[serde(rename = "Delimiter", default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(rename = "IsTruncated")]
    pub is_truncated: bool,
    #[serde(rename = "Contents", default)]
    pub contents: Vec<ContentsEntry>,
    #[serde(rename = "CommonPrefixes", default)]
    pub common_prefixes: Vec<CommonPrefixEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadEntry {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
    #[serde(rename = "Initiated", default)]
    pub initiated: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "ListMultipartUploadsResult")]
pub struct ListMultipartUploadsResult {
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "KeyMarker", default)]
    pub key_marker: String,
    #[serde(rename = "UploadIdMarker", default)]
    pub upload_id_marker: String,
    #[serde(rename = "NextKeyMarker", default, skip_serializing_if = "Option::is_none")]
    pub next_key_marker: Option<String>,
    #[serde(rename = "NextUploadIdMarker", default, skip_serializing_if = "Option::is_none")]
    pub next_upload_id_marker: Option<String>,
    #[serde(rename = "MaxUploads")]
    pub max_uploads: u32,
    #[serde(rename = "IsTruncated")]
    pub is_truncated: bool,
    #[serde(rename = "Upload", default)]
    pub uploads: Vec<UploadEntry>,
    #[serde(rename = "CommonPrefixes", default)]
    pub common_prefixes: Vec<CommonPrefixEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartEntry {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "LastModified", default)]
    pub last_modified: String,
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "Size")]
    pub size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "ListPartsResult")]
pub struct ListPartsResult {
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
    #[serde(rename = "PartNumberMarker", default)]
    pub part_number_marker: u32,
    #[serde(rename = "NextPartNumberMarker", default)]
    pub next_part_number_marker: u32,
    #[serde(rename = "MaxParts")]
    pub max_parts: u32,
    #[serde(rename = "IsTruncated")]
    pub is_truncated: bool,
    #[serde(rename = "Part", default)]
    pub parts: Vec<PartEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletedPart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "CompleteMultipartUpload")]
pub struct CompleteMultipartUpload {
    #[serde(rename = "Part", default)]
    pub parts: Vec<CompletedPart>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "CompleteMultipartUploadResult")]
pub struct CompleteMultipartUploadResult {
    #[serde(rename = "Location", default)]
    pub location: String,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "ETag")]
    pub etag: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "CopyObjectResult")]
pub struct CopyObjectResult {
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "LastModified")]
    pub last_modified: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "CopyPartResult")]
pub struct CopyPartResult {
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "LastModified")]
    pub last_modified: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "InitiateMultipartUploadResult")]
pub struct InitiateMultipartUploadResult {
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename = "Error")]
pub struct XmlError {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
    #[serde(rename = "Resource", default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(rename = "RequestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(rename = "HostId", default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(rename = "BucketName", default, skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
    #[serde(rename = "Key", default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl XmlError {
    /// Parses an S3 XML error document body (§4.5/§6).
    pub fn parse(body: &[u8]) -> Result<XmlError, quick_xml::DeError> {
        quick_xml::de::from_reader(body)
    }

    /// Re-serializes this error back to an XML document (§8 property 8:
    /// parse -> re-emit -> re-parse must be structurally equal).
    pub fn to_xml(&self) -> Result<String, quick_xml::SeError> {
        quick_xml::se::to_string(self)
    }

    /// Whether a response body looks like it could be an `Error` document
    /// at all, cheaply, before paying for a full parse.
    pub fn looks_like_error_document(body: &[u8]) -> bool {
        body.windows(6).any(|w| w == b"<Error")
    }

    pub fn into_detail(self) -> ErrorDetail {
        ErrorDetail {
            message: self.message,
            bucket_name: self.bucket_name,
            key: self.key,
            resource: self.resource,
            request_id: self.request_id,
            host_id: self.host_id,
            status: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_ERROR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
  <Code>NoSuchKey</Code>
  <Message>The specified key does not exist.</Message>
  <Resource>/mybucket/myfoto.jpg</Resource>
  <RequestId>4442587FB7D0A2F9</RequestId>
  <HostId>xyz</HostId>
</Error>"#;

    #[test]
    fn parses_sample_error_document() {
        let err = XmlError::parse(SAMPLE_ERROR.as_bytes()).unwrap();
        assert_eq!(err.code, "NoSuchKey");
        assert_eq!(err.message, "The specified key does not exist.");
        assert_eq!(err.request_id.as_deref(), Some("4442587FB7D0A2F9"));
    }

    #[test]
    fn round_trip_parse_emit_parse_is_structurally_equal() {
        let first = XmlError::parse(SAMPLE_ERROR.as_bytes()).unwrap();
        let emitted = first.to_xml().unwrap();
        let second = XmlError::parse(emitted.as_bytes()).unwrap();
        assert_eq!(first.code, second.code);
        assert_eq!(first.message, second.message);
        assert_eq!(first.request_id, second.request_id);
        assert_eq!(first.host_id, second.host_id);
    }

    #[test]
    fn list_bucket_result_v2_parses_continuation_token() {
        let xml = r#"<ListBucketResult><Name>b</Name><Prefix>a/</Prefix>
            <ContinuationToken>tok</ContinuationToken><KeyCount>2</KeyCount>
            <MaxKeys>1000</MaxKeys><IsTruncated>false</IsTruncated>
            <Contents><Key>a/b</Key><LastModified>x</LastModified><ETag>"e"</ETag><Size>1</Size></Contents>
            </ListBucketResult>"#;
        let parsed: ListBucketResultV2 = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(parsed.continuation_token.as_deref(), Some("tok"));
        assert_eq!(parsed.contents.len(), 1);
        assert_eq!(parsed.contents[0].key, "a/b");
    }

    #[test]
    fn complete_multipart_upload_serializes_parts_in_order() {
        let body = CompleteMultipartUpload {
            parts: vec![
                CompletedPart { part_number: 1, etag: "\"a\"".to_string() },
                CompletedPart { part_number: 2, etag: "\"b\"".to_string() },
            ],
        };
        let xml = quick_xml::se::to_string(&body).unwrap();
        let a_pos = xml.find("\"a\"").unwrap();
        let b_pos = xml.find("\"b\"").unwrap();
        assert!(a_pos < b_pos);
    }
}
