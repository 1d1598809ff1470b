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

//! Client Documentation
//!
//! Object-level request/response types: `ObjectStat`, listing request
//! parameters for both listing generations, precondition headers, and the
//! multipart session data type the engine (`s3::multipart`) advances
//! through its state machine (§3 data model, §4.7.5).

use std::collections::HashMap;

use crate::aws::s3::header::{CannedAcl, ServerSideEncryption};

/// §3 data model: key, size, etag, last-modified, content-type, user
/// metadata, storage class, version id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectStat {
    pub key: String,
    pub size: u64,
    /// Hex MD5 for non-multipart uploads; composite hash with a `-N`
    /// suffix for multipart uploads (GLOSSARY).
    pub etag: String,
    pub last_modified: String,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
    pub storage_class: Option<String>,
    pub version_id: Option<String>,
}

impl ObjectStat {
    /// Whether `etag` is shaped like a multipart ETag (`<hex>-<N>`), per
    /// the GLOSSARY definition. Used by the resume path (§4.7.3) to decide
    /// whether a discovered object was itself produced by a multipart
    /// upload.
    pub fn is_multipart_etag(&self) -> bool {
        self.etag.trim_matches('"').rsplit_once('-').map(|(_, suffix)| suffix.chars().all(|c| c.is_ascii_digit()) && !suffix.is_empty()).unwrap_or(false)
    }
}

/// Precondition headers shared by `GetObject` and `CopyObject` (§6, S6).
#[derive(Debug, Clone, Default)]
pub struct Preconditions {
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
    pub if_unmodified_since: Option<String>,
}

impl Preconditions {
    pub fn is_empty(&self) -> bool {
        self.if_match.is_none() && self.if_none_match.is_none() && self.if_modified_since.is_none() && self.if_unmodified_since.is_none()
    }

    /// Renders the set headers as `(name, value)` pairs to attach to a
    /// `SignedRequest`.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::new();
        if let Some(v) = &self.if_match {
            headers.push(("if-match", v.clone()));
        }
        if let Some(v) = &self.if_none_match {
            headers.push(("if-none-match", v.clone()));
        }
        if let Some(v) = &self.if_modified_since {
            headers.push(("if-modified-since", v.clone()));
        }
        if let Some(v) = &self.if_unmodified_since {
            headers.push(("if-unmodified-since", v.clone()));
        }
        headers
    }
}

#[derive(Debug, Clone)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
    pub acl: Option<CannedAcl>,
    pub sse: Option<ServerSideEncryption>,
    /// Ask the executor to compute and attach `Content-MD5` in addition to
    /// the SigV4 payload SHA-256 (§3 data model).
    pub compute_content_md5: bool,
}

impl PutObjectRequest {
    pub fn new<B: Into<String>, K: Into<String>>(bucket: B, key: K) -> PutObjectRequest {
        PutObjectRequest {
            bucket: bucket.into(),
            key: key.into(),
            content_type: None,
            metadata: HashMap::new(),
            acl: None,
            sse: None,
            compute_content_md5: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GetObjectRequest {
    pub bucket: String,
    pub key: String,
    /// `bytes=a-b` (no `bytes=` prefix), per §6's `Range` header.
    pub range: Option<(u64, u64)>,
    pub preconditions: Preconditions,
    pub version_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CopyObjectRequest {
    pub source_bucket: String,
    pub source_key: String,
    pub source_version_id: Option<String>,
    pub dest_bucket: String,
    pub dest_key: String,
    pub preconditions: Preconditions,
    pub metadata: HashMap<String, String>,
    /// Replace metadata rather than copy it from the source (`x-amz-metadata-directive: REPLACE`).
    pub replace_metadata: bool,
    pub acl: Option<CannedAcl>,
}

/// Selects between the v1 (`marker`) and v2 (`continuation-token`) listing
/// APIs (§4.6). Both share the same request shape; only the cursor field
/// differs, which `ListObjectsRequest` carries as `ListingApiVersion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingApiVersion {
    V1,
    V2,
}

#[derive(Debug, Clone)]
pub struct ListObjectsRequest {
    pub bucket: String,
    pub prefix: String,
    pub api_version: ListingApiVersion,
    /// `"/"` when the caller wants non-recursive (directory-like) listing;
    /// `None` for a fully recursive listing (§4.6).
    pub delimiter: Option<String>,
    /// Page size; defaults to 1000, caller may override down to 1 (§4.6).
    pub max_keys: u32,
    pub start_after: Option<String>,
}

impl ListObjectsRequest {
    pub fn new<B: Into<String>>(bucket: B, recursive: bool) -> ListObjectsRequest {
        ListObjectsRequest {
            bucket: bucket.into(),
            prefix: String::new(),
            api_version: ListingApiVersion::V2,
            delimiter: if recursive { None } else { Some("/".to_string()) },
            max_keys: 1000,
            start_after: None,
        }
    }

    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> ListObjectsRequest {
        self.prefix = prefix.into();
        self
    }

    pub fn with_page_size(mut self, max_keys: u32) -> ListObjectsRequest {
        self.max_keys = max_keys.max(1);
        self
    }

    pub fn with_api_version(mut self, version: ListingApiVersion) -> ListObjectsRequest {
        self.api_version = version;
        self
    }
}

/// One completed part, as recorded in a multipart session's completed-parts
/// list and as required by `CompleteMultipartUpload` (§3, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPartRecord {
    pub part_number: u32,
    pub etag: String,
    pub size: u64,
}

/// §3 data model: one outstanding large-upload session. Owned by the
/// multipart engine (`s3::multipart`) for the session's lifetime.
#[derive(Debug, Clone)]
pub struct MultipartSession {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub metadata: HashMap<String, String>,
    /// Digest of `metadata` at initiation time (§4.7.3's "same metadata
    /// hash" resume requirement). Kept alongside `metadata` rather than
    /// recomputed on demand so a session built from a bare resume candidate
    /// (no metadata recovered) can still carry the hash it was matched on.
    pub metadata_hash: String,
    pub sse: Option<ServerSideEncryption>,
    pub part_size: u64,
    /// `None` when the total size was not known ahead of time (§4.7.1).
    pub total_size_hint: Option<u64>,
    pub next_part_number: u32,
    pub completed_parts: Vec<CompletedPartRecord>,
    pub failed: bool,
}

impl MultipartSession {
    pub fn new(bucket: String, key: String, upload_id: String, part_size: u64, total_size_hint: Option<u64>) -> MultipartSession {
        MultipartSession {
            bucket,
            key,
            upload_id,
            metadata: HashMap::new(),
            metadata_hash: String::new(),
            sse: None,
            part_size,
            total_size_hint,
            next_part_number: 1,
            completed_parts: Vec::new(),
            failed: false,
        }
    }

    /// §3 invariant: for a completed session the sum of part sizes equals
    /// the uploaded object's reported size and parts are numbered
    /// contiguously `1..N`.
    pub fn is_contiguous(&self) -> bool {
        let mut numbers: Vec<u32> = self.completed_parts.iter().map(|p| p.part_number).collect();
        numbers.sort_unstable();
        numbers.iter().enumerate().all(|(i, &n)| n as usize == i + 1)
    }

    pub fn total_uploaded_size(&self) -> u64 {
        self.completed_parts.iter().map(|p| p.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_multipart_etag_detects_dash_suffix() {
        let mut stat = ObjectStat::default();
        stat.etag = "\"9a0364b9e99bb480dd25e1f0284c8555-2\"".to_string();
        assert!(stat.is_multipart_etag());

        stat.etag = "\"9a0364b9e99bb480dd25e1f0284c8555\"".to_string();
        assert!(!stat.is_multipart_etag());
    }

    #[test]
    fn list_objects_request_default_recursive_has_no_delimiter() {
        let req = ListObjectsRequest::new("b", true);
        assert!(req.delimiter.is_none());
        assert_eq!(req.max_keys, 1000);
    }

    #[test]
    fn list_objects_request_non_recursive_uses_slash_delimiter() {
        let req = ListObjectsRequest::new("b", false);
        assert_eq!(req.delimiter.as_deref(), Some("/"));
    }

    #[test]
    fn list_objects_request_page_size_floor_is_one() {
        let req = ListObjectsRequest::new("b", true).with_page_size(0);
        assert_eq!(req.max_keys, 1);
    }

    #[test]
    fn multipart_session_contiguity_check() {
        let mut session = MultipartSession::new("b".into(), "k".into(), "upload-1".into(), 5 * 1024 * 1024, Some(10 * 1024 * 1024));
        session.completed_parts.push(CompletedPartRecord { part_number: 1, etag: "a".into(), size: 5 * 1024 * 1024 });
        session.completed_parts.push(CompletedPartRecord { part_number: 2, etag: "b".into(), size: 5 * 1024 * 1024 });
        assert!(session.is_contiguous());
        assert_eq!(session.total_uploaded_size(), 10 * 1024 * 1024);

        session.completed_parts.push(CompletedPartRecord { part_number: 4, etag: "c".into(), size: 1 });
        assert!(!session.is_contiguous());
    }

    #[test]
    fn preconditions_headers_only_include_set_fields() {
        let mut preconditions = Preconditions::default();
        assert!(preconditions.is_empty());
        preconditions.if_match = Some("\"etag\"".to_string());
        assert_eq!(preconditions.headers(), vec![("if-match", "\"etag\"".to_string())]);
    }
}
