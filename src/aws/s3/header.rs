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
//! Small header helpers shared by bucket- and object-level verbs: the
//! canned-ACL header (§4.2a) and the server-side-encryption descriptor
//! carried on a multipart session (§3 data model).

use std::fmt;

/// `x-amz-acl` values (§4.2a). Full ACL grant/get XML codecs are out of
/// scope (§1) — this crate only renders the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CannedAcl {
    Private,
    PublicRead,
    PublicReadWrite,
    AuthenticatedRead,
    BucketOwnerRead,
    BucketOwnerFullControl,
}

impl CannedAcl {
    pub fn header_value(&self) -> &'static str {
        match self {
            CannedAcl::Private => "private",
            CannedAcl::PublicRead => "public-read",
            CannedAcl::PublicReadWrite => "public-read-write",
            CannedAcl::AuthenticatedRead => "authenticated-read",
            CannedAcl::BucketOwnerRead => "bucket-owner-read",
            CannedAcl::BucketOwnerFullControl => "bucket-owner-full-control",
        }
    }
}

impl fmt::Display for CannedAcl {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.header_value())
    }
}

/// Server-side-encryption descriptor attached to a multipart session (§3).
/// Key derivation for customer-supplied keys is explicitly out of scope
/// (§1); this only renders the headers the remote expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSideEncryption {
    /// `x-amz-server-side-encryption: AES256`.
    Aes256,
    /// `x-amz-server-side-encryption: aws:kms` with an optional KMS key id.
    AwsKms { key_id: Option<String> },
    /// Customer-supplied key (`x-amz-server-side-encryption-customer-*`).
    /// The key material itself is opaque bytes the caller already derived.
    CustomerProvided { algorithm: String, key_base64: String, key_md5_base64: String },
}

impl ServerSideEncryption {
    /// Renders this descriptor as the `(header, value)` pairs to attach to
    /// a `SignedRequest`.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        match self {
            ServerSideEncryption::Aes256 => vec![("x-amz-server-side-encryption", "AES256".to_string())],
            ServerSideEncryption::AwsKms { key_id } => {
                let mut headers = vec![("x-amz-server-side-encryption", "aws:kms".to_string())];
                if let Some(id) = key_id {
                    headers.push(("x-amz-server-side-encryption-aws-kms-key-id", id.clone()));
                }
                headers
            }
            ServerSideEncryption::CustomerProvided { algorithm, key_base64, key_md5_base64 } => vec![
                ("x-amz-server-side-encryption-customer-algorithm", algorithm.clone()),
                ("x-amz-server-side-encryption-customer-key", key_base64.clone()),
                ("x-amz-server-side-encryption-customer-key-md5", key_md5_base64.clone()),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canned_acl_renders_expected_header_values() {
        assert_eq!(CannedAcl::Private.header_value(), "private");
        assert_eq!(CannedAcl::PublicReadWrite.header_value(), "public-read-write");
        assert_eq!(CannedAcl::BucketOwnerFullControl.header_value(), "bucket-owner-full-control");
    }

    #[test]
    fn sse_aes256_renders_single_header() {
        let headers = ServerSideEncryption::Aes256.headers();
        assert_eq!(headers, vec![("x-amz-server-side-encryption", "AES256".to_string())]);
    }

    #[test]
    fn sse_kms_includes_key_id_when_present() {
        let headers = ServerSideEncryption::AwsKms { key_id: Some("key-123".to_string()) }.headers();
        assert!(headers.iter().any(|(name, value)| *name == "x-amz-server-side-encryption-aws-kms-key-id" && value == "key-123"));
    }
}
