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
//! `Endpoint` normalizes the host a caller configured and decides, per
//! request, whether to address a bucket with virtual-host-style
//! (`bucket.host`) or path-style (`host/bucket`) URLs (§4.1). It also holds
//! the bucket-name validator, since the grammar check is the other half of
//! "can this name go in a hostname at all".

use std::net::IpAddr;

use url::Url;

use crate::aws::errors::s3_error::S3Error;

/// Suffixes recognized as AWS/Google-hosted S3(-compatible) endpoints
/// (§4.1 rule 3). Anything else is treated as a generic S3-compatible
/// deployment and defaults to path-style.
const KNOWN_SUFFIXES: &[&str] = &["amazonaws.com", "amazonaws.com.cn", "storage.googleapis.com"];

/// Immutable endpoint configuration (§3 data model). Built once at client
/// construction; `Endpoint::build_url` is called per request.
#[derive(Debug, Clone)]
pub struct Endpoint {
    scheme: String,
    host: String,
    port: Option<u16>,
    secure: bool,
    is_aws: bool,
    is_dualstack: bool,
}

impl Endpoint {
    /// Parses `raw` (e.g. `https://s3.amazonaws.com`, `http://localhost:9000`)
    /// into a normalized endpoint. `secure` overrides the scheme implied by
    /// `raw` when the caller explicitly set it via `ClientConfig`.
    pub fn new(raw: &str, secure: bool) -> Result<Endpoint, S3Error> {
        let url = Url::parse(raw).map_err(|e| S3Error::invalid_argument(format!("invalid endpoint URL {:?}: {}", raw, e)))?;
        let host = url.host_str().ok_or_else(|| S3Error::invalid_argument(format!("endpoint {:?} has no host", raw)))?.to_string();
        let port = url.port();
        let is_aws = KNOWN_SUFFIXES.iter().any(|suffix| host.ends_with(suffix));
        let is_dualstack = host.contains(".dualstack.");

        Ok(Endpoint { scheme: if secure { "https".to_string() } else { "http".to_string() }, host, port, secure, is_aws, is_dualstack })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn is_aws(&self) -> bool {
        self.is_aws
    }

    pub fn is_dualstack(&self) -> bool {
        self.is_dualstack
    }

    fn host_is_ip_literal(&self) -> bool {
        self.host.parse::<IpAddr>().is_ok()
    }

    /// The bare `host[:port]` this endpoint was constructed with, with no
    /// bucket prefix — used for bucket-less requests (`ListBuckets`) and as
    /// the fallback for path-style addressing.
    fn base_authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    /// Decides virtual-host vs path-style for `bucket` per §4.1 rule 1, and
    /// returns the `(authority, path_style)` pair the URL builder needs.
    pub fn style_for_bucket(&self, bucket: Option<&str>) -> (String, bool) {
        let bucket = match bucket {
            Some(b) if !b.is_empty() => b,
            _ => return (self.base_authority(), true),
        };

        let path_style = self.host_is_ip_literal()
            || (bucket.contains('.') && self.secure)
            || !(self.is_aws || self.is_dualstack);

        if path_style {
            (self.base_authority(), true)
        } else {
            (format!("{}.{}", bucket, self.base_authority()), false)
        }
    }

    /// Builds the full request path for `(bucket, key)` given the style
    /// decided by `style_for_bucket`: path-style prefixes the bucket name,
    /// virtual-host style does not (the bucket is already in the host).
    pub fn build_path(&self, bucket: Option<&str>, key: Option<&str>, path_style: bool) -> String {
        let mut path = String::from("/");
        if path_style {
            if let Some(b) = bucket {
                if !b.is_empty() {
                    path.push_str(b);
                    if key.is_some() {
                        path.push('/');
                    }
                }
            }
        }
        if let Some(k) = key {
            path.push_str(k.trim_start_matches('/'));
        }
        path
    }
}

/// Validates a bucket name against the S3 bucket-name grammar (§4.1,
/// §8 property 1): 3-63 chars; lowercase letters, digits, dots, hyphens;
/// no consecutive dots; not an IP literal; no leading/trailing dot or
/// hyphen.
pub fn validate_bucket_name(name: &str) -> Result<(), S3Error> {
    if name.len() < 3 || name.len() > 63 {
        return Err(S3Error::InvalidBucketName(crate::aws::errors::s3_error::ErrorDetail::new(format!(
            "bucket name must be 3-63 characters, got {} ({:?})",
            name.len(),
            name
        ))));
    }

    if name.parse::<IpAddr>().is_ok() {
        return Err(S3Error::InvalidBucketName(crate::aws::errors::s3_error::ErrorDetail::new(format!(
            "bucket name {:?} must not be formatted as an IP address",
            name
        ))));
    }

    let first = name.chars().next().unwrap();
    let last = name.chars().last().unwrap();
    if first == '.' || first == '-' || last == '.' || last == '-' {
        return Err(invalid_bucket_name(name));
    }

    if name.contains("..") {
        return Err(invalid_bucket_name(name));
    }

    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-') {
        return Err(invalid_bucket_name(name));
    }

    Ok(())
}

fn invalid_bucket_name(name: &str) -> S3Error {
    S3Error::InvalidBucketName(crate::aws::errors::s3_error::ErrorDetail::new(format!(
        "{:?} does not satisfy the S3 bucket name grammar",
        name
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_name_validation_matches_spec_examples() {
        assert!(validate_bucket_name("minio-go-test").is_ok());
        assert!(validate_bucket_name("a").is_err());
        assert!(validate_bucket_name("a..b").is_err());
        assert!(validate_bucket_name("192.168.0.1").is_err());
        assert!(validate_bucket_name("A").is_err());
        assert!(validate_bucket_name("").is_err());
    }

    #[test]
    fn bucket_name_rejects_leading_trailing_dot_or_hyphen() {
        assert!(validate_bucket_name(".bucket").is_err());
        assert!(validate_bucket_name("bucket.").is_err());
        assert!(validate_bucket_name("-bucket").is_err());
        assert!(validate_bucket_name("bucket-").is_err());
    }

    #[test]
    fn virtual_host_style_for_aws_simple_bucket() {
        let endpoint = Endpoint::new("https://s3.amazonaws.com", true).unwrap();
        let (authority, path_style) = endpoint.style_for_bucket(Some("minio-go-test"));
        assert!(!path_style);
        assert_eq!(authority, "minio-go-test.s3.amazonaws.com");
    }

    #[test]
    fn path_style_when_bucket_name_contains_dot_and_secure() {
        let endpoint = Endpoint::new("https://s3.amazonaws.com", true).unwrap();
        let (authority, path_style) = endpoint.style_for_bucket(Some("my.bucket.name"));
        assert!(path_style);
        assert_eq!(authority, "s3.amazonaws.com");
    }

    #[test]
    fn path_style_for_unknown_s3_compatible_host() {
        let endpoint = Endpoint::new("http://minio.example.internal:9000", false).unwrap();
        let (_, path_style) = endpoint.style_for_bucket(Some("a-bucket"));
        assert!(path_style);
    }

    #[test]
    fn path_style_for_ip_literal_host() {
        let endpoint = Endpoint::new("http://127.0.0.1:9000", false).unwrap();
        let (_, path_style) = endpoint.style_for_bucket(Some("a-bucket"));
        assert!(path_style);
    }

    #[test]
    fn path_style_when_no_bucket() {
        let endpoint = Endpoint::new("https://s3.amazonaws.com", true).unwrap();
        let (authority, path_style) = endpoint.style_for_bucket(None);
        assert!(path_style);
        assert_eq!(authority, "s3.amazonaws.com");
    }

    #[test]
    fn build_path_path_style_includes_bucket_prefix() {
        let endpoint = Endpoint::new("http://minio.example.internal:9000", false).unwrap();
        assert_eq!(endpoint.build_path(Some("bucket"), Some("key"), true), "/bucket/key");
        assert_eq!(endpoint.build_path(Some("bucket"), None, true), "/bucket");
    }

    #[test]
    fn build_path_virtual_host_style_has_no_bucket_prefix() {
        let endpoint = Endpoint::new("https://s3.amazonaws.com", true).unwrap();
        assert_eq!(endpoint.build_path(Some("bucket"), Some("key"), false), "/key");
    }
}
