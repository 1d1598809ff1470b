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
//! Ties the per-client `RegionCache` (`aws::common::region`) to
//! `GetBucketLocation` lookups (§4.3). The teacher never separated this
//! concern from `s3client.rs`'s inline handling; it gets its own module
//! here since the engine (§4.7) and the public surface (§4.9) both need it.

use chrono::Utc;

use crate::aws::common::credentials::{AwsCredentials, SignatureVersion};
use crate::aws::common::region::{Region, RegionCache};
use crate::aws::common::request::{Executor, RetryPolicy};
use crate::aws::common::signature::{sign_v4, Payload, SignedRequest};
use crate::aws::errors::s3_error::{ErrorDetail, S3Error};

/// The host AWS expects `GetBucketLocation` requests against, regardless of
/// the bucket's real region (§4.3).
const US_EAST_1_HOST: &str = "s3.amazonaws.com";

/// Resolves and caches a bucket's region. One instance lives per
/// `S3Client`; there is no process-wide singleton (§9).
pub struct RegionResolver {
    cache: RegionCache,
    is_aws: bool,
}

impl RegionResolver {
    pub fn new(is_aws: bool) -> RegionResolver {
        RegionResolver { cache: RegionCache::new(), is_aws }
    }

    pub fn with_seed(is_aws: bool, seed: std::collections::HashMap<String, Region>) -> RegionResolver {
        RegionResolver { cache: RegionCache::with_seed(seed), is_aws }
    }

    pub fn cache(&self) -> &RegionCache {
        &self.cache
    }

    /// Resolves `bucket`'s region per §4.3. For Signature V2 or a
    /// non-AWS-recognized endpoint this never makes a network call — the
    /// generic default `us-east-1` is always correct there. For Signature
    /// V4 against AWS, the cache is consulted first; a miss issues
    /// `GET /{bucket}?location` against the generic `us-east-1` endpoint.
    pub async fn resolve(
        &self,
        executor: &Executor,
        bucket: &str,
        creds: &AwsCredentials,
        signature_version: SignatureVersion,
    ) -> Result<Region, S3Error> {
        if signature_version == SignatureVersion::V2 || !self.is_aws {
            return Ok(Region::UsEast1);
        }

        if let Some(region) = self.cache.get(bucket) {
            return Ok(region);
        }

        let region = self.lookup(executor, bucket, creds).await?;
        self.cache.insert(bucket, region.clone());
        Ok(region)
    }

    async fn lookup(&self, executor: &Executor, bucket: &str, creds: &AwsCredentials) -> Result<Region, S3Error> {
        let response = executor
            .execute_with_retry(
                || {
                    let mut request = SignedRequest::new("GET", "s3", Region::UsEast1, &format!("/{}", bucket));
                    request.set_hostname(US_EAST_1_HOST.to_string());
                    request.params.put("location", "");
                    request.set_payload(Payload::Bytes(Vec::new()));
                    sign_v4(&mut request, creds, Utc::now()).expect("signing a location lookup cannot fail validation");
                    request
                },
                RetryPolicy::Idempotent,
                None,
            )
            .await?;

        if !response.is_success() {
            let detail = ErrorDetail::new(response.body_str()).with_bucket(bucket).with_status(response.status);
            return Err(S3Error::from_status(response.status, true, false, detail));
        }

        let body = response.body_str();
        let trimmed = body.trim();
        // An empty-string LocationConstraint body serializes as a
        // self-closing or empty element; either way the text content is
        // the empty string once tags are stripped by the simple parser
        // below, so a manual scan is cheaper and more forgiving than a
        // full quick-xml schema for this one-field document.
        let location = extract_location_constraint(trimmed);
        Ok(Region::from_location_constraint(&location))
    }

    /// Populates the cache from a 301/307 response's `x-amz-bucket-region`
    /// header (§4.3, §4.5). Best-effort: a response with no such header is
    /// a no-op.
    pub fn observe_redirect_header(&self, bucket: &str, header_value: Option<&str>) {
        if let Some(region_name) = header_value {
            self.cache.insert(bucket, Region::from_name(region_name));
        }
    }

    pub fn invalidate(&self, bucket: &str) {
        self.cache.invalidate(bucket);
    }
}

fn extract_location_constraint(body: &str) -> String {
    if body.is_empty() {
        return String::new();
    }
    // Prefer the structured parse; fall back to a literal scan, since some
    // S3-compatible servers omit the XML declaration or namespace that
    // would otherwise confuse a stricter deserializer.
    if let Ok(parsed) = quick_xml::de::from_str::<LocationConstraintDoc>(body) {
        return parsed.value;
    }
    let without_open = body.splitn(2, '>').nth(1).unwrap_or("");
    without_open.splitn(2, '<').next().unwrap_or("").to_string()
}

#[derive(serde::Deserialize)]
#[serde(rename = "LocationConstraint")]
struct LocationConstraintDoc {
    #[serde(rename = "$text", default)]
    value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_location_constraint_handles_empty_body() {
        assert_eq!(extract_location_constraint(""), "");
    }

    #[test]
    fn extract_location_constraint_parses_eu() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?><LocationConstraint xmlns="http://s3.amazonaws.com/doc/2006-03-01/">EU</LocationConstraint>"#;
        assert_eq!(extract_location_constraint(body), "EU");
    }

    #[test]
    fn extract_location_constraint_parses_plain_region() {
        let body = "<LocationConstraint>eu-central-1</LocationConstraint>";
        assert_eq!(extract_location_constraint(body), "eu-central-1");
    }

    #[tokio::test]
    async fn v2_signature_never_issues_a_network_call() {
        let resolver = RegionResolver::new(true);
        let executor = Executor::with_default_client();
        let creds = AwsCredentials::new("k", "s", None, None);
        let region = resolver.resolve(&executor, "any-bucket", &creds, SignatureVersion::V2).await.unwrap();
        assert_eq!(region, Region::UsEast1);
    }

    #[tokio::test]
    async fn non_aws_endpoint_never_issues_a_network_call() {
        let resolver = RegionResolver::new(false);
        let executor = Executor::with_default_client();
        let creds = AwsCredentials::new("k", "s", None, None);
        let region = resolver.resolve(&executor, "any-bucket", &creds, SignatureVersion::V4).await.unwrap();
        assert_eq!(region, Region::UsEast1);
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_lookup() {
        let resolver = RegionResolver::new(true);
        resolver.cache().insert("known-bucket", Region::EuCentral1);
        let executor = Executor::with_default_client();
        let creds = AwsCredentials::new("k", "s", None, None);
        let region = resolver.resolve(&executor, "known-bucket", &creds, SignatureVersion::V4).await.unwrap();
        assert_eq!(region, Region::EuCentral1);
    }

    #[test]
    fn observe_redirect_header_populates_cache() {
        let resolver = RegionResolver::new(true);
        resolver.observe_redirect_header("bucket", Some("eu-west-2"));
        assert_eq!(resolver.cache().get("bucket"), Some(Region::EuWest2));
    }

    #[test]
    fn observe_redirect_header_is_noop_without_header() {
        let resolver = RegionResolver::new(true);
        resolver.observe_redirect_header("bucket", None);
        assert!(resolver.cache().get("bucket").is_none());
    }
}
