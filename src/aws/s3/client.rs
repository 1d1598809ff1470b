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
//! `S3Client` is the type applications construct and call (§4.9/C9). It
//! composes the endpoint builder (C1), the signer (C2), the region
//! resolver (C3), the executor (C4), and the error mapper (C5) into the
//! bucket- and object-level verbs, and hands off to the pagination
//! iterators (`s3::pagination`), the multipart engine (`s3::multipart`),
//! and presign (`s3::presign`) for the heavier subsystems.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::Stream;
use serde::Deserialize;

use crate::aws::common::credentials::{AwsCredentials, AwsCredentialsProvider, SignatureVersion};
use crate::aws::common::encode::encode_key;
use crate::aws::common::region::Region;
use crate::aws::common::request::{default_http_client, Executor, RetryPolicy};
use crate::aws::common::signature::{sign_v2, sign_v4, Payload, SignedRequest};
use crate::aws::errors::s3_error::{ErrorDetail, S3Error};
use crate::aws::s3::bucket::{BucketInfo, CreateBucketRequest, ListBucketsResult};
use crate::aws::s3::endpoint::{validate_bucket_name, Endpoint};
use crate::aws::s3::multipart::MultipartEngine;
use crate::aws::s3::object::{
    CompletedPartRecord, CopyObjectRequest, GetObjectRequest, ListObjectsRequest, ListingApiVersion,
    ObjectStat, Preconditions, PutObjectRequest,
};
use crate::aws::s3::pagination::{paginate, AbortHandle, ListingEntry, PageResult};
use crate::aws::s3::presign::{presign_post_policy, presign_url, PostPolicyBuilder, PresignedPost};
use crate::aws::s3::region_cache::RegionResolver;
use crate::aws::s3::xml::{
    CommonPrefixEntry, CompleteMultipartUpload, CompletedPart, ContentsEntry, CopyObjectResult,
    CreateBucketConfiguration, InitiateMultipartUploadResult, ListBucketResult, ListBucketResultV2,
    ListMultipartUploadsResult, ListPartsResult, Owner, PartEntry, UploadEntry, XmlError,
};

/// One in-progress multipart upload, as surfaced by the incomplete-uploads
/// listing (§4.6).
#[derive(Debug, Clone)]
pub struct IncompleteUpload {
    pub key: String,
    pub upload_id: String,
    pub initiated: String,
    /// Populated only when the caller asked the listing to aggregate part
    /// sizes (§4.6's bounded nested iteration).
    pub size: Option<u64>,
}

/// Configuration accepted at construction (§6): endpoint, credentials
/// provider, optional preconfigured region, transport scheme/injection,
/// region-cache seed, optional signature variant, and a user-agent prefix.
pub struct ClientConfig {
    pub endpoint: String,
    pub credentials_provider: Arc<dyn AwsCredentialsProvider + Send + Sync>,
    pub region: Option<Region>,
    pub secure: bool,
    pub transport: Option<reqwest::Client>,
    pub region_cache_seed: HashMap<String, Region>,
    pub signature_version: Option<SignatureVersion>,
    pub user_agent_prefix: Option<String>,
}

impl ClientConfig {
    pub fn new<S, P>(endpoint: S, credentials_provider: P) -> ClientConfig
    where
        S: Into<String>,
        P: AwsCredentialsProvider + Send + Sync + 'static,
    {
        ClientConfig {
            endpoint: endpoint.into(),
            credentials_provider: Arc::new(credentials_provider),
            region: None,
            secure: true,
            transport: None,
            region_cache_seed: HashMap::new(),
            signature_version: None,
            user_agent_prefix: None,
        }
    }

    pub fn with_region(mut self, region: Region) -> ClientConfig {
        self.region = Some(region);
        self
    }

    pub fn with_secure(mut self, secure: bool) -> ClientConfig {
        self.secure = secure;
        self
    }

    pub fn with_transport(mut self, transport: reqwest::Client) -> ClientConfig {
        self.transport = Some(transport);
        self
    }

    pub fn with_region_cache_seed(mut self, seed: HashMap<String, Region>) -> ClientConfig {
        self.region_cache_seed = seed;
        self
    }

    pub fn with_signature_version(mut self, version: SignatureVersion) -> ClientConfig {
        self.signature_version = Some(version);
        self
    }

    pub fn with_user_agent_prefix<S: Into<String>>(mut self, prefix: S) -> ClientConfig {
        self.user_agent_prefix = Some(prefix.into());
        self
    }
}

/// The shared state behind `S3Client` and `MultipartEngine`: one instance
/// per client, reference-counted so both can be cheaply cloned (§5, §9 —
/// "no singletons; each client instance owns its cache").
pub(crate) struct S3ClientCore {
    pub(crate) endpoint: Endpoint,
    pub(crate) executor: Executor,
    pub(crate) credentials_provider: Arc<dyn AwsCredentialsProvider + Send + Sync>,
    pub(crate) region_resolver: RegionResolver,
    pub(crate) preferred_region: Option<Region>,
    pub(crate) signature_version: SignatureVersion,
    /// Metadata hash recorded for each upload this client instance has
    /// itself initiated, keyed by `(bucket, key, upload_id)` (§4.7.3).
    /// `ListMultipartUploads` does not echo back user metadata, so resume
    /// matching can only be verified against uploads this process started;
    /// see DESIGN.md.
    pub(crate) resumable_metadata: Mutex<HashMap<(String, String, String), String>>,
}

impl S3ClientCore {
    pub(crate) fn credentials(&self) -> Result<AwsCredentials, S3Error> {
        Ok(self.credentials_provider.credentials()?)
    }

    pub(crate) async fn effective_region(&self, bucket: &str, creds: &AwsCredentials) -> Result<Region, S3Error> {
        if let Some(region) = &self.preferred_region {
            return Ok(region.clone());
        }
        Ok(self.region_resolver.resolve(&self.executor, bucket, creds, self.signature_version).await?)
    }

    /// Builds an unsigned request for `(bucket, key)` against this client's
    /// endpoint, deciding virtual-host vs path-style per §4.1 rule 1.
    pub(crate) fn new_request(&self, method: &str, bucket: Option<&str>, key: Option<&str>, region: &Region) -> SignedRequest {
        let (authority, path_style) = self.endpoint.style_for_bucket(bucket);
        let path = self.endpoint.build_path(bucket, key, path_style);
        let mut request = SignedRequest::new(method, "s3", region.clone(), &path);
        request.scheme = self.endpoint.scheme().to_string();
        request.set_hostname(authority);
        request
    }

    /// Signs `request` per the configured signature variant. Anonymous
    /// mode is a no-op (§4.2).
    pub(crate) fn sign(&self, request: &mut SignedRequest, creds: &AwsCredentials, bucket: &str) -> Result<(), S3Error> {
        match self.signature_version {
            SignatureVersion::Anonymous => Ok(()),
            SignatureVersion::V2 => {
                sign_v2(request, creds, bucket, Utc::now())?;
                Ok(())
            }
            SignatureVersion::V4 | SignatureVersion::V4Streaming => {
                sign_v4(request, creds, Utc::now())?;
                Ok(())
            }
        }
    }

    /// Records the metadata hash this client initiated `upload_id` with, so
    /// a later resume attempt against the same `(bucket, key)` can confirm
    /// it is looking at the upload it thinks it is (§4.7.3).
    pub(crate) fn record_upload_metadata(&self, bucket: &str, key: &str, upload_id: &str, metadata_hash: &str) {
        let mut guard = self.resumable_metadata.lock().expect("resumable_metadata mutex poisoned");
        guard.insert((bucket.to_string(), key.to_string(), upload_id.to_string()), metadata_hash.to_string());
    }

    /// The metadata hash recorded for `upload_id` when this client
    /// initiated it, if any (§4.7.3). `None` for uploads this process did
    /// not itself start.
    pub(crate) fn recorded_upload_metadata(&self, bucket: &str, key: &str, upload_id: &str) -> Option<String> {
        let guard = self.resumable_metadata.lock().expect("resumable_metadata mutex poisoned");
        guard.get(&(bucket.to_string(), key.to_string(), upload_id.to_string())).cloned()
    }

    /// Builds, signs, and dispatches a request with the retry policy of
    /// §4.4, re-signing on every attempt since signatures are only valid
    /// within a clock-skew window. On success, observes an
    /// `x-amz-bucket-region` header if present (§4.3); on failure, maps
    /// the response to a structured `S3Error` (§4.5).
    pub(crate) async fn dispatch<F>(
        &self,
        bucket: &str,
        build: F,
        policy: RetryPolicy,
        is_bucket_target: bool,
        method_is_delete: bool,
    ) -> Result<crate::aws::common::request::HttpResponse, S3Error>
    where
        F: FnMut() -> SignedRequest,
    {
        self.dispatch_cancellable(bucket, build, policy, is_bucket_target, method_is_delete, None).await
    }

    /// As `dispatch`, but races `cancellation` (when given) against both the
    /// in-flight send and any retry backoff (§4.4, §5). Used by the
    /// multipart engine's per-part uploads, the one path where a caller
    /// holds a live cancellation handle while work is outstanding.
    pub(crate) async fn dispatch_cancellable<F>(
        &self,
        bucket: &str,
        mut build: F,
        policy: RetryPolicy,
        is_bucket_target: bool,
        method_is_delete: bool,
        cancellation: Option<&crate::aws::common::request::CancellationToken>,
    ) -> Result<crate::aws::common::request::HttpResponse, S3Error>
    where
        F: FnMut() -> SignedRequest,
    {
        let creds = self.credentials()?;
        let response = self
            .executor
            .execute_with_retry(
                || {
                    let mut request = build();
                    if let Err(e) = self.sign(&mut request, &creds, bucket) {
                        warn!("failed to sign request for bucket {}: {}", bucket, e);
                    }
                    request
                },
                policy,
                cancellation,
            )
            .await?;

        if let Some(region_header) = response.header("x-amz-bucket-region") {
            self.region_resolver.observe_redirect_header(bucket, Some(region_header));
        }

        if response.is_success() {
            Ok(response)
        } else {
            Err(self.map_error(&response, bucket, is_bucket_target, method_is_delete))
        }
    }

    /// Parses the S3 XML error document, or synthesizes an error from the
    /// status code alone when the body is empty (HEAD responses) (§4.5).
    fn map_error(
        &self,
        response: &crate::aws::common::request::HttpResponse,
        bucket: &str,
        is_bucket_target: bool,
        method_is_delete: bool,
    ) -> S3Error {
        if !response.body.is_empty() && XmlError::looks_like_error_document(&response.body) {
            if let Ok(xml_error) = XmlError::parse(&response.body) {
                let code = xml_error.code.clone();
                let detail = xml_error.into_detail().with_status(response.status);
                return S3Error::from_xml(&code, detail);
            }
        }
        let detail = ErrorDetail::new(response.body_str()).with_bucket(bucket);
        S3Error::from_status(response.status, is_bucket_target, method_is_delete, detail)
    }
}

/// The client applications construct and share across concurrent callers
/// (§5). Cloning is cheap: it shares the same `Arc<S3ClientCore>`,
/// including the region cache.
#[derive(Clone)]
pub struct S3Client {
    core: Arc<S3ClientCore>,
}

impl S3Client {
    pub fn new(config: ClientConfig) -> Result<S3Client, S3Error> {
        let endpoint = Endpoint::new(&config.endpoint, config.secure)?;

        let executor = match config.transport {
            Some(client) => Executor::new(client),
            None => {
                let client = match &config.user_agent_prefix {
                    Some(prefix) => reqwest::Client::builder()
                        .timeout(crate::aws::common::request::DEFAULT_REQUEST_TIMEOUT)
                        .user_agent(format!("{} {}", prefix, crate::aws::common::request::DEFAULT_USER_AGENT))
                        .build()
                        .map_err(|e| S3Error::invalid_argument(format!("failed to build HTTP transport: {}", e)))?,
                    None => default_http_client(),
                };
                Executor::new(client)
            }
        };

        let region_resolver = RegionResolver::with_seed(endpoint.is_aws(), config.region_cache_seed);

        Ok(S3Client {
            core: Arc::new(S3ClientCore {
                endpoint,
                executor,
                credentials_provider: config.credentials_provider,
                region_resolver,
                preferred_region: config.region,
                signature_version: config.signature_version.unwrap_or(SignatureVersion::V4),
                resumable_metadata: Mutex::new(HashMap::new()),
            }),
        })
    }

    /// Reads the region from an explicit `AWS_REGION`/`AWS_DEFAULT_REGION`
    /// environment variable, if present (§6).
    pub fn region_from_env() -> Option<Region> {
        std::env::var("AWS_REGION")
            .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
            .ok()
            .filter(|v| !v.is_empty())
            .map(|v| Region::from_name(&v))
    }

    fn credentials(&self) -> Result<AwsCredentials, S3Error> {
        self.core.credentials()
    }

    /// A handle onto the concurrent multipart transfer engine (§4.7),
    /// sharing this client's endpoint, executor, credentials, and region
    /// cache.
    pub fn multipart(&self) -> MultipartEngine {
        MultipartEngine::new(self.core.clone())
    }

    #[cfg(test)]
    pub(crate) fn core_for_test(&self) -> Arc<S3ClientCore> {
        self.core.clone()
    }

    pub async fn make_bucket(&self, request: CreateBucketRequest) -> Result<(), S3Error> {
        validate_bucket_name(&request.bucket)?;
        let bucket = request.bucket.clone();
        let region = request.region.clone();

        let body = if request.needs_location_constraint() {
            let config = CreateBucketConfiguration { location_constraint: region.name().to_string() };
            let xml = quick_xml::se::to_string(&config).map_err(|e| S3Error::invalid_argument(format!("failed to encode CreateBucketConfiguration: {}", e)))?;
            Payload::Bytes(xml.into_bytes())
        } else {
            Payload::None
        };

        self.core
            .dispatch(
                &bucket,
                || {
                    let mut req = self.core.new_request("PUT", Some(&bucket), None, &region);
                    if let Some(acl) = request.acl {
                        req.add_header("x-amz-acl", acl.header_value());
                    }
                    req.set_payload(body.clone());
                    req
                },
                RetryPolicy::ConnectionErrorsOnly,
                true,
                false,
            )
            .await?;
        Ok(())
    }

    pub async fn bucket_exists(&self, bucket: &str) -> Result<bool, S3Error> {
        let creds = self.credentials()?;
        let region = self.core.effective_region(bucket, &creds).await?;
        match self
            .core
            .dispatch(bucket, || self.core.new_request("HEAD", Some(bucket), None, &region), RetryPolicy::Idempotent, true, false)
            .await
        {
            Ok(_) => Ok(true),
            Err(S3Error::NoSuchBucket(_)) => Ok(false),
            Err(other) => Err(other),
        }
    }

    pub async fn remove_bucket(&self, bucket: &str) -> Result<(), S3Error> {
        let creds = self.credentials()?;
        let region = self.core.effective_region(bucket, &creds).await?;
        self.core
            .dispatch(bucket, || self.core.new_request("DELETE", Some(bucket), None, &region), RetryPolicy::Idempotent, true, true)
            .await?;
        self.core.region_resolver.invalidate(bucket);
        Ok(())
    }

    pub async fn list_buckets(&self) -> Result<ListBucketsResult, S3Error> {
        let region = self.core.preferred_region.clone().unwrap_or(Region::UsEast1);
        let response = self
            .core
            .dispatch("", || self.core.new_request("GET", None, None, &region), RetryPolicy::Idempotent, false, false)
            .await?;

        let parsed: ListAllMyBucketsResponse =
            quick_xml::de::from_reader(response.body.as_slice()).map_err(|e| S3Error::invalid_argument(format!("failed to parse ListBuckets response: {}", e)))?;

        Ok(ListBucketsResult {
            owner_id: Some(parsed.owner.id).filter(|s| !s.is_empty()),
            owner_display_name: Some(parsed.owner.display_name).filter(|s| !s.is_empty()),
            buckets: parsed.buckets.bucket.into_iter().map(|b| BucketInfo { name: b.name, creation_date: b.creation_date }).collect(),
        })
    }

    /// Lazily lists objects per §4.6 as an abortable stream. `request`
    /// selects the v1/v2 listing API, recursion (via delimiter), prefix,
    /// and page size.
    pub fn list_objects(&self, request: ListObjectsRequest) -> (impl Stream<Item = Result<ListingEntry<ObjectStat>, S3Error>>, AbortHandle) {
        let core = self.core.clone();
        let bucket = request.bucket.clone();

        paginate(move |cursor: Option<String>| {
            let core = core.clone();
            let bucket = bucket.clone();
            let request = request.clone();
            async move {
                let creds = core.credentials()?;
                let region = core.effective_region(&bucket, &creds).await?;

                let response = core
                    .dispatch(
                        &bucket,
                        || {
                            let mut req = core.new_request("GET", Some(&bucket), None, &region);
                            req.params.put("prefix", request.prefix.clone());
                            req.params.put("max-keys", request.max_keys.to_string());
                            if let Some(delimiter) = &request.delimiter {
                                req.params.put("delimiter", delimiter.clone());
                            }
                            match request.api_version {
                                ListingApiVersion::V1 => {
                                    if let Some(marker) = &cursor {
                                        req.params.put("marker", marker.clone());
                                    }
                                }
                                ListingApiVersion::V2 => {
                                    req.params.put("list-type", "2");
                                    if let Some(token) = &cursor {
                                        req.params.put("continuation-token", token.clone());
                                    } else if let Some(start_after) = &request.start_after {
                                        req.params.put("start-after", start_after.clone());
                                    }
                                }
                            }
                            req
                        },
                        RetryPolicy::Idempotent,
                        true,
                        false,
                    )
                    .await?;

                let (contents, common_prefixes, next_cursor, is_truncated) = match request.api_version {
                    ListingApiVersion::V1 => {
                        let parsed: ListBucketResult = quick_xml::de::from_reader(response.body.as_slice())
                            .map_err(|e| S3Error::invalid_argument(format!("failed to parse ListBucketResult: {}", e)))?;
                        let next = parsed.next_marker.or_else(|| parsed.contents.last().map(|c| c.key.clone()));
                        (parsed.contents, parsed.common_prefixes, next, parsed.is_truncated)
                    }
                    ListingApiVersion::V2 => {
                        let parsed: ListBucketResultV2 = quick_xml::de::from_reader(response.body.as_slice())
                            .map_err(|e| S3Error::invalid_argument(format!("failed to parse ListBucketResult (v2): {}", e)))?;
                        (parsed.contents, parsed.common_prefixes, parsed.next_continuation_token, parsed.is_truncated)
                    }
                };

                let mut items: Vec<ListingEntry<ObjectStat>> = contents.into_iter().map(entry_to_listing).collect();
                items.extend(common_prefixes.into_iter().map(|p: CommonPrefixEntry| ListingEntry::CommonPrefix(p.prefix)));

                Ok(PageResult::new(items, next_cursor, is_truncated))
            }
        })
    }

    /// Lists in-progress multipart uploads (§4.6). When `aggregate_sizes`
    /// is set, each entry's `size` is populated by an explicit, bounded
    /// nested iteration over that upload's parts.
    pub fn list_incomplete_uploads(
        &self,
        bucket: &str,
        prefix: &str,
        aggregate_sizes: bool,
        page_size: u32,
    ) -> (impl Stream<Item = Result<IncompleteUpload, S3Error>>, AbortHandle) {
        let core = self.core.clone();
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();

        paginate(move |cursor: Option<String>| {
            let core = core.clone();
            let bucket = bucket.clone();
            let prefix = prefix.clone();
            async move {
                let creds = core.credentials()?;
                let region = core.effective_region(&bucket, &creds).await?;

                let response = core
                    .dispatch(
                        &bucket,
                        || {
                            let mut req = core.new_request("GET", Some(&bucket), None, &region);
                            req.params.put("uploads", "");
                            req.params.put("prefix", prefix.clone());
                            req.params.put("max-uploads", page_size.to_string());
                            if let Some(marker) = &cursor {
                                if let Some((key_marker, upload_id_marker)) = marker.split_once('\u{0}') {
                                    req.params.put("key-marker", key_marker.to_string());
                                    req.params.put("upload-id-marker", upload_id_marker.to_string());
                                }
                            }
                            req
                        },
                        RetryPolicy::Idempotent,
                        true,
                        false,
                    )
                    .await?;

                let parsed: ListMultipartUploadsResult = quick_xml::de::from_reader(response.body.as_slice())
                    .map_err(|e| S3Error::invalid_argument(format!("failed to parse ListMultipartUploadsResult: {}", e)))?;

                let mut items = Vec::with_capacity(parsed.uploads.len());
                for upload in &parsed.uploads {
                    let size = if aggregate_sizes {
                        Some(aggregate_upload_size(&core, &bucket, upload, &region).await?)
                    } else {
                        None
                    };
                    items.push(IncompleteUpload { key: upload.key.clone(), upload_id: upload.upload_id.clone(), initiated: upload.initiated.clone(), size });
                }

                let next_cursor = match (&parsed.next_key_marker, &parsed.next_upload_id_marker) {
                    (Some(k), Some(u)) => Some(format!("{}\u{0}{}", k, u)),
                    _ => None,
                };

                Ok(PageResult::new(items, next_cursor, parsed.is_truncated))
            }
        })
    }

    /// Single-shot PUT for objects small enough not to need the multipart
    /// engine. Computes the SigV4 payload hash (and, when requested,
    /// `Content-MD5`) in one pass over `body` (§4.4).
    pub async fn put_object(&self, request: PutObjectRequest, body: Vec<u8>) -> Result<ObjectStat, S3Error> {
        let creds = self.credentials()?;
        let region = self.core.effective_region(&request.bucket, &creds).await?;
        // SigV4's payload hash is recomputed from `Payload::Bytes` at sign
        // time (§3 invariant); only `Content-MD5` needs computing here, and
        // only when the caller actually asked for it.
        let md5_base64 = if request.compute_content_md5 {
            Some(crate::aws::common::request::compute_body_hashes(&body).1)
        } else {
            None
        };
        let body_len = body.len() as u64;

        let response = self
            .core
            .dispatch(
                &request.bucket,
                || {
                    let mut req = self.core.new_request("PUT", Some(&request.bucket), Some(&request.key), &region);
                    req.add_header("content-length", &body_len.to_string());
                    if let Some(content_type) = &request.content_type {
                        req.add_header("content-type", content_type);
                    }
                    if let Some(md5_base64) = &md5_base64 {
                        req.add_header("content-md5", md5_base64);
                    }
                    for (k, v) in &request.metadata {
                        req.add_header(&format!("x-amz-meta-{}", k), v);
                    }
                    if let Some(acl) = request.acl {
                        req.add_header("x-amz-acl", acl.header_value());
                    }
                    if let Some(sse) = &request.sse {
                        for (name, value) in sse.headers() {
                            req.add_header(name, &value);
                        }
                    }
                    req.set_payload(Payload::Bytes(body.clone()));
                    req
                },
                RetryPolicy::ConnectionErrorsOnly,
                true,
                false,
            )
            .await?;

        Ok(ObjectStat {
            key: request.key,
            size: body_len,
            etag: response.header("etag").unwrap_or_default().to_string(),
            last_modified: String::new(),
            content_type: request.content_type,
            metadata: request.metadata,
            storage_class: None,
            version_id: response.header("x-amz-version-id").map(|v| v.to_string()),
        })
    }

    pub async fn get_object(&self, request: GetObjectRequest) -> Result<(ObjectStat, Vec<u8>), S3Error> {
        let creds = self.credentials()?;
        let region = self.core.effective_region(&request.bucket, &creds).await?;

        let response = self
            .core
            .dispatch(
                &request.bucket,
                || {
                    let mut req = self.core.new_request("GET", Some(&request.bucket), Some(&request.key), &region);
                    if let Some((start, end)) = request.range {
                        req.add_header("range", &format!("bytes={}-{}", start, end));
                    }
                    for (name, value) in request.preconditions.headers() {
                        req.add_header(name, &value);
                    }
                    if let Some(version_id) = &request.version_id {
                        req.params.put("versionId", version_id.clone());
                    }
                    req
                },
                RetryPolicy::Idempotent,
                false,
                false,
            )
            .await?;

        let stat = object_stat_from_headers(&request.key, &response);
        Ok((stat, response.body))
    }

    pub async fn stat_object(&self, bucket: &str, key: &str, version_id: Option<&str>) -> Result<ObjectStat, S3Error> {
        let creds = self.credentials()?;
        let region = self.core.effective_region(bucket, &creds).await?;

        let response = self
            .core
            .dispatch(
                bucket,
                || {
                    let mut req = self.core.new_request("HEAD", Some(bucket), Some(key), &region);
                    if let Some(version_id) = version_id {
                        req.params.put("versionId", version_id.to_string());
                    }
                    req
                },
                RetryPolicy::Idempotent,
                false,
                false,
            )
            .await?;

        Ok(object_stat_from_headers(key, &response))
    }

    pub async fn remove_object(&self, bucket: &str, key: &str, version_id: Option<&str>) -> Result<(), S3Error> {
        let creds = self.credentials()?;
        let region = self.core.effective_region(bucket, &creds).await?;
        self.core
            .dispatch(
                bucket,
                || {
                    let mut req = self.core.new_request("DELETE", Some(bucket), Some(key), &region);
                    if let Some(version_id) = version_id {
                        req.params.put("versionId", version_id.to_string());
                    }
                    req
                },
                RetryPolicy::Idempotent,
                false,
                false,
            )
            .await?;
        Ok(())
    }

    pub async fn remove_incomplete_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<(), S3Error> {
        self.multipart().abort_by_id(bucket, key, upload_id).await
    }

    /// Server-side copy under the 5 GB single-copy limit. Larger copies
    /// (or copies that need ranged reads) go through
    /// `MultipartEngine::copy` (§4.7.4).
    pub async fn copy_object(&self, request: CopyObjectRequest) -> Result<ObjectStat, S3Error> {
        let creds = self.credentials()?;
        let region = self.core.effective_region(&request.dest_bucket, &creds).await?;

        let mut copy_source = format!("/{}/{}", request.source_bucket, encode_key(&request.source_key));
        if let Some(version_id) = &request.source_version_id {
            copy_source.push_str("?versionId=");
            copy_source.push_str(version_id);
        }

        let response = self
            .core
            .dispatch(
                &request.dest_bucket,
                || {
                    let mut req = self.core.new_request("PUT", Some(&request.dest_bucket), Some(&request.dest_key), &region);
                    req.add_header("x-amz-copy-source", &copy_source);
                    if request.replace_metadata {
                        req.add_header("x-amz-metadata-directive", "REPLACE");
                        for (k, v) in &request.metadata {
                            req.add_header(&format!("x-amz-meta-{}", k), v);
                        }
                    }
                    if let Some(acl) = request.acl {
                        req.add_header("x-amz-acl", acl.header_value());
                    }
                    if let Some(v) = &request.preconditions.if_match {
                        req.add_header("x-amz-copy-source-if-match", v);
                    }
                    if let Some(v) = &request.preconditions.if_none_match {
                        req.add_header("x-amz-copy-source-if-none-match", v);
                    }
                    if let Some(v) = &request.preconditions.if_modified_since {
                        req.add_header("x-amz-copy-source-if-modified-since", v);
                    }
                    if let Some(v) = &request.preconditions.if_unmodified_since {
                        req.add_header("x-amz-copy-source-if-unmodified-since", v);
                    }
                    req
                },
                RetryPolicy::ConnectionErrorsOnly,
                false,
                false,
            )
            .await?;

        let parsed: CopyObjectResult =
            quick_xml::de::from_reader(response.body.as_slice()).map_err(|e| S3Error::invalid_argument(format!("failed to parse CopyObjectResult: {}", e)))?;

        Ok(ObjectStat {
            key: request.dest_key,
            size: 0,
            etag: parsed.etag,
            last_modified: parsed.last_modified,
            content_type: None,
            metadata: HashMap::new(),
            storage_class: None,
            version_id: response.header("x-amz-version-id").map(|v| v.to_string()),
        })
    }

    /// Presigned URL for `method` against `(bucket, key)`, valid for
    /// `expires_in` seconds (§4.8; bounds enforced by `presign_v4`).
    pub async fn presign(&self, method: &str, bucket: &str, key: &str, expires_in: u32, version_id: Option<&str>) -> Result<String, S3Error> {
        let creds = self.credentials()?;
        let region = self.core.effective_region(bucket, &creds).await?;
        presign_url(&self.core, method, bucket, key, expires_in, &region, &creds, version_id)
    }

    /// Browser POST-policy form fields + endpoint URL (§4.8).
    pub async fn presign_post_policy(&self, builder: PostPolicyBuilder) -> Result<PresignedPost, S3Error> {
        let bucket = builder.bucket().to_string();
        let creds = self.credentials()?;
        let region = self.core.effective_region(&bucket, &creds).await?;
        presign_post_policy(&self.core, builder, &region, &creds)
    }
}

async fn aggregate_upload_size(core: &Arc<S3ClientCore>, bucket: &str, upload: &UploadEntry, region: &Region) -> Result<u64, S3Error> {
    let key = upload.key.clone();
    let upload_id = upload.upload_id.clone();
    crate::aws::s3::pagination::aggregate_part_sizes(move |cursor: Option<String>| {
        let core = core.clone();
        let bucket = bucket.to_string();
        let key = key.clone();
        let upload_id = upload_id.clone();
        let region = region.clone();
        async move {
            let response = core
                .dispatch(
                    &bucket,
                    || {
                        let mut req = core.new_request("GET", Some(&bucket), Some(&key), &region);
                        req.params.put("uploadId", upload_id.clone());
                        req.params.put("max-parts", "1000");
                        if let Some(marker) = &cursor {
                            req.params.put("part-number-marker", marker.clone());
                        }
                        req
                    },
                    RetryPolicy::Idempotent,
                    false,
                    false,
                )
                .await?;

            let parsed: ListPartsResult =
                quick_xml::de::from_reader(response.body.as_slice()).map_err(|e| S3Error::invalid_argument(format!("failed to parse ListPartsResult: {}", e)))?;
            let sizes: Vec<u64> = parsed.parts.iter().map(|p: &PartEntry| p.size).collect();
            let next_cursor = if parsed.is_truncated { Some(parsed.next_part_number_marker.to_string()) } else { None };
            Ok(PageResult::new(sizes, next_cursor, parsed.is_truncated))
        }
    })
    .await
}

fn entry_to_listing(entry: ContentsEntry) -> ListingEntry<ObjectStat> {
    ListingEntry::Object(ObjectStat {
        key: entry.key,
        size: entry.size,
        etag: entry.etag,
        last_modified: entry.last_modified,
        content_type: None,
        metadata: HashMap::new(),
        storage_class: Some(entry.storage_class).filter(|s| !s.is_empty()),
        version_id: None,
    })
}

fn object_stat_from_headers(key: &str, response: &crate::aws::common::request::HttpResponse) -> ObjectStat {
    let mut metadata = HashMap::new();
    for (name, value) in &response.headers {
        if let Some(meta_key) = name.strip_prefix("x-amz-meta-") {
            metadata.insert(meta_key.to_string(), value.clone());
        }
    }

    ObjectStat {
        key: key.to_string(),
        size: response.header("content-length").and_then(|v| v.parse().ok()).unwrap_or(0),
        etag: response.header("etag").unwrap_or_default().to_string(),
        last_modified: response.header("last-modified").unwrap_or_default().to_string(),
        content_type: response.header("content-type").map(|v| v.to_string()),
        metadata,
        storage_class: response.header("x-amz-storage-class").map(|v| v.to_string()),
        version_id: response.header("x-amz-version-id").map(|v| v.to_string()),
    }
}

/// Builds the `Parts` list the multipart engine hands to
/// `CompleteMultipartUpload` (§6). Exposed at crate level so
/// `s3::multipart` can reuse the same XML body construction `S3Client`
/// would use if it ever completed a session directly.
pub(crate) fn complete_multipart_body(parts: &[CompletedPartRecord]) -> Result<Vec<u8>, S3Error> {
    let mut sorted: Vec<&CompletedPartRecord> = parts.iter().collect();
    sorted.sort_by_key(|p| p.part_number);
    let body = CompleteMultipartUpload { parts: sorted.into_iter().map(|p| CompletedPart { part_number: p.part_number, etag: p.etag.clone() }).collect() };
    let xml = quick_xml::se::to_string(&body).map_err(|e| S3Error::invalid_argument(format!("failed to encode CompleteMultipartUpload: {}", e)))?;
    Ok(xml.into_bytes())
}

pub(crate) fn parse_initiate_multipart(body: &[u8]) -> Result<InitiateMultipartUploadResult, S3Error> {
    quick_xml::de::from_reader(body).map_err(|e| S3Error::invalid_argument(format!("failed to parse InitiateMultipartUploadResult: {}", e)))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename = "ListAllMyBucketsResult")]
struct ListAllMyBucketsResponse {
    #[serde(rename = "Owner", default)]
    owner: Owner,
    #[serde(rename = "Buckets", default)]
    buckets: BucketsWrapper,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BucketsWrapper {
    #[serde(rename = "Bucket", default)]
    bucket: Vec<BucketXml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BucketXml {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "CreationDate", default)]
    creation_date: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::common::credentials::StaticProvider;

    fn test_client() -> S3Client {
        let provider = StaticProvider::new("AKID", "secret", None).unwrap();
        let config = ClientConfig::new("https://s3.amazonaws.com", provider).with_region(Region::UsEast1);
        S3Client::new(config).unwrap()
    }

    #[test]
    fn new_request_uses_virtual_host_style_for_aws() {
        let client = test_client();
        let request = client.core.new_request("GET", Some("my-bucket"), Some("key"), &Region::UsEast1);
        assert_eq!(request.hostname, "my-bucket.s3.amazonaws.com");
        assert_eq!(request.canonical_uri, "/key");
    }

    #[test]
    fn new_request_has_no_bucket_prefix_for_bucket_less_calls() {
        let client = test_client();
        let request = client.core.new_request("GET", None, None, &Region::UsEast1);
        assert_eq!(request.hostname, "s3.amazonaws.com");
        assert_eq!(request.canonical_uri, "/");
    }

    #[test]
    fn map_error_parses_xml_error_body() {
        let client = test_client();
        let body = br#"<Error><Code>NoSuchKey</Code><Message>nope</Message></Error>"#.to_vec();
        let response = crate::aws::common::request::HttpResponse { status: 404, headers: HashMap::new(), body };
        let err = client.core.map_error(&response, "bucket", false, false);
        assert_eq!(err.code(), "NoSuchKey");
    }

    #[test]
    fn map_error_synthesizes_from_status_when_body_is_empty() {
        let client = test_client();
        let response = crate::aws::common::request::HttpResponse { status: 404, headers: HashMap::new(), body: Vec::new() };
        let err = client.core.map_error(&response, "bucket", true, false);
        assert_eq!(err.code(), "NoSuchBucket");
    }

    #[test]
    fn list_all_my_buckets_response_parses_fixture() {
        let xml = r#"<ListAllMyBucketsResult>
            <Owner><ID>abc</ID><DisplayName>me</DisplayName></Owner>
            <Buckets><Bucket><Name>b1</Name><CreationDate>2020-01-01T00:00:00.000Z</CreationDate></Bucket></Buckets>
        </ListAllMyBucketsResult>"#;
        let parsed: ListAllMyBucketsResponse = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(parsed.owner.id, "abc");
        assert_eq!(parsed.buckets.bucket.len(), 1);
        assert_eq!(parsed.buckets.bucket[0].name, "b1");
    }

    #[test]
    fn object_stat_from_headers_extracts_user_metadata() {
        let mut headers = HashMap::new();
        headers.insert("content-length".to_string(), "65536".to_string());
        headers.insert("etag".to_string(), "\"abc\"".to_string());
        headers.insert("x-amz-meta-owner".to_string(), "alice".to_string());
        let response = crate::aws::common::request::HttpResponse { status: 200, headers, body: Vec::new() };
        let stat = object_stat_from_headers("k", &response);
        assert_eq!(stat.size, 65536);
        assert_eq!(stat.metadata.get("owner"), Some(&"alice".to_string()));
    }

    #[test]
    fn complete_multipart_body_sorts_parts_by_number() {
        let parts = vec![
            CompletedPartRecord { part_number: 2, etag: "b".to_string(), size: 1 },
            CompletedPartRecord { part_number: 1, etag: "a".to_string(), size: 1 },
        ];
        let xml = String::from_utf8(complete_multipart_body(&parts).unwrap()).unwrap();
        assert!(xml.find('a').unwrap() < xml.find('b').unwrap());
    }
}
