// Copyright 2017 LambdaStack All rights reserved.
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

// Portions borrowed from the rusoto project. See README.md

//! Library Documentation
//!
//! AWS API requests.
//!
//! Assembles a `SignedRequest` into a `reqwest` request, dispatches it, and
//! retries transient failures per §4.4. All HTTP calls in this crate go
//! through `Executor`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hex;
use md5::{Digest as Md5Digest, Md5};
use rand::Rng;
use reqwest::{Method, StatusCode};
use sha2::{Digest as Sha2Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::Notify;

use crate::aws::common::signature::{Payload, SignedRequest};

pub const DEFAULT_USER_AGENT: &str = concat!("s3-core/", env!("CARGO_PKG_VERSION"));
/// Default per-request deadline applied in the absence of a caller-supplied
/// one (§5). Presigned URLs do not inherit this — their `X-Amz-Expires`
/// governs instead.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

const RETRY_BASE: Duration = Duration::from_millis(200);
const RETRY_CAP: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 5;

/// Which retry class a request falls under (§4.4). Determined by the
/// caller from the HTTP method and, for POST, whether any bytes have been
/// written to the wire yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// GET, HEAD, DELETE, or an idempotent PUT-of-an-upload-part: retried
    /// on connection reset, 5xx, or 429.
    Idempotent,
    /// Non-idempotent POST (CreateMultipartUpload, CompleteMultipartUpload):
    /// retried only on connection errors before any bytes were written.
    ConnectionErrorsOnly,
    /// No retry at all.
    None,
}

#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        matches!(self.status, 200 | 204 | 206)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|v| v.as_str())
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Cooperative cancellation handle shared between a caller and whatever is
/// doing the work on its behalf (§4.4, §5, §9). `cancel()` can be called
/// from any clone; `Executor` races `cancelled()` against both the
/// in-flight HTTP send and any pending retry backoff.
#[derive(Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken { cancelled: Arc::new(AtomicBool::new(false)), notify: Arc::new(Notify::new()) }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once `cancel()` has been called, including a call that
    /// raced ahead of this await (the `Notify` future is constructed before
    /// the flag check, so a `cancel()` landing in between is not missed).
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for CancellationToken {
    fn default() -> CancellationToken {
        CancellationToken::new()
    }
}

#[derive(Debug)]
pub enum ExecutorError {
    Transport(reqwest::Error),
    Cancelled,
    UnsupportedMethod(String),
}

impl fmt::Display for ExecutorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExecutorError::Transport(e) => write!(f, "transport error: {}", e),
            ExecutorError::Cancelled => write!(f, "request cancelled"),
            ExecutorError::UnsupportedMethod(m) => write!(f, "unsupported HTTP verb {}", m),
        }
    }
}

impl std::error::Error for ExecutorError {}

impl From<reqwest::Error> for ExecutorError {
    fn from(err: reqwest::Error) -> ExecutorError {
        ExecutorError::Transport(err)
    }
}

/// Computes SHA-256 and MD5 (base64) of a payload in one pass, per §4.4.
pub fn compute_body_hashes(bytes: &[u8]) -> (String, String) {
    let sha256_hex = hex::encode(Sha256::digest(bytes));
    let md5_base64 = BASE64.encode(Md5::digest(bytes));
    (sha256_hex, md5_base64)
}

/// Default transport: connection-pool keep-alive, 5 minute timeout,
/// honoring `HTTPS_PROXY`/`HTTP_PROXY` (reqwest reads these automatically
/// unless a custom client is injected).
pub fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .user_agent(DEFAULT_USER_AGENT)
        .build()
        .expect("default reqwest client configuration is valid")
}

/// Dispatches `SignedRequest`s over an injectable `reqwest::Client`,
/// applying the retry policy of §4.4. One `Executor` is shared by an
/// `S3Client` and everything the multipart engine spawns.
#[derive(Clone)]
pub struct Executor {
    client: reqwest::Client,
}

impl Executor {
    pub fn new(client: reqwest::Client) -> Executor {
        Executor { client }
    }

    pub fn with_default_client() -> Executor {
        Executor::new(default_http_client())
    }

    /// Dispatches one already-signed request with no retry. When
    /// `cancellation` is given, it is raced against the in-flight send so
    /// the request object is abandoned (not merely ignored) the moment the
    /// caller cancels (§4.4: "Context cancellation aborts immediately").
    pub async fn execute(&self, request: &SignedRequest, cancellation: Option<&CancellationToken>) -> Result<HttpResponse, ExecutorError> {
        if cancellation.is_some_and(|c| c.is_cancelled()) {
            return Err(ExecutorError::Cancelled);
        }

        let method = http_method(&request.method)?;
        let url = request_url(request);

        let mut builder = self.client.request(method, url);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.payload {
            Payload::Bytes(bytes) => builder.body(bytes.clone()),
            Payload::None => builder.body(Vec::new()),
            Payload::Unsigned | Payload::Streaming { .. } => builder,
        };

        debug!("dispatching {} {}", request.method, request.canonical_uri);
        let response = match cancellation {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => return Err(ExecutorError::Cancelled),
                    result = builder.send() => result?,
                }
            }
            None => builder.send().await?,
        };
        let status = response.status();
        let mut headers = HashMap::new();
        for (name, value) in response.headers().iter() {
            headers.insert(name.as_str().to_ascii_lowercase(), value.to_str().unwrap_or_default().to_string());
        }
        // Always drained to completion so the connection can be reused (§4.4/§5).
        let body = response.bytes().await?.to_vec();

        Ok(HttpResponse { status: status.as_u16(), headers, body })
    }

    /// Dispatches with the retry policy of §4.4. `build` re-signs a fresh
    /// `SignedRequest` on every attempt, since SigV4/V2 signatures are only
    /// valid within a clock-skew window. `cancellation`, if given, is raced
    /// against both the in-flight send and any pending retry backoff, so a
    /// cancel lands within bounded time regardless of which phase it's in
    /// (§4.4, §5).
    pub async fn execute_with_retry<F>(&self, mut build: F, policy: RetryPolicy, cancellation: Option<&CancellationToken>) -> Result<HttpResponse, ExecutorError>
    where
        F: FnMut() -> SignedRequest,
    {
        let mut attempt: u32 = 0;
        loop {
            if cancellation.is_some_and(|c| c.is_cancelled()) {
                return Err(ExecutorError::Cancelled);
            }

            attempt += 1;
            let request = build();
            let result = self.execute(&request, cancellation).await;

            let should_retry = attempt < MAX_ATTEMPTS
                && match (&result, policy) {
                    (Err(ExecutorError::Transport(e)), RetryPolicy::Idempotent) => e.is_connect() || e.is_timeout(),
                    (Err(ExecutorError::Transport(e)), RetryPolicy::ConnectionErrorsOnly) => e.is_connect(),
                    (Ok(resp), RetryPolicy::Idempotent) => is_retryable_status(resp.status),
                    _ => false,
                };

            if !should_retry {
                return result;
            }

            let delay = backoff_delay(attempt);
            warn!("retrying after transient failure, attempt {} of {}, backing off {:?}", attempt, MAX_ATTEMPTS, delay);
            match cancellation {
                Some(token) => {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(ExecutorError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => tokio::time::sleep(delay).await,
            }
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Exponential backoff with jitter: base 200ms, cap 30s, jitter ±50% (§4.4).
fn backoff_delay(attempt: u32) -> Duration {
    let exp = RETRY_BASE.saturating_mul(1 << (attempt - 1).min(20));
    let capped = exp.min(RETRY_CAP);
    let jitter_fraction = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_secs_f64(capped.as_secs_f64() * jitter_fraction)
}

fn http_method(method: &str) -> Result<Method, ExecutorError> {
    match method {
        "GET" => Ok(Method::GET),
        "PUT" => Ok(Method::PUT),
        "POST" => Ok(Method::POST),
        "DELETE" => Ok(Method::DELETE),
        "HEAD" => Ok(Method::HEAD),
        other => Err(ExecutorError::UnsupportedMethod(other.to_string())),
    }
}

fn request_url(request: &SignedRequest) -> String {
    let query = request.params.as_slice();
    let query_string = crate::aws::common::encode::canonical_query_string(query);
    let path = crate::aws::common::encode::encode_key(&request.canonical_uri);
    if query_string.is_empty() {
        format!("{}://{}{}", request.scheme, request.hostname, path)
    } else {
        format!("{}://{}{}?{}", request.scheme, request.hostname, path, query_string)
    }
}

/// Used by §4.5's status-based synthesis to check a 301/307 without a body.
pub fn is_redirect(status: StatusCode) -> bool {
    status == StatusCode::MOVED_PERMANENTLY || status == StatusCode::TEMPORARY_REDIRECT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_bounded_by_cap_even_at_high_attempt_counts() {
        for attempt in 1..=MAX_ATTEMPTS {
            let delay = backoff_delay(attempt);
            assert!(delay <= RETRY_CAP.mul_f64(1.5));
        }
    }

    #[test]
    fn backoff_grows_with_attempt_number_before_the_cap() {
        // Jitter is +/-50%, so compare worst case against best case over many
        // samples: attempt 3's smallest observed delay still exceeds attempt
        // 1's largest observed delay, once both are below the cap.
        let attempt_1_max = (0..50).map(|_| backoff_delay(1).as_secs_f64()).fold(0.0_f64, f64::max);
        let attempt_3_min = (0..50).map(|_| backoff_delay(3).as_secs_f64()).fold(f64::INFINITY, f64::min);
        assert!(attempt_3_min > attempt_1_max, "attempt_3_min={attempt_3_min}, attempt_1_max={attempt_1_max}");
    }

    #[tokio::test]
    async fn cancelled_token_aborts_execute_with_retry_without_sending() {
        let token = CancellationToken::new();
        token.cancel();
        let executor = Executor::with_default_client();
        let result = executor
            .execute_with_retry(|| SignedRequest::new("GET", "s3", crate::aws::common::region::Region::UsEast1, "/"), RetryPolicy::None, Some(&token))
            .await;
        assert!(matches!(result, Err(ExecutorError::Cancelled)));
    }

    #[test]
    fn retryable_status_covers_429_and_5xx() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }

    #[test]
    fn compute_body_hashes_are_deterministic() {
        let (sha_a, md5_a) = compute_body_hashes(b"hello world");
        let (sha_b, md5_b) = compute_body_hashes(b"hello world");
        assert_eq!(sha_a, sha_b);
        assert_eq!(md5_a, md5_b);
    }
}
