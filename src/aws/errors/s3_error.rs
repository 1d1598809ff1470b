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
//! `S3Error` is the structured error every public verb returns on a non-2xx
//! response (§4.5/§7). Callers classify failures by `code()`, never by
//! substring-matching `message()` — `code()` is a stable string drawn from
//! the S3 XML error vocabulary or synthesized from the HTTP status when the
//! body is empty (HEAD responses).

use thiserror::Error;

use crate::aws::errors::creds::CredentialsError;

/// The structural fields every S3 error carries (§7): always `code` and
/// `message`; the rest are populated when the response supplied them.
#[derive(Debug, Clone, Default)]
pub struct ErrorDetail {
    pub message: String,
    pub bucket_name: Option<String>,
    pub key: Option<String>,
    pub resource: Option<String>,
    pub request_id: Option<String>,
    pub host_id: Option<String>,
    pub status: Option<u16>,
}

impl ErrorDetail {
    pub fn new<S: Into<String>>(message: S) -> ErrorDetail {
        ErrorDetail { message: message.into(), ..ErrorDetail::default() }
    }

    pub fn with_status(mut self, status: u16) -> ErrorDetail {
        self.status = Some(status);
        self
    }

    pub fn with_bucket<S: Into<String>>(mut self, bucket: S) -> ErrorDetail {
        self.bucket_name = Some(bucket.into());
        self
    }

    pub fn with_key<S: Into<String>>(mut self, key: S) -> ErrorDetail {
        self.key = Some(key.into());
        self
    }

    pub fn with_request_id<S: Into<String>>(mut self, request_id: S) -> ErrorDetail {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_host_id<S: Into<String>>(mut self, host_id: S) -> ErrorDetail {
        self.host_id = Some(host_id.into());
        self
    }
}

/// One variant per stable `Code` string named in §7, plus `Other` for codes
/// this crate doesn't enumerate (forward compatibility with codes the
/// remote may introduce that were never part of the spec's list).
#[derive(Debug, Error)]
pub enum S3Error {
    #[error("InvalidArgument: {0}")]
    InvalidArgument(ErrorDetail),
    #[error("InvalidBucketName: {0}")]
    InvalidBucketName(ErrorDetail),
    #[error("InvalidObjectName: {0}")]
    InvalidObjectName(ErrorDetail),
    #[error("NoSuchBucket: {0}")]
    NoSuchBucket(ErrorDetail),
    #[error("NoSuchKey: {0}")]
    NoSuchKey(ErrorDetail),
    #[error("NoSuchUpload: {0}")]
    NoSuchUpload(ErrorDetail),
    #[error("BucketAlreadyExists: {0}")]
    BucketAlreadyExists(ErrorDetail),
    #[error("BucketAlreadyOwnedByYou: {0}")]
    BucketAlreadyOwnedByYou(ErrorDetail),
    #[error("BucketNotEmpty: {0}")]
    BucketNotEmpty(ErrorDetail),
    #[error("AccessDenied: {0}")]
    AccessDenied(ErrorDetail),
    #[error("SignatureDoesNotMatch: {0}")]
    SignatureDoesNotMatch(ErrorDetail),
    #[error("PreconditionFailed: {0}")]
    PreconditionFailed(ErrorDetail),
    #[error("InvalidRange: {0}")]
    InvalidRange(ErrorDetail),
    #[error("EntityTooLarge: {0}")]
    EntityTooLarge(ErrorDetail),
    #[error("SlowDown: {0}")]
    SlowDown(ErrorDetail),
    #[error("InternalError: {0}")]
    InternalError(ErrorDetail),
    #[error("NotImplemented: {0}")]
    NotImplemented(ErrorDetail),
    #[error("BadRequest: {0}")]
    BadRequest(ErrorDetail),
    #[error("MethodNotAllowed: {0}")]
    MethodNotAllowed(ErrorDetail),
    #[error("MissingContentLength: {0}")]
    MissingContentLength(ErrorDetail),
    #[error("Conflict: {0}")]
    Conflict(ErrorDetail),
    #[error("PermanentRedirect: {0}")]
    PermanentRedirect(ErrorDetail),
    #[error("TemporaryRedirect: {0}")]
    TemporaryRedirect(ErrorDetail),
    #[error("{code}: {0}", code = .0)]
    Other(String, ErrorDetail),
    #[error("transport error: {0}")]
    Transport(#[from] crate::aws::common::request::ExecutorError),
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error(transparent)]
    Signing(#[from] crate::aws::common::signature::SigningError),
}

impl std::fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl S3Error {
    /// The stable `Code` string, matching exactly what the XML `<Code>`
    /// element (or status synthesis) would have produced.
    pub fn code(&self) -> &str {
        match self {
            S3Error::InvalidArgument(_) => "InvalidArgument",
            S3Error::InvalidBucketName(_) => "InvalidBucketName",
            S3Error::InvalidObjectName(_) => "InvalidObjectName",
            S3Error::NoSuchBucket(_) => "NoSuchBucket",
            S3Error::NoSuchKey(_) => "NoSuchKey",
            S3Error::NoSuchUpload(_) => "NoSuchUpload",
            S3Error::BucketAlreadyExists(_) => "BucketAlreadyExists",
            S3Error::BucketAlreadyOwnedByYou(_) => "BucketAlreadyOwnedByYou",
            S3Error::BucketNotEmpty(_) => "BucketNotEmpty",
            S3Error::AccessDenied(_) => "AccessDenied",
            S3Error::SignatureDoesNotMatch(_) => "SignatureDoesNotMatch",
            S3Error::PreconditionFailed(_) => "PreconditionFailed",
            S3Error::InvalidRange(_) => "InvalidRange",
            S3Error::EntityTooLarge(_) => "EntityTooLarge",
            S3Error::SlowDown(_) => "SlowDown",
            S3Error::InternalError(_) => "InternalError",
            S3Error::NotImplemented(_) => "NotImplemented",
            S3Error::BadRequest(_) => "BadRequest",
            S3Error::MethodNotAllowed(_) => "MethodNotAllowed",
            S3Error::MissingContentLength(_) => "MissingContentLength",
            S3Error::Conflict(_) => "Conflict",
            S3Error::PermanentRedirect(_) => "PermanentRedirect",
            S3Error::TemporaryRedirect(_) => "TemporaryRedirect",
            S3Error::Other(code, _) => code,
            S3Error::Transport(_) => "Transport",
            S3Error::Credentials(_) => "Credentials",
            S3Error::Signing(_) => "Signing",
        }
    }

    pub fn detail(&self) -> Option<&ErrorDetail> {
        match self {
            S3Error::InvalidArgument(d)
            | S3Error::InvalidBucketName(d)
            | S3Error::InvalidObjectName(d)
            | S3Error::NoSuchBucket(d)
            | S3Error::NoSuchKey(d)
            | S3Error::NoSuchUpload(d)
            | S3Error::BucketAlreadyExists(d)
            | S3Error::BucketAlreadyOwnedByYou(d)
            | S3Error::BucketNotEmpty(d)
            | S3Error::AccessDenied(d)
            | S3Error::SignatureDoesNotMatch(d)
            | S3Error::PreconditionFailed(d)
            | S3Error::InvalidRange(d)
            | S3Error::EntityTooLarge(d)
            | S3Error::SlowDown(d)
            | S3Error::InternalError(d)
            | S3Error::NotImplemented(d)
            | S3Error::BadRequest(d)
            | S3Error::MethodNotAllowed(d)
            | S3Error::MissingContentLength(d)
            | S3Error::Conflict(d)
            | S3Error::PermanentRedirect(d)
            | S3Error::TemporaryRedirect(d)
            | S3Error::Other(_, d) => Some(d),
            S3Error::Transport(_) | S3Error::Credentials(_) | S3Error::Signing(_) => None,
        }
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> S3Error {
        S3Error::InvalidArgument(ErrorDetail::new(message))
    }

    /// Builds an `S3Error` from a parsed XML error document (§4.5/§6).
    pub fn from_xml(code: &str, detail: ErrorDetail) -> S3Error {
        match code {
            "InvalidArgument" => S3Error::InvalidArgument(detail),
            "InvalidBucketName" => S3Error::InvalidBucketName(detail),
            "InvalidObjectName" | "InvalidKeyName" => S3Error::InvalidObjectName(detail),
            "NoSuchBucket" => S3Error::NoSuchBucket(detail),
            "NoSuchKey" => S3Error::NoSuchKey(detail),
            "NoSuchUpload" => S3Error::NoSuchUpload(detail),
            "BucketAlreadyExists" => S3Error::BucketAlreadyExists(detail),
            "BucketAlreadyOwnedByYou" => S3Error::BucketAlreadyOwnedByYou(detail),
            "BucketNotEmpty" => S3Error::BucketNotEmpty(detail),
            "AccessDenied" => S3Error::AccessDenied(detail),
            "SignatureDoesNotMatch" => S3Error::SignatureDoesNotMatch(detail),
            "PreconditionFailed" => S3Error::PreconditionFailed(detail),
            "InvalidRange" => S3Error::InvalidRange(detail),
            "EntityTooLarge" => S3Error::EntityTooLarge(detail),
            "SlowDown" => S3Error::SlowDown(detail),
            "InternalError" => S3Error::InternalError(detail),
            "NotImplemented" => S3Error::NotImplemented(detail),
            "BadRequest" => S3Error::BadRequest(detail),
            "MethodNotAllowed" => S3Error::MethodNotAllowed(detail),
            "MissingContentLength" => S3Error::MissingContentLength(detail),
            "BucketNotEmpty409" | "Conflict" => S3Error::Conflict(detail),
            "PermanentRedirect" => S3Error::PermanentRedirect(detail),
            "TemporaryRedirect" => S3Error::TemporaryRedirect(detail),
            other => S3Error::Other(other.to_string(), detail),
        }
    }

    /// Synthesizes an error purely from an HTTP status code, for responses
    /// with no body (§4.5): HEAD requests, and any status this crate hasn't
    /// seen an XML body for.
    pub fn from_status(status: u16, is_bucket_target: bool, method_is_delete: bool, detail: ErrorDetail) -> S3Error {
        let detail = detail.with_status(status);
        match status {
            301 => S3Error::PermanentRedirect(detail),
            307 => S3Error::TemporaryRedirect(detail),
            400 => S3Error::BadRequest(detail),
            403 => S3Error::AccessDenied(detail),
            404 if is_bucket_target => S3Error::NoSuchBucket(detail),
            404 => S3Error::NoSuchKey(detail),
            405 => S3Error::MethodNotAllowed(detail),
            409 if method_is_delete => S3Error::BucketNotEmpty(detail),
            409 => S3Error::Conflict(detail),
            411 => S3Error::MissingContentLength(detail),
            412 => S3Error::PreconditionFailed(detail),
            416 => S3Error::InvalidRange(detail),
            429 => S3Error::SlowDown(detail),
            501 => S3Error::NotImplemented(detail),
            500..=599 => S3Error::InternalError(detail),
            other => S3Error::Other(other.to_string(), detail),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_xml_maps_known_codes() {
        assert_eq!(S3Error::from_xml("NoSuchKey", ErrorDetail::new("x")).code(), "NoSuchKey");
        assert_eq!(S3Error::from_xml("BucketAlreadyOwnedByYou", ErrorDetail::new("x")).code(), "BucketAlreadyOwnedByYou");
    }

    #[test]
    fn from_xml_falls_back_to_other_for_unknown_codes() {
        let err = S3Error::from_xml("SomeFutureCode", ErrorDetail::new("x"));
        assert_eq!(err.code(), "SomeFutureCode");
        assert!(matches!(err, S3Error::Other(_, _)));
    }

    #[test]
    fn from_status_distinguishes_bucket_vs_object_404() {
        assert_eq!(S3Error::from_status(404, true, false, ErrorDetail::new("")).code(), "NoSuchBucket");
        assert_eq!(S3Error::from_status(404, false, false, ErrorDetail::new("")).code(), "NoSuchKey");
    }

    #[test]
    fn from_status_distinguishes_delete_409_as_bucket_not_empty() {
        assert_eq!(S3Error::from_status(409, true, true, ErrorDetail::new("")).code(), "BucketNotEmpty");
        assert_eq!(S3Error::from_status(409, false, false, ErrorDetail::new("")).code(), "Conflict");
    }

    #[test]
    fn from_status_maps_redirects_and_carries_status() {
        let err = S3Error::from_status(301, true, false, ErrorDetail::new(""));
        assert_eq!(err.code(), "PermanentRedirect");
        assert_eq!(err.detail().unwrap().status, Some(301));
    }

    #[test]
    fn from_status_5xx_falls_back_to_internal_error() {
        assert_eq!(S3Error::from_status(503, false, false, ErrorDetail::new("")).code(), "InternalError");
    }
}
