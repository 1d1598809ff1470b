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
//! Percent-encoding for object keys and canonical query strings, per the
//! S3/SigV4 rule set (not plain RFC 3986): printable ASCII and the
//! unreserved set are kept as-is, space becomes `%20` (never `+`), and `/`
//! is preserved as a path separator when encoding an object key.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Bytes that must NOT be percent-encoded by the AWS canonical rule set:
/// unreserved characters `A-Za-z0-9-_.~`.
const AWS_UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Encodes a single path segment (no `/` kept) per the AWS canonical rule.
fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, AWS_UNRESERVED).to_string()
}

/// Path-encodes an object key: `/` is preserved as a separator, every other
/// byte goes through the AWS unreserved-set encoder. This is the rule
/// invoked whenever an object key is placed on the wire (§3 invariant).
///
/// ```
/// assert_eq!(s3_core::aws::common::encode::encode_key("foo bar/baz?"), "foo%20bar/baz%3F");
/// ```
pub fn encode_key(key: &str) -> String {
    key.split('/').map(encode_segment).collect::<Vec<_>>().join("/")
}

/// Encodes a query parameter value for inclusion in a canonical query
/// string. Same unreserved set as `encode_key`, but `/` is NOT preserved
/// (query values are opaque, not paths).
pub fn encode_query_value(value: &str) -> String {
    utf8_percent_encode(value, AWS_UNRESERVED).to_string()
}

/// Builds an AWS canonical query string: parameters are sorted
/// lexicographically by (encoded) key, then joined as `key=value` with `&`,
/// per §4.1 rule 2. Keys and values are both percent-encoded; a parameter
/// with no value is rendered as `key=`.
pub fn canonical_query_string(params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (encode_query_value(k), encode_query_value(v)))
        .collect();
    encoded.sort();
    encoded
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_encoding_preserves_slash_and_escapes_space_and_question_mark() {
        assert_eq!(encode_key("foo bar/baz?"), "foo%20bar/baz%3F");
    }

    #[test]
    fn path_encoding_space_is_percent20_not_plus() {
        assert_eq!(encode_key("a b"), "a%20b");
        assert!(!encode_key("a b").contains('+'));
    }

    #[test]
    fn path_encoding_non_ascii_is_percent_encoded() {
        assert_eq!(encode_key("caf\u{e9}"), "caf%C3%A9");
    }

    #[test]
    fn canonical_query_string_sorted_by_key() {
        let params = vec![
            ("prefix".to_string(), "a/".to_string()),
            ("delimiter".to_string(), "/".to_string()),
        ];
        assert_eq!(canonical_query_string(&params), "delimiter=%2F&prefix=a%2F");
    }
}
