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
//! `Params` is the ordered multimap of query parameters attached to a
//! `SignedRequest`. It exists separately from a plain `HashMap` so that
//! request builders can `put` the same key twice (e.g. presign callers
//! composing conditions) without losing entries, while `signature` still
//! sees a stable, sortable view via `to_vec`.

#[derive(Debug, Clone, Default)]
pub struct Params {
    entries: Vec<(String, String)>,
}

/// Convenience trait mirroring the teacher's `ServiceParams`, so request
/// builders can call `.put(...)` directly on whatever they're assembling.
pub trait ServiceParams {
    fn put<S>(&mut self, key: &str, value: S) where S: Into<String>;
}

impl Params {
    pub fn new() -> Params {
        Params { entries: Vec::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn as_slice(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn into_vec(self) -> Vec<(String, String)> {
        self.entries
    }
}

impl ServiceParams for Params {
    fn put<S>(&mut self, key: &str, value: S) where S: Into<String> {
        self.entries.push((key.to_string(), value.into()));
    }
}

impl IntoIterator for Params {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_preserves_insertion_order_and_duplicates() {
        let mut params = Params::new();
        params.put("uploadId", "abc");
        params.put("partNumber", "1");
        params.put("partNumber", "2");
        assert_eq!(
            params.as_slice(),
            &[
                ("uploadId".to_string(), "abc".to_string()),
                ("partNumber".to_string(), "1".to_string()),
                ("partNumber".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn get_returns_first_match() {
        let mut params = Params::new();
        params.put("marker", "a");
        assert_eq!(params.get("marker"), Some("a"));
        assert_eq!(params.get("missing"), None);
    }
}
