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
//! `Region` names a locality of the service; it feeds both signing (the
//! `region` component of the SigV4 credential scope) and endpoint host
//! selection. Unlike AWS-only SDKs, an unrecognized region string is not an
//! error here — S3-compatible deployments invent their own region names, so
//! `Region::Other` carries them through verbatim.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Region {
    UsEast1,
    UsWest1,
    UsWest2,
    CaCentral1,
    EuWest1,
    EuWest2,
    EuCentral1,
    ApSoutheast1,
    ApSoutheast2,
    ApNortheast1,
    ApNortheast2,
    ApSouth1,
    SaEast1,
    CnNorth1,
    /// Any region name not in the fixed AWS table, e.g. a MinIO/Ceph
    /// deployment's region, or the empty string folded to `UsEast1` by the
    /// region resolver (see `s3::region_cache`).
    Other(String),
}

impl Region {
    /// The region name as used on the wire (SigV4 credential scope, query
    /// parameters, `CreateBucketConfiguration`).
    pub fn name(&self) -> &str {
        match *self {
            Region::UsEast1 => "us-east-1",
            Region::UsWest1 => "us-west-1",
            Region::UsWest2 => "us-west-2",
            Region::CaCentral1 => "ca-central-1",
            Region::EuWest1 => "eu-west-1",
            Region::EuWest2 => "eu-west-2",
            Region::EuCentral1 => "eu-central-1",
            Region::ApSoutheast1 => "ap-southeast-1",
            Region::ApSoutheast2 => "ap-southeast-2",
            Region::ApNortheast1 => "ap-northeast-1",
            Region::ApNortheast2 => "ap-northeast-2",
            Region::ApSouth1 => "ap-south-1",
            Region::SaEast1 => "sa-east-1",
            Region::CnNorth1 => "cn-north-1",
            Region::Other(ref s) => s,
        }
    }

    /// Parses the `LocationConstraint` value returned by `GetBucketLocation`
    /// per §4.3: `""` means `us-east-1`, `"EU"` means `eu-west-1`, anything
    /// else is used verbatim.
    pub fn from_location_constraint(value: &str) -> Region {
        match value {
            "" => Region::UsEast1,
            "EU" => Region::EuWest1,
            other => Region::from_name(other),
        }
    }

    pub fn from_name(name: &str) -> Region {
        match name {
            "us-east-1" | "" => Region::UsEast1,
            "us-west-1" => Region::UsWest1,
            "us-west-2" => Region::UsWest2,
            "ca-central-1" => Region::CaCentral1,
            "eu-west-1" => Region::EuWest1,
            "eu-west-2" => Region::EuWest2,
            "eu-central-1" => Region::EuCentral1,
            "ap-southeast-1" => Region::ApSoutheast1,
            "ap-southeast-2" => Region::ApSoutheast2,
            "ap-northeast-1" => Region::ApNortheast1,
            "ap-northeast-2" => Region::ApNortheast2,
            "ap-south-1" => Region::ApSouth1,
            "sa-east-1" => Region::SaEast1,
            "cn-north-1" => Region::CnNorth1,
            other => Region::Other(other.to_string()),
        }
    }

    /// Whether this region requires a `CreateBucketConfiguration` body on
    /// `CreateBucket` (everything except the default `us-east-1`).
    pub fn needs_create_bucket_config(&self) -> bool {
        !matches!(self, Region::UsEast1)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Default for Region {
    fn default() -> Region {
        Region::UsEast1
    }
}

/// Per-client cache of bucket name -> region, guarded by a reader/writer
/// lock per §3/§4.3. Entries are added on first successful lookup and
/// evicted only by explicit invalidation (a redirect response). Each
/// `S3Client` owns its own cache; there is no process-wide singleton (§9).
#[derive(Debug, Default)]
pub struct RegionCache {
    inner: RwLock<HashMap<String, Region>>,
}

impl RegionCache {
    pub fn new() -> RegionCache {
        RegionCache { inner: RwLock::new(HashMap::new()) }
    }

    /// Seed the cache with a preconfigured bucket -> region mapping, e.g.
    /// from `ClientConfig::region_cache_seed` at construction time.
    pub fn with_seed(seed: HashMap<String, Region>) -> RegionCache {
        RegionCache { inner: RwLock::new(seed) }
    }

    pub fn get(&self, bucket: &str) -> Option<Region> {
        self.inner.read().expect("region cache poisoned").get(bucket).cloned()
    }

    pub fn insert(&self, bucket: &str, region: Region) {
        self.inner.write().expect("region cache poisoned").insert(bucket.to_string(), region);
    }

    pub fn invalidate(&self, bucket: &str) {
        self.inner.write().expect("region cache poisoned").remove(bucket);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_constraint_empty_is_us_east_1() {
        assert_eq!(Region::from_location_constraint(""), Region::UsEast1);
    }

    #[test]
    fn location_constraint_eu_is_eu_west_1() {
        assert_eq!(Region::from_location_constraint("EU"), Region::EuWest1);
    }

    #[test]
    fn location_constraint_verbatim_for_unknown() {
        assert_eq!(Region::from_location_constraint("eu-central-1"), Region::EuCentral1);
        match Region::from_location_constraint("garage-region-1") {
            Region::Other(ref s) => assert_eq!(s, "garage-region-1"),
            other => panic!("expected Region::Other, got {:?}", other),
        }
    }

    #[test]
    fn cache_roundtrip_and_invalidate() {
        let cache = RegionCache::new();
        assert!(cache.get("minio-go-test").is_none());
        cache.insert("minio-go-test", Region::EuCentral1);
        assert_eq!(cache.get("minio-go-test"), Some(Region::EuCentral1));
        cache.invalidate("minio-go-test");
        assert!(cache.get("minio-go-test").is_none());
    }

    #[test]
    fn needs_create_bucket_config() {
        assert!(!Region::UsEast1.needs_create_bucket_config());
        assert!(Region::EuCentral1.needs_create_bucket_config());
    }
}
