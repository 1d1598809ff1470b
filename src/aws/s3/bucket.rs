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
//! Bucket-level request/response types. The teacher's `CreateBucketRequest`
//! carried the full ACL-grantee field set (`grant_full_control`,
//! `grant_write_acp`, ...); those are dropped per §1/§4.2a (full ACL codecs
//! are out of scope) in favor of the single canned-ACL header.

use crate::aws::common::region::Region;
use crate::aws::s3::header::CannedAcl;

#[derive(Debug, Clone)]
pub struct CreateBucketRequest {
    pub bucket: String,
    pub region: Region,
    pub acl: Option<CannedAcl>,
}

impl CreateBucketRequest {
    pub fn new<S: Into<String>>(bucket: S, region: Region) -> CreateBucketRequest {
        CreateBucketRequest { bucket: bucket.into(), region, acl: None }
    }

    pub fn with_acl(mut self, acl: CannedAcl) -> CreateBucketRequest {
        self.acl = Some(acl);
        self
    }

    /// §4.1.7.1 of the XML schema (§6): `CreateBucketConfiguration` is only
    /// sent for regions other than the default `us-east-1`.
    pub fn needs_location_constraint(&self) -> bool {
        self.region.needs_create_bucket_config()
    }
}

/// One entry of `ListBuckets` (§6's bucket listing, a small single-page
/// result — unlike object/upload/part listing it is never paginated by
/// the service).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    pub name: String,
    pub creation_date: String,
}

#[derive(Debug, Clone, Default)]
pub struct ListBucketsResult {
    pub owner_id: Option<String>,
    pub owner_display_name: Option<String>,
    pub buckets: Vec<BucketInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_bucket_request_needs_location_constraint_except_us_east_1() {
        assert!(!CreateBucketRequest::new("b", Region::UsEast1).needs_location_constraint());
        assert!(CreateBucketRequest::new("b", Region::EuCentral1).needs_location_constraint());
    }

    #[test]
    fn with_acl_sets_the_canned_acl() {
        let req = CreateBucketRequest::new("b", Region::UsEast1).with_acl(CannedAcl::PublicRead);
        assert_eq!(req.acl, Some(CannedAcl::PublicRead));
    }
}
