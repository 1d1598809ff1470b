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
//! Everything S3-specific lives here: the endpoint/URL builder, the bucket
//! and object data types, the region resolver, pagination iterators, the
//! multipart transfer engine, presign/POST-policy, and `S3Client` itself —
//! the type applications construct and call.

/// `bucket` contains bucket-level request/response types.
pub mod bucket;
/// `client` contains `S3Client`, the public interface applications use.
pub mod client;
/// `endpoint` decides virtual-host vs path-style URLs and validates bucket names.
pub mod endpoint;
/// `header` contains small shared header helpers (canned ACL, SSE descriptor).
pub mod header;
/// `multipart` is the concurrent multipart transfer engine.
pub mod multipart;
/// `object` contains object-level request/response types, including multipart session types.
pub mod object;
/// `pagination` contains the lazy, abortable listing iterators.
pub mod pagination;
/// `presign` builds presigned URLs and browser POST policies.
pub mod presign;
/// `region_cache` resolves a bucket's region and keeps the per-client cache current.
pub mod region_cache;
/// `xml` contains the wire XML schemas (§6) as `quick-xml`/`serde` structs.
pub mod xml;
