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

//! Contains both `Library` and `Client` documentation.

/// `credentials` contains the type, struct, enum and impls that are credentials related.
pub mod credentials;
/// Functions needed for S3 path and canonical-query percent-encoding.
pub mod encode;
/// `params` contains the query-parameter map used when building canonical requests.
pub mod params;
/// `region` contains the `Region` enum and the per-client region cache.
pub mod region;
/// `request` contains the HTTP executor: assembling, signing, dispatching and retrying requests.
pub mod request;
/// `signature` contains the signature-related types (V2, V4, V4 streaming) and `SignedRequest`,
/// the core request descriptor used throughout `S3Client`.
pub mod signature;
