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

//! Core of an S3-compatible object storage client: request signing (v2/v4,
//! including streaming chunked v4), regional endpoint resolution, a
//! concurrent multipart transfer engine, pagination over the listing APIs,
//! and presigned URL / POST-policy generation.
//!
//! Only `aws` is documented for public consumption; its submodules carry
//! `Client` vs `Library` documentation the same way the rest of this crate's
//! lineage does.

#[macro_use]
extern crate log;

pub mod aws;
