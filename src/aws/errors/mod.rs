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

//! `creds` contains the error type returned by `AwsCredentialsProvider`
//! implementations. `s3_error` contains the structured error type returned
//! by every S3 verb, derived from the XML error document or synthesized
//! from an HTTP status (§4.5/§7).
pub mod creds;
pub mod s3_error;

pub use s3_error::{ErrorDetail, S3Error};
