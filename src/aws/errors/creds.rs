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

use std::io;
use thiserror::Error;

/// Error returned by an `AwsCredentialsProvider`. Kept as a single
/// message-carrying variant set, mirroring the teacher's `CredentialsError`,
/// since callers are expected to classify failures by provider chain
/// position (did *any* provider succeed), not by a `Code` the way `S3Error`
/// is classified.
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("{0}")]
    Message(String),
    #[error("could not read credentials file: {0}")]
    Io(#[from] io::Error),
}

impl CredentialsError {
    pub fn new<S: Into<String>>(message: S) -> CredentialsError {
        CredentialsError::Message(message.into())
    }
}
