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

// Portions borrowed from the rusoto project. See README.md

//! Client Documentation
//!
//! Credential sourcing. `AwsCredentialsProvider` implementations are tried
//! in priority order by `ChainProvider`: environment variables, an
//! in-process static provider, then the `~/.aws/credentials` profile file.
//! `AutoRefreshingProvider` wraps any provider so short-lived credentials
//! (e.g. session tokens) are re-fetched once they're close to expiring.

use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::aws::errors::creds::CredentialsError;

/// Signature variant a signer was constructed for, or that a caller
/// requests. Anonymous mode skips signing entirely (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureVersion {
    V2,
    V4,
    V4Streaming,
    Anonymous,
}

/// Base struct carrying an access key, secret key, optional session token,
/// and optional expiry. A `None` expiry means the credential never expires
/// (static/anonymous credentials).
#[derive(Clone, Debug)]
pub struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    token: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl AwsCredentials {
    pub fn new<K, S>(access_key_id: K, secret_access_key: S, token: Option<String>, expires_at: Option<DateTime<Utc>>) -> AwsCredentials
    where
        K: Into<String>,
        S: Into<String>,
    {
        AwsCredentials {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            token,
            expires_at,
        }
    }

    pub fn aws_access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn aws_secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// True once within 20 seconds of the credential's expiry, matching the
    /// teacher's refresh guard band. Credentials with no expiry never
    /// report as expired.
    fn credentials_are_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at < Utc::now() + Duration::seconds(20),
            None => false,
        }
    }
}

/// A trait for types that produce `AwsCredentials`.
pub trait AwsCredentialsProvider {
    fn credentials(&self) -> Result<AwsCredentials, CredentialsError>;
}

/// Provides credentials from `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` /
/// `AWS_SESSION_TOKEN` (§6).
pub struct EnvironmentProvider;

impl AwsCredentialsProvider for EnvironmentProvider {
    fn credentials(&self) -> Result<AwsCredentials, CredentialsError> {
        let key = env::var("AWS_ACCESS_KEY_ID")
            .map_err(|_| CredentialsError::new("No AWS_ACCESS_KEY_ID in environment"))?;
        let secret = env::var("AWS_SECRET_ACCESS_KEY")
            .map_err(|_| CredentialsError::new("No AWS_SECRET_ACCESS_KEY in environment"))?;

        if key.is_empty() || secret.is_empty() {
            return Err(CredentialsError::new(
                "Couldn't find either AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY or both in environment.",
            ));
        }

        let token = env::var("AWS_SESSION_TOKEN").ok().filter(|v| !v.is_empty());

        Ok(AwsCredentials::new(key, secret, token, None))
    }
}

/// Provides credentials set directly by the caller (teacher's
/// `ParametersProvider`, renamed to match what it actually holds).
#[derive(Clone, Debug)]
pub struct StaticProvider {
    credentials: AwsCredentials,
}

impl StaticProvider {
    pub fn new<K, S>(access_key_id: K, secret_access_key: S, token: Option<String>) -> Result<StaticProvider, CredentialsError>
    where
        K: Into<String>,
        S: Into<String>,
    {
        let key = access_key_id.into();
        let secret = secret_access_key.into();
        if key.is_empty() || secret.is_empty() {
            return Err(CredentialsError::new("Keys are invalid."));
        }
        Ok(StaticProvider { credentials: AwsCredentials::new(key, secret, token, None) })
    }

    pub fn anonymous() -> StaticProvider {
        StaticProvider { credentials: AwsCredentials::new("", "", None, None) }
    }
}

impl AwsCredentialsProvider for StaticProvider {
    fn credentials(&self) -> Result<AwsCredentials, CredentialsError> {
        Ok(self.credentials.clone())
    }
}

/// Provides credentials from a profile in `~/.aws/credentials`.
#[derive(Clone, Debug)]
pub struct ProfileProvider {
    location: PathBuf,
    profile: String,
}

impl ProfileProvider {
    pub fn new() -> Result<ProfileProvider, CredentialsError> {
        let home = env::var_os("HOME").ok_or_else(|| CredentialsError::new("The environment variable HOME must be set."))?;
        let mut location = PathBuf::from(home);
        location.push(".aws");
        location.push("credentials");
        Ok(ProfileProvider { location, profile: "default".to_string() })
    }

    pub fn with_configuration<F, P>(location: F, profile: P) -> ProfileProvider
    where
        F: Into<PathBuf>,
        P: Into<String>,
    {
        ProfileProvider { location: location.into(), profile: profile.into() }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }
}

impl AwsCredentialsProvider for ProfileProvider {
    fn credentials(&self) -> Result<AwsCredentials, CredentialsError> {
        let mut profiles = parse_credentials_file(&self.location)?;
        profiles.remove(&self.profile).ok_or_else(|| CredentialsError::new("Profile not found."))
    }
}

fn parse_credentials_file(location: &Path) -> Result<HashMap<String, AwsCredentials>, CredentialsError> {
    let file = File::open(location).map_err(|_| CredentialsError::new("Could not open credentials file."))?;

    let profile_regex = Regex::new(r"^\[([^\]]+)\]$").unwrap();
    let mut profiles: HashMap<String, AwsCredentials> = HashMap::new();
    let mut access_key_id: Option<String> = None;
    let mut secret_access_key: Option<String> = None;
    let mut profile_name: Option<String> = None;

    for line in BufReader::new(file).lines() {
        let line = line?;
        let line = line.trim();
        if line.starts_with('#') || line.is_empty() {
            continue;
        }

        if let Some(caps) = profile_regex.captures(line) {
            flush_profile(&mut profiles, &mut profile_name, &mut access_key_id, &mut secret_access_key);
            profile_name = Some(caps[1].to_string());
            continue;
        }

        let lower = line.to_ascii_lowercase();
        if lower.starts_with("aws_access_key_id") && access_key_id.is_none() {
            access_key_id = line.split('=').nth(1).map(|v| v.trim().to_string());
        } else if lower.starts_with("aws_secret_access_key") && secret_access_key.is_none() {
            secret_access_key = line.split('=').nth(1).map(|v| v.trim().to_string());
        }
    }
    flush_profile(&mut profiles, &mut profile_name, &mut access_key_id, &mut secret_access_key);

    if profiles.is_empty() {
        return Err(CredentialsError::new("No credentials found."));
    }

    Ok(profiles)
}

fn flush_profile(
    profiles: &mut HashMap<String, AwsCredentials>,
    profile_name: &mut Option<String>,
    access_key_id: &mut Option<String>,
    secret_access_key: &mut Option<String>,
) {
    if let (Some(name), Some(key), Some(secret)) = (profile_name.take(), access_key_id.take(), secret_access_key.take()) {
        profiles.insert(name, AwsCredentials::new(key, secret, None, None));
    }
}

/// Wraps a provider, refreshing the cached credential once it is within 20
/// seconds of expiry. Sync-safe via a `Mutex`.
pub struct AutoRefreshingProvider<P> {
    inner: P,
    cached: Mutex<AwsCredentials>,
}

impl<P: AwsCredentialsProvider> AutoRefreshingProvider<P> {
    pub fn new(provider: P) -> Result<AutoRefreshingProvider<P>, CredentialsError> {
        let creds = provider.credentials()?;
        Ok(AutoRefreshingProvider { inner: provider, cached: Mutex::new(creds) })
    }
}

impl<P: AwsCredentialsProvider> AwsCredentialsProvider for AutoRefreshingProvider<P> {
    fn credentials(&self) -> Result<AwsCredentials, CredentialsError> {
        let mut cached = self.cached.lock().expect("credentials cache poisoned");
        if cached.credentials_are_expired() {
            *cached = self.inner.credentials()?;
        }
        Ok(cached.clone())
    }
}

/// Tries, in order: environment, a caller-supplied static provider, then
/// the profile file. IAM/IMDS sourcing is intentionally not included — see
/// `DESIGN.md`.
#[derive(Clone, Debug)]
pub struct ChainProvider {
    static_provider: Option<StaticProvider>,
    profile_provider: Option<ProfileProvider>,
}

impl ChainProvider {
    pub fn new(static_provider: Option<StaticProvider>) -> ChainProvider {
        ChainProvider { static_provider, profile_provider: ProfileProvider::new().ok() }
    }

    pub fn with_static_provider(static_provider: StaticProvider) -> ChainProvider {
        ChainProvider { static_provider: Some(static_provider), profile_provider: None }
    }

    pub fn with_profile_provider(profile_provider: ProfileProvider) -> ChainProvider {
        ChainProvider { static_provider: None, profile_provider: Some(profile_provider) }
    }
}

impl AwsCredentialsProvider for ChainProvider {
    fn credentials(&self) -> Result<AwsCredentials, CredentialsError> {
        EnvironmentProvider
            .credentials()
            .or_else(|_| match self.static_provider {
                Some(ref provider) => provider.credentials(),
                None => Err(CredentialsError::new("")),
            })
            .or_else(|_| match self.profile_provider {
                Some(ref provider) => provider.credentials(),
                None => Err(CredentialsError::new("")),
            })
            .map_err(|_| CredentialsError::new("Couldn't find AWS credentials in environment, parameters, or credentials file."))
    }
}

/// The provider most callers want: environment, then caller-supplied
/// static credentials, then the profile file, auto-refreshing.
pub type DefaultCredentialsProvider = AutoRefreshingProvider<ChainProvider>;

impl DefaultCredentialsProvider {
    pub fn from_chain(static_provider: Option<StaticProvider>) -> Result<DefaultCredentialsProvider, CredentialsError> {
        AutoRefreshingProvider::new(ChainProvider::new(static_provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_provider_rejects_empty_keys() {
        assert!(StaticProvider::new("", "secret", None).is_err());
        assert!(StaticProvider::new("key", "", None).is_err());
    }

    #[test]
    fn static_provider_roundtrips() {
        let provider = StaticProvider::new("AKIA", "secret", Some("token".to_string())).unwrap();
        let creds = provider.credentials().unwrap();
        assert_eq!(creds.aws_access_key_id(), "AKIA");
        assert_eq!(creds.aws_secret_access_key(), "secret");
        assert_eq!(creds.token(), Some("token"));
    }

    #[test]
    fn credentials_without_expiry_never_expire() {
        let creds = AwsCredentials::new("k", "s", None, None);
        assert!(!creds.credentials_are_expired());
    }

    #[test]
    fn credentials_past_expiry_guard_band_are_expired() {
        let creds = AwsCredentials::new("k", "s", None, Some(Utc::now() + Duration::seconds(5)));
        assert!(creds.credentials_are_expired());
    }

    #[test]
    fn auto_refreshing_provider_refreshes_past_guard_band() {
        struct Counting(Mutex<i32>);
        impl AwsCredentialsProvider for Counting {
            fn credentials(&self) -> Result<AwsCredentials, CredentialsError> {
                let mut n = self.0.lock().unwrap();
                *n += 1;
                Ok(AwsCredentials::new("k", "s", None, Some(Utc::now() + Duration::seconds(5))))
            }
        }
        let wrapped = AutoRefreshingProvider::new(Counting(Mutex::new(0))).unwrap();
        wrapped.credentials().unwrap();
        wrapped.credentials().unwrap();
        assert_eq!(*wrapped.inner.0.lock().unwrap(), 2);
    }
}
