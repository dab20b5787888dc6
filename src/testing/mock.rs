//! Fake implementations of the Facebook collaborators
//!
//! The fakes answer from preconfigured results and record every call so tests can assert
//! which provider operations a flow reached.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::constants::{TEST_EMAIL, TEST_EXTERNAL_ID, TEST_PICTURE_URL, TEST_USER_NAME};
use crate::accounts::{AccountId, LocalAccount, LoginListener, PictureFetcher};
use crate::oauth::{
    AccessToken, AuthorizationRequest, ExternalProfile, PictureResolution, ProviderClient,
    ProviderError,
};
use crate::utils::crypto::generate_csrf_token;

/// Dialog URL used by the fake; tests parse `state` and `scope` back out of it
pub const FAKE_DIALOG_URL: &str = "https://www.facebook.test/dialog/oauth";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scriptable [`ProviderClient`]
pub struct FakeProviderClient {
    exchange: Result<AccessToken, ProviderError>,
    long_lived: Result<AccessToken, ProviderError>,
    permissions: Result<BTreeSet<String>, ProviderError>,
    profile: Result<ExternalProfile, ProviderError>,
    picture_url: Result<Option<String>, ProviderError>,
    endpoints: BTreeMap<String, Value>,
    calls: Mutex<Vec<String>>,
    last_scopes: Mutex<Option<Vec<String>>>,
    last_resolution: Mutex<Option<PictureResolution>>,
}

impl Default for FakeProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProviderClient {
    pub const SHORT_LIVED_TOKEN: &'static str = "fake-short-lived-token";
    pub const LONG_LIVED_TOKEN: &'static str = "fake-long-lived-token";

    /// A provider for which every step succeeds with the default profile
    #[must_use]
    pub fn new() -> Self {
        Self {
            exchange: Ok(AccessToken::new(Self::SHORT_LIVED_TOKEN, None)),
            long_lived: Ok(AccessToken::new(Self::LONG_LIVED_TOKEN, None)),
            permissions: Ok(["email", "public_profile"]
                .into_iter()
                .map(str::to_string)
                .collect()),
            profile: Ok(ExternalProfile {
                external_id: TEST_EXTERNAL_ID.to_string(),
                display_name: TEST_USER_NAME.to_string(),
                email: Some(TEST_EMAIL.to_string()),
                picture_url: None,
            }),
            picture_url: Ok(Some(TEST_PICTURE_URL.to_string())),
            endpoints: BTreeMap::new(),
            calls: Mutex::new(Vec::new()),
            last_scopes: Mutex::new(None),
            last_resolution: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_exchange_error(mut self, error: ProviderError) -> Self {
        self.exchange = Err(error);
        self
    }

    #[must_use]
    pub fn with_long_lived_error(mut self, error: ProviderError) -> Self {
        self.long_lived = Err(error);
        self
    }

    #[must_use]
    pub fn with_permissions(mut self, granted: &[&str]) -> Self {
        self.permissions = Ok(granted.iter().map(|p| (*p).to_string()).collect());
        self
    }

    #[must_use]
    pub fn with_permissions_error(mut self, error: ProviderError) -> Self {
        self.permissions = Err(error);
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: ExternalProfile) -> Self {
        self.profile = Ok(profile);
        self
    }

    #[must_use]
    pub fn with_profile_error(mut self, error: ProviderError) -> Self {
        self.profile = Err(error);
        self
    }

    #[must_use]
    pub fn with_picture_url(mut self, url: Option<&str>) -> Self {
        self.picture_url = Ok(url.map(str::to_string));
        self
    }

    /// Answer `path` with `value`; unknown paths fail with an API error
    #[must_use]
    pub fn with_endpoint(mut self, path: &str, value: Value) -> Self {
        self.endpoints.insert(path.to_string(), value);
        self
    }

    /// Operation names in call order
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    #[must_use]
    pub fn call_count(&self, operation: &str) -> usize {
        lock(&self.calls).iter().filter(|c| *c == operation).count()
    }

    /// Number of calls that reached Facebook or built a URL
    #[must_use]
    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Scopes of the most recent authorization or re-request URL
    #[must_use]
    pub fn last_scopes(&self) -> Option<Vec<String>> {
        lock(&self.last_scopes).clone()
    }

    #[must_use]
    pub fn last_picture_resolution(&self) -> Option<PictureResolution> {
        *lock(&self.last_resolution)
    }

    fn record(&self, operation: &str) {
        lock(&self.calls).push(operation.to_string());
    }

    fn authorization(
        &self,
        scopes: &[String],
        return_url: &str,
        rerequest: bool,
    ) -> AuthorizationRequest {
        *lock(&self.last_scopes) = Some(scopes.to_vec());
        let state = generate_csrf_token();
        let url = format!(
            "{FAKE_DIALOG_URL}?client_id=fake&redirect_uri={}&response_type=code\
             &scope={}&state={state}{}",
            urlencoding::encode(return_url),
            urlencoding::encode(&scopes.join(",")),
            if rerequest { "&auth_type=rerequest" } else { "" }
        );
        AuthorizationRequest { url, state }
    }
}

#[async_trait]
impl ProviderClient for FakeProviderClient {
    fn build_authorization_url(
        &self,
        scopes: &[String],
        return_url: &str,
    ) -> Result<AuthorizationRequest, ProviderError> {
        self.record("build_authorization_url");
        Ok(self.authorization(scopes, return_url, false))
    }

    fn build_reauthorization_url(
        &self,
        scopes: &[String],
        return_url: &str,
    ) -> Result<AuthorizationRequest, ProviderError> {
        self.record("build_reauthorization_url");
        Ok(self.authorization(scopes, return_url, true))
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _return_url: &str,
    ) -> Result<AccessToken, ProviderError> {
        self.record("exchange_code");
        self.exchange.clone()
    }

    async fn exchange_long_lived(
        &self,
        _token: &AccessToken,
    ) -> Result<AccessToken, ProviderError> {
        self.record("exchange_long_lived");
        self.long_lived.clone()
    }

    async fn fetch_granted_permissions(
        &self,
        _token: &AccessToken,
    ) -> Result<BTreeSet<String>, ProviderError> {
        self.record("fetch_granted_permissions");
        self.permissions.clone()
    }

    async fn fetch_profile(
        &self,
        _token: &AccessToken,
        _fields: &[&str],
    ) -> Result<ExternalProfile, ProviderError> {
        self.record("fetch_profile");
        self.profile.clone()
    }

    async fn fetch_picture_url(
        &self,
        _token: &AccessToken,
        resolution: Option<PictureResolution>,
    ) -> Result<Option<String>, ProviderError> {
        self.record("fetch_picture_url");
        *lock(&self.last_resolution) = resolution;
        self.picture_url.clone()
    }

    async fn request_endpoint(
        &self,
        _token: &AccessToken,
        path: &str,
    ) -> Result<Value, ProviderError> {
        self.record("request_endpoint");
        self.endpoints
            .get(path)
            .cloned()
            .ok_or_else(|| ProviderError::api(format!("unknown endpoint {path}")))
    }
}

/// [`PictureFetcher`] returning fixed bytes and remembering requested URLs
pub struct RecordingPictureFetcher {
    result: Result<Vec<u8>, ProviderError>,
    urls: Mutex<Vec<String>>,
}

impl Default for RecordingPictureFetcher {
    fn default() -> Self {
        Self::new(vec![0xFF, 0xD8, 0xFF, 0xE0])
    }
}

impl RecordingPictureFetcher {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            result: Ok(bytes),
            urls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn failing(error: ProviderError) -> Self {
        Self {
            result: Err(error),
            urls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        lock(&self.urls).clone()
    }
}

#[async_trait]
impl PictureFetcher for RecordingPictureFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        lock(&self.urls).push(url.to_string());
        self.result.clone()
    }
}

/// [`LoginListener`] remembering which accounts it was told about
#[derive(Default)]
pub struct RecordingLoginListener {
    created: Mutex<Vec<AccountId>>,
    logged_in: Mutex<Vec<AccountId>>,
}

impl RecordingLoginListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn created(&self) -> Vec<AccountId> {
        lock(&self.created).clone()
    }

    #[must_use]
    pub fn logged_in(&self) -> Vec<AccountId> {
        lock(&self.logged_in).clone()
    }
}

impl LoginListener for RecordingLoginListener {
    fn account_created(&self, account: &LocalAccount) {
        lock(&self.created).push(account.id);
    }

    fn account_logged_in(&self, account: &LocalAccount) {
        lock(&self.logged_in).push(account.id);
    }
}
