use async_trait::async_trait;
use std::collections::BTreeSet;

use super::{AccessToken, ExternalProfile, ProviderError};

/// Profile fields requested from `/me`
pub const PROFILE_FIELDS: &[&str] = &["id", "name", "email"];

/// Authorization URL together with the CSRF state embedded in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Picture dimensions requested from `/me/picture`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureResolution {
    pub width: u32,
    pub height: u32,
}

impl PictureResolution {
    /// Parse a `WxH` setting such as `85x85`; anything else is treated as unset
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let (width, height) = raw.trim().split_once(['x', 'X'])?;
        let width = width.trim().parse().ok()?;
        let height = height.trim().parse().ok()?;
        if width == 0 || height == 0 {
            return None;
        }
        Some(Self { width, height })
    }
}

/// Calls to the identity provider needed by the login flow
///
/// Every failure, whatever its origin, comes back as a [`ProviderError`].
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Build the standard authorization URL for `scopes`
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be built from the configured endpoints
    fn build_authorization_url(
        &self,
        scopes: &[String],
        return_url: &str,
    ) -> Result<AuthorizationRequest, ProviderError>;

    /// Build a URL that asks again for permissions the user declined
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be built from the configured endpoints
    fn build_reauthorization_url(
        &self,
        scopes: &[String],
        return_url: &str,
    ) -> Result<AuthorizationRequest, ProviderError>;

    async fn exchange_code(&self, code: &str, return_url: &str)
        -> Result<AccessToken, ProviderError>;

    /// Trade a short-lived token for a long-lived one
    async fn exchange_long_lived(&self, token: &AccessToken) -> Result<AccessToken, ProviderError>;

    /// Permissions the user actually granted
    async fn fetch_granted_permissions(
        &self,
        token: &AccessToken,
    ) -> Result<BTreeSet<String>, ProviderError>;

    async fn fetch_profile(
        &self,
        token: &AccessToken,
        fields: &[&str],
    ) -> Result<ExternalProfile, ProviderError>;

    /// URL of the profile picture, `None` when Facebook has none
    async fn fetch_picture_url(
        &self,
        token: &AccessToken,
        resolution: Option<PictureResolution>,
    ) -> Result<Option<String>, ProviderError>;

    /// Raw JSON from an arbitrary Graph path such as `/me/friends`
    async fn request_endpoint(
        &self,
        token: &AccessToken,
        path: &str,
    ) -> Result<serde_json::Value, ProviderError>;
}
