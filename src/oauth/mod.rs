//! Facebook OAuth2 plumbing
//!
//! The [`provider::ProviderClient`] trait is the only way the login flow talks to Facebook;
//! [`facebook::FacebookGraphClient`] implements it over the Graph API.

pub mod facebook;
pub mod provider;
pub mod scopes;

pub use facebook::FacebookGraphClient;
pub use provider::{AuthorizationRequest, PictureResolution, ProviderClient};
pub use scopes::{NoopScopeAugmenter, ScopeAugmenter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Query parameters Facebook appends to the callback URL
#[derive(Deserialize, Debug, Default, Clone)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_reason: Option<String>,
    pub error_description: Option<String>,
}

/// Access token returned by the code exchange
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    #[must_use]
    pub fn new(value: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Tokens without an expiry never expire
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= Utc::now())
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &format_args!("<{} chars>", self.value.len()))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Identity returned by the Graph API `/me` node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProfile {
    pub external_id: String,
    pub display_name: String,
    pub email: Option<String>,
    pub picture_url: Option<String>,
}

/// An extra Graph endpoint requested on first login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRequest {
    pub path: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// The request never produced a response
    Transport,
    /// Facebook answered with an error
    Api,
    /// The response could not be understood
    MalformedResponse,
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport => write!(f, "transport"),
            Self::Api => write!(f, "api"),
            Self::MalformedResponse => write!(f, "malformed response"),
        }
    }
}

/// Any failure talking to Facebook
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Transport,
            message: message.into(),
        }
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Api,
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::MalformedResponse,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::malformed(err.to_string())
        } else if err.is_status() {
            Self::api(err.to_string())
        } else {
            Self::transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_token_expiry() {
        assert!(!AccessToken::new("t", None).is_expired());
        assert!(!AccessToken::new("t", Some(Utc::now() + Duration::hours(1))).is_expired());
        assert!(AccessToken::new("t", Some(Utc::now() - Duration::seconds(1))).is_expired());
    }

    #[test]
    fn test_token_debug_hides_value() {
        let token = AccessToken::new("EAAB-super-secret", None);
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("17 chars"));
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::api("Invalid verification code format.");
        assert_eq!(err.to_string(), "api error: Invalid verification code format.");
    }
}
