//! Graph API implementation of [`ProviderClient`]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeSet;
use url::Url;

use super::provider::{AuthorizationRequest, PictureResolution, ProviderClient};
use super::{AccessToken, ExternalProfile, ProviderError};
use crate::settings::{FacebookCredentials, FacebookSettings};
use crate::utils::crypto::generate_csrf_token;

pub const DIALOG_BASE_URL: &str = "https://www.facebook.com";
pub const GRAPH_BASE_URL: &str = "https://graph.facebook.com";

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct GraphErrorEnvelope {
    error: GraphError,
}

#[derive(Deserialize)]
struct GraphError {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<i64>,
}

#[derive(Deserialize)]
struct PermissionsResponse {
    data: Vec<PermissionEntry>,
}

#[derive(Deserialize)]
struct PermissionEntry {
    permission: String,
    status: String,
}

#[derive(Deserialize)]
struct ProfileNode {
    id: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Deserialize)]
struct PictureResponse {
    data: PictureData,
}

#[derive(Deserialize)]
struct PictureData {
    url: Option<String>,
}

/// Talks to `www.facebook.com` for the login dialog and `graph.facebook.com` for everything else
#[derive(Clone)]
pub struct FacebookGraphClient {
    http: reqwest::Client,
    app_id: String,
    app_secret: String,
    graph_version: String,
    dialog_base_url: String,
    graph_base_url: String,
}

impl FacebookGraphClient {
    #[must_use]
    pub fn new(credentials: &FacebookCredentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            app_id: credentials.app_id.clone(),
            app_secret: credentials.app_secret.clone(),
            graph_version: credentials.graph_version.clone(),
            dialog_base_url: DIALOG_BASE_URL.to_string(),
            graph_base_url: GRAPH_BASE_URL.to_string(),
        }
    }

    /// Build a client from possibly incomplete settings
    ///
    /// The login flow validates the settings before every use, so a client built from
    /// missing credentials is never asked to make a request.
    #[must_use]
    pub fn from_settings(settings: &FacebookSettings) -> Self {
        let credentials = settings.validate().unwrap_or_else(|_| FacebookCredentials {
            app_id: settings.get_app_id().unwrap_or_default().trim().to_string(),
            app_secret: settings.get_app_secret().unwrap_or_default().trim().to_string(),
            graph_version: settings.normalized_graph_version(),
        });
        Self::new(&credentials)
    }

    /// Point the client at different hosts, e.g. a local stub server
    #[must_use]
    pub fn with_base_urls(mut self, dialog_base_url: &str, graph_base_url: &str) -> Self {
        self.dialog_base_url = dialog_base_url.trim_end_matches('/').to_string();
        self.graph_base_url = graph_base_url.trim_end_matches('/').to_string();
        self
    }

    fn graph_url(&self, path: &str) -> Result<Url, ProviderError> {
        let raw = format!(
            "{}/v{}/{}",
            self.graph_base_url,
            self.graph_version,
            path.trim_start_matches('/')
        );
        Url::parse(&raw)
            .map_err(|e| ProviderError::transport(format!("invalid Graph URL {raw}: {e}")))
    }

    fn authorization_url(
        &self,
        scopes: &[String],
        return_url: &str,
        rerequest: bool,
    ) -> Result<AuthorizationRequest, ProviderError> {
        let raw = format!(
            "{}/v{}/dialog/oauth",
            self.dialog_base_url, self.graph_version
        );
        let mut url = Url::parse(&raw)
            .map_err(|e| ProviderError::transport(format!("invalid dialog URL {raw}: {e}")))?;
        let state = generate_csrf_token();

        url.query_pairs_mut()
            .append_pair("client_id", &self.app_id)
            .append_pair("redirect_uri", return_url)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(","))
            .append_pair("state", &state);
        if rerequest {
            url.query_pairs_mut().append_pair("auth_type", "rerequest");
        }

        Ok(AuthorizationRequest {
            url: url.to_string(),
            state,
        })
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<AccessToken, ProviderError> {
        let url = self.graph_url("oauth/access_token")?;
        let response = self.http.post(url).form(params).send().await?;
        let token: TokenResponse = Self::read_json(response).await?;

        if token.access_token.is_empty() {
            return Err(ProviderError::malformed("token response without access_token"));
        }
        let expires_at = token
            .expires_in
            .filter(|seconds| *seconds > 0)
            .map(|seconds| Utc::now() + Duration::seconds(seconds));
        Ok(AccessToken::new(token.access_token, expires_at))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        token: &AccessToken,
    ) -> Result<T, ProviderError> {
        debug!("Graph API request: {}", url.path());
        let response = self
            .http
            .get(url)
            .bearer_auth(&token.value)
            .send()
            .await?;
        Self::read_json(response).await
    }

    /// Turn a Graph response into `T`, surfacing Graph error envelopes as API errors
    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<GraphErrorEnvelope>(&body) {
                Ok(envelope) => ProviderError::api(format!(
                    "{} (type: {}, code: {})",
                    envelope.error.message,
                    envelope.error.kind.as_deref().unwrap_or("unknown"),
                    envelope
                        .error
                        .code
                        .map_or_else(|| "none".to_string(), |c| c.to_string())
                )),
                Err(_) => ProviderError::api(format!("HTTP {status}")),
            });
        }

        serde_json::from_str(&body).map_err(|e| ProviderError::malformed(e.to_string()))
    }
}

#[async_trait]
impl ProviderClient for FacebookGraphClient {
    fn build_authorization_url(
        &self,
        scopes: &[String],
        return_url: &str,
    ) -> Result<AuthorizationRequest, ProviderError> {
        self.authorization_url(scopes, return_url, false)
    }

    fn build_reauthorization_url(
        &self,
        scopes: &[String],
        return_url: &str,
    ) -> Result<AuthorizationRequest, ProviderError> {
        self.authorization_url(scopes, return_url, true)
    }

    async fn exchange_code(
        &self,
        code: &str,
        return_url: &str,
    ) -> Result<AccessToken, ProviderError> {
        self.request_token(&[
            ("client_id", self.app_id.as_str()),
            ("client_secret", self.app_secret.as_str()),
            ("redirect_uri", return_url),
            ("code", code),
        ])
        .await
    }

    async fn exchange_long_lived(&self, token: &AccessToken) -> Result<AccessToken, ProviderError> {
        self.request_token(&[
            ("grant_type", "fb_exchange_token"),
            ("client_id", self.app_id.as_str()),
            ("client_secret", self.app_secret.as_str()),
            ("fb_exchange_token", token.value.as_str()),
        ])
        .await
    }

    async fn fetch_granted_permissions(
        &self,
        token: &AccessToken,
    ) -> Result<BTreeSet<String>, ProviderError> {
        let url = self.graph_url("me/permissions")?;
        let permissions: PermissionsResponse = self.get_json(url, token).await?;
        Ok(permissions
            .data
            .into_iter()
            .filter(|entry| entry.status == "granted")
            .map(|entry| entry.permission)
            .collect())
    }

    async fn fetch_profile(
        &self,
        token: &AccessToken,
        fields: &[&str],
    ) -> Result<ExternalProfile, ProviderError> {
        let mut url = self.graph_url("me")?;
        url.query_pairs_mut().append_pair("fields", &fields.join(","));
        let node: ProfileNode = self.get_json(url, token).await?;

        if node.id.is_empty() {
            return Err(ProviderError::malformed("profile without id"));
        }
        Ok(ExternalProfile {
            external_id: node.id,
            display_name: node.name.unwrap_or_default(),
            email: node.email.filter(|email| !email.trim().is_empty()),
            picture_url: None,
        })
    }

    async fn fetch_picture_url(
        &self,
        token: &AccessToken,
        resolution: Option<PictureResolution>,
    ) -> Result<Option<String>, ProviderError> {
        let mut url = self.graph_url("me/picture")?;
        url.query_pairs_mut().append_pair("redirect", "false");
        if let Some(resolution) = resolution {
            url.query_pairs_mut()
                .append_pair("width", &resolution.width.to_string())
                .append_pair("height", &resolution.height.to_string());
        }
        let picture: PictureResponse = self.get_json(url, token).await?;
        Ok(picture.data.url.filter(|url| !url.is_empty()))
    }

    async fn request_endpoint(
        &self,
        token: &AccessToken,
        path: &str,
    ) -> Result<serde_json::Value, ProviderError> {
        let url = self.graph_url(path)?;
        self.get_json(url, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn client() -> FacebookGraphClient {
        FacebookGraphClient::new(&FacebookCredentials {
            app_id: "1234".to_string(),
            app_secret: "secret".to_string(),
            graph_version: "19.0".to_string(),
        })
    }

    fn query(url: &str) -> HashMap<String, String> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn test_authorization_url() {
        let scopes = vec!["email".to_string(), "public_profile".to_string()];
        let request = client()
            .build_authorization_url(&scopes, "https://example.com/user/login/facebook/callback")
            .unwrap();

        assert!(request
            .url
            .starts_with("https://www.facebook.com/v19.0/dialog/oauth?"));
        let params = query(&request.url);
        assert_eq!(params["client_id"], "1234");
        assert_eq!(params["scope"], "email,public_profile");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["state"], request.state);
        assert_eq!(
            params["redirect_uri"],
            "https://example.com/user/login/facebook/callback"
        );
        assert!(!params.contains_key("auth_type"));
        assert!(!request.url.contains("secret"));
    }

    #[test]
    fn test_from_settings_uses_trimmed_credentials() {
        let settings = FacebookSettings {
            app_id: Some(" 1234 ".to_string()),
            app_secret: Some("secret\n".to_string()),
            graph_version: " v19.0".to_string(),
            ..FacebookSettings::default()
        };
        let client = FacebookGraphClient::from_settings(&settings);
        assert_eq!(client.app_id, "1234");
        assert_eq!(client.app_secret, "secret");
        assert_eq!(client.graph_version, "19.0");

        let request = client
            .build_authorization_url(&["email".to_string()], "https://example.com/cb")
            .unwrap();
        assert_eq!(query(&request.url)["client_id"], "1234");
    }

    #[test]
    fn test_reauthorization_url_rerequests() {
        let request = client()
            .build_reauthorization_url(&["email".to_string()], "https://example.com/cb")
            .unwrap();
        let params = query(&request.url);
        assert_eq!(params["auth_type"], "rerequest");
        assert_eq!(params["scope"], "email");
    }

    #[test]
    fn test_each_url_gets_fresh_state() {
        let scopes = vec!["email".to_string()];
        let first = client().build_authorization_url(&scopes, "https://e.com").unwrap();
        let second = client().build_authorization_url(&scopes, "https://e.com").unwrap();
        assert_ne!(first.state, second.state);
    }

    #[test]
    fn test_graph_url_and_base_override() {
        let client = client().with_base_urls("http://127.0.0.1:9/", "http://127.0.0.1:9/");
        assert_eq!(
            client.graph_url("/me/friends").unwrap().as_str(),
            "http://127.0.0.1:9/v19.0/me/friends"
        );
        assert_eq!(
            client.graph_url("me?fields=birthday").unwrap().query(),
            Some("fields=birthday")
        );
    }

    #[tokio::test]
    async fn test_unreachable_graph_is_transport_error() {
        let client = client().with_base_urls("http://127.0.0.1:9", "http://127.0.0.1:9");
        let err = client.exchange_code("code", "https://e.com").await.unwrap_err();
        assert_eq!(err.kind, crate::oauth::ProviderErrorKind::Transport);
    }

    #[test]
    fn test_graph_error_envelope_parses() {
        let envelope: GraphErrorEnvelope = serde_json::from_str(
            r#"{"error":{"message":"Invalid OAuth access token.","type":"OAuthException","code":190}}"#,
        )
        .unwrap();
        assert_eq!(envelope.error.code, Some(190));
        assert_eq!(envelope.error.kind.as_deref(), Some("OAuthException"));
    }
}
