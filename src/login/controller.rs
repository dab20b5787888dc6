use log::{debug, log, warn};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::{BeginOutcome, LoginFailure, LoginStage, LoginSuccess, Outcome, PostLoginRedirect};
use crate::accounts::{IdentityResolver, ResolveResult};
use crate::oauth::provider::PROFILE_FIELDS;
use crate::oauth::scopes::{final_scopes, REQUIRED_SCOPE};
use crate::oauth::{
    AccessToken, EndpointRequest, ExternalProfile, NoopScopeAugmenter, OAuthCallback,
    ProviderClient, ScopeAugmenter,
};
use crate::session::{committed_access_token, LoginAttempt, StateStore};
use crate::settings::{FacebookSettings, FbLoginSettings};
use crate::utils::crypto::secrets_match;
use crate::utils::LoggingHelper;

/// Query of the login entry point
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BeginRequest {
    /// Internal path to return to after login
    pub destination: Option<String>,
}

/// Drives a Facebook login from the first redirect to the logged-in account
pub struct LoginFlowController {
    provider: Arc<dyn ProviderClient>,
    resolver: IdentityResolver,
    facebook: FacebookSettings,
    return_url: String,
    post_login: PostLoginRedirect,
    scope_augmenter: Arc<dyn ScopeAugmenter>,
    endpoints: Vec<EndpointRequest>,
}

impl LoginFlowController {
    pub fn new(
        provider: Arc<dyn ProviderClient>,
        resolver: IdentityResolver,
        facebook: FacebookSettings,
        return_url: impl Into<String>,
        post_login: PostLoginRedirect,
    ) -> Self {
        let endpoints = facebook.endpoint_requests();
        Self {
            provider,
            resolver,
            facebook,
            return_url: return_url.into(),
            post_login,
            scope_augmenter: Arc::new(NoopScopeAugmenter),
            endpoints,
        }
    }

    pub fn from_settings(
        provider: Arc<dyn ProviderClient>,
        resolver: IdentityResolver,
        settings: &FbLoginSettings,
    ) -> Self {
        Self::new(
            provider,
            resolver,
            settings.facebook.clone(),
            settings.callback_url(),
            PostLoginRedirect::from_settings(&settings.login),
        )
    }

    #[must_use]
    pub fn with_scope_augmenter(mut self, augmenter: Arc<dyn ScopeAugmenter>) -> Self {
        self.scope_augmenter = augmenter;
        self
    }

    #[must_use]
    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// Whether the session holds a committed, unexpired Facebook token
    #[must_use]
    pub fn has_valid_access_token(&self, store: &dyn StateStore) -> bool {
        committed_access_token(store).is_some_and(|token| !token.is_expired())
    }

    /// Start a login: remember the state and destination, then point the browser at Facebook
    pub fn begin_login(&self, request: &BeginRequest, store: &mut dyn StateStore) -> BeginOutcome {
        let mut attempt = LoginAttempt::new(store);
        let outcome = match self.begin(request, &mut attempt) {
            Ok(url) => BeginOutcome::Redirect { url },
            Err(failure) => {
                Self::fail(&mut attempt, &failure);
                BeginOutcome::Failure(failure)
            }
        };
        LoggingHelper::log_stage_transition(LoginStage::Init, outcome.stage());
        outcome
    }

    fn begin(
        &self,
        request: &BeginRequest,
        attempt: &mut LoginAttempt<'_>,
    ) -> Result<String, LoginFailure> {
        self.check_configuration()?;

        let reprompt = attempt.reprompt_requested();
        let authorization = if reprompt {
            let scopes = vec![REQUIRED_SCOPE.to_string()];
            LoggingHelper::log_authorization_url_built(&scopes, true);
            self.provider.build_reauthorization_url(&scopes, &self.return_url)
        } else {
            let scopes = final_scopes(&self.facebook.extra_scopes(), self.scope_augmenter.as_ref());
            LoggingHelper::log_authorization_url_built(&scopes, false);
            self.provider.build_authorization_url(&scopes, &self.return_url)
        }
        .map_err(|e| {
            LoggingHelper::log_provider_failure("authorization URL", &e);
            LoginFailure::ProviderError
        })?;

        attempt.set_csrf_state(&authorization.state);
        match request.destination.as_deref().map(str::trim) {
            Some(destination) if !destination.is_empty() => {
                attempt.set_post_login_path(destination);
            }
            _ => {
                attempt.take_post_login_path();
            }
        }
        Ok(authorization.url)
    }

    /// Handle the callback and resolve the Facebook user to a local account
    pub async fn complete_login(
        &self,
        callback: &OAuthCallback,
        store: &mut dyn StateStore,
    ) -> Outcome {
        LoggingHelper::log_stage_transition(LoginStage::Redirected, LoginStage::CallbackReceived);
        let mut attempt = LoginAttempt::new(store);
        let outcome = match self.complete(callback, &mut attempt).await {
            Ok(success) => Outcome::Success(success),
            Err(failure) => {
                Self::fail(&mut attempt, &failure);
                Outcome::Failure(failure)
            }
        };
        LoggingHelper::log_stage_transition(LoginStage::CallbackReceived, outcome.stage());
        outcome
    }

    async fn complete(
        &self,
        callback: &OAuthCallback,
        attempt: &mut LoginAttempt<'_>,
    ) -> Result<LoginSuccess, LoginFailure> {
        if let Some(error) = &callback.error {
            if error != "access_denied" {
                warn!(
                    "Facebook callback reported {error}: {}",
                    callback.error_description.as_deref().unwrap_or("no description")
                );
            }
            return Err(LoginFailure::UserDenied);
        }

        self.check_configuration()?;
        Self::check_state(callback, attempt)?;

        let Some(code) = callback.code.as_deref().filter(|code| !code.is_empty()) else {
            warn!("Facebook callback carried a valid state but no authorization code");
            return Err(LoginFailure::TokenExchangeFailed);
        };
        let token = self.exchange(code).await?;
        attempt.set_pending_token(&token);

        let granted = self
            .provider
            .fetch_granted_permissions(&token)
            .await
            .map_err(|e| {
                LoggingHelper::log_provider_failure("permission lookup", &e);
                LoginFailure::ProviderError
            })?;
        if !granted.contains(REQUIRED_SCOPE) {
            return Err(LoginFailure::PermissionDenied);
        }

        let mut profile = self
            .provider
            .fetch_profile(&token, PROFILE_FIELDS)
            .await
            .map_err(|e| {
                LoggingHelper::log_provider_failure("profile fetch", &e);
                LoginFailure::ProfileFetchFailed
            })?;
        let email = profile
            .email
            .clone()
            .filter(|email| !email.trim().is_empty());
        LoggingHelper::log_profile_fetched(&profile.external_id, email.is_some());
        let Some(email) = email else {
            return Err(LoginFailure::EmailMissing);
        };

        let is_new = !self.resolver.account_exists(&email).await?;
        let extra_data = if is_new {
            self.prepare_new_account(&token, &mut profile).await
        } else {
            Map::new()
        };

        match self.resolver.resolve(&profile, attempt.store()).await {
            ResolveResult::LoggedIn { account, is_new } => {
                attempt.commit_pending_token();
                attempt.set_reprompt_requested(false);
                let saved = attempt.take_post_login_path();
                let redirect_path = self.post_login.resolve(saved.as_deref(), &account, is_new);
                Ok(LoginSuccess {
                    account,
                    is_new,
                    redirect_path,
                    extra_data,
                })
            }
            ResolveResult::Rejected(reason) => Err(reason.into()),
        }
    }

    fn check_configuration(&self) -> Result<(), LoginFailure> {
        self.facebook.validate().map(|_| ()).map_err(|e| {
            LoggingHelper::log_configuration_missing(&e.to_string());
            LoginFailure::ConfigurationError
        })
    }

    // The stored state is consumed whatever the outcome
    fn check_state(
        callback: &OAuthCallback,
        attempt: &mut LoginAttempt<'_>,
    ) -> Result<(), LoginFailure> {
        let stored = attempt.take_csrf_state();
        match (callback.state.as_deref(), stored.as_deref()) {
            (Some(received), Some(stored))
                if !stored.is_empty() && secrets_match(received, stored) =>
            {
                Ok(())
            }
            (received, stored) => {
                warn!(
                    "OAuth2 state mismatch (received: {}, stored: {})",
                    received.is_some(),
                    stored.is_some()
                );
                Err(LoginFailure::InvalidState)
            }
        }
    }

    async fn exchange(&self, code: &str) -> Result<AccessToken, LoginFailure> {
        LoggingHelper::log_token_exchange_start(code.len());
        let token = self
            .provider
            .exchange_code(code, &self.return_url)
            .await
            .map_err(|e| {
                LoggingHelper::log_provider_failure("code exchange", &e);
                LoginFailure::TokenExchangeFailed
            })?;

        if !self.facebook.long_lived_tokens {
            LoggingHelper::log_token_exchange_success(token.value.len(), false);
            return Ok(token);
        }

        let long_lived = self
            .provider
            .exchange_long_lived(&token)
            .await
            .map_err(|e| {
                LoggingHelper::log_provider_failure("long-lived token exchange", &e);
                LoginFailure::TokenExchangeFailed
            })?;
        LoggingHelper::log_token_exchange_success(long_lived.value.len(), true);
        Ok(long_lived)
    }

    /// Picture URL and configured endpoints, fetched only when an account will be created
    async fn prepare_new_account(
        &self,
        token: &AccessToken,
        profile: &mut ExternalProfile,
    ) -> Map<String, Value> {
        if let Some(importer) = self.resolver.picture_importer() {
            if importer.is_enabled() {
                match self
                    .provider
                    .fetch_picture_url(token, importer.preferred_resolution())
                    .await
                {
                    Ok(url) => profile.picture_url = url,
                    Err(e) => LoggingHelper::log_provider_failure("picture lookup", &e),
                }
            }
        }

        let mut extra_data = Map::new();
        for endpoint in &self.endpoints {
            match self.provider.request_endpoint(token, &endpoint.path).await {
                Ok(value) => {
                    extra_data.insert(endpoint.name.clone(), value);
                }
                Err(e) => LoggingHelper::log_endpoint_failure(&endpoint.path, &e),
            }
        }
        debug!("Fetched {} extra Facebook endpoints", extra_data.len());
        extra_data
    }

    // Nothing from a failed attempt may stay in the session except the re-prompt flag
    fn fail(attempt: &mut LoginAttempt<'_>, failure: &LoginFailure) {
        attempt.clear();
        if *failure == LoginFailure::PermissionDenied {
            attempt.set_reprompt_requested(true);
        }
        log!(
            failure.severity(),
            "Facebook login failed at {:?} [{}]: {failure}",
            failure.stage(),
            failure.code()
        );
    }
}
