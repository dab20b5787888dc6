//! The two-step Facebook login flow
//!
//! [`controller::LoginFlowController::begin_login`] sends the browser to Facebook;
//! [`controller::LoginFlowController::complete_login`] handles the callback. Both return
//! values describing where to send the browser next and never fail outright.

pub mod controller;
pub mod post_login;

pub use controller::{BeginRequest, LoginFlowController};
pub use post_login::PostLoginRedirect;

use log::Level;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::accounts::{GateDenial, LocalAccount, RejectReason};
use crate::utils::ResponseBuilder;

/// Where failed logins are sent
pub const GENERIC_LOGIN_PATH: &str = "/user/login";

/// Where a login attempt stands
///
/// `begin_login` moves from `Init` to `Redirected`; `complete_login` starts at
/// `CallbackReceived` and ends at `Succeeded` or one of the failure stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    Init,
    Redirected,
    CallbackReceived,
    StateInvalid,
    TokenFailed,
    ProfileFailed,
    EmailMissing,
    PermissionDenied,
    AccountRejected,
    Succeeded,
    Failed,
}

/// Every way a login can end without a logged-in user
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoginFailure {
    #[error("Facebook login is not configured")]
    ConfigurationError,
    #[error("user declined the Facebook dialog")]
    UserDenied,
    #[error("missing or mismatched OAuth2 state")]
    InvalidState,
    #[error("authorization code could not be exchanged")]
    TokenExchangeFailed,
    #[error("Facebook API call failed")]
    ProviderError,
    #[error("email permission was not granted")]
    PermissionDenied,
    #[error("Facebook profile could not be loaded")]
    ProfileFetchFailed,
    #[error("Facebook profile has no email address")]
    EmailMissing,
    #[error("registration is restricted to administrators")]
    RegistrationBlocked,
    #[error("no free username could be generated")]
    UsernameGenerationFailed,
    #[error("account could not be created")]
    CreationFailed,
    #[error("account awaits administrator approval")]
    PendingApproval,
    #[error("account lookup failed")]
    LookupFailed,
    #[error("administrator login via Facebook is disabled")]
    AdminLoginDisabled,
    #[error("role {0} may not log in via Facebook")]
    RoleDisabled(String),
    #[error("account is not active")]
    InactiveAccount,
}

impl LoginFailure {
    /// Stable identifier carried in the failure redirect
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigurationError => "configuration_error",
            Self::UserDenied => "user_denied",
            Self::InvalidState => "invalid_state",
            Self::TokenExchangeFailed => "token_exchange_failed",
            Self::ProviderError => "provider_error",
            Self::PermissionDenied => "permission_denied",
            Self::ProfileFetchFailed => "profile_fetch_failed",
            Self::EmailMissing => "email_missing",
            Self::RegistrationBlocked => "registration_blocked",
            Self::UsernameGenerationFailed => "username_generation_failed",
            Self::CreationFailed => "creation_failed",
            Self::PendingApproval => "pending_approval",
            Self::LookupFailed => "lookup_failed",
            Self::AdminLoginDisabled => "admin_login_disabled",
            Self::RoleDisabled(_) => "role_disabled",
            Self::InactiveAccount => "inactive_account",
        }
    }

    /// Text shown to the user on the login page
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ConfigurationError => {
                "Facebook login is not configured properly. Contact site administrator."
            }
            Self::UserDenied => "You could not be authenticated.",
            Self::InvalidState => "Facebook login failed. Invalid OAuth2 state.",
            Self::TokenExchangeFailed | Self::ProviderError => {
                "Facebook login failed. Please try again later."
            }
            Self::PermissionDenied => {
                "Facebook login failed. This site requires permission to get your email address."
            }
            Self::ProfileFetchFailed | Self::LookupFailed => {
                "Facebook login failed, could not load Facebook profile. Contact site administrator."
            }
            Self::EmailMissing => {
                "Facebook login failed. This site requires your email address to log you in."
            }
            Self::RegistrationBlocked => {
                "Registration is restricted: only existing users can log in with Facebook."
            }
            Self::UsernameGenerationFailed | Self::CreationFailed => {
                "You could not be registered. Contact site administrator."
            }
            Self::PendingApproval => {
                "Your account was created, but it needs administrator approval. You will receive an email once it is approved."
            }
            Self::AdminLoginDisabled => {
                "Facebook login for the administrator account is disabled. Use the standard login form."
            }
            Self::RoleDisabled(_) => {
                "Facebook login is disabled for your role. Use the standard login form."
            }
            Self::InactiveAccount => "Your account is blocked or has not been activated yet.",
        }
    }

    /// Level at which the failure is logged
    #[must_use]
    pub fn severity(&self) -> Level {
        match self {
            Self::UserDenied => Level::Debug,
            Self::PendingApproval => Level::Info,
            Self::InvalidState
            | Self::PermissionDenied
            | Self::EmailMissing
            | Self::RegistrationBlocked
            | Self::AdminLoginDisabled
            | Self::RoleDisabled(_)
            | Self::InactiveAccount => Level::Warn,
            Self::ConfigurationError
            | Self::TokenExchangeFailed
            | Self::ProviderError
            | Self::ProfileFetchFailed
            | Self::UsernameGenerationFailed
            | Self::CreationFailed
            | Self::LookupFailed => Level::Error,
        }
    }

    /// Terminal stage the failure corresponds to
    #[must_use]
    pub fn stage(&self) -> LoginStage {
        match self {
            Self::InvalidState => LoginStage::StateInvalid,
            Self::TokenExchangeFailed => LoginStage::TokenFailed,
            Self::ProfileFetchFailed => LoginStage::ProfileFailed,
            Self::EmailMissing => LoginStage::EmailMissing,
            Self::PermissionDenied => LoginStage::PermissionDenied,
            Self::RegistrationBlocked
            | Self::UsernameGenerationFailed
            | Self::CreationFailed
            | Self::PendingApproval
            | Self::LookupFailed
            | Self::AdminLoginDisabled
            | Self::RoleDisabled(_)
            | Self::InactiveAccount => LoginStage::AccountRejected,
            Self::ConfigurationError | Self::UserDenied | Self::ProviderError => LoginStage::Failed,
        }
    }

    /// Login page location carrying the failure code and message
    #[must_use]
    pub fn redirect_location(&self) -> String {
        ResponseBuilder::error_location(GENERIC_LOGIN_PATH, self.code(), self.user_message())
    }
}

impl From<RejectReason> for LoginFailure {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::RegistrationBlocked => Self::RegistrationBlocked,
            RejectReason::UsernameGenerationFailed => Self::UsernameGenerationFailed,
            RejectReason::CreationFailed => Self::CreationFailed,
            RejectReason::PendingApproval => Self::PendingApproval,
            RejectReason::LookupFailed => Self::LookupFailed,
            RejectReason::Gate(GateDenial::AdminLoginDisabled) => Self::AdminLoginDisabled,
            RejectReason::Gate(GateDenial::RoleDisabled(role)) => Self::RoleDisabled(role),
            RejectReason::Gate(GateDenial::InactiveAccount) => Self::InactiveAccount,
        }
    }
}

/// Result of starting a login
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// Send the browser to Facebook
    Redirect { url: String },
    Failure(LoginFailure),
}

impl BeginOutcome {
    #[must_use]
    pub fn stage(&self) -> LoginStage {
        match self {
            Self::Redirect { .. } => LoginStage::Redirected,
            Self::Failure(failure) => failure.stage(),
        }
    }

    #[must_use]
    pub fn redirect_location(&self) -> String {
        match self {
            Self::Redirect { url } => url.clone(),
            Self::Failure(failure) => failure.redirect_location(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginSuccess {
    pub account: LocalAccount,
    pub is_new: bool,
    pub redirect_path: String,
    /// Responses from the configured extra endpoints, keyed by name; new accounts only
    pub extra_data: Map<String, Value>,
}

/// Result of handling the callback
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(LoginSuccess),
    Failure(LoginFailure),
}

impl Outcome {
    #[must_use]
    pub fn stage(&self) -> LoginStage {
        match self {
            Self::Success(_) => LoginStage::Succeeded,
            Self::Failure(failure) => failure.stage(),
        }
    }

    #[must_use]
    pub fn redirect_location(&self) -> String {
        match self {
            Self::Success(success) => success.redirect_path.clone(),
            Self::Failure(failure) => failure.redirect_location(),
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&LoginFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reasons_map_to_failures() {
        assert_eq!(
            LoginFailure::from(RejectReason::PendingApproval),
            LoginFailure::PendingApproval
        );
        assert_eq!(
            LoginFailure::from(RejectReason::Gate(GateDenial::RoleDisabled("editor".into()))),
            LoginFailure::RoleDisabled("editor".to_string())
        );
    }

    #[test]
    fn test_failure_redirect_location() {
        let location = LoginFailure::InvalidState.redirect_location();
        assert!(location.starts_with("/user/login?error=invalid_state&message="));
        assert!(!location.contains(' '));
    }

    #[test]
    fn test_severities() {
        assert_eq!(LoginFailure::UserDenied.severity(), Level::Debug);
        assert_eq!(LoginFailure::RegistrationBlocked.severity(), Level::Warn);
        assert_eq!(LoginFailure::CreationFailed.severity(), Level::Error);
        assert_ne!(
            LoginFailure::PendingApproval.user_message(),
            LoginFailure::CreationFailed.user_message()
        );
    }

    #[test]
    fn test_outcome_stages() {
        let redirect = BeginOutcome::Redirect {
            url: "https://www.facebook.com/dialog/oauth".to_string(),
        };
        assert_eq!(redirect.stage(), LoginStage::Redirected);
        assert_eq!(
            BeginOutcome::Failure(LoginFailure::ConfigurationError).stage(),
            LoginStage::Failed
        );
        assert_eq!(
            Outcome::Failure(LoginFailure::InvalidState).stage(),
            LoginStage::StateInvalid
        );
        assert_eq!(
            Outcome::Failure(LoginFailure::PendingApproval).stage(),
            LoginStage::AccountRejected
        );
        assert_eq!(
            Outcome::Failure(LoginFailure::TokenExchangeFailed).stage(),
            LoginStage::TokenFailed
        );
    }
}
