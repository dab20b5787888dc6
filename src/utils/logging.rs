// Centralized logging for the recurring login flow messages
use log::{debug, error, info, warn};

use crate::accounts::AccountId;
use crate::login::LoginStage;

pub struct LoggingHelper;

impl LoggingHelper {
    /// Log the authorization URL being handed to the browser
    pub fn log_authorization_url_built(scopes: &[String], reprompt: bool) {
        if reprompt {
            info!("🔁 Built Facebook re-request URL for scopes: {}", scopes.join(","));
        } else {
            info!("🔍 Built Facebook authorization URL with scopes: {}", scopes.join(","));
        }
    }

    /// Log a login attempt moving between stages
    pub fn log_stage_transition(from: LoginStage, to: LoginStage) {
        debug!("Facebook login stage {from:?} -> {to:?}");
    }

    /// Log token exchange start
    pub fn log_token_exchange_start(code_len: usize) {
        debug!("🔄 Exchanging authorization code ({code_len} chars) for an access token");
    }

    /// Log a successful token exchange; the token itself is never logged
    pub fn log_token_exchange_success(token_len: usize, long_lived: bool) {
        info!(
            "✅ Facebook token exchange succeeded (token length: {token_len}, \
             long-lived: {long_lived})"
        );
    }

    /// Log a provider failure in a standardized format
    pub fn log_provider_failure(operation: &str, err: &dyn std::fmt::Display) {
        error!("Facebook {operation} failed: {err}");
    }

    /// Log missing application credentials
    pub fn log_configuration_missing(detail: &str) {
        error!(
            "Facebook login is not configured: {detail}. \
             Set the app id, app secret and graph version."
        );
    }

    /// Log a profile fetch result without personal data
    pub fn log_profile_fetched(external_id: &str, has_email: bool) {
        debug!("Fetched Facebook profile {external_id} (email present: {has_email})");
    }

    /// Log the creation of a local account
    pub fn log_account_created(id: AccountId, username: &str, active: bool) {
        info!(
            "👤 Created account {id} ({username}) via Facebook login, status: {}",
            if active { "active" } else { "pending approval" }
        );
    }

    /// Log a successful login
    pub fn log_login_success(id: AccountId, is_new: bool) {
        info!("Facebook login succeeded for account {id} (new: {is_new})");
    }

    /// Log an account gate denial with the rule that fired
    pub fn log_gate_denial(id: AccountId, rule: &str) {
        warn!("🚫 Facebook login denied for account {id}: {rule}");
    }

    /// Log a picture import failure; never fatal
    pub fn log_picture_import_failure(id: AccountId, reason: &dyn std::fmt::Display) {
        warn!("Profile picture import failed for account {id}: {reason}");
    }

    /// Log an extra endpoint that could not be fetched
    pub fn log_endpoint_failure(path: &str, err: &dyn std::fmt::Display) {
        warn!("Skipping Facebook endpoint {path}: {err}");
    }
}
