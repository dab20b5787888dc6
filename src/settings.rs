use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

use crate::accounts::gate::GatePolicy;
use crate::accounts::{AccountId, RegistrationPolicy};
use crate::oauth::scopes::parse_scope_list;
use crate::oauth::EndpointRequest;
use crate::utils::crypto::generate_secret;

/// Errors raised while loading or validating settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings file: {0}")]
    Parse(#[from] basic_toml::Error),
    #[error("failed to initialize logger: {0}")]
    Logger(#[from] log::SetLoggerError),
    #[error("Facebook app id is not configured")]
    MissingAppId,
    #[error("Facebook app secret is not configured")]
    MissingAppSecret,
    #[error("Facebook Graph API version is not configured")]
    MissingGraphVersion,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FbLoginSettings {
    pub application: ApplicationSettings,
    pub facebook: FacebookSettings,
    pub login: LoginSettings,
    pub pictures: PictureSettings,
    pub session: SessionSettings,
    pub cookies: CookieSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub redirect_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FacebookSettings {
    // Direct values (can be overridden by environment variables)
    pub app_id: Option<String>,
    pub app_secret: Option<String>,

    // Environment variable names for overrides
    pub app_id_env: Option<String>,
    pub app_secret_env: Option<String>,

    /// Graph API version, with or without the leading `v`
    pub graph_version: String,
    /// Extra permissions, comma or newline separated
    pub scopes: String,
    /// Extra Graph endpoints fetched on first login, one `path|name` pair per line
    pub endpoints: String,
    /// Upgrade the short-lived token returned by the code exchange
    pub long_lived_tokens: bool,
}

/// Application credentials that passed validation
#[derive(Clone, PartialEq, Eq)]
pub struct FacebookCredentials {
    pub app_id: String,
    pub app_secret: String,
    /// Version number without the leading `v`, e.g. `19.0`
    pub graph_version: String,
}

impl std::fmt::Debug for FacebookCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacebookCredentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .field("graph_version", &self.graph_version)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSettings {
    /// Where users land after logging in when no destination was saved
    pub post_login_path: String,
    /// Send newly created users to their profile edit form
    pub redirect_user_form: bool,
    pub disable_admin_login: bool,
    pub admin_account_id: AccountId,
    pub disabled_roles: Vec<String>,
    pub registration: RegistrationPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PictureSettings {
    /// Whether accounts carry a picture at all
    pub enabled: bool,
    /// Local root that `file_directory` is resolved against
    pub root: PathBuf,
    /// Directory below `root`, may contain `[user:uid]`, `[user:name]` and `[date:*]` tokens
    pub file_directory: String,
    /// Preferred size as `WxH`, empty when unset
    pub max_resolution: String,
    pub min_resolution: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SessionSettings {
    pub session_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieSettings {
    pub secure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            redirect_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl Default for FacebookSettings {
    fn default() -> Self {
        Self {
            app_id: None,
            app_secret: None,
            app_id_env: None,
            app_secret_env: None,
            graph_version: "19.0".to_string(),
            scopes: String::new(),
            endpoints: String::new(),
            long_lived_tokens: true,
        }
    }
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self {
            post_login_path: "/user".to_string(),
            redirect_user_form: false,
            disable_admin_login: true,
            admin_account_id: 1,
            disabled_roles: Vec::new(),
            registration: RegistrationPolicy::default(),
        }
    }
}

impl Default for PictureSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            root: PathBuf::from("files"),
            file_directory: "pictures/[date:Y]-[date:m]".to_string(),
            max_resolution: "85x85".to_string(),
            min_resolution: String::new(),
        }
    }
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            secure: true, // Default to secure cookies
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl FbLoginSettings {
    /// Load settings from configuration files and environment variables
    ///
    /// Priority, highest first: environment variables, `Settings.toml` in
    /// `FBLOGIN_SECRETS_DIR`, `Settings.toml` in the working directory, defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Logger initialization fails
    /// - Settings file cannot be read
    /// - TOML parsing fails
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_env_file();
        env_logger::try_init()?;

        let mut settings = Self::load_base_settings()?;
        Self::apply_env_overrides(&mut settings);
        Ok(settings)
    }

    fn load_base_settings() -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        let default_config_path = PathBuf::from("Settings.toml");
        if default_config_path.exists() {
            settings = Self::from_toml(&fs::read_to_string(&default_config_path)?)?;
            println!(
                "✓ Loaded base settings from {}",
                default_config_path.display()
            );
        }

        if let Ok(secrets_dir) = std::env::var("FBLOGIN_SECRETS_DIR") {
            let secrets_path = std::path::Path::new(&secrets_dir).join("Settings.toml");
            if secrets_path.exists() {
                settings = Self::from_toml(&fs::read_to_string(&secrets_path)?)?;
                println!("✓ Overriding settings from {}", secrets_path.display());
            } else {
                println!(
                    "ℹ FBLOGIN_SECRETS_DIR set but no Settings.toml found at: {}",
                    secrets_path.display()
                );
            }
        }

        Ok(settings)
    }

    /// Parse settings from TOML text; missing sections and fields take their defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for these settings
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        Ok(basic_toml::from_str(content)?)
    }

    fn apply_env_overrides(settings: &mut Self) {
        Self::apply_application_env_overrides(&mut settings.application);
        Self::apply_facebook_env_overrides(&mut settings.facebook);
        Self::apply_session_env_overrides(&mut settings.session);
        Self::apply_cookie_env_overrides(&mut settings.cookies);
        if let Ok(log_level) = std::env::var("RUST_LOG") {
            settings.logging.level = log_level;
        }
    }

    fn apply_application_env_overrides(app_settings: &mut ApplicationSettings) {
        if let Ok(host) = std::env::var("HOST") {
            app_settings.host = host;
        }
        if let Ok(port_str) = std::env::var("PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                app_settings.port = port;
            }
        }
        if let Ok(redirect_base_url) = std::env::var("REDIRECT_BASE_URL") {
            app_settings.redirect_base_url = redirect_base_url;
        }
    }

    /// Apply `FACEBOOK_*` environment overrides
    pub fn apply_facebook_env_overrides(facebook: &mut FacebookSettings) {
        if let Ok(app_id) = std::env::var("FACEBOOK_APP_ID") {
            facebook.app_id = Some(app_id);
        }
        if let Ok(app_secret) = std::env::var("FACEBOOK_APP_SECRET") {
            facebook.app_secret = Some(app_secret);
        }
        if let Ok(graph_version) = std::env::var("FACEBOOK_GRAPH_VERSION") {
            facebook.graph_version = graph_version;
        }
    }

    /// Apply the session secret override, generating a secret when none is configured
    pub fn apply_session_env_overrides(session_settings: &mut SessionSettings) {
        if let Ok(secret) = std::env::var("SESSION_SECRET") {
            if !secret.is_empty() {
                session_settings.session_secret = secret;
            }
        }

        if session_settings.session_secret.is_empty() {
            session_settings.session_secret = generate_secret();
            warn!(
                "⚠️  Using an auto-generated session secret; sessions will not survive a restart"
            );
            warn!("🔒 Set SESSION_SECRET or session.session_secret in Settings.toml");
        }
    }

    fn apply_cookie_env_overrides(cookie_settings: &mut CookieSettings) {
        if let Ok(cookie_secure_str) = std::env::var("COOKIE_SECURE") {
            if let Ok(cookie_secure) = cookie_secure_str.parse::<bool>() {
                cookie_settings.secure = cookie_secure;
            }
        }
    }

    /// Load environment variables from .env file
    fn load_env_file() {
        if let Ok(contents) = fs::read_to_string(".env") {
            for line in contents.lines() {
                if let Some((key, value)) = line.split_once('=') {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }

    /// Get the bind address for the server
    #[must_use]
    pub fn get_bind_address(&self) -> String {
        format!("{}:{}", self.application.host, self.application.port)
    }

    /// Absolute URL Facebook sends the browser back to
    #[must_use]
    pub fn callback_url(&self) -> String {
        format!(
            "{}{}",
            self.application.redirect_base_url.trim_end_matches('/'),
            crate::handlers::CALLBACK_PATH
        )
    }
}

impl FacebookSettings {
    /// Get the app id, checking the environment variable first, then the direct value
    #[must_use]
    pub fn get_app_id(&self) -> Option<String> {
        if let Some(env_var) = &self.app_id_env {
            if let Ok(value) = std::env::var(env_var) {
                return Some(value);
            }
        }
        self.app_id.clone()
    }

    /// Get the app secret, checking the environment variable first, then the direct value
    #[must_use]
    pub fn get_app_secret(&self) -> Option<String> {
        if let Some(env_var) = &self.app_secret_env {
            if let Ok(value) = std::env::var(env_var) {
                return Some(value);
            }
        }
        self.app_secret.clone()
    }

    /// Graph version without the leading `v`
    #[must_use]
    pub fn normalized_graph_version(&self) -> String {
        let trimmed = self.graph_version.trim();
        trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed)
            .to_string()
    }

    /// Check that everything needed to talk to Facebook is present and non-empty
    ///
    /// # Errors
    ///
    /// Returns the first missing value as a [`SettingsError`]
    pub fn validate(&self) -> Result<FacebookCredentials, SettingsError> {
        let app_id = self
            .get_app_id()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(SettingsError::MissingAppId)?;
        let app_secret = self
            .get_app_secret()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or(SettingsError::MissingAppSecret)?;
        let graph_version = self.normalized_graph_version();
        if graph_version.is_empty() {
            return Err(SettingsError::MissingGraphVersion);
        }

        Ok(FacebookCredentials {
            app_id,
            app_secret,
            graph_version,
        })
    }

    #[must_use]
    pub fn extra_scopes(&self) -> Vec<String> {
        parse_scope_list(&self.scopes)
    }

    /// Parse the `endpoints` setting into requests
    ///
    /// Each non-empty line is `path|name`; without a name the path minus slashes is used.
    #[must_use]
    pub fn endpoint_requests(&self) -> Vec<EndpointRequest> {
        self.endpoints
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                let (path, name) = match line.split_once('|') {
                    Some((path, name)) if !name.trim().is_empty() => {
                        (path.trim(), name.trim().to_string())
                    }
                    Some((path, _)) => (path.trim(), path.trim().trim_matches('/').to_string()),
                    None => (line, line.trim_matches('/').to_string()),
                };
                EndpointRequest {
                    path: path.to_string(),
                    name,
                }
            })
            .collect()
    }
}

impl LoginSettings {
    #[must_use]
    pub fn gate_policy(&self) -> GatePolicy {
        GatePolicy {
            disable_admin_login: self.disable_admin_login,
            admin_account_id: self.admin_account_id,
            disabled_roles: self
                .disabled_roles
                .iter()
                .map(|role| role.trim().to_string())
                .filter(|role| !role.is_empty())
                .collect::<BTreeSet<_>>(),
        }
    }
}
