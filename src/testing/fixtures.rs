//! Pre-built settings, profiles and accounts

use std::collections::BTreeSet;
use std::path::PathBuf;

use super::constants::{TEST_APP_ID, TEST_APP_SECRET, TEST_EMAIL, TEST_EXTERNAL_ID, TEST_USER_NAME};
use crate::accounts::{AccountId, AccountStatus, LocalAccount};
use crate::oauth::ExternalProfile;
use crate::settings::{FacebookSettings, PictureSettings};

/// Central fixture provider for test data
pub struct TestFixtures;

impl TestFixtures {
    /// Complete Facebook settings with one extra scope
    #[must_use]
    pub fn facebook_settings() -> FacebookSettings {
        FacebookSettings {
            app_id: Some(TEST_APP_ID.to_string()),
            app_secret: Some(TEST_APP_SECRET.to_string()),
            graph_version: "v19.0".to_string(),
            scopes: "user_friends".to_string(),
            ..FacebookSettings::default()
        }
    }

    /// Facebook settings with the given credentials, `None` meaning unset
    #[must_use]
    pub fn facebook_settings_with(
        app_id: Option<&str>,
        app_secret: Option<&str>,
    ) -> FacebookSettings {
        FacebookSettings {
            app_id: app_id.map(str::to_string),
            app_secret: app_secret.map(str::to_string),
            ..Self::facebook_settings()
        }
    }

    /// Every combination of missing or empty credentials
    #[must_use]
    pub fn unconfigured_facebook_settings() -> Vec<FacebookSettings> {
        let values = [None, Some(""), Some("   ")];
        let mut settings = Vec::new();
        for app_id in values {
            for app_secret in values {
                settings.push(Self::facebook_settings_with(app_id, app_secret));
            }
            settings.push(Self::facebook_settings_with(app_id, Some(TEST_APP_SECRET)));
            settings.push(Self::facebook_settings_with(Some(TEST_APP_ID), app_id));
        }
        settings
    }

    /// Picture storage below `root` with a fixed directory layout
    #[must_use]
    pub fn picture_settings(root: PathBuf) -> PictureSettings {
        PictureSettings {
            enabled: true,
            root,
            file_directory: "pictures".to_string(),
            max_resolution: "85x85".to_string(),
            min_resolution: String::new(),
        }
    }

    /// The profile the fake provider returns by default
    #[must_use]
    pub fn profile() -> ExternalProfile {
        Self::profile_with(TEST_EXTERNAL_ID, TEST_USER_NAME, Some(TEST_EMAIL))
    }

    #[must_use]
    pub fn profile_with(external_id: &str, name: &str, email: Option<&str>) -> ExternalProfile {
        ExternalProfile {
            external_id: external_id.to_string(),
            display_name: name.to_string(),
            email: email.map(str::to_string),
            picture_url: None,
        }
    }

    #[must_use]
    pub fn account(id: AccountId, username: &str, email: &str) -> LocalAccount {
        LocalAccount {
            id,
            email: email.to_string(),
            username: username.to_string(),
            status: AccountStatus::Active,
            roles: BTreeSet::new(),
            picture: None,
        }
    }

    #[must_use]
    pub fn account_with(
        id: AccountId,
        email: &str,
        status: AccountStatus,
        roles: &[&str],
    ) -> LocalAccount {
        LocalAccount {
            status,
            roles: roles.iter().map(|r| (*r).to_string()).collect(),
            ..Self::account(id, &format!("user{id}"), email)
        }
    }
}

/// The `state` query parameter of an authorization URL
#[must_use]
pub fn state_from_url(url: &str) -> Option<String> {
    query_param(url, "state")
}

/// Any query parameter of a URL
#[must_use]
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = url::Url::parse(url)
        .or_else(|_| url::Url::parse("http://localhost").and_then(|base| base.join(url)))
        .ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
