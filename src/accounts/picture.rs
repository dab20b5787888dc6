use async_trait::async_trait;
use chrono::Utc;
use log::debug;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::PathBuf;
use std::sync::Arc;

use super::{LocalAccount, UserDirectory};
use crate::oauth::{PictureResolution, ProviderError};
use crate::settings::PictureSettings;
use crate::utils::transliterate::{transliterate, transliterate_path};
use crate::utils::LoggingHelper;

/// Upper bound for any transliterated path segment
const MAX_SEGMENT_LENGTH: usize = 50;

// [type:name] placeholders, e.g. [user:uid] or [date:custom:Y]
static TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([a-z_]+):([^\]\[]+)\]").expect("token pattern is valid"));

/// Downloads picture bytes
#[async_trait]
pub trait PictureFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProviderError>;
}

#[derive(Clone, Default)]
pub struct HttpPictureFetcher {
    http: reqwest::Client,
}

impl HttpPictureFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PictureFetcher for HttpPictureFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::api(format!("picture download returned HTTP {status}")));
        }
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(ProviderError::malformed("picture download was empty"));
        }
        Ok(bytes.to_vec())
    }
}

/// Copies the Facebook profile picture of a new account into local storage
///
/// Best effort: every failure is logged and reported as `false`.
pub struct ProfilePictureImporter {
    fetcher: Arc<dyn PictureFetcher>,
    directory: Arc<dyn UserDirectory>,
    settings: PictureSettings,
}

impl ProfilePictureImporter {
    pub fn new(
        fetcher: Arc<dyn PictureFetcher>,
        directory: Arc<dyn UserDirectory>,
        settings: PictureSettings,
    ) -> Self {
        Self {
            fetcher,
            directory,
            settings,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Max resolution, else min resolution, else none
    #[must_use]
    pub fn preferred_resolution(&self) -> Option<PictureResolution> {
        if !self.is_enabled() {
            return None;
        }
        PictureResolution::parse(&self.settings.max_resolution)
            .or_else(|| PictureResolution::parse(&self.settings.min_resolution))
    }

    /// Directory for this account's picture with placeholders resolved
    #[must_use]
    pub fn destination_dir(&self, account: &LocalAccount) -> PathBuf {
        let resolved = resolve_tokens(&self.settings.file_directory, account);
        let relative = transliterate_path(&resolved, '_', MAX_SEGMENT_LENGTH);
        self.settings.root.join(relative)
    }

    /// Full destination path; the same external id always maps to the same file
    #[must_use]
    pub fn destination_path(&self, account: &LocalAccount, external_id: &str) -> PathBuf {
        let filename = transliterate(&format!("{external_id}.jpg"), '_', MAX_SEGMENT_LENGTH);
        self.destination_dir(account).join(filename)
    }

    /// Download `picture_url` and attach it to `account`
    pub async fn import(
        &self,
        account: &LocalAccount,
        picture_url: Option<&str>,
        external_id: &str,
    ) -> bool {
        if !self.is_enabled() {
            debug!("Account pictures are disabled, skipping import for {}", account.id);
            return false;
        }
        let Some(picture_url) = picture_url.filter(|url| !url.is_empty()) else {
            debug!("No Facebook picture URL for account {}", account.id);
            return false;
        };
        if external_id.trim().is_empty() {
            LoggingHelper::log_picture_import_failure(account.id, &"missing Facebook id");
            return false;
        }

        let directory = self.destination_dir(account);
        if let Err(e) = tokio::fs::create_dir_all(&directory).await {
            LoggingHelper::log_picture_import_failure(
                account.id,
                &format!("directory {} is not writable: {e}", directory.display()),
            );
            return false;
        }

        let bytes = match self.fetcher.fetch(picture_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                LoggingHelper::log_picture_import_failure(account.id, &e);
                return false;
            }
        };

        let destination = self.destination_path(account, external_id);
        if let Err(e) = tokio::fs::write(&destination, &bytes).await {
            LoggingHelper::log_picture_import_failure(
                account.id,
                &format!("could not write {}: {e}", destination.display()),
            );
            return false;
        }

        match self.directory.set_picture(account.id, destination).await {
            Ok(()) => true,
            Err(e) => {
                LoggingHelper::log_picture_import_failure(account.id, &e);
                false
            }
        }
    }
}

/// Replace `[user:*]` and `[date:*]` placeholders; unknown placeholders are dropped
fn resolve_tokens(template: &str, account: &LocalAccount) -> String {
    let now = Utc::now();
    TOKEN_PATTERN
        .replace_all(template, |caps: &Captures<'_>| {
            let name = caps[2].strip_prefix("custom:").unwrap_or(&caps[2]);
            match (&caps[1], name) {
                ("user", "uid") => account.id.to_string(),
                ("user", "name") => account.username.clone(),
                ("date", "Y") => now.format("%Y").to_string(),
                ("date", "m") => now.format("%m").to_string(),
                ("date", "d") => now.format("%d").to_string(),
                _ => String::new(),
            }
        })
        .into_owned()
}
