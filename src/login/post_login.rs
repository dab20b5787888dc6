use log::warn;

use crate::accounts::LocalAccount;
use crate::settings::LoginSettings;
use crate::utils::validate_internal_path;

/// Used when neither a saved nor a configured destination is usable
pub const DEFAULT_POST_LOGIN_PATH: &str = "/user";

/// Decides where a successful login lands
#[derive(Debug, Clone)]
pub struct PostLoginRedirect {
    configured_path: String,
    redirect_user_form: bool,
}

impl PostLoginRedirect {
    #[must_use]
    pub fn new(configured_path: &str, redirect_user_form: bool) -> Self {
        Self {
            configured_path: configured_path.to_string(),
            redirect_user_form,
        }
    }

    #[must_use]
    pub fn from_settings(settings: &LoginSettings) -> Self {
        Self::new(&settings.post_login_path, settings.redirect_user_form)
    }

    /// New users go to their edit form when configured; otherwise the saved destination,
    /// then the configured path, then `/user`
    #[must_use]
    pub fn resolve(&self, saved: Option<&str>, account: &LocalAccount, is_new: bool) -> String {
        if is_new && self.redirect_user_form {
            return format!("/user/{}/edit", account.id);
        }

        if let Some(saved) = saved {
            match validate_internal_path(saved) {
                Ok(path) => return path,
                Err(e) => warn!("Ignoring saved post-login destination: {e}"),
            }
        }

        match validate_internal_path(&self.configured_path) {
            Ok(path) => path,
            Err(e) => {
                warn!("Configured post-login path is unusable: {e}");
                DEFAULT_POST_LOGIN_PATH.to_string()
            }
        }
    }
}
