//! Local accounts: lookup, creation, gating and picture import

pub mod directory;
pub mod gate;
pub mod picture;
pub mod resolver;

pub use directory::{DirectoryError, MemoryUserDirectory, UserDirectory};
pub use gate::{AccountGate, GateDecision, GateDenial, GatePolicy};
pub use picture::{HttpPictureFetcher, PictureFetcher, ProfilePictureImporter};
pub use resolver::{IdentityResolver, RejectReason, ResolveResult};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::session::{LoginAttempt, StateStore};
use crate::utils::crypto::generate_password;

pub type AccountId = u64;

/// Length of passwords generated for accounts created through Facebook
pub const GENERATED_PASSWORD_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Pending,
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAccount {
    pub id: AccountId,
    pub email: String,
    pub username: String,
    pub status: AccountStatus,
    pub roles: BTreeSet<String>,
    pub picture: Option<PathBuf>,
}

impl LocalAccount {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}

/// Everything needed to create an account
#[derive(Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub status: AccountStatus,
    pub roles: BTreeSet<String>,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("status", &self.status)
            .field("roles", &self.roles)
            .finish()
    }
}

/// Who may create an account by logging in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    /// Only administrators create accounts
    AdminOnly,
    /// Visitors register and are active immediately
    #[default]
    Visitors,
    /// Visitors register but wait for administrator approval
    VisitorsAdminApproval,
}

impl RegistrationPolicy {
    #[must_use]
    pub fn allows_registration(self) -> bool {
        self != Self::AdminOnly
    }

    #[must_use]
    pub fn initial_status(self) -> AccountStatus {
        match self {
            Self::Visitors => AccountStatus::Active,
            Self::AdminOnly | Self::VisitorsAdminApproval => AccountStatus::Pending,
        }
    }
}

/// Source of passwords for new accounts
pub trait PasswordGenerator: Send + Sync {
    fn generate(&self) -> String;
}

#[derive(Debug, Clone, Copy)]
pub struct RandomPasswordGenerator {
    pub length: usize,
}

impl Default for RandomPasswordGenerator {
    fn default() -> Self {
        Self {
            length: GENERATED_PASSWORD_LENGTH,
        }
    }
}

impl PasswordGenerator for RandomPasswordGenerator {
    fn generate(&self) -> String {
        generate_password(self.length)
    }
}

/// Marks the browser session as logged in to an account
pub trait SessionAuthenticator: Send + Sync {
    fn authenticate(&self, account: &LocalAccount, store: &mut dyn StateStore);
}

/// Records the account id in the [`StateStore`]
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreSessionAuthenticator;

impl SessionAuthenticator for StoreSessionAuthenticator {
    fn authenticate(&self, account: &LocalAccount, store: &mut dyn StateStore) {
        LoginAttempt::new(store).set_authenticated_uid(account.id);
    }
}

/// Notified when Facebook login creates an account or logs one in
pub trait LoginListener: Send + Sync {
    fn account_created(&self, _account: &LocalAccount) {}
    fn account_logged_in(&self, _account: &LocalAccount) {}
}
