use log::{debug, error, warn};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::gate::{AccountGate, GateDecision, GateDenial};
use super::{
    AccountStatus, LocalAccount, LoginListener, NewAccount, PasswordGenerator,
    ProfilePictureImporter, RandomPasswordGenerator, RegistrationPolicy, SessionAuthenticator,
    StoreSessionAuthenticator, UserDirectory,
};
use crate::oauth::ExternalProfile;
use crate::session::StateStore;
use crate::utils::LoggingHelper;

/// Candidates tried before username generation gives up
pub const MAX_USERNAME_ATTEMPTS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Only administrators may create accounts
    RegistrationBlocked,
    UsernameGenerationFailed,
    CreationFailed,
    /// Account created but waiting for administrator approval
    PendingApproval,
    /// The user directory could not be queried
    LookupFailed,
    Gate(GateDenial),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RegistrationBlocked => write!(f, "registration is restricted to administrators"),
            Self::UsernameGenerationFailed => write!(f, "no free username found"),
            Self::CreationFailed => write!(f, "account creation failed"),
            Self::PendingApproval => write!(f, "account awaits approval"),
            Self::LookupFailed => write!(f, "account lookup failed"),
            Self::Gate(denial) => write!(f, "{denial}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveResult {
    LoggedIn { account: LocalAccount, is_new: bool },
    Rejected(RejectReason),
}

/// Maps a Facebook profile onto a local account: find by email, or create
pub struct IdentityResolver {
    directory: Arc<dyn UserDirectory>,
    gate: AccountGate,
    registration: RegistrationPolicy,
    passwords: Arc<dyn PasswordGenerator>,
    authenticator: Arc<dyn SessionAuthenticator>,
    pictures: Option<Arc<ProfilePictureImporter>>,
    listener: Option<Arc<dyn LoginListener>>,
}

impl IdentityResolver {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        gate: AccountGate,
        registration: RegistrationPolicy,
    ) -> Self {
        Self {
            directory,
            gate,
            registration,
            passwords: Arc::new(RandomPasswordGenerator::default()),
            authenticator: Arc::new(StoreSessionAuthenticator),
            pictures: None,
            listener: None,
        }
    }

    #[must_use]
    pub fn with_password_generator(mut self, passwords: Arc<dyn PasswordGenerator>) -> Self {
        self.passwords = passwords;
        self
    }

    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn SessionAuthenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    #[must_use]
    pub fn with_picture_importer(mut self, pictures: Arc<ProfilePictureImporter>) -> Self {
        self.pictures = Some(pictures);
        self
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn LoginListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    #[must_use]
    pub fn picture_importer(&self) -> Option<&ProfilePictureImporter> {
        self.pictures.as_deref()
    }

    /// Whether an account with this email already exists
    ///
    /// # Errors
    ///
    /// Returns [`RejectReason::LookupFailed`] when the directory cannot be queried
    pub async fn account_exists(&self, email: &str) -> Result<bool, RejectReason> {
        self.directory
            .find_by_email(email)
            .await
            .map(|found| found.is_some())
            .map_err(|e| {
                error!("Account lookup failed: {e}");
                RejectReason::LookupFailed
            })
    }

    /// Resolve `profile` to a logged-in local account, creating it when allowed
    pub async fn resolve(
        &self,
        profile: &ExternalProfile,
        store: &mut dyn StateStore,
    ) -> ResolveResult {
        let Some(email) = profile.email.as_deref().filter(|e| !e.is_empty()) else {
            debug_assert!(false, "profiles reach the resolver only with an email");
            return ResolveResult::Rejected(RejectReason::LookupFailed);
        };

        match self.directory.find_by_email(email).await {
            Ok(Some(account)) => self.login_existing(account, store),
            Ok(None) => self.register(profile, email, store).await,
            Err(e) => {
                error!("Account lookup failed: {e}");
                ResolveResult::Rejected(RejectReason::LookupFailed)
            }
        }
    }

    fn login_existing(&self, account: LocalAccount, store: &mut dyn StateStore) -> ResolveResult {
        if let GateDecision::Denied(denial) = self.gate.check(&account) {
            return ResolveResult::Rejected(RejectReason::Gate(denial));
        }
        self.finalize_login(account, false, store)
    }

    async fn register(
        &self,
        profile: &ExternalProfile,
        email: &str,
        store: &mut dyn StateStore,
    ) -> ResolveResult {
        if !self.registration.allows_registration() {
            warn!("Facebook login refused for {email}: registration is limited to administrators");
            return ResolveResult::Rejected(RejectReason::RegistrationBlocked);
        }

        let username = match self.generate_unique_username(&profile.display_name).await {
            Ok(username) => username,
            Err(reason) => return ResolveResult::Rejected(reason),
        };

        let status = self.registration.initial_status();
        let account = match self
            .directory
            .create(NewAccount {
                username,
                email: email.to_string(),
                password: self.passwords.generate(),
                status,
                roles: BTreeSet::new(),
            })
            .await
        {
            Ok(account) => account,
            Err(e) => {
                error!("Could not create account for Facebook user {}: {e}", profile.external_id);
                return ResolveResult::Rejected(RejectReason::CreationFailed);
            }
        };
        LoggingHelper::log_account_created(account.id, &account.username, account.is_active());
        if let Some(listener) = &self.listener {
            listener.account_created(&account);
        }

        if let Some(pictures) = &self.pictures {
            let imported = pictures
                .import(&account, profile.picture_url.as_deref(), &profile.external_id)
                .await;
            debug!("Picture import for account {}: {imported}", account.id);
        }

        match self.gate.check(&account) {
            GateDecision::Allowed => self.finalize_login(account, true, store),
            GateDecision::Denied(GateDenial::InactiveAccount)
                if account.status == AccountStatus::Pending =>
            {
                ResolveResult::Rejected(RejectReason::PendingApproval)
            }
            GateDecision::Denied(denial) => ResolveResult::Rejected(RejectReason::Gate(denial)),
        }
    }

    fn finalize_login(
        &self,
        account: LocalAccount,
        is_new: bool,
        store: &mut dyn StateStore,
    ) -> ResolveResult {
        self.authenticator.authenticate(&account, store);
        if let Some(listener) = &self.listener {
            listener.account_logged_in(&account);
        }
        LoggingHelper::log_login_success(account.id, is_new);
        ResolveResult::LoggedIn { account, is_new }
    }

    /// Derive a free username: the trimmed display name, then "name 2", "name 3", ...
    ///
    /// # Errors
    ///
    /// - [`RejectReason::CreationFailed`] when the display name is blank
    /// - [`RejectReason::LookupFailed`] when the directory cannot be queried
    /// - [`RejectReason::UsernameGenerationFailed`] after [`MAX_USERNAME_ATTEMPTS`] candidates
    pub async fn generate_unique_username(
        &self,
        display_name: &str,
    ) -> Result<String, RejectReason> {
        let base = display_name.trim();
        if base.is_empty() {
            error!("Facebook profile has no usable display name");
            return Err(RejectReason::CreationFailed);
        }

        for attempt in 1..=MAX_USERNAME_ATTEMPTS {
            let candidate = if attempt == 1 {
                base.to_string()
            } else {
                format!("{base} {attempt}")
            };
            match self.directory.username_exists(&candidate).await {
                Ok(false) => return Ok(candidate),
                Ok(true) => {}
                Err(e) => {
                    error!("Username lookup failed: {e}");
                    return Err(RejectReason::LookupFailed);
                }
            }
        }

        error!("No free username for '{base}' after {MAX_USERNAME_ATTEMPTS} attempts");
        Err(RejectReason::UsernameGenerationFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::gate::GatePolicy;
    use crate::accounts::MemoryUserDirectory;
    use crate::session::{LoginAttempt, MemoryStateStore};

    fn profile(name: &str, email: &str) -> ExternalProfile {
        ExternalProfile {
            external_id: "10001".to_string(),
            display_name: name.to_string(),
            email: Some(email.to_string()),
            picture_url: None,
        }
    }

    fn seed(directory: &MemoryUserDirectory, id: u64, username: &str, email: &str) {
        directory
            .insert(LocalAccount {
                id,
                email: email.to_string(),
                username: username.to_string(),
                status: AccountStatus::Active,
                roles: BTreeSet::new(),
                picture: None,
            })
            .unwrap();
    }

    fn resolver(
        directory: Arc<MemoryUserDirectory>,
        registration: RegistrationPolicy,
    ) -> IdentityResolver {
        IdentityResolver::new(directory, AccountGate::new(GatePolicy::default()), registration)
    }

    #[tokio::test]
    async fn test_username_generation_sequence() {
        let directory = Arc::new(MemoryUserDirectory::new());
        let resolver = resolver(directory.clone(), RegistrationPolicy::Visitors);

        assert_eq!(
            resolver.generate_unique_username("  Jane Doe ").await.unwrap(),
            "Jane Doe"
        );
        seed(&directory, 2, "Jane Doe", "a@example.com");
        assert_eq!(
            resolver.generate_unique_username("Jane Doe").await.unwrap(),
            "Jane Doe 2"
        );
        seed(&directory, 3, "Jane Doe 2", "b@example.com");
        assert_eq!(
            resolver.generate_unique_username("Jane Doe").await.unwrap(),
            "Jane Doe 3"
        );
        assert_eq!(
            resolver.generate_unique_username("   ").await,
            Err(RejectReason::CreationFailed)
        );
    }

    #[tokio::test]
    async fn test_existing_account_logs_in() {
        let directory = Arc::new(MemoryUserDirectory::new());
        seed(&directory, 5, "jane", "jane@example.com");
        let resolver = resolver(directory.clone(), RegistrationPolicy::AdminOnly);
        let mut store = MemoryStateStore::new();

        let result = resolver
            .resolve(&profile("Jane Doe", "jane@example.com"), &mut store)
            .await;
        match result {
            ResolveResult::LoggedIn { account, is_new } => {
                assert_eq!(account.id, 5);
                assert!(!is_new);
            }
            ResolveResult::Rejected(reason) => panic!("unexpected rejection: {reason}"),
        }
        assert_eq!(directory.accounts().len(), 1);
        assert_eq!(LoginAttempt::new(&mut store).authenticated_uid(), Some(5));
    }

    #[tokio::test]
    async fn test_admin_only_blocks_registration() {
        let directory = Arc::new(MemoryUserDirectory::new());
        let resolver = resolver(directory.clone(), RegistrationPolicy::AdminOnly);
        let mut store = MemoryStateStore::new();

        assert_eq!(
            resolver
                .resolve(&profile("Jane", "jane@example.com"), &mut store)
                .await,
            ResolveResult::Rejected(RejectReason::RegistrationBlocked)
        );
        assert!(directory.accounts().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_gated_existing_account_not_authenticated() {
        let directory = Arc::new(MemoryUserDirectory::new());
        seed(&directory, 1, "admin", "admin@example.com");
        let resolver = resolver(directory, RegistrationPolicy::Visitors);
        let mut store = MemoryStateStore::new();

        assert_eq!(
            resolver
                .resolve(&profile("Admin", "admin@example.com"), &mut store)
                .await,
            ResolveResult::Rejected(RejectReason::Gate(GateDenial::AdminLoginDisabled))
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_pending_registration() {
        let directory = Arc::new(MemoryUserDirectory::new());
        let resolver = resolver(directory.clone(), RegistrationPolicy::VisitorsAdminApproval);
        let mut store = MemoryStateStore::new();

        assert_eq!(
            resolver
                .resolve(&profile("Jane", "jane@example.com"), &mut store)
                .await,
            ResolveResult::Rejected(RejectReason::PendingApproval)
        );
        let accounts = directory.accounts();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].status, AccountStatus::Pending);
        assert!(store.is_empty());
    }
}
