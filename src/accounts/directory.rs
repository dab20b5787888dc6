use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use super::{AccountId, LocalAccount, NewAccount};
use crate::utils::crypto::digest_secret;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    #[error("an account with email {0} already exists")]
    DuplicateEmail(String),
    #[error("username {0} is already taken")]
    DuplicateUsername(String),
    #[error("account {0} not found")]
    NotFound(AccountId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Host user store
///
/// `create` must reject a second account with the same email even when two callers
/// checked `find_by_email` concurrently.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<LocalAccount>, DirectoryError>;
    async fn username_exists(&self, username: &str) -> Result<bool, DirectoryError>;
    async fn create(&self, account: NewAccount) -> Result<LocalAccount, DirectoryError>;
    async fn set_picture(&self, id: AccountId, picture: PathBuf) -> Result<(), DirectoryError>;
}

/// Id 1 belongs to the site administrator and is never handed out by `create`
const FIRST_GENERATED_ID: AccountId = 2;

struct StoredAccount {
    account: LocalAccount,
    password_digest: String,
}

struct DirectoryState {
    next_id: AccountId,
    accounts: BTreeMap<AccountId, StoredAccount>,
}

/// In-process directory; uniqueness is enforced under a single lock
pub struct MemoryUserDirectory {
    state: Mutex<DirectoryState>,
}

impl Default for MemoryUserDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DirectoryState {
                next_id: FIRST_GENERATED_ID,
                accounts: BTreeMap::new(),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, DirectoryState>, DirectoryError> {
        self.state
            .lock()
            .map_err(|_| DirectoryError::Storage("directory lock poisoned".to_string()))
    }

    /// Insert an existing account as-is, e.g. an administrator seeded at startup
    ///
    /// # Errors
    ///
    /// Returns an error if the id, email or username is already taken
    pub fn insert(&self, account: LocalAccount) -> Result<(), DirectoryError> {
        let mut state = self.lock()?;
        if state.accounts.contains_key(&account.id) {
            return Err(DirectoryError::Storage(format!(
                "account id {} already in use",
                account.id
            )));
        }
        Self::check_unique(&state, &account.email, &account.username)?;
        state.next_id = state.next_id.max(account.id + 1);
        state.accounts.insert(
            account.id,
            StoredAccount {
                account,
                password_digest: String::new(),
            },
        );
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: AccountId) -> Option<LocalAccount> {
        self.lock()
            .ok()?
            .accounts
            .get(&id)
            .map(|stored| stored.account.clone())
    }

    #[must_use]
    pub fn accounts(&self) -> Vec<LocalAccount> {
        self.lock()
            .map(|state| {
                state
                    .accounts
                    .values()
                    .map(|stored| stored.account.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `password` matches the stored digest for the account
    #[must_use]
    pub fn verify_password(&self, id: AccountId, password: &str) -> bool {
        self.lock().ok().is_some_and(|state| {
            state.accounts.get(&id).is_some_and(|stored| {
                !stored.password_digest.is_empty()
                    && stored.password_digest == digest_secret(password)
            })
        })
    }

    fn check_unique(
        state: &DirectoryState,
        email: &str,
        username: &str,
    ) -> Result<(), DirectoryError> {
        for stored in state.accounts.values() {
            if stored.account.email == email {
                return Err(DirectoryError::DuplicateEmail(email.to_string()));
            }
            if stored.account.username == username {
                return Err(DirectoryError::DuplicateUsername(username.to_string()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<LocalAccount>, DirectoryError> {
        let state = self.lock()?;
        Ok(state
            .accounts
            .values()
            .find(|stored| stored.account.email == email)
            .map(|stored| stored.account.clone()))
    }

    async fn username_exists(&self, username: &str) -> Result<bool, DirectoryError> {
        let state = self.lock()?;
        Ok(state
            .accounts
            .values()
            .any(|stored| stored.account.username == username))
    }

    async fn create(&self, account: NewAccount) -> Result<LocalAccount, DirectoryError> {
        let mut state = self.lock()?;
        Self::check_unique(&state, &account.email, &account.username)?;

        let id = state.next_id;
        state.next_id += 1;
        let created = LocalAccount {
            id,
            email: account.email,
            username: account.username,
            status: account.status,
            roles: account.roles,
            picture: None,
        };
        state.accounts.insert(
            id,
            StoredAccount {
                account: created.clone(),
                password_digest: digest_secret(&account.password),
            },
        );
        Ok(created)
    }

    async fn set_picture(&self, id: AccountId, picture: PathBuf) -> Result<(), DirectoryError> {
        let mut state = self.lock()?;
        let stored = state
            .accounts
            .get_mut(&id)
            .ok_or(DirectoryError::NotFound(id))?;
        stored.account.picture = Some(picture);
        Ok(())
    }
}
