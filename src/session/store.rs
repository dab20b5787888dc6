use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::accounts::AccountId;
use crate::oauth::AccessToken;

/// Prefix applied to every key this crate writes
pub const KEY_PREFIX: &str = "social_auth_facebook_";

pub const CSRF_STATE: &str = "csrf_state";
pub const PENDING_ACCESS_TOKEN: &str = "pending_access_token";
pub const ACCESS_TOKEN: &str = "access_token";
pub const REPROMPT_REQUESTED: &str = "reprompt_requested";
pub const POST_LOGIN_PATH: &str = "post_login_path";
pub const AUTHENTICATED_UID: &str = "uid";

/// Key-value storage scoped to one browser session
///
/// The login flow only reads and writes named keys; the owner decides how long the
/// store lives and where it is persisted.
pub trait StateStore: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
    fn remove(&mut self, key: &str) -> Option<String>;
}

/// In-process store, also the payload of the session cookie
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStateStore {
    values: BTreeMap<String, String>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }
}

impl StateStore for MemoryStateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }
}

fn prefixed(key: &str) -> String {
    format!("{KEY_PREFIX}{key}")
}

/// Read the committed access token without borrowing the store mutably
#[must_use]
pub fn committed_access_token(store: &dyn StateStore) -> Option<AccessToken> {
    decode_token(store.get(&prefixed(ACCESS_TOKEN))?)
}

fn decode_token(raw: String) -> Option<AccessToken> {
    match serde_json::from_str(&raw) {
        Ok(token) => Some(token),
        Err(e) => {
            debug!("Discarding unreadable stored access token: {e}");
            None
        }
    }
}

fn encode_token(token: &AccessToken) -> Option<String> {
    serde_json::to_string(token).ok()
}

/// Typed view of the keys one login attempt keeps in a [`StateStore`]
pub struct LoginAttempt<'a> {
    store: &'a mut dyn StateStore,
}

impl<'a> LoginAttempt<'a> {
    pub fn new(store: &'a mut dyn StateStore) -> Self {
        Self { store }
    }

    /// Reborrow the underlying store, e.g. to hand it to a collaborator
    pub fn store(&mut self) -> &mut dyn StateStore {
        self.store
    }

    fn get(&self, key: &str) -> Option<String> {
        self.store.get(&prefixed(key))
    }

    fn set(&mut self, key: &str, value: String) {
        self.store.set(&prefixed(key), value);
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        self.store.remove(&prefixed(key))
    }

    pub fn set_csrf_state(&mut self, state: &str) {
        self.set(CSRF_STATE, state.to_string());
    }

    #[must_use]
    pub fn csrf_state(&self) -> Option<String> {
        self.get(CSRF_STATE)
    }

    /// Read and remove the stored state; a state can be checked only once
    pub fn take_csrf_state(&mut self) -> Option<String> {
        self.remove(CSRF_STATE)
    }

    pub fn set_pending_token(&mut self, token: &AccessToken) {
        if let Some(encoded) = encode_token(token) {
            self.set(PENDING_ACCESS_TOKEN, encoded);
        }
    }

    #[must_use]
    pub fn pending_token(&self) -> Option<AccessToken> {
        decode_token(self.get(PENDING_ACCESS_TOKEN)?)
    }

    /// Promote the pending token to the committed session token
    pub fn commit_pending_token(&mut self) -> bool {
        match self.remove(PENDING_ACCESS_TOKEN) {
            Some(encoded) => {
                self.set(ACCESS_TOKEN, encoded);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn access_token(&self) -> Option<AccessToken> {
        decode_token(self.get(ACCESS_TOKEN)?)
    }

    /// Drop both the pending and the committed token
    pub fn clear_tokens(&mut self) {
        self.remove(PENDING_ACCESS_TOKEN);
        self.remove(ACCESS_TOKEN);
    }

    #[must_use]
    pub fn reprompt_requested(&self) -> bool {
        self.get(REPROMPT_REQUESTED).is_some_and(|v| v == "1")
    }

    pub fn set_reprompt_requested(&mut self, requested: bool) {
        if requested {
            self.set(REPROMPT_REQUESTED, "1".to_string());
        } else {
            self.remove(REPROMPT_REQUESTED);
        }
    }

    pub fn set_post_login_path(&mut self, path: &str) {
        self.set(POST_LOGIN_PATH, path.to_string());
    }

    #[must_use]
    pub fn post_login_path(&self) -> Option<String> {
        self.get(POST_LOGIN_PATH)
    }

    pub fn take_post_login_path(&mut self) -> Option<String> {
        self.remove(POST_LOGIN_PATH)
    }

    pub fn set_authenticated_uid(&mut self, id: AccountId) {
        self.set(AUTHENTICATED_UID, id.to_string());
    }

    #[must_use]
    pub fn authenticated_uid(&self) -> Option<AccountId> {
        self.get(AUTHENTICATED_UID)?.parse().ok()
    }

    /// Remove every key of the attempt
    pub fn clear(&mut self) {
        for key in [
            CSRF_STATE,
            PENDING_ACCESS_TOKEN,
            ACCESS_TOKEN,
            REPROMPT_REQUESTED,
            POST_LOGIN_PATH,
        ] {
            self.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_keys_are_namespaced() {
        let mut store = MemoryStateStore::new();
        LoginAttempt::new(&mut store).set_csrf_state("abc");
        assert_eq!(
            store.get("social_auth_facebook_csrf_state").as_deref(),
            Some("abc")
        );
        assert_eq!(store.get("csrf_state"), None);
    }

    #[test]
    fn test_state_is_taken_once() {
        let mut store = MemoryStateStore::new();
        let mut attempt = LoginAttempt::new(&mut store);
        attempt.set_csrf_state("abc");
        assert_eq!(attempt.take_csrf_state().as_deref(), Some("abc"));
        assert_eq!(attempt.take_csrf_state(), None);
    }

    #[test]
    fn test_pending_token_commit() {
        let mut store = MemoryStateStore::new();
        let token = AccessToken::new("EAAB", Some(Utc::now() + Duration::hours(1)));
        let mut attempt = LoginAttempt::new(&mut store);
        attempt.set_pending_token(&token);
        assert_eq!(attempt.access_token(), None);
        assert!(attempt.commit_pending_token());
        assert_eq!(attempt.pending_token(), None);
        assert_eq!(attempt.access_token(), Some(token.clone()));
        assert_eq!(committed_access_token(&store), Some(token));
    }

    #[test]
    fn test_clear_tokens_and_clear_all() {
        let mut store = MemoryStateStore::new();
        let mut attempt = LoginAttempt::new(&mut store);
        attempt.set_pending_token(&AccessToken::new("a", None));
        attempt.set_reprompt_requested(true);
        attempt.set_post_login_path("/node/1");
        attempt.clear_tokens();
        assert_eq!(attempt.pending_token(), None);
        assert!(attempt.reprompt_requested());

        attempt.set_authenticated_uid(7);
        attempt.clear();
        assert!(!attempt.reprompt_requested());
        assert_eq!(attempt.post_login_path(), None);
        // The authenticated session outlives the attempt
        assert_eq!(attempt.authenticated_uid(), Some(7));
    }

    #[test]
    fn test_unreadable_token_is_ignored() {
        let mut store = MemoryStateStore::new();
        store.set("social_auth_facebook_access_token", "not json".to_string());
        assert_eq!(committed_access_token(&store), None);
    }
}
