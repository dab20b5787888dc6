use actix_web::cookie::{time::Duration, Cookie, SameSite};
use actix_web::HttpRequest;
use anyhow::Result;
use log::debug;

use super::store::{MemoryStateStore, StateStore};
use crate::utils::crypto::{decrypt_data, derive_encryption_key, encrypt_data, ENCRYPTION_KEY_SIZE};

/// Name of the encrypted cookie carrying the per-browser state
pub const COOKIE_NAME: &str = "fblogin_session";

/// [`StateStore`] backed by the encrypted session cookie
///
/// Tracks whether anything changed so untouched sessions are not re-sent.
#[derive(Debug, Default, Clone)]
pub struct CookieStateStore {
    values: MemoryStateStore,
    changed: bool,
}

impl CookieStateStore {
    #[must_use]
    pub fn changed(&self) -> bool {
        self.changed
    }

    #[must_use]
    pub fn values(&self) -> &MemoryStateStore {
        &self.values
    }
}

impl StateStore for CookieStateStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key)
    }

    fn set(&mut self, key: &str, value: String) {
        if self.values.get(key).as_deref() != Some(value.as_str()) {
            self.values.set(key, value);
            self.changed = true;
        }
    }

    fn remove(&mut self, key: &str) -> Option<String> {
        let removed = self.values.remove(key);
        if removed.is_some() {
            self.changed = true;
        }
        removed
    }
}

/// Creates and reads the encrypted session cookie
#[derive(Clone)]
pub struct SessionCookieFactory {
    encryption_key: [u8; ENCRYPTION_KEY_SIZE],
    cookie_secure: bool,
}

impl SessionCookieFactory {
    #[must_use]
    pub fn new(session_secret: &[u8], cookie_secure: bool) -> Self {
        Self {
            encryption_key: derive_encryption_key(session_secret),
            cookie_secure,
        }
    }

    /// Load the store from the request cookie; missing or undecryptable cookies start empty
    #[must_use]
    pub fn load_store(&self, req: &HttpRequest) -> CookieStateStore {
        let Some(cookie) = req.cookie(COOKIE_NAME) else {
            return CookieStateStore::default();
        };

        match decrypt_data::<MemoryStateStore>(cookie.value(), &self.encryption_key) {
            Ok(values) => CookieStateStore {
                values,
                changed: false,
            },
            Err(e) => {
                debug!("Ignoring unreadable session cookie: {e}");
                // Rewrite it so the browser stops sending garbage
                CookieStateStore {
                    values: MemoryStateStore::default(),
                    changed: true,
                }
            }
        }
    }

    /// Cookie to send back, or `None` when the store is unchanged
    ///
    /// An emptied store produces an expired cookie.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails
    pub fn store_cookie(&self, store: &CookieStateStore) -> Result<Option<Cookie<'static>>> {
        if !store.changed() {
            return Ok(None);
        }
        if store.values().is_empty() {
            return Ok(Some(self.create_expired_cookie()));
        }

        let value = encrypt_data(store.values(), &self.encryption_key)?;
        Ok(Some(
            Cookie::build(COOKIE_NAME, value)
                .http_only(true)
                .secure(self.cookie_secure)
                .same_site(SameSite::Lax)
                .path("/")
                .finish(),
        ))
    }

    /// Create an expired cookie to clear the session
    #[must_use]
    pub fn create_expired_cookie(&self) -> Cookie<'static> {
        Cookie::build(COOKIE_NAME, "")
            .http_only(true)
            .secure(self.cookie_secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(Duration::seconds(-1))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    fn factory() -> SessionCookieFactory {
        SessionCookieFactory::new(b"test-session-secret", false)
    }

    #[test]
    fn test_round_trip_through_cookie() {
        let factory = factory();
        let mut store = CookieStateStore::default();
        store.set("social_auth_facebook_csrf_state", "abc".to_string());

        let cookie = factory.store_cookie(&store).unwrap().unwrap();
        assert_eq!(cookie.name(), COOKIE_NAME);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));

        let req = TestRequest::default().cookie(cookie).to_http_request();
        let loaded = factory.load_store(&req);
        assert!(!loaded.changed());
        assert_eq!(
            loaded.get("social_auth_facebook_csrf_state").as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn test_unchanged_store_sends_nothing() {
        let store = CookieStateStore::default();
        assert!(factory().store_cookie(&store).unwrap().is_none());
    }

    #[test]
    fn test_emptied_store_expires_cookie() {
        let mut store = CookieStateStore::default();
        store.set("k", "v".to_string());
        store.remove("k");
        let cookie = factory().store_cookie(&store).unwrap().unwrap();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(Duration::seconds(-1)));
    }

    #[test]
    fn test_foreign_cookie_starts_empty() {
        let other = SessionCookieFactory::new(b"another-secret", false);
        let mut store = CookieStateStore::default();
        store.set("k", "v".to_string());
        let cookie = other.store_cookie(&store).unwrap().unwrap();

        let req = TestRequest::default().cookie(cookie).to_http_request();
        let loaded = factory().load_store(&req);
        assert!(loaded.values().is_empty());
        assert!(loaded.changed());
    }
}
