pub mod cookie;
pub mod store;

pub use cookie::{CookieStateStore, SessionCookieFactory, COOKIE_NAME};
pub use store::{committed_access_token, LoginAttempt, MemoryStateStore, StateStore};
