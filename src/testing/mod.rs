//! Testing utilities for fblogin
//!
//! Fakes for the Facebook collaborators, ready-made settings and profiles, and a harness
//! that wires a [`crate::login::LoginFlowController`] around them.
//!
//! ## Organization
//!
//! - [`fixtures`] - Pre-built test data (settings, profiles, accounts)
//! - [`builders`] - Fluent builder for a complete login harness
//! - [`mock`] - Fake provider client and picture fetcher that record their calls
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fblogin::session::MemoryStateStore;
//! use fblogin::testing::LoginHarnessBuilder;
//!
//! async fn test_login() {
//!     let harness = LoginHarnessBuilder::new().build();
//!     let mut store = MemoryStateStore::new();
//!     let outcome = harness.login(&mut store).await;
//!     assert!(outcome.failure().is_none());
//! }
//! ```

pub mod builders;
pub mod fixtures;
pub mod mock;

pub use builders::{LoginHarness, LoginHarnessBuilder};
pub use fixtures::{state_from_url, TestFixtures};
pub use mock::{FakeProviderClient, RecordingLoginListener, RecordingPictureFetcher};

/// Common test constants
pub mod constants {
    /// Email on the default fake profile
    pub const TEST_EMAIL: &str = "jane@example.com";

    /// Display name on the default fake profile
    pub const TEST_USER_NAME: &str = "Jane Doe";

    /// Facebook id on the default fake profile
    pub const TEST_EXTERNAL_ID: &str = "10001";

    pub const TEST_APP_ID: &str = "123456789012345";
    pub const TEST_APP_SECRET: &str = "test_app_secret_0123456789abcdef";

    /// Callback URL handed to the provider
    pub const TEST_RETURN_URL: &str = "https://example.com/user/login/facebook/callback";

    /// Picture URL returned by the fake provider
    pub const TEST_PICTURE_URL: &str = "https://cdn.example.com/pictures/10001.jpg";

    /// Session secret for cookie tests
    pub const TEST_SESSION_SECRET: &[u8] = b"test_session_secret_32_bytes_long";
}
