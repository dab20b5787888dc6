#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the fblogin application
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod accounts;
pub mod handlers;
pub mod login;
pub mod oauth;
pub mod session;
pub mod settings;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use accounts::{AccountGate, IdentityResolver, ProfilePictureImporter};
pub use handlers::{facebook_callback, facebook_login, health};
pub use login::{BeginOutcome, BeginRequest, LoginFailure, LoginFlowController, Outcome};
pub use oauth::{FacebookGraphClient, ProviderClient};
pub use session::{SessionCookieFactory, StateStore};
pub use settings::FbLoginSettings;
