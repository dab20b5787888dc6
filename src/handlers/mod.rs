// HTTP request handlers for the Facebook login routes
pub mod health;
pub mod login;

pub use health::health;
pub use login::{facebook_callback, facebook_login, LoginQuery};

/// Entry point that sends the browser to Facebook
pub const LOGIN_PATH: &str = "/user/login/facebook";

/// Redirect URI registered with the Facebook app
pub const CALLBACK_PATH: &str = "/user/login/facebook/callback";

/// Health check
pub const HEALTH_PATH: &str = "/ping";
