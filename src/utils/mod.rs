pub mod crypto;
pub mod logging;
pub mod redirect_validator;
pub mod response_builder;
pub mod transliterate;

pub use logging::LoggingHelper;
pub use redirect_validator::{validate_internal_path, RedirectError};
pub use response_builder::ResponseBuilder;
