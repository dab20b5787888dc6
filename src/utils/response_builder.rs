use actix_web::{cookie::Cookie, http::header, HttpResponse};

pub struct ResponseBuilder;

impl ResponseBuilder {
    /// Create a 302 redirect response with optional cookies
    #[must_use]
    pub fn redirect(location: &str, cookies: Vec<Cookie<'static>>) -> HttpResponse {
        let mut builder = HttpResponse::Found();
        for cookie in cookies {
            builder.cookie(cookie);
        }
        builder
            .insert_header((header::LOCATION, location))
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .finish()
    }

    /// Append `error` and `message` query parameters to a login page path
    #[must_use]
    pub fn error_location(login_path: &str, code: &str, message: &str) -> String {
        let separator = if login_path.contains('?') { '&' } else { '?' };
        format!(
            "{login_path}{separator}error={}&message={}",
            urlencoding::encode(code),
            urlencoding::encode(message)
        )
    }
}
