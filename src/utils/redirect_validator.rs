use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

// High-confidence attack patterns; post-login destinations must be plain internal paths

static PATH_TRAVERSAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.\.").expect("path traversal pattern is valid"));

// Anything that looks like a scheme or a protocol-relative authority
static PROTOCOL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:[a-z][a-z0-9+.-]*:)|(?:/{2,})").expect("protocol pattern is valid")
});

// Control characters, encoded CR/LF/NUL, backslashes and invisible unicode separators
static SUSPICIOUS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[\x00-\x1F\x7F-\x9F]|%(?:00|0[aAdD]|09|5c)|\\|[\u{200E}\u{200F}\u{2060}-\u{2064}\u{2000}-\u{200A}]")
        .expect("suspicious pattern is valid")
});

const MAX_PATH_LENGTH: usize = 2048;

const DANGEROUS_PROTOCOLS: &[&str] = &["javascript:", "vbscript:", "data:", "file:", "ftp:"];

/// Reasons a post-login destination was rejected
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RedirectError {
    #[error("redirect path is empty")]
    Empty,
    #[error("redirect path exceeds {MAX_PATH_LENGTH} characters")]
    TooLong,
    #[error("redirect path points outside the site")]
    External,
    #[error("redirect path contains a traversal sequence")]
    Traversal,
    #[error("redirect path contains suspicious characters")]
    Suspicious,
}

/// Validate a post-login destination and normalise it to an absolute internal path
///
/// Relative paths such as `user` become `/user`. Anything that could leave the site
/// (schemes, protocol-relative URLs, encoded variants of either) is rejected.
///
/// # Errors
///
/// Returns a [`RedirectError`] describing the first rule the path violates.
pub fn validate_internal_path(path: &str) -> Result<String, RedirectError> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(RedirectError::Empty);
    }
    if trimmed.len() > MAX_PATH_LENGTH {
        warn!("Excessively long redirect path: {} characters", trimmed.len());
        return Err(RedirectError::TooLong);
    }

    for variant in decoded_variants(trimmed) {
        check_patterns(trimmed, &variant)?;
    }

    let normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };

    // A leading slash on a relative path must not create a protocol-relative URL
    if normalized.starts_with("//") {
        warn!("Protocol-relative redirect rejected: {trimmed}");
        return Err(RedirectError::External);
    }

    debug!("Validated internal redirect path: {normalized}");
    Ok(normalized)
}

fn check_patterns(original: &str, candidate: &str) -> Result<(), RedirectError> {
    if PATH_TRAVERSAL_PATTERN.is_match(candidate) {
        warn!("Path traversal attempt in redirect: {original}");
        return Err(RedirectError::Traversal);
    }
    if PROTOCOL_PATTERN.is_match(candidate) {
        warn!("External redirect attempt: {original}");
        return Err(RedirectError::External);
    }
    if SUSPICIOUS_PATTERN.is_match(candidate) {
        warn!("Suspicious pattern in redirect: {original}");
        return Err(RedirectError::Suspicious);
    }
    let lower = candidate.to_lowercase();
    if DANGEROUS_PROTOCOLS.iter().any(|p| lower.contains(p)) {
        warn!("Dangerous protocol in redirect: {original}");
        return Err(RedirectError::External);
    }
    Ok(())
}

/// The path itself plus its single- and double-decoded forms, when decoding changes anything
fn decoded_variants(path: &str) -> Vec<String> {
    let mut variants = Vec::with_capacity(3);
    variants.push(path.to_string());

    if let Ok(decoded) = urlencoding::decode(path) {
        let decoded = decoded.into_owned();
        if decoded != path {
            if let Ok(double_decoded) = urlencoding::decode(&decoded) {
                let double_decoded = double_decoded.into_owned();
                if double_decoded != decoded {
                    variants.push(double_decoded);
                }
            }
            variants.push(decoded);
        }
    }

    variants
}
