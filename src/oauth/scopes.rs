// Permission scope handling for the authorization URL

/// Permissions every login asks for
pub const BASE_SCOPES: &[&str] = &["email", "public_profile"];

/// The permission without which a login cannot proceed
pub const REQUIRED_SCOPE: &str = "email";

/// Extension point for other components to adjust the requested scopes
///
/// Invoked once per authorization URL. Closures of the right shape implement it directly.
pub trait ScopeAugmenter: Send + Sync {
    fn augment(&self, scopes: Vec<String>) -> Vec<String>;
}

impl<F> ScopeAugmenter for F
where
    F: Fn(Vec<String>) -> Vec<String> + Send + Sync,
{
    fn augment(&self, scopes: Vec<String>) -> Vec<String> {
        self(scopes)
    }
}

/// Leaves the scope list untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScopeAugmenter;

impl ScopeAugmenter for NoopScopeAugmenter {
    fn augment(&self, scopes: Vec<String>) -> Vec<String> {
        scopes
    }
}

/// Split a comma or newline separated scope setting, dropping blanks and repeats
#[must_use]
pub fn parse_scope_list(raw: &str) -> Vec<String> {
    dedup_stable(
        raw.split([',', '\n'])
            .map(str::trim)
            .filter(|scope| !scope.is_empty())
            .map(str::to_string),
    )
}

/// Base scopes followed by `extra`, first occurrence wins
#[must_use]
pub fn merge_scopes(extra: &[String]) -> Vec<String> {
    dedup_stable(
        BASE_SCOPES
            .iter()
            .map(|scope| (*scope).to_string())
            .chain(extra.iter().cloned()),
    )
}

/// The final scope list for a standard authorization URL
#[must_use]
pub fn final_scopes(extra: &[String], augmenter: &dyn ScopeAugmenter) -> Vec<String> {
    dedup_stable(augmenter.augment(merge_scopes(extra)))
}

fn dedup_stable(scopes: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    for scope in scopes {
        let scope = scope.trim().to_string();
        if !scope.is_empty() && !result.contains(&scope) {
            result.push(scope);
        }
    }
    result
}
