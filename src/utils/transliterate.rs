// Reduce arbitrary text to a filesystem-safe ASCII form for picture paths
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Transliterate `input` to ASCII, replacing anything outside `[A-Za-z0-9._-]` with `replacement`
///
/// Accented letters decompose to their base letter (`é` becomes `e`). The result is cut
/// to at most `max_len` characters.
#[must_use]
pub fn transliterate(input: &str, replacement: char, max_len: usize) -> String {
    input
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                replacement
            }
        })
        .take(max_len)
        .collect()
}

/// Transliterate each `/`-separated segment of a relative path, keeping the separators
///
/// Empty segments and `.`/`..` segments are dropped so the result always stays below its root.
#[must_use]
pub fn transliterate_path(path: &str, replacement: char, max_len: usize) -> String {
    let cleaned: Vec<String> = path
        .split('/')
        .map(|segment| transliterate(segment.trim(), replacement, max_len))
        .filter(|segment| !segment.is_empty() && segment != "." && segment != "..")
        .collect();
    cleaned.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accents_are_stripped() {
        assert_eq!(transliterate("Zoë Ångström", '_', 50), "Zoe_Angstrom");
    }

    #[test]
    fn test_unsafe_characters_replaced() {
        assert_eq!(transliterate("a:b*c?.jpg", '_', 50), "a_b_c_.jpg");
        assert_eq!(transliterate("日本", '_', 50), "__");
    }

    #[test]
    fn test_length_is_capped() {
        assert_eq!(transliterate(&"x".repeat(80), '_', 50).len(), 50);
    }

    #[test]
    fn test_path_segments_kept() {
        assert_eq!(
            transliterate_path("pictures/2024-05/Jösé", '_', 50),
            "pictures/2024-05/Jose"
        );
        assert_eq!(transliterate_path("/a//../b/./c/", '_', 50), "a/b/c");
    }
}
