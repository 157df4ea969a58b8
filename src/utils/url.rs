// src/utils/url.rs

//! Canonical key normalization.

use url::Url;

/// Normalize a URL into the canonical key used for deduplication.
///
/// Lowercases the host, drops any fragment, and strips a single trailing
/// slash from non-root paths, so trivially different spellings of the same
/// item collapse to one key. Unparseable input falls back to the trimmed raw
/// string rather than failing: a source that emits odd identifiers still
/// deduplicates consistently against itself.
pub fn canonicalize(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            let out = parsed.to_string();
            if out.ends_with('/') && parsed.path() != "/" {
                out.trim_end_matches('/').to_string()
            } else {
                out
            }
        }
        Err(_) => raw.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_dropped() {
        assert_eq!(
            canonicalize("https://example.org/doc/1#section-2"),
            "https://example.org/doc/1"
        );
    }

    #[test]
    fn test_host_lowercased() {
        assert_eq!(
            canonicalize("https://EXAMPLE.org/Doc/1"),
            "https://example.org/Doc/1"
        );
    }

    #[test]
    fn test_trailing_slash_stripped() {
        assert_eq!(
            canonicalize("https://example.org/doc/1/"),
            "https://example.org/doc/1"
        );
        // Root path keeps its slash
        assert_eq!(canonicalize("https://example.org/"), "https://example.org/");
    }

    #[test]
    fn test_query_preserved() {
        assert_eq!(
            canonicalize("https://example.org/view?id=42"),
            "https://example.org/view?id=42"
        );
    }

    #[test]
    fn test_unparseable_input_trimmed() {
        assert_eq!(canonicalize("  not-a-url  "), "not-a-url");
    }

    #[test]
    fn test_equivalent_spellings_collapse() {
        let a = canonicalize("https://Example.org/doc/1/");
        let b = canonicalize("https://example.org/doc/1#top");
        assert_eq!(a, b);
    }
}
