// src/config.rs

//! Configuration loading and environment helpers.

use std::path::Path;

use crate::models::Config;

/// Environment flag gating real (non-dry-run) writes.
///
/// Read exactly once at process start; the resulting boolean is threaded into
/// the orchestrator so an in-flight run never changes behavior when the
/// environment is toggled.
pub const KILL_SWITCH_ENV: &str = "BACKFILL_ALLOW_WRITES";

/// Load configuration from a TOML file.
///
/// Falls back to defaults if loading fails.
pub fn load_config(path: &Path) -> Config {
    Config::load_or_default(path)
}

/// Whether the kill switch allows real writes in this process.
pub fn writes_enabled_from_env() -> bool {
    std::env::var(KILL_SWITCH_ENV)
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy("true"));
        assert!(is_truthy("YES"));
        assert!(is_truthy(" True "));
    }

    #[test]
    fn test_falsy_values() {
        assert!(!is_truthy(""));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy("enabled"));
    }
}
