//! Layered `.env` loading and environment detection.
//!
//! Files are applied base-first so later files override earlier ones, while
//! variables already present in the process environment always win.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Application environment, detected from `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
    Test,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
            Environment::Test => "test",
        }
    }
}

/// Detect the current environment from `APP_ENV`.
///
/// `production`/`prod` and `staging`/`stage` are accepted as synonyms;
/// anything else maps to `Development`.
pub fn detect_environment() -> Environment {
    match std::env::var("APP_ENV").unwrap_or_default().to_lowercase().as_str() {
        "production" | "prod" => Environment::Production,
        "staging" | "stage" => Environment::Staging,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

/// Load `.env` files from `root` in priority order (lowest first):
/// `.env` → `.env.local` → `.env.<env>` → `.env.<env>.local`.
///
/// Uses non-overriding loads throughout, so an explicitly exported variable
/// beats every file, and each file beats the ones loaded before it only for
/// keys those earlier files did not set — matching the dotenv convention of
/// loading the highest-priority file last with `override = false` semantics
/// reversed: we load lowest-priority first and skip already-set keys.
pub fn load_env_files(root: &Path) {
    let env_name = detect_environment().as_str();

    // Highest priority first: with non-overriding loads, the first file to
    // set a key wins, so order is reversed relative to the write order.
    let files = [
        root.join(format!(".env.{env_name}.local")),
        root.join(format!(".env.{env_name}")),
        root.join(".env.local"),
        root.join(".env"),
    ];

    let mut loaded = Vec::new();
    for file in &files {
        if file.exists() {
            if let Err(e) = dotenvy::from_path(file) {
                tracing::warn!(file = %file.display(), error = %e, "failed to load env file");
            } else {
                loaded.push(file.display().to_string());
            }
        }
    }

    if !loaded.is_empty() {
        tracing::debug!(environment = env_name, files = ?loaded, "env files loaded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_environment_synonyms() {
        // Serialized via a lock-free single-threaded assumption: tests in this
        // module mutate APP_ENV and restore it.
        let prev = std::env::var("APP_ENV").ok();

        std::env::set_var("APP_ENV", "prod");
        assert_eq!(detect_environment(), Environment::Production);
        std::env::set_var("APP_ENV", "stage");
        assert_eq!(detect_environment(), Environment::Staging);
        std::env::set_var("APP_ENV", "test");
        assert_eq!(detect_environment(), Environment::Test);
        std::env::set_var("APP_ENV", "anything-else");
        assert_eq!(detect_environment(), Environment::Development);

        match prev {
            Some(v) => std::env::set_var("APP_ENV", v),
            None => std::env::remove_var("APP_ENV"),
        }
    }
}
