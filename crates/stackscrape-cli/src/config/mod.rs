//! Configuration loading and resolution.

use std::path::PathBuf;

/// Environment variable naming the rules file.
pub const RULES_ENV: &str = "STACKSCRAPE_RULES";

/// Resolve the rules file path.
pub fn resolve_rules_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var(RULES_ENV) {
        if !env_path.is_empty() {
            return PathBuf::from(env_path);
        }
    }

    let cwd_rules = PathBuf::from(".stackscrape/rules.json");
    if cwd_rules.exists() {
        return cwd_rules;
    }

    resolve_default_rules_path()
}

fn resolve_default_rules_path() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    PathBuf::from(home).join(".stackscrape").join("rules.json")
}
