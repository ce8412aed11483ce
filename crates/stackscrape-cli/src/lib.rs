//! Stackscrape CLI: learn extraction rules from a sample page and replay them on new pages.

pub mod config;
pub mod input;
pub mod output;

pub use config::resolve_rules_path;
pub use output::{describe_rule, render_result, GroupBy};
