//! Stackscrape: learn structural extraction rules from example values and replay them on similar pages.

pub mod builder;
pub mod engine;
pub mod matcher;
pub mod storage;
pub mod store;
pub mod text;
pub mod tree;
pub mod types;

pub use builder::{
    build, descriptor_id, AttributePolicy, BuildOptions, DEFAULT_FUZZY_THRESHOLD,
    DEFAULT_MAX_ANCESTOR_DEPTH,
};
pub use engine::StackScraper;
pub use matcher::{apply, apply_best, apply_exact, MatchOptions};
pub use storage::{RuleReader, RuleWriter};
pub use store::RuleStore;
pub use text::{normalize, similarity_ratio};
pub use tree::{Document, Element};
pub use types::*;
