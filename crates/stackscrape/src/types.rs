//! Core data types for learned extraction rules and replay results.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One training target: a string the caller wants extracted from the sample page.
#[derive(Debug, Clone)]
pub struct WantedItem {
    pub text: String,
    /// Whether the builder may fall back to a similarity match when no
    /// element matches exactly.
    pub fuzzy: bool,
    /// Grouping label copied onto every descriptor this item produces.
    pub alias: String,
    /// When set, candidates must match this pattern in full instead of
    /// equalling `text`.
    pub pattern: Option<Regex>,
}

impl WantedItem {
    /// An exact-only target with no alias.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            fuzzy: false,
            alias: String::new(),
            pattern: None,
        }
    }

    /// A target that may be matched by similarity when no exact match exists.
    pub fn fuzzy(text: impl Into<String>) -> Self {
        Self {
            fuzzy: true,
            ..Self::new(text)
        }
    }

    /// A target matched by a regular expression that must cover the whole
    /// normalized candidate text.
    pub fn pattern(expr: &str) -> ScrapeResult<Self> {
        let anchored = Regex::new(&format!("^(?:{expr})$"))?;
        Ok(Self {
            pattern: Some(anchored),
            ..Self::new(expr)
        })
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    pub fn with_fuzzy(mut self, fuzzy: bool) -> Self {
        self.fuzzy = fuzzy;
        self
    }

    /// Whether `candidate` satisfies the pattern. Always false for plain items.
    pub fn pattern_matches(&self, candidate: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(candidate))
    }
}

impl From<&str> for WantedItem {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// What a descriptor extracts from a matched element.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum Target {
    /// The element's normalized text content.
    Text,
    /// The value of the named attribute.
    Attribute(String),
}

/// A learned structural rule ("stack") locating equivalent elements in other documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackDescriptor {
    /// Content-derived identity, the deduplication key.
    pub id: String,
    pub tag: String,
    /// Stable attribute subset; every entry must be present on a candidate.
    pub attributes: BTreeMap<String, String>,
    /// Ancestor tag names, nearest parent first. Empty when tag and
    /// fingerprint already resolve the training element.
    #[serde(default)]
    pub ancestors: Vec<String>,
    pub target: Target,
    /// Attribute values are resolved against the document's base URL.
    #[serde(default)]
    pub is_full_url: bool,
    /// Matched training text(s), kept for diagnostics.
    pub samples: Vec<String>,
    /// How many elements satisfied this rule in the training document.
    #[serde(default)]
    pub training_matches: usize,
    /// Occurrence index(es) of the training element(s) among those matches.
    #[serde(default)]
    pub positions: Vec<usize>,
    /// Index of the training element(s) among same-tag siblings under
    /// their parent.
    #[serde(default)]
    pub sibling_positions: Vec<usize>,
    #[serde(default)]
    pub is_fuzzy: bool,
    #[serde(default)]
    pub alias: String,
}

impl StackDescriptor {
    /// The wanted item this rule was first learned from.
    pub fn primary_sample(&self) -> &str {
        self.samples.first().map(String::as_str).unwrap_or_default()
    }

    /// Expected result cardinality, judged from the training document.
    pub fn cardinality(&self) -> Cardinality {
        if self.training_matches > 1 {
            Cardinality::Many
        } else {
            Cardinality::One
        }
    }

    /// Same rule under a different alias.
    pub fn with_alias(&self, alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            ..self.clone()
        }
    }
}

/// Training-time result cardinality of a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Cardinality {
    One,
    Many,
}

/// Replay output for a single descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct RuleMatches {
    pub rule_id: String,
    pub alias: String,
    /// Matching element indexes in document order.
    pub elements: Vec<usize>,
    /// Extracted values, parallel to `elements`.
    pub values: Vec<String>,
}

impl RuleMatches {
    /// Confidence count used for ranking.
    pub fn count(&self) -> usize {
        self.elements.len()
    }
}

/// Replay output for a whole rule set, in rule-set order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchResult {
    pub rules: Vec<RuleMatches>,
}

impl MatchResult {
    /// Matches for a given rule id.
    pub fn get(&self, rule_id: &str) -> Option<&RuleMatches> {
        self.rules.iter().find(|r| r.rule_id == rule_id)
    }

    /// True when no rule produced any value.
    pub fn is_empty(&self) -> bool {
        self.rules.iter().all(|r| r.values.is_empty())
    }

    /// All values in rule order, then document order.
    pub fn values(&self, unique: bool) -> Vec<String> {
        collect_values(self.rules.iter(), unique)
    }

    /// All values ordered by element position in the document; rule order
    /// breaks ties on the same element.
    pub fn values_in_document_order(&self, unique: bool) -> Vec<String> {
        let mut located: Vec<(usize, &String)> = self
            .rules
            .iter()
            .flat_map(|r| r.elements.iter().copied().zip(&r.values))
            .collect();
        located.sort_by_key(|(index, _)| *index);

        let mut out: Vec<String> = Vec::new();
        for (_, value) in located {
            if unique && out.contains(value) {
                continue;
            }
            out.push(value.clone());
        }
        out
    }

    /// Values keyed by rule id, rules without matches omitted.
    pub fn grouped_by_rule(&self, unique: bool) -> Vec<(String, Vec<String>)> {
        self.rules
            .iter()
            .filter(|r| !r.values.is_empty())
            .map(|r| (r.rule_id.clone(), collect_values(std::iter::once(r), unique)))
            .collect()
    }

    /// Values keyed by alias, in order of each alias's first rule.
    pub fn grouped_by_alias(&self, unique: bool) -> Vec<(String, Vec<String>)> {
        let mut aliases: Vec<&str> = Vec::new();
        for rule in &self.rules {
            if !rule.values.is_empty() && !aliases.contains(&rule.alias.as_str()) {
                aliases.push(&rule.alias);
            }
        }
        aliases
            .into_iter()
            .map(|alias| {
                let rules = self.rules.iter().filter(|r| r.alias == alias);
                (alias.to_string(), collect_values(rules, unique))
            })
            .collect()
    }
}

fn collect_values<'a>(rules: impl Iterator<Item = &'a RuleMatches>, unique: bool) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in rules.flat_map(|r| r.values.iter()) {
        if unique && out.contains(value) {
            continue;
        }
        out.push(value.clone());
    }
    out
}

/// The ranked extraction chosen by `apply_best`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BestMatch {
    pub values: Vec<String>,
    /// Winning descriptors in rule-set order.
    pub rule_ids: Vec<String>,
}

/// Errors that can occur while learning or replaying rules.
#[derive(thiserror::Error, Debug)]
pub enum ScrapeError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Convenience result type.
pub type ScrapeResult<T> = Result<T, ScrapeError>;
