//! JSON rule file reader/writer.
//!
//! Files hold `{"version": 1, "rules": [...]}`. A bare array of descriptors
//! is also accepted on read.

use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::store::RuleStore;
use crate::types::{ScrapeError, ScrapeResult, StackDescriptor};

/// Current format version.
const FORMAT_VERSION: u32 = 1;

/// Writer for rule files.
pub struct RuleWriter;

/// Reader for rule files.
pub struct RuleReader;

impl RuleWriter {
    /// Write a rule store to a file, creating parent directories as needed.
    pub fn write_to_file(store: &RuleStore, path: &Path) -> ScrapeResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::File::create(path)?;
        Self::write_to(store, &mut file)?;
        tracing::info!("saved {} rules to {}", store.len(), path.display());
        Ok(())
    }

    /// Write a rule store to any writer.
    pub fn write_to<W: Write>(store: &RuleStore, writer: &mut W) -> ScrapeResult<()> {
        let file = SerializedRules {
            version: FORMAT_VERSION,
            rules: store.all(),
        };
        serde_json::to_writer_pretty(&mut *writer, &file)
            .map_err(|e| ScrapeError::Storage(format!("Serialization failed: {e}")))?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

impl RuleReader {
    /// Read a rule store from a file.
    pub fn read_from_file(path: &Path) -> ScrapeResult<RuleStore> {
        let mut file = std::fs::File::open(path)?;
        let store = Self::read_from(&mut file)?;
        tracing::info!("loaded {} rules from {}", store.len(), path.display());
        Ok(store)
    }

    /// Read a rule store from any reader. Descriptors pass through
    /// `RuleStore::add`, so duplicate ids in the file are folded together.
    pub fn read_from<R: Read>(reader: &mut R) -> ScrapeResult<RuleStore> {
        let mut payload = Vec::new();
        reader.read_to_end(&mut payload)?;

        let parsed: DeserializedRules = serde_json::from_slice(&payload)
            .map_err(|e| ScrapeError::Storage(format!("Deserialization failed: {e}")))?;

        let rules = match parsed {
            DeserializedRules::Versioned { version, rules } => {
                if version != FORMAT_VERSION {
                    return Err(ScrapeError::Storage(format!(
                        "Unsupported version: {version}"
                    )));
                }
                rules
            }
            DeserializedRules::Bare(rules) => rules,
        };

        Ok(rules.into_iter().collect())
    }
}

#[derive(Serialize)]
struct SerializedRules<'a> {
    version: u32,
    rules: &'a [StackDescriptor],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DeserializedRules {
    Versioned {
        version: u32,
        rules: Vec<StackDescriptor>,
    },
    Bare(Vec<StackDescriptor>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Target;
    use std::collections::BTreeMap;

    fn make_test_rule(id: &str, alias: &str) -> StackDescriptor {
        StackDescriptor {
            id: id.to_string(),
            tag: "a".to_string(),
            attributes: BTreeMap::from([("class".to_string(), "title".to_string())]),
            ancestors: vec!["h2".to_string()],
            target: Target::Attribute("href".to_string()),
            is_full_url: true,
            samples: vec!["https://example.com/x".to_string()],
            training_matches: 3,
            positions: vec![1],
            sibling_positions: vec![1],
            is_fuzzy: false,
            alias: alias.to_string(),
        }
    }

    #[test]
    fn test_roundtrip_empty() {
        let store = RuleStore::new();
        let mut buf = Vec::new();
        RuleWriter::write_to(&store, &mut buf).unwrap();

        let loaded = RuleReader::read_from(&mut &buf[..]).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_roundtrip_preserves_order_and_fields() {
        let store: RuleStore = vec![make_test_rule("rule_b", "links"), make_test_rule("rule_a", "")]
            .into_iter()
            .collect();

        let mut buf = Vec::new();
        RuleWriter::write_to(&store, &mut buf).unwrap();

        let loaded = RuleReader::read_from(&mut &buf[..]).unwrap();
        assert_eq!(loaded, store);
        assert_eq!(loaded.ids().collect::<Vec<_>>(), vec!["rule_b", "rule_a"]);
    }

    #[test]
    fn test_bare_array_accepted() {
        let json = r#"[{"id":"rule_1","tag":"p","attributes":{},"target":{"type":"text"},"samples":["Hi"]}]"#;
        let loaded = RuleReader::read_from(&mut json.as_bytes()).unwrap();
        assert_eq!(loaded.len(), 1);
        let rule = loaded.get("rule_1").unwrap();
        assert_eq!(rule.target, Target::Text);
        assert!(rule.ancestors.is_empty());
        assert!(!rule.is_fuzzy);
    }

    #[test]
    fn test_duplicate_ids_fold_on_load() {
        let json = r#"{"version":1,"rules":[
            {"id":"rule_1","tag":"li","attributes":{},"target":{"type":"text"},"samples":["A"],"positions":[0]},
            {"id":"rule_1","tag":"li","attributes":{},"target":{"type":"text"},"samples":["B"],"positions":[1]}
        ]}"#;
        let loaded = RuleReader::read_from(&mut json.as_bytes()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("rule_1").unwrap().samples, vec!["A", "B"]);
    }

    #[test]
    fn test_invalid_payload() {
        let result = RuleReader::read_from(&mut "not json".as_bytes());
        assert!(matches!(result, Err(ScrapeError::Storage(_))));

        let result = RuleReader::read_from(&mut r#"{"version":9,"rules":[]}"#.as_bytes());
        assert!(matches!(result, Err(ScrapeError::Storage(_))));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rules.json");

        let store: RuleStore = vec![make_test_rule("rule_a", "")].into_iter().collect();
        RuleWriter::write_to_file(&store, &path).unwrap();
        let loaded = RuleReader::read_from_file(&path).unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = RuleReader::read_from_file(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(ScrapeError::Io(_))));
    }
}
