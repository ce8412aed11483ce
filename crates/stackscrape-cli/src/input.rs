//! Turning command-line arguments into library inputs.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context};
use stackscrape::{AttributePolicy, Document, WantedItem};
use url::Url;

/// Read and index a page from a file, or from stdin when `path` is `-`.
pub fn read_document(path: &str) -> anyhow::Result<Document> {
    let bytes = if path == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read page from stdin")?;
        buf
    } else {
        std::fs::read(Path::new(path)).with_context(|| format!("failed to read page {path}"))?
    };
    Ok(Document::from_bytes(&bytes)?)
}

/// Wanted items sharing one fuzziness setting and alias.
pub fn wanted_items(texts: &[String], fuzzy: bool, alias: Option<&str>) -> Vec<WantedItem> {
    texts
        .iter()
        .map(|t| {
            WantedItem::new(t.as_str())
                .with_fuzzy(fuzzy)
                .with_alias(alias.unwrap_or_default())
        })
        .collect()
}

/// Wanted items from `ALIAS=TEXT` pairs, each carrying its own alias.
pub fn aliased_items(pairs: &[String], fuzzy: bool) -> anyhow::Result<Vec<WantedItem>> {
    pairs
        .iter()
        .map(|pair| {
            let Some((alias, text)) = pair.split_once('=') else {
                bail!("expected ALIAS=TEXT, got {pair:?}");
            };
            Ok(WantedItem::new(text).with_fuzzy(fuzzy).with_alias(alias.trim()))
        })
        .collect()
}

/// Wanted items matched by regular expression.
pub fn pattern_items(patterns: &[String], alias: Option<&str>) -> anyhow::Result<Vec<WantedItem>> {
    patterns
        .iter()
        .map(|p| {
            let item = WantedItem::pattern(p).with_context(|| format!("invalid pattern {p:?}"))?;
            Ok(item.with_alias(alias.unwrap_or_default()))
        })
        .collect()
}

pub fn base_url(raw: Option<&str>) -> anyhow::Result<Option<Url>> {
    raw.map(|u| Url::parse(u).with_context(|| format!("invalid base URL {u}")))
        .transpose()
}

/// Parse `rule_id=alias` pairs.
pub fn alias_pairs(pairs: &[String]) -> anyhow::Result<HashMap<String, String>> {
    let mut aliases = HashMap::new();
    for pair in pairs {
        let Some((id, alias)) = pair.split_once('=') else {
            bail!("expected RULE_ID=ALIAS, got {pair:?}");
        };
        if id.trim().is_empty() {
            bail!("missing rule id in {pair:?}");
        }
        aliases.insert(id.trim().to_string(), alias.trim().to_string());
    }
    Ok(aliases)
}

/// Attribute policy from a list of keys; `None` keeps the default keys.
pub fn attribute_policy(keys: Option<&[String]>) -> AttributePolicy {
    match keys {
        Some(keys) => {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            AttributePolicy::keys(&keys)
        }
        None => AttributePolicy::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_pairs() {
        let pairs = vec!["rule_1=title".to_string(), "rule_2 = price ".to_string()];
        let aliases = alias_pairs(&pairs).unwrap();
        assert_eq!(aliases["rule_1"], "title");
        assert_eq!(aliases["rule_2"], "price");

        assert!(alias_pairs(&["no-separator".to_string()]).is_err());
        assert!(alias_pairs(&["=alias".to_string()]).is_err());
    }

    #[test]
    fn test_base_url() {
        assert!(base_url(None).unwrap().is_none());
        assert_eq!(
            base_url(Some("https://example.com/a")).unwrap().unwrap().as_str(),
            "https://example.com/a"
        );
        assert!(base_url(Some("not a url")).is_err());
    }

    #[test]
    fn test_aliased_items() {
        let items = aliased_items(
            &["title=Blue Kettle".to_string(), "price=$19.00".to_string()],
            false,
        )
        .unwrap();
        assert_eq!(items[0].alias, "title");
        assert_eq!(items[0].text, "Blue Kettle");
        assert_eq!(items[1].alias, "price");
        assert_eq!(items[1].text, "$19.00");

        // Only the first separator splits.
        let items = aliased_items(&["q=a=b".to_string()], true).unwrap();
        assert_eq!((items[0].alias.as_str(), items[0].text.as_str()), ("q", "a=b"));
        assert!(items[0].fuzzy);

        assert!(aliased_items(&["no separator".to_string()], false).is_err());
    }

    #[test]
    fn test_pattern_items() {
        let items = pattern_items(&[r"\d+ items".to_string()], Some("count")).unwrap();
        assert!(items[0].pattern_matches("12 items"));
        assert_eq!(items[0].alias, "count");
        assert!(pattern_items(&["(".to_string()], None).is_err());
    }

    #[test]
    fn test_wanted_items_share_settings() {
        let items = wanted_items(&["a".to_string(), "b".to_string()], true, Some("x"));
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.fuzzy && i.alias == "x"));
    }
}
