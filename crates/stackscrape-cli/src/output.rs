//! Rendering results for stdout.

use clap::ValueEnum;
use serde_json::{json, Map, Value};
use stackscrape::{MatchOptions, MatchResult, StackDescriptor, Target};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GroupBy {
    Rule,
    Alias,
}

/// A flat JSON array of values, or an object keyed by rule id or alias.
pub fn render_result(result: &MatchResult, group_by: Option<GroupBy>, options: &MatchOptions) -> Value {
    let groups = match group_by {
        None => return json!(options.flatten(result)),
        Some(GroupBy::Rule) => result.grouped_by_rule(options.unique),
        Some(GroupBy::Alias) => result.grouped_by_alias(options.unique),
    };
    let mut object = Map::new();
    for (key, values) in groups {
        object.insert(key, json!(values));
    }
    Value::Object(object)
}

/// One line per rule for `rules list`.
pub fn describe_rule(rule: &StackDescriptor) -> String {
    let mut line = format!("{}  <{}", rule.id, rule.tag);
    for (key, value) in &rule.attributes {
        line.push_str(&format!(" {key}=\"{value}\""));
    }
    line.push('>');
    if !rule.ancestors.is_empty() {
        line.push_str(&format!(" in {}", rule.ancestors.join(" < ")));
    }
    if let Target::Attribute(name) = &rule.target {
        line.push_str(&format!(" @{name}"));
        if rule.is_full_url {
            line.push_str(" (url)");
        }
    }
    if rule.is_fuzzy {
        line.push_str(" fuzzy");
    }
    if !rule.alias.is_empty() {
        line.push_str(&format!(" alias={}", rule.alias));
    }
    line.push_str(&format!(" samples={:?}", rule.samples));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackscrape::RuleMatches;
    use std::collections::BTreeMap;

    fn result() -> MatchResult {
        MatchResult {
            rules: vec![
                RuleMatches {
                    rule_id: "rule_a".into(),
                    alias: "name".into(),
                    elements: vec![1, 2],
                    values: vec!["x".into(), "x".into()],
                },
                RuleMatches {
                    rule_id: "rule_b".into(),
                    alias: "name".into(),
                    elements: vec![5],
                    values: vec!["y".into()],
                },
            ],
        }
    }

    fn options(unique: bool, keep_order: bool) -> MatchOptions {
        MatchOptions {
            unique,
            keep_order,
            ..Default::default()
        }
    }

    #[test]
    fn test_render_flat_and_grouped() {
        let unique = options(true, false);
        assert_eq!(render_result(&result(), None, &unique), json!(["x", "y"]));
        assert_eq!(render_result(&result(), None, &options(false, false)), json!(["x", "x", "y"]));
        assert_eq!(
            render_result(&result(), Some(GroupBy::Rule), &unique),
            json!({"rule_a": ["x"], "rule_b": ["y"]})
        );
        assert_eq!(
            render_result(&result(), Some(GroupBy::Alias), &unique),
            json!({"name": ["x", "y"]})
        );
    }

    #[test]
    fn test_render_keep_order() {
        // rule_b's element sits between rule_a's two.
        let mut result = result();
        result.rules[0].values = vec!["x1".into(), "x2".into()];
        result.rules[1].elements = vec![2];
        result.rules[0].elements = vec![1, 3];
        assert_eq!(
            render_result(&result, None, &options(true, true)),
            json!(["x1", "y", "x2"])
        );
    }

    #[test]
    fn test_describe_rule() {
        let rule = StackDescriptor {
            id: "rule_1".into(),
            tag: "a".into(),
            attributes: BTreeMap::from([("class".to_string(), "title".to_string())]),
            ancestors: vec!["h3".into(), "div".into()],
            target: Target::Attribute("href".into()),
            is_full_url: true,
            samples: vec!["https://x.test/1".into()],
            training_matches: 2,
            positions: vec![0],
            sibling_positions: vec![0],
            is_fuzzy: false,
            alias: "link".into(),
        };
        assert_eq!(
            describe_rule(&rule),
            r#"rule_1  <a class="title"> in h3 < div @href (url) alias=link samples=["https://x.test/1"]"#
        );
    }
}
