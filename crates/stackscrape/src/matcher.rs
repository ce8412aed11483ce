//! Rule matcher: replays stored descriptors against a freshly parsed document.

use std::collections::BTreeMap;

use url::Url;

use crate::builder::resolve;
use crate::store::RuleStore;
use crate::text::{fuzzy_matches, normalize};
use crate::tree::{Document, Element};
use crate::types::{BestMatch, Cardinality, MatchResult, RuleMatches, StackDescriptor, Target};

/// Knobs for a replay run.
#[derive(Debug, Clone)]
pub struct MatchOptions {
    /// Minimum similarity for each fingerprinted attribute value; 1.0 means equal.
    pub attr_fuzz_ratio: f64,
    /// Location of the replayed page, for rules that extract absolute URLs.
    pub base_url: Option<Url>,
    /// Keep matches whose extracted value is empty.
    pub keep_blank: bool,
    /// Drop repeated values from flattened results.
    pub unique: bool,
    /// Flatten values by document position instead of rule order.
    pub keep_order: bool,
    /// Return every same-tag sibling a rule matches. When false, only
    /// elements at the training elements' sibling positions are kept.
    pub contain_sibling_leaves: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            attr_fuzz_ratio: 1.0,
            base_url: None,
            keep_blank: false,
            unique: true,
            keep_order: false,
            contain_sibling_leaves: true,
        }
    }
}

impl MatchOptions {
    /// Flat value list shaped by `unique` and `keep_order`.
    pub fn flatten(&self, result: &MatchResult) -> Vec<String> {
        if self.keep_order {
            result.values_in_document_order(self.unique)
        } else {
            result.values(self.unique)
        }
    }
}

/// Whether an element has the descriptor's tag, carries every fingerprinted
/// attribute with an equal (or similar enough) value, and has the attribute
/// the descriptor extracts. Attributes not in the fingerprint are ignored.
pub(crate) fn structure_matches(
    element: &Element,
    tag: &str,
    attributes: &BTreeMap<String, String>,
    target: &Target,
    attr_fuzz_ratio: f64,
) -> bool {
    if element.tag != tag {
        return false;
    }
    if let Target::Attribute(name) = target {
        if !element.attributes.contains_key(name) {
            return false;
        }
    }
    attributes.iter().all(|(key, expected)| {
        element
            .attributes
            .get(key)
            .is_some_and(|actual| fuzzy_matches(expected, &normalize(actual, true), attr_fuzz_ratio))
    })
}

fn ancestors_match(doc: &Document, index: usize, ancestors: &[String]) -> bool {
    let actual = doc.ancestor_tags(index, ancestors.len());
    actual.len() == ancestors.len() && actual.iter().zip(ancestors).all(|(a, b)| a == b)
}

/// Indexes of every element satisfying `descriptor`, in document order.
pub fn candidates(doc: &Document, descriptor: &StackDescriptor, options: &MatchOptions) -> Vec<usize> {
    doc.elements()
        .iter()
        .enumerate()
        .filter(|(i, el)| {
            structure_matches(
                el,
                &descriptor.tag,
                &descriptor.attributes,
                &descriptor.target,
                options.attr_fuzz_ratio,
            ) && ancestors_match(doc, *i, &descriptor.ancestors)
                && (options.contain_sibling_leaves
                    || descriptor.sibling_positions.is_empty()
                    || descriptor.sibling_positions.contains(&doc.sibling_position(*i)))
        })
        .map(|(i, _)| i)
        .collect()
}

fn extract_value(element: &Element, descriptor: &StackDescriptor, options: &MatchOptions) -> String {
    match &descriptor.target {
        Target::Text => element.text.clone(),
        Target::Attribute(name) => {
            let raw = normalize(element.attr(name).unwrap_or_default(), true);
            if descriptor.is_full_url && options.base_url.is_some() {
                resolve(options.base_url.as_ref(), &raw).unwrap_or_else(|| {
                    tracing::warn!("{}: cannot resolve {raw:?} against base URL", descriptor.id);
                    raw
                })
            } else {
                raw
            }
        }
    }
}

fn collect(
    doc: &Document,
    descriptor: &StackDescriptor,
    indexes: Vec<usize>,
    options: &MatchOptions,
) -> RuleMatches {
    let mut elements = Vec::with_capacity(indexes.len());
    let mut values = Vec::with_capacity(indexes.len());
    for index in indexes {
        let value = extract_value(&doc.elements()[index], descriptor, options);
        if value.is_empty() && !options.keep_blank {
            continue;
        }
        elements.push(index);
        values.push(value);
    }
    RuleMatches {
        rule_id: descriptor.id.clone(),
        alias: descriptor.alias.clone(),
        elements,
        values,
    }
}

/// Every element matching every rule, grouped by rule in store order.
pub fn apply(doc: &Document, rules: &RuleStore, options: &MatchOptions) -> MatchResult {
    let result = MatchResult {
        rules: rules
            .all()
            .iter()
            .map(|d| collect(doc, d, candidates(doc, d, options), options))
            .collect(),
    };
    log_counts("similar", &result);
    result
}

/// Only the elements at each rule's training occurrence positions.
pub fn apply_exact(doc: &Document, rules: &RuleStore, options: &MatchOptions) -> MatchResult {
    let result = MatchResult {
        rules: rules
            .all()
            .iter()
            .map(|d| {
                let all = candidates(doc, d, options);
                let mut picked: Vec<usize> =
                    d.positions.iter().filter_map(|&p| all.get(p).copied()).collect();
                picked.sort_unstable();
                picked.dedup();
                collect(doc, d, picked, options)
            })
            .collect(),
    };
    log_counts("exact", &result);
    result
}

/// The best-supported extraction.
///
/// Rules compete within a slot: same alias, same originating wanted item, and
/// same training cardinality. Among a slot's rules with at least one match,
/// the winner is the first by (exact before fuzzy, replay count consistent
/// with the training cardinality, store order). Values of the winners are
/// returned in store order.
pub fn apply_best(doc: &Document, rules: &RuleStore, options: &MatchOptions) -> BestMatch {
    let result = apply(doc, rules, options);

    type Slot<'a> = (&'a str, &'a str, Cardinality);
    let mut winners: Vec<(Slot<'_>, (bool, bool, usize))> = Vec::new();
    for (order, (descriptor, matched)) in rules.all().iter().zip(&result.rules).enumerate() {
        if matched.count() == 0 {
            continue;
        }
        let slot = (
            descriptor.alias.as_str(),
            descriptor.primary_sample(),
            descriptor.cardinality(),
        );
        let inconsistent = match descriptor.cardinality() {
            Cardinality::One => matched.count() != 1,
            Cardinality::Many => matched.count() < 2,
        };
        let rank = (descriptor.is_fuzzy, inconsistent, order);
        match winners.iter_mut().find(|(s, _)| *s == slot) {
            Some(entry) if rank < entry.1 => entry.1 = rank,
            Some(_) => {}
            None => winners.push((slot, rank)),
        }
    }

    let mut chosen: Vec<usize> = winners.iter().map(|(_, (_, _, order))| *order).collect();
    chosen.sort_unstable();

    let selected = MatchResult {
        rules: chosen.iter().map(|&i| result.rules[i].clone()).collect(),
    };
    BestMatch {
        values: options.flatten(&selected),
        rule_ids: selected.rules.into_iter().map(|r| r.rule_id).collect(),
    }
}

fn log_counts(mode: &str, result: &MatchResult) {
    for rule in &result.rules {
        tracing::debug!("{mode} replay: {} matched {} elements", rule.rule_id, rule.count());
    }
}
