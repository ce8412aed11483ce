//! `StackScraper`: a rule store bundled with the learn and replay operations.

use std::collections::HashMap;
use std::path::Path;

use crate::builder::{self, BuildOptions};
use crate::matcher::{self, MatchOptions};
use crate::storage::{RuleReader, RuleWriter};
use crate::store::RuleStore;
use crate::tree::Document;
use crate::types::{BestMatch, MatchResult, ScrapeResult, WantedItem};

/// A learning session. Owns its rule store; nothing is shared between instances.
#[derive(Debug, Clone, Default)]
pub struct StackScraper {
    store: RuleStore,
}

impl StackScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: RuleStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn into_store(self) -> RuleStore {
        self.store
    }

    /// Learn rules for `wanted` from a training document.
    ///
    /// With `update` the new rules are merged into the existing store;
    /// otherwise they replace it. Returns the values the newly learned rules
    /// extract from the training document itself. The store is left untouched
    /// when the input is rejected.
    pub fn build(
        &mut self,
        doc: &Document,
        wanted: &[WantedItem],
        options: &BuildOptions,
        update: bool,
    ) -> ScrapeResult<Vec<String>> {
        let learned: RuleStore = builder::build(doc, wanted, options)?.into_iter().collect();

        let replay = MatchOptions {
            base_url: options.base_url.clone(),
            ..Default::default()
        };
        let values = matcher::apply(doc, &learned, &replay).values(true);

        if !update {
            self.store.clear();
        }
        let added = self.store.merge(&learned);
        tracing::info!("{} new rules, {} total", added, self.store.len());
        Ok(values)
    }

    /// Everything every rule matches.
    pub fn match_similar(&self, doc: &Document, options: &MatchOptions) -> MatchResult {
        matcher::apply(doc, &self.store, options)
    }

    /// Only the elements at each rule's training positions.
    pub fn match_exact(&self, doc: &Document, options: &MatchOptions) -> MatchResult {
        matcher::apply_exact(doc, &self.store, options)
    }

    pub fn get_result_similar(&self, doc: &Document, options: &MatchOptions) -> Vec<String> {
        options.flatten(&self.match_similar(doc, options))
    }

    pub fn get_result_exact(&self, doc: &Document, options: &MatchOptions) -> Vec<String> {
        options.flatten(&self.match_exact(doc, options))
    }

    /// Similar and exact results together.
    pub fn get_result(&self, doc: &Document, options: &MatchOptions) -> (Vec<String>, Vec<String>) {
        (
            self.get_result_similar(doc, options),
            self.get_result_exact(doc, options),
        )
    }

    /// Ranked extraction, one winning rule per slot.
    pub fn get_result_best(&self, doc: &Document, options: &MatchOptions) -> BestMatch {
        matcher::apply_best(doc, &self.store, options)
    }

    /// Drop the listed rules. Returns how many were removed.
    pub fn remove_rules(&mut self, ids: &[&str]) -> usize {
        let removed = self.store.retain(|d| !ids.contains(&d.id.as_str()));
        tracing::info!("removed {removed} rules");
        removed
    }

    /// Keep only the listed rules. Returns how many were removed.
    pub fn keep_rules(&mut self, ids: &[&str]) -> usize {
        let removed = self.store.retain(|d| ids.contains(&d.id.as_str()));
        tracing::info!("kept {} rules, removed {removed}", self.store.len());
        removed
    }

    /// Rebind aliases by rule id. Rules not listed keep their alias.
    pub fn set_rule_aliases(&mut self, aliases: &HashMap<String, String>) {
        self.store = self
            .store
            .all()
            .iter()
            .map(|d| match aliases.get(&d.id) {
                Some(alias) => d.with_alias(alias.as_str()),
                None => d.clone(),
            })
            .collect();
    }

    pub fn save(&self, path: &Path) -> ScrapeResult<()> {
        RuleWriter::write_to_file(&self.store, path)
    }

    pub fn load(path: &Path) -> ScrapeResult<Self> {
        Ok(Self::with_store(RuleReader::read_from_file(path)?))
    }
}
