//! Rule builder: turns wanted snippets on a training page into descriptors.
//!
//! For each wanted item the builder collects every element whose text (or an
//! attribute value) equals the item, falling back to a similarity match when
//! nothing matches exactly and the item allows it. Each hit becomes a
//! descriptor made of the tag, the stable attribute fingerprint, and the
//! shortest ancestor-tag chain that narrows the training matches as far as
//! any chain within the depth limit could.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use url::Url;

use crate::matcher::structure_matches;
use crate::store::RuleStore;
use crate::text::{fuzzy_matches, normalize};
use crate::tree::{Document, Element};
use crate::types::{ScrapeError, ScrapeResult, StackDescriptor, Target, WantedItem};

/// Default similarity cutoff for fuzzy matches.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.8;

/// Default bound on the ancestor chain recorded in a descriptor.
pub const DEFAULT_MAX_ANCESTOR_DEPTH: usize = 4;

/// Attribute keys fingerprinted by the default policy.
const DEFAULT_STABLE_KEYS: &[&str] = &["id", "class"];

/// Decides which attributes are stable enough to identify an element.
#[derive(Clone)]
pub struct AttributePolicy {
    accept: Arc<dyn Fn(&str, &str) -> bool + Send + Sync>,
}

impl AttributePolicy {
    /// A policy from an arbitrary `(name, value)` predicate.
    pub fn new(accept: impl Fn(&str, &str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            accept: Arc::new(accept),
        }
    }

    /// Accept only the listed keys, and only with a non-empty value.
    pub fn keys(keys: &[&str]) -> Self {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        Self::new(move |name, value| !value.trim().is_empty() && keys.iter().any(|k| k == name))
    }

    /// Fingerprint nothing; descriptors rely on tag and ancestry alone.
    pub fn none() -> Self {
        Self::new(|_, _| false)
    }

    pub fn accepts(&self, name: &str, value: &str) -> bool {
        (self.accept)(name, value)
    }

    /// The stable attribute subset of an element. Values are whitespace-collapsed.
    pub fn fingerprint(&self, element: &Element) -> BTreeMap<String, String> {
        element
            .attributes
            .iter()
            .filter(|(k, v)| self.accepts(k, v))
            .map(|(k, v)| (k.clone(), normalize(v, true)))
            .collect()
    }
}

impl Default for AttributePolicy {
    fn default() -> Self {
        Self::keys(DEFAULT_STABLE_KEYS)
    }
}

impl fmt::Debug for AttributePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributePolicy").finish_non_exhaustive()
    }
}

/// Knobs for a training run.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Minimum similarity ratio accepted by the fuzzy pass.
    pub fuzzy_threshold: f64,
    pub case_sensitive: bool,
    pub max_ancestor_depth: usize,
    /// Page location, used to recognise absolute forms of relative links.
    pub base_url: Option<Url>,
    pub policy: AttributePolicy,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            case_sensitive: true,
            max_ancestor_depth: DEFAULT_MAX_ANCESTOR_DEPTH,
            base_url: None,
            policy: AttributePolicy::default(),
        }
    }
}

/// An element that matched a wanted item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Hit {
    pub index: usize,
    pub target: Target,
    pub is_full_url: bool,
}

/// Learn descriptors for `wanted` from a training document.
///
/// Items that match nothing are skipped; the result holds whatever could be
/// derived, deduplicated by id in training order.
pub fn build(
    doc: &Document,
    wanted: &[WantedItem],
    options: &BuildOptions,
) -> ScrapeResult<Vec<StackDescriptor>> {
    if doc.is_empty() {
        return Err(ScrapeError::InvalidInput("document has no elements".into()));
    }
    if wanted.is_empty() {
        return Err(ScrapeError::InvalidInput("no wanted items given".into()));
    }
    if options.fuzzy_threshold.is_nan() || options.fuzzy_threshold < 0.0 {
        return Err(ScrapeError::InvalidInput(format!(
            "fuzzy threshold must be within 0.0..=1.0, got {}",
            options.fuzzy_threshold
        )));
    }

    let mut learned = RuleStore::new();
    for item in wanted {
        let needle = normalize(&item.text, options.case_sensitive);
        if needle.is_empty() {
            tracing::warn!("skipping blank wanted item");
            continue;
        }

        let (hits, fuzzy) = if item.pattern.is_some() {
            (find_hits_with(doc, options, |c| item.pattern_matches(c)), false)
        } else {
            let exact = find_hits(doc, &needle, 1.0, options);
            if exact.is_empty() && item.fuzzy && options.fuzzy_threshold < 1.0 {
                (find_hits(doc, &needle, options.fuzzy_threshold, options), true)
            } else {
                (exact, false)
            }
        };
        if hits.is_empty() {
            tracing::debug!("no element matched wanted item {:?}", item.text);
            continue;
        }

        for hit in &hits {
            learned.add(derive_descriptor(doc, hit, item, fuzzy, options));
        }
    }

    tracing::info!(
        "learned {} rules from {} wanted items",
        learned.len(),
        wanted.len()
    );
    Ok(learned.into_descriptors())
}

/// Elements matching `needle` at `threshold`, in document order.
pub(crate) fn find_hits(
    doc: &Document,
    needle: &str,
    threshold: f64,
    options: &BuildOptions,
) -> Vec<Hit> {
    find_hits_with(doc, options, |candidate| {
        fuzzy_matches(needle, &comparable(candidate, options.case_sensitive), threshold)
    })
}

/// Elements whose normalized text or attribute value satisfies `matches`.
///
/// Text hits keep only the innermost element: an element whose descendant
/// also matches is dropped, since every ancestor of a lone text node carries
/// the same text. Attribute values are checked on every element, so the hit
/// set can only shrink as a similarity threshold rises.
fn find_hits_with(
    doc: &Document,
    options: &BuildOptions,
    matches: impl Fn(&str) -> bool,
) -> Vec<Hit> {
    let text_hits: Vec<usize> = doc
        .elements()
        .iter()
        .enumerate()
        .filter(|(_, el)| !el.text.is_empty() && matches(&el.text))
        .map(|(i, _)| i)
        .collect();

    let mut hits: Vec<Hit> = Vec::new();
    for (n, &index) in text_hits.iter().enumerate() {
        let shadowed = text_hits
            .get(n + 1)
            .is_some_and(|&next| doc.is_ancestor(index, next));
        if !shadowed {
            hits.push(Hit {
                index,
                target: Target::Text,
                is_full_url: false,
            });
        }
    }

    for (index, el) in doc.elements().iter().enumerate() {
        for (name, value) in &el.attributes {
            let value = normalize(value, true);
            if value.is_empty() {
                continue;
            }
            if matches(&value) {
                hits.push(Hit {
                    index,
                    target: Target::Attribute(name.clone()),
                    is_full_url: false,
                });
            } else if let Some(full) = resolve(options.base_url.as_ref(), &value) {
                if full != value && matches(&full) {
                    hits.push(Hit {
                        index,
                        target: Target::Attribute(name.clone()),
                        is_full_url: true,
                    });
                }
            }
        }
    }

    hits.sort_by_key(|h| h.index);
    hits
}

/// Resolve an attribute value against a base URL.
pub(crate) fn resolve(base: Option<&Url>, value: &str) -> Option<String> {
    base?.join(value.trim()).ok().map(String::from)
}

fn comparable(text: &str, case_sensitive: bool) -> Cow<'_, str> {
    if case_sensitive {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.to_lowercase())
    }
}

fn derive_descriptor(
    doc: &Document,
    hit: &Hit,
    item: &WantedItem,
    is_fuzzy: bool,
    options: &BuildOptions,
) -> StackDescriptor {
    let element = &doc.elements()[hit.index];
    let attributes = options.policy.fingerprint(element);
    let chain = doc.ancestor_tags(hit.index, options.max_ancestor_depth);

    // Every element sharing tag and fingerprint, with how many of the hit's
    // ancestor tags it shares from the nearest parent outward.
    let peers: Vec<(usize, usize)> = doc
        .elements()
        .iter()
        .enumerate()
        .filter(|(_, el)| structure_matches(el, &element.tag, &attributes, &hit.target, 1.0))
        .map(|(i, _)| (i, shared_prefix(doc, i, &chain)))
        .collect();

    let matched_at = |depth: usize| peers.iter().filter(|(_, shared)| *shared >= depth).count();
    let floor = matched_at(chain.len());
    let mut depth = 0;
    while depth < chain.len() && matched_at(depth) > floor {
        depth += 1;
    }

    let matches: Vec<usize> = peers
        .iter()
        .filter(|(_, shared)| *shared >= depth)
        .map(|(i, _)| *i)
        .collect();
    let position = matches.iter().position(|&i| i == hit.index).unwrap_or(0);
    let ancestors: Vec<String> = chain[..depth].iter().map(|t| t.to_string()).collect();

    tracing::debug!(
        "rule for {:?}: <{}> depth {} matches {} training elements",
        item.text,
        element.tag,
        depth,
        matches.len()
    );

    StackDescriptor {
        id: descriptor_id(&element.tag, &attributes, &ancestors, &hit.target, hit.is_full_url),
        tag: element.tag.clone(),
        attributes,
        ancestors,
        target: hit.target.clone(),
        is_full_url: hit.is_full_url,
        samples: vec![item.text.clone()],
        training_matches: matches.len(),
        positions: vec![position],
        sibling_positions: vec![doc.sibling_position(hit.index)],
        is_fuzzy,
        alias: item.alias.clone(),
    }
}

fn shared_prefix(doc: &Document, index: usize, chain: &[&str]) -> usize {
    doc.ancestor_tags(index, chain.len())
        .iter()
        .zip(chain)
        .take_while(|(a, b)| a == b)
        .count()
}

/// Content-derived rule id. Identical structure always yields the same id.
pub fn descriptor_id(
    tag: &str,
    attributes: &BTreeMap<String, String>,
    ancestors: &[String],
    target: &Target,
    is_full_url: bool,
) -> String {
    let mut hasher = fnv::FnvHasher::default();
    tag.hash(&mut hasher);
    for (k, v) in attributes {
        k.hash(&mut hasher);
        v.hash(&mut hasher);
    }
    ancestors.hash(&mut hasher);
    target.hash(&mut hasher);
    is_full_url.hash(&mut hasher);
    format!("rule_{:016x}", hasher.finish())
}
