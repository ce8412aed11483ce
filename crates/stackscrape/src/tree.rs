//! Tree indexer: parses markup into an arena of elements in document pre-order.
//!
//! Parsing goes through `scraper` (html5ever), which recovers from malformed
//! markup the way browsers do. The resulting tree is flattened into a `Vec`
//! where an element's index is its pre-order position, children are listed by
//! index, and the parent link is a plain index. Descendants of element `i`
//! occupy the contiguous range `i + 1..end`.

use std::collections::BTreeMap;

use scraper::{Html, Node};

use crate::text::normalize;
use crate::types::{ScrapeError, ScrapeResult};

/// Elements whose text children never count as visible content.
const OPAQUE_TAGS: &[&str] = &["script", "style", "template"];

/// A node of the parsed tree.
#[derive(Debug, Clone)]
pub struct Element {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub children: Vec<usize>,
    pub parent: Option<usize>,
    /// Text of this element and all descendants, whitespace-collapsed.
    pub text: String,
    end: usize,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// An indexed document. Immutable once parsed.
#[derive(Debug, Clone, Default)]
pub struct Document {
    elements: Vec<Element>,
}

enum Part {
    Text(String),
    Child(usize),
}

impl Document {
    /// Parse markup. Malformed markup is recovered; only input that yields
    /// no element at all is rejected.
    pub fn parse(markup: &str) -> ScrapeResult<Self> {
        let html = Html::parse_document(markup);
        if !html.errors.is_empty() {
            tracing::debug!("recovered from {} markup errors", html.errors.len());
        }

        let root = html.root_element();
        let mut elements: Vec<Element> = Vec::new();
        let mut parts: Vec<Vec<Part>> = Vec::new();

        // (node, parent index, inside an opaque element)
        let mut stack = vec![(*root, None::<usize>, false)];
        while let Some((node, parent, opaque)) = stack.pop() {
            match node.value() {
                Node::Text(text) => {
                    if let (Some(p), false) = (parent, opaque) {
                        parts[p].push(Part::Text(text.to_string()));
                    }
                }
                Node::Element(el) => {
                    let index = elements.len();
                    let tag = el.name().to_string();
                    let opaque = opaque || OPAQUE_TAGS.contains(&tag.as_str());
                    elements.push(Element {
                        tag,
                        attributes: el
                            .attrs()
                            .map(|(k, v)| (k.to_string(), v.to_string()))
                            .collect(),
                        children: Vec::new(),
                        parent,
                        text: String::new(),
                        end: index + 1,
                    });
                    parts.push(Vec::new());
                    if let Some(p) = parent {
                        elements[p].children.push(index);
                        parts[p].push(Part::Child(index));
                    }
                    let children: Vec<_> = node.children().collect();
                    for child in children.into_iter().rev() {
                        stack.push((child, Some(index), opaque));
                    }
                }
                _ => {}
            }
        }

        if elements.is_empty() {
            return Err(ScrapeError::Parse("no element could be recovered".into()));
        }

        // Children always carry a higher index than their parent, so a reverse
        // sweep sees every child's text before the parent needs it.
        let mut raw: Vec<String> = vec![String::new(); elements.len()];
        for index in (0..elements.len()).rev() {
            let mut buf = String::new();
            for part in &parts[index] {
                match part {
                    Part::Text(t) => buf.push_str(t),
                    Part::Child(c) => buf.push_str(&raw[*c]),
                }
            }
            let end = elements[index]
                .children
                .last()
                .map(|&c| elements[c].end)
                .unwrap_or(index + 1);
            elements[index].end = end;
            elements[index].text = normalize(&buf, true);
            raw[index] = buf;
        }

        tracing::debug!("indexed {} elements", elements.len());
        Ok(Self { elements })
    }

    /// Parse raw bytes, which must be UTF-8.
    pub fn from_bytes(bytes: &[u8]) -> ScrapeResult<Self> {
        let markup = std::str::from_utf8(bytes)
            .map_err(|e| ScrapeError::Parse(format!("markup is not valid UTF-8: {e}")))?;
        Self::parse(markup)
    }

    /// Every element in pre-order, root first.
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn get(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    pub fn root(&self) -> Option<&Element> {
        self.elements.first()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Ancestor tag names of `index`, nearest parent first, at most `depth` of them.
    pub fn ancestor_tags(&self, index: usize, depth: usize) -> Vec<&str> {
        let mut tags = Vec::with_capacity(depth);
        let mut current = self.elements.get(index).and_then(|e| e.parent);
        while let Some(p) = current {
            if tags.len() == depth {
                break;
            }
            tags.push(self.elements[p].tag.as_str());
            current = self.elements[p].parent;
        }
        tags
    }

    /// Index of `index` among its parent's children that share its tag.
    pub fn sibling_position(&self, index: usize) -> usize {
        let Some(element) = self.elements.get(index) else {
            return 0;
        };
        let Some(parent) = element.parent else {
            return 0;
        };
        self.elements[parent]
            .children
            .iter()
            .take_while(|&&c| c != index)
            .filter(|&&c| self.elements[c].tag == element.tag)
            .count()
    }

    /// Whether `ancestor` is a proper ancestor of `index`.
    pub fn is_ancestor(&self, ancestor: usize, index: usize) -> bool {
        self.elements
            .get(ancestor)
            .map(|a| ancestor < index && index < a.end)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(doc: &Document) -> Vec<&str> {
        doc.elements().iter().map(|e| e.tag.as_str()).collect()
    }

    #[test]
    fn test_preorder_with_synthesized_skeleton() {
        let doc = Document::parse("<div><span id=\"x\">Alice</span><p>Hi</p></div>").unwrap();
        assert_eq!(tags(&doc), vec!["html", "head", "body", "div", "span", "p"]);
        assert_eq!(doc.root().unwrap().tag, "html");
        assert_eq!(doc.get(4).unwrap().attr("id"), Some("x"));
    }

    #[test]
    fn test_parent_and_children_links() {
        let doc = Document::parse("<ul><li>A</li><li>B</li></ul>").unwrap();
        let ul = doc.elements().iter().position(|e| e.tag == "ul").unwrap();
        let children = &doc.get(ul).unwrap().children;
        assert_eq!(children.len(), 2);
        for &c in children {
            assert_eq!(doc.get(c).unwrap().parent, Some(ul));
            assert!(doc.is_ancestor(ul, c));
            assert!(!doc.is_ancestor(c, ul));
        }
        assert!(doc.is_ancestor(0, ul));
        assert!(!doc.is_ancestor(children[0], children[1]));
    }

    #[test]
    fn test_text_is_recursive_and_collapsed() {
        let doc = Document::parse("<div>  Hello\n   <b>big</b>   world </div>").unwrap();
        let div = doc.elements().iter().find(|e| e.tag == "div").unwrap();
        assert_eq!(div.text, "Hello big world");
        let b = doc.elements().iter().find(|e| e.tag == "b").unwrap();
        assert_eq!(b.text, "big");
    }

    #[test]
    fn test_script_and_comments_excluded_from_text() {
        let html = "<div><script>var x = 1;</script><!-- note -->Real content<style>p{}</style></div>";
        let doc = Document::parse(html).unwrap();
        let div = doc.elements().iter().find(|e| e.tag == "div").unwrap();
        assert_eq!(div.text, "Real content");
    }

    #[test]
    fn test_ancestor_tags_bounded() {
        let doc = Document::parse("<section><div><p><a>x</a></p></div></section>").unwrap();
        let a = doc.elements().iter().position(|e| e.tag == "a").unwrap();
        assert_eq!(doc.ancestor_tags(a, 2), vec!["p", "div"]);
        assert_eq!(
            doc.ancestor_tags(a, 10),
            vec!["p", "div", "section", "body", "html"]
        );
        assert!(doc.ancestor_tags(0, 3).is_empty());
    }

    #[test]
    fn test_sibling_position_counts_same_tag_only() {
        let doc = Document::parse("<div><p>a</p><span>b</span><p>c</p></div>").unwrap();
        let find = |text: &str| doc.elements().iter().position(|e| e.text == text && e.tag != "div").unwrap();
        assert_eq!(doc.sibling_position(find("a")), 0);
        assert_eq!(doc.sibling_position(find("b")), 0);
        assert_eq!(doc.sibling_position(find("c")), 1);
        assert_eq!(doc.sibling_position(0), 0);
    }

    #[test]
    fn test_parse_is_deterministic() {
        let html = "<table><tr><td class='a'>1</td><td>2</td></tr></table><p>tail";
        let first = Document::parse(html).unwrap();
        let second = Document::parse(html).unwrap();
        let a: Vec<_> = first.elements().iter().map(|e| (&e.tag, &e.attributes, &e.text)).collect();
        let b: Vec<_> = second.elements().iter().map(|e| (&e.tag, &e.attributes, &e.text)).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_malformed_and_empty_markup_recover() {
        let doc = Document::parse("<div><p>Content<span>more</div>").unwrap();
        assert!(doc.elements().iter().any(|e| e.tag == "span" && e.text == "more"));

        let empty = Document::parse("").unwrap();
        assert_eq!(tags(&empty), vec!["html", "head", "body"]);
    }

    #[test]
    fn test_from_bytes_rejects_invalid_utf8() {
        let err = Document::from_bytes(&[0x3c, 0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, ScrapeError::Parse(_)));
        assert!(Document::from_bytes(b"<p>ok</p>").is_ok());
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let depth = 2000;
        let html = format!("{}deep{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let doc = Document::parse(&html).unwrap();
        assert!(doc.len() > 100);
    }
}
