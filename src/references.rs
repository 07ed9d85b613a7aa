//! Inline document and link references in assistant messages.
//!
//! The assistant cites sources with bracket markers: `[doc-(id)]` or
//! `[doc-id]` for a document chunk, `[docsum-…]` for a document summary and
//! `[link-…]` for an external URL. The parentheses are optional.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static REFERENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(doc|docsum|link)-\(?([^)\]]+)\)?\]").unwrap());

/// One reference marker found in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Doc(String),
    DocSummary(String),
    Link(String),
}

impl Reference {
    fn from_captures(caps: &Captures<'_>) -> Option<Self> {
        let value = caps.get(2)?.as_str().to_string();
        match caps.get(1)?.as_str() {
            "doc" => Some(Reference::Doc(value)),
            "docsum" => Some(Reference::DocSummary(value)),
            "link" => Some(Reference::Link(value)),
            _ => None,
        }
    }

    /// Chunk id for document references.
    pub fn chunk_id(&self) -> Option<&str> {
        match self {
            Reference::Doc(id) | Reference::DocSummary(id) => Some(id),
            Reference::Link(_) => None,
        }
    }

    /// HTML placeholder the chat renderer swaps for a rich component.
    pub fn placeholder(&self) -> String {
        match self {
            Reference::Doc(id) => {
                format!(r#"<span class="custom-doc-placeholder" data-id="{}"></span>"#, id)
            }
            Reference::DocSummary(id) => {
                format!(r#"<span class="custom-docsum-placeholder" data-id="{}"></span>"#, id)
            }
            Reference::Link(url) => {
                format!(r#"<span class="custom-link-placeholder" data-url="{}"></span>"#, url)
            }
        }
    }
}

/// All references in `text`, in order of appearance.
pub fn extract_references(text: &str) -> Vec<Reference> {
    REFERENCE_RE
        .captures_iter(text)
        .filter_map(|caps| Reference::from_captures(&caps))
        .collect()
}

/// Replace every reference marker with its HTML placeholder.
pub fn render_placeholders(text: &str) -> String {
    REFERENCE_RE
        .replace_all(text, |caps: &Captures<'_>| match Reference::from_captures(caps) {
            Some(reference) => reference.placeholder(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
