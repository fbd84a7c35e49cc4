//! Flattens fetched pages into whitespace-collapsed plain text.

use scraper::{ElementRef, Html, Node, Selector};

use crate::errors::StageError;

/// Elements whose text never reaches the reader.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "svg"];

/// Elements that start a new line of text when rendered.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "caption", "dd", "details", "div", "dl",
    "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
    "header", "hr", "li", "main", "nav", "ol", "option", "p", "pre", "section", "summary", "table",
    "td", "th", "title", "tr", "ul",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedText {
    pub text: String,
    pub truncated: bool,
}

impl NormalizedText {
    pub fn chars(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    max_chars: usize,
    min_chars: usize,
}

impl Normalizer {
    pub fn new(max_chars: usize, min_chars: usize) -> Self {
        Self {
            max_chars,
            min_chars,
        }
    }

    /// Strip markup from an HTML document and normalize what remains.
    pub fn normalize_html(&self, html: &str) -> NormalizedText {
        let document = Html::parse_document(html);
        let root = Selector::parse("body")
            .ok()
            .and_then(|sel| document.select(&sel).next())
            .unwrap_or_else(|| document.root_element());
        self.normalize_text(&visible_text(root))
    }

    /// Collapse whitespace runs, trim, and cap at the configured ceiling.
    pub fn normalize_text(&self, text: &str) -> NormalizedText {
        let collapsed = collapse_whitespace(text);
        match truncate_chars(&collapsed, self.max_chars) {
            Some(cut) => NormalizedText {
                text: cut.to_string(),
                truncated: true,
            },
            None => NormalizedText {
                text: collapsed,
                truncated: false,
            },
        }
    }

    /// Reject text too short to be a meaningful document.
    pub fn require_sufficient(
        &self,
        normalized: NormalizedText,
        stage: &'static str,
    ) -> Result<NormalizedText, StageError> {
        let chars = normalized.chars();
        if chars < self.min_chars {
            return Err(StageError::Insufficient {
                stage,
                chars,
                min: self.min_chars,
            });
        }
        Ok(normalized)
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Returns the first `max` chars when `text` is longer than that.
fn truncate_chars(text: &str, max: usize) -> Option<&str> {
    text.char_indices().nth(max).map(|(idx, _)| &text[..idx])
}

/// Text nodes inside one block are joined as-is so inline markup does not
/// split words from their punctuation; a block change or `<br>` inserts a
/// space.
fn visible_text(root: ElementRef<'_>) -> String {
    let mut out = String::new();
    let mut last_block = None;
    let mut line_break = false;

    for node in root.descendants() {
        match node.value() {
            Node::Element(el) if el.name() == "br" => line_break = true,
            Node::Text(text) => {
                let hidden = node.ancestors().any(|ancestor| {
                    matches!(ancestor.value(), Node::Element(el) if SKIPPED_ELEMENTS.contains(&el.name()))
                });
                if hidden {
                    continue;
                }
                let block = node
                    .ancestors()
                    .find(|ancestor| {
                        matches!(ancestor.value(), Node::Element(el) if BLOCK_ELEMENTS.contains(&el.name()))
                    })
                    .map(|ancestor| ancestor.id());
                if line_break || block != last_block {
                    out.push(' ');
                }
                out.push_str(text);
                last_block = block;
                line_break = false;
            }
            _ => {}
        }
    }
    out
}
