//! Extract a proposed change from the model's free-text reply.
//!
//! The model is asked for a labeled BEFORE/AFTER patch, but replies drift:
//! synonym labels, unlabeled code fences, a whole document, or a bare CSS
//! block. Each recognizer returns `None` so the caller can chain to the next
//! strategy.

use once_cell::sync::Lazy;
use regex::Regex;

/// One proposed change, in the parser's priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProposedPatch {
    /// Targeted replace of `before` with `after`.
    Replace { before: String, after: String },
    /// Whole-document replacement.
    FullDocument(String),
    /// Bare style-block replacement candidate.
    CssBlock(String),
}

static BEFORE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)BEFORE:\s*```\w*\s*(.*?)```").unwrap());
static AFTER_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)AFTER:\s*```\w*\s*(.*?)```").unwrap());
static OLD_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)(?:OLD|REPLACE):\s*```\w*\s*(.*?)```").unwrap());
static NEW_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)(?:NEW|WITH):\s*```\w*\s*(.*?)```").unwrap());
static ANY_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```\w*[ \t]*\n?(.*?)```").unwrap());

static HTML_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```html\s*(.*?)```").unwrap());
static DOCTYPE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```\w*\s*(.*?<!DOCTYPE.*?)```").unwrap());
static HTML_TAG_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```\w*\s*(.*?<html.*?)```").unwrap());
static BARE_DOCTYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<!DOCTYPE\s+html").unwrap());
static BARE_HTML_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<html[\s>]").unwrap());
static HTML_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</html>\s*").unwrap());

static CSS_RULE_LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*[.#:a-zA-Z][^{}\n]*\{").unwrap());

/// Parse a BEFORE/AFTER replace pair out of the reply.
///
/// Tries labeled `BEFORE:`/`AFTER:` fences first, then the `OLD|REPLACE` /
/// `NEW|WITH` synonyms, then the unlabeled heuristic: two leading code
/// blocks that both carry a `:root` marker and are non-trivially sized.
pub fn parse_patch(content: &str) -> Option<ProposedPatch> {
    if let (Some(b), Some(a)) = (BEFORE_BLOCK.captures(content), AFTER_BLOCK.captures(content)) {
        let before = b[1].trim().to_string();
        let after = a[1].trim().to_string();
        if !before.is_empty() {
            return Some(ProposedPatch::Replace { before, after });
        }
    }

    if let (Some(b), Some(a)) = (OLD_BLOCK.captures(content), NEW_BLOCK.captures(content)) {
        let before = b[1].trim().to_string();
        let after = a[1].trim().to_string();
        if !before.is_empty() {
            return Some(ProposedPatch::Replace { before, after });
        }
    }

    let blocks: Vec<&str> = ANY_BLOCK
        .captures_iter(content)
        .map(|c| c.get(1).map(|m| m.as_str().trim()).unwrap_or(""))
        .collect();
    if blocks.len() >= 2 {
        let (b1, b2) = (blocks[0], blocks[1]);
        if b1.contains(":root") && b2.contains(":root") && b1.len() > 20 && b2.len() > 20 {
            return Some(ProposedPatch::Replace {
                before: b1.to_string(),
                after: b2.to_string(),
            });
        }
    }

    None
}

/// Extract a complete HTML document from the reply, fenced or bare.
///
/// The "is this plausibly a full replacement" size guard is the caller's
/// responsibility; this only locates document-shaped text.
pub fn extract_full_document(content: &str) -> Option<String> {
    if let Some(c) = HTML_BLOCK.captures(content) {
        return Some(c[1].trim().to_string());
    }
    if let Some(c) = DOCTYPE_BLOCK.captures(content) {
        return Some(c[1].trim().to_string());
    }
    if let Some(c) = HTML_TAG_BLOCK.captures(content) {
        return Some(c[1].trim().to_string());
    }

    for start in [
        BARE_DOCTYPE.find(content).map(|m| m.start()),
        BARE_HTML_OPEN.find(content).map(|m| m.start()),
    ]
    .into_iter()
    .flatten()
    {
        let rest = &content[start..];
        return Some(match HTML_CLOSE.find(rest) {
            Some(end) => rest[..end.end()].trim().to_string(),
            None => rest.trim().to_string(),
        });
    }

    None
}

/// Last-resort recognizer: a fenced block that carries a `:root` marker or
/// looks like a CSS ruleset and is of meaningful size.
pub fn find_css_candidate(content: &str) -> Option<String> {
    for c in ANY_BLOCK.captures_iter(content) {
        let block = c.get(1)?.as_str().trim();
        if block.len() > 20 && (block.contains(":root") || CSS_RULE_LIKE.is_match(block)) {
            return Some(block.to_string());
        }
    }
    None
}

/// Run every recognizer and return the candidates in priority order. The
/// caller walks the list and stops at the first candidate that applies;
/// a reply can legitimately yield more than one (a replace pair whose
/// blocks also look like a CSS candidate).
pub fn parse_reply(content: &str) -> Vec<ProposedPatch> {
    let mut candidates = Vec::new();
    if let Some(patch) = parse_patch(content) {
        candidates.push(patch);
    }
    if let Some(doc) = extract_full_document(content) {
        candidates.push(ProposedPatch::FullDocument(doc));
    }
    if let Some(css) = find_css_candidate(content) {
        candidates.push(ProposedPatch::CssBlock(css));
    }
    candidates
}
