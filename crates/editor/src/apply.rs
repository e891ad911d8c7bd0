//! Locate and replace model-proposed fragments inside the current document.
//!
//! The model's transcription of "exact" source text is unreliable: trailing
//! whitespace drifts, indentation gets reflowed, CSS values get paraphrased.
//! Each strategy below trades a little precision for tolerance, and the
//! chain stops at the first success. Every function returns a new string or
//! `None`; the input document is never mutated.

use once_cell::sync::Lazy;
use regex::Regex;

static ROOT_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s):root\s*\{.*?\}").unwrap());
static CSS_RULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)([.#\w\s\-:\],()]+)\s*\{(.*?)\}").unwrap());

/// Normalize whitespace for flexible matching: trailing spaces stripped,
/// internal runs collapsed, blank lines dropped.
fn normalize_for_match(s: &str) -> String {
    s.lines()
        .map(|line| {
            let mut out = String::with_capacity(line.len());
            let mut in_run = false;
            for ch in line.trim_end().chars() {
                if ch.is_whitespace() {
                    if !in_run {
                        out.push(' ');
                    }
                    in_run = true;
                } else {
                    out.push(ch);
                    in_run = false;
                }
            }
            out
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Apply a patch by replacing `before` with `after` in `doc`.
///
/// Strategy order: exact match, right-trimmed match, whitespace-normalized
/// line-window match, then CSS-rule-by-selector replacement when both sides
/// look like rule blocks.
pub fn apply_patch(doc: &str, before: &str, after: &str) -> Option<String> {
    if doc.contains(before) {
        return Some(doc.replace(before, after));
    }

    let before_trimmed = before
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    if doc.contains(&before_trimmed) {
        return Some(doc.replace(&before_trimmed, after));
    }

    // Slide a window of the same line count over the document and compare
    // normalized forms; on a hit, replace the original un-normalized window.
    let before_norm = normalize_for_match(before);
    let window = before.lines().count().max(1);
    let doc_lines: Vec<&str> = doc.split('\n').collect();
    if doc_lines.len() >= window {
        for i in 0..=doc_lines.len() - window {
            let chunk = doc_lines[i..i + window].join("\n");
            if normalize_for_match(&chunk) == before_norm {
                return Some(doc.replacen(&chunk, after, 1));
            }
        }
    }

    if before.contains('{') && before.contains('}') && after.contains('{') {
        return apply_css_rules(doc, after);
    }

    None
}

/// Replace CSS rules in `doc` by selector. Used when the model's `before`
/// does not match the document text (e.g. it guessed `color: #333` but the
/// doc has `color: var(--color-text)`). Succeeds only if a rule changed.
pub fn apply_css_rules(doc: &str, css_block: &str) -> Option<String> {
    let mut result = doc.to_string();
    let mut changed = false;

    for cap in CSS_RULE.captures_iter(css_block) {
        let selector = cap[1].trim();
        if selector.len() <= 1 {
            continue;
        }
        let replacement = cap[0].trim_start().to_string();

        let pattern = Regex::new(&format!(
            r"(?s){}\s*\{{.*?\}}",
            regex::escape(selector)
        ))
        .ok()?;
        if let Some(m) = pattern.find(&result) {
            let existing = m.as_str().to_string();
            if existing != replacement {
                result = result.replacen(&existing, &replacement, 1);
                changed = true;
            }
        }
    }

    if changed { Some(result) } else { None }
}

/// Swap the document's `:root` variable block for one found in a bare CSS
/// candidate, falling back to selector-level rule replacement when the
/// candidate carries no `:root`.
pub fn apply_css_block(doc: &str, css_block: &str) -> Option<String> {
    if let (Some(doc_root), Some(new_root)) = (ROOT_BLOCK.find(doc), ROOT_BLOCK.find(css_block)) {
        return Some(doc.replacen(doc_root.as_str(), new_root.as_str(), 1));
    }
    apply_css_rules(doc, css_block)
}
