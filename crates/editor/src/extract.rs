//! Carve relevant fragments out of a document for section-scoped AI edits.
//!
//! Reduces payload size by sending only the `:root` variable block and the
//! targeted sections instead of the whole page.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::classify::EditScope;

/// Minimized excerpt paired with the untouched full document. `context` is
/// always assembled from substrings of `full_doc`, never fabricated content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContext<'a> {
    pub context: String,
    pub full_doc: &'a str,
}

/// Map section ids to semantic tag equivalents so `<footer>`, `<header>`,
/// `<nav>` match even without an id attribute.
fn semantic_tags(id: &str) -> &'static [&'static str] {
    match id.to_lowercase().as_str() {
        "footer" => &["footer"],
        "header" => &["header"],
        "navbar" => &["nav", "header"],
        "nav" => &["nav"],
        "hero" => &["header"],
        _ => &[],
    }
}

static ROOT_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s):root\s*\{.*?\}").unwrap());

const CONTAINER_TAGS: [&str; 5] = ["section", "div", "header", "footer", "nav"];

/// Find the end (exclusive byte offset) of the element whose opening tag
/// starts at `open_start`, tracking nesting depth of same-named tags so a
/// `<nav>` inside a `<header>` does not truncate the header span.
fn balanced_element_end(doc: &str, open_start: usize, tag: &str) -> Option<usize> {
    let pattern = Regex::new(&format!(r"(?i)</?{}\b", regex::escape(tag))).ok()?;
    let mut depth: i32 = 0;
    for m in pattern.find_iter(&doc[open_start..]) {
        let at = open_start + m.start();
        if doc[at..].starts_with("</") {
            depth -= 1;
            if depth == 0 {
                let close = doc[at..].find('>')?;
                return Some(at + close + 1);
            }
        } else {
            depth += 1;
        }
    }
    None
}

/// Locate a full element span for `tag` carrying `id="..."`.
fn find_element_by_id<'a>(doc: &'a str, tag: &str, id: &str) -> Option<&'a str> {
    let open = Regex::new(&format!(
        r#"(?i)<{tag}[^>]*\sid=["']{id}["'][^>]*>"#,
        tag = regex::escape(tag),
        id = regex::escape(id),
    ))
    .ok()?;
    let m = open.find(doc)?;
    let end = balanced_element_end(doc, m.start(), tag)?;
    Some(&doc[m.start()..end])
}

/// Locate the first bare element span for `tag`, id attribute or not.
fn find_element_by_tag<'a>(doc: &'a str, tag: &str) -> Option<&'a str> {
    let open = Regex::new(&format!(
        r"(?i)<{tag}(\s[^>]*)?>",
        tag = regex::escape(tag)
    ))
    .ok()?;
    let m = open.find(doc)?;
    let end = balanced_element_end(doc, m.start(), tag)?;
    Some(&doc[m.start()..end])
}

/// Extract the `:root` block plus the requested sections from `doc`.
///
/// For `Color` scope with no requested sections the `:root` block alone is
/// enough. Any other combination needs at least one matched section fragment,
/// otherwise `None` signals the caller to fall back to the full document.
pub fn extract_sections<'a>(
    doc: &'a str,
    section_ids: &[String],
    scope: EditScope,
) -> Option<ExtractedContext<'a>> {
    let mut parts: Vec<String> = Vec::new();

    // :root always rides along; section edits may reference CSS variables.
    let root = ROOT_BLOCK.find(doc);
    if let Some(m) = root {
        parts.push(format!("/* :root variables */\n{}", m.as_str()));
    }

    let mut sections_matched = 0usize;
    for id in section_ids {
        let mut fragment: Option<String> = None;

        for tag in CONTAINER_TAGS {
            if let Some(el) = find_element_by_id(doc, tag, id) {
                fragment = Some(format!("\n/* Section: {id} */\n{el}"));
                break;
            }
        }

        if fragment.is_none() {
            for tag in semantic_tags(id) {
                if let Some(el) = find_element_by_tag(doc, tag) {
                    fragment = Some(format!("\n/* Section: {id} (matched <{tag}>) */\n{el}"));
                    break;
                }
            }
        }

        if let Some(f) = fragment {
            parts.push(f);
            sections_matched += 1;
        }
    }

    if scope == EditScope::Color && section_ids.is_empty() {
        return root.map(|_| ExtractedContext {
            context: parts.join("\n\n"),
            full_doc: doc,
        });
    }

    if sections_matched == 0 {
        return None;
    }

    Some(ExtractedContext {
        context: parts.join("\n\n"),
        full_doc: doc,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<!DOCTYPE html>
<html>
<head>
<style>
:root { --primary: #001B2E; --accent: #294C60; }
.card { padding: 1rem; }
</style>
</head>
<body>
<header class="site-header">
  <nav class="links"><a href="/">Home</a></nav>
</header>
<section id="services"><h2>Services</h2></section>
<div id="testimonials"><p>Great work!</p></div>
<footer><p>&copy; 2026</p></footer>
</body>
</html>"#;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn color_scope_without_sections_returns_root_only() {
        let ctx = extract_sections(DOC, &[], EditScope::Color).unwrap();
        assert!(ctx.context.contains(":root { --primary: #001B2E;"));
        assert!(!ctx.context.contains("<section"));
        assert_eq!(ctx.full_doc, DOC);
    }

    #[test]
    fn section_by_id_attribute() {
        let ctx = extract_sections(DOC, &ids(&["services"]), EditScope::Section).unwrap();
        assert!(ctx.context.contains("/* Section: services */"));
        assert!(
            ctx.context
                .contains("<section id=\"services\"><h2>Services</h2></section>")
        );
    }

    #[test]
    fn semantic_fallback_matches_bare_footer() {
        let ctx = extract_sections(DOC, &ids(&["footer"]), EditScope::Section).unwrap();
        assert!(ctx.context.contains("(matched <footer>)"));
        assert!(ctx.context.contains("<footer><p>&copy; 2026</p></footer>"));
    }

    #[test]
    fn hero_falls_back_to_header_with_balanced_span() {
        let ctx = extract_sections(DOC, &ids(&["hero"]), EditScope::Section).unwrap();
        // The header contains a nav; the captured span must run to the
        // header's own close tag, not stop at the nav's.
        assert!(ctx.context.contains("</header>"));
        assert!(ctx.context.contains("<nav class=\"links\">"));
    }

    #[test]
    fn nested_same_named_tags_capture_outer_element() {
        let doc = r#"<div id="wrap"><div class="inner"><p>x</p></div><span>tail</span></div>"#;
        let ctx = extract_sections(doc, &ids(&["wrap"]), EditScope::Section).unwrap();
        assert!(ctx.context.contains("<span>tail</span></div>"));
    }

    #[test]
    fn unmatched_section_returns_none() {
        assert!(extract_sections(DOC, &ids(&["pricing"]), EditScope::Section).is_none());
    }

    #[test]
    fn color_scope_with_unmatched_section_returns_none() {
        // Color plus a requested section still needs the section to match.
        assert!(extract_sections(DOC, &ids(&["pricing"]), EditScope::Color).is_none());
    }

    #[test]
    fn context_is_composed_of_document_substrings() {
        let ctx =
            extract_sections(DOC, &ids(&["services", "testimonials"]), EditScope::Section).unwrap();
        assert!(ctx.context.contains("<div id=\"testimonials\"><p>Great work!</p></div>"));
        // Apart from the inserted comment markers, every line must exist
        // verbatim in the source document.
        for line in ctx.context.lines() {
            if line.is_empty() || line.starts_with("/*") {
                continue;
            }
            assert!(DOC.contains(line), "fabricated line: {line}");
        }
    }

    #[test]
    fn document_without_root_and_no_match_yields_none() {
        assert!(extract_sections("<p>plain</p>", &[], EditScope::Color).is_none());
    }
}
