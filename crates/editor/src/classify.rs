//! Classify user edit requests to determine scope and relevant sections.
//!
//! Scope drives payload minimization: section and color edits only send the
//! matching fragments to the model instead of the whole document.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;

/// Breadth of an edit request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EditScope {
    Color,
    Section,
    Full,
}

/// Result of classifying a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub scope: EditScope,
    pub section_ids: Vec<String>,
}

static STRUCTURAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(restructure|redesign|add\s*sections?|remove\s*sections?|full\s*page|entire\s*page)\b")
        .unwrap()
});

static COLOR_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(colors?|colours?|palettes?|navy|blue|green|red|orange|purple|teal|schemes?|themes?|hex)\b",
    )
    .unwrap()
});

static HEX_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#[0-9a-fA-F]{3,6}\b").unwrap());

/// Ordered section keyword table. Order determines section_ids order.
static SECTION_KEYWORDS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\b(testimonials?|reviews?|client\s*says?|ratings?)\b", "testimonials"),
        (r"(?i)\b(hero|banner|header\s*section)\b", "hero"),
        (r"(?i)\babout(\s*us)?\b", "about"),
        (r"(?i)\bservices?\b", "services"),
        (r"(?i)\b(contact|get\s*quote|quote\s*form)\b", "contact"),
        (r"(?i)\bfooter\b", "footer"),
        (r"(?i)\b(navbar|nav\s*bar|navigation)\b", "navbar"),
    ]
    .into_iter()
    .map(|(pattern, id)| (Regex::new(pattern).unwrap(), id))
    .collect()
});

/// Returns true if the prompt uses color vocabulary (words or a hex code).
/// The orchestrator also uses this to decide whether a failed edit earns the
/// one simplified fallback retry.
pub fn is_color_request(prompt: &str) -> bool {
    COLOR_WORDS.is_match(prompt) || HEX_CODE.is_match(prompt)
}

/// Classify a prompt into an edit scope plus matched section ids.
///
/// Structural requests (restructure, redesign, add/remove section, full or
/// entire page) always see the whole document, even when color vocabulary is
/// also present.
pub fn classify(prompt: &str) -> Classification {
    let lower = prompt.trim().to_lowercase();

    if STRUCTURAL.is_match(&lower) {
        return Classification {
            scope: EditScope::Full,
            section_ids: Vec::new(),
        };
    }

    let mut section_ids: Vec<String> = Vec::new();
    for (pattern, id) in SECTION_KEYWORDS.iter() {
        if pattern.is_match(&lower) && !section_ids.iter().any(|s| s == id) {
            section_ids.push((*id).to_string());
        }
    }

    if is_color_request(&lower) {
        return Classification {
            scope: EditScope::Color,
            section_ids,
        };
    }

    if !section_ids.is_empty() {
        return Classification {
            scope: EditScope::Section,
            section_ids,
        };
    }

    Classification {
        scope: EditScope::Full,
        section_ids: Vec::new(),
    }
}
