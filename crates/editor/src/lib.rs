//! Patch engine for the AI website editor.
//!
//! Everything in this crate operates on plain strings and is free of I/O:
//! a document goes in, a classification / extraction / parsed patch / patched
//! document comes out. The service layer wires these pieces to the model
//! provider and the usage store.

pub mod apply;
pub mod classify;
pub mod document;
pub mod extract;
pub mod parse;

pub use apply::{apply_css_block, apply_patch};
pub use classify::{Classification, EditScope, classify, is_color_request};
pub use document::assemble;
pub use extract::{ExtractedContext, extract_sections};
pub use parse::{ProposedPatch, extract_full_document, find_css_candidate, parse_patch, parse_reply};
