pub mod claude_api;
pub mod editor;
pub mod prompt;
pub mod usage;
