pub mod ai_usage;
