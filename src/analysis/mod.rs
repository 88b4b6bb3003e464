//! Post-run analysis of research reports.
//!
//! Submodules:
//! - [`keywords`]: tokenizer, keyword frequency counting, prominent terms
//! - [`sentiment`]: lexicon sentiment scoring
//! - [`trends`]: cross-run comparison against a task's history window
//! - [`digest`]: summary, key findings, and key changes extraction

pub mod digest;
pub mod keywords;
pub mod sentiment;
pub mod trends;

pub use digest::RunDigest;
pub use trends::{TrendAnalyzer, TrendOutcome};
