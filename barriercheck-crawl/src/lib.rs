//! Bounded crawling and page analysis for the audit pipeline
//!
//! Fetches a capped, same-origin set of pages starting at the submitted
//! root, extracts a structural snapshot of each page, derives the twelve
//! per-axis slices the LLM modules consume, and runs the cheap rule-based
//! accessibility checks that need no model at all.

pub mod checker;
pub mod crawler;
pub mod extractor;

pub use checker::run_checks;
pub use crawler::{CrawlError, Crawler, UrlPolicy};
pub use extractor::{extract_site_snapshot, PageFacts};
