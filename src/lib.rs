//! Barriercheck: WCAG 2.1 conformance audit backend
//!
//! This is the composition crate. It wires configuration, the LLM
//! provider stack, the persistence adapter and the orchestrator into a
//! running service, and owns the background workers.

mod app;
pub mod workers;

pub use app::{create_app, AppHandle};
pub use barriercheck_core::{init_tracing, Config};

// Re-export for convenience
pub use barriercheck_core;
pub use barriercheck_crawl;
pub use barriercheck_llm;
pub use barriercheck_orchestrator;
