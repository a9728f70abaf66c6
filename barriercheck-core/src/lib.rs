//! Shared domain model, configuration and logging for the barriercheck
//! audit backend.
//!
//! Everything the other crates exchange (jobs, axes, module results,
//! reports, page snapshots) lives here, together with the layered
//! configuration loader and the tracing bootstrap.
//!
//! # Configuration
//!
//! Configuration is layered from files and the environment:
//!
//! ```bash
//! BARRIERCHECK__LLM__API_KEY=sk-...
//! BARRIERCHECK__STORE__DATABASE_URL=postgresql://...
//! ```
//!
//! # Logging
//!
//! ```rust,ignore
//! use barriercheck_core::init_tracing;
//!
//! init_tracing(&config.logging)?;
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::AuditError;
pub use logging::init_tracing;
