//! Audit orchestration: job state machine, module dispatch, reduction,
//! progress publishing and persistence
//!
//! One job flows through a single-writer pipeline: crawl, snapshot
//! extraction, automated checks, twelve concurrent LLM modules, the
//! reducer, final persistence. The [`service::AuditService`] façade is the
//! submission/polling surface an HTTP layer would mount.

pub mod dispatcher;
pub mod pipeline;
pub mod progress;
pub mod reducer;
pub mod registry;
pub mod service;
pub mod store;
pub mod validate;

pub use registry::JobRegistry;
pub use service::{AuditRequest, AuditService, JobStatusView};
pub use store::{AnalysisStore, InMemoryStore, StoreError};
