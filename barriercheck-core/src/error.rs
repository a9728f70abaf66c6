//! Error taxonomy for the audit pipeline
//!
//! Each variant carries a stable code that is surfaced to clients next to
//! the human-readable message.

use uuid::Uuid;

/// Top-level audit error taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    #[error("Illegal transition for job {job_id}: {from} -> {to}")]
    IllegalState {
        job_id: Uuid,
        from: &'static str,
        to: &'static str,
    },

    #[error("Root URL unreachable: {0}")]
    CrawlFatal(String),

    #[error("LLM transient failure: {0}")]
    LlmTransient(String),

    #[error("LLM permanent failure: {0}")]
    LlmPermanent(String),

    #[error("Model output was not valid JSON after repair: {0}")]
    ParseFailed(String),

    #[error("Only {completed} of {total} modules completed; at least {required} required")]
    InsufficientCoverage {
        completed: usize,
        total: usize,
        required: usize,
    },

    #[error("Job exceeded its wall-clock ceiling of {seconds}s")]
    Deadline { seconds: u64 },

    #[error("Job was cancelled")]
    Cancelled,

    #[error("Persistence transient failure: {0}")]
    PersistenceTransient(String),

    #[error("Missing required configuration: {0}")]
    ConfigMissing(String),
}

impl AuditError {
    /// Stable taxonomy code surfaced alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            AuditError::NotFound(_) => "NotFound",
            AuditError::IllegalState { .. } => "IllegalState",
            AuditError::CrawlFatal(_) => "CrawlFatal",
            AuditError::LlmTransient(_) => "LLMTransient",
            AuditError::LlmPermanent(_) => "LLMPermanent",
            AuditError::ParseFailed(_) => "ParseFailed",
            AuditError::InsufficientCoverage { .. } => "InsufficientCoverage",
            AuditError::Deadline { .. } => "Deadline",
            AuditError::Cancelled => "Cancelled",
            AuditError::PersistenceTransient(_) => "PersistenceTransient",
            AuditError::ConfigMissing(_) => "ConfigMissing",
        }
    }

    /// Short `Code: message` form written into the job's error column.
    pub fn user_message(&self) -> String {
        format!("{}: {}", self.code(), self)
    }

    /// Whether this error ends the whole job (as opposed to one module).
    pub fn is_job_fatal(&self) -> bool {
        matches!(
            self,
            AuditError::CrawlFatal(_)
                | AuditError::Deadline { .. }
                | AuditError::Cancelled
                | AuditError::InsufficientCoverage { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(AuditError::Cancelled.code(), "Cancelled");
        assert_eq!(
            AuditError::Deadline { seconds: 1800 }.code(),
            "Deadline"
        );
        assert_eq!(
            AuditError::InsufficientCoverage {
                completed: 5,
                total: 12,
                required: 6
            }
            .code(),
            "InsufficientCoverage"
        );
    }

    #[test]
    fn job_fatal_classification() {
        assert!(AuditError::CrawlFatal("dns".into()).is_job_fatal());
        assert!(AuditError::Cancelled.is_job_fatal());
        assert!(!AuditError::LlmPermanent("400".into()).is_job_fatal());
        assert!(!AuditError::ParseFailed("garbage".into()).is_job_fatal());
    }

    #[test]
    fn user_message_includes_code() {
        let msg = AuditError::CrawlFatal("dns failure".into()).user_message();
        assert!(msg.starts_with("CrawlFatal:"));
        assert!(msg.contains("dns failure"));
    }
}
