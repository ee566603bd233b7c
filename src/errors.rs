//! Typed error hierarchy for the Slipway orchestrator.
//!
//! Two top-level enums cover the two subsystems:
//! - `OrchestratorError` — request validation and resource failures
//! - `ProcessError` — external command execution failures

use thiserror::Error;

/// Errors surfaced synchronously to callers of the orchestrator.
///
/// Failures *inside* a running workflow (a clone/build/start command failing)
/// are not represented here: they are caught at the workflow level, appended
/// to the project log, and reflected in the project's `Error` state instead.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Project {name} already exists")]
    DuplicateName { name: String },

    #[error("Project {name} not found")]
    ProjectNotFound { name: String },

    #[error("No project matches repository {repo_url}")]
    RepoNotFound { repo_url: String },

    #[error("No free port within {window} candidates above {base}")]
    PortsExhausted { base: u16, window: u16 },

    #[error("Failed to delete project {name}: {source}")]
    DeleteFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from a single external command execution.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Exited with status {code}")]
    NonZeroExit { code: i32 },

    #[error("Command failed to start: {0}")]
    StartFailed(#[source] std::io::Error),

    #[error("Failed to wait on process: {0}")]
    Wait(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_name_carries_project_name() {
        let err = OrchestratorError::DuplicateName {
            name: "demo".to_string(),
        };
        match &err {
            OrchestratorError::DuplicateName { name } => assert_eq!(name, "demo"),
            _ => panic!("Expected DuplicateName"),
        }
        assert!(err.to_string().contains("demo"));
    }

    #[test]
    fn ports_exhausted_names_search_bounds() {
        let err = OrchestratorError::PortsExhausted {
            base: 4000,
            window: 10_000,
        };
        assert!(err.to_string().contains("4000"));
        assert!(err.to_string().contains("10000"));
    }

    #[test]
    fn process_error_non_zero_exit_matches_reference_text() {
        let err = ProcessError::NonZeroExit { code: 1 };
        assert_eq!(err.to_string(), "Exited with status 1");
    }

    #[test]
    fn process_error_start_failed_is_matchable() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "sh not found");
        let err = ProcessError::StartFailed(io_err);
        match &err {
            ProcessError::StartFailed(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            _ => panic!("Expected StartFailed"),
        }
    }

    #[test]
    fn orchestrator_error_converts_from_anyhow() {
        let inner = anyhow::anyhow!("deployments dir unwritable");
        let err: OrchestratorError = inner.into();
        assert!(matches!(err, OrchestratorError::Other(_)));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&OrchestratorError::ProjectNotFound {
            name: "x".to_string(),
        });
        assert_std_error(&ProcessError::NonZeroExit { code: 2 });
    }
}
