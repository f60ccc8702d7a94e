//! CLI error type distinguishing validation from operational failures.

use std::fmt::{self, Display, Formatter};

use anyhow::anyhow;
use beaconforge_config::ConfigError;
use beaconforge_runner::{RunError, TransformError};

use crate::output;

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        let message = match &err {
            ConfigError::InvalidField {
                field,
                value: Some(value),
                reason,
            } => format!("invalid {field} '{value}': {reason}"),
            ConfigError::InvalidField {
                field,
                value: None,
                reason,
            } => format!("invalid {field}: {reason}"),
            ConfigError::Io {
                operation,
                path,
                source,
            } => format!("{operation} failed for {}: {source}", path.display()),
            ConfigError::Parse { path, source } => {
                format!("failed to parse {}: {source}", path.display())
            }
        };
        Self::validation(message)
    }
}

impl From<TransformError> for CliError {
    fn from(err: TransformError) -> Self {
        Self::failure(anyhow::Error::new(err).context("failed to build transform client"))
    }
}

impl From<RunError> for CliError {
    fn from(err: RunError) -> Self {
        match &err {
            RunError::EmptyInput => Self::validation("at least one file is required"),
            RunError::Aborted { .. } | RunError::NoneSucceeded { .. } => {
                let report = output::render_run_error(&err);
                Self::failure(anyhow!(report))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beaconforge_runner::{FailureStage, FileFailure, TaskError};
    use std::path::PathBuf;

    #[test]
    fn config_errors_are_validation_failures() {
        let err = CliError::from(ConfigError::InvalidField {
            field: "upx_level",
            value: Some("11".into()),
            reason: "must be between 1 and 10",
        });
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.display_message(),
            "invalid upx_level '11': must be between 1 and 10"
        );
        assert_eq!(err.to_string(), "cli error");
    }

    #[test]
    fn aggregate_run_errors_list_each_file() {
        let err = CliError::from(RunError::Aborted {
            failures: vec![FileFailure {
                path: PathBuf::from("b.bin"),
                stage: FailureStage::Upload,
                error: TaskError::from(TransformError::Rejected {
                    status: 503,
                    body: "overloaded".into(),
                }),
            }],
            finalized: Vec::new(),
        });
        assert_eq!(err.exit_code(), 3);
        let message = err.display_message();
        assert!(message.contains("b.bin"));
        assert!(message.contains("overloaded"));
        assert!(message.contains("no file was written"));
    }

    #[test]
    fn empty_input_is_a_validation_failure() {
        assert_eq!(CliError::from(RunError::EmptyInput).exit_code(), 2);
    }
}
