//! # Design
//!
//! - Provide structured, constant-message errors for the transform pipeline.
//! - Capture operation context (paths, status, body) in fields, never in messages.
//! - Keep "the service said no" distinct from "the service could not be reached".

use std::error::Error as StdError;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Boxed error used for transport failures, independent of the HTTP stack.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors produced by a [`crate::TransformClient`].
#[derive(Debug, Error)]
pub enum TransformError {
    /// The service answered with a non-success status.
    #[error("transform service rejected the request")]
    Rejected {
        /// HTTP status code returned by the service.
        status: u16,
        /// Full response body text.
        body: String,
    },
    /// The service could not be reached or the response stream broke off.
    #[error("transform service unreachable")]
    Network {
        /// Underlying transport error.
        #[source]
        source: BoxError,
    },
    /// The source file could not be read for upload.
    #[error("transform upload io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl TransformError {
    /// Wrap a transport-level failure.
    pub fn network(source: impl Into<BoxError>) -> Self {
        Self::Network {
            source: source.into(),
        }
    }
}

/// Failure category for a single file, as reported to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Any answer other than `200 OK` from the service.
    ServiceRejection,
    /// Transport failure reaching the service.
    NetworkFailure,
    /// Local filesystem failure.
    LocalIo,
}

/// Errors attached to a single file's journey through the pipeline.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The transform request failed.
    #[error("transform request failed")]
    Transform {
        /// Underlying client error.
        #[from]
        source: TransformError,
    },
    /// IO failures while staging or committing.
    #[error("pipeline io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Input validation failures.
    #[error("pipeline invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
}

impl TaskError {
    pub(crate) fn io(operation: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Failure category of this error.
    #[must_use]
    pub const fn kind(&self) -> FailureKind {
        match self {
            Self::Transform {
                source: TransformError::Rejected { .. },
            } => FailureKind::ServiceRejection,
            Self::Transform {
                source: TransformError::Network { .. },
            } => FailureKind::NetworkFailure,
            Self::Transform {
                source: TransformError::Io { .. },
            }
            | Self::Io { .. }
            | Self::InvalidInput { .. } => FailureKind::LocalIo,
        }
    }

    /// One-line operator-facing description including field context.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Transform {
                source: TransformError::Rejected { status, body },
            } => format!("service rejected the file (status {status}): {}", body.trim()),
            Self::Transform {
                source: TransformError::Network { source },
            } => format!("service unreachable: {source}"),
            Self::Transform {
                source:
                    TransformError::Io {
                        operation,
                        path,
                        source,
                    },
            }
            | Self::Io {
                operation,
                path,
                source,
            } => format!("{operation} failed for {}: {source}", path.display()),
            Self::InvalidInput {
                field,
                reason,
                value,
            } => match value {
                Some(value) => format!("invalid {field} '{value}': {reason}"),
                None => format!("invalid {field}: {reason}"),
            },
        }
    }
}

/// Pipeline wave in which a file failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    /// Upload and staging wave.
    Upload,
    /// Finalize wave.
    Finalize,
}

impl FailureStage {
    /// Lowercase label used in logs and summaries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Finalize => "finalize",
        }
    }
}

/// A failed file together with the wave it failed in.
#[derive(Debug)]
pub struct FileFailure {
    /// Source path as given in the input list.
    pub path: PathBuf,
    /// Wave in which the failure happened.
    pub stage: FailureStage,
    /// The failure itself.
    pub error: TaskError,
}

/// Run-level failures.
#[derive(Debug, Error)]
pub enum RunError {
    /// The run was given no files.
    #[error("no input files")]
    EmptyInput,
    /// Strict policy: at least one file failed.
    #[error("run aborted after file failures")]
    Aborted {
        /// Every failed file, in input order.
        failures: Vec<FileFailure>,
        /// Files committed before the abort (finalize wave only).
        finalized: Vec<PathBuf>,
    },
    /// No file was finalized and the policy treats that as failure.
    #[error("no file was finalized")]
    NoneSucceeded {
        /// Every failed file, in input order.
        failures: Vec<FileFailure>,
    },
}

impl RunError {
    /// Per-file failures carried by this error.
    #[must_use]
    pub fn failures(&self) -> &[FileFailure] {
        match self {
            Self::EmptyInput => &[],
            Self::Aborted { failures, .. } | Self::NoneSucceeded { failures } => failures,
        }
    }
}

/// Result alias for per-file operations.
pub type TaskResult<T> = Result<T, TaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_separate_rejection_from_network() {
        let rejected = TaskError::from(TransformError::Rejected {
            status: 503,
            body: "overloaded\n".into(),
        });
        assert_eq!(rejected.kind(), FailureKind::ServiceRejection);
        assert_eq!(
            rejected.detail(),
            "service rejected the file (status 503): overloaded"
        );

        let network = TaskError::from(TransformError::network(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        assert_eq!(network.kind(), FailureKind::NetworkFailure);
        assert!(network.detail().contains("refused"));

        let local = TaskError::io(
            "finalize.rename",
            "/tmp/a.bin",
            io::Error::new(io::ErrorKind::CrossesDevices, "EXDEV"),
        );
        assert_eq!(local.kind(), FailureKind::LocalIo);
        assert_eq!(local.to_string(), "pipeline io failure");
        assert!(local.detail().starts_with("finalize.rename failed for /tmp/a.bin"));
    }

    #[test]
    fn run_error_exposes_failures() {
        let err = RunError::NoneSucceeded {
            failures: vec![FileFailure {
                path: PathBuf::from("a.bin"),
                stage: FailureStage::Upload,
                error: TaskError::InvalidInput {
                    field: "source",
                    reason: "missing file name",
                    value: None,
                },
            }],
        };
        assert_eq!(err.failures().len(), 1);
        assert_eq!(err.failures()[0].stage.as_str(), "upload");
        assert!(RunError::EmptyInput.failures().is_empty());
    }
}
