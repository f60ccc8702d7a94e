#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Concurrent transform-and-replace pipeline.
//!
//! Layout: `client.rs` (transform service boundary), `staging.rs` (temp
//! artifacts), `finalize.rs` (destination resolution and commit),
//! `runner.rs` (two-wave orchestration), `error.rs` (error types).

pub mod client;
pub mod error;
pub mod finalize;
pub mod runner;
pub mod staging;

pub use client::{HttpTransformClient, ResponseStream, TransformClient};
pub use error::{
    BoxError, FailureKind, FailureStage, FileFailure, RunError, TaskError, TaskResult,
    TransformError,
};
pub use runner::{FileTask, FinalizedFile, RunResult, Runner, RunnerSettings, TaskState};
pub use staging::StagedArtifact;
