//! Two-wave orchestration of a transform run.
//!
//! # Design
//! - Wave one uploads and stages every file concurrently; wave two commits
//!   the eligible subset. The waves never interleave.
//! - The failure policy is decided once, at the barrier between the waves.
//! - Every staged artifact is discarded before `run` returns; artifacts are
//!   also removed on drop, so an unwinding run leaves nothing behind.
//! - Files whose destinations coincide fail before upload; neither may
//!   silently overwrite the other.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};
use uuid::Uuid;

use beaconforge_config::{Configuration, FailurePolicy, TransformOptions};
use beaconforge_events::{Event, EventBus};

use crate::client::TransformClient;
use crate::error::{FailureStage, FileFailure, RunError, TaskError, TaskResult};
use crate::finalize;
use crate::staging::{self, StagedArtifact};

/// Lifecycle state of a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Not started.
    Pending,
    /// Upload in flight.
    Uploading,
    /// Response fully staged locally.
    Staged,
    /// Commit in flight.
    Finalizing,
    /// Destination written.
    Finalized,
    /// Upload or commit failed.
    Failed,
}

/// One file's journey through the pipeline.
#[derive(Debug)]
pub struct FileTask {
    source: PathBuf,
    state: TaskState,
    artifact: Option<StagedArtifact>,
    destination: Option<PathBuf>,
    failure: Option<(FailureStage, TaskError)>,
}

impl FileTask {
    fn new(source: PathBuf) -> Self {
        Self {
            source,
            state: TaskState::Pending,
            artifact: None,
            destination: None,
            failure: None,
        }
    }

    /// Source path as given in the input list.
    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    fn fail(&mut self, stage: FailureStage, error: TaskError) {
        self.state = TaskState::Failed;
        self.failure = Some((stage, error));
    }

    fn source_label(&self) -> String {
        self.source.display().to_string()
    }
}

/// A file whose transformed content reached its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedFile {
    /// Source path as given in the input list.
    pub source: PathBuf,
    /// Where the transformed content was written.
    pub destination: PathBuf,
}

/// Outcome of a run that was not escalated to an error.
#[derive(Debug)]
pub struct RunResult {
    /// Identifier shared by every event of the run.
    pub run_id: Uuid,
    /// Committed files, in input order.
    pub finalized: Vec<FinalizedFile>,
    /// Failed files, in input order; empty on full success.
    pub failures: Vec<FileFailure>,
}

impl RunResult {
    /// Whether every file was finalized.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Settings the runner needs from a resolved [`Configuration`].
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Forwarded to the transform client for every file.
    pub options: TransformOptions,
    /// Directory receiving results instead of overwriting sources.
    pub output_folder: Option<PathBuf>,
    /// Reaction to per-file failures.
    pub failure_policy: FailurePolicy,
    /// Directory for staged artifacts.
    pub temp_dir: PathBuf,
    /// Cap on simultaneous tasks per wave.
    pub max_concurrency: Option<usize>,
}

impl From<&Configuration> for RunnerSettings {
    fn from(config: &Configuration) -> Self {
        Self {
            options: config.options.clone(),
            output_folder: config.output_folder.clone(),
            failure_policy: config.failure_policy,
            temp_dir: config.temp_dir.clone().unwrap_or_else(env::temp_dir),
            max_concurrency: config.max_concurrency,
        }
    }
}

/// Drives the transform-and-replace pipeline over a file list.
pub struct Runner {
    client: Arc<dyn TransformClient>,
    events: EventBus,
    settings: RunnerSettings,
    limiter: Option<Semaphore>,
}

impl Runner {
    /// Construct a runner publishing progress to `events`.
    #[must_use]
    pub fn new(
        client: Arc<dyn TransformClient>,
        events: EventBus,
        settings: RunnerSettings,
    ) -> Self {
        let limiter = settings
            .max_concurrency
            .filter(|limit| *limit > 0)
            .map(Semaphore::new);
        Self {
            client,
            events,
            settings,
            limiter,
        }
    }

    /// Event bus the runner publishes to.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Transform every file in `files`.
    ///
    /// # Errors
    ///
    /// - [`RunError::EmptyInput`] when `files` is empty.
    /// - [`RunError::Aborted`] under the strict policy when any file fails.
    /// - [`RunError::NoneSucceeded`] when the policy requires at least one
    ///   finalized file and none was.
    pub async fn run(&self, files: &[PathBuf]) -> Result<RunResult, RunError> {
        if files.is_empty() {
            return Err(RunError::EmptyInput);
        }

        let run_id = Uuid::new_v4();
        let mut tasks: Vec<FileTask> = files.iter().cloned().map(FileTask::new).collect();
        info!(%run_id, files = ?files, "starting transform run");
        self.events.publish(Event::RunStarted {
            run_id,
            files: tasks.iter().map(FileTask::source_label).collect(),
        });

        self.reject_shared_destinations(run_id, &mut tasks);

        {
            let mut uploads: FuturesUnordered<_> = tasks
                .iter_mut()
                .filter(|task| task.state == TaskState::Pending)
                .map(|task| self.upload(run_id, task))
                .collect();
            while uploads.next().await.is_some() {}
        }

        let early_failures = tasks
            .iter()
            .filter(|task| task.state == TaskState::Failed)
            .count();
        if early_failures > 0 && !self.settings.failure_policy.continues_on_failure() {
            warn!(%run_id, failed = early_failures, "aborting run before any file is written");
            return Err(self.abort(run_id, tasks));
        }

        {
            let mut commits: FuturesUnordered<_> = tasks
                .iter_mut()
                .filter(|task| task.state == TaskState::Staged)
                .map(|task| self.finalize(run_id, task))
                .collect();
            while commits.next().await.is_some() {}
        }

        self.cleanup(run_id, &mut tasks);
        self.conclude(run_id, tasks)
    }

    fn reject_shared_destinations(&self, run_id: Uuid, tasks: &mut [FileTask]) {
        let output = self.settings.output_folder.as_deref();
        let mut claims: HashMap<PathBuf, usize> = HashMap::new();
        for task in tasks.iter() {
            if let Ok(destination) = finalize::resolve_destination(&task.source, output) {
                *claims.entry(destination).or_default() += 1;
            }
        }

        for task in tasks.iter_mut() {
            let Ok(destination) = finalize::resolve_destination(&task.source, output) else {
                continue;
            };
            if claims.get(&destination).copied().unwrap_or_default() < 2 {
                continue;
            }
            let error = TaskError::InvalidInput {
                field: "destination",
                reason: "shared with another input file",
                value: Some(destination.display().to_string()),
            };
            warn!(
                path = %task.source.display(),
                destination = %destination.display(),
                "destination collides with another input file"
            );
            self.events.publish(Event::FinalizeFailed {
                run_id,
                path: task.source_label(),
                message: error.detail(),
            });
            task.fail(FailureStage::Finalize, error);
        }
    }

    async fn upload(&self, run_id: Uuid, task: &mut FileTask) {
        let _permit = self.permit().await;
        task.state = TaskState::Uploading;
        self.events.publish(Event::UploadStarted {
            run_id,
            path: task.source_label(),
        });

        match self.upload_and_stage(&task.source).await {
            Ok(artifact) => {
                let bytes = artifact.len();
                info!(path = %task.source.display(), bytes, "staged transformed file");
                task.artifact = Some(artifact);
                task.state = TaskState::Staged;
                self.events.publish(Event::Staged {
                    run_id,
                    path: task.source_label(),
                    bytes,
                });
            }
            Err(error) => {
                warn!(path = %task.source.display(), error = %error.detail(), "upload failed");
                self.events.publish(Event::UploadFailed {
                    run_id,
                    path: task.source_label(),
                    message: error.detail(),
                });
                task.fail(FailureStage::Upload, error);
            }
        }
    }

    async fn upload_and_stage(&self, source: &Path) -> TaskResult<StagedArtifact> {
        let body = self.client.send(&self.settings.options, source).await?;
        staging::stage(source, body, &self.settings.temp_dir).await
    }

    async fn finalize(&self, run_id: Uuid, task: &mut FileTask) {
        let _permit = self.permit().await;
        let Some(artifact) = task.artifact.as_mut() else {
            return;
        };
        task.state = TaskState::Finalizing;
        self.events.publish(Event::FinalizeStarted {
            run_id,
            path: task.source.display().to_string(),
        });

        match finalize::commit(artifact, &task.source, self.settings.output_folder.as_deref())
            .await
        {
            Ok(destination) => {
                info!(
                    path = %task.source.display(),
                    destination = %destination.display(),
                    "finalized transformed file"
                );
                self.events.publish(Event::Finalized {
                    run_id,
                    path: task.source_label(),
                    destination: destination.display().to_string(),
                });
                task.destination = Some(destination);
                task.state = TaskState::Finalized;
            }
            Err(error) => {
                warn!(path = %task.source.display(), error = %error.detail(), "finalize failed");
                self.events.publish(Event::FinalizeFailed {
                    run_id,
                    path: task.source_label(),
                    message: error.detail(),
                });
                task.fail(FailureStage::Finalize, error);
            }
        }
    }

    async fn permit(&self) -> Option<SemaphorePermit<'_>> {
        match &self.limiter {
            Some(limiter) => limiter.acquire().await.ok(),
            None => None,
        }
    }

    fn abort(&self, run_id: Uuid, mut tasks: Vec<FileTask>) -> RunError {
        self.cleanup(run_id, &mut tasks);
        let (finalized, failures) = split_outcomes(tasks);
        self.publish_completed(run_id, finalized.len(), failures.len());
        RunError::Aborted {
            failures,
            finalized: finalized.into_iter().map(|file| file.destination).collect(),
        }
    }

    fn cleanup(&self, run_id: Uuid, tasks: &mut [FileTask]) {
        for task in tasks.iter_mut() {
            let Some(mut artifact) = task.artifact.take() else {
                continue;
            };
            match artifact.discard() {
                Ok(true) => {
                    debug!(path = %task.source.display(), "discarded staged artifact");
                    self.events.publish(Event::ArtifactDiscarded {
                        run_id,
                        path: task.source_label(),
                    });
                }
                Ok(false) => {}
                Err(error) => {
                    warn!(
                        path = %task.source.display(),
                        error = %error.detail(),
                        "failed to discard staged artifact"
                    );
                }
            }
        }
    }

    fn conclude(&self, run_id: Uuid, tasks: Vec<FileTask>) -> Result<RunResult, RunError> {
        let (finalized, failures) = split_outcomes(tasks);
        self.publish_completed(run_id, finalized.len(), failures.len());

        if failures.is_empty() {
            info!(%run_id, finalized = finalized.len(), "transform run completed");
            return Ok(RunResult {
                run_id,
                finalized,
                failures,
            });
        }

        match self.settings.failure_policy {
            FailurePolicy::Strict => Err(RunError::Aborted {
                failures,
                finalized: finalized.into_iter().map(|file| file.destination).collect(),
            }),
            FailurePolicy::ContinueUnlessAllFail if finalized.is_empty() => {
                Err(RunError::NoneSucceeded { failures })
            }
            FailurePolicy::Continue | FailurePolicy::ContinueUnlessAllFail => {
                warn!(
                    %run_id,
                    finalized = finalized.len(),
                    failed = failures.len(),
                    "transform run completed with failures"
                );
                Ok(RunResult {
                    run_id,
                    finalized,
                    failures,
                })
            }
        }
    }

    fn publish_completed(&self, run_id: Uuid, finalized: usize, failed: usize) {
        self.events.publish(Event::RunCompleted {
            run_id,
            finalized,
            failed,
        });
    }
}

fn split_outcomes(tasks: Vec<FileTask>) -> (Vec<FinalizedFile>, Vec<FileFailure>) {
    let mut finalized = Vec::new();
    let mut failures = Vec::new();
    for task in tasks {
        match (task.failure, task.destination) {
            (Some((stage, error)), _) => failures.push(FileFailure {
                path: task.source,
                stage,
                error,
            }),
            (None, Some(destination)) => finalized.push(FinalizedFile {
                source: task.source,
                destination,
            }),
            (None, None) => {}
        }
    }
    (finalized, failures)
}
