//! Output renderers for run summaries, failures and live progress.

use std::fmt::Write as _;

use beaconforge_events::{Event, EventStream};
use beaconforge_runner::{FileFailure, RunError, RunResult};

pub(crate) fn render_summary(result: &RunResult) -> String {
    let mut out = String::new();
    for file in &result.finalized {
        let _ = writeln!(
            out,
            "finalized {} -> {}",
            file.source.display(),
            file.destination.display()
        );
    }
    out.push_str(&render_failures(&result.failures));
    let _ = write!(
        out,
        "{} finalized, {} failed",
        result.finalized.len(),
        result.failures.len()
    );
    out
}

pub(crate) fn render_failures(failures: &[FileFailure]) -> String {
    let mut out = String::new();
    for failure in failures {
        let _ = writeln!(
            out,
            "failed {} ({}): {}",
            failure.path.display(),
            failure.stage.as_str(),
            failure.error.detail()
        );
    }
    out
}

pub(crate) fn render_run_error(err: &RunError) -> String {
    let mut out = match err {
        RunError::EmptyInput => return "no input files".to_string(),
        RunError::Aborted { finalized, .. } if finalized.is_empty() => {
            "run aborted, no file was written\n".to_string()
        }
        RunError::Aborted { finalized, .. } => {
            let mut header = format!(
                "run aborted after {} file(s) were already written\n",
                finalized.len()
            );
            for path in finalized {
                let _ = writeln!(header, "written {}", path.display());
            }
            header
        }
        RunError::NoneSucceeded { .. } => "no file was finalized\n".to_string(),
    };
    out.push_str(&render_failures(err.failures()));
    out.trim_end().to_string()
}

/// One progress line per pipeline event.
pub(crate) fn render_event(event: &Event) -> String {
    match event {
        Event::RunStarted { run_id, files } => {
            format!("run {run_id}: {} file(s)", files.len())
        }
        Event::UploadStarted { path, .. } => format!("uploading {path}"),
        Event::Staged { path, bytes, .. } => format!("staged {path} ({bytes} bytes)"),
        Event::UploadFailed { path, message, .. } => format!("upload failed {path}: {message}"),
        Event::FinalizeStarted { path, .. } => format!("finalizing {path}"),
        Event::Finalized {
            path, destination, ..
        } => format!("finalized {path} -> {destination}"),
        Event::FinalizeFailed { path, message, .. } => {
            format!("finalize failed {path}: {message}")
        }
        Event::ArtifactDiscarded { path, .. } => format!("discarded staged output of {path}"),
        Event::RunCompleted {
            finalized, failed, ..
        } => format!("run completed: {finalized} finalized, {failed} failed"),
    }
}

/// Print progress to stderr until the run completes or the bus closes.
/// Returns the number of events printed.
pub(crate) async fn report_progress(mut stream: EventStream) -> usize {
    let mut printed = 0;
    while let Some(envelope) = stream.next().await {
        eprintln!("{}", render_event(&envelope.event));
        printed += 1;
        if matches!(envelope.event, Event::RunCompleted { .. }) {
            break;
        }
    }
    printed
}
