//! Staging of service responses into local temp artifacts.
//!
//! A response is never trusted until every byte has landed in a fresh temp
//! file. The artifact deletes itself when dropped unless it was committed, so
//! failed or abandoned stages leave nothing behind.

use std::fs::Permissions;
use std::io;
use std::path::Path;

use futures_util::StreamExt;
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::client::ResponseStream;
use crate::error::{TaskError, TaskResult};

/// Local temp file holding a fully received service response.
#[derive(Debug)]
pub struct StagedArtifact {
    path: Option<TempPath>,
    len: u64,
}

impl StagedArtifact {
    /// Location of the artifact while it is still staged.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Number of bytes staged.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Whether the staged response was empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the artifact has already been moved to its destination.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        self.path.is_none()
    }

    /// Apply `permissions` to the staged file.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Io`] if the artifact was already committed or the
    /// permissions cannot be changed.
    pub async fn set_permissions(&self, permissions: Permissions) -> TaskResult<()> {
        let path = self.staged_path("finalize.chmod")?;
        tokio::fs::set_permissions(path, permissions)
            .await
            .map_err(|source| TaskError::io("finalize.chmod", path, source))
    }

    /// Rename the artifact onto `destination`, replacing whatever is there.
    ///
    /// On failure the artifact stays staged and will still be cleaned up.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Io`] for the `finalize.rename` operation when the
    /// rename fails, including when source and destination live on different
    /// filesystems.
    pub fn commit(&mut self, destination: &Path) -> TaskResult<()> {
        let Some(path) = self.path.take() else {
            return Err(already_committed("finalize.rename", destination));
        };
        match path.persist(destination) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.path = Some(err.path);
                Err(TaskError::io("finalize.rename", destination, err.error))
            }
        }
    }

    /// Delete the staged file. Returns `false` when there was nothing to
    /// delete because the artifact had already been committed.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::Io`] if the file exists but cannot be removed.
    pub fn discard(&mut self) -> TaskResult<bool> {
        let Some(path) = self.path.take() else {
            return Ok(false);
        };
        let display = path.to_path_buf();
        match path.close() {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(err) => Err(TaskError::io("cleanup.remove", display, err)),
        }
    }

    fn staged_path(&self, operation: &'static str) -> TaskResult<&Path> {
        self.path
            .as_deref()
            .ok_or_else(|| already_committed(operation, Path::new("")))
    }
}

fn already_committed(operation: &'static str, path: &Path) -> TaskError {
    TaskError::io(
        operation,
        path,
        io::Error::new(io::ErrorKind::NotFound, "artifact already committed"),
    )
}

/// Stream `body` into a new temp file in `temp_dir`, named after `source`.
///
/// # Errors
///
/// Returns the stream's [`TaskError::Transform`] error if the response breaks
/// off, or [`TaskError::Io`] when the temp file cannot be created or written.
/// The partial file is removed in both cases.
pub async fn stage(
    source: &Path,
    mut body: ResponseStream,
    temp_dir: &Path,
) -> TaskResult<StagedArtifact> {
    let prefix = source
        .file_name()
        .map_or_else(|| "artifact".to_string(), |name| name.to_string_lossy().into_owned());
    let (file, path) = tempfile::Builder::new()
        .prefix(&format!("{prefix}."))
        .suffix(".staged")
        .tempfile_in(temp_dir)
        .map_err(|err| TaskError::io("stage.create", temp_dir, err))?
        .into_parts();

    let mut writer = tokio::fs::File::from_std(file);
    let mut len: u64 = 0;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|err| TaskError::io("stage.write", &path, err))?;
        len = len.saturating_add(u64::try_from(chunk.len()).unwrap_or(u64::MAX));
    }
    writer
        .flush()
        .await
        .map_err(|err| TaskError::io("stage.flush", &path, err))?;
    writer
        .sync_all()
        .await
        .map_err(|err| TaskError::io("stage.sync", &path, err))?;
    drop(writer);

    debug!(source = %source.display(), staged = %path.display(), bytes = len, "response staged");
    Ok(StagedArtifact {
        path: Some(path),
        len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformError;
    use anyhow::Result;
    use bytes::Bytes;
    use futures_util::stream;
    use std::fs;
    use tempfile::TempDir;

    fn body(chunks: Vec<Result<Bytes, TransformError>>) -> ResponseStream {
        Box::pin(stream::iter(chunks))
    }

    fn entries(dir: &Path) -> Result<usize> {
        Ok(fs::read_dir(dir)?.count())
    }

    #[tokio::test]
    async fn stage_writes_all_chunks_and_commit_moves_file() -> Result<()> {
        let temp = TempDir::new()?;
        let out = TempDir::new()?;
        let source = Path::new("/bins/agent.exe");

        let mut artifact = stage(
            source,
            body(vec![Ok(Bytes::from_static(b"te")), Ok(Bytes::from_static(b"st"))]),
            temp.path(),
        )
        .await?;
        assert_eq!(artifact.len(), 4);
        let staged = artifact.path().map(Path::to_path_buf);
        let name = staged
            .as_ref()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        assert!(name.starts_with("agent.exe."));

        let destination = out.path().join("agent.exe");
        artifact.commit(&destination)?;
        assert!(artifact.is_committed());
        assert_eq!(fs::read(&destination)?, b"test");
        assert_eq!(entries(temp.path())?, 0);
        assert!(!artifact.discard()?);
        Ok(())
    }

    #[tokio::test]
    async fn broken_stream_leaves_no_partial_file() -> Result<()> {
        let temp = TempDir::new()?;
        let result = stage(
            Path::new("agent"),
            body(vec![
                Ok(Bytes::from_static(b"partial")),
                Err(TransformError::network(io::Error::new(
                    io::ErrorKind::ConnectionReset,
                    "reset",
                ))),
            ]),
            temp.path(),
        )
        .await;

        assert!(matches!(
            result,
            Err(TaskError::Transform {
                source: TransformError::Network { .. }
            })
        ));
        assert_eq!(entries(temp.path())?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn missing_temp_dir_is_a_create_failure() -> Result<()> {
        let temp = TempDir::new()?;
        let result = stage(
            Path::new("agent"),
            body(Vec::new()),
            &temp.path().join("absent"),
        )
        .await;
        assert!(matches!(
            result,
            Err(TaskError::Io {
                operation: "stage.create",
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn discard_and_drop_remove_staged_file() -> Result<()> {
        let temp = TempDir::new()?;
        let mut discarded = stage(Path::new("a"), body(Vec::new()), temp.path()).await?;
        assert!(discarded.is_empty());
        assert!(discarded.discard()?);

        let dropped = stage(Path::new("b"), body(Vec::new()), temp.path()).await?;
        assert_eq!(entries(temp.path())?, 1);
        drop(dropped);
        assert_eq!(entries(temp.path())?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn failed_commit_keeps_artifact_staged() -> Result<()> {
        let temp = TempDir::new()?;
        let mut artifact = stage(
            Path::new("a"),
            body(vec![Ok(Bytes::from_static(b"x"))]),
            temp.path(),
        )
        .await?;

        let err = artifact
            .commit(&temp.path().join("missing-dir").join("a"))
            .err();
        assert!(matches!(
            err,
            Some(TaskError::Io {
                operation: "finalize.rename",
                ..
            })
        ));
        assert!(!artifact.is_committed());
        assert!(artifact.discard()?);
        assert_eq!(entries(temp.path())?, 0);
        Ok(())
    }
}
