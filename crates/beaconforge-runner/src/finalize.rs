//! Destination resolution and commit of staged artifacts.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{TaskError, TaskResult};
use crate::staging::StagedArtifact;

/// Final location for `source`: `output_folder/<file name>` when an output
/// folder is configured, otherwise `source` itself.
///
/// # Errors
///
/// Returns [`TaskError::InvalidInput`] when an output folder is configured
/// and `source` has no file name.
pub fn resolve_destination(source: &Path, output_folder: Option<&Path>) -> TaskResult<PathBuf> {
    let Some(folder) = output_folder else {
        return Ok(source.to_path_buf());
    };
    let name = source.file_name().ok_or_else(|| TaskError::InvalidInput {
        field: "source",
        reason: "path has no file name",
        value: Some(source.display().to_string()),
    })?;
    Ok(folder.join(name))
}

/// Commit `artifact` for `source`.
///
/// Creates the output folder when needed, copies the source file's
/// permissions onto the artifact, then renames it over the destination. A
/// failure in any step leaves the destination untouched.
///
/// # Errors
///
/// Returns [`TaskError::Io`] tagged with the failing operation
/// (`finalize.create_output`, `finalize.stat`, `finalize.chmod`,
/// `finalize.rename`).
pub async fn commit(
    artifact: &mut StagedArtifact,
    source: &Path,
    output_folder: Option<&Path>,
) -> TaskResult<PathBuf> {
    let destination = resolve_destination(source, output_folder)?;
    if let Some(folder) = output_folder {
        tokio::fs::create_dir_all(folder)
            .await
            .map_err(|err| TaskError::io("finalize.create_output", folder, err))?;
    }

    let permissions = tokio::fs::metadata(source)
        .await
        .map_err(|err| TaskError::io("finalize.stat", source, err))?
        .permissions();
    artifact.set_permissions(permissions).await?;
    artifact.commit(&destination)?;

    debug!(source = %source.display(), destination = %destination.display(), "artifact committed");
    Ok(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ResponseStream;
    use crate::staging::stage;
    use anyhow::Result;
    use bytes::Bytes;
    use futures_util::stream;
    use std::fs;
    use tempfile::TempDir;

    async fn staged(temp: &Path, contents: &'static [u8]) -> Result<StagedArtifact> {
        let body: ResponseStream = Box::pin(stream::iter(vec![Ok(Bytes::from_static(contents))]));
        Ok(stage(Path::new("agent"), body, temp).await?)
    }

    #[test]
    fn destination_is_source_without_output_folder() -> Result<()> {
        let source = Path::new("/bins/a.bin");
        assert_eq!(resolve_destination(source, None)?, source);
        assert_eq!(
            resolve_destination(source, Some(Path::new("/tmp/out")))?,
            Path::new("/tmp/out/a.bin")
        );
        assert!(matches!(
            resolve_destination(Path::new("/"), Some(Path::new("/tmp/out"))),
            Err(TaskError::InvalidInput { field: "source", .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn commit_creates_nested_output_folder() -> Result<()> {
        let temp = TempDir::new()?;
        let work = TempDir::new()?;
        let source = work.path().join("a.bin");
        fs::write(&source, b"X")?;
        let output = work.path().join("out").join("nested");

        let mut artifact = staged(temp.path(), b"Y").await?;
        let destination = commit(&mut artifact, &source, Some(&output)).await?;

        assert_eq!(destination, output.join("a.bin"));
        assert_eq!(fs::read(&destination)?, b"Y");
        assert_eq!(fs::read(&source)?, b"X");
        Ok(())
    }

    #[tokio::test]
    async fn missing_source_stops_before_rename() -> Result<()> {
        let temp = TempDir::new()?;
        let work = TempDir::new()?;
        let source = work.path().join("gone.bin");

        let mut artifact = staged(temp.path(), b"Y").await?;
        let result = commit(&mut artifact, &source, None).await;

        assert!(matches!(
            result,
            Err(TaskError::Io {
                operation: "finalize.stat",
                ..
            })
        ));
        assert!(!source.exists());
        assert!(!artifact.is_committed());
        Ok(())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn commit_copies_source_mode() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new()?;
        let work = TempDir::new()?;
        let source = work.path().join("tool");
        fs::write(&source, b"old")?;
        fs::set_permissions(&source, fs::Permissions::from_mode(0o750))?;

        let mut artifact = staged(temp.path(), b"new").await?;
        commit(&mut artifact, &source, None).await?;

        let mode = fs::metadata(&source)?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o750);
        assert_eq!(fs::read(&source)?, b"new");
        Ok(())
    }
}
