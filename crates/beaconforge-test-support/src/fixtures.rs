//! Source-file fixtures and directory helpers.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Write `contents` to `dir/name` and return the path.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn source_file(dir: &Path, name: &str, contents: &[u8]) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, contents).with_context(|| format!("write fixture {}", path.display()))?;
    Ok(path)
}

/// Write a fixture and set its Unix permission bits.
///
/// # Errors
///
/// Returns an error if the file cannot be written or its mode changed.
#[cfg(unix)]
pub fn source_file_with_mode(
    dir: &Path,
    name: &str,
    contents: &[u8],
    mode: u32,
) -> Result<PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = source_file(dir, name, contents)?;
    fs::set_permissions(&path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("chmod fixture {}", path.display()))?;
    Ok(path)
}

/// Unix permission bits of `path`.
///
/// # Errors
///
/// Returns an error if `path` cannot be stat-ed.
#[cfg(unix)]
pub fn mode_of(path: &Path) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;

    Ok(fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))?
        .permissions()
        .mode()
        & 0o7777)
}

/// Sorted file names directly inside `dir`.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub fn dir_entries(dir: &Path) -> Result<Vec<String>> {
    let mut names = fs::read_dir(dir)
        .with_context(|| format!("read dir {}", dir.display()))?
        .map(|entry| -> Result<String> {
            Ok(entry?.file_name().to_string_lossy().into_owned())
        })
        .collect::<Result<Vec<_>>>()?;
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn dir_entries_lists_written_fixtures_sorted() -> Result<()> {
        let dir = TempDir::new()?;
        source_file(dir.path(), "b.bin", b"b")?;
        source_file(dir.path(), "a.bin", b"a")?;
        assert_eq!(dir_entries(dir.path())?, vec!["a.bin", "b.bin"]);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn mode_round_trips_through_fixture() -> Result<()> {
        let dir = TempDir::new()?;
        let path = source_file_with_mode(dir.path(), "tool", b"x", 0o751)?;
        assert_eq!(mode_of(&path)?, 0o751);
        Ok(())
    }
}
