//! Replacing files without leaving them half written.

use std::{
    io,
    path::{Path, PathBuf},
};

/// `<file name>.bak` next to `path`.
#[must_use]
pub fn backup_path(path: &Path) -> PathBuf {
    sibling(path, ".bak")
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// The canonical parent directory joined with the file name.
///
/// Two spellings of one location resolve to the same value whether or not the file exists
/// yet. Falls back to `path` itself when the parent cannot be resolved.
#[must_use]
pub fn canonical_target(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (std::fs::canonicalize(parent), path.file_name()) {
        (Ok(parent), Some(name)) => parent.join(name),
        _ => path.to_path_buf(),
    }
}

/// Writes `bytes` to a sibling `.tmp` file and renames it over `path`, so readers see either
/// the old content or the new one.
///
/// # Errors
///
/// The first I/O error. The temporary file is removed when the rename fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let temp = sibling(path, ".tmp");
    std::fs::write(&temp, bytes)?;
    std::fs::rename(&temp, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&temp);
    })
}

/// [`write_atomic`], after copying an existing file to [`backup_path`].
///
/// A failed backup is logged and the write goes ahead.
///
/// # Errors
///
/// See [`write_atomic`].
pub fn replace_with_backup(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if path.exists() {
        let backup = backup_path(path);
        if let Err(err) = std::fs::copy(path, &backup) {
            log::warn!("could not back up {} to {}: {err}", path.display(), backup.display());
        }
    }
    write_atomic(path, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_and_backs_up() {
        let dir = std::env::temp_dir().join(format!("mania-rate-atomic-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("map.osu");

        replace_with_backup(&path, b"first").unwrap();
        assert!(!backup_path(&path).exists());
        replace_with_backup(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        assert_eq!(std::fs::read(backup_path(&path)).unwrap(), b"first");
        assert!(!dir.join("map.osu.tmp").exists());

        let detour = dir.join("..").join(dir.file_name().unwrap()).join("map.osu");
        assert_eq!(canonical_target(&detour), canonical_target(&path));
        assert_eq!(
            canonical_target(&dir.join("new.osu")),
            canonical_target(&dir).join("new.osu")
        );
    }
}
