//! Pre-image backups
//!
//! Before a document is touched it is copied into a sibling `Backups/`
//! directory; a failed session copies the backup straight back over the
//! source.

use crate::error::{Error, Result};
use chrono::Local;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

/// Copy the source file into `<dir-of-source>/Backups/` and return the
/// backup path.
///
/// Backup names carry a millisecond timestamp that sorts lexicographically
/// in creation order: `<original-filename>.<timestamp>.bak`.
pub fn create_backup(source: &Path) -> Result<PathBuf> {
    if !source.is_file() {
        return Err(Error::Backup(format!(
            "source file not found: {}",
            source.display()
        )));
    }

    let parent = source
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let backup_dir = parent.join("Backups");
    fs::create_dir_all(&backup_dir)
        .map_err(|e| Error::Backup(format!("cannot create {}: {e}", backup_dir.display())))?;

    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| Error::Backup(format!("source has no file name: {}", source.display())))?;

    let timestamp = Local::now().format("%Y%m%d%H%M%S%3f");
    let mut backup = backup_dir.join(format!("{file_name}.{timestamp}.bak"));

    // Same-millisecond collisions get a numeric suffix
    let mut counter = 1;
    while backup.exists() {
        backup = backup_dir.join(format!("{file_name}.{timestamp}-{counter}.bak"));
        counter += 1;
    }

    fs::copy(source, &backup)
        .map_err(|e| Error::Backup(format!("cannot copy to {}: {e}", backup.display())))?;

    debug!("backed up {} to {}", source.display(), backup.display());
    Ok(backup)
}

/// Copy a backup back over the original file
pub fn restore_backup(backup: &Path, target: &Path) -> Result<()> {
    if !backup.is_file() {
        return Err(Error::Backup(format!(
            "backup file not found: {}",
            backup.display()
        )));
    }

    fs::copy(backup, target)
        .map_err(|e| Error::Backup(format!("cannot restore {}: {e}", target.display())))?;

    info!("restored {} from {}", target.display(), backup.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_and_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.docx");
        fs::write(&source, b"original bytes").unwrap();

        let backup = create_backup(&source).unwrap();
        assert!(backup.starts_with(dir.path().join("Backups")));
        assert!(backup
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("doc.docx."));
        assert!(backup.extension().unwrap() == "bak");

        // Corrupt the source, then restore
        fs::write(&source, b"mangled").unwrap();
        restore_backup(&backup, &source).unwrap();
        assert_eq!(fs::read(&source).unwrap(), b"original bytes");
    }

    #[test]
    fn test_backup_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.docx");
        let err = create_backup(&missing).unwrap_err();
        assert!(matches!(err, Error::Backup(_)));
    }

    #[test]
    fn test_backups_sort_in_creation_order() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("doc.docx");
        fs::write(&source, b"bytes").unwrap();

        let first = create_backup(&source).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = create_backup(&source).unwrap();

        let a = first.file_name().unwrap().to_string_lossy().to_string();
        let b = second.file_name().unwrap().to_string_lossy().to_string();
        assert!(a < b, "{a} should sort before {b}");
    }

    #[test]
    fn test_restore_missing_backup_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = restore_backup(&dir.path().join("none.bak"), &dir.path().join("doc.docx"))
            .unwrap_err();
        assert!(matches!(err, Error::Backup(_)));
    }
}
