//! services/api/src/delivery/archive.rs
//!
//! The ephemeral archive: one uniquely named temp file per download request,
//! owned by that request and deleted exactly once.

use chrono::Utc;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// A temp-file path owned by a single download request.
///
/// The file is removed on the first call to [`TempArchive::cleanup`] or when the
/// value is dropped, whichever comes first.
#[derive(Debug)]
pub struct TempArchive {
    path: PathBuf,
    download_name: String,
    cleaned: bool,
}

impl TempArchive {
    /// Reserves a fresh path under `temp_dir` for the dataset `slug`.
    ///
    /// The on-disk name carries a random suffix so concurrent requests for the
    /// same dataset never share a path. Nothing is created on disk yet.
    pub fn allocate(temp_dir: &Path, slug: &str) -> Self {
        let slug = sanitize_slug(slug);
        let timestamp = Utc::now().timestamp_millis();
        let download_name = format!("{}-{}.zip", slug, timestamp);
        let file_name = format!("{}-{}-{}.zip", slug, timestamp, Uuid::new_v4().simple());
        Self {
            path: temp_dir.join(file_name),
            download_name,
            cleaned: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name offered to the client in `Content-Disposition`.
    pub fn download_name(&self) -> &str {
        &self.download_name
    }

    pub fn is_cleaned(&self) -> bool {
        self.cleaned
    }

    /// Deletes the file. Returns `false` if cleanup already ran.
    pub fn cleanup(&mut self) -> bool {
        if self.cleaned {
            return false;
        }
        self.cleaned = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Temp archive removed"),
            // Packaging may have failed before anything was written.
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove temp archive"
            ),
        }
        true
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Keeps slugs safe for both file names and the `Content-Disposition` header.
fn sanitize_slug(slug: &str) -> String {
    let cleaned: String = slug
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "dataset".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_slug_and_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let archive = TempArchive::allocate(dir.path(), "global-financial-markets-q2-2025");

        let name = archive.download_name();
        assert!(name.starts_with("global-financial-markets-q2-2025-"));
        assert!(name.ends_with(".zip"));
        assert_eq!(archive.path().parent(), Some(dir.path()));
    }

    #[test]
    fn concurrent_allocations_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let a = TempArchive::allocate(dir.path(), "energy-consumption-patterns");
        let b = TempArchive::allocate(dir.path(), "energy-consumption-patterns");
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn hostile_slugs_cannot_escape_the_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let archive = TempArchive::allocate(dir.path(), "../../etc/passwd\"");
        assert_eq!(archive.path().parent(), Some(dir.path()));
        assert!(!archive.download_name().contains('"'));
        assert!(!archive.download_name().contains('/'));
    }

    #[test]
    fn cleanup_runs_once_and_drop_is_a_no_op_afterwards() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = TempArchive::allocate(dir.path(), "retail");
        std::fs::write(archive.path(), b"zip").unwrap();
        let path = archive.path().to_path_buf();

        assert!(archive.cleanup());
        assert!(!path.exists());
        assert!(!archive.cleanup());
        assert!(archive.is_cleaned());
    }

    #[test]
    fn dropping_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let archive = TempArchive::allocate(dir.path(), "retail");
        std::fs::write(archive.path(), b"zip").unwrap();
        let path = archive.path().to_path_buf();

        drop(archive);
        assert!(!path.exists());
    }

    #[test]
    fn cleanup_of_a_never_written_file_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let mut archive = TempArchive::allocate(dir.path(), "retail");
        assert!(archive.cleanup());
    }
}
