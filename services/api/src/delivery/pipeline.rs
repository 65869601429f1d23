//! services/api/src/delivery/pipeline.rs
//!
//! Builds a fresh encrypted archive for one authorized download.

use marketplace_core::domain::{Dataset, Purchase};
use marketplace_core::ports::{PackagingError, Packager};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

use super::archive::TempArchive;

/// Everything needed to package a dataset for a purchaser.
#[derive(Clone)]
pub struct DeliveryPipeline {
    packager: Arc<dyn Packager>,
    dataset_root: PathBuf,
    temp_dir: PathBuf,
    timeout: Duration,
}

impl DeliveryPipeline {
    pub fn new(
        packager: Arc<dyn Packager>,
        dataset_root: PathBuf,
        temp_dir: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self {
            packager,
            dataset_root,
            temp_dir,
            timeout,
        }
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Resolves the canonical source file of a dataset.
    pub fn source_path(&self, dataset: &Dataset) -> Result<PathBuf, PackagingError> {
        let relative = match dataset.file_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Path::new(path.trim_start_matches('/')),
            _ => return Err(PackagingError::SourceMissing),
        };
        // Stored paths are relative to the dataset root and must stay inside it.
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            error!(file_path = %relative.display(), "Dataset file path escapes the dataset root");
            return Err(PackagingError::SourceMissing);
        }
        Ok(self.dataset_root.join(relative))
    }

    /// Packages `dataset` with the key of `purchase` into a new temp archive.
    ///
    /// On any failure the partially written archive (if any) is already removed
    /// when this returns.
    #[instrument(skip(self, dataset, purchase), fields(dataset_id = %dataset.id, slug = %dataset.slug))]
    pub async fn prepare(
        &self,
        dataset: &Dataset,
        purchase: &Purchase,
    ) -> Result<TempArchive, PackagingError> {
        let source = self.source_path(dataset)?;
        match tokio::fs::metadata(&source).await {
            Ok(meta) if meta.is_file() => {}
            _ => {
                error!(
                    source = %source.display(),
                    "Dataset source file is missing from storage"
                );
                return Err(PackagingError::SourceMissing);
            }
        }

        tokio::fs::create_dir_all(&self.temp_dir)
            .await
            .map_err(|e| PackagingError::ToolFailed(format!("temp directory unavailable: {}", e)))?;

        let archive = TempArchive::allocate(&self.temp_dir, &dataset.slug);
        let run = self
            .packager
            .package_encrypted(&source, &purchase.encryption_key, archive.path());

        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(PackagingError::Timeout(self.timeout)),
        }

        match tokio::fs::metadata(archive.path()).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                info!(bytes = meta.len(), "Encrypted archive ready");
                Ok(archive)
            }
            _ => Err(PackagingError::OutputMissing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use marketplace_core::domain::PurchaseStatus;
    use marketplace_core::generate_key;
    use marketplace_core::testing::{FakeBehaviour, FakePackager, FAKE_ARCHIVE_MAGIC};
    use uuid::Uuid;

    struct Fixture {
        _root: tempfile::TempDir,
        temp_dir: PathBuf,
        pipeline: DeliveryPipeline,
        packager: Arc<FakePackager>,
        dataset: Dataset,
        purchase: Purchase,
    }

    fn fixture(behaviour: FakeBehaviour, timeout: Duration) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let data_dir = root.path().join("data");
        let temp_dir = root.path().join("tmp");
        std::fs::create_dir_all(data_dir.join("finance")).unwrap();
        std::fs::write(data_dir.join("finance/global.csv"), b"date,close\n2025-04-01,101.2\n").unwrap();

        let packager = Arc::new(FakePackager::new(behaviour));
        let pipeline = DeliveryPipeline::new(packager.clone(), data_dir, temp_dir.clone(), timeout);
        let dataset = Dataset {
            id: Uuid::new_v4(),
            title: "Global Financial Markets - Q2 2025".to_string(),
            slug: "global-financial-markets-q2-2025".to_string(),
            description: String::new(),
            price: 299.99,
            file_path: Some("/finance/global.csv".to_string()),
        };
        let purchase = Purchase {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            dataset_id: dataset.id,
            amount: 299.99,
            encryption_key: generate_key().unwrap(),
            purchase_date: Utc::now(),
            status: PurchaseStatus::Completed,
        };
        Fixture {
            _root: root,
            temp_dir,
            pipeline,
            packager,
            dataset,
            purchase,
        }
    }

    fn temp_files(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn successful_run_leaves_exactly_one_archive() {
        let f = fixture(FakeBehaviour::Succeed, Duration::from_secs(5));

        let archive = f.pipeline.prepare(&f.dataset, &f.purchase).await.unwrap();

        let bytes = std::fs::read(archive.path()).unwrap();
        assert!(bytes.starts_with(FAKE_ARCHIVE_MAGIC));
        assert_eq!(temp_files(&f.temp_dir), 1);
        drop(archive);
        assert_eq!(temp_files(&f.temp_dir), 0);
    }

    #[tokio::test]
    async fn missing_source_fails_before_the_packager_runs() {
        let mut f = fixture(FakeBehaviour::Succeed, Duration::from_secs(5));
        f.dataset.file_path = Some("finance/deleted.csv".to_string());

        let err = f.pipeline.prepare(&f.dataset, &f.purchase).await.unwrap_err();

        assert!(matches!(err, PackagingError::SourceMissing));
        assert_eq!(f.packager.calls(), 0);
        assert_eq!(temp_files(&f.temp_dir), 0);
    }

    #[tokio::test]
    async fn dataset_without_file_path_is_source_missing() {
        let mut f = fixture(FakeBehaviour::Succeed, Duration::from_secs(5));
        f.dataset.file_path = None;

        let err = f.pipeline.prepare(&f.dataset, &f.purchase).await.unwrap_err();
        assert!(matches!(err, PackagingError::SourceMissing));
    }

    #[tokio::test]
    async fn file_paths_outside_the_dataset_root_are_refused() {
        let mut f = fixture(FakeBehaviour::Succeed, Duration::from_secs(5));
        f.dataset.file_path = Some("finance/../../secrets.csv".to_string());

        let err = f.pipeline.prepare(&f.dataset, &f.purchase).await.unwrap_err();
        assert!(matches!(err, PackagingError::SourceMissing));
        assert_eq!(f.packager.calls(), 0);
    }

    #[tokio::test]
    async fn tool_failure_removes_partial_output() {
        let f = fixture(
            FakeBehaviour::FailAfterPartialWrite("disk full".to_string()),
            Duration::from_secs(5),
        );

        let err = f.pipeline.prepare(&f.dataset, &f.purchase).await.unwrap_err();

        assert!(matches!(err, PackagingError::ToolFailed(msg) if msg == "disk full"));
        assert_eq!(temp_files(&f.temp_dir), 0);
    }

    #[tokio::test]
    async fn success_without_output_is_detected() {
        let f = fixture(FakeBehaviour::SkipOutput, Duration::from_secs(5));

        let err = f.pipeline.prepare(&f.dataset, &f.purchase).await.unwrap_err();
        assert!(matches!(err, PackagingError::OutputMissing));
    }

    #[tokio::test]
    async fn hung_tool_times_out() {
        let f = fixture(FakeBehaviour::Hang, Duration::from_millis(50));

        let err = f.pipeline.prepare(&f.dataset, &f.purchase).await.unwrap_err();

        assert!(matches!(err, PackagingError::Timeout(d) if d == Duration::from_millis(50)));
        assert_eq!(temp_files(&f.temp_dir), 0);
    }

    #[tokio::test]
    async fn every_download_repackages_from_source() {
        let f = fixture(FakeBehaviour::Succeed, Duration::from_secs(5));

        let first = f.pipeline.prepare(&f.dataset, &f.purchase).await.unwrap();
        let second = f.pipeline.prepare(&f.dataset, &f.purchase).await.unwrap();

        assert_eq!(f.packager.calls(), 2);
        assert_ne!(first.path(), second.path());
    }
}
