use std::path::{Path, PathBuf};

use serde::Serialize;
use taxi_store::models::{ImportMethod, TripStatistics};
use taxi_store::schema::PARQUET_EXTENSION;
use tracing::{debug, info, warn};

use crate::parsers::TripParquetReader;
use crate::store::{ImportSession, TripStore};

use super::{ControlError, TaxiControlPlane};

pub const DEFAULT_BATCH_SIZE: usize = 200_000;

/// Settings for an import run.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub batch_size: usize,
    pub method: ImportMethod,
    /// Read the first batch of each file and write nothing.
    pub dry_run: bool,
    pub recursive: bool,
    /// `None` and `Some(0)` both import every selected file.
    pub max_files: Option<usize>,
    /// Skip files whose name sorts before this one.
    pub start_with: Option<String>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            method: ImportMethod::default(),
            dry_run: false,
            recursive: true,
            max_files: None,
            start_with: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileImportOutcome {
    AlreadyImported,
    Locked,
    DryRun { rows: u64 },
    Imported { rows: u64 },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileImportReport {
    pub file_name: String,
    #[serde(flatten)]
    pub outcome: FileImportOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportRunReport {
    pub data_dir: String,
    pub files_found: usize,
    pub imported_files: usize,
    pub skipped_files: usize,
    pub failed_files: usize,
    pub rows_imported: u64,
    pub files: Vec<FileImportReport>,
    pub stats: TripStatistics,
}

impl<S: TripStore> TaxiControlPlane<S> {
    /// Imports every Parquet file under `dir`, one transaction per file.
    ///
    /// Files are processed in path order. A file that fails is rolled back and
    /// reported; the run continues with the next one.
    ///
    /// # Errors
    /// Returns `ControlError` if `dir` is not a directory, cannot be listed,
    /// or the final statistics query fails.
    pub async fn import_directory(
        &self,
        dir: &Path,
        options: &ImportOptions,
    ) -> Result<ImportRunReport, ControlError> {
        if !tokio::fs::metadata(dir)
            .await
            .is_ok_and(|metadata| metadata.is_dir())
        {
            return Err(ControlError::InvalidInput(format!(
                "data directory not found: {}",
                dir.display()
            )));
        }

        let files = select_files(discover_parquet_files(dir, options.recursive).await?, options);
        info!(
            data_dir = %dir.display(),
            files = files.len(),
            dry_run = options.dry_run,
            method = %options.method,
            "starting import run"
        );

        let mut report = ImportRunReport {
            data_dir: dir.display().to_string(),
            files_found: files.len(),
            imported_files: 0,
            skipped_files: 0,
            failed_files: 0,
            rows_imported: 0,
            files: Vec::with_capacity(files.len()),
            stats: TripStatistics::default(),
        };

        for path in files {
            let outcome = self.import_file(&path, options).await;
            match &outcome {
                FileImportOutcome::Imported { rows } => {
                    report.imported_files += 1;
                    report.rows_imported += rows;
                }
                FileImportOutcome::AlreadyImported | FileImportOutcome::Locked => {
                    report.skipped_files += 1;
                }
                FileImportOutcome::Failed { .. } => report.failed_files += 1,
                FileImportOutcome::DryRun { .. } => {}
            }
            report.files.push(FileImportReport {
                file_name: file_name_of(&path),
                outcome,
            });
        }

        report.stats = self.store.statistics().await?;
        info!(
            imported = report.imported_files,
            skipped = report.skipped_files,
            failed = report.failed_files,
            rows = report.rows_imported,
            "import run finished"
        );
        Ok(report)
    }

    /// Imports one Parquet file. Failures are rolled back and returned as
    /// [`FileImportOutcome::Failed`].
    pub async fn import_file(&self, path: &Path, options: &ImportOptions) -> FileImportOutcome {
        let file_name = file_name_of(path);
        match self.try_import_file(path, &file_name, options).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(file = %file_name, error = %err, "import failed");
                FileImportOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    async fn try_import_file(
        &self,
        path: &Path,
        file_name: &str,
        options: &ImportOptions,
    ) -> Result<FileImportOutcome, ControlError> {
        if self.store.is_file_imported(file_name).await? {
            info!(file = %file_name, "already imported, skipping");
            return Ok(FileImportOutcome::AlreadyImported);
        }

        if options.dry_run {
            return dry_run(path, file_name, options.batch_size).await;
        }

        let Some(mut session) = self.store.begin_import(file_name, options.method).await? else {
            // The log may have gained the file while we waited on the check.
            if self.store.is_file_imported(file_name).await? {
                return Ok(FileImportOutcome::AlreadyImported);
            }
            info!(file = %file_name, "file locked by another importer");
            return Ok(FileImportOutcome::Locked);
        };

        let mut batches = TripParquetReader::spawn(path.to_path_buf(), options.batch_size);
        let mut rows = 0_u64;
        while let Some(batch) = batches.recv().await {
            let written = match batch {
                Ok(trips) => session.insert_trips(&trips).await.map_err(ControlError::from),
                Err(err) => Err(ControlError::from(err)),
            };
            match written {
                Ok(written) => {
                    rows += written;
                    debug!(file = %file_name, rows, "batch written");
                }
                Err(err) => {
                    drop(batches);
                    if let Err(rollback_err) = session.rollback().await {
                        warn!(file = %file_name, error = %rollback_err, "rollback failed");
                    }
                    return Err(err);
                }
            }
        }

        let log = session.commit(rows).await?;
        info!(file = %log.file_name, rows, "file imported");
        Ok(FileImportOutcome::Imported { rows })
    }
}

async fn dry_run(
    path: &Path,
    file_name: &str,
    batch_size: usize,
) -> Result<FileImportOutcome, ControlError> {
    let mut batches = TripParquetReader::spawn(path.to_path_buf(), batch_size);
    let rows = match batches.recv().await {
        Some(batch) => batch?.len() as u64,
        None => 0,
    };
    info!(file = %file_name, rows, "dry run read first batch");
    Ok(FileImportOutcome::DryRun { rows })
}

async fn discover_parquet_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>, ControlError> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                if recursive {
                    pending.push(path);
                }
            } else if is_parquet(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

fn select_files(files: Vec<PathBuf>, options: &ImportOptions) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = match options.start_with.as_deref() {
        Some(start) => files
            .into_iter()
            .filter(|path| file_name_of(path).as_str() >= start)
            .collect(),
        None => files,
    };
    if let Some(max_files) = options.max_files.filter(|&max| max > 0) {
        files.truncate(max_files);
    }
    files
}

fn is_parquet(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(PARQUET_EXTENSION))
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_files_applies_start_and_limit() {
        let files = vec![
            PathBuf::from("raw/yellow_tripdata_2024-01.parquet"),
            PathBuf::from("raw/yellow_tripdata_2024-02.parquet"),
            PathBuf::from("raw/yellow_tripdata_2024-03.parquet"),
            PathBuf::from("raw/yellow_tripdata_2024-04.parquet"),
        ];
        let options = ImportOptions {
            start_with: Some("yellow_tripdata_2024-02.parquet".to_string()),
            max_files: Some(2),
            ..ImportOptions::default()
        };

        let selected = select_files(files, &options);

        assert_eq!(
            selected,
            vec![
                PathBuf::from("raw/yellow_tripdata_2024-02.parquet"),
                PathBuf::from("raw/yellow_tripdata_2024-03.parquet"),
            ]
        );
    }

    #[test]
    fn zero_max_files_means_no_limit() {
        let files = vec![
            PathBuf::from("raw/yellow_tripdata_2024-01.parquet"),
            PathBuf::from("raw/yellow_tripdata_2024-02.parquet"),
        ];
        let options = ImportOptions {
            max_files: Some(0),
            ..ImportOptions::default()
        };

        let selected = select_files(files.clone(), &options);

        assert_eq!(selected, files);
    }

    #[test]
    fn only_parquet_extensions_are_picked_up() {
        assert!(is_parquet(Path::new("a/yellow_tripdata_2024-01.parquet")));
        assert!(is_parquet(Path::new("a/UPPER.PARQUET")));
        assert!(!is_parquet(Path::new("a/yellow_tripdata_2024-01.parquet.part")));
        assert!(!is_parquet(Path::new("a/notes.csv")));
    }

    #[test]
    fn outcomes_serialize_with_status_tag() {
        let report = FileImportReport {
            file_name: "yellow_tripdata_2024-01.parquet".to_string(),
            outcome: FileImportOutcome::Imported { rows: 12 },
        };

        let value = serde_json::to_value(&report).expect("serialize report");

        assert_eq!(value["status"], "imported");
        assert_eq!(value["rows"], 12);
        assert_eq!(value["file_name"], "yellow_tripdata_2024-01.parquet");
    }
}
