//! Downloader for the monthly TLC yellow taxi Parquet files.

use std::{
    error::Error,
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{Datelike, NaiveDate, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use taxi_store::schema::tlc_file_name;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "https://d37ci6vzurychx.cloudfront.net/trip-data";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const HEAD_TIMEOUT: Duration = Duration::from_secs(10);
const PARTIAL_SUFFIX: &str = "part";

#[derive(Debug)]
pub enum DownloadError {
    InvalidMonth(u32),
    Http(reqwest::Error),
    Status { url: String, status: StatusCode },
    Io(std::io::Error),
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidMonth(month) => write!(f, "invalid month: {month}"),
            Self::Http(err) => write!(f, "HTTP error: {err}"),
            Self::Status { url, status } => write!(f, "{url} returned {status}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl Error for DownloadError {}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err)
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// A non-empty local copy already exists.
    Skipped,
    /// The existence check found nothing to fetch.
    Missing,
    Downloaded { bytes: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DownloadReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub missing: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl DownloadReport {
    fn record(&mut self, outcome: DownloadOutcome) {
        match outcome {
            DownloadOutcome::Skipped => self.skipped += 1,
            DownloadOutcome::Missing => self.missing += 1,
            DownloadOutcome::Downloaded { bytes } => {
                self.downloaded += 1;
                self.bytes += bytes;
            }
        }
    }
}

/// Fetches one year of trip files into a local directory.
#[derive(Debug, Clone)]
pub struct TlcDownloader {
    client: Client,
    base_url: String,
    year: i32,
    data_dir: PathBuf,
    check_exists: bool,
}

impl TlcDownloader {
    /// # Errors
    /// Returns `DownloadError` if the HTTP client cannot be built.
    pub fn new(year: i32, data_dir: impl Into<PathBuf>, check_exists: bool) -> Result<Self, DownloadError> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            year,
            data_dir: data_dir.into(),
            check_exists,
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub const fn year(&self) -> i32 {
        self.year
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn file_path(&self, month: u32) -> PathBuf {
        self.data_dir.join(tlc_file_name(self.year, month))
    }

    pub fn url_for(&self, month: u32) -> String {
        format!("{}/{}", self.base_url, tlc_file_name(self.year, month))
    }

    /// Whether the server answers a HEAD request for `month` with 200.
    /// Network errors count as absent.
    pub async fn url_exists(&self, month: u32) -> bool {
        let url = self.url_for(month);
        match self.client.head(&url).timeout(HEAD_TIMEOUT).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(err) => {
                warn!(url = %url, error = %err, "existence check failed");
                false
            }
        }
    }

    /// Downloads one month unless a non-empty copy is already on disk.
    ///
    /// # Errors
    /// Returns `DownloadError` for an invalid month, a failed request or a
    /// failed write. The partial file is removed on failure.
    pub async fn download_month(&self, month: u32) -> Result<DownloadOutcome, DownloadError> {
        if !(1..=12).contains(&month) {
            return Err(DownloadError::InvalidMonth(month));
        }

        let path = self.file_path(month);
        if tokio::fs::metadata(&path)
            .await
            .is_ok_and(|metadata| metadata.is_file() && metadata.len() > 0)
        {
            info!(path = %path.display(), "already downloaded");
            return Ok(DownloadOutcome::Skipped);
        }

        if self.check_exists && !self.url_exists(month).await {
            info!(month, year = self.year, "file not published");
            return Ok(DownloadOutcome::Missing);
        }

        tokio::fs::create_dir_all(&self.data_dir).await?;
        let partial = path.with_extension(format!("parquet.{PARTIAL_SUFFIX}"));
        let fetched = async {
            let bytes = self.fetch_to(&self.url_for(month), &partial).await?;
            tokio::fs::rename(&partial, &path).await?;
            Ok::<_, DownloadError>(bytes)
        };
        match fetched.await {
            Ok(bytes) => {
                info!(path = %path.display(), bytes, "downloaded");
                Ok(DownloadOutcome::Downloaded { bytes })
            }
            Err(err) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(err)
            }
        }
    }

    async fn fetch_to(&self, url: &str, target: &Path) -> Result<u64, DownloadError> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status,
            });
        }

        let mut file = tokio::fs::File::create(target).await?;
        let mut bytes = 0_u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(bytes)
    }

    /// Downloads each month in order; failures are logged and counted.
    pub async fn download_months(&self, months: &[u32]) -> DownloadReport {
        let mut report = DownloadReport::default();
        for &month in months {
            match self.download_month(month).await {
                Ok(outcome) => report.record(outcome),
                Err(err) => {
                    warn!(month, year = self.year, error = %err, "download failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Downloads every month of the year published so far.
    pub async fn download_year(&self) -> DownloadReport {
        let months = months_for_year(self.year, Utc::now().date_naive());
        self.download_months(&months).await
    }
}

/// Months of `year` that can exist as of `today`.
#[must_use]
pub fn months_for_year(year: i32, today: NaiveDate) -> Vec<u32> {
    let last = if year == today.year() {
        today.month()
    } else if year > today.year() {
        0
    } else {
        12
    };
    (1..=last).collect()
}
