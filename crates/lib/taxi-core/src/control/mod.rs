use std::{error::Error, fmt};

use crate::parsers::ParquetReadError;
use crate::store::{StoreError, TripStore};

pub mod imports;
pub mod statistics;
pub mod trips;

pub use imports::{FileImportOutcome, FileImportReport, ImportOptions, ImportRunReport};
pub use trips::MAX_PAGE_LIMIT;

#[derive(Debug)]
pub enum ControlError {
    InvalidInput(String),
    Parquet(ParquetReadError),
    Store(StoreError),
    Io(std::io::Error),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::Parquet(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl Error for ControlError {}

impl From<ParquetReadError> for ControlError {
    fn from(err: ParquetReadError) -> Self {
        Self::Parquet(err)
    }
}

impl From<StoreError> for ControlError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<std::io::Error> for ControlError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Service layer shared by the HTTP API and the CLI.
pub struct TaxiControlPlane<S: TripStore> {
    store: S,
}

impl<S: TripStore> Clone for TaxiControlPlane<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: TripStore> TaxiControlPlane<S> {
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Creates the schema when it is missing.
    ///
    /// # Errors
    /// Returns `ControlError` if the store cannot apply the schema.
    pub async fn init_schema(&self) -> Result<(), ControlError> {
        Ok(self.store.init_schema().await?)
    }
}
