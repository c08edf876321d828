//! Store interfaces with `PostgreSQL` and in-memory implementations.
//!
//! The store layer persists trips and the import log. Imports go through an
//! [`ImportSession`] so a file's rows and its log entry land together.

use std::{error::Error, fmt};

use async_trait::async_trait;
use taxi_store::models::{
    ImportLog,
    ImportMethod,
    TripFields,
    TripStatistics,
    TripUpdate,
    YellowTaxiTrip,
};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryImportSession, MemoryTripStore};
pub use postgres::{PgImportSession, PgTripStore};

#[derive(Debug)]
pub enum StoreError {
    Database(Box<sqlx::Error>),
    InvalidInput(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(err) => write!(f, "database error: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
        }
    }
}

impl Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(Box::new(err))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence operations for trips and the import log.
#[async_trait]
pub trait TripStore: Clone + Send + Sync + 'static {
    type Session: ImportSession;

    /// Creates tables and indexes when they are missing.
    async fn init_schema(&self) -> StoreResult<()>;

    async fn get_trip(&self, id: i64) -> StoreResult<Option<YellowTaxiTrip>>;

    /// Lists trips ordered by id.
    async fn list_trips(&self, offset: i64, limit: i64) -> StoreResult<Vec<YellowTaxiTrip>>;

    async fn count_trips(&self) -> StoreResult<i64>;

    async fn create_trip(&self, fields: TripFields) -> StoreResult<YellowTaxiTrip>;

    /// Applies a partial update; `None` when the trip does not exist.
    async fn update_trip(&self, id: i64, update: TripUpdate)
    -> StoreResult<Option<YellowTaxiTrip>>;

    /// Deletes a trip, returning whether a row was removed.
    async fn delete_trip(&self, id: i64) -> StoreResult<bool>;

    async fn statistics(&self) -> StoreResult<TripStatistics>;

    async fn is_file_imported(&self, file_name: &str) -> StoreResult<bool>;

    /// Lists import log entries, most recent first.
    async fn list_imports(&self, offset: i64, limit: i64) -> StoreResult<Vec<ImportLog>>;

    /// Opens an import session for `file_name`.
    ///
    /// Returns `None` when another importer holds the file or it has been
    /// imported since the caller last checked.
    async fn begin_import(
        &self,
        file_name: &str,
        method: ImportMethod,
    ) -> StoreResult<Option<Self::Session>>;
}

/// Exclusive, atomic import of one source file.
///
/// Dropping a session without committing discards its rows.
#[async_trait]
pub trait ImportSession: Send {
    /// Stages a batch of trips, returning the number of rows written.
    async fn insert_trips(&mut self, trips: &[TripFields]) -> StoreResult<u64>;

    /// Records the import log entry and publishes every staged row.
    async fn commit(self, rows_imported: u64) -> StoreResult<ImportLog>;

    /// Discards every staged row.
    async fn rollback(self) -> StoreResult<()>;
}

pub(crate) fn rows_to_i64(rows: u64) -> StoreResult<i64> {
    i64::try_from(rows)
        .map_err(|_| StoreError::InvalidInput("row count exceeds supported range".to_string()))
}
