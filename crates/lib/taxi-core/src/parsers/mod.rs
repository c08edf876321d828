//! Readers for raw trip inputs.
//!
//! Each reader normalizes an external file format into [`TripFields`]
//! batches ready for the store.
//!
//! [`TripFields`]: taxi_store::models::TripFields

pub mod parquet;

pub use parquet::{ParquetReadError, TripBatchReceiver, TripParquetReader};
