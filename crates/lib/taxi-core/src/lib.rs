//! Core services for the taxi trip pipeline.
//!
//! This crate owns the storage backends, the Parquet import pipeline, the
//! control-plane helpers used by the API and CLI, and the TLC downloader.

pub mod control;
pub mod download;
pub mod parsers;
pub mod store;
