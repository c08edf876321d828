//! Data model and schema helpers for the taxi trip pipeline.
//!
//! This crate defines the canonical records shared by the importer, the
//! storage backends and the HTTP API.

pub mod models;
pub mod schema;

pub use models::*;
