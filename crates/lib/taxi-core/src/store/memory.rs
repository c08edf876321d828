//! Process-local store used by tests and the in-memory daemon mode.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use taxi_store::models::{
    ImportLog,
    ImportMethod,
    TripFields,
    TripStatistics,
    TripUpdate,
    YellowTaxiTrip,
};

use super::{ImportSession, StoreResult, TripStore, rows_to_i64};

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    trips: BTreeMap<i64, TripFields>,
    imports: BTreeMap<String, ImportLog>,
    locked: HashSet<String>,
}

impl MemoryState {
    fn insert_trip(&mut self, fields: TripFields) -> i64 {
        self.next_id += 1;
        let id = self.next_id;
        self.trips.insert(id, fields);
        id
    }
}

/// In-memory [`TripStore`] with the same import semantics as `PostgreSQL`.
#[derive(Clone, Default)]
pub struct MemoryTripStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTripStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while an import session holds `file_name`.
    #[must_use]
    pub fn is_locked(&self, file_name: &str) -> bool {
        self.state().locked.contains(file_name)
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TripStore for MemoryTripStore {
    type Session = MemoryImportSession;

    async fn init_schema(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn get_trip(&self, id: i64) -> StoreResult<Option<YellowTaxiTrip>> {
        Ok(self.state().trips.get(&id).map(|fields| YellowTaxiTrip {
            id,
            fields: fields.clone(),
        }))
    }

    async fn list_trips(&self, offset: i64, limit: i64) -> StoreResult<Vec<YellowTaxiTrip>> {
        let offset = usize::try_from(offset).unwrap_or(0);
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .state()
            .trips
            .iter()
            .skip(offset)
            .take(limit)
            .map(|(id, fields)| YellowTaxiTrip {
                id: *id,
                fields: fields.clone(),
            })
            .collect())
    }

    async fn count_trips(&self) -> StoreResult<i64> {
        rows_to_i64(self.state().trips.len() as u64)
    }

    async fn create_trip(&self, fields: TripFields) -> StoreResult<YellowTaxiTrip> {
        let id = self.state().insert_trip(fields.clone());
        Ok(YellowTaxiTrip { id, fields })
    }

    async fn update_trip(
        &self,
        id: i64,
        update: TripUpdate,
    ) -> StoreResult<Option<YellowTaxiTrip>> {
        let mut state = self.state();
        let Some(fields) = state.trips.get_mut(&id) else {
            return Ok(None);
        };
        update.apply(fields);
        Ok(Some(YellowTaxiTrip {
            id,
            fields: fields.clone(),
        }))
    }

    async fn delete_trip(&self, id: i64) -> StoreResult<bool> {
        Ok(self.state().trips.remove(&id).is_some())
    }

    #[allow(clippy::cast_precision_loss)]
    async fn statistics(&self) -> StoreResult<TripStatistics> {
        let state = self.state();
        let trips = state.trips.values();

        let min_pickup = trips.clone().filter_map(|trip| trip.tpep_pickup_datetime).min();
        let max_dropoff = trips.clone().filter_map(|trip| trip.tpep_dropoff_datetime).max();

        let average = |values: Vec<f64>| {
            if values.is_empty() {
                None
            } else {
                Some(values.iter().sum::<f64>() / values.len() as f64)
            }
        };
        let distances: Vec<f64> = trips.clone().filter_map(|trip| trip.trip_distance).collect();
        let totals: Vec<f64> = trips.filter_map(|trip| trip.total_amount).collect();
        let total_revenue = if totals.is_empty() {
            None
        } else {
            Some(totals.iter().sum())
        };

        Ok(TripStatistics {
            total_trips: rows_to_i64(state.trips.len() as u64)?,
            min_pickup,
            max_dropoff,
            avg_trip_distance: average(distances),
            avg_total_amount: average(totals),
            total_revenue,
            imported_files: rows_to_i64(state.imports.len() as u64)?,
        })
    }

    async fn is_file_imported(&self, file_name: &str) -> StoreResult<bool> {
        Ok(self.state().imports.contains_key(file_name))
    }

    async fn list_imports(&self, offset: i64, limit: i64) -> StoreResult<Vec<ImportLog>> {
        let offset = usize::try_from(offset).unwrap_or(0);
        let limit = usize::try_from(limit).unwrap_or(0);
        let mut imports: Vec<ImportLog> = self.state().imports.values().cloned().collect();
        imports.sort_by(|left, right| right.import_date.cmp(&left.import_date));
        Ok(imports.into_iter().skip(offset).take(limit).collect())
    }

    async fn begin_import(
        &self,
        file_name: &str,
        _method: ImportMethod,
    ) -> StoreResult<Option<Self::Session>> {
        let mut state = self.state();
        if state.imports.contains_key(file_name) || !state.locked.insert(file_name.to_string()) {
            return Ok(None);
        }
        Ok(Some(MemoryImportSession {
            store: self.clone(),
            file_name: file_name.to_string(),
            pending: Vec::new(),
        }))
    }
}

/// Import session that stages rows until commit.
pub struct MemoryImportSession {
    store: MemoryTripStore,
    file_name: String,
    pending: Vec<TripFields>,
}

#[async_trait]
impl ImportSession for MemoryImportSession {
    async fn insert_trips(&mut self, trips: &[TripFields]) -> StoreResult<u64> {
        self.pending.extend_from_slice(trips);
        Ok(trips.len() as u64)
    }

    async fn commit(mut self, rows_imported: u64) -> StoreResult<ImportLog> {
        let log = ImportLog {
            file_name: self.file_name.clone(),
            import_date: Utc::now(),
            rows_imported: Some(rows_to_i64(rows_imported)?),
        };
        let pending = std::mem::take(&mut self.pending);
        let mut state = self.store.state();
        for fields in pending {
            state.insert_trip(fields);
        }
        state.imports.insert(self.file_name.clone(), log.clone());
        Ok(log)
    }

    async fn rollback(mut self) -> StoreResult<()> {
        self.pending.clear();
        Ok(())
    }
}

impl Drop for MemoryImportSession {
    fn drop(&mut self) {
        self.store.state().locked.remove(&self.file_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn uncommitted_session_discards_rows_and_releases_lock() {
        let store = MemoryTripStore::new();
        let mut session = store
            .begin_import("yellow_tripdata_2024-01.parquet", ImportMethod::Values)
            .await
            .expect("begin import")
            .expect("file should not be locked");
        session
            .insert_trips(&[TripFields::default(), TripFields::default()])
            .await
            .expect("stage rows");

        assert!(store.is_locked("yellow_tripdata_2024-01.parquet"));
        drop(session);

        assert!(!store.is_locked("yellow_tripdata_2024-01.parquet"));
        assert_eq!(store.count_trips().await.expect("count"), 0);
        assert!(!store.is_file_imported("yellow_tripdata_2024-01.parquet").await.expect("check log"));
    }

    #[tokio::test]
    async fn second_session_for_same_file_is_refused() {
        let store = MemoryTripStore::new();
        let first = store
            .begin_import("a.parquet", ImportMethod::Copy)
            .await
            .expect("begin import");
        let second = store
            .begin_import("a.parquet", ImportMethod::Copy)
            .await
            .expect("begin import");

        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn committed_file_cannot_be_imported_again() {
        let store = MemoryTripStore::new();
        let session = store
            .begin_import("a.parquet", ImportMethod::Copy)
            .await
            .expect("begin import")
            .expect("session");
        let log = session.commit(0).await.expect("commit");

        assert_eq!(log.rows_imported, Some(0));
        assert!(store
            .begin_import("a.parquet", ImportMethod::Copy)
            .await
            .expect("begin import")
            .is_none());
    }

    #[tokio::test]
    async fn statistics_are_empty_without_trips() {
        let stats = MemoryTripStore::new().statistics().await.expect("statistics");

        assert_eq!(stats.total_trips, 0);
        assert!(stats.avg_trip_distance.is_none());
        assert!(stats.total_revenue.is_none());
        assert!(stats.min_pickup.is_none());
    }
}
