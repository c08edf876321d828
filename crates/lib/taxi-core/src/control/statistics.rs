use taxi_store::models::{ImportLog, TripStatistics};

use crate::store::TripStore;

use super::{ControlError, TaxiControlPlane};

impl<S: TripStore> TaxiControlPlane<S> {
    /// Computes aggregate trip statistics.
    ///
    /// # Errors
    /// Returns `ControlError` if the store query fails.
    pub async fn statistics(&self) -> Result<TripStatistics, ControlError> {
        Ok(self.store.statistics().await?)
    }

    /// Lists import log entries, most recent first.
    ///
    /// # Errors
    /// Returns `ControlError` if the store query fails.
    pub async fn list_imports(&self, limit: u32, offset: u32) -> Result<Vec<ImportLog>, ControlError> {
        Ok(self
            .store
            .list_imports(i64::from(offset), i64::from(limit))
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use taxi_store::models::TripFields;

    use crate::store::MemoryTripStore;

    use super::*;

    #[tokio::test]
    async fn statistics_aggregate_trip_values() {
        let control = TaxiControlPlane::new(MemoryTripStore::new());
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).expect("valid date");
        let at = |hour| day.and_hms_opt(hour, 0, 0).expect("valid time");

        control
            .create_trip(TripFields {
                tpep_pickup_datetime: Some(at(8)),
                tpep_dropoff_datetime: Some(at(9)),
                trip_distance: Some(2.0),
                total_amount: Some(10.0),
                ..TripFields::default()
            })
            .await
            .expect("create trip");
        control
            .create_trip(TripFields {
                tpep_pickup_datetime: Some(at(6)),
                tpep_dropoff_datetime: Some(at(7)),
                trip_distance: Some(4.0),
                total_amount: Some(30.0),
                ..TripFields::default()
            })
            .await
            .expect("create trip");

        let stats = control.statistics().await.expect("statistics");

        assert_eq!(stats.total_trips, 2);
        assert_eq!(stats.min_pickup, Some(at(6)));
        assert_eq!(stats.max_dropoff, Some(at(9)));
        assert_eq!(stats.avg_trip_distance, Some(3.0));
        assert_eq!(stats.avg_total_amount, Some(20.0));
        assert_eq!(stats.total_revenue, Some(40.0));
        assert_eq!(stats.imported_files, 0);
    }
}
