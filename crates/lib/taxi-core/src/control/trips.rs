use taxi_store::models::{TripFields, TripPage, TripUpdate, YellowTaxiTrip};

use crate::store::TripStore;

use super::{ControlError, TaxiControlPlane};

/// Largest page a single list call returns.
pub const MAX_PAGE_LIMIT: u32 = 10_000;

impl<S: TripStore> TaxiControlPlane<S> {
    /// Fetches a trip by id.
    ///
    /// # Errors
    /// Returns `ControlError` if the store query fails.
    pub async fn get_trip(&self, id: i64) -> Result<Option<YellowTaxiTrip>, ControlError> {
        Ok(self.store.get_trip(id).await?)
    }

    /// Lists a page of trips with the table total. `limit` is clamped to
    /// [`MAX_PAGE_LIMIT`].
    ///
    /// # Errors
    /// Returns `ControlError` if the store query fails.
    pub async fn list_trips(&self, skip: u32, limit: u32) -> Result<TripPage, ControlError> {
        let limit = limit.min(MAX_PAGE_LIMIT);
        let total = self.store.count_trips().await?;
        let trips = self
            .store
            .list_trips(i64::from(skip), i64::from(limit))
            .await?;
        Ok(TripPage { total, trips })
    }

    /// Creates a trip.
    ///
    /// # Errors
    /// Returns `ControlError` if the store write fails.
    pub async fn create_trip(&self, fields: TripFields) -> Result<YellowTaxiTrip, ControlError> {
        Ok(self.store.create_trip(fields).await?)
    }

    /// Applies a partial update, returning `None` for an unknown id.
    ///
    /// # Errors
    /// Returns `ControlError` if the store write fails.
    pub async fn update_trip(
        &self,
        id: i64,
        update: TripUpdate,
    ) -> Result<Option<YellowTaxiTrip>, ControlError> {
        Ok(self.store.update_trip(id, update).await?)
    }

    /// Deletes a trip, returning whether it existed.
    ///
    /// # Errors
    /// Returns `ControlError` if the store write fails.
    pub async fn delete_trip(&self, id: i64) -> Result<bool, ControlError> {
        Ok(self.store.delete_trip(id).await?)
    }
}
