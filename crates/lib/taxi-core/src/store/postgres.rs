use std::fmt::Write as _;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use taxi_store::models::{
    ImportLog,
    ImportMethod,
    TripFields,
    TripStatistics,
    TripUpdate,
    YellowTaxiTrip,
};
use taxi_store::schema::{SCHEMA_STATEMENTS, TABLE_IMPORT_LOG, TABLE_TRIPS, TRIP_COLUMNS};
use tracing::debug;

use super::{ImportSession, StoreResult, TripStore, rows_to_i64};

// Postgres caps a statement at 65535 bind parameters.
const MAX_ROWS_PER_INSERT: usize = 65_535 / TRIP_COLUMNS.len();

/// `PostgreSQL`-backed [`TripStore`].
#[derive(Clone)]
pub struct PgTripStore {
    pool: PgPool,
}

impl PgTripStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool with at most `max_connections` connections.
    ///
    /// # Errors
    /// Returns `StoreError` if the database cannot be reached.
    pub async fn connect(options: PgConnectOptions, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TripStore for PgTripStore {
    type Session = PgImportSession;

    async fn init_schema(&self) -> StoreResult<()> {
        for statement in SCHEMA_STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("trip schema ready");
        Ok(())
    }

    async fn get_trip(&self, id: i64) -> StoreResult<Option<YellowTaxiTrip>> {
        let query = format!("SELECT id, {} FROM {TABLE_TRIPS} WHERE id = $1", column_list());
        let row = sqlx::query(&query).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(trip_from_row).transpose()?)
    }

    async fn list_trips(&self, offset: i64, limit: i64) -> StoreResult<Vec<YellowTaxiTrip>> {
        let query = format!(
            "SELECT id, {} FROM {TABLE_TRIPS} ORDER BY id LIMIT $1 OFFSET $2",
            column_list()
        );
        let rows = sqlx::query(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(trip_from_row).collect::<Result<_, _>>()?)
    }

    async fn count_trips(&self) -> StoreResult<i64> {
        let query = format!("SELECT COUNT(*) FROM {TABLE_TRIPS}");
        let count: i64 = sqlx::query_scalar(&query).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn create_trip(&self, fields: TripFields) -> StoreResult<YellowTaxiTrip> {
        let query = format!(
            "INSERT INTO {TABLE_TRIPS} ({}) VALUES ({}) RETURNING id",
            column_list(),
            placeholders(1)
        );
        let id: i64 = bind_trip(sqlx::query(&query), &fields)
            .fetch_one(&self.pool)
            .await?
            .try_get("id")?;
        Ok(YellowTaxiTrip { id, fields })
    }

    async fn update_trip(
        &self,
        id: i64,
        update: TripUpdate,
    ) -> StoreResult<Option<YellowTaxiTrip>> {
        let mut tx = self.pool.begin().await?;
        let select = format!(
            "SELECT id, {} FROM {TABLE_TRIPS} WHERE id = $1 FOR UPDATE",
            column_list()
        );
        let Some(row) = sqlx::query(&select).bind(id).fetch_optional(&mut *tx).await? else {
            return Ok(None);
        };
        let mut trip = trip_from_row(&row)?;
        update.apply(&mut trip.fields);

        let assignments = TRIP_COLUMNS
            .iter()
            .enumerate()
            .map(|(index, column)| format!("{column} = ${}", index + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let statement = format!(
            "UPDATE {TABLE_TRIPS} SET {assignments} WHERE id = ${}",
            TRIP_COLUMNS.len() + 1
        );
        bind_trip(sqlx::query(&statement), &trip.fields)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(trip))
    }

    async fn delete_trip(&self, id: i64) -> StoreResult<bool> {
        let statement = format!("DELETE FROM {TABLE_TRIPS} WHERE id = $1");
        let result = sqlx::query(&statement).bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn statistics(&self) -> StoreResult<TripStatistics> {
        let query = format!(
            "SELECT
                COUNT(*) AS total_trips,
                MIN(tpep_pickup_datetime) AS min_pickup,
                MAX(tpep_dropoff_datetime) AS max_dropoff,
                AVG(trip_distance) AS avg_trip_distance,
                AVG(total_amount) AS avg_total_amount,
                SUM(total_amount) AS total_revenue,
                (SELECT COUNT(*) FROM {TABLE_IMPORT_LOG}) AS imported_files
            FROM {TABLE_TRIPS}"
        );
        let row = sqlx::query(&query).fetch_one(&self.pool).await?;
        Ok(TripStatistics {
            total_trips: row.try_get("total_trips")?,
            min_pickup: row.try_get("min_pickup")?,
            max_dropoff: row.try_get("max_dropoff")?,
            avg_trip_distance: row.try_get("avg_trip_distance")?,
            avg_total_amount: row.try_get("avg_total_amount")?,
            total_revenue: row.try_get("total_revenue")?,
            imported_files: row.try_get("imported_files")?,
        })
    }

    async fn is_file_imported(&self, file_name: &str) -> StoreResult<bool> {
        let query = format!("SELECT EXISTS (SELECT 1 FROM {TABLE_IMPORT_LOG} WHERE file_name = $1)");
        let imported: bool = sqlx::query_scalar(&query)
            .bind(file_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(imported)
    }

    async fn list_imports(&self, offset: i64, limit: i64) -> StoreResult<Vec<ImportLog>> {
        let query = format!(
            "SELECT file_name, import_date, rows_imported FROM {TABLE_IMPORT_LOG}
             ORDER BY import_date DESC LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query(&query)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .iter()
            .map(import_log_from_row)
            .collect::<Result<_, _>>()?)
    }

    async fn begin_import(
        &self,
        file_name: &str,
        method: ImportMethod,
    ) -> StoreResult<Option<Self::Session>> {
        let mut tx = self.pool.begin().await?;

        // Released automatically when the transaction ends.
        let locked: bool = sqlx::query_scalar("SELECT pg_try_advisory_xact_lock(hashtext($1))")
            .bind(file_name)
            .fetch_one(&mut *tx)
            .await?;
        if !locked {
            tx.rollback().await?;
            return Ok(None);
        }

        let query = format!("SELECT EXISTS (SELECT 1 FROM {TABLE_IMPORT_LOG} WHERE file_name = $1)");
        let imported: bool = sqlx::query_scalar(&query)
            .bind(file_name)
            .fetch_one(&mut *tx)
            .await?;
        if imported {
            tx.rollback().await?;
            return Ok(None);
        }

        Ok(Some(PgImportSession {
            tx,
            file_name: file_name.to_string(),
            method,
        }))
    }
}

/// Import session backed by a single transaction.
pub struct PgImportSession {
    tx: Transaction<'static, Postgres>,
    file_name: String,
    method: ImportMethod,
}

impl PgImportSession {
    async fn copy_trips(&mut self, trips: &[TripFields]) -> StoreResult<u64> {
        let statement = format!(
            "COPY {TABLE_TRIPS} ({}) FROM STDIN WITH (FORMAT CSV)",
            column_list()
        );
        let mut payload = String::with_capacity(trips.len() * 160);
        for trip in trips {
            write_csv_row(&mut payload, trip);
        }
        let mut copy = self.tx.copy_in_raw(&statement).await?;
        copy.send(payload.into_bytes()).await?;
        Ok(copy.finish().await?)
    }

    async fn insert_values(&mut self, trips: &[TripFields]) -> StoreResult<u64> {
        let mut written = 0;
        for chunk in trips.chunks(MAX_ROWS_PER_INSERT) {
            let mut builder: QueryBuilder<'_, Postgres> =
                QueryBuilder::new(format!("INSERT INTO {TABLE_TRIPS} ({}) ", column_list()));
            builder.push_values(chunk, |mut row, trip| {
                row.push_bind(trip.vendor_id)
                    .push_bind(trip.tpep_pickup_datetime)
                    .push_bind(trip.tpep_dropoff_datetime)
                    .push_bind(trip.passenger_count)
                    .push_bind(trip.trip_distance)
                    .push_bind(trip.ratecode_id)
                    .push_bind(trip.store_and_fwd_flag.clone())
                    .push_bind(trip.pu_location_id)
                    .push_bind(trip.do_location_id)
                    .push_bind(trip.payment_type)
                    .push_bind(trip.fare_amount)
                    .push_bind(trip.extra)
                    .push_bind(trip.mta_tax)
                    .push_bind(trip.tip_amount)
                    .push_bind(trip.tolls_amount)
                    .push_bind(trip.improvement_surcharge)
                    .push_bind(trip.total_amount)
                    .push_bind(trip.congestion_surcharge)
                    .push_bind(trip.airport_fee)
                    .push_bind(trip.cbd_congestion_fee);
            });
            let result = builder.build().execute(&mut *self.tx).await?;
            written += result.rows_affected();
        }
        Ok(written)
    }
}

#[async_trait]
impl ImportSession for PgImportSession {
    async fn insert_trips(&mut self, trips: &[TripFields]) -> StoreResult<u64> {
        if trips.is_empty() {
            return Ok(0);
        }
        match self.method {
            ImportMethod::Copy => self.copy_trips(trips).await,
            ImportMethod::Values => self.insert_values(trips).await,
        }
    }

    async fn commit(mut self, rows_imported: u64) -> StoreResult<ImportLog> {
        let statement = format!(
            "INSERT INTO {TABLE_IMPORT_LOG} (file_name, rows_imported) VALUES ($1, $2)
             RETURNING file_name, import_date, rows_imported"
        );
        let row = sqlx::query(&statement)
            .bind(&self.file_name)
            .bind(rows_to_i64(rows_imported)?)
            .fetch_one(&mut *self.tx)
            .await?;
        let log = import_log_from_row(&row)?;
        self.tx.commit().await?;
        Ok(log)
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn column_list() -> String {
    TRIP_COLUMNS.join(", ")
}

fn placeholders(start: usize) -> String {
    (start..start + TRIP_COLUMNS.len())
        .map(|index| format!("${index}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn bind_trip<'q>(
    query: Query<'q, Postgres, PgArguments>,
    trip: &TripFields,
) -> Query<'q, Postgres, PgArguments> {
    query
        .bind(trip.vendor_id)
        .bind(trip.tpep_pickup_datetime)
        .bind(trip.tpep_dropoff_datetime)
        .bind(trip.passenger_count)
        .bind(trip.trip_distance)
        .bind(trip.ratecode_id)
        .bind(trip.store_and_fwd_flag.clone())
        .bind(trip.pu_location_id)
        .bind(trip.do_location_id)
        .bind(trip.payment_type)
        .bind(trip.fare_amount)
        .bind(trip.extra)
        .bind(trip.mta_tax)
        .bind(trip.tip_amount)
        .bind(trip.tolls_amount)
        .bind(trip.improvement_surcharge)
        .bind(trip.total_amount)
        .bind(trip.congestion_surcharge)
        .bind(trip.airport_fee)
        .bind(trip.cbd_congestion_fee)
}

fn trip_from_row(row: &PgRow) -> Result<YellowTaxiTrip, sqlx::Error> {
    Ok(YellowTaxiTrip {
        id: row.try_get("id")?,
        fields: TripFields {
            vendor_id: row.try_get("vendor_id")?,
            tpep_pickup_datetime: row.try_get("tpep_pickup_datetime")?,
            tpep_dropoff_datetime: row.try_get("tpep_dropoff_datetime")?,
            passenger_count: row.try_get("passenger_count")?,
            trip_distance: row.try_get("trip_distance")?,
            ratecode_id: row.try_get("ratecode_id")?,
            store_and_fwd_flag: row.try_get("store_and_fwd_flag")?,
            pu_location_id: row.try_get("pu_location_id")?,
            do_location_id: row.try_get("do_location_id")?,
            payment_type: row.try_get("payment_type")?,
            fare_amount: row.try_get("fare_amount")?,
            extra: row.try_get("extra")?,
            mta_tax: row.try_get("mta_tax")?,
            tip_amount: row.try_get("tip_amount")?,
            tolls_amount: row.try_get("tolls_amount")?,
            improvement_surcharge: row.try_get("improvement_surcharge")?,
            total_amount: row.try_get("total_amount")?,
            congestion_surcharge: row.try_get("congestion_surcharge")?,
            airport_fee: row.try_get("airport_fee")?,
            cbd_congestion_fee: row.try_get("cbd_congestion_fee")?,
        },
    })
}

fn import_log_from_row(row: &PgRow) -> Result<ImportLog, sqlx::Error> {
    Ok(ImportLog {
        file_name: row.try_get("file_name")?,
        import_date: row.try_get("import_date")?,
        rows_imported: row.try_get("rows_imported")?,
    })
}

/// Appends one CSV record in `TRIP_COLUMNS` order. Empty unquoted fields
/// are read back as NULL by `COPY ... (FORMAT CSV)`.
fn write_csv_row(out: &mut String, trip: &TripFields) {
    fn number<T: std::fmt::Display>(out: &mut String, value: Option<T>) {
        if let Some(value) = value {
            let _ = write!(out, "{value}");
        }
        out.push(',');
    }

    fn timestamp(out: &mut String, value: Option<NaiveDateTime>) {
        if let Some(value) = value {
            let _ = write!(out, "{}", value.format("%Y-%m-%d %H:%M:%S%.f"));
        }
        out.push(',');
    }

    number(out, trip.vendor_id);
    timestamp(out, trip.tpep_pickup_datetime);
    timestamp(out, trip.tpep_dropoff_datetime);
    number(out, trip.passenger_count);
    number(out, trip.trip_distance);
    number(out, trip.ratecode_id);
    if let Some(flag) = trip.store_and_fwd_flag.as_deref() {
        out.push('"');
        out.push_str(&flag.replace('"', "\"\""));
        out.push('"');
    }
    out.push(',');
    number(out, trip.pu_location_id);
    number(out, trip.do_location_id);
    number(out, trip.payment_type);
    number(out, trip.fare_amount);
    number(out, trip.extra);
    number(out, trip.mta_tax);
    number(out, trip.tip_amount);
    number(out, trip.tolls_amount);
    number(out, trip.improvement_surcharge);
    number(out, trip.total_amount);
    number(out, trip.congestion_surcharge);
    number(out, trip.airport_fee);
    if let Some(value) = trip.cbd_congestion_fee {
        let _ = write!(out, "{value}");
    }
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn csv_row_leaves_nulls_empty_and_quotes_text() {
        let pickup = NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|date| date.and_hms_opt(0, 57, 55))
            .expect("valid timestamp");
        let trip = TripFields {
            vendor_id: Some(2),
            tpep_pickup_datetime: Some(pickup),
            store_and_fwd_flag: Some("N\"".to_string()),
            fare_amount: Some(17.7),
            cbd_congestion_fee: Some(0.75),
            ..TripFields::default()
        };

        let mut out = String::new();
        write_csv_row(&mut out, &trip);

        assert_eq!(out, "2,2024-01-01 00:57:55,,,,,\"N\"\"\",,,,17.7,,,,,,,,,0.75\n");
        assert_eq!(out.trim_end().split(',').count(), TRIP_COLUMNS.len());
    }

    #[test]
    fn placeholders_cover_every_column() {
        let rendered = placeholders(1);

        assert!(rendered.starts_with("$1, $2"));
        assert!(rendered.ends_with("$20"));
    }

    #[test]
    fn insert_chunks_stay_under_bind_limit() {
        assert!(MAX_ROWS_PER_INSERT * TRIP_COLUMNS.len() <= 65_535);
    }
}
