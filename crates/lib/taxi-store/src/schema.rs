pub const TABLE_TRIPS: &str = "yellow_taxi_trips";
pub const TABLE_IMPORT_LOG: &str = "import_log";

/// Trip columns in the order every writer binds them.
pub const TRIP_COLUMNS: [&str; 20] = [
    "vendor_id",
    "tpep_pickup_datetime",
    "tpep_dropoff_datetime",
    "passenger_count",
    "trip_distance",
    "ratecode_id",
    "store_and_fwd_flag",
    "pu_location_id",
    "do_location_id",
    "payment_type",
    "fare_amount",
    "extra",
    "mta_tax",
    "tip_amount",
    "tolls_amount",
    "improvement_surcharge",
    "total_amount",
    "congestion_surcharge",
    "airport_fee",
    "cbd_congestion_fee",
];

pub const CREATE_TRIPS_TABLE: &str = "CREATE TABLE IF NOT EXISTS yellow_taxi_trips (
    id BIGSERIAL PRIMARY KEY,
    vendor_id BIGINT,
    tpep_pickup_datetime TIMESTAMP,
    tpep_dropoff_datetime TIMESTAMP,
    passenger_count DOUBLE PRECISION,
    trip_distance DOUBLE PRECISION,
    ratecode_id DOUBLE PRECISION,
    store_and_fwd_flag TEXT,
    pu_location_id BIGINT,
    do_location_id BIGINT,
    payment_type BIGINT,
    fare_amount DOUBLE PRECISION,
    extra DOUBLE PRECISION,
    mta_tax DOUBLE PRECISION,
    tip_amount DOUBLE PRECISION,
    tolls_amount DOUBLE PRECISION,
    improvement_surcharge DOUBLE PRECISION,
    total_amount DOUBLE PRECISION,
    congestion_surcharge DOUBLE PRECISION,
    airport_fee DOUBLE PRECISION,
    cbd_congestion_fee DOUBLE PRECISION
);";

pub const CREATE_TRIPS_PICKUP_INDEX: &str = "CREATE INDEX IF NOT EXISTS yellow_taxi_trips_pickup_idx ON yellow_taxi_trips (tpep_pickup_datetime);";

pub const CREATE_IMPORT_LOG_TABLE: &str = "CREATE TABLE IF NOT EXISTS import_log (
    file_name TEXT PRIMARY KEY,
    import_date TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    rows_imported BIGINT
);";

/// Statements that bring an empty database up to the current schema.
pub const SCHEMA_STATEMENTS: [&str; 3] = [
    CREATE_TRIPS_TABLE,
    CREATE_TRIPS_PICKUP_INDEX,
    CREATE_IMPORT_LOG_TABLE,
];

/// Target column for a source column found in a TLC Parquet file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripColumn {
    VendorId,
    PickupDatetime,
    DropoffDatetime,
    PassengerCount,
    TripDistance,
    RatecodeId,
    StoreAndFwdFlag,
    PuLocationId,
    DoLocationId,
    PaymentType,
    FareAmount,
    Extra,
    MtaTax,
    TipAmount,
    TollsAmount,
    ImprovementSurcharge,
    TotalAmount,
    CongestionSurcharge,
    AirportFee,
    CbdCongestionFee,
}

impl TripColumn {
    /// Maps a TLC source column name (any casing, either the published
    /// CamelCase or our snake_case spelling) to a trip column.
    #[must_use]
    pub fn from_source_name(name: &str) -> Option<Self> {
        let column = match name.trim().to_ascii_lowercase().as_str() {
            "vendorid" | "vendor_id" => Self::VendorId,
            "tpep_pickup_datetime" => Self::PickupDatetime,
            "tpep_dropoff_datetime" => Self::DropoffDatetime,
            "passenger_count" => Self::PassengerCount,
            "trip_distance" => Self::TripDistance,
            "ratecodeid" | "ratecode_id" => Self::RatecodeId,
            "store_and_fwd_flag" => Self::StoreAndFwdFlag,
            "pulocationid" | "pu_location_id" => Self::PuLocationId,
            "dolocationid" | "do_location_id" => Self::DoLocationId,
            "payment_type" => Self::PaymentType,
            "fare_amount" => Self::FareAmount,
            "extra" => Self::Extra,
            "mta_tax" => Self::MtaTax,
            "tip_amount" => Self::TipAmount,
            "tolls_amount" => Self::TollsAmount,
            "improvement_surcharge" => Self::ImprovementSurcharge,
            "total_amount" => Self::TotalAmount,
            "congestion_surcharge" => Self::CongestionSurcharge,
            "airport_fee" => Self::AirportFee,
            "cbd_congestion_fee" => Self::CbdCongestionFee,
            _ => return None,
        };
        Some(column)
    }
}

pub const TLC_FILE_PREFIX: &str = "yellow_tripdata_";
pub const PARQUET_EXTENSION: &str = "parquet";

/// File name TLC uses for one month of yellow taxi trips.
#[must_use]
pub fn tlc_file_name(year: i32, month: u32) -> String {
    format!("{TLC_FILE_PREFIX}{year}-{month:02}.{PARQUET_EXTENSION}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_names_map_case_insensitively() {
        assert_eq!(TripColumn::from_source_name("VendorID"), Some(TripColumn::VendorId));
        assert_eq!(TripColumn::from_source_name("airport_fee"), Some(TripColumn::AirportFee));
        assert_eq!(TripColumn::from_source_name("Airport_fee"), Some(TripColumn::AirportFee));
        assert_eq!(TripColumn::from_source_name("PULocationID"), Some(TripColumn::PuLocationId));
        assert_eq!(TripColumn::from_source_name("__index_level_0__"), None);
    }

    #[test]
    fn tlc_file_name_pads_month() {
        assert_eq!(tlc_file_name(2024, 3), "yellow_tripdata_2024-03.parquet");
        assert_eq!(tlc_file_name(2025, 11), "yellow_tripdata_2025-11.parquet");
    }
}
