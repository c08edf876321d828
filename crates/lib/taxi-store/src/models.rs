use std::{fmt, str::FromStr};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Trip attributes as published in the TLC yellow taxi files.
///
/// Every attribute is nullable: the published files drift between years and
/// the importer maps anything it cannot coerce to `None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TripFields {
    #[serde(rename = "VendorID")]
    pub vendor_id: Option<i64>,
    pub tpep_pickup_datetime: Option<NaiveDateTime>,
    pub tpep_dropoff_datetime: Option<NaiveDateTime>,
    pub passenger_count: Option<f64>,
    pub trip_distance: Option<f64>,
    #[serde(rename = "RatecodeID")]
    pub ratecode_id: Option<f64>,
    pub store_and_fwd_flag: Option<String>,
    #[serde(rename = "PULocationID")]
    pub pu_location_id: Option<i64>,
    #[serde(rename = "DOLocationID")]
    pub do_location_id: Option<i64>,
    pub payment_type: Option<i64>,
    pub fare_amount: Option<f64>,
    pub extra: Option<f64>,
    pub mta_tax: Option<f64>,
    pub tip_amount: Option<f64>,
    pub tolls_amount: Option<f64>,
    pub improvement_surcharge: Option<f64>,
    pub total_amount: Option<f64>,
    pub congestion_surcharge: Option<f64>,
    #[serde(rename = "Airport_fee")]
    pub airport_fee: Option<f64>,
    pub cbd_congestion_fee: Option<f64>,
}

/// Stored trip record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct YellowTaxiTrip {
    pub id: i64,
    #[serde(flatten)]
    pub fields: TripFields,
}

/// Partial update for a trip.
///
/// Absent members leave the stored value untouched, an explicit `null`
/// clears it.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
#[allow(clippy::option_option)]
pub struct TripUpdate {
    #[serde(rename = "VendorID", deserialize_with = "present")]
    pub vendor_id: Option<Option<i64>>,
    #[serde(deserialize_with = "present")]
    pub tpep_pickup_datetime: Option<Option<NaiveDateTime>>,
    #[serde(deserialize_with = "present")]
    pub tpep_dropoff_datetime: Option<Option<NaiveDateTime>>,
    #[serde(deserialize_with = "present")]
    pub passenger_count: Option<Option<f64>>,
    #[serde(deserialize_with = "present")]
    pub trip_distance: Option<Option<f64>>,
    #[serde(rename = "RatecodeID", deserialize_with = "present")]
    pub ratecode_id: Option<Option<f64>>,
    #[serde(deserialize_with = "present")]
    pub store_and_fwd_flag: Option<Option<String>>,
    #[serde(rename = "PULocationID", deserialize_with = "present")]
    pub pu_location_id: Option<Option<i64>>,
    #[serde(rename = "DOLocationID", deserialize_with = "present")]
    pub do_location_id: Option<Option<i64>>,
    #[serde(deserialize_with = "present")]
    pub payment_type: Option<Option<i64>>,
    #[serde(deserialize_with = "present")]
    pub fare_amount: Option<Option<f64>>,
    #[serde(deserialize_with = "present")]
    pub extra: Option<Option<f64>>,
    #[serde(deserialize_with = "present")]
    pub mta_tax: Option<Option<f64>>,
    #[serde(deserialize_with = "present")]
    pub tip_amount: Option<Option<f64>>,
    #[serde(deserialize_with = "present")]
    pub tolls_amount: Option<Option<f64>>,
    #[serde(deserialize_with = "present")]
    pub improvement_surcharge: Option<Option<f64>>,
    #[serde(deserialize_with = "present")]
    pub total_amount: Option<Option<f64>>,
    #[serde(deserialize_with = "present")]
    pub congestion_surcharge: Option<Option<f64>>,
    #[serde(rename = "Airport_fee", deserialize_with = "present")]
    pub airport_fee: Option<Option<f64>>,
    #[serde(deserialize_with = "present")]
    pub cbd_congestion_fee: Option<Option<f64>>,
}

impl TripUpdate {
    /// Applies every present member onto `target`.
    pub fn apply(self, target: &mut TripFields) {
        fn set<T>(slot: &mut Option<T>, value: Option<Option<T>>) {
            if let Some(value) = value {
                *slot = value;
            }
        }

        set(&mut target.vendor_id, self.vendor_id);
        set(&mut target.tpep_pickup_datetime, self.tpep_pickup_datetime);
        set(&mut target.tpep_dropoff_datetime, self.tpep_dropoff_datetime);
        set(&mut target.passenger_count, self.passenger_count);
        set(&mut target.trip_distance, self.trip_distance);
        set(&mut target.ratecode_id, self.ratecode_id);
        set(&mut target.store_and_fwd_flag, self.store_and_fwd_flag);
        set(&mut target.pu_location_id, self.pu_location_id);
        set(&mut target.do_location_id, self.do_location_id);
        set(&mut target.payment_type, self.payment_type);
        set(&mut target.fare_amount, self.fare_amount);
        set(&mut target.extra, self.extra);
        set(&mut target.mta_tax, self.mta_tax);
        set(&mut target.tip_amount, self.tip_amount);
        set(&mut target.tolls_amount, self.tolls_amount);
        set(&mut target.improvement_surcharge, self.improvement_surcharge);
        set(&mut target.total_amount, self.total_amount);
        set(&mut target.congestion_surcharge, self.congestion_surcharge);
        set(&mut target.airport_fee, self.airport_fee);
        set(&mut target.cbd_congestion_fee, self.cbd_congestion_fee);
    }
}

// Wraps whatever was present (including `null`) so `#[serde(default)]` can
// tell an absent member apart from a cleared one.
#[allow(clippy::option_option)]
fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// One page of trips plus the table total.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TripPage {
    pub total: i64,
    pub trips: Vec<YellowTaxiTrip>,
}

/// Record of a source file that has been imported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportLog {
    pub file_name: String,
    pub import_date: DateTime<Utc>,
    pub rows_imported: Option<i64>,
}

/// Aggregate figures over the trip table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TripStatistics {
    pub total_trips: i64,
    pub min_pickup: Option<NaiveDateTime>,
    pub max_dropoff: Option<NaiveDateTime>,
    pub avg_trip_distance: Option<f64>,
    pub avg_total_amount: Option<f64>,
    pub total_revenue: Option<f64>,
    pub imported_files: i64,
}

/// Bulk write strategy used when importing trips.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ImportMethod {
    /// `COPY ... FROM STDIN` with CSV payloads.
    #[default]
    Copy,
    /// Multi-row `INSERT ... VALUES`.
    Values,
}

impl ImportMethod {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Values => "values",
        }
    }
}

impl fmt::Display for ImportMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportMethod {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "copy" => Ok(Self::Copy),
            "values" => Ok(Self::Values),
            other => Err(format!("unknown import method: {other} (expected copy or values)")),
        }
    }
}

impl TryFrom<String> for ImportMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trip_fields_use_tlc_wire_names() {
        let fields = TripFields {
            vendor_id: Some(2),
            pu_location_id: Some(138),
            airport_fee: Some(1.75),
            ..TripFields::default()
        };

        let value = serde_json::to_value(&fields).expect("serialize trip fields");

        assert_eq!(value["VendorID"], 2);
        assert_eq!(value["PULocationID"], 138);
        assert_eq!(value["Airport_fee"], 1.75);
        assert!(value["DOLocationID"].is_null());
    }

    #[test]
    fn update_distinguishes_absent_from_null() {
        let mut fields = TripFields {
            fare_amount: Some(12.5),
            tip_amount: Some(3.0),
            store_and_fwd_flag: Some("N".to_string()),
            ..TripFields::default()
        };
        let update: TripUpdate =
            serde_json::from_str(r#"{"tip_amount": null, "store_and_fwd_flag": "Y"}"#)
                .expect("parse update");

        update.apply(&mut fields);

        assert_eq!(fields.fare_amount, Some(12.5));
        assert_eq!(fields.tip_amount, None);
        assert_eq!(fields.store_and_fwd_flag.as_deref(), Some("Y"));
    }

    #[test]
    fn import_method_parses_case_insensitively() {
        assert_eq!("COPY".parse::<ImportMethod>(), Ok(ImportMethod::Copy));
        assert_eq!(" values ".parse::<ImportMethod>(), Ok(ImportMethod::Values));
        assert!("bulk".parse::<ImportMethod>().is_err());
    }

    #[test]
    fn import_method_deserializes_in_any_case() {
        let method: ImportMethod = serde_json::from_str(r#""COPY""#).expect("method");
        assert_eq!(method, ImportMethod::Copy);
        let method: ImportMethod = serde_json::from_str(r#""Values""#).expect("method");
        assert_eq!(method, ImportMethod::Values);
        assert!(serde_json::from_str::<ImportMethod>(r#""bulk""#).is_err());
        assert_eq!(
            serde_json::to_value(ImportMethod::Values).expect("json"),
            serde_json::json!("values")
        );
    }

    #[test]
    fn import_log_always_carries_rows_imported() {
        let log = ImportLog {
            file_name: "yellow_tripdata_2024-01.parquet".to_string(),
            import_date: DateTime::from_timestamp(1_704_067_200, 0).expect("timestamp"),
            rows_imported: None,
        };

        let json = serde_json::to_value(&log).expect("json");

        assert_eq!(json.get("rows_imported"), Some(&serde_json::Value::Null));
    }
}
