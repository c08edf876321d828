use std::{error::Error, fmt, fs::File, path::Path, path::PathBuf};

use chrono::{DateTime, NaiveDateTime};
use parquet::errors::ParquetError;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::{Field, Row};
use taxi_store::models::TripFields;
use taxi_store::schema::TripColumn;
use tokio::sync::mpsc;

// Batches buffered between the blocking reader and the async importer.
const CHANNEL_DEPTH: usize = 2;

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"];

/// Error type for Parquet read failures.
#[derive(Debug)]
pub struct ParquetReadError {
    message: String,
}

impl ParquetReadError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ParquetReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parquet read error: {}", self.message)
    }
}

impl Error for ParquetReadError {}

impl From<ParquetError> for ParquetReadError {
    fn from(err: ParquetError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<std::io::Error> for ParquetReadError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ParquetReadError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::new(err.to_string())
    }
}

pub type TripBatchReceiver = mpsc::Receiver<Result<Vec<TripFields>, ParquetReadError>>;

/// Reader for TLC yellow taxi Parquet files.
pub struct TripParquetReader;

impl TripParquetReader {
    /// Streams normalized trips to `sink` in batches of at most `batch_size`.
    ///
    /// Reading stops early when `sink` returns `false`. Returns the number of
    /// rows handed to the sink.
    ///
    /// # Errors
    /// Returns `ParquetReadError` if `batch_size` is zero or the file cannot
    /// be opened or decoded.
    pub fn read_batches(
        path: &Path,
        batch_size: usize,
        mut sink: impl FnMut(Vec<TripFields>) -> bool,
    ) -> Result<u64, ParquetReadError> {
        if batch_size == 0 {
            return Err(ParquetReadError::new("batch size must be greater than zero"));
        }

        let reader = SerializedFileReader::new(File::open(path)?)?;
        let mut delivered = 0_u64;
        let mut batch = Vec::with_capacity(batch_size.min(8_192));

        for row in reader.get_row_iter(None)? {
            batch.push(trip_from_row(&row?));
            if batch.len() >= batch_size {
                delivered += batch.len() as u64;
                if !sink(std::mem::take(&mut batch)) {
                    return Ok(delivered);
                }
            }
        }

        if !batch.is_empty() {
            delivered += batch.len() as u64;
            sink(batch);
        }
        Ok(delivered)
    }

    /// Reads `path` on a blocking thread, yielding batches over a bounded
    /// channel. Dropping the receiver stops the reader.
    #[must_use]
    pub fn spawn(path: PathBuf, batch_size: usize) -> TripBatchReceiver {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        tokio::task::spawn_blocking(move || {
            let result = Self::read_batches(&path, batch_size, |batch| {
                tx.blocking_send(Ok(batch)).is_ok()
            });
            if let Err(err) = result {
                let _ = tx.blocking_send(Err(err));
            }
        });
        rx
    }

    /// Row count recorded in the file footer.
    ///
    /// # Errors
    /// Returns `ParquetReadError` if the file cannot be opened or its footer
    /// is invalid.
    pub async fn row_count(path: impl AsRef<Path>) -> Result<i64, ParquetReadError> {
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || {
            let reader = SerializedFileReader::new(File::open(&path)?)?;
            Ok(reader.metadata().file_metadata().num_rows())
        })
        .await?
    }
}

fn trip_from_row(row: &Row) -> TripFields {
    let mut trip = TripFields::default();
    for (name, field) in row.get_column_iter() {
        let Some(column) = TripColumn::from_source_name(name) else {
            continue;
        };
        match column {
            TripColumn::VendorId => trip.vendor_id = field_to_i64(field),
            TripColumn::PickupDatetime => trip.tpep_pickup_datetime = field_to_timestamp(field),
            TripColumn::DropoffDatetime => trip.tpep_dropoff_datetime = field_to_timestamp(field),
            TripColumn::PassengerCount => trip.passenger_count = field_to_f64(field),
            TripColumn::TripDistance => trip.trip_distance = field_to_f64(field),
            TripColumn::RatecodeId => trip.ratecode_id = field_to_f64(field),
            TripColumn::StoreAndFwdFlag => trip.store_and_fwd_flag = field_to_string(field),
            TripColumn::PuLocationId => trip.pu_location_id = field_to_i64(field),
            TripColumn::DoLocationId => trip.do_location_id = field_to_i64(field),
            TripColumn::PaymentType => trip.payment_type = field_to_i64(field),
            TripColumn::FareAmount => trip.fare_amount = field_to_f64(field),
            TripColumn::Extra => trip.extra = field_to_f64(field),
            TripColumn::MtaTax => trip.mta_tax = field_to_f64(field),
            TripColumn::TipAmount => trip.tip_amount = field_to_f64(field),
            TripColumn::TollsAmount => trip.tolls_amount = field_to_f64(field),
            TripColumn::ImprovementSurcharge => trip.improvement_surcharge = field_to_f64(field),
            TripColumn::TotalAmount => trip.total_amount = field_to_f64(field),
            TripColumn::CongestionSurcharge => trip.congestion_surcharge = field_to_f64(field),
            TripColumn::AirportFee => trip.airport_fee = field_to_f64(field),
            TripColumn::CbdCongestionFee => trip.cbd_congestion_fee = field_to_f64(field),
        }
    }
    trip
}

#[allow(clippy::cast_precision_loss)]
fn field_to_f64(field: &Field) -> Option<f64> {
    let value = match field {
        Field::Byte(value) => f64::from(*value),
        Field::Short(value) => f64::from(*value),
        Field::Int(value) => f64::from(*value),
        Field::Long(value) => *value as f64,
        Field::UByte(value) => f64::from(*value),
        Field::UShort(value) => f64::from(*value),
        Field::UInt(value) => f64::from(*value),
        Field::ULong(value) => *value as f64,
        Field::Float(value) => f64::from(*value),
        Field::Double(value) => *value,
        Field::Str(value) => value.trim().parse().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

#[allow(clippy::cast_possible_truncation)]
fn field_to_i64(field: &Field) -> Option<i64> {
    match field {
        Field::Byte(value) => Some(i64::from(*value)),
        Field::Short(value) => Some(i64::from(*value)),
        Field::Int(value) => Some(i64::from(*value)),
        Field::Long(value) => Some(*value),
        Field::UByte(value) => Some(i64::from(*value)),
        Field::UShort(value) => Some(i64::from(*value)),
        Field::UInt(value) => Some(i64::from(*value)),
        Field::ULong(value) => i64::try_from(*value).ok(),
        Field::Str(value) => value.trim().parse().ok(),
        Field::Float(_) | Field::Double(_) => {
            let value = field_to_f64(field)?;
            // Older files store integer codes as doubles.
            let in_range = value >= i64::MIN as f64 && value <= i64::MAX as f64;
            (value.fract() == 0.0 && in_range).then_some(value as i64)
        }
        _ => None,
    }
}

fn field_to_timestamp(field: &Field) -> Option<NaiveDateTime> {
    match field {
        Field::TimestampMicros(value) => {
            DateTime::from_timestamp_micros(*value).map(|value| value.naive_utc())
        }
        Field::TimestampMillis(value) => {
            DateTime::from_timestamp_millis(*value).map(|value| value.naive_utc())
        }
        Field::Str(value) => {
            let value = value.trim();
            TIMESTAMP_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        }
        _ => None,
    }
}

fn field_to_string(field: &Field) -> Option<String> {
    match field {
        Field::Str(value) => Some(value.clone()),
        Field::Bytes(value) => value.as_utf8().ok().map(str::to_string),
        _ => None,
    }
}
