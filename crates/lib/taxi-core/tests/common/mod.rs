#![allow(dead_code)]

use std::{fs::File, path::Path, sync::Arc};

use chrono::NaiveDateTime;
use parquet::column::writer::ColumnWriterImpl;
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType, Int32Type, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;

// Subset of the TLC yellow taxi layout, with its mixed-case column names.
const TRIP_SCHEMA: &str = "
message schema {
  OPTIONAL INT32 VendorID;
  OPTIONAL INT64 tpep_pickup_datetime (TIMESTAMP_MICROS);
  OPTIONAL INT64 tpep_dropoff_datetime (TIMESTAMP_MICROS);
  OPTIONAL DOUBLE passenger_count;
  OPTIONAL DOUBLE trip_distance;
  OPTIONAL BYTE_ARRAY store_and_fwd_flag (UTF8);
  OPTIONAL INT32 PULocationID;
  OPTIONAL INT32 DOLocationID;
  OPTIONAL DOUBLE fare_amount;
  OPTIONAL DOUBLE total_amount;
  OPTIONAL DOUBLE Airport_fee;
}
";

#[derive(Debug, Clone, Default)]
pub struct FixtureTrip {
    pub vendor_id: Option<i32>,
    pub pickup: Option<NaiveDateTime>,
    pub dropoff: Option<NaiveDateTime>,
    pub passenger_count: Option<f64>,
    pub trip_distance: Option<f64>,
    pub store_and_fwd_flag: Option<&'static str>,
    pub pu_location_id: Option<i32>,
    pub do_location_id: Option<i32>,
    pub fare_amount: Option<f64>,
    pub total_amount: Option<f64>,
    pub airport_fee: Option<f64>,
}

pub fn timestamp(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").expect("valid timestamp")
}

/// A simple trip with distinct values per `seed`.
pub fn sample_trip(seed: u8) -> FixtureTrip {
    let seed_f = f64::from(seed);
    FixtureTrip {
        vendor_id: Some(i32::from(seed % 2) + 1),
        pickup: Some(timestamp("2024-01-01 08:00:00")),
        dropoff: Some(timestamp("2024-01-01 08:30:00")),
        passenger_count: Some(1.0),
        trip_distance: Some(seed_f),
        store_and_fwd_flag: Some("N"),
        pu_location_id: Some(100 + i32::from(seed)),
        do_location_id: Some(200 + i32::from(seed)),
        fare_amount: Some(10.0 + seed_f),
        total_amount: Some(12.5 + seed_f),
        airport_fee: None,
    }
}

pub fn sample_trips(count: u8) -> Vec<FixtureTrip> {
    (1..=count).map(sample_trip).collect()
}

pub fn write_trip_file(path: &Path, trips: &[FixtureTrip]) {
    let schema = Arc::new(parse_message_type(TRIP_SCHEMA).expect("valid schema"));
    let props = Arc::new(WriterProperties::builder().build());
    let file = File::create(path).expect("create parquet file");
    let mut writer = SerializedFileWriter::new(file, schema, props).expect("create writer");
    let mut row_group = writer.next_row_group().expect("row group");

    let mut index = 0;
    while let Some(mut column) = row_group.next_column().expect("next column") {
        match index {
            0 => write_i32(column.typed::<Int32Type>(), trips, |trip| trip.vendor_id),
            1 => write_i64(column.typed::<Int64Type>(), trips, |trip| trip.pickup.map(micros)),
            2 => write_i64(column.typed::<Int64Type>(), trips, |trip| trip.dropoff.map(micros)),
            3 => write_f64(column.typed::<DoubleType>(), trips, |trip| trip.passenger_count),
            4 => write_f64(column.typed::<DoubleType>(), trips, |trip| trip.trip_distance),
            5 => write_str(column.typed::<ByteArrayType>(), trips, |trip| trip.store_and_fwd_flag),
            6 => write_i32(column.typed::<Int32Type>(), trips, |trip| trip.pu_location_id),
            7 => write_i32(column.typed::<Int32Type>(), trips, |trip| trip.do_location_id),
            8 => write_f64(column.typed::<DoubleType>(), trips, |trip| trip.fare_amount),
            9 => write_f64(column.typed::<DoubleType>(), trips, |trip| trip.total_amount),
            10 => write_f64(column.typed::<DoubleType>(), trips, |trip| trip.airport_fee),
            other => panic!("unexpected column {other}"),
        }
        column.close().expect("close column");
        index += 1;
    }

    row_group.close().expect("close row group");
    writer.close().expect("close writer");
}

pub fn write_corrupt_file(path: &Path) {
    std::fs::write(path, b"this is not a parquet file").expect("write corrupt file");
}

fn micros(value: NaiveDateTime) -> i64 {
    value.and_utc().timestamp_micros()
}

fn split<T>(trips: &[FixtureTrip], get: impl Fn(&FixtureTrip) -> Option<T>) -> (Vec<T>, Vec<i16>) {
    let mut values = Vec::new();
    let mut levels = Vec::with_capacity(trips.len());
    for trip in trips {
        match get(trip) {
            Some(value) => {
                values.push(value);
                levels.push(1);
            }
            None => levels.push(0),
        }
    }
    (values, levels)
}

fn write_i32(
    writer: &mut ColumnWriterImpl<'_, Int32Type>,
    trips: &[FixtureTrip],
    get: impl Fn(&FixtureTrip) -> Option<i32>,
) {
    let (values, levels) = split(trips, get);
    writer
        .write_batch(&values, Some(&levels), None)
        .expect("write INT32 column");
}

fn write_i64(
    writer: &mut ColumnWriterImpl<'_, Int64Type>,
    trips: &[FixtureTrip],
    get: impl Fn(&FixtureTrip) -> Option<i64>,
) {
    let (values, levels) = split(trips, get);
    writer
        .write_batch(&values, Some(&levels), None)
        .expect("write INT64 column");
}

fn write_f64(
    writer: &mut ColumnWriterImpl<'_, DoubleType>,
    trips: &[FixtureTrip],
    get: impl Fn(&FixtureTrip) -> Option<f64>,
) {
    let (values, levels) = split(trips, get);
    writer
        .write_batch(&values, Some(&levels), None)
        .expect("write DOUBLE column");
}

fn write_str(
    writer: &mut ColumnWriterImpl<'_, ByteArrayType>,
    trips: &[FixtureTrip],
    get: impl Fn(&FixtureTrip) -> Option<&'static str>,
) {
    let (values, levels) = split(trips, |trip| get(trip).map(ByteArray::from));
    writer
        .write_batch(&values, Some(&levels), None)
        .expect("write BYTE_ARRAY column");
}
