//! Parquet encoding of a partition's rows.
//!
//! Columns: `data_hora` (RFC 3339 string), `perfil` (string),
//! `seguidores` (int64). Files are Snappy-compressed and hold one row group.

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Int64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, SubsecRound, Timelike, Utc};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

use crate::types::{LedgerError, LedgerResult, Observation};

pub const COL_TIMESTAMP: &str = "data_hora";
pub const COL_PROFILE: &str = "perfil";
pub const COL_FOLLOWERS: &str = "seguidores";

/// Arrow schema shared by every partition file.
pub fn schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(COL_TIMESTAMP, DataType::Utf8, false),
        Field::new(COL_PROFILE, DataType::Utf8, false),
        Field::new(COL_FOLLOWERS, DataType::Int64, false),
    ]))
}

/// `2026-01-12T10:00:00+00:00`, or `...10:00:00.123456+00:00` when there is a
/// sub-second part. Precision is capped at microseconds.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    let ts = ts.trunc_subsecs(6);
    let precision = if ts.nanosecond() == 0 {
        SecondsFormat::Secs
    } else {
        SecondsFormat::Micros
    };
    ts.to_rfc3339_opts(precision, false)
}

pub fn parse_timestamp(raw: &str) -> LedgerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| LedgerError::Codec(format!("invalid {COL_TIMESTAMP} '{raw}': {e}")))
}

/// Writer for partition files.
pub struct RowWriter;

/// Reader for partition files.
pub struct RowReader;

impl RowWriter {
    /// Encode `rows` in order into a complete Parquet file.
    pub fn encode(rows: &[Observation]) -> LedgerResult<Bytes> {
        let batch = Self::to_batch(rows)?;

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();

        let mut buf = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))?;
        writer.write(&batch)?;
        writer.close()?;

        Ok(Bytes::from(buf))
    }

    fn to_batch(rows: &[Observation]) -> LedgerResult<RecordBatch> {
        let timestamps: Vec<String> = rows.iter().map(|r| format_timestamp(&r.timestamp)).collect();
        let profiles: Vec<&str> = rows.iter().map(|r| r.profile_id.as_str()).collect();
        let followers = rows
            .iter()
            .map(|r| {
                i64::try_from(r.follower_count).map_err(|_| {
                    LedgerError::Codec(format!(
                        "{COL_FOLLOWERS} {} does not fit in int64",
                        r.follower_count
                    ))
                })
            })
            .collect::<LedgerResult<Vec<i64>>>()?;

        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(timestamps)),
            Arc::new(StringArray::from(profiles)),
            Arc::new(Int64Array::from(followers)),
        ];
        Ok(RecordBatch::try_new(schema(), columns)?)
    }
}

impl RowReader {
    /// Decode every row of a partition file, in file order.
    ///
    /// Any structural problem (not Parquet, missing or mistyped column, null,
    /// bad timestamp, negative count) is an error; callers decide whether
    /// that means quarantine.
    pub fn decode(contents: Bytes) -> LedgerResult<Vec<Observation>> {
        let reader = ParquetRecordBatchReaderBuilder::try_new(contents)?.build()?;

        let mut rows = Vec::new();
        for batch in reader {
            let batch = batch?;
            Self::append_batch(&batch, &mut rows)?;
        }
        Ok(rows)
    }

    fn append_batch(batch: &RecordBatch, rows: &mut Vec<Observation>) -> LedgerResult<()> {
        let timestamps = string_column(batch, COL_TIMESTAMP)?;
        let profiles = string_column(batch, COL_PROFILE)?;
        let followers = int_column(batch, COL_FOLLOWERS)?;

        for i in 0..batch.num_rows() {
            if timestamps.is_null(i) || profiles.is_null(i) || followers.is_null(i) {
                return Err(LedgerError::Codec(format!("null value in row {i}")));
            }
            let count = followers.value(i);
            let follower_count = u64::try_from(count).map_err(|_| {
                LedgerError::Codec(format!("negative {COL_FOLLOWERS} {count} in row {i}"))
            })?;
            rows.push(Observation {
                timestamp: parse_timestamp(timestamps.value(i))?,
                profile_id: profiles.value(i).to_string(),
                follower_count,
            });
        }
        Ok(())
    }
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> LedgerResult<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| LedgerError::Codec(format!("missing column {name}")))
}

fn string_column(batch: &RecordBatch, name: &str) -> LedgerResult<StringArray> {
    let col = column(batch, name)?;
    if !matches!(
        col.data_type(),
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
    ) {
        return Err(LedgerError::Codec(format!(
            "column {name} has type {}, expected string",
            col.data_type()
        )));
    }
    let normalized = cast(col, &DataType::Utf8)?;
    normalized
        .as_any()
        .downcast_ref::<StringArray>()
        .cloned()
        .ok_or_else(|| LedgerError::Codec(format!("column {name} is not a string array")))
}

fn int_column(batch: &RecordBatch, name: &str) -> LedgerResult<Int64Array> {
    let col = column(batch, name)?;
    if !col.data_type().is_integer() {
        return Err(LedgerError::Codec(format!(
            "column {name} has type {}, expected integer",
            col.data_type()
        )));
    }
    let normalized = cast(col, &DataType::Int64)?;
    normalized
        .as_any()
        .downcast_ref::<Int64Array>()
        .cloned()
        .ok_or_else(|| LedgerError::Codec(format!("column {name} is not an int64 array")))
}
