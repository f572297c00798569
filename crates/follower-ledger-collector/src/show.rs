//! Print a stored partition as JSON lines.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use follower_ledger::codec::format_timestamp;
use follower_ledger::{Observation, PartitionedStore};
use serde::Serialize;
use std::io::Write;

/// One output line, with the stored column names.
#[derive(Debug, Serialize)]
pub struct ShownRow<'a> {
    pub data_hora: String,
    pub perfil: &'a str,
    pub seguidores: u64,
}

impl<'a> From<&'a Observation> for ShownRow<'a> {
    fn from(row: &'a Observation) -> Self {
        Self {
            data_hora: format_timestamp(&row.timestamp),
            perfil: &row.profile_id,
            seguidores: row.follower_count,
        }
    }
}

/// Write every row of `profile`'s partition for `date` to `out`, one JSON object per line.
///
/// Returns the number of rows written.
pub async fn write_partition<W: Write>(
    store: &PartitionedStore,
    profile: &str,
    date: NaiveDate,
    out: &mut W,
) -> Result<usize> {
    let location = store.locate(profile, date);
    let rows = store
        .read(profile, date)
        .await
        .with_context(|| format!("failed to read partition {location}"))?;

    for row in &rows {
        serde_json::to_writer(&mut *out, &ShownRow::from(row))?;
        writeln!(out)?;
    }
    Ok(rows.len())
}
