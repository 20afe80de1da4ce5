//! CSV export for recorded step results.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::results::ResultRecord;

/// Exports result records to a CSV file at the given path.
///
/// Writes a `time` column followed by one column per recorded point, in
/// name order. Produces deterministic output for identical inputs.
///
/// # Errors
///
/// Returns an `io::Error` if file creation or writing fails.
pub fn export_csv(records: &[ResultRecord], path: &Path) -> io::Result<()> {
    let file = File::create(path)?;
    let buf = io::BufWriter::new(file);
    write_csv(records, buf)
}

/// Writes result records as CSV to any writer.
///
/// Points missing from a record are written as empty cells.
///
/// # Errors
///
/// Returns an `io::Error` if writing fails.
pub fn write_csv(records: &[ResultRecord], writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    let columns: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.values.keys().map(String::as_str))
        .collect();

    wtr.write_record(std::iter::once("time").chain(columns.iter().copied()))?;

    for r in records {
        let mut row = Vec::with_capacity(columns.len() + 1);
        row.push(format!("{}", r.time));
        row.extend(
            columns
                .iter()
                .map(|c| r.get(c).map(|v| v.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(())
}
