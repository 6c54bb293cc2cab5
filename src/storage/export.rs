//! CSV export of cleaned measures.
//!
//! A point's cleaned measures are exported as two files, one for the pressure
//! sensor and one for the temperature shaft, with the same column layout the
//! field loggers use.

use crate::domain::error::Result;
use crate::domain::measures::format_date;
use crate::domain::CleanedMeasure;
use std::io::Write;
use std::path::{Path, PathBuf};

const PRESSURE_HEADER: [&str; 3] = ["Date", "Differential pressure (m)", "Temperature (K)"];

const TEMPERATURE_HEADER: [&str; 5] = [
    "Date",
    "Temperature 1 (K)",
    "Temperature 2 (K)",
    "Temperature 3 (K)",
    "Temperature 4 (K)",
];

/// Files written by [`export_cleaned_measures`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    pub pressures: PathBuf,
    pub temperatures: PathBuf,
}

/// Writes the pressure-sensor columns of cleaned measures as CSV.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_pressures<W: Write>(measures: &[CleanedMeasure], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(PRESSURE_HEADER)?;
    for row in measures {
        csv.write_record([
            format_date(&row.timestamp),
            row.pressure.to_string(),
            row.bed_temperature.to_string(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

/// Writes the shaft temperature columns of cleaned measures as CSV.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_temperatures<W: Write>(measures: &[CleanedMeasure], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(TEMPERATURE_HEADER)?;
    for row in measures {
        let mut record = vec![format_date(&row.timestamp)];
        record.extend(row.temperatures.iter().map(f64::to_string));
        csv.write_record(&record)?;
    }
    csv.flush()?;
    Ok(())
}

/// Exports cleaned measures to `cleanedPressures<name>.csv` and
/// `cleanedTemperatures<name>.csv` inside `dir`.
///
/// # Errors
///
/// Returns an error if the directory or a file cannot be written.
pub fn export_cleaned_measures(
    measures: &[CleanedMeasure],
    dir: &Path,
    point_name: &str,
) -> Result<ExportedFiles> {
    std::fs::create_dir_all(dir)?;

    let files = ExportedFiles {
        pressures: dir.join(format!("cleanedPressures{point_name}.csv")),
        temperatures: dir.join(format!("cleanedTemperatures{point_name}.csv")),
    };
    write_pressures(measures, std::fs::File::create(&files.pressures)?)?;
    write_temperatures(measures, std::fs::File::create(&files.temperatures)?)?;

    tracing::info!(
        rows = measures.len(),
        pressures = %files.pressures.display(),
        temperatures = %files.temperatures.display(),
        "cleaned measures exported"
    );
    Ok(files)
}
