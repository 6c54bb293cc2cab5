//! Raw and cleaned measurement rows.
//!
//! Raw measures come straight from the field loggers and may contain gaps.
//! Cleaned measures are produced by an external cleanup step and are the only
//! input a computation ever sees.

use crate::domain::point::SHAFT_SENSOR_COUNT;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Textual timestamp format used in the store and in exported files.
pub const DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Formats a timestamp with [`DATE_FORMAT`].
#[must_use]
pub fn format_date(date: &NaiveDateTime) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses a timestamp written with [`DATE_FORMAT`].
///
/// # Errors
///
/// Returns the underlying `chrono` parse error if the text does not match.
pub fn parse_date(text: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(text, DATE_FORMAT)
}

/// One row of field data before cleanup.
///
/// Missing readings are kept as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMeasure {
    /// Acquisition time.
    pub timestamp: NaiveDateTime,

    /// Shaft temperatures, top to bottom (K).
    pub temperatures: [Option<f64>; SHAFT_SENSOR_COUNT],

    /// River-bed temperature recorded by the pressure sensor (K).
    pub bed_temperature: Option<f64>,

    /// Pressure sensor voltage before calibration (V).
    pub voltage: Option<f64>,
}

/// One row of cleaned, time-ordered data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedMeasure {
    /// Acquisition time.
    pub timestamp: NaiveDateTime,

    /// Shaft temperatures, top to bottom (K).
    pub temperatures: [f64; SHAFT_SENSOR_COUNT],

    /// River-bed temperature (K).
    pub bed_temperature: f64,

    /// Differential pressure between river and aquifer (m).
    pub pressure: f64,
}

impl CleanedMeasure {
    /// Returns `true` when every value of the row is finite.
    ///
    /// Rows failing this check are skipped when cleaned measures are stored.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.temperatures.iter().all(|t| t.is_finite())
            && self.bed_temperature.is_finite()
            && self.pressure.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn date_format_round_trips_and_sorts_lexicographically() {
        let early = NaiveDate::from_ymd_opt(2023, 2, 9)
            .unwrap()
            .and_hms_opt(8, 5, 0)
            .unwrap();
        let late = NaiveDate::from_ymd_opt(2023, 11, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();

        assert_eq!(format_date(&early), "2023/02/09 08:05:00");
        assert_eq!(parse_date(&format_date(&early)).unwrap(), early);
        assert!(format_date(&early) < format_date(&late));
    }

    #[test]
    fn nan_rows_are_incomplete() {
        let timestamp = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut row = CleanedMeasure {
            timestamp,
            temperatures: [285.0, 285.1, 285.2, 285.3],
            bed_temperature: 284.9,
            pressure: 0.02,
        };
        assert!(row.is_complete());

        row.temperatures[2] = f64::NAN;
        assert!(!row.is_complete());
    }
}
