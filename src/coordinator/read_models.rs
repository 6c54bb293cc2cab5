//! Read model types consumed by the presentation layer.
//!
//! Read models are display-ready snapshots built from store rows. They carry
//! labels and ordering already resolved, contain no business logic, and are
//! never written back.
//!
//! # Ordering
//!
//! Every per-quantile collection starts with the best-fit result (quantile 0)
//! and continues with the calibrated quantiles in ascending order.

use crate::domain::measures::format_date;
use crate::domain::{
    CleanedMeasure, ComputationState, Parameter, PointId, PointSetup, Quantile, RawMeasure,
    ResultKind, THERMOMETER_COUNT,
};
use crate::solver::Histogram;
use crate::storage::DepthTimeGrid;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Identity, configuration and state of a point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointInfo {
    pub id: PointId,
    pub name: String,
    pub setup: PointSetup,

    /// Number of cells of the current generation, if any.
    pub cell_count: Option<usize>,

    pub state: ComputationState,
}

/// Tabular view of raw or cleaned measures.
///
/// Cells are formatted for display. Missing raw readings are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasuresTable {
    /// Either [`ResultKind::RawMeasures`] or [`ResultKind::CleanedMeasures`].
    pub kind: ResultKind,

    /// Column titles, date first.
    pub headers: Vec<String>,

    /// One row per timestamp, same width as `headers`.
    pub rows: Vec<Vec<String>>,
}

impl MeasuresTable {
    #[must_use]
    pub fn raw(measures: &[RawMeasure]) -> Self {
        let mut headers = vec!["Date".to_string()];
        headers.extend((1..=4).map(|i| format!("Temperature {i} (K)")));
        headers.push("Bed temperature (K)".to_string());
        headers.push("Voltage (V)".to_string());

        let rows = measures
            .iter()
            .map(|m| {
                let mut row = vec![format_date(&m.timestamp)];
                row.extend(m.temperatures.iter().map(|t| optional_cell(*t)));
                row.push(optional_cell(m.bed_temperature));
                row.push(optional_cell(m.voltage));
                row
            })
            .collect();

        Self {
            kind: ResultKind::RawMeasures,
            headers,
            rows,
        }
    }

    #[must_use]
    pub fn cleaned(measures: &[CleanedMeasure]) -> Self {
        let mut headers = vec!["Date".to_string()];
        headers.extend((1..=4).map(|i| format!("Temperature {i} (K)")));
        headers.push("Bed temperature (K)".to_string());
        headers.push("Differential pressure (m)".to_string());

        let rows = measures
            .iter()
            .map(|m| {
                let mut row = vec![format_date(&m.timestamp)];
                row.extend(m.temperatures.iter().map(ToString::to_string));
                row.push(m.bed_temperature.to_string());
                row.push(m.pressure.to_string());
                row
            })
            .collect();

        Self {
            kind: ResultKind::CleanedMeasures,
            headers,
            rows,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn optional_cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// A labeled curve over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Legend entry, e.g. `"Best fit"` or `"Quantile 0.05"`.
    pub label: String,

    pub points: Vec<(NaiveDateTime, f64)>,
}

impl TimeSeries {
    pub fn new(label: impl Into<String>, points: Vec<(NaiveDateTime, f64)>) -> Self {
        Self {
            label: label.into(),
            points,
        }
    }

    /// Values without their timestamps.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|(_, v)| *v)
    }
}

/// Depth-time map of one quantile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthTimeMap {
    pub label: String,
    pub kind: ResultKind,
    pub grid: DepthTimeGrid,
}

impl DepthTimeMap {
    #[must_use]
    pub fn new(kind: ResultKind, grid: DepthTimeGrid) -> Self {
        Self {
            label: grid.quantile.label(),
            kind,
            grid,
        }
    }

    #[must_use]
    pub const fn quantile(&self) -> Quantile {
        self.grid.quantile
    }

    /// Time series at one depth node.
    #[must_use]
    pub fn column(&self, node: usize) -> TimeSeries {
        let points = self
            .grid
            .dates
            .iter()
            .zip(&self.grid.values)
            .filter_map(|(date, row)| row.get(node).map(|v| (*date, *v)))
            .collect();
        TimeSeries::new(self.label.clone(), points)
    }
}

/// Fit of one interior thermometer for the best-fit result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermometerFit {
    /// Depth of the node compared with the thermometer (m).
    pub depth: f64,
    pub rmse: f64,
}

/// Goodness of fit of a completed computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RmseSummary {
    /// Total RMSE of every quantile, quantile 0 first.
    pub totals: Vec<(Quantile, f64)>,

    /// Per-thermometer fit of quantile 0, top to bottom.
    pub thermometers: [ThermometerFit; THERMOMETER_COUNT],
}

impl RmseSummary {
    /// Total RMSE of the best-fit result.
    #[must_use]
    pub fn best_total(&self) -> Option<f64> {
        self.totals.first().map(|(_, total)| *total)
    }
}

/// Posterior distribution of the parameters of one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterHistograms {
    /// Bottom depth identifying the layer (m).
    pub layer_depth: f64,

    /// One histogram per parameter, in [`Parameter::ALL`] order.
    pub histograms: Vec<(Parameter, Histogram)>,
}

impl ParameterHistograms {
    #[must_use]
    pub fn get(&self, parameter: Parameter) -> Option<&Histogram> {
        self.histograms
            .iter()
            .find(|(p, _)| *p == parameter)
            .map(|(_, h)| h)
    }
}

/// Temperature over depth at one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureProfile {
    pub date: NaiveDateTime,
    pub depths: Vec<f64>,
    pub temperatures: Vec<f64>,
}

/// Index of the value closest to `target`.
pub(crate) fn nearest_index(values: &[f64], target: f64) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - target).abs().total_cmp(&(*b - target).abs()))
        .map(|(i, _)| i)
}

/// `count` indices evenly spread over `0..len`, first and last included.
pub(crate) fn spread_indices(len: usize, count: usize) -> Vec<usize> {
    if len == 0 || count == 0 {
        return Vec::new();
    }
    if count >= len {
        return (0..len).collect();
    }
    if count == 1 {
        return vec![0];
    }
    (0..count).map(|i| i * (len - 1) / (count - 1)).collect()
}
