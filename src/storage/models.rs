//! Storage record models.
//!
//! These types describe what goes in and out of the store. They are separate
//! from the solver outputs so the commit protocol does not depend on solver
//! internals.

use crate::domain::{LayerParameters, PointId, PointSetup, Quantile, THERMOMETER_COUNT};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A registered monitoring point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub id: PointId,
    pub name: String,
    pub setup: PointSetup,
    /// Number of cells of the current generation, if any.
    pub cell_count: Option<usize>,
}

/// Handle on a generation being written.
///
/// Every commit re-checks that the generation row still exists before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generation {
    pub id: i64,
    pub point: PointId,
}

/// One layer of a generation with its best parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    /// Zero-based position from the top.
    pub ordinal: usize,
    /// Depth of the bottom of the layer (m).
    pub depth_bed: f64,
    pub best: LayerParameters,
}

/// Full result grids of one quantile.
///
/// Grids are indexed `[time][depth]`. Total flow is not part of the bundle; the
/// store derives it from the advective and conductive flows on write.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileGrids {
    pub quantile: Quantile,
    pub dates: Vec<NaiveDateTime>,
    pub depths: Vec<f64>,
    pub temperature: Vec<Vec<f64>>,
    pub advective_flow: Vec<Vec<f64>>,
    pub conductive_flow: Vec<Vec<f64>>,
    pub water_flux: Vec<f64>,
}

/// Goodness of fit of one quantile against the interior thermometers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RmseRecord {
    pub quantile: Quantile,
    /// Depth node used for each thermometer.
    pub thermometer_depths: [f64; THERMOMETER_COUNT],
    pub per_thermometer: [f64; THERMOMETER_COUNT],
    pub total: f64,
}

/// Result grid of one kind for one quantile, as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthTimeGrid {
    pub quantile: Quantile,
    pub dates: Vec<NaiveDateTime>,
    pub depths: Vec<f64>,
    /// Values indexed `[time][depth]`.
    pub values: Vec<Vec<f64>>,
}

/// Row counts of a point's generation tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationCounts {
    /// All quantile rows, pending or complete.
    pub quantiles: usize,
    pub layers: usize,
    pub depths: usize,
    pub dates: usize,
    pub results: usize,
    pub water_flows: usize,
    pub rmse: usize,
    pub samples: usize,
}
