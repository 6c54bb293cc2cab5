//! Computation state machine.
//!
//! The state of a point is never stored. It is derived from row counts every
//! time it is needed, so it can never disagree with the data:
//!
//! ```text
//! NoData ──raw──▶ RawMeasuresOnly ──cleanup──▶ CleanedMeasures
//!                                                 │        ▲
//!                                        runDirect│        │deleteGeneration
//!                                                 ▼        │
//!                                             DirectModel ─┤
//!                                                 │        │
//!                                   runCalibration│        │
//!                                                 ▼        │
//!                                             Calibrated ──┘
//! ```
//!
//! Each state unlocks a fixed set of [`ResultKind`]s. Read models consult
//! [`ComputationState::supports`] before touching the store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a monitoring point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComputationState {
    /// Nothing has been imported.
    NoData,
    /// Raw measures exist but have not been cleaned.
    RawMeasuresOnly,
    /// Cleaned measures exist and no computation has completed.
    CleanedMeasures,
    /// A direct model run completed (quantile 0 only).
    DirectModel,
    /// A calibration completed (quantile 0 plus requested quantiles).
    Calibrated,
}

/// Row counts the state is derived from.
///
/// Also used as a cheap fingerprint: two equal values mean the inputs and the
/// completed generation of a point did not change in between.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    /// Raw measure rows.
    pub raw: usize,
    /// Cleaned measure rows.
    pub cleaned: usize,
    /// Largest cleaned measure row id; changes whenever cleaned rows are replaced.
    pub cleaned_revision: i64,
    /// Quantile rows of the completed generation.
    pub quantiles: usize,
    /// Identifier of the point's generation, pending or complete.
    pub generation: Option<i64>,
}

impl StoreCounts {
    /// Returns `true` if the computation inputs are unchanged.
    #[must_use]
    pub const fn same_inputs(&self, other: &Self) -> bool {
        self.cleaned == other.cleaned && self.cleaned_revision == other.cleaned_revision
    }
}

impl ComputationState {
    /// Derives the state from row counts.
    #[must_use]
    pub const fn from_counts(counts: &StoreCounts) -> Self {
        if counts.cleaned > 0 {
            match counts.quantiles {
                0 => Self::CleanedMeasures,
                1 => Self::DirectModel,
                _ => Self::Calibrated,
            }
        } else if counts.raw > 0 {
            Self::RawMeasuresOnly
        } else {
            Self::NoData
        }
    }

    /// Data kinds populated in this state.
    #[must_use]
    pub const fn available_kinds(self) -> &'static [ResultKind] {
        use ResultKind::{
            AdvectiveFlow, CleanedMeasures, ConductiveFlow, LayerParameters, ParamHistogram,
            RawMeasures, Rmse, Temperature, TotalFlow, WaterFlux,
        };

        match self {
            Self::NoData => &[],
            Self::RawMeasuresOnly => &[RawMeasures],
            Self::CleanedMeasures => &[RawMeasures, CleanedMeasures],
            Self::DirectModel => &[
                RawMeasures,
                CleanedMeasures,
                Temperature,
                AdvectiveFlow,
                ConductiveFlow,
                TotalFlow,
                WaterFlux,
                Rmse,
                LayerParameters,
            ],
            Self::Calibrated => &[
                RawMeasures,
                CleanedMeasures,
                Temperature,
                AdvectiveFlow,
                ConductiveFlow,
                TotalFlow,
                WaterFlux,
                Rmse,
                LayerParameters,
                ParamHistogram,
            ],
        }
    }

    /// Returns `true` if `kind` can be read in this state.
    #[must_use]
    pub fn supports(self, kind: ResultKind) -> bool {
        self.available_kinds().contains(&kind)
    }
}

impl fmt::Display for ComputationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoData => "NoData",
            Self::RawMeasuresOnly => "RawMeasuresOnly",
            Self::CleanedMeasures => "CleanedMeasures",
            Self::DirectModel => "DirectModel",
            Self::Calibrated => "Calibrated",
        };
        f.write_str(name)
    }
}

/// Kind of data a read model exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultKind {
    RawMeasures,
    CleanedMeasures,
    Temperature,
    AdvectiveFlow,
    ConductiveFlow,
    TotalFlow,
    WaterFlux,
    Rmse,
    /// Layer split and best parameters of the computation.
    LayerParameters,
    ParamHistogram,
}

impl ResultKind {
    /// Kinds stored as depth-time grids.
    pub const GRIDS: [Self; 4] = [
        Self::Temperature,
        Self::AdvectiveFlow,
        Self::ConductiveFlow,
        Self::TotalFlow,
    ];

    /// Returns `true` for kinds stored per (date, depth, quantile).
    #[must_use]
    pub const fn is_grid(self) -> bool {
        matches!(
            self,
            Self::Temperature | Self::AdvectiveFlow | Self::ConductiveFlow | Self::TotalFlow
        )
    }

    /// Display title of the kind.
    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::RawMeasures => "Raw measures",
            Self::CleanedMeasures => "Cleaned measures",
            Self::Temperature => "Temperature (K)",
            Self::AdvectiveFlow => "Advective heat flow (W/m2)",
            Self::ConductiveFlow => "Conductive heat flow (W/m2)",
            Self::TotalFlow => "Total heat flow (W/m2)",
            Self::WaterFlux => "Water flux (m/s)",
            Self::Rmse => "RMSE",
            Self::LayerParameters => "Layer parameters",
            Self::ParamHistogram => "Parameter distribution",
        }
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(raw: usize, cleaned: usize, quantiles: usize) -> StoreCounts {
        StoreCounts {
            raw,
            cleaned,
            quantiles,
            ..StoreCounts::default()
        }
    }

    #[test]
    fn state_follows_row_counts() {
        assert_eq!(ComputationState::from_counts(&counts(0, 0, 0)), ComputationState::NoData);
        assert_eq!(
            ComputationState::from_counts(&counts(10, 0, 0)),
            ComputationState::RawMeasuresOnly
        );
        assert_eq!(
            ComputationState::from_counts(&counts(10, 8, 0)),
            ComputationState::CleanedMeasures
        );
        assert_eq!(
            ComputationState::from_counts(&counts(10, 8, 1)),
            ComputationState::DirectModel
        );
        assert_eq!(
            ComputationState::from_counts(&counts(10, 8, 4)),
            ComputationState::Calibrated
        );
    }

    #[test]
    fn histograms_need_a_calibration() {
        assert!(!ComputationState::DirectModel.supports(ResultKind::ParamHistogram));
        assert!(ComputationState::Calibrated.supports(ResultKind::ParamHistogram));
    }

    #[test]
    fn flux_kinds_need_results() {
        for kind in ResultKind::GRIDS {
            assert!(!ComputationState::CleanedMeasures.supports(kind));
            assert!(ComputationState::DirectModel.supports(kind));
        }
        assert!(!ComputationState::RawMeasuresOnly.supports(ResultKind::WaterFlux));
    }

    #[test]
    fn layers_exist_once_a_computation_completed() {
        assert!(!ComputationState::CleanedMeasures.supports(ResultKind::LayerParameters));
        assert!(ComputationState::DirectModel.supports(ResultKind::LayerParameters));
        assert!(ComputationState::Calibrated.supports(ResultKind::LayerParameters));
    }

    #[test]
    fn states_are_ordered_along_the_lifecycle() {
        assert!(ComputationState::CleanedMeasures < ComputationState::DirectModel);
        assert!(ComputationState::DirectModel < ComputationState::Calibrated);
    }
}
