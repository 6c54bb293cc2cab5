//! Contract with the external numerical solver.
//!
//! The forward integrator and the MCMC sampler live outside this crate. They
//! plug in through the [`Solver`] trait and exchange plain data: a
//! [`Discretization`], per-layer parameters or priors, and the cleaned time
//! series of the point.
//!
//! Grids returned by the solver are indexed `[time][depth]`, with one row per
//! cleaned timestamp and one column per discretization node.
//!
//! # Modules
//!
//! - `discretization`: Cell-centred vertical grid honoring layer boundaries
//! - `statistics`: RMSE scoring, posterior quantiles, thinning, histograms

pub mod discretization;
pub mod statistics;

pub use discretization::Discretization;
pub use statistics::Histogram;

use crate::domain::{CleanedMeasure, LayerParameters, LayerPriors, PointSetup};
use thiserror::Error;

/// Failure reported by a solver implementation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SolverError {
    pub message: String,
}

impl SolverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Time series and column configuration handed to the solver.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverInput {
    pub setup: PointSetup,
    /// Cleaned measures in time order.
    pub measures: Vec<CleanedMeasure>,
}

impl SolverInput {
    #[must_use]
    pub fn time_count(&self) -> usize {
        self.measures.len()
    }
}

/// Output of one forward run.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardRun {
    pub temperature: Vec<Vec<f64>>,
    pub advective_flow: Vec<Vec<f64>>,
    pub conductive_flow: Vec<Vec<f64>>,
    /// Water flux at the river-bed interface, one value per timestamp.
    pub water_flux: Vec<f64>,
}

impl ForwardRun {
    /// Checks that every grid has `times` rows of `nodes` values.
    ///
    /// # Errors
    ///
    /// Returns a [`SolverError`] describing the first mismatch.
    pub fn check_shape(&self, times: usize, nodes: usize) -> Result<(), SolverError> {
        let grids = [
            ("temperature", &self.temperature),
            ("advective flow", &self.advective_flow),
            ("conductive flow", &self.conductive_flow),
        ];
        for (name, grid) in grids {
            if grid.len() != times || grid.iter().any(|row| row.len() != nodes) {
                return Err(SolverError::new(format!(
                    "{name} grid does not match {times} timestamps x {nodes} nodes"
                )));
            }
        }
        if self.water_flux.len() != times {
            return Err(SolverError::new(format!(
                "water flux has {} values for {times} timestamps",
                self.water_flux.len()
            )));
        }
        Ok(())
    }
}

/// Output of a calibration.
#[derive(Debug, Clone, PartialEq)]
pub struct Calibration {
    /// Best parameters, one entry per layer.
    pub best: Vec<LayerParameters>,
    /// Posterior samples, one list per layer.
    pub samples: Vec<Vec<LayerParameters>>,
}

/// Numerical back end running forward models and calibrations.
///
/// Implementations are called from computation worker threads and must be
/// shareable across them.
pub trait Solver: Send + Sync {
    /// Runs the forward model with fixed per-layer parameters.
    ///
    /// # Errors
    ///
    /// Returns a [`SolverError`] if the integration fails.
    fn solve(
        &self,
        discretization: &Discretization,
        parameters: &[LayerParameters],
        input: &SolverInput,
    ) -> Result<ForwardRun, SolverError>;

    /// Runs a Monte-Carlo calibration over `iterations` draws.
    ///
    /// # Errors
    ///
    /// Returns a [`SolverError`] if the sampler fails.
    fn calibrate(
        &self,
        discretization: &Discretization,
        priors: &[LayerPriors],
        input: &SolverInput,
        iterations: usize,
    ) -> Result<Calibration, SolverError>;
}
