//! Results store abstraction.
//!
//! The [`ResultsStore`] trait is the only way computation results reach
//! persistence. It is deliberately shaped around the generation lifecycle
//! rather than around tables: a generation is opened, filled by a fixed
//! sequence of atomic commits, then marked complete.
//!
//! ```text
//! begin_generation ─▶ commit_layers ─▶ commit_quantile (0, q1, q2, …)
//!                  ─▶ commit_rmse ─▶ commit_samples ─▶ finish_generation
//! ```
//!
//! Each step runs in its own transaction. If the process stops between two
//! steps, the generation stays `pending`, is invisible to readers, and
//! [`ResultsStore::delete_generation`] still removes everything it wrote.

use crate::domain::error::{MolonariError, Result};
use crate::domain::{
    CleanedMeasure, ComputationState, LayerParameters, PointId, PointSetup, Quantile, RawMeasure,
    ResultKind, StoreCounts,
};
use crate::storage::models::{
    DepthTimeGrid, Generation, GenerationCounts, LayerRecord, PointRecord, QuantileGrids,
    RmseRecord,
};
use chrono::NaiveDateTime;
use std::sync::{Arc, Mutex, MutexGuard};

/// Store shared between the orchestrator, its workers and the coordinators.
pub type SharedStore = Arc<Mutex<dyn ResultsStore>>;

/// Wraps a store for sharing.
pub fn share<S: ResultsStore + 'static>(store: S) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Locks a shared store.
///
/// # Errors
///
/// Returns [`MolonariError::Worker`] if a thread panicked while holding the lock.
pub fn lock_store(store: &SharedStore) -> Result<MutexGuard<'_, dyn ResultsStore + 'static>> {
    store
        .lock()
        .map_err(|_| MolonariError::Worker("results store lock poisoned".to_string()))
}

/// Abstraction over the persistence backend of points, measures and results.
///
/// # Implementations
///
/// - [`SqliteStore`](crate::storage::SqliteStore): SQLite file or in-memory database
pub trait ResultsStore: Send {
    // ───────────────────── Points ─────────────────────

    /// Registers a point, or returns the existing one with the same name.
    ///
    /// # Errors
    ///
    /// Returns an error if the setup is invalid or the write fails.
    fn register_point(&mut self, name: &str, setup: &PointSetup) -> Result<PointId>;

    /// Reads a point.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::UnknownPoint`] if it does not exist.
    fn point(&self, point: PointId) -> Result<PointRecord>;

    /// Looks a point up by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn find_point(&self, name: &str) -> Result<Option<PointRecord>>;

    /// Deletes a point together with its measures and generation.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete_point(&mut self, point: PointId) -> Result<()>;

    // ───────────────────── Measures ─────────────────────

    /// Appends raw measures and returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns an error if the point is unknown or the write fails.
    fn insert_raw_measures(&mut self, point: PointId, measures: &[RawMeasure]) -> Result<usize>;

    /// Reads raw measures ordered by date.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn raw_measures(&self, point: PointId) -> Result<Vec<RawMeasure>>;

    /// Deletes raw measures, cascading to cleaned measures and the generation.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete_raw_measures(&mut self, point: PointId) -> Result<()>;

    /// Replaces the cleaned measures of a point.
    ///
    /// Deletes the generation and the previous cleaned measures first. Rows
    /// with a non-finite value are skipped. Returns the number of rows kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the point is unknown or the write fails.
    fn replace_cleaned_measures(
        &mut self,
        point: PointId,
        measures: &[CleanedMeasure],
    ) -> Result<usize>;

    /// Reads cleaned measures ordered by date.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn cleaned_measures(&self, point: PointId) -> Result<Vec<CleanedMeasure>>;

    /// Deletes cleaned measures and every date row, cascading to the generation.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete_cleaned_measures(&mut self, point: PointId) -> Result<()>;

    // ───────────────────── State ─────────────────────

    /// Row counts the computation state is derived from.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::UnknownPoint`] if the point does not exist.
    fn counts(&self, point: PointId) -> Result<StoreCounts>;

    /// Current state of the point.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::UnknownPoint`] if the point does not exist.
    fn computation_state(&self, point: PointId) -> Result<ComputationState> {
        Ok(ComputationState::from_counts(&self.counts(point)?))
    }

    /// Row counts of the generation tables, pending rows included.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn generation_counts(&self, point: PointId) -> Result<GenerationCounts>;

    // ───────────────────── Generation lifecycle ─────────────────────

    /// Opens a pending generation and records the discretization step.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::Validation`] if the point still has a generation.
    fn begin_generation(&mut self, point: PointId, cell_count: usize) -> Result<Generation>;

    /// Writes the layers and their best parameters.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::GenerationDiscarded`] if the generation was deleted.
    fn commit_layers(&mut self, generation: Generation, layers: &[LayerRecord]) -> Result<()>;

    /// Writes every grid of one quantile plus its water flux.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::GenerationDiscarded`] if the generation was deleted,
    /// or [`MolonariError::StoreInconsistency`] if a non-zero quantile arrives
    /// before quantile 0 or the layers.
    fn commit_quantile(&mut self, generation: Generation, grids: &QuantileGrids) -> Result<()>;

    /// Writes fit quality for already committed quantiles.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::GenerationDiscarded`] if the generation was deleted.
    fn commit_rmse(&mut self, generation: Generation, records: &[RmseRecord]) -> Result<()>;

    /// Writes posterior samples, one list per layer in layer order.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::GenerationDiscarded`] if the generation was deleted.
    fn commit_samples(
        &mut self,
        generation: Generation,
        samples: &[Vec<LayerParameters>],
    ) -> Result<()>;

    /// Marks the generation complete, making it visible to readers.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::GenerationDiscarded`] if the generation was deleted.
    fn finish_generation(&mut self, generation: Generation) -> Result<()>;

    /// Deletes the point's generation, pending or complete.
    ///
    /// Returns `false` when there was nothing to delete.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete_generation(&mut self, point: PointId) -> Result<bool>;

    // ───────────────────── Results (completed generation only) ─────────────────────

    /// Quantiles in ascending order, quantile 0 first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn quantiles(&self, point: PointId) -> Result<Vec<Quantile>>;

    /// Layers in depth order.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn layers(&self, point: PointId) -> Result<Vec<LayerRecord>>;

    /// Depth nodes in increasing order.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn depths(&self, point: PointId) -> Result<Vec<f64>>;

    /// One result grid.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::Validation`] if `kind` is not a grid kind.
    fn grid(&self, point: PointId, quantile: Quantile, kind: ResultKind)
        -> Result<DepthTimeGrid>;

    /// Water flux time series of one quantile.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn water_flux(&self, point: PointId, quantile: Quantile) -> Result<Vec<(NaiveDateTime, f64)>>;

    /// Fit quality of every quantile, quantile 0 first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn rmse(&self, point: PointId) -> Result<Vec<RmseRecord>>;

    /// Posterior samples of one layer.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn samples(&self, point: PointId, layer_ordinal: usize) -> Result<Vec<LayerParameters>>;
}
