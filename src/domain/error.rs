//! Error types for the inversion lifecycle.
//!
//! This module defines the centralized error type [`MolonariError`] and a type alias
//! [`Result`] used throughout the crate. Errors are implemented with `thiserror`.
//!
//! Errors fall into two groups. Lifecycle errors (`Validation`, `Busy`,
//! `ComputationFailed`, `StoreInconsistency`, `NotAvailable`) describe what went
//! wrong with a request and are meant to be shown to the user. Infrastructure
//! errors (`Storage`, `Io`, `Csv`, `Config`, `Worker`) wrap failures of the
//! underlying collaborators.

use crate::domain::point::PointId;
use crate::domain::state::{ComputationState, ResultKind};
use thiserror::Error;

/// The main error type for computation, storage and read-model operations.
///
/// # Examples
///
/// ```
/// use molonari::MolonariError;
///
/// fn check_cells(cell_count: usize, layers: usize) -> Result<(), MolonariError> {
///     if cell_count < layers {
///         return Err(MolonariError::Validation(format!(
///             "{cell_count} cells cannot hold {layers} layers"
///         )));
///     }
///     Ok(())
/// }
///
/// assert!(check_cells(1, 2).is_err());
/// ```
#[derive(Debug, Error)]
pub enum MolonariError {
    /// A request was rejected before anything was written.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A computation for the same point is already in flight.
    #[error("Point {point} already has a computation in flight")]
    Busy {
        /// Point that owns the running computation.
        point: PointId,
    },

    /// The solver failed. Any rows written for the generation were removed.
    #[error("Computation failed: {cause}")]
    ComputationFailed {
        /// Human-readable failure reason reported by the solver or the runner.
        cause: String,
    },

    /// Stored rows violate a lifecycle invariant.
    ///
    /// Reported at read time and never repaired automatically.
    #[error("Store inconsistency: {0}")]
    StoreInconsistency(String),

    /// The requested data kind is not populated in the point's current state.
    #[error("{kind} is not available while the point is in state {state}")]
    NotAvailable {
        /// Requested data kind.
        kind: ResultKind,
        /// State the point was in when the request was made.
        state: ComputationState,
    },

    /// No point with this identifier exists.
    #[error("Unknown point: {0}")]
    UnknownPoint(PointId),

    /// The generation being written was deleted by someone else.
    ///
    /// The orchestrator turns this into a silent discard.
    #[error("Generation for point {point} was deleted while it was being written")]
    GenerationDiscarded {
        /// Point whose generation disappeared.
        point: PointId,
    },

    /// SQLite operation failed.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Filesystem or I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV export failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration is invalid or could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The computation worker could not be started or disappeared.
    #[error("Worker error: {0}")]
    Worker(String),
}

impl MolonariError {
    /// Convenience constructor for [`MolonariError::ComputationFailed`].
    pub fn computation_failed(cause: impl Into<String>) -> Self {
        Self::ComputationFailed {
            cause: cause.into(),
        }
    }
}

/// A specialized `Result` type for crate operations.
pub type Result<T> = std::result::Result<T, MolonariError>;
