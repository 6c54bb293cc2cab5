//! Domain layer: identities, measurements, parameters and the state machine.
//!
//! Nothing in here touches SQLite or threads. The storage, worker and
//! coordinator layers build on these types.
//!
//! # Organization
//!
//! - [`error`]: Error types and result alias
//! - [`point`]: Point identity and physical configuration
//! - [`measures`]: Raw and cleaned measurement rows
//! - [`model`]: Layer parameters, priors and quantiles
//! - [`state`]: Derived computation state and data kinds

pub mod error;
pub mod measures;
pub mod model;
pub mod point;
pub mod state;

pub use error::{MolonariError, Result};
pub use measures::{CleanedMeasure, RawMeasure, DATE_FORMAT};
pub use model::{LayerParameters, LayerPriors, Parameter, PriorRange, Quantile};
pub use point::{PointId, PointSetup, SHAFT_SENSOR_COUNT, THERMOMETER_COUNT};
pub use state::{ComputationState, ResultKind, StoreCounts};
