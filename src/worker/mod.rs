//! Computation workers and their orchestrator.
//!
//! Solver calls can take minutes, so every computation runs on its own worker
//! thread. Results travel back through a oneshot channel wrapped in a
//! [`ComputationHandle`], and a broadcast channel tells coordinators when to
//! drop cached read models.
//!
//! # Architecture
//!
//! - `messages`: Requests, outcomes and events with trace context propagation
//! - `handler`: Worker logic that solves and writes one generation
//! - `orchestrator`: Validation, single-flight control and thread dispatch

pub mod handler;
pub mod messages;
pub mod orchestrator;

pub use handler::{GenerationRunner, Job};
pub use messages::{
    ComputationEvent, ComputationOutcome, ComputationRequest, ComputationSummary, TraceContext,
};
pub use orchestrator::{ComputationHandle, ComputationOrchestrator, FlightGuard};
