//! Computation orchestrator.
//!
//! Accepts direct runs and calibrations, validates them synchronously, and
//! hands each one to a dedicated worker thread. Callers get a
//! [`ComputationHandle`] back immediately and never block on the solver.
//!
//! # Single flight
//!
//! At most one computation runs per point. The orchestrator keeps the set of
//! points in flight; a [`FlightGuard`] removes its point when dropped, which
//! also happens when the worker thread unwinds.
//!
//! # Notifications
//!
//! Every completion, failure, discard and reset is broadcast as a
//! [`ComputationEvent`]. Coordinators subscribe to invalidate their caches.

use crate::domain::error::{MolonariError, Result};
use crate::domain::model::requested_quantiles;
use crate::domain::{ComputationState, LayerParameters, LayerPriors, PointId};
use crate::solver::{Discretization, Solver};
use crate::storage::{lock_store, SharedStore};
use crate::worker::handler::{GenerationRunner, Job};
use crate::worker::messages::{ComputationEvent, ComputationOutcome, ComputationRequest};
use crate::Config;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::{broadcast, oneshot};

type InFlight = Arc<Mutex<HashSet<PointId>>>;

/// Ownership token of a running computation.
///
/// Holding it keeps the point marked as busy.
#[derive(Debug)]
pub struct FlightGuard {
    point: PointId,
    in_flight: InFlight,
}

impl FlightGuard {
    fn acquire(in_flight: &InFlight, point: PointId) -> Result<Self> {
        let mut points = in_flight
            .lock()
            .map_err(|_| MolonariError::Worker("in-flight registry poisoned".to_string()))?;
        if !points.insert(point) {
            tracing::debug!(point = %point, "rejecting request, computation in flight");
            return Err(MolonariError::Busy { point });
        }
        Ok(Self {
            point,
            in_flight: Arc::clone(in_flight),
        })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if let Ok(mut points) = self.in_flight.lock() {
            points.remove(&self.point);
        }
    }
}

/// Completion handle of a submitted computation.
///
/// Await it from async code or call [`ComputationHandle::wait`] from a plain
/// thread.
#[derive(Debug)]
pub struct ComputationHandle {
    point: PointId,
    receiver: oneshot::Receiver<Result<ComputationOutcome>>,
}

impl ComputationHandle {
    #[must_use]
    pub const fn point(&self) -> PointId {
        self.point
    }

    /// Blocks the current thread until the computation ends.
    ///
    /// Must not be called from inside an async runtime.
    ///
    /// # Errors
    ///
    /// Returns the computation's error, or [`MolonariError::Worker`] if the
    /// worker disappeared without reporting.
    pub fn wait(self) -> Result<ComputationOutcome> {
        self.receiver.blocking_recv().map_err(|_| worker_lost())?
    }
}

impl Future for ComputationHandle {
    type Output = Result<ComputationOutcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(worker_lost())),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn worker_lost() -> MolonariError {
    MolonariError::Worker("computation worker exited without reporting".to_string())
}

/// Runs computations for any number of points, one at a time per point.
pub struct ComputationOrchestrator {
    store: SharedStore,
    runner: GenerationRunner,
    in_flight: InFlight,
    events: broadcast::Sender<ComputationEvent>,
}

impl ComputationOrchestrator {
    /// Creates an orchestrator over a shared store and solver.
    pub fn new(store: SharedStore, solver: Arc<dyn Solver>, config: &Config) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            runner: GenerationRunner::new(
                Arc::clone(&store),
                solver,
                config.max_posterior_samples,
            ),
            store,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            events,
        }
    }

    /// Store this orchestrator writes to.
    #[must_use]
    pub fn store(&self) -> SharedStore {
        Arc::clone(&self.store)
    }

    /// Subscribes to computation notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ComputationEvent> {
        self.events.subscribe()
    }

    /// Returns `true` while a computation for `point` is running.
    #[must_use]
    pub fn is_running(&self, point: PointId) -> bool {
        self.in_flight
            .lock()
            .map(|points| points.contains(&point))
            .unwrap_or(false)
    }

    /// Starts a forward run with fixed parameters.
    ///
    /// `boundaries` lists layer boundaries `[0, b1, …, H]` below the river bed;
    /// `parameters` holds one set per layer.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::Busy`] if the point is already computing, or
    /// [`MolonariError::Validation`] if the request or the point's state is
    /// unsuitable. Nothing is written in either case.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use molonari::worker::ComputationOrchestrator;
    /// # use molonari::{LayerParameters, PointId};
    /// # fn demo(orchestrator: &ComputationOrchestrator, point: PointId) -> molonari::Result<()> {
    /// let sand = LayerParameters {
    ///     permeability: 11.0,
    ///     thermal_conductivity: 2.0,
    ///     porosity: 0.15,
    ///     heat_capacity: 4e6,
    /// };
    /// let handle = orchestrator.run_direct(point, &[0.0, 0.3, 0.6], &[sand, sand], 20)?;
    /// let outcome = handle.wait()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn run_direct(
        &self,
        point: PointId,
        boundaries: &[f64],
        parameters: &[LayerParameters],
        cell_count: usize,
    ) -> Result<ComputationHandle> {
        let _span = tracing::info_span!("run_direct", point = %point).entered();
        let request = ComputationRequest::direct(
            point,
            boundaries.to_vec(),
            parameters.to_vec(),
            cell_count,
        );
        self.dispatch(request)
    }

    /// Starts a calibration followed by forward runs for quantile 0 and every
    /// requested quantile.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::Busy`] if the point is already computing, or
    /// [`MolonariError::Validation`] if the request or the point's state is
    /// unsuitable. Nothing is written in either case.
    pub fn run_calibration(
        &self,
        point: PointId,
        boundaries: &[f64],
        priors: &[LayerPriors],
        cell_count: usize,
        iterations: usize,
        quantiles: &[f64],
    ) -> Result<ComputationHandle> {
        let _span = tracing::info_span!("run_calibration", point = %point).entered();
        let request = ComputationRequest::calibration(
            point,
            boundaries.to_vec(),
            priors.to_vec(),
            cell_count,
            iterations,
            requested_quantiles(quantiles)?,
        );
        self.dispatch(request)
    }

    /// Deletes the point's generation and notifies subscribers.
    ///
    /// A computation still running for the point notices the deletion and
    /// discards its results.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn delete_generation(&self, point: PointId) -> Result<bool> {
        let removed = lock_store(&self.store)?.delete_generation(point)?;
        let _ = self.events.send(ComputationEvent::Reset { point });
        Ok(removed)
    }

    /// Validates a request and spawns its worker.
    fn dispatch(&self, request: ComputationRequest) -> Result<ComputationHandle> {
        let point = request.point();
        let guard = FlightGuard::acquire(&self.in_flight, point)?;
        let job = self.prepare(request)?;

        let (sender, receiver) = oneshot::channel();
        let runner = self.runner.clone();
        let events = self.events.clone();
        let span = tracing::Span::current();

        std::thread::Builder::new()
            .name(format!("molonari-point-{}", point.0))
            .spawn(move || {
                let outcome = span.in_scope(|| runner.handle_job(job));
                drop(guard);

                let event = match &outcome {
                    Ok(ComputationOutcome::Completed(summary)) => ComputationEvent::Completed {
                        point,
                        state: summary.state,
                    },
                    Ok(ComputationOutcome::Discarded { .. }) => ComputationEvent::Discarded { point },
                    Err(e) => ComputationEvent::Failed {
                        point,
                        cause: e.to_string(),
                    },
                };
                let _ = events.send(event);
                let _ = sender.send(outcome);
            })
            .map_err(|e| MolonariError::Worker(format!("failed to spawn worker: {e}")))?;

        tracing::info!(point = %point, "computation started");
        Ok(ComputationHandle { point, receiver })
    }

    /// Checks the request against the point's setup and state.
    fn prepare(&self, request: ComputationRequest) -> Result<Job> {
        let point = request.point();
        let (record, accepted) = {
            let store = lock_store(&self.store)?;
            (store.point(point)?, store.counts(point)?)
        };
        let state = ComputationState::from_counts(&accepted);

        if state < ComputationState::CleanedMeasures {
            return Err(MolonariError::Validation(format!(
                "point {point} has no cleaned measures (state {state})"
            )));
        }

        let boundaries = request.boundaries();
        let shaft_depth = record.setup.shaft_depth();
        if boundaries.last().is_some_and(|bottom| *bottom > shaft_depth) {
            return Err(MolonariError::Validation(format!(
                "layer boundaries {boundaries:?} exceed the shaft depth {shaft_depth}"
            )));
        }
        let discretization = Discretization::new(boundaries, request.cell_count())?;
        let layers = discretization.layer_count();

        match &request {
            ComputationRequest::Direct { parameters, .. } => {
                if state != ComputationState::CleanedMeasures {
                    return Err(MolonariError::Validation(format!(
                        "point {point} already holds a computation (state {state}); delete it first"
                    )));
                }
                if parameters.len() != layers {
                    return Err(MolonariError::Validation(format!(
                        "{} parameter sets for {layers} layers",
                        parameters.len()
                    )));
                }
                if let Some(layer) = parameters.iter().position(|p| !p.is_finite()) {
                    return Err(MolonariError::Validation(format!(
                        "parameters of layer {layer} are not finite"
                    )));
                }
            }
            ComputationRequest::Calibration {
                priors, iterations, ..
            } => {
                if state == ComputationState::Calibrated {
                    return Err(MolonariError::Validation(format!(
                        "point {point} is already calibrated; delete the generation first"
                    )));
                }
                if priors.len() != layers {
                    return Err(MolonariError::Validation(format!(
                        "{} prior sets for {layers} layers",
                        priors.len()
                    )));
                }
                for (layer, prior) in priors.iter().enumerate() {
                    prior.validate(layer)?;
                }
                if *iterations == 0 {
                    return Err(MolonariError::Validation(
                        "a calibration needs at least one iteration".to_string(),
                    ));
                }
            }
        }

        tracing::debug!(state = %state, layers = layers, "request accepted");
        Ok(Job {
            request,
            discretization,
            accepted,
        })
    }
}
