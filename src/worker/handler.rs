//! Computation worker: runs the solver and writes one generation.
//!
//! A [`GenerationRunner`] executes on a dedicated worker thread. It works in
//! two phases:
//!
//! 1. **Solve**: read the cleaned measures, call the solver (once for a direct
//!    run, `1 + 1 + quantiles` times for a calibration) and score every run.
//!    Nothing is written, so a solver failure leaves the store untouched.
//! 2. **Commit**: check the point's inputs are unchanged, open a generation and
//!    write it step by step. A deletion racing with the commit is detected by
//!    the store and turned into [`ComputationOutcome::Discarded`].
//!
//! The store lock is only held for single steps, so readers interleave with a
//! running computation and see the previous state until the generation is
//! marked complete.

use crate::domain::error::{MolonariError, Result};
use crate::domain::{LayerParameters, LayerPriors, PointId, Quantile, StoreCounts};
use crate::solver::statistics::{self, quantile_parameters, thin};
use crate::solver::{Discretization, ForwardRun, Solver, SolverError, SolverInput};
use crate::storage::{lock_store, Generation, LayerRecord, QuantileGrids, RmseRecord, SharedStore};
use crate::worker::messages::{ComputationOutcome, ComputationRequest, ComputationSummary};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// A validated request ready to run.
#[derive(Debug, Clone)]
pub struct Job {
    pub request: ComputationRequest,
    pub discretization: Discretization,
    /// Store fingerprint taken when the request was accepted.
    pub accepted: StoreCounts,
}

/// Everything a generation consists of, computed before any write.
#[derive(Debug)]
struct ResultBundle {
    layers: Vec<LayerRecord>,
    runs: Vec<(Quantile, ForwardRun)>,
    rmse: Vec<RmseRecord>,
    samples: Option<Vec<Vec<LayerParameters>>>,
}

/// Executes jobs against a shared store and solver.
#[derive(Clone)]
pub struct GenerationRunner {
    store: SharedStore,
    solver: Arc<dyn Solver>,
    max_posterior_samples: usize,
}

impl GenerationRunner {
    pub fn new(store: SharedStore, solver: Arc<dyn Solver>, max_posterior_samples: usize) -> Self {
        Self {
            store,
            solver,
            max_posterior_samples,
        }
    }

    /// Runs a job to completion on the current thread.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::ComputationFailed`] if the solver fails or
    /// panics, or a storage error if a commit fails. In both cases nothing of
    /// the generation remains in the store.
    pub fn handle_job(&self, job: Job) -> Result<ComputationOutcome> {
        let _context_guard = job.request.trace_context().and_then(|ctx| ctx.attach());

        let point = job.request.point();
        let span = tracing::info_span!(
            "run_generation",
            point = %point,
            kind = job.request.kind_name(),
            cells = job.discretization.node_count()
        );
        let _guard = span.entered();

        let input = match self.read_input(point) {
            Ok(input) => input,
            Err(MolonariError::UnknownPoint(_)) => {
                tracing::info!("point deleted before solving");
                return Ok(ComputationOutcome::Discarded { point });
            }
            Err(e) => return Err(e),
        };
        if input.measures.is_empty() {
            tracing::info!("cleaned measures vanished before solving");
            return Ok(ComputationOutcome::Discarded { point });
        }

        let bundle = match &job.request {
            ComputationRequest::Direct { parameters, .. } => {
                self.solve_direct(&job.discretization, parameters, &input)?
            }
            ComputationRequest::Calibration {
                priors,
                iterations,
                quantiles,
                ..
            } => self.solve_calibration(&job.discretization, priors, *iterations, quantiles, &input)?,
        };

        self.commit(point, &job, &input, bundle)
    }

    fn read_input(&self, point: PointId) -> Result<SolverInput> {
        let store = lock_store(&self.store)?;
        Ok(SolverInput {
            setup: store.point(point)?.setup,
            measures: store.cleaned_measures(point)?,
        })
    }

    fn solve_direct(
        &self,
        discretization: &Discretization,
        parameters: &[LayerParameters],
        input: &SolverInput,
    ) -> Result<ResultBundle> {
        let run = self.forward(discretization, parameters, input)?;
        let rmse = vec![self.score(Quantile::BEST, &run, discretization, input)];

        Ok(ResultBundle {
            layers: layer_records(discretization, parameters),
            runs: vec![(Quantile::BEST, run)],
            rmse,
            samples: None,
        })
    }

    fn solve_calibration(
        &self,
        discretization: &Discretization,
        priors: &[LayerPriors],
        iterations: usize,
        quantiles: &[Quantile],
        input: &SolverInput,
    ) -> Result<ResultBundle> {
        let calibration = {
            let _span = tracing::debug_span!("calibrate", iterations = iterations).entered();
            guarded("calibration", || {
                self.solver
                    .calibrate(discretization, priors, input, iterations)
            })?
        };

        let layers = discretization.layer_count();
        if calibration.best.len() != layers || calibration.samples.len() != layers {
            return Err(MolonariError::computation_failed(format!(
                "calibration returned {} best sets and {} sample sets for {layers} layers",
                calibration.best.len(),
                calibration.samples.len()
            )));
        }

        let mut runs = Vec::with_capacity(quantiles.len() + 1);
        runs.push((
            Quantile::BEST,
            self.forward(discretization, &calibration.best, input)?,
        ));

        for quantile in quantiles {
            let parameters = calibration
                .samples
                .iter()
                .enumerate()
                .map(|(layer, samples)| {
                    quantile_parameters(samples, *quantile).ok_or_else(|| {
                        MolonariError::computation_failed(format!(
                            "no posterior samples for layer {layer}"
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let run = self.forward(discretization, &parameters, input)?;
            runs.push((*quantile, run));
        }

        let rmse = runs
            .iter()
            .map(|(quantile, run)| self.score(*quantile, run, discretization, input))
            .collect();
        let samples = calibration
            .samples
            .iter()
            .map(|layer| thin(layer, self.max_posterior_samples))
            .collect();

        Ok(ResultBundle {
            layers: layer_records(discretization, &calibration.best),
            runs,
            rmse,
            samples: Some(samples),
        })
    }

    fn forward(
        &self,
        discretization: &Discretization,
        parameters: &[LayerParameters],
        input: &SolverInput,
    ) -> Result<ForwardRun> {
        let _span = tracing::debug_span!("solve").entered();
        let run = guarded("forward run", || {
            self.solver.solve(discretization, parameters, input)
        })?;
        run.check_shape(input.time_count(), discretization.node_count())
            .map_err(|e| MolonariError::computation_failed(e.message))?;
        Ok(run)
    }

    fn score(
        &self,
        quantile: Quantile,
        run: &ForwardRun,
        discretization: &Discretization,
        input: &SolverInput,
    ) -> RmseRecord {
        statistics::rmse(
            quantile,
            run,
            discretization,
            input.setup.thermometer_depths(),
            &input.measures,
        )
    }

    fn commit(
        &self,
        point: PointId,
        job: &Job,
        input: &SolverInput,
        bundle: ResultBundle,
    ) -> Result<ComputationOutcome> {
        let generation = {
            let mut store = lock_store(&self.store)?;
            let current = match store.counts(point) {
                Ok(counts) => counts,
                Err(MolonariError::UnknownPoint(_)) => {
                    tracing::info!("point deleted while computing; discarding results");
                    return Ok(ComputationOutcome::Discarded { point });
                }
                Err(e) => return Err(e),
            };
            if !current.same_inputs(&job.accepted) || current.generation != job.accepted.generation {
                tracing::info!("point inputs changed while computing; discarding results");
                return Ok(ComputationOutcome::Discarded { point });
            }
            if current.generation.is_some() {
                store.delete_generation(point)?;
            }
            store.begin_generation(point, job.discretization.node_count())?
        };

        match self.write_generation(generation, job, input, &bundle) {
            Ok(()) => {
                let state = lock_store(&self.store)?.computation_state(point)?;
                let total_rmse = bundle.rmse.first().map_or(0.0, |record| record.total);
                tracing::info!(
                    state = %state,
                    quantiles = bundle.runs.len(),
                    total_rmse = total_rmse,
                    "computation stored"
                );
                Ok(ComputationOutcome::Completed(ComputationSummary {
                    point,
                    state,
                    quantiles: bundle.runs.iter().map(|(quantile, _)| *quantile).collect(),
                    total_rmse,
                }))
            }
            Err(MolonariError::GenerationDiscarded { .. }) => {
                tracing::info!("generation deleted while writing; discarding results");
                Ok(ComputationOutcome::Discarded { point })
            }
            Err(e) => {
                tracing::warn!(error = %e, "commit failed; rolling back generation");
                self.roll_back(generation);
                Err(e)
            }
        }
    }

    fn write_generation(
        &self,
        generation: Generation,
        job: &Job,
        input: &SolverInput,
        bundle: &ResultBundle,
    ) -> Result<()> {
        let dates: Vec<_> = input.measures.iter().map(|m| m.timestamp).collect();
        let depths = &job.discretization.depths;

        lock_store(&self.store)?.commit_layers(generation, &bundle.layers)?;

        for (quantile, run) in &bundle.runs {
            let grids = QuantileGrids {
                quantile: *quantile,
                dates: dates.clone(),
                depths: depths.clone(),
                temperature: run.temperature.clone(),
                advective_flow: run.advective_flow.clone(),
                conductive_flow: run.conductive_flow.clone(),
                water_flux: run.water_flux.clone(),
            };
            lock_store(&self.store)?.commit_quantile(generation, &grids)?;
        }

        lock_store(&self.store)?.commit_rmse(generation, &bundle.rmse)?;

        if let Some(samples) = &bundle.samples {
            lock_store(&self.store)?.commit_samples(generation, samples)?;
        }

        lock_store(&self.store)?.finish_generation(generation)
    }

    fn roll_back(&self, generation: Generation) {
        let result = lock_store(&self.store).and_then(|mut store| {
            if store.counts(generation.point)?.generation == Some(generation.id) {
                store.delete_generation(generation.point)?;
            }
            Ok(())
        });
        if let Err(e) = result {
            tracing::error!(error = %e, point = %generation.point, "rollback failed");
        }
    }
}

/// Calls into the solver, turning errors and panics into `ComputationFailed`.
fn guarded<T>(
    stage: &str,
    call: impl FnOnce() -> std::result::Result<T, SolverError>,
) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::warn!(stage = stage, error = %e, "solver failed");
            Err(MolonariError::computation_failed(format!("{stage}: {e}")))
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(stage = stage, panic = %message, "solver panicked");
            Err(MolonariError::computation_failed(format!(
                "{stage} panicked: {message}"
            )))
        }
    }
}

fn layer_records(discretization: &Discretization, parameters: &[LayerParameters]) -> Vec<LayerRecord> {
    discretization
        .layer_bottoms
        .iter()
        .zip(parameters)
        .enumerate()
        .map(|(ordinal, (depth_bed, best))| LayerRecord {
            ordinal,
            depth_bed: *depth_bed,
            best: *best,
        })
        .collect()
}
