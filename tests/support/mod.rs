//! Shared fixtures for integration tests: deterministic solvers and a seeded point.

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use molonari::solver::{Calibration, Discretization, ForwardRun, Solver, SolverError, SolverInput};
use molonari::storage::lock_store;
use molonari::{
    share, CleanedMeasure, Config, LayerParameters, LayerPriors, Parameter, PointId, PointSetup,
    PriorRange, RawMeasure, SharedStore, SqliteStore,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Mutex};

pub const TIMESTAMPS: usize = 100;
pub const BOUNDARIES: [f64; 3] = [0.0, 0.3, 0.6];
pub const CELLS: usize = 20;

pub fn config() -> Config {
    Config {
        data_dir: std::env::temp_dir().join("molonari-tests"),
        ..Config::default()
    }
}

pub fn setup() -> PointSetup {
    PointSetup {
        river_bed: 101.2,
        offset: 0.05,
        sensor_depths: [0.15, 0.3, 0.45, 0.6],
        sigma_pressure: 0.01,
        sigma_temperature: 0.1,
    }
}

pub fn timestamp(hour: usize) -> NaiveDateTime {
    let start = NaiveDate::from_ymd_opt(2016, 6, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap();
    start + Duration::hours(i64::try_from(hour).unwrap())
}

#[allow(clippy::cast_precision_loss)]
pub fn cleaned_measures(count: usize) -> Vec<CleanedMeasure> {
    (0..count)
        .map(|t| {
            let phase = (t as f64 / 24.0) * std::f64::consts::TAU;
            let bed = 286.0 + 2.0 * phase.sin();
            CleanedMeasure {
                timestamp: timestamp(t),
                temperatures: [bed - 0.3, bed - 0.6, bed - 0.8, 285.5],
                bed_temperature: bed,
                pressure: 0.05 + 0.01 * phase.cos(),
            }
        })
        .collect()
}

pub fn raw_measures(cleaned: &[CleanedMeasure]) -> Vec<RawMeasure> {
    cleaned
        .iter()
        .map(|m| RawMeasure {
            timestamp: m.timestamp,
            temperatures: m.temperatures.map(Some),
            bed_temperature: Some(m.bed_temperature),
            voltage: Some(m.pressure * 10.0),
        })
        .collect()
}

/// Store holding one point with raw and cleaned measures.
pub fn seeded_store() -> (SharedStore, PointId) {
    let store = share(SqliteStore::open_in_memory().unwrap());
    let point = {
        let mut guard = lock_store(&store).unwrap();
        let point = guard.register_point("P1", &setup()).unwrap();
        let cleaned = cleaned_measures(TIMESTAMPS);
        guard.insert_raw_measures(point, &raw_measures(&cleaned)).unwrap();
        guard.replace_cleaned_measures(point, &cleaned).unwrap();
        point
    };
    (store, point)
}

pub fn sand() -> LayerParameters {
    LayerParameters {
        permeability: 11.0,
        thermal_conductivity: 2.0,
        porosity: 0.15,
        heat_capacity: 4e6,
    }
}

pub fn clay() -> LayerParameters {
    LayerParameters {
        permeability: 14.0,
        thermal_conductivity: 1.2,
        porosity: 0.4,
        heat_capacity: 3e6,
    }
}

pub fn priors() -> LayerPriors {
    LayerPriors {
        permeability: PriorRange::new(10.0, 15.0),
        thermal_conductivity: PriorRange::new(1.0, 5.0),
        porosity: PriorRange::new(0.01, 0.25),
        heat_capacity: PriorRange::new(1e6, 1e7),
    }
}

/// Best parameters the fake solver reports for `priors`.
pub fn prior_midpoint(priors: &LayerPriors) -> LayerParameters {
    LayerParameters::from_fn(|p| {
        let range = priors.range(p);
        (range.low + range.high) / 2.0
    })
}

/// Deterministic solver producing smooth fields from the measures.
#[derive(Debug, Clone)]
pub struct FakeSolver {
    pub samples_per_layer: usize,
}

impl Default for FakeSolver {
    fn default() -> Self {
        Self {
            samples_per_layer: 200,
        }
    }
}

impl Solver for FakeSolver {
    fn solve(
        &self,
        discretization: &Discretization,
        parameters: &[LayerParameters],
        input: &SolverInput,
    ) -> Result<ForwardRun, SolverError> {
        let height = discretization.height();
        let mut run = ForwardRun {
            temperature: Vec::new(),
            advective_flow: Vec::new(),
            conductive_flow: Vec::new(),
            water_flux: Vec::new(),
        };

        for measure in &input.measures {
            let bottom = measure.temperatures[3];
            let mut temperature = Vec::new();
            let mut advective = Vec::new();
            let mut conductive = Vec::new();
            for (node, depth) in discretization.depths.iter().enumerate() {
                let layer = parameters[discretization.layer_of_node[node]];
                let gradient = (bottom - measure.bed_temperature) / height;
                temperature.push(measure.bed_temperature + gradient * depth);
                advective.push(measure.pressure * 1e3 / layer.permeability);
                conductive.push(-layer.thermal_conductivity * gradient);
            }
            run.temperature.push(temperature);
            run.advective_flow.push(advective);
            run.conductive_flow.push(conductive);
            run.water_flux
                .push(-measure.pressure * 10f64.powf(-parameters[0].permeability));
        }
        Ok(run)
    }

    #[allow(clippy::cast_precision_loss)]
    fn calibrate(
        &self,
        _discretization: &Discretization,
        priors: &[LayerPriors],
        _input: &SolverInput,
        _iterations: usize,
    ) -> Result<Calibration, SolverError> {
        let n = self.samples_per_layer.max(2);
        let samples = priors
            .iter()
            .map(|layer| {
                (0..n)
                    .map(|i| {
                        let fraction = i as f64 / (n - 1) as f64;
                        LayerParameters::from_fn(|p: Parameter| {
                            let range = layer.range(p);
                            range.low + fraction * (range.high - range.low)
                        })
                    })
                    .collect()
            })
            .collect();

        Ok(Calibration {
            best: priors.iter().map(prior_midpoint).collect(),
            samples,
        })
    }
}

/// Test side of a [`GatedSolver`].
pub struct Gate {
    started: mpsc::Receiver<()>,
    release: mpsc::Sender<()>,
}

impl Gate {
    /// Waits until the solver has been entered.
    pub fn wait_started(&self) {
        self.started
            .recv_timeout(std::time::Duration::from_secs(10))
            .expect("solver never started");
    }

    /// Lets the blocked solver call return.
    pub fn release(&self) {
        self.release.send(()).unwrap();
    }
}

/// Solver whose first call blocks until the test releases it.
pub struct GatedSolver {
    inner: FakeSolver,
    armed: AtomicBool,
    started: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

pub fn gated() -> (GatedSolver, Gate) {
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    (
        GatedSolver {
            inner: FakeSolver::default(),
            armed: AtomicBool::new(true),
            started: Mutex::new(started_tx),
            release: Mutex::new(release_rx),
        },
        Gate {
            started: started_rx,
            release: release_tx,
        },
    )
}

impl GatedSolver {
    fn hold(&self) {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.started.lock().unwrap().send(()).unwrap();
            let _ = self
                .release
                .lock()
                .unwrap()
                .recv_timeout(std::time::Duration::from_secs(10));
        }
    }
}

impl Solver for GatedSolver {
    fn solve(
        &self,
        discretization: &Discretization,
        parameters: &[LayerParameters],
        input: &SolverInput,
    ) -> Result<ForwardRun, SolverError> {
        self.hold();
        self.inner.solve(discretization, parameters, input)
    }

    fn calibrate(
        &self,
        discretization: &Discretization,
        priors: &[LayerPriors],
        input: &SolverInput,
        iterations: usize,
    ) -> Result<Calibration, SolverError> {
        self.hold();
        self.inner.calibrate(discretization, priors, input, iterations)
    }
}

/// Solver failing every call.
pub struct FailingSolver;

impl Solver for FailingSolver {
    fn solve(
        &self,
        _discretization: &Discretization,
        _parameters: &[LayerParameters],
        _input: &SolverInput,
    ) -> Result<ForwardRun, SolverError> {
        Err(SolverError::new("integration diverged"))
    }

    fn calibrate(
        &self,
        _discretization: &Discretization,
        _priors: &[LayerPriors],
        _input: &SolverInput,
        _iterations: usize,
    ) -> Result<Calibration, SolverError> {
        Err(SolverError::new("sampler diverged"))
    }
}

/// Solver panicking on every call.
pub struct PanickingSolver;

impl Solver for PanickingSolver {
    fn solve(
        &self,
        _discretization: &Discretization,
        _parameters: &[LayerParameters],
        _input: &SolverInput,
    ) -> Result<ForwardRun, SolverError> {
        panic!("matrix is singular")
    }

    fn calibrate(
        &self,
        _discretization: &Discretization,
        _priors: &[LayerPriors],
        _input: &SolverInput,
        _iterations: usize,
    ) -> Result<Calibration, SolverError> {
        panic!("matrix is singular")
    }
}
