//! End-to-end computation lifecycle against an in-memory store.

mod support;

use molonari::storage::lock_store;
use molonari::{
    ComputationOrchestrator, ComputationOutcome, ComputationState, MolonariError, Parameter,
    PointCoordinator, Quantile, ResultKind,
};
use std::sync::Arc;
use support::{FakeSolver, BOUNDARIES, CELLS, TIMESTAMPS};

fn orchestrator(store: &molonari::SharedStore, solver: impl molonari::solver::Solver + 'static) -> ComputationOrchestrator {
    ComputationOrchestrator::new(Arc::clone(store), Arc::new(solver), &support::config())
}

#[tokio::test]
async fn test_direct_then_calibration() {
    let (store, point) = support::seeded_store();
    let orchestrator = orchestrator(&store, FakeSolver::default());
    let mut coordinator = PointCoordinator::new(Arc::clone(&store), point, &support::config())
        .unwrap()
        .with_events(orchestrator.subscribe());

    assert_eq!(coordinator.state().unwrap(), ComputationState::CleanedMeasures);

    let outcome = orchestrator
        .run_direct(point, &BOUNDARIES, &[support::sand(), support::clay()], CELLS)
        .unwrap()
        .await
        .unwrap();
    let ComputationOutcome::Completed(summary) = outcome else {
        panic!("direct run was discarded");
    };
    assert_eq!(summary.state, ComputationState::DirectModel);
    assert_eq!(summary.quantiles, vec![Quantile::BEST]);

    let counts = lock_store(&store).unwrap().generation_counts(point).unwrap();
    assert_eq!(counts.quantiles, 1);
    assert_eq!(counts.layers, 2);
    assert_eq!(counts.depths, CELLS);
    assert_eq!(counts.dates, TIMESTAMPS);
    assert_eq!(counts.results, CELLS * TIMESTAMPS);
    assert_eq!(counts.water_flows, TIMESTAMPS);
    assert_eq!(counts.rmse, 1);
    assert_eq!(counts.samples, 0);

    assert_eq!(coordinator.depth_time_maps(ResultKind::Temperature).unwrap().len(), 1);
    assert_eq!(coordinator.water_flux_series().unwrap().len(), 1);
    assert!(matches!(
        coordinator.parameter_histograms(0.3),
        Err(MolonariError::NotAvailable {
            kind: ResultKind::ParamHistogram,
            state: ComputationState::DirectModel
        })
    ));
    assert_eq!(coordinator.best_parameters(0.3).unwrap(), support::sand());

    let outcome = orchestrator
        .run_calibration(
            point,
            &BOUNDARIES,
            &[support::priors(), support::priors()],
            CELLS,
            500,
            &[0.05, 0.5, 0.95],
        )
        .unwrap()
        .await
        .unwrap();
    let ComputationOutcome::Completed(summary) = outcome else {
        panic!("calibration was discarded");
    };
    assert_eq!(summary.state, ComputationState::Calibrated);
    assert_eq!(summary.quantiles.len(), 4);

    let counts = lock_store(&store).unwrap().generation_counts(point).unwrap();
    assert_eq!(counts.quantiles, 4);
    assert_eq!(counts.layers, 2);
    assert_eq!(counts.depths, CELLS);
    assert_eq!(counts.dates, TIMESTAMPS);
    assert_eq!(counts.results, 4 * CELLS * TIMESTAMPS);
    assert_eq!(counts.rmse, 4);
    assert_eq!(counts.samples, 2 * 200);

    assert!(coordinator.refresh());
    let labels: Vec<String> = coordinator
        .water_flux_series()
        .unwrap()
        .iter()
        .map(|series| series.label.clone())
        .collect();
    assert_eq!(
        labels,
        vec!["Best fit", "Quantile 0.05", "Quantile 0.5", "Quantile 0.95"]
    );
    assert!(coordinator
        .water_flux_series()
        .unwrap()
        .iter()
        .all(|series| series.points.len() == TIMESTAMPS));
    assert_eq!(
        coordinator.best_parameters(0.3).unwrap(),
        support::prior_midpoint(&support::priors())
    );
}

#[tokio::test]
async fn test_calibrated_read_models() {
    let (store, point) = support::seeded_store();
    let config = molonari::Config {
        max_posterior_samples: 50,
        histogram_bins: 10,
        ..support::config()
    };
    let orchestrator =
        ComputationOrchestrator::new(Arc::clone(&store), Arc::new(FakeSolver::default()), &config);
    let mut coordinator = PointCoordinator::new(Arc::clone(&store), point, &config).unwrap();

    orchestrator
        .run_calibration(
            point,
            &BOUNDARIES,
            &[support::priors(), support::priors()],
            CELLS,
            100,
            &[0.95, 0.05],
        )
        .unwrap()
        .await
        .unwrap();

    let maps = coordinator.depth_time_maps(ResultKind::TotalFlow).unwrap();
    let quantiles: Vec<f64> = maps.iter().map(|map| map.quantile().value()).collect();
    assert_eq!(quantiles, vec![0.0, 0.05, 0.95]);
    assert!(maps.iter().all(|map| map.grid.values.len() == TIMESTAMPS
        && map.grid.values.iter().all(|row| row.len() == CELLS)));

    let advective = coordinator.depth_time_maps(ResultKind::AdvectiveFlow).unwrap()[0]
        .grid
        .values[10][3];
    let conductive = coordinator.depth_time_maps(ResultKind::ConductiveFlow).unwrap()[0]
        .grid
        .values[10][3];
    let total = coordinator.depth_time_maps(ResultKind::TotalFlow).unwrap()[0]
        .grid
        .values[10][3];
    assert!((total - (advective + conductive)).abs() < 1e-9);

    let rmse = coordinator.rmse_summary().unwrap();
    assert_eq!(rmse.totals.len(), 3);
    assert!(rmse.totals[0].0.is_best());
    assert!(rmse.thermometers.iter().all(|t| t.rmse.is_finite() && t.rmse >= 0.0));

    assert_eq!(coordinator.layer_depths().unwrap(), vec![0.3, 0.6]);
    let histograms = coordinator.parameter_histograms(0.6).unwrap();
    assert_eq!(histograms.histograms.len(), 4);
    let porosity = histograms.get(Parameter::Porosity).unwrap();
    assert_eq!(porosity.counts.len(), 10);
    assert_eq!(porosity.total(), 50);
    assert!(matches!(
        coordinator.parameter_histograms(0.45),
        Err(MolonariError::Validation(_))
    ));

    let at_depth = coordinator.temperature_at_depth(0.3).unwrap();
    assert_eq!(at_depth.len(), 3);
    assert!(at_depth.iter().all(|series| series.points.len() == TIMESTAMPS));

    let profiles = coordinator.temperature_profiles(5).unwrap();
    assert_eq!(profiles.len(), 5);
    assert_eq!(profiles[0].date, support::timestamp(0));
    assert_eq!(profiles[4].date, support::timestamp(TIMESTAMPS - 1));
    assert!(profiles.iter().all(|p| p.temperatures.len() == CELLS));
}

#[test]
fn test_read_models_before_computation() {
    let (store, point) = support::seeded_store();
    let config = support::config();
    let mut coordinator = PointCoordinator::new(Arc::clone(&store), point, &config).unwrap();

    let info = coordinator.point_info().unwrap();
    assert_eq!(info.name, "P1");
    assert_eq!(info.state, ComputationState::CleanedMeasures);
    assert_eq!(info.cell_count, None);

    assert_eq!(coordinator.measures_table(ResultKind::RawMeasures).unwrap().len(), TIMESTAMPS);
    assert_eq!(
        coordinator.measures_table(ResultKind::CleanedMeasures).unwrap().len(),
        TIMESTAMPS
    );
    assert!(matches!(
        coordinator.measures_table(ResultKind::Temperature),
        Err(MolonariError::Validation(_))
    ));
    assert_eq!(coordinator.pressure_series().unwrap().points.len(), TIMESTAMPS);
    assert_eq!(coordinator.temperature_series().unwrap().len(), 5);

    for kind in ResultKind::GRIDS {
        assert!(matches!(
            coordinator.depth_time_maps(kind),
            Err(MolonariError::NotAvailable {
                state: ComputationState::CleanedMeasures,
                ..
            })
        ));
    }
    assert!(matches!(
        coordinator.water_flux_series(),
        Err(MolonariError::NotAvailable { kind: ResultKind::WaterFlux, .. })
    ));
    assert!(matches!(
        coordinator.rmse_summary(),
        Err(MolonariError::NotAvailable { kind: ResultKind::Rmse, .. })
    ));
    assert!(matches!(
        coordinator.layer_depths(),
        Err(MolonariError::NotAvailable { kind: ResultKind::LayerParameters, .. })
    ));
    assert!(matches!(
        coordinator.best_parameters(0.3),
        Err(MolonariError::NotAvailable { kind: ResultKind::LayerParameters, .. })
    ));

    let dir = tempfile::TempDir::new().unwrap();
    let files = coordinator.export_cleaned_measures(dir.path()).unwrap();
    let pressures = std::fs::read_to_string(&files.pressures).unwrap();
    assert_eq!(pressures.lines().count(), TIMESTAMPS + 1);
    assert!(files.temperatures.ends_with("cleanedTemperaturesP1.csv"));
}

#[test]
fn test_failed_solver_leaves_cleaned_measures() {
    let (store, point) = support::seeded_store();
    let orchestrator = orchestrator(&store, support::FailingSolver);
    let mut events = orchestrator.subscribe();

    let err = orchestrator
        .run_direct(point, &BOUNDARIES, &[support::sand(), support::clay()], CELLS)
        .unwrap()
        .wait()
        .unwrap_err();
    assert!(matches!(err, MolonariError::ComputationFailed { ref cause } if cause.contains("integration diverged")));

    let guard = lock_store(&store).unwrap();
    assert_eq!(guard.computation_state(point).unwrap(), ComputationState::CleanedMeasures);
    let counts = guard.generation_counts(point).unwrap();
    assert_eq!(counts.quantiles, 0);
    assert_eq!(counts.layers, 0);
    assert_eq!(counts.depths, 0);
    assert_eq!(counts.results, 0);
    assert_eq!(counts.dates, TIMESTAMPS);
    drop(guard);

    assert!(matches!(
        events.try_recv(),
        Ok(molonari::ComputationEvent::Failed { .. })
    ));
    assert!(!orchestrator.is_running(point));
}

#[test]
fn test_solver_panic_becomes_failure() {
    let (store, point) = support::seeded_store();
    let orchestrator = orchestrator(&store, support::PanickingSolver);

    let err = orchestrator
        .run_calibration(
            point,
            &BOUNDARIES,
            &[support::priors(), support::priors()],
            CELLS,
            10,
            &[0.5],
        )
        .unwrap()
        .wait()
        .unwrap_err();
    assert!(matches!(err, MolonariError::ComputationFailed { ref cause } if cause.contains("panicked")));
    assert_eq!(
        lock_store(&store).unwrap().computation_state(point).unwrap(),
        ComputationState::CleanedMeasures
    );
    assert!(!orchestrator.is_running(point));
}

#[test]
fn test_failed_calibration_keeps_direct_model() {
    let (store, point) = support::seeded_store();
    orchestrator(&store, FakeSolver::default())
        .run_direct(point, &BOUNDARIES, &[support::sand(), support::clay()], CELLS)
        .unwrap()
        .wait()
        .unwrap();

    let failing = orchestrator(&store, support::FailingSolver);
    let result = failing
        .run_calibration(
            point,
            &BOUNDARIES,
            &[support::priors(), support::priors()],
            CELLS,
            10,
            &[0.5],
        )
        .unwrap()
        .wait();
    assert!(matches!(result, Err(MolonariError::ComputationFailed { .. })));

    let guard = lock_store(&store).unwrap();
    assert_eq!(guard.computation_state(point).unwrap(), ComputationState::DirectModel);
    assert_eq!(guard.generation_counts(point).unwrap().results, CELLS * TIMESTAMPS);
}

#[test]
fn test_delete_generation_is_idempotent() {
    let (store, point) = support::seeded_store();
    let orchestrator = orchestrator(&store, FakeSolver::default());
    orchestrator
        .run_direct(point, &BOUNDARIES, &[support::sand(), support::clay()], CELLS)
        .unwrap()
        .wait()
        .unwrap();
    assert_eq!(
        lock_store(&store).unwrap().point(point).unwrap().cell_count,
        Some(CELLS)
    );

    assert!(orchestrator.delete_generation(point).unwrap());
    assert!(!orchestrator.delete_generation(point).unwrap());

    let guard = lock_store(&store).unwrap();
    assert_eq!(guard.computation_state(point).unwrap(), ComputationState::CleanedMeasures);
    let counts = guard.generation_counts(point).unwrap();
    assert_eq!(counts.quantiles, 0);
    assert_eq!(counts.depths, 0);
    assert_eq!(counts.dates, TIMESTAMPS);
    assert_eq!(guard.point(point).unwrap().cell_count, None);
}

#[test]
fn test_requests_rejected_before_start() {
    let (store, point) = support::seeded_store();
    let orchestrator = orchestrator(&store, FakeSolver::default());
    let layers = [support::sand(), support::clay()];

    let too_deep = orchestrator.run_direct(point, &[0.0, 0.3, 0.9], &layers, CELLS);
    assert!(matches!(too_deep, Err(MolonariError::Validation(_))));

    let missing_layer = orchestrator.run_direct(point, &BOUNDARIES, &layers[..1], CELLS);
    assert!(matches!(missing_layer, Err(MolonariError::Validation(_))));

    let too_few_cells = orchestrator.run_direct(point, &BOUNDARIES, &layers, 1);
    assert!(matches!(too_few_cells, Err(MolonariError::Validation(_))));

    let bad_quantile = orchestrator.run_calibration(
        point,
        &BOUNDARIES,
        &[support::priors(), support::priors()],
        CELLS,
        10,
        &[1.5],
    );
    assert!(matches!(bad_quantile, Err(MolonariError::Validation(_))));

    let no_quantiles = orchestrator.run_calibration(
        point,
        &BOUNDARIES,
        &[support::priors(), support::priors()],
        CELLS,
        10,
        &[],
    );
    assert!(matches!(no_quantiles, Err(MolonariError::Validation(_))));

    let no_iterations = orchestrator.run_calibration(
        point,
        &BOUNDARIES,
        &[support::priors(), support::priors()],
        CELLS,
        0,
        &[0.5],
    );
    assert!(matches!(no_iterations, Err(MolonariError::Validation(_))));

    assert!(!orchestrator.is_running(point));
    assert_eq!(
        lock_store(&store).unwrap().generation_counts(point).unwrap().quantiles,
        0
    );

    orchestrator
        .run_direct(point, &BOUNDARIES, &layers, CELLS)
        .unwrap()
        .wait()
        .unwrap();
    let recompute = orchestrator.run_direct(point, &BOUNDARIES, &layers, CELLS);
    assert!(matches!(recompute, Err(MolonariError::Validation(_))));
}

#[test]
fn test_rejects_point_without_cleaned_measures() {
    let (store, point) = support::seeded_store();
    lock_store(&store).unwrap().delete_cleaned_measures(point).unwrap();
    let orchestrator = orchestrator(&store, FakeSolver::default());

    let result = orchestrator.run_direct(
        point,
        &BOUNDARIES,
        &[support::sand(), support::clay()],
        CELLS,
    );
    assert!(matches!(result, Err(MolonariError::Validation(_))));
    assert_eq!(
        lock_store(&store).unwrap().computation_state(point).unwrap(),
        ComputationState::RawMeasuresOnly
    );
}
