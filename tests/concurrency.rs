//! Single-flight control and cooperative cancellation of running computations.

mod support;

use molonari::storage::lock_store;
use molonari::{
    ComputationEvent, ComputationOrchestrator, ComputationOutcome, ComputationState,
    MolonariError, PointCoordinator, ResultKind,
};
use std::sync::Arc;
use support::{FakeSolver, BOUNDARIES, CELLS, TIMESTAMPS};

fn layers() -> [molonari::LayerParameters; 2] {
    [support::sand(), support::clay()]
}

#[test]
fn test_second_request_is_busy_while_in_flight() {
    let (store, point) = support::seeded_store();
    let (solver, gate) = support::gated();
    let orchestrator =
        ComputationOrchestrator::new(Arc::clone(&store), Arc::new(solver), &support::config());
    let mut coordinator =
        PointCoordinator::new(Arc::clone(&store), point, &support::config()).unwrap();

    let handle = orchestrator
        .run_direct(point, &BOUNDARIES, &layers(), CELLS)
        .unwrap();
    gate.wait_started();
    assert!(orchestrator.is_running(point));

    let second = orchestrator.run_direct(point, &BOUNDARIES, &layers(), CELLS);
    assert!(matches!(second, Err(MolonariError::Busy { point: busy }) if busy == point));
    let calibration = orchestrator.run_calibration(
        point,
        &BOUNDARIES,
        &[support::priors(), support::priors()],
        CELLS,
        10,
        &[0.5],
    );
    assert!(matches!(calibration, Err(MolonariError::Busy { .. })));

    assert_eq!(coordinator.state().unwrap(), ComputationState::CleanedMeasures);
    assert!(matches!(
        coordinator.depth_time_maps(ResultKind::Temperature),
        Err(MolonariError::NotAvailable { .. })
    ));

    gate.release();
    let outcome = handle.wait().unwrap();
    assert!(matches!(outcome, ComputationOutcome::Completed(_)));
    assert!(!orchestrator.is_running(point));
    assert_eq!(coordinator.state().unwrap(), ComputationState::DirectModel);
    assert_eq!(coordinator.depth_time_maps(ResultKind::Temperature).unwrap().len(), 1);
}

#[test]
fn test_other_points_run_independently() {
    let (store, first) = support::seeded_store();
    let second = {
        let mut guard = lock_store(&store).unwrap();
        let second = guard.register_point("P2", &support::setup()).unwrap();
        guard
            .replace_cleaned_measures(second, &support::cleaned_measures(TIMESTAMPS))
            .unwrap();
        second
    };
    let (solver, gate) = support::gated();
    let orchestrator =
        ComputationOrchestrator::new(Arc::clone(&store), Arc::new(solver), &support::config());

    let blocked = orchestrator
        .run_direct(first, &BOUNDARIES, &layers(), CELLS)
        .unwrap();
    gate.wait_started();

    let outcome = orchestrator
        .run_direct(second, &BOUNDARIES, &layers(), CELLS)
        .unwrap()
        .wait()
        .unwrap();
    assert!(matches!(outcome, ComputationOutcome::Completed(_)));
    assert!(orchestrator.is_running(first));

    gate.release();
    blocked.wait().unwrap();
    let guard = lock_store(&store).unwrap();
    assert_eq!(guard.computation_state(first).unwrap(), ComputationState::DirectModel);
    assert_eq!(guard.computation_state(second).unwrap(), ComputationState::DirectModel);
}

#[test]
fn test_cleaned_measures_deleted_mid_flight() {
    let (store, point) = support::seeded_store();
    let (solver, gate) = support::gated();
    let orchestrator =
        ComputationOrchestrator::new(Arc::clone(&store), Arc::new(solver), &support::config());
    let mut events = orchestrator.subscribe();

    let handle = orchestrator
        .run_calibration(
            point,
            &BOUNDARIES,
            &[support::priors(), support::priors()],
            CELLS,
            100,
            &[0.05, 0.5, 0.95],
        )
        .unwrap();
    gate.wait_started();

    lock_store(&store).unwrap().delete_cleaned_measures(point).unwrap();
    gate.release();

    let outcome = handle.wait().unwrap();
    assert_eq!(outcome, ComputationOutcome::Discarded { point });
    assert_eq!(events.try_recv().unwrap(), ComputationEvent::Discarded { point });

    let guard = lock_store(&store).unwrap();
    assert_eq!(guard.computation_state(point).unwrap(), ComputationState::RawMeasuresOnly);
    let counts = guard.generation_counts(point).unwrap();
    assert_eq!(counts.quantiles, 0);
    assert_eq!(counts.layers, 0);
    assert_eq!(counts.results, 0);
    assert_eq!(counts.samples, 0);
}

#[test]
fn test_generation_deleted_during_upgrade() {
    let (store, point) = support::seeded_store();
    ComputationOrchestrator::new(
        Arc::clone(&store),
        Arc::new(FakeSolver::default()),
        &support::config(),
    )
    .run_direct(point, &BOUNDARIES, &layers(), CELLS)
    .unwrap()
    .wait()
    .unwrap();

    let (solver, gate) = support::gated();
    let orchestrator =
        ComputationOrchestrator::new(Arc::clone(&store), Arc::new(solver), &support::config());
    let handle = orchestrator
        .run_calibration(
            point,
            &BOUNDARIES,
            &[support::priors(), support::priors()],
            CELLS,
            100,
            &[0.5],
        )
        .unwrap();
    gate.wait_started();

    assert!(orchestrator.delete_generation(point).unwrap());
    gate.release();

    assert_eq!(handle.wait().unwrap(), ComputationOutcome::Discarded { point });
    let guard = lock_store(&store).unwrap();
    assert_eq!(guard.computation_state(point).unwrap(), ComputationState::CleanedMeasures);
    assert_eq!(guard.generation_counts(point).unwrap().quantiles, 0);
}

#[test]
fn test_point_deleted_mid_flight() {
    let (store, point) = support::seeded_store();
    let (solver, gate) = support::gated();
    let orchestrator =
        ComputationOrchestrator::new(Arc::clone(&store), Arc::new(solver), &support::config());

    let handle = orchestrator
        .run_direct(point, &BOUNDARIES, &layers(), CELLS)
        .unwrap();
    gate.wait_started();

    lock_store(&store).unwrap().delete_point(point).unwrap();
    gate.release();

    assert_eq!(handle.wait().unwrap(), ComputationOutcome::Discarded { point });
    assert!(matches!(
        lock_store(&store).unwrap().point(point),
        Err(MolonariError::UnknownPoint(_))
    ));
}

#[tokio::test]
async fn test_coordinator_sees_previous_generation_until_completion() {
    let (store, point) = support::seeded_store();
    let config = support::config();
    ComputationOrchestrator::new(Arc::clone(&store), Arc::new(FakeSolver::default()), &config)
        .run_direct(point, &BOUNDARIES, &layers(), CELLS)
        .unwrap()
        .await
        .unwrap();

    let (solver, gate) = support::gated();
    let orchestrator = ComputationOrchestrator::new(Arc::clone(&store), Arc::new(solver), &config);
    let mut coordinator = PointCoordinator::new(Arc::clone(&store), point, &config)
        .unwrap()
        .with_events(orchestrator.subscribe());
    assert_eq!(coordinator.water_flux_series().unwrap().len(), 1);

    let handle = orchestrator
        .run_calibration(
            point,
            &BOUNDARIES,
            &[support::priors(), support::priors()],
            CELLS,
            100,
            &[0.25, 0.75],
        )
        .unwrap();
    let gate = tokio::task::spawn_blocking(move || {
        gate.wait_started();
        gate
    })
    .await
    .unwrap();

    assert_eq!(coordinator.water_flux_series().unwrap().len(), 1);
    assert_eq!(coordinator.state().unwrap(), ComputationState::DirectModel);

    gate.release();
    handle.await.unwrap();
    assert_eq!(coordinator.water_flux_series().unwrap().len(), 3);
    assert_eq!(coordinator.state().unwrap(), ComputationState::Calibrated);
}
