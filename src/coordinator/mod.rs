//! Per-point read side.
//!
//! A [`PointCoordinator`] answers every query the presentation layer makes
//! about one point. It never writes. Each accessor first checks the point's
//! [`ComputationState`] and fails with [`MolonariError::NotAvailable`] when
//! the requested kind is not populated yet.
//!
//! # Caching
//!
//! Result read models are expensive to assemble, so the coordinator keeps
//! them until something changes. A cache entry is dropped when:
//!
//! - a [`ComputationEvent`] for the point arrives on the subscribed channel
//! - the channel lagged and events may have been missed
//! - the store's row counts differ from those the cache was built against
//!
//! Parameter histograms are rebuilt on every call since they depend on the
//! selected layer.

pub mod read_models;

pub use read_models::{
    DepthTimeMap, MeasuresTable, ParameterHistograms, PointInfo, RmseSummary, TemperatureProfile,
    ThermometerFit, TimeSeries,
};

use crate::domain::error::{MolonariError, Result};
use crate::domain::{ComputationState, LayerParameters, Parameter, PointId, Quantile, ResultKind, StoreCounts};
use crate::solver::Histogram;
use crate::storage::{lock_store, ExportedFiles, SharedStore};
use crate::worker::ComputationEvent;
use crate::Config;
use read_models::{nearest_index, spread_indices};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::broadcast::{self, error::TryRecvError};

/// Tolerance used to match a layer by its bottom depth (m).
const LAYER_DEPTH_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Default)]
struct Cache {
    stamp: Option<StoreCounts>,
    maps: HashMap<ResultKind, Vec<DepthTimeMap>>,
    water_flux: Option<Vec<TimeSeries>>,
    rmse: Option<RmseSummary>,
}

impl Cache {
    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Read models of one monitoring point.
pub struct PointCoordinator {
    store: SharedStore,
    point: PointId,
    histogram_bins: usize,
    events: Option<broadcast::Receiver<ComputationEvent>>,
    cache: Cache,
}

impl PointCoordinator {
    /// Creates a coordinator for an existing point.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::UnknownPoint`] if the point does not exist.
    pub fn new(store: SharedStore, point: PointId, config: &Config) -> Result<Self> {
        lock_store(&store)?.point(point)?;
        Ok(Self {
            store,
            point,
            histogram_bins: config.histogram_bins,
            events: None,
            cache: Cache::default(),
        })
    }

    /// Subscribes the coordinator to computation notifications.
    #[must_use]
    pub fn with_events(mut self, events: broadcast::Receiver<ComputationEvent>) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub const fn point(&self) -> PointId {
        self.point
    }

    /// Drains pending notifications and drops stale read models.
    ///
    /// Returns `true` if the cache was cleared.
    pub fn refresh(&mut self) -> bool {
        let Some(events) = self.events.as_mut() else {
            return false;
        };

        let mut stale = false;
        loop {
            match events.try_recv() {
                Ok(event) if event.point() == self.point => {
                    tracing::debug!(point = %self.point, event = ?event, "invalidating read models");
                    stale = true;
                }
                Ok(_) => {}
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped = skipped, "notifications lagged, invalidating read models");
                    stale = true;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        if stale {
            self.cache.clear();
        }
        stale
    }

    /// Current computation state.
    ///
    /// # Errors
    ///
    /// Returns an error if the point was deleted or the store cannot be read.
    pub fn state(&self) -> Result<ComputationState> {
        lock_store(&self.store)?.computation_state(self.point)
    }

    /// Name, configuration and state of the point.
    ///
    /// # Errors
    ///
    /// Returns an error if the point was deleted or the store cannot be read.
    pub fn point_info(&self) -> Result<PointInfo> {
        let store = lock_store(&self.store)?;
        let record = store.point(self.point)?;
        Ok(PointInfo {
            id: record.id,
            name: record.name,
            setup: record.setup,
            cell_count: record.cell_count,
            state: store.computation_state(self.point)?,
        })
    }

    /// Raw or cleaned measures as a table.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::Validation`] for any other kind and
    /// [`MolonariError::NotAvailable`] if the measures do not exist yet.
    pub fn measures_table(&self, kind: ResultKind) -> Result<MeasuresTable> {
        if !matches!(kind, ResultKind::RawMeasures | ResultKind::CleanedMeasures) {
            return Err(MolonariError::Validation(format!(
                "{kind} is not a measures table"
            )));
        }
        let store = lock_store(&self.store)?;
        require(store.computation_state(self.point)?, kind)?;
        if kind == ResultKind::RawMeasures {
            Ok(MeasuresTable::raw(&store.raw_measures(self.point)?))
        } else {
            Ok(MeasuresTable::cleaned(&store.cleaned_measures(self.point)?))
        }
    }

    /// Differential pressure over time.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::NotAvailable`] before cleanup.
    pub fn pressure_series(&self) -> Result<TimeSeries> {
        let store = lock_store(&self.store)?;
        require(store.computation_state(self.point)?, ResultKind::CleanedMeasures)?;
        let measures = store.cleaned_measures(self.point)?;
        Ok(TimeSeries::new(
            "Differential pressure (m)",
            measures.iter().map(|m| (m.timestamp, m.pressure)).collect(),
        ))
    }

    /// Measured temperatures over time: the four shaft sensors, then the river bed.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::NotAvailable`] before cleanup.
    pub fn temperature_series(&self) -> Result<Vec<TimeSeries>> {
        let store = lock_store(&self.store)?;
        require(store.computation_state(self.point)?, ResultKind::CleanedMeasures)?;
        let measures = store.cleaned_measures(self.point)?;

        let mut series: Vec<TimeSeries> = (0..4)
            .map(|sensor| {
                TimeSeries::new(
                    format!("Temperature {}", sensor + 1),
                    measures
                        .iter()
                        .map(|m| (m.timestamp, m.temperatures[sensor]))
                        .collect(),
                )
            })
            .collect();
        series.push(TimeSeries::new(
            "Bed temperature",
            measures
                .iter()
                .map(|m| (m.timestamp, m.bed_temperature))
                .collect(),
        ));
        Ok(series)
    }

    /// Depth-time maps of a grid kind, one per quantile, quantile 0 first.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::NotAvailable`] before a computation completed,
    /// [`MolonariError::Validation`] for a non-grid kind, and
    /// [`MolonariError::StoreInconsistency`] if quantile 0 is missing.
    pub fn depth_time_maps(&mut self, kind: ResultKind) -> Result<&[DepthTimeMap]> {
        if !kind.is_grid() {
            return Err(MolonariError::Validation(format!(
                "{kind} is not a depth-time map"
            )));
        }
        self.sync(kind)?;

        if !self.cache.maps.contains_key(&kind) {
            let _span = tracing::debug_span!("build_depth_time_maps", point = %self.point, kind = ?kind)
                .entered();
            let store = lock_store(&self.store)?;
            let quantiles = checked_quantiles(store.quantiles(self.point)?)?;
            let maps = quantiles
                .into_iter()
                .map(|quantile| {
                    store
                        .grid(self.point, quantile, kind)
                        .map(|grid| DepthTimeMap::new(kind, grid))
                })
                .collect::<Result<Vec<_>>>()?;
            tracing::debug!(maps = maps.len(), "depth-time maps built");
            self.cache.maps.insert(kind, maps);
        }

        Ok(self
            .cache
            .maps
            .get(&kind)
            .map_or(&[][..], Vec::as_slice))
    }

    /// Water flux at the river bed, one labeled series per quantile.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::NotAvailable`] before a computation completed,
    /// or [`MolonariError::StoreInconsistency`] if quantile 0 is missing.
    pub fn water_flux_series(&mut self) -> Result<&[TimeSeries]> {
        self.sync(ResultKind::WaterFlux)?;

        if self.cache.water_flux.is_none() {
            let store = lock_store(&self.store)?;
            let quantiles = checked_quantiles(store.quantiles(self.point)?)?;
            let series = quantiles
                .into_iter()
                .map(|quantile| {
                    store
                        .water_flux(self.point, quantile)
                        .map(|points| TimeSeries::new(quantile.label(), points))
                })
                .collect::<Result<Vec<_>>>()?;
            self.cache.water_flux = Some(series);
        }

        Ok(self.cache.water_flux.as_deref().unwrap_or_default())
    }

    /// Total RMSE per quantile and per-thermometer fit of quantile 0.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::NotAvailable`] before a computation completed,
    /// or [`MolonariError::StoreInconsistency`] if quantile 0 has no RMSE row.
    pub fn rmse_summary(&mut self) -> Result<&RmseSummary> {
        self.sync(ResultKind::Rmse)?;

        if self.cache.rmse.is_none() {
            let records = lock_store(&self.store)?.rmse(self.point)?;
            let best = records
                .first()
                .filter(|record| record.quantile.is_best())
                .ok_or_else(|| {
                    MolonariError::StoreInconsistency(format!(
                        "point {} has no RMSE for the best fit",
                        self.point
                    ))
                })?;

            let thermometers = std::array::from_fn(|i| ThermometerFit {
                depth: best.thermometer_depths[i],
                rmse: best.per_thermometer[i],
            });
            self.cache.rmse = Some(RmseSummary {
                totals: records.iter().map(|r| (r.quantile, r.total)).collect(),
                thermometers,
            });
        }

        self.cache.rmse.as_ref().ok_or_else(|| {
            MolonariError::StoreInconsistency("RMSE summary missing after rebuild".to_string())
        })
    }

    /// Bottom depths of the computed layers, top to bottom.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::NotAvailable`] before a computation completed.
    pub fn layer_depths(&self) -> Result<Vec<f64>> {
        let store = lock_store(&self.store)?;
        require(store.computation_state(self.point)?, ResultKind::LayerParameters)?;
        let layers = store.layers(self.point)?;
        Ok(layers.iter().map(|layer| layer.depth_bed).collect())
    }

    /// Best parameters of the layer whose bottom lies at `layer_depth`.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::NotAvailable`] before a computation completed,
    /// or [`MolonariError::Validation`] if no computed layer has that depth.
    pub fn best_parameters(&self, layer_depth: f64) -> Result<LayerParameters> {
        let store = lock_store(&self.store)?;
        require(store.computation_state(self.point)?, ResultKind::LayerParameters)?;
        let layers = store.layers(self.point)?;
        layers
            .iter()
            .find(|layer| (layer.depth_bed - layer_depth).abs() < LAYER_DEPTH_TOLERANCE)
            .map(|layer| layer.best)
            .ok_or_else(|| no_layer(layer_depth))
    }

    /// Posterior histograms of the layer whose bottom lies at `layer_depth`.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::NotAvailable`] unless the point is calibrated,
    /// or [`MolonariError::Validation`] if no layer has that depth.
    pub fn parameter_histograms(&self, layer_depth: f64) -> Result<ParameterHistograms> {
        let store = lock_store(&self.store)?;
        require(store.computation_state(self.point)?, ResultKind::ParamHistogram)?;

        let layer = store
            .layers(self.point)?
            .into_iter()
            .find(|layer| (layer.depth_bed - layer_depth).abs() < LAYER_DEPTH_TOLERANCE)
            .ok_or_else(|| no_layer(layer_depth))?;
        let samples = store.samples(self.point, layer.ordinal)?;

        let histograms = Parameter::ALL
            .iter()
            .map(|parameter| {
                let values: Vec<f64> = samples.iter().map(|s| s.get(*parameter)).collect();
                (*parameter, Histogram::new(&values, self.histogram_bins))
            })
            .collect();

        Ok(ParameterHistograms {
            layer_depth: layer.depth_bed,
            histograms,
        })
    }

    /// Modelled temperature at the node nearest to `depth`, one series per quantile.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::NotAvailable`] before a computation completed.
    pub fn temperature_at_depth(&mut self, depth: f64) -> Result<Vec<TimeSeries>> {
        let maps = self.depth_time_maps(ResultKind::Temperature)?;
        let Some(node) = maps
            .first()
            .and_then(|map| nearest_index(&map.grid.depths, depth))
        else {
            return Ok(Vec::new());
        };
        Ok(maps.iter().map(|map| map.column(node)).collect())
    }

    /// Best-fit temperature profiles at `count` dates spread over the record.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::NotAvailable`] before a computation completed.
    pub fn temperature_profiles(&mut self, count: usize) -> Result<Vec<TemperatureProfile>> {
        let maps = self.depth_time_maps(ResultKind::Temperature)?;
        let Some(best) = maps.first() else {
            return Ok(Vec::new());
        };
        let grid = &best.grid;

        Ok(spread_indices(grid.dates.len(), count)
            .into_iter()
            .map(|t| TemperatureProfile {
                date: grid.dates[t],
                depths: grid.depths.clone(),
                temperatures: grid.values[t].clone(),
            })
            .collect())
    }

    /// Writes the cleaned measures of the point as two CSV files in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::NotAvailable`] before cleanup, or an I/O error.
    pub fn export_cleaned_measures(&self, dir: &Path) -> Result<ExportedFiles> {
        let (name, measures) = {
            let store = lock_store(&self.store)?;
            require(store.computation_state(self.point)?, ResultKind::CleanedMeasures)?;
            (store.point(self.point)?.name, store.cleaned_measures(self.point)?)
        };
        crate::storage::export_cleaned_measures(&measures, dir, &name)
    }

    /// Checks `kind` is available and the cache still matches the store.
    fn sync(&mut self, kind: ResultKind) -> Result<()> {
        self.refresh();

        let counts = lock_store(&self.store)?.counts(self.point)?;
        require(ComputationState::from_counts(&counts), kind)?;

        if self.cache.stamp != Some(counts) {
            if self.cache.stamp.is_some() {
                tracing::debug!(point = %self.point, "store changed, invalidating read models");
            }
            self.cache.clear();
            self.cache.stamp = Some(counts);
        }
        Ok(())
    }
}

fn require(state: ComputationState, kind: ResultKind) -> Result<()> {
    if state.supports(kind) {
        Ok(())
    } else {
        Err(MolonariError::NotAvailable { kind, state })
    }
}

fn checked_quantiles(quantiles: Vec<Quantile>) -> Result<Vec<Quantile>> {
    match quantiles.first() {
        Some(first) if first.is_best() => Ok(quantiles),
        _ => Err(MolonariError::StoreInconsistency(
            "completed generation has no best-fit quantile".to_string(),
        )),
    }
}

fn no_layer(depth: f64) -> MolonariError {
    MolonariError::Validation(format!("no computed layer ends at depth {depth}"))
}
