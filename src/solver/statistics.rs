//! Fit scoring and posterior statistics.

use crate::domain::{CleanedMeasure, LayerParameters, Parameter, Quantile, THERMOMETER_COUNT};
use crate::solver::{Discretization, ForwardRun};
use crate::storage::RmseRecord;
use serde::{Deserialize, Serialize};

/// Scores a forward run against the interior thermometers.
///
/// For each thermometer the modelled temperature is read at the node nearest
/// its depth and compared with the measured series. The total is the root of
/// the mean squared per-thermometer RMSE.
#[must_use]
pub fn rmse(
    quantile: Quantile,
    run: &ForwardRun,
    discretization: &Discretization,
    thermometer_depths: [f64; THERMOMETER_COUNT],
    measures: &[CleanedMeasure],
) -> RmseRecord {
    let mut node_depths = [0.0; THERMOMETER_COUNT];
    let mut per_thermometer = [0.0; THERMOMETER_COUNT];

    for (i, depth) in thermometer_depths.iter().enumerate() {
        let node = discretization.nearest_node(*depth);
        node_depths[i] = discretization.depths[node];

        let squared: Vec<f64> = run
            .temperature
            .iter()
            .zip(measures)
            .map(|(modelled, measured)| (modelled[node] - measured.temperatures[i]).powi(2))
            .collect();
        per_thermometer[i] = mean(&squared).sqrt();
    }

    let squared_rmse: Vec<f64> = per_thermometer.iter().map(|r| r * r).collect();
    RmseRecord {
        quantile,
        thermometer_depths: node_depths,
        per_thermometer,
        total: mean(&squared_rmse).sqrt(),
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    values.iter().sum::<f64>() / n
}

/// Linear-interpolated empirical quantile of sorted values.
///
/// Returns `None` for an empty slice.
#[must_use]
pub fn empirical_quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    #[allow(clippy::cast_precision_loss)]
    let position = q.clamp(0.0, 1.0) * last as f64;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lower = position.floor() as usize;
    let upper = (lower + 1).min(last);
    #[allow(clippy::cast_precision_loss)]
    let weight = position - lower as f64;
    Some(sorted[lower] + weight * (sorted[upper] - sorted[lower]))
}

/// Per-parameter quantile of one layer's posterior samples.
///
/// Returns `None` if there are no samples.
#[must_use]
pub fn quantile_parameters(samples: &[LayerParameters], quantile: Quantile) -> Option<LayerParameters> {
    if samples.is_empty() {
        return None;
    }

    let mut result = LayerParameters::from_fn(|_| 0.0);
    let mut values = Vec::with_capacity(samples.len());
    for parameter in Parameter::ALL {
        values.clear();
        values.extend(samples.iter().map(|s| s.get(parameter)));
        values.sort_by(f64::total_cmp);
        let value = empirical_quantile(&values, quantile.value())?;
        result = with_parameter(result, parameter, value);
    }
    Some(result)
}

fn with_parameter(mut params: LayerParameters, parameter: Parameter, value: f64) -> LayerParameters {
    match parameter {
        Parameter::Permeability => params.permeability = value,
        Parameter::ThermalConductivity => params.thermal_conductivity = value,
        Parameter::Porosity => params.porosity = value,
        Parameter::HeatCapacity => params.heat_capacity = value,
    }
    params
}

/// Keeps at most `max` samples, taking every k-th one.
#[must_use]
pub fn thin(samples: &[LayerParameters], max: usize) -> Vec<LayerParameters> {
    if max == 0 {
        return Vec::new();
    }
    let stride = samples.len().div_ceil(max).max(1);
    samples.iter().step_by(stride).copied().collect()
}

/// Equal-width histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    /// Bin edges, one more than the counts.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    /// Bins `values` into `bins` equal-width bins spanning their range.
    ///
    /// An empty input yields an empty histogram. When every value is equal
    /// the range is widened to one unit around that value.
    #[must_use]
    pub fn new(values: &[f64], bins: usize) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() || bins == 0 {
            return Self {
                edges: Vec::new(),
                counts: Vec::new(),
            };
        }

        let mut low = finite.iter().copied().fold(f64::INFINITY, f64::min);
        let mut high = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if high <= low {
            low -= 0.5;
            high += 0.5;
        }

        #[allow(clippy::cast_precision_loss)]
        let width = (high - low) / bins as f64;
        #[allow(clippy::cast_precision_loss)]
        let edges = (0..=bins).map(|i| low + width * i as f64).collect();

        let mut counts = vec![0; bins];
        for value in finite {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let bin = (((value - low) / width).floor() as usize).min(bins - 1);
            counts[bin] += 1;
        }

        Self { edges, counts }
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn params(value: f64) -> LayerParameters {
        LayerParameters::from_fn(|_| value)
    }

    #[test]
    fn empirical_quantile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(empirical_quantile(&sorted, 0.0), Some(1.0));
        assert_eq!(empirical_quantile(&sorted, 0.5), Some(3.0));
        assert_eq!(empirical_quantile(&sorted, 1.0), Some(5.0));
        assert_eq!(empirical_quantile(&sorted, 0.125), Some(1.5));
        assert_eq!(empirical_quantile(&[], 0.5), None);
    }

    #[test]
    fn quantile_parameters_work_per_parameter() {
        let samples: Vec<_> = (1..=5_i32).map(|i| params(f64::from(i))).collect();
        let median = quantile_parameters(&samples, Quantile::new(0.5).unwrap()).unwrap();
        assert_eq!(median, params(3.0));
        assert!(quantile_parameters(&[], Quantile::new(0.5).unwrap()).is_none());
    }

    #[test]
    fn thinning_bounds_the_sample_count() {
        let samples: Vec<_> = (0..2500_i32).map(|i| params(f64::from(i))).collect();
        let kept = thin(&samples, 1000);
        assert!(kept.len() <= 1000);
        assert_eq!(kept[0], samples[0]);
        assert_eq!(thin(&samples[..10], 1000).len(), 10);
    }

    #[test]
    fn histogram_counts_every_value() {
        let values: Vec<f64> = (0..100_i32).map(f64::from).collect();
        let histogram = Histogram::new(&values, 10);
        assert_eq!(histogram.edges.len(), 11);
        assert_eq!(histogram.counts, vec![10; 10]);
        assert_eq!(histogram.total(), 100);
    }

    #[test]
    fn histogram_of_constant_values_has_a_range() {
        let histogram = Histogram::new(&[2.0, 2.0, 2.0], 4);
        assert_eq!(histogram.total(), 3);
        assert!(histogram.edges[0] < 2.0 && histogram.edges[4] > 2.0);
        assert!(Histogram::new(&[], 4).counts.is_empty());
    }

    #[test]
    fn rmse_uses_the_nearest_node() {
        let grid = Discretization::new(&[0.0, 0.4], 4).unwrap();
        let timestamp = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let measures = vec![
            CleanedMeasure {
                timestamp,
                temperatures: [10.0, 20.0, 30.0, 40.0],
                bed_temperature: 0.0,
                pressure: 0.0,
            };
            2
        ];
        let run = ForwardRun {
            temperature: vec![vec![11.0, 20.0, 30.0, 0.0]; 2],
            advective_flow: vec![vec![0.0; 4]; 2],
            conductive_flow: vec![vec![0.0; 4]; 2],
            water_flux: vec![0.0; 2],
        };

        let record = rmse(Quantile::BEST, &run, &grid, [0.05, 0.15, 0.25], &measures);
        assert_eq!(record.per_thermometer, [1.0, 0.0, 0.0]);
        assert!((record.total - (1.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((record.thermometer_depths[1] - 0.15).abs() < 1e-12);
    }
}
