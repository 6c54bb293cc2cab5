//! Layer parameters, prior ranges and quantiles.

use crate::domain::error::{MolonariError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical parameters of one layer of the river bed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerParameters {
    /// Intrinsic permeability, stored as `-log10(k)`.
    pub permeability: f64,

    /// Thermal conductivity of the solid matrix (W/m/K).
    pub thermal_conductivity: f64,

    /// Porosity (dimensionless).
    pub porosity: f64,

    /// Volumetric heat capacity of the solid matrix (J/m3/K).
    pub heat_capacity: f64,
}

impl LayerParameters {
    /// Reads one parameter by name.
    #[must_use]
    pub const fn get(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::Permeability => self.permeability,
            Parameter::ThermalConductivity => self.thermal_conductivity,
            Parameter::Porosity => self.porosity,
            Parameter::HeatCapacity => self.heat_capacity,
        }
    }

    /// Builds a parameter set from a per-parameter function.
    pub fn from_fn(mut value: impl FnMut(Parameter) -> f64) -> Self {
        Self {
            permeability: value(Parameter::Permeability),
            thermal_conductivity: value(Parameter::ThermalConductivity),
            porosity: value(Parameter::Porosity),
            heat_capacity: value(Parameter::HeatCapacity),
        }
    }

    /// Returns `true` when all four values are finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        Parameter::ALL.iter().all(|p| self.get(*p).is_finite())
    }
}

/// The four calibrated parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parameter {
    Permeability,
    ThermalConductivity,
    Porosity,
    HeatCapacity,
}

impl Parameter {
    pub const ALL: [Self; 4] = [
        Self::Permeability,
        Self::ThermalConductivity,
        Self::Porosity,
        Self::HeatCapacity,
    ];

    /// Axis label used by histogram read models.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Permeability => "-log10(K)",
            Self::ThermalConductivity => "Thermal conductivity (W/m/K)",
            Self::Porosity => "Porosity",
            Self::HeatCapacity => "Heat capacity (J/m3/K)",
        }
    }
}

/// Closed interval a calibration may draw one parameter from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorRange {
    pub low: f64,
    pub high: f64,
}

impl PriorRange {
    #[must_use]
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    /// Returns `true` if the range is finite and `low < high`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.low.is_finite() && self.high.is_finite() && self.low < self.high
    }
}

/// Prior ranges for every parameter of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerPriors {
    pub permeability: PriorRange,
    pub thermal_conductivity: PriorRange,
    pub porosity: PriorRange,
    pub heat_capacity: PriorRange,
}

impl LayerPriors {
    /// Range of one parameter.
    #[must_use]
    pub const fn range(&self, parameter: Parameter) -> PriorRange {
        match parameter {
            Parameter::Permeability => self.permeability,
            Parameter::ThermalConductivity => self.thermal_conductivity,
            Parameter::Porosity => self.porosity,
            Parameter::HeatCapacity => self.heat_capacity,
        }
    }

    /// Checks that every range satisfies `low < high`.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::Validation`] naming the first invalid parameter.
    pub fn validate(&self, layer: usize) -> Result<()> {
        for parameter in Parameter::ALL {
            let range = self.range(parameter);
            if !range.is_valid() {
                return Err(MolonariError::Validation(format!(
                    "layer {layer}: prior for {parameter:?} needs low < high, got [{}, {}]",
                    range.low, range.high
                )));
            }
        }
        Ok(())
    }
}

/// Statistical variant of a computation result.
///
/// `Quantile::BEST` (stored as `0`) is the deterministic best-fit result and
/// exists for every completed computation. Other values lie strictly inside
/// `(0, 1)` and only exist after a calibration.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Quantile(f64);

impl Quantile {
    /// The best-fit result.
    pub const BEST: Self = Self(0.0);

    /// Creates a requested quantile.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::Validation`] unless `0 < value < 1`.
    pub fn new(value: f64) -> Result<Self> {
        if value > 0.0 && value < 1.0 {
            Ok(Self(value))
        } else {
            Err(MolonariError::Validation(format!(
                "requested quantiles must lie in (0, 1), got {value}"
            )))
        }
    }

    /// Rebuilds a quantile read back from the store.
    pub(crate) const fn from_stored(value: f64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }

    #[must_use]
    pub fn is_best(self) -> bool {
        self.0 == 0.0
    }

    /// Series label shown next to curves of this quantile.
    #[must_use]
    pub fn label(self) -> String {
        if self.is_best() {
            "Best fit".to_string()
        } else {
            format!("Quantile {}", self.0)
        }
    }
}

impl fmt::Display for Quantile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validates requested quantiles and returns them sorted without duplicates.
///
/// # Errors
///
/// Returns [`MolonariError::Validation`] if the list is empty or any value
/// lies outside `(0, 1)`.
pub fn requested_quantiles(values: &[f64]) -> Result<Vec<Quantile>> {
    if values.is_empty() {
        return Err(MolonariError::Validation(
            "a calibration needs at least one quantile in (0, 1)".to_string(),
        ));
    }
    let mut quantiles = values
        .iter()
        .map(|v| Quantile::new(*v))
        .collect::<Result<Vec<_>>>()?;
    quantiles.sort_by(|a, b| a.0.total_cmp(&b.0));
    quantiles.dedup();
    Ok(quantiles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantile_bounds_are_exclusive() {
        assert!(Quantile::new(0.0).is_err());
        assert!(Quantile::new(1.0).is_err());
        assert!(Quantile::new(f64::NAN).is_err());
        assert!(Quantile::new(0.5).is_ok());
    }

    #[test]
    fn requested_quantiles_are_sorted_and_deduplicated() {
        let quantiles = requested_quantiles(&[0.95, 0.05, 0.5, 0.05]).unwrap();
        let values: Vec<f64> = quantiles.iter().map(|q| q.value()).collect();
        assert_eq!(values, vec![0.05, 0.5, 0.95]);
    }

    #[test]
    fn requested_quantiles_must_not_be_empty() {
        assert!(matches!(requested_quantiles(&[]), Err(MolonariError::Validation(_))));
    }

    #[test]
    fn best_quantile_has_its_own_label() {
        assert_eq!(Quantile::BEST.label(), "Best fit");
        assert_eq!(Quantile::new(0.05).unwrap().label(), "Quantile 0.05");
    }

    #[test]
    fn priors_require_low_below_high() {
        let range = PriorRange::new(1.0, 2.0);
        let mut priors = LayerPriors {
            permeability: range,
            thermal_conductivity: range,
            porosity: range,
            heat_capacity: range,
        };
        assert!(priors.validate(0).is_ok());

        priors.porosity = PriorRange::new(0.4, 0.4);
        assert!(matches!(priors.validate(1), Err(MolonariError::Validation(_))));
    }
}
