//! Monitoring point identity and physical configuration.

use crate::domain::error::{MolonariError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of interior thermometers used to score a computation.
pub const THERMOMETER_COUNT: usize = 3;

/// Number of temperature sensors along the shaft.
pub const SHAFT_SENSOR_COUNT: usize = 4;

/// Store-assigned identifier of a monitoring point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointId(pub i64);

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Physical configuration of a monitoring column.
///
/// Depths are measured in metres below the river bed and increase downwards.
/// The first three shaft sensors are the interior thermometers; the last one
/// sits at the bottom of the shaft and defines the column depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointSetup {
    /// Elevation of the river bed (m).
    pub river_bed: f64,

    /// Offset between the pressure sensor and the river bed (m).
    pub offset: f64,

    /// Depths of the four shaft temperature sensors (m).
    pub sensor_depths: [f64; SHAFT_SENSOR_COUNT],

    /// Standard deviation of the differential pressure measurements.
    pub sigma_pressure: f64,

    /// Standard deviation of the temperature measurements.
    pub sigma_temperature: f64,
}

impl PointSetup {
    /// Depths of the interior thermometers.
    #[must_use]
    pub fn thermometer_depths(&self) -> [f64; THERMOMETER_COUNT] {
        [
            self.sensor_depths[0],
            self.sensor_depths[1],
            self.sensor_depths[2],
        ]
    }

    /// Total depth of the shaft.
    #[must_use]
    pub fn shaft_depth(&self) -> f64 {
        self.sensor_depths[SHAFT_SENSOR_COUNT - 1]
    }

    /// Checks that the configuration describes a usable column.
    ///
    /// # Errors
    ///
    /// Returns [`MolonariError::Validation`] if a value is not finite, if sensor
    /// depths are not strictly increasing and positive, or if an uncertainty is
    /// negative.
    pub fn validate(&self) -> Result<()> {
        let scalars = [
            self.river_bed,
            self.offset,
            self.sigma_pressure,
            self.sigma_temperature,
        ];
        if scalars.iter().chain(self.sensor_depths.iter()).any(|v| !v.is_finite()) {
            return Err(MolonariError::Validation(
                "point setup contains a non-finite value".to_string(),
            ));
        }

        if self.sensor_depths[0] <= 0.0
            || self.sensor_depths.windows(2).any(|pair| pair[1] <= pair[0])
        {
            return Err(MolonariError::Validation(format!(
                "sensor depths must be positive and strictly increasing, got {:?}",
                self.sensor_depths
            )));
        }

        if self.sigma_pressure < 0.0 || self.sigma_temperature < 0.0 {
            return Err(MolonariError::Validation(
                "measurement uncertainties cannot be negative".to_string(),
            ));
        }

        Ok(())
    }
}
