use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ReductionError;
use crate::record::Channel;

/// Which Rogowski coil a setting refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensor {
    A,
    B,
}

impl Sensor {
    /// Sign that turns this coil's voltage into the direction of the total current.
    pub fn polarity(&self) -> f64 {
        match self {
            Sensor::A => 1.0,
            Sensor::B => -1.0,
        }
    }

    /// Scope column carrying this coil's voltage.
    pub fn channel(&self) -> Channel {
        match self {
            Sensor::A => Channel::SensorA,
            Sensor::B => Channel::SensorB,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorCalibration {
    /// Attenuation between coil and scope, `20 * log10(V_in / V_out)`.
    pub attenuation_db: f64,
    /// Amperes per volt-second of calibrated coil voltage.
    pub coil_coefficient: f64,
}

/// Placement of the DC-offset averaging window relative to the provisional peak.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OffsetWindowConfig {
    /// Length of the averaging window in seconds.
    pub averaging_s: f64,
    /// Gap between the window end and the provisional peak, in seconds.
    /// Must exceed the expected rise time.
    pub standoff_s: f64,
}

impl Default for OffsetWindowConfig {
    fn default() -> Self {
        Self {
            averaging_s: 4.0e-6,
            standoff_s: 0.8e-6,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReductionConfig {
    pub sensor_a: SensorCalibration,
    pub sensor_b: SensorCalibration,
    pub offset_window: OffsetWindowConfig,
    /// Sensor whose voltage peak anchors the offset window.
    pub reference_sensor: Sensor,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            sensor_a: SensorCalibration {
                attenuation_db: 26.0,
                coil_coefficient: 8.16e8,
            },
            sensor_b: SensorCalibration {
                attenuation_db: 26.0,
                coil_coefficient: 1.0e9,
            },
            offset_window: OffsetWindowConfig::default(),
            reference_sensor: Sensor::A,
        }
    }
}

impl ReductionConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ReductionError> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn sensor(&self, sensor: Sensor) -> &SensorCalibration {
        match sensor {
            Sensor::A => &self.sensor_a,
            Sensor::B => &self.sensor_b,
        }
    }

    pub fn validate(&self) -> Result<(), ReductionError> {
        for (name, cal) in [("sensor_a", &self.sensor_a), ("sensor_b", &self.sensor_b)] {
            if !cal.attenuation_db.is_finite() {
                return Err(ReductionError::InvalidConfig(format!(
                    "{name}.attenuation_db must be finite"
                )));
            }
            if !cal.coil_coefficient.is_finite() || cal.coil_coefficient == 0.0 {
                return Err(ReductionError::InvalidConfig(format!(
                    "{name}.coil_coefficient must be finite and non-zero"
                )));
            }
        }
        let window = &self.offset_window;
        if !(window.averaging_s > 0.0 && window.averaging_s.is_finite()) {
            return Err(ReductionError::InvalidConfig(
                "offset_window.averaging_s must be positive".into(),
            ));
        }
        if !(window.standoff_s > 0.0 && window.standoff_s.is_finite()) {
            return Err(ReductionError::InvalidConfig(
                "offset_window.standoff_s must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ReductionConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: ReductionConfig =
            serde_json::from_str(r#"{ "reference_sensor": "b", "offset_window": { "averaging_s": 2e-6, "standoff_s": 1e-6 } }"#)
                .unwrap();
        assert_eq!(config.reference_sensor, Sensor::B);
        assert_eq!(config.offset_window.averaging_s, 2e-6);
        assert_eq!(config.sensor_b.coil_coefficient, 1.0e9);
    }

    #[test]
    fn coils_have_opposite_polarity() {
        assert_eq!(Sensor::A.polarity(), 1.0);
        assert_eq!(Sensor::B.polarity(), -1.0);
        assert_eq!(Sensor::B.channel(), Channel::SensorB);
        let config = ReductionConfig::default();
        assert_eq!(config.sensor(Sensor::A).coil_coefficient, 8.16e8);
        assert_eq!(config.sensor(Sensor::B).coil_coefficient, 1.0e9);
    }

    #[test]
    fn zero_coil_coefficient_is_rejected() {
        let mut config = ReductionConfig::default();
        config.sensor_b.coil_coefficient = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ReductionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn negative_standoff_is_rejected() {
        let mut config = ReductionConfig::default();
        config.offset_window.standoff_s = -1e-6;
        assert!(config.validate().is_err());
    }
}
