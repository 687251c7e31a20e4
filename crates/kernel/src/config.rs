use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Errors from loading or validating a [`WorldConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Tunable simulation constants.
///
/// Missing fields in a config file fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Constant acceleration applied to dynamic bodies every sub-step.
    pub gravity: Vec2,
    /// Fraction of velocity a body keeps after one second.
    pub damping: f32,
    /// Physics sub-steps per frame. Fixed, not derived from frame rate.
    pub substeps: u32,
    /// Penetration the solver leaves in place to keep resting contacts stable.
    pub collision_slop: f32,
    /// Typical object size in world units; scales the solver's tolerances.
    pub length_unit: f32,
    /// Camera follow rate; higher is snappier.
    pub camera_smoothing: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            gravity: Vec2::new(0.0, -900.0),
            damping: 0.9,
            substeps: 4,
            collision_slop: 0.1,
            length_unit: 1.0,
            camera_smoothing: 8.0,
        }
    }
}

impl WorldConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.gravity.is_finite() {
            return Err(invalid("gravity", format!("{} is not finite", self.gravity)));
        }
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(invalid("damping", format!("{} is outside (0, 1]", self.damping)));
        }
        if self.substeps == 0 {
            return Err(invalid("substeps", "must be at least 1".into()));
        }
        if !(self.collision_slop >= 0.0 && self.collision_slop.is_finite()) {
            return Err(invalid(
                "collision_slop",
                format!("{} must be a non-negative number", self.collision_slop),
            ));
        }
        if !(self.length_unit > 0.0 && self.length_unit.is_finite()) {
            return Err(invalid(
                "length_unit",
                format!("{} must be a positive number", self.length_unit),
            ));
        }
        if !(self.camera_smoothing >= 0.0 && self.camera_smoothing.is_finite()) {
            return Err(invalid(
                "camera_smoothing",
                format!("{} must be a non-negative number", self.camera_smoothing),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::Invalid { field, reason }
}
