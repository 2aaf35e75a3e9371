//! Planner configuration and motion limits

use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{PlanningError, Result};

/// Default maximum velocity magnitude, m/s
pub const DEFAULT_MAX_VELOCITY: f64 = 2.0;
/// Default maximum acceleration magnitude, m/s^2
pub const DEFAULT_MAX_ACCELERATION: f64 = 2.0;
/// Default arc-length spacing between visualization samples, m
pub const DEFAULT_VISUALIZATION_SPACING: f64 = 0.2;
/// Default duration for segments without a usable displacement, s
pub const DEFAULT_MIN_SEGMENT_TIME: f64 = 0.5;
/// Reference frame trajectories are expressed in
pub const DEFAULT_FRAME_ID: &str = "world";

/// Velocity and acceleration bounds applied across the whole trajectory
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionLimits {
    /// Maximum velocity magnitude, m/s
    pub max_velocity: f64,
    /// Maximum acceleration magnitude, m/s^2
    pub max_acceleration: f64,
}

impl MotionLimits {
    /// Create limits, rejecting non-positive bounds
    pub fn new(max_velocity: f64, max_acceleration: f64) -> Result<Self> {
        if max_velocity <= 0.0 || !max_velocity.is_finite() {
            return Err(PlanningError::InvalidInput(format!(
                "max velocity must be positive, got {}",
                max_velocity
            )));
        }
        if max_acceleration <= 0.0 || !max_acceleration.is_finite() {
            return Err(PlanningError::InvalidInput(format!(
                "max acceleration must be positive, got {}",
                max_acceleration
            )));
        }
        Ok(MotionLimits {
            max_velocity,
            max_acceleration,
        })
    }
}

impl Default for MotionLimits {
    fn default() -> Self {
        MotionLimits {
            max_velocity: DEFAULT_MAX_VELOCITY,
            max_acceleration: DEFAULT_MAX_ACCELERATION,
        }
    }
}

/// Numeric parameter surface for the waypoint planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Motion limits handed to time estimation and optimization
    pub limits: MotionLimits,
    /// Arc-length spacing between visualization samples
    pub visualization_spacing: f64,
    /// Fallback duration for segments without position constraints
    pub min_segment_time: f64,
    /// Reference frame tag attached to published output
    pub frame_id: String,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            limits: MotionLimits::default(),
            visualization_spacing: DEFAULT_VISUALIZATION_SPACING,
            min_segment_time: DEFAULT_MIN_SEGMENT_TIME,
            frame_id: DEFAULT_FRAME_ID.to_string(),
        }
    }
}

impl PlannerConfig {
    /// Build a config from a parameter map.
    ///
    /// A missing or non-positive parameter is recoverable: it is logged as a
    /// warning and the hardcoded default is used instead.
    pub fn from_params(params: &HashMap<String, f64>) -> Self {
        PlannerConfig {
            limits: MotionLimits {
                max_velocity: param_or_default(params, "max_v", DEFAULT_MAX_VELOCITY),
                max_acceleration: param_or_default(params, "max_a", DEFAULT_MAX_ACCELERATION),
            },
            visualization_spacing: param_or_default(
                params,
                "visualization_spacing",
                DEFAULT_VISUALIZATION_SPACING,
            ),
            min_segment_time: param_or_default(params, "min_segment_time", DEFAULT_MIN_SEGMENT_TIME),
            frame_id: DEFAULT_FRAME_ID.to_string(),
        }
    }
}

fn param_or_default(params: &HashMap<String, f64>, key: &str, default: f64) -> f64 {
    match params.get(key) {
        Some(&value) if value > 0.0 && value.is_finite() => value,
        Some(&value) => {
            warn!(
                "param {} must be positive, ignoring {} and using default {}",
                key, value, default
            );
            default
        }
        None => {
            warn!("param {} not found, using default {}", key, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_params_fall_back_to_defaults() {
        let config = PlannerConfig::from_params(&HashMap::new());
        assert_eq!(config.limits.max_velocity, DEFAULT_MAX_VELOCITY);
        assert_eq!(config.limits.max_acceleration, DEFAULT_MAX_ACCELERATION);
        assert_eq!(config.visualization_spacing, DEFAULT_VISUALIZATION_SPACING);
        assert_eq!(config.min_segment_time, DEFAULT_MIN_SEGMENT_TIME);
        assert_eq!(config.frame_id, DEFAULT_FRAME_ID);
    }

    #[test]
    fn supplied_params_are_honored() {
        let mut params = HashMap::new();
        params.insert("max_v".to_string(), 3.5);
        params.insert("max_a".to_string(), 1.25);
        let config = PlannerConfig::from_params(&params);
        assert_eq!(config.limits.max_velocity, 3.5);
        assert_eq!(config.limits.max_acceleration, 1.25);
    }

    #[test]
    fn non_positive_params_fall_back_to_defaults() {
        let mut params = HashMap::new();
        params.insert("max_v".to_string(), -1.0);
        params.insert("max_a".to_string(), 0.0);
        let config = PlannerConfig::from_params(&params);
        assert_eq!(config.limits.max_velocity, DEFAULT_MAX_VELOCITY);
        assert_eq!(config.limits.max_acceleration, DEFAULT_MAX_ACCELERATION);
    }

    #[test]
    fn limits_reject_non_positive_bounds() {
        assert!(MotionLimits::new(2.0, 2.0).is_ok());
        assert!(MotionLimits::new(0.0, 2.0).is_err());
        assert!(MotionLimits::new(2.0, -0.5).is_err());
        assert!(MotionLimits::new(f64::NAN, 2.0).is_err());
    }
}
