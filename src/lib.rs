//! Waypoint-constrained trajectory planning for the Icarus aerial vehicle.
//!
//! The pipeline turns a sparse keyframe sequence (tracked start state,
//! optional intermediate maneuver keyframes, commanded goal) into a
//! time-parameterized per-axis polynomial trajectory that respects velocity
//! and acceleration limits, then hands the result to visualization and
//! execution sinks.

pub mod config;
pub mod error;
pub mod output;
pub mod planning;
pub mod solver;
pub mod state;
pub mod trajectory;

pub use crate::config::{MotionLimits, PlannerConfig};
pub use crate::error::{PlanningError, Result};
pub use crate::planning::WaypointPlanner;
pub use crate::state::{StateTracker, VehicleState};
pub use crate::trajectory::{DerivativeOrder, Trajectory};
