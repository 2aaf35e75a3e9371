//! Vehicle state tracking shared between the observation listener and the planner

use nalgebra::{UnitQuaternion, Vector3};
use std::sync::RwLock;

/// Latest observed kinematic state of the vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleState {
    /// Position in the planning frame
    pub position: Vector3<f64>,
    /// Linear velocity in the planning frame
    pub velocity: Vector3<f64>,
    /// Body orientation; carried with the observation, not used by planning
    pub orientation: UnitQuaternion<f64>,
}

impl Default for VehicleState {
    /// Neutral state reported before any observation has arrived
    fn default() -> Self {
        VehicleState {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }
}

/// Holds the most recent vehicle state.
///
/// Observations overwrite the held state; no history is retained. Reads get
/// a consistent copy even while updates arrive from another thread.
#[derive(Debug, Default)]
pub struct StateTracker {
    state: RwLock<VehicleState>,
}

impl StateTracker {
    /// Create a tracker reporting the neutral default state
    pub fn new() -> Self {
        StateTracker {
            state: RwLock::new(VehicleState::default()),
        }
    }

    /// Replace the held state with a new observation
    pub fn update_state(&self, observed: VehicleState) {
        *self.state.write().unwrap() = observed;
    }

    /// Copy of the latest state, never torn across a concurrent update
    pub fn snapshot(&self) -> VehicleState {
        self.state.read().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn snapshot_defaults_to_neutral_state() {
        let tracker = StateTracker::new();
        let state = tracker.snapshot();
        assert_eq!(state.position, Vector3::zeros());
        assert_eq!(state.velocity, Vector3::zeros());
        assert_eq!(state.orientation, UnitQuaternion::identity());
    }

    #[test]
    fn snapshot_reflects_latest_update() {
        let tracker = StateTracker::new();
        tracker.update_state(VehicleState {
            position: Vector3::new(1.0, 2.0, 3.0),
            velocity: Vector3::new(0.5, 0.0, -0.5),
            orientation: UnitQuaternion::identity(),
        });
        let state = tracker.snapshot();
        assert_eq!(state.position, Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(state.velocity, Vector3::new(0.5, 0.0, -0.5));
    }

    #[test]
    fn concurrent_updates_never_tear_a_snapshot() {
        let tracker = Arc::new(StateTracker::new());

        let writer = {
            let tracker = Arc::clone(&tracker);
            thread::spawn(move || {
                for i in 0..1000 {
                    let v = i as f64;
                    tracker.update_state(VehicleState {
                        position: Vector3::new(v, v, v),
                        velocity: Vector3::new(v, v, v),
                        orientation: UnitQuaternion::identity(),
                    });
                }
            })
        };

        for _ in 0..1000 {
            let state = tracker.snapshot();
            // position and velocity are written together, so a snapshot
            // must agree with itself
            assert_eq!(state.position, state.velocity);
        }
        writer.join().unwrap();
    }
}
