use anyhow::Result;
use icarus_core::output::{JsonExecutionSink, LogVisualizationSink};
use icarus_core::planning::keyframes::Keyframe;
use icarus_core::solver::MinimumDerivativeSolver;
use icarus_core::{DerivativeOrder, PlannerConfig, StateTracker, VehicleState, WaypointPlanner};
use log::info;
use nalgebra::{DVector, UnitQuaternion, Vector3};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Planner node: a background listener feeds vehicle state observations into
/// the shared tracker while the foreground plans to commanded goals.
struct IcarusPlannerNode {
    planner: WaypointPlanner,
    running: Arc<Mutex<bool>>,
    listener: Option<thread::JoinHandle<()>>,
}

impl IcarusPlannerNode {
    fn new(params: &HashMap<String, f64>) -> Self {
        let config = PlannerConfig::from_params(params);
        info!(
            "using limits: max_v={}, max_a={}",
            config.limits.max_velocity, config.limits.max_acceleration
        );

        let tracker = Arc::new(StateTracker::new());
        let planner = WaypointPlanner::new(
            config,
            Arc::clone(&tracker),
            Box::new(MinimumDerivativeSolver::default()),
            Box::new(LogVisualizationSink),
            Box::new(JsonExecutionSink),
        )
        .with_intermediate_keyframes(height_oscillation_maneuver());

        // Stand-in for the odometry stream: hold the vehicle at rest at the
        // origin until a real ingestion source is wired up.
        let running = Arc::new(Mutex::new(true));
        let listener = {
            let tracker = Arc::clone(&tracker);
            let running = Arc::clone(&running);
            thread::spawn(move || {
                while *running.lock().unwrap() {
                    tracker.update_state(VehicleState {
                        position: Vector3::zeros(),
                        velocity: Vector3::zeros(),
                        orientation: UnitQuaternion::identity(),
                    });
                    thread::sleep(Duration::from_millis(100)); // 10 Hz
                }
            })
        };

        IcarusPlannerNode {
            planner,
            running,
            listener: Some(listener),
        }
    }

    fn plan_and_publish(&self, goal_position: DVector<f64>, goal_velocity: DVector<f64>) -> Result<()> {
        let trajectory = self.planner.plan_trajectory(&goal_position, &goal_velocity)?;
        info!(
            "trajectory ready: {} segments, {:.2} s total",
            trajectory.num_segments(),
            trajectory.total_time()
        );
        self.planner.publish_trajectory(&trajectory);
        Ok(())
    }
}

impl Drop for IcarusPlannerNode {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            *running = false;
        }
        if let Some(listener) = self.listener.take() {
            let _ = listener.join();
        }
    }
}

/// Height-performance test maneuver: bounce between 2 m and 1 m altitude
/// three times, pausing at each hold point
fn height_oscillation_maneuver() -> Vec<Keyframe> {
    let hold_at = |z: f64| {
        Keyframe::free()
            .with_constraint(DerivativeOrder::Position, Vector3::new(0.0, 0.0, z))
            .with_constraint(DerivativeOrder::Velocity, Vector3::zeros())
            .with_constraint(DerivativeOrder::Acceleration, Vector3::zeros())
    };
    let top = hold_at(-2.0);
    let bottom = hold_at(-1.0);
    vec![
        top.clone(),
        bottom.clone(),
        top.clone(),
        bottom.clone(),
        top,
        bottom,
    ]
}

fn main() -> Result<()> {
    env_logger::init();
    info!("initializing Icarus planner node");

    // TODO: read these from a parameter file once the launch tooling lands
    let mut params = HashMap::new();
    params.insert("max_v".to_string(), 2.0);
    params.insert("max_a".to_string(), 2.0);

    let node = IcarusPlannerNode::new(&params);

    // let the listener deliver at least one observation before planning
    thread::sleep(Duration::from_millis(200));

    let goal_position = DVector::from_vec(vec![2.0, 0.0, -1.0]);
    let goal_velocity = DVector::from_vec(vec![0.0, 0.0, 0.0]);
    node.plan_and_publish(goal_position, goal_velocity)?;

    info!("Icarus planner node done");
    Ok(())
}
