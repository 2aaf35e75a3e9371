//! Waypoint-constrained trajectory planning pipeline

pub mod keyframes;
pub mod optimizer;
pub mod timing;

use log::info;
use nalgebra::DVector;
use std::sync::Arc;

use crate::config::PlannerConfig;
use crate::error::{PlanningError, Result};
use crate::output::{ExecutionSink, TrajectoryEmitter, VisualizationSink};
use crate::planning::keyframes::{Keyframe, KeyframeSequenceBuilder};
use crate::planning::optimizer::{PolynomialSolver, TrajectoryOptimizer};
use crate::state::StateTracker;
use crate::trajectory::Trajectory;

/// Plans smooth trajectories from the tracked vehicle state to commanded
/// goals and hands the results to the output sinks.
///
/// One planning request runs snapshot, keyframe assembly, segment time
/// estimation and optimization to completion on the calling thread; the
/// state tracker may be fed concurrently from a listener thread.
pub struct WaypointPlanner {
    config: PlannerConfig,
    tracker: Arc<StateTracker>,
    builder: KeyframeSequenceBuilder,
    optimizer: TrajectoryOptimizer,
    emitter: TrajectoryEmitter,
}

impl WaypointPlanner {
    /// Planner over a shared state tracker with injected solver and sinks
    pub fn new(
        config: PlannerConfig,
        tracker: Arc<StateTracker>,
        solver: Box<dyn PolynomialSolver>,
        visualization_sink: Box<dyn VisualizationSink>,
        execution_sink: Box<dyn ExecutionSink>,
    ) -> Self {
        let mut emitter = TrajectoryEmitter::new(visualization_sink, execution_sink);
        emitter.set_sample_spacing(config.visualization_spacing);
        emitter.set_frame_id(&config.frame_id);

        WaypointPlanner {
            builder: KeyframeSequenceBuilder::default(),
            optimizer: TrajectoryOptimizer::new(solver),
            emitter,
            tracker,
            config,
        }
    }

    /// Insert a reusable maneuver between start and goal on every request
    pub fn with_intermediate_keyframes(mut self, keyframes: Vec<Keyframe>) -> Self {
        self.builder.set_intermediate_keyframes(keyframes);
        self
    }

    /// Shared tracker fed by the observation listener
    pub fn state_tracker(&self) -> Arc<StateTracker> {
        Arc::clone(&self.tracker)
    }

    /// Configuration in effect
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Adjust the velocity limit between requests
    pub fn set_max_velocity(&mut self, max_velocity: f64) -> Result<()> {
        if max_velocity <= 0.0 || !max_velocity.is_finite() {
            return Err(PlanningError::InvalidInput(format!(
                "max velocity must be positive, got {}",
                max_velocity
            )));
        }
        self.config.limits.max_velocity = max_velocity;
        Ok(())
    }

    /// Plan from the latest tracked state to the commanded goal.
    ///
    /// Fails without a trajectory if the goal is malformed or the solver
    /// does not converge; nothing is published either way.
    pub fn plan_trajectory(
        &self,
        goal_position: &DVector<f64>,
        goal_velocity: &DVector<f64>,
    ) -> Result<Trajectory> {
        let snapshot = self.tracker.snapshot();
        info!(
            "planning from {:?} to goal {:?}",
            snapshot.position.as_slice(),
            goal_position.as_slice()
        );

        let sequence = self.builder.build(goal_position, goal_velocity, &snapshot)?;
        let segment_times = timing::estimate_segment_times(
            &sequence,
            &self.config.limits,
            self.config.min_segment_time,
        );
        let trajectory = self.optimizer.optimize(
            &sequence,
            &segment_times,
            &self.config.limits,
            self.builder.optimize_to(),
        )?;
        info!(
            "planned trajectory: {} segments over {:.2} s",
            trajectory.num_segments(),
            trajectory.total_time()
        );
        Ok(trajectory)
    }

    /// Publish a planned trajectory to the visualization and execution sinks
    pub fn publish_trajectory(&self, trajectory: &Trajectory) {
        self.emitter.publish(trajectory);
    }
}
