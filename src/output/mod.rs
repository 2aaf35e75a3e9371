//! Trajectory output: visualization sampling, execution serialization, sinks

use log::{debug, warn};
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_FRAME_ID, DEFAULT_VISUALIZATION_SPACING};
use crate::error::{PlanningError, Result};
use crate::trajectory::Trajectory;

/// Fine time steps per segment when walking arc length
const WALK_STEPS: usize = 100;

/// One visualization sample along the trajectory
#[derive(Debug, Clone, PartialEq)]
pub struct TrajectorySample {
    /// Sampled position
    pub position: Vector3<f64>,
    /// Marker orientation; neutral, planning ignores orientation
    pub orientation: UnitQuaternion<f64>,
}

impl TrajectorySample {
    fn at(position: Vector3<f64>) -> Self {
        TrajectorySample {
            position,
            orientation: UnitQuaternion::identity(),
        }
    }
}

/// Wire form of one polynomial segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialSegmentMsg {
    /// Coefficients per axis (polynomial order + 1)
    pub num_coefficients: usize,
    /// Segment duration in seconds
    pub duration: f64,
    /// Per-axis coefficients in ascending powers
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

/// Wire form of a full trajectory handed to the execution side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolynomialTrajectoryMsg {
    /// Reference frame the coefficients are expressed in
    pub frame_id: String,
    /// Segments in playback order
    pub segments: Vec<PolynomialSegmentMsg>,
}

/// Receives visualization samples; rendering happens elsewhere
pub trait VisualizationSink: Send + Sync {
    /// Accept one batch of samples expressed in `frame_id`
    fn publish_samples(&self, samples: &[TrajectorySample], frame_id: &str) -> Result<()>;
}

/// Receives serialized trajectories for execution
pub trait ExecutionSink: Send + Sync {
    /// Accept one trajectory message
    fn publish_trajectory(&self, message: &PolynomialTrajectoryMsg) -> Result<()>;
}

/// Sink that reports sample batches through the log, for headless runs
#[derive(Debug, Default)]
pub struct LogVisualizationSink;

impl VisualizationSink for LogVisualizationSink {
    fn publish_samples(&self, samples: &[TrajectorySample], frame_id: &str) -> Result<()> {
        debug!("visualization: {} samples in frame {}", samples.len(), frame_id);
        Ok(())
    }
}

/// Sink that writes each trajectory message as one JSON line to stdout
#[derive(Debug, Default)]
pub struct JsonExecutionSink;

impl ExecutionSink for JsonExecutionSink {
    fn publish_trajectory(&self, message: &PolynomialTrajectoryMsg) -> Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| PlanningError::PublishFailure(e.to_string()))?;
        println!("{}", json);
        Ok(())
    }
}

/// Publishes planned trajectories to the visualization and execution sinks
pub struct TrajectoryEmitter {
    visualization_sink: Box<dyn VisualizationSink>,
    execution_sink: Box<dyn ExecutionSink>,
    sample_spacing: f64,
    frame_id: String,
}

impl TrajectoryEmitter {
    /// Emitter with the default sample spacing and frame tag
    pub fn new(
        visualization_sink: Box<dyn VisualizationSink>,
        execution_sink: Box<dyn ExecutionSink>,
    ) -> Self {
        TrajectoryEmitter {
            visualization_sink,
            execution_sink,
            sample_spacing: DEFAULT_VISUALIZATION_SPACING,
            frame_id: DEFAULT_FRAME_ID.to_string(),
        }
    }

    /// Override the arc-length spacing between visualization samples
    pub fn set_sample_spacing(&mut self, spacing: f64) {
        self.sample_spacing = spacing;
    }

    /// Override the reference frame tag attached to published output
    pub fn set_frame_id(&mut self, frame_id: &str) {
        self.frame_id = frame_id.to_string();
    }

    /// Samples spaced `spacing` apart in arc length, plus one sample at
    /// every segment boundary.
    ///
    /// Non-positive spacing disables arc-length sampling and keeps only the
    /// boundary samples.
    pub fn sample_for_visualization(
        &self,
        trajectory: &Trajectory,
        spacing: f64,
    ) -> Vec<TrajectorySample> {
        let segments = trajectory.segments();
        let mut samples = Vec::new();
        let first = match segments.first() {
            Some(segment) => segment,
            None => return samples,
        };

        let mut previous = first.evaluate(0.0, 0);
        samples.push(TrajectorySample::at(previous));
        let mut since_last = 0.0;

        for segment in segments {
            for step in 1..=WALK_STEPS {
                let t = segment.duration() * step as f64 / WALK_STEPS as f64;
                let position = segment.evaluate(t, 0);
                // emit exactly-spaced samples along the polyline step
                loop {
                    let step_vector = position - previous;
                    let step_length = step_vector.norm();
                    if spacing <= 0.0 || since_last + step_length < spacing {
                        since_last += step_length;
                        break;
                    }
                    let advance = spacing - since_last;
                    previous += step_vector * (advance / step_length);
                    samples.push(TrajectorySample::at(previous));
                    since_last = 0.0;
                }
                previous = position;
            }
            // segment boundary sample
            samples.push(TrajectorySample::at(previous));
            since_last = 0.0;
        }
        samples
    }

    /// Serialize per-segment durations and coefficients into the wire form
    pub fn serialize_for_execution(&self, trajectory: &Trajectory) -> PolynomialTrajectoryMsg {
        let segments = trajectory
            .segments()
            .iter()
            .map(|segment| {
                let [x, y, z] = segment.axes();
                PolynomialSegmentMsg {
                    num_coefficients: x.num_coefficients(),
                    duration: segment.duration(),
                    x: x.coefficients().to_vec(),
                    y: y.coefficients().to_vec(),
                    z: z.coefficients().to_vec(),
                }
            })
            .collect();
        PolynomialTrajectoryMsg {
            frame_id: self.frame_id.clone(),
            segments,
        }
    }

    /// Send a trajectory to both sinks, fire and forget.
    ///
    /// Sink errors are logged and never propagated; the trajectory already
    /// belongs to the caller.
    pub fn publish(&self, trajectory: &Trajectory) {
        let samples = self.sample_for_visualization(trajectory, self.sample_spacing);
        if let Err(e) = self
            .visualization_sink
            .publish_samples(&samples, &self.frame_id)
        {
            warn!("visualization publish failed: {}", e);
        }

        let message = self.serialize_for_execution(trajectory);
        if let Err(e) = self.execution_sink.publish_trajectory(&message) {
            warn!("execution publish failed: {}", e);
        }
        debug!(
            "published trajectory: {} samples, {} segments",
            samples.len(),
            message.segments.len()
        );
    }
}
