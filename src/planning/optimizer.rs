//! Invocation seam between keyframe planning and polynomial optimization

use log::debug;

use crate::config::MotionLimits;
use crate::error::{PlanningError, Result};
use crate::planning::keyframes::KeyframeSequence;
use crate::trajectory::{DerivativeOrder, Trajectory};

/// Upper bound on the magnitude of one derivative, enforced at discrete
/// sample points rather than algebraically
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagnitudeConstraint {
    /// Derivative the bound applies to
    pub derivative: DerivativeOrder,
    /// Largest allowed magnitude
    pub max_magnitude: f64,
}

/// Everything the polynomial solver needs for one request
#[derive(Debug)]
pub struct SolveRequest<'a> {
    /// Keyframes with their per-derivative constraints
    pub keyframes: &'a KeyframeSequence,
    /// Allotted transit time per segment
    pub segment_times: &'a [f64],
    /// Derivative whose integrated squared value is minimized
    pub optimize_to: DerivativeOrder,
    /// Sampled inequality bounds the result must respect
    pub inequality_constraints: &'a [MagnitudeConstraint],
}

/// Polynomial trajectory solver, injected so planning stays independent of
/// the concrete optimizer
pub trait PolynomialSolver: Send + Sync {
    /// Fit polynomial segments to the request, or report non-convergence
    fn solve(&self, request: &SolveRequest<'_>) -> Result<Trajectory>;

    /// Solver name for logs
    fn name(&self) -> &str;
}

/// Validates requests, delegates to the injected solver, validates responses
pub struct TrajectoryOptimizer {
    solver: Box<dyn PolynomialSolver>,
}

impl TrajectoryOptimizer {
    /// Wrap a solver behind the optimization seam
    pub fn new(solver: Box<dyn PolynomialSolver>) -> Self {
        TrajectoryOptimizer { solver }
    }

    /// Name of the underlying solver
    pub fn solver_name(&self) -> &str {
        self.solver.name()
    }

    /// Run one optimization request end to end.
    ///
    /// The request is checked before the solver runs; a solver failure
    /// surfaces as [`PlanningError::OptimizationFailed`] and never yields a
    /// partial trajectory. The response is checked against the request:
    /// exactly one segment per segment time, every duration positive.
    pub fn optimize(
        &self,
        sequence: &KeyframeSequence,
        segment_times: &[f64],
        limits: &MotionLimits,
        optimize_to: DerivativeOrder,
    ) -> Result<Trajectory> {
        validate_request(sequence, segment_times, optimize_to)?;

        let inequality_constraints = [
            MagnitudeConstraint {
                derivative: DerivativeOrder::Velocity,
                max_magnitude: limits.max_velocity,
            },
            MagnitudeConstraint {
                derivative: DerivativeOrder::Acceleration,
                max_magnitude: limits.max_acceleration,
            },
        ];
        let request = SolveRequest {
            keyframes: sequence,
            segment_times,
            optimize_to,
            inequality_constraints: &inequality_constraints,
        };

        debug!(
            "invoking solver {} on {} segments, optimizing {}",
            self.solver.name(),
            segment_times.len(),
            optimize_to
        );
        let trajectory = self.solver.solve(&request)?;

        if trajectory.num_segments() != segment_times.len() {
            return Err(PlanningError::OptimizationFailed(format!(
                "solver {} returned {} segments for {} requested",
                self.solver.name(),
                trajectory.num_segments(),
                segment_times.len()
            )));
        }
        if trajectory
            .segments()
            .iter()
            .any(|s| s.duration() <= 0.0 || !s.duration().is_finite())
        {
            return Err(PlanningError::OptimizationFailed(format!(
                "solver {} returned a non-positive segment duration",
                self.solver.name()
            )));
        }
        Ok(trajectory)
    }
}

fn validate_request(
    sequence: &KeyframeSequence,
    segment_times: &[f64],
    optimize_to: DerivativeOrder,
) -> Result<()> {
    if segment_times.len() != sequence.num_segments() {
        return Err(PlanningError::InvalidInput(format!(
            "expected {} segment times for {} keyframes, got {}",
            sequence.num_segments(),
            sequence.len(),
            segment_times.len()
        )));
    }
    if let Some(bad) = segment_times
        .iter()
        .find(|t| **t <= 0.0 || !t.is_finite())
    {
        return Err(PlanningError::InvalidInput(format!(
            "segment times must be positive, got {}",
            bad
        )));
    }
    for (index, keyframe) in sequence.keyframes().iter().enumerate() {
        if let Some(rank) = keyframe.highest_constrained_rank() {
            if rank > optimize_to.rank() {
                return Err(PlanningError::InvalidInput(format!(
                    "keyframe {} constrains derivative rank {}, above the optimization order {}",
                    index,
                    rank,
                    optimize_to.rank()
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::keyframes::Keyframe;
    use crate::trajectory::{Polynomial, Segment};
    use nalgebra::Vector3;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Returns one constant segment per requested segment time
    struct EchoSolver;

    impl PolynomialSolver for EchoSolver {
        fn solve(&self, request: &SolveRequest<'_>) -> Result<Trajectory> {
            let segments = request
                .segment_times
                .iter()
                .map(|&duration| {
                    Segment::new(
                        duration,
                        [
                            Polynomial::new(vec![0.0]),
                            Polynomial::new(vec![0.0]),
                            Polynomial::new(vec![0.0]),
                        ],
                    )
                })
                .collect();
            Ok(Trajectory::new(segments, request.optimize_to))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    /// Always reports non-convergence, counting how often it was asked
    struct FailingSolver {
        calls: Arc<AtomicUsize>,
    }

    impl PolynomialSolver for FailingSolver {
        fn solve(&self, _request: &SolveRequest<'_>) -> Result<Trajectory> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(PlanningError::OptimizationFailed(
                "did not converge".to_string(),
            ))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    /// Ignores the requested times and returns a single short segment
    struct WrongCountSolver;

    impl PolynomialSolver for WrongCountSolver {
        fn solve(&self, request: &SolveRequest<'_>) -> Result<Trajectory> {
            Ok(Trajectory::new(
                vec![Segment::new(
                    1.0,
                    [
                        Polynomial::new(vec![0.0]),
                        Polynomial::new(vec![0.0]),
                        Polynomial::new(vec![0.0]),
                    ],
                )],
                request.optimize_to,
            ))
        }

        fn name(&self) -> &str {
            "wrong-count"
        }
    }

    fn rest_sequence(positions: &[Vector3<f64>]) -> KeyframeSequence {
        KeyframeSequence::new(
            positions
                .iter()
                .map(|p| Keyframe::start_or_end(*p, DerivativeOrder::Snap))
                .collect(),
        )
        .unwrap()
    }

    fn three_point_sequence() -> KeyframeSequence {
        rest_sequence(&[
            Vector3::zeros(),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
        ])
    }

    #[test]
    fn successful_solve_keeps_the_requested_durations() {
        let optimizer = TrajectoryOptimizer::new(Box::new(EchoSolver));
        let times = [1.5, 2.5];
        let trajectory = optimizer
            .optimize(
                &three_point_sequence(),
                &times,
                &MotionLimits::default(),
                DerivativeOrder::Snap,
            )
            .unwrap();
        assert_eq!(trajectory.num_segments(), 2);
        assert_eq!(trajectory.segments()[0].duration(), 1.5);
        assert_eq!(trajectory.segments()[1].duration(), 2.5);
    }

    #[test]
    fn mismatched_times_fail_before_the_solver_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let optimizer = TrajectoryOptimizer::new(Box::new(FailingSolver {
            calls: Arc::clone(&calls),
        }));
        let result = optimizer.optimize(
            &three_point_sequence(),
            &[1.0],
            &MotionLimits::default(),
            DerivativeOrder::Snap,
        );
        assert!(matches!(result, Err(PlanningError::InvalidInput(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn non_positive_times_are_rejected() {
        let optimizer = TrajectoryOptimizer::new(Box::new(EchoSolver));
        let result = optimizer.optimize(
            &three_point_sequence(),
            &[1.0, 0.0],
            &MotionLimits::default(),
            DerivativeOrder::Snap,
        );
        assert!(matches!(result, Err(PlanningError::InvalidInput(_))));
    }

    #[test]
    fn constraints_above_the_optimize_order_are_rejected() {
        let mut sequence = vec![
            Keyframe::start_or_end(Vector3::zeros(), DerivativeOrder::Acceleration),
            Keyframe::start_or_end(Vector3::new(1.0, 0.0, 0.0), DerivativeOrder::Acceleration),
        ];
        sequence[0].set_constraint(DerivativeOrder::Jerk, Vector3::zeros());
        let sequence = KeyframeSequence::new(sequence).unwrap();

        let optimizer = TrajectoryOptimizer::new(Box::new(EchoSolver));
        let result = optimizer.optimize(
            &sequence,
            &[1.0],
            &MotionLimits::default(),
            DerivativeOrder::Acceleration,
        );
        assert!(matches!(result, Err(PlanningError::InvalidInput(_))));
    }

    #[test]
    fn solver_failure_surfaces_as_optimization_failed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let optimizer = TrajectoryOptimizer::new(Box::new(FailingSolver {
            calls: Arc::clone(&calls),
        }));
        let result = optimizer.optimize(
            &three_point_sequence(),
            &[1.0, 1.0],
            &MotionLimits::default(),
            DerivativeOrder::Snap,
        );
        assert!(matches!(result, Err(PlanningError::OptimizationFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn wrong_segment_count_is_a_contract_violation() {
        let optimizer = TrajectoryOptimizer::new(Box::new(WrongCountSolver));
        let result = optimizer.optimize(
            &three_point_sequence(),
            &[1.0, 1.0],
            &MotionLimits::default(),
            DerivativeOrder::Snap,
        );
        assert!(matches!(result, Err(PlanningError::OptimizationFailed(_))));
    }
}
