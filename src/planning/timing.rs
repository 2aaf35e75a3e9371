//! Heuristic segment time allocation

use crate::config::MotionLimits;
use crate::planning::keyframes::KeyframeSequence;
use crate::trajectory::DerivativeOrder;

/// Durations never drop below this, keeping every segment integrable
pub const MIN_SEGMENT_DURATION: f64 = 1e-3;

/// Assign each segment the time a trapezoidal velocity profile needs to
/// cover the straight-line displacement between its endpoint positions.
///
/// Segments whose endpoints lack position constraints fall back to
/// `min_segment_time`. The result is a feasible starting allocation, not an
/// optimal one; the optimizer may re-assign it.
pub fn estimate_segment_times(
    sequence: &KeyframeSequence,
    limits: &MotionLimits,
    min_segment_time: f64,
) -> Vec<f64> {
    sequence
        .segment_pairs()
        .map(|(from, to)| {
            let from_position = from.constraint(DerivativeOrder::Position);
            let to_position = to.constraint(DerivativeOrder::Position);
            match (from_position, to_position) {
                (Some(a), Some(b)) => trapezoidal_time((b - a).norm(), limits),
                _ => min_segment_time.max(MIN_SEGMENT_DURATION),
            }
        })
        .collect()
}

/// Minimum time to cover `distance` accelerating from and braking to rest,
/// with speed capped at `max_velocity` and acceleration at `max_acceleration`
fn trapezoidal_time(distance: f64, limits: &MotionLimits) -> f64 {
    let v = limits.max_velocity;
    let a = limits.max_acceleration;
    // distance needed to reach full speed and brake again
    let cruise_threshold = v * v / a;
    let time = if distance >= cruise_threshold {
        v / a + distance / v
    } else {
        2.0 * (distance / a).sqrt()
    };
    time.max(MIN_SEGMENT_DURATION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::keyframes::{Keyframe, KeyframeSequence};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn rest_point(position: Vector3<f64>) -> Keyframe {
        Keyframe::start_or_end(position, DerivativeOrder::Snap)
    }

    fn line_sequence(positions: &[Vector3<f64>]) -> KeyframeSequence {
        KeyframeSequence::new(positions.iter().map(|p| rest_point(*p)).collect()).unwrap()
    }

    #[test]
    fn one_time_per_segment_and_all_positive() {
        let sequence = line_sequence(&[
            Vector3::zeros(),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(1.0, 1.0, 1.0),
        ]);
        let times = estimate_segment_times(&sequence, &MotionLimits::default(), 0.5);
        assert_eq!(times.len(), sequence.num_segments());
        assert!(times.iter().all(|t| *t > 0.0));
    }

    #[test]
    fn trapezoid_matches_hand_computation() {
        let limits = MotionLimits {
            max_velocity: 2.0,
            max_acceleration: 2.0,
        };
        // long segment cruises: t = v/a + d/v = 1 + 2
        let sequence = line_sequence(&[Vector3::zeros(), Vector3::new(4.0, 0.0, 0.0)]);
        let times = estimate_segment_times(&sequence, &limits, 0.5);
        assert_relative_eq!(times[0], 3.0, epsilon = 1e-12);

        // short segment never reaches full speed: t = 2 * sqrt(d / a)
        let sequence = line_sequence(&[Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0)]);
        let times = estimate_segment_times(&sequence, &limits, 0.5);
        assert_relative_eq!(times[0], 2.0 * (0.5f64).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn estimate_is_monotone_in_displacement() {
        let limits = MotionLimits::default();
        let mut previous = 0.0;
        for step in 1..50 {
            let d = step as f64 * 0.25;
            let sequence = line_sequence(&[Vector3::zeros(), Vector3::new(d, 0.0, 0.0)]);
            let time = estimate_segment_times(&sequence, &limits, 0.5)[0];
            assert!(
                time >= previous,
                "time {} for displacement {} dropped below {}",
                time,
                d,
                previous
            );
            previous = time;
        }
    }

    #[test]
    fn missing_position_constraints_fall_back_to_the_minimum() {
        let free = Keyframe::free().with_constraint(DerivativeOrder::Velocity, Vector3::zeros());
        let sequence =
            KeyframeSequence::new(vec![rest_point(Vector3::zeros()), free, rest_point(Vector3::zeros())])
                .unwrap();
        let times = estimate_segment_times(&sequence, &MotionLimits::default(), 0.75);
        assert_eq!(times, vec![0.75, 0.75]);
    }

    #[test]
    fn zero_displacement_still_gets_positive_time() {
        let sequence = line_sequence(&[Vector3::zeros(), Vector3::zeros()]);
        let times = estimate_segment_times(&sequence, &MotionLimits::default(), 0.5);
        assert!(times[0] >= MIN_SEGMENT_DURATION);
    }
}
