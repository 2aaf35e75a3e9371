//! Polynomial trajectory representation and evaluation

use nalgebra::Vector3;
use std::fmt;

/// Time-derivative rank a constraint or optimization cost applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DerivativeOrder {
    /// Position itself, rank 0
    Position = 0,
    /// First derivative of position
    Velocity = 1,
    /// Second derivative of position
    Acceleration = 2,
    /// Third derivative of position
    Jerk = 3,
    /// Fourth derivative of position
    Snap = 4,
}

impl DerivativeOrder {
    /// All orders in ascending rank
    pub const ALL: [DerivativeOrder; 5] = [
        DerivativeOrder::Position,
        DerivativeOrder::Velocity,
        DerivativeOrder::Acceleration,
        DerivativeOrder::Jerk,
        DerivativeOrder::Snap,
    ];

    /// How many times position is differentiated
    pub fn rank(self) -> usize {
        self as usize
    }

    /// Order with the given rank, if within the supported range
    pub fn from_rank(rank: usize) -> Option<DerivativeOrder> {
        DerivativeOrder::ALL.get(rank).copied()
    }
}

impl fmt::Display for DerivativeOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DerivativeOrder::Position => "position",
            DerivativeOrder::Velocity => "velocity",
            DerivativeOrder::Acceleration => "acceleration",
            DerivativeOrder::Jerk => "jerk",
            DerivativeOrder::Snap => "snap",
        };
        write!(f, "{}", name)
    }
}

/// Product `power * (power - 1) * ... * (power - count + 1)`, the factor a
/// monomial picks up when differentiated `count` times
pub(crate) fn falling_factorial(power: usize, count: usize) -> f64 {
    if count > power {
        return 0.0;
    }
    let mut factor = 1.0;
    for k in 0..count {
        factor *= (power - k) as f64;
    }
    factor
}

/// Single-axis polynomial with coefficients in ascending powers of time
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coefficients: Vec<f64>,
}

impl Polynomial {
    /// Polynomial from ascending-power coefficients
    pub fn new(coefficients: Vec<f64>) -> Self {
        Polynomial { coefficients }
    }

    /// Number of coefficients (polynomial order + 1)
    pub fn num_coefficients(&self) -> usize {
        self.coefficients.len()
    }

    /// Coefficients in ascending powers
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Evaluate the `derivative`-th time derivative at `t`
    pub fn evaluate(&self, t: f64, derivative: usize) -> f64 {
        let mut value = 0.0;
        for (power, &coefficient) in self.coefficients.iter().enumerate().skip(derivative) {
            value += coefficient
                * falling_factorial(power, derivative)
                * t.powi((power - derivative) as i32);
        }
        value
    }
}

/// One trajectory piece between consecutive keyframes: a duration and one
/// polynomial per axis
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    duration: f64,
    axes: [Polynomial; 3],
}

impl Segment {
    /// Segment valid over local time `[0, duration]`
    pub fn new(duration: f64, axes: [Polynomial; 3]) -> Self {
        Segment { duration, axes }
    }

    /// Transit time allotted to this segment
    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Per-axis polynomials in x, y, z order
    pub fn axes(&self) -> &[Polynomial; 3] {
        &self.axes
    }

    /// Evaluate the `derivative`-th derivative at local time `t`
    pub fn evaluate(&self, t: f64, derivative: usize) -> Vector3<f64> {
        Vector3::new(
            self.axes[0].evaluate(t, derivative),
            self.axes[1].evaluate(t, derivative),
            self.axes[2].evaluate(t, derivative),
        )
    }
}

/// Time-parameterized polynomial trajectory produced by optimization.
///
/// Immutable once built; global time queries clamp to `[0, total_time]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    segments: Vec<Segment>,
    optimized_to: DerivativeOrder,
}

impl Trajectory {
    /// Trajectory from ordered segments and the derivative order whose
    /// energy was minimized to produce them
    pub fn new(segments: Vec<Segment>, optimized_to: DerivativeOrder) -> Self {
        Trajectory {
            segments,
            optimized_to,
        }
    }

    /// Ordered segments, one per keyframe pair
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of polynomial segments
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Derivative order the optimization minimized
    pub fn optimized_to(&self) -> DerivativeOrder {
        self.optimized_to
    }

    /// Total duration across all segments
    pub fn total_time(&self) -> f64 {
        self.segments.iter().map(Segment::duration).sum()
    }

    /// Position at global time `t`
    pub fn position_at(&self, t: f64) -> Vector3<f64> {
        self.derivative_at(t, DerivativeOrder::Position)
    }

    /// Velocity at global time `t`
    pub fn velocity_at(&self, t: f64) -> Vector3<f64> {
        self.derivative_at(t, DerivativeOrder::Velocity)
    }

    /// Acceleration at global time `t`
    pub fn acceleration_at(&self, t: f64) -> Vector3<f64> {
        self.derivative_at(t, DerivativeOrder::Acceleration)
    }

    /// The `order`-th derivative at global time `t`
    pub fn derivative_at(&self, t: f64, order: DerivativeOrder) -> Vector3<f64> {
        match self.segment_at(t) {
            Some((segment, local_time)) => segment.evaluate(local_time, order.rank()),
            None => Vector3::zeros(),
        }
    }

    /// Segment covering global time `t` and the local time into it; queries
    /// outside the trajectory clamp to the nearest end
    fn segment_at(&self, t: f64) -> Option<(&Segment, f64)> {
        let last = self.segments.last()?;
        let mut remaining = t.max(0.0);
        for segment in &self.segments {
            if remaining <= segment.duration() {
                return Some((segment, remaining));
            }
            remaining -= segment.duration();
        }
        Some((last, last.duration()))
    }
}
