//! Built-in minimum-derivative polynomial solver

use log::debug;
use nalgebra::DMatrix;

use crate::error::{PlanningError, Result};
use crate::planning::keyframes::KeyframeSequence;
use crate::planning::optimizer::{MagnitudeConstraint, PolynomialSolver, SolveRequest};
use crate::trajectory::{falling_factorial, DerivativeOrder, Polynomial, Segment, Trajectory};

/// Relative slack before a sampled bound counts as violated
const BOUND_SLACK: f64 = 1e-6;
/// Extra stretch on top of the computed scale factor, so the re-solved
/// profile lands inside the bound instead of on it
const TIME_SCALING_MARGIN: f64 = 1.01;

/// Tuning knobs for [`MinimumDerivativeSolver`]
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Points per segment at which inequality bounds are checked
    pub samples_per_segment: usize,
    /// Stretch segment times uniformly when a sampled bound is exceeded
    pub scale_times: bool,
    /// Scaling attempts before reporting non-convergence
    pub max_scaling_iterations: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        SolverOptions {
            samples_per_segment: 10,
            scale_times: true,
            max_scaling_iterations: 10,
        }
    }
}

/// Fits one polynomial per axis and segment by minimizing the integrated
/// squared optimize-to derivative.
///
/// Each segment uses the minimal endpoint-derivative basis for the chosen
/// order (ten coefficients when optimizing snap). Keyframe constraints fix
/// vertex derivatives; the remaining vertex derivatives are chosen by an
/// unconstrained quadratic minimization, which also makes every derivative
/// up to the optimize-to order continuous across segments. Inequality
/// bounds are checked at sample points; a violation stretches all segment
/// times by a common factor and re-solves, up to the iteration budget.
#[derive(Debug, Clone, Default)]
pub struct MinimumDerivativeSolver {
    options: SolverOptions,
}

impl MinimumDerivativeSolver {
    /// Solver with the given options
    pub fn new(options: SolverOptions) -> Self {
        MinimumDerivativeSolver { options }
    }

    /// Options in effect
    pub fn options(&self) -> &SolverOptions {
        &self.options
    }
}

impl PolynomialSolver for MinimumDerivativeSolver {
    fn solve(&self, request: &SolveRequest<'_>) -> Result<Trajectory> {
        validate_request(request)?;

        let max_attempts = if self.options.scale_times {
            self.options.max_scaling_iterations
        } else {
            0
        };
        let mut segment_times = request.segment_times.to_vec();
        let mut attempt = 0;
        loop {
            let trajectory =
                solve_with_fixed_times(request.keyframes, &segment_times, request.optimize_to)?;
            match worst_violation(
                &trajectory,
                request.inequality_constraints,
                self.options.samples_per_segment,
            ) {
                None => return Ok(trajectory),
                Some(violation) if attempt < max_attempts => {
                    let factor = violation.scale_factor() * TIME_SCALING_MARGIN;
                    debug!(
                        "sampled {} magnitude {:.3} exceeds {:.3}, stretching segment times by {:.3}",
                        violation.constraint.derivative,
                        violation.measured,
                        violation.constraint.max_magnitude,
                        factor
                    );
                    for time in segment_times.iter_mut() {
                        *time *= factor;
                    }
                    attempt += 1;
                }
                Some(violation) => {
                    return Err(PlanningError::OptimizationFailed(format!(
                        "sampled {} magnitude {:.3} still exceeds the {:.3} bound after {} attempts",
                        violation.constraint.derivative,
                        violation.measured,
                        violation.constraint.max_magnitude,
                        attempt + 1
                    )));
                }
            }
        }
    }

    fn name(&self) -> &str {
        "minimum-derivative"
    }
}

fn validate_request(request: &SolveRequest<'_>) -> Result<()> {
    if request.segment_times.len() + 1 != request.keyframes.len() {
        return Err(PlanningError::InvalidInput(format!(
            "expected {} segment times for {} keyframes, got {}",
            request.keyframes.num_segments(),
            request.keyframes.len(),
            request.segment_times.len()
        )));
    }
    if request
        .segment_times
        .iter()
        .any(|t| *t <= 0.0 || !t.is_finite())
    {
        return Err(PlanningError::InvalidInput(
            "segment times must be positive".to_string(),
        ));
    }
    for (index, keyframe) in request.keyframes.keyframes().iter().enumerate() {
        if let Some(rank) = keyframe.highest_constrained_rank() {
            if rank > request.optimize_to.rank() {
                return Err(PlanningError::InvalidInput(format!(
                    "keyframe {} constrains derivative rank {}, above the optimization order {}",
                    index,
                    rank,
                    request.optimize_to.rank()
                )));
            }
        }
    }
    for constraint in request.inequality_constraints {
        if constraint.derivative == DerivativeOrder::Position {
            return Err(PlanningError::InvalidInput(
                "magnitude bounds on position are not supported".to_string(),
            ));
        }
    }
    Ok(())
}

/// One linear solve with the segment times held fixed.
///
/// Vertex derivatives 0..=rank are the unknowns; segments sharing a vertex
/// share its derivative values, so continuity holds by construction. Fixed
/// entries come from keyframe constraints, free entries minimize the joint
/// derivative energy.
fn solve_with_fixed_times(
    keyframes: &KeyframeSequence,
    segment_times: &[f64],
    optimize_to: DerivativeOrder,
) -> Result<Trajectory> {
    let rank = optimize_to.rank();
    let derivatives_per_vertex = rank + 1;
    let num_coefficients = 2 * derivatives_per_vertex;
    let num_vertices = keyframes.len();
    let total_size = num_vertices * derivatives_per_vertex;

    // Per-segment inverse endpoint maps, and the joint derivative-energy
    // cost over all vertex derivatives
    let mut endpoint_maps = Vec::with_capacity(segment_times.len());
    let mut cost = DMatrix::<f64>::zeros(total_size, total_size);
    for (segment, &duration) in segment_times.iter().enumerate() {
        let map = endpoint_derivative_matrix(num_coefficients, derivatives_per_vertex, duration);
        let inverse = map.try_inverse().ok_or_else(|| {
            PlanningError::OptimizationFailed(format!(
                "endpoint derivative system is singular for segment {}",
                segment
            ))
        })?;
        let energy = derivative_energy_matrix(num_coefficients, rank, duration);
        let segment_cost = inverse.transpose() * &energy * &inverse;
        for row in 0..num_coefficients {
            for col in 0..num_coefficients {
                let global_row = global_index(segment, row, derivatives_per_vertex);
                let global_col = global_index(segment, col, derivatives_per_vertex);
                cost[(global_row, global_col)] += segment_cost[(row, col)];
            }
        }
        endpoint_maps.push(inverse);
    }

    // Partition vertex derivatives into constrained and optimizer-chosen
    let mut fixed = Vec::new();
    let mut free = Vec::new();
    for (vertex, keyframe) in keyframes.keyframes().iter().enumerate() {
        for derivative in 0..derivatives_per_vertex {
            let index = vertex * derivatives_per_vertex + derivative;
            let constraint = DerivativeOrder::from_rank(derivative)
                .and_then(|order| keyframe.constraint(order));
            match constraint {
                Some(value) => fixed.push((index, value)),
                None => free.push(index),
            }
        }
    }

    // One column per axis
    let mut derivatives = DMatrix::<f64>::zeros(total_size, 3);
    for (index, value) in &fixed {
        for axis in 0..3 {
            derivatives[(*index, axis)] = value[axis];
        }
    }

    if !free.is_empty() {
        let mut cost_free_free = DMatrix::<f64>::zeros(free.len(), free.len());
        let mut cost_free_fixed = DMatrix::<f64>::zeros(free.len(), fixed.len());
        for (row, &free_row) in free.iter().enumerate() {
            for (col, &free_col) in free.iter().enumerate() {
                cost_free_free[(row, col)] = cost[(free_row, free_col)];
            }
            for (col, (fixed_col, _)) in fixed.iter().enumerate() {
                cost_free_fixed[(row, col)] = cost[(free_row, *fixed_col)];
            }
        }
        let mut fixed_values = DMatrix::<f64>::zeros(fixed.len(), 3);
        for (row, (_, value)) in fixed.iter().enumerate() {
            for axis in 0..3 {
                fixed_values[(row, axis)] = value[axis];
            }
        }

        let rhs = -(&cost_free_fixed * &fixed_values);
        let solved = cost_free_free.lu().solve(&rhs).ok_or_else(|| {
            PlanningError::OptimizationFailed(
                "free derivative system is singular".to_string(),
            )
        })?;
        for (row, &index) in free.iter().enumerate() {
            for axis in 0..3 {
                derivatives[(index, axis)] = solved[(row, axis)];
            }
        }
    }

    // Map each segment's endpoint derivatives back to coefficients
    let mut segments = Vec::with_capacity(segment_times.len());
    for (segment, &duration) in segment_times.iter().enumerate() {
        let mut endpoint_values = DMatrix::<f64>::zeros(num_coefficients, 3);
        for local in 0..num_coefficients {
            let global = global_index(segment, local, derivatives_per_vertex);
            for axis in 0..3 {
                endpoint_values[(local, axis)] = derivatives[(global, axis)];
            }
        }
        let coefficients = &endpoint_maps[segment] * &endpoint_values;
        let axes = [0, 1, 2].map(|axis| {
            Polynomial::new(
                (0..num_coefficients)
                    .map(|power| coefficients[(power, axis)])
                    .collect(),
            )
        });
        segments.push(Segment::new(duration, axes));
    }
    Ok(Trajectory::new(segments, optimize_to))
}

/// Maps polynomial coefficients to derivative values at both segment ends:
/// derivatives `0..k` at `t = 0`, then `0..k` at `t = duration`
fn endpoint_derivative_matrix(
    num_coefficients: usize,
    derivatives_per_vertex: usize,
    duration: f64,
) -> DMatrix<f64> {
    let mut map = DMatrix::<f64>::zeros(2 * derivatives_per_vertex, num_coefficients);
    for derivative in 0..derivatives_per_vertex {
        for power in derivative..num_coefficients {
            let factor = falling_factorial(power, derivative);
            if power == derivative {
                map[(derivative, power)] = factor;
            }
            map[(derivatives_per_vertex + derivative, power)] =
                factor * duration.powi((power - derivative) as i32);
        }
    }
    map
}

/// Gram matrix of the squared `rank`-th derivative over `[0, duration]`,
/// expressed in the coefficient basis
fn derivative_energy_matrix(num_coefficients: usize, rank: usize, duration: f64) -> DMatrix<f64> {
    let mut energy = DMatrix::<f64>::zeros(num_coefficients, num_coefficients);
    for row in rank..num_coefficients {
        for col in rank..num_coefficients {
            let exponent = (row + col - 2 * rank + 1) as i32;
            energy[(row, col)] = falling_factorial(row, rank)
                * falling_factorial(col, rank)
                * duration.powi(exponent)
                / exponent as f64;
        }
    }
    energy
}

/// Global vertex-derivative index for a segment-local endpoint index
fn global_index(segment: usize, local: usize, derivatives_per_vertex: usize) -> usize {
    if local < derivatives_per_vertex {
        segment * derivatives_per_vertex + local
    } else {
        (segment + 1) * derivatives_per_vertex + (local - derivatives_per_vertex)
    }
}

struct BoundViolation {
    constraint: MagnitudeConstraint,
    measured: f64,
}

impl BoundViolation {
    /// Uniform time stretch bringing the measured extreme back under the
    /// bound, assuming the derivative scales like `1 / factor^rank`
    fn scale_factor(&self) -> f64 {
        let ratio = self.measured / self.constraint.max_magnitude;
        ratio.powf(1.0 / self.constraint.derivative.rank() as f64)
    }
}

/// Largest sampled bound violation, measured by the time stretch needed to
/// remove it
fn worst_violation(
    trajectory: &Trajectory,
    constraints: &[MagnitudeConstraint],
    samples_per_segment: usize,
) -> Option<BoundViolation> {
    let mut worst: Option<BoundViolation> = None;
    for constraint in constraints {
        let measured = peak_magnitude(trajectory, constraint.derivative, samples_per_segment);
        if measured <= constraint.max_magnitude * (1.0 + BOUND_SLACK) {
            continue;
        }
        let violation = BoundViolation {
            constraint: *constraint,
            measured,
        };
        let replace = match &worst {
            None => true,
            Some(current) => violation.scale_factor() > current.scale_factor(),
        };
        if replace {
            worst = Some(violation);
        }
    }
    worst
}

/// Largest sampled magnitude of `derivative` across the whole trajectory
fn peak_magnitude(
    trajectory: &Trajectory,
    derivative: DerivativeOrder,
    samples_per_segment: usize,
) -> f64 {
    let samples = samples_per_segment.max(2);
    let mut peak: f64 = 0.0;
    for segment in trajectory.segments() {
        for step in 0..samples {
            let t = segment.duration() * step as f64 / (samples - 1) as f64;
            peak = peak.max(segment.evaluate(t, derivative.rank()).norm());
        }
    }
    peak
}
