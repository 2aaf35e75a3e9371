//! Keyframes: constraint-bearing waypoints handed to the optimizer

use nalgebra::{DVector, Vector3};
use std::collections::BTreeMap;

use crate::error::{PlanningError, Result};
use crate::state::VehicleState;
use crate::trajectory::DerivativeOrder;

/// A waypoint carrying at most one constraint per derivative order.
///
/// Boundary keyframes pin every derivative up to the optimize-to order;
/// free keyframes constrain only what the caller sets and leave the rest
/// for the optimizer to choose.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Keyframe {
    constraints: BTreeMap<DerivativeOrder, Vector3<f64>>,
}

impl Keyframe {
    /// Keyframe with no constraints
    pub fn free() -> Self {
        Keyframe::default()
    }

    /// Boundary keyframe: position fixed, every derivative from velocity up
    /// to `optimize_to` pinned to zero until explicitly overridden
    pub fn start_or_end(position: Vector3<f64>, optimize_to: DerivativeOrder) -> Self {
        let mut keyframe = Keyframe::free();
        keyframe.set_constraint(DerivativeOrder::Position, position);
        for rank in 1..=optimize_to.rank() {
            if let Some(order) = DerivativeOrder::from_rank(rank) {
                keyframe.set_constraint(order, Vector3::zeros());
            }
        }
        keyframe
    }

    /// Set or replace the constraint for one derivative order
    pub fn set_constraint(&mut self, order: DerivativeOrder, value: Vector3<f64>) {
        self.constraints.insert(order, value);
    }

    /// Builder-style variant of [`Keyframe::set_constraint`]
    pub fn with_constraint(mut self, order: DerivativeOrder, value: Vector3<f64>) -> Self {
        self.set_constraint(order, value);
        self
    }

    /// Constraint value for `order`, if one is set
    pub fn constraint(&self, order: DerivativeOrder) -> Option<Vector3<f64>> {
        self.constraints.get(&order).copied()
    }

    /// Whether `order` is constrained
    pub fn has_constraint(&self, order: DerivativeOrder) -> bool {
        self.constraints.contains_key(&order)
    }

    /// Constraints in ascending derivative order
    pub fn constraints(&self) -> impl Iterator<Item = (DerivativeOrder, Vector3<f64>)> + '_ {
        self.constraints.iter().map(|(order, value)| (*order, *value))
    }

    /// Highest constrained derivative rank, if any constraint is set
    pub fn highest_constrained_rank(&self) -> Option<usize> {
        self.constraints.keys().next_back().map(|order| order.rank())
    }
}

/// Ordered keyframes defining one planning request.
///
/// Always at least two entries, so there is at least one segment to plan.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyframeSequence {
    keyframes: Vec<Keyframe>,
}

impl KeyframeSequence {
    /// Wrap a keyframe list, rejecting sequences too short to span a segment
    pub fn new(keyframes: Vec<Keyframe>) -> Result<Self> {
        if keyframes.len() < 2 {
            return Err(PlanningError::InvalidInput(format!(
                "keyframe sequence needs at least 2 entries, got {}",
                keyframes.len()
            )));
        }
        Ok(KeyframeSequence { keyframes })
    }

    /// Number of keyframes
    pub fn len(&self) -> usize {
        self.keyframes.len()
    }

    /// Always false by construction
    pub fn is_empty(&self) -> bool {
        self.keyframes.is_empty()
    }

    /// Number of segments between consecutive keyframes
    pub fn num_segments(&self) -> usize {
        self.keyframes.len() - 1
    }

    /// Keyframes in planning order
    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    /// Consecutive keyframe pairs, one per segment
    pub fn segment_pairs(&self) -> impl Iterator<Item = (&Keyframe, &Keyframe)> {
        self.keyframes.windows(2).map(|pair| (&pair[0], &pair[1]))
    }
}

/// Assembles the keyframe sequence for one planning request: current state,
/// optional intermediate maneuver keyframes, commanded goal.
#[derive(Debug, Clone)]
pub struct KeyframeSequenceBuilder {
    optimize_to: DerivativeOrder,
    intermediate: Vec<Keyframe>,
}

impl Default for KeyframeSequenceBuilder {
    fn default() -> Self {
        KeyframeSequenceBuilder::new(DerivativeOrder::Snap)
    }
}

impl KeyframeSequenceBuilder {
    /// Builder producing boundary keyframes pinned up to `optimize_to`
    pub fn new(optimize_to: DerivativeOrder) -> Self {
        KeyframeSequenceBuilder {
            optimize_to,
            intermediate: Vec::new(),
        }
    }

    /// Insert a reusable maneuver shape between start and goal; the
    /// templates are emitted in order on every build
    pub fn set_intermediate_keyframes(&mut self, keyframes: Vec<Keyframe>) {
        self.intermediate = keyframes;
    }

    /// Builder-style variant of [`KeyframeSequenceBuilder::set_intermediate_keyframes`]
    pub fn with_intermediate_keyframes(mut self, keyframes: Vec<Keyframe>) -> Self {
        self.set_intermediate_keyframes(keyframes);
        self
    }

    /// Derivative order boundary keyframes are pinned up to
    pub fn optimize_to(&self) -> DerivativeOrder {
        self.optimize_to
    }

    /// Build the sequence: snapshot-derived start, configured intermediates,
    /// goal-derived end
    pub fn build(
        &self,
        goal_position: &DVector<f64>,
        goal_velocity: &DVector<f64>,
        snapshot: &VehicleState,
    ) -> Result<KeyframeSequence> {
        let goal_position = vector3_from_dynamic(goal_position, "goal position")?;
        let goal_velocity = vector3_from_dynamic(goal_velocity, "goal velocity")?;

        let mut keyframes = Vec::with_capacity(self.intermediate.len() + 2);

        let mut start = Keyframe::start_or_end(snapshot.position, self.optimize_to);
        start.set_constraint(DerivativeOrder::Velocity, snapshot.velocity);
        keyframes.push(start);

        keyframes.extend(self.intermediate.iter().cloned());

        let mut end = Keyframe::start_or_end(goal_position, self.optimize_to);
        end.set_constraint(DerivativeOrder::Velocity, goal_velocity);
        keyframes.push(end);

        KeyframeSequence::new(keyframes)
    }
}

/// Check a dynamic-size input against the fixed planning dimension
fn vector3_from_dynamic(value: &DVector<f64>, what: &str) -> Result<Vector3<f64>> {
    if value.len() != 3 {
        return Err(PlanningError::InvalidInput(format!(
            "{} must have dimension 3, got {}",
            what,
            value.len()
        )));
    }
    Ok(Vector3::new(value[0], value[1], value[2]))
}
