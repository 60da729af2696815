use crate::{Cost, Model, State, TransitionId};
use thiserror::Error;

/// Outcome of solving a [`Model`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Solution {
    /// A sequence of transitions leading from the initial state to a base case.
    Plan { transitions: Vec<TransitionId>, cost: Cost },
    /// The solver proved that no base case is reachable (within the bound, if any).
    Infeasible,
    /// The solver gave up (e.g. timeout) without a conclusion.
    Unknown,
}

/// An engine able to search a [`Model`] for a minimal-cost path to a base case.
pub trait Solver {
    type Error: std::error::Error;

    fn solve(&mut self, model: &Model) -> Result<Solution, Self::Error>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("transition `{name}` at step {step} is not applicable")]
    NotApplicable { step: usize, name: String },
    #[error("the final state {0} is not a base case")]
    NotBase(State),
    #[error("unknown transition id {0:?}")]
    UnknownTransition(TransitionId),
}

/// Replays a sequence of transitions from the initial state of the model and returns its total cost,
/// provided every transition is applicable and the last state satisfies a base case.
pub fn validate_plan(model: &Model, plan: &[TransitionId]) -> Result<Cost, PlanError> {
    let mut state = model.initial_state().clone();
    let mut cost = 0;
    for (step, &t) in plan.iter().enumerate() {
        if usize::from(t) >= model.num_transitions() {
            return Err(PlanError::UnknownTransition(t));
        }
        let transition = model.transition(t);
        if !transition.is_applicable(&state) {
            return Err(PlanError::NotApplicable {
                step,
                name: transition.name.clone(),
            });
        }
        state = transition.apply(&state);
        cost += transition.cost;
    }
    if model.is_base(&state) {
        Ok(cost)
    } else {
        Err(PlanError::NotBase(state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::*;

    fn counter() -> Model {
        let mut builder = ModelBuilder::new();
        let values = (0..3).map(|i| format!("c={i}")).collect();
        let c = builder.add_variable("c", values, 0);
        for i in 0..2 {
            let mut t = Transition::new(format!("incr-{i}"), 2);
            t.preconditions.push(Condition::Eq(c, i));
            t.effects.push(Assignment::new(c, i + 1));
            builder.add_transition(t);
        }
        builder.add_base_case(vec![Condition::Eq(c, 2)]);
        builder.build().unwrap()
    }

    #[test]
    fn valid_plan_cost() {
        let model = counter();
        let plan = [TransitionId::from(0usize), TransitionId::from(1usize)];
        assert_eq!(validate_plan(&model, &plan), Ok(4));
    }

    #[test]
    fn invalid_plans() {
        let model = counter();
        assert!(matches!(
            validate_plan(&model, &[TransitionId::from(1usize)]),
            Err(PlanError::NotApplicable { step: 0, .. })
        ));
        assert!(matches!(
            validate_plan(&model, &[TransitionId::from(0usize)]),
            Err(PlanError::NotBase(_))
        ));
        assert!(matches!(
            validate_plan(&model, &[TransitionId::from(7usize)]),
            Err(PlanError::UnknownTransition(_))
        ));
    }
}
