use crate::errors::ModelCheckError;
use crate::{Cost, State, Value};
use itertools::Itertools;
use std::fmt::{Display, Formatter};

create_ref_type!(VarId);
create_ref_type!(TransitionId);

/// A finite-domain state variable. Values are identified by their index in `values`.
#[derive(Clone, Debug)]
pub struct StateVar {
    pub name: String,
    /// Human readable label of each value of the domain.
    pub values: Vec<String>,
}

impl StateVar {
    pub fn domain_size(&self) -> usize {
        self.values.len()
    }

    pub fn label(&self, value: Value) -> &str {
        self.values.get(value as usize).map(|s| s.as_str()).unwrap_or("<invalid>")
    }
}

/// Elementary test on the value of a state variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Condition {
    Eq(VarId, Value),
    Ne(VarId, Value),
}

impl Condition {
    pub fn var(&self) -> VarId {
        match self {
            Condition::Eq(var, _) | Condition::Ne(var, _) => *var,
        }
    }

    pub fn value(&self) -> Value {
        match self {
            Condition::Eq(_, value) | Condition::Ne(_, value) => *value,
        }
    }

    pub fn holds(&self, state: &State) -> bool {
        match *self {
            Condition::Eq(var, value) => state.get(var) == value,
            Condition::Ne(var, value) => state.get(var) != value,
        }
    }
}

/// Sets a state variable to a constant value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Assignment {
    pub var: VarId,
    pub value: Value,
}

impl Assignment {
    pub fn new(var: VarId, value: Value) -> Self {
        Assignment { var, value }
    }
}

/// A state transition of the DP model.
///
/// All assignments are applied in parallel: a transition assigns each variable at most once
/// and an assignment never observes the result of another one.
#[derive(Clone, Debug)]
pub struct Transition {
    pub name: String,
    pub preconditions: Vec<Condition>,
    pub effects: Vec<Assignment>,
    pub cost: Cost,
    /// If set, a solver may apply this transition as soon as it is applicable, ignoring all others.
    pub forced: bool,
}

impl Transition {
    pub fn new(name: impl Into<String>, cost: Cost) -> Self {
        Transition {
            name: name.into(),
            preconditions: Vec::new(),
            effects: Vec::new(),
            cost,
            forced: false,
        }
    }

    pub fn is_applicable(&self, state: &State) -> bool {
        self.preconditions.iter().all(|c| c.holds(state))
    }

    /// Returns the state resulting from applying the transition in `state`.
    /// Applicability is not checked.
    pub fn apply(&self, state: &State) -> State {
        let mut next = state.clone();
        for eff in &self.effects {
            next.set(eff.var, eff.value);
        }
        next
    }
}

/// An immutable dynamic-programming model.
#[derive(Clone, Debug)]
pub struct Model {
    variables: Vec<StateVar>,
    initial_state: State,
    transitions: Vec<Transition>,
    base_cases: Vec<Vec<Condition>>,
    bound: Option<Cost>,
    trivially_unsolvable: bool,
}

impl Model {
    pub fn variables(&self) -> impl Iterator<Item = VarId> + '_ {
        (0..self.variables.len()).map(VarId::from)
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn variable(&self, var: VarId) -> &StateVar {
        &self.variables[var]
    }

    pub fn initial_state(&self) -> &State {
        &self.initial_state
    }

    pub fn transitions(&self) -> impl Iterator<Item = TransitionId> + '_ {
        (0..self.transitions.len()).map(TransitionId::from)
    }

    pub fn num_transitions(&self) -> usize {
        self.transitions.len()
    }

    pub fn transition(&self, id: TransitionId) -> &Transition {
        &self.transitions[id]
    }

    pub fn base_cases(&self) -> &[Vec<Condition>] {
        &self.base_cases
    }

    /// Upper bound on the cost of solutions, if one was declared.
    pub fn bound(&self) -> Option<Cost> {
        self.bound
    }

    /// True if the translation proved that no base case can ever be reached.
    pub fn is_trivially_unsolvable(&self) -> bool {
        self.trivially_unsolvable
    }

    /// Returns true if `state` satisfies at least one base case.
    pub fn is_base(&self, state: &State) -> bool {
        self.base_cases.iter().any(|conds| conds.iter().all(|c| c.holds(state)))
    }

    /// All transitions applicable in the given state.
    pub fn applicable<'a>(&'a self, state: &'a State) -> impl Iterator<Item = TransitionId> + 'a {
        self.transitions().filter(move |&t| self.transition(t).is_applicable(state))
    }

    fn check(&self) -> Result<(), ModelCheckError> {
        for v in &self.variables {
            if v.values.is_empty() {
                return Err(ModelCheckError::EmptyDomain(v.name.clone()));
            }
        }
        for (var, value) in self.initial_state.entries() {
            let decl = &self.variables[var];
            if value as usize >= decl.domain_size() {
                return Err(ModelCheckError::InvalidInitialValue {
                    variable: decl.name.clone(),
                    value,
                });
            }
        }
        let check_value = |context: &str, var: VarId, value: Value| -> Result<(), ModelCheckError> {
            let index = usize::from(var);
            let decl = self
                .variables
                .get(index)
                .ok_or_else(|| ModelCheckError::UnknownVariable {
                    context: context.to_string(),
                    index,
                })?;
            if value as usize >= decl.domain_size() {
                return Err(ModelCheckError::ValueOutOfDomain {
                    context: context.to_string(),
                    variable: decl.name.clone(),
                    value,
                });
            }
            Ok(())
        };
        for t in &self.transitions {
            if t.cost < 0 {
                return Err(ModelCheckError::NegativeCost {
                    transition: t.name.clone(),
                    cost: t.cost,
                });
            }
            for c in &t.preconditions {
                check_value(&t.name, c.var(), c.value())?;
            }
            for e in &t.effects {
                check_value(&t.name, e.var, e.value)?;
            }
            if let Some((first, _)) = t.effects.iter().map(|e| e.var).sorted().tuple_windows().find(|(a, b)| a == b) {
                return Err(ModelCheckError::DuplicateAssignment {
                    transition: t.name.clone(),
                    variable: self.variables[first].name.clone(),
                });
            }
        }
        for conds in &self.base_cases {
            for c in conds {
                check_value("base case", c.var(), c.value())?;
            }
        }
        Ok(())
    }
}

/// Incrementally assembles a [`Model`].
#[derive(Default)]
pub struct ModelBuilder {
    variables: Vec<StateVar>,
    initial_values: Vec<Value>,
    transitions: Vec<Transition>,
    base_cases: Vec<Vec<Condition>>,
    bound: Option<Cost>,
    trivially_unsolvable: bool,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a new state variable with the given domain and initial value.
    pub fn add_variable(&mut self, name: impl Into<String>, values: Vec<String>, initial: Value) -> VarId {
        let id = VarId::from(self.variables.len());
        self.variables.push(StateVar {
            name: name.into(),
            values,
        });
        self.initial_values.push(initial);
        id
    }

    pub fn add_transition(&mut self, transition: Transition) -> TransitionId {
        let id = TransitionId::from(self.transitions.len());
        self.transitions.push(transition);
        id
    }

    pub fn add_base_case(&mut self, conditions: Vec<Condition>) {
        self.base_cases.push(conditions);
    }

    pub fn set_bound(&mut self, bound: Option<Cost>) {
        self.bound = bound;
    }

    /// Records that the base case was proven unreachable.
    pub fn mark_unsolvable(&mut self) {
        self.trivially_unsolvable = true;
    }

    /// Finalizes the model, checking that it is well-formed.
    pub fn build(self) -> Result<Model, ModelCheckError> {
        let model = Model {
            variables: self.variables,
            initial_state: State::new(self.initial_values),
            transitions: self.transitions,
            base_cases: self.base_cases,
            bound: self.bound,
            trivially_unsolvable: self.trivially_unsolvable,
        };
        model.check()?;
        Ok(model)
    }
}

struct DispCondition<'a>(&'a Model, &'a Condition);

impl Display for DispCondition<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let var = self.0.variable(self.1.var());
        match self.1 {
            Condition::Eq(_, value) => write!(f, "{} == {}", var.name, value),
            Condition::Ne(_, value) => write!(f, "{} != {}", var.name, value),
        }
    }
}

impl Display for Model {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "variables: {}", self.variables.len())?;
        for (var, init) in self.initial_state.entries() {
            let decl = self.variable(var);
            writeln!(f, "  {} (initial: {})", decl.name, init)?;
            for (i, label) in decl.values.iter().enumerate() {
                writeln!(f, "    {i}: {label}")?;
            }
        }
        writeln!(f, "transitions: {}", self.transitions.len())?;
        for t in &self.transitions {
            writeln!(f, "  {} cost: {}{}", t.name, t.cost, if t.forced { " [forced]" } else { "" })?;
            writeln!(
                f,
                "    pre: {}",
                t.preconditions.iter().map(|c| DispCondition(self, c)).format(", ")
            )?;
            writeln!(
                f,
                "    eff: {}",
                t.effects
                    .iter()
                    .map(|e| format!("{} := {}", self.variable(e.var).name, e.value))
                    .format(", ")
            )?;
        }
        for conds in &self.base_cases {
            writeln!(f, "base case: {}", conds.iter().map(|c| DispCondition(self, c)).format(", "))?;
        }
        if let Some(bound) = self.bound {
            writeln!(f, "bound: {bound}")?;
        }
        if self.trivially_unsolvable {
            writeln!(f, "trivially unsolvable")?;
        }
        Ok(())
    }
}
