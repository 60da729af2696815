//! Lowering of ground actions and goals into the transitions and base case of a DP model.

use crate::config::TranslateOptions;
use crate::encode::{Encoding, Fact, VarKind};
use crate::errors::{EncodingError, ModelError, Result, TranslateError};
use crate::ground::{GroundAction, GroundTask};
use crate::task::AtomId;
use dp_model::{Assignment, Condition, Model, ModelBuilder, Transition, Value, VarId};
use fixedbitset::FixedBitSet;
use hashbrown::HashMap;
use itertools::Itertools;
use plan_lang::sas::{SasFact, SasTask};

#[derive(Clone, Debug, Default)]
pub struct CompileStats {
    pub transitions: usize,
    /// Ground actions whose precondition can never hold under the encoding.
    pub contradictory: usize,
    /// Goal literals that no action can achieve.
    pub unreachable_goals: usize,
}

/// A conjunction of tests on state variables, detecting contradictions as tests are added.
#[derive(Default)]
struct Conjunction {
    eq: HashMap<VarId, Value>,
    ne: Vec<(VarId, Value)>,
    contradictory: bool,
}

impl Conjunction {
    fn require(&mut self, var: VarId, value: Value) {
        match self.eq.insert(var, value) {
            Some(previous) if previous != value => self.contradictory = true,
            _ => {}
        }
    }

    fn forbid(&mut self, var: VarId, value: Value) {
        self.ne.push((var, value));
    }

    fn required(&self, var: VarId) -> Option<Value> {
        self.eq.get(&var).copied()
    }

    /// The tests in a canonical order, or `None` if they cannot hold together.
    fn into_conditions(self) -> Option<Vec<Condition>> {
        if self.contradictory {
            return None;
        }
        let mut conditions = Vec::with_capacity(self.eq.len() + self.ne.len());
        for (var, value) in self.ne {
            match self.eq.get(&var) {
                Some(&v) if v == value => return None,
                Some(_) => {} // implied by the equality
                None => conditions.push(Condition::Ne(var, value)),
            }
        }
        conditions.extend(self.eq.into_iter().map(|(var, value)| Condition::Eq(var, value)));
        conditions.sort();
        conditions.dedup();
        Some(conditions)
    }
}

fn fact_of(enc: &Encoding, atom: AtomId, names: &GroundTask) -> Result<Fact> {
    enc.fact(atom)
        .ok_or_else(|| EncodingError::BrokenPartition(names.atom_name(atom).to_string()).into())
}

/// Adds the test that `atom` holds (or does not hold if `positive` is false).
fn add_literal(conj: &mut Conjunction, enc: &Encoding, task: &GroundTask, atom: AtomId, positive: bool) -> Result<()> {
    let Fact { var, value } = fact_of(enc, atom, task)?;
    match (positive, enc.var(var).kind) {
        (true, _) => conj.require(var, value),
        (false, VarKind::Direct) => conj.require(var, 0),
        (false, _) => conj.forbid(var, value),
    }
    Ok(())
}

/// Builds the transition of a ground action, or `None` if its precondition is contradictory.
fn compile_action(
    action: &GroundAction,
    cost: i64,
    enc: &Encoding,
    task: &GroundTask,
) -> Result<Option<Transition>> {
    let mut pre = Conjunction::default();
    for &a in &action.pre_pos {
        add_literal(&mut pre, enc, task, a, true)?;
    }
    for &a in &action.pre_neg {
        add_literal(&mut pre, enc, task, a, false)?;
    }

    let mut effects: HashMap<VarId, Value> = HashMap::new();
    for &a in &action.add {
        let Fact { var, value } = fact_of(enc, a, task)?;
        if let Some(previous) = effects.insert(var, value) {
            if previous != value {
                return Err(ModelError::Check(dp_model::ModelCheckError::DuplicateAssignment {
                    transition: action.name.clone(),
                    variable: enc.var(var).name.clone(),
                })
                .into());
            }
        }
    }
    for &d in &action.del {
        if action.add.binary_search(&d).is_ok() {
            continue; // add wins over delete
        }
        let Fact { var, value } = fact_of(enc, d, task)?;
        if effects.contains_key(&var) {
            // adding another atom of the group implicitly deletes this one
            continue;
        }
        match (enc.var(var).kind, pre.required(var), enc.none_value(var)) {
            (VarKind::Direct, _, _) => {
                effects.insert(var, 0);
            }
            // requires another member, so the deleted atom is already false
            (_, Some(required), _) if required != value => {}
            (_, Some(_), Some(none)) => {
                effects.insert(var, none);
            }
            _ => {
                return Err(ModelError::UnguardedDelete {
                    action: action.name.clone(),
                    atom: task.atom_name(d).to_string(),
                }
                .into());
            }
        }
    }

    if cost < 0 {
        return Err(ModelError::NegativeCost {
            action: action.name.clone(),
            cost,
        }
        .into());
    }
    let Some(preconditions) = pre.into_conditions() else {
        return Ok(None);
    };
    let mut transition = Transition::new(action.name.clone(), cost);
    transition.preconditions = preconditions;
    transition.effects = effects
        .into_iter()
        .map(|(var, value)| Assignment::new(var, value))
        .sorted()
        .collect();
    Ok(Some(transition))
}

/// Compiles a grounded task under the given encoding into a DP model.
pub fn compile(task: &GroundTask, enc: &Encoding, options: &TranslateOptions) -> Result<(Model, CompileStats)> {
    let _span = tracing::span!(tracing::Level::DEBUG, "COMPILE").entered();
    enc.check_partition()?;
    let mut stats = CompileStats::default();
    let mut builder = ModelBuilder::new();

    let init = enc.encode_state(&task.init)?;
    for (var, v) in enc.vars() {
        builder.add_variable(v.name.clone(), v.labels.clone(), init.get(var));
    }

    for action in &task.actions {
        match compile_action(action, action.cost, enc, task)? {
            Some(t) => {
                builder.add_transition(t);
                stats.transitions += 1;
            }
            None => {
                tracing::trace!("discarded {}: contradictory precondition", action.name);
                stats.contradictory += 1;
            }
        }
    }

    let mut added = FixedBitSet::with_capacity(task.num_atoms());
    let mut deleted = FixedBitSet::with_capacity(task.num_atoms());
    for a in &task.actions {
        a.add.iter().for_each(|&x| added.insert(usize::from(x)));
        a.del.iter().for_each(|&x| deleted.insert(usize::from(x)));
    }
    let init_set = task.initial_state();
    let mut goal = Conjunction::default();
    for &g in &task.goal_pos {
        if !init_set.contains(usize::from(g)) && !added.contains(usize::from(g)) {
            tracing::warn!("goal {} is false initially and never achieved", task.atom_name(g));
            stats.unreachable_goals += 1;
        }
        add_literal(&mut goal, enc, task, g, true)?;
    }
    for &g in &task.goal_neg {
        if init_set.contains(usize::from(g)) && !deleted.contains(usize::from(g)) {
            tracing::warn!("goal (not {}) is false initially and never achieved", task.atom_name(g));
            stats.unreachable_goals += 1;
        }
        add_literal(&mut goal, enc, task, g, false)?;
    }
    finish_goal(&mut builder, goal, stats.unreachable_goals > 0);
    builder.set_bound(options.bound);

    let model = builder.build()?;
    tracing::debug!(
        variables = model.num_variables(),
        transitions = stats.transitions,
        contradictory = stats.contradictory,
        "compiled model"
    );
    Ok((model, stats))
}

fn finish_goal(builder: &mut ModelBuilder, goal: Conjunction, unreachable: bool) {
    let mut unsolvable = unreachable;
    match goal.into_conditions() {
        Some(conditions) => builder.add_base_case(conditions),
        None => {
            tracing::warn!("the goal is contradictory");
            unsolvable = true;
        }
    }
    if unsolvable {
        builder.mark_unsolvable();
    }
}

/// Compiles a SAS+ task, whose variables are taken as the state variables of the model.
pub fn compile_sas(task: &SasTask, options: &TranslateOptions) -> Result<(Model, Encoding, CompileStats)> {
    let _span = tracing::span!(tracing::Level::DEBUG, "COMPILE").entered();
    if !task.axioms.is_empty() {
        return Err(TranslateError::Unsupported("SAS+ axioms".to_string()));
    }
    if let Some(op) = task
        .operators
        .iter()
        .find(|op| op.effects.iter().any(|e| !e.conditions.is_empty()))
    {
        return Err(TranslateError::Unsupported(format!(
            "conditional effect in SAS+ operator `{}`",
            op.name
        )));
    }

    let enc = Encoding::from_sas(task);
    let mut stats = CompileStats::default();
    let mut builder = ModelBuilder::new();
    for ((_, v), &init) in enc.vars().zip(&task.initial) {
        builder.add_variable(v.name.clone(), v.labels.clone(), init as Value);
    }
    let require = |conj: &mut Conjunction, fact: &SasFact| conj.require(VarId::from(fact.var), fact.value as Value);

    for op in &task.operators {
        if op.cost < 0 {
            return Err(ModelError::NegativeCost {
                action: op.name.clone(),
                cost: op.cost,
            }
            .into());
        }
        let mut pre = Conjunction::default();
        op.prevail.iter().for_each(|f| require(&mut pre, f));
        let mut transition = Transition::new(op.name.clone(), op.cost);
        for eff in &op.effects {
            if let Some(value) = eff.pre {
                pre.require(VarId::from(eff.var), value as Value);
            }
            transition
                .effects
                .push(Assignment::new(VarId::from(eff.var), eff.post as Value));
        }
        match pre.into_conditions() {
            Some(conditions) => {
                transition.preconditions = conditions;
                transition.effects.sort();
                builder.add_transition(transition);
                stats.transitions += 1;
            }
            None => {
                tracing::trace!("discarded {}: contradictory precondition", op.name);
                stats.contradictory += 1;
            }
        }
    }

    let mut goal = Conjunction::default();
    task.goal.iter().for_each(|f| require(&mut goal, f));
    finish_goal(&mut builder, goal, false);
    builder.set_bound(options.bound);
    let model = builder.build()?;
    tracing::debug!(
        variables = model.num_variables(),
        transitions = stats.transitions,
        "compiled SAS+ task"
    );
    Ok((model, enc, stats))
}
