//! Instantiation of action schemas into ground actions.
//!
//! Each schema is grounded independently by joining its positive preconditions against the set of
//! (possibly) reachable atoms. Schemas are distributed over a pool of scoped worker threads and the
//! results are merged in schema order so that the output does not depend on the scheduling.

mod join;
mod reach;

use crate::config::{Reachability, TranslateOptions};
use crate::errors::GroundingError;
use crate::symbols::{ActionSchema, Args, ObjectId, SchemaId};
use crate::task::{AtomId, AtomTable, GroundAtom, Metric, Task};
use fixedbitset::FixedBitSet;
use itertools::Itertools;
use join::{FactBase, JoinContext, JoinPlan};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Progress of a grounding run, shared with the caller.
///
/// The caller may cancel the grounding from another thread, workers stop shortly afterwards.
#[derive(Debug, Default)]
pub struct Progress {
    instantiated: AtomicUsize,
    cancelled: AtomicBool,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ground actions produced so far.
    pub fn instantiated(&self) -> usize {
        self.instantiated.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// A fully instantiated action schema.
#[derive(Clone, Debug)]
pub struct GroundAction {
    pub schema: SchemaId,
    pub args: Args,
    /// Name of the action in PDDL syntax, e.g. `(move a b)`.
    pub name: String,
    pub pre_pos: Vec<AtomId>,
    pub pre_neg: Vec<AtomId>,
    pub add: Vec<AtomId>,
    pub del: Vec<AtomId>,
    pub cost: i64,
}

/// A grounded planning task.
///
/// Atoms are interned in the following order: initial atoms, atoms of each action (in action order),
/// then goal atoms.
#[derive(Clone, Debug)]
pub struct GroundTask {
    pub atoms: AtomTable,
    atom_names: Vec<String>,
    /// Atoms true in the initial state, sorted.
    pub init: Vec<AtomId>,
    pub goal_pos: Vec<AtomId>,
    pub goal_neg: Vec<AtomId>,
    pub actions: Vec<GroundAction>,
}

impl GroundTask {
    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn atom_name(&self, atom: AtomId) -> &str {
        &self.atom_names[atom]
    }

    /// The initial state, as the set of atoms that are true.
    pub fn initial_state(&self) -> FixedBitSet {
        self.state_of(&self.init)
    }

    pub fn state_of(&self, atoms: &[AtomId]) -> FixedBitSet {
        let mut state = FixedBitSet::with_capacity(self.num_atoms());
        atoms.iter().for_each(|&a| state.insert(usize::from(a)));
        state
    }

    pub fn is_applicable(&self, action: &GroundAction, state: &FixedBitSet) -> bool {
        action.pre_pos.iter().all(|&a| state.contains(usize::from(a)))
            && action.pre_neg.iter().all(|&a| !state.contains(usize::from(a)))
    }

    /// STRIPS successor: deletes are applied before adds.
    pub fn successor(&self, action: &GroundAction, state: &FixedBitSet) -> FixedBitSet {
        let mut next = state.clone();
        action.del.iter().for_each(|&a| next.set(usize::from(a), false));
        action.add.iter().for_each(|&a| next.insert(usize::from(a)));
        next
    }

    pub fn is_goal(&self, state: &FixedBitSet) -> bool {
        self.goal_pos.iter().all(|&a| state.contains(usize::from(a)))
            && self.goal_neg.iter().all(|&a| !state.contains(usize::from(a)))
    }
}

/// Cost of a schema instance under the task's metric, `None` if it refers to an undefined function value.
pub(crate) fn cost_of(task: &Task, schema: &ActionSchema, args: &[ObjectId]) -> Option<i64> {
    match task.metric {
        Metric::UnitCost => Some(1),
        Metric::ActionCosts => schema.cost.eval(args, &|f, a| task.function_value(f, a)),
    }
}

/// A ground action whose atoms are not yet interned.
struct Instance {
    args: Args,
    pre_pos: Vec<GroundAtom>,
    pre_neg: Vec<GroundAtom>,
    add: Vec<GroundAtom>,
    del: Vec<GroundAtom>,
    cost: i64,
}

struct SchemaResult {
    instances: Vec<Instance>,
    undefined_cost: usize,
}

/// Shared, read-only data of all grounding workers.
struct Grounder<'a> {
    task: &'a Task,
    ctx: JoinContext<'a>,
    reachability: Reachability,
    /// Predicates that can appear in some reachable state.
    achievable: FixedBitSet,
    progress: &'a Progress,
}

impl Grounder<'_> {
    fn ground_schema(&self, schema: &ActionSchema) -> Result<SchemaResult, GroundingError> {
        let mut result = SchemaResult {
            instances: Vec::new(),
            undefined_cost: 0,
        };
        if let Some(pred) = reach::unachievable_precondition(schema, &self.achievable) {
            tracing::debug!(
                "schema {} requires `{}` that never holds",
                schema.name,
                self.task.symbols.predicate_signature(pred).name
            );
            return Ok(result);
        }
        let plan = JoinPlan::new(schema, &self.ctx);
        let relaxed = self.reachability == Reachability::Relaxed;
        let reached = |atom: &GroundAtom| !relaxed || self.ctx.facts.contains(atom);
        let instantiate = |patterns: &[crate::symbols::AtomPattern], args: &[ObjectId]| -> Vec<GroundAtom> {
            patterns
                .iter()
                .map(|p| GroundAtom {
                    pred: p.predicate,
                    args: p.bind(args),
                })
                .collect()
        };

        plan.for_each_binding(&self.ctx, self.progress, |args| {
            let Some(cost) = cost_of(self.task, schema, args) else {
                result.undefined_cost += 1;
                return;
            };
            let mut pre_neg = instantiate(&schema.pre_neg, args);
            let mut del = instantiate(&schema.del, args);
            // deleting or requiring the absence of an unreachable atom is vacuous
            pre_neg.retain(|a| reached(a));
            del.retain(|a| reached(a));
            result.instances.push(Instance {
                args: Args::from_slice(args),
                pre_pos: instantiate(&schema.pre_pos, args),
                pre_neg,
                add: instantiate(&schema.add, args),
                del,
                cost,
            });
            self.progress.instantiated.fetch_add(1, Ordering::Relaxed);
        })?;
        result.instances.sort_by(|a, b| a.args.cmp(&b.args));
        result.instances.dedup_by(|a, b| a.args == b.args);
        Ok(result)
    }
}

/// Grounds all action schemas of the task.
pub fn ground(task: &Task, options: &TranslateOptions, progress: &Progress) -> Result<GroundTask, GroundingError> {
    let _span = tracing::span!(tracing::Level::DEBUG, "GROUNDING").entered();
    let num_predicates = task.symbols.num_predicates();
    let mut init = FactBase::new(num_predicates);
    for atom in &task.init {
        init.insert(atom.clone());
    }
    let statics = reach::static_predicates(task);

    let (facts, joined, achievable) = match options.reachability {
        Reachability::Relaxed => {
            let reached = reach::relaxed_reachable(task, &init, &statics, progress)?;
            let mut all = FixedBitSet::with_capacity(num_predicates);
            all.insert_range(..);
            (reached, all.clone(), all)
        }
        Reachability::Static => (init.clone(), statics.clone(), reach::achievable_predicates(task)),
    };

    let grounder = Grounder {
        task,
        ctx: JoinContext {
            symbols: &task.symbols,
            facts: &facts,
            init: &init,
            statics: &statics,
            joined: &joined,
        },
        reachability: options.reachability,
        achievable,
        progress,
    };

    let schemas: Vec<&ActionSchema> = task.symbols.schemas().map(|(_, s)| s).collect();
    let num_threads = options.threads.clamp(1, schemas.len().max(1));
    let mut results: Vec<Option<SchemaResult>> = (0..schemas.len()).map(|_| None).collect();

    if num_threads == 1 {
        for (i, schema) in schemas.iter().enumerate() {
            results[i] = Some(grounder.ground_schema(schema)?);
        }
    } else {
        let (job_snd, job_rcv) = crossbeam_channel::unbounded::<usize>();
        let (result_snd, result_rcv) = crossbeam_channel::unbounded();
        for i in 0..schemas.len() {
            // the receiver outlives this loop, sending cannot fail
            let _ = job_snd.send(i);
        }
        drop(job_snd);

        std::thread::scope(|scope| {
            for _ in 0..num_threads {
                let job_rcv = job_rcv.clone();
                let result_snd = result_snd.clone();
                let grounder = &grounder;
                let schemas = &schemas;
                scope.spawn(move || {
                    while let Ok(i) = job_rcv.recv() {
                        let res = grounder.ground_schema(schemas[i]);
                        if res.is_err() {
                            grounder.progress.cancel();
                        }
                        if result_snd.send((i, res)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_snd);
        for (i, res) in result_rcv.iter() {
            results[i] = Some(res?);
        }
    }

    let mut ground = GroundTask {
        atoms: AtomTable::new(),
        atom_names: Vec::new(),
        init: Vec::with_capacity(task.init.len()),
        goal_pos: Vec::new(),
        goal_neg: Vec::new(),
        actions: Vec::new(),
    };
    for atom in &task.init {
        let id = ground.atoms.intern(atom.clone());
        ground.init.push(id);
    }
    ground.init.sort();
    ground.init.dedup();

    let mut undefined_cost = 0;
    for (i, res) in results.into_iter().enumerate() {
        let Some(res) = res else {
            // a worker stopped before processing this schema, which only happens on cancellation
            return Err(GroundingError::Cancelled);
        };
        let schema_id = SchemaId::from(i);
        let schema = schemas[i];
        tracing::debug!(schema = %schema.name, instances = res.instances.len(), "grounded");
        undefined_cost += res.undefined_cost;
        for inst in res.instances {
            let mut intern = |atoms: Vec<GroundAtom>| -> Vec<AtomId> {
                let mut ids = atoms.into_iter().map(|a| ground.atoms.intern(a)).collect_vec();
                ids.sort();
                ids.dedup();
                ids
            };
            let pre_pos = intern(inst.pre_pos);
            let pre_neg = intern(inst.pre_neg);
            let add = intern(inst.add);
            let del = intern(inst.del);
            let name = task.symbols.format_application(&schema.name, &inst.args);
            ground.actions.push(GroundAction {
                schema: schema_id,
                args: inst.args,
                name,
                pre_pos,
                pre_neg,
                add,
                del,
                cost: inst.cost,
            });
        }
    }
    if undefined_cost > 0 {
        tracing::debug!("discarded {undefined_cost} ground actions with an undefined cost");
    }
    for (atom, positive) in &task.goal {
        let id = ground.atoms.intern(atom.clone());
        match positive {
            true => ground.goal_pos.push(id),
            false => ground.goal_neg.push(id),
        }
    }
    ground.atom_names = ground
        .atoms
        .iter()
        .map(|(_, a)| a.display(&task.symbols).to_string())
        .collect();
    tracing::debug!(
        atoms = ground.num_atoms(),
        actions = ground.actions.len(),
        reached = facts.len(),
        "grounding done"
    );
    Ok(ground)
}
