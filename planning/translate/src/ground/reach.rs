//! Over-approximations of the atoms reachable from the initial state.

use super::join::{FactBase, JoinContext, JoinPlan};
use super::{Progress, cost_of};
use crate::errors::GroundingError;
use crate::symbols::{ActionSchema, PredId};
use crate::task::{GroundAtom, Task};
use fixedbitset::FixedBitSet;

/// Predicates that appear in the effect of no action schema. Their atoms keep their initial value.
pub(crate) fn static_predicates(task: &Task) -> FixedBitSet {
    let n = task.symbols.num_predicates();
    let mut statics = FixedBitSet::with_capacity(n);
    statics.insert_range(..);
    for (_, schema) in task.symbols.schemas() {
        for p in schema.add.iter().chain(&schema.del) {
            statics.set(usize::from(p.predicate), false);
        }
    }
    statics
}

/// Predicates that occur in the initial state or in an add effect.
pub(crate) fn achievable_predicates(task: &Task) -> FixedBitSet {
    let mut achievable = FixedBitSet::with_capacity(task.symbols.num_predicates());
    for atom in &task.init {
        achievable.insert(usize::from(atom.pred));
    }
    for (_, schema) in task.symbols.schemas() {
        for p in &schema.add {
            achievable.insert(usize::from(p.predicate));
        }
    }
    achievable
}

/// Delete-relaxed fixed point: all atoms reachable if deletes and non-static negative preconditions are ignored.
///
/// Proceeds in rounds. A schema is only reconsidered in a round if one of its positive
/// preconditions is over a predicate that gained new atoms in the previous round.
pub(crate) fn relaxed_reachable(
    task: &Task,
    init: &FactBase,
    statics: &FixedBitSet,
    progress: &Progress,
) -> Result<FactBase, GroundingError> {
    let _span = tracing::span!(tracing::Level::DEBUG, "REACHABILITY").entered();
    let n = task.symbols.num_predicates();
    let mut joined = FixedBitSet::with_capacity(n);
    joined.insert_range(..);
    let mut reached = init.clone();
    let mut changed = FixedBitSet::with_capacity(n);
    changed.insert_range(..);
    let mut round = 0;

    loop {
        let mut new_atoms: Vec<GroundAtom> = Vec::new();
        for (_, schema) in task.symbols.schemas() {
            if !needs_update(schema, &changed, round) {
                continue;
            }
            let ctx = JoinContext {
                symbols: &task.symbols,
                facts: &reached,
                init,
                statics,
                joined: &joined,
            };
            let plan = JoinPlan::new(schema, &ctx);
            plan.for_each_binding(&ctx, progress, |args| {
                if cost_of(task, schema, args).is_some() {
                    for add in &schema.add {
                        new_atoms.push(GroundAtom {
                            pred: add.predicate,
                            args: add.bind(args),
                        });
                    }
                }
            })?;
        }
        changed.clear();
        for atom in new_atoms {
            let pred = atom.pred;
            if reached.insert(atom) {
                changed.insert(usize::from(pred));
            }
        }
        round += 1;
        tracing::trace!(round, reached = reached.len(), "relaxed reachability");
        if changed.is_clear() {
            break;
        }
    }
    tracing::debug!(rounds = round, atoms = reached.len(), "relaxed fixed point");
    Ok(reached)
}

fn needs_update(schema: &ActionSchema, changed: &FixedBitSet, round: usize) -> bool {
    round == 0
        || schema
            .pre_pos
            .iter()
            .any(|p| changed.contains(usize::from(p.predicate)))
}

/// A predicate required by a positive precondition of the schema that can never hold, if any.
pub(crate) fn unachievable_precondition(schema: &ActionSchema, achievable: &FixedBitSet) -> Option<PredId> {
    schema
        .pre_pos
        .iter()
        .map(|p| p.predicate)
        .find(|&p| !achievable.contains(usize::from(p)))
}
