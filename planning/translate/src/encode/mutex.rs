//! Synthesis of mutex groups: sets of atoms of which at most one is true in any reachable state.
//!
//! Candidates are seeded from the atoms of each predicate that only differ in one argument, then
//! verified against every action modifying them. A candidate that fails only because some action adds
//! a member without removing another one is repaired by extending it with an atom that this action
//! both requires and deletes.

use crate::errors::EncodingError;
use crate::ground::{GroundAction, GroundTask};
use crate::symbols::Args;
use crate::task::AtomId;
use fixedbitset::FixedBitSet;
use hashbrown::{HashMap, HashSet};
use itertools::Itertools;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutexGroup {
    /// Members of the group, sorted.
    pub members: Vec<AtomId>,
    /// True if exactly one member holds in every reachable state.
    pub exhaustive: bool,
}

/// Outcome of the verification of a candidate group.
enum Verdict {
    Valid,
    Invalid,
    /// Some action adds a member without deleting a required one.
    /// The group may be repaired by extending it with one of the given atoms.
    Unbalanced(Vec<AtomId>),
}

pub(crate) struct MutexAnalysis<'a> {
    task: &'a GroundTask,
    /// For each atom, the actions that add or delete it.
    touching: Vec<Vec<usize>>,
    init: FixedBitSet,
    max_group_size: usize,
    max_refinements: usize,
}

/// Result of the mutex analysis.
#[derive(Debug, Default)]
pub struct MutexGroups {
    /// Pairwise disjoint groups of at least two atoms.
    pub groups: Vec<MutexGroup>,
    /// Candidates whose refinement exceeded the maximal group size.
    pub abandoned: Vec<EncodingError>,
    /// Number of valid (possibly overlapping) groups found before selection.
    pub num_candidates: usize,
}

impl<'a> MutexAnalysis<'a> {
    pub fn new(task: &'a GroundTask, max_group_size: usize, max_refinements: usize) -> Self {
        let mut touching = vec![Vec::new(); task.num_atoms()];
        for (i, a) in task.actions.iter().enumerate() {
            for &atom in a.add.iter().chain(&a.del) {
                if touching[atom].last() != Some(&i) {
                    touching[atom].push(i);
                }
            }
        }
        MutexAnalysis {
            task,
            touching,
            init: task.initial_state(),
            max_group_size,
            max_refinements,
        }
    }

    /// Candidate groups: for each predicate and argument position, the atoms that agree on all other arguments.
    fn seeds(&self) -> Vec<Vec<AtomId>> {
        let mut seeds: HashMap<(crate::symbols::PredId, usize, Args), Vec<AtomId>> = HashMap::new();
        for (id, atom) in self.task.atoms.iter() {
            if atom.args.is_empty() {
                seeds.entry((atom.pred, 0, Args::new())).or_default().push(id);
            }
            for counted in 0..atom.args.len() {
                let mut key = atom.args.clone();
                key.remove(counted);
                seeds.entry((atom.pred, counted, key)).or_default().push(id);
            }
        }
        let mut seeds = seeds.into_values().collect_vec();
        seeds.sort();
        seeds.dedup();
        seeds
    }

    fn actions_touching(&self, members: &[AtomId]) -> Vec<usize> {
        members
            .iter()
            .flat_map(|&m| self.touching[m].iter().copied())
            .sorted()
            .dedup()
            .collect()
    }

    fn verify(&self, members: &[AtomId]) -> Verdict {
        let mut group = FixedBitSet::with_capacity(self.task.num_atoms());
        members.iter().for_each(|&m| group.insert(usize::from(m)));
        let in_group = |a: &AtomId| group.contains(usize::from(*a));

        if members.iter().filter(|&&m| self.init.contains(usize::from(m))).count() > 1 {
            return Verdict::Invalid;
        }
        for i in self.actions_touching(members) {
            let action = &self.task.actions[i];
            let mut added = action.add.iter().filter(|a| in_group(a));
            let first_add = added.next();
            if added.next().is_some() {
                return Verdict::Invalid;
            }
            let required = |a: &AtomId| action.pre_pos.binary_search(a).is_ok();
            let requires_member = action.pre_pos.iter().any(in_group);
            match first_add {
                Some(a) => {
                    let balanced =
                        required(a) || action.del.iter().any(|d| d != a && in_group(d) && required(d));
                    if !balanced {
                        let repairs = action
                            .del
                            .iter()
                            .filter(|&d| required(d) && !in_group(d))
                            .copied()
                            .collect_vec();
                        return match repairs.is_empty() {
                            true => Verdict::Invalid,
                            false => Verdict::Unbalanced(repairs),
                        };
                    }
                }
                None => {
                    // a delete of an atom that is not required is only safe if another member is required
                    let unguarded = action.del.iter().any(|d| in_group(d) && !required(d));
                    if unguarded && !requires_member {
                        return Verdict::Invalid;
                    }
                }
            }
        }
        Verdict::Valid
    }

    /// Depth-first refinement of a seed into a valid group.
    fn refine(&self, seed: Vec<AtomId>) -> Result<Option<Vec<AtomId>>, EncodingError> {
        let seed_name = self.task.atom_name(seed[0]).to_string();
        if seed.len() > self.max_group_size {
            return Err(EncodingError::GroupTooLarge {
                seed: seed_name,
                size: seed.len(),
            });
        }
        let mut stack = vec![seed];
        let mut visited: HashSet<Vec<AtomId>> = HashSet::new();
        let mut too_large = None;
        let mut explored = 0;
        while let Some(members) = stack.pop() {
            if !visited.insert(members.clone()) {
                continue;
            }
            explored += 1;
            if explored > self.max_refinements {
                break;
            }
            match self.verify(&members) {
                Verdict::Valid => return Ok(Some(members)),
                Verdict::Invalid => {}
                Verdict::Unbalanced(repairs) => {
                    // reversed so that the smallest atom is tried first
                    for &x in repairs.iter().rev() {
                        let mut extended = members.clone();
                        if let Err(pos) = extended.binary_search(&x) {
                            extended.insert(pos, x);
                        }
                        if extended.len() > self.max_group_size {
                            too_large = Some(EncodingError::GroupTooLarge {
                                seed: seed_name.clone(),
                                size: extended.len(),
                            });
                        } else {
                            stack.push(extended);
                        }
                    }
                }
            }
        }
        match too_large {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }

    fn is_exhaustive(&self, members: &[AtomId]) -> bool {
        let initially_true = members.iter().filter(|&&m| self.init.contains(usize::from(m))).count();
        initially_true == 1
            && self.actions_touching(members).into_iter().all(|i| {
                let action: &GroundAction = &self.task.actions[i];
                let in_group = |a: &AtomId| members.binary_search(a).is_ok();
                !action.del.iter().any(in_group) || action.add.iter().any(in_group)
            })
    }

    /// Finds a set of pairwise disjoint mutex groups, preferring large groups.
    pub fn run(&self) -> MutexGroups {
        let _span = tracing::span!(tracing::Level::DEBUG, "MUTEX").entered();
        let mut result = MutexGroups::default();
        let mut valid = Vec::new();
        for seed in self.seeds() {
            match self.refine(seed) {
                Ok(Some(group)) => valid.push(group),
                Ok(None) => {}
                Err(err) => result.abandoned.push(err),
            }
        }
        valid.retain(|g| g.len() >= 2);
        valid.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        valid.dedup();
        result.num_candidates = valid.len();

        let mut covered = FixedBitSet::with_capacity(self.task.num_atoms());
        for members in valid {
            if members.iter().any(|&m| covered.contains(usize::from(m))) {
                continue;
            }
            members.iter().for_each(|&m| covered.insert(usize::from(m)));
            let exhaustive = self.is_exhaustive(&members);
            tracing::trace!(
                "group {{{}}}{}",
                members.iter().map(|&m| self.task.atom_name(m)).format(", "),
                if exhaustive { " (exhaustive)" } else { "" }
            );
            result.groups.push(MutexGroup { members, exhaustive });
        }
        result.groups.sort_by(|a, b| a.members[0].cmp(&b.members[0]));
        tracing::debug!(
            candidates = result.num_candidates,
            groups = result.groups.len(),
            abandoned = result.abandoned.len(),
            "mutex groups"
        );
        result
    }
}
