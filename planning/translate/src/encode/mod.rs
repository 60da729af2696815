//! Representation of sets of ground atoms as assignments to finite-domain state variables.

mod mutex;

pub use mutex::{MutexGroup, MutexGroups};

use crate::errors::EncodingError;
use crate::ground::GroundTask;
use crate::task::AtomId;
use dp_model::{State, Value, VarId};
use itertools::Itertools;
use plan_lang::sas::SasTask;

/// Label of the value taken by a non-exhaustive group variable when none of its atoms holds.
pub const NONE_OF_THOSE: &str = "<none of those>";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VarKind {
    /// A single atom: value 0 if absent, 1 if present.
    Direct,
    /// A mutex group: value `i` if the `i`-th member holds.
    /// If the group is not exhaustive, an additional last value states that no member holds.
    Group { exhaustive: bool },
    /// A variable of a SAS+ task: value `i` is the `i`-th fact of the variable.
    Sas,
}

#[derive(Clone, Debug)]
pub struct EncodedVar {
    pub name: String,
    pub kind: VarKind,
    /// Atoms represented by the variable.
    pub members: Vec<AtomId>,
    /// Label of each value of the domain.
    pub labels: Vec<String>,
}

impl EncodedVar {
    pub fn domain_size(&self) -> usize {
        self.labels.len()
    }
}

/// The value of a state variable that makes an atom true.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Fact {
    pub var: VarId,
    pub value: Value,
}

/// A partition of the atoms of a task into state variables.
#[derive(Clone, Debug)]
pub struct Encoding {
    vars: Vec<EncodedVar>,
    facts: Vec<Option<Fact>>,
}

impl Encoding {
    fn with_capacity(num_atoms: usize) -> Self {
        Encoding {
            vars: Vec::new(),
            facts: vec![None; num_atoms],
        }
    }

    fn push_var(&mut self, kind: VarKind, members: Vec<AtomId>, mut labels: Vec<String>) -> VarId {
        let var = VarId::from(self.vars.len());
        match kind {
            VarKind::Direct => self.facts[members[0]] = Some(Fact { var, value: 1 }),
            VarKind::Group { .. } | VarKind::Sas => {
                for (value, &m) in members.iter().enumerate() {
                    self.facts[m] = Some(Fact {
                        var,
                        value: value as Value,
                    });
                }
            }
        }
        if kind == (VarKind::Group { exhaustive: false }) {
            labels.push(NONE_OF_THOSE.to_string());
        }
        self.vars.push(EncodedVar {
            name: format!("var{}", usize::from(var)),
            kind,
            members,
            labels,
        });
        var
    }

    fn push_direct(&mut self, task: &GroundTask, atom: AtomId) -> VarId {
        let name = task.atom_name(atom);
        let labels = vec![format!("(not {name})"), name.to_string()];
        self.push_var(VarKind::Direct, vec![atom], labels)
    }

    /// One boolean variable per atom.
    pub fn direct(task: &GroundTask) -> Encoding {
        let mut enc = Encoding::with_capacity(task.num_atoms());
        for atom in task.atoms.ids() {
            enc.push_direct(task, atom);
        }
        enc
    }

    /// One variable per mutex group, one boolean variable for each atom in no group.
    /// Variables are ordered by their smallest atom.
    pub fn invariant(task: &GroundTask, max_group_size: usize, max_refinements: usize) -> (Encoding, MutexGroups) {
        let analysis = mutex::MutexAnalysis::new(task, max_group_size, max_refinements);
        let groups = analysis.run();
        if let Some(first) = groups.abandoned.first() {
            tracing::warn!(
                "{} candidate mutex groups were abandoned and their atoms encoded directly (e.g. {})",
                groups.abandoned.len(),
                first
            );
        }

        let mut group_of = vec![None; task.num_atoms()];
        for (i, g) in groups.groups.iter().enumerate() {
            g.members.iter().for_each(|&m| group_of[m] = Some(i));
        }
        let mut enc = Encoding::with_capacity(task.num_atoms());
        for atom in task.atoms.ids() {
            match group_of[atom] {
                None => {
                    enc.push_direct(task, atom);
                }
                Some(i) if groups.groups[i].members[0] == atom => {
                    let g = &groups.groups[i];
                    let labels = g.members.iter().map(|&m| task.atom_name(m).to_string()).collect();
                    let kind = VarKind::Group {
                        exhaustive: g.exhaustive,
                    };
                    enc.push_var(kind, g.members.clone(), labels);
                }
                Some(_) => {}
            }
        }
        (enc, groups)
    }

    /// The variables of a SAS+ task, taken as given.
    /// The `j`-th value of the `i`-th variable is represented by the atom [`Encoding::sas_atom(i, j)`](Self::sas_atom).
    pub fn from_sas(task: &SasTask) -> Encoding {
        let num_facts = task.variables.iter().map(|v| v.values.len()).sum();
        let mut enc = Encoding::with_capacity(num_facts);
        let mut next = 0;
        for v in &task.variables {
            let members = (next..next + v.values.len()).map(AtomId::from).collect();
            next += v.values.len();
            enc.push_var(VarKind::Sas, members, v.values.clone());
        }
        enc
    }

    pub fn sas_atom(&self, var: usize, value: usize) -> AtomId {
        self.vars[var].members[value]
    }

    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn vars(&self) -> impl Iterator<Item = (VarId, &EncodedVar)> {
        self.vars.iter().enumerate().map(|(i, v)| (VarId::from(i), v))
    }

    pub fn var(&self, var: VarId) -> &EncodedVar {
        &self.vars[var]
    }

    pub fn num_atoms(&self) -> usize {
        self.facts.len()
    }

    /// The variable and value representing the atom.
    pub fn fact(&self, atom: AtomId) -> Option<Fact> {
        self.facts.get(usize::from(atom)).copied().flatten()
    }

    /// Value of the variable when none of its atoms holds, if it can happen.
    pub fn none_value(&self, var: VarId) -> Option<Value> {
        let v = &self.vars[var];
        match v.kind {
            VarKind::Direct => Some(0),
            VarKind::Group { exhaustive: false } => Some(v.members.len() as Value),
            VarKind::Group { exhaustive: true } | VarKind::Sas => None,
        }
    }

    /// Checks that every atom is represented by exactly one value of one variable.
    pub fn check_partition(&self) -> Result<(), EncodingError> {
        let mut seen = vec![false; self.facts.len()];
        for (var, v) in self.vars() {
            for (i, &m) in v.members.iter().enumerate() {
                let expected_value = match v.kind {
                    VarKind::Direct => 1,
                    _ => i as Value,
                };
                let consistent = self.fact(m) == Some(Fact {
                    var,
                    value: expected_value,
                });
                let index = usize::from(m);
                if index >= seen.len() || seen[index] || !consistent {
                    return Err(EncodingError::BrokenPartition(format!("#{index}")));
                }
                seen[index] = true;
            }
        }
        match seen.iter().position(|s| !s) {
            Some(missing) => Err(EncodingError::BrokenPartition(format!("#{missing}"))),
            None => Ok(()),
        }
    }

    /// Encodes the state in which exactly the given atoms hold.
    pub fn encode_state(&self, atoms: &[AtomId]) -> Result<State, EncodingError> {
        let mut values: Vec<Option<Value>> = vec![None; self.vars.len()];
        for &atom in atoms {
            let Fact { var, value } = self
                .fact(atom)
                .ok_or_else(|| EncodingError::BrokenPartition(format!("#{}", usize::from(atom))))?;
            match values[var] {
                Some(previous) if previous != value => {
                    let v = &self.vars[var];
                    return Err(EncodingError::MutexViolation {
                        variable: v.name.clone(),
                        first: v.labels[previous as usize].clone(),
                        second: v.labels[value as usize].clone(),
                    });
                }
                _ => values[var] = Some(value),
            }
        }
        let values = values
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                let var = VarId::from(i);
                value
                    .or_else(|| self.none_value(var))
                    .ok_or_else(|| EncodingError::MissingValue(self.vars[var].name.clone()))
            })
            .try_collect()?;
        Ok(State::new(values))
    }

    /// The atoms that hold in the given state, sorted.
    pub fn decode_state(&self, state: &State) -> Vec<AtomId> {
        let mut atoms = state
            .entries()
            .filter_map(|(var, value)| {
                let v = &self.vars[var];
                match v.kind {
                    VarKind::Direct => (value == 1).then(|| v.members[0]),
                    VarKind::Group { .. } | VarKind::Sas => v.members.get(value as usize).copied(),
                }
            })
            .collect_vec();
        atoms.sort();
        atoms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TranslateOptions;
    use crate::ground::{Progress, ground};
    use crate::symbols::*;
    use crate::task::{GroundAtom, Task};
    use smallvec::smallvec;

    /// A robot moving between three locations, all connected.
    fn robot() -> GroundTask {
        let types = TypeHierarchy::new(vec![("loc".to_string(), vec![]), ("robot".to_string(), vec![])]).unwrap();
        let mut symbols = SymbolTable::new(types);
        let r = symbols.add_object("r", "robot").unwrap();
        let locs: Vec<ObjectId> = (1..=3)
            .map(|i| symbols.add_object(&format!("l{i}"), "loc").unwrap())
            .collect();
        let at = symbols.add_predicate("at", &["robot", "loc"]).unwrap();
        let robot = symbols.type_id("robot").unwrap();
        let loc = symbols.type_id("loc").unwrap();
        let param = |name: &str, tpe| Parameter {
            name: name.to_string(),
            tpe,
        };
        let at_ = |r, l| AtomPattern {
            predicate: at,
            args: smallvec![Term::Param(r), Term::Param(l)],
        };
        let mut go = ActionSchema::new("go", vec![param("?r", robot), param("?from", loc), param("?to", loc)]);
        go.pre_pos.push(at_(0, 1));
        go.constraints.push(Constraint::Neq(Term::Param(1), Term::Param(2)));
        go.del.push(at_(0, 1));
        go.add.push(at_(0, 2));
        symbols.add_schema(go).unwrap();

        let mut task = Task::new("robot", symbols);
        task.init.push(GroundAtom::new(at, [r, locs[0]]));
        task.goal.push((GroundAtom::new(at, [r, locs[2]]), true));
        ground(&task, &TranslateOptions::default().with_threads(1), &Progress::new()).unwrap()
    }

    #[test]
    fn direct_encoding() {
        let task = robot();
        let enc = Encoding::direct(&task);
        assert_eq!(enc.num_vars(), 3);
        enc.check_partition().unwrap();
        let s0 = enc.encode_state(&task.init).unwrap();
        assert_eq!(s0.values(), &[1, 0, 0]);
        assert_eq!(enc.decode_state(&s0), task.init);
    }

    #[test]
    fn invariant_encoding() {
        let task = robot();
        let (enc, groups) = Encoding::invariant(&task, 64, 256);
        assert_eq!(groups.groups.len(), 1);
        assert_eq!(enc.num_vars(), 1);
        enc.check_partition().unwrap();
        let (var, v) = enc.vars().next().unwrap();
        assert_eq!(v.kind, VarKind::Group { exhaustive: true });
        assert_eq!(v.domain_size(), 3);
        assert_eq!(v.labels[0], "(at r l1)");
        assert_eq!(enc.none_value(var), None);

        let s0 = enc.encode_state(&task.init).unwrap();
        assert_eq!(s0.values(), &[0]);
        assert_eq!(enc.decode_state(&s0), task.init);
        let both = vec![AtomId::from(0usize), AtomId::from(1usize)];
        assert!(matches!(enc.encode_state(&both), Err(EncodingError::MutexViolation { .. })));
        assert_eq!(
            enc.encode_state(&[]),
            Err(EncodingError::MissingValue("var0".to_string()))
        );
    }

    #[test]
    fn groups_that_grow_too_large_fall_back_to_direct_encoding() {
        let task = robot();
        let (enc, groups) = Encoding::invariant(&task, 2, 256);
        assert!(groups.groups.is_empty());
        assert!(!groups.abandoned.is_empty());
        assert_eq!(enc.num_vars(), 3);
        enc.check_partition().unwrap();
    }
}
