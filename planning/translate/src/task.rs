use crate::symbols::{Args, FunId, ObjectId, PredId, SymbolTable};
use hashbrown::HashMap;
use std::fmt::{Display, Formatter};

dp_model::create_ref_type!(AtomId);

/// A predicate applied to objects.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroundAtom {
    pub pred: PredId,
    pub args: Args,
}

impl GroundAtom {
    pub fn new(pred: PredId, args: impl IntoIterator<Item = ObjectId>) -> Self {
        GroundAtom {
            pred,
            args: args.into_iter().collect(),
        }
    }

    pub fn display<'a>(&'a self, symbols: &'a SymbolTable) -> DispAtom<'a> {
        DispAtom(self, symbols)
    }
}

pub struct DispAtom<'a>(&'a GroundAtom, &'a SymbolTable);

impl Display for DispAtom<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = &self.1.predicate_signature(self.0.pred).name;
        write!(f, "{}", self.1.format_application(name, &self.0.args))
    }
}

/// Interns ground atoms, giving each a dense [`AtomId`] in order of first appearance.
#[derive(Clone, Debug, Default)]
pub struct AtomTable {
    atoms: Vec<GroundAtom>,
    ids: HashMap<GroundAtom, AtomId>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, atom: GroundAtom) -> AtomId {
        if let Some(&id) = self.ids.get(&atom) {
            return id;
        }
        let id = AtomId::from(self.atoms.len());
        self.atoms.push(atom.clone());
        self.ids.insert(atom, id);
        id
    }

    pub fn get(&self, atom: &GroundAtom) -> Option<AtomId> {
        self.ids.get(atom).copied()
    }

    pub fn atom(&self, id: AtomId) -> &GroundAtom {
        &self.atoms[id]
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AtomId, &GroundAtom)> {
        self.atoms.iter().enumerate().map(|(i, a)| (AtomId::from(i), a))
    }

    pub fn ids(&self) -> impl Iterator<Item = AtomId> {
        (0..self.atoms.len()).map(AtomId::from)
    }
}

/// How the cost of a plan is measured.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Metric {
    /// No metric: every action costs 1.
    UnitCost,
    /// `(:metric minimize (total-cost))`: actions cost what their `increase` effect states.
    ActionCosts,
}

/// A lifted planning task: the symbols, the initial state and the goal.
#[derive(Clone, Debug)]
pub struct Task {
    pub name: String,
    pub symbols: SymbolTable,
    /// Atoms true in the initial state. All other atoms are false.
    pub init: Vec<GroundAtom>,
    /// Values of static numeric functions.
    pub static_values: HashMap<(FunId, Args), i64>,
    /// Goal literals, the boolean is false for negated atoms.
    pub goal: Vec<(GroundAtom, bool)>,
    pub metric: Metric,
}

impl Task {
    pub fn new(name: impl Into<String>, symbols: SymbolTable) -> Self {
        Task {
            name: name.into(),
            symbols,
            init: Vec::new(),
            static_values: Default::default(),
            goal: Vec::new(),
            metric: Metric::UnitCost,
        }
    }

    pub fn function_value(&self, fun: FunId, args: &[ObjectId]) -> Option<i64> {
        self.static_values.get(&(fun, Args::from_slice(args))).copied()
    }
}
