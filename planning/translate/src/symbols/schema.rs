use super::{Args, FunId, ObjectId, PredId, TypeId};
use smallvec::SmallVec;

/// Argument of an atom pattern: either a parameter of the action (to be bound during grounding) or a constant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Term {
    /// Index of a parameter of the enclosing action schema.
    Param(usize),
    Object(ObjectId),
}

impl Term {
    /// Value of the term under a complete binding of the parameters.
    pub fn resolve(self, params: &[ObjectId]) -> ObjectId {
        match self {
            Term::Param(i) => params[i],
            Term::Object(o) => o,
        }
    }

    /// Value of the term, if the parameter it refers to is already bound.
    pub fn try_resolve(self, binding: &[Option<ObjectId>]) -> Option<ObjectId> {
        match self {
            Term::Param(i) => binding[i],
            Term::Object(o) => Some(o),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AtomPattern {
    pub predicate: PredId,
    pub args: SmallVec<[Term; 4]>,
}

impl AtomPattern {
    pub fn params(&self) -> impl Iterator<Item = usize> + '_ {
        self.args.iter().filter_map(|t| match t {
            Term::Param(i) => Some(*i),
            Term::Object(_) => None,
        })
    }

    pub fn bind(&self, params: &[ObjectId]) -> Args {
        self.args.iter().map(|t| t.resolve(params)).collect()
    }
}

/// (In)equality between two terms of an action precondition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Constraint {
    Eq(Term, Term),
    Neq(Term, Term),
}

impl Constraint {
    pub fn terms(&self) -> [Term; 2] {
        match *self {
            Constraint::Eq(a, b) | Constraint::Neq(a, b) => [a, b],
        }
    }

    /// Evaluates the constraint, returning `None` if one of its terms is not bound yet.
    pub fn holds(&self, binding: &[Option<ObjectId>]) -> Option<bool> {
        let [a, b] = self.terms();
        let a = a.try_resolve(binding)?;
        let b = b.try_resolve(binding)?;
        Some(match self {
            Constraint::Eq(..) => a == b,
            Constraint::Neq(..) => a != b,
        })
    }
}

/// Cost of an action, as a function of its parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CostExpr {
    Const(i64),
    /// Value of a static numeric function.
    Function(FunId, SmallVec<[Term; 4]>),
    Sum(Vec<CostExpr>),
}

impl CostExpr {
    pub fn zero() -> Self {
        CostExpr::Const(0)
    }

    pub fn params(&self) -> Vec<usize> {
        let mut res = Vec::new();
        self.collect_params(&mut res);
        res
    }

    fn collect_params(&self, out: &mut Vec<usize>) {
        match self {
            CostExpr::Const(_) => {}
            CostExpr::Function(_, args) => out.extend(args.iter().filter_map(|t| match t {
                Term::Param(i) => Some(*i),
                Term::Object(_) => None,
            })),
            CostExpr::Sum(es) => es.iter().for_each(|e| e.collect_params(out)),
        }
    }

    /// Evaluates the cost under a complete binding. `lookup` gives the value of a function application
    /// and returns `None` if the value is undefined, in which case the entire expression is undefined.
    /// A sum that overflows is undefined as well.
    pub fn eval(&self, params: &[ObjectId], lookup: &impl Fn(FunId, &[ObjectId]) -> Option<i64>) -> Option<i64> {
        match self {
            CostExpr::Const(c) => Some(*c),
            CostExpr::Function(f, args) => {
                let args: Args = args.iter().map(|t| t.resolve(params)).collect();
                lookup(*f, &args)
            }
            CostExpr::Sum(es) => es.iter().try_fold(0i64, |acc, e| acc.checked_add(e.eval(params, lookup)?)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Parameter {
    pub name: String,
    pub tpe: TypeId,
}

/// A lifted action: typed parameters, a STRIPS precondition and effect, and a cost.
#[derive(Clone, Debug)]
pub struct ActionSchema {
    pub name: String,
    pub params: Vec<Parameter>,
    pub pre_pos: Vec<AtomPattern>,
    pub pre_neg: Vec<AtomPattern>,
    pub constraints: Vec<Constraint>,
    pub add: Vec<AtomPattern>,
    pub del: Vec<AtomPattern>,
    pub cost: CostExpr,
}

impl ActionSchema {
    pub fn new(name: impl Into<String>, params: Vec<Parameter>) -> Self {
        ActionSchema {
            name: name.into(),
            params,
            pre_pos: Vec::new(),
            pre_neg: Vec::new(),
            constraints: Vec::new(),
            add: Vec::new(),
            del: Vec::new(),
            cost: CostExpr::zero(),
        }
    }

    /// All atom patterns appearing in the schema.
    pub fn patterns(&self) -> impl Iterator<Item = &AtomPattern> {
        self.pre_pos
            .iter()
            .chain(&self.pre_neg)
            .chain(&self.add)
            .chain(&self.del)
    }
}
