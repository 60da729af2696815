//! Enumeration of the parameter bindings of an action schema that are consistent with a set of facts.

use super::Progress;
use crate::errors::GroundingError;
use crate::symbols::*;
use crate::task::GroundAtom;
use fixedbitset::FixedBitSet;
use hashbrown::HashSet;
use smallvec::SmallVec;

/// Number of search nodes between two checks of the cancellation flag.
const CANCELLATION_PERIOD: u64 = 1024;

/// Set of ground atoms, indexed by predicate.
#[derive(Clone, Debug)]
pub(crate) struct FactBase {
    by_predicate: Vec<Vec<Args>>,
    index: HashSet<GroundAtom>,
}

impl FactBase {
    pub fn new(num_predicates: usize) -> Self {
        FactBase {
            by_predicate: vec![Vec::new(); num_predicates],
            index: HashSet::new(),
        }
    }

    /// Adds the atom to the base, returning false if it was already present.
    pub fn insert(&mut self, atom: GroundAtom) -> bool {
        if self.index.contains(&atom) {
            return false;
        }
        self.by_predicate[atom.pred].push(atom.args.clone());
        self.index.insert(atom);
        true
    }

    pub fn contains(&self, atom: &GroundAtom) -> bool {
        self.index.contains(atom)
    }

    pub fn facts(&self, pred: PredId) -> &[Args] {
        &self.by_predicate[pred]
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }
}

/// Objects that a parameter may take.
#[derive(Clone, Debug)]
struct ParamDomain {
    objects: Vec<ObjectId>,
    set: FixedBitSet,
}

impl ParamDomain {
    fn contains(&self, o: ObjectId) -> bool {
        self.set.contains(usize::from(o))
    }
}

#[derive(Clone, Debug)]
enum Step {
    /// Binds `binds` from a fact matching the pattern.
    /// If all parameters of the pattern are already bound, this is a membership test.
    Atom {
        pattern: AtomPattern,
        binds: SmallVec<[usize; 4]>,
    },
    /// Binds a parameter to each object of its domain.
    Param(usize),
}

#[derive(Clone, Debug)]
enum Check {
    Constraint(Constraint),
    /// The atom must not be in the initial state (negative precondition on a static predicate).
    NotInitially(AtomPattern),
}

/// Options selecting which preconditions take part in a join.
pub(crate) struct JoinContext<'a> {
    pub symbols: &'a SymbolTable,
    /// Facts against which positive preconditions are matched.
    pub facts: &'a FactBase,
    /// Initial state, used to prune negative preconditions over static predicates.
    pub init: &'a FactBase,
    /// Predicates that appear in no effect.
    pub statics: &'a FixedBitSet,
    /// Predicates whose positive preconditions are matched against `facts`.
    /// Preconditions over other predicates only constrain the types of their parameters.
    pub joined: &'a FixedBitSet,
}

/// An ordering of the join steps of a schema, with the checks to perform after each step.
#[derive(Clone, Debug)]
pub(crate) struct JoinPlan {
    num_params: usize,
    domains: Vec<ParamDomain>,
    steps: Vec<Step>,
    /// `checks[i]` must hold once the first `i` steps are done.
    checks: Vec<Vec<Check>>,
    /// Set if the plan can be statically shown to have no solution.
    empty: bool,
}

impl JoinPlan {
    pub fn new(schema: &ActionSchema, ctx: &JoinContext) -> Self {
        let num_params = schema.params.len();
        let domains = parameter_domains(schema, ctx.symbols);
        let mut empty = domains.iter().any(|d| d.objects.is_empty());

        let mut bound = vec![false; num_params];
        let mut steps = Vec::with_capacity(schema.pre_pos.len() + num_params);
        let mut remaining: Vec<&AtomPattern> = schema
            .pre_pos
            .iter()
            .filter(|p| ctx.joined.contains(usize::from(p.predicate)))
            .collect();

        // greedy: most selective atom first
        while !remaining.is_empty() {
            let (idx, _) = remaining
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let new_params = p.params().filter(|&v| !bound[v]).count();
                    let num_facts = ctx.facts.facts(p.predicate).len();
                    (i, (new_params > 0, num_facts, new_params))
                })
                .min_by_key(|(_, key)| *key)
                .unwrap_or((0, (false, 0, 0)));
            let pattern = remaining.swap_remove(idx);
            let mut binds = SmallVec::new();
            for v in pattern.params() {
                if !bound[v] {
                    bound[v] = true;
                    binds.push(v);
                }
            }
            if ctx.facts.facts(pattern.predicate).is_empty() {
                empty = true;
            }
            steps.push(Step::Atom {
                pattern: pattern.clone(),
                binds,
            });
        }
        let mut free: Vec<usize> = (0..num_params).filter(|&v| !bound[v]).collect();
        free.sort_by_key(|&v| (domains[v].objects.len(), v));
        steps.extend(free.into_iter().map(Step::Param));

        // attach each check to the first step after which all its parameters are bound
        let mut bound_after = vec![0usize; num_params];
        for (i, step) in steps.iter().enumerate() {
            match step {
                Step::Atom { binds, .. } => binds.iter().for_each(|&v| bound_after[v] = i + 1),
                Step::Param(v) => bound_after[*v] = i + 1,
            }
        }
        let mut checks = vec![Vec::new(); steps.len() + 1];
        for c in &schema.constraints {
            let params = c.terms().into_iter().filter_map(|t| match t {
                Term::Param(v) => Some(v),
                Term::Object(_) => None,
            });
            checks[ready_at(&bound_after, params)].push(Check::Constraint(*c));
        }
        for neg in &schema.pre_neg {
            if ctx.statics.contains(usize::from(neg.predicate)) {
                checks[ready_at(&bound_after, neg.params())].push(Check::NotInitially(neg.clone()));
            }
        }

        JoinPlan {
            num_params,
            domains,
            steps,
            checks,
            empty,
        }
    }

    fn checks_hold(&self, after: usize, binding: &[Option<ObjectId>], init: &FactBase) -> bool {
        self.checks[after].iter().all(|c| match c {
            Check::Constraint(c) => c.holds(binding) == Some(true),
            Check::NotInitially(pattern) => match bind_partial(pattern, binding) {
                Some(atom) => !init.contains(&atom),
                None => true,
            },
        })
    }

    fn unbind(&self, step: usize, binding: &mut [Option<ObjectId>]) {
        match &self.steps[step] {
            Step::Atom { binds, .. } => binds.iter().for_each(|&v| binding[v] = None),
            Step::Param(v) => binding[*v] = None,
        }
    }

    /// Binds the parameters of `step` to the next consistent candidate, starting from `cursor`.
    /// Returns false if there is no such candidate.
    fn advance(&self, step: usize, cursor: &mut usize, binding: &mut [Option<ObjectId>], ctx: &JoinContext) -> bool {
        match &self.steps[step] {
            Step::Atom { pattern, binds } if binds.is_empty() => {
                if *cursor > 0 {
                    return false;
                }
                *cursor = 1;
                let atom = bind_partial(pattern, binding);
                atom.is_some_and(|a| ctx.facts.contains(&a)) && self.checks_hold(step + 1, binding, ctx.init)
            }
            Step::Atom { pattern, binds } => {
                let facts = ctx.facts.facts(pattern.predicate);
                while *cursor < facts.len() {
                    let fact = &facts[*cursor];
                    *cursor += 1;
                    if self.match_fact(pattern, fact, binding) && self.checks_hold(step + 1, binding, ctx.init) {
                        return true;
                    }
                    binds.iter().for_each(|&v| binding[v] = None);
                }
                false
            }
            Step::Param(v) => {
                let objects = &self.domains[*v].objects;
                while *cursor < objects.len() {
                    binding[*v] = Some(objects[*cursor]);
                    *cursor += 1;
                    if self.checks_hold(step + 1, binding, ctx.init) {
                        return true;
                    }
                }
                binding[*v] = None;
                false
            }
        }
    }

    fn match_fact(&self, pattern: &AtomPattern, fact: &[ObjectId], binding: &mut [Option<ObjectId>]) -> bool {
        for (&term, &o) in pattern.args.iter().zip(fact) {
            match term {
                Term::Object(expected) if expected != o => return false,
                Term::Object(_) => {}
                Term::Param(v) => match binding[v] {
                    Some(b) if b != o => return false,
                    Some(_) => {}
                    None if self.domains[v].contains(o) => binding[v] = Some(o),
                    None => return false,
                },
            }
        }
        true
    }

    /// Calls `emit` on every complete binding satisfying the plan.
    pub fn for_each_binding(
        &self,
        ctx: &JoinContext,
        progress: &Progress,
        mut emit: impl FnMut(&[ObjectId]),
    ) -> Result<(), GroundingError> {
        let mut binding = vec![None; self.num_params];
        if self.empty || !self.checks_hold(0, &binding, ctx.init) {
            return Ok(());
        }
        let n = self.steps.len();
        let mut cursors = vec![0usize; n];
        let mut complete: Vec<ObjectId> = Vec::with_capacity(self.num_params);
        let mut depth = 0;
        let mut iterations = 0u64;
        loop {
            if depth == n {
                complete.clear();
                complete.extend(binding.iter().flatten());
                debug_assert_eq!(complete.len(), self.num_params);
                emit(&complete);
                if n == 0 {
                    return Ok(());
                }
                depth -= 1;
                continue;
            }
            iterations += 1;
            if iterations % CANCELLATION_PERIOD == 0 && progress.is_cancelled() {
                return Err(GroundingError::Cancelled);
            }
            self.unbind(depth, &mut binding);
            if self.advance(depth, &mut cursors[depth], &mut binding, ctx) {
                depth += 1;
                if depth < n {
                    cursors[depth] = 0;
                }
            } else {
                cursors[depth] = 0;
                if depth == 0 {
                    return Ok(());
                }
                depth -= 1;
            }
        }
    }
}

/// Number of steps after which all the given parameters are bound.
fn ready_at(bound_after: &[usize], params: impl Iterator<Item = usize>) -> usize {
    params.map(|v| bound_after[v]).max().unwrap_or(0)
}

/// Instantiates the pattern if all its parameters are bound.
fn bind_partial(pattern: &AtomPattern, binding: &[Option<ObjectId>]) -> Option<GroundAtom> {
    let args = pattern
        .args
        .iter()
        .map(|t| t.try_resolve(binding))
        .collect::<Option<Args>>()?;
    Some(GroundAtom {
        pred: pattern.predicate,
        args,
    })
}

/// The domain of each parameter: instances of its type that also fit every predicate slot it occupies.
fn parameter_domains(schema: &ActionSchema, symbols: &SymbolTable) -> Vec<ParamDomain> {
    let mut types: Vec<SmallVec<[TypeId; 2]>> = schema.params.iter().map(|p| smallvec::smallvec![p.tpe]).collect();
    for pattern in schema.patterns() {
        let slots = &symbols.predicate_signature(pattern.predicate).slots;
        for (t, &slot) in pattern.args.iter().zip(slots) {
            if let Term::Param(v) = *t {
                if !types[v].contains(&slot) {
                    types[v].push(slot);
                }
            }
        }
    }
    types
        .into_iter()
        .map(|tpes| {
            let others = &tpes[1..];
            let objects: Vec<ObjectId> = symbols
                .instances_of(tpes[0])
                .iter()
                .copied()
                .filter(|&o| others.iter().all(|&t| symbols.is_instance(o, t)))
                .collect();
            let mut set = FixedBitSet::with_capacity(symbols.num_objects());
            objects.iter().for_each(|&o| set.insert(usize::from(o)));
            ParamDomain { objects, set }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    struct Blocks {
        symbols: SymbolTable,
        init: FactBase,
        on: PredId,
        clear: PredId,
    }

    fn blocks(n: usize) -> Blocks {
        let types = TypeHierarchy::new(vec![("block".to_string(), vec![])]).unwrap();
        let mut symbols = SymbolTable::new(types);
        let objs: Vec<ObjectId> = (0..n)
            .map(|i| symbols.add_object(&format!("b{i}"), "block").unwrap())
            .collect();
        let on = symbols.add_predicate("on", &["block", "block"]).unwrap();
        let clear = symbols.add_predicate("clear", &["block"]).unwrap();
        let mut init = FactBase::new(2);
        for w in objs.windows(2) {
            init.insert(GroundAtom::new(on, [w[0], w[1]]));
        }
        init.insert(GroundAtom::new(clear, [objs[0]]));
        Blocks {
            symbols,
            init,
            on,
            clear,
        }
    }

    fn collect(schema: &ActionSchema, b: &Blocks, joined: &FixedBitSet) -> Vec<Vec<ObjectId>> {
        let statics = FixedBitSet::with_capacity(2);
        let ctx = JoinContext {
            symbols: &b.symbols,
            facts: &b.init,
            init: &b.init,
            statics: &statics,
            joined,
        };
        let plan = JoinPlan::new(schema, &ctx);
        let mut res = Vec::new();
        plan.for_each_binding(&ctx, &Progress::new(), |args| res.push(args.to_vec()))
            .unwrap();
        res.sort();
        res
    }

    fn params(n: usize, b: &Blocks) -> Vec<Parameter> {
        let block = b.symbols.type_id("block").unwrap();
        (0..n)
            .map(|i| Parameter {
                name: format!("?x{i}"),
                tpe: block,
            })
            .collect()
    }

    #[test]
    fn type_only_parameters() {
        let b = blocks(3);
        let mut schema = ActionSchema::new("move", params(2, &b));
        schema
            .constraints
            .push(Constraint::Neq(Term::Param(0), Term::Param(1)));
        let res = collect(&schema, &b, &FixedBitSet::with_capacity(2));
        assert_eq!(res.len(), 6);
        assert!(res.iter().all(|r| r[0] != r[1]));
    }

    #[test]
    fn join_on_shared_parameter() {
        let b = blocks(4);
        // (clear ?x) (on ?x ?y)
        let mut schema = ActionSchema::new("unstack", params(2, &b));
        schema.pre_pos.push(AtomPattern {
            predicate: b.clear,
            args: smallvec![Term::Param(0)],
        });
        schema.pre_pos.push(AtomPattern {
            predicate: b.on,
            args: smallvec![Term::Param(0), Term::Param(1)],
        });
        let mut joined = FixedBitSet::with_capacity(2);
        joined.insert_range(..);
        let res = collect(&schema, &b, &joined);
        let b0 = b.symbols.object("b0").unwrap();
        let b1 = b.symbols.object("b1").unwrap();
        assert_eq!(res, vec![vec![b0, b1]]);
    }

    #[test]
    fn repeated_parameter_and_membership_test() {
        let b = blocks(3);
        // (on ?x ?y) (on ?y ?z) (on ?x ?y): the last one is a pure membership test
        let mut schema = ActionSchema::new("chain", params(3, &b));
        let on = |x, y| AtomPattern {
            predicate: b.on,
            args: smallvec![Term::Param(x), Term::Param(y)],
        };
        schema.pre_pos.extend([on(0, 1), on(1, 2), on(0, 1)]);
        let mut joined = FixedBitSet::with_capacity(2);
        joined.insert_range(..);
        assert_eq!(collect(&schema, &b, &joined).len(), 1);

        let mut looping = ActionSchema::new("loop", params(1, &b));
        looping.pre_pos.push(on(0, 0));
        assert!(collect(&looping, &b, &joined).is_empty());
    }

    #[test]
    fn cancellation() {
        let b = blocks(12);
        let schema = ActionSchema::new("big", params(5, &b));
        let statics = FixedBitSet::with_capacity(2);
        let joined = FixedBitSet::with_capacity(2);
        let ctx = JoinContext {
            symbols: &b.symbols,
            facts: &b.init,
            init: &b.init,
            statics: &statics,
            joined: &joined,
        };
        let progress = Progress::new();
        progress.cancel();
        let plan = JoinPlan::new(&schema, &ctx);
        assert_eq!(
            plan.for_each_binding(&ctx, &progress, |_| {}),
            Err(GroundingError::Cancelled)
        );
    }
}
