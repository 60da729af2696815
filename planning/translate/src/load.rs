//! Construction of a lifted [`Task`] from a parsed PDDL domain and problem.

use crate::errors::{GroundingError, Result, SymbolError, TranslateError};
use crate::symbols::*;
use crate::task::{GroundAtom, Metric, Task};
use hashbrown::HashMap;
use plan_lang::pddl::{Domain, Param, PddlFeature, Problem};
use plan_lang::sexpr::SExpr;
use plan_lang::{Message, Spanned, Sym};
use smallvec::SmallVec;

/// Name of the function accumulating action costs.
pub const TOTAL_COST: &str = "total-cost";

/// Requirements whose semantics cannot be expressed by a classical ground task.
const UNSUPPORTED_FEATURES: [PddlFeature; 4] = [
    PddlFeature::DurativeAction,
    PddlFeature::DerivedPredicates,
    PddlFeature::Preferences,
    PddlFeature::Constraints,
];

pub fn load_task(dom: &Domain, pb: &Problem) -> Result<Task> {
    let _span = tracing::span!(tracing::Level::DEBUG, "LOADING").entered();
    if dom.name.canonical_str() != pb.domain_name.canonical_str() {
        tracing::warn!(
            "problem `{}` refers to domain `{}` but was given `{}`",
            pb.problem_name,
            pb.domain_name,
            dom.name
        );
    }
    if let Some(feature) = dom.features.iter().find(|f| UNSUPPORTED_FEATURES.contains(f)) {
        return Err(TranslateError::Unsupported(format!("requirement `{feature}`")));
    }

    let types = dom
        .types
        .iter()
        .map(|t| {
            let parents = t.tpe.iter().map(|p| p.canonical_str().to_string()).collect();
            (t.symbol.canonical_str().to_string(), parents)
        })
        .collect();
    let mut symbols = SymbolTable::new(TypeHierarchy::new(types)?);

    for obj in dom.constants.iter().chain(&pb.objects) {
        let tpe = single_type(obj)?;
        symbols.add_object(obj.symbol.canonical_str(), tpe)?;
    }
    for pred in &dom.predicates {
        let slots = slot_types(&pred.args)?;
        symbols.add_predicate(pred.name.canonical_str(), &slots)?;
    }
    for fun in &dom.functions {
        if fun.name.canonical_str() == TOTAL_COST && fun.args.is_empty() {
            continue;
        }
        if let Some(tpe) = &fun.tpe {
            if tpe.canonical_str() != "number" {
                return Err(TranslateError::Unsupported(format!("object fluent `{}`", fun.name)));
            }
        }
        let slots = slot_types(&fun.args)?;
        symbols.add_function(fun.name.canonical_str(), &slots)?;
    }
    for action in &dom.actions {
        let schema = read_schema(&symbols, action)?;
        tracing::trace!(action = %schema.name, params = schema.params.len(), "schema");
        symbols.add_schema(schema)?;
    }

    let mut task = Task::new(pb.problem_name.canonical_str(), symbols);
    for fact in &pb.init {
        read_init_fact(&mut task, fact)?;
    }
    for g in &pb.goal {
        let mut literals = Vec::new();
        read_conjunction(g, &mut literals)?;
        for (positive, e) in literals {
            let atom = read_ground_atom(&task.symbols, e)?;
            task.goal.push((atom, positive));
        }
    }
    task.metric = match &pb.metric {
        None => Metric::UnitCost,
        Some(plan_lang::pddl::Metric::Minimize(e)) if is_total_cost(e) => Metric::ActionCosts,
        Some(_) => {
            return Err(TranslateError::Unsupported(
                "metrics other than `(minimize (total-cost))`".to_string(),
            ));
        }
    };
    tracing::debug!(
        objects = task.symbols.num_objects(),
        predicates = task.symbols.num_predicates(),
        schemas = task.symbols.num_schemas(),
        init = task.init.len(),
        goals = task.goal.len(),
        "loaded task"
    );
    Ok(task)
}

fn single_type(symbol: &Param) -> Result<&str> {
    match symbol.tpe.as_slice() {
        [] => Ok(OBJECT_TYPE),
        [tpe] => Ok(tpe.canonical_str()),
        _ => Err(TranslateError::Unsupported(format!(
            "`either` type for `{}`",
            symbol.symbol
        ))),
    }
}

fn slot_types(args: &[Param]) -> Result<Vec<&str>> {
    args.iter().map(single_type).collect()
}

fn is_total_cost(e: &SExpr) -> bool {
    e.as_application(TOTAL_COST).is_some_and(|args| args.is_empty())
}

/// Flattens nested `and`s into a list of possibly negated expressions.
fn read_conjunction<'a>(e: &'a SExpr, out: &mut Vec<(bool, &'a SExpr)>) -> Result<()> {
    if let Some(l) = e.as_list() {
        if l.is_empty() {
            return Ok(()); // empty conjunction
        }
    }
    if let Some(conjuncts) = e.as_application("and") {
        for c in conjuncts {
            read_conjunction(c, out)?;
        }
        return Ok(());
    }
    for unsupported in ["or", "forall", "exists", "imply", "when"] {
        if e.as_application(unsupported).is_some() {
            return Err(e.invalid(format!("`{unsupported}` is not supported")).into());
        }
    }
    if let Some(negated) = e.as_application("not") {
        match negated {
            [inner] => out.push((false, inner)),
            _ => return Err(e.invalid("`not` expects a single argument").into()),
        }
    } else {
        out.push((true, e));
    }
    Ok(())
}

/// Splits an application into its head symbol and arguments.
fn application(e: &SExpr) -> std::result::Result<(&Sym, &[SExpr]), Message> {
    let l = e.as_list().ok_or_else(|| e.invalid("expected an atom of the form `(pred args..)`"))?;
    let head = l.iter().pop_atom()?;
    let args = e.as_application(head.canonical_str()).unwrap_or(&[]);
    Ok((head, args))
}

fn symbol_arg(e: &SExpr) -> std::result::Result<&Sym, Message> {
    e.as_atom().ok_or_else(|| e.invalid("expected a symbol"))
}

struct SchemaReader<'a> {
    symbols: &'a SymbolTable,
    name: String,
    params: HashMap<&'a str, usize>,
}

impl SchemaReader<'_> {
    fn term(&self, e: &SExpr) -> Result<Term> {
        let sym = symbol_arg(e)?;
        let name = sym.canonical_str();
        if name.starts_with('?') {
            self.params
                .get(name)
                .map(|&i| Term::Param(i))
                .ok_or_else(|| {
                    GroundingError::UnboundParameter {
                        schema: self.name.clone(),
                        parameter: name.to_string(),
                    }
                    .into()
                })
        } else {
            Ok(Term::Object(self.symbols.object(name)?))
        }
    }

    fn terms(&self, args: &[SExpr]) -> Result<SmallVec<[Term; 4]>> {
        args.iter().map(|a| self.term(a)).collect()
    }

    fn pattern(&self, e: &SExpr) -> Result<AtomPattern> {
        let (head, args) = application(e)?;
        Ok(AtomPattern {
            predicate: self.symbols.predicate(head.canonical_str())?,
            args: self.terms(args)?,
        })
    }

    fn cost(&self, e: &SExpr) -> Result<CostExpr> {
        if let Some(atom) = e.as_atom() {
            return Ok(CostExpr::Const(parse_cost(atom)?));
        }
        let (head, args) = application(e)?;
        if head.canonical_str() == "+" {
            let elems = args.iter().map(|a| self.cost(a)).collect::<Result<Vec<_>>>()?;
            return Ok(CostExpr::Sum(elems));
        }
        let fun = self.symbols.function(head.canonical_str())?;
        Ok(CostExpr::Function(fun, self.terms(args)?))
    }
}

fn parse_cost(atom: &Sym) -> std::result::Result<i64, Message> {
    let text = atom.canonical_str();
    if let Ok(i) = text.parse::<i64>() {
        return Ok(i);
    }
    match text.parse::<f64>() {
        Ok(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
        Ok(_) => Err(atom.invalid("action costs must be integers")),
        Err(_) => Err(atom.invalid("expected a number")),
    }
}

fn read_schema(symbols: &SymbolTable, action: &plan_lang::pddl::Action) -> Result<ActionSchema> {
    let mut params = Vec::with_capacity(action.args.len());
    let mut ids = HashMap::with_capacity(action.args.len());
    for (i, arg) in action.args.iter().enumerate() {
        let tpe = symbols.type_id(single_type(arg)?)?;
        params.push(Parameter {
            name: arg.symbol.canonical_str().to_string(),
            tpe,
        });
        ids.insert(arg.symbol.canonical_str(), i);
    }
    let reader = SchemaReader {
        symbols,
        name: action.name.canonical_str().to_string(),
        params: ids,
    };
    let mut schema = ActionSchema::new(reader.name.clone(), params);

    let mut literals = Vec::new();
    for pre in &action.pre {
        read_conjunction(pre, &mut literals)?;
    }
    for (positive, e) in literals {
        if let Some(args) = e.as_application("=") {
            let [a, b] = args else {
                return Err(e.invalid("equality expects two arguments").into());
            };
            let (a, b) = (reader.term(a)?, reader.term(b)?);
            schema.constraints.push(match positive {
                true => Constraint::Eq(a, b),
                false => Constraint::Neq(a, b),
            });
        } else if positive {
            schema.pre_pos.push(reader.pattern(e)?);
        } else {
            schema.pre_neg.push(reader.pattern(e)?);
        }
    }

    let mut effects = Vec::new();
    for eff in &action.eff {
        read_conjunction(eff, &mut effects)?;
    }
    let mut costs = Vec::new();
    for (positive, e) in effects {
        if let Some(args) = e.as_application("increase") {
            match args {
                [target, value] if is_total_cost(target) => costs.push(reader.cost(value)?),
                _ => return Err(e.invalid("only `(increase (total-cost) ..)` is supported").into()),
            }
        } else if positive {
            schema.add.push(reader.pattern(e)?);
        } else {
            schema.del.push(reader.pattern(e)?);
        }
    }
    schema.cost = match costs.len() {
        0 => CostExpr::zero(),
        1 => costs.remove(0),
        _ => CostExpr::Sum(costs),
    };
    Ok(schema)
}

fn read_ground_atom(symbols: &SymbolTable, e: &SExpr) -> Result<GroundAtom> {
    let (head, args) = application(e)?;
    let pred = symbols.predicate(head.canonical_str())?;
    let objects = read_objects(symbols, args)?;
    check_signature(symbols, symbols.predicate_signature(pred), &objects)?;
    Ok(GroundAtom { pred, args: objects })
}

fn read_objects(symbols: &SymbolTable, args: &[SExpr]) -> Result<Args> {
    args.iter()
        .map(|a| -> Result<ObjectId> { Ok(symbols.object(symbol_arg(a)?.canonical_str())?) })
        .collect()
}

fn check_signature(symbols: &SymbolTable, signature: &Signature, args: &[ObjectId]) -> Result<()> {
    if args.len() != signature.arity() {
        return Err(SymbolError::ArityMismatch {
            symbol: signature.name.clone(),
            expected: signature.arity(),
            found: args.len(),
        }
        .into());
    }
    for (&o, &slot) in args.iter().zip(&signature.slots) {
        if !symbols.is_instance(o, slot) {
            return Err(SymbolError::TypeMismatch {
                object: symbols.object_name(o).to_string(),
                expected: symbols.types().name(slot).to_string(),
            }
            .into());
        }
    }
    Ok(())
}

fn read_init_fact(task: &mut Task, fact: &SExpr) -> Result<()> {
    let Some(args) = fact.as_application("=") else {
        if fact.as_application("not").is_some() {
            return Err(fact.invalid("negative facts are not allowed in the initial state").into());
        }
        let atom = read_ground_atom(&task.symbols, fact)?;
        task.init.push(atom);
        return Ok(());
    };
    let [fun, value] = args else {
        return Err(fact.invalid("expected a function assignment `(= (f args..) value)`").into());
    };
    if is_total_cost(fun) {
        return Ok(());
    }
    let (head, fun_args) = application(fun)?;
    let f = task.symbols.function(head.canonical_str())?;
    let objects = read_objects(&task.symbols, fun_args)?;
    check_signature(&task.symbols, task.symbols.function_signature(f), &objects)?;
    let value = parse_cost(symbol_arg(value)?)?;
    task.static_values.insert((f, objects), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plan_lang::Input;
    use plan_lang::pddl::{parse_pddl_domain, parse_pddl_problem};

    const DOMAIN: &str = "
(define (domain transport)
  (:requirements :strips :typing :negative-preconditions :action-costs)
  (:types truck - vehicle location)
  (:constants depot - location)
  (:predicates (at ?v - vehicle ?l - location) (road ?from ?to - location) (busy ?v - vehicle))
  (:functions (distance ?from ?to - location) - number (total-cost) - number)
  (:action drive
    :parameters (?v - truck ?from ?to - location)
    :precondition (and (at ?v ?from) (road ?from ?to) (not (busy ?v)) (not (= ?from ?to)))
    :effect (and (not (at ?v ?from)) (at ?v ?to) (increase (total-cost) (distance ?from ?to)))))";

    const PROBLEM: &str = "
(define (problem p) (:domain transport)
  (:objects t1 - truck a b - location)
  (:init (at t1 depot) (road depot a) (road a b) (= (distance depot a) 3) (= (distance a b) 4) (= (total-cost) 0))
  (:goal (and (at t1 b) (not (busy t1))))
  (:metric minimize (total-cost)))";

    fn load(dom: &str, pb: &str) -> Result<Task> {
        let dom = parse_pddl_domain(Input::from_string(dom))?;
        let pb = parse_pddl_problem(Input::from_string(pb))?;
        load_task(&dom, &pb)
    }

    #[test]
    fn load_transport() {
        let task = load(DOMAIN, PROBLEM).unwrap();
        let s = &task.symbols;
        assert_eq!(s.num_objects(), 4);
        assert_eq!(task.init.len(), 3);
        assert_eq!(task.static_values.len(), 2);
        assert_eq!(task.goal.len(), 2);
        assert!(!task.goal[1].1);
        assert_eq!(task.metric, Metric::ActionCosts);

        let drive = s.schema(s.schema_id("drive").unwrap());
        assert_eq!(drive.params.len(), 3);
        assert_eq!(drive.pre_pos.len(), 2);
        assert_eq!(drive.pre_neg.len(), 1);
        assert_eq!(drive.constraints, vec![Constraint::Neq(Term::Param(1), Term::Param(2))]);
        assert_eq!(drive.add.len(), 1);
        assert_eq!(drive.del.len(), 1);
        assert!(matches!(drive.cost, CostExpr::Function(_, _)));
        let distance = s.function("distance").unwrap();
        let depot = s.object("depot").unwrap();
        let a = s.object("a").unwrap();
        assert_eq!(task.function_value(distance, &[depot, a]), Some(3));
    }

    #[test]
    fn undeclared_symbols() {
        let pb = PROBLEM.replace("(at t1 b)", "(at t2 b)");
        assert!(matches!(
            load(DOMAIN, &pb),
            Err(TranslateError::Symbol(SymbolError::UndeclaredObject(o))) if o == "t2"
        ));
        let dom = DOMAIN.replace("(at ?v ?to)", "(at ?w ?to)");
        assert!(matches!(
            load(&dom, PROBLEM),
            Err(TranslateError::Grounding(GroundingError::UnboundParameter { .. }))
        ));
        let dom = DOMAIN.replace("(road ?from ?to) (not", "(path ?from ?to) (not");
        assert!(matches!(
            load(&dom, PROBLEM),
            Err(TranslateError::Symbol(SymbolError::UndeclaredPredicate(_)))
        ));
    }

    #[test]
    fn mistyped_initial_fact() {
        let pb = PROBLEM.replace("(at t1 depot)", "(at a depot)");
        assert!(matches!(
            load(DOMAIN, &pb),
            Err(TranslateError::Symbol(SymbolError::TypeMismatch { .. }))
        ));
    }

    #[test]
    fn unsupported_constructs() {
        let dom = DOMAIN.replace("(not (busy ?v))", "(or (busy ?v) (road ?to ?from))");
        assert!(matches!(load(&dom, PROBLEM), Err(TranslateError::Parse(_))));
        let pb = PROBLEM.replace("(:metric minimize (total-cost))", "(:metric maximize (total-cost))");
        assert!(matches!(load(DOMAIN, &pb), Err(TranslateError::Unsupported(_))));
        let pb = PROBLEM.replace("(:metric minimize (total-cost))", "");
        assert_eq!(load(DOMAIN, &pb).unwrap().metric, Metric::UnitCost);
        let dom = DOMAIN.replace(":action-costs)", ":action-costs :derived-predicates)");
        assert!(matches!(
            load(&dom, PROBLEM),
            Err(TranslateError::Unsupported(msg)) if msg.contains(":derived-predicates")
        ));
    }
}
