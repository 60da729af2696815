use crate::Sym;
use crate::errors::*;
use crate::input::Input;
use crate::sexpr::*;

use itertools::Itertools;
use smallvec::{SmallVec, smallvec};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

pub fn parse_pddl_domain(pb: Input) -> Res<Domain> {
    let expr = parse(pb)?;
    read_domain(expr).title("Invalid domain: Syntax error")
}
pub fn parse_pddl_problem(pb: Input) -> Res<Problem> {
    let expr = parse(pb)?;
    read_problem(expr).title("Invalid problem: Syntax error")
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PddlFeature {
    Strips,
    Typing,
    Equality,
    NegativePreconditions,
    DisjunctivePreconditions,
    UniversalPreconditions,
    ExistentialPreconditions,
    QuantifiedPreconditions,
    ConditionalEffects,
    Adl,
    DurativeAction,
    Fluents,
    NumericFluent,
    ObjectFluent,
    DerivedPredicates,
    Preferences,
    Constraints,
    ActionCosts,
}
impl std::str::FromStr for PddlFeature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ":strips" => Ok(PddlFeature::Strips),
            ":typing" => Ok(PddlFeature::Typing),
            ":equality" => Ok(PddlFeature::Equality),
            ":negative-preconditions" => Ok(PddlFeature::NegativePreconditions),
            ":disjunctive-preconditions" => Ok(PddlFeature::DisjunctivePreconditions),
            ":universal-preconditions" => Ok(PddlFeature::UniversalPreconditions),
            ":existential-preconditions" => Ok(PddlFeature::ExistentialPreconditions),
            ":quantified-preconditions" => Ok(PddlFeature::QuantifiedPreconditions),
            ":conditional-effects" => Ok(PddlFeature::ConditionalEffects),
            ":adl" => Ok(PddlFeature::Adl),
            ":durative-actions" => Ok(PddlFeature::DurativeAction),
            ":fluents" => Ok(PddlFeature::Fluents),
            ":numeric-fluents" => Ok(PddlFeature::NumericFluent),
            ":object-fluents" => Ok(PddlFeature::ObjectFluent),
            ":derived-predicates" => Ok(PddlFeature::DerivedPredicates),
            ":preferences" => Ok(PddlFeature::Preferences),
            ":constraints" => Ok(PddlFeature::Constraints),
            ":action-costs" => Ok(PddlFeature::ActionCosts),
            _ => Err(format!("Unknown feature `{s}`")),
        }
    }
}
impl Display for PddlFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let formatted = match self {
            PddlFeature::Strips => ":strips",
            PddlFeature::Typing => ":typing",
            PddlFeature::Equality => ":equality",
            PddlFeature::NegativePreconditions => ":negative-preconditions",
            PddlFeature::DisjunctivePreconditions => ":disjunctive-preconditions",
            PddlFeature::UniversalPreconditions => ":universal-preconditions",
            PddlFeature::ExistentialPreconditions => ":existential-preconditions",
            PddlFeature::QuantifiedPreconditions => ":quantified-preconditions",
            PddlFeature::ConditionalEffects => ":conditional-effects",
            PddlFeature::Adl => ":adl",
            PddlFeature::DurativeAction => ":durative-actions",
            PddlFeature::Fluents => ":fluents",
            PddlFeature::NumericFluent => ":numeric-fluents",
            PddlFeature::ObjectFluent => ":object-fluents",
            PddlFeature::DerivedPredicates => ":derived-predicates",
            PddlFeature::Preferences => ":preferences",
            PddlFeature::Constraints => ":constraints",
            PddlFeature::ActionCosts => ":action-costs",
        };
        write!(f, "{formatted}")
    }
}

#[derive(Debug, Clone)]
pub struct Domain {
    pub name: Sym,
    pub features: Vec<PddlFeature>,
    pub types: Vec<TypedSymbol>,
    pub constants: Vec<TypedSymbol>,
    pub predicates: Vec<Predicate>,
    pub functions: Vec<Function>,
    pub actions: Vec<Action>,
}
impl Display for Domain {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "# Domain : {}", self.name)?;
        write!(f, "\n# Types \n  {}", self.types.iter().format("\n  "))?;
        write!(f, "\n# Constants \n  {}", self.constants.iter().format("\n  "))?;
        write!(f, "\n# Predicates \n  {}", self.predicates.iter().format("\n  "))?;
        write!(f, "\n# Functions \n  {}", self.functions.iter().format("\n  "))?;
        write!(f, "\n# Actions \n  {}", self.actions.iter().format("\n  "))
    }
}

pub type TypedSymbol = Param;

pub type Types = SmallVec<[Sym; 1]>;

/// Parameter to a predicate, function or action
#[derive(Debug, Clone)]
pub struct Param {
    /// name of the parameter
    pub symbol: Sym,
    /// Possible types of the parameter (`object` if empty)
    pub tpe: Types,
}
impl Param {
    pub fn new_union(symbol: impl Into<Sym>, tpe: Types) -> Self {
        Self {
            symbol: symbol.into(),
            tpe,
        }
    }
}

impl Display for Param {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.tpe.as_slice() {
            [tpe] => write!(f, "{}: {}", self.symbol, tpe),
            [] => write!(f, "{}", self.symbol),
            several => write!(f, "{}: {{{}}}", self.symbol, several.iter().format(", ")),
        }
    }
}

/// A PDDL predicate, i.e., state function whose codomain is the set of booleans.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub name: Sym,
    pub args: Vec<Param>,
    pub source: Option<Span>,
}
impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.args.iter().format(", "))
    }
}

/// A PDDL function, i.e., state function whose codomain is the set of reals.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: Sym,
    pub args: Vec<Param>,
    pub tpe: Option<Sym>,
    pub source: Option<Span>,
}

impl Display for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.args.iter().format(", "))
    }
}

#[derive(Clone, Debug)]
pub struct Action {
    pub name: Sym,
    pub args: Vec<Param>,
    pub pre: Vec<SExpr>,
    pub eff: Vec<SExpr>,
    /// Span covering the entire action definition
    pub span: Span,
}

impl Display for Action {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.args.iter().format(", "))
    }
}

impl Spanned for Action {
    fn span(&self) -> Option<&Span> {
        Some(&self.span)
    }
}

/// Consume a typed list of symbols
///  - (a - loc b - loc c - loc) : symbols a, b and c of type loc
///  - (a b c - loc)  : symbols a, b and c of type loc
///  - (a b c) : symbols a b and c of type object
pub fn consume_typed_symbols(input: &mut ListIter) -> Res<Vec<TypedSymbol>> {
    let mut args = Vec::with_capacity(input.len() / 3);
    let mut untyped: Vec<Sym> = Vec::with_capacity(args.capacity());
    while !input.is_empty() {
        let next = input.pop_atom()?;
        if next.canonical_str() == "-" {
            let mut types = Types::with_capacity(1);
            let tpe = input.pop()?;
            if let Some(variants) = tpe.as_application("either") {
                for variant in variants {
                    types.push(
                        variant
                            .as_atom()
                            .cloned()
                            .ok_or_else(|| variant.invalid("expected type name"))?,
                    );
                }
            } else {
                types.push(tpe.as_atom().cloned().ok_or_else(|| tpe.invalid("expected type name"))?);
            }
            if untyped.is_empty() {
                return Err(next.invalid("type annotation without any symbol to apply to"));
            }
            args.extend(untyped.drain(..).map(|name| TypedSymbol::new_union(name, types.clone())));
        } else {
            untyped.push(next.into());
        }
    }
    // no type given, everything is an object
    args.extend(untyped.drain(..).map(|name| TypedSymbol {
        symbol: name,
        tpe: smallvec![],
    }));
    Ok(args)
}

fn read_domain(dom: SExpr) -> Res<Domain> {
    let dom = &mut dom.as_list_iter().ok_or_else(|| dom.invalid("Expected a list"))?;

    dom.pop_known_atom("define")?;

    // extract the name of the domain, of the form `(domain XXX)`
    let mut domain_name_decl = dom.pop_list()?.iter();
    domain_name_decl.pop_known_atom("domain")?;
    let name = domain_name_decl.pop_atom().title("missing name of domain")?.clone();

    let mut res = Domain {
        name,
        features: vec![],
        types: vec![],
        constants: vec![],
        predicates: vec![],
        functions: vec![],
        actions: vec![],
    };

    for current in dom {
        // a property associates a key (e.g. `:predicates`) to a value or a sequence of values
        let mut property = current
            .as_list_iter()
            .ok_or_else(|| current.invalid("expected a property list"))?;

        match property.pop_atom()?.canonical_str() {
            ":requirements" => {
                for feature in property {
                    let feature = feature
                        .as_atom()
                        .ok_or_else(|| feature.invalid("Expected feature name but got list"))?;
                    let f = PddlFeature::from_str(feature.canonical_str()).map_err(|e| feature.invalid(e))?;
                    res.features.push(f);
                }
            }
            ":predicates" => {
                for pred in property {
                    let mut pred = pred.as_list_iter().ok_or_else(|| pred.invalid("Expected a list"))?;
                    let name = pred.pop_atom()?.clone();
                    let args = consume_typed_symbols(&mut pred)?;
                    res.predicates.push(Predicate {
                        name,
                        args,
                        source: Some(pred.loc()),
                    });
                }
            }
            ":types" => {
                if !res.types.is_empty() {
                    return Err(current.invalid("More than one ':types' section definition"));
                }
                res.types = consume_typed_symbols(&mut property)?;
            }
            ":constants" => {
                if !res.constants.is_empty() {
                    return Err(current.invalid("More than one ':constants' section definition"));
                }
                res.constants = consume_typed_symbols(&mut property)?;
            }
            ":functions" => {
                while let Some(func) = property.next() {
                    // element is necessarily a function name and parameters, e.g., (road-length ?from ?to)
                    let mut func = func.as_list_iter().ok_or_else(|| func.invalid("Expected a list"))?;
                    let name = func.pop_atom()?.clone();
                    let args = consume_typed_symbols(&mut func)?;

                    // optional type annotation, e.g., (total-cost) - number
                    let tpe = if property.peek().is_some_and(|a| a.is_atom("-")) {
                        property.pop_known_atom("-")?;
                        Some(property.pop_atom().title("expected a type").cloned()?)
                    } else {
                        None
                    };
                    res.functions.push(Function {
                        name,
                        args,
                        tpe,
                        source: Some(func.loc()),
                    });
                }
            }
            ":action" => {
                let name = property.pop_atom()?.clone();
                let mut args = Vec::new();
                let mut pre = Vec::new();
                let mut eff = Vec::new();
                while !property.is_empty() {
                    let key_expr = property.pop_atom()?;
                    let value = property.pop().tag(key_expr, "No value associated to arg", None)?;
                    match key_expr.canonical_str() {
                        ":parameters" => {
                            if !args.is_empty() {
                                return Err(key_expr.invalid("Duplicated ':parameters' tag is not allowed"));
                            }
                            let mut value = value
                                .as_list_iter()
                                .ok_or_else(|| value.invalid("Expected a parameter list"))?;
                            args.extend(consume_typed_symbols(&mut value)?);
                        }
                        ":precondition" => pre.push(value.clone()),
                        ":effect" => eff.push(value.clone()),
                        _ => return Err(key_expr.invalid("unsupported key in action")),
                    }
                }
                res.actions.push(Action {
                    name,
                    args,
                    pre,
                    eff,
                    span: current.loc(),
                })
            }
            ":durative-action" => return Err(current.invalid("durative actions are not supported")),
            ":derived" => return Err(current.invalid("derived predicates are not supported")),
            ":constraints" => return Err(current.invalid("state trajectory constraints are not supported")),
            _ => return Err(current.invalid("unsupported block")),
        }
    }
    Ok(res)
}

#[derive(Clone, Debug)]
pub struct Problem {
    pub problem_name: Sym,
    pub domain_name: Sym,
    pub objects: Vec<TypedSymbol>,
    pub init: Vec<SExpr>,
    pub goal: Vec<SExpr>,
    pub metric: Option<Metric>,
}

#[derive(Clone, Debug)]
pub enum Metric {
    Minimize(SExpr),
    Maximize(SExpr),
}

impl Display for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "# Problem {} (domain: {})", &self.problem_name, &self.domain_name)?;
        write!(f, "\n# Objects \n  {}", self.objects.iter().format("\n  "))?;
        write!(f, "\n# Init \n  {}", self.init.iter().format("\n  "))?;
        write!(f, "\n# Goal \n  {}", self.goal.iter().format("\n  "))
    }
}

fn read_problem(problem: SExpr) -> Res<Problem> {
    let mut problem = problem
        .as_list_iter()
        .ok_or_else(|| problem.invalid("Expected a list"))?;
    problem.pop_known_atom("define")?;

    let mut problem_name = problem
        .pop_list()
        .title("Expected problem name definition of the form '(problem XXXXXX)'")?
        .iter();
    problem_name.pop_known_atom("problem")?;
    let problem_name = problem_name.pop_atom()?.clone();

    let mut domain_name_def = problem.pop_list()?.iter();
    domain_name_def.pop_known_atom(":domain")?;
    let domain_name = domain_name_def.pop_atom()?.clone();

    let mut res = Problem {
        problem_name,
        domain_name,
        objects: vec![],
        init: vec![],
        goal: vec![],
        metric: None,
    };

    for current in problem {
        // a property associates a key (e.g. `:objects`) to a value or a sequence of values
        let mut property = current
            .as_list_iter()
            .ok_or_else(|| current.invalid("Expected a list"))?;
        match property.pop_atom()?.canonical_str() {
            ":requirements" => {} // some IPC problems repeat the requirements of the domain
            ":objects" => res.objects.extend(consume_typed_symbols(&mut property)?),
            ":init" => res.init.extend(property.cloned()),
            ":goal" => res.goal.extend(property.cloned()),
            ":metric" => {
                let qualifier = property.pop_atom()?;
                match qualifier.canonical_str() {
                    "minimize" => res.metric = Some(Metric::Minimize(property.pop().cloned()?)),
                    "maximize" => res.metric = Some(Metric::Maximize(property.pop().cloned()?)),
                    _ => return Err(qualifier.invalid("expected `maximize` or `minimize`")),
                }
            }
            ":htn" => return Err(current.invalid("hierarchical problems are not supported")),
            ":constraints" => return Err(current.invalid("state trajectory constraints are not supported")),
            _ => return Err(current.invalid("unsupported block")),
        }
    }

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &str = "
(define (domain BLOCKS)
  (:requirements :strips :typing :equality)
  (:types block)
  (:predicates (on ?x - block ?y - block) (clear ?x - block))
  (:functions (total-cost) - number)
  (:action move
    :parameters (?x ?y - block)
    :precondition (and (clear ?x) (clear ?y) (not (= ?x ?y)))
    :effect (and (on ?x ?y) (not (clear ?y)))))";

    #[test]
    fn parse_domain() {
        let dom = parse_pddl_domain(Input::from_string(DOMAIN)).unwrap();
        assert_eq!(dom.name.canonical_str(), "blocks");
        assert_eq!(
            dom.features,
            vec![PddlFeature::Strips, PddlFeature::Typing, PddlFeature::Equality]
        );
        assert_eq!(dom.types.len(), 1);
        assert_eq!(dom.predicates.len(), 2);
        assert_eq!(dom.predicates[0].args.len(), 2);
        assert_eq!(dom.functions.len(), 1);
        assert_eq!(dom.functions[0].tpe.as_ref().map(|t| t.canonical_str()), Some("number"));
        let action = &dom.actions[0];
        assert_eq!(action.args.len(), 2);
        assert!(action.args.iter().all(|a| a.tpe[0].canonical_str() == "block"));
        assert_eq!(action.pre.len(), 1);
        assert_eq!(action.eff.len(), 1);
    }

    #[test]
    fn typed_symbols() {
        let e = parse(Input::from_string("(a b - t1 c - (either t2 t3) d)")).unwrap();
        let syms = consume_typed_symbols(&mut e.as_list_iter().unwrap()).unwrap();
        let shown = syms.iter().map(|s| s.to_string()).collect_vec();
        assert_eq!(shown, vec!["a: t1", "b: t1", "c: {t2, t3}", "d"]);
    }

    #[test]
    fn reject_unsupported_blocks() {
        let dom = "(define (domain d) (:durative-action a :parameters () :duration (= ?duration 1)))";
        assert!(parse_pddl_domain(Input::from_string(dom)).is_err());
        let dom = "(define (domain d) (:requirements :unknown-feature))";
        assert!(parse_pddl_domain(Input::from_string(dom)).is_err());
    }

    #[test]
    fn parse_problem() {
        let pb = "(define (problem p1) (:domain blocks)
           (:objects a b c - block)
           (:init (clear a) (on a b) (= (total-cost) 0))
           (:goal (and (on b a)))
           (:metric minimize (total-cost)))";
        let pb = parse_pddl_problem(Input::from_string(pb)).unwrap();
        assert_eq!(pb.problem_name.canonical_str(), "p1");
        assert_eq!(pb.domain_name.canonical_str(), "blocks");
        assert_eq!(pb.objects.len(), 3);
        assert_eq!(pb.init.len(), 3);
        assert_eq!(pb.goal.len(), 1);
        assert!(matches!(pb.metric, Some(Metric::Minimize(_))));
    }
}
