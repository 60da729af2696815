use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;

use dp_model::{Assignment, Condition, Model, State, TransitionId};
use fixedbitset::FixedBitSet;
use plan_lang::Input;
use plan_lang::pddl::{parse_pddl_domain, parse_pddl_problem};
use plan_lang::sas::parse_sas;
use plan_translate::config::{EncodingKind, Reachability, TranslateOptions};
use plan_translate::encode::{NONE_OF_THOSE, VarKind};
use plan_translate::errors::{ModelError, Result, SymbolError, TranslateError};
use plan_translate::ground::GroundTask;
use plan_translate::task::AtomId;
use plan_translate::{Translation, translate_pddl, translate_sas};

fn data(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data").join(file)
}

fn read(file: &str) -> Input {
    Input::from_file(&data(file)).unwrap()
}

fn translate(dom: &str, pb: &str, options: &TranslateOptions) -> Result<Translation> {
    let dom = parse_pddl_domain(Input::from_string(dom))?;
    let pb = parse_pddl_problem(Input::from_string(pb))?;
    translate_pddl(&dom, &pb, options)
}

fn blocks(options: &TranslateOptions) -> Translation {
    let dom = parse_pddl_domain(read("blocks.dom.pddl")).unwrap();
    let pb = parse_pddl_problem(read("blocks.pb.pddl")).unwrap();
    translate_pddl(&dom, &pb, options).unwrap()
}

fn options(encoding: EncodingKind) -> TranslateOptions {
    TranslateOptions::default().with_encoding(encoding).with_threads(2)
}

fn atoms_of(state: &FixedBitSet) -> Vec<AtomId> {
    state.ones().map(AtomId::from).collect()
}

/// All states reachable from the initial state of the ground task.
fn reachable_states(task: &GroundTask) -> Vec<FixedBitSet> {
    let init = task.initial_state();
    let mut seen = HashSet::from([init.clone()]);
    let mut queue = VecDeque::from([init]);
    let mut states = Vec::new();
    while let Some(s) = queue.pop_front() {
        for a in task.actions.iter().filter(|a| task.is_applicable(a, &s)) {
            let next = task.successor(a, &s);
            if seen.insert(next.clone()) {
                queue.push_back(next);
            }
        }
        states.push(s);
    }
    states
}

fn transitions_by_name(model: &Model) -> HashMap<&str, TransitionId> {
    model
        .transitions()
        .map(|t| (model.transition(t).name.as_str(), t))
        .collect()
}

#[test]
fn blocks_ground_actions_are_well_typed_and_distinct() {
    let translation = blocks(&options(EncodingKind::Invariant));
    let lifted = translation.lifted.as_ref().unwrap();
    let ground = translation.ground.as_ref().unwrap();
    let block = lifted.symbols.type_id("block").unwrap();

    let mut names = HashSet::new();
    for a in &ground.actions {
        let schema = lifted.symbols.schema(a.schema);
        assert_eq!(schema.params.len(), a.args.len());
        for (param, &obj) in schema.params.iter().zip(&a.args) {
            assert_eq!(param.tpe, block);
            assert!(lifted.symbols.is_instance(obj, param.tpe));
        }
        assert!(names.insert(a.name.clone()), "duplicate action {}", a.name);
    }
    assert!(names.contains("(unstack a b)"));
    assert!(names.contains("(pick-up c)"));
    assert!(ground.actions.iter().all(|a| a.cost == 1));
}

#[test]
fn every_atom_has_exactly_one_value() {
    for encoding in [EncodingKind::Direct, EncodingKind::Invariant] {
        let translation = blocks(&options(encoding));
        let ground = translation.ground.as_ref().unwrap();
        let enc = &translation.encoding;
        enc.check_partition().unwrap();
        for atom in ground.atoms.ids() {
            let fact = enc.fact(atom).unwrap();
            let owners = enc
                .vars()
                .filter(|(_, v)| v.members.contains(&atom))
                .map(|(var, _)| var)
                .collect::<Vec<_>>();
            assert_eq!(owners, vec![fact.var]);
        }
    }
}

#[test]
fn invariant_encoding_of_blocks() {
    let translation = blocks(&options(EncodingKind::Invariant));
    let ground = translation.ground.as_ref().unwrap();
    let enc = &translation.encoding;
    assert!(translation.stats.mutex_groups > 0);
    assert!(enc.num_vars() < ground.num_atoms());
    assert!(enc.vars().any(|(_, v)| matches!(v.kind, VarKind::Group { .. })));
    assert_eq!(translation.model.num_variables(), enc.num_vars());

    let direct = blocks(&options(EncodingKind::Direct));
    assert_eq!(direct.encoding.num_vars(), direct.ground.as_ref().unwrap().num_atoms());
    assert_eq!(direct.stats.mutex_groups, 0);
}

#[test]
fn encode_then_decode_reachable_states() {
    for encoding in [EncodingKind::Direct, EncodingKind::Invariant] {
        let translation = blocks(&options(encoding));
        let ground = translation.ground.as_ref().unwrap();
        let enc = &translation.encoding;
        let states = reachable_states(ground);
        assert!(states.len() > 1);
        for s in &states {
            let atoms = atoms_of(s);
            let encoded = enc.encode_state(&atoms).unwrap();
            assert_eq!(enc.decode_state(&encoded), atoms);
            assert_eq!(enc.encode_state(&enc.decode_state(&encoded)).unwrap(), encoded);
        }
        assert_eq!(
            &enc.encode_state(&ground.init).unwrap(),
            translation.model.initial_state()
        );
    }
}

/// Checks that the model behaves as the ground task on every reachable state.
fn assert_transitions_mirror(translation: &Translation) {
    let ground = translation.ground.as_ref().unwrap();
    let enc = &translation.encoding;
    let model = &translation.model;
    let by_name = transitions_by_name(model);
    assert_eq!(
        model.num_transitions() + translation.stats.discarded_transitions,
        ground.actions.len()
    );

    for s in reachable_states(ground) {
        let atoms = atoms_of(&s);
        let encoded = enc.encode_state(&atoms).unwrap();
        assert_eq!(enc.decode_state(&encoded), atoms);
        assert_eq!(model.is_base(&encoded), ground.is_goal(&s));
        for a in &ground.actions {
            let applicable = ground.is_applicable(a, &s);
            match by_name.get(a.name.as_str()) {
                Some(&t) => {
                    let transition = model.transition(t);
                    assert_eq!(transition.is_applicable(&encoded), applicable, "{}", a.name);
                    if applicable {
                        let expected = enc.encode_state(&atoms_of(&ground.successor(a, &s))).unwrap();
                        assert_eq!(transition.apply(&encoded), expected, "{}", a.name);
                        assert_eq!(transition.cost, a.cost);
                    }
                }
                None => assert!(!applicable, "discarded action {} is applicable", a.name),
            }
        }
    }
}

#[test]
fn transitions_mirror_ground_actions() {
    for encoding in [EncodingKind::Direct, EncodingKind::Invariant] {
        assert_transitions_mirror(&blocks(&options(encoding)));
    }
}

#[test]
fn static_reachability_keeps_more_actions() {
    let relaxed = blocks(&options(EncodingKind::Direct));
    let static_ = blocks(&options(EncodingKind::Direct).with_reachability(Reachability::Static));
    assert!(static_.stats.ground_actions >= relaxed.stats.ground_actions);
    assert_eq!(static_.stats.ground_actions, 3 + 3 + 9 + 9);
}

#[test]
fn model_dump_lists_transitions() {
    let translation = blocks(&options(EncodingKind::Invariant).with_bound(Some(20)));
    assert_eq!(translation.model.bound(), Some(20));
    let dump = translation.model.to_string();
    assert!(dump.contains("(unstack a b)"));
    assert!(!translation.model.is_trivially_unsolvable());
}

const STACKING_DOMAIN: &str = "
(define (domain stacking)
  (:requirements :strips :typing :negative-preconditions :equality)
  (:types block)
  (:predicates (on ?x - block ?y - block))
  (:action move
    :parameters (?x - block ?y - block)
    :precondition (and (not (on ?x ?y)) (not (= ?x ?y)))
    :effect (on ?x ?y)))";

const STACKING_PROBLEM: &str = "
(define (problem stacking-3) (:domain stacking)
  (:objects a b c - block)
  (:init (on c a))
  (:goal (on a b)))";

#[test]
fn distinct_parameters_yield_six_moves() {
    for reachability in [Reachability::Static, Reachability::Relaxed] {
        let opts = options(EncodingKind::Direct).with_reachability(reachability);
        let translation = translate(STACKING_DOMAIN, STACKING_PROBLEM, &opts).unwrap();
        let ground = translation.ground.as_ref().unwrap();
        assert_eq!(ground.actions.len(), 6);
        assert!(ground.actions.iter().all(|a| a.args[0] != a.args[1]));
        let names: HashSet<&str> = ground.actions.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names.len(), 6);
        assert!(names.contains("(move a b)"));
        assert!(!names.contains("(move a a)"));
    }
}

const ROBOT_DOMAIN: &str = "
(define (domain robot)
  (:requirements :strips :typing :equality)
  (:types robot location)
  (:predicates (at ?r - robot ?l - location) (visited ?l - location))
  (:action move
    :parameters (?r - robot ?from - location ?to - location)
    :precondition (and (at ?r ?from) (not (= ?from ?to)))
    :effect (and (at ?r ?to) (not (at ?r ?from)))))";

const ROBOT_PROBLEM: &str = "
(define (problem robot-3) (:domain robot)
  (:objects r - robot l1 l2 l3 - location)
  (:init (at r l1))
  (:goal (at r l3)))";

#[test]
fn locations_form_one_variable() {
    let translation = translate(ROBOT_DOMAIN, ROBOT_PROBLEM, &options(EncodingKind::Invariant)).unwrap();
    let ground = translation.ground.as_ref().unwrap();
    let model = &translation.model;
    assert_eq!(ground.num_atoms(), 3);
    assert_eq!(model.num_variables(), 1);
    let (var, v) = translation.encoding.vars().next().unwrap();
    assert_eq!(v.kind, VarKind::Group { exhaustive: true });
    assert_eq!(v.labels, vec!["(at r l1)", "(at r l2)", "(at r l3)"]);
    assert_eq!(model.initial_state().get(var), 0);

    // moving to l2 sets the variable, which removes (at r l1) without any explicit assignment for it
    let by_name = transitions_by_name(model);
    let t = model.transition(by_name["(move r l1 l2)"]);
    assert_eq!(t.preconditions, vec![Condition::Eq(var, 0)]);
    assert_eq!(t.effects.len(), 1);
    let next = t.apply(model.initial_state());
    assert_eq!(next.get(var), 1);
    let l2 = translation.encoding.decode_state(&next);
    assert_eq!(l2.len(), 1);
    assert_eq!(ground.atom_name(l2[0]), "(at r l2)");
    assert_eq!(model.base_cases(), &[vec![Condition::Eq(var, 2)]]);
}

const CRASHING_ROBOT_DOMAIN: &str = "
(define (domain crashing-robot)
  (:requirements :strips :typing :equality :negative-preconditions)
  (:types robot location)
  (:predicates (at ?r - robot ?l - location) (broken ?r - robot))
  (:action move
    :parameters (?r - robot ?from - location ?to - location)
    :precondition (and (at ?r ?from) (not (= ?from ?to)))
    :effect (and (at ?r ?to) (not (at ?r ?from))))
  (:action crash
    :parameters (?r - robot ?l - location)
    :precondition (at ?r ?l)
    :effect (and (not (at ?r ?l)) (broken ?r)))
  (:action trip
    :parameters (?r - robot ?l - location)
    :precondition (not (at ?r ?l))
    :effect (broken ?r)))";

#[test]
fn removable_robot_has_a_none_value() {
    let translation = translate(CRASHING_ROBOT_DOMAIN, ROBOT_PROBLEM, &options(EncodingKind::Invariant)).unwrap();
    let ground = translation.ground.as_ref().unwrap();
    let enc = &translation.encoding;
    let model = &translation.model;
    assert_eq!(ground.num_atoms(), 4);
    assert_eq!(model.num_variables(), 2);

    let (at, v) = enc
        .vars()
        .find(|(_, v)| matches!(v.kind, VarKind::Group { .. }))
        .unwrap();
    assert_eq!(v.kind, VarKind::Group { exhaustive: false });
    assert_eq!(v.labels, vec!["(at r l1)", "(at r l2)", "(at r l3)", NONE_OF_THOSE]);
    assert_eq!(v.domain_size(), 4);
    assert_eq!(enc.none_value(at), Some(3));
    let (broken, v) = enc.vars().find(|(_, v)| v.kind == VarKind::Direct).unwrap();
    assert_eq!(v.labels, vec!["(not (broken r))", "(broken r)"]);
    assert_eq!(enc.none_value(broken), Some(0));
    assert_eq!(model.initial_state().get(at), 0);
    assert_eq!(model.initial_state().get(broken), 0);

    let by_name = transitions_by_name(model);
    // the deleted location is required, so the group goes to its none value
    let crash = model.transition(by_name["(crash r l1)"]);
    assert_eq!(crash.preconditions, vec![Condition::Eq(at, 0)]);
    let mut expected = vec![Assignment::new(at, 3), Assignment::new(broken, 1)];
    expected.sort();
    assert_eq!(crash.effects, expected);
    let crashed = crash.apply(model.initial_state());
    assert_eq!(crashed.get(at), 3);
    let atoms = enc.decode_state(&crashed);
    assert_eq!(atoms.len(), 1);
    assert_eq!(ground.atom_name(atoms[0]), "(broken r)");
    assert_eq!(enc.encode_state(&atoms).unwrap(), crashed);
    assert!(!model.transition(by_name["(move r l1 l2)"]).is_applicable(&crashed));

    // moves still assign the new location only
    let mv = model.transition(by_name["(move r l1 l2)"]);
    assert_eq!(mv.preconditions, vec![Condition::Eq(at, 0)]);
    assert_eq!(mv.effects, vec![Assignment::new(at, 1)]);

    // a negative precondition on a member excludes a single value
    let trip = model.transition(by_name["(trip r l2)"]);
    assert_eq!(trip.preconditions, vec![Condition::Ne(at, 1)]);
    assert_eq!(trip.effects, vec![Assignment::new(broken, 1)]);
    assert!(trip.is_applicable(model.initial_state()));
    assert!(trip.is_applicable(&crashed));
}

#[test]
fn removable_robot_transitions_mirror_ground_actions() {
    for encoding in [EncodingKind::Direct, EncodingKind::Invariant] {
        for reachability in [Reachability::Static, Reachability::Relaxed] {
            let opts = options(encoding).with_reachability(reachability);
            let translation = translate(CRASHING_ROBOT_DOMAIN, ROBOT_PROBLEM, &opts).unwrap();
            let states = reachable_states(translation.ground.as_ref().unwrap());
            // l1, l2 or l3, with or without a trip, and crashed
            assert_eq!(states.len(), 7);
            assert_transitions_mirror(&translation);
        }
    }
}

#[test]
fn unreachable_goal_gives_unsolvable_model() {
    let pb = ROBOT_PROBLEM.replace("(:goal (at r l3))", "(:goal (and (at r l3) (visited l2)))");
    let translation = translate(ROBOT_DOMAIN, &pb, &options(EncodingKind::Invariant)).unwrap();
    assert_eq!(translation.stats.unreachable_goals, 1);
    assert!(translation.model.is_trivially_unsolvable());
    assert_eq!(translation.model.base_cases().len(), 1);
    assert!(!translation.model.is_base(translation.model.initial_state()));
}

const TRANSPORT_DOMAIN: &str = "
(define (domain transport)
  (:requirements :strips :typing :action-costs)
  (:types vehicle location)
  (:predicates (at ?v - vehicle ?l - location) (road ?from ?to - location))
  (:functions (distance ?from ?to - location) - number (total-cost) - number)
  (:action drive
    :parameters (?v - vehicle ?from ?to - location)
    :precondition (and (at ?v ?from) (road ?from ?to))
    :effect (and (not (at ?v ?from)) (at ?v ?to) (increase (total-cost) (distance ?from ?to)))))";

const TRANSPORT_PROBLEM: &str = "
(define (problem deliver) (:domain transport)
  (:objects t - vehicle depot a b - location)
  (:init (at t depot) (road depot a) (road a b) (= (distance depot a) 3) (= (distance a b) 4))
  (:goal (at t b))
  (:metric minimize (total-cost)))";

#[test]
fn costs_come_from_static_functions() {
    let translation = translate(TRANSPORT_DOMAIN, TRANSPORT_PROBLEM, &options(EncodingKind::Invariant)).unwrap();
    let model = &translation.model;
    let by_name = transitions_by_name(model);
    assert_eq!(by_name.len(), 2);
    assert_eq!(model.transition(by_name["(drive t depot a)"]).cost, 3);
    assert_eq!(model.transition(by_name["(drive t a b)"]).cost, 4);
    let plan = [by_name["(drive t depot a)"], by_name["(drive t a b)"]];
    assert_eq!(dp_model::validate_plan(model, &plan), Ok(7));
}

#[test]
fn negative_costs_are_rejected() {
    let pb = TRANSPORT_PROBLEM.replace("(= (distance a b) 4)", "(= (distance a b) -4)");
    let err = translate(TRANSPORT_DOMAIN, &pb, &options(EncodingKind::Invariant));
    assert!(matches!(
        err,
        Err(TranslateError::Model(ModelError::NegativeCost { ref action, cost: -4 })) if action == "(drive t a b)"
    ));
}

#[test]
fn cyclic_types_are_rejected() {
    let dom = "
(define (domain cyclic)
  (:requirements :strips :typing)
  (:types a - b b - a)
  (:predicates (p ?x - a)))";
    let pb = "(define (problem q) (:domain cyclic) (:objects o - a) (:init (p o)) (:goal (p o)))";
    assert!(matches!(
        translate(dom, pb, &TranslateOptions::default()),
        Err(TranslateError::Symbol(SymbolError::CyclicTypeHierarchy(_)))
    ));
}

#[test]
fn sas_blocks() {
    let task = parse_sas(read("blocks.sas")).unwrap();
    let translation = translate_sas(&task, &TranslateOptions::default()).unwrap();
    let model = &translation.model;
    assert_eq!(model.num_variables(), task.variables.len());
    assert_eq!(model.num_transitions(), task.operators.len());
    assert_eq!(model.num_variables(), 5);
    assert_eq!(model.num_transitions(), 8);
    assert_eq!(model.initial_state(), &State::new(vec![0, 1, 0, 1, 0]));
    assert!(translation.lifted.is_none());
    assert_eq!(translation.stats.atoms, 12);

    // a on b, b on the table: unstack a, put it down, pick up b and stack it on a
    let by_name = transitions_by_name(model);
    let plan = ["unstack a b", "put-down a", "pick-up b", "stack b a"].map(|n| by_name[n]);
    assert_eq!(dp_model::validate_plan(model, &plan), Ok(4));
    assert!(!model.is_base(model.initial_state()));
}

#[test]
fn sas_negative_cost() {
    let text = std::fs::read_to_string(data("blocks.sas")).unwrap();
    let text = text.replacen("0 4 0 1\n1\nend_operator", "0 4 0 1\n-1\nend_operator", 1);
    let task = parse_sas(Input::from_string(text)).unwrap();
    assert!(matches!(
        translate_sas(&task, &TranslateOptions::default()),
        Err(TranslateError::Model(ModelError::NegativeCost { cost: -1, .. }))
    ));
}

#[test]
fn sas_axioms_are_unsupported() {
    let text = std::fs::read_to_string(data("blocks.sas")).unwrap();
    let (body, num_axioms) = text.trim_end().rsplit_once('\n').unwrap();
    assert_eq!(num_axioms, "0");
    let text = format!("{body}\n1\nbegin_rule\n1\n3 0\n2 -1 0\nend_rule\n");
    let task = parse_sas(Input::from_string(text)).unwrap();
    assert_eq!(task.axioms.len(), 1);
    assert!(matches!(
        translate_sas(&task, &TranslateOptions::default()),
        Err(TranslateError::Unsupported(_))
    ));
}

#[test]
fn sas_conditional_effects_are_unsupported() {
    let text = std::fs::read_to_string(data("blocks.sas")).unwrap();
    let text = text.replacen("0 0 1 2\n", "1 3 0 0 1 2\n", 1);
    let task = parse_sas(Input::from_string(text)).unwrap();
    assert_eq!(task.operators[0].effects[0].conditions.len(), 1);
    assert!(matches!(
        translate_sas(&task, &TranslateOptions::default()),
        Err(TranslateError::Unsupported(ref msg)) if msg.contains("pick-up a")
    ));
}
