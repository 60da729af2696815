use std::path::PathBuf;

use plan_lang::pddl::*;
use plan_lang::{Input, Res};

fn data(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/data").join(file)
}

#[test]
fn parse_gripper() -> Res<()> {
    let domain = parse_pddl_domain(Input::from_file(&data("gripper.dom.pddl"))?)?;
    let problem = parse_pddl_problem(Input::from_file(&data("gripper.pb.pddl"))?)?;

    assert_eq!(domain.name.canonical_str(), "gripper-strips");
    assert_eq!(domain.predicates.len(), 7);
    let names: Vec<&str> = domain.actions.iter().map(|a| a.name.canonical_str()).collect();
    assert_eq!(names, vec!["move", "pick", "drop"]);

    assert_eq!(problem.domain_name, domain.name);
    assert_eq!(problem.objects.len(), 6);
    assert!(problem.objects.iter().all(|o| o.tpe.is_empty()));
    assert_eq!(problem.init.len(), 11);
    assert_eq!(problem.goal.len(), 1);
    assert!(problem.metric.is_none());
    Ok(())
}

#[test]
fn find_domain_from_problem_name() -> Res<()> {
    let domain = find_domain_of(&data("gripper.pb.pddl"))?;
    assert_eq!(domain, data("gripper.dom.pddl"));
    Ok(())
}

#[test]
fn errors_point_to_the_source() {
    let text = "(define (domain broken)\n  (:predicates (p ?x))\n  (:action a :parameters (?x) :whatever (p ?x)))";
    let err = parse_pddl_domain(Input::from_string(text)).unwrap_err();
    let rendered = format!("{err}");
    assert!(rendered.contains("Invalid domain"));
    assert!(rendered.contains("unsupported key in action"));
}
