// Conditional executor tests — branch selection, scope isolation, write-through

use stoat::op::{Add, ConstFill, GreaterThan, Identity};
use stoat::prelude::*;

fn fetch_scalar(session: &Session, name: &str) -> f64 {
    session
        .fetch(name)
        .unwrap_or_else(|e| panic!("fetch '{name}' failed: {e}"))
        .as_scalar()
        .unwrap()
}

/// Flag blob computed at the top level: `flag = x > 0`.
fn flag_steps() -> Vec<Step> {
    vec![
        Step::op(ConstFill::scalar("zero", 0.0)),
        Step::op(GreaterThan::new("x", "zero", "flag")),
    ]
}

// Exactly one branch runs

#[test]
fn test_then_branch_runs_when_true() {
    let mut steps = flag_steps();
    steps.push(Step::op(ConstFill::scalar("which", 0.0)));
    steps.push(Step::Cond(Cond::new(
        "flag",
        Sequence::new(vec![Step::op(ConstFill::scalar("which", 1.0))]),
        Some(Sequence::new(vec![Step::op(ConstFill::scalar("which", 2.0))])),
        ["which"],
        Vec::<String>::new(),
    )));
    let program = Program::compile(Sequence::new(steps), &["x"]).unwrap();

    let mut session = Session::new();
    session.feed("x", Value::scalar(0.5)).unwrap();
    session.run(&program).unwrap();
    assert_eq!(fetch_scalar(&session, "which"), 1.0);
}

#[test]
fn test_else_branch_runs_when_false() {
    let mut steps = flag_steps();
    steps.push(Step::op(ConstFill::scalar("which", 0.0)));
    steps.push(Step::Cond(Cond::new(
        "flag",
        Sequence::new(vec![Step::op(ConstFill::scalar("which", 1.0))]),
        Some(Sequence::new(vec![Step::op(ConstFill::scalar("which", 2.0))])),
        ["which"],
        Vec::<String>::new(),
    )));
    let program = Program::compile(Sequence::new(steps), &["x"]).unwrap();

    let mut session = Session::new();
    session.feed("x", Value::scalar(-0.5)).unwrap();
    session.run(&program).unwrap();
    assert_eq!(fetch_scalar(&session, "which"), 2.0);
}

// Branch-local names are invisible afterwards

#[test]
fn test_branch_local_absent_after_run() {
    let mut steps = flag_steps();
    steps.push(Step::Cond(Cond::new(
        "flag",
        Sequence::new(vec![
            Step::op(ConstFill::scalar("local_blob", 42.0)),
            Step::op(Identity::new("local_blob", "local_blob")),
        ]),
        None,
        Vec::<String>::new(),
        ["local_blob"],
    )));
    let program = Program::compile(Sequence::new(steps), &["x"]).unwrap();

    let mut session = Session::new();
    session.feed("x", Value::scalar(1.0)).unwrap();
    session.run(&program).unwrap();

    assert!(matches!(
        session.fetch("local_blob"),
        Err(Error::NotFound { .. })
    ));
}

// External writes retain the outer binding's identity

#[test]
fn test_external_write_visible_after_run() {
    let mut steps = flag_steps();
    steps.push(Step::Cond(Cond::new(
        "flag",
        Sequence::new(vec![Step::op(Add::new("acc", "acc", "acc"))]),
        None,
        ["acc"],
        Vec::<String>::new(),
    )));
    let program = Program::compile(Sequence::new(steps), &["x", "acc"]).unwrap();

    let mut session = Session::new();
    session.feed("x", Value::scalar(1.0)).unwrap();
    session.feed("acc", Value::scalar(3.0)).unwrap();
    session.run(&program).unwrap();
    // acc doubled inside the branch, observed outside
    assert_eq!(fetch_scalar(&session, "acc"), 6.0);
}

// Condition false, no else: nothing happens, no error

#[test]
fn test_false_without_else_is_a_no_op() {
    let mut steps = flag_steps();
    steps.push(Step::Cond(Cond::new(
        "flag",
        Sequence::new(vec![Step::op(ConstFill::scalar("then_only", 7.0))]),
        None,
        Vec::<String>::new(),
        ["then_only"],
    )));
    let program = Program::compile(Sequence::new(steps), &["x"]).unwrap();

    let mut session = Session::new();
    session.feed("x", Value::scalar(-1.0)).unwrap();
    let trace = session.run(&program).unwrap();
    assert_eq!(trace.len(), 3);

    assert!(matches!(
        session.fetch("then_only"),
        Err(Error::NotFound { .. })
    ));
}

// Condition blob validation

#[test]
fn test_non_boolean_condition_rejected() {
    let steps = vec![Step::Cond(Cond::new(
        "flag",
        Sequence::new(vec![]),
        None,
        Vec::<String>::new(),
        Vec::<String>::new(),
    ))];
    let program = Program::compile(Sequence::new(steps), &["flag"]).unwrap();

    let mut session = Session::new();
    session.feed("flag", Value::scalar(0.5)).unwrap();
    assert!(matches!(
        session.run(&program),
        Err(Error::BadCondition { .. })
    ));
}

#[test]
fn test_vector_condition_rejected() {
    let steps = vec![Step::Cond(Cond::new(
        "flag",
        Sequence::new(vec![]),
        None,
        Vec::<String>::new(),
        Vec::<String>::new(),
    ))];
    let program = Program::compile(Sequence::new(steps), &["flag"]).unwrap();

    let mut session = Session::new();
    session
        .feed("flag", Value::from_vec(vec![1.0, 1.0]))
        .unwrap();
    assert!(matches!(
        session.run(&program),
        Err(Error::BadCondition { .. })
    ));
}

// Error inside a branch: propagates, branch scope is torn down

#[test]
fn test_branch_error_leaves_no_partial_state() {
    let mut steps = flag_steps();
    steps.push(Step::Cond(Cond::new(
        "flag",
        Sequence::new(vec![
            Step::op(ConstFill::scalar("partial", 1.0)),
            // Length mismatch: fails after 'partial' was written
            Step::op(Add::new("x", "wide", "bad")),
        ]),
        None,
        ["x", "wide"],
        ["partial", "bad"],
    )));
    let program = Program::compile(Sequence::new(steps), &["x", "wide"]).unwrap();

    let mut session = Session::new();
    session.feed("x", Value::scalar(1.0)).unwrap();
    session.feed("wide", Value::from_vec(vec![1.0, 2.0])).unwrap();

    assert!(matches!(
        session.run(&program),
        Err(Error::OperatorFailure { .. })
    ));
    // Nothing from the failed branch is visible at the top level
    assert!(session.fetch("partial").is_err());
    assert!(session.fetch("bad").is_err());
}

// Unfed promised input surfaces as UndefinedInput at run time

#[test]
fn test_missing_input_fails_at_run_time() {
    let steps = vec![Step::op(Identity::new("x", "y"))];
    let program = Program::compile(Sequence::new(steps), &["x"]).unwrap();

    let mut session = Session::new();
    assert!(matches!(
        session.run(&program),
        Err(Error::UndefinedInput { .. })
    ));
}
