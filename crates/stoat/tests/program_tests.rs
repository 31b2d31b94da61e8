// Program::compile tests — construction-time visibility and partition checks

use stoat::op::{Add, AddConst, ConstFill, Identity, LessOrEqual};
use stoat::prelude::*;

fn counting_condition() -> Sequence {
    Sequence::new(vec![
        Step::op(AddConst::new("counter", 1.0)),
        Step::op(LessOrEqual::new("counter", "n", "keep_going")),
    ])
}

#[test]
fn test_toplevel_read_before_write_rejected() {
    let seq = Sequence::new(vec![Step::op(Identity::new("ghost", "out"))]);
    assert!(matches!(
        Program::compile(seq, &[]),
        Err(Error::UndefinedInput { .. })
    ));
}

#[test]
fn test_toplevel_write_then_read_accepted() {
    let seq = Sequence::new(vec![
        Step::op(ConstFill::scalar("a", 1.0)),
        Step::op(Identity::new("a", "b")),
    ]);
    assert!(Program::compile(seq, &[]).is_ok());
}

#[test]
fn test_promised_inputs_satisfy_reads() {
    let seq = Sequence::new(vec![Step::op(Identity::new("x", "y"))]);
    assert!(Program::compile(seq, &["x"]).is_ok());
}

#[test]
fn test_nested_write_must_be_classified() {
    // "stray" is neither external nor local to the construct
    let then_seq = Sequence::new(vec![Step::op(ConstFill::scalar("stray", 1.0))]);
    let seq = Sequence::new(vec![Step::Cond(Cond::new(
        "flag",
        then_seq,
        None,
        ["flag"],
        Vec::<String>::new(),
    ))]);
    assert!(Program::compile(seq, &["flag"]).is_err());
}

#[test]
fn test_nested_read_outside_partition_rejected() {
    // "x" is fed at top level but not declared external to the construct
    let then_seq = Sequence::new(vec![Step::op(Identity::new("x", "tmp"))]);
    let seq = Sequence::new(vec![Step::Cond(Cond::new(
        "flag",
        then_seq,
        None,
        ["flag"],
        ["tmp"],
    ))]);
    assert!(matches!(
        Program::compile(seq, &["x", "flag"]),
        Err(Error::UndefinedInput { name }) if name == "x"
    ));
}

#[test]
fn test_partition_conflict_within_one_construct() {
    let then_seq = Sequence::new(vec![Step::op(ConstFill::scalar("v", 1.0))]);
    let seq = Sequence::new(vec![Step::Cond(Cond::new(
        "flag",
        then_seq,
        None,
        ["flag", "v"],
        ["v"],
    ))]);
    assert!(matches!(
        Program::compile(seq, &["flag", "v"]),
        Err(Error::PartitionConflict { name }) if name == "v"
    ));
}

#[test]
fn test_partition_conflict_across_siblings() {
    // First construct treats "v" as external, its sibling as local
    let first = Cond::new(
        "flag",
        Sequence::new(vec![Step::op(ConstFill::scalar("v", 1.0))]),
        None,
        ["flag", "v"],
        Vec::<String>::new(),
    );
    let second = Cond::new(
        "flag",
        Sequence::new(vec![Step::op(ConstFill::scalar("v", 2.0))]),
        None,
        ["flag"],
        ["v"],
    );
    let seq = Sequence::new(vec![Step::Cond(first), Step::Cond(second)]);
    assert!(matches!(
        Program::compile(seq, &["flag", "v"]),
        Err(Error::PartitionConflict { name }) if name == "v"
    ));
}

#[test]
fn test_same_classification_across_siblings_accepted() {
    let first = Cond::new(
        "flag",
        Sequence::new(vec![Step::op(ConstFill::scalar("v", 1.0))]),
        None,
        ["flag"],
        ["v"],
    );
    let second = Cond::new(
        "flag",
        Sequence::new(vec![Step::op(ConstFill::scalar("v", 2.0))]),
        None,
        ["flag"],
        ["v"],
    );
    let seq = Sequence::new(vec![Step::Cond(first), Step::Cond(second)]);
    assert!(Program::compile(seq, &["flag"]).is_ok());
}

#[test]
fn test_loop_condition_must_write_its_blob() {
    // The condition sequence never produces "keep_going"
    let cond = Sequence::new(vec![Step::op(AddConst::new("counter", 1.0))]);
    let seq = Sequence::new(vec![Step::Loop(Loop::new(
        cond,
        "keep_going",
        Sequence::new(vec![Step::op(AddConst::new("counter", 1.0))]),
        ["counter"],
        ["keep_going"],
        Vec::<String>::new(),
    ))]);
    assert!(Program::compile(seq, &["counter"]).is_err());
}

#[test]
fn test_loop_partition_spans_both_local_sets() {
    // "scratch" is a condition local in the loop and an external in a
    // sibling construct
    let l = Loop::new(
        counting_condition(),
        "keep_going",
        Sequence::new(vec![Step::op(Add::new("sum", "counter", "sum"))]),
        ["counter", "n", "sum"],
        ["keep_going"],
        ["scratch"],
    );
    let c = Cond::new(
        "flag",
        Sequence::new(vec![Step::op(ConstFill::scalar("scratch", 1.0))]),
        None,
        ["flag", "scratch"],
        Vec::<String>::new(),
    );
    let seq = Sequence::new(vec![Step::Loop(l), Step::Cond(c)]);
    assert!(matches!(
        Program::compile(seq, &["counter", "n", "sum", "flag", "scratch"]),
        Err(Error::PartitionConflict { name }) if name == "scratch"
    ));
}

#[test]
fn test_externals_must_be_defined_before_construct() {
    let then_seq = Sequence::new(vec![Step::op(ConstFill::scalar("acc", 1.0))]);
    let seq = Sequence::new(vec![Step::Cond(Cond::new(
        "flag",
        then_seq,
        None,
        ["flag", "acc"],
        Vec::<String>::new(),
    ))]);
    // "acc" is promised nowhere
    assert!(matches!(
        Program::compile(seq, &["flag"]),
        Err(Error::UndefinedInput { name }) if name == "acc"
    ));
}
