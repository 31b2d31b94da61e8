use std::collections::BTreeSet;

use stoat_core::{bail, BoxedOperator, Error, Operator, Result, ScopeId, Snapshot, Workspace};

use crate::exec::cond::Cond;
use crate::exec::while_loop::Loop;
use crate::trace::{Trace, TraceEvent};

// Program — operator sequences and the construction-time visibility check
//
// A Sequence is an ordered list of steps: plain operators interleaved with
// control-flow constructs. Sequences are immutable once built and execute
// strictly in order — later steps may depend on earlier side effects through
// shared blob names, so there is no reordering and no implicit parallelism.
//
// Program::compile walks the sequence once and rejects, before anything runs:
//   - reads of names that can never be visible (UndefinedInput),
//   - writes inside a construct to names outside its external/local partition,
//   - a name classified external in one construct and local in a sibling
//     (PartitionConflict).
// The same visibility rule is enforced again at execution time as a safety
// net; the static check just moves the failure to construction.

/// One step of a sequence.
pub enum Step {
    /// A plain operator invocation.
    Op(BoxedOperator),
    /// A conditional construct.
    Cond(Cond),
    /// A loop construct.
    Loop(Loop),
}

impl Step {
    /// Box an operator into a step.
    pub fn op(op: impl Operator + 'static) -> Step {
        Step::Op(Box::new(op))
    }
}

/// An ordered, immutable list of steps.
pub struct Sequence {
    steps: Vec<Step>,
}

impl Sequence {
    pub fn new(steps: Vec<Step>) -> Self {
        Sequence { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub(crate) fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Execute every step in order, appending one trace event per step.
    pub(crate) fn run(&self, ws: &mut Workspace, scope: ScopeId, trace: &mut Trace) -> Result<()> {
        for step in &self.steps {
            match step {
                Step::Op(op) => {
                    let inputs = run_operator(op.as_ref(), ws, scope)?;
                    trace.push(TraceEvent::Op { inputs });
                }
                Step::Cond(c) => c.run(ws, scope, trace)?,
                Step::Loop(l) => l.run(ws, scope, trace)?,
            }
        }
        Ok(())
    }
}

impl From<Vec<Step>> for Sequence {
    fn from(steps: Vec<Step>) -> Self {
        Sequence::new(steps)
    }
}

/// Runtime safety net around a single operator invocation.
///
/// Declared inputs are resolved before the operator runs, so an invisible
/// name surfaces as UndefinedInput rather than as an opaque operator error;
/// anything the operator itself reports is wrapped as OperatorFailure. The
/// resolved input values are returned for the trace — the backward pass
/// differentiates against them, not against whatever the scope holds later.
fn run_operator(op: &dyn Operator, ws: &mut Workspace, scope: ScopeId) -> Result<Snapshot> {
    let mut inputs = Snapshot::new();
    for name in op.inputs() {
        let v = ws.get(scope, &name)?.clone();
        inputs.insert(name, v);
    }
    op.run(ws, scope).map_err(|e| match e {
        e @ Error::ScopeDisposed { .. } => e,
        other => Error::OperatorFailure {
            kind: op.kind().to_string(),
            reason: other.to_string(),
        },
    })?;
    Ok(inputs)
}

/// A compiled top-level sequence, checked against the visibility rules.
pub struct Program {
    seq: Sequence,
}

impl Program {
    /// Validate a sequence given the names the caller promises to feed
    /// before running.
    pub fn compile(seq: Sequence, inputs: &[&str]) -> Result<Program> {
        let mut defined: BTreeSet<String> = inputs.iter().map(|s| s.to_string()).collect();
        check_toplevel(&seq, &mut defined)?;
        Ok(Program { seq })
    }

    pub fn sequence(&self) -> &Sequence {
        &self.seq
    }
}

/// Walk the top-level sequence. Top-level writes are unrestricted (they land
/// in the outermost scope); reads must already be defined.
fn check_toplevel(seq: &Sequence, defined: &mut BTreeSet<String>) -> Result<()> {
    let mut externs_seen = BTreeSet::new();
    let mut locals_seen = BTreeSet::new();
    for step in seq.steps() {
        match step {
            Step::Op(op) => {
                for name in op.inputs() {
                    if !defined.contains(&name) {
                        return Err(Error::UndefinedInput { name });
                    }
                }
                defined.extend(op.outputs());
            }
            Step::Cond(c) => {
                require_defined(defined, &c.cond_blob)?;
                for e in &c.externals {
                    require_defined(defined, e)?;
                }
                check_partition(&c.externals, &c.locals, &mut externs_seen, &mut locals_seen)?;
                check_nested(&c.then_seq, &c.externals, &c.locals)?;
                if let Some(else_seq) = &c.else_seq {
                    check_nested(else_seq, &c.externals, &c.locals)?;
                }
            }
            Step::Loop(l) => {
                for e in &l.externals {
                    require_defined(defined, e)?;
                }
                let locals: BTreeSet<String> =
                    l.cond_locals.union(&l.body_locals).cloned().collect();
                check_partition(&l.externals, &locals, &mut externs_seen, &mut locals_seen)?;
                let cond_writes = check_nested(&l.cond_seq, &l.externals, &l.cond_locals)?;
                if !cond_writes.contains(&l.cond_blob) {
                    bail!(
                        "loop condition sequence never writes its condition blob '{}'",
                        l.cond_blob
                    );
                }
                check_nested(&l.body_seq, &l.externals, &l.body_locals)?;
            }
        }
    }
    Ok(())
}

/// Walk a branch/body/condition sequence: reads must resolve inside the
/// partition, writes must be classified. Returns the set of names written.
fn check_nested(
    seq: &Sequence,
    externals: &BTreeSet<String>,
    locals: &BTreeSet<String>,
) -> Result<BTreeSet<String>> {
    let mut written: BTreeSet<String> = BTreeSet::new();
    let mut externs_seen = BTreeSet::new();
    let mut locals_seen = BTreeSet::new();
    let visible =
        |written: &BTreeSet<String>, name: &str| externals.contains(name) || written.contains(name);

    for step in seq.steps() {
        match step {
            Step::Op(op) => {
                for name in op.inputs() {
                    if !visible(&written, &name) {
                        return Err(Error::UndefinedInput { name });
                    }
                }
                for name in op.outputs() {
                    if !externals.contains(&name) && !locals.contains(&name) {
                        bail!("'{name}' written in a nested sequence is neither external nor local");
                    }
                    written.insert(name);
                }
            }
            Step::Cond(c) => {
                if !visible(&written, &c.cond_blob) {
                    return Err(Error::UndefinedInput {
                        name: c.cond_blob.clone(),
                    });
                }
                for e in &c.externals {
                    if !visible(&written, e) {
                        return Err(Error::UndefinedInput { name: e.clone() });
                    }
                }
                check_partition(&c.externals, &c.locals, &mut externs_seen, &mut locals_seen)?;
                check_nested(&c.then_seq, &c.externals, &c.locals)?;
                if let Some(else_seq) = &c.else_seq {
                    check_nested(else_seq, &c.externals, &c.locals)?;
                }
                // External names the construct may write count as written here
                written.extend(c.externals.iter().cloned());
            }
            Step::Loop(l) => {
                for e in &l.externals {
                    if !visible(&written, e) {
                        return Err(Error::UndefinedInput { name: e.clone() });
                    }
                }
                let nested_locals: BTreeSet<String> =
                    l.cond_locals.union(&l.body_locals).cloned().collect();
                check_partition(
                    &l.externals,
                    &nested_locals,
                    &mut externs_seen,
                    &mut locals_seen,
                )?;
                let cond_writes = check_nested(&l.cond_seq, &l.externals, &l.cond_locals)?;
                if !cond_writes.contains(&l.cond_blob) {
                    bail!(
                        "loop condition sequence never writes its condition blob '{}'",
                        l.cond_blob
                    );
                }
                check_nested(&l.body_seq, &l.externals, &l.body_locals)?;
                written.extend(l.externals.iter().cloned());
            }
        }
    }
    Ok(written)
}

/// The external/local partition is fixed at construction time: a name must
/// not be external in one sibling construct and local in another, nor both
/// within one construct.
fn check_partition(
    externals: &BTreeSet<String>,
    locals: &BTreeSet<String>,
    externs_seen: &mut BTreeSet<String>,
    locals_seen: &mut BTreeSet<String>,
) -> Result<()> {
    if let Some(name) = externals.intersection(locals).next() {
        return Err(Error::PartitionConflict { name: name.clone() });
    }
    for name in externals {
        if locals_seen.contains(name) {
            return Err(Error::PartitionConflict { name: name.clone() });
        }
    }
    for name in locals {
        if externs_seen.contains(name) {
            return Err(Error::PartitionConflict { name: name.clone() });
        }
    }
    externs_seen.extend(externals.iter().cloned());
    locals_seen.extend(locals.iter().cloned());
    Ok(())
}

fn require_defined(defined: &BTreeSet<String>, name: &str) -> Result<()> {
    if !defined.contains(name) {
        return Err(Error::UndefinedInput {
            name: name.to_string(),
        });
    }
    Ok(())
}
