use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use stoat_core::{bail, grad_name, Error, Operator, Result, ScopeId, Snapshot, Value, Workspace};

use crate::exec::cond::Cond;
use crate::exec::program::{Program, Sequence, Step};
use crate::exec::while_loop::Loop;
use crate::trace::{BranchTaken, Trace, TraceEvent};

// Gradient engine — reverse-mode replay of a forward trace
//
// The engine walks the program's steps and the trace's events together, in
// reverse. Plain operators run their backward against a shadow scope loaded
// with the input values recorded at forward time — never against the live
// bindings, which later steps may have overwritten. For a conditional, only
// the branch actually taken runs backward — the untaken branch contributes
// zero gradient and is never executed. For a loop, one backward step runs
// per forward iteration, in reverse iteration order, each against a replay
// scope rebuilt from that iteration's snapshot.
//
// Gradients of external names are pre-seeded with zeros in the enclosing
// scope before descending into a construct, so accumulation inside the
// replay scope writes through exactly like forward external writes do. A
// loop-carried blob therefore receives the sum of per-iteration
// contributions. Gradients of local names are created in the replay scope
// and die with it.
//
// Condition sequences are bookkeeping (counters, comparisons) and are not
// differentiated.

/// Gradients of `outputs` with respect to `inputs`, computed by replaying
/// `trace` backward over `program`.
///
/// Each output is seeded with a ones gradient. Inputs no gradient reached
/// report zeros of the input's shape.
pub fn backward(
    program: &Program,
    trace: &Trace,
    ws: &mut Workspace,
    outputs: &[&str],
    inputs: &[&str],
) -> Result<HashMap<String, Value>> {
    let scope = ws.root();
    for out in outputs {
        let seed = ws.get(scope, out)?.ones_like();
        ws.set(scope, &grad_name(out), seed)?;
    }

    backward_sequence(program.sequence(), trace.events(), ws, scope)?;
    debug!(outputs = outputs.len(), inputs = inputs.len(), "backward: replay complete");

    let mut grads = HashMap::new();
    for input in inputs {
        let g = match ws.get(scope, &grad_name(input)) {
            Ok(g) => g.clone(),
            Err(Error::UndefinedInput { .. }) => ws.get(scope, input)?.zeros_like(),
            Err(e) => return Err(e),
        };
        grads.insert(input.to_string(), g);
    }
    Ok(grads)
}

fn backward_sequence(
    seq: &Sequence,
    events: &[TraceEvent],
    ws: &mut Workspace,
    scope: ScopeId,
) -> Result<()> {
    if seq.len() != events.len() {
        bail!(
            "trace does not match program: {} steps, {} events",
            seq.len(),
            events.len()
        );
    }
    for (step, event) in seq.steps().iter().rev().zip(events.iter().rev()) {
        match (step, event) {
            (Step::Op(op), TraceEvent::Op { inputs }) => {
                backward_op(op.as_ref(), inputs, ws, scope)?
            }
            (
                Step::Cond(c),
                TraceEvent::Cond {
                    taken,
                    snapshot,
                    inner,
                },
            ) => backward_cond(c, *taken, snapshot.as_ref(), inner, ws, scope)?,
            (Step::Loop(l), TraceEvent::Loop { iterations }) => {
                backward_loop(l, iterations, ws, scope)?
            }
            _ => bail!("trace event does not match program step"),
        }
    }
    Ok(())
}

/// Run one operator's backward step against its point-of-use input values.
///
/// The inputs recorded in the trace event are loaded into a throwaway shadow
/// scope so the operator differentiates at the values it actually read, even
/// when a later step overwrote the live binding. Gradient bindings for the
/// inputs are seeded in the enclosing scope first, so accumulation writes
/// through instead of dying with the shadow.
fn backward_op(
    op: &dyn Operator,
    inputs: &Snapshot,
    ws: &mut Workspace,
    scope: ScopeId,
) -> Result<()> {
    for (name, value) in inputs {
        let g = grad_name(name);
        match ws.get(scope, &g) {
            Ok(_) => {}
            Err(Error::UndefinedInput { .. }) => ws.set(scope, &g, value.zeros_like())?,
            Err(e) => return Err(e),
        }
    }
    let shadow = ws.child_scope(scope, Vec::<String>::new())?;
    ws.load(shadow, inputs)?;
    let result = op.backward(ws, shadow);
    ws.dispose(shadow)?;
    result
}

fn backward_cond(
    cond: &Cond,
    taken: BranchTaken,
    snapshot: Option<&Snapshot>,
    inner: &Trace,
    ws: &mut Workspace,
    scope: ScopeId,
) -> Result<()> {
    let seq = match taken {
        BranchTaken::Then => &cond.then_seq,
        BranchTaken::Else => cond
            .else_seq
            .as_ref()
            .ok_or_else(|| Error::msg("trace took an else-branch the construct does not have"))?,
        // Nothing ran forward, nothing to differentiate
        BranchTaken::Skipped => return Ok(()),
    };
    let snapshot =
        snapshot.ok_or_else(|| Error::msg("taken branch recorded no scope snapshot"))?;

    seed_external_grads(ws, scope, &cond.externals)?;
    replay(seq, inner, snapshot, &cond.locals, ws, scope)
}

fn backward_loop(
    l: &Loop,
    iterations: &[crate::trace::Iteration],
    ws: &mut Workspace,
    scope: ScopeId,
) -> Result<()> {
    seed_external_grads(ws, scope, &l.externals)?;
    for iteration in iterations.iter().rev() {
        replay(
            &l.body_seq,
            &iteration.inner,
            &iteration.snapshot,
            &l.body_locals,
            ws,
            scope,
        )?;
    }
    Ok(())
}

/// Run one backward pass of `seq` inside a replay scope rebuilt from a
/// forward snapshot. Locals and their gradient blobs are declared in the
/// replay scope so they never leak outward; the scope is disposed on every
/// exit path.
fn replay(
    seq: &Sequence,
    inner: &Trace,
    snapshot: &Snapshot,
    locals: &BTreeSet<String>,
    ws: &mut Workspace,
    scope: ScopeId,
) -> Result<()> {
    let declared: Vec<String> = locals
        .iter()
        .flat_map(|name| [name.clone(), grad_name(name)])
        .collect();
    let child = ws.child_scope(scope, declared)?;
    ws.load(child, snapshot)?;
    let result = backward_sequence(seq, inner.events(), ws, child);
    ws.dispose(child)?;
    result
}

/// Ensure a zero gradient binding exists in the enclosing scope for every
/// external name, so accumulation in nested replay scopes writes through.
fn seed_external_grads(
    ws: &mut Workspace,
    scope: ScopeId,
    externals: &BTreeSet<String>,
) -> Result<()> {
    for name in externals {
        let g = grad_name(name);
        match ws.get(scope, &g) {
            Ok(_) => {}
            Err(Error::UndefinedInput { .. }) => {
                // Shape comes from the forward value; an external that was
                // never bound cannot receive gradient anyway
                let zeros = match ws.get(scope, name) {
                    Ok(v) => v.zeros_like(),
                    Err(_) => continue,
                };
                ws.set(scope, &g, zeros)?;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
