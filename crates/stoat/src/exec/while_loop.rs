use std::collections::BTreeSet;

use tracing::{debug, trace as trace_event};

use stoat_core::{Result, ScopeId, Workspace};

use crate::exec::cond::read_condition;
use crate::exec::program::Sequence;
use crate::trace::{Iteration, Trace, TraceEvent};

// Loop — while-loop executor
//
// State machine:
//
//   AwaitingCondition → ConditionTrue  → RunBody → AwaitingCondition
//                     → ConditionFalse → Terminal
//
// The condition sequence runs in a child scope chained to the enclosing
// scope once before the first body run and once again before every
// subsequent body run; the body never executes more times than the condition
// evaluates true. Condition-side mutations of external names (a counter
// increment, typically) write through and persist into the next iteration
// and after exit.
//
// Each iteration's body runs in its own fresh child scope. After the body
// completes the scope is snapshotted for the gradient engine and disposed —
// one retained snapshot per iteration actually executed, which is the
// documented memory/iteration-count tradeoff of differentiating through an
// unbounded loop.
//
// There is no iteration cap: an always-true condition loops indefinitely by
// contract, and the engine must not silently bound it.

/// A while-loop construct: a condition sequence gating a body sequence.
pub struct Loop {
    pub(crate) cond_seq: Sequence,
    pub(crate) cond_blob: String,
    pub(crate) body_seq: Sequence,
    pub(crate) externals: BTreeSet<String>,
    pub(crate) cond_locals: BTreeSet<String>,
    pub(crate) body_locals: BTreeSet<String>,
}

impl Loop {
    /// Build a loop. `cond_seq` must write `cond_blob`; `externals` are
    /// shared with the enclosing scope, the two local sets are private to
    /// the condition and body scopes respectively.
    pub fn new<S, E, C, B>(
        cond_seq: Sequence,
        cond_blob: S,
        body_seq: Sequence,
        externals: E,
        cond_locals: C,
        body_locals: B,
    ) -> Self
    where
        S: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
        B: IntoIterator,
        B::Item: Into<String>,
    {
        Loop {
            cond_seq,
            cond_blob: cond_blob.into(),
            body_seq,
            externals: externals.into_iter().map(Into::into).collect(),
            cond_locals: cond_locals.into_iter().map(Into::into).collect(),
            body_locals: body_locals.into_iter().map(Into::into).collect(),
        }
    }

    pub(crate) fn run(
        &self,
        ws: &mut Workspace,
        scope: ScopeId,
        trace: &mut Trace,
    ) -> Result<()> {
        let mut iterations = Vec::new();
        loop {
            // AwaitingCondition: fresh scope per evaluation, condition-local
            // scratch dies here while external mutations persist
            let cond_scope = ws.child_scope(scope, self.cond_locals.iter().cloned())?;
            let mut cond_trace = Trace::new();
            let verdict = self
                .cond_seq
                .run(ws, cond_scope, &mut cond_trace)
                .and_then(|()| read_condition(ws, cond_scope, &self.cond_blob));
            ws.dispose(cond_scope)?;
            if !verdict? {
                break;
            }

            // RunBody: fresh scope, snapshot after the body for backward
            let body_scope = ws.child_scope(scope, self.body_locals.iter().cloned())?;
            let mut inner = Trace::new();
            let body_result = self.body_seq.run(ws, body_scope, &mut inner);
            let snapshot = match &body_result {
                // Body locals of this iteration; forward input values for
                // the backward replay travel in the per-operator events
                Ok(()) => Some(ws.snapshot(body_scope)?),
                Err(_) => None,
            };
            ws.dispose(body_scope)?;
            body_result?;

            iterations.push(Iteration {
                snapshot: snapshot.unwrap_or_default(),
                inner,
            });
            trace_event!(iteration = iterations.len(), "loop: body complete");
        }

        debug!(
            blob = %self.cond_blob,
            iterations = iterations.len(),
            "loop: terminated"
        );
        trace.push(TraceEvent::Loop { iterations });
        Ok(())
    }
}
