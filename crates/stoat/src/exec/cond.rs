use std::collections::BTreeSet;

use tracing::debug;

use stoat_core::{Error, Result, ScopeId, Workspace};

use crate::exec::program::Sequence;
use crate::trace::{BranchTaken, Trace, TraceEvent};

// Cond — conditional executor
//
// Evaluates a boolean condition blob already computed in the enclosing scope
// and executes exactly one of two sequences inside a child scope. Only the
// taken branch is ever instantiated: the untaken branch causes no side
// effects and no errors even if it would reference undefined names.
//
// External names write through to the enclosing scope by the workspace
// write rule, so "using an external blob inside the branch" and "an ordinary
// parent-scope write" are observably identical. The child scope is disposed
// on every exit path, including errors.

/// A conditional construct: then/else sequences gated by a condition blob.
pub struct Cond {
    pub(crate) cond_blob: String,
    pub(crate) then_seq: Sequence,
    pub(crate) else_seq: Option<Sequence>,
    pub(crate) externals: BTreeSet<String>,
    pub(crate) locals: BTreeSet<String>,
}

impl Cond {
    /// Build a conditional. `externals` are names shared with the enclosing
    /// scope; `locals` are private to the branch scope. The partition is
    /// fixed here and validated by `Program::compile`.
    pub fn new<S, E, L>(
        cond_blob: S,
        then_seq: Sequence,
        else_seq: Option<Sequence>,
        externals: E,
        locals: L,
    ) -> Self
    where
        S: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        Cond {
            cond_blob: cond_blob.into(),
            then_seq,
            else_seq,
            externals: externals.into_iter().map(Into::into).collect(),
            locals: locals.into_iter().map(Into::into).collect(),
        }
    }

    pub(crate) fn run(
        &self,
        ws: &mut Workspace,
        scope: ScopeId,
        trace: &mut Trace,
    ) -> Result<()> {
        let cond = read_condition(ws, scope, &self.cond_blob)?;
        let (taken, seq) = match (cond, &self.else_seq) {
            (true, _) => (BranchTaken::Then, Some(&self.then_seq)),
            (false, Some(else_seq)) => (BranchTaken::Else, Some(else_seq)),
            (false, None) => (BranchTaken::Skipped, None),
        };
        debug!(blob = %self.cond_blob, ?taken, "cond: branch selected");

        let Some(seq) = seq else {
            // Condition false, no else: nothing executes, nothing is written
            trace.push(TraceEvent::Cond {
                taken: BranchTaken::Skipped,
                snapshot: None,
                inner: Trace::new(),
            });
            return Ok(());
        };

        let child = ws.child_scope(scope, self.locals.iter().cloned())?;
        let mut inner = Trace::new();
        let result = seq.run(ws, child, &mut inner);
        let snapshot = match &result {
            // Branch locals as of exit; the forward input values backward
            // differentiates against travel in the per-operator trace events
            Ok(()) => Some(ws.snapshot(child)?),
            Err(_) => None,
        };
        ws.dispose(child)?;
        result?;

        trace.push(TraceEvent::Cond {
            taken,
            snapshot,
            inner,
        });
        Ok(())
    }
}

/// Read a condition blob as a boolean, normalizing every failure mode to
/// [`Error::BadCondition`].
pub(crate) fn read_condition(ws: &Workspace, scope: ScopeId, name: &str) -> Result<bool> {
    let value = ws.get(scope, name).map_err(|e| Error::BadCondition {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    value.as_bool().map_err(|e| Error::BadCondition {
        name: name.to_string(),
        reason: e.to_string(),
    })
}
