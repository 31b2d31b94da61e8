use std::collections::HashMap;

use stoat_core::{Result, Value, Workspace};

use crate::exec::{self, Program};
use crate::trace::Trace;

/// Front door for top-level runs.
///
/// A session owns a [`Workspace`] and drives whole programs against its root
/// scope: feed inputs, run forward, fetch results, run backward. One logical
/// thread of control per session; nothing here is shared between runs except
/// the root bindings themselves.
pub struct Session {
    ws: Workspace,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Session {
            ws: Workspace::new(),
        }
    }

    /// Bind an input blob in the outermost scope.
    pub fn feed(&mut self, name: impl AsRef<str>, value: Value) -> Result<()> {
        let root = self.ws.root();
        self.ws.set(root, name.as_ref(), value)
    }

    /// Execute a compiled program. On success every root binding is
    /// fetchable and the returned trace drives [`Session::backward`]; on
    /// failure no partially-visible intermediate scope survives.
    pub fn run(&mut self, program: &Program) -> Result<Trace> {
        let root = self.ws.root();
        let mut trace = Trace::new();
        program.sequence().run(&mut self.ws, root, &mut trace)?;
        Ok(trace)
    }

    /// Read a result from the outermost scope.
    pub fn fetch(&self, name: &str) -> Result<&Value> {
        self.ws.fetch(name)
    }

    /// Gradients of `outputs` with respect to `inputs`, replaying `trace`.
    pub fn backward(
        &mut self,
        program: &Program,
        trace: &Trace,
        outputs: &[&str],
        inputs: &[&str],
    ) -> Result<HashMap<String, Value>> {
        exec::backward(program, trace, &mut self.ws, outputs, inputs)
    }

    /// Direct access to the underlying workspace.
    pub fn workspace(&self) -> &Workspace {
        &self.ws
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.ws
    }
}
