use std::collections::HashMap;

use crate::bail;
use crate::error::{Error, Result};
use crate::value::Value;

// Workspace — scoped blob store
//
// A Workspace is an arena of Scopes. Each Scope maps names to values and
// carries a parent link; control-flow constructs create a child scope on
// entry and dispose it on exit. The two rules everything else depends on:
//
//   1. Lookup resolves in the local scope first, then walks the parent chain.
//   2. A write to a name updates the binding in the scope where the name was
//      FIRST introduced. External names therefore write through to the
//      enclosing scope; names never seen before become local bindings that
//      vanish when the scope is disposed.
//
// Locals that shadow an enclosing name must be pre-declared at scope creation
// (`child_scope` takes the local name set); a declared-but-unwritten local
// reads as UndefinedInput, not as the outer value.
//
// Scopes are arena slots, so ScopeIds stay valid after disposal — but any
// access through a disposed scope fails with ScopeDisposed rather than
// returning stale data. Disposed slots keep their index and are never
// reused: reuse would let an outstanding ScopeId alias a fresh scope and
// read another construct's bindings. The cost is that the arena grows with
// the total number of scopes a workspace has ever created; a long-lived
// workspace driving many-iteration loops pays one empty slot per scope.
// Generational ids would lift that ceiling if it ever matters.

/// Identifies a scope inside a [`Workspace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

impl ScopeId {
    /// The outermost scope, created by [`Workspace::new`].
    pub const ROOT: ScopeId = ScopeId(0);

    /// Arena index of this scope.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A captured set of local bindings, used by the execution trace.
pub type Snapshot = HashMap<String, Value>;

#[derive(Debug, Clone)]
enum Binding {
    /// Declared local awaiting its first write.
    Unset,
    Set(Value),
}

#[derive(Debug)]
struct Scope {
    parent: Option<ScopeId>,
    bindings: HashMap<String, Binding>,
    disposed: bool,
}

/// An arena of parent-linked scopes mapping blob names to values.
#[derive(Debug)]
pub struct Workspace {
    scopes: Vec<Scope>,
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Workspace {
    /// Create a workspace with a single root scope.
    pub fn new() -> Self {
        Workspace {
            scopes: vec![Scope {
                parent: None,
                bindings: HashMap::new(),
                disposed: false,
            }],
        }
    }

    /// The outermost scope.
    pub fn root(&self) -> ScopeId {
        ScopeId::ROOT
    }

    /// Create a child scope of `parent`.
    ///
    /// Every name in `locals` is pre-declared so that writes to it stay in
    /// the child even when an enclosing scope binds the same name.
    pub fn child_scope<I, S>(&mut self, parent: ScopeId, locals: I) -> Result<ScopeId>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope(parent)?; // parent must be live
        let bindings = locals
            .into_iter()
            .map(|name| (name.into(), Binding::Unset))
            .collect();
        self.scopes.push(Scope {
            parent: Some(parent),
            bindings,
            disposed: false,
        });
        Ok(ScopeId(self.scopes.len() - 1))
    }

    fn scope(&self, id: ScopeId) -> Result<&Scope> {
        let scope = self
            .scopes
            .get(id.0)
            .ok_or_else(|| Error::msg(format!("unknown scope {}", id.0)))?;
        if scope.disposed {
            return Err(Error::ScopeDisposed { scope: id.0 });
        }
        Ok(scope)
    }

    /// The scope in which `name` was first introduced, walking the parent
    /// chain outward from `scope`. `None` if the name is nowhere visible.
    fn owner(&self, scope: ScopeId, name: &str) -> Result<Option<ScopeId>> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scope(id)?;
            if s.bindings.contains_key(name) {
                return Ok(Some(id));
            }
            current = s.parent;
        }
        Ok(None)
    }

    /// Read a blob, resolving local bindings first and then the parent chain.
    pub fn get(&self, scope: ScopeId, name: &str) -> Result<&Value> {
        match self.owner(scope, name)? {
            Some(id) => match &self.scopes[id.0].bindings[name] {
                Binding::Set(v) => Ok(v),
                Binding::Unset => Err(Error::UndefinedInput {
                    name: name.to_string(),
                }),
            },
            None => Err(Error::UndefinedInput {
                name: name.to_string(),
            }),
        }
    }

    /// Write a blob.
    ///
    /// If the name is already visible the binding updates in place in the
    /// scope where it was first introduced; otherwise a new local binding is
    /// created in `scope`.
    pub fn set(&mut self, scope: ScopeId, name: &str, value: Value) -> Result<()> {
        let target = self.owner(scope, name)?.unwrap_or(scope);
        self.scopes[target.0]
            .bindings
            .insert(name.to_string(), Binding::Set(value));
        Ok(())
    }

    /// Whether `name` resolves to a set binding from `scope`.
    pub fn contains(&self, scope: ScopeId, name: &str) -> Result<bool> {
        match self.owner(scope, name)? {
            Some(id) => Ok(matches!(
                self.scopes[id.0].bindings[name],
                Binding::Set(_)
            )),
            None => Ok(false),
        }
    }

    /// Tear down a scope's local bindings. Irreversible: later access through
    /// the scope fails with [`Error::ScopeDisposed`].
    pub fn dispose(&mut self, scope: ScopeId) -> Result<()> {
        if scope == ScopeId::ROOT {
            bail!("the root scope cannot be disposed");
        }
        self.scope(scope)?;
        let s = &mut self.scopes[scope.0];
        s.bindings.clear();
        s.disposed = true;
        Ok(())
    }

    /// Clone the scope's set local bindings (declared-but-unset locals are
    /// omitted).
    pub fn snapshot(&self, scope: ScopeId) -> Result<Snapshot> {
        let s = self.scope(scope)?;
        Ok(s.bindings
            .iter()
            .filter_map(|(name, binding)| match binding {
                Binding::Set(v) => Some((name.clone(), v.clone())),
                Binding::Unset => None,
            })
            .collect())
    }

    /// Install snapshot bindings as locals of `scope`.
    pub fn load(&mut self, scope: ScopeId, snapshot: &Snapshot) -> Result<()> {
        self.scope(scope)?;
        let s = &mut self.scopes[scope.0];
        for (name, value) in snapshot {
            s.bindings
                .insert(name.clone(), Binding::Set(value.clone()));
        }
        Ok(())
    }

    /// Read a result from the outermost scope after a top-level run.
    pub fn fetch(&self, name: &str) -> Result<&Value> {
        self.get(ScopeId::ROOT, name).map_err(|e| match e {
            Error::UndefinedInput { name } => Error::NotFound { name },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_walks_parent_chain() {
        let mut ws = Workspace::new();
        ws.set(ws.root(), "x", Value::scalar(1.0)).unwrap();
        let child = ws.child_scope(ws.root(), Vec::<String>::new()).unwrap();
        let grandchild = ws.child_scope(child, Vec::<String>::new()).unwrap();
        assert_eq!(ws.get(grandchild, "x").unwrap().as_scalar().unwrap(), 1.0);
    }

    #[test]
    fn test_write_through_to_first_introduction() {
        let mut ws = Workspace::new();
        ws.set(ws.root(), "x", Value::scalar(1.0)).unwrap();
        let child = ws.child_scope(ws.root(), Vec::<String>::new()).unwrap();
        ws.set(child, "x", Value::scalar(2.0)).unwrap();
        // The root binding was updated, not shadowed
        assert_eq!(ws.get(ws.root(), "x").unwrap().as_scalar().unwrap(), 2.0);
    }

    #[test]
    fn test_fresh_name_stays_local() {
        let mut ws = Workspace::new();
        let child = ws.child_scope(ws.root(), Vec::<String>::new()).unwrap();
        ws.set(child, "tmp", Value::scalar(5.0)).unwrap();
        assert!(ws.get(ws.root(), "tmp").is_err());
        ws.dispose(child).unwrap();
        assert!(matches!(
            ws.fetch("tmp"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_declared_local_shadows_outer() {
        let mut ws = Workspace::new();
        ws.set(ws.root(), "x", Value::scalar(1.0)).unwrap();
        let child = ws.child_scope(ws.root(), ["x"]).unwrap();
        // Declared but unwritten: not a fall-through read
        assert!(matches!(
            ws.get(child, "x"),
            Err(Error::UndefinedInput { .. })
        ));
        ws.set(child, "x", Value::scalar(9.0)).unwrap();
        assert_eq!(ws.get(child, "x").unwrap().as_scalar().unwrap(), 9.0);
        // The outer binding is untouched
        assert_eq!(ws.get(ws.root(), "x").unwrap().as_scalar().unwrap(), 1.0);
    }

    #[test]
    fn test_dispose_is_irreversible() {
        let mut ws = Workspace::new();
        let child = ws.child_scope(ws.root(), Vec::<String>::new()).unwrap();
        ws.set(child, "local", Value::scalar(1.0)).unwrap();
        ws.dispose(child).unwrap();
        assert!(matches!(
            ws.get(child, "local"),
            Err(Error::ScopeDisposed { .. })
        ));
        // Reads through a chain containing the disposed scope also fail
        assert!(ws.child_scope(child, Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_root_cannot_be_disposed() {
        let mut ws = Workspace::new();
        assert!(ws.dispose(ws.root()).is_err());
    }

    #[test]
    fn test_snapshot_and_load() {
        let mut ws = Workspace::new();
        let child = ws.child_scope(ws.root(), ["pending"]).unwrap();
        ws.set(child, "a", Value::scalar(1.0)).unwrap();
        ws.set(child, "b", Value::from_vec(vec![2.0, 3.0])).unwrap();
        let snap = ws.snapshot(child).unwrap();
        assert_eq!(snap.len(), 2); // unset "pending" is omitted
        ws.dispose(child).unwrap();

        let replay = ws.child_scope(ws.root(), Vec::<String>::new()).unwrap();
        ws.load(replay, &snap).unwrap();
        assert_eq!(ws.get(replay, "a").unwrap().as_scalar().unwrap(), 1.0);
        assert_eq!(ws.get(replay, "b").unwrap().data(), &[2.0, 3.0]);
    }

    #[test]
    fn test_fetch_not_found() {
        let ws = Workspace::new();
        assert!(matches!(
            ws.fetch("missing"),
            Err(Error::NotFound { .. })
        ));
    }
}
