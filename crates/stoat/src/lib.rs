//! # Stoat
//!
//! A control-flow execution engine for dataflow programs over named blobs.
//!
//! Stoat executes operator sequences containing conditional ([`Cond`]) and
//! loop ([`Loop`]) constructs against a scoped blob store, records the path
//! the execution actually took, and replays that record in reverse to compute
//! gradients.
//!
//! ## Architecture
//!
//! | Crate | Purpose |
//! |-------|----------|
//! | `stoat-core` | Value, Workspace/ScopeId scope arena, Operator trait, Error |
//! | `stoat` | Sequences, Cond/Loop executors, Trace, gradient engine, Session |
//!
//! ## Usage
//!
//! ```no_run
//! use stoat::op::Pow;
//! use stoat::prelude::*;
//!
//! let seq = Sequence::new(vec![Step::op(Pow::new("y", "z", 2.0))]);
//! let program = Program::compile(seq, &["y"]).unwrap();
//!
//! let mut session = Session::new();
//! session.feed("y", Value::scalar(4.0)).unwrap();
//! let trace = session.run(&program).unwrap();
//! assert_eq!(session.fetch("z").unwrap().as_scalar().unwrap(), 16.0);
//!
//! let grads = session.backward(&program, &trace, &["z"], &["y"]).unwrap();
//! assert_eq!(grads["y"].as_scalar().unwrap(), 8.0);
//! ```

pub mod exec;
pub mod session;
pub mod trace;

/// Re-export the built-in operators.
pub use stoat_core::op;

/// Re-export core types.
pub use stoat_core::{
    accumulate_grad, grad_name, take_grad, BoxedOperator, Error, Operator, Result, ScopeId,
    Snapshot, Value, Workspace,
};

pub use exec::{Cond, Loop, Program, Sequence, Step};
pub use session::Session;
pub use trace::{BranchTaken, Trace, TraceEvent};

/// Everything you need, in one import.
pub mod prelude {
    pub use crate::exec::{Cond, Loop, Program, Sequence, Step};
    pub use crate::session::Session;
    pub use crate::trace::{BranchTaken, Trace, TraceEvent};
    pub use stoat_core::{Error, Operator, Result, Value, Workspace};
}
