// =============================================================================
// Exec — control-flow execution over workspace scopes
// =============================================================================
//
// This module is the engine proper. It consumes finished operator sequences
// (how they were built is someone else's problem) and executes them against a
// Workspace:
//
//   Sequence → [Program::compile] → Session::run → Trace → grad::backward
//
// Cond and Loop isolate their bodies in child scopes; the external/local name
// partition of every construct is fixed at construction time, checked by
// Program::compile, and enforced again while running. A forward run produces
// a Trace; the gradient engine replays it in reverse.

mod cond;
mod grad;
mod program;
mod while_loop;

pub use cond::Cond;
pub use grad::backward;
pub use program::{Program, Sequence, Step};
pub use while_loop::Loop;
