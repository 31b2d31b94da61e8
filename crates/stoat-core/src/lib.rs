//! # stoat-core
//!
//! Core primitives for Stoat: values, scoped workspaces, and the operator
//! capability.
//!
//! This crate provides:
//! - [`Value`] — flat numeric payload of a named blob
//! - [`Workspace`] / [`ScopeId`] — parent-linked scope arena with
//!   write-through semantics for externally visible names
//! - [`Operator`] trait — the black-box computation capability, with a small
//!   set of built-in operators and the gradient-blob protocol
//! - [`Error`] / [`Result`] — the single error type used across the library

pub mod error;
pub mod op;
pub mod value;
pub mod workspace;

pub use error::{Error, Result};
pub use op::{accumulate_grad, grad_name, take_grad, BoxedOperator, Operator};
pub use value::Value;
pub use workspace::{ScopeId, Snapshot, Workspace};
