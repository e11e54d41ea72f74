//! Dynamic object and class runtime for a command language.
//!
//! Objects and classes live in an arena owned by a [`Foundation`]. Classes
//! form a graph of superclass and mixin edges; a call on an object is
//! resolved into a [`CallChain`] (filters, then every implementation of the
//! method in linearized order) which is cached per object or class and
//! invalidated by epoch counters whenever the graph changes. Dispatch runs
//! the chain one entry at a time through a [`CallContext`], with `next`
//! stepping to the following entry.
//!
//! Method bodies are executed by a host [`Evaluator`]; the
//! [`test_harness`] module provides a small one for tests.

#![allow(clippy::result_large_err)]
#![allow(clippy::uninlined_format_args)]

pub mod builder;
mod builtins;
pub mod cache;
pub mod call_context;
pub mod chain;
pub mod config;
pub mod define;
pub mod dispatch;
pub mod error;
pub mod foundation;
pub mod graph;
pub mod lifecycle;
pub mod method;
pub mod object;
pub mod syntax;
pub mod test_harness;
pub mod value;

// Include tests directory with all test modules
#[cfg(test)]
#[path = "tests/mod.rs"]
pub mod tests;

// Re-export public API
pub use call_context::CallContext;
pub use chain::{CallChain, CallKind, ChainEntry, render_call_chain};
pub use config::{ClassDeletionPolicy, RuntimeConfig};
pub use dispatch::{Evaluator, invoke, invoke_in_scope, next, next_to};
pub use error::{Result, RuntimeError};
pub use foundation::Foundation;
pub use lifecycle::{copy_object, create_object, destroy_object, new_object};
pub use method::{Declarer, Method, MethodKind, MethodRef, ParamSpec, Visibility};
pub use object::{Name, Object, ObjectId};
pub use test_harness::{HarnessError, ScriptEvaluator, ScriptSession};
pub use value::Value;
