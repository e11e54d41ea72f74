//! Method dispatch and the `next` control construct.
//!
//! Dispatch is a plain recursive call: `invoke` resolves a chain, creates a
//! [`CallContext`] on the Rust stack and runs the first entry; `next` moves
//! the cursor and runs the following entry inside the same context.

use crate::builder;
use crate::call_context::CallContext;
use crate::chain::{CallChain, CallKind, ChainEntry};
use crate::error::{Result, RuntimeError};
use crate::foundation::Foundation;
use crate::method::ProcedureMethod;
use crate::object::ObjectId;
use crate::value::Value;
use std::rc::Rc;
use tracing::trace;

/// The command evaluator the object system runs bodies with
pub trait Evaluator {
    /// Execute a procedure method's body with its parameters bound
    fn eval_body(
        &mut self,
        foundation: &mut Foundation,
        context: &mut CallContext,
        method: &ProcedureMethod,
        bindings: Vec<(String, Value)>,
    ) -> Result<Value>;

    /// Execute one command, on behalf of a forwarding method
    fn eval_command(
        &mut self,
        foundation: &mut Foundation,
        context: &mut CallContext,
        words: Vec<Value>,
    ) -> Result<Value>;
}

/// Invoke a method on `receiver` with no private scope
pub fn invoke(
    foundation: &mut Foundation,
    evaluator: &mut dyn Evaluator,
    receiver: ObjectId,
    name: &str,
    args: &[Value],
    kind: CallKind,
) -> Result<Value> {
    invoke_in_scope(foundation, evaluator, receiver, name, args, kind, None)
}

/// Invoke a method on `receiver` from inside a method declared by `scope`
pub fn invoke_in_scope(
    foundation: &mut Foundation,
    evaluator: &mut dyn Evaluator,
    receiver: ObjectId,
    name: &str,
    args: &[Value],
    kind: CallKind,
    scope: Option<ObjectId>,
) -> Result<Value> {
    let object_name = Rc::clone(foundation.try_object(receiver)?.name());
    let chain = builder::get_chain(foundation, receiver, name, kind, scope)?;

    let lead = match kind {
        CallKind::Private => Value::from("my"),
        _ => Value::string(object_name.as_ref()),
    };
    let mut words = Vec::with_capacity(args.len() + 2);
    words.push(lead);
    words.push(Value::from(name));
    words.extend_from_slice(args);

    // The unknown handler receives the requested name as its first argument
    let skip = if chain.is_unknown() { 1 } else { 2 };
    run_chain(foundation, evaluator, receiver, chain, words, skip)
}

/// Run a resolved chain from its first entry
pub fn run_chain(
    foundation: &mut Foundation,
    evaluator: &mut dyn Evaluator,
    receiver: ObjectId,
    chain: Rc<CallChain>,
    words: Vec<Value>,
    skip: usize,
) -> Result<Value> {
    if chain.is_empty() {
        return Ok(Value::Empty);
    }
    foundation.enter_call()?;
    foundation.retain(receiver);

    let mut context = CallContext::new(receiver, chain, words, skip);
    let result = run_entry(foundation, evaluator, &mut context);

    foundation.release(receiver);
    foundation.exit_call();
    result
}

/// Run the entry the context points at, tracking filter handling
fn run_entry(
    foundation: &mut Foundation,
    evaluator: &mut dyn Evaluator,
    context: &mut CallContext,
) -> Result<Value> {
    let receiver = context.receiver();
    let entry = context.current_entry().clone();
    trace!(
        receiver = %foundation.display_name(receiver),
        method = %entry.method.name(),
        index = context.index(),
        filter = entry.is_filter,
        "running chain entry"
    );

    let previous = foundation.get_mut(receiver).map(|object| {
        std::mem::replace(&mut object.flags.filter_handling, entry.is_filter)
    });
    let result = entry.method.invoke(foundation, evaluator, context);
    if let (Some(previous), Some(object)) = (previous, foundation.get_mut(receiver)) {
        object.flags.filter_handling = previous;
    }
    result
}

/// Continue with the next implementation in the chain
pub fn next(
    foundation: &mut Foundation,
    evaluator: &mut dyn Evaluator,
    context: &mut CallContext,
    args: &[Value],
) -> Result<Value> {
    if !context.has_next() {
        return Err(RuntimeError::no_next_method(context.chain().kind().label()));
    }
    let index = context.index() + 1;
    step_to(foundation, evaluator, context, index, "next", args)
}

/// Skip forward to the implementation declared by `class`
pub fn next_to(
    foundation: &mut Foundation,
    evaluator: &mut dyn Evaluator,
    context: &mut CallContext,
    class: ObjectId,
    args: &[Value],
) -> Result<Value> {
    let class_name = foundation.try_class(class)?.name().to_string();
    let declared_by = |entry: &ChainEntry| {
        !entry.is_filter && entry.method.declarer().id() == class
    };

    let entries = context.chain().entries();
    let later = entries
        .iter()
        .enumerate()
        .skip(context.index() + 1)
        .find(|(_, entry)| declared_by(*entry))
        .map(|(index, _)| index);

    let Some(index) = later else {
        let kind = context.chain().kind().label();
        let earlier = entries[..=context.index()].iter().any(declared_by);
        let message = if earlier {
            format!("{kind} implementation by \"{class_name}\" not reachable from here")
        } else {
            format!("{kind} has no non-filter implementation by \"{class_name}\"")
        };
        return Err(RuntimeError::NotInChain { message });
    };

    step_to(foundation, evaluator, context, index, "nextto", args)
}

fn step_to(
    foundation: &mut Foundation,
    evaluator: &mut dyn Evaluator,
    context: &mut CallContext,
    index: usize,
    command: &str,
    args: &[Value],
) -> Result<Value> {
    foundation.enter_call()?;
    let mut words = Vec::with_capacity(args.len() + 1);
    words.push(Value::from(command));
    words.extend_from_slice(args);

    let saved = context.advance(index, words, 1);
    let result = run_entry(foundation, evaluator, context);
    context.restore(saved);
    foundation.exit_call();
    result
}
