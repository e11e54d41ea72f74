//! Method records.
//!
//! A method is declared by exactly one object or class and is shared by
//! reference count between the declaring table and every call chain that
//! resolved to it. Removing a method from its table only drops the table's
//! reference; chains that are still executing keep the record alive.

use crate::call_context::CallContext;
use crate::dispatch::Evaluator;
use crate::error::{Result, RuntimeError};
use crate::foundation::Foundation;
use crate::object::{Name, ObjectId};
use crate::syntax::split_list;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;

/// Shared handle to a method record
pub type MethodRef = Rc<Method>;

/// Who may see a method during resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    /// Exported; reachable through the object's public command
    Public,
    /// Only reachable through `my` and from inside the object
    Unexported,
    /// Only reachable from methods of the declaring class or object
    Private,
}

impl Visibility {
    /// Methods whose names start with a lowercase letter are exported by default
    pub fn default_for(name: &str) -> Self {
        match name.chars().next() {
            Some(c) if c.is_ascii_lowercase() => Visibility::Public,
            _ => Visibility::Unexported,
        }
    }
}

/// The single owner that declared a method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Declarer {
    /// Declared directly on an object
    Object(ObjectId),
    /// Declared on a class for its instances
    Class(ObjectId),
}

impl Declarer {
    /// Handle of the declaring object or class
    pub fn id(&self) -> ObjectId {
        match self {
            Declarer::Object(id) | Declarer::Class(id) => *id,
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self, Declarer::Class(_))
    }
}

/// One formal parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

/// Formal parameter list of a procedure method
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParamSpec {
    params: Vec<Param>,
    variadic: bool,
}

impl ParamSpec {
    /// An empty parameter list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a required parameter
    pub fn required(mut self, name: impl Into<String>) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: None,
        });
        self
    }

    /// Append a parameter with a default value
    pub fn optional(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.params.push(Param {
            name: name.into(),
            default: Some(default.into()),
        });
        self
    }

    /// Collect any remaining arguments into a trailing `args` list
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Parse a parameter list in the command language's syntax:
    /// `a {b default} args`
    pub fn parse(spec: &str) -> Result<Self> {
        let words = split_list(spec)?;
        let count = words.len();
        let mut result = ParamSpec::new();

        for (index, word) in words.into_iter().enumerate() {
            let parts = split_list(&word)?;
            match parts.as_slice() {
                [name] if name == "args" && index + 1 == count => {
                    result = result.variadic();
                }
                [name] => result = result.required(name.clone()),
                [name, default] => result = result.optional(name.clone(), default.as_str()),
                _ => {
                    return Err(RuntimeError::invalid_definition(format!(
                        "bad parameter specifier \"{word}\""
                    )));
                }
            }
        }

        Ok(result)
    }

    /// Formal parameters in declaration order
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    /// Usage text: `a ?b? ?arg ...?`
    pub fn usage(&self) -> String {
        let mut words: Vec<String> = self
            .params
            .iter()
            .map(|param| match param.default {
                Some(_) => format!("?{}?", param.name),
                None => param.name.clone(),
            })
            .collect();
        if self.variadic {
            words.push("?arg ...?".to_string());
        }
        words.join(" ")
    }

    /// Bind actual arguments to formal parameters
    pub fn bind(&self, call_prefix: &str, args: &[Value]) -> Result<Vec<(String, Value)>> {
        let required = self.params.iter().filter(|p| p.default.is_none()).count();
        if args.len() < required || (!self.variadic && args.len() > self.params.len()) {
            let usage = self.usage();
            return Err(RuntimeError::wrong_args(if usage.is_empty() {
                call_prefix.to_string()
            } else {
                format!("{call_prefix} {usage}")
            }));
        }

        // Optional parameters are filled left to right; required ones always get a value
        let mut spare = args.len().saturating_sub(required);
        let mut remaining = args.iter();
        let mut bindings = Vec::with_capacity(self.params.len() + 1);

        for param in &self.params {
            let value = match &param.default {
                None => remaining.next().cloned().unwrap_or_default(),
                Some(default) if spare > 0 => {
                    spare -= 1;
                    remaining.next().cloned().unwrap_or_else(|| default.clone())
                }
                Some(default) => default.clone(),
            };
            bindings.push((param.name.clone(), value));
        }

        if self.variadic {
            bindings.push(("args".to_string(), Value::list(remaining.cloned())));
        }

        Ok(bindings)
    }
}

/// Result of a pre-call hook
#[derive(Debug, Clone, PartialEq)]
pub enum PreCallOutcome {
    /// Run the body as normal
    Proceed,
    /// Skip the body and return this value
    Finished(Value),
}

/// Runs before a procedure body; may finish the call without running it
pub type PreCallHook = Rc<dyn Fn(&mut Foundation, &CallContext) -> Result<PreCallOutcome>>;

/// Runs after a procedure body with its result; may replace the result
pub type PostCallHook = Rc<dyn Fn(&mut Foundation, &CallContext, Result<Value>) -> Result<Value>>;

/// Rewrites an error escaping a procedure body
pub type ErrorDecorator = Rc<dyn Fn(&CallContext, RuntimeError) -> RuntimeError>;

/// A method implemented by a body the evaluator runs
#[derive(Clone)]
pub struct ProcedureMethod {
    params: ParamSpec,
    body: Rc<str>,
    pre_call: Option<PreCallHook>,
    post_call: Option<PostCallHook>,
    error_decorator: Option<ErrorDecorator>,
}

impl ProcedureMethod {
    pub fn new(params: ParamSpec, body: impl Into<Rc<str>>) -> Self {
        Self {
            params,
            body: body.into(),
            pre_call: None,
            post_call: None,
            error_decorator: None,
        }
    }

    pub fn with_pre_call(mut self, hook: PreCallHook) -> Self {
        self.pre_call = Some(hook);
        self
    }

    pub fn with_post_call(mut self, hook: PostCallHook) -> Self {
        self.post_call = Some(hook);
        self
    }

    pub fn with_error_decorator(mut self, decorator: ErrorDecorator) -> Self {
        self.error_decorator = Some(decorator);
        self
    }

    pub fn params(&self) -> &ParamSpec {
        &self.params
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    fn invoke(
        &self,
        foundation: &mut Foundation,
        evaluator: &mut dyn Evaluator,
        context: &mut CallContext,
    ) -> Result<Value> {
        if let Some(pre_call) = &self.pre_call {
            if let PreCallOutcome::Finished(value) = pre_call(foundation, context)? {
                return Ok(value);
            }
        }

        let usage = context.usage_prefix();
        let mut result = self
            .params
            .bind(&usage, context.args())
            .and_then(|bindings| evaluator.eval_body(foundation, context, self, bindings));

        if let Some(post_call) = &self.post_call {
            result = post_call(foundation, context, result);
        }

        match (result, &self.error_decorator) {
            (Err(error), Some(decorate)) => Err(decorate(context, error)),
            (result, _) => result,
        }
    }
}

impl fmt::Debug for ProcedureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureMethod")
            .field("params", &self.params)
            .field("body", &self.body)
            .field("pre_call", &self.pre_call.is_some())
            .field("post_call", &self.post_call.is_some())
            .field("error_decorator", &self.error_decorator.is_some())
            .finish()
    }
}

/// A method that replaces itself with a command prefix
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardMethod {
    prefix: Vec<Value>,
}

impl ForwardMethod {
    /// Create a forward; the prefix must not be empty
    pub fn new(prefix: Vec<Value>) -> Result<Self> {
        if prefix.is_empty() {
            return Err(RuntimeError::invalid_definition(
                "forward target prefix must not be empty",
            ));
        }
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> &[Value] {
        &self.prefix
    }
}

/// Signature of a method implemented in Rust
pub type NativeFn =
    Rc<dyn Fn(&mut Foundation, &mut dyn Evaluator, &mut CallContext) -> Result<Value>>;

/// A method implemented by a Rust callback
#[derive(Clone)]
pub struct NativeMethod {
    func: NativeFn,
}

impl NativeMethod {
    pub fn new(func: NativeFn) -> Self {
        Self { func }
    }
}

impl fmt::Debug for NativeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NativeMethod")
    }
}

/// The implementation behind a method record
#[derive(Debug, Clone)]
pub enum MethodKind {
    Procedure(ProcedureMethod),
    Forward(ForwardMethod),
    Native(NativeMethod),
}

impl MethodKind {
    /// A body-based method
    pub fn procedure(params: ParamSpec, body: impl Into<Rc<str>>) -> Self {
        MethodKind::Procedure(ProcedureMethod::new(params, body))
    }

    /// A forwarding method
    pub fn forward(prefix: Vec<Value>) -> Result<Self> {
        Ok(MethodKind::Forward(ForwardMethod::new(prefix)?))
    }

    /// A Rust callback
    pub fn native(
        func: impl Fn(&mut Foundation, &mut dyn Evaluator, &mut CallContext) -> Result<Value> + 'static,
    ) -> Self {
        MethodKind::Native(NativeMethod::new(Rc::new(func)))
    }

    /// Implementation type name used when rendering call chains
    pub fn impl_type(&self) -> &'static str {
        match self {
            MethodKind::Procedure(_) => "method",
            MethodKind::Forward(_) => "forward",
            MethodKind::Native(_) => "core",
        }
    }
}

/// A method record
#[derive(Debug)]
pub struct Method {
    name: Name,
    kind: MethodKind,
    visibility: Visibility,
    declarer: Declarer,
}

impl Method {
    pub fn new(name: Name, kind: MethodKind, visibility: Visibility, declarer: Declarer) -> Self {
        Self {
            name,
            kind,
            visibility,
            declarer,
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn kind(&self) -> &MethodKind {
        &self.kind
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn declarer(&self) -> Declarer {
        self.declarer
    }

    /// A copy of this record under another name
    pub(crate) fn renamed(&self, name: Name) -> Self {
        Self::new(name, self.kind.clone(), self.visibility, self.declarer)
    }

    /// A copy of this record with different visibility
    pub(crate) fn with_visibility(&self, visibility: Visibility) -> Self {
        Self::new(self.name.clone(), self.kind.clone(), visibility, self.declarer)
    }

    /// A copy of this record owned by another declarer
    pub(crate) fn redeclared(&self, declarer: Declarer) -> Self {
        Self::new(self.name.clone(), self.kind.clone(), self.visibility, declarer)
    }

    /// Run this implementation for the chain entry the context points at
    pub fn invoke(
        &self,
        foundation: &mut Foundation,
        evaluator: &mut dyn Evaluator,
        context: &mut CallContext,
    ) -> Result<Value> {
        match &self.kind {
            MethodKind::Procedure(procedure) => procedure.invoke(foundation, evaluator, context),
            MethodKind::Forward(forward) => {
                let mut words = forward.prefix.clone();
                words.extend(context.args().iter().cloned());
                evaluator.eval_command(foundation, context, words)
            }
            MethodKind::Native(native) => (native.func)(foundation, evaluator, context),
        }
    }
}
