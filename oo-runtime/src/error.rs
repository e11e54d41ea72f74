//! Runtime error types for the object system.
//!
//! Every error carries a miette diagnostic code and can render the
//! command-language error-code tag list that the host evaluator attaches to
//! its error state.

use miette::Diagnostic;
use thiserror::Error;

/// Errors reported by graph mutation, chain building and dispatch
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("attempt to form circular dependency graph: {description}")]
    #[diagnostic(
        code(oo::runtime::graph_cycle),
        help("A class may not inherit from, or mix in, one of its own descendants")
    )]
    GraphCycle { description: String },

    #[error("unknown method \"{method}\": must be {expected}")]
    #[diagnostic(code(oo::runtime::method_not_found))]
    MethodNotFound {
        object: String,
        method: String,
        expected: String,
    },

    #[error("no next {kind} implementation")]
    #[diagnostic(
        code(oo::runtime::no_next_method),
        help("`next` was invoked from the last implementation in the call chain")
    )]
    NoNextMethod { kind: String },

    #[error("construction of object \"{object}\" failed: {source}")]
    #[diagnostic(code(oo::runtime::construction_failure))]
    ConstructionFailure {
        object: String,
        source: Box<RuntimeError>,
    },

    #[error("destructor of object \"{object}\" failed: {source}")]
    #[diagnostic(code(oo::runtime::destructor_failure))]
    DestructorFailure {
        object: String,
        source: Box<RuntimeError>,
    },

    #[error("\"{name}\" is not a class")]
    #[diagnostic(code(oo::runtime::not_a_class))]
    NotAClass { name: String },

    #[error("{handle} does not refer to an object")]
    #[diagnostic(code(oo::runtime::no_such_object))]
    NoSuchObject { handle: String },

    #[error("object \"{name}\" is being deleted")]
    #[diagnostic(code(oo::runtime::object_deleted))]
    ObjectDeleted { name: String },

    #[error("may not destroy the {name} class")]
    #[diagnostic(
        code(oo::runtime::root_protected),
        help("The bootstrap classes are only torn down by Foundation::shutdown")
    )]
    RootProtected { name: String },

    #[error("wrong # args: should be \"{usage}\"")]
    #[diagnostic(code(oo::runtime::wrong_args))]
    WrongArgs { usage: String },

    #[error("too many nested method calls (limit {max_depth})")]
    #[diagnostic(
        code(oo::runtime::call_depth_exceeded),
        help("Raise RuntimeConfig::max_call_depth or look for unbounded recursion")
    )]
    CallDepthExceeded { max_depth: usize },

    #[error("{message}")]
    #[diagnostic(code(oo::runtime::invalid_definition))]
    InvalidDefinition { message: String },

    #[error("{message}")]
    #[diagnostic(code(oo::runtime::not_in_chain))]
    NotInChain { message: String },

    #[error("{command} may only be called from inside a method")]
    #[diagnostic(code(oo::runtime::no_call_context))]
    NoCallContext { command: String },

    #[error("{message}")]
    #[diagnostic(code(oo::runtime::script_error))]
    Script {
        message: String,
        error_code: Vec<String>,
    },
}

impl RuntimeError {
    /// Create a cycle rejection error
    pub fn graph_cycle(description: impl Into<String>) -> Self {
        Self::GraphCycle {
            description: description.into(),
        }
    }

    /// Create a method lookup failure listing the names that would have resolved
    pub fn method_not_found(object: &str, method: &str, available: &[String]) -> Self {
        Self::MethodNotFound {
            object: object.to_string(),
            method: method.to_string(),
            expected: join_alternatives(available),
        }
    }

    /// Create a "no next implementation" error for a chain of the given kind
    pub fn no_next_method(kind: &str) -> Self {
        Self::NoNextMethod {
            kind: kind.to_string(),
        }
    }

    /// Wrap a constructor failure
    pub fn construction_failure(object: &str, source: RuntimeError) -> Self {
        Self::ConstructionFailure {
            object: object.to_string(),
            source: Box::new(source),
        }
    }

    /// Wrap a destructor failure
    pub fn destructor_failure(object: &str, source: RuntimeError) -> Self {
        Self::DestructorFailure {
            object: object.to_string(),
            source: Box::new(source),
        }
    }

    /// Create a not-a-class error
    pub fn not_a_class(name: &str) -> Self {
        Self::NotAClass {
            name: name.to_string(),
        }
    }

    /// Create an error for a handle that names no live object
    pub fn no_such_object(handle: impl std::fmt::Display) -> Self {
        Self::NoSuchObject {
            handle: handle.to_string(),
        }
    }

    /// Create an error for dispatch onto an object that is mid-teardown
    pub fn object_deleted(name: &str) -> Self {
        Self::ObjectDeleted {
            name: name.to_string(),
        }
    }

    /// Create a wrong-arguments error from a usage line
    pub fn wrong_args(usage: impl Into<String>) -> Self {
        Self::WrongArgs {
            usage: usage.into(),
        }
    }

    /// Create a definition error
    pub fn invalid_definition(message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            message: message.into(),
        }
    }

    /// Create an error raised by an evaluated method body
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
            error_code: vec!["NONE".to_string()],
        }
    }

    /// Create an error raised by an evaluated method body with an explicit code
    pub fn script_with_code(message: impl Into<String>, error_code: Vec<String>) -> Self {
        Self::Script {
            message: message.into(),
            error_code,
        }
    }

    /// The error-code tag list the evaluator records alongside the message
    pub fn error_code(&self) -> Vec<String> {
        let tags: &[&str] = match self {
            Self::GraphCycle { .. } => &["TCL", "OO", "CIRCULARITY"],
            Self::MethodNotFound { method, .. } => {
                return vec![
                    "TCL".to_string(),
                    "LOOKUP".to_string(),
                    "METHOD".to_string(),
                    method.clone(),
                ];
            }
            Self::NoNextMethod { .. } => &["TCL", "OO", "NOTHING_NEXT"],
            Self::ConstructionFailure { source, .. } | Self::DestructorFailure { source, .. } => {
                return source.error_code();
            }
            Self::NotAClass { name } | Self::NoSuchObject { handle: name } => {
                return vec![
                    "TCL".to_string(),
                    "LOOKUP".to_string(),
                    "CLASS".to_string(),
                    name.clone(),
                ];
            }
            Self::ObjectDeleted { .. } => &["TCL", "OO", "OBJECT_DELETED"],
            Self::RootProtected { .. } => &["TCL", "OO", "PROTECTED"],
            Self::WrongArgs { .. } => &["TCL", "WRONGARGS"],
            Self::CallDepthExceeded { .. } => &["TCL", "LIMIT", "STACK"],
            Self::InvalidDefinition { .. } => &["TCL", "OO", "BAD_DEFINITION"],
            Self::NotInChain { .. } => &["TCL", "OO", "BAD_NEXTTO"],
            Self::NoCallContext { .. } => &["TCL", "OO", "CONTEXT_REQUIRED"],
            Self::Script { error_code, .. } => return error_code.clone(),
        };
        tags.iter().map(|tag| tag.to_string()).collect()
    }
}

/// Render `a, b or c` in the command language's usual style
fn join_alternatives(names: &[String]) -> String {
    match names {
        [] => "(none)".to_string(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} or {}", init.join(", "), last),
    }
}

/// Type alias for object system results
pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_method_not_found_message() {
        let names = vec!["bark".to_string(), "destroy".to_string(), "speak".to_string()];
        let error = RuntimeError::method_not_found("::d", "fly", &names);
        assert_eq!(
            error.to_string(),
            "unknown method \"fly\": must be bark, destroy or speak"
        );
        assert_eq!(error.error_code(), vec!["TCL", "LOOKUP", "METHOD", "fly"]);
    }

    #[test]
    fn test_single_alternative() {
        let error = RuntimeError::method_not_found("::d", "fly", &["destroy".to_string()]);
        assert_eq!(error.to_string(), "unknown method \"fly\": must be destroy");
    }

    #[test]
    fn test_wrapped_errors_keep_inner_code() {
        let inner = RuntimeError::script_with_code("boom", vec!["MY".into(), "CODE".into()]);
        let error = RuntimeError::construction_failure("::o", inner);
        assert_eq!(error.error_code(), vec!["MY", "CODE"]);
        assert!(error.to_string().contains("boom"));
    }

    #[test]
    fn test_no_next_method_code() {
        let error = RuntimeError::no_next_method("method");
        assert_eq!(error.to_string(), "no next method implementation");
        assert_eq!(error.error_code(), vec!["TCL", "OO", "NOTHING_NEXT"]);
    }
}
