//! Runtime values passed through dispatch.
//!
//! The host language treats every value as a string with optional internal
//! structure; `Value` keeps the structure for integers and lists but always
//! compares and renders through the canonical string form.

use crate::error::{Result, RuntimeError};
use crate::syntax::split_list;
use std::fmt;

/// A value handed to or returned from a method implementation
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The empty string
    #[default]
    Empty,
    /// UTF-8 string
    String(String),
    /// 64-bit signed integer
    Integer(i64),
    /// Boolean, rendered as 1/0
    Boolean(bool),
    /// Ordered list, rendered with command-language quoting
    List(Vec<Value>),
}

impl Value {
    /// Build a string value
    pub fn string(text: impl Into<String>) -> Self {
        Value::String(text.into())
    }

    /// Build an integer value
    pub fn integer(n: i64) -> Self {
        Value::Integer(n)
    }

    /// Build a list value
    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(items.into_iter().collect())
    }

    /// Get the type name of this value's internal representation
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Empty => "empty",
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Boolean(_) => "boolean",
            Value::List(_) => "list",
        }
    }

    /// Check if this value is true in a boolean context
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Boolean(b) => *b,
            Value::Integer(n) => *n != 0,
            Value::List(items) => !items.is_empty(),
            Value::String(s) => !matches!(s.as_str(), "" | "0" | "false" | "no" | "off"),
        }
    }

    /// Check for the empty string
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::String(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Canonical string form
    pub fn to_string_repr(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::String(s) => s.clone(),
            Value::Integer(n) => n.to_string(),
            Value::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
            Value::List(items) => items
                .iter()
                .map(|item| quote_element(&item.to_string_repr()))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Interpret this value as an integer
    pub fn as_integer(&self) -> Result<i64> {
        match self {
            Value::Integer(n) => Ok(*n),
            Value::Boolean(b) => Ok(i64::from(*b)),
            other => {
                let text = other.to_string_repr();
                text.trim().parse::<i64>().map_err(|_| {
                    RuntimeError::script_with_code(
                        format!("expected integer but got \"{text}\""),
                        vec!["TCL".into(), "VALUE".into(), "NUMBER".into()],
                    )
                })
            }
        }
    }

    /// Interpret this value as a list, parsing the string form if needed
    pub fn as_list(&self) -> Result<Vec<Value>> {
        match self {
            Value::List(items) => Ok(items.clone()),
            Value::Empty => Ok(Vec::new()),
            other => Ok(split_list(&other.to_string_repr())?
                .into_iter()
                .map(Value::String)
                .collect()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            _ => self.to_string_repr() == other.to_string_repr(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_repr())
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::String(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::String(text)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// Quote one list element so that `split_list` recovers it exactly
pub fn quote_element(element: &str) -> String {
    if element.is_empty() {
        return "{}".to_string();
    }
    let needs_quoting = element.starts_with('#')
        || element
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '{' | '}' | '"' | '[' | ']' | '$' | '\\' | ';'));
    if !needs_quoting {
        return element.to_string();
    }
    if braces_balanced(element) && !element.ends_with('\\') {
        return format!("{{{element}}}");
    }
    let mut escaped = String::with_capacity(element.len() * 2);
    for c in element.chars() {
        match c {
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            ' ' | '{' | '}' | '"' | '[' | ']' | '$' | '\\' | ';' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

fn braces_balanced(text: &str) -> bool {
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '{' => depth += 1,
            '}' => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    depth == 0
}

/// Map the character after a backslash to the character it denotes
pub fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        'r' => '\r',
        other => other,
    }
}
