//! Test harness for exercising the object system from scripts.
//!
//! `ScriptEvaluator` is a deliberately small command-language evaluator:
//! words, `"..."` with substitution, `{...}` without, `[...]` command
//! substitution and `$var` variables. It understands enough commands to
//! define classes, call methods and observe dispatch (`next`, `self`,
//! `callchain`, `my`). Any word that names a live object is dispatched as a
//! method call on it.
//!
//! `ScriptSession` bundles a [`Foundation`] with an evaluator and offers
//! assertion helpers in the style of the interpreter harnesses.

use crate::call_context::CallContext;
use crate::chain::{CallKind, render_call_chain};
use crate::config::RuntimeConfig;
use crate::define;
use crate::dispatch::{self, Evaluator};
use crate::error::{Result, RuntimeError};
use crate::foundation::Foundation;
use crate::graph;
use crate::lifecycle;
use crate::method::{Declarer, MethodKind, ParamSpec, ProcedureMethod, Visibility};
use crate::object::ObjectId;
use crate::syntax::{Part, Word, parse_script};
use crate::value::Value;
use miette::Diagnostic;
use std::collections::HashMap;
use thiserror::Error;

/// How a script finished
enum Flow {
    Normal(Value),
    Return(Value),
}

impl Flow {
    fn into_value(self) -> Value {
        match self {
            Flow::Normal(value) | Flow::Return(value) => value,
        }
    }
}

/// Minimal command-language evaluator implementing [`Evaluator`]
#[derive(Debug, Default)]
pub struct ScriptEvaluator {
    globals: HashMap<String, Value>,
    frames: Vec<HashMap<String, Value>>,
    output: Vec<String>,
}

impl ScriptEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a global variable; a leading `::` is optional
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name.trim_start_matches("::")).cloned()
    }

    pub fn set_global(&mut self, name: &str, value: impl Into<Value>) {
        self.globals
            .insert(name.trim_start_matches("::").to_string(), value.into());
    }

    /// Lines written with `puts`
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Evaluate a script at top level, outside any method
    pub fn eval(&mut self, foundation: &mut Foundation, script: &str) -> Result<Value> {
        Ok(self.eval_script(foundation, None, script)?.into_value())
    }

    fn eval_script(
        &mut self,
        foundation: &mut Foundation,
        mut context: Option<&mut CallContext>,
        script: &str,
    ) -> Result<Flow> {
        let mut result = Value::Empty;
        for command in parse_script(script)? {
            let words = self.substitute_words(foundation, context.as_deref_mut(), &command)?;
            match self.run_command(foundation, context.as_deref_mut(), words)? {
                Flow::Normal(value) => result = value,
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Normal(result))
    }

    fn substitute_words(
        &mut self,
        foundation: &mut Foundation,
        mut context: Option<&mut CallContext>,
        command: &[Word],
    ) -> Result<Vec<Value>> {
        let mut words = Vec::with_capacity(command.len());
        for word in command {
            words.push(self.substitute(foundation, context.as_deref_mut(), word)?);
        }
        Ok(words)
    }

    fn substitute(
        &mut self,
        foundation: &mut Foundation,
        mut context: Option<&mut CallContext>,
        word: &[Part],
    ) -> Result<Value> {
        // A lone substitution keeps its value's structure
        if let [part] = word {
            return self.substitute_part(foundation, context, part);
        }
        let mut text = String::new();
        for part in word {
            let value = self.substitute_part(foundation, context.as_deref_mut(), part)?;
            text.push_str(&value.to_string());
        }
        Ok(Value::String(text))
    }

    fn substitute_part(
        &mut self,
        foundation: &mut Foundation,
        context: Option<&mut CallContext>,
        part: &Part,
    ) -> Result<Value> {
        match part {
            Part::Text(text) => Ok(Value::from(text.as_str())),
            Part::Variable(name) => self.read_variable(name),
            Part::Command(script) => Ok(self.eval_script(foundation, context, script)?.into_value()),
        }
    }

    fn read_variable(&self, name: &str) -> Result<Value> {
        let table = match name.strip_prefix("::") {
            Some(_) => &self.globals,
            None => self.frames.last().unwrap_or(&self.globals),
        };
        table
            .get(name.trim_start_matches("::"))
            .cloned()
            .ok_or_else(|| {
                RuntimeError::script_with_code(
                    format!("can't read \"{name}\": no such variable"),
                    vec!["TCL".into(), "LOOKUP".into(), "VARNAME".into(), name.into()],
                )
            })
    }

    fn write_variable(&mut self, name: &str, value: Value) {
        let table = match name.strip_prefix("::") {
            Some(_) => &mut self.globals,
            None => match self.frames.last_mut() {
                Some(frame) => frame,
                None => &mut self.globals,
            },
        };
        table.insert(name.trim_start_matches("::").to_string(), value);
    }

    fn run_command(
        &mut self,
        foundation: &mut Foundation,
        context: Option<&mut CallContext>,
        words: Vec<Value>,
    ) -> Result<Flow> {
        let Some((head, args)) = words.split_first() else {
            return Ok(Flow::Normal(Value::Empty));
        };
        let command = head.to_string();
        let value = match command.as_str() {
            "return" => return Ok(Flow::Return(args.first().cloned().unwrap_or_default())),
            "set" => self.cmd_set(args)?,
            "puts" => {
                arity(args, 1, Some(1), "puts string")?;
                self.output.push(args[0].to_string());
                Value::Empty
            }
            "string" => cmd_string(args)?,
            "list" => Value::list(args.to_vec()),
            "lindex" => cmd_lindex(args)?,
            "llength" => {
                arity(args, 1, Some(1), "llength list")?;
                Value::integer(args[0].as_list()?.len() as i64)
            }
            "lappend" => self.cmd_lappend(args)?,
            "append" => self.cmd_append(args)?,
            "incr" => self.cmd_incr(args)?,
            "concat" => cmd_concat(args),
            "error" => return Err(cmd_error(args)?),
            "catch" => self.cmd_catch(foundation, context, args)?,
            "next" => dispatch::next(foundation, self, require(context, "next")?, args)?,
            "nextto" => {
                let context = require(context, "nextto")?;
                let Some((class, rest)) = args.split_first() else {
                    return Err(RuntimeError::wrong_args("nextto class ?arg...?"));
                };
                let class = foundation.resolve_class(&class.to_string())?;
                dispatch::next_to(foundation, self, context, class, rest)?
            }
            "my" => {
                let context = require(context, "my")?;
                let Some((method, rest)) = args.split_first() else {
                    return Err(RuntimeError::wrong_args("my method ?arg ...?"));
                };
                dispatch::invoke_in_scope(
                    foundation,
                    self,
                    context.receiver(),
                    &method.to_string(),
                    rest,
                    CallKind::Private,
                    context.private_scope(),
                )?
            }
            "self" => cmd_self(foundation, require(context, "self")?, args)?,
            "callchain" => render_call_chain(foundation, require(context, "callchain")?.chain()),
            "oo::define" => self.cmd_define(foundation, context, args, false)?,
            "oo::objdefine" => self.cmd_define(foundation, context, args, true)?,
            "oo::copy" => {
                arity(args, 1, Some(2), "oo::copy sourceObject ?targetObject?")?;
                let source = foundation.resolve(&args[0].to_string())?;
                let name = args.get(1).map(Value::to_string);
                let copy = lifecycle::copy_object(foundation, self, source, name.as_deref())?;
                Value::string(foundation.display_name(copy))
            }
            _ => self.call_object(foundation, context, &command, args)?,
        };
        Ok(Flow::Normal(value))
    }

    fn cmd_set(&mut self, args: &[Value]) -> Result<Value> {
        arity(args, 1, Some(2), "set varName ?newValue?")?;
        let name = args[0].to_string();
        match args.get(1) {
            Some(value) => {
                self.write_variable(&name, value.clone());
                Ok(value.clone())
            }
            None => self.read_variable(&name),
        }
    }

    fn cmd_lappend(&mut self, args: &[Value]) -> Result<Value> {
        arity(args, 1, None, "lappend varName ?value ...?")?;
        let name = args[0].to_string();
        let mut items = match self.read_variable(&name) {
            Ok(current) => current.as_list()?,
            Err(_) => Vec::new(),
        };
        items.extend_from_slice(&args[1..]);
        let value = Value::List(items);
        self.write_variable(&name, value.clone());
        Ok(value)
    }

    fn cmd_append(&mut self, args: &[Value]) -> Result<Value> {
        arity(args, 1, None, "append varName ?value ...?")?;
        let name = args[0].to_string();
        let mut text = self
            .read_variable(&name)
            .map(|current| current.to_string())
            .unwrap_or_default();
        for value in &args[1..] {
            text.push_str(&value.to_string());
        }
        let value = Value::String(text);
        self.write_variable(&name, value.clone());
        Ok(value)
    }

    fn cmd_incr(&mut self, args: &[Value]) -> Result<Value> {
        arity(args, 1, Some(2), "incr varName ?increment?")?;
        let name = args[0].to_string();
        let current = match self.read_variable(&name) {
            Ok(value) => value.as_integer()?,
            Err(_) => 0,
        };
        let amount = match args.get(1) {
            Some(amount) => amount.as_integer()?,
            None => 1,
        };
        let Some(sum) = current.checked_add(amount) else {
            return Err(RuntimeError::script_with_code(
                "integer value too large to represent",
                vec!["ARITH".to_string(), "IOVERFLOW".to_string()],
            ));
        };
        let value = Value::integer(sum);
        self.write_variable(&name, value.clone());
        Ok(value)
    }

    fn cmd_catch(
        &mut self,
        foundation: &mut Foundation,
        context: Option<&mut CallContext>,
        args: &[Value],
    ) -> Result<Value> {
        arity(args, 1, Some(3), "catch script ?resultVarName? ?optionVarName?")?;
        let (code, value, error_code) =
            match self.eval_script(foundation, context, &args[0].to_string()) {
                Ok(Flow::Normal(value)) => (0, value, Vec::new()),
                Ok(Flow::Return(value)) => (2, value, Vec::new()),
                Err(error) => (1, Value::string(error.to_string()), error.error_code()),
            };

        if let Some(name) = args.get(1) {
            self.write_variable(&name.to_string(), value);
        }
        if let Some(name) = args.get(2) {
            let options = Value::list(vec![
                Value::from("-code"),
                Value::integer(code),
                Value::from("-errorcode"),
                Value::list(error_code.into_iter().map(Value::String)),
            ]);
            self.write_variable(&name.to_string(), options);
        }
        Ok(Value::integer(code))
    }

    fn cmd_define(
        &mut self,
        foundation: &mut Foundation,
        mut context: Option<&mut CallContext>,
        args: &[Value],
        object_level: bool,
    ) -> Result<Value> {
        let command = if object_level { "oo::objdefine" } else { "oo::define" };
        let Some((target, rest)) = args.split_first() else {
            return Err(RuntimeError::wrong_args(format!(
                "{command} objectName arg ?arg ...?"
            )));
        };
        let target = if object_level {
            Declarer::Object(foundation.resolve(&target.to_string())?)
        } else {
            Declarer::Class(foundation.resolve_class(&target.to_string())?)
        };

        match rest {
            [] => {
                return Err(RuntimeError::wrong_args(format!(
                    "{command} objectName arg ?arg ...?"
                )));
            }
            [script] => {
                for definition in parse_script(&script.to_string())? {
                    let words =
                        self.substitute_words(foundation, context.as_deref_mut(), &definition)?;
                    apply_definition(foundation, target, &words)?;
                }
            }
            words => apply_definition(foundation, target, words)?,
        }
        Ok(Value::Empty)
    }

    fn call_object(
        &mut self,
        foundation: &mut Foundation,
        context: Option<&mut CallContext>,
        command: &str,
        args: &[Value],
    ) -> Result<Value> {
        let Some(receiver) = foundation.lookup(command) else {
            return Err(RuntimeError::script_with_code(
                format!("invalid command name \"{command}\""),
                vec![
                    "TCL".into(),
                    "LOOKUP".into(),
                    "COMMAND".into(),
                    command.into(),
                ],
            ));
        };
        let Some((method, rest)) = args.split_first() else {
            return Err(RuntimeError::wrong_args(format!("{command} method ?arg ...?")));
        };
        let scope = context.and_then(|context| context.private_scope());
        dispatch::invoke_in_scope(
            foundation,
            self,
            receiver,
            &method.to_string(),
            rest,
            CallKind::Public,
            scope,
        )
    }
}

impl Evaluator for ScriptEvaluator {
    fn eval_body(
        &mut self,
        foundation: &mut Foundation,
        context: &mut CallContext,
        method: &ProcedureMethod,
        bindings: Vec<(String, Value)>,
    ) -> Result<Value> {
        self.frames.push(bindings.into_iter().collect());
        let result = self.eval_script(foundation, Some(context), method.body());
        self.frames.pop();
        Ok(result?.into_value())
    }

    fn eval_command(
        &mut self,
        foundation: &mut Foundation,
        context: &mut CallContext,
        words: Vec<Value>,
    ) -> Result<Value> {
        Ok(self.run_command(foundation, Some(context), words)?.into_value())
    }
}

fn require<'a>(
    context: Option<&'a mut CallContext>,
    command: &str,
) -> Result<&'a mut CallContext> {
    context.ok_or_else(|| RuntimeError::NoCallContext {
        command: command.to_string(),
    })
}

fn arity(args: &[Value], min: usize, max: Option<usize>, usage: &str) -> Result<()> {
    if args.len() < min || max.is_some_and(|max| args.len() > max) {
        return Err(RuntimeError::wrong_args(usage));
    }
    Ok(())
}

fn cmd_string(args: &[Value]) -> Result<Value> {
    let Some((subcommand, rest)) = args.split_first() else {
        return Err(RuntimeError::wrong_args("string subcommand ?arg ...?"));
    };
    match (subcommand.to_string().as_str(), rest) {
        ("cat", parts) => Ok(Value::String(parts.iter().map(Value::to_string).collect())),
        ("length", [text]) => Ok(Value::integer(text.to_string().chars().count() as i64)),
        ("toupper", [text]) => Ok(Value::String(text.to_string().to_uppercase())),
        ("tolower", [text]) => Ok(Value::String(text.to_string().to_lowercase())),
        ("equal", [a, b]) => Ok(Value::Boolean(a.to_string() == b.to_string())),
        ("match", [pattern, text]) => Ok(Value::Boolean(glob_match(
            &pattern.to_string(),
            &text.to_string(),
        ))),
        (subcommand, _) => Err(RuntimeError::script(format!(
            "unknown or malformed string subcommand \"{subcommand}\""
        ))),
    }
}

/// `*` and `?` wildcards only
fn glob_match(pattern: &str, text: &str) -> bool {
    fn matches(pattern: &[char], text: &[char]) -> bool {
        match pattern.split_first() {
            None => text.is_empty(),
            Some(('*', rest)) => (0..=text.len()).any(|skip| matches(rest, &text[skip..])),
            Some(('?', rest)) => !text.is_empty() && matches(rest, &text[1..]),
            Some((c, rest)) => text.first() == Some(c) && matches(rest, &text[1..]),
        }
    }
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    matches(&pattern, &text)
}

fn cmd_lindex(args: &[Value]) -> Result<Value> {
    arity(args, 2, Some(2), "lindex list index")?;
    let items = args[0].as_list()?;
    let index = match args[1].to_string().as_str() {
        "end" => items.len().checked_sub(1),
        _ => usize::try_from(args[1].as_integer()?).ok(),
    };
    Ok(index
        .and_then(|index| items.get(index).cloned())
        .unwrap_or_default())
}

fn cmd_concat(args: &[Value]) -> Value {
    let joined = args
        .iter()
        .map(|value| value.to_string().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    Value::String(joined)
}

fn cmd_error(args: &[Value]) -> Result<RuntimeError> {
    arity(args, 1, Some(3), "error message ?errorInfo? ?errorCode?")?;
    let message = args[0].to_string();
    Ok(match args.get(2) {
        Some(code) => RuntimeError::script_with_code(
            message,
            code.as_list()?.iter().map(Value::to_string).collect(),
        ),
        None => RuntimeError::script(message),
    })
}

fn cmd_self(foundation: &Foundation, context: &CallContext, args: &[Value]) -> Result<Value> {
    let subcommand = args
        .first()
        .map(Value::to_string)
        .unwrap_or_else(|| "object".to_string());
    let name_of = |id: ObjectId| Value::string(foundation.display_name(id));

    match subcommand.as_str() {
        "object" => Ok(name_of(context.receiver())),
        "namespace" => Ok(Value::string(
            foundation.try_object(context.receiver())?.namespace().as_ref(),
        )),
        "method" => Ok(Value::string(context.method_name().as_ref())),
        "class" => match context.declarer() {
            Declarer::Class(class) => Ok(name_of(class)),
            Declarer::Object(_) => Err(RuntimeError::script("method not defined by a class")),
        },
        "next" => Ok(match context.next_entry() {
            Some(entry) => Value::list(vec![
                name_of(entry.method.declarer().id()),
                Value::string(entry.method.name().as_ref()),
            ]),
            None => Value::Empty,
        }),
        "call" => Ok(Value::list(vec![
            render_call_chain(foundation, context.chain()),
            Value::integer(context.index() as i64),
        ])),
        "filter" => {
            if !context.is_filter() {
                return Err(RuntimeError::script("not inside a filtering context"));
            }
            let entry = context.current_entry();
            let (declarer, level) = match entry.filter_declarer {
                Some(class) => (name_of(class), "class"),
                None => (name_of(context.receiver()), "object"),
            };
            Ok(Value::list(vec![
                declarer,
                Value::from(level),
                Value::string(entry.method.name().as_ref()),
            ]))
        }
        "target" => {
            if !context.is_filter() {
                return Err(RuntimeError::script("not inside a filtering context"));
            }
            let target = context.chain().entries()[context.index()..]
                .iter()
                .find(|entry| !entry.is_filter);
            Ok(match target {
                Some(entry) => Value::list(vec![
                    name_of(entry.method.declarer().id()),
                    Value::string(entry.method.name().as_ref()),
                ]),
                None => Value::Empty,
            })
        }
        other => Err(RuntimeError::script(format!(
            "bad self subcommand \"{other}\": must be call, class, filter, method, namespace, next, object or target"
        ))),
    }
}

/// Apply one definition command (`method`, `superclass`, ...) to `target`
fn apply_definition(foundation: &mut Foundation, target: Declarer, words: &[Value]) -> Result<()> {
    let Some((command, rest)) = words.split_first() else {
        return Ok(());
    };
    let strings: Vec<String> = rest.iter().map(Value::to_string).collect();
    let names: Vec<&str> = strings.iter().map(String::as_str).collect();

    match (command.to_string().as_str(), names.as_slice()) {
        ("method", [name, params, body]) => {
            let kind = MethodKind::procedure(ParamSpec::parse(params)?, *body);
            define::define_method(foundation, target, name, kind, None)?;
        }
        ("private", ["method", name, params, body]) => {
            let kind = MethodKind::procedure(ParamSpec::parse(params)?, *body);
            define::define_method(foundation, target, name, kind, Some(Visibility::Private))?;
        }
        ("forward", [name, _, ..]) => {
            let kind = MethodKind::forward(rest[1..].to_vec())?;
            define::define_method(foundation, target, name, kind, None)?;
        }
        ("constructor", [params, body]) => {
            let kind = MethodKind::procedure(ParamSpec::parse(params)?, *body);
            define::set_constructor(foundation, class_of(target)?, Some(kind))?;
        }
        ("destructor", [body]) => {
            let kind = MethodKind::procedure(ParamSpec::new(), *body);
            define::set_destructor(foundation, class_of(target)?, Some(kind))?;
        }
        ("superclass", names) => {
            let class = class_of(target)?;
            let (mode, names) = split_mode(names);
            let classes = resolve_classes(foundation, names)?;
            match mode {
                "-set" => graph::set_superclasses(foundation, class, &classes)?,
                "-append" => {
                    for superclass in classes {
                        graph::add_superclass(foundation, class, superclass)?;
                    }
                }
                "-remove" => {
                    for superclass in classes {
                        graph::remove_superclass(foundation, class, superclass)?;
                    }
                }
                other => return Err(bad_mode(other)),
            }
        }
        ("mixin", names) => {
            let (mode, names) = split_mode(names);
            let classes = resolve_classes(foundation, names)?;
            match mode {
                "-set" => graph::set_mixins(foundation, target, &classes)?,
                "-append" => {
                    for mixin in classes {
                        graph::add_mixin(foundation, target, mixin)?;
                    }
                }
                "-remove" => {
                    for mixin in classes {
                        graph::remove_mixin(foundation, target, mixin)?;
                    }
                }
                other => return Err(bad_mode(other)),
            }
        }
        ("filter", names) => {
            let (mode, names) = split_mode(names);
            match mode {
                "-set" => define::set_filters(foundation, target, names)?,
                "-append" => {
                    for name in names {
                        define::add_filter(foundation, target, name)?;
                    }
                }
                "-remove" => {
                    for name in names {
                        define::remove_filter(foundation, target, name)?;
                    }
                }
                other => return Err(bad_mode(other)),
            }
        }
        ("export", names) => define::export_methods(foundation, target, names)?,
        ("unexport", names) => define::unexport_methods(foundation, target, names)?,
        ("deletemethod", names) => {
            for name in names {
                define::undefine_method(foundation, target, name)?;
            }
        }
        ("renamemethod", [from, to]) => define::rename_method(foundation, target, from, to)?,
        ("variable", names) => define::set_variables(foundation, target, names)?,
        ("class", [class]) if !target.is_class() => {
            let class = foundation.resolve_class(class)?;
            graph::change_class(foundation, target.id(), class)?;
        }
        (command, _) => {
            return Err(RuntimeError::invalid_definition(format!(
                "unknown or malformed definition \"{command}\""
            )));
        }
    }
    Ok(())
}

fn class_of(target: Declarer) -> Result<ObjectId> {
    match target {
        Declarer::Class(class) => Ok(class),
        Declarer::Object(_) => Err(RuntimeError::invalid_definition(
            "this definition only applies to classes",
        )),
    }
}

fn split_mode<'a>(names: &'a [&'a str]) -> (&'a str, &'a [&'a str]) {
    match names.split_first() {
        Some((mode, rest)) if mode.starts_with('-') => (*mode, rest),
        _ => ("-set", names),
    }
}

fn bad_mode(mode: &str) -> RuntimeError {
    RuntimeError::invalid_definition(format!(
        "unknown slot operation \"{mode}\": must be -append, -remove or -set"
    ))
}

fn resolve_classes(foundation: &Foundation, names: &[&str]) -> Result<Vec<ObjectId>> {
    names
        .iter()
        .map(|name| foundation.resolve_class(name))
        .collect()
}

/// Errors that can occur during harness operations
#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error("Evaluation error: {source}")]
    Evaluation {
        #[from]
        source: RuntimeError,
    },

    #[error("Assertion failed: expected {expected}, but got {actual}")]
    AssertionFailed { expected: String, actual: String },

    #[error("Object not found: {name}")]
    ObjectNotFound { name: String },

    #[error("Variable not found: {name}")]
    VariableNotFound { name: String },
}

/// A foundation and an evaluator, driven together by scripts
pub struct ScriptSession {
    foundation: Foundation,
    evaluator: ScriptEvaluator,
}

impl ScriptSession {
    /// Create a session with a default-configured foundation
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            foundation: Foundation::with_config(config),
            evaluator: ScriptEvaluator::new(),
        }
    }

    /// Evaluate a script at top level
    pub fn eval(&mut self, script: &str) -> std::result::Result<Value, HarnessError> {
        Ok(self.evaluator.eval(&mut self.foundation, script)?)
    }

    /// Evaluate a script that is expected to fail, returning its error
    pub fn eval_error(&mut self, script: &str) -> std::result::Result<RuntimeError, HarnessError> {
        match self.evaluator.eval(&mut self.foundation, script) {
            Ok(value) => Err(HarnessError::AssertionFailed {
                expected: "an error".to_string(),
                actual: value.to_string(),
            }),
            Err(error) => Ok(error),
        }
    }

    /// Evaluate a script and compare its result's string form
    pub fn assert_evaluates_to(
        &mut self,
        script: &str,
        expected: &str,
    ) -> std::result::Result<(), HarnessError> {
        let actual = self.eval(script)?.to_string();
        if actual != expected {
            return Err(HarnessError::AssertionFailed {
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }

    pub fn global(&self, name: &str) -> std::result::Result<Value, HarnessError> {
        self.evaluator
            .global(name)
            .ok_or_else(|| HarnessError::VariableNotFound {
                name: name.to_string(),
            })
    }

    /// Look up a live object by name
    pub fn object(&self, name: &str) -> std::result::Result<ObjectId, HarnessError> {
        self.foundation
            .lookup(name)
            .ok_or_else(|| HarnessError::ObjectNotFound {
                name: name.to_string(),
            })
    }

    pub fn foundation(&self) -> &Foundation {
        &self.foundation
    }

    pub fn foundation_mut(&mut self) -> &mut Foundation {
        &mut self.foundation
    }

    pub fn evaluator(&self) -> &ScriptEvaluator {
        &self.evaluator
    }

    /// Both halves at once, for calling runtime operations directly
    pub fn parts(&mut self) -> (&mut Foundation, &mut ScriptEvaluator) {
        (&mut self.foundation, &mut self.evaluator)
    }

    /// Destroy every object, bootstrap classes last
    pub fn shutdown(&mut self) {
        self.foundation.shutdown(&mut self.evaluator);
    }
}

impl Default for ScriptSession {
    fn default() -> Self {
        Self::new()
    }
}
