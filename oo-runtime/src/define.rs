//! Structural mutators for method tables, filters, constructors, destructors
//! and variable configuration.
//!
//! Each mutator that can change dispatch bumps the global epoch exactly once
//! on success; object-level changes also bump the object's own epoch.

use crate::error::{Result, RuntimeError};
use crate::foundation::Foundation;
use crate::method::{Declarer, Method, MethodKind, MethodRef, Visibility};
use crate::object::{Name, ObjectId, PrivateVariable, VariableConfig};
use indexmap::IndexMap;
use std::rc::Rc;
use tracing::debug;

fn validate_target(foundation: &Foundation, target: Declarer) -> Result<()> {
    match target {
        Declarer::Object(id) => foundation.try_object(id).map(|_| ()),
        Declarer::Class(id) => foundation.try_class(id).map(|_| ()),
    }
}

fn table_mut(foundation: &mut Foundation, target: Declarer) -> &mut IndexMap<Name, MethodRef> {
    match target {
        Declarer::Object(id) => &mut foundation.record_mut(id).methods,
        Declarer::Class(id) => &mut foundation.class_data_mut(id).methods,
    }
}

fn table(foundation: &Foundation, target: Declarer) -> &IndexMap<Name, MethodRef> {
    let object = foundation.record(target.id());
    match (target, object.class_data()) {
        (Declarer::Class(_), Some(data)) => &data.methods,
        _ => &object.methods,
    }
}

/// Finish a successful mutation of `target`
fn mutated(foundation: &mut Foundation, target: Declarer) {
    if let Declarer::Object(id) = target {
        foundation.record_mut(id).touch();
    }
    foundation.bump_epoch();
}

/// Insert a method without validation or epoch bump
pub(crate) fn install_method(
    foundation: &mut Foundation,
    target: Declarer,
    name: &str,
    kind: MethodKind,
    visibility: Visibility,
) -> MethodRef {
    let name: Name = Rc::from(name);
    let method = Rc::new(Method::new(Rc::clone(&name), kind, visibility, target));
    table_mut(foundation, target).insert(name, Rc::clone(&method));
    method
}

/// Define (or redefine) a method; visibility defaults from the name
pub fn define_method(
    foundation: &mut Foundation,
    target: Declarer,
    name: &str,
    kind: MethodKind,
    visibility: Option<Visibility>,
) -> Result<MethodRef> {
    validate_target(foundation, target)?;
    if name.is_empty() {
        return Err(RuntimeError::invalid_definition("method name must not be empty"));
    }
    let visibility = visibility.unwrap_or_else(|| Visibility::default_for(name));
    let method = install_method(foundation, target, name, kind, visibility);
    debug!(
        target = %foundation.display_name(target.id()),
        method = name,
        ?visibility,
        "defined method"
    );
    mutated(foundation, target);
    Ok(method)
}

/// Remove a method from its table; chains still running keep their reference
pub fn undefine_method(foundation: &mut Foundation, target: Declarer, name: &str) -> Result<()> {
    validate_target(foundation, target)?;
    if table_mut(foundation, target).shift_remove(name).is_none() {
        return Err(missing_method(name));
    }
    mutated(foundation, target);
    Ok(())
}

/// Rename a method, keeping its implementation and visibility
pub fn rename_method(
    foundation: &mut Foundation,
    target: Declarer,
    from: &str,
    to: &str,
) -> Result<()> {
    validate_target(foundation, target)?;
    let methods = table(foundation, target);
    let Some(method) = methods.get(from).cloned() else {
        return Err(missing_method(from));
    };
    if methods.contains_key(to) {
        return Err(RuntimeError::invalid_definition(format!(
            "method called {to} already exists"
        )));
    }

    let name: Name = Rc::from(to);
    let methods = table_mut(foundation, target);
    methods.shift_remove(from);
    methods.insert(Rc::clone(&name), Rc::new(method.renamed(name)));
    mutated(foundation, target);
    Ok(())
}

/// Change the visibility of a method declared by `target`
pub fn set_method_visibility(
    foundation: &mut Foundation,
    target: Declarer,
    name: &str,
    visibility: Visibility,
) -> Result<()> {
    validate_target(foundation, target)?;
    replace_visibility(foundation, target, name, visibility)?;
    mutated(foundation, target);
    Ok(())
}

fn replace_visibility(
    foundation: &mut Foundation,
    target: Declarer,
    name: &str,
    visibility: Visibility,
) -> Result<()> {
    let methods = table_mut(foundation, target);
    let Some(slot) = methods.get_mut(name) else {
        return Err(missing_method(name));
    };
    if slot.visibility() != visibility {
        *slot = Rc::new(slot.with_visibility(visibility));
    }
    Ok(())
}

/// Make methods reachable through the public command
pub fn export_methods(foundation: &mut Foundation, target: Declarer, names: &[&str]) -> Result<()> {
    change_visibility(foundation, target, names, Visibility::Public)
}

/// Hide methods from the public command
pub fn unexport_methods(
    foundation: &mut Foundation,
    target: Declarer,
    names: &[&str],
) -> Result<()> {
    change_visibility(foundation, target, names, Visibility::Unexported)
}

fn change_visibility(
    foundation: &mut Foundation,
    target: Declarer,
    names: &[&str],
    visibility: Visibility,
) -> Result<()> {
    validate_target(foundation, target)?;
    let methods = table(foundation, target);
    if let Some(missing) = names.iter().find(|name| !methods.contains_key(**name)) {
        return Err(missing_method(missing));
    }
    for name in names {
        replace_visibility(foundation, target, name, visibility)?;
    }
    mutated(foundation, target);
    Ok(())
}

fn missing_method(name: &str) -> RuntimeError {
    RuntimeError::invalid_definition(format!("method {name} does not exist"))
}

/// Set or clear a class's constructor
pub fn set_constructor(
    foundation: &mut Foundation,
    class: ObjectId,
    kind: Option<MethodKind>,
) -> Result<()> {
    foundation.try_class(class)?;
    let name = Rc::clone(foundation.constructor_name());
    let method = kind.map(|kind| {
        Rc::new(Method::new(
            name,
            kind,
            Visibility::Public,
            Declarer::Class(class),
        ))
    });
    let data = foundation.class_data_mut(class);
    data.constructor = method;
    data.constructor_chain = None;
    foundation.bump_epoch();
    Ok(())
}

/// Set or clear a class's destructor
pub fn set_destructor(
    foundation: &mut Foundation,
    class: ObjectId,
    kind: Option<MethodKind>,
) -> Result<()> {
    foundation.try_class(class)?;
    let name = Rc::clone(foundation.destructor_name());
    let method = kind.map(|kind| {
        Rc::new(Method::new(
            name,
            kind,
            Visibility::Public,
            Declarer::Class(class),
        ))
    });
    let data = foundation.class_data_mut(class);
    data.destructor = method;
    data.destructor_chain = None;
    foundation.bump_epoch();
    Ok(())
}

fn filters_mut(foundation: &mut Foundation, target: Declarer) -> &mut Vec<Name> {
    match target {
        Declarer::Object(id) => &mut foundation.record_mut(id).filters,
        Declarer::Class(id) => &mut foundation.class_data_mut(id).filters,
    }
}

/// Current filter names of an object or class
pub fn filters_of(foundation: &Foundation, target: Declarer) -> Vec<Name> {
    let Some(object) = foundation.get(target.id()) else {
        return Vec::new();
    };
    match (target, object.class_data()) {
        (Declarer::Class(_), Some(data)) => data.filters.clone(),
        (Declarer::Class(_), None) => Vec::new(),
        (Declarer::Object(_), _) => object.filters.clone(),
    }
}

/// Replace the filter list; repeated names are kept once
pub fn set_filters(foundation: &mut Foundation, target: Declarer, names: &[&str]) -> Result<()> {
    validate_target(foundation, target)?;
    let mut filters: Vec<Name> = Vec::with_capacity(names.len());
    for name in names {
        if !filters.iter().any(|existing| existing.as_ref() == *name) {
            filters.push(Rc::from(*name));
        }
    }
    *filters_mut(foundation, target) = filters;
    mutated(foundation, target);
    Ok(())
}

/// Append a filter name if it is not already present
pub fn add_filter(foundation: &mut Foundation, target: Declarer, name: &str) -> Result<()> {
    validate_target(foundation, target)?;
    let filters = filters_mut(foundation, target);
    if filters.iter().any(|existing| existing.as_ref() == name) {
        return Ok(());
    }
    filters.push(Rc::from(name));
    mutated(foundation, target);
    Ok(())
}

pub fn remove_filter(foundation: &mut Foundation, target: Declarer, name: &str) -> Result<()> {
    validate_target(foundation, target)?;
    let filters = filters_mut(foundation, target);
    let before = filters.len();
    filters.retain(|existing| existing.as_ref() != name);
    if filters.len() == before {
        return Err(RuntimeError::invalid_definition(format!(
            "filter {name} is not installed"
        )));
    }
    mutated(foundation, target);
    Ok(())
}

fn variables_mut(
    foundation: &mut Foundation,
    target: Declarer,
) -> &mut VariableConfig {
    match target {
        Declarer::Object(id) => &mut foundation.record_mut(id).variables,
        Declarer::Class(id) => &mut foundation.class_data_mut(id).variables,
    }
}

/// Replace the list of variables bound automatically in method bodies
pub fn set_variables(foundation: &mut Foundation, target: Declarer, names: &[&str]) -> Result<()> {
    validate_target(foundation, target)?;
    if let Some(bad) = names.iter().find(|name| name.contains("::") || name.contains('(')) {
        return Err(RuntimeError::invalid_definition(format!(
            "invalid declared variable name \"{bad}\": must not refer to an array element or contain namespace separators"
        )));
    }
    variables_mut(foundation, target).variables = names.iter().map(|name| Rc::from(*name)).collect();
    Ok(())
}

/// Declare a private variable and return its storage name
pub fn declare_private_variable(
    foundation: &mut Foundation,
    target: Declarer,
    name: &str,
) -> Result<Name> {
    validate_target(foundation, target)?;
    let creation_epoch = foundation.record(target.id()).creation_epoch;
    let full_name: Name = Rc::from(format!("{creation_epoch}:{name}"));
    let variables = variables_mut(foundation, target);
    if let Some(existing) = variables
        .private_variables
        .iter()
        .find(|variable| variable.name.as_ref() == name)
    {
        return Ok(Rc::clone(&existing.full_name));
    }
    variables.private_variables.push(PrivateVariable {
        name: Rc::from(name),
        full_name: Rc::clone(&full_name),
    });
    Ok(full_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::create_object;
    use crate::method::ParamSpec;
    use crate::test_harness::ScriptEvaluator;
    use pretty_assertions::assert_eq;

    fn body(text: &str) -> MethodKind {
        MethodKind::procedure(ParamSpec::new(), text)
    }

    fn setup() -> (Foundation, ObjectId) {
        let mut foundation = Foundation::new();
        let mut evaluator = ScriptEvaluator::new();
        let class_class = foundation.class_class();
        let class = create_object(&mut foundation, &mut evaluator, class_class, Some("Widget"), &[])
            .unwrap();
        (foundation, class)
    }

    #[test]
    fn test_define_sets_default_visibility() {
        let (mut foundation, class) = setup();
        let public = define_method(&mut foundation, Declarer::Class(class), "draw", body(""), None)
            .unwrap();
        let hidden = define_method(&mut foundation, Declarer::Class(class), "Layout", body(""), None)
            .unwrap();
        assert_eq!(public.visibility(), Visibility::Public);
        assert_eq!(hidden.visibility(), Visibility::Unexported);
        assert_eq!(public.declarer(), Declarer::Class(class));
    }

    #[test]
    fn test_redefinition_overwrites() {
        let (mut foundation, class) = setup();
        let target = Declarer::Class(class);
        define_method(&mut foundation, target, "draw", body("first"), None).unwrap();
        define_method(&mut foundation, target, "draw", body("second"), None).unwrap();
        let data = foundation.get(class).unwrap().class_data().unwrap();
        assert_eq!(data.methods().len(), 1);
    }

    #[test]
    fn test_definition_on_non_class_is_rejected() {
        let (mut foundation, class) = setup();
        let mut evaluator = ScriptEvaluator::new();
        let object = create_object(&mut foundation, &mut evaluator, class, Some("w"), &[]).unwrap();
        let epoch = foundation.epoch();
        let error = define_method(&mut foundation, Declarer::Class(object), "x", body(""), None)
            .unwrap_err();
        assert!(matches!(error, RuntimeError::NotAClass { .. }));
        assert_eq!(foundation.epoch(), epoch);
    }

    #[test]
    fn test_object_definitions_bump_object_epoch() {
        let (mut foundation, class) = setup();
        let mut evaluator = ScriptEvaluator::new();
        let object = create_object(&mut foundation, &mut evaluator, class, Some("w"), &[]).unwrap();
        let global = foundation.epoch();
        define_method(&mut foundation, Declarer::Object(object), "tweak", body(""), None).unwrap();
        let record = foundation.get(object).unwrap();
        assert_eq!(record.epoch(), 1);
        assert!(!record.flags().use_class_cache);
        assert_eq!(foundation.epoch(), global + 1);
    }

    #[test]
    fn test_rename_and_undefine() {
        let (mut foundation, class) = setup();
        let target = Declarer::Class(class);
        define_method(&mut foundation, target, "draw", body(""), None).unwrap();
        define_method(&mut foundation, target, "paint", body(""), None).unwrap();

        assert!(rename_method(&mut foundation, target, "draw", "paint").is_err());
        rename_method(&mut foundation, target, "draw", "render").unwrap();
        let names: Vec<String> = foundation
            .get(class)
            .unwrap()
            .class_data()
            .unwrap()
            .methods()
            .keys()
            .map(|name| name.to_string())
            .collect();
        assert_eq!(names, vec!["paint", "render"]);

        undefine_method(&mut foundation, target, "paint").unwrap();
        assert!(undefine_method(&mut foundation, target, "paint").is_err());
    }

    #[test]
    fn test_export_and_unexport() {
        let (mut foundation, class) = setup();
        let target = Declarer::Class(class);
        define_method(&mut foundation, target, "Layout", body(""), None).unwrap();
        export_methods(&mut foundation, target, &["Layout"]).unwrap();
        let visibility = |f: &Foundation| {
            f.get(class).unwrap().class_data().unwrap().methods()["Layout"].visibility()
        };
        assert_eq!(visibility(&foundation), Visibility::Public);
        unexport_methods(&mut foundation, target, &["Layout"]).unwrap();
        assert_eq!(visibility(&foundation), Visibility::Unexported);
        assert!(export_methods(&mut foundation, target, &["missing"]).is_err());
    }

    #[test]
    fn test_filters_are_kept_once() {
        let (mut foundation, class) = setup();
        let target = Declarer::Class(class);
        set_filters(&mut foundation, target, &["log", "audit", "log"]).unwrap();
        add_filter(&mut foundation, target, "audit").unwrap();
        let names: Vec<String> = filters_of(&foundation, target)
            .iter()
            .map(|name| name.to_string())
            .collect();
        assert_eq!(names, vec!["log", "audit"]);
        remove_filter(&mut foundation, target, "log").unwrap();
        assert!(remove_filter(&mut foundation, target, "log").is_err());
    }

    #[test]
    fn test_private_variables_are_scoped_by_creation_epoch() {
        let (mut foundation, class) = setup();
        let target = Declarer::Class(class);
        let creation = foundation.get(class).unwrap().creation_epoch();
        let full = declare_private_variable(&mut foundation, target, "count").unwrap();
        assert_eq!(full.as_ref(), format!("{creation}:count"));
        let again = declare_private_variable(&mut foundation, target, "count").unwrap();
        assert_eq!(full, again);

        set_variables(&mut foundation, target, &["a", "b"]).unwrap();
        assert!(set_variables(&mut foundation, target, &["ns::x"]).is_err());
        let variables = foundation.get(class).unwrap().class_data().unwrap().variables();
        assert_eq!(variables.variables.len(), 2);
        assert_eq!(variables.private_variables.len(), 1);
    }
}
