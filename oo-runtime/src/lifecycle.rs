//! Object creation, copying and teardown.
//!
//! Teardown is ordered so that no live record ever refers to a freed one:
//! a class first deals with its subclasses, then the objects it is mixed
//! into, then its instances, and only then releases its own edges and
//! tables. The arena slot itself is reclaimed when the last strong
//! reference (existence plus any in-flight calls) is dropped.

use crate::builder;
use crate::chain::CallKind;
use crate::config::ClassDeletionPolicy;
use crate::dispatch::{self, Evaluator};
use crate::error::{Result, RuntimeError};
use crate::foundation::Foundation;
use crate::graph;
use crate::method::{Declarer, MethodRef};
use crate::object::{Name, ObjectId};
use crate::value::Value;
use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use std::rc::Rc;
use tracing::{debug, warn};

/// Create an instance of `class`, running its constructor chain with `args`
pub fn create_object(
    foundation: &mut Foundation,
    evaluator: &mut dyn Evaluator,
    class: ObjectId,
    name: Option<&str>,
    args: &[Value],
) -> Result<ObjectId> {
    let class_name = Rc::clone(foundation.try_class(class)?.name());
    let mut call_site = vec![Value::string(class_name.as_ref())];
    match name {
        Some(name) => {
            call_site.push(Value::from("create"));
            call_site.push(Value::from(name));
        }
        None => call_site.push(Value::from("new")),
    }
    let skip = call_site.len();
    call_site.extend_from_slice(args);

    let id = allocate_instance(foundation, class, name)?;
    let object_name = Rc::clone(foundation.record(id).name());
    debug!(object = %object_name, class = %class_name, "created object");

    let chain = builder::lifecycle_chain(foundation, id, CallKind::Constructor);
    if let Err(error) = dispatch::run_chain(foundation, evaluator, id, chain, call_site, skip) {
        abandon(foundation, evaluator, id);
        return Err(RuntimeError::construction_failure(&object_name, error));
    }

    if !foundation.is_alive(id) || foundation.record(id).flags.destructing {
        return Err(RuntimeError::object_deleted(&object_name));
    }
    Ok(id)
}

/// Create an instance with a generated name
pub fn new_object(
    foundation: &mut Foundation,
    evaluator: &mut dyn Evaluator,
    class: ObjectId,
    args: &[Value],
) -> Result<ObjectId> {
    create_object(foundation, evaluator, class, None, args)
}

/// Allocate the record and its class edges, with no constructor run
fn allocate_instance(
    foundation: &mut Foundation,
    class: ObjectId,
    name: Option<&str>,
) -> Result<ObjectId> {
    let object_class = foundation.object_class();
    let class_class = foundation.class_class();
    if foundation.record(class).flags.destructing {
        return Err(RuntimeError::object_deleted(foundation.record(class).name()));
    }

    let is_class = graph::is_subclass_of(foundation, class, class_class);
    let id = foundation.allocate(name, class, is_class)?;
    graph::register_instance(foundation, class, id);
    if is_class {
        foundation.class_data_mut(id).superclasses.push(object_class);
        foundation.class_data_mut(object_class).subclasses.push(id);
    }
    Ok(id)
}

/// Tear down an object whose construction did not complete
fn abandon(foundation: &mut Foundation, evaluator: &mut dyn Evaluator, id: ObjectId) {
    if let Some(object) = foundation.get_mut(id) {
        object.flags.destructor_called = true;
    }
    if let Err(error) = destroy_object(foundation, evaluator, id) {
        warn!(handle = %id, %error, "teardown after failed construction reported an error");
    }
}

/// Destroy an object or class.
///
/// Repeated requests are no-ops. The destructor chain runs at most once;
/// if it fails the object is still fully torn down and the failure is
/// returned afterwards.
pub fn destroy_object(
    foundation: &mut Foundation,
    evaluator: &mut dyn Evaluator,
    id: ObjectId,
) -> Result<()> {
    let Some(object) = foundation.get(id) else {
        return Ok(());
    };
    if object.flags.destructing || object.flags.deleted {
        return Ok(());
    }
    if object.is_root() && !foundation.is_shutting_down() {
        return Err(RuntimeError::RootProtected {
            name: object.name().to_string(),
        });
    }
    let name = Rc::clone(object.name());
    let run_destructor = !object.flags.destructor_called;

    let record = foundation.record_mut(id);
    record.flags.destructing = true;
    record.flags.destructor_called = true;

    let mut destructor_error = None;
    if run_destructor {
        let chain = builder::lifecycle_chain(foundation, id, CallKind::Destructor);
        let words = vec![Value::string(name.as_ref()), Value::from("destroy")];
        if let Err(error) = dispatch::run_chain(foundation, evaluator, id, chain, words, 2) {
            destructor_error = Some(error);
        }
    }

    if foundation.record(id).is_class() {
        release_dependents(foundation, evaluator, id);
    }
    release_record(foundation, id);
    debug!(object = %name, "destroyed object");

    match destructor_error {
        Some(error) => Err(RuntimeError::destructor_failure(&name, error)),
        None => Ok(()),
    }
}

/// Destroy as part of a cascade; failures are logged, not propagated
fn destroy_dependent(foundation: &mut Foundation, evaluator: &mut dyn Evaluator, id: ObjectId) {
    let name = foundation.display_name(id);
    if let Err(error) = destroy_object(foundation, evaluator, id) {
        warn!(object = %name, %error, "error while destroying dependent object");
    }
}

/// Deal with subclasses, mixin targets and instances, in that order.
///
/// Destructors run along the way may add edges, so the lists are re-read
/// until a pass finds nothing it has not already handled.
fn release_dependents(foundation: &mut Foundation, evaluator: &mut dyn Evaluator, class: ObjectId) {
    let mut handled = vec![class];
    loop {
        let Some(data) = foundation.get(class).and_then(|object| object.class_data()) else {
            return;
        };
        let fresh = |ids: &[ObjectId]| -> Vec<ObjectId> {
            ids.iter().copied().filter(|id| !handled.contains(id)).collect()
        };
        let subclasses = fresh(&data.subclasses);
        let mixin_targets = fresh(&data.mixin_targets);
        let instances = fresh(&data.instances);
        if subclasses.is_empty() && mixin_targets.is_empty() && instances.is_empty() {
            return;
        }

        handled.extend(&subclasses);
        handled.extend(&mixin_targets);
        handled.extend(&instances);
        release_subclasses(foundation, evaluator, class, subclasses);
        for target in mixin_targets {
            if foundation.get(target).is_some() {
                graph::detach_mixin_target(foundation, target, class);
            }
        }
        release_instances(foundation, evaluator, class, instances);
    }
}

fn release_subclasses(
    foundation: &mut Foundation,
    evaluator: &mut dyn Evaluator,
    class: ObjectId,
    subclasses: Vec<ObjectId>,
) {
    let policy = foundation.config().deletion_policy;
    for subclass in subclasses {
        match policy {
            ClassDeletionPolicy::DestroyDependents => {
                destroy_dependent(foundation, evaluator, subclass)
            }
            ClassDeletionPolicy::DetachDependents => {
                if foundation.is_alive(subclass) {
                    graph::detach_superclass(foundation, subclass, class);
                }
            }
        }
    }
}

fn release_instances(
    foundation: &mut Foundation,
    evaluator: &mut dyn Evaluator,
    class: ObjectId,
    instances: Vec<ObjectId>,
) {
    let object_class = foundation.object_class();
    let class_class = foundation.class_class();
    let policy = foundation.config().deletion_policy;
    for instance in instances {
        match policy {
            ClassDeletionPolicy::DestroyDependents => {
                destroy_dependent(foundation, evaluator, instance)
            }
            ClassDeletionPolicy::DetachDependents => {
                let Some(object) = foundation.get(instance) else {
                    continue;
                };
                if object.flags.deleted {
                    continue;
                }
                let fallback = if object.is_class() {
                    class_class
                } else {
                    object_class
                };
                if fallback != class && foundation.is_alive(fallback) {
                    graph::reassign_class(foundation, instance, fallback);
                } else {
                    destroy_dependent(foundation, evaluator, instance);
                }
            }
        }
    }
}

/// Release every edge, table and cache, then drop the existence reference
fn release_record(foundation: &mut Foundation, id: ObjectId) {
    let object = foundation.record(id);
    let class = object.class;
    let object_mixins = object.mixins.clone();
    let (superclasses, class_mixins, subclasses) = match object.class_data() {
        Some(data) => (
            data.superclasses.clone(),
            data.mixins.clone(),
            data.subclasses.clone(),
        ),
        None => Default::default(),
    };
    let is_class = object.is_class();

    graph::deregister_instance(foundation, class, id);
    for mixin in object_mixins {
        graph::unlink_mixin(foundation, Declarer::Object(id), mixin);
    }
    for mixin in class_mixins {
        graph::unlink_mixin(foundation, Declarer::Class(id), mixin);
    }
    for superclass in superclasses {
        if let Some(data) = foundation.get_mut(superclass).and_then(|o| o.class_data_mut()) {
            data.subclasses.retain(|&sub| sub != id);
        }
    }
    // Subclasses left behind by shutdown ordering lose the edge
    for subclass in subclasses {
        if let Some(data) = foundation.get_mut(subclass).and_then(|o| o.class_data_mut()) {
            data.superclasses.retain(|&sup| sup != id);
        }
    }

    foundation.unregister_name(id);
    let record = foundation.record_mut(id);
    record.methods.clear();
    record.mixins.clear();
    record.filters.clear();
    record.chain_cache.clear();
    record.metadata.clear();
    record.flags.deleted = true;
    if let Some(data) = record.class_data_mut() {
        data.superclasses.clear();
        data.subclasses.clear();
        data.instances.clear();
        data.mixins.clear();
        data.mixin_targets.clear();
        data.clear_tables();
    }

    if is_class {
        foundation.bump_epoch();
    }
    foundation.release(id);
}

/// Copy an object (and its class contents when it is a class), then run
/// the `<cloned>` pseudo-constructor on the copy with the source's name
pub fn copy_object(
    foundation: &mut Foundation,
    evaluator: &mut dyn Evaluator,
    source: ObjectId,
    name: Option<&str>,
) -> Result<ObjectId> {
    let original = foundation.try_object(source)?;
    if original.is_root() {
        return Err(RuntimeError::invalid_definition(format!(
            "may not copy the root class \"{}\"",
            original.name()
        )));
    }
    let source_name = Rc::clone(original.name());
    let class = original.class;

    let copy = allocate_instance(foundation, class, name)?;
    // allocate_instance gave a new class the implicit root superclass
    if let Some(superclasses) = foundation
        .record(copy)
        .class_data()
        .map(|data| data.superclasses.clone())
    {
        for superclass in superclasses {
            if let Some(data) = foundation.get_mut(superclass).and_then(|o| o.class_data_mut()) {
                data.subclasses.retain(|&sub| sub != copy);
            }
        }
        foundation.class_data_mut(copy).superclasses.clear();
    }

    let original = foundation.record(source);
    let methods = redeclare(&original.methods, Declarer::Object(copy));
    let mixins = original.mixins.clone();
    let filters = original.filters.clone();
    let variables = original.variables.clone();
    let metadata = original.metadata.duplicate();
    let use_class_cache = original.flags.use_class_cache;

    let record = foundation.record_mut(copy);
    record.methods = methods;
    record.filters = filters;
    record.variables = variables;
    record.metadata = metadata;
    record.flags.use_class_cache = use_class_cache;
    for mixin in mixins {
        graph::link_mixin(foundation, Declarer::Object(copy), mixin);
    }

    if foundation.record(source).is_class() {
        copy_class_contents(foundation, source, copy);
    }
    foundation.bump_epoch();
    debug!(source = %source_name, copy = %foundation.display_name(copy), "copied object");

    let cloned = Rc::clone(foundation.cloned_name());
    let args = [Value::string(source_name.as_ref())];
    if let Err(error) = dispatch::invoke(foundation, evaluator, copy, &cloned, &args, CallKind::Private) {
        if let Some(object) = foundation.get_mut(copy) {
            object.flags.destructor_called = true;
        }
        destroy_dependent(foundation, evaluator, copy);
        return Err(error);
    }
    Ok(copy)
}

fn redeclare(methods: &IndexMap<Name, MethodRef>, declarer: Declarer) -> IndexMap<Name, MethodRef> {
    methods
        .iter()
        .map(|(name, method)| (Rc::clone(name), Rc::new(method.redeclared(declarer))))
        .collect()
}

fn copy_class_contents(foundation: &mut Foundation, source: ObjectId, copy: ObjectId) {
    let Some(data) = foundation.record(source).class_data() else {
        return;
    };
    let superclasses = data.superclasses.clone();
    let mixins = data.mixins.clone();
    let filters = data.filters.clone();
    let variables = data.variables.clone();
    let metadata = data.metadata.duplicate();
    let methods = redeclare(&data.methods, Declarer::Class(copy));
    let constructor = data
        .constructor
        .as_ref()
        .map(|method| Rc::new(method.redeclared(Declarer::Class(copy))));
    let destructor = data
        .destructor
        .as_ref()
        .map(|method| Rc::new(method.redeclared(Declarer::Class(copy))));

    let target = foundation.class_data_mut(copy);
    target.filters = filters;
    target.variables = variables;
    target.metadata = metadata;
    target.methods = methods;
    target.constructor = constructor;
    target.destructor = destructor;

    for superclass in superclasses {
        foundation.class_data_mut(copy).superclasses.push(superclass);
        if let Some(data) = foundation.get_mut(superclass).and_then(|o| o.class_data_mut()) {
            data.subclasses.push(copy);
        }
    }
    for mixin in mixins {
        graph::link_mixin(foundation, Declarer::Class(copy), mixin);
    }
}

impl Foundation {
    /// Destroy every remaining object, dependents first, then the two
    /// bootstrap classes
    pub fn shutdown(&mut self, evaluator: &mut dyn Evaluator) {
        self.begin_shutdown();
        let object_class = self.object_class();
        let class_class = self.class_class();

        let mut dependencies: DiGraphMap<ObjectId, ()> = DiGraphMap::new();
        let live: Vec<ObjectId> = self
            .objects()
            .into_iter()
            .filter(|&id| id != object_class && id != class_class)
            .collect();
        for &id in &live {
            dependencies.add_node(id);
            let object = self.record(id);
            let mut add = |to: ObjectId| {
                if to != id && to != object_class && to != class_class {
                    dependencies.add_edge(id, to, ());
                }
            };
            add(object.class);
            object.mixins.iter().copied().for_each(&mut add);
            if let Some(data) = object.class_data() {
                data.superclasses.iter().copied().for_each(&mut add);
                data.mixins.iter().copied().for_each(&mut add);
            }
        }

        let order = match toposort(&dependencies, None) {
            Ok(order) => order,
            Err(cycle) => {
                warn!(handle = %cycle.node_id(), "dependency cycle at shutdown; destroying newest first");
                live.into_iter().rev().collect()
            }
        };

        for id in order {
            if self.is_alive(id) {
                destroy_dependent(self, evaluator, id);
            }
        }
        for root in [class_class, object_class] {
            if self.is_alive(root) {
                destroy_dependent(self, evaluator, root);
            }
        }
        debug!(remaining = self.object_count(), "object system shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define::{define_method, set_constructor, set_destructor};
    use crate::method::{MethodKind, ParamSpec};
    use crate::test_harness::ScriptEvaluator;
    use pretty_assertions::assert_eq;

    fn class(foundation: &mut Foundation, name: &str) -> ObjectId {
        let class_class = foundation.class_class();
        create_object(foundation, &mut ScriptEvaluator::new(), class_class, Some(name), &[])
            .unwrap()
    }

    #[test]
    fn test_instances_register_with_their_class() {
        let mut foundation = Foundation::new();
        let mut evaluator = ScriptEvaluator::new();
        let widget = class(&mut foundation, "Widget");
        let w = create_object(&mut foundation, &mut evaluator, widget, Some("w"), &[]).unwrap();
        let generated = new_object(&mut foundation, &mut evaluator, widget, &[]).unwrap();

        let data = foundation.get(widget).unwrap().class_data().unwrap();
        assert_eq!(data.instances(), &[w, generated]);
        assert!(foundation.get(generated).unwrap().name().starts_with("::oo::Obj"));
    }

    #[test]
    fn test_constructor_failure_tears_down() {
        let mut foundation = Foundation::new();
        let mut evaluator = ScriptEvaluator::new();
        let widget = class(&mut foundation, "Widget");
        let mixin = class(&mut foundation, "Extra");
        set_constructor(
            &mut foundation,
            widget,
            Some(MethodKind::procedure(
                ParamSpec::new(),
                "oo::objdefine [self] mixin Extra; error {bad widget}",
            )),
        )
        .unwrap();
        set_destructor(
            &mut foundation,
            widget,
            Some(MethodKind::procedure(ParamSpec::new(), "set ::destroyed 1")),
        )
        .unwrap();

        let error =
            create_object(&mut foundation, &mut evaluator, widget, Some("w"), &[]).unwrap_err();
        assert!(matches!(error, RuntimeError::ConstructionFailure { .. }));
        assert!(error.to_string().contains("bad widget"));
        assert!(foundation.lookup("w").is_none());
        assert!(foundation.get(widget).unwrap().class_data().unwrap().instances().is_empty());
        assert!(foundation.get(mixin).unwrap().class_data().unwrap().mixin_targets().is_empty());
        assert!(evaluator.global("destroyed").is_none());
    }

    #[test]
    fn test_destroy_is_idempotent_and_runs_destructor_once() {
        let mut foundation = Foundation::new();
        let mut evaluator = ScriptEvaluator::new();
        let widget = class(&mut foundation, "Widget");
        set_destructor(
            &mut foundation,
            widget,
            Some(MethodKind::procedure(ParamSpec::new(), "incr ::destroyed")),
        )
        .unwrap();
        let w = create_object(&mut foundation, &mut evaluator, widget, Some("w"), &[]).unwrap();

        destroy_object(&mut foundation, &mut evaluator, w).unwrap();
        destroy_object(&mut foundation, &mut evaluator, w).unwrap();
        assert_eq!(evaluator.global("destroyed"), Some(Value::from("1")));
        assert!(foundation.get(w).is_none());
    }

    #[test]
    fn test_destructor_error_is_reported_after_teardown() {
        let mut foundation = Foundation::new();
        let mut evaluator = ScriptEvaluator::new();
        let widget = class(&mut foundation, "Widget");
        set_destructor(
            &mut foundation,
            widget,
            Some(MethodKind::procedure(ParamSpec::new(), "error {cannot stop}")),
        )
        .unwrap();
        let w = create_object(&mut foundation, &mut evaluator, widget, Some("w"), &[]).unwrap();

        let error = destroy_object(&mut foundation, &mut evaluator, w).unwrap_err();
        assert!(matches!(error, RuntimeError::DestructorFailure { .. }));
        assert!(foundation.get(w).is_none());
    }

    #[test]
    fn test_roots_are_protected_until_shutdown() {
        let mut foundation = Foundation::new();
        let mut evaluator = ScriptEvaluator::new();
        let root = foundation.object_class();
        assert!(matches!(
            destroy_object(&mut foundation, &mut evaluator, root),
            Err(RuntimeError::RootProtected { .. })
        ));

        let widget = class(&mut foundation, "Widget");
        create_object(&mut foundation, &mut evaluator, widget, Some("w"), &[]).unwrap();
        foundation.shutdown(&mut evaluator);
        assert_eq!(foundation.object_count(), 0);
        assert!(foundation.get(root).is_none());
    }

    #[test]
    fn test_shutdown_runs_remaining_destructors() {
        let mut foundation = Foundation::new();
        let mut evaluator = ScriptEvaluator::new();
        let base = class(&mut foundation, "Base");
        let derived = class(&mut foundation, "Derived");
        graph::add_superclass(&mut foundation, derived, base).unwrap();
        set_destructor(
            &mut foundation,
            base,
            Some(MethodKind::procedure(ParamSpec::new(), "lappend ::order [self]")),
        )
        .unwrap();
        create_object(&mut foundation, &mut evaluator, derived, Some("d"), &[]).unwrap();
        create_object(&mut foundation, &mut evaluator, base, Some("b"), &[]).unwrap();

        foundation.shutdown(&mut evaluator);
        let order = evaluator.global("order").unwrap().as_list().unwrap();
        assert_eq!(order.len(), 2);
        assert!(order.contains(&Value::from("::d")));
        assert!(order.contains(&Value::from("::b")));
        assert_eq!(foundation.object_count(), 0);
    }

    #[test]
    fn test_copy_redeclares_methods() {
        let mut foundation = Foundation::new();
        let mut evaluator = ScriptEvaluator::new();
        let widget = class(&mut foundation, "Widget");
        let w = create_object(&mut foundation, &mut evaluator, widget, Some("w"), &[]).unwrap();
        define_method(
            &mut foundation,
            Declarer::Object(w),
            "hello",
            MethodKind::procedure(ParamSpec::new(), "return hi"),
            None,
        )
        .unwrap();

        let copy = copy_object(&mut foundation, &mut evaluator, w, Some("w2")).unwrap();
        let record = foundation.get(copy).unwrap();
        assert_eq!(record.class(), widget);
        assert_eq!(record.methods()["hello"].declarer(), Declarer::Object(copy));
        let result =
            dispatch::invoke(&mut foundation, &mut evaluator, copy, "hello", &[], CallKind::Public)
                .unwrap();
        assert_eq!(result, Value::from("hi"));
    }
}
