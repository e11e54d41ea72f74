//! Inheritance and composition edges.
//!
//! Every operation here keeps both directions of an edge in step:
//! superclass/subclass, mixin/mixin-target and class/instance. Cycle checks
//! run over a petgraph snapshot of the class edges before anything is
//! changed, so a rejected mutation leaves the graph exactly as it was.

use crate::error::{Result, RuntimeError};
use crate::foundation::Foundation;
use crate::method::Declarer;
use crate::object::{Object, ObjectId};
use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

/// Directed class graph: subclass to superclass, class to class-level mixin
pub fn class_graph(foundation: &Foundation) -> DiGraphMap<ObjectId, ()> {
    let mut graph = DiGraphMap::new();
    for id in foundation.objects() {
        let Some(data) = foundation.record(id).class_data() else {
            continue;
        };
        graph.add_node(id);
        for &superclass in &data.superclasses {
            graph.add_edge(id, superclass, ());
        }
        for &mixin in &data.mixins {
            graph.add_edge(id, mixin, ());
        }
    }
    graph
}

/// Whether `class` inherits from `ancestor` through superclass edges
pub fn is_subclass_of(foundation: &Foundation, class: ObjectId, ancestor: ObjectId) -> bool {
    if class == ancestor {
        return true;
    }
    let mut pending = vec![class];
    let mut seen = Vec::new();
    while let Some(current) = pending.pop() {
        if seen.contains(&current) {
            continue;
        }
        seen.push(current);
        let Some(data) = foundation.get(current).and_then(|object| object.class_data()) else {
            continue;
        };
        for &superclass in &data.superclasses {
            if superclass == ancestor {
                return true;
            }
            pending.push(superclass);
        }
    }
    false
}

fn root_superclass_error(class: &Object) -> RuntimeError {
    RuntimeError::invalid_definition(format!(
        "may not modify the superclass of the root class \"{}\"",
        class.name
    ))
}

fn check_acyclic(foundation: &Foundation, from: ObjectId, to: ObjectId) -> Result<()> {
    let graph = class_graph(foundation);
    if from == to || has_path_connecting(&graph, to, from, None) {
        return Err(RuntimeError::graph_cycle(format!(
            "{} would depend on itself through {}",
            foundation.display_name(from),
            foundation.display_name(to)
        )));
    }
    Ok(())
}

/// Append `superclass` to `class`'s superclass list
pub fn add_superclass(
    foundation: &mut Foundation,
    class: ObjectId,
    superclass: ObjectId,
) -> Result<()> {
    let object_class = foundation.object_class();
    let subclass = foundation.try_class(class)?;
    if subclass.is_root() {
        return Err(root_superclass_error(subclass));
    }
    foundation.try_attachable_class(superclass)?;

    let current = subclass.class_data().map(|data| data.superclasses.clone()).unwrap_or_default();
    if current.contains(&superclass) {
        return Err(RuntimeError::invalid_definition(format!(
            "class \"{}\" is already a direct superclass of \"{}\"",
            foundation.display_name(superclass),
            foundation.display_name(class)
        )));
    }
    check_acyclic(foundation, class, superclass)?;

    // The implicit root superclass gives way to the first explicit one
    if current == [object_class] && superclass != object_class {
        unlink_superclass(foundation, class, object_class);
    }
    link_superclass(foundation, class, superclass);

    debug!(
        class = %foundation.display_name(class),
        superclass = %foundation.display_name(superclass),
        "added superclass"
    );
    foundation.bump_epoch();
    Ok(())
}

/// Remove `superclass` from `class`'s superclass list
pub fn remove_superclass(
    foundation: &mut Foundation,
    class: ObjectId,
    superclass: ObjectId,
) -> Result<()> {
    let subclass = foundation.try_class(class)?;
    if subclass.is_root() {
        return Err(root_superclass_error(subclass));
    }
    let present = subclass
        .class_data()
        .is_some_and(|data| data.superclasses.contains(&superclass));
    if !present {
        return Err(RuntimeError::invalid_definition(format!(
            "\"{}\" is not a superclass of \"{}\"",
            foundation.display_name(superclass),
            foundation.display_name(class)
        )));
    }

    detach_superclass(foundation, class, superclass);
    foundation.bump_epoch();
    Ok(())
}

/// Replace the whole superclass list in one mutation
pub fn set_superclasses(
    foundation: &mut Foundation,
    class: ObjectId,
    superclasses: &[ObjectId],
) -> Result<()> {
    let object_class = foundation.object_class();
    let subclass = foundation.try_class(class)?;
    if subclass.is_root() {
        return Err(root_superclass_error(subclass));
    }
    let old = subclass.class_data().map(|data| data.superclasses.clone()).unwrap_or_default();

    for (index, &superclass) in superclasses.iter().enumerate() {
        foundation.try_attachable_class(superclass)?;
        if superclasses[..index].contains(&superclass) {
            return Err(RuntimeError::invalid_definition(format!(
                "class should only be a direct superclass once: \"{}\"",
                foundation.display_name(superclass)
            )));
        }
    }

    for &superclass in &old {
        unlink_superclass(foundation, class, superclass);
    }
    let mut rejected = None;
    for &superclass in superclasses {
        if let Err(error) = check_acyclic(foundation, class, superclass) {
            rejected = Some(error);
            break;
        }
        link_superclass(foundation, class, superclass);
    }

    if let Some(error) = rejected {
        for &superclass in superclasses {
            unlink_superclass(foundation, class, superclass);
        }
        for &superclass in &old {
            link_superclass(foundation, class, superclass);
        }
        return Err(error);
    }

    if superclasses.is_empty() {
        link_superclass(foundation, class, object_class);
    }
    foundation.bump_epoch();
    Ok(())
}

/// Drop a superclass edge without validation or epoch bump; a class left
/// without superclasses falls back to the root object class
pub(crate) fn detach_superclass(foundation: &mut Foundation, class: ObjectId, superclass: ObjectId) {
    let object_class = foundation.object_class();
    unlink_superclass(foundation, class, superclass);
    let orphaned = foundation
        .get(class)
        .and_then(|object| object.class_data())
        .is_some_and(|data| data.superclasses.is_empty());
    if orphaned && class != object_class && foundation.is_alive(object_class) {
        link_superclass(foundation, class, object_class);
    }
}

fn link_superclass(foundation: &mut Foundation, class: ObjectId, superclass: ObjectId) {
    foundation.class_data_mut(class).superclasses.push(superclass);
    if let Some(data) = foundation.get_mut(superclass).and_then(|o| o.class_data_mut()) {
        data.subclasses.push(class);
    }
}

fn unlink_superclass(foundation: &mut Foundation, class: ObjectId, superclass: ObjectId) {
    if let Some(data) = foundation.get_mut(class).and_then(|o| o.class_data_mut()) {
        data.superclasses.retain(|&id| id != superclass);
    }
    if let Some(data) = foundation.get_mut(superclass).and_then(|o| o.class_data_mut()) {
        data.subclasses.retain(|&id| id != class);
    }
}

/// Mix `mixin` into an object or a class
pub fn add_mixin(foundation: &mut Foundation, target: Declarer, mixin: ObjectId) -> Result<()> {
    let id = target.id();
    foundation.try_object(id)?;
    if target.is_class() {
        foundation.try_class(id)?;
    }
    foundation.try_attachable_class(mixin)?;

    let current = mixins_of(foundation, target);
    if current.contains(&mixin) {
        return Ok(());
    }
    if target.is_class() {
        check_acyclic(foundation, id, mixin)?;
    }

    link_mixin(foundation, target, mixin);
    if !target.is_class() {
        foundation.record_mut(id).touch();
    }
    debug!(
        target = %foundation.display_name(id),
        mixin = %foundation.display_name(mixin),
        "added mixin"
    );
    foundation.bump_epoch();
    Ok(())
}

/// Remove a mixin from an object or a class
pub fn remove_mixin(foundation: &mut Foundation, target: Declarer, mixin: ObjectId) -> Result<()> {
    let id = target.id();
    foundation.try_object(id)?;
    if !mixins_of(foundation, target).contains(&mixin) {
        return Err(RuntimeError::invalid_definition(format!(
            "\"{}\" is not mixed into \"{}\"",
            foundation.display_name(mixin),
            foundation.display_name(id)
        )));
    }

    unlink_mixin(foundation, target, mixin);
    if !target.is_class() {
        foundation.record_mut(id).touch();
    }
    foundation.bump_epoch();
    Ok(())
}

/// Replace the whole mixin list of an object or class in one mutation
pub fn set_mixins(foundation: &mut Foundation, target: Declarer, mixins: &[ObjectId]) -> Result<()> {
    let id = target.id();
    foundation.try_object(id)?;
    if target.is_class() {
        foundation.try_class(id)?;
    }
    for &mixin in mixins {
        foundation.try_attachable_class(mixin)?;
    }
    let old = mixins_of(foundation, target);

    for &mixin in &old {
        unlink_mixin(foundation, target, mixin);
    }
    let mut rejected = None;
    for &mixin in mixins {
        if target.is_class() {
            if let Err(error) = check_acyclic(foundation, id, mixin) {
                rejected = Some(error);
                break;
            }
        }
        if !mixins_of(foundation, target).contains(&mixin) {
            link_mixin(foundation, target, mixin);
        }
    }

    if let Some(error) = rejected {
        for &mixin in mixins {
            unlink_mixin(foundation, target, mixin);
        }
        for &mixin in &old {
            link_mixin(foundation, target, mixin);
        }
        return Err(error);
    }

    if !target.is_class() {
        foundation.record_mut(id).touch();
    }
    foundation.bump_epoch();
    Ok(())
}

/// Current mixin list of an object or class
pub fn mixins_of(foundation: &Foundation, target: Declarer) -> Vec<ObjectId> {
    let Some(object) = foundation.get(target.id()) else {
        return Vec::new();
    };
    match target {
        Declarer::Object(_) => object.mixins.clone(),
        Declarer::Class(_) => object
            .class_data()
            .map(|data| data.mixins.clone())
            .unwrap_or_default(),
    }
}

pub(crate) fn link_mixin(foundation: &mut Foundation, target: Declarer, mixin: ObjectId) {
    let id = target.id();
    match target {
        Declarer::Object(_) => foundation.record_mut(id).mixins.push(mixin),
        Declarer::Class(_) => foundation.class_data_mut(id).mixins.push(mixin),
    }
    if let Some(data) = foundation.get_mut(mixin).and_then(|o| o.class_data_mut()) {
        if !data.mixin_targets.contains(&id) {
            data.mixin_targets.push(id);
        }
    }
}

/// Drop a mixin edge in both directions without validation or epoch bump
pub(crate) fn unlink_mixin(foundation: &mut Foundation, target: Declarer, mixin: ObjectId) {
    let id = target.id();
    let Some(object) = foundation.get_mut(id) else {
        return;
    };
    match target {
        Declarer::Object(_) => object.mixins.retain(|&m| m != mixin),
        Declarer::Class(_) => {
            if let Some(data) = object.class_data_mut() {
                data.mixins.retain(|&m| m != mixin);
            }
        }
    }

    // The target may still use the mixin at the other level
    let object = foundation.record(id);
    let still_used = object.mixins.contains(&mixin)
        || object
            .class_data()
            .is_some_and(|data| data.mixins.contains(&mixin));
    if !still_used {
        if let Some(data) = foundation.get_mut(mixin).and_then(|o| o.class_data_mut()) {
            data.mixin_targets.retain(|&t| t != id);
        }
    }
}

/// Drop every use of `mixin` by `target`, at both object and class level
pub(crate) fn detach_mixin_target(foundation: &mut Foundation, target: ObjectId, mixin: ObjectId) {
    let is_class = foundation.get(target).is_some_and(|object| object.is_class());
    unlink_mixin(foundation, Declarer::Object(target), mixin);
    if is_class {
        unlink_mixin(foundation, Declarer::Class(target), mixin);
    }
    if let Some(object) = foundation.get_mut(target) {
        object.touch();
    }
}

/// Record that `object` is an instance of `class`
pub fn register_instance(foundation: &mut Foundation, class: ObjectId, object: ObjectId) {
    if let Some(data) = foundation.get_mut(class).and_then(|o| o.class_data_mut()) {
        if !data.instances.contains(&object) {
            data.instances.push(object);
        }
    }
}

/// Forget that `object` is an instance of `class`
pub fn deregister_instance(foundation: &mut Foundation, class: ObjectId, object: ObjectId) {
    if let Some(data) = foundation.get_mut(class).and_then(|o| o.class_data_mut()) {
        data.instances.retain(|&id| id != object);
    }
}

/// Make `object` an instance of `class`
pub fn change_class(foundation: &mut Foundation, object: ObjectId, class: ObjectId) -> Result<()> {
    let class_class = foundation.class_class();
    let target = foundation.try_object(object)?;
    if target.is_root() {
        return Err(RuntimeError::invalid_definition(format!(
            "may not change the class of the root class \"{}\"",
            target.name
        )));
    }
    let object_is_class = target.is_class();
    let old_class = target.class;
    foundation.try_attachable_class(class)?;

    let class_makes_classes = is_subclass_of(foundation, class, class_class);
    if object_is_class && !class_makes_classes {
        return Err(RuntimeError::invalid_definition(
            "may not change a class object into a non-class object",
        ));
    }
    if !object_is_class && class_makes_classes {
        return Err(RuntimeError::invalid_definition(
            "may not change a non-class object into a class object",
        ));
    }
    if old_class == class {
        return Ok(());
    }

    reassign_class(foundation, object, class);
    foundation.bump_epoch();
    Ok(())
}

/// Move the instance edge without validation or epoch bump
pub(crate) fn reassign_class(foundation: &mut Foundation, object: ObjectId, class: ObjectId) {
    let old_class = foundation.record(object).class;
    deregister_instance(foundation, old_class, object);
    let record = foundation.record_mut(object);
    record.class = class;
    record.touch();
    register_instance(foundation, class, object);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::create_object;
    use crate::test_harness::ScriptEvaluator;
    use pretty_assertions::assert_eq;

    fn new_class(foundation: &mut Foundation, name: &str) -> ObjectId {
        let class_class = foundation.class_class();
        let mut evaluator = ScriptEvaluator::new();
        create_object(foundation, &mut evaluator, class_class, Some(name), &[]).unwrap()
    }

    fn superclasses(foundation: &Foundation, class: ObjectId) -> Vec<ObjectId> {
        foundation.get(class).unwrap().class_data().unwrap().superclasses().to_vec()
    }

    fn subclasses(foundation: &Foundation, class: ObjectId) -> Vec<ObjectId> {
        foundation.get(class).unwrap().class_data().unwrap().subclasses().to_vec()
    }

    #[test]
    fn test_new_class_inherits_from_root() {
        let mut foundation = Foundation::new();
        let animal = new_class(&mut foundation, "Animal");
        let root = foundation.object_class();
        assert_eq!(superclasses(&foundation, animal), vec![root]);
        assert!(subclasses(&foundation, root).contains(&animal));
    }

    #[test]
    fn test_first_superclass_replaces_root() {
        let mut foundation = Foundation::new();
        let animal = new_class(&mut foundation, "Animal");
        let dog = new_class(&mut foundation, "Dog");
        let root = foundation.object_class();

        add_superclass(&mut foundation, dog, animal).unwrap();
        assert_eq!(superclasses(&foundation, dog), vec![animal]);
        assert!(!subclasses(&foundation, root).contains(&dog));
        assert_eq!(subclasses(&foundation, animal), vec![dog]);

        remove_superclass(&mut foundation, dog, animal).unwrap();
        assert_eq!(superclasses(&foundation, dog), vec![root]);
        assert!(subclasses(&foundation, animal).is_empty());
    }

    #[test]
    fn test_cycles_are_rejected() {
        let mut foundation = Foundation::new();
        let a = new_class(&mut foundation, "A");
        let b = new_class(&mut foundation, "B");
        let c = new_class(&mut foundation, "C");
        add_superclass(&mut foundation, b, a).unwrap();
        add_superclass(&mut foundation, c, b).unwrap();
        let epoch = foundation.epoch();

        let error = add_superclass(&mut foundation, a, c).unwrap_err();
        assert!(matches!(error, RuntimeError::GraphCycle { .. }));
        assert_eq!(error.error_code(), vec!["TCL", "OO", "CIRCULARITY"]);
        assert_eq!(foundation.epoch(), epoch);
        assert_eq!(superclasses(&foundation, a), vec![foundation.object_class()]);

        let error = add_mixin(&mut foundation, Declarer::Class(a), c).unwrap_err();
        assert!(matches!(error, RuntimeError::GraphCycle { .. }));
        assert!(add_superclass(&mut foundation, a, a).is_err());
    }

    #[test]
    fn test_mixin_edges_are_symmetric() {
        let mut foundation = Foundation::new();
        let logger = new_class(&mut foundation, "Logger");
        let service = new_class(&mut foundation, "Service");

        add_mixin(&mut foundation, Declarer::Class(service), logger).unwrap();
        add_mixin(&mut foundation, Declarer::Object(service), logger).unwrap();
        let targets = |f: &Foundation| {
            f.get(logger).unwrap().class_data().unwrap().mixin_targets().to_vec()
        };
        assert_eq!(targets(&foundation), vec![service]);

        remove_mixin(&mut foundation, Declarer::Class(service), logger).unwrap();
        assert_eq!(targets(&foundation), vec![service]);
        remove_mixin(&mut foundation, Declarer::Object(service), logger).unwrap();
        assert!(targets(&foundation).is_empty());
    }

    #[test]
    fn test_every_mutation_bumps_epoch_once() {
        let mut foundation = Foundation::new();
        let a = new_class(&mut foundation, "A");
        let b = new_class(&mut foundation, "B");
        let before = foundation.epoch();
        add_superclass(&mut foundation, b, a).unwrap();
        assert_eq!(foundation.epoch(), before + 1);
        set_superclasses(&mut foundation, b, &[]).unwrap();
        assert_eq!(foundation.epoch(), before + 2);
        assert_eq!(superclasses(&foundation, b), vec![foundation.object_class()]);
    }

    #[test]
    fn test_root_superclass_is_protected() {
        let mut foundation = Foundation::new();
        let a = new_class(&mut foundation, "A");
        let root = foundation.object_class();
        assert!(matches!(
            add_superclass(&mut foundation, root, a),
            Err(RuntimeError::InvalidDefinition { .. })
        ));

        let class_class = foundation.class_class();
        let epoch = foundation.epoch();
        assert!(matches!(
            add_superclass(&mut foundation, class_class, a),
            Err(RuntimeError::InvalidDefinition { .. })
        ));
        assert!(matches!(
            set_superclasses(&mut foundation, class_class, &[a]),
            Err(RuntimeError::InvalidDefinition { .. })
        ));
        assert!(remove_superclass(&mut foundation, class_class, root).is_err());
        assert_eq!(superclasses(&foundation, class_class), vec![root]);
        assert!(subclasses(&foundation, a).is_empty());
        assert_eq!(foundation.epoch(), epoch);
    }

    #[test]
    fn test_change_class_moves_instance_edge() {
        let mut foundation = Foundation::new();
        let mut evaluator = ScriptEvaluator::new();
        let a = new_class(&mut foundation, "A");
        let b = new_class(&mut foundation, "B");
        let o = create_object(&mut foundation, &mut evaluator, a, Some("o"), &[]).unwrap();

        change_class(&mut foundation, o, b).unwrap();
        assert_eq!(foundation.get(o).unwrap().class(), b);
        assert!(foundation.get(a).unwrap().class_data().unwrap().instances().is_empty());
        assert_eq!(foundation.get(b).unwrap().class_data().unwrap().instances(), &[o]);

        let class_class = foundation.class_class();
        assert!(change_class(&mut foundation, o, class_class).is_err());
    }
}
