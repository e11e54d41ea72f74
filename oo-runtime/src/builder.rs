//! Call chain construction.
//!
//! Resolution is a pure function of the arena at the time of the call:
//! the receiver's own table, then its mixins, then its class expansion
//! (class mixins, the class, its superclasses left to right, each expanded
//! the same way). A class reached twice keeps its first position and the
//! root object class always goes last. Filters come first in the chain,
//! followed by every implementation of the requested name, most specific
//! first, so that `next` can walk down the list.

use crate::cache::{ChainKey, EpochStamp};
use crate::chain::{CallChain, CallKind, ChainEntry, ChainFlags};
use crate::error::{Result, RuntimeError};
use crate::foundation::Foundation;
use crate::method::{Declarer, Method, MethodRef, Visibility};
use crate::object::{Name, Object, ObjectId};
use indexmap::{IndexMap, IndexSet};
use std::rc::Rc;
use tracing::{debug, trace};

/// Where methods and filters are looked up, most specific first
struct Sources<'a> {
    foundation: &'a Foundation,
    receiver: Option<ObjectId>,
    own: Option<&'a Object>,
    classes: IndexSet<ObjectId>,
}

#[derive(Default)]
struct Lookup {
    methods: Vec<MethodRef>,
    scope_sensitive: bool,
}

impl<'a> Sources<'a> {
    fn for_receiver(foundation: &'a Foundation, receiver: ObjectId) -> Self {
        let object = foundation.record(receiver);
        let mut classes = IndexSet::new();
        for &mixin in &object.mixins {
            expand_class(foundation, mixin, &mut classes);
        }
        expand_class(foundation, object.class, &mut classes);
        root_last(foundation, &mut classes);
        Self {
            foundation,
            receiver: Some(receiver),
            own: Some(object),
            classes,
        }
    }

    fn for_class(foundation: &'a Foundation, class: ObjectId) -> Self {
        let mut classes = IndexSet::new();
        expand_class(foundation, class, &mut classes);
        root_last(foundation, &mut classes);
        Self {
            foundation,
            receiver: None,
            own: None,
            classes,
        }
    }

    fn tables(&self) -> impl Iterator<Item = &'a IndexMap<Name, MethodRef>> + '_ {
        let foundation = self.foundation;
        self.own
            .map(|object| &object.methods)
            .into_iter()
            .chain(self.classes.iter().filter_map(move |&class| {
                foundation.record(class).class_data().map(|data| &data.methods)
            }))
    }

    fn in_private_scope(&self, method: &Method, scope: Option<ObjectId>) -> bool {
        match (method.declarer(), scope) {
            (_, None) => false,
            (Declarer::Class(class), Some(scope)) => class == scope,
            (Declarer::Object(object), Some(scope)) => {
                object == scope && self.receiver == Some(object)
            }
        }
    }

    /// Every implementation of `name` visible to a call of `kind` from `scope`
    fn lookup(&self, name: &str, kind: CallKind, scope: Option<ObjectId>) -> Lookup {
        let mut found = Lookup::default();
        let mut visibility_decided = kind != CallKind::Public;

        for table in self.tables() {
            let Some(method) = table.get(name) else {
                continue;
            };
            if method.visibility() == Visibility::Private {
                found.scope_sensitive = true;
                if self.in_private_scope(method, scope) {
                    found.methods.push(Rc::clone(method));
                }
                continue;
            }
            // The most specific non-private definition decides public reachability
            if !visibility_decided {
                visibility_decided = true;
                if method.visibility() == Visibility::Unexported {
                    break;
                }
            }
            found.methods.push(Rc::clone(method));
        }

        found
    }

    /// Filter names with the class that contributed them
    fn filters(&self) -> IndexMap<Name, Option<ObjectId>> {
        let mut filters = IndexMap::new();
        if let Some(object) = self.own {
            for name in &object.filters {
                filters.entry(Rc::clone(name)).or_insert(None);
            }
        }
        for &class in &self.classes {
            let Some(data) = self.foundation.record(class).class_data() else {
                continue;
            };
            for name in &data.filters {
                filters.entry(Rc::clone(name)).or_insert(Some(class));
            }
        }
        filters
    }

    fn visible_names(&self, kind: CallKind) -> Vec<String> {
        let mut decided: IndexMap<Name, bool> = IndexMap::new();
        for table in self.tables() {
            for (name, method) in table {
                if method.visibility() == Visibility::Private {
                    continue;
                }
                let visible = kind != CallKind::Public || method.visibility() == Visibility::Public;
                decided.entry(Rc::clone(name)).or_insert(visible);
            }
        }
        let mut names: Vec<String> = decided
            .into_iter()
            .filter(|(_, visible)| *visible)
            .map(|(name, _)| name.to_string())
            .collect();
        names.sort();
        names
    }

    fn lifecycle_chain(&self, kind: CallKind, stamp: EpochStamp) -> CallChain {
        let foundation = self.foundation;
        let entries = self
            .classes
            .iter()
            .filter_map(|&class| {
                let data = foundation.record(class).class_data()?;
                match kind {
                    CallKind::Constructor => data.constructor.clone(),
                    _ => data.destructor.clone(),
                }
            })
            .map(ChainEntry::method)
            .collect();
        let name = match kind {
            CallKind::Constructor => foundation.constructor_name(),
            _ => foundation.destructor_name(),
        };
        CallChain::new(Rc::clone(name), kind, entries, stamp, ChainFlags::default())
    }

    fn build(
        &self,
        name: &str,
        kind: CallKind,
        scope: Option<ObjectId>,
        stamp: EpochStamp,
        filters_allowed: bool,
    ) -> Result<CallChain> {
        if kind.is_lifecycle() {
            return Ok(self.lifecycle_chain(kind, stamp));
        }

        let foundation = self.foundation;
        let mut flags = ChainFlags {
            filters_suppressed: !filters_allowed,
            ..ChainFlags::default()
        };
        let mut entries = Vec::new();

        if filters_allowed {
            for (filter, declarer) in self.filters() {
                let filter_scope = declarer.or(self.receiver);
                for method in self.lookup(&filter, CallKind::Private, filter_scope).methods {
                    entries.push(ChainEntry::filter(method, declarer));
                }
            }
        }

        let unknown_name = foundation.unknown_name();
        let mut found = if kind == CallKind::Unknown {
            flags.unknown = true;
            self.lookup(unknown_name, CallKind::Private, scope)
        } else {
            self.lookup(name, kind, scope)
        };
        if found.methods.is_empty() && !flags.unknown {
            flags.scope_sensitive |= found.scope_sensitive;
            found = self.lookup(unknown_name, CallKind::Private, scope);
            flags.unknown = true;
        }
        flags.scope_sensitive |= found.scope_sensitive;

        if found.methods.is_empty() {
            let owner = match (self.receiver, self.classes.first()) {
                (Some(receiver), _) => foundation.display_name(receiver),
                (None, Some(&class)) => foundation.display_name(class),
                (None, None) => String::new(),
            };
            return Err(RuntimeError::method_not_found(
                &owner,
                name,
                &self.visible_names(kind),
            ));
        }

        entries.extend(found.methods.into_iter().map(ChainEntry::method));
        Ok(CallChain::new(Rc::from(name), kind, entries, stamp, flags))
    }
}

/// Append `class` and its ancestors to `order`, keeping first occurrences
fn expand_class(foundation: &Foundation, class: ObjectId, order: &mut IndexSet<ObjectId>) {
    if order.contains(&class) {
        return;
    }
    let Some(data) = foundation.get(class).and_then(|object| object.class_data()) else {
        return;
    };
    for &mixin in &data.mixins {
        expand_class(foundation, mixin, order);
    }
    order.insert(class);
    for &superclass in &data.superclasses {
        expand_class(foundation, superclass, order);
    }
}

fn root_last(foundation: &Foundation, order: &mut IndexSet<ObjectId>) {
    let root = foundation.object_class();
    if order.shift_remove(&root) {
        order.insert(root);
    }
}

/// Linearized class order of a class, as seen by its pure instances
pub fn class_order(foundation: &Foundation, class: ObjectId) -> Result<Vec<ObjectId>> {
    foundation.try_class(class)?;
    Ok(Sources::for_class(foundation, class).classes.into_iter().collect())
}

/// The chain a pure instance of `class` would use
pub fn stereotype_chain(
    foundation: &Foundation,
    class: ObjectId,
    name: &str,
    kind: CallKind,
) -> Result<CallChain> {
    foundation.try_class(class)?;
    Sources::for_class(foundation, class).build(name, kind, None, foundation.stamp(class), true)
}

/// Sorted method names a call of `kind` could reach on `object`
pub fn method_names(foundation: &Foundation, object: ObjectId, kind: CallKind) -> Result<Vec<String>> {
    foundation.try_object(object)?;
    Ok(Sources::for_receiver(foundation, object).visible_names(kind))
}

/// Cache a pure instance shares with its class, or its own
fn cache_owner(foundation: &Foundation, receiver: ObjectId) -> (ObjectId, bool) {
    let object = foundation.record(receiver);
    if object.flags.use_class_cache {
        (object.class, true)
    } else {
        (receiver, false)
    }
}

fn cache_mut(
    foundation: &mut Foundation,
    owner: ObjectId,
    class_level: bool,
) -> &mut crate::cache::ChainCache {
    if class_level {
        &mut foundation.class_data_mut(owner).chain_cache
    } else {
        &mut foundation.record_mut(owner).chain_cache
    }
}

/// Fetch a valid chain from the cache or build and cache a new one
pub fn get_chain(
    foundation: &mut Foundation,
    receiver: ObjectId,
    name: &str,
    kind: CallKind,
    scope: Option<ObjectId>,
) -> Result<Rc<CallChain>> {
    let object = foundation.try_object(receiver)?;
    let filters_allowed = !object.flags.filter_handling;
    let (owner, class_level) = cache_owner(foundation, receiver);
    let stamp = foundation.stamp(owner);
    let key = ChainKey::new(Rc::from(name), kind);

    if filters_allowed {
        if let Some(chain) = cache_mut(foundation, owner, class_level).lookup(&key, stamp) {
            if scope.is_none() || !chain.flags().scope_sensitive {
                trace!(method = name, %kind, "call chain cache hit");
                return Ok(chain);
            }
        }
    }

    let chain = Rc::new(Sources::for_receiver(foundation, receiver).build(
        name,
        kind,
        scope,
        stamp,
        filters_allowed,
    )?);
    debug!(
        receiver = %foundation.display_name(receiver),
        method = name,
        %kind,
        entries = chain.len(),
        filters = chain.filter_count(),
        epoch = stamp.global,
        "built call chain"
    );

    let flags = chain.flags();
    if !flags.filters_suppressed && (scope.is_none() || !flags.scope_sensitive) {
        cache_mut(foundation, owner, class_level).insert(key, Rc::clone(&chain));
    }
    Ok(chain)
}

/// Constructor or destructor chain, cached on the class for pure instances
pub(crate) fn lifecycle_chain(
    foundation: &mut Foundation,
    receiver: ObjectId,
    kind: CallKind,
) -> Rc<CallChain> {
    let (owner, class_level) = cache_owner(foundation, receiver);
    let stamp = foundation.stamp(owner);

    if class_level {
        let data = foundation.class_data_mut(owner);
        let slot = match kind {
            CallKind::Constructor => &data.constructor_chain,
            _ => &data.destructor_chain,
        };
        if let Some(chain) = slot.as_ref().filter(|chain| chain.stamp() == stamp) {
            return Rc::clone(chain);
        }
    } else {
        let name = match kind {
            CallKind::Constructor => Rc::clone(foundation.constructor_name()),
            _ => Rc::clone(foundation.destructor_name()),
        };
        let key = ChainKey::new(name, kind);
        if let Some(chain) = foundation.record_mut(owner).chain_cache.lookup(&key, stamp) {
            return chain;
        }
    }

    let chain = Rc::new(Sources::for_receiver(foundation, receiver).lifecycle_chain(kind, stamp));
    if class_level {
        let data = foundation.class_data_mut(owner);
        match kind {
            CallKind::Constructor => data.constructor_chain = Some(Rc::clone(&chain)),
            _ => data.destructor_chain = Some(Rc::clone(&chain)),
        }
    } else {
        let key = ChainKey::new(Rc::clone(chain.method_name()), kind);
        foundation
            .record_mut(owner)
            .chain_cache
            .insert(key, Rc::clone(&chain));
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define::define_method;
    use crate::graph::{add_mixin, add_superclass};
    use crate::lifecycle::{create_object, destroy_object};
    use crate::method::{MethodKind, ParamSpec};
    use crate::test_harness::ScriptEvaluator;
    use pretty_assertions::assert_eq;

    fn class(foundation: &mut Foundation, name: &str) -> ObjectId {
        let class_class = foundation.class_class();
        create_object(foundation, &mut ScriptEvaluator::new(), class_class, Some(name), &[])
            .unwrap()
    }

    fn names(foundation: &Foundation, ids: &[ObjectId]) -> Vec<String> {
        ids.iter().map(|&id| foundation.display_name(id)).collect()
    }

    fn method(foundation: &mut Foundation, class: ObjectId, name: &str) {
        define_method(
            foundation,
            Declarer::Class(class),
            name,
            MethodKind::procedure(ParamSpec::new(), ""),
            None,
        )
        .unwrap();
    }

    #[test]
    fn test_diamond_keeps_first_occurrence() {
        let mut foundation = Foundation::new();
        let base = class(&mut foundation, "Base");
        let left = class(&mut foundation, "Left");
        let right = class(&mut foundation, "Right");
        let bottom = class(&mut foundation, "Bottom");
        add_superclass(&mut foundation, left, base).unwrap();
        add_superclass(&mut foundation, right, base).unwrap();
        add_superclass(&mut foundation, bottom, left).unwrap();
        add_superclass(&mut foundation, bottom, right).unwrap();

        let order = class_order(&foundation, bottom).unwrap();
        assert_eq!(
            names(&foundation, &order),
            vec!["::Bottom", "::Left", "::Base", "::Right", "::oo::object"]
        );
    }

    #[test]
    fn test_class_mixins_precede_the_class() {
        let mut foundation = Foundation::new();
        let mixin = class(&mut foundation, "Audit");
        let service = class(&mut foundation, "Service");
        add_mixin(&mut foundation, Declarer::Class(service), mixin).unwrap();

        let order = class_order(&foundation, service).unwrap();
        assert_eq!(
            names(&foundation, &order),
            vec!["::Audit", "::Service", "::oo::object"]
        );
    }

    #[test]
    fn test_chain_holds_every_implementation() {
        let mut foundation = Foundation::new();
        let animal = class(&mut foundation, "Animal");
        let dog = class(&mut foundation, "Dog");
        add_superclass(&mut foundation, dog, animal).unwrap();
        method(&mut foundation, animal, "speak");
        method(&mut foundation, dog, "speak");

        let chain = stereotype_chain(&foundation, dog, "speak", CallKind::Public).unwrap();
        let declarers: Vec<Declarer> = chain
            .entries()
            .iter()
            .map(|entry| entry.method.declarer())
            .collect();
        assert_eq!(declarers, vec![Declarer::Class(dog), Declarer::Class(animal)]);
        assert!(!chain.is_unknown());
    }

    #[test]
    fn test_unexported_name_falls_to_unknown() {
        let mut foundation = Foundation::new();
        let widget = class(&mut foundation, "Widget");
        method(&mut foundation, widget, "Layout");

        let public = stereotype_chain(&foundation, widget, "Layout", CallKind::Public).unwrap();
        assert!(public.is_unknown());
        let private = stereotype_chain(&foundation, widget, "Layout", CallKind::Private).unwrap();
        assert!(!private.is_unknown());
    }

    #[test]
    fn test_method_names_by_kind() {
        let mut foundation = Foundation::new();
        let widget = class(&mut foundation, "Widget");
        method(&mut foundation, widget, "draw");
        method(&mut foundation, widget, "Layout");
        let instance =
            create_object(&mut foundation, &mut ScriptEvaluator::new(), widget, Some("w"), &[])
                .unwrap();

        assert_eq!(
            method_names(&foundation, instance, CallKind::Public).unwrap(),
            vec!["destroy", "draw"]
        );
        assert_eq!(
            method_names(&foundation, instance, CallKind::Private).unwrap(),
            vec!["<cloned>", "Layout", "destroy", "draw", "unknown"]
        );
    }

    #[test]
    #[should_panic(expected = "internal consistency")]
    fn test_lifecycle_chain_on_a_freed_handle_panics() {
        let mut foundation = Foundation::new();
        let widget = class(&mut foundation, "Widget");
        destroy_object(&mut foundation, &mut ScriptEvaluator::new(), widget).unwrap();
        assert!(foundation.get(widget).is_none());

        lifecycle_chain(&mut foundation, widget, CallKind::Destructor);
    }
}
