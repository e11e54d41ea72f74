//! Object and class records stored in the foundation's arena.
//!
//! Records never own each other. Every edge is an [`ObjectId`] handle; the
//! owning direction (superclasses, mixins, class membership) and the
//! back-reference direction (subclasses, mixin targets, instances) are kept
//! symmetric by the `graph` module.

use crate::cache::ChainCache;
use crate::chain::CallChain;
use crate::method::MethodRef;
use indexmap::IndexMap;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Interned method, filter and object name
pub type Name = Rc<str>;

/// Generational handle to an arena slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl ObjectId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}.{}", self.index, self.generation)
    }
}

/// Per-object state flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectFlags {
    /// Teardown has started
    pub destructing: bool,
    /// The destructor chain has run (or must never run)
    pub destructor_called: bool,
    /// Teardown has finished; the slot lives on only for in-flight calls
    pub deleted: bool,
    /// The universal root object class
    pub root_object: bool,
    /// The class of classes
    pub root_class: bool,
    /// A filter is executing on this object
    pub filter_handling: bool,
    /// Nothing is overridden locally, so chains come from the class cache
    pub use_class_cache: bool,
}

/// A private variable remapped to a per-declarer storage name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivateVariable {
    pub name: Name,
    pub full_name: Name,
}

/// Variable-binding configuration, opaque to dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableConfig {
    pub variables: Vec<Name>,
    pub private_variables: Vec<PrivateVariable>,
}

type MetadataCloner = fn(&dyn Any) -> Option<Box<dyn Any>>;

struct MetadataEntry {
    value: Box<dyn Any>,
    clone: MetadataCloner,
}

/// Typed metadata attached to an object or class, one value per Rust type
#[derive(Default)]
pub struct Metadata {
    entries: HashMap<TypeId, MetadataEntry>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a value, replacing any previous value of the same type
    pub fn insert<T: Any + Clone>(&mut self, value: T) {
        self.entries.insert(
            TypeId::of::<T>(),
            MetadataEntry {
                value: Box::new(value),
                clone: |value| {
                    value
                        .downcast_ref::<T>()
                        .map(|typed| Box::new(typed.clone()) as Box<dyn Any>)
                },
            },
        );
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.value.downcast_ref::<T>())
    }

    pub fn get_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.entries
            .get_mut(&TypeId::of::<T>())
            .and_then(|entry| entry.value.downcast_mut::<T>())
    }

    pub fn remove<T: Any>(&mut self) -> Option<T> {
        let entry = self.entries.remove(&TypeId::of::<T>())?;
        entry.value.downcast::<T>().ok().map(|boxed| *boxed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Copy every entry whose value can be cloned, for object copying
    pub(crate) fn duplicate(&self) -> Self {
        let entries = self
            .entries
            .iter()
            .filter_map(|(type_id, entry)| {
                (entry.clone)(entry.value.as_ref()).map(|value| {
                    (
                        *type_id,
                        MetadataEntry {
                            value,
                            clone: entry.clone,
                        },
                    )
                })
            })
            .collect();
        Self { entries }
    }
}

impl fmt::Debug for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metadata")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// The extra state a class carries on top of its object record
#[derive(Debug, Default)]
pub struct ClassData {
    pub(crate) superclasses: Vec<ObjectId>,
    pub(crate) subclasses: Vec<ObjectId>,
    pub(crate) instances: Vec<ObjectId>,
    pub(crate) mixins: Vec<ObjectId>,
    pub(crate) mixin_targets: Vec<ObjectId>,
    pub(crate) filters: Vec<Name>,
    pub(crate) methods: IndexMap<Name, MethodRef>,
    pub(crate) constructor: Option<MethodRef>,
    pub(crate) destructor: Option<MethodRef>,
    pub(crate) constructor_chain: Option<Rc<CallChain>>,
    pub(crate) destructor_chain: Option<Rc<CallChain>>,
    pub(crate) chain_cache: ChainCache,
    pub(crate) metadata: Metadata,
    pub(crate) variables: VariableConfig,
}

impl ClassData {
    pub fn superclasses(&self) -> &[ObjectId] {
        &self.superclasses
    }

    pub fn subclasses(&self) -> &[ObjectId] {
        &self.subclasses
    }

    pub fn instances(&self) -> &[ObjectId] {
        &self.instances
    }

    pub fn mixins(&self) -> &[ObjectId] {
        &self.mixins
    }

    /// Objects and classes this class is mixed into
    pub fn mixin_targets(&self) -> &[ObjectId] {
        &self.mixin_targets
    }

    pub fn filters(&self) -> &[Name] {
        &self.filters
    }

    pub fn methods(&self) -> &IndexMap<Name, MethodRef> {
        &self.methods
    }

    pub fn constructor(&self) -> Option<&MethodRef> {
        self.constructor.as_ref()
    }

    pub fn destructor(&self) -> Option<&MethodRef> {
        self.destructor.as_ref()
    }

    /// Chains cached for instances that override nothing
    pub fn chain_cache(&self) -> &ChainCache {
        &self.chain_cache
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn variables(&self) -> &VariableConfig {
        &self.variables
    }

    /// Drop everything the class owns; edges are released by the graph module
    pub(crate) fn clear_tables(&mut self) {
        self.filters.clear();
        self.methods.clear();
        self.constructor = None;
        self.destructor = None;
        self.constructor_chain = None;
        self.destructor_chain = None;
        self.chain_cache.clear();
        self.metadata.clear();
        self.variables = VariableConfig::default();
    }
}

/// An object record; classes are objects with [`ClassData`]
#[derive(Debug)]
pub struct Object {
    pub(crate) id: ObjectId,
    pub(crate) name: Name,
    pub(crate) namespace: Name,
    pub(crate) class: ObjectId,
    pub(crate) methods: IndexMap<Name, MethodRef>,
    pub(crate) mixins: Vec<ObjectId>,
    pub(crate) filters: Vec<Name>,
    pub(crate) class_data: Option<Box<ClassData>>,
    pub(crate) ref_count: usize,
    pub(crate) flags: ObjectFlags,
    pub(crate) creation_epoch: u64,
    pub(crate) epoch: u64,
    pub(crate) metadata: Metadata,
    pub(crate) chain_cache: ChainCache,
    pub(crate) variables: VariableConfig,
}

impl Object {
    pub(crate) fn new(
        id: ObjectId,
        name: Name,
        namespace: Name,
        class: ObjectId,
        is_class: bool,
        creation_epoch: u64,
    ) -> Self {
        Self {
            id,
            name,
            namespace,
            class,
            methods: IndexMap::new(),
            mixins: Vec::new(),
            filters: Vec::new(),
            class_data: is_class.then(Box::default),
            ref_count: 1,
            flags: ObjectFlags {
                use_class_cache: true,
                ..ObjectFlags::default()
            },
            creation_epoch,
            epoch: 0,
            metadata: Metadata::new(),
            chain_cache: ChainCache::new(),
            variables: VariableConfig::default(),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Fully qualified command name
    pub fn name(&self) -> &Name {
        &self.name
    }

    /// Namespace holding the object's variables
    pub fn namespace(&self) -> &Name {
        &self.namespace
    }

    pub fn class(&self) -> ObjectId {
        self.class
    }

    pub fn is_class(&self) -> bool {
        self.class_data.is_some()
    }

    pub fn class_data(&self) -> Option<&ClassData> {
        self.class_data.as_deref()
    }

    pub fn class_data_mut(&mut self) -> Option<&mut ClassData> {
        self.class_data.as_deref_mut()
    }

    /// Methods declared directly on this object
    pub fn methods(&self) -> &IndexMap<Name, MethodRef> {
        &self.methods
    }

    pub fn mixins(&self) -> &[ObjectId] {
        &self.mixins
    }

    pub fn filters(&self) -> &[Name] {
        &self.filters
    }

    pub fn flags(&self) -> ObjectFlags {
        self.flags
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count
    }

    pub fn creation_epoch(&self) -> u64 {
        self.creation_epoch
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn chain_cache(&self) -> &ChainCache {
        &self.chain_cache
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn variables(&self) -> &VariableConfig {
        &self.variables
    }

    pub fn is_root(&self) -> bool {
        self.flags.root_object || self.flags.root_class
    }

    /// Record a change to something only this object's dispatch depends on
    pub(crate) fn touch(&mut self) {
        self.epoch += 1;
        self.flags.use_class_cache = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Tag(&'static str);

    #[test]
    fn test_metadata_is_keyed_by_type() {
        let mut metadata = Metadata::new();
        metadata.insert(Tag("first"));
        metadata.insert(7u32);
        metadata.insert(Tag("second"));

        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata.get::<Tag>(), Some(&Tag("second")));
        assert_eq!(metadata.remove::<u32>(), Some(7));
        assert!(metadata.get::<u32>().is_none());
    }

    #[test]
    fn test_metadata_duplicate_copies_cloneable_values() {
        let mut metadata = Metadata::new();
        metadata.insert(Tag("kept"));
        if let Some(tag) = metadata.get_mut::<Tag>() {
            tag.0 = "changed";
        }

        let copy = metadata.duplicate();
        assert_eq!(copy.get::<Tag>(), Some(&Tag("changed")));
        assert!(copy.get::<u64>().is_none());
    }

    #[test]
    fn test_touch_leaves_class_cache() {
        let id = ObjectId::new(3, 0);
        let mut object = Object::new(id, "::o".into(), "::oo::Obj3".into(), id, false, 3);
        assert!(object.flags().use_class_cache);
        object.touch();
        assert_eq!(object.epoch(), 1);
        assert!(!object.flags().use_class_cache);
        assert!(!object.is_class());
    }
}
