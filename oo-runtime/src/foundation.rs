//! The per-execution-context root of the object system.
//!
//! A `Foundation` owns the arena every object and class record lives in,
//! the two bootstrap classes, the shared method names, the name registry and
//! the global structural epoch. Nothing here is global state: two
//! foundations in one process never interact.

use crate::builtins;
use crate::cache::EpochStamp;
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::object::{Name, Object, ObjectId};
use indexmap::IndexMap;
use std::rc::Rc;
use tracing::debug;

/// Name of the universal root object class
pub const OBJECT_CLASS_NAME: &str = "::oo::object";

/// Name of the class of classes
pub const CLASS_CLASS_NAME: &str = "::oo::class";

#[derive(Debug)]
struct Slot {
    generation: u32,
    record: Option<Object>,
}

/// Root of one execution context's object graph
#[derive(Debug)]
pub struct Foundation {
    config: RuntimeConfig,
    slots: Vec<Slot>,
    free: Vec<u32>,
    names: IndexMap<Name, ObjectId>,
    object_class: ObjectId,
    class_class: ObjectId,
    constructor_name: Name,
    destructor_name: Name,
    unknown_name: Name,
    cloned_name: Name,
    epoch: u64,
    ns_counter: u64,
    call_depth: usize,
    shutting_down: bool,
}

impl Foundation {
    /// Create a foundation with the default configuration
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a foundation and its bootstrap classes
    pub fn with_config(config: RuntimeConfig) -> Self {
        let mut foundation = Self {
            config,
            slots: Vec::new(),
            free: Vec::new(),
            names: IndexMap::new(),
            object_class: ObjectId::new(0, 0),
            class_class: ObjectId::new(1, 0),
            constructor_name: Rc::from("<constructor>"),
            destructor_name: Rc::from("<destructor>"),
            unknown_name: Rc::from("unknown"),
            cloned_name: Rc::from("<cloned>"),
            epoch: 0,
            ns_counter: 0,
            call_depth: 0,
            shutting_down: false,
        };

        let class_class = foundation.class_class;
        let object_class = foundation.insert(Some(OBJECT_CLASS_NAME), class_class, true);
        let class_class = foundation.insert(Some(CLASS_CLASS_NAME), class_class, true);
        foundation.object_class = object_class;
        foundation.class_class = class_class;

        foundation.record_mut(object_class).flags.root_object = true;
        foundation.record_mut(class_class).flags.root_class = true;

        let class_data = foundation.class_data_mut(class_class);
        class_data.superclasses.push(object_class);
        class_data.instances.push(object_class);
        class_data.instances.push(class_class);
        foundation
            .class_data_mut(object_class)
            .subclasses
            .push(class_class);

        builtins::install(&mut foundation);
        debug!(epoch = foundation.epoch, "bootstrapped object system");
        foundation
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The universal root object class
    pub fn object_class(&self) -> ObjectId {
        self.object_class
    }

    /// The class of classes
    pub fn class_class(&self) -> ObjectId {
        self.class_class
    }

    pub fn constructor_name(&self) -> &Name {
        &self.constructor_name
    }

    pub fn destructor_name(&self) -> &Name {
        &self.destructor_name
    }

    /// Name of the fallback handler for unresolved methods
    pub fn unknown_name(&self) -> &Name {
        &self.unknown_name
    }

    /// Name of the pseudo-constructor run on copies
    pub fn cloned_name(&self) -> &Name {
        &self.cloned_name
    }

    /// Current global structural epoch
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Invalidate every cached chain
    pub(crate) fn bump_epoch(&mut self) {
        self.epoch += 1;
        debug!(epoch = self.epoch, "bumped global epoch");
    }

    /// Cache stamp for chains whose receiver is `id`
    pub fn stamp(&self, id: ObjectId) -> EpochStamp {
        let object = self.record(id);
        EpochStamp {
            creation: object.creation_epoch,
            object: object.epoch,
            global: self.epoch,
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub(crate) fn begin_shutdown(&mut self) {
        self.shutting_down = true;
    }

    /// Look up a live (or still referenced) record
    pub fn get(&self, id: ObjectId) -> Option<&Object> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.record.as_ref())
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut Object> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.record.as_mut())
    }

    /// Look up a record that has not been torn down
    pub fn try_object(&self, id: ObjectId) -> Result<&Object> {
        match self.get(id) {
            Some(object) if !object.flags.deleted => Ok(object),
            Some(object) => Err(RuntimeError::object_deleted(&object.name)),
            None => Err(RuntimeError::no_such_object(id)),
        }
    }

    /// Look up a class that has not been torn down
    pub fn try_class(&self, id: ObjectId) -> Result<&Object> {
        let object = self.try_object(id)?;
        if object.is_class() {
            Ok(object)
        } else {
            Err(RuntimeError::not_a_class(&object.name))
        }
    }

    /// Look up a class that new edges may point at: not torn down and not
    /// in the middle of teardown either
    pub fn try_attachable_class(&self, id: ObjectId) -> Result<&Object> {
        let object = self.try_class(id)?;
        if object.flags.destructing {
            return Err(RuntimeError::object_deleted(&object.name));
        }
        Ok(object)
    }

    pub fn is_alive(&self, id: ObjectId) -> bool {
        self.get(id).is_some_and(|object| !object.flags.deleted)
    }

    /// Record access for handles the caller has already validated
    pub(crate) fn record(&self, id: ObjectId) -> &Object {
        self.get(id)
            .unwrap_or_else(|| panic!("internal consistency: {id} is not a live object record"))
    }

    pub(crate) fn record_mut(&mut self, id: ObjectId) -> &mut Object {
        self.get_mut(id)
            .unwrap_or_else(|| panic!("internal consistency: {id} is not a live object record"))
    }

    pub(crate) fn class_data_mut(&mut self, id: ObjectId) -> &mut crate::object::ClassData {
        self.record_mut(id)
            .class_data
            .as_deref_mut()
            .unwrap_or_else(|| panic!("internal consistency: {id} is not a class record"))
    }

    /// Name of a record, or its handle when it is gone
    pub fn display_name(&self, id: ObjectId) -> String {
        match self.get(id) {
            Some(object) => object.name.to_string(),
            None => id.to_string(),
        }
    }

    /// Find an object by command name; unqualified names are taken as global
    pub fn lookup(&self, name: &str) -> Option<ObjectId> {
        self.names.get(qualify(name).as_str()).copied()
    }

    /// Like [`Foundation::lookup`] but reports a missing object
    pub fn resolve(&self, name: &str) -> Result<ObjectId> {
        self.lookup(name)
            .ok_or_else(|| RuntimeError::no_such_object(qualify(name)))
    }

    /// Find a class by command name
    pub fn resolve_class(&self, name: &str) -> Result<ObjectId> {
        let id = self.resolve(name)?;
        self.try_class(id)?;
        Ok(id)
    }

    /// Every live object in creation order
    pub fn objects(&self) -> Vec<ObjectId> {
        self.names.values().copied().collect()
    }

    pub fn object_count(&self) -> usize {
        self.names.len()
    }

    /// Allocate a record with a unique name, generating one when none is given
    pub(crate) fn allocate(
        &mut self,
        name: Option<&str>,
        class: ObjectId,
        is_class: bool,
    ) -> Result<ObjectId> {
        if let Some(name) = name {
            if name.is_empty() {
                return Err(RuntimeError::invalid_definition(
                    "object name must not be empty",
                ));
            }
            if self.lookup(name).is_some() {
                return Err(RuntimeError::invalid_definition(format!(
                    "can't create object \"{name}\": command already exists with that name"
                )));
            }
        }
        Ok(self.insert(name, class, is_class))
    }

    fn insert(&mut self, name: Option<&str>, class: ObjectId, is_class: bool) -> ObjectId {
        // Generated names may collide with user names; keep counting until free
        let (creation_epoch, namespace) = loop {
            self.ns_counter += 1;
            let namespace = format!("{}{}", self.config.object_name_prefix, self.ns_counter);
            if name.is_some() || !self.names.contains_key(namespace.as_str()) {
                break (self.ns_counter, namespace);
            }
        };
        let name: Name = match name {
            Some(name) => Rc::from(qualify(name)),
            None => Rc::from(namespace.as_str()),
        };

        let id = match self.free.pop() {
            Some(index) => ObjectId::new(index, self.slots[index as usize].generation),
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    record: None,
                });
                ObjectId::new((self.slots.len() - 1) as u32, 0)
            }
        };

        let object = Object::new(
            id,
            Rc::clone(&name),
            Rc::from(namespace),
            class,
            is_class,
            creation_epoch,
        );
        self.slots[id.index()].record = Some(object);
        self.names.insert(name, id);
        id
    }

    /// Remove the name so the object can no longer be found by command
    pub(crate) fn unregister_name(&mut self, id: ObjectId) {
        if let Some(object) = self.get(id) {
            let name = Rc::clone(&object.name);
            if self.names.get(&name) == Some(&id) {
                self.names.shift_remove(&name);
            }
        }
    }

    /// Take a strong reference for an in-flight call
    pub(crate) fn retain(&mut self, id: ObjectId) {
        if let Some(object) = self.get_mut(id) {
            object.ref_count += 1;
        }
    }

    /// Drop a strong reference; the slot is reclaimed at zero
    pub(crate) fn release(&mut self, id: ObjectId) -> bool {
        let Some(object) = self.get_mut(id) else {
            return false;
        };
        object.ref_count = object.ref_count.saturating_sub(1);
        if object.ref_count > 0 {
            return false;
        }

        self.unregister_name(id);
        let slot = &mut self.slots[id.index()];
        slot.record = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index() as u32);
        debug!(handle = %id, "released object record");
        true
    }

    /// Enter one level of dispatch
    pub(crate) fn enter_call(&mut self) -> Result<()> {
        if self.call_depth >= self.config.max_call_depth {
            return Err(RuntimeError::CallDepthExceeded {
                max_depth: self.config.max_call_depth,
            });
        }
        self.call_depth += 1;
        Ok(())
    }

    pub(crate) fn exit_call(&mut self) {
        self.call_depth = self.call_depth.saturating_sub(1);
    }

    /// Current dispatch nesting depth
    pub fn call_depth(&self) -> usize {
        self.call_depth
    }
}

impl Default for Foundation {
    fn default() -> Self {
        Self::new()
    }
}

/// Fully qualify a command name
pub fn qualify(name: &str) -> String {
    if name.starts_with("::") {
        name.to_string()
    } else {
        format!("::{name}")
    }
}
