//! Epoch-stamped call chain cache.
//!
//! Entries are never invalidated eagerly. A lookup compares the stamp stored
//! in the chain with the receiver's current stamp and drops the entry on any
//! mismatch; the dropped chain is freed once no call context refers to it.

use crate::chain::{CallChain, CallKind};
use crate::object::Name;
use indexmap::IndexMap;
use std::rc::Rc;

/// The three epochs a chain depends on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct EpochStamp {
    /// Receiver's creation epoch, fixed for its lifetime
    pub creation: u64,
    /// Receiver's own mutation epoch
    pub object: u64,
    /// Foundation-wide structural epoch
    pub global: u64,
}

/// Cache key: a method name together with the kind of call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainKey {
    pub name: Name,
    pub kind: CallKind,
}

impl ChainKey {
    pub fn new(name: Name, kind: CallKind) -> Self {
        Self { name, kind }
    }
}

#[derive(Debug, Default)]
pub struct ChainCache {
    entries: IndexMap<ChainKey, Rc<CallChain>>,
}

impl ChainCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached chain if its stamp still matches, dropping it otherwise
    pub fn lookup(&mut self, key: &ChainKey, stamp: EpochStamp) -> Option<Rc<CallChain>> {
        match self.entries.get(key) {
            Some(chain) if chain.stamp() == stamp => Some(Rc::clone(chain)),
            Some(_) => {
                self.entries.swap_remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, key: ChainKey, chain: Rc<CallChain>) {
        self.entries.insert(key, chain);
    }

    pub fn contains(&self, key: &ChainKey) -> bool {
        self.entries.contains_key(key)
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
}
