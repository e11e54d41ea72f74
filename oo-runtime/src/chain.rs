//! Call chains: the resolved, immutable sequence of implementations for
//! one call.

use crate::cache::EpochStamp;
use crate::foundation::Foundation;
use crate::method::{Declarer, MethodRef, Visibility};
use crate::object::{Name, ObjectId};
use crate::value::Value;
use std::fmt;

/// How a method is being called
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Through the object's public command; only exported methods resolve
    Public,
    /// Through `my`; unexported methods resolve too
    Private,
    /// The constructor chain
    Constructor,
    /// The destructor chain
    Destructor,
    /// The unknown handler, looked up directly
    Unknown,
}

impl CallKind {
    /// Word used in "no next ... implementation"
    pub fn label(&self) -> &'static str {
        match self {
            CallKind::Constructor => "constructor",
            CallKind::Destructor => "destructor",
            _ => "method",
        }
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self, CallKind::Constructor | CallKind::Destructor)
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CallKind::Public => "public",
            CallKind::Private => "private",
            CallKind::Constructor => "constructor",
            CallKind::Destructor => "destructor",
            CallKind::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

/// Facts about how a chain was built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainFlags {
    /// The requested name did not resolve; the chain runs the unknown handler
    pub unknown: bool,
    /// Built while a filter was running, so filters were left out
    pub filters_suppressed: bool,
    /// Private methods were seen, so the content depends on the caller's scope
    pub scope_sensitive: bool,
}

/// One step of a chain
#[derive(Debug, Clone)]
pub struct ChainEntry {
    pub method: MethodRef,
    pub is_filter: bool,
    /// Class that contributed the filter, `None` when declared on the object
    pub filter_declarer: Option<ObjectId>,
}

impl ChainEntry {
    pub fn method(method: MethodRef) -> Self {
        Self {
            method,
            is_filter: false,
            filter_declarer: None,
        }
    }

    pub fn filter(method: MethodRef, declarer: Option<ObjectId>) -> Self {
        Self {
            method,
            is_filter: true,
            filter_declarer: declarer,
        }
    }
}

#[derive(Debug)]
pub struct CallChain {
    method_name: Name,
    kind: CallKind,
    entries: Vec<ChainEntry>,
    stamp: EpochStamp,
    flags: ChainFlags,
}

impl CallChain {
    pub fn new(
        method_name: Name,
        kind: CallKind,
        entries: Vec<ChainEntry>,
        stamp: EpochStamp,
        flags: ChainFlags,
    ) -> Self {
        Self {
            method_name,
            kind,
            entries,
            stamp,
            flags,
        }
    }

    /// The name the caller asked for, even when the chain runs the unknown handler
    pub fn method_name(&self) -> &Name {
        &self.method_name
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&ChainEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stamp(&self) -> EpochStamp {
        self.stamp
    }

    pub fn flags(&self) -> ChainFlags {
        self.flags
    }

    pub fn is_unknown(&self) -> bool {
        self.flags.unknown
    }

    /// Number of leading filter entries
    pub fn filter_count(&self) -> usize {
        self.entries.iter().take_while(|entry| entry.is_filter).count()
    }
}

/// Describe a chain as a list of `{type name declarer impltype}` quads.
///
/// `type` is `filter`, `method`, `private` or `unknown`; `declarer` is the
/// declaring class name or `object` for object-level declarations.
pub fn render_call_chain(foundation: &Foundation, chain: &CallChain) -> Value {
    let describe = |id: ObjectId| match foundation.get(id) {
        Some(object) => Value::string(object.name().as_ref()),
        None => Value::string(id.to_string()),
    };

    Value::list(chain.entries().iter().map(|entry| {
        let method = &entry.method;
        let entry_type = if entry.is_filter {
            "filter"
        } else if chain.is_unknown() {
            "unknown"
        } else if method.visibility() == Visibility::Private {
            "private"
        } else {
            "method"
        };

        let declarer = if entry.is_filter {
            match entry.filter_declarer {
                Some(class) => describe(class),
                None => Value::from("object"),
            }
        } else {
            match method.declarer() {
                Declarer::Class(class) => describe(class),
                Declarer::Object(_) => Value::from("object"),
            }
        };

        Value::list(vec![
            Value::from(entry_type),
            Value::string(method.name().as_ref()),
            declarer,
            Value::from(method.kind().impl_type()),
        ])
    }))
}
