//! Per-invocation cursor over a call chain.

use crate::chain::{CallChain, ChainEntry};
use crate::method::{Declarer, MethodRef};
use crate::object::{Name, ObjectId};
use crate::value::Value;
use std::rc::Rc;

/// The state of one active invocation: which chain, which entry, and what
/// the call site looked like.
///
/// `words` is the full call site (for example `::d speak a b`) and `skip` the
/// number of leading words that are not arguments to the method body.
/// A `next` call temporarily replaces both and restores them on return.
#[derive(Debug, Clone)]
pub struct CallContext {
    receiver: ObjectId,
    chain: Rc<CallChain>,
    index: usize,
    skip: usize,
    words: Vec<Value>,
}

/// Saved cursor, restored when a nested `next` returns
#[derive(Debug)]
pub(crate) struct Cursor {
    index: usize,
    skip: usize,
    words: Vec<Value>,
}

impl CallContext {
    pub fn new(receiver: ObjectId, chain: Rc<CallChain>, words: Vec<Value>, skip: usize) -> Self {
        Self {
            receiver,
            chain,
            index: 0,
            skip: skip.min(words.len()),
            words,
        }
    }

    pub fn receiver(&self) -> ObjectId {
        self.receiver
    }

    pub fn chain(&self) -> &Rc<CallChain> {
        &self.chain
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn skip(&self) -> usize {
        self.skip
    }

    /// The full call site
    pub fn words(&self) -> &[Value] {
        &self.words
    }

    /// Arguments visible to the current implementation
    pub fn args(&self) -> &[Value] {
        &self.words[self.skip..]
    }

    /// Call-site words that precede the arguments, for usage messages
    pub fn usage_prefix(&self) -> String {
        self.words[..self.skip]
            .iter()
            .map(|word| word.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn current_entry(&self) -> &ChainEntry {
        &self.chain.entries()[self.index]
    }

    pub fn current_method(&self) -> &MethodRef {
        &self.current_entry().method
    }

    /// The name the caller asked for
    pub fn method_name(&self) -> &Name {
        self.chain.method_name()
    }

    /// Declarer of the implementation now running
    pub fn declarer(&self) -> Declarer {
        self.current_method().declarer()
    }

    pub fn is_filter(&self) -> bool {
        self.current_entry().is_filter
    }

    /// When a filter is running, the name of the method it wraps
    pub fn filter_target(&self) -> Option<&Name> {
        self.is_filter().then(|| self.chain.method_name())
    }

    /// Scope used to decide whether private methods are reachable from here
    pub fn private_scope(&self) -> Option<ObjectId> {
        Some(self.declarer().id())
    }

    /// The entry `next` would run, if any
    pub fn next_entry(&self) -> Option<&ChainEntry> {
        self.chain.entry(self.index + 1)
    }

    pub fn has_next(&self) -> bool {
        self.index + 1 < self.chain.len()
    }

    /// Move to `index` with a new call site, returning the old cursor
    pub(crate) fn advance(&mut self, index: usize, words: Vec<Value>, skip: usize) -> Cursor {
        let saved = Cursor {
            index: self.index,
            skip: self.skip,
            words: std::mem::take(&mut self.words),
        };
        self.index = index;
        self.skip = skip.min(words.len());
        self.words = words;
        saved
    }

    pub(crate) fn restore(&mut self, cursor: Cursor) {
        self.index = cursor.index;
        self.skip = cursor.skip;
        self.words = cursor.words;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EpochStamp;
    use crate::chain::{CallKind, ChainFlags};
    use crate::method::{Method, MethodKind, ParamSpec, Visibility};
    use pretty_assertions::assert_eq;

    fn chain(owner: ObjectId) -> Rc<CallChain> {
        let method = |name: &str| {
            Rc::new(Method::new(
                name.into(),
                MethodKind::procedure(ParamSpec::new(), ""),
                Visibility::Public,
                Declarer::Class(owner),
            ))
        };
        Rc::new(CallChain::new(
            "speak".into(),
            CallKind::Public,
            vec![
                ChainEntry::filter(method("log"), Some(owner)),
                ChainEntry::method(method("speak")),
            ],
            EpochStamp::default(),
            ChainFlags::default(),
        ))
    }

    #[test]
    fn test_args_skip_call_site_words() {
        let owner = ObjectId::new(2, 0);
        let words = vec![Value::from("::d"), Value::from("speak"), Value::from("loud")];
        let context = CallContext::new(owner, chain(owner), words, 2);
        assert_eq!(context.args(), &[Value::from("loud")]);
        assert_eq!(context.usage_prefix(), "::d speak");
        assert!(context.is_filter());
        assert_eq!(context.filter_target().map(|name| name.as_ref()), Some("speak"));
        assert_eq!(context.private_scope(), Some(owner));
    }

    #[test]
    fn test_advance_and_restore() {
        let owner = ObjectId::new(2, 0);
        let words = vec![Value::from("::d"), Value::from("speak")];
        let mut context = CallContext::new(owner, chain(owner), words, 2);
        assert!(context.has_next());

        let saved = context.advance(1, vec![Value::from("next"), Value::from("x")], 1);
        assert_eq!(context.index(), 1);
        assert_eq!(context.args(), &[Value::from("x")]);
        assert!(!context.is_filter());
        assert!(context.next_entry().is_none());

        context.restore(saved);
        assert_eq!(context.index(), 0);
        assert!(context.args().is_empty());
    }
}
