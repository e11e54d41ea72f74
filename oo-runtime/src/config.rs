//! Runtime configuration for a single execution context.
//!
//! A `RuntimeConfig` is fixed when the `Foundation` is created; nothing is
//! read from the environment.

/// Maximum nesting of method invocations (including `next` steps)
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// Prefix for generated object and namespace names
pub const DEFAULT_OBJECT_NAME_PREFIX: &str = "::oo::Obj";

/// What happens to the dependents of a class when it is destroyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassDeletionPolicy {
    /// Subclasses and instances are destroyed along with the class
    #[default]
    DestroyDependents,
    /// Subclasses lose the edge and instances are reassigned to a root class
    DetachDependents,
}

/// Settings for one execution context's object system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Limit on nested dispatch depth
    pub max_call_depth: usize,

    /// Class teardown policy for live subclasses and instances
    pub deletion_policy: ClassDeletionPolicy,

    /// Prefix used when an object is created without an explicit name
    pub object_name_prefix: String,
}

impl RuntimeConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            deletion_policy: ClassDeletionPolicy::default(),
            object_name_prefix: DEFAULT_OBJECT_NAME_PREFIX.to_string(),
        }
    }

    /// Override the dispatch depth limit
    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    /// Override the class deletion policy
    pub fn with_deletion_policy(mut self, policy: ClassDeletionPolicy) -> Self {
        self.deletion_policy = policy;
        self
    }

    /// Override the generated-name prefix
    pub fn with_object_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.object_name_prefix = prefix.into();
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}
