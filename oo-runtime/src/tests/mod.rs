//! Scenario tests for the object runtime
//!
//! These tests drive the runtime through the script harness:
//! - Method resolution order, `next` and `nextto`
//! - Filters and the filter-handling guard
//! - Chain caching and epoch invalidation
//! - Class graph mutation and cycle rejection
//! - Object lifecycle, class deletion policies and copying
//! - Visibility, private methods and the unknown handler
//! - Procedure method hooks

pub mod test_dispatch;
pub mod test_visibility;
