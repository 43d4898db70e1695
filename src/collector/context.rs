//! Request-scoped key/value context.
//!
//! Every URL discovered through extraction gets a freshly allocated
//! context; an explicit retry of a request keeps the same allocation.
//! Identity is observable through [`Context::same_as`] so tests can verify
//! both halves of that contract.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A shared string map scoped to one request (and its retries).
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl Context {
    /// A fresh, empty context. Never shared with any other request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.lock().insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().get(key).cloned()
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.inner.lock().remove(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Whether two handles point at the same underlying map.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_storage() {
        let ctx = Context::new();
        let clone = ctx.clone();
        ctx.put("k", "v");
        assert_eq!(clone.get("k").as_deref(), Some("v"));
        assert!(ctx.same_as(&clone));
    }

    #[test]
    fn fresh_contexts_are_distinct() {
        let a = Context::new();
        let b = Context::new();
        a.put("k", "v");
        assert!(b.get("k").is_none());
        assert!(!a.same_as(&b));
    }
}
