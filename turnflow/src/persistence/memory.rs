//! Journaled in-memory key/value store with nested scopes.

use super::{Persistence, ScopeHandle};
use crate::errors::PersistenceError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
struct OpenScope {
    id: u64,
    /// Prior value of every key written inside the scope, oldest first.
    journal: Vec<(String, Option<serde_json::Value>)>,
}

#[derive(Debug, Default)]
struct Inner {
    data: HashMap<String, serde_json::Value>,
    scopes: Vec<OpenScope>,
    next_id: u64,
}

impl Inner {
    fn write(&mut self, key: String, value: Option<serde_json::Value>) {
        let prior = match value {
            Some(v) => self.data.insert(key.clone(), v),
            None => self.data.remove(&key),
        };
        if let Some(scope) = self.scopes.last_mut() {
            scope.journal.push((key, prior));
        }
    }

    fn pop_innermost(&mut self, scope: &ScopeHandle) -> Result<OpenScope, PersistenceError> {
        match self.scopes.last() {
            Some(top) if top.id == scope.id => {}
            Some(_) if self.scopes.iter().any(|s| s.id == scope.id) => {
                return Err(PersistenceError::ScopeMismatch { scope_id: scope.id });
            }
            _ => return Err(PersistenceError::ScopeNotOpen { scope_id: scope.id }),
        }
        self.scopes
            .pop()
            .ok_or(PersistenceError::ScopeNotOpen { scope_id: scope.id })
    }
}

/// In-memory persistence handle.
///
/// Writes made while a scope is open are journaled so the scope can be rolled
/// back. Releasing a nested scope hands its journal to the parent, so an outer
/// rollback still undoes everything beneath it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryPersistence {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a value.
    pub fn put(&self, key: impl Into<String>, value: serde_json::Value) {
        self.inner.lock().write(key.into(), Some(value));
    }

    /// Removes a value.
    pub fn remove(&self, key: &str) {
        let mut inner = self.inner.lock();
        if inner.data.contains_key(key) {
            inner.write(key.to_string(), None);
        }
    }

    /// Reads a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.lock().data.get(key).cloned()
    }

    /// Returns a copy of all stored data.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.inner.lock().data.clone()
    }

    /// Number of scopes currently open.
    #[must_use]
    pub fn open_scopes(&self) -> usize {
        self.inner.lock().scopes.len()
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn begin_scope(&self, stage: &str) -> Result<ScopeHandle, PersistenceError> {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.scopes.push(OpenScope {
            id,
            journal: Vec::new(),
        });
        Ok(ScopeHandle::new(id, stage))
    }

    async fn release_scope(&self, scope: ScopeHandle) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock();
        let closed = inner.pop_innermost(&scope)?;
        if let Some(parent) = inner.scopes.last_mut() {
            parent.journal.extend(closed.journal);
        }
        Ok(())
    }

    async fn rollback_scope(&self, scope: ScopeHandle) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock();
        let closed = inner.pop_innermost(&scope)?;
        for (key, prior) in closed.journal.into_iter().rev() {
            match prior {
                Some(value) => {
                    inner.data.insert(key, value);
                }
                None => {
                    inner.data.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_writes_outside_scope_are_kept() {
        let store = InMemoryPersistence::new();
        store.put("a", json!(1));
        assert_eq!(store.get("a"), Some(json!(1)));
        assert_eq!(store.open_scopes(), 0);
    }

    #[tokio::test]
    async fn test_rollback_restores_prior_values() {
        let store = InMemoryPersistence::new();
        store.put("existing", json!("before"));

        let scope = store.begin_scope("memory_write").await.unwrap();
        store.put("existing", json!("after"));
        store.put("new", json!(true));
        store.remove("existing");
        store.rollback_scope(scope).await.unwrap();

        assert_eq!(store.get("existing"), Some(json!("before")));
        assert_eq!(store.get("new"), None);
        assert_eq!(store.open_scopes(), 0);
    }

    #[tokio::test]
    async fn test_release_keeps_writes() {
        let store = InMemoryPersistence::new();
        let scope = store.begin_scope("memory_write").await.unwrap();
        store.put("k", json!(42));
        store.release_scope(scope).await.unwrap();

        assert_eq!(store.get("k"), Some(json!(42)));
    }

    #[tokio::test]
    async fn test_outer_rollback_undoes_released_inner_scope() {
        let store = InMemoryPersistence::new();
        let outer = store.begin_scope("outer").await.unwrap();
        let inner = store.begin_scope("inner").await.unwrap();
        store.put("k", json!(1));
        store.release_scope(inner).await.unwrap();
        store.rollback_scope(outer).await.unwrap();

        assert_eq!(store.get("k"), None);
    }

    #[tokio::test]
    async fn test_closing_non_innermost_scope_fails() {
        let store = InMemoryPersistence::new();
        let outer = store.begin_scope("outer").await.unwrap();
        let _inner = store.begin_scope("inner").await.unwrap();

        let err = store.release_scope(outer.clone()).await.unwrap_err();
        assert_eq!(err, PersistenceError::ScopeMismatch { scope_id: outer.id });
    }

    #[tokio::test]
    async fn test_closing_unknown_scope_fails() {
        let store = InMemoryPersistence::new();
        let err = store
            .rollback_scope(ScopeHandle::new(99, "ghost"))
            .await
            .unwrap_err();
        assert_eq!(err, PersistenceError::ScopeNotOpen { scope_id: 99 });
    }
}
