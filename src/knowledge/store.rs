//! Knowledge store — the authoritative, in-process statement set and the
//! entry point patches flow through on their way to persistence and to
//! subscribers.
//!
//! Structurally this mirrors [`crate::server::task_store`]: a small
//! `#[async_trait]` trait plus an in-memory implementation backed by a
//! `tokio::sync::RwLock`. The statement set additionally needs a
//! per-subject write lock (I5's identity tuple is keyed by subject), so
//! concurrent patches to unrelated subjects don't serialize against each
//! other — the same sharded-lock shape [`crate::server::task_store`] uses
//! per task id.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::A2AResult;
use crate::knowledge::types::{KGStatement, KnowledgeGraphChangeEvent, PatchOp};

/// Outcome of applying one [`crate::knowledge::types::KnowledgeGraphPatch`]
/// against the store, independent of verification.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedPatch {
    /// The change event recorded for this patch.
    pub event: KnowledgeGraphChangeEvent,
    /// `true` if the statement set actually changed (I7: a duplicate `add`
    /// of an already-present statement does not count as a change).
    pub changed: bool,
}

/// Trait for storing and querying knowledge graph statements.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Apply one patch and return its outcome. Does not perform
    /// verification — callers run patches through a
    /// [`crate::knowledge::verification::VerificationPolicy`] first.
    async fn apply(&self, op: PatchOp, statement: KGStatement) -> A2AResult<AppliedPatch>;

    /// Returns all statements currently in the store, optionally scoped to
    /// a named graph.
    async fn all_statements(&self, graph: Option<&str>) -> A2AResult<Vec<KGStatement>>;

    /// Returns statements matching the given optional subject/predicate/
    /// object/graph constraints, used by the query executor.
    async fn find(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
        graph: Option<&str>,
    ) -> A2AResult<Vec<KGStatement>>;
}

type IdentityKey = (String, String, String, Option<String>);

/// In-memory knowledge store. Data is lost on process exit.
#[derive(Debug)]
pub struct InMemoryKnowledgeStore {
    statements: Arc<RwLock<HashMap<IdentityKey, KGStatement>>>,
    /// Per-subject write lock so unrelated subjects can be patched
    /// concurrently while same-subject patches still serialize.
    subject_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl InMemoryKnowledgeStore {
    /// Create a new, empty in-memory knowledge store.
    pub fn new() -> Self {
        Self {
            statements: Arc::new(RwLock::new(HashMap::new())),
            subject_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn lock_for_subject(&self, subject_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.subject_locks.lock().await;
        locks
            .entry(subject_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl Default for InMemoryKnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn apply(&self, op: PatchOp, mut statement: KGStatement) -> A2AResult<AppliedPatch> {
        statement.clamp_certainty();
        let subject_id = statement.subject.id.clone();
        let subject_lock = self.lock_for_subject(&subject_id).await;
        let _guard = subject_lock.lock().await;

        let key = statement.identity();
        let changed = match op {
            PatchOp::Add => {
                let mut statements = self.statements.write().await;
                if statements.contains_key(&key) {
                    false
                } else {
                    statements.insert(key, statement.clone());
                    true
                }
            }
            PatchOp::Remove => {
                let mut statements = self.statements.write().await;
                statements.remove(&key).is_some()
            }
            PatchOp::Replace => {
                let mut statements = self.statements.write().await;
                // Replace drops every statement sharing subject+predicate+graph
                // before inserting the new object, not just an identity match.
                let replace_prefix = (
                    statement.subject.id.clone(),
                    statement.predicate.id.clone(),
                    statement.graph.clone(),
                );
                let to_remove: Vec<IdentityKey> = statements
                    .keys()
                    .filter(|k| (k.0.clone(), k.1.clone(), k.3.clone()) == replace_prefix)
                    .cloned()
                    .collect();
                for k in to_remove {
                    statements.remove(&k);
                }
                statements.insert(key, statement.clone());
                true
            }
        };

        debug!(subject = %subject_id, op = ?op, changed = changed, "applied KG patch");

        Ok(AppliedPatch {
            event: KnowledgeGraphChangeEvent {
                op,
                statement,
                change_id: Uuid::new_v4().to_string(),
                timestamp: chrono::Utc::now().to_rfc3339(),
                change_metadata: None,
            },
            changed,
        })
    }

    async fn all_statements(&self, graph: Option<&str>) -> A2AResult<Vec<KGStatement>> {
        let statements = self.statements.read().await;
        Ok(statements
            .values()
            .filter(|s| graph.is_none() || s.graph.as_deref() == graph)
            .cloned()
            .collect())
    }

    async fn find(
        &self,
        subject: Option<&str>,
        predicate: Option<&str>,
        object: Option<&str>,
        graph: Option<&str>,
    ) -> A2AResult<Vec<KGStatement>> {
        let statements = self.statements.read().await;
        Ok(statements
            .values()
            .filter(|s| subject.map_or(true, |v| s.subject.id == v))
            .filter(|s| predicate.map_or(true, |v| s.predicate.id == v))
            .filter(|s| object.map_or(true, |v| s.object.identity_key() == v))
            .filter(|s| graph.map_or(true, |v| s.graph.as_deref() == Some(v)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::types::{KGObject, KGPredicate, KGSubject};

    fn statement(subject: &str, predicate: &str, object: &str) -> KGStatement {
        KGStatement {
            subject: KGSubject {
                id: subject.to_string(),
                r#type: None,
            },
            predicate: KGPredicate {
                id: predicate.to_string(),
            },
            object: KGObject::Resource {
                id: object.to_string(),
                type_: None,
            },
            graph: None,
            certainty: None,
            provenance: None,
        }
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let store = InMemoryKnowledgeStore::new();
        let stmt = statement("ex:alice", "ex:knows", "ex:bob");
        let first = store.apply(PatchOp::Add, stmt.clone()).await.unwrap();
        assert!(first.changed);
        let second = store.apply(PatchOp::Add, stmt).await.unwrap();
        assert!(!second.changed);
        assert_eq!(store.all_statements(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn remove_nonexistent_is_a_noop_change() {
        let store = InMemoryKnowledgeStore::new();
        let stmt = statement("ex:alice", "ex:knows", "ex:bob");
        let outcome = store.apply(PatchOp::Remove, stmt).await.unwrap();
        assert!(!outcome.changed);
    }

    #[tokio::test]
    async fn replace_drops_prior_statements_for_subject_predicate() {
        let store = InMemoryKnowledgeStore::new();
        store
            .apply(PatchOp::Add, statement("ex:alice", "ex:role", "ex:engineer"))
            .await
            .unwrap();
        store
            .apply(PatchOp::Replace, statement("ex:alice", "ex:role", "ex:manager"))
            .await
            .unwrap();
        let remaining = store.find(Some("ex:alice"), Some("ex:role"), None, None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].object.identity_key(), "ex:manager");
    }

    #[tokio::test]
    async fn certainty_is_clamped_on_apply() {
        let store = InMemoryKnowledgeStore::new();
        let mut stmt = statement("ex:alice", "ex:trusts", "ex:bob");
        stmt.certainty = Some(2.0);
        let outcome = store.apply(PatchOp::Add, stmt).await.unwrap();
        assert_eq!(outcome.event.statement.certainty, Some(1.0));
    }

    #[tokio::test]
    async fn find_filters_by_each_component() {
        let store = InMemoryKnowledgeStore::new();
        store
            .apply(PatchOp::Add, statement("ex:alice", "ex:knows", "ex:bob"))
            .await
            .unwrap();
        store
            .apply(PatchOp::Add, statement("ex:alice", "ex:knows", "ex:carol"))
            .await
            .unwrap();
        let by_subject = store.find(Some("ex:alice"), None, None, None).await.unwrap();
        assert_eq!(by_subject.len(), 2);
        let by_object = store.find(None, None, Some("ex:bob"), None).await.unwrap();
        assert_eq!(by_object.len(), 1);
    }
}
