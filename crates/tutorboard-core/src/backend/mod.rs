//! Backend abstraction for session and object persistence.
//!
//! The authoritative store is an external reactive database. This module
//! only describes the surface the board consumes from it.

mod memory;

pub use memory::MemoryBackend;

use crate::objects::{ObjectId, ObjectSpec};
use crate::session::SessionRecord;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Backend errors.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Object not found: {0}")]
    ObjectNotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Backend error: {0}")]
    Other(String),
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Boxed future for async operations (compatible with WASM).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Queries and mutations consumed from the reactive backend.
///
/// Note: On native platforms, implementations must be Send + Sync.
/// On WASM, these bounds are relaxed since it's single-threaded.
#[cfg(not(target_arch = "wasm32"))]
pub trait Backend: Send + Sync {
    /// Look up a session by id.
    fn get_session(&self, session_id: &str) -> BoxFuture<'_, BackendResult<SessionRecord>>;

    /// Current object list of a session, in insertion order.
    fn list_objects(&self, session_id: &str) -> BoxFuture<'_, BackendResult<Vec<ObjectSpec>>>;

    fn add_object(&self, session_id: &str, object: &ObjectSpec) -> BoxFuture<'_, BackendResult<()>>;

    fn update_object(&self, session_id: &str, object: &ObjectSpec) -> BoxFuture<'_, BackendResult<()>>;

    fn delete_object(&self, session_id: &str, object_id: &str) -> BoxFuture<'_, BackendResult<()>>;

    /// Store a board snapshot under its index.
    fn insert_snapshot(
        &self,
        session_id: &str,
        index: u64,
        objects: &[ObjectSpec],
    ) -> BoxFuture<'_, BackendResult<()>>;
}

/// Queries and mutations consumed from the reactive backend (WASM version
/// without Send + Sync).
#[cfg(target_arch = "wasm32")]
pub trait Backend {
    /// Look up a session by id.
    fn get_session(&self, session_id: &str) -> BoxFuture<'_, BackendResult<SessionRecord>>;

    /// Current object list of a session, in insertion order.
    fn list_objects(&self, session_id: &str) -> BoxFuture<'_, BackendResult<Vec<ObjectSpec>>>;

    fn add_object(&self, session_id: &str, object: &ObjectSpec) -> BoxFuture<'_, BackendResult<()>>;

    fn update_object(&self, session_id: &str, object: &ObjectSpec) -> BoxFuture<'_, BackendResult<()>>;

    fn delete_object(&self, session_id: &str, object_id: &str) -> BoxFuture<'_, BackendResult<()>>;

    /// Store a board snapshot under its index.
    fn insert_snapshot(
        &self,
        session_id: &str,
        index: u64,
        objects: &[ObjectSpec],
    ) -> BoxFuture<'_, BackendResult<()>>;
}

/// A mutation queued by the board or host, executed against a [`Backend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendOp {
    AddObject {
        session_id: String,
        object: ObjectSpec,
    },
    UpdateObject {
        session_id: String,
        object: ObjectSpec,
    },
    DeleteObject {
        session_id: String,
        object_id: ObjectId,
    },
    InsertSnapshot {
        session_id: String,
        index: u64,
        objects: Vec<ObjectSpec>,
    },
}

impl BackendOp {
    pub fn session_id(&self) -> &str {
        match self {
            BackendOp::AddObject { session_id, .. }
            | BackendOp::UpdateObject { session_id, .. }
            | BackendOp::DeleteObject { session_id, .. }
            | BackendOp::InsertSnapshot { session_id, .. } => session_id,
        }
    }
}

/// Execute one queued mutation.
pub async fn apply_op<B: Backend + ?Sized>(backend: &B, op: &BackendOp) -> BackendResult<()> {
    match op {
        BackendOp::AddObject { session_id, object } => backend.add_object(session_id, object).await,
        BackendOp::UpdateObject { session_id, object } => {
            backend.update_object(session_id, object).await
        }
        BackendOp::DeleteObject {
            session_id,
            object_id,
        } => backend.delete_object(session_id, object_id).await,
        BackendOp::InsertSnapshot {
            session_id,
            index,
            objects,
        } => backend.insert_snapshot(session_id, *index, objects).await,
    }
}

/// Execute queued mutations in order. Failures are logged and skipped;
/// nothing is retried. Returns how many succeeded.
pub async fn apply_ops<B: Backend + ?Sized>(backend: &B, ops: &[BackendOp]) -> usize {
    let mut applied = 0;
    for op in ops {
        match apply_op(backend, op).await {
            Ok(()) => applied += 1,
            Err(e) => log::error!("Backend mutation for session {} failed: {}", op.session_id(), e),
        }
    }
    applied
}
