//! In-memory backend implementation.

use super::{Backend, BackendError, BackendResult, BoxFuture};
use crate::objects::ObjectSpec;
use crate::session::SessionRecord;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

#[derive(Debug, Clone)]
struct SessionData {
    record: SessionRecord,
    objects: Vec<ObjectSpec>,
    snapshots: BTreeMap<u64, Vec<ObjectSpec>>,
}

/// In-memory backend for testing and headless use.
#[derive(Default)]
pub struct MemoryBackend {
    sessions: RwLock<HashMap<String, SessionData>>,
}

impl MemoryBackend {
    /// Create a new empty memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a session record.
    pub fn insert_session(&self, record: SessionRecord) -> BackendResult<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| BackendError::Other(format!("Lock error: {}", e)))?;
        match sessions.get_mut(&record.id) {
            Some(data) => data.record = record,
            None => {
                sessions.insert(
                    record.id.clone(),
                    SessionData {
                        record,
                        objects: Vec::new(),
                        snapshots: BTreeMap::new(),
                    },
                );
            }
        }
        Ok(())
    }

    /// Stored snapshot for a session/index pair.
    pub fn snapshot(&self, session_id: &str, index: u64) -> Option<Vec<ObjectSpec>> {
        let sessions = self.sessions.read().ok()?;
        sessions.get(session_id)?.snapshots.get(&index).cloned()
    }

    /// Number of stored snapshots for a session.
    pub fn snapshot_count(&self, session_id: &str) -> usize {
        self.sessions
            .read()
            .ok()
            .and_then(|s| s.get(session_id).map(|d| d.snapshots.len()))
            .unwrap_or(0)
    }

    fn with_session<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionData) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| BackendError::Other(format!("Lock error: {}", e)))?;
        let data = sessions
            .get_mut(session_id)
            .ok_or_else(|| BackendError::SessionNotFound(session_id.to_string()))?;
        f(data)
    }
}

impl Backend for MemoryBackend {
    fn get_session(&self, session_id: &str) -> BoxFuture<'_, BackendResult<SessionRecord>> {
        let session_id = session_id.to_string();
        Box::pin(async move { self.with_session(&session_id, |data| Ok(data.record.clone())) })
    }

    fn list_objects(&self, session_id: &str) -> BoxFuture<'_, BackendResult<Vec<ObjectSpec>>> {
        let session_id = session_id.to_string();
        Box::pin(async move { self.with_session(&session_id, |data| Ok(data.objects.clone())) })
    }

    fn add_object(&self, session_id: &str, object: &ObjectSpec) -> BoxFuture<'_, BackendResult<()>> {
        let session_id = session_id.to_string();
        let object = object.clone();
        Box::pin(async move {
            self.with_session(&session_id, |data| {
                // ids are unique: a re-add replaces in place
                match data.objects.iter_mut().find(|o| o.id == object.id) {
                    Some(existing) => *existing = object,
                    None => data.objects.push(object),
                }
                Ok(())
            })
        })
    }

    fn update_object(&self, session_id: &str, object: &ObjectSpec) -> BoxFuture<'_, BackendResult<()>> {
        let session_id = session_id.to_string();
        let object = object.clone();
        Box::pin(async move {
            self.with_session(&session_id, |data| {
                let existing = data
                    .objects
                    .iter_mut()
                    .find(|o| o.id == object.id)
                    .ok_or_else(|| BackendError::ObjectNotFound(object.id.clone()))?;
                *existing = object;
                Ok(())
            })
        })
    }

    fn delete_object(&self, session_id: &str, object_id: &str) -> BoxFuture<'_, BackendResult<()>> {
        let session_id = session_id.to_string();
        let object_id = object_id.to_string();
        Box::pin(async move {
            self.with_session(&session_id, |data| {
                let before = data.objects.len();
                data.objects.retain(|o| o.id != object_id);
                if data.objects.len() == before {
                    return Err(BackendError::ObjectNotFound(object_id));
                }
                Ok(())
            })
        })
    }

    fn insert_snapshot(
        &self,
        session_id: &str,
        index: u64,
        objects: &[ObjectSpec],
    ) -> BoxFuture<'_, BackendResult<()>> {
        let session_id = session_id.to_string();
        let objects = objects.to_vec();
        Box::pin(async move {
            self.with_session(&session_id, |data| {
                data.snapshots.insert(index, objects);
                Ok(())
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendOp, apply_ops};
    use crate::objects::ObjectShape;

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        // Simple blocking executor for tests
        use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

        fn dummy_raw_waker() -> RawWaker {
            fn no_op(_: *const ()) {}
            fn clone(_: *const ()) -> RawWaker {
                dummy_raw_waker()
            }
            static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, no_op, no_op, no_op);
            RawWaker::new(std::ptr::null(), &VTABLE)
        }

        let waker = unsafe { Waker::from_raw(dummy_raw_waker()) };
        let mut cx = Context::from_waker(&waker);
        let mut f = std::pin::pin!(f);

        loop {
            match f.as_mut().poll(&mut cx) {
                Poll::Ready(result) => return result,
                Poll::Pending => {}
            }
        }
    }

    fn object(id: &str) -> ObjectSpec {
        ObjectSpec::with_id(
            id,
            ObjectShape::Unknown {
                kind: "note".to_string(),
                fields: Default::default(),
            },
        )
    }

    fn backend_with_session() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.insert_session(SessionRecord::new("s1")).unwrap();
        backend
    }

    #[test]
    fn test_session_lookup() {
        let backend = backend_with_session();
        let record = block_on(backend.get_session("s1")).unwrap();
        assert_eq!(record.id, "s1");

        let missing = block_on(backend.get_session("nope"));
        assert!(matches!(missing, Err(BackendError::SessionNotFound(_))));
    }

    #[test]
    fn test_objects_keep_insertion_order() {
        let backend = backend_with_session();
        for id in ["c", "a", "b"] {
            block_on(backend.add_object("s1", &object(id))).unwrap();
        }
        let ids: Vec<_> = block_on(backend.list_objects("s1"))
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_update_and_delete() {
        let backend = backend_with_session();
        block_on(backend.add_object("s1", &object("a"))).unwrap();

        let updated = object("a").with_meta(serde_json::json!({ "v": 2 }));
        block_on(backend.update_object("s1", &updated)).unwrap();
        assert_eq!(block_on(backend.list_objects("s1")).unwrap(), vec![updated]);

        block_on(backend.delete_object("s1", "a")).unwrap();
        assert!(block_on(backend.list_objects("s1")).unwrap().is_empty());
        assert!(matches!(
            block_on(backend.delete_object("s1", "a")),
            Err(BackendError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_apply_ops_skips_failures() {
        let backend = backend_with_session();
        let ops = vec![
            BackendOp::AddObject {
                session_id: "s1".to_string(),
                object: object("a"),
            },
            BackendOp::DeleteObject {
                session_id: "s1".to_string(),
                object_id: "missing".to_string(),
            },
            BackendOp::InsertSnapshot {
                session_id: "s1".to_string(),
                index: 7,
                objects: vec![object("a")],
            },
        ];
        assert_eq!(block_on(apply_ops(&backend, &ops)), 2);
        assert_eq!(backend.snapshot("s1", 7), Some(vec![object("a")]));
        assert_eq!(backend.snapshot_count("s1"), 1);
    }
}
