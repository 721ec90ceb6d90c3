//! Backend bridge to the reactive database client living in JavaScript.
//!
//! The page hands us an object exposing promise-returning methods; each
//! [`Backend`] call forwards to it and converts the result with
//! `serde-wasm-bindgen`.

use js_sys::Promise;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tutorboard_core::backend::{Backend, BackendError, BackendResult, BoxFuture};
use tutorboard_core::objects::{ObjectSpec, parse_object_list};
use tutorboard_core::session::SessionRecord;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

#[wasm_bindgen]
extern "C" {
    /// JavaScript backend client.
    #[wasm_bindgen(typescript_type = "TutorboardBackend")]
    pub type JsBackendHandle;

    #[wasm_bindgen(method, catch, js_name = getSession)]
    fn get_session(this: &JsBackendHandle, session_id: &str) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = listObjects)]
    fn list_objects(this: &JsBackendHandle, session_id: &str) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = addObject)]
    fn add_object(this: &JsBackendHandle, session_id: &str, object: JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = updateObject)]
    fn update_object(this: &JsBackendHandle, session_id: &str, object: JsValue) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = deleteObject)]
    fn delete_object(this: &JsBackendHandle, session_id: &str, object_id: &str) -> Result<Promise, JsValue>;

    #[wasm_bindgen(method, catch, js_name = insertSnapshot)]
    fn insert_snapshot(
        this: &JsBackendHandle,
        session_id: &str,
        index: f64,
        objects: JsValue,
    ) -> Result<Promise, JsValue>;
}

/// [`Backend`] implemented by a JavaScript client object.
///
/// Note: This is intentionally not Send/Sync since WASM is single-threaded
/// and JS handles cannot cross threads.
pub struct JsBackend {
    handle: JsBackendHandle,
}

impl JsBackend {
    pub fn new(handle: JsBackendHandle) -> Self {
        Self { handle }
    }
}

fn js_error(e: JsValue) -> BackendError {
    BackendError::Other(e.as_string().unwrap_or_else(|| format!("{:?}", e)))
}

pub(crate) fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
}

fn encode<T: Serialize + ?Sized>(value: &T) -> BackendResult<JsValue> {
    to_js(value).map_err(|e| BackendError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(value: JsValue) -> BackendResult<T> {
    serde_wasm_bindgen::from_value(value).map_err(|e| BackendError::Serialization(e.to_string()))
}

async fn settle(promise: Result<Promise, JsValue>) -> BackendResult<JsValue> {
    let promise = promise.map_err(js_error)?;
    JsFuture::from(promise).await.map_err(js_error)
}

impl Backend for JsBackend {
    fn get_session(&self, session_id: &str) -> BoxFuture<'_, BackendResult<SessionRecord>> {
        let result = self.handle.get_session(session_id);
        let session_id = session_id.to_string();
        Box::pin(async move {
            let value = settle(result).await?;
            if value.is_null() || value.is_undefined() {
                return Err(BackendError::SessionNotFound(session_id));
            }
            decode(value)
        })
    }

    fn list_objects(&self, session_id: &str) -> BoxFuture<'_, BackendResult<Vec<ObjectSpec>>> {
        let result = self.handle.list_objects(session_id);
        Box::pin(async move {
            let value = settle(result).await?;
            let raw: Vec<serde_json::Value> = decode(value)?;
            Ok(parse_object_list(raw))
        })
    }

    fn add_object(&self, session_id: &str, object: &ObjectSpec) -> BoxFuture<'_, BackendResult<()>> {
        let result = encode(object).map(|object| self.handle.add_object(session_id, object));
        Box::pin(async move {
            settle(result?).await?;
            Ok(())
        })
    }

    fn update_object(&self, session_id: &str, object: &ObjectSpec) -> BoxFuture<'_, BackendResult<()>> {
        let result = encode(object).map(|object| self.handle.update_object(session_id, object));
        Box::pin(async move {
            settle(result?).await?;
            Ok(())
        })
    }

    fn delete_object(&self, session_id: &str, object_id: &str) -> BoxFuture<'_, BackendResult<()>> {
        let result = self.handle.delete_object(session_id, object_id);
        Box::pin(async move {
            settle(result).await?;
            Ok(())
        })
    }

    fn insert_snapshot(
        &self,
        session_id: &str,
        index: u64,
        objects: &[ObjectSpec],
    ) -> BoxFuture<'_, BackendResult<()>> {
        let result = encode(objects)
            .map(|objects| self.handle.insert_snapshot(session_id, index as f64, objects));
        Box::pin(async move {
            settle(result?).await?;
            Ok(())
        })
    }
}
