//! Production [`Engine`] over the native client library.

use std::ffi::{CStr, CString};
use std::os::fd::{FromRawFd, OwnedFd};
use std::ptr::NonNull;

use savime_sys::{savime_result_t, Api};

use crate::engine::{BlockStatus, DataElement, Engine, QueryResult, TransportHandle};
use crate::error::{Error, Result};
use crate::types::{WireKind, WireType};

/// Engine backed by the dynamically-loaded SAVIME client library.
#[derive(Clone, Copy)]
pub struct NativeEngine {
    api: &'static Api,
}

impl NativeEngine {
    /// Resolve the process-wide client library.
    pub fn new() -> Result<NativeEngine> {
        let api = savime_sys::api().map_err(|e| Error::Runtime(e.to_string()))?;
        Ok(NativeEngine { api })
    }
}

fn to_handle(raw: savime_sys::savime_conn_t) -> TransportHandle {
    TransportHandle {
        socketfd: raw.socketfd,
        clientid: raw.clientid,
        queryid: raw.queryid,
        message_count: raw.message_count,
        opened: raw.opened,
    }
}

fn to_raw(handle: &TransportHandle) -> savime_sys::savime_conn_t {
    savime_sys::savime_conn_t {
        socketfd: handle.socketfd,
        clientid: handle.clientid,
        queryid: handle.queryid,
        message_count: handle.message_count,
        opened: handle.opened,
    }
}

/// Result handle of one executed query.
///
/// Owns the native handle; `savime_dispose_query_handle` runs exactly once
/// in `Drop`, on success and failure paths alike.
pub struct NativeResult {
    api: &'static Api,
    raw: Option<NonNull<savime_result_t>>,
    response_text: String,
    is_schema: bool,
    successful: bool,
    schema: Vec<DataElement>,
    descriptors: Vec<(String, OwnedFd)>,
}

impl NativeResult {
    /// Wrap a handle returned by `savime_execute`, snapshotting the
    /// fields that stay fixed for the query's lifetime. A null pointer
    /// reads as a failed, empty result.
    fn from_raw(api: &'static Api, ptr: *mut savime_result_t) -> NativeResult {
        let Some(raw) = NonNull::new(ptr) else {
            return NativeResult {
                api,
                raw: None,
                response_text: String::new(),
                is_schema: false,
                successful: false,
                schema: Vec::new(),
                descriptors: Vec::new(),
            };
        };

        // SAFETY: `raw` is a live handle owned by us until Drop; the
        // accessors only read it.
        let (response_text, is_schema, successful, schema) = unsafe {
            let p = raw.as_ptr();
            let text = (api.savime_result_response_text)(p);
            let response_text = if text.is_null() {
                String::new()
            } else {
                // Malformed bytes in the reply degrade to replacement
                // characters instead of failing the query.
                CStr::from_ptr(text).to_string_lossy().into_owned()
            };
            let is_schema = (api.savime_result_is_schema)(p);
            let successful = (api.savime_result_successful)(p);

            let len = (api.savime_result_schema_size)(p);
            let mut schema = Vec::with_capacity(len);
            for i in 0..len {
                let name_ptr = (api.savime_result_element_name)(p, i);
                if name_ptr.is_null() {
                    continue;
                }
                let name = CStr::from_ptr(name_ptr).to_string_lossy().into_owned();
                let kind = WireKind::from_raw((api.savime_result_element_type)(p, i));
                let length = ((api.savime_result_element_type_length)(p, i)).max(1) as usize;
                schema.push(DataElement {
                    name,
                    is_dimension: (api.savime_result_element_is_dimension)(p, i),
                    ty: WireType::new(kind, length),
                });
            }
            // The shim reports entries in the handle's map order, which is
            // already name-sorted; keep the invariant explicit.
            schema.sort_by(|a, b| a.name.cmp(&b.name));
            (response_text, is_schema, successful, schema)
        };

        NativeResult {
            api,
            raw: Some(raw),
            response_text,
            is_schema,
            successful,
            schema,
            descriptors: Vec::new(),
        }
    }

    /// Pull the current block's descriptors out of the native handle.
    fn refresh_descriptors(&mut self) {
        let Some(raw) = self.raw else { return };
        debug_assert!(
            self.descriptors.is_empty(),
            "previous block's descriptors were not taken"
        );
        for element in &self.schema {
            let Ok(name) = CString::new(element.name.as_str()) else {
                continue;
            };
            // SAFETY: live handle; the shim hands ownership of each fd to
            // the caller and the trailing clear keeps it from double-closing.
            let fd = unsafe { (self.api.savime_result_descriptor)(raw.as_ptr(), name.as_ptr()) };
            if fd >= 0 {
                // SAFETY: `fd` is open and now exclusively ours.
                self.descriptors
                    .push((element.name.clone(), unsafe { OwnedFd::from_raw_fd(fd) }));
            }
        }
        // SAFETY: live handle.
        unsafe { (self.api.savime_result_clear_descriptors)(raw.as_ptr()) };
    }
}

impl QueryResult for NativeResult {
    fn response_text(&self) -> &str {
        &self.response_text
    }

    fn is_schema(&self) -> bool {
        self.is_schema
    }

    fn successful(&self) -> bool {
        self.successful
    }

    fn schema(&self) -> &[DataElement] {
        &self.schema
    }

    fn take_descriptors(&mut self) -> Vec<(String, OwnedFd)> {
        std::mem::take(&mut self.descriptors)
    }
}

impl Drop for NativeResult {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            // SAFETY: the handle was returned by savime_execute and is
            // disposed exactly once.
            unsafe { (self.api.savime_dispose_query_handle)(raw.as_ptr()) };
        }
    }
}

impl Engine for NativeEngine {
    type Result = NativeResult;

    fn open_connection(&self, port: u16, host: &str) -> TransportHandle {
        let Ok(host) = CString::new(host) else {
            // A host with interior NULs cannot reach the library; report
            // the same invalid handle a failed open would produce.
            return TransportHandle {
                socketfd: -1,
                ..TransportHandle::default()
            };
        };
        // SAFETY: `host` outlives the call.
        let raw = unsafe { (self.api.savime_open_connection)(i32::from(port), host.as_ptr()) };
        to_handle(raw)
    }

    fn close_connection(&self, conn: &mut TransportHandle) {
        let mut raw = to_raw(conn);
        // SAFETY: `raw` is a valid connection struct for the call duration.
        unsafe { (self.api.savime_close_connection)(&mut raw) };
        *conn = to_handle(raw);
    }

    fn execute(&self, conn: &mut TransportHandle, query: &str) -> NativeResult {
        let Ok(query) = CString::new(query) else {
            // Interior NUL: synthesize a failed handle rather than truncate
            // the query text on the wire.
            let mut result = NativeResult::from_raw(self.api, std::ptr::null_mut());
            result.response_text = "Error: query text contains an interior NUL byte".to_string();
            return result;
        };
        let mut raw = to_raw(conn);
        // SAFETY: both pointers outlive the call.
        let ptr = unsafe { (self.api.savime_execute)(&mut raw, query.as_ptr()) };
        *conn = to_handle(raw);
        NativeResult::from_raw(self.api, ptr)
    }

    fn read_query_block(
        &self,
        conn: &mut TransportHandle,
        result: &mut NativeResult,
    ) -> BlockStatus {
        let Some(handle) = result.raw else {
            return BlockStatus::ErrorReadingBlocks;
        };
        let mut raw = to_raw(conn);
        // SAFETY: live connection struct and result handle.
        let status =
            unsafe { (self.api.savime_read_query_block)(&mut raw, handle.as_ptr()) };
        *conn = to_handle(raw);
        let status = BlockStatus::from_raw(status);
        if status == BlockStatus::BlocksLeft {
            result.refresh_descriptors();
        }
        status
    }

    fn shutdown(&self, conn: &mut TransportHandle) {
        let mut raw = to_raw(conn);
        // SAFETY: valid connection struct; the library closes the
        // transport as part of the shutdown.
        unsafe { (self.api.savime_shutdown)(&mut raw) };
        *conn = to_handle(raw);
    }
}
