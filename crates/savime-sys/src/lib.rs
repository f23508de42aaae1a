//! Raw ABI bindings to the SAVIME client library.
//!
//! Hand-written from `savime_lib.h`. The upstream header is C++, so these
//! bindings target the flat `savime_*` C shim the client library exports:
//! the connection struct is plain data and crosses the boundary by value,
//! while the query-result handle is opaque and read through accessor
//! functions.
//!
//! The library is loaded at runtime with `libloading` rather than linked at
//! build time, so downstream crates build and test without a SAVIME
//! install. See [`api()`] for the lookup order.

#![allow(non_camel_case_types)]

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use libloading::Library;

mod api;

pub use api::Api;

use std::os::raw::c_int;

// ===== Wire status codes (savime_lib.h) =====
//
// SAV_FAILURE aliases SAV_NO_MORE_BLOCKS and SAV_SUCCESS aliases
// SAV_BLOCKS_LEFT; `read_query_block` reuses the generic codes.

pub const SAV_FAILURE: c_int = 0;
pub const SAV_SUCCESS: c_int = 1;
pub const SAV_NO_MORE_BLOCKS: c_int = 0;
pub const SAV_BLOCKS_LEFT: c_int = 1;
pub const SAV_ERROR_READING_BLOCKS: c_int = -1;
pub const SAV_ERROR_RESPONSE_BLOCKS: c_int = -2;

// ===== Wire type tags (SavimeEnumType) =====

pub const SAV_CHAR: c_int = 0;
pub const SAV_INT8: c_int = 1;
pub const SAV_INT16: c_int = 2;
pub const SAV_INT32: c_int = 3;
pub const SAV_INT64: c_int = 4;
pub const SAV_UINT8: c_int = 5;
pub const SAV_UINT16: c_int = 6;
pub const SAV_UINT32: c_int = 7;
pub const SAV_UINT64: c_int = 8;
pub const SAV_FLOAT: c_int = 9;
pub const SAV_DOUBLE: c_int = 10;
pub const SAV_INVALID_TYPE: c_int = 11;

/// Connection state (`SavimeConn`). Plain data; one owner at a time.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct savime_conn_t {
    /// Socket file descriptor, `-1` when invalid.
    pub socketfd: c_int,
    pub clientid: c_int,
    pub queryid: c_int,
    /// Message counter for message numbering.
    pub message_count: c_int,
    pub opened: bool,
}

/// Opaque query-result handle (`QueryResultHandle`).
///
/// Read through the `savime_result_*` accessors; released exactly once
/// with `savime_dispose_query_handle`.
#[repr(C)]
pub struct savime_result_t {
    _private: [u8; 0],
}

/// Full path override for the client library.
pub const CLIENT_LIB_ENV: &str = "SAVIME_CLIENT_LIB";
/// Directory containing the client library (the install layout the
/// upstream build uses).
pub const LIB_DIR_ENV: &str = "SAVIME_LIB";
/// Soname used when no override is present.
pub const DEFAULT_LIB_NAME: &str = "libsavime.so";

/// Failure to load the client library or resolve its symbols.
#[derive(Debug, Clone)]
pub struct LoadError {
    pub message: String,
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for LoadError {}

struct Runtime {
    // Keeps the library mapped for the lifetime of the process.
    _lib: Library,
    api: Api,
}

// Function pointers resolved from the library stay valid while `_lib` is
// alive, which is the whole process lifetime.
unsafe impl Send for Runtime {}
unsafe impl Sync for Runtime {}

static RUNTIME: OnceLock<Result<Runtime, LoadError>> = OnceLock::new();

fn lib_path() -> PathBuf {
    if let Ok(p) = env::var(CLIENT_LIB_ENV) {
        return PathBuf::from(p);
    }
    if let Ok(d) = env::var(LIB_DIR_ENV) {
        return PathBuf::from(d).join(DEFAULT_LIB_NAME);
    }
    PathBuf::from(DEFAULT_LIB_NAME)
}

fn load_runtime() -> Result<Runtime, LoadError> {
    let path = lib_path();
    // SAFETY: loading a dynamic library runs its initializers; the path is
    // expected to name a SAVIME client library exporting the `savime_*`
    // ABI resolved by `Api::load`.
    let lib = unsafe { Library::new(&path) }.map_err(|e| LoadError {
        message: format!("failed to load SAVIME client library '{}': {e}", path.display()),
    })?;
    let api = unsafe { Api::load(&lib) }.map_err(|e| LoadError {
        message: format!(
            "failed to resolve SAVIME ABI symbols from '{}': {e}",
            path.display()
        ),
    })?;
    Ok(Runtime { _lib: lib, api })
}

/// Process-wide resolved ABI, loaded lazily on first use.
///
/// A failed load is cached and returned to every subsequent caller.
pub fn api() -> Result<&'static Api, LoadError> {
    match RUNTIME.get_or_init(load_runtime) {
        Ok(rt) => Ok(&rt.api),
        Err(e) => Err(e.clone()),
    }
}
