//! Resolved `savime_*` ABI entry points.

use std::os::raw::{c_char, c_int};

use libloading::{Library, Symbol};

use crate::{savime_conn_t, savime_result_t};

/// Function-pointer table for the flat SAVIME client ABI.
///
/// Descriptor ownership contract: `savime_result_descriptor` hands out the
/// raw fd for one schema element of the *current* block; after the caller
/// has taken every fd it wants, `savime_result_clear_descriptors` empties
/// the handle's map without closing anything, leaving the caller as the
/// sole owner of the taken descriptors.
pub struct Api {
    pub savime_open_connection: unsafe extern "C" fn(c_int, *const c_char) -> savime_conn_t,
    pub savime_close_connection: unsafe extern "C" fn(*mut savime_conn_t),
    pub savime_execute:
        unsafe extern "C" fn(*mut savime_conn_t, *const c_char) -> *mut savime_result_t,
    pub savime_read_query_block:
        unsafe extern "C" fn(*mut savime_conn_t, *mut savime_result_t) -> c_int,
    pub savime_dispose_query_handle: unsafe extern "C" fn(*mut savime_result_t),
    pub savime_shutdown: unsafe extern "C" fn(*mut savime_conn_t),

    pub savime_result_response_text:
        unsafe extern "C" fn(*const savime_result_t) -> *const c_char,
    pub savime_result_is_schema: unsafe extern "C" fn(*const savime_result_t) -> bool,
    pub savime_result_successful: unsafe extern "C" fn(*const savime_result_t) -> bool,
    pub savime_result_schema_size: unsafe extern "C" fn(*const savime_result_t) -> usize,
    pub savime_result_element_name:
        unsafe extern "C" fn(*const savime_result_t, usize) -> *const c_char,
    pub savime_result_element_is_dimension:
        unsafe extern "C" fn(*const savime_result_t, usize) -> bool,
    pub savime_result_element_type:
        unsafe extern "C" fn(*const savime_result_t, usize) -> c_int,
    pub savime_result_element_type_length:
        unsafe extern "C" fn(*const savime_result_t, usize) -> c_int,
    pub savime_result_descriptor:
        unsafe extern "C" fn(*mut savime_result_t, *const c_char) -> c_int,
    pub savime_result_clear_descriptors: unsafe extern "C" fn(*mut savime_result_t),
}

impl Api {
    /// Resolve every ABI symbol from `lib`.
    ///
    /// # Safety
    ///
    /// The library must export the `savime_*` symbols with the exact
    /// signatures declared above; a mismatch is undefined behavior at the
    /// first call through the table.
    pub unsafe fn load(lib: &Library) -> Result<Self, libloading::Error> {
        unsafe fn get<T: Copy>(lib: &Library, name: &'static [u8]) -> Result<T, libloading::Error> {
            let sym: Symbol<'_, T> = unsafe { lib.get::<T>(name) }?;
            Ok(*sym)
        }
        unsafe {
            Ok(Self {
                savime_open_connection: get(lib, b"savime_open_connection\0")?,
                savime_close_connection: get(lib, b"savime_close_connection\0")?,
                savime_execute: get(lib, b"savime_execute\0")?,
                savime_read_query_block: get(lib, b"savime_read_query_block\0")?,
                savime_dispose_query_handle: get(lib, b"savime_dispose_query_handle\0")?,
                savime_shutdown: get(lib, b"savime_shutdown\0")?,
                savime_result_response_text: get(lib, b"savime_result_response_text\0")?,
                savime_result_is_schema: get(lib, b"savime_result_is_schema\0")?,
                savime_result_successful: get(lib, b"savime_result_successful\0")?,
                savime_result_schema_size: get(lib, b"savime_result_schema_size\0")?,
                savime_result_element_name: get(lib, b"savime_result_element_name\0")?,
                savime_result_element_is_dimension: get(
                    lib,
                    b"savime_result_element_is_dimension\0",
                )?,
                savime_result_element_type: get(lib, b"savime_result_element_type\0")?,
                savime_result_element_type_length: get(
                    lib,
                    b"savime_result_element_type_length\0",
                )?,
                savime_result_descriptor: get(lib, b"savime_result_descriptor\0")?,
                savime_result_clear_descriptors: get(lib, b"savime_result_clear_descriptors\0")?,
            })
        }
    }
}
