//! Zero-copy import of one result block.
//!
//! Each schema element's payload arrives as a file descriptor whose length
//! is discovered by inspecting the file, not supplied by the protocol. The
//! importer maps every payload read-only and shared, reconciles the
//! per-element row counts to their minimum, and builds typed shaped views
//! that consume only the reconciled prefix. Ownership of each mapping
//! moves into the returned array; the descriptors themselves are owned by
//! the caller and close when dropped.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::sync::Arc;

use tracing::debug;

use crate::engine::DataElement;
use crate::error::{Error, Result};
use crate::types::{size_of, WireKind};
use crate::variable::{Backing, ColumnData, DataVariable, DataVariableBlock, TypedArray};

/// Read-only shared mapping of one payload descriptor.
///
/// The mapping outlives the descriptor: closing the fd does not tear down
/// established pages, so arrays stay valid after the block's descriptors
/// are released. Unmapped on drop.
pub struct MappedBuffer {
    ptr: *mut libc::c_void,
    len: usize,
}

// The mapping is PROT_READ and never remapped, so shared references are
// fine from any thread.
unsafe impl Send for MappedBuffer {}
unsafe impl Sync for MappedBuffer {}

impl MappedBuffer {
    /// Map `len` bytes of `fd` read-only and shared. Zero-length payloads
    /// skip the syscall entirely (mmap rejects empty ranges).
    pub fn map(fd: BorrowedFd<'_>, len: usize) -> io::Result<MappedBuffer> {
        if len == 0 {
            return Ok(MappedBuffer {
                ptr: std::ptr::null_mut(),
                len: 0,
            });
        }
        // SAFETY: requesting a fresh read-only shared mapping; the kernel
        // picks the address. The fd is live for the duration of the call.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        Ok(MappedBuffer { ptr, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        if self.len == 0 {
            return &[];
        }
        // SAFETY: the mapping covers `len` readable bytes for the lifetime
        // of `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.cast::<u8>(), self.len) }
    }
}

impl Drop for MappedBuffer {
    fn drop(&mut self) {
        if !self.ptr.is_null() && self.len > 0 {
            // SAFETY: `ptr`/`len` came from a successful mmap and are
            // unmapped exactly once.
            unsafe {
                libc::munmap(self.ptr, self.len);
            }
        }
    }
}

/// Byte length of the file behind `fd`.
fn payload_len(element: &str, fd: BorrowedFd<'_>) -> Result<usize> {
    // SAFETY: zeroed stat is a valid out-param; fstat only writes it.
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::fstat(fd.as_raw_fd(), &mut st) };
    if rc != 0 {
        return Err(Error::BufferImportFailed {
            element: element.to_string(),
            source: io::Error::last_os_error(),
        });
    }
    Ok(st.st_size as usize)
}

struct StagedElement<'a> {
    element: &'a DataElement,
    fd: &'a OwnedFd,
    byte_len: usize,
    /// Row count implied by the payload length; `None` for invalid kinds,
    /// which take no part in reconciliation.
    rows: Option<usize>,
}

/// Import one block's descriptors into a [`DataVariableBlock`].
///
/// Per-element failures abort only this block: the caller drops it, closes
/// the descriptors and keeps driving the protocol loop.
pub(crate) fn import_block(
    schema: &[DataElement],
    descriptors: &[(String, OwnedFd)],
) -> Result<DataVariableBlock> {
    let mut staged = Vec::with_capacity(schema.len());
    for element in schema {
        let fd = descriptors
            .iter()
            .find(|(name, _)| *name == element.name)
            .map(|(_, fd)| fd)
            .ok_or_else(|| Error::BufferImportFailed {
                element: element.name.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no descriptor for element"),
            })?;
        let byte_len = payload_len(&element.name, fd.as_fd())?;
        let rows = match element.ty.kind {
            WireKind::Invalid => None,
            kind => Some(byte_len / size_of(kind, 1, element.ty.length)),
        };
        staged.push(StagedElement {
            element,
            fd,
            byte_len,
            rows,
        });
    }

    // The usable row count is the minimum across valid elements; a zero-row
    // element forces the whole block to zero rows.
    let min_rows = staged
        .iter()
        .filter_map(|s| s.rows)
        .min()
        .unwrap_or(0);
    debug!(
        elements = staged.len(),
        rows = min_rows,
        "importing result block"
    );

    let mut variables = Vec::with_capacity(staged.len());
    for s in &staged {
        let data = match s.element.ty.kind {
            WireKind::Invalid => None,
            kind => {
                let buf =
                    MappedBuffer::map(s.fd.as_fd(), s.byte_len).map_err(|e| Error::MMapFailed {
                        element: s.element.name.clone(),
                        source: e,
                    })?;
                Some(build_column(kind, s.element.ty.length, min_rows, buf))
            }
        };
        variables.push(DataVariable {
            name: s.element.name.clone(),
            data,
            is_dimension: s.element.is_dimension,
        });
    }

    DataVariableBlock::from_variables(variables)
}

/// Shape one mapped payload into a column, consuming only the reconciled
/// prefix.
fn build_column(kind: WireKind, length: usize, rows: usize, buf: MappedBuffer) -> ColumnData {
    if kind == WireKind::Char {
        // Each length-byte row is one fixed-width text cell.
        let bytes = &buf.as_bytes()[..size_of(kind, rows, length)];
        let values = bytes
            .chunks_exact(length)
            .map(decode_text_cell)
            .collect();
        return ColumnData::Text(values);
    }
    ColumnData::Numeric(TypedArray::new(
        Backing::Mapped(Arc::new(buf)),
        kind,
        rows,
        length,
    ))
}

/// Decode one fixed-width char cell: trailing NUL padding is stripped and
/// malformed bytes are replaced rather than surfaced as errors.
fn decode_text_cell(cell: &[u8]) -> String {
    let trimmed = match cell.iter().rposition(|&b| b != 0) {
        Some(last) => &cell[..=last],
        None => &[],
    };
    String::from_utf8_lossy(trimmed).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::fd::OwnedFd;

    use crate::types::WireType;

    fn payload_fd(bytes: &[u8]) -> OwnedFd {
        let mut f = tempfile::tempfile().unwrap();
        f.write_all(bytes).unwrap();
        f.flush().unwrap();
        OwnedFd::from(f)
    }

    fn element(name: &str, kind: WireKind, length: usize, is_dimension: bool) -> DataElement {
        DataElement {
            name: name.to_string(),
            is_dimension,
            ty: WireType::new(kind, length),
        }
    }

    #[test]
    fn maps_and_reads_payload() {
        let fd = payload_fd(&[1, 2, 3, 4]);
        let buf = MappedBuffer::map(fd.as_fd(), 4).unwrap();
        assert_eq!(buf.as_bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn empty_payload_maps_to_empty_buffer() {
        let fd = payload_fd(&[]);
        let buf = MappedBuffer::map(fd.as_fd(), 0).unwrap();
        assert!(buf.is_empty());
        assert_eq!(buf.as_bytes(), &[] as &[u8]);
    }

    #[test]
    fn stat_failure_is_buffer_import_error() {
        let fd = payload_fd(&[0; 4]);
        let raw = fd.as_raw_fd();
        drop(fd);
        // SAFETY: probing a deliberately closed fd.
        let dangling = unsafe { BorrowedFd::borrow_raw(raw) };
        let err = payload_len("attr", dangling).unwrap_err();
        assert!(matches!(err, Error::BufferImportFailed { .. }));
    }

    #[test]
    fn rows_reconcile_to_minimum() {
        let schema = vec![
            element("long", WireKind::Int32, 1, false),
            element("short", WireKind::Int32, 1, false),
        ];
        let long_bytes: Vec<u8> = (0i32..10).flat_map(|v| v.to_ne_bytes()).collect();
        let short_bytes: Vec<u8> = (0i32..7).flat_map(|v| v.to_ne_bytes()).collect();
        let descriptors = vec![
            ("long".to_string(), payload_fd(&long_bytes)),
            ("short".to_string(), payload_fd(&short_bytes)),
        ];

        let block = import_block(&schema, &descriptors).unwrap();
        assert_eq!(block.num_rows(), 7);
        let long = block.get("long").unwrap().data.as_ref().unwrap();
        assert_eq!(long.shape(), (7, 1));
        assert_eq!(
            long.as_numeric().unwrap().as_slice::<i32>(),
            Some(&[0, 1, 2, 3, 4, 5, 6][..])
        );
    }

    #[test]
    fn char_cells_decode_to_text() {
        let schema = vec![element("tag", WireKind::Char, 5, false)];
        let descriptors = vec![(
            "tag".to_string(),
            payload_fd(b"ab\0\0\0cdefghi\0\0\0"),
        )];
        let block = import_block(&schema, &descriptors).unwrap();
        let tag = block.get("tag").unwrap().data.as_ref().unwrap();
        assert_eq!(tag.shape(), (3, 1));
        assert_eq!(
            tag.as_text().unwrap(),
            &["ab".to_string(), "cdefg".to_string(), "hi".to_string()]
        );
    }

    #[test]
    fn invalid_kind_yields_null_column() {
        let schema = vec![
            element("ok", WireKind::Int64, 1, false),
            element("bad", WireKind::Invalid, 1, false),
        ];
        let ok_bytes: Vec<u8> = (0i64..4).flat_map(|v| v.to_ne_bytes()).collect();
        let descriptors = vec![
            ("ok".to_string(), payload_fd(&ok_bytes)),
            ("bad".to_string(), payload_fd(&[0xff; 64])),
        ];
        let block = import_block(&schema, &descriptors).unwrap();
        // The invalid element is excluded from reconciliation and carries
        // no data.
        assert_eq!(block.num_rows(), 4);
        assert!(block.get("bad").unwrap().data.is_none());
    }

    #[test]
    fn zero_row_element_forces_empty_block() {
        let schema = vec![
            element("a", WireKind::Int32, 1, false),
            element("b", WireKind::Int32, 1, false),
        ];
        let a_bytes: Vec<u8> = (0i32..5).flat_map(|v| v.to_ne_bytes()).collect();
        let descriptors = vec![
            ("a".to_string(), payload_fd(&a_bytes)),
            ("b".to_string(), payload_fd(&[])),
        ];
        let block = import_block(&schema, &descriptors).unwrap();
        assert_eq!(block.num_rows(), 0);
        let a = block.get("a").unwrap().data.as_ref().unwrap();
        assert_eq!(a.shape(), (0, 1));
    }

    #[test]
    fn missing_descriptor_is_buffer_import_error() {
        let schema = vec![element("a", WireKind::Int32, 1, false)];
        let err = import_block(&schema, &[]).unwrap_err();
        assert!(matches!(err, Error::BufferImportFailed { .. }));
    }

    #[test]
    fn partial_trailing_cell_is_ignored() {
        // 10 bytes of int32: two full cells plus two stray bytes.
        let schema = vec![element("a", WireKind::Int32, 1, false)];
        let descriptors = vec![("a".to_string(), payload_fd(&[0; 10]))];
        let block = import_block(&schema, &descriptors).unwrap();
        assert_eq!(block.num_rows(), 2);
    }

    #[test]
    fn array_outlives_descriptor() {
        let schema = vec![element("a", WireKind::Int32, 1, false)];
        let bytes: Vec<u8> = (7i32..10).flat_map(|v| v.to_ne_bytes()).collect();
        let descriptors = vec![("a".to_string(), payload_fd(&bytes))];
        let block = import_block(&schema, &descriptors).unwrap();
        drop(descriptors);
        let a = block.get("a").unwrap().data.as_ref().unwrap();
        assert_eq!(a.as_numeric().unwrap().as_slice::<i32>(), Some(&[7, 8, 9][..]));
    }
}
