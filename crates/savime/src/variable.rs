//! Typed result arrays and per-block collections.
//!
//! Arrays handed to the caller are immutable views: their backing storage
//! is either a read-only shared mapping (per-block results) or an owned
//! aligned buffer (concatenated results). No mutable accessor exists.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::import::MappedBuffer;
use crate::types::{size_of, Scalar, WireKind};

/// Owned column bytes, 8-byte aligned so typed views hold for every kind.
pub(crate) struct AlignedBytes {
    words: Box<[u64]>,
    len: usize,
}

impl AlignedBytes {
    pub(crate) fn copy_from(bytes: &[u8]) -> AlignedBytes {
        let words = vec![0u64; bytes.len().div_ceil(8)].into_boxed_slice();
        let mut out = AlignedBytes {
            words,
            len: bytes.len(),
        };
        out.bytes_mut()[..bytes.len()].copy_from_slice(bytes);
        out
    }

    fn as_bytes(&self) -> &[u8] {
        // SAFETY: u64 words reinterpret as initialized bytes; `len` never
        // exceeds `words.len() * 8`.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast::<u8>(), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and the buffer is exclusively borrowed.
        unsafe {
            std::slice::from_raw_parts_mut(self.words.as_mut_ptr().cast::<u8>(), self.words.len() * 8)
        }
    }
}

/// Storage behind a [`TypedArray`].
pub(crate) enum Backing {
    /// Read-only shared mapping of the element's payload descriptor.
    Mapped(Arc<MappedBuffer>),
    /// Owned copy produced by concatenation.
    Owned(Arc<AlignedBytes>),
}

impl Backing {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Backing::Mapped(buf) => buf.as_bytes(),
            Backing::Owned(bytes) => bytes.as_bytes(),
        }
    }
}

/// An immutable, shaped, typed view over one element's payload.
///
/// Shape is `(rows, width)` where `width` is the element's fixed per-cell
/// vector length. Only `size_of(kind, rows, width)` bytes of the backing
/// storage are ever interpreted, even when more was mapped.
pub struct TypedArray {
    backing: Backing,
    kind: WireKind,
    rows: usize,
    width: usize,
}

impl TypedArray {
    pub(crate) fn new(backing: Backing, kind: WireKind, rows: usize, width: usize) -> TypedArray {
        debug_assert!(kind.is_valid());
        debug_assert!(size_of(kind, rows, width) <= backing.as_bytes().len());
        TypedArray {
            backing,
            kind,
            rows,
            width,
        }
    }

    pub fn kind(&self) -> WireKind {
        self.kind
    }

    /// `(rows, width)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.width)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Bytes actually covered by the view.
    pub fn byte_len(&self) -> usize {
        size_of(self.kind, self.rows, self.width)
    }

    /// Raw view bytes, truncated to the reconciled row count.
    pub fn as_bytes(&self) -> &[u8] {
        &self.backing.as_bytes()[..self.byte_len()]
    }

    /// Reinterpret the payload as a slice of `T`, row-major.
    ///
    /// Returns `None` unless `T` is exactly the array's wire kind.
    pub fn as_slice<T: Scalar>(&self) -> Option<&[T]> {
        if T::KIND != self.kind {
            return None;
        }
        // SAFETY: kind equality fixes T's size to the cell component width,
        // the view length was validated at construction, and both backings
        // are at least component-aligned (mappings are page-aligned, owned
        // buffers 8-byte aligned).
        Some(unsafe { typed_slice::<T>(self.as_bytes(), self.rows * self.width) })
    }

    /// One component, by row and column. `None` for out-of-range indices or
    /// a kind mismatch.
    pub fn get<T: Scalar>(&self, row: usize, col: usize) -> Option<T> {
        if col >= self.width {
            return None;
        }
        self.as_slice::<T>()?.get(row * self.width + col).copied()
    }
}

impl std::fmt::Debug for TypedArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedArray")
            .field("kind", &self.kind)
            .field("rows", &self.rows)
            .field("width", &self.width)
            .finish()
    }
}

/// The single reviewed reinterpretation point for payload bytes.
///
/// # Safety
///
/// `bytes` must hold at least `count * size_of::<T>()` bytes, start at an
/// address aligned for `T`, and contain initialized data valid at any bit
/// pattern for `T` (true for all wire scalar types).
unsafe fn typed_slice<T: Scalar>(bytes: &[u8], count: usize) -> &[T] {
    debug_assert!(count * std::mem::size_of::<T>() <= bytes.len());
    debug_assert_eq!(bytes.as_ptr().align_offset(std::mem::align_of::<T>()), 0);
    unsafe { std::slice::from_raw_parts(bytes.as_ptr().cast::<T>(), count) }
}

/// Decoded payload of one element in one block.
#[derive(Debug)]
pub enum ColumnData {
    Numeric(TypedArray),
    /// Fixed-width char cells decoded to strings, shape `(rows, 1)`.
    Text(Vec<String>),
}

impl ColumnData {
    pub fn rows(&self) -> usize {
        match self {
            ColumnData::Numeric(a) => a.rows(),
            ColumnData::Text(v) => v.len(),
        }
    }

    /// `(rows, width)`; text columns are always single-width.
    pub fn shape(&self) -> (usize, usize) {
        match self {
            ColumnData::Numeric(a) => a.shape(),
            ColumnData::Text(v) => (v.len(), 1),
        }
    }

    pub fn as_numeric(&self) -> Option<&TypedArray> {
        match self {
            ColumnData::Numeric(a) => Some(a),
            ColumnData::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&[String]> {
        match self {
            ColumnData::Numeric(_) => None,
            ColumnData::Text(v) => Some(v),
        }
    }
}

/// One named array of a result block.
///
/// `data` is `None` when the element's wire kind was invalid and no view
/// could be built; the element still occupies its schema slot.
#[derive(Debug)]
pub struct DataVariable {
    pub name: String,
    pub data: Option<ColumnData>,
    pub is_dimension: bool,
}

impl DataVariable {
    pub fn rows(&self) -> Option<usize> {
        self.data.as_ref().map(ColumnData::rows)
    }

    pub fn shape(&self) -> Option<(usize, usize)> {
        self.data.as_ref().map(ColumnData::shape)
    }
}

/// One protocol block: an ordered set of data variables, split into
/// dimensions and attributes, all at one uniform row count.
#[derive(Debug)]
pub struct DataVariableBlock {
    dims: Vec<DataVariable>,
    attrs: Vec<DataVariable>,
}

impl DataVariableBlock {
    /// Build a block from variables in schema order.
    ///
    /// Validates that names are unique, dimension arrays are single-width,
    /// and every populated variable has the same row count.
    pub fn from_variables(variables: Vec<DataVariable>) -> Result<DataVariableBlock> {
        let mut rows: Option<usize> = None;
        for var in &variables {
            if variables.iter().filter(|v| v.name == var.name).count() > 1 {
                return Err(Error::IncompatibleBlock(format!(
                    "duplicate variable name '{}'",
                    var.name
                )));
            }
            let Some(data) = &var.data else { continue };
            if var.is_dimension && data.shape().1 != 1 {
                return Err(Error::IncompatibleBlock(format!(
                    "dimension '{}' must be single-width, got width {}",
                    var.name,
                    data.shape().1
                )));
            }
            match rows {
                None => rows = Some(data.rows()),
                Some(n) if n != data.rows() => {
                    return Err(Error::IncompatibleBlock(format!(
                        "variable '{}' has {} rows, expected {}",
                        var.name,
                        data.rows(),
                        n
                    )));
                }
                Some(_) => {}
            }
        }

        let (dims, attrs): (Vec<_>, Vec<_>) =
            variables.into_iter().partition(|v| v.is_dimension);
        Ok(DataVariableBlock { dims, attrs })
    }

    /// Dimension variables, in schema order.
    pub fn dims(&self) -> &[DataVariable] {
        &self.dims
    }

    /// Attribute variables, in schema order.
    pub fn attrs(&self) -> &[DataVariable] {
        &self.attrs
    }

    /// All variables, dimensions first.
    pub fn variables(&self) -> impl Iterator<Item = &DataVariable> {
        self.dims.iter().chain(self.attrs.iter())
    }

    pub fn get(&self, name: &str) -> Option<&DataVariable> {
        self.variables().find(|v| v.name == name)
    }

    /// Uniform row count of the block's populated variables.
    pub fn num_rows(&self) -> usize {
        self.variables()
            .find_map(DataVariable::rows)
            .unwrap_or(0)
    }

    /// Concatenate blocks row-wise, in order.
    ///
    /// Blocks must agree on variable names, order, dimension flags, kinds
    /// and widths. Concatenated columns are owned copies; the inputs keep
    /// their zero-copy backings.
    pub fn concat(blocks: &[DataVariableBlock]) -> Result<DataVariableBlock> {
        let Some(first) = blocks.first() else {
            return Err(Error::IncompatibleBlock(
                "cannot concatenate an empty sequence of blocks".into(),
            ));
        };

        let layout: Vec<(&str, bool)> = first
            .variables()
            .map(|v| (v.name.as_str(), v.is_dimension))
            .collect();
        for block in &blocks[1..] {
            let other: Vec<(&str, bool)> = block
                .variables()
                .map(|v| (v.name.as_str(), v.is_dimension))
                .collect();
            if other != layout {
                return Err(Error::IncompatibleBlock(
                    "blocks disagree on variable names or order".into(),
                ));
            }
        }

        let mut merged = Vec::with_capacity(layout.len());
        for (name, is_dimension) in &layout {
            let columns: Vec<&DataVariable> = blocks
                .iter()
                .map(|b| b.get(name).expect("layout checked above"))
                .collect();
            merged.push(DataVariable {
                name: (*name).to_string(),
                data: Some(concat_columns(name, &columns)?),
                is_dimension: *is_dimension,
            });
        }
        DataVariableBlock::from_variables(merged)
    }
}

fn concat_columns(name: &str, columns: &[&DataVariable]) -> Result<ColumnData> {
    let mut numeric: Option<(WireKind, usize)> = None;
    let mut textual = false;
    for var in columns {
        match &var.data {
            None => {
                return Err(Error::IncompatibleBlock(format!(
                    "variable '{name}' has no data in one of the blocks"
                )));
            }
            Some(ColumnData::Text(_)) => textual = true,
            Some(ColumnData::Numeric(a)) => match numeric {
                None => numeric = Some((a.kind(), a.width())),
                Some((kind, width)) if kind != a.kind() || width != a.width() => {
                    return Err(Error::IncompatibleBlock(format!(
                        "variable '{name}' changes type or width across blocks"
                    )));
                }
                Some(_) => {}
            },
        }
    }
    if textual && numeric.is_some() {
        return Err(Error::IncompatibleBlock(format!(
            "variable '{name}' mixes text and numeric data across blocks"
        )));
    }

    if textual {
        let mut values = Vec::new();
        for var in columns {
            values.extend_from_slice(var.data.as_ref().and_then(ColumnData::as_text).unwrap_or(&[]));
        }
        return Ok(ColumnData::Text(values));
    }

    let (kind, width) = numeric.expect("column is numeric when not textual");
    let mut bytes = Vec::new();
    let mut rows = 0usize;
    for var in columns {
        let array = var
            .data
            .as_ref()
            .and_then(ColumnData::as_numeric)
            .expect("mixed columns rejected above");
        bytes.extend_from_slice(array.as_bytes());
        rows += array.rows();
    }
    Ok(ColumnData::Numeric(TypedArray::new(
        Backing::Owned(Arc::new(AlignedBytes::copy_from(&bytes))),
        kind,
        rows,
        width,
    )))
}
