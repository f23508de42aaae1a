//! Wire ↔ host type mapping for SAVIME data elements.
//!
//! The table is static and immutable: primitive wire kinds map to a byte
//! width, a query-language name, and a host scalar type, with inverse
//! lookups returning the [`WireKind::Invalid`] sentinel instead of failing.

use std::fmt;

/// Primitive type tag of the SAVIME wire type system.
///
/// Raw tags outside the known range decode to [`WireKind::Invalid`], the
/// not-found sentinel used throughout the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireKind {
    Char,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float,
    Double,
    Invalid,
}

impl WireKind {
    /// Every valid kind, in wire-tag order.
    pub const ALL: [WireKind; 11] = [
        WireKind::Char,
        WireKind::Int8,
        WireKind::Int16,
        WireKind::Int32,
        WireKind::Int64,
        WireKind::Uint8,
        WireKind::Uint16,
        WireKind::Uint32,
        WireKind::Uint64,
        WireKind::Float,
        WireKind::Double,
    ];

    /// Decode a raw wire tag.
    pub fn from_raw(tag: i32) -> WireKind {
        match tag {
            savime_sys::SAV_CHAR => WireKind::Char,
            savime_sys::SAV_INT8 => WireKind::Int8,
            savime_sys::SAV_INT16 => WireKind::Int16,
            savime_sys::SAV_INT32 => WireKind::Int32,
            savime_sys::SAV_INT64 => WireKind::Int64,
            savime_sys::SAV_UINT8 => WireKind::Uint8,
            savime_sys::SAV_UINT16 => WireKind::Uint16,
            savime_sys::SAV_UINT32 => WireKind::Uint32,
            savime_sys::SAV_UINT64 => WireKind::Uint64,
            savime_sys::SAV_FLOAT => WireKind::Float,
            savime_sys::SAV_DOUBLE => WireKind::Double,
            _ => WireKind::Invalid,
        }
    }

    pub fn to_raw(self) -> i32 {
        match self {
            WireKind::Char => savime_sys::SAV_CHAR,
            WireKind::Int8 => savime_sys::SAV_INT8,
            WireKind::Int16 => savime_sys::SAV_INT16,
            WireKind::Int32 => savime_sys::SAV_INT32,
            WireKind::Int64 => savime_sys::SAV_INT64,
            WireKind::Uint8 => savime_sys::SAV_UINT8,
            WireKind::Uint16 => savime_sys::SAV_UINT16,
            WireKind::Uint32 => savime_sys::SAV_UINT32,
            WireKind::Uint64 => savime_sys::SAV_UINT64,
            WireKind::Float => savime_sys::SAV_FLOAT,
            WireKind::Double => savime_sys::SAV_DOUBLE,
            WireKind::Invalid => savime_sys::SAV_INVALID_TYPE,
        }
    }

    pub fn is_valid(self) -> bool {
        self != WireKind::Invalid
    }

    /// Byte width of one cell component. Zero for the invalid sentinel.
    pub fn byte_width(self) -> usize {
        match self {
            WireKind::Char | WireKind::Int8 | WireKind::Uint8 => 1,
            WireKind::Int16 | WireKind::Uint16 => 2,
            WireKind::Int32 | WireKind::Uint32 | WireKind::Float => 4,
            WireKind::Int64 | WireKind::Uint64 | WireKind::Double => 8,
            WireKind::Invalid => 0,
        }
    }

    /// Query-language name of the kind, as written in DDL text.
    pub fn query_name(self) -> Option<&'static str> {
        match self {
            WireKind::Char => Some("char"),
            WireKind::Int8 => Some("int8"),
            WireKind::Int16 => Some("int16"),
            WireKind::Int32 => Some("int32"),
            WireKind::Int64 => Some("int64"),
            WireKind::Uint8 => Some("uint8"),
            WireKind::Uint16 => Some("uint16"),
            WireKind::Uint32 => Some("uint32"),
            WireKind::Uint64 => Some("uint64"),
            WireKind::Float => Some("float"),
            WireKind::Double => Some("double"),
            WireKind::Invalid => None,
        }
    }

    /// Inverse of [`query_name`](Self::query_name); unknown names decode to
    /// the sentinel.
    pub fn from_query_name(name: &str) -> WireKind {
        match name {
            "char" => WireKind::Char,
            "int8" => WireKind::Int8,
            "int16" => WireKind::Int16,
            "int32" => WireKind::Int32,
            "int64" => WireKind::Int64,
            "uint8" => WireKind::Uint8,
            "uint16" => WireKind::Uint16,
            "uint32" => WireKind::Uint32,
            "uint64" => WireKind::Uint64,
            "float" => WireKind::Float,
            "double" => WireKind::Double,
            _ => WireKind::Invalid,
        }
    }

    /// Host-side element type produced for this kind. The character kind
    /// decodes to text columns, not raw bytes.
    pub fn host_type(self) -> Option<HostType> {
        match self {
            WireKind::Char => Some(HostType::Str),
            WireKind::Int8 => Some(HostType::I8),
            WireKind::Int16 => Some(HostType::I16),
            WireKind::Int32 => Some(HostType::I32),
            WireKind::Int64 => Some(HostType::I64),
            WireKind::Uint8 => Some(HostType::U8),
            WireKind::Uint16 => Some(HostType::U16),
            WireKind::Uint32 => Some(HostType::U32),
            WireKind::Uint64 => Some(HostType::U64),
            WireKind::Float => Some(HostType::F32),
            WireKind::Double => Some(HostType::F64),
            WireKind::Invalid => None,
        }
    }
}

impl fmt::Display for WireKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.query_name().unwrap_or("invalid"))
    }
}

/// Wire type of one data element: a primitive kind plus a fixed per-cell
/// vector width (`length >= 1`, e.g. fixed-length strings or
/// multi-component values).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireType {
    pub kind: WireKind,
    pub length: usize,
}

impl WireType {
    pub fn new(kind: WireKind, length: usize) -> WireType {
        debug_assert!(length >= 1, "wire type length must be at least 1");
        WireType { kind, length }
    }

    pub fn scalar(kind: WireKind) -> WireType {
        WireType { kind, length: 1 }
    }

    /// Byte size of one cell (all vector components).
    pub fn cell_size(&self) -> usize {
        self.kind.byte_width() * self.length
    }
}

/// Total byte size of `num_elements` cells of `kind` with vector width
/// `length`.
pub fn size_of(kind: WireKind, num_elements: usize, length: usize) -> usize {
    kind.byte_width() * num_elements * length
}

/// Host-side element types the table can describe.
///
/// `Str` is variable-width text: compatible with the wire format (it rides
/// on fixed-width char cells) but mapped to no single kind. `Bool` and
/// `Char32` are host types the wire format cannot carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostType {
    Bool,
    /// Rust's 4-byte `char` scalar, distinct from the 1-byte wire char.
    Char32,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
}

impl HostType {
    /// Wire kind this host type maps to; the sentinel when unmapped.
    pub fn wire_kind(self) -> WireKind {
        match self {
            HostType::I8 => WireKind::Int8,
            HostType::I16 => WireKind::Int16,
            HostType::I32 => WireKind::Int32,
            HostType::I64 => WireKind::Int64,
            HostType::U8 => WireKind::Uint8,
            HostType::U16 => WireKind::Uint16,
            HostType::U32 => WireKind::Uint32,
            HostType::U64 => WireKind::Uint64,
            HostType::F32 => WireKind::Float,
            HostType::F64 => WireKind::Double,
            HostType::Bool | HostType::Char32 | HostType::Str => WireKind::Invalid,
        }
    }

    /// True iff the type maps to a known wire kind or is variable-width
    /// text.
    pub fn is_compatible(self) -> bool {
        self == HostType::Str || self.wire_kind().is_valid()
    }
}

/// True iff an array of `dtype` elements with the given rank can be carried
/// by the wire format: compatible dtype and rank at most 2.
pub fn is_array_compatible(dtype: HostType, rank: usize) -> bool {
    dtype.is_compatible() && rank <= 2
}

mod sealed {
    pub trait Sealed {}
}

/// Host scalar types that can view a wire payload without conversion.
///
/// The association is exact: a typed view is only handed out when the
/// array's wire kind equals `KIND`.
pub trait Scalar: sealed::Sealed + Copy + 'static {
    const KIND: WireKind;
}

macro_rules! impl_scalar {
    ($($ty:ty => $kind:expr),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl Scalar for $ty {
                const KIND: WireKind = $kind;
            }
        )*
    };
}

impl_scalar! {
    i8 => WireKind::Int8,
    i16 => WireKind::Int16,
    i32 => WireKind::Int32,
    i64 => WireKind::Int64,
    u8 => WireKind::Uint8,
    u16 => WireKind::Uint16,
    u32 => WireKind::Uint32,
    u64 => WireKind::Uint64,
    f32 => WireKind::Float,
    f64 => WireKind::Double,
}
