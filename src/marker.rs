//! The type-code table: classifies a document's first byte into the kind
//! of value that follows, per the resolved 256-entry assignment (see
//! `DESIGN.md` for how the conflicting rows in the type-code table were
//! pinned down).
use crate::error::{Error, ErrorKind};

/// Lower bound, inclusive, of the small non-negative integer band.
pub const SMALL_UINT_MIN: u8 = 0x00;
/// Upper bound, inclusive, of the small non-negative integer band.
pub const SMALL_UINT_MAX: u8 = 0x64;

/// Lower bound, inclusive, of the short-string band.
pub const SHORT_STRING_MIN: u8 = 0x65;
/// Upper bound, inclusive, of the short-string band.
pub const SHORT_STRING_MAX: u8 = 0xA7;
/// Longest length, in bytes, representable by the short-string band.
pub const SHORT_STRING_MAX_LEN: u8 = SHORT_STRING_MAX - SHORT_STRING_MIN;

/// Lower bound, inclusive, of the small negative integer band.
pub const SMALL_NINT_MIN: u8 = 0xC0;

const FALSE: u8 = 0xA8;
const TYPED_ARRAY_I8: u8 = 0xA9;
const TYPED_ARRAY_I16: u8 = 0xAA;
const TYPED_ARRAY_I32: u8 = 0xAB;
const TYPED_ARRAY_I64: u8 = 0xAC;
const TYPED_ARRAY_U8: u8 = 0xAD;
const TYPED_ARRAY_U16: u8 = 0xAE;
const TYPED_ARRAY_U32: u8 = 0xAF;
const SIGNED_EXPLICIT: u8 = 0xB0;
const UNSIGNED_EXPLICIT: u8 = 0xB1;
const BIGNUMBER: u8 = 0xB2;
const FLOAT: u8 = 0xB3;
const ARRAY_BEGIN: u8 = 0xB4;
const OBJECT_BEGIN: u8 = 0xB5;
const CONTAINER_END: u8 = 0xB6;
const NULL: u8 = 0xB7;
const TRUE: u8 = 0xB8;
const RECORD_DEF_BEGIN: u8 = 0xB9;
const RECORD_INSTANCE_BEGIN: u8 = 0xBA;
const TYPED_ARRAY_U64: u8 = 0xBB;
const TYPED_ARRAY_F32: u8 = 0xBC;
const TYPED_ARRAY_F64: u8 = 0xBD;
const TYPED_ARRAY_BOOL: u8 = 0xBE;
const STRING: u8 = 0xBF;

/// The element type a typed-array marker introduces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypedArrayElement {
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
    Bool,
}

impl TypedArrayElement {
    /// Byte width of one element, or `None` for `Bool` (bit-packed).
    pub fn byte_width(self) -> Option<usize> {
        use TypedArrayElement::*;
        match self {
            I8 | U8 => Some(1),
            I16 | U16 => Some(2),
            I32 | U32 | F32 => Some(4),
            I64 | U64 | F64 => Some(8),
            Bool => None,
        }
    }
}

/// What a single first byte means: either a complete small value, or the
/// start of a larger encoding that needs further bytes to interpret.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    /// Non-negative integer whose value is the byte itself (`0..=100`).
    SmallUint(u8),
    /// Negative integer whose value is `byte as i16 - 0x100` (`-64..=-1`).
    SmallNint(i8),
    /// Short string; payload is the following `len` bytes (`0..=66`).
    ShortString(u8),
    /// Long or chunked string; followed by one or more length-codec
    /// payloads (see [`crate::varint::ChunkLength`]), the last with
    /// `has_more_chunks = false`, each followed by that many UTF-8 bytes.
    String,
    TypedArray(TypedArrayElement),
    SignedExplicit,
    UnsignedExplicit,
    BigNumber,
    Float,
    ArrayBegin,
    ObjectBegin,
    ContainerEnd,
    Null,
    True,
    False,
    RecordDefinitionBegin,
    RecordInstanceBegin,
}

impl Marker {
    /// Classify a first byte. Never fails: every byte maps to exactly one
    /// marker in this revision's fully-assigned table.
    pub fn from_u8(byte: u8) -> Marker {
        match byte {
            SMALL_UINT_MIN..=SMALL_UINT_MAX => Marker::SmallUint(byte),
            SHORT_STRING_MIN..=SHORT_STRING_MAX => Marker::ShortString(byte - SHORT_STRING_MIN),
            FALSE => Marker::False,
            TYPED_ARRAY_I8 => Marker::TypedArray(TypedArrayElement::I8),
            TYPED_ARRAY_I16 => Marker::TypedArray(TypedArrayElement::I16),
            TYPED_ARRAY_I32 => Marker::TypedArray(TypedArrayElement::I32),
            TYPED_ARRAY_I64 => Marker::TypedArray(TypedArrayElement::I64),
            TYPED_ARRAY_U8 => Marker::TypedArray(TypedArrayElement::U8),
            TYPED_ARRAY_U16 => Marker::TypedArray(TypedArrayElement::U16),
            TYPED_ARRAY_U32 => Marker::TypedArray(TypedArrayElement::U32),
            SIGNED_EXPLICIT => Marker::SignedExplicit,
            UNSIGNED_EXPLICIT => Marker::UnsignedExplicit,
            BIGNUMBER => Marker::BigNumber,
            FLOAT => Marker::Float,
            ARRAY_BEGIN => Marker::ArrayBegin,
            OBJECT_BEGIN => Marker::ObjectBegin,
            CONTAINER_END => Marker::ContainerEnd,
            NULL => Marker::Null,
            TRUE => Marker::True,
            RECORD_DEF_BEGIN => Marker::RecordDefinitionBegin,
            RECORD_INSTANCE_BEGIN => Marker::RecordInstanceBegin,
            TYPED_ARRAY_U64 => Marker::TypedArray(TypedArrayElement::U64),
            TYPED_ARRAY_F32 => Marker::TypedArray(TypedArrayElement::F32),
            TYPED_ARRAY_F64 => Marker::TypedArray(TypedArrayElement::F64),
            TYPED_ARRAY_BOOL => Marker::TypedArray(TypedArrayElement::Bool),
            STRING => Marker::String,
            SMALL_NINT_MIN..=0xFF => Marker::SmallNint((byte as i16 - 0x100) as i8),
        }
    }

    /// The single byte this marker encodes to, for the markers that stand
    /// alone (no embedded payload such as `ShortString`'s length).
    pub fn into_u8(self) -> u8 {
        match self {
            Marker::SmallUint(v) => v,
            Marker::SmallNint(v) => (v as i16 + 0x100) as u8,
            Marker::ShortString(len) => SHORT_STRING_MIN + len,
            Marker::String => STRING,
            Marker::False => FALSE,
            Marker::TypedArray(TypedArrayElement::I8) => TYPED_ARRAY_I8,
            Marker::TypedArray(TypedArrayElement::I16) => TYPED_ARRAY_I16,
            Marker::TypedArray(TypedArrayElement::I32) => TYPED_ARRAY_I32,
            Marker::TypedArray(TypedArrayElement::I64) => TYPED_ARRAY_I64,
            Marker::TypedArray(TypedArrayElement::U8) => TYPED_ARRAY_U8,
            Marker::TypedArray(TypedArrayElement::U16) => TYPED_ARRAY_U16,
            Marker::TypedArray(TypedArrayElement::U32) => TYPED_ARRAY_U32,
            Marker::TypedArray(TypedArrayElement::U64) => TYPED_ARRAY_U64,
            Marker::TypedArray(TypedArrayElement::F32) => TYPED_ARRAY_F32,
            Marker::TypedArray(TypedArrayElement::F64) => TYPED_ARRAY_F64,
            Marker::TypedArray(TypedArrayElement::Bool) => TYPED_ARRAY_BOOL,
            Marker::SignedExplicit => SIGNED_EXPLICIT,
            Marker::UnsignedExplicit => UNSIGNED_EXPLICIT,
            Marker::BigNumber => BIGNUMBER,
            Marker::Float => FLOAT,
            Marker::ArrayBegin => ARRAY_BEGIN,
            Marker::ObjectBegin => OBJECT_BEGIN,
            Marker::ContainerEnd => CONTAINER_END,
            Marker::Null => NULL,
            Marker::True => TRUE,
            Marker::RecordDefinitionBegin => RECORD_DEF_BEGIN,
            Marker::RecordInstanceBegin => RECORD_INSTANCE_BEGIN,
        }
    }
}

/// Float payload width byte, following a [`Marker::Float`] marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FloatWidth {
    Bf16,
    F32,
    F64,
}

impl FloatWidth {
    pub fn from_u8(byte: u8) -> Result<FloatWidth, Error> {
        match byte {
            16 => Ok(FloatWidth::Bf16),
            32 => Ok(FloatWidth::F32),
            64 => Ok(FloatWidth::F64),
            other => Err(Error::new(
                ErrorKind::InvalidData,
                format!("invalid float width byte {}", other),
            )),
        }
    }

    pub fn into_u8(self) -> u8 {
        match self {
            FloatWidth::Bf16 => 16,
            FloatWidth::F32 => 32,
            FloatWidth::F64 => 64,
        }
    }

    pub fn byte_len(self) -> usize {
        match self {
            FloatWidth::Bf16 => 2,
            FloatWidth::F32 => 4,
            FloatWidth::F64 => 8,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_vectors_classify_correctly() {
        assert_eq!(Marker::from_u8(0xb7), Marker::Null);
        assert_eq!(Marker::from_u8(0xb8), Marker::True);
        assert_eq!(Marker::from_u8(0x2a), Marker::SmallUint(42));
        assert_eq!(Marker::from_u8(0xff), Marker::SmallNint(-1));
        assert_eq!(Marker::from_u8(0xb4), Marker::ArrayBegin);
        assert_eq!(Marker::from_u8(0xb5), Marker::ObjectBegin);
        assert_eq!(Marker::from_u8(0xb6), Marker::ContainerEnd);
    }

    #[test]
    fn short_string_marker_carries_length() {
        // "hello" ⇄ 6a 68 65 6c 6c 6f: marker byte 0x6a, len = 0x6a - 0x65 = 5
        assert_eq!(Marker::from_u8(0x6a), Marker::ShortString(5));
    }

    #[test]
    fn record_markers_match_table_rows() {
        assert_eq!(Marker::from_u8(0xb9), Marker::RecordDefinitionBegin);
        assert_eq!(Marker::from_u8(0xba), Marker::RecordInstanceBegin);
        assert_eq!(Marker::from_u8(0xa8), Marker::False);
    }

    #[test]
    fn long_string_marker_is_distinct_from_small_negative_int() {
        assert_eq!(Marker::from_u8(0xbf), Marker::String);
    }

    #[test]
    fn round_trips_into_u8() {
        for byte in 0u16..=255 {
            let byte = byte as u8;
            let marker = Marker::from_u8(byte);
            assert_eq!(marker.into_u8(), byte, "byte {:#04x}", byte);
        }
    }

    #[test]
    fn float_width_round_trips() {
        for w in [FloatWidth::Bf16, FloatWidth::F32, FloatWidth::F64] {
            assert_eq!(FloatWidth::from_u8(w.into_u8()).unwrap(), w);
        }
        assert!(FloatWidth::from_u8(24).is_err());
    }
}
