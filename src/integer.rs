//! The `Integer` type: a signed-or-unsigned 64-bit integer with the
//! minimum-width wire encoding rules from the numeric codec.
use std::cmp::Ordering;
use std::fmt;

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{err, Error, ErrorKind};
use crate::marker::{Marker, SMALL_NINT_MIN, SMALL_UINT_MAX};

/// How an [`Integer`] is classified for wire encoding: which marker and how
/// many payload bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Encoding {
    SmallUint,
    SmallNint,
    Signed(usize),
    Unsigned(usize),
}

/// A signed-or-unsigned integer, logically unbounded in the format but
/// represented here as the narrower of `u64`/`i64` that holds it, mirroring
/// how values actually arrive off the wire or from a caller.
#[derive(Clone, Copy, Debug, Eq)]
enum IntPriv {
    Pos(u64),
    Neg(i64),
}

/// A signed-or-unsigned integer. Construct via `From` for any Rust integer
/// primitive; read back out with `TryFrom`.
#[derive(Clone, Copy, Debug, Eq)]
pub struct Integer(IntPriv);

impl Integer {
    /// `true` if the value is negative.
    pub fn is_negative(&self) -> bool {
        matches!(self.0, IntPriv::Neg(v) if v < 0)
    }

    /// The value as `i128`, lossless for any `Integer`.
    pub fn as_i128(&self) -> i128 {
        match self.0 {
            IntPriv::Pos(v) => v as i128,
            IntPriv::Neg(v) => v as i128,
        }
    }

    fn unsigned_width(v: u64) -> usize {
        if v == 0 {
            return 1;
        }
        ((64 - v.leading_zeros() as usize) + 7) / 8
    }

    fn signed_width_for_nonneg(v: u64, unsigned_width: usize) -> usize {
        // Needs an extra byte if the top bit of the unsigned minimal
        // representation is already set (else it would read as negative).
        // At `unsigned_width == 8` there is no 9th byte to grow into, so
        // this deliberately returns a width one past what's representable
        // (9) to force the caller's `sw == uw` tie-break to fail and pick
        // `Unsigned(8)` instead.
        let top_bit = unsigned_width * 8 - 1;
        if (v >> top_bit) & 1 != 0 {
            unsigned_width + 1
        } else {
            unsigned_width
        }
    }

    fn signed_width_for_neg(v: i64) -> usize {
        if v >= -0x80 {
            1
        } else if v >= -0x8000 {
            2
        } else if v >= -0x0080_0000 {
            3
        } else if v >= -0x8000_0000 {
            4
        } else if v >= -0x0080_0000_0000 {
            5
        } else if v >= -0x8000_0000_0000 {
            6
        } else if v >= -0x0080_0000_0000_0000 {
            7
        } else {
            8
        }
    }

    /// Classify this value per the minimum-width rule (`spec.md` §4.3):
    /// small-int byte when `-64..=100`, otherwise the narrower of the
    /// signed/unsigned explicit-width encodings, preferring signed on a
    /// tie.
    pub(crate) fn encoding(&self) -> Encoding {
        match self.0 {
            IntPriv::Pos(v) if v <= SMALL_UINT_MAX as u64 => Encoding::SmallUint,
            IntPriv::Neg(v) if v >= SMALL_NINT_MIN as i64 - 0x100 => Encoding::SmallNint,
            IntPriv::Pos(v) => {
                let uw = Self::unsigned_width(v);
                let sw = Self::signed_width_for_nonneg(v, uw);
                if sw == uw {
                    Encoding::Signed(sw)
                } else {
                    Encoding::Unsigned(uw)
                }
            }
            IntPriv::Neg(v) => Encoding::Signed(Self::signed_width_for_neg(v)),
        }
    }

    /// Encode this value's marker byte and payload bytes (if any) onto
    /// `out`.
    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        match self.encoding() {
            Encoding::SmallUint => {
                let v = match self.0 {
                    IntPriv::Pos(v) => v as u8,
                    IntPriv::Neg(_) => unreachable!(),
                };
                out.push(Marker::SmallUint(v).into_u8());
            }
            Encoding::SmallNint => {
                let v = match self.0 {
                    IntPriv::Neg(v) => v as i8,
                    IntPriv::Pos(_) => unreachable!(),
                };
                out.push(Marker::SmallNint(v).into_u8());
            }
            Encoding::Signed(width) => {
                out.push(Marker::SignedExplicit.into_u8());
                out.push(width as u8);
                let v = self.as_i128() as i64;
                out.extend_from_slice(&v.to_le_bytes()[..width]);
            }
            Encoding::Unsigned(width) => {
                out.push(Marker::UnsignedExplicit.into_u8());
                out.push(width as u8);
                let v = match self.0 {
                    IntPriv::Pos(v) => v,
                    IntPriv::Neg(_) => unreachable!(),
                };
                out.extend_from_slice(&v.to_le_bytes()[..width]);
            }
        }
    }

    /// Decode the explicit-width signed payload following a
    /// [`Marker::SignedExplicit`] marker: one width byte then `width`
    /// little-endian bytes.
    pub(crate) fn decode_signed_explicit(input: &[u8]) -> Result<(Integer, usize), Error> {
        let width = *input
            .first()
            .ok_or_else(|| err!(ErrorKind::Truncated, "signed int: missing width byte"))?
            as usize;
        if !(1..=8).contains(&width) {
            return Err(err!(
                ErrorKind::InvalidData,
                "signed int: width {} out of range 1..=8",
                width
            ));
        }
        let body = input.get(1..1 + width).ok_or_else(|| {
            err!(
                ErrorKind::Truncated,
                "signed int: need {} payload bytes",
                width
            )
        })?;
        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(body);
        if width < 8 && buf[width - 1] & 0x80 != 0 {
            for b in &mut buf[width..] {
                *b = 0xFF;
            }
        }
        let v = (&buf[..]).read_i64::<LittleEndian>().unwrap();
        let canonical_width = match Integer::from(v).encoding() {
            Encoding::Signed(w) => w,
            Encoding::SmallUint | Encoding::SmallNint => {
                return Err(err!(
                    ErrorKind::NonCanonicalLength,
                    "signed int: value {} should use the small-int byte",
                    v
                ))
            }
            Encoding::Unsigned(_) => {
                return Err(err!(
                    ErrorKind::NonCanonicalLength,
                    "signed int: value {} should use the unsigned encoding",
                    v
                ))
            }
        };
        if canonical_width != width {
            return Err(err!(
                ErrorKind::NonCanonicalLength,
                "signed int: width {} is not minimal for value {} (want {})",
                width,
                v,
                canonical_width
            ));
        }
        Ok((Integer::from(v), 1 + width))
    }

    /// Decode the explicit-width unsigned payload following a
    /// [`Marker::UnsignedExplicit`] marker.
    pub(crate) fn decode_unsigned_explicit(input: &[u8]) -> Result<(Integer, usize), Error> {
        let width = *input
            .first()
            .ok_or_else(|| err!(ErrorKind::Truncated, "unsigned int: missing width byte"))?
            as usize;
        if !(1..=8).contains(&width) {
            return Err(err!(
                ErrorKind::InvalidData,
                "unsigned int: width {} out of range 1..=8",
                width
            ));
        }
        let body = input.get(1..1 + width).ok_or_else(|| {
            err!(
                ErrorKind::Truncated,
                "unsigned int: need {} payload bytes",
                width
            )
        })?;
        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(body);
        let v = (&buf[..]).read_u64::<LittleEndian>().unwrap();
        let canonical_width = Integer::unsigned_width(v);
        let signed_would_fit = Integer::signed_width_for_nonneg(v, canonical_width) == canonical_width;
        if signed_would_fit {
            return Err(err!(
                ErrorKind::NonCanonicalLength,
                "unsigned int: value {} should use the signed encoding",
                v
            ));
        }
        if canonical_width != width {
            return Err(err!(
                ErrorKind::NonCanonicalLength,
                "unsigned int: width {} is not minimal for value {} (want {})",
                width,
                v,
                canonical_width
            ));
        }
        Ok((Integer::from(v), 1 + width))
    }
}

impl PartialEq for Integer {
    fn eq(&self, other: &Self) -> bool {
        self.as_i128() == other.as_i128()
    }
}

impl Ord for Integer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_i128().cmp(&other.as_i128())
    }
}

impl PartialOrd for Integer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Integer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            IntPriv::Pos(v) => write!(f, "{}", v),
            IntPriv::Neg(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! impl_from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for Integer {
            fn from(v: $t) -> Integer {
                Integer(IntPriv::Pos(v as u64))
            }
        })*
    };
}
impl_from_unsigned!(u8, u16, u32, u64);

macro_rules! impl_from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for Integer {
            fn from(v: $t) -> Integer {
                if v < 0 {
                    Integer(IntPriv::Neg(v as i64))
                } else {
                    Integer(IntPriv::Pos(v as u64))
                }
            }
        })*
    };
}
impl_from_signed!(i8, i16, i32, i64);

impl TryFrom<Integer> for u64 {
    type Error = Error;
    fn try_from(v: Integer) -> Result<u64, Error> {
        match v.0 {
            IntPriv::Pos(v) => Ok(v),
            IntPriv::Neg(v) => Err(err!(
                ErrorKind::ValueOutOfRange,
                "integer {} does not fit in u64",
                v
            )),
        }
    }
}

impl TryFrom<Integer> for i64 {
    type Error = Error;
    fn try_from(v: Integer) -> Result<i64, Error> {
        match v.0 {
            IntPriv::Pos(v) if v <= i64::MAX as u64 => Ok(v as i64),
            IntPriv::Pos(v) => Err(err!(
                ErrorKind::ValueOutOfRange,
                "integer {} does not fit in i64",
                v
            )),
            IntPriv::Neg(v) => Ok(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: Integer) {
        let mut buf = Vec::new();
        v.encode(&mut buf);
        let marker = Marker::from_u8(buf[0]);
        let decoded = match marker {
            Marker::SmallUint(b) => (Integer::from(b as u64), 1),
            Marker::SmallNint(b) => (Integer::from(b as i64), 1),
            Marker::SignedExplicit => Integer::decode_signed_explicit(&buf[1..]).unwrap(),
            Marker::UnsignedExplicit => Integer::decode_unsigned_explicit(&buf[1..]).unwrap(),
            other => panic!("unexpected marker {:?}", other),
        };
        assert_eq!(decoded.0, v, "round trip of {}", v);
        let consumed = match marker {
            Marker::SmallUint(_) | Marker::SmallNint(_) => 1,
            _ => 1 + decoded.1,
        };
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn small_ints_round_trip() {
        for v in -64..=100i64 {
            round_trip(Integer::from(v));
        }
    }

    #[test]
    fn spec_vectors_match() {
        let mut buf = Vec::new();
        Integer::from(42i64).encode(&mut buf);
        assert_eq!(buf, vec![0x2a]);

        let mut buf = Vec::new();
        Integer::from(-1i64).encode(&mut buf);
        assert_eq!(buf, vec![0xff]);
    }

    #[test]
    fn minus_100_uses_explicit_width_not_small_int() {
        let mut buf = Vec::new();
        Integer::from(-100i64).encode(&mut buf);
        assert_eq!(buf, vec![0xb0, 1, 0x9c]);
    }

    #[test]
    fn explicit_width_small_negative_int_is_rejected_as_non_canonical() {
        // -1 canonically uses the small-int byte 0xFF, not an explicit
        // signed width-1 encoding.
        let buf = [0xb0, 1, 0xff];
        let err = Integer::decode_signed_explicit(&buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonCanonicalLength);
    }

    #[test]
    fn wide_values_round_trip() {
        for v in [
            i64::MIN,
            i64::MIN + 1,
            -1_000_000_000_000i64,
            1_000_000_000_000i64,
            i64::MAX,
            101,
            255,
            256,
            65535,
            65536,
            u32::MAX as i64,
        ] {
            round_trip(Integer::from(v));
        }
        round_trip(Integer::from(u64::MAX));
    }

    #[test]
    fn u64_values_above_i64_max_use_unsigned_encoding() {
        // 2^63 and above can't be a positive `i64`, so the encoding must be
        // `Unsigned`, not a tied `Signed` that would decode back negative.
        for v in [1u64 << 63, u64::MAX, (1u64 << 63) + 1] {
            let i = Integer::from(v);
            assert_eq!(i.encoding(), Encoding::Unsigned(8), "value {}", v);
            round_trip(i);
        }
    }

    #[test]
    fn non_canonical_width_rejected() {
        // 101 fits in 1 unsigned byte but is encoded here with width 2.
        let buf = [2u8, 101, 0];
        let err = Integer::decode_unsigned_explicit(&buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonCanonicalLength);
    }

    #[test]
    fn random_values_round_trip() {
        use rand::prelude::*;
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let v: i64 = rng.gen();
            round_trip(Integer::from(v));
        }
        for _ in 0..1000 {
            let v: u64 = rng.gen();
            round_trip(Integer::from(v));
        }
    }
}
