//! Float narrowing: choosing the smallest of bfloat16/float32/float64 that
//! round-trips a value exactly, and the non-finite (`NaN`/`±Infinity`)
//! policy substitutions.
use crate::error::{err, Error, ErrorKind};
use crate::integer::Integer;
use crate::marker::{FloatWidth, Marker};
use crate::policy::{NanInfinityPolicy, Policy};

/// Truncate an `f32`'s bit pattern to its high 16 bits (bfloat16),
/// round-to-nearest-even on the bits being dropped.
fn f32_to_bf16_bits(f: f32) -> u16 {
    let bits = f.to_bits();
    let round_bit = 0x0000_8000u32;
    let lower = bits & 0x0000_FFFF;
    let rounded = if lower > round_bit || (lower == round_bit && (bits & 0x0001_0000) != 0) {
        bits.wrapping_add(0x0001_0000)
    } else {
        bits
    };
    (rounded >> 16) as u16
}

fn bf16_bits_to_f32(bits: u16) -> f32 {
    f32::from_bits((bits as u32) << 16)
}

/// Try to represent `f` exactly as bfloat16 (a lossy, rounding truncation
/// of float32 — "exact" here means the truncate-then-widen round trip
/// reproduces the original float32 bit pattern).
fn fits_bf16(f: f32) -> Option<u16> {
    let bits = f32_to_bf16_bits(f);
    if bf16_bits_to_f32(bits).to_bits() == f.to_bits() {
        Some(bits)
    } else {
        None
    }
}

fn write_finite(value: f64, out: &mut Vec<u8>) {
    out.push(Marker::Float.into_u8());
    let as_f32 = value as f32;
    if as_f32 as f64 == value {
        if let Some(bits) = fits_bf16(as_f32) {
            out.push(FloatWidth::Bf16.into_u8());
            out.extend_from_slice(&bits.to_le_bytes());
            return;
        }
        out.push(FloatWidth::F32.into_u8());
        out.extend_from_slice(&as_f32.to_le_bytes());
        return;
    }
    out.push(FloatWidth::F64.into_u8());
    out.extend_from_slice(&value.to_le_bytes());
}

/// What an encoder must do to emit a particular float value: write wire
/// bytes for a `Float` element, or (only reachable for non-finite values
/// under the `stringify` policy) encode a string value instead.
pub(crate) enum FloatEncoding {
    Wire(Vec<u8>),
    SubstitutedString(String),
}

/// Decide how to encode `value`, applying the non-finite policy when it is
/// `NaN` or infinite. Finite values always produce [`FloatEncoding::Wire`].
pub(crate) fn encode_float_value(value: f64, policy: &Policy) -> Result<FloatEncoding, Error> {
    if value.is_finite() {
        let mut out = Vec::new();
        if let Some(n) = whole_number_in_int_range(value) {
            int_from_i128(n).encode(&mut out);
        } else {
            write_finite(value, &mut out);
        }
        return Ok(FloatEncoding::Wire(out));
    }
    match policy.nan_infinity_policy() {
        NanInfinityPolicy::Allow => {
            let mut out = Vec::new();
            out.push(Marker::Float.into_u8());
            out.push(FloatWidth::F64.into_u8());
            out.extend_from_slice(&value.to_le_bytes());
            Ok(FloatEncoding::Wire(out))
        }
        NanInfinityPolicy::Reject => {
            let kind = if value.is_nan() {
                ErrorKind::NanNotAllowed
            } else {
                ErrorKind::InfinityNotAllowed
            };
            Err(err!(kind, "non-finite float {} rejected by policy", value))
        }
        NanInfinityPolicy::Stringify {
            nan,
            pos_infinity,
            neg_infinity,
        } => {
            let s = if value.is_nan() {
                nan.clone()
            } else if value.is_sign_positive() {
                pos_infinity.clone()
            } else {
                neg_infinity.clone()
            };
            Ok(FloatEncoding::SubstitutedString(s))
        }
    }
}

/// Decode the width byte and payload following a [`Marker::Float`] marker,
/// returning the value and total bytes consumed (width byte + payload).
///
/// A document produced by this crate never carries a non-finite bit
/// pattern under the `stringify` policy (it substitutes a string value
/// instead), so on decode `stringify` is treated the same as `allow`: a
/// non-finite value found on the wire is passed through unless the policy
/// is `reject`.
pub(crate) fn decode_float(input: &[u8], policy: &Policy) -> Result<(f64, usize), Error> {
    let width_byte = *input
        .first()
        .ok_or_else(|| err!(ErrorKind::Truncated, "float: missing width byte"))?;
    let width = FloatWidth::from_u8(width_byte)?;
    let payload = input
        .get(1..1 + width.byte_len())
        .ok_or_else(|| err!(ErrorKind::Truncated, "float: need {} payload bytes", width.byte_len()))?;

    let value = match width {
        FloatWidth::Bf16 => {
            let bits = u16::from_le_bytes([payload[0], payload[1]]);
            bf16_bits_to_f32(bits) as f64
        }
        FloatWidth::F32 => {
            let mut b = [0u8; 4];
            b.copy_from_slice(payload);
            f32::from_le_bytes(b) as f64
        }
        FloatWidth::F64 => {
            let mut b = [0u8; 8];
            b.copy_from_slice(payload);
            f64::from_le_bytes(b)
        }
    };

    if !value.is_finite() && matches!(policy.nan_infinity_policy(), NanInfinityPolicy::Reject) {
        let kind = if value.is_nan() {
            ErrorKind::NanNotAllowed
        } else {
            ErrorKind::InfinityNotAllowed
        };
        return Err(err!(kind, "non-finite float {} rejected by policy", value));
    }

    if value.is_finite() {
        let canonical_width = canonical_width_for(value);
        if canonical_width != width {
            return Err(err!(
                ErrorKind::NonCanonicalLength,
                "float: width {:?} is not minimal for value {}",
                width,
                value
            ));
        }
    }

    Ok((value, 1 + width.byte_len()))
}

fn canonical_width_for(value: f64) -> FloatWidth {
    let as_f32 = value as f32;
    if as_f32 as f64 == value {
        if fits_bf16(as_f32).is_some() {
            FloatWidth::Bf16
        } else {
            FloatWidth::F32
        }
    } else {
        FloatWidth::F64
    }
}

/// `true` if `value` is finite and a whole number within `i64`/`u64`
/// range, in which case the numeric codec prefers the integer encoding
/// over any float width.
pub(crate) fn whole_number_in_int_range(value: f64) -> Option<i128> {
    if !value.is_finite() || value.fract() != 0.0 {
        return None;
    }
    if (-(2f64.powi(63))..2f64.powi(63)).contains(&value) {
        Some(value as i128)
    } else if (0.0..2f64.powi(64)).contains(&value) {
        Some(value as i128)
    } else {
        None
    }
}

/// Build the narrower of `i64`/`u64` that holds `n`, for a value already
/// known (via [`whole_number_in_int_range`]) to fit one of them.
fn int_from_i128(n: i128) -> Integer {
    if n < 0 || n <= i64::MAX as i128 {
        Integer::from(n as i64)
    } else {
        Integer::from(n as u64)
    }
}
