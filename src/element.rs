//! Single-element encode/decode: the glue between the type-code table and
//! the individual numeric/string codecs, shared by the stream encoder and
//! the single-pass scanner so neither re-implements dispatch.
use crate::bignumber::BigNumber;
use crate::error::{err, Error, ErrorKind};
use crate::float::{self, FloatEncoding};
use crate::integer::Integer;
use crate::marker::Marker;
use crate::policy::{BignumberOutOfRangePolicy, Policy};
use crate::string;

/// A decoded non-container value: every [`Marker`] variant that does not
/// open or close a container.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Scalar {
    Null,
    Bool(bool),
    Int(Integer),
    Float(f64),
    BigNumber(BigNumber),
    Str(String),
}

/// Encode `null`.
pub(crate) fn encode_null(out: &mut Vec<u8>) {
    out.push(Marker::Null.into_u8());
}

/// Encode a bool.
pub(crate) fn encode_bool(v: bool, out: &mut Vec<u8>) {
    out.push(if v { Marker::True } else { Marker::False }.into_u8());
}

/// Encode an integer.
pub(crate) fn encode_int(v: &Integer, out: &mut Vec<u8>) {
    v.encode(out);
}

/// Encode a float, applying the non-finite policy. A `stringify`d
/// non-finite value is written as a string element instead of a float
/// element — this is what `spec.md` means by "substitutes ... a string
/// value at that position."
pub(crate) fn encode_float(v: f64, policy: &Policy, out: &mut Vec<u8>) -> Result<(), Error> {
    match float::encode_float_value(v, policy)? {
        FloatEncoding::Wire(bytes) => {
            out.extend_from_slice(&bytes);
            Ok(())
        }
        FloatEncoding::SubstitutedString(s) => encode_string(&s, policy, out),
    }
}

/// Encode a BigNumber, applying the out-of-range policy. An out-of-range
/// value under `stringify` is written as a string element carrying its
/// decimal rendering instead of the wire BigNumber form.
pub(crate) fn encode_bignumber(v: &BigNumber, policy: &Policy, out: &mut Vec<u8>) -> Result<(), Error> {
    if v.within_limits(policy) {
        v.encode(out);
        return Ok(());
    }
    match policy.bignumber_out_of_range_policy() {
        BignumberOutOfRangePolicy::Stringify => encode_string(&v.to_decimal_string(), policy, out),
        BignumberOutOfRangePolicy::Reject => {
            v.check_limits(policy)?;
            unreachable!("check_limits must error when not within_limits and policy is reject")
        }
    }
}

/// Encode a string, applying normalization, the NUL-in-string policy, and
/// the `max_string_length` cap — the same checks
/// [`string::finish_decoded_string`] applies on decode, so a value the
/// policy admits on write decodes back to the same value.
pub(crate) fn encode_string(s: &str, policy: &Policy, out: &mut Vec<u8>) -> Result<(), Error> {
    let prepared = string::prepare_for_encoding(s, policy);
    string::check_nul_policy(&prepared, policy)?;
    if prepared.len() > policy.max_string_length_limit() {
        return Err(err!(
            ErrorKind::MaxStringLengthExceeded,
            "string of {} bytes exceeds max_string_length ({})",
            prepared.len(),
            policy.max_string_length_limit()
        ));
    }
    string::encode_string(&prepared, out);
    Ok(())
}

/// Decode the non-container value introduced by `marker`, given the bytes
/// immediately following the marker byte. Returns the value and the
/// number of bytes consumed *after* the marker byte.
///
/// Container-opening/closing markers (`ArrayBegin`, `ObjectBegin`,
/// `ContainerEnd`, `RecordDefinitionBegin`, `RecordInstanceBegin`,
/// `TypedArray`) are not handled here; the scanner dispatches those
/// itself since they drive its container stack.
pub(crate) fn decode_scalar(marker: Marker, input: &[u8], policy: &Policy) -> Result<(Scalar, usize), Error> {
    match marker {
        Marker::Null => Ok((Scalar::Null, 0)),
        Marker::True => Ok((Scalar::Bool(true), 0)),
        Marker::False => Ok((Scalar::Bool(false), 0)),
        Marker::SmallUint(v) => Ok((Scalar::Int(Integer::from(v as u64)), 0)),
        Marker::SmallNint(v) => Ok((Scalar::Int(Integer::from(v as i64)), 0)),
        Marker::SignedExplicit => {
            let (v, n) = Integer::decode_signed_explicit(input)?;
            Ok((Scalar::Int(v), n))
        }
        Marker::UnsignedExplicit => {
            let (v, n) = Integer::decode_unsigned_explicit(input)?;
            Ok((Scalar::Int(v), n))
        }
        Marker::Float => {
            let (v, n) = float::decode_float(input, policy)?;
            Ok((Scalar::Float(v), n))
        }
        Marker::BigNumber => {
            let (v, n) = BigNumber::decode(input, policy)?;
            if !v.within_limits(policy) {
                // `within_limits` is false only when `decode` didn't already
                // error, which happens only under the `stringify` policy.
                return Ok((Scalar::Str(v.to_decimal_string()), n));
            }
            Ok((Scalar::BigNumber(v), n))
        }
        Marker::ShortString(len) => {
            let (s, n) = string::decode_short_string(input, len, policy)?;
            Ok((Scalar::Str(s), n))
        }
        Marker::String => {
            let (s, n) = string::decode_long_string(input, policy)?;
            Ok((Scalar::Str(s), n))
        }
        other => Err(err!(
            ErrorKind::InvalidData,
            "marker {:?} does not introduce a scalar value",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::NanInfinityPolicy;

    fn decode_one(buf: &[u8], policy: &Policy) -> (Scalar, usize) {
        let marker = Marker::from_u8(buf[0]);
        let (scalar, n) = decode_scalar(marker, &buf[1..], policy).unwrap();
        (scalar, 1 + n)
    }

    #[test]
    fn null_and_bool_round_trip() {
        let mut buf = Vec::new();
        encode_null(&mut buf);
        encode_bool(true, &mut buf);
        encode_bool(false, &mut buf);
        assert_eq!(buf.len(), 3);
        let (v, n) = decode_one(&buf, &Policy::new());
        assert_eq!(v, Scalar::Null);
        assert_eq!(n, 1);
        let (v, n) = decode_one(&buf[1..], &Policy::new());
        assert_eq!(v, Scalar::Bool(true));
        assert_eq!(n, 1);
        let (v, _) = decode_one(&buf[2..], &Policy::new());
        assert_eq!(v, Scalar::Bool(false));
    }

    #[test]
    fn string_round_trips_through_element_layer() {
        let mut buf = Vec::new();
        encode_string("hello", &Policy::new(), &mut buf).unwrap();
        let (v, n) = decode_one(&buf, &Policy::new());
        assert_eq!(v, Scalar::Str("hello".to_string()));
        assert_eq!(n, buf.len());
    }

    #[test]
    fn encode_string_rejects_embedded_nul_by_default() {
        let err = encode_string("a\0b", &Policy::new(), &mut Vec::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NulInString);
    }

    #[test]
    fn encode_string_allows_embedded_nul_when_policy_permits() {
        use crate::policy::NulInStringPolicy;
        let policy = Policy::new().nul_in_string(NulInStringPolicy::Allow);
        let mut buf = Vec::new();
        encode_string("a\0b", &policy, &mut buf).unwrap();
        let (v, n) = decode_one(&buf, &policy);
        assert_eq!(v, Scalar::Str("a\0b".to_string()));
        assert_eq!(n, buf.len());
    }

    #[test]
    fn nonfinite_float_stringify_emits_a_string_element() {
        let policy = Policy::new().nan_infinity(NanInfinityPolicy::Stringify {
            nan: "NaN".into(),
            pos_infinity: "Infinity".into(),
            neg_infinity: "-Infinity".into(),
        });
        let mut buf = Vec::new();
        encode_float(f64::NAN, &policy, &mut buf).unwrap();
        assert_eq!(Marker::from_u8(buf[0]), Marker::ShortString(3));
        let (v, _) = decode_one(&buf, &policy);
        assert_eq!(v, Scalar::Str("NaN".to_string()));
    }

    #[test]
    fn bignumber_stringify_emits_a_string_element() {
        let policy = Policy::new()
            .max_bignumber_exponent(10)
            .bignumber_out_of_range(BignumberOutOfRangePolicy::Stringify);
        let bn = BigNumber::new(false, vec![5], 200);
        let mut buf = Vec::new();
        encode_bignumber(&bn, &policy, &mut buf).unwrap();
        let (v, _) = decode_one(&buf, &policy);
        assert_eq!(v, Scalar::Str("5e200".to_string()));
    }

    #[test]
    fn bignumber_found_out_of_range_on_decode_is_stringified() {
        // A wire BigNumber that's already out of range (e.g. produced by
        // another implementation) decodes to a string under `stringify`,
        // matching what this crate's own encoder would have emitted for it.
        let policy = Policy::new()
            .max_bignumber_exponent(10)
            .bignumber_out_of_range(BignumberOutOfRangePolicy::Stringify);
        let bn = BigNumber::new(false, vec![5], 200);
        let mut buf = Vec::new();
        bn.encode(&mut buf);
        let marker = Marker::from_u8(buf[0]);
        let (scalar, _) = decode_scalar(marker, &buf[1..], &policy).unwrap();
        assert_eq!(scalar, Scalar::Str("5e200".to_string()));
    }

    #[test]
    fn bignumber_reject_propagates_error() {
        let policy = Policy::new().max_bignumber_exponent(10);
        let bn = BigNumber::new(false, vec![5], 200);
        let mut buf = Vec::new();
        let err = encode_bignumber(&bn, &policy, &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MaxBignumberExponentExceeded);
    }
}
