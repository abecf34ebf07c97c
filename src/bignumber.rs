//! Arbitrary-precision decimal: `sign * integer(magnitude, little-endian) *
//! 10^exponent`. Used when a value's magnitude or exponent exceeds what the
//! narrower numeric encodings can hold.
use crate::error::{err, Error, ErrorKind};
use crate::marker::Marker;
use crate::policy::{BignumberOutOfRangePolicy, Policy};
use crate::varint::{read_zigzag_leb128, write_zigzag_leb128};

/// An arbitrary-precision signed decimal: `sign * magnitude * 10^exponent`.
///
/// `magnitude` is little-endian, with trailing (most-significant) zero
/// bytes stripped, matching the canonical wire form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BigNumber {
    pub negative: bool,
    pub magnitude: Vec<u8>,
    pub exponent: i64,
}

impl BigNumber {
    /// Construct from a sign, little-endian magnitude, and exponent,
    /// stripping trailing zero bytes from the magnitude so the value is in
    /// canonical form.
    pub fn new(negative: bool, mut magnitude: Vec<u8>, exponent: i64) -> Self {
        while magnitude.last() == Some(&0) {
            magnitude.pop();
        }
        let negative = negative && !magnitude.is_empty();
        BigNumber {
            negative,
            magnitude,
            exponent,
        }
    }

    fn signed_length(&self) -> i64 {
        let len = self.magnitude.len() as i64;
        if self.negative {
            -len
        } else {
            len
        }
    }

    /// Render as `[-]<significand>[e<exp>]`, the `stringify` fallback
    /// format for out-of-range BigNumbers.
    pub fn to_decimal_string(&self) -> String {
        let mut digits = num_significand_decimal(&self.magnitude);
        if digits.is_empty() {
            digits = "0".to_string();
        }
        let mut s = String::new();
        if self.negative {
            s.push('-');
        }
        s.push_str(&digits);
        if self.exponent != 0 {
            s.push('e');
            s.push_str(&self.exponent.to_string());
        }
        s
    }

    /// Encode this value, subject to the configured exponent/magnitude
    /// caps: in range, emit the wire form; out of range under `stringify`,
    /// emit the decimal-string fallback as a short/long string value
    /// instead (handled by the caller, which needs the string bytes); out
    /// of range under `reject`, error.
    pub fn check_limits(&self, policy: &Policy) -> Result<(), Error> {
        let exp_ok = policy
            .max_bignumber_exponent_limit()
            .map_or(true, |limit| self.exponent.unsigned_abs() <= limit);
        let mag_ok = policy
            .max_bignumber_magnitude_bytes_limit()
            .map_or(true, |limit| self.magnitude.len() <= limit);
        if exp_ok && mag_ok {
            return Ok(());
        }
        match policy.bignumber_out_of_range_policy() {
            BignumberOutOfRangePolicy::Stringify => Ok(()),
            BignumberOutOfRangePolicy::Reject => {
                let kind = if !exp_ok {
                    ErrorKind::MaxBignumberExponentExceeded
                } else {
                    ErrorKind::MaxBignumberMagnitudeExceeded
                };
                Err(err!(
                    kind,
                    "bignumber exceeds configured limits (exponent={}, magnitude_bytes={})",
                    self.exponent,
                    self.magnitude.len()
                ))
            }
        }
    }

    /// `true` if this value is within policy limits and should use the
    /// wire BigNumber form rather than the stringify fallback.
    pub fn within_limits(&self, policy: &Policy) -> bool {
        policy
            .max_bignumber_exponent_limit()
            .map_or(true, |limit| self.exponent.unsigned_abs() <= limit)
            && policy
                .max_bignumber_magnitude_bytes_limit()
                .map_or(true, |limit| self.magnitude.len() <= limit)
    }

    /// Encode the wire form (marker + zigzag exponent + zigzag signed
    /// length + magnitude bytes) onto `out`, without limit checking.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(Marker::BigNumber.into_u8());
        write_zigzag_leb128(self.exponent, out);
        write_zigzag_leb128(self.signed_length(), out);
        out.extend_from_slice(&self.magnitude);
    }

    /// Decode the payload following a [`Marker::BigNumber`] marker,
    /// returning the value and bytes consumed.
    pub fn decode(input: &[u8], policy: &Policy) -> Result<(BigNumber, usize), Error> {
        let mut offset = 0;
        let (exponent, n) = read_zigzag_leb128(&input[offset..])?;
        offset += n;
        let (signed_len, n) = read_zigzag_leb128(&input[offset..])?;
        offset += n;
        let negative = signed_len < 0;
        let len = signed_len.unsigned_abs() as usize;
        let magnitude = input
            .get(offset..offset + len)
            .ok_or_else(|| err!(ErrorKind::Truncated, "bignumber: need {} magnitude bytes", len))?
            .to_vec();
        offset += len;

        if magnitude.last() == Some(&0) {
            return Err(err!(
                ErrorKind::InvalidData,
                "bignumber: magnitude has a non-canonical trailing zero byte"
            ));
        }
        if len == 0 && negative {
            return Err(err!(
                ErrorKind::InvalidData,
                "bignumber: zero magnitude cannot be negative"
            ));
        }

        let value = BigNumber {
            negative,
            magnitude,
            exponent,
        };

        if !value.within_limits(policy) {
            value.check_limits(policy)?;
        }

        Ok((value, offset))
    }
}

fn num_significand_decimal(magnitude: &[u8]) -> String {
    if magnitude.is_empty() {
        return "0".to_string();
    }
    // Big-endian base-256 -> base-10 via repeated long division.
    let mut digits = magnitude.to_vec();
    let mut out = Vec::new();
    while digits.iter().any(|&b| b != 0) {
        let mut remainder: u32 = 0;
        for byte in digits.iter_mut().rev() {
            let acc = (remainder << 8) | *byte as u32;
            *byte = (acc / 10) as u8;
            remainder = acc % 10;
        }
        out.push(b'0' + remainder as u8);
        while digits.last() == Some(&0) {
            digits.pop();
        }
    }
    if out.is_empty() {
        return "0".to_string();
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_zero_bytes() {
        let bn = BigNumber::new(false, vec![1, 2, 0, 0], 0);
        assert_eq!(bn.magnitude, vec![1, 2]);
    }

    #[test]
    fn round_trips_through_wire_form() {
        let bn = BigNumber::new(true, vec![0xFF, 0x01], 7);
        let mut buf = Vec::new();
        bn.encode(&mut buf);
        let (decoded, consumed) = BigNumber::decode(&buf[1..], &Policy::new()).unwrap();
        assert_eq!(consumed, buf.len() - 1);
        assert_eq!(decoded, bn);
    }

    #[test]
    fn stringify_fallback_on_large_exponent() {
        let bn = BigNumber::new(false, vec![5], 200);
        let policy = Policy::new().max_bignumber_exponent(128);
        assert!(!bn.within_limits(&policy));
        assert_eq!(bn.to_decimal_string(), "5e200");
    }

    #[test]
    fn decimal_string_renders_multi_byte_magnitude() {
        // 0x0100 little-endian = 256
        let bn = BigNumber::new(false, vec![0x00, 0x01], 0);
        assert_eq!(bn.to_decimal_string(), "256");
    }

    #[test]
    fn reject_policy_errors_out_of_range() {
        let bn = BigNumber::new(false, vec![5], 200);
        let policy = Policy::new()
            .max_bignumber_exponent(128)
            .bignumber_out_of_range(BignumberOutOfRangePolicy::Reject);
        assert_eq!(
            bn.check_limits(&policy).unwrap_err().kind(),
            ErrorKind::MaxBignumberExponentExceeded
        );
    }
}
