//! String codec: short-inline, long single-chunk, and chunked long-string
//! forms, with UTF-8 validation/repair and optional NFC normalization.
use unicode_normalization::UnicodeNormalization;

use crate::error::{err, Error, ErrorKind};
use crate::marker::{Marker, SHORT_STRING_MAX_LEN};
use crate::policy::{InvalidUtf8Policy, NulInStringPolicy, Policy, UnicodeNormalizationPolicy};
use crate::varint::ChunkLength;

/// An implementation ceiling on the number of chunks a single chunked
/// string may have, per `spec.md` §4.2 ("at least 2^20").
pub const MAX_CHUNKS: usize = 1 << 20;

fn repair_utf8(bytes: &[u8], policy: &Policy) -> Result<String, Error> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Ok(s.to_string()),
        Err(_) => match policy.invalid_utf8_policy() {
            InvalidUtf8Policy::Reject => Err(err!(ErrorKind::InvalidUtf8, "invalid UTF-8 in string")),
            InvalidUtf8Policy::Replace => Ok(String::from_utf8_lossy(bytes).into_owned()),
            InvalidUtf8Policy::Delete => Ok(String::from_utf8_lossy(bytes)
                .chars()
                .filter(|&c| c != '\u{FFFD}')
                .collect()),
        },
    }
}

/// Check `s` against the NUL-in-string policy, without modifying it:
/// `allow` passes it through, `reject` fails if it contains a NUL byte.
/// Shared by the decode path ([`apply_nul_policy`]) and the encode path
/// ([`crate::element::encode_string`]), which must reject the same bytes
/// the decoder would.
pub(crate) fn check_nul_policy(s: &str, policy: &Policy) -> Result<(), Error> {
    if !s.contains('\0') {
        return Ok(());
    }
    match policy.nul_in_string_policy() {
        NulInStringPolicy::Allow => Ok(()),
        NulInStringPolicy::Reject => Err(err!(ErrorKind::NulInString, "NUL byte in string")),
    }
}

fn apply_nul_policy(s: String, policy: &Policy) -> Result<String, Error> {
    check_nul_policy(&s, policy)?;
    Ok(s)
}

fn apply_normalization(s: String, policy: &Policy) -> String {
    match policy.unicode_normalization_policy() {
        UnicodeNormalizationPolicy::None => s,
        UnicodeNormalizationPolicy::Nfc => s.nfc().collect(),
    }
}

/// Validate, repair, and normalize `bytes` per policy, producing the final
/// decoded string value.
pub fn finish_decoded_string(bytes: &[u8], policy: &Policy) -> Result<String, Error> {
    let s = repair_utf8(bytes, policy)?;
    let s = apply_nul_policy(s, policy)?;
    Ok(apply_normalization(s, policy))
}

/// Apply NFC normalization (if configured) to a string before encoding.
/// UTF-8 validity is guaranteed by `&str` itself, but a NUL byte is not —
/// callers must still run [`check_nul_policy`] before emitting.
pub fn prepare_for_encoding(s: &str, policy: &Policy) -> String {
    match policy.unicode_normalization_policy() {
        UnicodeNormalizationPolicy::None => s.to_string(),
        UnicodeNormalizationPolicy::Nfc => s.nfc().collect(),
    }
}

/// Encode `s` as a single (non-chunked) string value: short-string byte if
/// it fits, otherwise the long-string marker with one terminal chunk.
pub fn encode_string(s: &str, out: &mut Vec<u8>) {
    let bytes = s.as_bytes();
    if bytes.len() <= SHORT_STRING_MAX_LEN as usize {
        out.push(Marker::ShortString(bytes.len() as u8).into_u8());
        out.extend_from_slice(bytes);
        return;
    }
    out.push(Marker::String.into_u8());
    ChunkLength::new(bytes.len() as u64, false).encode(out);
    out.extend_from_slice(bytes);
}

/// Encode `s` as a sequence of chunks no larger than `chunk_size` bytes
/// each, using the long-string marker with continuation bits. Useful for
/// streaming producers that do not hold the whole string in memory.
pub fn encode_string_chunked(s: &str, chunk_size: usize, out: &mut Vec<u8>) {
    debug_assert!(chunk_size > 0);
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        out.push(Marker::String.into_u8());
        ChunkLength::new(0, false).encode(out);
        return;
    }
    out.push(Marker::String.into_u8());
    let mut offset = 0;
    while offset < bytes.len() {
        let end = (offset + chunk_size).min(bytes.len());
        let more = end < bytes.len();
        ChunkLength::new((end - offset) as u64, more).encode(out);
        out.extend_from_slice(&bytes[offset..end]);
        offset = end;
    }
}

/// Decode the payload following a [`Marker::ShortString`] marker: exactly
/// `len` bytes, UTF-8 validated/repaired/normalized per policy.
pub fn decode_short_string(input: &[u8], len: u8, policy: &Policy) -> Result<(String, usize), Error> {
    let len = len as usize;
    let bytes = input
        .get(..len)
        .ok_or_else(|| err!(ErrorKind::Truncated, "short string: need {} bytes", len))?;
    Ok((finish_decoded_string(bytes, policy)?, len))
}

/// Decode the payload following a [`Marker::String`] marker: one or more
/// length-codec-prefixed chunks, terminated by one with
/// `has_more_chunks = false`.
pub fn decode_long_string(input: &[u8], policy: &Policy) -> Result<(String, usize), Error> {
    let mut offset = 0;
    let mut raw = Vec::new();
    let mut chunk_count = 0usize;
    loop {
        let (chunk, consumed) = ChunkLength::decode(&input[offset..])?;
        offset += consumed;
        chunk_count += 1;
        if chunk_count > MAX_CHUNKS {
            return Err(err!(ErrorKind::TooManyChunks, "string exceeds {} chunks", MAX_CHUNKS));
        }
        if chunk.length == 0 && chunk.has_more_chunks {
            return Err(err!(
                ErrorKind::EmptyChunkContinuation,
                "zero-length chunk with continuation set"
            ));
        }
        let len = chunk.length as usize;
        if len > policy.max_string_length_limit().saturating_sub(raw.len()) {
            return Err(err!(
                ErrorKind::MaxStringLengthExceeded,
                "string exceeds max_string_length ({})",
                policy.max_string_length_limit()
            ));
        }
        let bytes = input
            .get(offset..offset + len)
            .ok_or_else(|| err!(ErrorKind::Truncated, "string chunk: need {} bytes", len))?;
        raw.extend_from_slice(bytes);
        offset += len;
        if !chunk.has_more_chunks {
            break;
        }
    }
    Ok((finish_decoded_string(&raw, policy)?, offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_string_matches_spec_vector() {
        let mut buf = Vec::new();
        encode_string("hello", &mut buf);
        assert_eq!(buf, vec![0x6a, 0x68, 0x65, 0x6c, 0x6c, 0x6f]);
    }

    #[test]
    fn short_string_round_trips_including_empty() {
        for s in ["", "a", &"x".repeat(66)] {
            let mut buf = Vec::new();
            encode_string(s, &mut buf);
            let marker = Marker::from_u8(buf[0]);
            let len = match marker {
                Marker::ShortString(l) => l,
                other => panic!("expected short string, got {:?}", other),
            };
            let (decoded, consumed) = decode_short_string(&buf[1..], len, &Policy::new()).unwrap();
            assert_eq!(decoded, s);
            assert_eq!(consumed, buf.len() - 1);
        }
    }

    #[test]
    fn long_string_used_past_66_bytes() {
        let s = "y".repeat(67);
        let mut buf = Vec::new();
        encode_string(&s, &mut buf);
        assert_eq!(Marker::from_u8(buf[0]), Marker::String);
        let (decoded, consumed) = decode_long_string(&buf[1..], &Policy::new()).unwrap();
        assert_eq!(decoded, s);
        assert_eq!(consumed, buf.len() - 1);
    }

    #[test]
    fn chunked_string_round_trips() {
        let s = "abcdefghij".repeat(10);
        let mut buf = Vec::new();
        encode_string_chunked(&s, 7, &mut buf);
        let (decoded, consumed) = decode_long_string(&buf[1..], &Policy::new()).unwrap();
        assert_eq!(decoded, s);
        assert_eq!(consumed, buf.len() - 1);
    }

    #[test]
    fn empty_chunk_continuation_rejected() {
        let mut buf = Vec::new();
        ChunkLength::new(0, true).encode(&mut buf);
        let err = decode_long_string(&buf, &Policy::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyChunkContinuation);
    }

    #[test]
    fn invalid_utf8_rejected_by_default() {
        let err = finish_decoded_string(&[0xff, 0xfe], &Policy::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidUtf8);
    }

    #[test]
    fn invalid_utf8_replaced_when_policy_allows() {
        let policy = Policy::new().invalid_utf8(InvalidUtf8Policy::Replace);
        let s = finish_decoded_string(&[0xff, 0xfe], &policy).unwrap();
        assert!(s.contains('\u{FFFD}'));
    }

    #[test]
    fn nul_rejected_unless_allowed() {
        let policy = Policy::new().nul_in_string(NulInStringPolicy::Reject);
        let err = finish_decoded_string(b"a\0b", &policy).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NulInString);
    }

    #[test]
    fn invalid_utf8_deleted_when_policy_requests_it() {
        let policy = Policy::new().invalid_utf8(InvalidUtf8Policy::Delete);
        let s = finish_decoded_string(b"a\xffb", &policy).unwrap();
        assert_eq!(s, "ab");
    }
}
