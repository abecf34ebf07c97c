//! The single-pass scanner (C6): reads an encoded byte buffer front to
//! back exactly once, emitting position-map entries (C7's storage unit).
use std::collections::HashSet;

use crate::bignumber::BigNumber;
use crate::element::{self, Scalar};
use crate::error::{err, Error, ErrorKind};
use crate::marker::{Marker, TypedArrayElement};
use crate::policy::{DuplicateKeyPolicy, Policy, TrailingBytesPolicy};
use crate::record;
use crate::string;
use crate::varint::ChunkLength;

/// A string entry's storage: a zero-copy span into the input buffer when
/// the raw bytes already equal the final (repaired/normalized) string, or
/// an owned `String` when they don't (a repair, a normalization, or a
/// multi-chunk string whose bytes aren't contiguous in the input).
#[derive(Clone, Debug, PartialEq)]
pub enum StringEntry {
    Span { offset: usize, length: usize },
    Owned(String),
}

/// What kind of node a position-map [`Entry`] describes.
#[derive(Clone, Debug, PartialEq)]
pub enum EntryKind {
    Null,
    Bool(bool),
    Int(crate::integer::Integer),
    Float(f64),
    BigNumber(BigNumber),
    Str(StringEntry),
    Array { first_child: usize, element_count: usize },
    /// `element_count` is twice the pair count; children alternate
    /// key, value. A decoded record instance produces the same shape.
    Object { first_child: usize, element_count: usize },
    TypedArray {
        element: TypedArrayElement,
        first_child: usize,
        element_count: usize,
    },
}

/// One position-map entry: a node's value plus its precomputed subtree
/// size, which makes `next_sibling(i) = i + subtree_size` an O(1)
/// sibling-traversal step.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    pub kind: EntryKind,
    pub subtree_size: usize,
}

struct Frame {
    start_index: usize,
    is_object: bool,
    expect_key: bool,
    children: usize,
    /// Decoded keys seen so far in this object/record-instance, used only
    /// to enforce `duplicate_key = reject` at scan time; `keep_first`/
    /// `keep_last` are resolved later by the reader.
    seen_keys: Option<HashSet<String>>,
}

struct Scanner<'a> {
    input: &'a [u8],
    policy: &'a Policy,
    entries: Vec<Entry>,
    stack: Vec<Frame>,
    /// Key spans captured from each `record_def` encountered, in
    /// declaration order, so `record_instance` bodies can reuse the same
    /// byte spans as their object-equivalent key entries.
    definitions: Vec<Vec<(usize, usize)>>,
}

impl<'a> Scanner<'a> {
    fn push_leaf(&mut self, kind: EntryKind) -> Result<(), Error> {
        self.entries.push(Entry { kind, subtree_size: 1 });
        self.after_child()
    }

    fn after_child(&mut self) -> Result<(), Error> {
        if let Some(top) = self.stack.last_mut() {
            top.children += 1;
            if top.children > self.policy.max_container_size_limit() {
                return Err(err!(
                    ErrorKind::MaxContainerSizeExceeded,
                    "container exceeds max_container_size ({})",
                    self.policy.max_container_size_limit()
                ));
            }
            if top.is_object {
                top.expect_key = !top.expect_key;
            }
        }
        Ok(())
    }

    fn record_key(&mut self, key: &str) -> Result<(), Error> {
        let top = self.stack.last_mut().unwrap();
        if let Some(seen) = top.seen_keys.as_mut() {
            if !seen.insert(key.to_string()) {
                return Err(err!(ErrorKind::DuplicateKey, "duplicate object key {:?}", key));
            }
        }
        Ok(())
    }

    fn push_container(&mut self, is_object: bool) -> Result<usize, Error> {
        if self.stack.len() >= self.policy.max_depth_limit() {
            return Err(err!(
                ErrorKind::MaxDepthExceeded,
                "nesting exceeds max_depth ({})",
                self.policy.max_depth_limit()
            ));
        }
        let start_index = self.entries.len();
        // Placeholder; filled in once the container is popped and its
        // element count is known.
        self.entries.push(Entry {
            kind: EntryKind::Array { first_child: start_index + 1, element_count: 0 },
            subtree_size: 0,
        });
        let seen_keys = if is_object && self.policy.duplicate_key_policy() == DuplicateKeyPolicy::Reject {
            Some(HashSet::new())
        } else {
            None
        };
        self.stack.push(Frame {
            start_index,
            is_object,
            expect_key: is_object,
            children: 0,
            seen_keys,
        });
        Ok(start_index)
    }

    fn pop_container(&mut self, is_object: bool) -> Result<(), Error> {
        let top = self
            .stack
            .pop()
            .ok_or_else(|| err!(ErrorKind::UnclosedContainer, "container end with nothing open"))?;
        if top.is_object != is_object {
            return Err(err!(ErrorKind::InvalidData, "container end does not match its opener"));
        }
        if is_object && !top.expect_key {
            return Err(err!(
                ErrorKind::InvalidData,
                "object closed with a dangling key (odd element count)"
            ));
        }
        let kind = if is_object {
            EntryKind::Object {
                first_child: top.start_index + 1,
                element_count: top.children,
            }
        } else {
            EntryKind::Array {
                first_child: top.start_index + 1,
                element_count: top.children,
            }
        };
        self.entries[top.start_index].kind = kind;
        self.after_child()
    }

    /// Decode the string value at `pos` (a `ShortString` or `String`
    /// marker byte), producing a zero-copy [`StringEntry::Span`] when the
    /// raw bytes already equal the final repaired/normalized string, or
    /// [`StringEntry::Owned`] otherwise. Returns the entry and the total
    /// bytes consumed, marker byte included.
    fn decode_string_entry(&self, pos: usize) -> Result<(StringEntry, usize), Error> {
        let marker = Marker::from_u8(self.byte_at(pos)?);
        match marker {
            Marker::ShortString(len) => {
                let raw_off = pos + 1;
                let raw_len = len as usize;
                let raw = self.slice_at(raw_off, raw_len)?;
                let decoded = string::finish_decoded_string(raw, self.policy)?;
                let entry = if decoded.as_bytes() == raw {
                    StringEntry::Span { offset: raw_off, length: raw_len }
                } else {
                    StringEntry::Owned(decoded)
                };
                Ok((entry, 1 + raw_len))
            }
            Marker::String => {
                let (decoded, consumed) = string::decode_long_string(&self.input[pos + 1..], self.policy)?;
                let (chunk, chunk_hdr_len) = ChunkLength::decode(&self.input[pos + 1..])?;
                let raw_off = pos + 1 + chunk_hdr_len;
                let raw_len = chunk.length as usize;
                let single_chunk = !chunk.has_more_chunks && chunk_hdr_len + raw_len == consumed;
                if single_chunk {
                    if let Some(raw) = self.input.get(raw_off..raw_off + raw_len) {
                        if decoded.as_bytes() == raw {
                            return Ok((StringEntry::Span { offset: raw_off, length: raw_len }, 1 + consumed));
                        }
                    }
                }
                Ok((StringEntry::Owned(decoded), 1 + consumed))
            }
            other => Err(err!(ErrorKind::InvalidObjectKey, "expected a string, found {:?}", other)),
        }
    }

    fn string_entry_text<'b>(&self, entry: &'b StringEntry) -> Result<std::borrow::Cow<'b, str>, Error>
    where
        'a: 'b,
    {
        Ok(match entry {
            StringEntry::Span { offset, length } => std::borrow::Cow::Borrowed(
                std::str::from_utf8(&self.input[*offset..*offset + *length])
                    .map_err(|_| err!(ErrorKind::InvalidUtf8, "span does not hold valid UTF-8"))?,
            ),
            StringEntry::Owned(s) => std::borrow::Cow::Borrowed(s.as_str()),
        })
    }

    /// Decode one value (scalar or container) starting at `offset`,
    /// returning the number of bytes consumed.
    fn scan_value(&mut self, offset: usize) -> Result<usize, Error> {
        let marker_byte = *self
            .input
            .get(offset)
            .ok_or_else(|| err!(ErrorKind::Truncated, "expected a value, ran out of bytes"))?;
        let marker = Marker::from_u8(marker_byte);
        let body = &self.input[offset + 1..];

        match marker {
            Marker::ArrayBegin => {
                self.push_container(false)?;
                let mut pos = offset + 1;
                loop {
                    if self.peek_is_end(pos)? {
                        pos += 1;
                        self.pop_container(false)?;
                        break;
                    }
                    pos += self.scan_value(pos)?;
                }
                Ok(pos - offset)
            }
            Marker::ObjectBegin => {
                self.push_container(true)?;
                let mut pos = offset + 1;
                loop {
                    if self.peek_is_end(pos)? {
                        pos += 1;
                        self.pop_container(true)?;
                        break;
                    }
                    let is_key = self.stack.last().unwrap().expect_key;
                    if is_key {
                        let (entry, n) = self.decode_string_entry(pos)?;
                        let text = self.string_entry_text(&entry)?.into_owned();
                        self.record_key(&text)?;
                        self.push_leaf(EntryKind::Str(entry))?;
                        pos += n;
                    } else {
                        pos += self.scan_value(pos)?;
                    }
                }
                Ok(pos - offset)
            }
            Marker::RecordDefinitionBegin => {
                let (keys, n) = record::decode_definition_keys(body, self.policy)?;
                let spans = key_spans(body, keys.len())?;
                self.definitions.push(spans.into_iter().map(|(o, l)| (offset + 1 + o, l)).collect());
                // A definition itself is metadata, not a visible document
                // node; it does not occupy a position-map entry.
                Ok(1 + n)
            }
            Marker::RecordInstanceBegin => {
                let (def_index, n) = record::decode_instance_index(body)?;
                let key_spans = self
                    .definitions
                    .get(def_index as usize)
                    .ok_or_else(|| err!(ErrorKind::InvalidData, "record instance: unknown definition {}", def_index))?
                    .clone();
                self.push_container(true)?;
                let mut pos = offset + 1 + n;
                for (key_offset, key_length) in &key_spans {
                    let key_bytes = self
                        .input
                        .get(*key_offset..*key_offset + *key_length)
                        .ok_or_else(|| err!(ErrorKind::Truncated, "record instance: key span out of range"))?;
                    let decoded = string::finish_decoded_string(key_bytes, self.policy)?;
                    self.record_key(&decoded)?;
                    let entry = if decoded.as_bytes() == key_bytes {
                        StringEntry::Span { offset: *key_offset, length: *key_length }
                    } else {
                        StringEntry::Owned(decoded)
                    };
                    self.push_leaf(EntryKind::Str(entry))?;
                    pos += self.scan_value(pos)?;
                }
                if !self.peek_is_end(pos)? {
                    return Err(err!(
                        ErrorKind::InvalidData,
                        "record instance: value count does not match its definition"
                    ));
                }
                pos += 1;
                self.pop_container(true)?;
                Ok(pos - offset)
            }
            Marker::ShortString(_) | Marker::String => {
                let (entry, n) = self.decode_string_entry(offset)?;
                self.push_leaf(EntryKind::Str(entry))?;
                Ok(n)
            }
            Marker::TypedArray(element_kind) => {
                let (count, n) = ChunkLength::decode(body)?;
                let count = count.length as usize;
                if count > self.policy.max_container_size_limit() {
                    return Err(err!(
                        ErrorKind::MaxContainerSizeExceeded,
                        "typed array exceeds max_container_size ({})",
                        self.policy.max_container_size_limit()
                    ));
                }
                let start_index = self.entries.len();
                self.entries.push(Entry {
                    kind: EntryKind::TypedArray {
                        element: element_kind,
                        first_child: start_index + 1,
                        element_count: count,
                    },
                    subtree_size: 0,
                });
                let mut pos = offset + 1 + n;
                for _ in 0..count {
                    let consumed = self.decode_typed_element(element_kind, pos)?;
                    pos += consumed;
                }
                self.after_child()?;
                Ok(pos - offset)
            }
            _ => {
                let (scalar, n) = element::decode_scalar(marker, body, self.policy)?;
                self.push_leaf(scalar_to_entry(scalar))?;
                Ok(1 + n)
            }
        }
    }

    fn decode_typed_element(&mut self, element_kind: TypedArrayElement, pos: usize) -> Result<usize, Error> {
        use TypedArrayElement::*;
        let width = element_kind.byte_width();
        let kind = match element_kind {
            Bool => {
                let byte = self.byte_at(pos)?;
                EntryKind::Bool(byte != 0)
            }
            I8 | I16 | I32 | I64 => {
                let w = width.unwrap();
                let bytes = self.slice_at(pos, w)?;
                let mut buf = [0u8; 8];
                buf[..w].copy_from_slice(bytes);
                if w < 8 && bytes[w - 1] & 0x80 != 0 {
                    for b in &mut buf[w..] {
                        *b = 0xFF;
                    }
                }
                EntryKind::Int(crate::integer::Integer::from(i64::from_le_bytes(buf)))
            }
            U8 | U16 | U32 | U64 => {
                let w = width.unwrap();
                let bytes = self.slice_at(pos, w)?;
                let mut buf = [0u8; 8];
                buf[..w].copy_from_slice(bytes);
                EntryKind::Int(crate::integer::Integer::from(u64::from_le_bytes(buf)))
            }
            F32 => {
                let bytes = self.slice_at(pos, 4)?;
                let mut buf = [0u8; 4];
                buf.copy_from_slice(bytes);
                EntryKind::Float(f32::from_le_bytes(buf) as f64)
            }
            F64 => {
                let bytes = self.slice_at(pos, 8)?;
                let mut buf = [0u8; 8];
                buf.copy_from_slice(bytes);
                EntryKind::Float(f64::from_le_bytes(buf))
            }
        };
        self.entries.push(Entry { kind, subtree_size: 1 });
        Ok(width.unwrap_or(1))
    }

    fn byte_at(&self, offset: usize) -> Result<u8, Error> {
        self.input
            .get(offset)
            .copied()
            .ok_or_else(|| err!(ErrorKind::Truncated, "ran out of bytes at offset {}", offset))
    }

    fn slice_at(&self, offset: usize, len: usize) -> Result<&'a [u8], Error> {
        self.input
            .get(offset..offset + len)
            .ok_or_else(|| err!(ErrorKind::Truncated, "need {} bytes at offset {}", len, offset))
    }

    fn peek_is_end(&self, offset: usize) -> Result<bool, Error> {
        Ok(Marker::from_u8(self.byte_at(offset)?) == Marker::ContainerEnd)
    }
}

fn scalar_to_entry(scalar: Scalar) -> EntryKind {
    match scalar {
        Scalar::Null => EntryKind::Null,
        Scalar::Bool(v) => EntryKind::Bool(v),
        Scalar::Int(v) => EntryKind::Int(v),
        Scalar::Float(v) => EntryKind::Float(v),
        Scalar::BigNumber(v) => EntryKind::BigNumber(v),
        // Reachable only for a BigNumber found out of policy range under
        // `stringify`: `ShortString`/`String` markers are intercepted
        // earlier in `scan_value` and never reach `decode_scalar`.
        Scalar::Str(s) => EntryKind::Str(StringEntry::Owned(s)),
    }
}

/// Re-walk a sequence of string-marker entries to find each one's
/// `(offset, length)` span relative to the start of `body`, without
/// re-running UTF-8 repair/normalization (that already happened once in
/// [`record::decode_definition_keys`]).
fn key_spans(body: &[u8], count: usize) -> Result<Vec<(usize, usize)>, Error> {
    let mut spans = Vec::with_capacity(count);
    let mut pos = 0;
    for _ in 0..count {
        let marker = Marker::from_u8(*body.get(pos).ok_or_else(|| err!(ErrorKind::Truncated, "record def key"))?);
        match marker {
            Marker::ShortString(len) => {
                spans.push((pos + 1, len as usize));
                pos += 1 + len as usize;
            }
            Marker::String => {
                let (chunk, n) = ChunkLength::decode(&body[pos + 1..])?;
                spans.push((pos + 1 + n, chunk.length as usize));
                pos += 1 + n + chunk.length as usize;
            }
            _ => return Err(err!(ErrorKind::InvalidObjectKey, "record definition key must be a string")),
        }
    }
    Ok(spans)
}

fn finalize_subtree_sizes(entries: &mut [Entry]) {
    for i in (0..entries.len()).rev() {
        let (first_child, element_count) = match entries[i].kind {
            EntryKind::Array { first_child, element_count }
            | EntryKind::Object { first_child, element_count }
            | EntryKind::TypedArray { first_child, element_count, .. } => (first_child, element_count),
            _ => continue,
        };
        let mut idx = first_child;
        let mut total = 1usize;
        for _ in 0..element_count {
            total += entries[idx].subtree_size;
            idx += entries[idx].subtree_size;
        }
        entries[i].subtree_size = total;
    }
}

/// Scan `input` under `policy`, producing the full position-map entry
/// table (preorder, subtree sizes finalized).
pub(crate) fn scan(input: &[u8], policy: &Policy) -> Result<Vec<Entry>, Error> {
    if input.len() > policy.max_document_size_limit() {
        return Err(err!(
            ErrorKind::MaxDocumentSizeExceeded,
            "document of {} bytes exceeds max_document_size ({})",
            input.len(),
            policy.max_document_size_limit()
        ));
    }
    let mut scanner = Scanner {
        input,
        policy,
        entries: Vec::new(),
        stack: Vec::new(),
        definitions: Vec::new(),
    };
    let consumed = scanner.scan_value(0)?;
    if !scanner.stack.is_empty() {
        return Err(err!(ErrorKind::UnclosedContainer, "document ended with an open container"));
    }
    if consumed < input.len() && policy.trailing_bytes_policy() == TrailingBytesPolicy::Reject {
        return Err(err!(
            ErrorKind::TrailingBytes,
            "{} byte(s) remain after the root value",
            input.len() - consumed
        ));
    }
    let mut entries = scanner.entries;
    finalize_subtree_sizes(&mut entries);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::value::Value;

    fn scan_value(v: &Value) -> Vec<Entry> {
        let mut enc = Encoder::begin_document(Policy::new());
        enc.write_value(v).unwrap();
        let bytes = enc.end_document().unwrap();
        scan(&bytes, &Policy::new()).unwrap()
    }

    #[test]
    fn scalar_produces_one_entry() {
        let entries = scan_value(&Value::from(42i64));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].subtree_size, 1);
    }

    #[test]
    fn array_subtree_size_covers_all_descendants() {
        let v = Value::Array(vec![Value::from(1i64), Value::Array(vec![Value::from(2i64), Value::from(3i64)])]);
        let entries = scan_value(&v);
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].subtree_size, 5);
    }

    #[test]
    fn short_string_decodes_as_a_zero_copy_span() {
        let entries = scan_value(&Value::from("hello"));
        match &entries[0].kind {
            EntryKind::Str(StringEntry::Span { length, .. }) => assert_eq!(*length, 5),
            other => panic!("expected a span, got {:?}", other),
        }
    }

    #[test]
    fn trailing_bytes_rejected_by_default() {
        let mut enc = Encoder::begin_document(Policy::new());
        enc.write_int(1i64).unwrap();
        let mut bytes = enc.end_document().unwrap();
        bytes.push(0);
        let err = scan(&bytes, &Policy::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TrailingBytes);
    }

    #[test]
    fn record_instance_decodes_like_an_object() {
        let make = |n: i64| Value::Object(vec![("id".into(), Value::from(n)), ("n".into(), Value::from("x"))]);
        let v = Value::Array(vec![make(1), make(2)]);
        let entries = scan_value(&v);
        match &entries[0].kind {
            EntryKind::Array { element_count, .. } => assert_eq!(*element_count, 2),
            other => panic!("expected array, got {:?}", other),
        }
        match &entries[1].kind {
            EntryKind::Object { element_count, .. } => assert_eq!(*element_count, 4),
            other => panic!("expected object-shaped record instance, got {:?}", other),
        }
    }

    #[test]
    fn duplicate_key_rejected_by_default() {
        let v = Value::Object(vec![
            ("a".into(), Value::from(1i64)),
            ("a".into(), Value::from(2i64)),
        ]);
        let mut enc = Encoder::begin_document(Policy::new());
        enc.write_value(&v).unwrap();
        let bytes = enc.end_document().unwrap();
        let err = scan(&bytes, &Policy::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateKey);
    }

    #[test]
    fn typed_array_scans_into_primitive_entries() {
        let mut buf = Vec::new();
        buf.push(Marker::TypedArray(TypedArrayElement::I8).into_u8());
        ChunkLength::new(2, false).encode(&mut buf);
        buf.push(1);
        buf.push(0xff);
        let entries = scan(&buf, &Policy::new()).unwrap();
        assert_eq!(entries.len(), 3);
        match &entries[0].kind {
            EntryKind::TypedArray { element, element_count, .. } => {
                assert_eq!(*element, TypedArrayElement::I8);
                assert_eq!(*element_count, 2);
            }
            other => panic!("expected typed array, got {:?}", other),
        }
        assert_eq!(entries[0].subtree_size, 3);
        assert_eq!(entries[1].kind, EntryKind::Int(crate::integer::Integer::from(1i64)));
        assert_eq!(entries[2].kind, EntryKind::Int(crate::integer::Integer::from(-1i64)));
    }

    #[test]
    fn out_of_range_bignumber_scans_as_a_string_entry_under_stringify() {
        use crate::bignumber::BigNumber;
        use crate::policy::BignumberOutOfRangePolicy;

        let policy = Policy::new()
            .max_bignumber_exponent(10)
            .bignumber_out_of_range(BignumberOutOfRangePolicy::Stringify);
        let mut buf = Vec::new();
        BigNumber::new(false, vec![5], 200).encode(&mut buf);
        let entries = scan(&buf, &policy).unwrap();
        assert_eq!(entries.len(), 1);
        match &entries[0].kind {
            EntryKind::Str(StringEntry::Owned(s)) => assert_eq!(s, "5e200"),
            other => panic!("expected an owned string entry, got {:?}", other),
        }
    }
}
