//! The stream encoder (C5): a growable byte buffer plus a container stack,
//! exposing the producer-side operations the value tree (or an adapter
//! layer, out of scope here) drives.
use std::collections::HashSet;

use crate::element;
use crate::error::{err, Error, ErrorKind};
use crate::integer::Integer;
use crate::marker::{Marker, TypedArrayElement};
use crate::policy::{DuplicateKeyPolicy, Policy};
use crate::record::{self, RecordDefinition};
use crate::value::Value;
use crate::varint::ChunkLength;

/// Initial buffer capacity, matching the floor `spec.md` §4.5 requires
/// ("doubling from an initial capacity (>=256 bytes)").
const INITIAL_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ContainerKind {
    Array,
    Object,
    RecordInstance,
}

struct Frame {
    kind: ContainerKind,
    element_count: usize,
    /// For `Object`/`RecordInstance`: whether the next write must be a key
    /// (object) or we're mid-pair (object only; record instances take
    /// values only, keys come from the definition).
    expect_key: bool,
    /// Keys already written to this object, when `duplicate_key = reject`;
    /// `None` for non-object frames and whenever the policy allows repeats.
    seen_keys: Option<HashSet<String>>,
}

/// A stream encoder: serializes a document one operation at a time onto an
/// internal buffer, enforcing the policy's limits as it goes.
pub struct Encoder {
    buf: Vec<u8>,
    policy: Policy,
    stack: Vec<Frame>,
    definitions: Vec<RecordDefinition>,
    root_written: bool,
}

impl Encoder {
    /// Start a new document under `policy`.
    pub fn begin_document(policy: Policy) -> Self {
        Encoder {
            buf: Vec::with_capacity(INITIAL_CAPACITY),
            policy,
            stack: Vec::new(),
            definitions: Vec::new(),
            root_written: false,
        }
    }

    /// Finish the document, returning the encoded bytes. Fails if any
    /// container is still open, or if no root value was ever written.
    pub fn end_document(self) -> Result<Vec<u8>, Error> {
        if !self.stack.is_empty() {
            return Err(err!(
                ErrorKind::UnclosedContainer,
                "end_document: {} container(s) still open",
                self.stack.len()
            ));
        }
        if !self.root_written {
            return Err(err!(ErrorKind::InvalidData, "end_document: no root value was written"));
        }
        Ok(self.buf)
    }

    fn check_document_size(&self) -> Result<(), Error> {
        if self.buf.len() > self.policy.max_document_size_limit() {
            return Err(err!(
                ErrorKind::MaxDocumentSizeExceeded,
                "document exceeds max_document_size ({})",
                self.policy.max_document_size_limit()
            ));
        }
        Ok(())
    }

    /// Called before writing any value (scalar or container-begin): checks
    /// that writing a value here is syntactically allowed (single root,
    /// object key/value alternation) and bumps bookkeeping.
    fn before_value(&mut self, is_key: bool) -> Result<(), Error> {
        if self.stack.is_empty() {
            if self.root_written {
                return Err(err!(
                    ErrorKind::InvalidData,
                    "a document may contain only one root value"
                ));
            }
            return Ok(());
        }
        let top = self.stack.last_mut().unwrap();
        match top.kind {
            ContainerKind::Array => {}
            ContainerKind::Object => {
                if top.expect_key != is_key {
                    let kind = if top.expect_key {
                        ErrorKind::InvalidObjectKey
                    } else {
                        ErrorKind::InvalidData
                    };
                    return Err(err!(
                        kind,
                        "object write out of key/value alternation (expected {})",
                        if top.expect_key { "key" } else { "value" }
                    ));
                }
            }
            ContainerKind::RecordInstance => {}
        }
        Ok(())
    }

    /// Called after a value (scalar, or a just-closed container) is fully
    /// written: advances the element count and, in an object, flips the
    /// key/value expectation.
    fn after_value(&mut self) -> Result<(), Error> {
        if self.stack.is_empty() {
            self.root_written = true;
            return self.check_document_size();
        }
        let max_container_size = self.policy.max_container_size_limit();
        let top = self.stack.last_mut().unwrap();
        top.element_count += 1;
        if top.element_count > max_container_size {
            return Err(err!(
                ErrorKind::MaxContainerSizeExceeded,
                "container exceeds max_container_size ({})",
                max_container_size
            ));
        }
        if top.kind == ContainerKind::Object {
            top.expect_key = !top.expect_key;
        }
        self.check_document_size()
    }

    pub fn write_null(&mut self) -> Result<(), Error> {
        self.before_value(false)?;
        element::encode_null(&mut self.buf);
        self.after_value()
    }

    pub fn write_bool(&mut self, v: bool) -> Result<(), Error> {
        self.before_value(false)?;
        element::encode_bool(v, &mut self.buf);
        self.after_value()
    }

    pub fn write_int(&mut self, v: impl Into<Integer>) -> Result<(), Error> {
        self.before_value(false)?;
        element::encode_int(&v.into(), &mut self.buf);
        self.after_value()
    }

    pub fn write_float(&mut self, v: f64) -> Result<(), Error> {
        self.before_value(false)?;
        element::encode_float(v, &self.policy, &mut self.buf)?;
        self.after_value()
    }

    pub fn write_bignumber(&mut self, negative: bool, magnitude: Vec<u8>, exponent: i64) -> Result<(), Error> {
        self.before_value(false)?;
        let bn = crate::bignumber::BigNumber::new(negative, magnitude, exponent);
        element::encode_bignumber(&bn, &self.policy, &mut self.buf)?;
        self.after_value()
    }

    pub fn write_string(&mut self, s: &str) -> Result<(), Error> {
        self.before_value(false)?;
        element::encode_string(s, &self.policy, &mut self.buf)?;
        self.after_value()
    }

    /// Write an object key. Only valid when the current container is an
    /// object expecting a key. Under `duplicate_key = reject`, a key equal
    /// to one already written to this object fails with `duplicate_key`.
    pub fn write_key(&mut self, key: &str) -> Result<(), Error> {
        self.before_value(true)?;
        if let Some(top) = self.stack.last_mut() {
            if let Some(seen) = top.seen_keys.as_mut() {
                if !seen.insert(key.to_string()) {
                    return Err(err!(ErrorKind::DuplicateKey, "duplicate object key {:?}", key));
                }
            }
        }
        element::encode_string(key, &self.policy, &mut self.buf)?;
        self.after_value()
    }

    fn push_container(&mut self, kind: ContainerKind) -> Result<(), Error> {
        if self.stack.len() >= self.policy.max_depth_limit() {
            return Err(err!(
                ErrorKind::MaxDepthExceeded,
                "nesting exceeds max_depth ({})",
                self.policy.max_depth_limit()
            ));
        }
        self.before_value(false)?;
        let seen_keys = if kind == ContainerKind::Object && self.policy.duplicate_key_policy() == DuplicateKeyPolicy::Reject
        {
            Some(HashSet::new())
        } else {
            None
        };
        self.stack.push(Frame {
            kind,
            element_count: 0,
            expect_key: kind == ContainerKind::Object,
            seen_keys,
        });
        Ok(())
    }

    pub fn begin_array(&mut self) -> Result<(), Error> {
        self.push_container(ContainerKind::Array)?;
        self.buf.push(Marker::ArrayBegin.into_u8());
        Ok(())
    }

    pub fn begin_object(&mut self) -> Result<(), Error> {
        self.push_container(ContainerKind::Object)?;
        self.buf.push(Marker::ObjectBegin.into_u8());
        Ok(())
    }

    /// Close the innermost open container.
    pub fn end_container(&mut self) -> Result<(), Error> {
        let top = self.stack.pop().ok_or_else(|| {
            err!(ErrorKind::UnclosedContainer, "end_container: no container is open")
        })?;
        if top.kind == ContainerKind::Object && !top.expect_key {
            return Err(err!(
                ErrorKind::InvalidData,
                "end_container: object closed with a dangling key"
            ));
        }
        self.buf.push(Marker::ContainerEnd.into_u8());
        self.after_value()
    }

    /// Close every open container, in innermost-first order.
    pub fn end_all_containers(&mut self) -> Result<(), Error> {
        while !self.stack.is_empty() {
            self.end_container()?;
        }
        Ok(())
    }

    /// Define a record schema from an explicit key list, returning the
    /// definition index to pass to [`Encoder::begin_record_instance`].
    ///
    /// A definition is metadata, not a value: like the instances that
    /// follow it, it doesn't count against the enclosing container's
    /// `max_container_size` and isn't itself a child when the document is
    /// later scanned back.
    pub fn write_record_def(&mut self, keys: &[String]) -> Result<usize, Error> {
        self.before_value(false)?;
        self.write_record_def_uncounted(keys)
    }

    /// Begin an instance of a previously-defined record. The caller must
    /// write exactly `definitions[def_index].keys.len()` values (in key
    /// order, via `write_*`/`begin_*` calls with the key omitted) and then
    /// call `end_container`.
    pub fn begin_record_instance(&mut self, def_index: usize) -> Result<(), Error> {
        if self.definitions.get(def_index).is_none() {
            return Err(err!(
                ErrorKind::InvalidData,
                "begin_record_instance: no definition at index {}",
                def_index
            ));
        }
        self.push_container(ContainerKind::RecordInstance)?;
        record::encode_instance_header(def_index as u64, &mut self.buf);
        Ok(())
    }

    /// Encode a complete value tree at the current position. This is the
    /// entry point record mode is detected from: an `Array` of two or
    /// more `Object`s sharing identical key name-and-order is emitted as a
    /// record definition followed by key-less instances; anything else
    /// encodes the straightforward way.
    pub fn write_value(&mut self, value: &Value) -> Result<(), Error> {
        match value {
            Value::Null => self.write_null(),
            Value::Bool(v) => self.write_bool(*v),
            Value::Int(v) => {
                self.before_value(false)?;
                element::encode_int(v, &mut self.buf);
                self.after_value()
            }
            Value::Float(v) => self.write_float(*v),
            Value::BigNumber(bn) => {
                self.before_value(false)?;
                element::encode_bignumber(bn, &self.policy, &mut self.buf)?;
                self.after_value()
            }
            Value::Str(s) => self.write_string(s),
            Value::Array(items) => self.write_array_value(items),
            Value::Object(pairs) => {
                self.begin_object()?;
                for (k, v) in pairs {
                    self.write_key(k)?;
                    self.write_value(v)?;
                }
                self.end_container()
            }
        }
    }

    fn write_array_value(&mut self, items: &[Value]) -> Result<(), Error> {
        let object_slices: Option<Vec<&[(String, Value)]>> = items
            .iter()
            .map(|v| match v {
                Value::Object(pairs) => Some(pairs.as_slice()),
                _ => None,
            })
            .collect();

        if let Some(objects) = object_slices {
            if let Some(schema) = record::detect_homogeneous_schema(&objects) {
                return self.write_record_array(&schema, &objects);
            }
        }

        self.begin_array()?;
        for item in items {
            self.write_value(item)?;
        }
        self.end_container()
    }

    /// Write the header (marker + element count) of a typed array, leaving
    /// the caller to append the packed little-endian payload.
    fn begin_typed_array(&mut self, element: TypedArrayElement, count: usize) -> Result<(), Error> {
        self.before_value(false)?;
        if count > self.policy.max_container_size_limit() {
            return Err(err!(
                ErrorKind::MaxContainerSizeExceeded,
                "typed array exceeds max_container_size ({})",
                self.policy.max_container_size_limit()
            ));
        }
        self.buf.push(Marker::TypedArray(element).into_u8());
        ChunkLength::new(count as u64, false).encode(&mut self.buf);
        Ok(())
    }

    /// Batch-encode a typed array of signed 8-bit integers: one type code,
    /// one length-codec payload, then the packed elements, without
    /// per-element dispatch.
    pub fn write_typed_array_i8(&mut self, values: &[i8]) -> Result<(), Error> {
        self.begin_typed_array(TypedArrayElement::I8, values.len())?;
        self.buf.extend(values.iter().map(|&v| v as u8));
        self.after_value()
    }

    pub fn write_typed_array_i16(&mut self, values: &[i16]) -> Result<(), Error> {
        self.begin_typed_array(TypedArrayElement::I16, values.len())?;
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        self.after_value()
    }

    pub fn write_typed_array_i32(&mut self, values: &[i32]) -> Result<(), Error> {
        self.begin_typed_array(TypedArrayElement::I32, values.len())?;
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        self.after_value()
    }

    pub fn write_typed_array_i64(&mut self, values: &[i64]) -> Result<(), Error> {
        self.begin_typed_array(TypedArrayElement::I64, values.len())?;
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        self.after_value()
    }

    pub fn write_typed_array_u8(&mut self, values: &[u8]) -> Result<(), Error> {
        self.begin_typed_array(TypedArrayElement::U8, values.len())?;
        self.buf.extend_from_slice(values);
        self.after_value()
    }

    pub fn write_typed_array_u16(&mut self, values: &[u16]) -> Result<(), Error> {
        self.begin_typed_array(TypedArrayElement::U16, values.len())?;
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        self.after_value()
    }

    pub fn write_typed_array_u32(&mut self, values: &[u32]) -> Result<(), Error> {
        self.begin_typed_array(TypedArrayElement::U32, values.len())?;
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        self.after_value()
    }

    pub fn write_typed_array_u64(&mut self, values: &[u64]) -> Result<(), Error> {
        self.begin_typed_array(TypedArrayElement::U64, values.len())?;
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        self.after_value()
    }

    pub fn write_typed_array_f32(&mut self, values: &[f32]) -> Result<(), Error> {
        self.begin_typed_array(TypedArrayElement::F32, values.len())?;
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        self.after_value()
    }

    pub fn write_typed_array_f64(&mut self, values: &[f64]) -> Result<(), Error> {
        self.begin_typed_array(TypedArrayElement::F64, values.len())?;
        for v in values {
            self.buf.extend_from_slice(&v.to_le_bytes());
        }
        self.after_value()
    }

    /// Batch-encode a typed array of bools: one byte per element (`0x00`/
    /// `0x01`), no bit-packing, keeping every typed-array element at a
    /// fixed, directly indexable width.
    pub fn write_typed_array_bool(&mut self, values: &[bool]) -> Result<(), Error> {
        self.begin_typed_array(TypedArrayElement::Bool, values.len())?;
        self.buf.extend(values.iter().map(|&v| v as u8));
        self.after_value()
    }

    /// Write a record definition without participating in the enclosing
    /// container's element-count bookkeeping — used only by
    /// [`Encoder::write_record_array`], where the definition is metadata
    /// that precedes the array's instances rather than one of its
    /// elements.
    fn write_record_def_uncounted(&mut self, keys: &[String]) -> Result<usize, Error> {
        record::encode_definition(keys, &self.policy, &mut self.buf)?;
        self.definitions.push(RecordDefinition { keys: keys.to_vec() });
        Ok(self.definitions.len() - 1)
    }

    /// Encode `objects` as an array whose elements all share `schema`:
    /// `ArrayBegin`, one record definition, one record instance per
    /// object, `ContainerEnd` — the same outer shape a plain array of
    /// those objects would have.
    fn write_record_array(&mut self, schema: &[String], objects: &[&[(String, Value)]]) -> Result<(), Error> {
        self.begin_array()?;
        let def_index = self.write_record_def_uncounted(schema)?;
        for obj in objects {
            self.begin_record_instance(def_index)?;
            for (_, v) in obj.iter() {
                self.write_value(v)?;
            }
            self.end_container()?;
        }
        self.end_container()
    }
}
