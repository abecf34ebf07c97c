//! Random-access reader (C8): entry lookup, keyed child lookup, and typed
//! batch readers layered on top of the position map's entry table.
use std::borrow::Cow;

use crate::bignumber::BigNumber;
use crate::error::{err, Error, ErrorKind, PathSegment};
use crate::integer::Integer;
use crate::policy::DuplicateKeyPolicy;
use crate::position_map::PositionMap;
use crate::scanner::{EntryKind, StringEntry};
use crate::value::Value;

/// Number of key/value pairs at or below which `object_lookup` uses a
/// linear scan instead of building a hash map.
const LINEAR_SCAN_THRESHOLD: usize = 12;

/// The kind of value an entry holds, returned by [`PositionMap::type_of`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeTag {
    Null,
    Bool,
    Int,
    Float,
    BigNumber,
    String,
    Array,
    Object,
}

/// A running cursor over a container's children, advancing in O(1) per
/// step by following the sibling table instead of re-walking from the
/// first child each time.
pub struct ChildCursor<'a> {
    map: &'a PositionMap,
    next: usize,
    remaining: usize,
}

impl<'a> Iterator for ChildCursor<'a> {
    type Item = usize;
    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.next;
        self.next = self.map.next_sibling(index);
        self.remaining -= 1;
        Some(index)
    }
}

/// A running cursor over an object's key/value pairs.
pub struct PairCursor<'a> {
    map: &'a PositionMap,
    next: usize,
    remaining_pairs: usize,
}

impl<'a> Iterator for PairCursor<'a> {
    type Item = (usize, usize);
    fn next(&mut self) -> Option<(usize, usize)> {
        if self.remaining_pairs == 0 {
            return None;
        }
        let key_index = self.next;
        let value_index = self.map.next_sibling(key_index);
        self.next = self.map.next_sibling(value_index);
        self.remaining_pairs -= 1;
        Some((key_index, value_index))
    }
}

fn type_mismatch(expected: &str, index: usize) -> Error {
    err!(ErrorKind::TypeMismatch, "entry {} is not a {}", index, expected).with_offset(index)
}

impl PositionMap {
    fn entry_or_err(&self, index: usize) -> Result<&EntryKind, Error> {
        Ok(&self
            .entry(index)
            .ok_or_else(|| err!(ErrorKind::InvalidData, "no entry at index {}", index))?
            .kind)
    }

    pub fn type_of(&self, index: usize) -> Result<TypeTag, Error> {
        Ok(match self.entry_or_err(index)? {
            EntryKind::Null => TypeTag::Null,
            EntryKind::Bool(_) => TypeTag::Bool,
            EntryKind::Int(_) => TypeTag::Int,
            EntryKind::Float(_) => TypeTag::Float,
            EntryKind::BigNumber(_) => TypeTag::BigNumber,
            EntryKind::Str(_) => TypeTag::String,
            EntryKind::Array { .. } => TypeTag::Array,
            EntryKind::Object { .. } => TypeTag::Object,
            EntryKind::TypedArray { .. } => TypeTag::Array,
        })
    }

    pub fn as_bool(&self, index: usize) -> Result<bool, Error> {
        match self.entry_or_err(index)? {
            EntryKind::Bool(v) => Ok(*v),
            _ => Err(type_mismatch("bool", index)),
        }
    }

    pub fn as_int(&self, index: usize) -> Result<Integer, Error> {
        match self.entry_or_err(index)? {
            EntryKind::Int(v) => Ok(*v),
            _ => Err(type_mismatch("int", index)),
        }
    }

    pub fn as_uint(&self, index: usize) -> Result<u64, Error> {
        u64::try_from(self.as_int(index)?)
    }

    pub fn as_float(&self, index: usize) -> Result<f64, Error> {
        match self.entry_or_err(index)? {
            EntryKind::Float(v) => Ok(*v),
            _ => Err(type_mismatch("float", index)),
        }
    }

    pub fn as_bignumber(&self, index: usize) -> Result<&BigNumber, Error> {
        match self.entry_or_err(index)? {
            EntryKind::BigNumber(v) => Ok(v),
            _ => Err(type_mismatch("bignumber", index)),
        }
    }

    pub fn as_string(&self, index: usize) -> Result<Cow<'_, str>, Error> {
        self.string_at(index)
    }

    /// Identical to [`PositionMap::as_string`]; `spec.md`'s adapter-facing
    /// name for the same operation.
    pub fn string_at(&self, index: usize) -> Result<Cow<'_, str>, Error> {
        match self.entry_or_err(index)? {
            EntryKind::Str(StringEntry::Span { offset, length }) => {
                let bytes = &self.bytes[*offset..*offset + *length];
                std::str::from_utf8(bytes)
                    .map(Cow::Borrowed)
                    .map_err(|_| err!(ErrorKind::InvalidUtf8, "string span at entry {} is not valid UTF-8", index))
            }
            EntryKind::Str(StringEntry::Owned(s)) => Ok(Cow::Borrowed(s.as_str())),
            _ => Err(type_mismatch("string", index)),
        }
    }

    fn container_shape(&self, index: usize) -> Result<(usize, usize), Error> {
        match self.entry_or_err(index)? {
            EntryKind::Array { first_child, element_count } => Ok((*first_child, *element_count)),
            EntryKind::Object { first_child, element_count } => Ok((*first_child, *element_count)),
            EntryKind::TypedArray { first_child, element_count, .. } => Ok((*first_child, *element_count)),
            _ => Err(type_mismatch("container", index)),
        }
    }

    pub fn array_len(&self, index: usize) -> Result<usize, Error> {
        match self.entry_or_err(index)? {
            EntryKind::Array { element_count, .. } => Ok(*element_count),
            EntryKind::TypedArray { element_count, .. } => Ok(*element_count),
            _ => Err(type_mismatch("array", index)),
        }
    }

    pub fn object_len(&self, index: usize) -> Result<usize, Error> {
        match self.entry_or_err(index)? {
            EntryKind::Object { element_count, .. } => Ok(element_count / 2),
            _ => Err(type_mismatch("object", index)),
        }
    }

    /// Walk to the `k`-th child (0-indexed) of the container at `index`,
    /// in `O(k)` via the sibling table. For sequential access, prefer
    /// [`PositionMap::iterate_children`].
    pub fn child_at(&self, index: usize, k: usize) -> Result<usize, Error> {
        let (first_child, element_count) = self.container_shape(index)?;
        if k >= element_count {
            return Err(err!(
                ErrorKind::InvalidData,
                "child_at: index {} out of range (container has {} children)",
                k,
                element_count
            )
            .with_segment(PathSegment::Index(k)));
        }
        let mut current = first_child;
        for _ in 0..k {
            current = self.next_sibling(current);
        }
        Ok(current)
    }

    /// An O(1)-per-step cursor over every child of the container at
    /// `index`, in order.
    pub fn iterate_children(&self, index: usize) -> Result<ChildCursor<'_>, Error> {
        let (first_child, element_count) = self.container_shape(index)?;
        Ok(ChildCursor {
            map: self,
            next: first_child,
            remaining: element_count,
        })
    }

    /// An O(1)-per-step cursor over every `(key_index, value_index)` pair
    /// of the object at `index`.
    pub fn iterate_pairs(&self, index: usize) -> Result<PairCursor<'_>, Error> {
        let EntryKind::Object { first_child, element_count } = self.entry_or_err(index)? else {
            return Err(type_mismatch("object", index));
        };
        Ok(PairCursor {
            map: self,
            next: *first_child,
            remaining_pairs: element_count / 2,
        })
    }

    fn build_key_cache(&self, index: usize) -> Result<(), Error> {
        if self.key_cache.borrow().contains_key(&index) {
            return Ok(());
        }
        let mut map = std::collections::HashMap::new();
        for (key_index, value_index) in self.iterate_pairs(index)? {
            let key = self.string_at(key_index)?.into_owned();
            match self.duplicate_key_policy {
                DuplicateKeyPolicy::KeepFirst => {
                    map.entry(key).or_insert(value_index);
                }
                _ => {
                    map.insert(key, value_index);
                }
            }
        }
        self.key_cache.borrow_mut().insert(index, map);
        Ok(())
    }

    /// Look up `key` in the object at `index`, returning the value's entry
    /// index. Objects with at most [`LINEAR_SCAN_THRESHOLD`] pairs are
    /// scanned directly; larger ones build a cached hash map on first
    /// query. `keep_first`/`keep_last` duplicate-key policy (when the
    /// object was decoded with one of those, rather than `reject`) is
    /// resolved here by keeping the corresponding occurrence.
    pub fn object_lookup(&self, index: usize, key: &str) -> Result<Option<usize>, Error> {
        let pair_count = self.object_len(index)?;
        if pair_count > LINEAR_SCAN_THRESHOLD {
            self.build_key_cache(index)?;
            return Ok(self.key_cache.borrow()[&index].get(key).copied());
        }
        let mut found = None;
        for (key_index, value_index) in self.iterate_pairs(index)? {
            if self.string_at(key_index)? == key {
                found = Some(value_index);
                if self.duplicate_key_policy != DuplicateKeyPolicy::KeepLast {
                    break;
                }
            }
        }
        Ok(found)
    }

    /// Like [`PositionMap::object_lookup`], but fails with `key_not_found`
    /// instead of returning `None` — for callers (typically an adapter)
    /// that treat a missing key as an error rather than an absent field.
    pub fn object_require(&self, index: usize, key: &str) -> Result<usize, Error> {
        self.object_lookup(index, key)?
            .ok_or_else(|| err!(ErrorKind::KeyNotFound, "no key {:?} in object", key).with_segment(PathSegment::Key(key.to_string())))
    }

    /// Resolve a coding path for the node at `index`: the chain of
    /// `{object_key | array_index}` steps from the root, built on demand
    /// for error reporting (never during ordinary traversal).
    pub fn reader_diagnostics(&self, index: usize) -> Vec<PathSegment> {
        let mut segments = Vec::new();
        self.path_to(self.root_index(), index, &mut segments);
        segments
    }

    fn path_to(&self, current: usize, target: usize, segments: &mut Vec<PathSegment>) -> bool {
        if current == target {
            return true;
        }
        if let Ok(kind) = self.entry_or_err(current) {
            match kind {
                EntryKind::Array { .. } | EntryKind::TypedArray { .. } => {
                    if let Ok(cursor) = self.iterate_children(current) {
                        for (i, child) in cursor.enumerate() {
                            if child <= target && target < self.next_sibling(child) {
                                segments.push(PathSegment::Index(i));
                                return self.path_to(child, target, segments);
                            }
                        }
                    }
                }
                EntryKind::Object { .. } => {
                    if let Ok(cursor) = self.iterate_pairs(current) {
                        for (key_index, value_index) in cursor {
                            if value_index <= target && target < self.next_sibling(value_index) {
                                let key = self.string_at(key_index).map(|c| c.into_owned()).unwrap_or_default();
                                segments.push(PathSegment::Key(key));
                                return self.path_to(value_index, target, segments);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        false
    }

    /// Read every element of the array at `index` as `i64`. Works for a
    /// typed integer array of any width and for a plain array of integers
    /// alike, since the scanner already normalizes elements to a common
    /// `Int` entry regardless of the wire width they arrived in.
    pub fn read_int_array_i64(&self, index: usize) -> Result<Vec<i64>, Error> {
        let (first_child, count) = self.container_shape(index)?;
        let mut out = Vec::with_capacity(count);
        let mut i = first_child;
        for _ in 0..count {
            out.push(i64::try_from(self.as_int(i)?)?);
            i = self.next_sibling(i);
        }
        Ok(out)
    }

    pub fn read_uint_array_u64(&self, index: usize) -> Result<Vec<u64>, Error> {
        let (first_child, count) = self.container_shape(index)?;
        let mut out = Vec::with_capacity(count);
        let mut i = first_child;
        for _ in 0..count {
            out.push(self.as_uint(i)?);
            i = self.next_sibling(i);
        }
        Ok(out)
    }

    pub fn read_float_array_f64(&self, index: usize) -> Result<Vec<f64>, Error> {
        let (first_child, count) = self.container_shape(index)?;
        let mut out = Vec::with_capacity(count);
        let mut i = first_child;
        for _ in 0..count {
            out.push(self.as_float(i)?);
            i = self.next_sibling(i);
        }
        Ok(out)
    }

    pub fn read_bool_array(&self, index: usize) -> Result<Vec<bool>, Error> {
        let (first_child, count) = self.container_shape(index)?;
        let mut out = Vec::with_capacity(count);
        let mut i = first_child;
        for _ in 0..count {
            out.push(self.as_bool(i)?);
            i = self.next_sibling(i);
        }
        Ok(out)
    }

    pub fn read_string_array(&self, index: usize) -> Result<Vec<String>, Error> {
        let (first_child, count) = self.container_shape(index)?;
        let mut out = Vec::with_capacity(count);
        let mut i = first_child;
        for _ in 0..count {
            out.push(self.string_at(i)?.into_owned());
            i = self.next_sibling(i);
        }
        Ok(out)
    }

    /// Build an owned [`Value`] tree for the subtree rooted at `index`,
    /// walking every descendant. Unlike the typed accessors above (which
    /// stay at `O(1)`/`O(k)` against the position map), this is `O(subtree
    /// size)` and copies every string it touches — meant for adapters and
    /// tests that want a whole node at once, not for the hot path.
    pub fn materialize(&self, index: usize) -> Result<Value, Error> {
        Ok(match self.entry_or_err(index)? {
            EntryKind::Null => Value::Null,
            EntryKind::Bool(v) => Value::Bool(*v),
            EntryKind::Int(v) => Value::Int(*v),
            EntryKind::Float(v) => Value::Float(*v),
            EntryKind::BigNumber(v) => Value::BigNumber(v.clone()),
            EntryKind::Str(_) => Value::Str(self.string_at(index)?.into_owned()),
            EntryKind::Array { .. } | EntryKind::TypedArray { .. } => {
                let items = self
                    .iterate_children(index)?
                    .map(|child| self.materialize(child))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Array(items)
            }
            EntryKind::Object { .. } => {
                let pairs = self
                    .iterate_pairs(index)?
                    .map(|(key_index, value_index)| {
                        Ok((self.string_at(key_index)?.into_owned(), self.materialize(value_index)?))
                    })
                    .collect::<Result<Vec<_>, Error>>()?;
                Value::Object(pairs)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;
    use crate::policy::{DuplicateKeyPolicy, Policy};
    use crate::value::Value;

    fn build(v: &Value, policy: Policy) -> PositionMap {
        let mut enc = Encoder::begin_document(policy.clone());
        enc.write_value(v).unwrap();
        let bytes = enc.end_document().unwrap();
        PositionMap::build_from_bytes(&bytes, policy).unwrap()
    }

    #[test]
    fn scalar_type_and_value() {
        let map = build(&Value::from(42i64), Policy::new());
        assert_eq!(map.type_of(0).unwrap(), TypeTag::Int);
        assert_eq!(map.as_int(0).unwrap(), Integer::from(42i64));
    }

    #[test]
    fn object_lookup_finds_values_by_key() {
        let v = Value::Object(vec![("a".into(), Value::from(1i64)), ("b".into(), Value::from(2i64))]);
        let map = build(&v, Policy::new());
        let root = map.root_index();
        let idx = map.object_lookup(root, "b").unwrap().unwrap();
        assert_eq!(map.as_int(idx).unwrap(), Integer::from(2i64));
        assert!(map.object_lookup(root, "missing").unwrap().is_none());
    }

    #[test]
    fn object_lookup_past_threshold_uses_cache() {
        let pairs: Vec<(String, Value)> = (0..20).map(|i| (format!("k{}", i), Value::from(i as i64))).collect();
        let v = Value::Object(pairs);
        let map = build(&v, Policy::new());
        let root = map.root_index();
        let idx = map.object_lookup(root, "k15").unwrap().unwrap();
        assert_eq!(map.as_int(idx).unwrap(), Integer::from(15i64));
    }

    #[test]
    fn object_require_fails_with_key_not_found_for_a_missing_key() {
        let v = Value::Object(vec![("a".into(), Value::from(1i64))]);
        let map = build(&v, Policy::new());
        let root = map.root_index();
        assert_eq!(map.object_require(root, "a").unwrap(), map.object_lookup(root, "a").unwrap().unwrap());
        let err = map.object_require(root, "missing").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyNotFound);
    }

    #[test]
    fn duplicate_key_keep_last_resolves_to_latest() {
        let v = Value::Object(vec![("a".into(), Value::from(1i64)), ("a".into(), Value::from(2i64))]);
        let policy = Policy::new().duplicate_key(DuplicateKeyPolicy::KeepLast);
        let map = build(&v, policy);
        let root = map.root_index();
        let idx = map.object_lookup(root, "a").unwrap().unwrap();
        assert_eq!(map.as_int(idx).unwrap(), Integer::from(2i64));
    }

    #[test]
    fn duplicate_key_keep_first_resolves_to_earliest() {
        let v = Value::Object(vec![("a".into(), Value::from(1i64)), ("a".into(), Value::from(2i64))]);
        let policy = Policy::new().duplicate_key(DuplicateKeyPolicy::KeepFirst);
        let map = build(&v, policy);
        let root = map.root_index();
        let idx = map.object_lookup(root, "a").unwrap().unwrap();
        assert_eq!(map.as_int(idx).unwrap(), Integer::from(1i64));
    }

    #[test]
    fn child_at_and_iterate_children_agree() {
        let v = Value::Array(vec![Value::from(1i64), Value::from(2i64), Value::from(3i64)]);
        let map = build(&v, Policy::new());
        let root = map.root_index();
        let via_cursor: Vec<usize> = map.iterate_children(root).unwrap().collect();
        let via_child_at: Vec<usize> = (0..3).map(|k| map.child_at(root, k).unwrap()).collect();
        assert_eq!(via_cursor, via_child_at);
    }

    #[test]
    fn materialize_rebuilds_the_original_value_tree() {
        let value = Value::Object(vec![
            ("name".into(), Value::from("fixture")),
            ("tags".into(), Value::Array(vec![Value::from(1i64), Value::Bool(true), Value::Null])),
        ]);
        let map = build(&value, Policy::new());
        assert_eq!(map.materialize(map.root_index()).unwrap(), value);
    }

    #[test]
    fn reader_diagnostics_resolves_a_path() {
        let v = Value::Object(vec![(
            "items".into(),
            Value::Array(vec![Value::from(1i64), Value::from(2i64)]),
        )]);
        let map = build(&v, Policy::new());
        let items = map.object_lookup(map.root_index(), "items").unwrap().unwrap();
        let second = map.child_at(items, 1).unwrap();
        let path = map.reader_diagnostics(second);
        assert_eq!(path, vec![PathSegment::Key("items".into()), PathSegment::Index(1)]);
    }
}
