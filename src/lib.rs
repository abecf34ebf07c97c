//! BONJSON: a binary serialization format that is semantically a superset
//! of JSON, with wire-level efficiency and an extended numeric domain
//! (arbitrary-precision decimals, typed integer widths, bfloat16).
//!
//! This crate implements the core codec: [`Encoder`] serializes a value
//! tree to a byte stream; [`PositionMap`] scans a byte stream once into a
//! random-access, index-addressed tree ([`TypeTag`], `as_*`, `child_at`,
//! `object_lookup`, typed-batch readers). [`Policy`] configures the limits
//! and repair strategies both sides use. [`Value`] is the owned in-memory
//! tree the encoder accepts and a subtree can be materialized into.

mod bignumber;
mod element;
mod encoder;
mod error;
mod float;
mod integer;
mod marker;
mod policy;
mod position_map;
mod reader;
mod record;
mod scanner;
mod string;
mod value;
mod varint;

pub use bignumber::BigNumber;
pub use encoder::Encoder;
pub use error::{CodingPath, Error, ErrorKind, PathSegment, Result};
pub use integer::Integer;
pub use policy::{
    BignumberOutOfRangePolicy, DuplicateKeyPolicy, InvalidUtf8Policy, NanInfinityPolicy, NulInStringPolicy, Policy,
    TrailingBytesPolicy, UnicodeNormalizationPolicy,
};
pub use position_map::PositionMap;
pub use reader::{ChildCursor, PairCursor, TypeTag};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_document_round_trips() {
        let value = Value::Object(vec![
            ("name".into(), Value::from("fixture")),
            ("count".into(), Value::from(3i64)),
            ("tags".into(), Value::Array(vec![Value::from("a"), Value::from("b")])),
        ]);
        let mut encoder = Encoder::begin_document(Policy::new());
        encoder.write_value(&value).unwrap();
        let bytes = encoder.end_document().unwrap();

        let map = PositionMap::build_from_bytes(&bytes, Policy::new()).unwrap();
        let root = map.root_index();
        assert_eq!(map.type_of(root).unwrap(), TypeTag::Object);

        let count_idx = map.object_lookup(root, "count").unwrap().unwrap();
        assert_eq!(map.as_int(count_idx).unwrap(), Integer::from(3i64));

        let tags_idx = map.object_lookup(root, "tags").unwrap().unwrap();
        assert_eq!(map.read_string_array(tags_idx).unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn malformed_input_reports_truncated() {
        // 0xB4 opens an array but the stream ends before its contents.
        let err = PositionMap::build_from_bytes(&[0xB4], Policy::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Truncated);
    }
}
