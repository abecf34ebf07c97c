//! Record mode: recognizing arrays of homogeneous keyed objects and
//! emitting/parsing a shared key schema (`record_def`) plus key-less
//! instance rows (`record_instance`), shared between the encoder and the
//! scanner so the wire meaning stays in one place.
use crate::error::{err, Error, ErrorKind};
use crate::marker::Marker;
use crate::policy::Policy;
use crate::value::Value;
use crate::varint::{read_uleb128, write_uleb128};
use crate::{element, string};

/// The key schema of a record definition, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RecordDefinition {
    pub keys: Vec<String>,
}

impl RecordDefinition {
    /// `true` if `keys` names exactly this schema's keys, in the same
    /// order — the condition under which an object can be encoded as an
    /// instance of this definition.
    pub fn matches(&self, keys: &[&str]) -> bool {
        self.keys.len() == keys.len() && self.keys.iter().zip(keys).all(|(a, b)| a == b)
    }
}

/// If every element of `objects` is an object with the same keys in the
/// same order, and there are at least two elements, return that shared key
/// list. Otherwise `None` — the caller should fall back to plain object
/// encoding.
pub(crate) fn detect_homogeneous_schema(objects: &[&[(String, Value)]]) -> Option<Vec<String>> {
    if objects.len() < 2 {
        return None;
    }
    let first_keys: Vec<&str> = objects[0].iter().map(|(k, _)| k.as_str()).collect();
    for obj in &objects[1..] {
        let keys: Vec<&str> = obj.iter().map(|(k, _)| k.as_str()).collect();
        if keys != first_keys {
            return None;
        }
    }
    Some(first_keys.into_iter().map(String::from).collect())
}

/// Encode a record definition body: `0x B9` marker, each key as a string
/// value, then `0xB6`. The marker byte itself is written by the caller
/// (mirroring how containers are opened elsewhere).
pub(crate) fn encode_definition(keys: &[String], policy: &Policy, out: &mut Vec<u8>) -> Result<(), Error> {
    out.push(Marker::RecordDefinitionBegin.into_u8());
    for key in keys {
        element::encode_string(key, policy, out)?;
    }
    out.push(Marker::ContainerEnd.into_u8());
    Ok(())
}

/// Encode a record instance header: `0xBA` marker followed by the ULEB128
/// index of the definition it instantiates. The instance body (one value
/// per definition key, in order, then `0xB6`) is written by the caller,
/// since each value may be any scalar or container.
pub(crate) fn encode_instance_header(def_index: u64, out: &mut Vec<u8>) {
    out.push(Marker::RecordInstanceBegin.into_u8());
    write_uleb128(def_index, out);
}

/// Decode a record definition's key list: a sequence of string values
/// terminated by `0xB6`. `input` starts immediately after the
/// `RecordDefinitionBegin` marker byte. Returns the keys and bytes
/// consumed, including the terminating `0xB6`.
pub(crate) fn decode_definition_keys(input: &[u8], policy: &Policy) -> Result<(Vec<String>, usize), Error> {
    let mut offset = 0;
    let mut keys = Vec::new();
    loop {
        let marker_byte = *input
            .get(offset)
            .ok_or_else(|| err!(ErrorKind::Truncated, "record definition: missing terminator"))?;
        let marker = Marker::from_u8(marker_byte);
        if marker == Marker::ContainerEnd {
            offset += 1;
            break;
        }
        let key = match marker {
            Marker::ShortString(len) => {
                let (s, n) = string::decode_short_string(&input[offset + 1..], len, policy)?;
                offset += 1 + n;
                s
            }
            Marker::String => {
                let (s, n) = string::decode_long_string(&input[offset + 1..], policy)?;
                offset += 1 + n;
                s
            }
            _ => {
                return Err(err!(
                    ErrorKind::InvalidObjectKey,
                    "record definition: key entries must be strings"
                ))
            }
        };
        keys.push(key);
    }
    Ok((keys, offset))
}

/// Decode a record instance header following the `RecordInstanceBegin`
/// marker byte: a ULEB128 definition index. Returns the index and bytes
/// consumed.
pub(crate) fn decode_instance_index(input: &[u8]) -> Result<(u64, usize), Error> {
    read_uleb128(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integer::Integer;

    #[test]
    fn detects_shared_schema_across_objects() {
        let a: Vec<(String, Value)> = vec![("x".into(), Value::from(1i64)), ("y".into(), Value::from(2i64))];
        let b: Vec<(String, Value)> = vec![("x".into(), Value::from(3i64)), ("y".into(), Value::from(4i64))];
        let schema = detect_homogeneous_schema(&[&a, &b]).unwrap();
        assert_eq!(schema, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn rejects_divergent_key_order() {
        let a: Vec<(String, Value)> = vec![("x".into(), Value::from(1i64)), ("y".into(), Value::from(2i64))];
        let b: Vec<(String, Value)> = vec![("y".into(), Value::from(3i64)), ("x".into(), Value::from(4i64))];
        assert!(detect_homogeneous_schema(&[&a, &b]).is_none());
    }

    #[test]
    fn definition_round_trips() {
        let keys = vec!["a".to_string(), "b".to_string()];
        let mut buf = Vec::new();
        encode_definition(&keys, &Policy::new(), &mut buf).unwrap();
        assert_eq!(Marker::from_u8(buf[0]), Marker::RecordDefinitionBegin);
        let (decoded, consumed) = decode_definition_keys(&buf[1..], &Policy::new()).unwrap();
        assert_eq!(decoded, keys);
        assert_eq!(consumed, buf.len() - 1);
    }

    #[test]
    fn instance_header_round_trips() {
        let mut buf = Vec::new();
        encode_instance_header(300, &mut buf);
        assert_eq!(Marker::from_u8(buf[0]), Marker::RecordInstanceBegin);
        let (idx, consumed) = decode_instance_index(&buf[1..]).unwrap();
        assert_eq!(idx, 300);
        assert_eq!(consumed, buf.len() - 1);
    }

    #[test]
    fn matches_checks_name_and_order() {
        let def = RecordDefinition {
            keys: vec!["a".into(), "b".into()],
        };
        assert!(def.matches(&["a", "b"]));
        assert!(!def.matches(&["b", "a"]));
        assert!(!def.matches(&["a"]));
        let _ = Integer::from(0u8);
    }
}
