//! Canonical JSON serialisation for gittuf trust metadata.
//!
//! Every document that crosses a signature boundary (root metadata, targets
//! metadata, attestations, VSAs) is first turned into a [`Value`] and then
//! serialised with [`Value::canonical_bytes`]: sorted object keys, no
//! insignificant whitespace, integers only. Two semantically equal documents
//! always produce byte-identical output, which is what signing over the
//! payload requires.

use std::collections::BTreeMap;
use std::convert::TryFrom;

use serde::Serialize;
use thiserror::Error;

mod ser;

pub use ser::to_canonical_bytes;

/// A canonical JSON value.
///
/// Object keys are held in a [`BTreeMap`], so insertion order never matters
/// and iteration always yields keys in sorted order.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Value {
    Object(BTreeMap<String, Value>),
    Array(Vec<Value>),
    String(String),
    Number(Number),
    Bool(bool),
    Null,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Number {
    U64(u64),
    I64(i64),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("floating point numbers have no canonical representation")]
    NonIntegerNumber,
    #[error("value of type {0} cannot appear at the document root")]
    InvalidRoot(&'static str),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Value {
    pub fn ty_name(&self) -> &'static str {
        match self {
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Null => "null",
        }
    }

    /// Encode this value as canonical JSON bytes: sorted keys, no
    /// whitespace, `:` and `,` separators only.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_canonical(&mut buf);
        buf
    }

    fn write_canonical(&self, buf: &mut Vec<u8>) {
        match self {
            Value::Object(map) => {
                buf.push(b'{');
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        buf.push(b',');
                    }
                    write_json_string(buf, k);
                    buf.push(b':');
                    v.write_canonical(buf);
                }
                buf.push(b'}');
            },
            Value::Array(items) => {
                buf.push(b'[');
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        buf.push(b',');
                    }
                    v.write_canonical(buf);
                }
                buf.push(b']');
            },
            Value::String(s) => write_json_string(buf, s),
            Value::Number(n) => match n {
                Number::U64(x) => buf.extend(x.to_string().as_bytes()),
                Number::I64(x) => buf.extend(x.to_string().as_bytes()),
            },
            Value::Bool(true) => buf.extend(b"true"),
            Value::Bool(false) => buf.extend(b"false"),
            Value::Null => buf.extend(b"null"),
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(m) => Some(m),
            _ => None,
        }
    }
}

fn write_json_string(buf: &mut Vec<u8>, s: &str) {
    buf.push(b'"');
    for c in s.chars() {
        match c {
            '"' => buf.extend(b"\\\""),
            '\\' => buf.extend(b"\\\\"),
            '\n' => buf.extend(b"\\n"),
            '\r' => buf.extend(b"\\r"),
            '\t' => buf.extend(b"\\t"),
            c if (c as u32) < 0x20 => buf.extend(format!("\\u{:04x}", c as u32).as_bytes()),
            c => {
                let mut tmp = [0u8; 4];
                buf.extend(c.encode_utf8(&mut tmp).as_bytes());
            },
        }
    }
    buf.push(b'"');
}

impl TryFrom<serde_json::Value> for Value {
    type Error = Error;

    fn try_from(v: serde_json::Value) -> Result<Self, Self::Error> {
        match v {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Ok(Value::Number(Number::U64(u)))
                } else if let Some(i) = n.as_i64() {
                    Ok(Value::Number(Number::I64(i)))
                } else {
                    Err(Error::NonIntegerNumber)
                }
            },
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Array(items) => {
                let items = items
                    .into_iter()
                    .map(Value::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Array(items))
            },
            serde_json::Value::Object(map) => {
                let map = map
                    .into_iter()
                    .map(|(k, v)| Value::try_from(v).map(|v| (k, v)))
                    .collect::<Result<BTreeMap<_, _>, _>>()?;
                Ok(Value::Object(map))
            },
        }
    }
}

/// A type whose canonical-JSON payload is deterministic, ie. required for
/// anything that gets hashed or signed.
pub trait Canonical {
    fn canonical_bytes(&self) -> Result<Vec<u8>, Error>;
}

impl<T: Serialize> Canonical for T {
    fn canonical_bytes(&self) -> Result<Vec<u8>, Error> {
        let v = serde_json::to_value(self)?;
        let v = Value::try_from(v)?;
        Ok(v.canonical_bytes())
    }
}

/// SHA-256 digest of a value's canonical-JSON payload, hex-encoded. Used to
/// derive deterministic IDs (eg. a [`gittuf_crypto`]-level `key_id`) from
/// arbitrary signable payloads.
pub fn canonical_digest_hex<T: Canonical>(value: &T) -> Result<String, Error> {
    use sha2::{Digest, Sha256};
    let bytes = value.canonical_bytes()?;
    let digest = Sha256::digest(&bytes);
    Ok(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys() {
        let v: Value = json!({"b": 1, "a": 2}).try_into().unwrap();
        assert_eq!(v.canonical_bytes(), br#"{"a":2,"b":1}"#);
    }

    #[test]
    fn no_whitespace() {
        let v: Value = json!({"a": [1, 2, 3], "b": "x"}).try_into().unwrap();
        assert_eq!(v.canonical_bytes(), br#"{"a":[1,2,3],"b":"x"}"#);
    }

    #[test]
    fn rejects_floats() {
        let err = Value::try_from(json!({"a": 1.5})).unwrap_err();
        assert!(matches!(err, Error::NonIntegerNumber));
    }

    #[test]
    fn deterministic_regardless_of_source_order() {
        let a: Value = json!({"z": 1, "a": 2, "m": 3}).try_into().unwrap();
        let b: Value = json!({"a": 2, "m": 3, "z": 1}).try_into().unwrap();
        assert_eq!(a.canonical_bytes(), b.canonical_bytes());
    }

    #[test]
    fn escapes_control_and_special_chars() {
        let v: Value = json!({"k": "a\"b\\c\nd"}).try_into().unwrap();
        assert_eq!(v.canonical_bytes(), br#"{"k":"a\"b\\c\nd"}"#);
    }
}
