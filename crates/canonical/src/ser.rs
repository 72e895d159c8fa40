use std::convert::TryFrom;

use serde::Serialize;

use crate::{Error, Value};

/// Serialise `value` straight to canonical JSON bytes, without requiring the
/// caller to round-trip through [`Value`] themselves.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, Error> {
    let json = serde_json::to_value(value)?;
    let value = Value::try_from(json)?;
    Ok(value.canonical_bytes())
}
