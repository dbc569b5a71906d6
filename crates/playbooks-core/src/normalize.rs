//! Wire normalization for collection fields.
//!
//! Collections always serialize as arrays. On input, an explicit `null` or a
//! missing field reads as an empty collection, so a value that has been
//! through a round trip never carries a null collection.

use serde::{Deserialize, Deserializer};

/// Use with `#[serde(default, deserialize_with = "null_as_empty")]`.
pub fn null_as_empty<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
