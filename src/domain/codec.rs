//! Object serialization used by the object accessors.
//!
//! Objects are stored as JSON text inside ordinary string entries, so any
//! codec must produce a string that it can read back.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Converts objects to and from the string form kept in a store.
pub trait ObjectCodec: Send + Sync {
    /// Encodes `value`, returning `None` when it represents an absent value.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> serde_json::Result<Option<String>>;

    fn decode<T: DeserializeOwned>(&self, data: &str) -> serde_json::Result<T>;
}

/// The default codec, backed by `serde_json`.
///
/// # Examples
///
/// ```
/// use prefstore::domain::{JsonCodec, ObjectCodec};
///
/// let codec = JsonCodec;
/// assert_eq!(codec.encode(&vec![1, 2]).unwrap().as_deref(), Some("[1,2]"));
/// assert_eq!(codec.encode(&None::<u8>).unwrap(), None);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ObjectCodec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> serde_json::Result<Option<String>> {
        let json = serde_json::to_string(value)?;
        if json == "null" {
            Ok(None)
        } else {
            Ok(Some(json))
        }
    }

    fn decode<T: DeserializeOwned>(&self, data: &str) -> serde_json::Result<T> {
        serde_json::from_str(data)
    }
}
