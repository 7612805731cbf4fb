use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::errors::{PreferencesError, PreferencesResult};

/// Visibility of a store's backing file.
///
/// The mode never changes which data a store name refers to; it only decides
/// the permissions written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Readable and writable by the owning application only
    #[default]
    Private,
    /// Other applications may read the file
    WorldReadable,
    /// Other applications may read and write the file
    WorldWritable,
}

impl AccessMode {
    pub const RAW_PRIVATE: i32 = 0;
    pub const RAW_WORLD_READABLE: i32 = 1;
    pub const RAW_WORLD_WRITABLE: i32 = 2;
    /// Raw value meaning "no mode chosen".
    pub const RAW_UNSET: i32 = -1;

    /// Maps a raw integer mode to an access mode.
    ///
    /// Returns `None` for unset or unknown values; callers normalize that to
    /// [`AccessMode::Private`].
    ///
    /// # Examples
    ///
    /// ```
    /// use prefstore::domain::AccessMode;
    ///
    /// assert_eq!(AccessMode::from_raw(1), Some(AccessMode::WorldReadable));
    /// assert_eq!(AccessMode::from_raw(AccessMode::RAW_UNSET), None);
    /// assert_eq!(AccessMode::from_raw(42), None);
    /// ```
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            Self::RAW_PRIVATE => Some(AccessMode::Private),
            Self::RAW_WORLD_READABLE => Some(AccessMode::WorldReadable),
            Self::RAW_WORLD_WRITABLE => Some(AccessMode::WorldWritable),
            _ => None,
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            AccessMode::Private => Self::RAW_PRIVATE,
            AccessMode::WorldReadable => Self::RAW_WORLD_READABLE,
            AccessMode::WorldWritable => Self::RAW_WORLD_WRITABLE,
        }
    }

    /// Unix permission bits applied to the backing file.
    pub fn file_permissions(self) -> u32 {
        match self {
            AccessMode::Private => 0o660,
            AccessMode::WorldReadable => 0o664,
            AccessMode::WorldWritable => 0o666,
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccessMode::Private => "private",
            AccessMode::WorldReadable => "world_readable",
            AccessMode::WorldWritable => "world_writable",
        };
        f.write_str(label)
    }
}

impl FromStr for AccessMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "private" => Ok(AccessMode::Private),
            "world_readable" => Ok(AccessMode::WorldReadable),
            "world_writable" | "world_writeable" => Ok(AccessMode::WorldWritable),
            other => Err(format!("Unknown access mode: {}", other)),
        }
    }
}

/// Name and mode used to open a store.
///
/// Both fields may be left empty: an empty name resolves to the host's package
/// name and a missing mode resolves to [`AccessMode::Private`].
///
/// # Examples
///
/// ```
/// use prefstore::domain::{AccessMode, StoreConfig};
///
/// let config = StoreConfig::from_json_str(r#"{ "name": "settings", "mode": 7 }"#).unwrap();
/// assert_eq!(config.resolved_name("com.example.app"), "settings");
/// assert_eq!(config.resolved_mode(), AccessMode::Private);
///
/// let config = StoreConfig::default();
/// assert_eq!(config.resolved_name("com.example.app"), "com.example.app");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_lenient_mode")]
    pub mode: Option<AccessMode>,
}

impl StoreConfig {
    pub fn new(name: impl Into<String>, mode: AccessMode) -> Self {
        Self {
            name: name.into(),
            mode: Some(mode),
        }
    }

    /// A config with a name and no explicit mode.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: None,
        }
    }

    /// A config built from a raw integer mode; unknown values are dropped.
    pub fn with_raw_mode(name: impl Into<String>, raw_mode: i32) -> Self {
        Self {
            name: name.into(),
            mode: AccessMode::from_raw(raw_mode),
        }
    }

    /// Parses a config from JSON such as `{"name": "settings", "mode": "world_readable"}`.
    ///
    /// `mode` accepts a mode name or a raw integer. Unknown modes are treated
    /// as unset rather than rejected.
    pub fn from_json_str(json: &str) -> PreferencesResult<Self> {
        serde_json::from_str(json).map_err(PreferencesError::InvalidConfig)
    }

    pub fn resolved_name(&self, package_name: &str) -> String {
        if self.name.is_empty() {
            package_name.to_string()
        } else {
            self.name.clone()
        }
    }

    pub fn resolved_mode(&self) -> AccessMode {
        self.mode.unwrap_or_default()
    }
}

fn deserialize_lenient_mode<'de, D>(deserializer: D) -> Result<Option<AccessMode>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value {
        serde_json::Value::String(s) => s.parse().ok(),
        serde_json::Value::Number(n) => n
            .as_i64()
            .and_then(|n| i32::try_from(n).ok())
            .and_then(AccessMode::from_raw),
        _ => None,
    }))
}

/// The kinds of value a store entry can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    StringSet,
    Int,
    Float,
    Long,
    Boolean,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValueKind::String => "string",
            ValueKind::StringSet => "string_set",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Long => "long",
            ValueKind::Boolean => "boolean",
        };
        f.write_str(label)
    }
}

/// A single stored value.
///
/// Serialized as `{"type": "<kind>", "value": ...}` in the store's backing file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PreferenceValue {
    String(String),
    StringSet(BTreeSet<String>),
    Int(i32),
    Float(#[serde(with = "float_repr")] f32),
    Long(i64),
    Boolean(bool),
}

impl PreferenceValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            PreferenceValue::String(_) => ValueKind::String,
            PreferenceValue::StringSet(_) => ValueKind::StringSet,
            PreferenceValue::Int(_) => ValueKind::Int,
            PreferenceValue::Float(_) => ValueKind::Float,
            PreferenceValue::Long(_) => ValueKind::Long,
            PreferenceValue::Boolean(_) => ValueKind::Boolean,
        }
    }
}

impl From<String> for PreferenceValue {
    fn from(value: String) -> Self {
        PreferenceValue::String(value)
    }
}

impl From<&str> for PreferenceValue {
    fn from(value: &str) -> Self {
        PreferenceValue::String(value.to_string())
    }
}

impl From<BTreeSet<String>> for PreferenceValue {
    fn from(value: BTreeSet<String>) -> Self {
        PreferenceValue::StringSet(value)
    }
}

impl From<i32> for PreferenceValue {
    fn from(value: i32) -> Self {
        PreferenceValue::Int(value)
    }
}

impl From<f32> for PreferenceValue {
    fn from(value: f32) -> Self {
        PreferenceValue::Float(value)
    }
}

impl From<i64> for PreferenceValue {
    fn from(value: i64) -> Self {
        PreferenceValue::Long(value)
    }
}

impl From<bool> for PreferenceValue {
    fn from(value: bool) -> Self {
        PreferenceValue::Boolean(value)
    }
}

/// JSON has no literal for non-finite numbers, so those are written as the
/// strings `"NaN"`, `"Infinity"` and `"-Infinity"`. Finite values stay numbers.
mod float_repr {
    use super::*;

    const NAN: &str = "NaN";
    const INFINITY: &str = "Infinity";
    const NEG_INFINITY: &str = "-Infinity";

    pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str(NAN)
        } else if value.is_infinite() {
            serializer.serialize_str(if *value > 0.0 { INFINITY } else { NEG_INFINITY })
        } else {
            serializer.serialize_f32(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(|n| n as f32)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid float: {}", n))),
            serde_json::Value::String(s) => match s.as_str() {
                NAN => Ok(f32::NAN),
                INFINITY => Ok(f32::INFINITY),
                NEG_INFINITY => Ok(f32::NEG_INFINITY),
                other => Err(serde::de::Error::custom(format!("invalid float: {}", other))),
            },
            other => Err(serde::de::Error::custom(format!("invalid float: {}", other))),
        }
    }
}
