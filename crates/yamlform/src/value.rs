//! value representation
//!
//! Runtime values produced by the evaluator:
//! - null
//! - boolean
//! - number (f64, integral numbers serialize as integers)
//! - string (utf-8)
//! - list
//! - object (order-preserving map with string keys)
//! - asset and archive descriptions
//! - resource handles
//! - deferred values ([Output])
//!
//! Deferred values may appear anywhere inside lists and objects. [Output::from_value] turns such a value into
//! a single output of the fully resolved value.
use crate::engine::ResourceHandle;
use crate::output::{Output, Settled};
use indexmap::IndexMap;
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serializer,
};

/// All possible value types
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
    Asset(Asset),
    Archive(Archive),
    Resource(ResourceHandle),
    Output(Output),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Asset {
    String(String),
    File(String),
    Remote(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Archive {
    File(String),
    Remote(String),
    /// entries are [Value::Asset]s or [Value::Archive]s
    Assets(IndexMap<String, Value>),
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl<K: ToString, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Object(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.into()))
                .collect(),
        )
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match value {
            Json::Null => Value::Null,
            Json::Bool(b) => b.into(),
            // serde_json numbers are always representable as f64 without arbitrary_precision
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or_default()),
            Json::String(s) => s.into(),
            Json::Array(a) => a.into(),
            Json::Object(o) => o.into_iter().collect(),
        }
    }
}

impl From<serde_yaml::Value> for Value {
    fn from(value: serde_yaml::Value) -> Self {
        use serde_yaml::Value as Yaml;

        match value {
            Yaml::Null => Value::Null,
            Yaml::Bool(b) => b.into(),
            Yaml::Number(n) => Value::Number(n.as_f64().unwrap_or_default()),
            Yaml::String(s) => s.into(),
            Yaml::Sequence(items) => items.into(),
            Yaml::Mapping(mapping) => Value::Object(
                mapping
                    .into_iter()
                    .map(|(k, v)| {
                        let key = match k {
                            Yaml::String(s) => s,
                            other => serde_yaml::to_string(&other)
                                .map(|s| s.trim_end().to_string())
                                .unwrap_or_default(),
                        };
                        (key, v.into())
                    })
                    .collect(),
            ),
            Yaml::Tagged(tagged) => tagged.value.into(),
        }
    }
}

impl Value {
    pub fn object() -> Self {
        Value::Object(IndexMap::new())
    }

    /// Article and kind, for runtime error messages
    pub fn type_string(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "a boolean",
            Value::Number(_) => "a number",
            Value::String(_) => "a string",
            Value::List(_) => "a list",
            Value::Object(_) => "an object",
            Value::Asset(_) => "an asset",
            Value::Archive(_) => "an archive",
            Value::Resource(_) => "a resource",
            Value::Output(_) => "an output",
        }
    }

    /// True if an [Output] is nested anywhere inside. Resource handles are opaque.
    pub fn contains_output(&self) -> bool {
        match self {
            Value::Output(_) => true,
            Value::List(items) => items.iter().any(Value::contains_output),
            Value::Object(entries) => entries.values().any(Value::contains_output),
            Value::Archive(Archive::Assets(entries)) => entries.values().any(Value::contains_output),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Text used when the value is interpolated into a string
    pub fn to_interpolated(&self) -> Option<String> {
        match self {
            Value::Null => Some(String::new()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(format_number(*n)),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

/// Integral numbers print without a fraction
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(value) => serializer.serialize_bool(*value),
            Value::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                serializer.serialize_i64(*value as i64)
            }
            Value::Number(value) => serializer.serialize_f64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::List(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Object(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
            Value::Asset(asset) => {
                let (key, value) = match asset {
                    Asset::String(text) => ("text", text),
                    Asset::File(path) => ("path", path),
                    Asset::Remote(uri) => ("uri", uri),
                };
                let mut ser = serializer.serialize_map(Some(1))?;
                ser.serialize_entry(key, value)?;
                ser.end()
            }
            Value::Archive(archive) => {
                let mut ser = serializer.serialize_map(Some(1))?;
                match archive {
                    Archive::File(path) => ser.serialize_entry("path", path)?,
                    Archive::Remote(uri) => ser.serialize_entry("uri", uri)?,
                    Archive::Assets(assets) => ser.serialize_entry("assets", &Value::Object(assets.clone()))?,
                }
                ser.end()
            }
            Value::Resource(handle) => {
                let mut ser = serializer.serialize_map(Some(2))?;
                ser.serialize_entry("type", handle.token())?;
                ser.serialize_entry("urn", &Value::Output(handle.urn().clone()))?;
                ser.end()
            }
            Value::Output(output) => match output.peek() {
                Some(Settled::Known {
                    secret: false,
                    value,
                }) => value.serialize(serializer),
                Some(Settled::Known { secret: true, .. }) | Some(Settled::Unknown { secret: true }) => {
                    serializer.serialize_str("[secret]")
                }
                Some(Settled::Unknown { secret: false }) => serializer.serialize_str("[unknown]"),
                Some(Settled::Failed(_)) => serializer.serialize_str("[failed]"),
                None => serializer.serialize_str("[pending]"),
            },
        }
    }
}
