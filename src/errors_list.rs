use std::fmt;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// The `errors` field of an API failure, normalized to ordered string pairs.
///
/// The API sends this field either as an array of messages or as an object
/// mapping field names to messages. Arrays are keyed by their decimal index
/// (`"0"`, `"1"`, ...) in array order; objects keep their own keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorsList {
    entries: Vec<(String, String)>,
}

impl ErrorsList {
    /// Decode a raw JSON value leniently.
    ///
    /// Absent values, `null` and any shape other than an array or an object
    /// produce an empty list. This never fails.
    pub fn from_value(value: Option<&Value>) -> Self {
        let entries = match value {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(key, val)| (key.clone(), stringify(val)))
                .collect(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(idx, val)| (idx.to_string(), stringify(val)))
                .collect(),
            _ => Vec::new(),
        };
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Whether the list came from an array on the wire (first key is `"0"`).
    pub fn is_positional(&self) -> bool {
        self.entries.first().is_some_and(|(k, _)| k == "0")
    }
}

/// Strings render unquoted, everything else as compact JSON text.
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for ErrorsList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let positional = self.is_positional();
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if positional {
                f.write_str(value)?;
            } else {
                write!(f, "{key}: \"{value}\"")?;
            }
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for ErrorsList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(Self::from_value(value.as_ref()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ErrorsList {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> From<Vec<(K, V)>> for ErrorsList {
    fn from(entries: Vec<(K, V)>) -> Self {
        entries.into_iter().collect()
    }
}
