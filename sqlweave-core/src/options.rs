//! Driver-ready connect arguments.
//!
//! A dialect turns a [`DatabaseUrl`](crate::url::DatabaseUrl) into a
//! [`ConnectArgs`] value: positional arguments plus an ordered map of
//! keyword options, which the driver provider receives verbatim.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Option names whose values never appear in logs.
const SECRET_OPTIONS: &[&str] = &["password", "pwd"];

/// A single connect option value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer value (ports, timeouts).
    Int(i64),
    /// Text value.
    Str(String),
}

impl OptionValue {
    /// Get the value as a string slice if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer, parsing text when needed.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Str(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    /// Get the value as a boolean, accepting the usual textual spellings.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::Str(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Some(true),
                "false" | "no" | "off" | "0" => Some(false),
                _ => None,
            },
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u16> for OptionValue {
    fn from(value: u16) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Ordered keyword options for a driver connect call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectOptions {
    entries: IndexMap<String, OptionValue>,
}

impl ConnectOptions {
    /// Create an empty option map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an option, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<OptionValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Remove an option, keeping the order of the remaining ones.
    pub fn remove(&mut self, key: &str) -> Option<OptionValue> {
        self.entries.shift_remove(key)
    }

    /// Get an option.
    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.entries.get(key)
    }

    /// Get a text option.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(OptionValue::as_str)
    }

    /// Check if an option is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Merge another set of options; values from `other` win on collision.
    pub fn extend<K, V>(&mut self, other: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<OptionValue>,
    {
        for (key, value) in other {
            self.insert(key, value);
        }
    }

    /// Iterate over the options in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Option names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of options.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there are no options.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the options as JSON with secrets masked, for logging.
    pub fn redacted_json(&self) -> String {
        let masked: IndexMap<&str, serde_json::Value> = self
            .entries
            .iter()
            .map(|(k, v)| {
                let value = if SECRET_OPTIONS.contains(&k.as_str()) {
                    serde_json::Value::String("***".to_string())
                } else {
                    serde_json::to_value(v).unwrap_or(serde_json::Value::Null)
                };
                (k.as_str(), value)
            })
            .collect();
        serde_json::to_string(&masked).unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<OptionValue>> FromIterator<(K, V)> for ConnectOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Self::new();
        options.extend(iter);
        options
    }
}

/// Arguments for a driver's connect entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectArgs {
    /// Positional arguments.
    pub args: Vec<OptionValue>,
    /// Keyword options.
    pub options: ConnectOptions,
}

impl ConnectArgs {
    /// Create connect arguments with no positional part.
    pub fn from_options(options: ConnectOptions) -> Self {
        Self {
            args: Vec::new(),
            options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_insert_replaces_and_keeps_order() {
        let mut opts = ConnectOptions::new();
        opts.insert("host", "db1");
        opts.insert("user", "sa");
        opts.insert("host", "db2");

        assert_eq!(opts.keys().collect::<Vec<_>>(), vec!["host", "user"]);
        assert_eq!(opts.get_str("host"), Some("db2"));
    }

    #[test]
    fn test_remove_shifts() {
        let mut opts: ConnectOptions =
            [("a", 1i64), ("b", 2), ("c", 3)].into_iter().collect();
        assert_eq!(opts.remove("b"), Some(OptionValue::Int(2)));
        assert_eq!(opts.keys().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(opts.remove("b"), None);
    }

    #[test]
    fn test_option_value_coercions() {
        assert_eq!(OptionValue::from("1433").as_int(), Some(1433));
        assert_eq!(OptionValue::from("yes").as_bool(), Some(true));
        assert_eq!(OptionValue::from(false).as_bool(), Some(false));
        assert_eq!(OptionValue::from("maybe").as_bool(), None);
        assert_eq!(OptionValue::from(7u16).to_string(), "7");
    }

    #[test]
    fn test_redacted_json_hides_password() {
        let mut opts = ConnectOptions::new();
        opts.insert("user", "sa");
        opts.insert("password", "hunter2");
        opts.insert("use_ssl", false);

        let json = opts.redacted_json();
        assert_eq!(json, r#"{"user":"sa","password":"***","use_ssl":false}"#);
    }
}
