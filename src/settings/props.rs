//! # Flat property map.
//!
//! [`Props`] stores every setting as a string under a dotted key
//! (`cluster.port`, `process.web.command`, ...). Typed accessors parse on read and
//! report malformed values as [`ConfigError::InvalidValue`] naming the key.

use std::collections::BTreeMap;

use crate::error::ConfigError;

/// Ordered string map of settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Props {
    values: BTreeMap<String, String>,
}

impl Props {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw value, trimmed. Blank values count as unset.
    pub fn value(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    }

    /// Raw value or `default`.
    pub fn value_or(&self, key: &str, default: &str) -> String {
        self.value(key).unwrap_or_else(|| default.to_owned())
    }

    /// Boolean value (`true`/`false`, case-insensitive) or `default` when unset.
    pub fn value_as_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.value(key) {
            None => Ok(default),
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    key: key.to_owned(),
                    value: raw,
                    reason: "expected 'true' or 'false'".into(),
                }),
            },
        }
    }

    /// Unsigned integer value or `default` when unset.
    pub fn value_as_u64(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        match self.value(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_owned(),
                value: raw,
                reason: "expected a non-negative integer".into(),
            }),
        }
    }

    /// Sets a value, replacing any previous one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Sets a value only if the key is unset or blank.
    pub fn set_default(&mut self, key: &str, value: &str) {
        if self.value(key).is_none() {
            self.values.insert(key.to_owned(), value.to_owned());
        }
    }

    /// Copies every entry of `other` over this map.
    pub fn merge(&mut self, other: Props) {
        self.values.extend(other.values);
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no entry is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_is_unset() {
        let props: Props = [("a", "  "), ("b", " x ")].into_iter().collect();
        assert_eq!(props.value("a"), None);
        assert_eq!(props.value("b").as_deref(), Some("x"));
        assert_eq!(props.value_or("a", "d"), "d");
    }

    #[test]
    fn test_typed_accessors() {
        let props: Props = [("on", "TRUE"), ("n", "42"), ("bad", "maybe")].into_iter().collect();
        assert!(props.value_as_bool("on", false).unwrap());
        assert!(props.value_as_bool("missing", true).unwrap());
        assert_eq!(props.value_as_u64("n", 0).unwrap(), 42);

        let err = props.value_as_bool("bad", false).unwrap_err();
        assert!(err.to_string().contains("'maybe'"));
        assert!(err.to_string().contains("'bad'"));
    }

    #[test]
    fn test_set_default_keeps_existing() {
        let mut props = Props::new();
        props.set("k", "v");
        props.set_default("k", "other");
        props.set_default("j", "w");
        assert_eq!(props.value("k").as_deref(), Some("v"));
        assert_eq!(props.value("j").as_deref(), Some("w"));
    }
}
