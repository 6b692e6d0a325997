use std::collections::{BTreeMap, HashMap};

/// A single attribute value as stored in the backing store.
///
/// Numbers are signed 64-bit; timestamps travel as RFC-3339 strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    /// UTF-8 string attribute.
    S(String),
    /// Numeric attribute.
    N(i64),
    /// Boolean attribute.
    Bool(bool),
}

impl Value {
    /// String attribute constructor.
    pub fn s(v: impl Into<String>) -> Self {
        Self::S(v.into())
    }

    /// Numeric attribute constructor.
    pub fn n(v: i64) -> Self {
        Self::N(v)
    }

    /// Boolean attribute constructor.
    pub fn bool(v: bool) -> Self {
        Self::Bool(v)
    }

    /// Returns the string payload, `None` for other variants.
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the numeric payload, `None` for other variants.
    pub fn as_n(&self) -> Option<i64> {
        match self {
            Self::N(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the boolean payload, `None` for other variants.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

/// A stored row: attribute name to value.
pub type Item = HashMap<String, Value>;

/// Primary key of a row.
///
/// Ordered so composite keys compare and hash deterministically no matter
/// how they were assembled.
pub type Key = BTreeMap<String, Value>;

/// Builds a key from attribute pairs.
pub fn key(parts: impl IntoIterator<Item = (&'static str, Value)>) -> Key {
    parts
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_match_variants() {
        assert_eq!(Value::s("x").as_s(), Some("x"));
        assert_eq!(Value::n(7).as_n(), Some(7));
        assert_eq!(Value::bool(true).as_bool(), Some(true));
        assert_eq!(Value::s("x").as_n(), None);
        assert_eq!(Value::n(7).as_s(), None);
    }

    #[test]
    fn composite_keys_are_order_insensitive() {
        let a = key([("event_id", Value::s("evt_1")), ("seat_id", Value::s("A-12"))]);
        let b = key([("seat_id", Value::s("A-12")), ("event_id", Value::s("evt_1"))]);
        assert_eq!(a, b);
    }
}
