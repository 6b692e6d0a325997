use crate::value::{Item, Value};

/// Server-side predicate evaluated atomically with a write.
///
/// The store rejects a guarded write when the predicate does not hold
/// against the current row, where "current row" may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Holds when the row is absent or lacks the attribute.
    NotExists(String),
    /// Holds when the attribute is present and equal to the value.
    Equals(String, Value),
    /// Holds when the attribute is numeric and `>=` the numeric value.
    AtLeast(String, Value),
    /// Holds when every branch holds.
    And(Vec<Condition>),
    /// Holds when at least one branch holds.
    Or(Vec<Condition>),
}

impl Condition {
    /// `attribute_not_exists(attr)`.
    pub fn not_exists(attr: impl Into<String>) -> Self {
        Self::NotExists(attr.into())
    }

    /// `attr = value`.
    pub fn equals(attr: impl Into<String>, value: Value) -> Self {
        Self::Equals(attr.into(), value)
    }

    /// `attr >= value` (numeric attributes only).
    pub fn at_least(attr: impl Into<String>, value: Value) -> Self {
        Self::AtLeast(attr.into(), value)
    }

    /// Conjunction; flattens nested `And`s.
    pub fn and(self, other: Condition) -> Self {
        match self {
            Self::And(mut parts) => {
                parts.push(other);
                Self::And(parts)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Disjunction; flattens nested `Or`s.
    pub fn or(self, other: Condition) -> Self {
        match self {
            Self::Or(mut parts) => {
                parts.push(other);
                Self::Or(parts)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    /// Evaluates the predicate against a row, `None` meaning the row is
    /// absent.
    pub fn eval(&self, item: Option<&Item>) -> bool {
        match self {
            Self::NotExists(attr) => item.is_none_or(|i| !i.contains_key(attr)),
            Self::Equals(attr, value) => {
                item.and_then(|i| i.get(attr)).is_some_and(|v| v == value)
            }
            Self::AtLeast(attr, value) => {
                match (item.and_then(|i| i.get(attr)), value) {
                    (Some(Value::N(have)), Value::N(want)) => have >= want,
                    _ => false,
                }
            }
            Self::And(parts) => parts.iter().all(|c| c.eval(item)),
            Self::Or(parts) => parts.iter().any(|c| c.eval(item)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn not_exists_holds_on_absent_row() {
        assert!(Condition::not_exists("seat_id").eval(None));
    }

    #[test]
    fn not_exists_fails_when_attribute_present() {
        let item = row(&[("seat_id", Value::s("A-12"))]);
        assert!(!Condition::not_exists("seat_id").eval(Some(&item)));
        assert!(Condition::not_exists("other").eval(Some(&item)));
    }

    #[test]
    fn equals_requires_presence() {
        let item = row(&[("status", Value::s("AVAILABLE"))]);
        assert!(Condition::equals("status", Value::s("AVAILABLE")).eval(Some(&item)));
        assert!(!Condition::equals("status", Value::s("SOLD")).eval(Some(&item)));
        assert!(!Condition::equals("status", Value::s("AVAILABLE")).eval(None));
    }

    #[test]
    fn at_least_is_numeric_only() {
        let item = row(&[("remaining", Value::n(5))]);
        assert!(Condition::at_least("remaining", Value::n(5)).eval(Some(&item)));
        assert!(Condition::at_least("remaining", Value::n(3)).eval(Some(&item)));
        assert!(!Condition::at_least("remaining", Value::n(6)).eval(Some(&item)));

        let text = row(&[("remaining", Value::s("5"))]);
        assert!(!Condition::at_least("remaining", Value::n(5)).eval(Some(&text)));
    }

    #[test]
    fn seat_sale_predicate_shape() {
        // attribute_not_exists(seat_id) OR status = AVAILABLE
        //   OR (status = HOLD AND reservation_id = rsv)
        let predicate = Condition::not_exists("seat_id")
            .or(Condition::equals("status", Value::s("AVAILABLE")))
            .or(Condition::equals("status", Value::s("HOLD"))
                .and(Condition::equals("reservation_id", Value::s("rsv_a"))));

        assert!(predicate.eval(None));

        let available = row(&[("seat_id", Value::s("A-12")), ("status", Value::s("AVAILABLE"))]);
        assert!(predicate.eval(Some(&available)));

        let own_hold = row(&[
            ("seat_id", Value::s("A-12")),
            ("status", Value::s("HOLD")),
            ("reservation_id", Value::s("rsv_a")),
        ]);
        assert!(predicate.eval(Some(&own_hold)));

        let foreign_hold = row(&[
            ("seat_id", Value::s("A-12")),
            ("status", Value::s("HOLD")),
            ("reservation_id", Value::s("rsv_b")),
        ]);
        assert!(!predicate.eval(Some(&foreign_hold)));

        let sold = row(&[
            ("seat_id", Value::s("A-12")),
            ("status", Value::s("SOLD")),
            ("reservation_id", Value::s("rsv_a")),
        ]);
        assert!(!predicate.eval(Some(&sold)));
    }

    #[test]
    fn and_or_flatten() {
        let three = Condition::not_exists("a")
            .and(Condition::not_exists("b"))
            .and(Condition::not_exists("c"));
        assert!(matches!(three, Condition::And(ref parts) if parts.len() == 3));

        let three = Condition::not_exists("a")
            .or(Condition::not_exists("b"))
            .or(Condition::not_exists("c"));
        assert!(matches!(three, Condition::Or(ref parts) if parts.len() == 3));
    }
}
