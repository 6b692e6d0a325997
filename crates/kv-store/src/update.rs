use crate::value::{Item, Value};

/// One mutation applied by an update expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// `SET attr = value`.
    Set(String, Value),
    /// `ADD attr delta` — numeric; a missing attribute counts as 0.
    Add(String, i64),
    /// `REMOVE attr`.
    Remove(String),
}

/// Ordered list of actions applied atomically to a single row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Update {
    actions: Vec<Action>,
}

impl Update {
    /// Creates an empty update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a `SET` action.
    pub fn set(mut self, attr: impl Into<String>, value: Value) -> Self {
        self.actions.push(Action::Set(attr.into(), value));
        self
    }

    /// Appends an `ADD` action.
    pub fn add(mut self, attr: impl Into<String>, delta: i64) -> Self {
        self.actions.push(Action::Add(attr.into(), delta));
        self
    }

    /// Appends a `REMOVE` action.
    pub fn remove(mut self, attr: impl Into<String>) -> Self {
        self.actions.push(Action::Remove(attr.into()));
        self
    }

    /// Returns the actions in application order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Applies the actions to a row in place.
    pub fn apply(&self, item: &mut Item) {
        for action in &self.actions {
            match action {
                Action::Set(attr, value) => {
                    item.insert(attr.clone(), value.clone());
                }
                Action::Add(attr, delta) => {
                    let current = item.get(attr).and_then(Value::as_n).unwrap_or(0);
                    item.insert(attr.clone(), Value::N(current + delta));
                }
                Action::Remove(attr) => {
                    item.remove(attr);
                }
            }
        }
    }
}
