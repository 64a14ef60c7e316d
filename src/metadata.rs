//! `Metadata`: provenance attached to ops during buffer injection and
//! carried through to each `ScheduleItem`. Compared and hashed by value,
//! never by identity — two ops created from the same tensor-front-end call
//! site should collapse to one `Metadata` in `ScheduleItem::metadata`.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Metadata {
    pub name: String,
    pub caller: Option<String>,
}

impl Metadata {
    pub fn new(name: impl Into<String>) -> Self {
        Metadata { name: name.into(), caller: None }
    }

    pub fn with_caller(name: impl Into<String>, caller: impl Into<String>) -> Self {
        Metadata { name: name.into(), caller: Some(caller.into()) }
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.caller {
            Some(c) => write!(f, "{} <- {c}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_by_value_not_identity() {
        let a = Metadata::new("mul");
        let b = Metadata::new("mul");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_callers_are_distinct() {
        let a = Metadata::with_caller("mul", "layer1");
        let b = Metadata::with_caller("mul", "layer2");
        assert_ne!(a, b);
    }
}
