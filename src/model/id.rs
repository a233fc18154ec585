//! Node identity.

use std::fmt;
use std::sync::Arc;

/// A globally-unique node identifier within a runtime.
///
/// Cloning an `Id` is an `Arc` bump, not a string copy, since ids are
/// threaded through every dependency handle, event emission and durable
/// step key.
#[derive(Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Id(Arc<str>);

impl Id {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespaces this id under a prefix, used by `fork` to re-id a
    /// transitively registered subgraph.
    pub fn namespaced(&self, prefix: &str) -> Self {
        Self(Arc::from(format!("{prefix}.{}", self.0).as_str()))
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self(Arc::from(value.as_str()))
    }
}

impl From<&Id> for Id {
    fn from(value: &Id) -> Self {
        value.clone()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.0)
    }
}

impl std::borrow::Borrow<str> for Id {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespacing_prefixes_the_id() {
        let id = Id::from("base.task");
        assert_eq!(id.namespaced("fork1").as_str(), "fork1.base.task");
    }

    #[test]
    fn equal_strings_produce_equal_ids() {
        assert_eq!(Id::from("a"), Id::from("a".to_string()));
    }
}
