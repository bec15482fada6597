//! Request identifiers.
//!
//! The coordinator correlates sandbox responses with requests through this
//! id, so it travels verbatim over the wire as a plain string.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one execution request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    /// Generates a fresh random id (UUID v4).
    pub fn generate() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_distinct() {
        let a = RequestId::generate();
        let b = RequestId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = RequestId::from("run-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"run-7\"");
        let back: RequestId = serde_json::from_str("\"run-7\"").unwrap();
        assert_eq!(back, id);
    }
}
