//! Identifier types
//!
//! Documents, workspaces and users are identified by opaque server-assigned
//! strings. The newtypes keep them from being mixed up at call sites.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of an open document
    DocumentId
);

string_id!(
    /// Identifier of the workspace a document belongs to
    WorkspaceId
);

string_id!(
    /// Identifier of the acting user
    UserId
);

impl DocumentId {
    /// Inbound topic every collaborator on this document subscribes to
    pub fn topic_address(&self) -> String {
        format!("/topic/document/{}", self.0)
    }

    /// Outbound command address for edits to this document
    pub fn edit_address(&self) -> String {
        format!("/app/document/{}/edit", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses_are_scoped_per_document() {
        let id = DocumentId::from("42");
        assert_eq!(id.topic_address(), "/topic/document/42");
        assert_eq!(id.edit_address(), "/app/document/42/edit");
    }

    #[test]
    fn test_serde_transparent() {
        let id = UserId::new("u-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"u-1\"");
        let parsed: UserId = serde_json::from_str("\"u-1\"").unwrap();
        assert_eq!(parsed, id);
    }
}
