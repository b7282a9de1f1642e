//! Identity and authorization
//!
//! The acting user's id drives echo suppression; the permission flags gate
//! every write path (autosave and manual save).

use crate::ids::UserId;

/// Write permissions for the currently open document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permissions {
    /// The user may write to the document
    pub can_write: bool,
    /// The document itself is read-only (archived, locked, ...)
    pub is_read_only: bool,
}

impl Permissions {
    /// Full write access
    pub fn writable() -> Self {
        Self {
            can_write: true,
            is_read_only: false,
        }
    }

    /// Read-only access
    pub fn read_only() -> Self {
        Self {
            can_write: false,
            is_read_only: true,
        }
    }

    /// Whether saves are allowed at all
    pub fn allows_save(&self) -> bool {
        self.can_write && !self.is_read_only
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::writable()
    }
}

/// The acting user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    user_id: UserId,
}

impl Identity {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// Identity for an anonymous client session
    ///
    /// Gets a random id so its own edits are still filtered as echoes.
    pub fn anonymous() -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        Self::new(format!("anon-{}", &id[..8]))
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Whether a message originated from this user
    pub fn is_self(&self, origin: &UserId) -> bool {
        &self.user_id == origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permissions() {
        assert!(Permissions::writable().allows_save());
        assert!(!Permissions::read_only().allows_save());

        let locked = Permissions {
            can_write: true,
            is_read_only: true,
        };
        assert!(!locked.allows_save());
    }

    #[test]
    fn test_anonymous_identity() {
        let a = Identity::anonymous();
        let b = Identity::anonymous();
        assert!(a.user_id().as_str().starts_with("anon-"));
        assert_ne!(a, b);
        assert!(a.is_self(a.user_id()));
        assert!(!a.is_self(b.user_id()));
    }
}
