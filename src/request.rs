/// Identifier of a user row.
///
/// `0` is never a real user; it is the value reported for anonymous callers.
pub type UserId = i64;

/// Identifier of an operation row.
pub type OperationId = i64;

/// The resolved caller of one request.
///
/// Produced by the signature verifier or the session resolver and never
/// persisted by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    /// Authenticated user
    pub user_id: UserId,
    /// Whether the user holds the global administrator flag
    pub is_admin: bool,
}

impl Identity {
    /// Creates an identity for a regular (non-admin) user.
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: false,
        }
    }

    /// Creates an identity for a global administrator.
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            is_admin: true,
        }
    }
}
