//! Composable authorization policies.
//!
//! A [`Policy`] is a pure value answering one question: may the caller
//! perform this [`Action`]? The variant set is closed. New grant sources
//! are added by nesting [`Policy::Union`] branches, never by widening an
//! existing variant.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PermissionError;
use crate::request::{OperationId, UserId};

/// Per-operation role, totally ordered.
///
/// `NoAccess < Read < Write < Admin`. Holding a role implies every role
/// below it: a writer may read, an operation admin may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Explicitly no access
    NoAccess = 0,
    /// May read the operation and its content
    Read = 1,
    /// May add and modify content
    Write = 2,
    /// May change the operation itself and its members
    Admin = 3,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::NoAccess => write!(f, "noaccess"),
            Role::Read => write!(f, "read"),
            Role::Write => write!(f, "write"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// Snapshot of one user's roles, keyed by operation.
///
/// Absent entries mean [`Role::NoAccess`].
pub type OperationRoleMap = HashMap<OperationId, Role>;

/// An attempted action, checked against a [`Policy`].
///
/// Actions carrying an `operation_id` are resource scoped and need a
/// minimum [`Role`] on that operation. The rest depend on identity only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Caller is any logged-in user
    LoggedIn,
    /// Caller holds the global administrator flag
    GlobalAdmin,
    /// List the API keys of a user
    ListApiKeys {
        /// Target user
        user_id: UserId,
    },
    /// Create an API key for a user
    CreateApiKey {
        /// Target user
        user_id: UserId,
    },
    /// Delete one of a user's API keys
    DeleteApiKey {
        /// Target user
        user_id: UserId,
    },
    /// Change a user's profile
    ModifyUser {
        /// Target user
        user_id: UserId,
    },
    /// Create a new operation
    CreateOperation,
    /// List operations visible to the caller
    ListOperations,
    /// Read an operation's summary
    ReadOperation {
        /// Target operation
        operation_id: OperationId,
    },
    /// Read evidence of an operation
    ReadEvidence {
        /// Target operation
        operation_id: OperationId,
    },
    /// Read findings of an operation
    ReadFindings {
        /// Target operation
        operation_id: OperationId,
    },
    /// Create, change or delete evidence
    ModifyEvidence {
        /// Target operation
        operation_id: OperationId,
    },
    /// Create, change or delete findings
    ModifyFindings {
        /// Target operation
        operation_id: OperationId,
    },
    /// Create, change or delete tags
    ModifyTags {
        /// Target operation
        operation_id: OperationId,
    },
    /// Rename or otherwise change the operation itself
    ModifyOperation {
        /// Target operation
        operation_id: OperationId,
    },
    /// Grant or revoke roles on the operation
    ModifyOperationRoles {
        /// Target operation
        operation_id: OperationId,
    },
    /// Delete the operation
    DeleteOperation {
        /// Target operation
        operation_id: OperationId,
    },
}

impl Action {
    /// Stable name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Action::LoggedIn => "logged_in",
            Action::GlobalAdmin => "global_admin",
            Action::ListApiKeys { .. } => "list_api_keys",
            Action::CreateApiKey { .. } => "create_api_key",
            Action::DeleteApiKey { .. } => "delete_api_key",
            Action::ModifyUser { .. } => "modify_user",
            Action::CreateOperation => "create_operation",
            Action::ListOperations => "list_operations",
            Action::ReadOperation { .. } => "read_operation",
            Action::ReadEvidence { .. } => "read_evidence",
            Action::ReadFindings { .. } => "read_findings",
            Action::ModifyEvidence { .. } => "modify_evidence",
            Action::ModifyFindings { .. } => "modify_findings",
            Action::ModifyTags { .. } => "modify_tags",
            Action::ModifyOperation { .. } => "modify_operation",
            Action::ModifyOperationRoles { .. } => "modify_operation_roles",
            Action::DeleteOperation { .. } => "delete_operation",
        }
    }

    /// Target operation for resource-scoped actions.
    pub fn operation_id(&self) -> Option<OperationId> {
        match *self {
            Action::ReadOperation { operation_id }
            | Action::ReadEvidence { operation_id }
            | Action::ReadFindings { operation_id }
            | Action::ModifyEvidence { operation_id }
            | Action::ModifyFindings { operation_id }
            | Action::ModifyTags { operation_id }
            | Action::ModifyOperation { operation_id }
            | Action::ModifyOperationRoles { operation_id }
            | Action::DeleteOperation { operation_id } => Some(operation_id),
            _ => None,
        }
    }

    /// Lowest role on [`operation_id`](Self::operation_id) that permits this action.
    pub fn minimum_role(&self) -> Option<Role> {
        match self {
            Action::ReadOperation { .. }
            | Action::ReadEvidence { .. }
            | Action::ReadFindings { .. } => Some(Role::Read),
            Action::ModifyEvidence { .. }
            | Action::ModifyFindings { .. }
            | Action::ModifyTags { .. } => Some(Role::Write),
            Action::ModifyOperation { .. }
            | Action::ModifyOperationRoles { .. }
            | Action::DeleteOperation { .. } => Some(Role::Admin),
            _ => None,
        }
    }

    /// User whose own data the action touches, for per-user actions.
    fn subject_user(&self) -> Option<UserId> {
        match *self {
            Action::ListApiKeys { user_id }
            | Action::CreateApiKey { user_id }
            | Action::DeleteApiKey { user_id }
            | Action::ModifyUser { user_id } => Some(user_id),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.operation_id(), self.subject_user()) {
            (Some(op), _) => write!(f, "{}(operation={})", self.name(), op),
            (None, Some(user)) => write!(f, "{}(user={})", self.name(), user),
            (None, None) => f.write_str(self.name()),
        }
    }
}

/// Authorization policy for one request.
///
/// Built once per request and never mutated. Cloning is cheap for the
/// identity variants; `Operation` clones its role snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Policy {
    /// Rejects every action
    #[default]
    Deny,
    /// Grants identity-only actions for a user
    Authenticated {
        /// Caller
        user_id: UserId,
        /// Global administrator flag
        is_admin: bool,
    },
    /// Grants operation-scoped actions by role comparison
    Operation {
        /// Caller
        user_id: UserId,
        /// Caller's roles, loaded for this request
        roles: OperationRoleMap,
    },
    /// Grants when either branch grants; the left branch is tried first
    Union(Box<Policy>, Box<Policy>),
}

/// Outcome of evaluating a policy, with the variants visited in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    result: Result<(), PermissionError>,
    evaluated: Vec<&'static str>,
}

impl Decision {
    /// Whether the action was granted.
    pub fn is_granted(&self) -> bool {
        self.result.is_ok()
    }

    /// Variant names in evaluation order (`"union"`, `"deny"`, ...).
    pub fn evaluated(&self) -> &[&'static str] {
        &self.evaluated
    }

    /// Converts into the plain check result.
    pub fn into_result(self) -> Result<(), PermissionError> {
        self.result
    }
}

impl Policy {
    /// OR-combination of two policies.
    pub fn union(first: Policy, second: Policy) -> Policy {
        Policy::Union(Box::new(first), Box::new(second))
    }

    /// Nests every policy into unions, evaluated in iteration order.
    ///
    /// An empty iterator yields [`Policy::Deny`].
    pub fn any<I>(policies: I) -> Policy
    where
        I: IntoIterator<Item = Policy>,
        I::IntoIter: DoubleEndedIterator,
    {
        let mut iter = policies.into_iter().rev();
        let Some(last) = iter.next() else {
            return Policy::Deny;
        };
        iter.fold(last, |rest, p| Policy::union(p, rest))
    }

    /// Short variant name, used in logs and [`Decision::evaluated`].
    pub fn kind(&self) -> &'static str {
        match self {
            Policy::Deny => "deny",
            Policy::Authenticated { .. } => "authenticated",
            Policy::Operation { .. } => "operation",
            Policy::Union(..) => "union",
        }
    }

    /// Checks whether `action` is allowed.
    ///
    /// # Errors
    ///
    /// Returns the [`PermissionError`] of the last branch that denied.
    ///
    /// # Examples
    ///
    /// ```
    /// use policy_guard::{Action, Policy, Role};
    ///
    /// let policy = Policy::union(
    ///     Policy::Authenticated { user_id: 7, is_admin: false },
    ///     Policy::Operation { user_id: 7, roles: [(1, Role::Write)].into_iter().collect() },
    /// );
    ///
    /// assert!(policy.check(&Action::ModifyEvidence { operation_id: 1 }).is_ok());
    /// assert!(policy.check(&Action::DeleteOperation { operation_id: 1 }).is_err());
    /// assert!(policy.check(&Action::ReadEvidence { operation_id: 2 }).is_err());
    /// ```
    pub fn check(&self, action: &Action) -> Result<(), PermissionError> {
        self.decide(action).into_result()
    }

    /// Evaluates `action` and records which variants were visited.
    pub fn decide(&self, action: &Action) -> Decision {
        let mut evaluated = Vec::new();
        let result = self.evaluate(action, &mut evaluated);
        Decision { result, evaluated }
    }

    fn evaluate(
        &self,
        action: &Action,
        evaluated: &mut Vec<&'static str>,
    ) -> Result<(), PermissionError> {
        evaluated.push(self.kind());
        match self {
            Policy::Deny => Err(PermissionError::new(action.name(), "deny policy")),
            Policy::Authenticated { user_id, is_admin } => {
                check_authenticated(*user_id, *is_admin, action)
            }
            Policy::Operation { roles, .. } => check_operation(roles, action),
            Policy::Union(first, second) => match first.evaluate(action, evaluated) {
                Ok(()) => Ok(()),
                Err(_) => second.evaluate(action, evaluated),
            },
        }
    }
}

fn check_authenticated(user_id: UserId, is_admin: bool, action: &Action) -> Result<(), PermissionError> {
    let deny = |reason: &str| Err(PermissionError::new(action.name(), reason));

    if user_id <= 0 {
        return deny("no user");
    }
    // Global admins hold every permission, operation-scoped ones included.
    if is_admin {
        return Ok(());
    }
    if action.operation_id().is_some() {
        return deny("operation-scoped action needs an operation role");
    }
    match action {
        Action::LoggedIn | Action::CreateOperation | Action::ListOperations => Ok(()),
        Action::GlobalAdmin => deny("caller is not a global admin"),
        _ => match action.subject_user() {
            Some(subject) if subject == user_id => Ok(()),
            Some(_) => deny("action targets another user"),
            None => deny("not an identity-only action"),
        },
    }
}

fn check_operation(roles: &OperationRoleMap, action: &Action) -> Result<(), PermissionError> {
    let (Some(operation_id), Some(minimum)) = (action.operation_id(), action.minimum_role()) else {
        return Err(PermissionError::new(action.name(), "not an operation-scoped action"));
    };
    let held = roles.get(&operation_id).copied().unwrap_or(Role::NoAccess);
    if held >= minimum {
        Ok(())
    } else {
        Err(PermissionError::new(
            action.name(),
            format!("role {held} on operation {operation_id} is below {minimum}"),
        ))
    }
}
