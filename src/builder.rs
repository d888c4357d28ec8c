use std::sync::Arc;

use crate::context::RequestContext;
use crate::policy::Policy;
use crate::request::Identity;
use crate::store::RoleStore;

/// Builds the per-request policy for a resolved identity.
///
/// The policy is
///
/// ```text
/// Union(Authenticated(user, is_admin), Operation(user, roles))
/// ```
///
/// with `roles` freshly loaded from the [`RoleStore`]. Nothing is cached, so
/// a revoked role stops granting on the very next request. If the role query
/// fails the policy is [`Policy::Deny`]: the request stays authenticated but
/// every check fails.
#[derive(Clone)]
pub struct PolicyBuilder {
    roles: Arc<dyn RoleStore>,
}

impl PolicyBuilder {
    /// Creates a builder reading roles from `roles`.
    pub fn new(roles: Arc<dyn RoleStore>) -> Self {
        Self { roles }
    }

    /// Loads roles for `identity` and composes its policy.
    pub async fn build_policy(&self, identity: Identity) -> Policy {
        match self.roles.operation_roles_for_user(identity.user_id).await {
            Ok(roles) => Policy::union(
                Policy::Authenticated {
                    user_id: identity.user_id,
                    is_admin: identity.is_admin,
                },
                Policy::Operation {
                    user_id: identity.user_id,
                    roles,
                },
            ),
            Err(error) => {
                tracing::error!(
                    %error,
                    user_id = identity.user_id,
                    "role lookup failed, denying every action for this request"
                );
                Policy::Deny
            }
        }
    }

    /// Builds the full request context for `identity`.
    pub async fn build_context(&self, request_id: impl Into<String>, identity: Identity) -> RequestContext {
        let policy = self.build_policy(identity).await;
        RequestContext::for_identity(request_id, identity, policy)
    }
}

impl std::fmt::Debug for PolicyBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyBuilder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{Action, Role};
    use crate::store::MemoryStore;

    fn builder() -> (Arc<MemoryStore>, PolicyBuilder) {
        let store = Arc::new(MemoryStore::new());
        store.set_role(4, 100, Role::Write);
        (store.clone(), PolicyBuilder::new(store))
    }

    #[tokio::test]
    async fn composes_authenticated_and_operation() {
        let (_, builder) = builder();
        let policy = builder.build_policy(Identity::user(4)).await;

        match &policy {
            Policy::Union(first, second) => {
                assert_eq!(first.kind(), "authenticated");
                assert_eq!(second.kind(), "operation");
            }
            other => panic!("unexpected policy {:?}", other),
        }
        assert!(policy.check(&Action::LoggedIn).is_ok());
        assert!(policy.check(&Action::ModifyFindings { operation_id: 100 }).is_ok());
        assert!(policy.check(&Action::ReadFindings { operation_id: 101 }).is_err());
    }

    #[tokio::test]
    async fn role_failure_denies_everything() {
        let (store, builder) = builder();
        store.fail_role_queries(true);

        let ctx = builder.build_context("req-fail", Identity::admin(4)).await;
        assert_eq!(ctx.user_id(), 4);
        assert!(ctx.is_admin());
        assert_eq!(ctx.policy(), &Policy::Deny);
        assert!(ctx.require(&Action::LoggedIn).is_err());
        assert!(ctx.require(&Action::ReadOperation { operation_id: 100 }).is_err());
    }

    #[tokio::test]
    async fn revocation_applies_to_next_build() {
        let (store, builder) = builder();
        let before = builder.build_policy(Identity::user(4)).await;
        store.revoke_role(4, 100);
        let after = builder.build_policy(Identity::user(4)).await;

        let action = Action::ReadEvidence { operation_id: 100 };
        assert!(before.check(&action).is_ok());
        assert!(after.check(&action).is_err());
    }
}
