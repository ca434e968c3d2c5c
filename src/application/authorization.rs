use crate::domain::actor::{Actor, Role, UserId};
use crate::domain::ports::{Authorizer, RecipientVerifier};
use crate::domain::remittance::Remittance;
use crate::error::{FulfillmentError, Result};
use async_trait::async_trait;

/// Authorizer that trusts the roles carried by the [`Actor`].
#[derive(Debug, Default, Clone)]
pub struct RoleAuthorizer;

#[async_trait]
impl Authorizer for RoleAuthorizer {
    async fn require_role(&self, actor: &Actor, allowed: &[Role]) -> Result<()> {
        if actor.has_any_role(allowed) {
            Ok(())
        } else {
            Err(FulfillmentError::Authorization(format!(
                "User {} lacks any of the roles {:?}",
                actor.id, allowed
            )))
        }
    }
}

/// Accepts a recipient when the presented token equals the one issued at
/// remittance creation.
#[derive(Debug, Default, Clone)]
pub struct TokenRecipientVerifier;

#[async_trait]
impl RecipientVerifier for TokenRecipientVerifier {
    async fn verify(&self, remittance: &Remittance, token: &str) -> Result<bool> {
        let expected = remittance.confirmation_token.as_bytes();
        let presented = token.as_bytes();
        if expected.is_empty() || expected.len() != presented.len() {
            return Ok(false);
        }
        // Constant-time comparison over equal-length inputs.
        let diff = expected
            .iter()
            .zip(presented)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));
        Ok(diff == 0)
    }
}

pub(crate) fn ensure_owner(actor: &Actor, owner: UserId, what: &str) -> Result<()> {
    if actor.id == owner {
        Ok(())
    } else {
        Err(FulfillmentError::Authorization(format!(
            "User {} does not own {}",
            actor.id, what
        )))
    }
}

pub(crate) fn ensure_owner_or_admin(actor: &Actor, owner: UserId, what: &str) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        ensure_owner(actor, owner, what)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::ADMIN_ROLES;

    #[tokio::test]
    async fn test_role_authorizer() {
        let authorizer = RoleAuthorizer;
        let admin = Actor::admin(UserId::new());
        let customer = Actor::customer(UserId::new());

        assert!(authorizer.require_admin(&admin).await.is_ok());
        assert!(matches!(
            authorizer.require_role(&customer, ADMIN_ROLES).await,
            Err(FulfillmentError::Authorization(_))
        ));
    }

    #[test]
    fn test_ownership_checks() {
        let owner = UserId::new();
        let customer = Actor::customer(owner);
        let stranger = Actor::customer(UserId::new());
        let admin = Actor::admin(UserId::new());

        assert!(ensure_owner(&customer, owner, "order").is_ok());
        assert!(ensure_owner(&stranger, owner, "order").is_err());
        assert!(ensure_owner(&admin, owner, "order").is_err());
        assert!(ensure_owner_or_admin(&admin, owner, "order").is_ok());
    }
}
