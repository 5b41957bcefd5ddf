use std::sync::Arc;
use std::time::Duration;

use super::bounded;
use super::domain::{Email, Role};
use super::error::MarketplaceError;
use super::repository::UserRepository;

/// Verified identity of the party making a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub email: Email,
}

impl Caller {
    pub fn new(email: Email) -> Self {
        Self { email }
    }

    /// Checks a client-supplied `email` parameter against the verified identity.
    pub fn require_self(&self, claimed: &str) -> Result<(), MarketplaceError> {
        match Email::parse(claimed) {
            Ok(email) if email == self.email => Ok(()),
            _ => Err(MarketplaceError::forbidden("forbidden access")),
        }
    }
}

/// Role lookups backed by the persisted user documents.
#[derive(Clone)]
pub struct AccessPolicy {
    users: Arc<dyn UserRepository>,
    timeout: Duration,
}

impl AccessPolicy {
    pub fn new(users: Arc<dyn UserRepository>, timeout: Duration) -> Self {
        Self { users, timeout }
    }

    pub async fn role_of(&self, email: &Email) -> Result<Option<Role>, MarketplaceError> {
        let user = bounded(self.timeout, self.users.find_by_email(email)).await?;
        Ok(user.and_then(|user| user.role))
    }

    /// Missing user documents and mismatched roles are both `Forbidden`.
    pub async fn require_role(&self, caller: &Caller, role: Role) -> Result<(), MarketplaceError> {
        match self.role_of(&caller.email).await? {
            Some(actual) if actual == role => Ok(()),
            actual => {
                tracing::debug!(
                    caller = %caller.email,
                    required = %role,
                    actual = ?actual,
                    "role check failed"
                );
                Err(MarketplaceError::forbidden("forbidden access"))
            }
        }
    }

    pub async fn is_admin(&self, caller: &Caller) -> Result<bool, MarketplaceError> {
        Ok(self.role_of(&caller.email).await? == Some(Role::Admin))
    }

    pub async fn require_owner_or_admin(
        &self,
        caller: &Caller,
        owner: &Email,
    ) -> Result<(), MarketplaceError> {
        if &caller.email == owner || self.is_admin(caller).await? {
            Ok(())
        } else {
            Err(MarketplaceError::forbidden("forbidden access"))
        }
    }
}
