use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use super::bounded;
use super::domain::{Email, Page, ProfileUpdate, Role, User, UserId};
use super::error::MarketplaceError;
use super::policy::{AccessPolicy, Caller};
use super::repository::{RepositoryError, UserQuery, UserRepository};

const RECENT_LIMIT: usize = 6;

/// Sign-up payload.
#[derive(Debug, Clone)]
pub struct Registration {
    pub email: Email,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegisterOutcome {
    #[serde(rename_all = "camelCase")]
    Created { inserted_id: UserId },
    Exists { message: &'static str },
}

/// User documents and role administration.
#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserRepository>,
    policy: AccessPolicy,
    timeout: Duration,
}

impl UserService {
    pub fn new(users: Arc<dyn UserRepository>, timeout: Duration) -> Self {
        let policy = AccessPolicy::new(users.clone(), timeout);
        Self {
            users,
            policy,
            timeout,
        }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Unknown or malformed e-mails resolve to no role.
    pub async fn role_of(&self, email: &str) -> Result<Option<Role>, MarketplaceError> {
        match Email::parse(email) {
            Ok(email) => self.policy.role_of(&email).await,
            Err(_) => Ok(None),
        }
    }

    pub async fn list(&self, query: UserQuery, page: Page) -> Result<Vec<User>, MarketplaceError> {
        Ok(bounded(self.timeout, self.users.list(&query, page)).await?)
    }

    pub async fn recent(&self, role: Option<Role>) -> Result<Vec<User>, MarketplaceError> {
        let query = UserQuery {
            role,
            ..UserQuery::default()
        };
        self.list(query, Page::first(RECENT_LIMIT)).await
    }

    /// Insert-if-absent. Self-registration cannot claim the Admin role.
    pub async fn register(
        &self,
        registration: Registration,
    ) -> Result<RegisterOutcome, MarketplaceError> {
        if registration.role == Some(Role::Admin) {
            return Err(MarketplaceError::forbidden(
                "the admin role cannot be self-assigned",
            ));
        }

        let exists = RegisterOutcome::Exists {
            message: "User exists",
        };
        if bounded(self.timeout, self.users.find_by_email(&registration.email))
            .await?
            .is_some()
        {
            return Ok(exists);
        }

        let user = User {
            id: UserId::new(),
            email: registration.email,
            display_name: registration.display_name,
            photo_url: registration.photo_url,
            role: registration.role,
            created_at: Utc::now(),
        };
        match bounded(self.timeout, self.users.insert(user)).await {
            Ok(user) => {
                tracing::info!(user_id = %user.id, email = %user.email, "user registered");
                Ok(RegisterOutcome::Created {
                    inserted_id: user.id,
                })
            }
            Err(RepositoryError::Conflict) => Ok(exists),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn update_profile(
        &self,
        caller: &Caller,
        email: &str,
        update: ProfileUpdate,
    ) -> Result<User, MarketplaceError> {
        let target = Email::parse(email)?;
        self.policy.require_owner_or_admin(caller, &target).await?;
        if update.is_empty() {
            return Err(MarketplaceError::validation(
                "provide displayName or photoURL",
            ));
        }
        Ok(bounded(self.timeout, self.users.update_profile(&target, &update)).await?)
    }

    pub async fn set_role(
        &self,
        caller: &Caller,
        id: UserId,
        role: Role,
    ) -> Result<User, MarketplaceError> {
        self.policy.require_role(caller, Role::Admin).await?;
        let user = bounded(self.timeout, self.users.set_role(&id, role)).await?;
        tracing::info!(user_id = %id, role = %role, by = %caller.email, "user role changed");
        Ok(user)
    }

    pub async fn delete(&self, caller: &Caller, id: UserId) -> Result<(), MarketplaceError> {
        self.policy.require_role(caller, Role::Admin).await?;
        bounded(self.timeout, self.users.delete(&id)).await?;
        tracing::info!(user_id = %id, by = %caller.email, "user deleted");
        Ok(())
    }

    /// Operator path that bypasses the admin check; creates the user when absent.
    pub async fn grant_role(&self, email: Email, role: Role) -> Result<User, MarketplaceError> {
        let user = match bounded(self.timeout, self.users.find_by_email(&email)).await? {
            Some(existing) => bounded(self.timeout, self.users.set_role(&existing.id, role)).await?,
            None => {
                let user = User {
                    id: UserId::new(),
                    email,
                    display_name: None,
                    photo_url: None,
                    role: Some(role),
                    created_at: Utc::now(),
                };
                bounded(self.timeout, self.users.insert(user)).await?
            }
        };
        tracing::info!(user_id = %user.id, email = %user.email, role = %role, "role granted");
        Ok(user)
    }
}
