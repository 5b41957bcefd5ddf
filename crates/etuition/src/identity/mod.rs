//! Bearer-credential verification.

mod firebase;

use async_trait::async_trait;

use crate::marketplace::domain::Email;

pub use firebase::{project_id_from_service_key, FirebaseTokenVerifier};

/// Identity proven by a verified credential, valid for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub email: Email,
}

/// Port over the external identity provider.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError>;
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("credential missing")]
    MissingCredential,
    #[error("credential rejected: {0}")]
    InvalidToken(String),
    #[error("credential carries no verified e-mail")]
    MissingEmail,
    #[error("signing keys unavailable: {0}")]
    KeysUnavailable(String),
    #[error("signing key request timed out")]
    Timeout,
    #[error("identity provider misconfigured: {0}")]
    Configuration(String),
}

impl IdentityError {
    /// Whether the caller is at fault (as opposed to the provider or our configuration).
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            IdentityError::MissingCredential
                | IdentityError::InvalidToken(_)
                | IdentityError::MissingEmail
        )
    }
}
