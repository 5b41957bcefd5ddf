use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::header::CACHE_CONTROL;
use serde::Deserialize;
use tokio::sync::RwLock;

use super::{IdentityError, TokenVerifier, VerifiedIdentity};
use crate::config::IdentityConfig;
use crate::marketplace::domain::Email;

const DEFAULT_KEY_TTL: Duration = Duration::from_secs(3600);

#[derive(Deserialize)]
struct ServiceAccount {
    project_id: String,
}

/// Extracts the project id from a base64-encoded service-account JSON document.
pub fn project_id_from_service_key(encoded: &str) -> Result<String, IdentityError> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|err| IdentityError::Configuration(format!("service key is not base64: {err}")))?;
    let account: ServiceAccount = serde_json::from_slice(&bytes).map_err(|err| {
        IdentityError::Configuration(format!("service key is not a service account: {err}"))
    })?;
    if account.project_id.trim().is_empty() {
        return Err(IdentityError::Configuration(
            "service account has an empty project_id".to_string(),
        ));
    }
    Ok(account.project_id)
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    email: Option<String>,
}

struct CachedKeys {
    set: JwkSet,
    expires_at: Instant,
}

/// Verifies Firebase ID tokens (RS256) against the provider's published key set.
pub struct FirebaseTokenVerifier {
    client: reqwest::Client,
    jwks_url: String,
    project_id: String,
    keys: RwLock<Option<CachedKeys>>,
}

impl FirebaseTokenVerifier {
    pub fn new(
        project_id: impl Into<String>,
        jwks_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                IdentityError::Configuration(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            client,
            jwks_url: jwks_url.into(),
            project_id: project_id.into(),
            keys: RwLock::new(None),
        })
    }

    pub fn from_config(config: &IdentityConfig, timeout: Duration) -> Result<Self, IdentityError> {
        let encoded = config
            .require_service_account_key()
            .map_err(|err| IdentityError::Configuration(err.to_string()))?;
        let project_id = project_id_from_service_key(encoded)?;
        Self::new(project_id, config.jwks_url.clone(), timeout)
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, IdentityError> {
        {
            let guard = self.keys.read().await;
            if let Some(cached) = guard.as_ref() {
                if cached.expires_at > Instant::now() {
                    if let Some(jwk) = cached.set.find(kid) {
                        return DecodingKey::from_jwk(jwk)
                            .map_err(|err| IdentityError::InvalidToken(err.to_string()));
                    }
                }
            }
        }

        // Unknown kid or stale cache: the provider may have rotated its keys.
        let fresh = self.fetch_keys().await?;
        let key = fresh.set.find(kid).map(DecodingKey::from_jwk);
        *self.keys.write().await = Some(fresh);
        match key {
            Some(key) => key.map_err(|err| IdentityError::InvalidToken(err.to_string())),
            None => Err(IdentityError::InvalidToken(format!("unknown key id {kid}"))),
        }
    }

    async fn fetch_keys(&self) -> Result<CachedKeys, IdentityError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    IdentityError::Timeout
                } else {
                    IdentityError::KeysUnavailable(err.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(IdentityError::KeysUnavailable(format!(
                "key endpoint returned {}",
                response.status()
            )));
        }

        let ttl = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|value| value.to_str().ok())
            .and_then(max_age)
            .unwrap_or(DEFAULT_KEY_TTL);

        let set: JwkSet = response.json().await.map_err(|err| {
            if err.is_timeout() {
                IdentityError::Timeout
            } else {
                IdentityError::KeysUnavailable(format!("malformed key set: {err}"))
            }
        })?;
        tracing::debug!(keys = set.keys.len(), ttl_secs = ttl.as_secs(), "refreshed signing keys");

        Ok(CachedKeys {
            set,
            expires_at: Instant::now() + ttl,
        })
    }
}

fn max_age(header: &str) -> Option<Duration> {
    header.split(',').find_map(|directive| {
        directive
            .trim()
            .strip_prefix("max-age=")
            .and_then(|secs| secs.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    })
}

#[async_trait]
impl TokenVerifier for FirebaseTokenVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let header =
            decode_header(token).map_err(|err| IdentityError::InvalidToken(err.to_string()))?;
        if header.alg != Algorithm::RS256 {
            return Err(IdentityError::InvalidToken(format!(
                "unexpected algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| IdentityError::InvalidToken("token has no key id".to_string()))?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[format!(
            "https://securetoken.google.com/{}",
            self.project_id
        )]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);

        let data = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(|err| IdentityError::InvalidToken(err.to_string()))?;
        let email = data.claims.email.ok_or(IdentityError::MissingEmail)?;
        let email = Email::parse(&email).map_err(|_| IdentityError::MissingEmail)?;
        Ok(VerifiedIdentity { email })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_id_is_read_from_encoded_service_account() {
        let encoded = STANDARD.encode(r#"{"type":"service_account","project_id":"etuitionbd"}"#);
        assert_eq!(
            project_id_from_service_key(&encoded).expect("decodes"),
            "etuitionbd"
        );
    }

    #[test]
    fn malformed_service_key_is_a_configuration_error() {
        assert!(matches!(
            project_id_from_service_key("%%%"),
            Err(IdentityError::Configuration(_))
        ));
        let encoded = STANDARD.encode(r#"{"type":"service_account"}"#);
        assert!(matches!(
            project_id_from_service_key(&encoded),
            Err(IdentityError::Configuration(_))
        ));
    }

    #[test]
    fn max_age_directive_is_parsed() {
        assert_eq!(
            max_age("public, max-age=19204, must-revalidate, no-transform"),
            Some(Duration::from_secs(19204))
        );
        assert_eq!(max_age("no-cache"), None);
    }

    #[tokio::test]
    async fn garbage_token_is_rejected_before_any_key_fetch() {
        let verifier = FirebaseTokenVerifier::new(
            "etuitionbd",
            "http://127.0.0.1:9/unreachable",
            Duration::from_secs(1),
        )
        .expect("client builds");
        let err = verifier.verify("not-a-jwt").await.expect_err("rejected");
        assert!(err.is_credential_error());
    }
}
