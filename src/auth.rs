use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

use crate::{config::AppConfig, models::RoleMask};

/// TokenKind
///
/// Users call the management API; machines only report execution records. A token of one
/// kind is never accepted where the other is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    User,
    Machine,
}

/// Claims
///
/// The payload carried inside every bearer token minted for this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user or machine name.
    pub sub: String,
    /// Organization name the subject belongs to.
    pub org: String,
    /// Role bitmask (always empty for machine tokens).
    #[serde(default)]
    pub role: u32,
    pub kind: TokenKind,
    /// Token id, unique per issuance.
    pub jti: Uuid,
    pub iat: usize,
    pub exp: usize,
}

/// UserClaims
///
/// What a valid user token says about its bearer.
#[derive(Debug, Clone, PartialEq)]
pub struct UserClaims {
    pub user: String,
    pub organization: String,
    pub role: RoleMask,
}

/// MachineClaims
///
/// What a valid machine token says about the agent presenting it.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineClaims {
    pub machine: String,
    pub organization: String,
}

/// Authenticator Trait
///
/// The external credential validator. Implementations decide whether a token is currently
/// valid and, if so, who it speaks for. They must not consult the data store; principal
/// confirmation happens afterwards in [`crate::identity`].
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn validate_user_token(&self, token: &str) -> Option<UserClaims>;
    async fn validate_machine_token(&self, token: &str) -> Option<MachineClaims>;
}

/// AuthenticatorState
///
/// The concrete type used to share the authenticator across the application state.
pub type AuthenticatorState = Arc<dyn Authenticator>;

/// JwtAuthenticator
///
/// HS256 JWT implementation of [`Authenticator`]. It can also mint tokens, which the
/// provisioning tooling and the test-suite use.
#[derive(Clone)]
pub struct JwtAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtAuthenticator {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiration is always enforced.
        validation.validate_exp = true;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.jwt_secret, config.token_ttl)
    }

    pub fn issue_user_token(
        &self,
        user: &str,
        organization: &str,
        role: RoleMask,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue(user, organization, role, TokenKind::User)
    }

    pub fn issue_machine_token(
        &self,
        machine: &str,
        organization: &str,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue(machine, organization, RoleMask::empty(), TokenKind::Machine)
    }

    /// Signs an arbitrary claim set. Exposed for tooling that needs custom lifetimes.
    pub fn sign(&self, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
    }

    fn issue(
        &self,
        subject: &str,
        organization: &str,
        role: RoleMask,
        kind: TokenKind,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp().max(0) as usize;
        let claims = Claims {
            sub: subject.to_string(),
            org: organization.to_string(),
            role: role.bits(),
            kind,
            jti: Uuid::new_v4(),
            iat: now,
            exp: now + self.ttl.as_secs() as usize,
        };
        self.sign(&claims)
    }

    /// Decodes and validates `token`, accepting it only if it is of the `expected` kind.
    fn decode_kind(&self, token: &str, expected: TokenKind) -> Option<Claims> {
        let claims = match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                match e.kind() {
                    ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
                    other => tracing::debug!(?other, "rejected invalid token"),
                }
                return None;
            }
        };

        if claims.kind != expected {
            tracing::debug!(kind = ?claims.kind, ?expected, "rejected token of the wrong kind");
            return None;
        }
        if claims.sub.is_empty() || claims.org.is_empty() {
            return None;
        }
        Some(claims)
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn validate_user_token(&self, token: &str) -> Option<UserClaims> {
        self.decode_kind(token, TokenKind::User)
            .map(|claims| UserClaims {
                user: claims.sub,
                organization: claims.org,
                role: RoleMask::from(claims.role),
            })
    }

    async fn validate_machine_token(&self, token: &str) -> Option<MachineClaims> {
        self.decode_kind(token, TokenKind::Machine)
            .map(|claims| MachineClaims {
                machine: claims.sub,
                organization: claims.org,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> JwtAuthenticator {
        JwtAuthenticator::new("unit-test-secret", Duration::from_secs(600))
    }

    #[tokio::test]
    async fn user_token_round_trips_identity() {
        let auth = authenticator();
        let token = auth
            .issue_user_token("user456", "org123", RoleMask::ALL)
            .unwrap();

        let claims = auth.validate_user_token(&token).await.unwrap();
        assert_eq!(claims.user, "user456");
        assert_eq!(claims.organization, "org123");
        assert_eq!(claims.role, RoleMask::ALL);
    }

    #[tokio::test]
    async fn token_kinds_are_not_interchangeable() {
        let auth = authenticator();
        let user = auth.issue_user_token("u", "o", RoleMask::USER).unwrap();
        let machine = auth.issue_machine_token("m", "o").unwrap();

        assert!(auth.validate_machine_token(&user).await.is_none());
        assert!(auth.validate_user_token(&machine).await.is_none());
        assert!(auth.validate_machine_token(&machine).await.is_some());
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let auth = authenticator();
        let now = Utc::now().timestamp() as usize;
        let token = auth
            .sign(&Claims {
                sub: "u".into(),
                org: "o".into(),
                role: RoleMask::USER.bits(),
                kind: TokenKind::User,
                jti: Uuid::new_v4(),
                iat: now - 7200,
                exp: now - 3600,
            })
            .unwrap();

        assert!(auth.validate_user_token(&token).await.is_none());
    }

    #[tokio::test]
    async fn token_signed_with_other_secret_is_rejected() {
        let other = JwtAuthenticator::new("another-secret", Duration::from_secs(600));
        let token = other.issue_user_token("u", "o", RoleMask::USER).unwrap();

        assert!(authenticator().validate_user_token(&token).await.is_none());
        assert!(authenticator().validate_user_token("not a jwt").await.is_none());
    }
}
