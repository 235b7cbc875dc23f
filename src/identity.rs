//! Identity resolution: bearer credential → confirmed principal.
//!
//! Both extractors follow the same order. The credential is validated by the
//! [`Authenticator`] first; only a valid token ever leads to a data store call, which
//! confirms the principal still exists inside the organization the token names.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};

use crate::{
    auth::{Authenticator, AuthenticatorState, MachineClaims, UserClaims},
    error::ApiError,
    models::{Machine, Organization, RoleMask, User},
    repository::{Repository, RepositoryState, StoreError},
};

/// Caller
///
/// A user whose token is valid and whose account is confirmed. `role` is the mask from the
/// token, which is what authorization decisions use.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user: User,
    pub organization: Organization,
    pub role: RoleMask,
}

/// MachineCaller
///
/// An agent authenticated with a machine token, confirmed against the store.
#[derive(Debug, Clone)]
pub struct MachineCaller {
    pub machine: Machine,
    pub organization: Organization,
}

/// Pulls the token out of `Authorization: Bearer <token>`.
pub fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let token = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(ApiError::Unauthenticated)?;

    if token.is_empty() {
        return Err(ApiError::Unauthenticated);
    }
    Ok(token)
}

/// Validates a user token. No store access happens here.
pub async fn authenticate_user(
    authenticator: &dyn Authenticator,
    token: &str,
) -> Result<UserClaims, ApiError> {
    authenticator
        .validate_user_token(token)
        .await
        .ok_or(ApiError::Unauthenticated)
}

/// Store lookups made while confirming a principal. Absence means the token speaks for
/// someone who no longer exists, which is an authentication failure, not a 404.
fn confirm(err: StoreError) -> ApiError {
    match err {
        StoreError::NotFound => ApiError::Unauthenticated,
        other => other.into(),
    }
}

/// resolve_user
///
/// Confirms that the user named by the token exists inside the token's organization. The
/// lookup is already scoped to that organization; the ownership check below guards against a
/// store that ignores the scope.
pub async fn resolve_user(repo: &dyn Repository, claims: UserClaims) -> Result<Caller, ApiError> {
    let organization = repo
        .read_organization(&claims.organization)
        .await
        .map_err(confirm)?;
    let user = repo
        .read_user(organization.id, &claims.user)
        .await
        .map_err(confirm)?;

    if user.organization_id != organization.id {
        tracing::warn!(
            user = %claims.user,
            organization = %claims.organization,
            "token names a user outside its organization"
        );
        return Err(ApiError::Unauthenticated);
    }

    Ok(Caller {
        user,
        organization,
        role: claims.role,
    })
}

/// resolve_machine
///
/// The machine counterpart of [`resolve_user`].
pub async fn resolve_machine(
    repo: &dyn Repository,
    claims: MachineClaims,
) -> Result<MachineCaller, ApiError> {
    let organization = repo
        .read_organization(&claims.organization)
        .await
        .map_err(confirm)?;
    let machine = repo
        .read_machine(organization.id, &claims.machine)
        .await
        .map_err(confirm)?;

    if machine.organization_id != organization.id {
        tracing::warn!(
            machine = %claims.machine,
            organization = %claims.organization,
            "token names a machine outside its organization"
        );
        return Err(ApiError::Unauthenticated);
    }

    Ok(MachineCaller {
        machine,
        organization,
    })
}

/// Caller Extractor Implementation
///
/// Usable as the first argument of any user-facing handler. Rejects with a 401 envelope.
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AuthenticatorState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let authenticator = AuthenticatorState::from_ref(state);
        let claims = authenticate_user(authenticator.as_ref(), token).await?;

        let repo = RepositoryState::from_ref(state);
        let caller = resolve_user(repo.as_ref(), claims).await?;

        tracing::debug!(
            user = %caller.user.name,
            organization = %caller.organization.name,
            role = caller.role.bits(),
            "authenticated caller"
        );
        Ok(caller)
    }
}

impl<S> FromRequestParts<S> for MachineCaller
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AuthenticatorState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let authenticator = AuthenticatorState::from_ref(state);
        let claims = authenticator
            .validate_machine_token(token)
            .await
            .ok_or(ApiError::Unauthenticated)?;

        let repo = RepositoryState::from_ref(state);
        resolve_machine(repo.as_ref(), claims).await
    }
}
