//! Request handlers, one module per resource family.
//!
//! Every handler walks the same pipeline:
//! 1. the `Caller` extractor authenticates,
//! 2. [`tenant`] resolves the route's organization and turns away other tenants,
//! 3. the [`Resolver`] binds the remaining path identifiers,
//! 4. [`authorize`](crate::authz::authorize) checks the role,
//! 5. only then is the body inspected and the store operation run.
//!
//! Bodies are taken as `Result<Json<_>, JsonRejection>` so that a malformed body never
//! outranks a 401, 404 or 403.

use serde_json::Value;

use crate::{
    authz::admit,
    error::ApiError,
    identity::Caller,
    models::{Organization, TaskContent},
    resolver::Resolver,
};

pub mod authentication;
pub mod machines;
pub mod organizations;
pub mod records;
pub mod schedules;
pub mod tasks;
pub mod users;

/// Resolves the route's organization and admits only its own members.
pub(crate) async fn tenant(
    resolver: &Resolver<'_>,
    caller: &Caller,
    org: &str,
) -> Result<Organization, ApiError> {
    let organization = resolver.organization(org).await?;
    admit(caller, &organization)?;
    Ok(organization)
}

/// validate_name
///
/// Names are used verbatim as path segments, so they must be non-empty and free of `/` and
/// whitespace.
pub(crate) fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() || name.contains('/') || name.chars().any(char::is_whitespace) {
        return Err(ApiError::BadRequest("invalid name".to_string()));
    }
    Ok(())
}

/// check_task_content
///
/// Known kinds must decode. Unknown kinds are stored as they are and only logged.
pub(crate) fn check_task_content(content: &Value) -> Result<(), ApiError> {
    match TaskContent::parse(content) {
        Ok(TaskContent::Unrecognized(kind)) => {
            tracing::warn!(%kind, "storing task content of unknown kind");
            Ok(())
        }
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::debug!(error = %e, "rejected task content");
            Err(ApiError::BadRequest("malformed task content".to_string()))
        }
    }
}
