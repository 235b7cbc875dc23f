use axum::extract::{Path, State};

use crate::{
    authz::{Operation, Resource, authorize},
    error::ApiError,
    identity::Caller,
    models::Organization,
    repository::RepositoryState,
    resolver::{ORGANIZATION_NOT_FOUND, Resolver},
    response::{ApiResult, Payload},
};

use super::tenant;

/// get_organization
///
/// Reads the organization the caller belongs to. Any other organization, existing or not,
/// is reported as not found.
#[utoipa::path(
    get,
    path = "/api/v1/organizations/{org}",
    params(("org" = String, Path, description = "Organization name")),
    responses(
        (status = 200, description = "Organization (enveloped)", body = Organization),
        (status = 401, description = "Missing or invalid credentials"),
        (status = 404, description = "Unknown organization, or not the caller's")
    ),
    security(("bearer" = []))
)]
pub async fn get_organization(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path(org): Path<String>,
) -> ApiResult<Organization> {
    let organization = tenant(&Resolver::new(repo.as_ref()), &caller, &org).await?;
    authorize(&caller, &organization, Operation::Read(Resource::Organization))?;
    Ok(Payload(organization))
}

/// delete_organization
///
/// Removes the organization and everything it owns. Requires the `ROOT` bit.
#[utoipa::path(
    delete,
    path = "/api/v1/organizations/{org}",
    params(("org" = String, Path, description = "Organization name")),
    responses(
        (status = 200, description = "Deleted, payload is null"),
        (status = 403, description = "Caller lacks the root capability"),
        (status = 404, description = "Unknown organization, or not the caller's")
    ),
    security(("bearer" = []))
)]
pub async fn delete_organization(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path(org): Path<String>,
) -> ApiResult<()> {
    let organization = tenant(&Resolver::new(repo.as_ref()), &caller, &org).await?;
    authorize(&caller, &organization, Operation::Write(Resource::Organization))?;

    repo.delete_organization(organization.id)
        .await
        .map_err(|e| ApiError::from_store(e, ORGANIZATION_NOT_FOUND))?;

    tracing::info!(
        organization = %organization.name,
        by = %caller.user.name,
        "organization deleted"
    );
    Ok(Payload(()))
}
