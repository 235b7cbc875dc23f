use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};

use crate::{
    authz::{Operation, Resource, authorize},
    error::ApiError,
    identity::Caller,
    models::{Schedule, ScheduleRequest},
    repository::RepositoryState,
    resolver::{Resolver, SCHEDULE_NOT_FOUND},
    response::{ApiResult, Payload},
};

use super::tenant;

#[utoipa::path(
    get,
    path = "/api/v1/{org}/machines/{machine}/schedule",
    params(
        ("org" = String, Path, description = "Organization name"),
        ("machine" = String, Path, description = "Machine name")
    ),
    responses(
        (status = 200, description = "Schedule (enveloped)", body = Schedule),
        (status = 404, description = "Unknown machine, or the machine has no schedule")
    ),
    security(("bearer" = []))
)]
pub async fn get_schedule(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path((org, machine)): Path<(String, String)>,
) -> ApiResult<Schedule> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    let machine = resolver.machine(&organization, &machine).await?;
    let schedule = resolver.schedule(&machine).await?;
    authorize(&caller, &organization, Operation::Read(Resource::Schedule))?;
    Ok(Payload(schedule))
}

/// put_schedule
///
/// Creates the machine's schedule or replaces the existing one. The content is opaque here;
/// agents interpret it.
#[utoipa::path(
    put,
    path = "/api/v1/{org}/machines/{machine}/schedule",
    params(
        ("org" = String, Path, description = "Organization name"),
        ("machine" = String, Path, description = "Machine name")
    ),
    request_body = ScheduleRequest,
    responses(
        (status = 200, description = "Stored schedule (enveloped)", body = Schedule),
        (status = 403, description = "Caller lacks the maintainer capability"),
        (status = 404, description = "Unknown machine, or outside the caller's organization")
    ),
    security(("bearer" = []))
)]
pub async fn put_schedule(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path((org, machine)): Path<(String, String)>,
    payload: Result<Json<ScheduleRequest>, JsonRejection>,
) -> ApiResult<Schedule> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    let machine = resolver.machine(&organization, &machine).await?;
    authorize(&caller, &organization, Operation::Write(Resource::Schedule))?;

    let Json(req) = payload?;
    let schedule = repo.upsert_schedule(machine.id, req).await?;
    Ok(Payload(schedule))
}

#[utoipa::path(
    delete,
    path = "/api/v1/{org}/machines/{machine}/schedule",
    params(
        ("org" = String, Path, description = "Organization name"),
        ("machine" = String, Path, description = "Machine name")
    ),
    responses(
        (status = 200, description = "Deleted, payload is null"),
        (status = 403, description = "Caller lacks the maintainer capability"),
        (status = 404, description = "Unknown machine, or the machine has no schedule")
    ),
    security(("bearer" = []))
)]
pub async fn delete_schedule(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path((org, machine)): Path<(String, String)>,
) -> ApiResult<()> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    let machine = resolver.machine(&organization, &machine).await?;
    resolver.schedule(&machine).await?;
    authorize(&caller, &organization, Operation::Write(Resource::Schedule))?;

    repo.delete_schedule(machine.id)
        .await
        .map_err(|e| ApiError::from_store(e, SCHEDULE_NOT_FOUND))?;
    Ok(Payload(()))
}
