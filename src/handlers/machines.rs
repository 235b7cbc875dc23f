use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};

use super::{tenant, validate_name};
use crate::{
    authz::{Operation, Resource, authorize},
    error::ApiError,
    identity::Caller,
    models::{CreateMachineRequest, Machine, UpdateMachineRequest},
    repository::RepositoryState,
    resolver::{MACHINE_NOT_FOUND, Resolver},
    response::{ApiResult, Payload},
};

#[utoipa::path(
    get,
    path = "/api/v1/{org}/machines",
    params(("org" = String, Path, description = "Organization name")),
    responses(
        (status = 200, description = "Machines of the organization (enveloped)", body = [Machine]),
        (status = 404, description = "Unknown organization, or not the caller's")
    ),
    security(("bearer" = []))
)]
pub async fn list_machines(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path(org): Path<String>,
) -> ApiResult<Vec<Machine>> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    authorize(&caller, &organization, Operation::Read(Resource::Machine))?;
    Ok(Payload(resolver.machines(&organization).await?))
}

/// create_machine
///
/// Registers a new agent host. The caller needs the maintainer bit.
#[utoipa::path(
    post,
    path = "/api/v1/{org}/machines",
    params(("org" = String, Path, description = "Organization name")),
    request_body = CreateMachineRequest,
    responses(
        (status = 200, description = "Created machine (enveloped)", body = Machine),
        (status = 400, description = "Malformed body or invalid name"),
        (status = 403, description = "Caller lacks the maintainer capability"),
        (status = 409, description = "Name already taken")
    ),
    security(("bearer" = []))
)]
pub async fn create_machine(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path(org): Path<String>,
    payload: Result<Json<CreateMachineRequest>, JsonRejection>,
) -> ApiResult<Machine> {
    let organization = tenant(&Resolver::new(repo.as_ref()), &caller, &org).await?;
    authorize(&caller, &organization, Operation::Write(Resource::Machine))?;

    let Json(req) = payload?;
    validate_name(&req.name)?;

    let machine = repo.create_machine(organization.id, req).await?;
    tracing::info!(machine = %machine.name, organization = %organization.name, "machine registered");
    Ok(Payload(machine))
}

#[utoipa::path(
    get,
    path = "/api/v1/{org}/machines/{machine}",
    params(
        ("org" = String, Path, description = "Organization name"),
        ("machine" = String, Path, description = "Machine name")
    ),
    responses(
        (status = 200, description = "Machine (enveloped)", body = Machine),
        (status = 404, description = "Unknown machine, or outside the caller's organization")
    ),
    security(("bearer" = []))
)]
pub async fn get_machine(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path((org, machine)): Path<(String, String)>,
) -> ApiResult<Machine> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    let machine = resolver.machine(&organization, &machine).await?;
    authorize(&caller, &organization, Operation::Read(Resource::Machine))?;
    Ok(Payload(machine))
}

#[utoipa::path(
    put,
    path = "/api/v1/{org}/machines/{machine}",
    params(
        ("org" = String, Path, description = "Organization name"),
        ("machine" = String, Path, description = "Machine name")
    ),
    request_body = UpdateMachineRequest,
    responses(
        (status = 200, description = "Updated machine (enveloped)", body = Machine),
        (status = 403, description = "Caller lacks the maintainer capability"),
        (status = 404, description = "Unknown machine, or outside the caller's organization")
    ),
    security(("bearer" = []))
)]
pub async fn update_machine(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path((org, machine)): Path<(String, String)>,
    payload: Result<Json<UpdateMachineRequest>, JsonRejection>,
) -> ApiResult<Machine> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    let machine = resolver.machine(&organization, &machine).await?;
    authorize(&caller, &organization, Operation::Write(Resource::Machine))?;

    let Json(req) = payload?;
    let updated = repo
        .update_machine(machine.id, req)
        .await
        .map_err(|e| ApiError::from_store(e, MACHINE_NOT_FOUND))?;
    Ok(Payload(updated))
}

/// delete_machine
///
/// Also drops the machine's schedule and execution records.
#[utoipa::path(
    delete,
    path = "/api/v1/{org}/machines/{machine}",
    params(
        ("org" = String, Path, description = "Organization name"),
        ("machine" = String, Path, description = "Machine name")
    ),
    responses(
        (status = 200, description = "Deleted, payload is null"),
        (status = 403, description = "Caller lacks the maintainer capability"),
        (status = 404, description = "Unknown machine, or outside the caller's organization")
    ),
    security(("bearer" = []))
)]
pub async fn delete_machine(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path((org, machine)): Path<(String, String)>,
) -> ApiResult<()> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    let machine = resolver.machine(&organization, &machine).await?;
    authorize(&caller, &organization, Operation::Write(Resource::Machine))?;

    repo.delete_machine(machine.id)
        .await
        .map_err(|e| ApiError::from_store(e, MACHINE_NOT_FOUND))?;
    Ok(Payload(()))
}
