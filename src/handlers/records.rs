use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};

use crate::{
    authz::{Operation, Resource, admit_machine, authorize, authorize_ingest},
    identity::{Caller, MachineCaller},
    models::{CreateRecordRequest, Record},
    repository::RepositoryState,
    resolver::Resolver,
    response::{ApiResult, Payload},
};

use super::tenant;

#[utoipa::path(
    get,
    path = "/api/v1/{org}/machines/{machine}/records",
    params(
        ("org" = String, Path, description = "Organization name"),
        ("machine" = String, Path, description = "Machine name")
    ),
    responses(
        (status = 200, description = "Execution records of the machine (enveloped)", body = [Record]),
        (status = 404, description = "Unknown machine, or outside the caller's organization")
    ),
    security(("bearer" = []))
)]
pub async fn list_records(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path((org, machine)): Path<(String, String)>,
) -> ApiResult<Vec<Record>> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    let machine = resolver.machine(&organization, &machine).await?;
    authorize(&caller, &organization, Operation::Read(Resource::Record))?;
    Ok(Payload(resolver.records(&machine).await?))
}

/// ingest_record
///
/// Called by the agent running on the machine, authenticated with a machine token. An agent
/// can only append to its own history.
#[utoipa::path(
    post,
    path = "/api/v1/{org}/machines/{machine}/records",
    params(
        ("org" = String, Path, description = "Organization name"),
        ("machine" = String, Path, description = "Machine name")
    ),
    request_body = CreateRecordRequest,
    responses(
        (status = 200, description = "Stored record (enveloped)", body = Record),
        (status = 400, description = "Malformed body"),
        (status = 401, description = "Missing, invalid or non-machine credentials"),
        (status = 403, description = "Token belongs to another machine of the organization"),
        (status = 404, description = "Unknown machine, or outside the token's organization")
    ),
    security(("bearer" = []))
)]
pub async fn ingest_record(
    caller: MachineCaller,
    State(repo): State<RepositoryState>,
    Path((org, machine)): Path<(String, String)>,
    payload: Result<Json<CreateRecordRequest>, JsonRejection>,
) -> ApiResult<Record> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = resolver.organization(&org).await?;
    admit_machine(&caller, &organization)?;
    let machine = resolver.machine(&organization, &machine).await?;
    authorize_ingest(&caller, &organization, &machine)?;

    let Json(req) = payload?;
    let record = repo.create_record(machine.id, req).await?;
    tracing::debug!(
        machine = %machine.name,
        record = record.id,
        status = record.status,
        "execution record stored"
    );
    Ok(Payload(record))
}

#[utoipa::path(
    get,
    path = "/api/v1/{org}/machines/{machine}/records/{record}",
    params(
        ("org" = String, Path, description = "Organization name"),
        ("machine" = String, Path, description = "Machine name"),
        ("record" = String, Path, description = "Numeric record id")
    ),
    responses(
        (status = 200, description = "Execution record (enveloped)", body = Record),
        (status = 404, description = "Unknown record, or not one of this machine's")
    ),
    security(("bearer" = []))
)]
pub async fn get_record(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path((org, machine, record)): Path<(String, String, String)>,
) -> ApiResult<Record> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    let machine = resolver.machine(&organization, &machine).await?;
    let record = resolver.record(&machine, &record).await?;
    authorize(&caller, &organization, Operation::Read(Resource::Record))?;
    Ok(Payload(record))
}
