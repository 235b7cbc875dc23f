use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};

use super::{check_task_content, tenant, validate_name};
use crate::{
    authz::{Operation, Resource, authorize},
    error::ApiError,
    identity::Caller,
    models::{CreateTaskRequest, Task, UpdateTaskRequest},
    repository::RepositoryState,
    resolver::{Resolver, TASK_NOT_FOUND},
    response::{ApiResult, Payload},
};

#[utoipa::path(
    get,
    path = "/api/v1/{org}/tasks",
    params(("org" = String, Path, description = "Organization name")),
    responses(
        (status = 200, description = "Tasks of the organization (enveloped)", body = [Task]),
        (status = 404, description = "Unknown organization, or not the caller's")
    ),
    security(("bearer" = []))
)]
pub async fn list_tasks(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path(org): Path<String>,
) -> ApiResult<Vec<Task>> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    authorize(&caller, &organization, Operation::Read(Resource::Task))?;
    Ok(Payload(resolver.tasks(&organization).await?))
}

/// create_task
///
/// The content's `kind` selects how agents run it. Content of a known kind must be complete;
/// other kinds are stored untouched for agents that understand them.
#[utoipa::path(
    post,
    path = "/api/v1/{org}/tasks",
    params(("org" = String, Path, description = "Organization name")),
    request_body = CreateTaskRequest,
    responses(
        (status = 200, description = "Created task (enveloped)", body = Task),
        (status = 400, description = "Malformed body, invalid name or malformed content"),
        (status = 403, description = "Caller lacks the maintainer capability"),
        (status = 409, description = "Name already taken")
    ),
    security(("bearer" = []))
)]
pub async fn create_task(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path(org): Path<String>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> ApiResult<Task> {
    let organization = tenant(&Resolver::new(repo.as_ref()), &caller, &org).await?;
    authorize(&caller, &organization, Operation::Write(Resource::Task))?;

    let Json(req) = payload?;
    validate_name(&req.name)?;
    check_task_content(&req.content)?;

    let task = repo.create_task(organization.id, req).await?;
    match task.content() {
        Ok(content) => tracing::info!(
            task = %task.name,
            kind = content.kind(),
            organization = %organization.name,
            "task created"
        ),
        Err(err) => {
            tracing::warn!(task = %task.name, error = %err, "stored task content is unreadable")
        }
    }
    Ok(Payload(task))
}

#[utoipa::path(
    get,
    path = "/api/v1/{org}/tasks/{task}",
    params(
        ("org" = String, Path, description = "Organization name"),
        ("task" = String, Path, description = "Task name")
    ),
    responses(
        (status = 200, description = "Task (enveloped)", body = Task),
        (status = 404, description = "Unknown task, or outside the caller's organization")
    ),
    security(("bearer" = []))
)]
pub async fn get_task(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path((org, task)): Path<(String, String)>,
) -> ApiResult<Task> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    let task = resolver.task(&organization, &task).await?;
    authorize(&caller, &organization, Operation::Read(Resource::Task))?;
    Ok(Payload(task))
}

#[utoipa::path(
    put,
    path = "/api/v1/{org}/tasks/{task}",
    params(
        ("org" = String, Path, description = "Organization name"),
        ("task" = String, Path, description = "Task name")
    ),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Updated task (enveloped)", body = Task),
        (status = 400, description = "Malformed body or content"),
        (status = 403, description = "Caller lacks the maintainer capability"),
        (status = 404, description = "Unknown task, or outside the caller's organization")
    ),
    security(("bearer" = []))
)]
pub async fn update_task(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path((org, task)): Path<(String, String)>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> ApiResult<Task> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    let task = resolver.task(&organization, &task).await?;
    authorize(&caller, &organization, Operation::Write(Resource::Task))?;

    let Json(req) = payload?;
    if let Some(content) = &req.content {
        check_task_content(content)?;
    }

    let updated = repo
        .update_task(task.id, req)
        .await
        .map_err(|e| ApiError::from_store(e, TASK_NOT_FOUND))?;
    Ok(Payload(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/{org}/tasks/{task}",
    params(
        ("org" = String, Path, description = "Organization name"),
        ("task" = String, Path, description = "Task name")
    ),
    responses(
        (status = 200, description = "Deleted, payload is null"),
        (status = 403, description = "Caller lacks the maintainer capability"),
        (status = 404, description = "Unknown task, or outside the caller's organization")
    ),
    security(("bearer" = []))
)]
pub async fn delete_task(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path((org, task)): Path<(String, String)>,
) -> ApiResult<()> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    let task = resolver.task(&organization, &task).await?;
    authorize(&caller, &organization, Operation::Write(Resource::Task))?;

    repo.delete_task(task.id)
        .await
        .map_err(|e| ApiError::from_store(e, TASK_NOT_FOUND))?;
    Ok(Payload(()))
}
