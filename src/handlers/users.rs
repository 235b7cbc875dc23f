use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};

use super::{tenant, validate_name};
use crate::{
    authz::{Operation, Resource, authorize},
    error::ApiError,
    identity::Caller,
    models::{CreateUserRequest, UpdateUserRequest, User},
    repository::RepositoryState,
    resolver::{Resolver, USER_NOT_FOUND},
    response::{ApiResult, Payload},
};

/// list_users
///
/// User accounts carry emails and roles, so listing them is an administrator operation.
#[utoipa::path(
    get,
    path = "/api/v1/{org}/users",
    params(("org" = String, Path, description = "Organization name")),
    responses(
        (status = 200, description = "Users of the organization (enveloped)", body = [User]),
        (status = 403, description = "Caller lacks the administrator capability"),
        (status = 404, description = "Unknown organization, or not the caller's")
    ),
    security(("bearer" = []))
)]
pub async fn list_users(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path(org): Path<String>,
) -> ApiResult<Vec<User>> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    authorize(&caller, &organization, Operation::Read(Resource::User))?;
    Ok(Payload(resolver.users(&organization).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/{org}/users",
    params(("org" = String, Path, description = "Organization name")),
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "Created user (enveloped)", body = User),
        (status = 400, description = "Malformed body or invalid name"),
        (status = 403, description = "Caller lacks the administrator capability"),
        (status = 409, description = "Name already taken")
    ),
    security(("bearer" = []))
)]
pub async fn create_user(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path(org): Path<String>,
    payload: Result<Json<CreateUserRequest>, JsonRejection>,
) -> ApiResult<User> {
    let organization = tenant(&Resolver::new(repo.as_ref()), &caller, &org).await?;
    authorize(&caller, &organization, Operation::Write(Resource::User))?;

    let Json(req) = payload?;
    validate_name(&req.name)?;

    let user = repo.create_user(organization.id, req).await?;
    tracing::info!(user = %user.name, organization = %organization.name, "user created");
    Ok(Payload(user))
}

/// get_user
///
/// Anyone may read their own account; reading somebody else's needs the administrator bit.
#[utoipa::path(
    get,
    path = "/api/v1/{org}/users/{user}",
    params(
        ("org" = String, Path, description = "Organization name"),
        ("user" = String, Path, description = "User name")
    ),
    responses(
        (status = 200, description = "User (enveloped)", body = User),
        (status = 403, description = "Reading another user without the administrator capability"),
        (status = 404, description = "Unknown user, or outside the caller's organization")
    ),
    security(("bearer" = []))
)]
pub async fn get_user(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path((org, user)): Path<(String, String)>,
) -> ApiResult<User> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    let user = resolver.user(&organization, &user).await?;

    let operation = if user.id == caller.user.id {
        Operation::ReadSelf
    } else {
        Operation::Read(Resource::User)
    };
    authorize(&caller, &organization, operation)?;
    Ok(Payload(user))
}

#[utoipa::path(
    put,
    path = "/api/v1/{org}/users/{user}",
    params(
        ("org" = String, Path, description = "Organization name"),
        ("user" = String, Path, description = "User name")
    ),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user (enveloped)", body = User),
        (status = 403, description = "Caller lacks the administrator capability"),
        (status = 404, description = "Unknown user, or outside the caller's organization")
    ),
    security(("bearer" = []))
)]
pub async fn update_user(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path((org, user)): Path<(String, String)>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> ApiResult<User> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    let user = resolver.user(&organization, &user).await?;
    authorize(&caller, &organization, Operation::Write(Resource::User))?;

    let Json(req) = payload?;
    let updated = repo
        .update_user(user.id, req)
        .await
        .map_err(|e| ApiError::from_store(e, USER_NOT_FOUND))?;
    Ok(Payload(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/{org}/users/{user}",
    params(
        ("org" = String, Path, description = "Organization name"),
        ("user" = String, Path, description = "User name")
    ),
    responses(
        (status = 200, description = "Deleted, payload is null"),
        (status = 403, description = "Caller lacks the administrator capability"),
        (status = 404, description = "Unknown user, or outside the caller's organization")
    ),
    security(("bearer" = []))
)]
pub async fn delete_user(
    caller: Caller,
    State(repo): State<RepositoryState>,
    Path((org, user)): Path<(String, String)>,
) -> ApiResult<()> {
    let resolver = Resolver::new(repo.as_ref());
    let organization = tenant(&resolver, &caller, &org).await?;
    let user = resolver.user(&organization, &user).await?;
    authorize(&caller, &organization, Operation::Write(Resource::User))?;

    repo.delete_user(user.id)
        .await
        .map_err(|e| ApiError::from_store(e, USER_NOT_FOUND))?;
    Ok(Payload(()))
}
