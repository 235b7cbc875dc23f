use serde_json::{Value, json};

use crate::{
    identity::Caller,
    models::IdentityResponse,
    response::{ApiResult, Payload},
};

/// whoami
///
/// Echoes what the presented token resolves to. Clients use it to check a token before
/// issuing real requests.
#[utoipa::path(
    get,
    path = "/api/v1/auth",
    responses(
        (status = 200, description = "Resolved identity (enveloped)", body = IdentityResponse),
        (status = 401, description = "Missing or invalid credentials")
    ),
    security(("bearer" = []))
)]
pub async fn whoami(caller: Caller) -> ApiResult<IdentityResponse> {
    Ok(Payload(IdentityResponse {
        user: caller.user.name,
        organization: caller.organization.name,
        role: caller.role,
        roles: caller.role.names(),
    }))
}

/// health
///
/// Liveness check for load balancers. Unauthenticated.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses((status = 200, description = "Service is up, payload is {\"ok\": true}"))
)]
pub async fn health() -> Payload<Value> {
    Payload(json!({ "ok": true }))
}
