use axum::{
    BoxError, Router,
    error_handling::HandleErrorLayer,
    extract::FromRef,
    http::{HeaderName, StatusCode},
    response::Response,
};
use tower::{
    Layer, ServiceBuilder,
    timeout::{TimeoutLayer, error::Elapsed},
};
use tower_http::{
    cors::{Any, CorsLayer},
    normalize_path::{NormalizePath, NormalizePathLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

// --- Module Structure ---

// Collaborator contracts and their implementations.
pub mod auth;
pub mod config;
pub mod memory;
pub mod repository;

// The authorization pipeline, leaves first.
pub mod identity;
pub mod resolver;
pub mod authz;
pub mod handlers;
pub mod routes;

// Domain types and the wire format.
pub mod error;
pub mod models;
pub mod response;

// --- Public Re-exports ---

pub use auth::{AuthenticatorState, JwtAuthenticator};
pub use config::AppConfig;
pub use error::ApiError;
pub use repository::{PostgresRepository, RepositoryState};
pub use routes::RouteError;

/// ApiDoc
///
/// OpenAPI document aggregated from the `#[utoipa::path]` annotations on the handlers.
/// Served as JSON at `/api-docs/openapi.json`, browsable at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::authentication::health, handlers::authentication::whoami,
        handlers::organizations::get_organization, handlers::organizations::delete_organization,
        handlers::users::list_users, handlers::users::create_user, handlers::users::get_user,
        handlers::users::update_user, handlers::users::delete_user,
        handlers::machines::list_machines, handlers::machines::create_machine,
        handlers::machines::get_machine, handlers::machines::update_machine,
        handlers::machines::delete_machine,
        handlers::schedules::get_schedule, handlers::schedules::put_schedule,
        handlers::schedules::delete_schedule,
        handlers::records::list_records, handlers::records::ingest_record,
        handlers::records::get_record,
        handlers::tasks::list_tasks, handlers::tasks::create_task, handlers::tasks::get_task,
        handlers::tasks::update_task, handlers::tasks::delete_task
    ),
    components(
        schemas(
            models::Organization, models::User, models::Machine, models::Task,
            models::Schedule, models::Record, models::CommandTask, models::ScriptTask,
            models::CreateUserRequest, models::UpdateUserRequest,
            models::CreateMachineRequest, models::UpdateMachineRequest,
            models::CreateTaskRequest, models::UpdateTaskRequest,
            models::ScheduleRequest, models::CreateRecordRequest, models::IdentityResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "fleet-authz", description = "Multi-tenant fleet management API")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` scheme referenced by the handlers' `security` attributes.
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// AppState
///
/// The single, immutable container shared by every request. Collaborators are trait objects
/// so tests can swap in in-memory implementations.
#[derive(Clone)]
pub struct AppState {
    /// Data store.
    pub repo: RepositoryState,
    /// Bearer token validation.
    pub auth: AuthenticatorState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AuthenticatorState {
    fn from_ref(app_state: &AppState) -> AuthenticatorState {
        app_state.auth.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// Unknown paths still answer with an envelope.
async fn route_not_found() -> ApiError {
    ApiError::NotFound("route not found")
}

async fn method_not_allowed() -> Response {
    response::failure_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

/// Turns middleware errors into envelopes. The deadline is the only layer that fails.
async fn middleware_failure(err: BoxError) -> Response {
    if err.is::<Elapsed>() {
        tracing::warn!("request deadline exceeded");
        return response::failure_response(StatusCode::REQUEST_TIMEOUT, "request timed out");
    }
    tracing::error!(error = %err, "unhandled middleware error");
    response::failure_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

/// create_router
///
/// Assembles the route table, the documentation and the middleware stack. Fails when two
/// handlers claim the same method and pattern.
pub fn create_router(state: AppState) -> Result<Router, RouteError> {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");
    let request_timeout = state.config.request_timeout;

    // 2. Route Table
    let api = routes::api_routes()?.into_router();

    // 3. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api/v1", api)
        .fallback(route_not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state);

    // 4. Observability, Correlation and Deadline Layers
    Ok(base_router
        .layer(
            ServiceBuilder::new()
                // 4a. Request ID Generation
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 4b. Request Tracing, correlated by the generated id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 4c. Request ID Propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id))
                // 4d. Deadline: the handler future, and every collaborator call it awaits, is
                // dropped once the budget is spent and the caller gets a 408 envelope.
                .layer(HandleErrorLayer::new(middleware_failure))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        // 5. CORS Layer
        .layer(cors))
}

/// build_app
///
/// The service handed to `axum::serve`. Trailing slashes are trimmed before routing, so
/// `/api/v1/org123/machines/` and `/api/v1/org123/machines` reach the same handler.
pub fn build_app(state: AppState) -> Result<NormalizePath<Router>, RouteError> {
    let router = create_router(state)?;
    Ok(NormalizePathLayer::trim_trailing_slash().layer(router))
}

/// trace_span_logger
///
/// Builds the per-request span with method, uri and the `x-request-id`, so every log line of
/// one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
