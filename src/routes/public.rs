use super::{RouteError, RouteTable};
use crate::handlers::authentication;
use axum::http::Method;

/// Public Router Module
///
/// Endpoints that never look at the `Authorization` header.
pub fn register(table: &mut RouteTable) -> Result<(), RouteError> {
    // GET /health
    // Used by load balancers and orchestrators. Always `{"ok": true}`.
    table.register(Method::GET, "/health", authentication::health)?;
    Ok(())
}
