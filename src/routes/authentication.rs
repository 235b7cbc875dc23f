use super::{RouteError, RouteTable};
use crate::handlers::authentication;
use axum::http::Method;

pub fn register(table: &mut RouteTable) -> Result<(), RouteError> {
    // GET /auth
    // Resolves the bearer token and echoes the identity and capabilities it carries.
    table.register(Method::GET, "/auth", authentication::whoami)?;
    Ok(())
}
