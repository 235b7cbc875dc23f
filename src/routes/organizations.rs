use super::{RouteError, RouteTable};
use crate::handlers::organizations;
use axum::http::Method;

/// Organization routes. Organizations are provisioned out of band, so there is no create.
pub fn register(table: &mut RouteTable) -> Result<(), RouteError> {
    table
        .register(Method::GET, "/organizations/{org}", organizations::get_organization)?
        // DELETE cascades to every resource of the tenant; root only.
        .register(Method::DELETE, "/organizations/{org}", organizations::delete_organization)?;
    Ok(())
}
