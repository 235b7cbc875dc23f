use super::{RouteError, RouteTable};
use crate::handlers::users;
use axum::http::Method;

pub fn register(table: &mut RouteTable) -> Result<(), RouteError> {
    table
        // --- Collection ---
        .register(Method::GET, "/{org}/users", users::list_users)?
        .register(Method::POST, "/{org}/users", users::create_user)?
        // --- Single user ---
        // GET is allowed on one's own account with the user bit alone.
        .register(Method::GET, "/{org}/users/{user}", users::get_user)?
        .register(Method::PUT, "/{org}/users/{user}", users::update_user)?
        .register(Method::DELETE, "/{org}/users/{user}", users::delete_user)?;
    Ok(())
}
