use super::{RouteError, RouteTable};
use crate::handlers::machines;
use axum::http::Method;

pub fn register(table: &mut RouteTable) -> Result<(), RouteError> {
    table
        .register(Method::GET, "/{org}/machines", machines::list_machines)?
        .register(Method::POST, "/{org}/machines", machines::create_machine)?
        .register(Method::GET, "/{org}/machines/{machine}", machines::get_machine)?
        .register(Method::PUT, "/{org}/machines/{machine}", machines::update_machine)?
        .register(Method::DELETE, "/{org}/machines/{machine}", machines::delete_machine)?;
    Ok(())
}
