use super::{RouteError, RouteTable};
use crate::handlers::schedules;
use axum::http::Method;

const SCHEDULE: &str = "/{org}/machines/{machine}/schedule";

/// A machine has at most one schedule, so PUT both creates and replaces it.
pub fn register(table: &mut RouteTable) -> Result<(), RouteError> {
    table
        .register(Method::GET, SCHEDULE, schedules::get_schedule)?
        .register(Method::PUT, SCHEDULE, schedules::put_schedule)?
        .register(Method::DELETE, SCHEDULE, schedules::delete_schedule)?;
    Ok(())
}
