use super::{RouteError, RouteTable};
use crate::handlers::tasks;
use axum::http::Method;

pub fn register(table: &mut RouteTable) -> Result<(), RouteError> {
    table
        .register(Method::GET, "/{org}/tasks", tasks::list_tasks)?
        .register(Method::POST, "/{org}/tasks", tasks::create_task)?
        .register(Method::GET, "/{org}/tasks/{task}", tasks::get_task)?
        .register(Method::PUT, "/{org}/tasks/{task}", tasks::update_task)?
        .register(Method::DELETE, "/{org}/tasks/{task}", tasks::delete_task)?;
    Ok(())
}
