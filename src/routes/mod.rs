//! Router Module Index
//!
//! Every endpoint is registered through a [`RouteTable`], one module per resource family.
//! The table refuses a second handler for a method and pattern that is already taken, so a
//! copy-paste mistake between families fails router construction instead of silently
//! shadowing a handler.

/// Unauthenticated endpoints (liveness).
pub mod public;

/// `/organizations/{org}`
pub mod organizations;
/// `/{org}/users[/{user}]`
pub mod users;
/// `/{org}/machines[/{machine}]`
pub mod machines;
/// `/{org}/machines/{machine}/schedule`
pub mod schedules;
/// `/{org}/machines/{machine}/records[/{record}]`
pub mod records;
/// `/{org}/tasks[/{task}]`
pub mod tasks;
/// `/auth`
pub mod authentication;

use crate::AppState;
use axum::{
    Router,
    handler::Handler,
    http::Method,
    routing::{MethodFilter, MethodRouter, on},
};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// RouteError
///
/// Raised while the route table is being built, before the server accepts any request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("route {method} {pattern} is registered twice")]
    Conflict { method: Method, pattern: String },
    #[error("method {0} cannot be routed")]
    UnsupportedMethod(Method),
}

/// RouteTable
///
/// Collects `(method, pattern) → handler` bindings and turns them into an axum `Router`.
#[derive(Default)]
pub struct RouteTable {
    taken: HashSet<(Method, String)>,
    routes: BTreeMap<String, MethodRouter<AppState>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// register
    ///
    /// Binds `handler` to `method` on `pattern`. Fails with [`RouteError::Conflict`] when the
    /// pair is already bound.
    pub fn register<H, T>(
        &mut self,
        method: Method,
        pattern: &str,
        handler: H,
    ) -> Result<&mut Self, RouteError>
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        let filter = MethodFilter::try_from(method.clone())
            .map_err(|_| RouteError::UnsupportedMethod(method.clone()))?;

        if !self.taken.insert((method.clone(), pattern.to_string())) {
            return Err(RouteError::Conflict {
                method,
                pattern: pattern.to_string(),
            });
        }

        // The taken set guarantees the filters merged here never overlap.
        let route = match self.routes.remove(pattern) {
            Some(existing) => existing.merge(on(filter, handler)),
            None => on(filter, handler),
        };
        self.routes.insert(pattern.to_string(), route);
        Ok(self)
    }

    pub fn contains(&self, method: &Method, pattern: &str) -> bool {
        self.taken.contains(&(method.clone(), pattern.to_string()))
    }

    pub fn len(&self) -> usize {
        self.taken.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }

    pub fn into_router(self) -> Router<AppState> {
        self.routes
            .into_iter()
            .fold(Router::new(), |router, (pattern, route)| {
                router.route(&pattern, route)
            })
    }
}

/// api_routes
///
/// Registers every family into one table. The result is mounted under `/api/v1`.
pub fn api_routes() -> Result<RouteTable, RouteError> {
    let mut table = RouteTable::new();
    public::register(&mut table)?;
    authentication::register(&mut table)?;
    organizations::register(&mut table)?;
    users::register(&mut table)?;
    machines::register(&mut table)?;
    schedules::register(&mut table)?;
    records::register(&mut table)?;
    tasks::register(&mut table)?;
    Ok(table)
}
