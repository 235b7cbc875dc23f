use super::{RouteError, RouteTable};
use crate::handlers::records;
use axum::http::Method;

/// Records are append-only: there is no PUT or DELETE.
pub fn register(table: &mut RouteTable) -> Result<(), RouteError> {
    table
        .register(Method::GET, "/{org}/machines/{machine}/records", records::list_records)?
        // POST /{org}/machines/{machine}/records
        // Agent ingestion. Takes a machine token, never a user token.
        .register(Method::POST, "/{org}/machines/{machine}/records", records::ingest_record)?
        .register(
            Method::GET,
            "/{org}/machines/{machine}/records/{record}",
            records::get_record,
        )?;
    Ok(())
}
