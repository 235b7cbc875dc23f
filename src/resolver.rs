//! Route path identifiers → resolved resource chain.
//!
//! Resolution walks the hierarchy one level at a time, and every step takes the parent
//! resolved by the step before it. Named children are looked up inside that parent, and a
//! child whose foreign key still points at another parent is reported exactly like a missing
//! one. Nothing here decides whether the caller may see the
//! result; that is [`crate::authz`]'s job, and handlers interleave the two so that a foreign
//! organization is rejected before any of its children are looked up.

use crate::{
    error::ApiError,
    models::{Machine, Organization, Record, Schedule, Task, User},
    repository::Repository,
};

pub const ORGANIZATION_NOT_FOUND: &str = "organization not found";
pub const USER_NOT_FOUND: &str = "user not found";
pub const MACHINE_NOT_FOUND: &str = "machine not found";
pub const TASK_NOT_FOUND: &str = "task not found";
pub const SCHEDULE_NOT_FOUND: &str = "schedule not found";
pub const RECORD_NOT_FOUND: &str = "record not found";

/// Resolver
///
/// Borrowed view over the data store for the lifetime of one request.
pub struct Resolver<'a> {
    repo: &'a dyn Repository,
}

impl<'a> Resolver<'a> {
    pub fn new(repo: &'a dyn Repository) -> Self {
        Self { repo }
    }

    // --- Organization ---

    pub async fn organization(&self, org: &str) -> Result<Organization, ApiError> {
        self.repo
            .read_organization(org)
            .await
            .map_err(|e| ApiError::from_store(e, ORGANIZATION_NOT_FOUND))
    }

    // --- Users ---

    pub async fn user(&self, organization: &Organization, user: &str) -> Result<User, ApiError> {
        let user = self
            .repo
            .read_user(organization.id, user)
            .await
            .map_err(|e| ApiError::from_store(e, USER_NOT_FOUND))?;

        if user.organization_id != organization.id {
            return Err(ApiError::NotFound(USER_NOT_FOUND));
        }
        Ok(user)
    }

    /// Materializes the user collection of a resolved organization.
    pub async fn users(&self, organization: &Organization) -> Result<Vec<User>, ApiError> {
        Ok(self.repo.read_users(organization.id).await?)
    }

    // --- Machines ---

    pub async fn machine(
        &self,
        organization: &Organization,
        machine: &str,
    ) -> Result<Machine, ApiError> {
        let machine = self
            .repo
            .read_machine(organization.id, machine)
            .await
            .map_err(|e| ApiError::from_store(e, MACHINE_NOT_FOUND))?;

        if machine.organization_id != organization.id {
            return Err(ApiError::NotFound(MACHINE_NOT_FOUND));
        }
        Ok(machine)
    }

    pub async fn machines(&self, organization: &Organization) -> Result<Vec<Machine>, ApiError> {
        Ok(self.repo.read_machines(organization.id).await?)
    }

    // --- Schedule ---

    /// schedule
    ///
    /// A machine that exists but has no schedule fails with a schedule specific message, so
    /// clients can tell it apart from a missing machine.
    pub async fn schedule(&self, machine: &Machine) -> Result<Schedule, ApiError> {
        let schedule = self
            .repo
            .read_schedule(machine.id)
            .await
            .map_err(|e| ApiError::from_store(e, SCHEDULE_NOT_FOUND))?;

        if schedule.machine_id != machine.id {
            return Err(ApiError::NotFound(SCHEDULE_NOT_FOUND));
        }
        Ok(schedule)
    }

    // --- Records ---

    /// record
    ///
    /// Records are addressed by their numeric id. An id that does not parse cannot name any
    /// record, so it is reported the same way as a missing one, without a store call.
    pub async fn record(&self, machine: &Machine, record: &str) -> Result<Record, ApiError> {
        let id: i64 = record
            .parse()
            .map_err(|_| ApiError::NotFound(RECORD_NOT_FOUND))?;
        let record = self
            .repo
            .read_record(id)
            .await
            .map_err(|e| ApiError::from_store(e, RECORD_NOT_FOUND))?;

        if record.machine_id != machine.id {
            return Err(ApiError::NotFound(RECORD_NOT_FOUND));
        }
        Ok(record)
    }

    pub async fn records(&self, machine: &Machine) -> Result<Vec<Record>, ApiError> {
        Ok(self.repo.read_records(machine.id).await?)
    }

    // --- Tasks ---

    pub async fn task(&self, organization: &Organization, task: &str) -> Result<Task, ApiError> {
        let task = self
            .repo
            .read_task(organization.id, task)
            .await
            .map_err(|e| ApiError::from_store(e, TASK_NOT_FOUND))?;

        if task.organization_id != organization.id {
            return Err(ApiError::NotFound(TASK_NOT_FOUND));
        }
        Ok(task)
    }

    pub async fn tasks(&self, organization: &Organization) -> Result<Vec<Task>, ApiError> {
        Ok(self.repo.read_tasks(organization.id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        memory::MemoryRepository,
        models::{CreateRecordRequest, RoleMask},
    };
    use chrono::Utc;
    use serde_json::json;

    fn not_found_message(err: ApiError) -> &'static str {
        match err {
            ApiError::NotFound(message) => message,
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    fn record_request() -> CreateRecordRequest {
        CreateRecordRequest {
            task: None,
            executed_at: Utc::now(),
            status: 0,
            output: String::new(),
        }
    }

    #[tokio::test]
    async fn child_of_other_organization_is_not_found() {
        let repo = MemoryRepository::new();
        let acme = repo.seed_organization("acme");
        let globex = repo.seed_organization("globex");
        repo.seed_user(&globex, "hank", RoleMask::USER);
        repo.seed_machine(&globex, "gx-01");
        repo.seed_task(&globex, "backup", json!({"kind": "command", "program": "true"}));

        let resolver = Resolver::new(&repo);
        let err = resolver.user(&acme, "hank").await.unwrap_err();
        assert_eq!(not_found_message(err), USER_NOT_FOUND);
        let err = resolver.machine(&acme, "gx-01").await.unwrap_err();
        assert_eq!(not_found_message(err), MACHINE_NOT_FOUND);
        let err = resolver.task(&acme, "backup").await.unwrap_err();
        assert_eq!(not_found_message(err), TASK_NOT_FOUND);

        assert!(resolver.machine(&globex, "gx-01").await.is_ok());
    }

    #[tokio::test]
    async fn shared_name_resolves_inside_each_organization() {
        let repo = MemoryRepository::new();
        let acme = repo.seed_organization("acme");
        let globex = repo.seed_organization("globex");
        let ours = repo.seed_machine(&acme, "web-01");
        let theirs = repo.seed_machine(&globex, "web-01");

        let resolver = Resolver::new(&repo);
        assert_eq!(resolver.machine(&acme, "web-01").await.unwrap(), ours);
        assert_eq!(resolver.machine(&globex, "web-01").await.unwrap(), theirs);
    }

    #[tokio::test]
    async fn missing_organization_is_reported_as_such() {
        let repo = MemoryRepository::new();
        let resolver = Resolver::new(&repo);

        let err = resolver.organization("nowhere").await.unwrap_err();
        assert_eq!(not_found_message(err), ORGANIZATION_NOT_FOUND);
        assert_eq!(repo.calls(), 1);
    }

    #[tokio::test]
    async fn schedule_absence_is_its_own_message() {
        let repo = MemoryRepository::new();
        let acme = repo.seed_organization("acme");
        let web = repo.seed_machine(&acme, "web-01");
        let resolver = Resolver::new(&repo);

        let err = resolver.schedule(&web).await.unwrap_err();
        assert_eq!(not_found_message(err), SCHEDULE_NOT_FOUND);

        repo.seed_schedule(&web, json!({"uptime": "@hourly"}));
        assert!(resolver.schedule(&web).await.is_ok());
    }

    #[tokio::test]
    async fn record_must_belong_to_route_machine() {
        let repo = MemoryRepository::new();
        let acme = repo.seed_organization("acme");
        let web = repo.seed_machine(&acme, "web-01");
        let db = repo.seed_machine(&acme, "db-01");
        let record = repo.seed_record(&web, record_request());
        let resolver = Resolver::new(&repo);

        let id = record.id.to_string();
        assert_eq!(resolver.record(&web, &id).await.unwrap(), record);

        let err = resolver.record(&db, &id).await.unwrap_err();
        assert_eq!(not_found_message(err), RECORD_NOT_FOUND);

        repo.reset_calls();
        let err = resolver.record(&web, "latest").await.unwrap_err();
        assert_eq!(not_found_message(err), RECORD_NOT_FOUND);
        assert_eq!(repo.calls(), 0);
    }

    #[tokio::test]
    async fn store_fault_is_not_reported_as_absence() {
        let repo = MemoryRepository::new_failing();
        let resolver = Resolver::new(&repo);

        let err = resolver.organization("acme").await.unwrap_err();
        assert!(matches!(err, ApiError::StoreFault));
    }
}
