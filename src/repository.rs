use crate::models::{
    CreateMachineRequest, CreateRecordRequest, CreateTaskRequest, CreateUserRequest, Machine,
    Organization, Record, Schedule, ScheduleRequest, Task, UpdateMachineRequest,
    UpdateTaskRequest, UpdateUserRequest, User,
};
use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgQueryResult};
use std::sync::Arc;
use thiserror::Error;

/// StoreError
///
/// The only three things a caller of the data store needs to tell apart.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("uniqueness violation")]
    Conflict,
    #[error("store fault: {0}")]
    Fault(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            other => StoreError::Fault(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Repository Trait
///
/// The data store contract consumed by the authorization layer. Users, machines and tasks are
/// read by name within the organization that owns them (records by numeric id); collection
/// reads take the internal key of the scope they list. Every call is independent: no method
/// relies on another having been called first.
///
/// **Send + Sync + async_trait** keep `Arc<dyn Repository>` usable across Axum's tasks.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Organizations ---
    async fn read_organization(&self, name: &str) -> StoreResult<Organization>;
    // Cascades to every user, machine, task, schedule and record of the organization.
    async fn delete_organization(&self, id: i64) -> StoreResult<()>;

    // --- Users ---
    async fn read_user(&self, organization_id: i64, name: &str) -> StoreResult<User>;
    async fn read_users(&self, organization_id: i64) -> StoreResult<Vec<User>>;
    async fn create_user(&self, organization_id: i64, req: CreateUserRequest) -> StoreResult<User>;
    async fn update_user(&self, id: i64, req: UpdateUserRequest) -> StoreResult<User>;
    async fn delete_user(&self, id: i64) -> StoreResult<()>;

    // --- Machines ---
    async fn read_machine(&self, organization_id: i64, name: &str) -> StoreResult<Machine>;
    async fn read_machines(&self, organization_id: i64) -> StoreResult<Vec<Machine>>;
    async fn create_machine(
        &self,
        organization_id: i64,
        req: CreateMachineRequest,
    ) -> StoreResult<Machine>;
    async fn update_machine(&self, id: i64, req: UpdateMachineRequest) -> StoreResult<Machine>;
    async fn delete_machine(&self, id: i64) -> StoreResult<()>;

    // --- Tasks ---
    async fn read_task(&self, organization_id: i64, name: &str) -> StoreResult<Task>;
    async fn read_tasks(&self, organization_id: i64) -> StoreResult<Vec<Task>>;
    async fn create_task(&self, organization_id: i64, req: CreateTaskRequest) -> StoreResult<Task>;
    async fn update_task(&self, id: i64, req: UpdateTaskRequest) -> StoreResult<Task>;
    async fn delete_task(&self, id: i64) -> StoreResult<()>;

    // --- Schedules (one per machine) ---
    async fn read_schedule(&self, machine_id: i64) -> StoreResult<Schedule>;
    async fn upsert_schedule(&self, machine_id: i64, req: ScheduleRequest)
    -> StoreResult<Schedule>;
    async fn delete_schedule(&self, machine_id: i64) -> StoreResult<()>;

    // --- Records (append-only) ---
    async fn read_record(&self, id: i64) -> StoreResult<Record>;
    async fn read_records(&self, machine_id: i64) -> StoreResult<Vec<Record>>;
    async fn create_record(&self, machine_id: i64, req: CreateRecordRequest)
    -> StoreResult<Record>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The production implementation of `Repository`, backed by PostgreSQL. Queries are checked
/// at runtime so the crate builds without a database; `migrations/` holds the schema.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// A delete that touched no row means the target was already gone.
fn expect_deleted(result: PgQueryResult) -> StoreResult<()> {
    if result.rows_affected() == 0 {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

const USER_COLUMNS: &str = "id, organization_id, name, email, role";
const MACHINE_COLUMNS: &str = "id, organization_id, name, description, os, arch";
const TASK_COLUMNS: &str = "id, organization_id, name, description, content";
const RECORD_COLUMNS: &str = "id, machine_id, task, executed_at, status, output";

#[async_trait]
impl Repository for PostgresRepository {
    async fn read_organization(&self, name: &str) -> StoreResult<Organization> {
        sqlx::query_as::<_, Organization>("SELECT id, name FROM organizations WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn delete_organization(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM organizations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_deleted(result)
    }

    // --- USERS ---

    async fn read_user(&self, organization_id: i64, name: &str) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE organization_id = $1 AND name = $2"
        ))
        .bind(organization_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn read_users(&self, organization_id: i64) -> StoreResult<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE organization_id = $1"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn create_user(&self, organization_id: i64, req: CreateUserRequest) -> StoreResult<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (organization_id, name, email, role) VALUES ($1, $2, $3, $4) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(organization_id)
        .bind(&req.name)
        .bind(&req.email)
        .bind(req.role.bits() as i32)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    /// update_user
    ///
    /// `COALESCE` leaves a column untouched when the matching field is `None`.
    async fn update_user(&self, id: i64, req: UpdateUserRequest) -> StoreResult<User> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET email = COALESCE($2, email), role = COALESCE($3, role) \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(req.email)
        .bind(req.role.map(|role| role.bits() as i32))
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_user(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_deleted(result)
    }

    // --- MACHINES ---

    async fn read_machine(&self, organization_id: i64, name: &str) -> StoreResult<Machine> {
        sqlx::query_as::<_, Machine>(&format!(
            "SELECT {MACHINE_COLUMNS} FROM machines WHERE organization_id = $1 AND name = $2"
        ))
        .bind(organization_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn read_machines(&self, organization_id: i64) -> StoreResult<Vec<Machine>> {
        let machines = sqlx::query_as::<_, Machine>(&format!(
            "SELECT {MACHINE_COLUMNS} FROM machines WHERE organization_id = $1"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(machines)
    }

    async fn create_machine(
        &self,
        organization_id: i64,
        req: CreateMachineRequest,
    ) -> StoreResult<Machine> {
        let machine = sqlx::query_as::<_, Machine>(&format!(
            "INSERT INTO machines (organization_id, name, description, os, arch) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {MACHINE_COLUMNS}"
        ))
        .bind(organization_id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(&req.os)
        .bind(&req.arch)
        .fetch_one(&self.pool)
        .await?;
        Ok(machine)
    }

    async fn update_machine(&self, id: i64, req: UpdateMachineRequest) -> StoreResult<Machine> {
        sqlx::query_as::<_, Machine>(&format!(
            "UPDATE machines SET description = COALESCE($2, description), \
             os = COALESCE($3, os), arch = COALESCE($4, arch) \
             WHERE id = $1 RETURNING {MACHINE_COLUMNS}"
        ))
        .bind(id)
        .bind(req.description)
        .bind(req.os)
        .bind(req.arch)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_machine(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM machines WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_deleted(result)
    }

    // --- TASKS ---

    async fn read_task(&self, organization_id: i64, name: &str) -> StoreResult<Task> {
        sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE organization_id = $1 AND name = $2"
        ))
        .bind(organization_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn read_tasks(&self, organization_id: i64) -> StoreResult<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE organization_id = $1"
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }

    async fn create_task(&self, organization_id: i64, req: CreateTaskRequest) -> StoreResult<Task> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks (organization_id, name, description, content) \
             VALUES ($1, $2, $3, $4) RETURNING {TASK_COLUMNS}"
        ))
        .bind(organization_id)
        .bind(&req.name)
        .bind(&req.description)
        .bind(&req.content)
        .fetch_one(&self.pool)
        .await?;
        Ok(task)
    }

    async fn update_task(&self, id: i64, req: UpdateTaskRequest) -> StoreResult<Task> {
        sqlx::query_as::<_, Task>(&format!(
            "UPDATE tasks SET description = COALESCE($2, description), \
             content = COALESCE($3, content) WHERE id = $1 RETURNING {TASK_COLUMNS}"
        ))
        .bind(id)
        .bind(req.description)
        .bind(req.content)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn delete_task(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        expect_deleted(result)
    }

    // --- SCHEDULES ---

    async fn read_schedule(&self, machine_id: i64) -> StoreResult<Schedule> {
        sqlx::query_as::<_, Schedule>(
            "SELECT id, machine_id, content FROM schedules WHERE machine_id = $1",
        )
        .bind(machine_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    /// upsert_schedule
    ///
    /// `machine_id` is unique in `schedules`, so a second PUT replaces the content in place.
    async fn upsert_schedule(
        &self,
        machine_id: i64,
        req: ScheduleRequest,
    ) -> StoreResult<Schedule> {
        let schedule = sqlx::query_as::<_, Schedule>(
            r#"
            INSERT INTO schedules (machine_id, content) VALUES ($1, $2)
            ON CONFLICT (machine_id) DO UPDATE SET content = EXCLUDED.content
            RETURNING id, machine_id, content
            "#,
        )
        .bind(machine_id)
        .bind(&req.content)
        .fetch_one(&self.pool)
        .await?;
        Ok(schedule)
    }

    async fn delete_schedule(&self, machine_id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM schedules WHERE machine_id = $1")
            .bind(machine_id)
            .execute(&self.pool)
            .await?;
        expect_deleted(result)
    }

    // --- RECORDS ---

    async fn read_record(&self, id: i64) -> StoreResult<Record> {
        sqlx::query_as::<_, Record>(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn read_records(&self, machine_id: i64) -> StoreResult<Vec<Record>> {
        let records = sqlx::query_as::<_, Record>(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE machine_id = $1"
        ))
        .bind(machine_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn create_record(
        &self,
        machine_id: i64,
        req: CreateRecordRequest,
    ) -> StoreResult<Record> {
        let record = sqlx::query_as::<_, Record>(&format!(
            "INSERT INTO records (machine_id, task, executed_at, status, output) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {RECORD_COLUMNS}"
        ))
        .bind(machine_id)
        .bind(&req.task)
        .bind(req.executed_at)
        .bind(req.status)
        .bind(&req.output)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }
}
