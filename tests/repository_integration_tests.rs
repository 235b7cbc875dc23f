//! Runs against a real Postgres. Start one, export `DATABASE_URL`, then
//! `cargo test --test repository_integration_tests -- --ignored`.

use chrono::Utc;
use fleet_authz::{
    models::{
        CreateMachineRequest, CreateRecordRequest, CreateTaskRequest, CreateUserRequest,
        Organization, RoleMask, ScheduleRequest, UpdateUserRequest,
    },
    repository::{PostgresRepository, Repository, StoreError},
};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }

    /// Organizations are provisioned out of band, so tests insert them directly.
    async fn organization(&self) -> Organization {
        sqlx::query_as::<_, Organization>(
            "INSERT INTO organizations (name) VALUES ($1) RETURNING id, name",
        )
        .bind(unique("org"))
        .fetch_one(&self.pool)
        .await
        .expect("Failed to insert organization")
    }
}

/// Tests share one database across runs, so every run gets fresh names.
fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

// --- Tests ---

#[tokio::test]
#[ignore]
async fn test_user_round_trip_keeps_role_mask() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let org = ctx.organization().await;
    let name = unique("user");

    let created = repo
        .create_user(
            org.id,
            CreateUserRequest {
                name: name.clone(),
                email: "u@example.com".to_string(),
                role: RoleMask::USER | RoleMask::ADMINISTRATOR,
            },
        )
        .await
        .unwrap();
    assert_eq!(created.organization_id, org.id);

    let read = repo.read_user(org.id, &name).await.unwrap();
    assert_eq!(read.role, RoleMask::USER | RoleMask::ADMINISTRATOR);

    let updated = repo
        .update_user(
            created.id,
            UpdateUserRequest {
                email: None,
                role: Some(RoleMask::USER),
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.role, RoleMask::USER);
    assert_eq!(updated.email, "u@example.com");

    let users = repo.read_users(org.id).await.unwrap();
    assert_eq!(users.len(), 1);
}

#[tokio::test]
#[ignore]
async fn test_duplicate_name_is_conflict_within_organization() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let org = ctx.organization().await;
    let name = unique("machine");

    let req = CreateMachineRequest {
        name: name.clone(),
        ..CreateMachineRequest::default()
    };
    repo.create_machine(org.id, req.clone()).await.unwrap();

    let err = repo.create_machine(org.id, req).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict));
}

#[tokio::test]
#[ignore]
async fn test_same_name_in_two_organizations() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let org = ctx.organization().await;
    let other = ctx.organization().await;
    let name = unique("machine");

    let req = CreateMachineRequest {
        name: name.clone(),
        ..CreateMachineRequest::default()
    };
    let ours = repo.create_machine(org.id, req.clone()).await.unwrap();
    let theirs = repo.create_machine(other.id, req).await.unwrap();
    assert_ne!(ours.id, theirs.id);

    assert_eq!(repo.read_machine(org.id, &name).await.unwrap().id, ours.id);
    assert_eq!(repo.read_machine(other.id, &name).await.unwrap().id, theirs.id);

    let user = CreateUserRequest {
        name: unique("user"),
        email: "u@example.com".to_string(),
        role: RoleMask::USER,
    };
    repo.create_user(org.id, user.clone()).await.unwrap();
    repo.create_user(other.id, user).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_missing_rows_are_not_found() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    assert!(matches!(
        repo.read_organization(&unique("nope")).await,
        Err(StoreError::NotFound)
    ));
    let org = ctx.organization().await;
    assert!(matches!(
        repo.read_task(org.id, &unique("nope")).await,
        Err(StoreError::NotFound)
    ));
    assert!(matches!(repo.delete_machine(-1).await, Err(StoreError::NotFound)));
}

#[tokio::test]
#[ignore]
async fn test_schedule_upsert_replaces_content() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let org = ctx.organization().await;
    let machine = repo
        .create_machine(
            org.id,
            CreateMachineRequest {
                name: unique("machine"),
                ..CreateMachineRequest::default()
            },
        )
        .await
        .unwrap();

    let first = repo
        .upsert_schedule(machine.id, ScheduleRequest { content: json!({"a": 1}) })
        .await
        .unwrap();
    let second = repo
        .upsert_schedule(machine.id, ScheduleRequest { content: json!({"a": 2}) })
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(repo.read_schedule(machine.id).await.unwrap().content, json!({"a": 2}));

    repo.delete_schedule(machine.id).await.unwrap();
    assert!(matches!(
        repo.read_schedule(machine.id).await,
        Err(StoreError::NotFound)
    ));
}

#[tokio::test]
#[ignore]
async fn test_organization_delete_cascades() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let org = ctx.organization().await;

    let machine = repo
        .create_machine(
            org.id,
            CreateMachineRequest {
                name: unique("machine"),
                ..CreateMachineRequest::default()
            },
        )
        .await
        .unwrap();
    let task = repo
        .create_task(
            org.id,
            CreateTaskRequest {
                name: unique("task"),
                description: String::new(),
                content: json!({"kind": "command", "program": "true"}),
            },
        )
        .await
        .unwrap();
    let record = repo
        .create_record(
            machine.id,
            CreateRecordRequest {
                task: Some(task.name.clone()),
                executed_at: Utc::now(),
                status: 0,
                output: String::new(),
            },
        )
        .await
        .unwrap();

    repo.delete_organization(org.id).await.unwrap();

    assert!(matches!(
        repo.read_machine(org.id, &machine.name).await,
        Err(StoreError::NotFound)
    ));
    assert!(matches!(
        repo.read_task(org.id, &task.name).await,
        Err(StoreError::NotFound)
    ));
    assert!(matches!(
        repo.read_record(record.id).await,
        Err(StoreError::NotFound)
    ));
}
