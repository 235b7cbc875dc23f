#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use chrono::{TimeZone, Utc};
use fleet_authz::{
    AppConfig, AppState, JwtAuthenticator, build_app,
    auth::AuthenticatorState,
    memory::MemoryRepository,
    models::{CreateRecordRequest, Machine, Organization, Record, RoleMask, User},
    repository::RepositoryState,
};
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;
use tower_http::normalize_path::NormalizePath;

pub const SECRET: &str = "integration-test-secret";

/// TestApp
///
/// The full router over an in-memory store, seeded with two tenants:
///
/// * `org123`: users `user456` (all bits), `admin` (user + administrator),
///   `maintainer` (user + maintainer), `viewer` (user) and `nobody` (no bits); machines
///   `web-01` (with schedule and one record) and `db-01` (nothing attached); task `uptime`.
/// * `org456`: user `hank` (all bits); machine `gx-01` with schedule and record; task
///   `gx-backup`.
pub struct TestApp {
    pub app: NormalizePath<Router>,
    pub repo: Arc<MemoryRepository>,
    pub auth: Arc<JwtAuthenticator>,
    pub org123: Organization,
    pub org456: Organization,
    pub user456: User,
    pub web: Machine,
    pub db: Machine,
    pub gx: Machine,
    pub web_record: Record,
    pub gx_record: Record,
}

pub fn record_request(status: i32, output: &str) -> CreateRecordRequest {
    CreateRecordRequest {
        task: Some("uptime".to_string()),
        executed_at: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        status,
        output: output.to_string(),
    }
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_repo(MemoryRepository::new())
    }

    pub fn with_repo(repo: MemoryRepository) -> Self {
        let repo = Arc::new(repo);

        let org123 = repo.seed_organization("org123");
        let org456 = repo.seed_organization("org456");

        let user456 = repo.seed_user(&org123, "user456", RoleMask::ALL);
        repo.seed_user(&org123, "admin", RoleMask::USER | RoleMask::ADMINISTRATOR);
        repo.seed_user(&org123, "maintainer", RoleMask::USER | RoleMask::MAINTAINER);
        repo.seed_user(&org123, "viewer", RoleMask::USER);
        repo.seed_user(&org123, "nobody", RoleMask::empty());
        repo.seed_user(&org456, "hank", RoleMask::ALL);

        let web = repo.seed_machine(&org123, "web-01");
        let db = repo.seed_machine(&org123, "db-01");
        let gx = repo.seed_machine(&org456, "gx-01");

        repo.seed_task(
            &org123,
            "uptime",
            json!({"kind": "command", "program": "uptime", "args": ["-p"]}),
        );
        repo.seed_task(
            &org456,
            "gx-backup",
            json!({"kind": "script", "interpreter": "/bin/sh", "script": "backup.sh"}),
        );

        repo.seed_schedule(&web, json!({"uptime": "*/5 * * * *"}));
        repo.seed_schedule(&gx, json!({"gx-backup": "@daily"}));

        let web_record = repo.seed_record(&web, record_request(0, "up 3 days"));
        let gx_record = repo.seed_record(&gx, record_request(1, "disk full"));

        let auth = Arc::new(JwtAuthenticator::new(SECRET, Duration::from_secs(600)));
        let state = AppState {
            repo: repo.clone() as RepositoryState,
            auth: auth.clone() as AuthenticatorState,
            config: AppConfig {
                jwt_secret: SECRET.to_string(),
                ..AppConfig::default()
            },
        };
        let app = build_app(state).expect("route table must build");

        repo.reset_calls();
        Self {
            app,
            repo,
            auth,
            org123,
            org456,
            user456,
            web,
            db,
            gx,
            web_record,
            gx_record,
        }
    }

    /// A user token whose role is exactly `role`, independent of the stored account.
    pub fn token(&self, user: &str, organization: &str, role: RoleMask) -> String {
        self.auth
            .issue_user_token(user, organization, role)
            .expect("token issuance")
    }

    pub fn machine_token(&self, machine: &str, organization: &str) -> String {
        self.auth
            .issue_machine_token(machine, organization)
            .expect("token issuance")
    }

    /// Token for `user456` of `org123` holding every capability.
    pub fn root_token(&self) -> String {
        self.token("user456", "org123", RoleMask::ALL)
    }

    /// Sends one request through the whole middleware stack and returns the status and the
    /// raw body bytes.
    pub async fn send_raw(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    /// Like [`send_raw`](Self::send_raw), decoding the envelope.
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, bytes) = self.send_raw(method, uri, token, body).await;
        let envelope: Value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|e| panic!("body of {uri} is not JSON ({e}): {bytes:?}"));
        (status, envelope)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(token), None).await
    }
}

/// Asserts the failure envelope shape and returns its message.
pub fn failure_message(status: StatusCode, envelope: &Value) -> String {
    assert_eq!(envelope["code"], json!(status.as_u16()), "{envelope}");
    assert!(envelope.get("payload").is_none(), "{envelope}");
    envelope["message"]
        .as_str()
        .expect("failure envelope carries a message")
        .to_string()
}
