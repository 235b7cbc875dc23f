use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;

// --- Role Capabilities ---

bitflags! {
    /// RoleMask
    ///
    /// The privilege flags a user holds inside one organization. Each bit is an independent
    /// capability: holding `ROOT` does not imply `MAINTAINER`, the caller must carry the exact
    /// bit an operation asks for. Provisioning normally sets every lower bit as well.
    ///
    /// Serialized as the raw integer mask, which is also how it is persisted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(from = "u32", into = "u32")]
    pub struct RoleMask: u32 {
        /// Read access to the organization's fleet.
        const USER = 0b0001;
        /// Create, update and delete machines, tasks and schedules.
        const MAINTAINER = 0b0010;
        /// Manage the organization's users.
        const ADMINISTRATOR = 0b0100;
        /// Destructive organization-level operations.
        const ROOT = 0b1000;
    }
}

impl RoleMask {
    /// Every capability, as provisioned for an organization owner.
    pub const ALL: Self = Self::USER
        .union(Self::MAINTAINER)
        .union(Self::ADMINISTRATOR)
        .union(Self::ROOT);

    /// Lower-case names of the held capabilities, in bit order.
    pub fn names(&self) -> Vec<String> {
        self.iter_names()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect()
    }
}

impl Default for RoleMask {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<u32> for RoleMask {
    fn from(bits: u32) -> Self {
        Self::from_bits_truncate(bits)
    }
}

impl From<i32> for RoleMask {
    fn from(bits: i32) -> Self {
        Self::from_bits_truncate(bits as u32)
    }
}

impl From<RoleMask> for u32 {
    fn from(mask: RoleMask) -> Self {
        mask.bits()
    }
}

// --- Core Entities (Mapped to Database) ---

/// Organization
///
/// The tenant boundary. Its `name` is the identifier used in routes; `id` is the internal
/// key every child row points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Organization {
    pub id: i64,
    pub name: String,
}

/// User
///
/// A person belonging to exactly one organization. The stored `role` is informational for
/// administrators; authorization always uses the mask carried by the caller's token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub email: String,
    #[sqlx(try_from = "i32")]
    #[ts(type = "number")]
    #[schema(value_type = u32)]
    pub role: RoleMask,
}

/// Machine
///
/// A managed host running the task agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Machine {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub description: String,
    pub os: String,
    pub arch: String,
}

/// Task
///
/// A named unit of work. `content` is stored as submitted; [`Task::content`] interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Task {
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub description: String,
    #[schema(value_type = Object)]
    pub content: Value,
}

impl Task {
    pub fn content(&self) -> Result<TaskContent, TaskContentError> {
        TaskContent::parse(&self.content)
    }
}

/// Schedule
///
/// The (single) schedule attached to a machine. The payload is opaque to this service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Schedule {
    pub id: i64,
    pub machine_id: i64,
    #[schema(value_type = Object)]
    pub content: Value,
}

/// Record
///
/// The immutable result of one task execution on one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Record {
    pub id: i64,
    pub machine_id: i64,
    /// Name of the task that produced this record, when the agent reported it.
    pub task: Option<String>,
    #[ts(type = "string")]
    pub executed_at: DateTime<Utc>,
    /// Process exit code.
    pub status: i32,
    pub output: String,
}

// --- Task Content ---

/// CommandTask
///
/// Runs `program` directly with `args`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CommandTask {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Capture stderr together with stdout.
    #[serde(default)]
    pub combined_output: bool,
}

/// ScriptTask
///
/// Feeds `script` to `interpreter` on stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ScriptTask {
    pub interpreter: String,
    pub script: String,
    #[serde(default)]
    pub combined_output: bool,
}

/// TaskContent
///
/// The closed set of task kinds, selected by the `kind` field of the stored JSON.
/// Kinds this build does not know are kept as `Unrecognized` so that newer agents can
/// share an organization with older services.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskContent {
    Command(CommandTask),
    Script(ScriptTask),
    Unrecognized(String),
}

#[derive(Debug, Error)]
pub enum TaskContentError {
    #[error("task content must be an object with a string `kind` field")]
    MissingKind,
    #[error("malformed `{kind}` task content: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl TaskContent {
    pub const COMMAND: &'static str = "command";
    pub const SCRIPT: &'static str = "script";

    /// parse
    ///
    /// Reads the discriminant first, then decodes the variant's own fields. A known kind
    /// with bad fields is an error; an unknown kind is not.
    pub fn parse(value: &Value) -> Result<Self, TaskContentError> {
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or(TaskContentError::MissingKind)?;

        match kind {
            Self::COMMAND => serde_json::from_value(value.clone())
                .map(Self::Command)
                .map_err(|source| TaskContentError::Malformed {
                    kind: Self::COMMAND,
                    source,
                }),
            Self::SCRIPT => serde_json::from_value(value.clone())
                .map(Self::Script)
                .map_err(|source| TaskContentError::Malformed {
                    kind: Self::SCRIPT,
                    source,
                }),
            other => Ok(Self::Unrecognized(other.to_string())),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Command(_) => Self::COMMAND,
            Self::Script(_) => Self::SCRIPT,
            Self::Unrecognized(kind) => kind,
        }
    }
}

// --- Request Payloads (Input Schemas) ---

/// CreateUserRequest
///
/// Input payload for `POST /{org}/users`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    #[ts(type = "number")]
    #[schema(value_type = u32)]
    pub role: RoleMask,
}

/// UpdateUserRequest
///
/// Partial update for `PUT /{org}/users/{user}`. Names are immutable.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "number | null")]
    #[schema(value_type = Option<u32>)]
    pub role: Option<RoleMask>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateMachineRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub arch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateMachineRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateTaskRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[schema(value_type = Object)]
    pub content: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateTaskRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub content: Option<Value>,
}

/// ScheduleRequest
///
/// Body of `PUT /{org}/machines/{machine}/schedule`; replaces any existing schedule.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct ScheduleRequest {
    #[schema(value_type = Object)]
    pub content: Value,
}

/// CreateRecordRequest
///
/// What an agent reports after running a task.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateRecordRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[ts(type = "string")]
    pub executed_at: DateTime<Utc>,
    pub status: i32,
    #[serde(default)]
    pub output: String,
}

// --- Output Schemas ---

/// IdentityResponse
///
/// Output of `GET /auth`: who the presented token resolves to.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct IdentityResponse {
    pub user: String,
    pub organization: String,
    #[ts(type = "number")]
    #[schema(value_type = u32)]
    pub role: RoleMask,
    pub roles: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_mask_serializes_as_integer() {
        let mask = RoleMask::USER | RoleMask::ADMINISTRATOR;
        assert_eq!(serde_json::to_value(mask).unwrap(), json!(5));
        let back: RoleMask = serde_json::from_value(json!(5)).unwrap();
        assert_eq!(back, mask);
    }

    #[test]
    fn role_mask_drops_unknown_bits() {
        let mask = RoleMask::from(0b1_0011_u32);
        assert_eq!(mask, RoleMask::USER | RoleMask::MAINTAINER);
    }

    #[test]
    fn role_names_follow_bit_order() {
        assert_eq!(
            RoleMask::ALL.names(),
            vec!["user", "maintainer", "administrator", "root"]
        );
    }

    #[test]
    fn task_interprets_its_stored_content() {
        let task = Task {
            name: "motd".into(),
            content: json!({"kind": "script", "interpreter": "/bin/sh", "script": "cat /etc/motd"}),
            ..Task::default()
        };
        assert_eq!(task.content().unwrap().kind(), TaskContent::SCRIPT);

        let broken = Task {
            content: json!("not an object"),
            ..task
        };
        assert!(matches!(broken.content(), Err(TaskContentError::MissingKind)));
    }

    #[test]
    fn parses_command_content() {
        let content = TaskContent::parse(&json!({
            "kind": "command",
            "program": "uptime",
            "args": ["-p"]
        }))
        .unwrap();

        assert_eq!(
            content,
            TaskContent::Command(CommandTask {
                program: "uptime".into(),
                args: vec!["-p".into()],
                combined_output: false,
            })
        );
        assert_eq!(content.kind(), "command");
    }

    #[test]
    fn parses_script_content() {
        let content = TaskContent::parse(&json!({
            "kind": "script",
            "interpreter": "/bin/sh",
            "script": "echo hi",
            "combined_output": true
        }))
        .unwrap();

        assert!(matches!(content, TaskContent::Script(ref s) if s.combined_output));
    }

    #[test]
    fn unknown_kind_is_kept() {
        let content = TaskContent::parse(&json!({ "kind": "container", "image": "x" })).unwrap();
        assert_eq!(content, TaskContent::Unrecognized("container".into()));
        assert_eq!(content.kind(), "container");
    }

    #[test]
    fn known_kind_with_bad_fields_is_rejected() {
        let err = TaskContent::parse(&json!({ "kind": "command" })).unwrap_err();
        assert!(matches!(err, TaskContentError::Malformed { kind: "command", .. }));
    }

    #[test]
    fn missing_kind_is_rejected() {
        assert!(matches!(
            TaskContent::parse(&json!({ "program": "ls" })),
            Err(TaskContentError::MissingKind)
        ));
        assert!(matches!(
            TaskContent::parse(&json!("ls")),
            Err(TaskContentError::MissingKind)
        ));
    }
}
