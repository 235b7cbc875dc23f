//! Authorization decisions.
//!
//! `decide` is a pure function of the caller's organization and role mask, the organization
//! that owns the target, and the operation. It never touches the store; the resolver has
//! already established what the target is and who owns it.
//!
//! A tenant mismatch is reported with the same error as an organization that does not exist,
//! so a caller cannot tell a foreign tenant from an unknown name.

use crate::{
    error::ApiError,
    identity::{Caller, MachineCaller},
    models::{Machine, Organization, RoleMask},
    resolver::ORGANIZATION_NOT_FOUND,
};

/// The resource family an operation acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Organization,
    User,
    Machine,
    Task,
    Schedule,
    Record,
}

/// Operation
///
/// What the caller is trying to do. Create, update and delete share one requirement per
/// family, so they are all `Write`; only organization writes are destructive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Single read or collection listing.
    Read(Resource),
    /// A user reading their own user record.
    ReadSelf,
    Write(Resource),
}

impl Operation {
    /// The capability bit the caller must hold.
    pub fn required_role(&self) -> RoleMask {
        match self {
            Operation::ReadSelf => RoleMask::USER,
            // Other people's accounts (email, role) are user management data.
            Operation::Read(Resource::User) => RoleMask::ADMINISTRATOR,
            Operation::Read(_) => RoleMask::USER,
            Operation::Write(Resource::Organization) => RoleMask::ROOT,
            Operation::Write(Resource::User) => RoleMask::ADMINISTRATOR,
            Operation::Write(_) => RoleMask::MAINTAINER,
        }
    }
}

/// Decision
///
/// `TenantMismatch` is kept apart from `Forbidden` so it can be logged as such, but the
/// HTTP boundary reports it exactly like a missing resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Forbidden,
    TenantMismatch,
}

/// decide
///
/// Rules, in order:
/// 1. A target owned by another organization is a tenant mismatch, whatever the role.
/// 2. A self-read needs the `USER` bit.
/// 3. Anything else needs the operation's required bit.
pub fn decide(
    caller_organization: i64,
    caller_role: RoleMask,
    target_organization: i64,
    operation: Operation,
) -> Decision {
    if caller_organization != target_organization {
        return Decision::TenantMismatch;
    }

    if operation == Operation::ReadSelf {
        return if caller_role.contains(RoleMask::USER) {
            Decision::Allow
        } else {
            Decision::Forbidden
        };
    }

    if caller_role.contains(operation.required_role()) {
        Decision::Allow
    } else {
        Decision::Forbidden
    }
}

/// decide_ingest
///
/// A machine may append records to itself only. Another machine of the same organization is
/// a privilege problem; a machine of another organization must not be observable at all.
pub fn decide_ingest(
    caller_organization: i64,
    caller_machine: i64,
    target_organization: i64,
    target_machine: i64,
) -> Decision {
    if caller_organization != target_organization {
        Decision::TenantMismatch
    } else if caller_machine != target_machine {
        Decision::Forbidden
    } else {
        Decision::Allow
    }
}

/// Converts a decision into the error the client sees.
fn enforce(decision: Decision) -> Result<(), ApiError> {
    match decision {
        Decision::Allow => Ok(()),
        Decision::Forbidden => Err(ApiError::Forbidden),
        Decision::TenantMismatch => Err(ApiError::NotFound(ORGANIZATION_NOT_FOUND)),
    }
}

/// admit
///
/// The tenant rule on its own. Handlers run it as soon as the route's organization is
/// resolved, before looking up any of its children, so that a missing child of a foreign
/// organization does not reveal that the organization exists.
pub fn admit(caller: &Caller, organization: &Organization) -> Result<(), ApiError> {
    if caller.organization.id == organization.id {
        return Ok(());
    }
    tracing::warn!(
        user = %caller.user.name,
        caller_org = %caller.organization.name,
        target_org = %organization.name,
        "tenant mismatch reported as not found"
    );
    enforce(Decision::TenantMismatch)
}

/// admit_machine
///
/// [`admit`] for agents.
pub fn admit_machine(caller: &MachineCaller, organization: &Organization) -> Result<(), ApiError> {
    if caller.organization.id == organization.id {
        return Ok(());
    }
    tracing::warn!(
        caller_machine = %caller.machine.name,
        caller_org = %caller.organization.name,
        target_org = %organization.name,
        "tenant mismatch reported as not found"
    );
    enforce(Decision::TenantMismatch)
}

/// authorize
///
/// Runs [`decide`] for an authenticated user against the organization that owns the target
/// and records denials.
pub fn authorize(
    caller: &Caller,
    target: &Organization,
    operation: Operation,
) -> Result<(), ApiError> {
    let decision = decide(caller.organization.id, caller.role, target.id, operation);
    match decision {
        Decision::Allow => {}
        Decision::TenantMismatch => tracing::warn!(
            user = %caller.user.name,
            caller_org = %caller.organization.name,
            target_org = %target.name,
            ?operation,
            "tenant mismatch reported as not found"
        ),
        Decision::Forbidden => tracing::info!(
            user = %caller.user.name,
            organization = %caller.organization.name,
            role = caller.role.bits(),
            required = operation.required_role().bits(),
            ?operation,
            "insufficient role"
        ),
    }
    enforce(decision)
}

/// authorize_ingest
///
/// Runs [`decide_ingest`] for an agent reporting into `machine`.
pub fn authorize_ingest(
    caller: &MachineCaller,
    organization: &Organization,
    machine: &Machine,
) -> Result<(), ApiError> {
    let decision = decide_ingest(
        caller.organization.id,
        caller.machine.id,
        organization.id,
        machine.id,
    );
    if decision != Decision::Allow {
        tracing::warn!(
            caller_machine = %caller.machine.name,
            caller_org = %caller.organization.name,
            target_machine = %machine.name,
            ?decision,
            "record ingestion denied"
        );
    }
    enforce(decision)
}
