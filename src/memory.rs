use async_trait::async_trait;
use std::sync::{
    Mutex, MutexGuard,
    atomic::{AtomicUsize, Ordering},
};

use crate::{
    models::{
        CreateMachineRequest, CreateRecordRequest, CreateTaskRequest, CreateUserRequest, Machine,
        Organization, Record, RoleMask, Schedule, ScheduleRequest, Task, UpdateMachineRequest,
        UpdateTaskRequest, UpdateUserRequest, User,
    },
    repository::{Repository, StoreError, StoreResult},
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    organizations: Vec<Organization>,
    users: Vec<User>,
    machines: Vec<Machine>,
    tasks: Vec<Task>,
    schedules: Vec<Schedule>,
    records: Vec<Record>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn remove_machine_children(&mut self, machine_id: i64) {
        self.schedules.retain(|s| s.machine_id != machine_id);
        self.records.retain(|r| r.machine_id != machine_id);
    }
}

/// MemoryRepository
///
/// An in-process `Repository` used by the test suite and local experiments. It enforces the
/// same per-organization name uniqueness and cascade rules as the Postgres schema and counts
/// every trait call, so tests can assert that a request never reached the store.
///
/// The `seed_*` helpers bypass the counter.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
    calls: AtomicUsize,
    failing: bool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository whose every call reports a store fault.
    pub fn new_failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    /// Number of `Repository` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset_calls(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        // A panic while holding the lock only happens inside a failing test.
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Counts the call and returns the tables, or the simulated fault.
    fn begin(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing {
            return Err(StoreError::Fault("simulated store failure".to_string()));
        }
        Ok(self.lock())
    }

    // --- Seeding ---

    pub fn seed_organization(&self, name: &str) -> Organization {
        let mut tables = self.lock();
        let organization = Organization {
            id: tables.next_id(),
            name: name.to_string(),
        };
        tables.organizations.push(organization.clone());
        organization
    }

    pub fn seed_user(&self, organization: &Organization, name: &str, role: RoleMask) -> User {
        let mut tables = self.lock();
        let user = User {
            id: tables.next_id(),
            organization_id: organization.id,
            name: name.to_string(),
            email: format!("{name}@example.com"),
            role,
        };
        tables.users.push(user.clone());
        user
    }

    pub fn seed_machine(&self, organization: &Organization, name: &str) -> Machine {
        let mut tables = self.lock();
        let machine = Machine {
            id: tables.next_id(),
            organization_id: organization.id,
            name: name.to_string(),
            description: format!("{name} test machine"),
            os: "linux".to_string(),
            arch: "amd64".to_string(),
        };
        tables.machines.push(machine.clone());
        machine
    }

    pub fn seed_task(
        &self,
        organization: &Organization,
        name: &str,
        content: serde_json::Value,
    ) -> Task {
        let mut tables = self.lock();
        let task = Task {
            id: tables.next_id(),
            organization_id: organization.id,
            name: name.to_string(),
            description: String::new(),
            content,
        };
        tables.tasks.push(task.clone());
        task
    }

    pub fn seed_schedule(&self, machine: &Machine, content: serde_json::Value) -> Schedule {
        let mut tables = self.lock();
        let schedule = Schedule {
            id: tables.next_id(),
            machine_id: machine.id,
            content,
        };
        tables.schedules.push(schedule.clone());
        schedule
    }

    pub fn seed_record(&self, machine: &Machine, req: CreateRecordRequest) -> Record {
        let mut tables = self.lock();
        let record = Record {
            id: tables.next_id(),
            machine_id: machine.id,
            task: req.task,
            executed_at: req.executed_at,
            status: req.status,
            output: req.output,
        };
        tables.records.push(record.clone());
        record
    }
}

/// Returns a clone of the first row matching `pred`.
fn find<T: Clone>(rows: &[T], pred: impl Fn(&T) -> bool) -> StoreResult<T> {
    rows.iter().find(|row| pred(row)).cloned().ok_or(StoreError::NotFound)
}

fn find_mut<T>(rows: &mut [T], pred: impl Fn(&T) -> bool) -> StoreResult<&mut T> {
    rows.iter_mut().find(|row| pred(row)).ok_or(StoreError::NotFound)
}

/// Removes the rows matching `pred`; fails when there were none.
fn remove<T>(rows: &mut Vec<T>, pred: impl Fn(&T) -> bool) -> StoreResult<()> {
    let before = rows.len();
    rows.retain(|row| !pred(row));
    if rows.len() == before {
        Err(StoreError::NotFound)
    } else {
        Ok(())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn read_organization(&self, name: &str) -> StoreResult<Organization> {
        let tables = self.begin()?;
        find(&tables.organizations, |o| o.name == name)
    }

    async fn delete_organization(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.begin()?;
        remove(&mut tables.organizations, |o| o.id == id)?;

        let machine_ids: Vec<i64> = tables
            .machines
            .iter()
            .filter(|m| m.organization_id == id)
            .map(|m| m.id)
            .collect();
        for machine_id in machine_ids {
            tables.remove_machine_children(machine_id);
        }
        tables.machines.retain(|m| m.organization_id != id);
        tables.users.retain(|u| u.organization_id != id);
        tables.tasks.retain(|t| t.organization_id != id);
        Ok(())
    }

    // --- USERS ---

    async fn read_user(&self, organization_id: i64, name: &str) -> StoreResult<User> {
        let tables = self.begin()?;
        find(&tables.users, |u| {
            u.organization_id == organization_id && u.name == name
        })
    }

    async fn read_users(&self, organization_id: i64) -> StoreResult<Vec<User>> {
        let tables = self.begin()?;
        Ok(tables
            .users
            .iter()
            .filter(|u| u.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn create_user(&self, organization_id: i64, req: CreateUserRequest) -> StoreResult<User> {
        let mut tables = self.begin()?;
        if tables
            .users
            .iter()
            .any(|u| u.organization_id == organization_id && u.name == req.name)
        {
            return Err(StoreError::Conflict);
        }
        let user = User {
            id: tables.next_id(),
            organization_id,
            name: req.name,
            email: req.email,
            role: req.role,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: i64, req: UpdateUserRequest) -> StoreResult<User> {
        let mut tables = self.begin()?;
        let user = find_mut(&mut tables.users, |u| u.id == id)?;
        if let Some(email) = req.email {
            user.email = email;
        }
        if let Some(role) = req.role {
            user.role = role;
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.begin()?;
        remove(&mut tables.users, |u| u.id == id)
    }

    // --- MACHINES ---

    async fn read_machine(&self, organization_id: i64, name: &str) -> StoreResult<Machine> {
        let tables = self.begin()?;
        find(&tables.machines, |m| {
            m.organization_id == organization_id && m.name == name
        })
    }

    async fn read_machines(&self, organization_id: i64) -> StoreResult<Vec<Machine>> {
        let tables = self.begin()?;
        Ok(tables
            .machines
            .iter()
            .filter(|m| m.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn create_machine(
        &self,
        organization_id: i64,
        req: CreateMachineRequest,
    ) -> StoreResult<Machine> {
        let mut tables = self.begin()?;
        if tables
            .machines
            .iter()
            .any(|m| m.organization_id == organization_id && m.name == req.name)
        {
            return Err(StoreError::Conflict);
        }
        let machine = Machine {
            id: tables.next_id(),
            organization_id,
            name: req.name,
            description: req.description,
            os: req.os,
            arch: req.arch,
        };
        tables.machines.push(machine.clone());
        Ok(machine)
    }

    async fn update_machine(&self, id: i64, req: UpdateMachineRequest) -> StoreResult<Machine> {
        let mut tables = self.begin()?;
        let machine = find_mut(&mut tables.machines, |m| m.id == id)?;
        if let Some(description) = req.description {
            machine.description = description;
        }
        if let Some(os) = req.os {
            machine.os = os;
        }
        if let Some(arch) = req.arch {
            machine.arch = arch;
        }
        Ok(machine.clone())
    }

    async fn delete_machine(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.begin()?;
        remove(&mut tables.machines, |m| m.id == id)?;
        tables.remove_machine_children(id);
        Ok(())
    }

    // --- TASKS ---

    async fn read_task(&self, organization_id: i64, name: &str) -> StoreResult<Task> {
        let tables = self.begin()?;
        find(&tables.tasks, |t| {
            t.organization_id == organization_id && t.name == name
        })
    }

    async fn read_tasks(&self, organization_id: i64) -> StoreResult<Vec<Task>> {
        let tables = self.begin()?;
        Ok(tables
            .tasks
            .iter()
            .filter(|t| t.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn create_task(&self, organization_id: i64, req: CreateTaskRequest) -> StoreResult<Task> {
        let mut tables = self.begin()?;
        if tables
            .tasks
            .iter()
            .any(|t| t.organization_id == organization_id && t.name == req.name)
        {
            return Err(StoreError::Conflict);
        }
        let task = Task {
            id: tables.next_id(),
            organization_id,
            name: req.name,
            description: req.description,
            content: req.content,
        };
        tables.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: i64, req: UpdateTaskRequest) -> StoreResult<Task> {
        let mut tables = self.begin()?;
        let task = find_mut(&mut tables.tasks, |t| t.id == id)?;
        if let Some(description) = req.description {
            task.description = description;
        }
        if let Some(content) = req.content {
            task.content = content;
        }
        Ok(task.clone())
    }

    async fn delete_task(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.begin()?;
        remove(&mut tables.tasks, |t| t.id == id)
    }

    // --- SCHEDULES ---

    async fn read_schedule(&self, machine_id: i64) -> StoreResult<Schedule> {
        let tables = self.begin()?;
        find(&tables.schedules, |s| s.machine_id == machine_id)
    }

    async fn upsert_schedule(
        &self,
        machine_id: i64,
        req: ScheduleRequest,
    ) -> StoreResult<Schedule> {
        let mut tables = self.begin()?;
        if let Ok(existing) = find_mut(&mut tables.schedules, |s| s.machine_id == machine_id) {
            existing.content = req.content;
            return Ok(existing.clone());
        }
        let schedule = Schedule {
            id: tables.next_id(),
            machine_id,
            content: req.content,
        };
        tables.schedules.push(schedule.clone());
        Ok(schedule)
    }

    async fn delete_schedule(&self, machine_id: i64) -> StoreResult<()> {
        let mut tables = self.begin()?;
        remove(&mut tables.schedules, |s| s.machine_id == machine_id)
    }

    // --- RECORDS ---

    async fn read_record(&self, id: i64) -> StoreResult<Record> {
        let tables = self.begin()?;
        find(&tables.records, |r| r.id == id)
    }

    async fn read_records(&self, machine_id: i64) -> StoreResult<Vec<Record>> {
        let tables = self.begin()?;
        Ok(tables
            .records
            .iter()
            .filter(|r| r.machine_id == machine_id)
            .cloned()
            .collect())
    }

    async fn create_record(
        &self,
        machine_id: i64,
        req: CreateRecordRequest,
    ) -> StoreResult<Record> {
        let mut tables = self.begin()?;
        let record = Record {
            id: tables.next_id(),
            machine_id,
            task: req.task,
            executed_at: req.executed_at,
            status: req.status,
            output: req.output,
        };
        tables.records.push(record.clone());
        Ok(record)
    }
}
