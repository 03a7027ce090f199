//! In-memory task service shared by the simulated client and its teammates.
//!
//! Every successful write is queued as a broadcast for the workspace it
//! touched. The simulator routes broadcasts onto the client's push channel
//! when that channel is open for the workspace.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use taskdeck_core::SyncError;
use taskdeck_core::model::{
    Task, TaskDraft, TaskId, TaskPatch, TaskWithWorkspace, User, UserId, Workspace, WorkspaceId,
    WorkspaceMember, WorkspaceRole, WorkspaceType,
};
use taskdeck_core::push::PushEvent;
use taskdeck_core::remote::RemoteService;

/// The signed-in user of the simulated client.
pub const VIEWER_ID: UserId = 1;
/// Author of every teammate write.
pub const TEAMMATE_ID: UserId = 2;

const CLOCK_START: i64 = 1_700_000_000;

#[derive(Debug, Default)]
struct ServerState {
    workspaces: Vec<Workspace>,
    tasks: BTreeMap<TaskId, Task>,
    members: Vec<WorkspaceMember>,
    next_id: i64,
    clock: i64,
    fail_next_write: Option<SyncError>,
    broadcasts: Vec<(WorkspaceId, PushEvent)>,
}

impl ServerState {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        DateTime::from_timestamp(CLOCK_START + self.clock, 0).unwrap_or_default()
    }

    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_write(&mut self) -> Result<(), SyncError> {
        self.fail_next_write.take().map_or(Ok(()), Err)
    }

    fn workspace(&self, id: WorkspaceId) -> Result<&Workspace, SyncError> {
        self.workspaces
            .iter()
            .find(|w| w.id == id)
            .ok_or_else(|| not_found("workspace", id))
    }

    fn insert_task(&mut self, workspace_id: WorkspaceId, draft: &TaskDraft) -> Task {
        let now = self.tick();
        let task = Task {
            id: self.allocate_id(),
            title: draft.title.trim().to_string(),
            description: draft.description.clone(),
            status: draft.status.unwrap_or_default(),
            priority: draft.priority.unwrap_or_default(),
            workspace_id,
            assignee_id: draft.assignee_id,
            due_date: draft.due_date,
            created_at: now,
            updated_at: now,
        };
        self.tasks.insert(task.id, task.clone());
        self.broadcasts.push((
            workspace_id,
            PushEvent::TaskCreated { task: task.clone() },
        ));
        task
    }

    fn patch_task(&mut self, task_id: TaskId, patch: &TaskPatch) -> Result<Task, SyncError> {
        let now = self.tick();
        let current = self
            .tasks
            .get(&task_id)
            .ok_or_else(|| not_found("task", task_id))?;
        let mut next = patch.apply_to(current);
        next.updated_at = now;
        self.tasks.insert(task_id, next.clone());
        self.broadcasts.push((
            next.workspace_id,
            PushEvent::TaskUpdated { task: next.clone() },
        ));
        Ok(next)
    }

    fn remove_task(&mut self, task_id: TaskId) -> Result<(), SyncError> {
        let removed = self
            .tasks
            .remove(&task_id)
            .ok_or_else(|| not_found("task", task_id))?;
        self.broadcasts
            .push((removed.workspace_id, PushEvent::TaskDeleted { task_id }));
        Ok(())
    }
}

fn not_found(what: &str, id: i64) -> SyncError {
    SyncError::Validation {
        status: 404,
        detail: format!("{what} {id} not found"),
    }
}

fn member(workspace_id: WorkspaceId, user_id: UserId, role: WorkspaceRole) -> WorkspaceMember {
    WorkspaceMember {
        workspace_id,
        user_id,
        role,
        user: Some(User {
            id: user_id,
            email: format!("user{user_id}@taskdeck.test"),
            is_active: true,
        }),
    }
}

/// Cheaply cloneable handle; clones share one server.
#[derive(Debug, Clone, Default)]
pub struct SimServer {
    state: Rc<RefCell<ServerState>>,
}

impl SimServer {
    /// A server with `workspace_count` workspaces (ids `1..=n`). The first is
    /// the viewer's personal workspace; the rest are shared with the teammate.
    #[must_use]
    pub fn new(workspace_count: usize) -> Self {
        let mut state = ServerState::default();
        for n in 1..=workspace_count {
            let id = i64::try_from(n).unwrap_or(i64::MAX);
            let (kind, name) = if n == 1 {
                (WorkspaceType::Personal, "Personal".to_string())
            } else {
                (WorkspaceType::Team, format!("Team {n}"))
            };
            state.workspaces.push(Workspace {
                id,
                name,
                kind,
                owner_id: VIEWER_ID,
            });
            state.members.push(member(id, VIEWER_ID, WorkspaceRole::Admin));
            if n > 1 {
                state.members.push(member(id, TEAMMATE_ID, WorkspaceRole::Member));
            }
        }
        state.next_id = i64::try_from(workspace_count).unwrap_or(0) + 100;
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    #[must_use]
    pub fn workspace_ids(&self) -> Vec<WorkspaceId> {
        self.state.borrow().workspaces.iter().map(|w| w.id).collect()
    }

    /// Authoritative task list of a workspace, by id.
    #[must_use]
    pub fn tasks_in(&self, workspace_id: WorkspaceId) -> Vec<Task> {
        self.state
            .borrow()
            .tasks
            .values()
            .filter(|t| t.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    /// Make the next client write fail with `err`.
    pub fn fail_next_write(&self, err: SyncError) {
        self.state.borrow_mut().fail_next_write = Some(err);
    }

    /// Disarm a failure that no write consumed.
    pub fn clear_write_failure(&self) {
        self.state.borrow_mut().fail_next_write = None;
    }

    /// Every broadcast since the last call, in write order.
    #[must_use]
    pub fn take_broadcasts(&self) -> Vec<(WorkspaceId, PushEvent)> {
        std::mem::take(&mut self.state.borrow_mut().broadcasts)
    }

    // -----------------------------------------------------------------------
    // Teammate writes: bypass failure injection, broadcast like any write
    // -----------------------------------------------------------------------

    pub fn teammate_create(&self, workspace_id: WorkspaceId, title: &str) -> Task {
        let draft = TaskDraft {
            assignee_id: Some(TEAMMATE_ID),
            ..TaskDraft::new(title)
        };
        self.state.borrow_mut().insert_task(workspace_id, &draft)
    }

    pub fn teammate_update(&self, task_id: TaskId, patch: &TaskPatch) -> Option<Task> {
        self.state.borrow_mut().patch_task(task_id, patch).ok()
    }

    pub fn teammate_delete(&self, task_id: TaskId) -> bool {
        self.state.borrow_mut().remove_task(task_id).is_ok()
    }
}

impl RemoteService for SimServer {
    fn list_workspaces(&self) -> Result<Vec<Workspace>, SyncError> {
        Ok(self.state.borrow().workspaces.clone())
    }

    fn create_workspace(&self, name: &str) -> Result<Workspace, SyncError> {
        let mut state = self.state.borrow_mut();
        state.check_write()?;
        let workspace = Workspace {
            id: state.allocate_id(),
            name: name.to_string(),
            kind: WorkspaceType::Team,
            owner_id: VIEWER_ID,
        };
        state.workspaces.push(workspace.clone());
        state
            .members
            .push(member(workspace.id, VIEWER_ID, WorkspaceRole::Admin));
        Ok(workspace)
    }

    fn list_tasks(&self, workspace_id: WorkspaceId) -> Result<Vec<Task>, SyncError> {
        self.state.borrow().workspace(workspace_id)?;
        Ok(self.tasks_in(workspace_id))
    }

    fn create_task(
        &self,
        workspace_id: WorkspaceId,
        draft: &TaskDraft,
    ) -> Result<Task, SyncError> {
        let mut state = self.state.borrow_mut();
        state.check_write()?;
        state.workspace(workspace_id)?;
        Ok(state.insert_task(workspace_id, draft))
    }

    fn update_task(&self, task_id: TaskId, patch: &TaskPatch) -> Result<Task, SyncError> {
        let mut state = self.state.borrow_mut();
        state.check_write()?;
        state.patch_task(task_id, patch)
    }

    fn delete_task(&self, task_id: TaskId) -> Result<(), SyncError> {
        let mut state = self.state.borrow_mut();
        state.check_write()?;
        state.remove_task(task_id)
    }

    fn my_tasks(&self) -> Result<Vec<TaskWithWorkspace>, SyncError> {
        let state = self.state.borrow();
        Ok(state
            .tasks
            .values()
            .filter(|t| t.assignee_id == Some(VIEWER_ID))
            .filter_map(|t| {
                let workspace = state.workspace(t.workspace_id).ok()?;
                Some(TaskWithWorkspace {
                    task: t.clone(),
                    workspace_name: workspace.name.clone(),
                })
            })
            .collect())
    }

    fn list_members(&self, workspace_id: WorkspaceId) -> Result<Vec<WorkspaceMember>, SyncError> {
        let state = self.state.borrow();
        state.workspace(workspace_id)?;
        Ok(state
            .members
            .iter()
            .filter(|m| m.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    fn invite_member(
        &self,
        workspace_id: WorkspaceId,
        email: &str,
    ) -> Result<WorkspaceMember, SyncError> {
        let mut state = self.state.borrow_mut();
        state.check_write()?;
        state.workspace(workspace_id)?;
        let user_id = state.allocate_id();
        let mut invited = member(workspace_id, user_id, WorkspaceRole::Member);
        if let Some(user) = invited.user.as_mut() {
            user.email = email.to_string();
        }
        state.members.push(invited.clone());
        Ok(invited)
    }

    fn remove_member(&self, workspace_id: WorkspaceId, user_id: UserId) -> Result<(), SyncError> {
        let mut state = self.state.borrow_mut();
        state.check_write()?;
        let before = state.members.len();
        state
            .members
            .retain(|m| !(m.workspace_id == workspace_id && m.user_id == user_id));
        if state.members.len() == before {
            return Err(not_found("member", user_id));
        }
        Ok(())
    }
}
