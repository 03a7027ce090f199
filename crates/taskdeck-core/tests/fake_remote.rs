//! In-memory task service for driving a `Session` in tests.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use taskdeck_core::SyncError;
use taskdeck_core::cache::CacheKey;
use taskdeck_core::model::{
    Task, TaskDraft, TaskId, TaskPatch, TaskStatus, TaskWithWorkspace, UserId, Workspace,
    WorkspaceId, WorkspaceMember, WorkspaceRole, WorkspaceType,
};
use taskdeck_core::remote::RemoteService;

#[derive(Default)]
pub struct State {
    pub workspaces: Vec<Workspace>,
    pub tasks: BTreeMap<TaskId, Task>,
    pub members: Vec<WorkspaceMember>,
    pub next_id: TaskId,
    /// Returned by every write while set.
    pub fail_writes: Option<SyncError>,
    /// Every call answers 401 while set.
    pub revoked: bool,
    pub fetches: Vec<CacheKey>,
}

/// Cloneable handle; clones share state so tests can poke the server while
/// a session owns it.
#[derive(Clone, Default)]
pub struct FakeRemote {
    pub state: Rc<RefCell<State>>,
}

pub fn task(id: TaskId, workspace_id: WorkspaceId, status: TaskStatus) -> Task {
    let at = Utc.timestamp_opt(1_700_000_000 + id, 0).unwrap();
    Task {
        id,
        title: format!("task {id}"),
        description: None,
        status,
        priority: Default::default(),
        workspace_id,
        assignee_id: None,
        due_date: None,
        created_at: at,
        updated_at: at,
    }
}

impl FakeRemote {
    pub fn with_workspaces(ids: &[WorkspaceId]) -> Self {
        let remote = Self::default();
        {
            let mut s = remote.state.borrow_mut();
            s.next_id = 100;
            s.workspaces = ids
                .iter()
                .map(|&id| Workspace {
                    id,
                    name: format!("ws {id}"),
                    kind: WorkspaceType::Team,
                    owner_id: 1,
                })
                .collect();
        }
        remote
    }

    pub fn seed(&self, tasks: impl IntoIterator<Item = Task>) -> &Self {
        let mut s = self.state.borrow_mut();
        for t in tasks {
            s.tasks.insert(t.id, t);
        }
        drop(s);
        self
    }

    pub fn fail_writes(&self, err: Option<SyncError>) {
        self.state.borrow_mut().fail_writes = err;
    }

    pub fn revoke(&self) {
        self.state.borrow_mut().revoked = true;
    }

    pub fn tasks_in(&self, workspace_id: WorkspaceId) -> Vec<Task> {
        self.state
            .borrow()
            .tasks
            .values()
            .filter(|t| t.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    pub fn fetch_count(&self, key: CacheKey) -> usize {
        self.state.borrow().fetches.iter().filter(|k| **k == key).count()
    }

    fn gate(&self) -> Result<(), SyncError> {
        if self.state.borrow().revoked {
            return Err(SyncError::from_status(401, "Could not validate credentials"));
        }
        Ok(())
    }

    fn write_gate(&self) -> Result<(), SyncError> {
        self.gate()?;
        match &self.state.borrow().fail_writes {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn log(&self, key: CacheKey) -> Result<(), SyncError> {
        self.gate()?;
        self.state.borrow_mut().fetches.push(key);
        Ok(())
    }
}

impl RemoteService for FakeRemote {
    fn list_workspaces(&self) -> Result<Vec<Workspace>, SyncError> {
        self.log(CacheKey::Workspaces)?;
        Ok(self.state.borrow().workspaces.clone())
    }

    fn create_workspace(&self, name: &str) -> Result<Workspace, SyncError> {
        self.write_gate()?;
        let mut s = self.state.borrow_mut();
        let id = s.workspaces.iter().map(|w| w.id).max().unwrap_or(0) + 1;
        let ws = Workspace {
            id,
            name: name.to_string(),
            kind: WorkspaceType::Team,
            owner_id: 1,
        };
        s.workspaces.push(ws.clone());
        Ok(ws)
    }

    fn list_tasks(&self, workspace_id: WorkspaceId) -> Result<Vec<Task>, SyncError> {
        self.log(CacheKey::WorkspaceTasks(workspace_id))?;
        Ok(self.tasks_in(workspace_id))
    }

    fn create_task(&self, workspace_id: WorkspaceId, draft: &TaskDraft) -> Result<Task, SyncError> {
        self.write_gate()?;
        let mut s = self.state.borrow_mut();
        s.next_id += 1;
        let mut t = task(s.next_id, workspace_id, draft.status.unwrap_or_default());
        t.title.clone_from(&draft.title);
        s.tasks.insert(t.id, t.clone());
        Ok(t)
    }

    fn update_task(&self, task_id: TaskId, patch: &TaskPatch) -> Result<Task, SyncError> {
        self.write_gate()?;
        let mut s = self.state.borrow_mut();
        let current = s
            .tasks
            .get(&task_id)
            .ok_or_else(|| SyncError::from_status(404, "Task not found"))?;
        let next = patch.apply_to(current);
        s.tasks.insert(task_id, next.clone());
        Ok(next)
    }

    fn delete_task(&self, task_id: TaskId) -> Result<(), SyncError> {
        self.write_gate()?;
        self.state
            .borrow_mut()
            .tasks
            .remove(&task_id)
            .map(|_| ())
            .ok_or_else(|| SyncError::from_status(404, "Task not found"))
    }

    fn my_tasks(&self) -> Result<Vec<TaskWithWorkspace>, SyncError> {
        self.log(CacheKey::MyTasks)?;
        let s = self.state.borrow();
        Ok(s.tasks
            .values()
            .filter(|t| t.assignee_id == Some(1))
            .map(|t| TaskWithWorkspace {
                task: t.clone(),
                workspace_name: format!("ws {}", t.workspace_id),
            })
            .collect())
    }

    fn list_members(&self, workspace_id: WorkspaceId) -> Result<Vec<WorkspaceMember>, SyncError> {
        self.log(CacheKey::Members(workspace_id))?;
        Ok(self
            .state
            .borrow()
            .members
            .iter()
            .filter(|m| m.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    fn invite_member(&self, workspace_id: WorkspaceId, email: &str) -> Result<WorkspaceMember, SyncError> {
        self.write_gate()?;
        let mut s = self.state.borrow_mut();
        let user_id: UserId = 10 + i64::try_from(s.members.len()).unwrap_or(0);
        let member = WorkspaceMember {
            workspace_id,
            user_id,
            role: WorkspaceRole::Member,
            user: Some(taskdeck_core::model::User {
                id: user_id,
                email: email.to_string(),
                is_active: true,
            }),
        };
        s.members.push(member.clone());
        Ok(member)
    }

    fn remove_member(&self, workspace_id: WorkspaceId, user_id: UserId) -> Result<(), SyncError> {
        self.write_gate()?;
        self.state
            .borrow_mut()
            .members
            .retain(|m| !(m.workspace_id == workspace_id && m.user_id == user_id));
        Ok(())
    }
}
