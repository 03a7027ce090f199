//! Boundary to the task service.
//!
//! The engine only ever talks to the server through [`RemoteService`]. The
//! CLI implements it over HTTP; tests and the simulator implement it in
//! memory. Calls are blocking: the engine is single-threaded and every call
//! is one suspension point from its point of view.

use crate::cache::{CacheData, CacheKey};
use crate::error::SyncError;
use crate::model::{
    AccessToken, Task, TaskDraft, TaskId, TaskPatch, TaskWithWorkspace, User, UserId, Workspace,
    WorkspaceId, WorkspaceMember,
};

/// REST-shaped task service.
pub trait RemoteService {
    /// `GET /workspaces`
    fn list_workspaces(&self) -> Result<Vec<Workspace>, SyncError>;

    /// `POST /workspaces`
    fn create_workspace(&self, name: &str) -> Result<Workspace, SyncError>;

    /// `GET /workspaces/{id}/tasks`
    fn list_tasks(&self, workspace_id: WorkspaceId) -> Result<Vec<Task>, SyncError>;

    /// `POST /workspaces/{id}/tasks`
    fn create_task(&self, workspace_id: WorkspaceId, draft: &TaskDraft)
    -> Result<Task, SyncError>;

    /// `PATCH /tasks/{id}`
    fn update_task(&self, task_id: TaskId, patch: &TaskPatch) -> Result<Task, SyncError>;

    /// `DELETE /tasks/{id}`
    fn delete_task(&self, task_id: TaskId) -> Result<(), SyncError>;

    /// `GET /tasks/me`
    fn my_tasks(&self) -> Result<Vec<TaskWithWorkspace>, SyncError>;

    /// `GET /workspaces/{id}/members`
    fn list_members(&self, workspace_id: WorkspaceId) -> Result<Vec<WorkspaceMember>, SyncError>;

    /// `POST /workspaces/{id}/members`
    fn invite_member(
        &self,
        workspace_id: WorkspaceId,
        email: &str,
    ) -> Result<WorkspaceMember, SyncError>;

    /// `DELETE /workspaces/{id}/members/{user_id}`
    fn remove_member(&self, workspace_id: WorkspaceId, user_id: UserId) -> Result<(), SyncError>;

    /// Fetch the collection behind a cache key.
    ///
    /// # Errors
    ///
    /// Whatever the underlying list call returns.
    fn fetch(&self, key: CacheKey) -> Result<CacheData, SyncError> {
        match key {
            CacheKey::Workspaces => self.list_workspaces().map(CacheData::Workspaces),
            CacheKey::WorkspaceTasks(id) => self.list_tasks(id).map(CacheData::Tasks),
            CacheKey::MyTasks => self.my_tasks().map(CacheData::Inbox),
            CacheKey::Members(id) => self.list_members(id).map(CacheData::Members),
        }
    }
}

/// Credential endpoints. Kept apart from [`RemoteService`] because they run
/// before there is a token.
pub trait AuthService {
    /// `POST /auth/login` (form-encoded `username`/`password`).
    fn login(&self, email: &str, password: &str) -> Result<AccessToken, SyncError>;

    /// `POST /auth/register`
    fn register(&self, email: &str, password: &str) -> Result<User, SyncError>;

    /// `GET /auth/me`
    fn current_user(&self) -> Result<User, SyncError>;
}

impl<R: RemoteService + ?Sized> RemoteService for &R {
    fn list_workspaces(&self) -> Result<Vec<Workspace>, SyncError> {
        (**self).list_workspaces()
    }
    fn create_workspace(&self, name: &str) -> Result<Workspace, SyncError> {
        (**self).create_workspace(name)
    }
    fn list_tasks(&self, workspace_id: WorkspaceId) -> Result<Vec<Task>, SyncError> {
        (**self).list_tasks(workspace_id)
    }
    fn create_task(
        &self,
        workspace_id: WorkspaceId,
        draft: &TaskDraft,
    ) -> Result<Task, SyncError> {
        (**self).create_task(workspace_id, draft)
    }
    fn update_task(&self, task_id: TaskId, patch: &TaskPatch) -> Result<Task, SyncError> {
        (**self).update_task(task_id, patch)
    }
    fn delete_task(&self, task_id: TaskId) -> Result<(), SyncError> {
        (**self).delete_task(task_id)
    }
    fn my_tasks(&self) -> Result<Vec<TaskWithWorkspace>, SyncError> {
        (**self).my_tasks()
    }
    fn list_members(&self, workspace_id: WorkspaceId) -> Result<Vec<WorkspaceMember>, SyncError> {
        (**self).list_members(workspace_id)
    }
    fn invite_member(
        &self,
        workspace_id: WorkspaceId,
        email: &str,
    ) -> Result<WorkspaceMember, SyncError> {
        (**self).invite_member(workspace_id, email)
    }
    fn remove_member(&self, workspace_id: WorkspaceId, user_id: UserId) -> Result<(), SyncError> {
        (**self).remove_member(workspace_id, user_id)
    }
}
