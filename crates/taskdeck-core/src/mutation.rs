//! The write path: remote call first, cache reconciliation second.
//!
//! Every local intent reaches the server and the cache through
//! [`MutationPipeline`]. On success the affected keys are invalidated (never
//! patched) and refetch in the background; on failure the error goes back to
//! the caller and the cache is untouched. Callers that patched optimistically
//! roll back themselves.

use tracing::{debug, warn};

use crate::cache::{CacheKey, QueryCache};
use crate::error::SyncError;
use crate::model::{
    Task, TaskDraft, TaskId, TaskPatch, UserId, Workspace, WorkspaceId, WorkspaceMember,
};
use crate::remote::RemoteService;

/// Borrowed view of the cache and remote for one or more writes.
pub struct MutationPipeline<'a, R: RemoteService + ?Sized> {
    cache: &'a mut QueryCache,
    remote: &'a R,
}

impl<'a, R: RemoteService + ?Sized> MutationPipeline<'a, R> {
    pub fn new(cache: &'a mut QueryCache, remote: &'a R) -> Self {
        Self { cache, remote }
    }

    /// Create a task in `workspace_id`, then invalidate that workspace's list.
    ///
    /// # Errors
    ///
    /// Local draft validation failures and any remote error. The cache is
    /// not touched on error.
    pub fn create(&mut self, workspace_id: WorkspaceId, draft: &TaskDraft) -> Result<Task, SyncError> {
        draft.validate()?;
        let task = self
            .remote
            .create_task(workspace_id, draft)
            .inspect_err(|e| warn!(workspace_id, error = %e, "create task failed"))?;
        debug!(task_id = task.id, workspace_id, "task created");
        self.cache.invalidate(CacheKey::WorkspaceTasks(workspace_id));
        Ok(task)
    }

    /// Update a task, then invalidate its workspace's list and the inbox.
    ///
    /// The inbox is always invalidated: whether the task is (or was) assigned
    /// to the viewer is not known locally.
    ///
    /// # Errors
    ///
    /// Patch validation failures and any remote error, with no cache change.
    pub fn update(&mut self, task_id: TaskId, patch: &TaskPatch) -> Result<Task, SyncError> {
        patch.validate()?;
        let task = self
            .remote
            .update_task(task_id, patch)
            .inspect_err(|e| warn!(task_id, error = %e, "update task failed"))?;
        debug!(task_id, workspace_id = task.workspace_id, "task updated");
        self.cache.invalidate(CacheKey::WorkspaceTasks(task.workspace_id));
        self.cache.invalidate(CacheKey::MyTasks);
        Ok(task)
    }

    /// Delete a task, then invalidate its workspace's list and the inbox.
    ///
    /// The owning workspace is looked up in the cache before the call; when
    /// the task is not cached anywhere every cached task list is invalidated.
    ///
    /// # Errors
    ///
    /// Any remote error, with no cache change.
    pub fn delete(&mut self, task_id: TaskId) -> Result<(), SyncError> {
        let owner = self.cache.find_task(task_id).map(|t| t.workspace_id);
        self.remote
            .delete_task(task_id)
            .inspect_err(|e| warn!(task_id, error = %e, "delete task failed"))?;
        debug!(task_id, ?owner, "task deleted");
        match owner {
            Some(workspace_id) => {
                self.cache.invalidate(CacheKey::WorkspaceTasks(workspace_id));
            }
            None => {
                self.cache
                    .invalidate_matching(|k| matches!(k, CacheKey::WorkspaceTasks(_)));
            }
        }
        self.cache.invalidate(CacheKey::MyTasks);
        Ok(())
    }

    /// # Errors
    ///
    /// Blank names and any remote error, with no cache change.
    pub fn create_workspace(&mut self, name: &str) -> Result<Workspace, SyncError> {
        if name.trim().is_empty() {
            return Err(SyncError::invalid("workspace name must not be empty"));
        }
        let workspace = self.remote.create_workspace(name.trim())?;
        debug!(workspace_id = workspace.id, "workspace created");
        self.cache.invalidate(CacheKey::Workspaces);
        Ok(workspace)
    }

    /// # Errors
    ///
    /// Any remote error (duplicate invite, unknown email), with no cache change.
    pub fn invite_member(
        &mut self,
        workspace_id: WorkspaceId,
        email: &str,
    ) -> Result<WorkspaceMember, SyncError> {
        let member = self.remote.invite_member(workspace_id, email)?;
        self.cache.invalidate(CacheKey::Members(workspace_id));
        Ok(member)
    }

    /// # Errors
    ///
    /// Any remote error, with no cache change.
    pub fn remove_member(&mut self, workspace_id: WorkspaceId, user_id: UserId) -> Result<(), SyncError> {
        self.remote.remove_member(workspace_id, user_id)?;
        self.cache.invalidate(CacheKey::Members(workspace_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheData, Listener};
    use crate::model::fixtures::task;
    use crate::model::{TaskStatus, TaskWithWorkspace};
    use std::cell::RefCell;

    /// Remote that records calls and fails on demand.
    #[derive(Default)]
    struct Recorder {
        calls: RefCell<Vec<String>>,
        fail_with: Option<SyncError>,
    }

    impl Recorder {
        fn failing(err: SyncError) -> Self {
            Self {
                fail_with: Some(err),
                ..Self::default()
            }
        }

        fn record(&self, call: String) -> Result<(), SyncError> {
            self.calls.borrow_mut().push(call);
            self.fail_with.clone().map_or(Ok(()), Err)
        }
    }

    impl RemoteService for Recorder {
        fn list_workspaces(&self) -> Result<Vec<Workspace>, SyncError> {
            Ok(vec![])
        }
        fn create_workspace(&self, name: &str) -> Result<Workspace, SyncError> {
            self.record(format!("create_workspace {name}"))?;
            Ok(Workspace {
                id: 1,
                name: name.into(),
                kind: crate::model::WorkspaceType::Team,
                owner_id: 1,
            })
        }
        fn list_tasks(&self, _: WorkspaceId) -> Result<Vec<Task>, SyncError> {
            Ok(vec![])
        }
        fn create_task(&self, ws: WorkspaceId, draft: &TaskDraft) -> Result<Task, SyncError> {
            self.record(format!("create {ws} {}", draft.title))?;
            Ok(task(50, ws, TaskStatus::Todo))
        }
        fn update_task(&self, id: TaskId, patch: &TaskPatch) -> Result<Task, SyncError> {
            self.record(format!("update {id}"))?;
            Ok(patch.apply_to(&task(id, 7, TaskStatus::Todo)))
        }
        fn delete_task(&self, id: TaskId) -> Result<(), SyncError> {
            self.record(format!("delete {id}"))
        }
        fn my_tasks(&self) -> Result<Vec<TaskWithWorkspace>, SyncError> {
            Ok(vec![])
        }
        fn list_members(&self, _: WorkspaceId) -> Result<Vec<WorkspaceMember>, SyncError> {
            Ok(vec![])
        }
        fn invite_member(&self, ws: WorkspaceId, email: &str) -> Result<WorkspaceMember, SyncError> {
            self.record(format!("invite {ws} {email}"))?;
            Ok(WorkspaceMember {
                workspace_id: ws,
                user_id: 5,
                role: crate::model::WorkspaceRole::Member,
                user: None,
            })
        }
        fn remove_member(&self, ws: WorkspaceId, user: UserId) -> Result<(), SyncError> {
            self.record(format!("remove {ws} {user}"))
        }
    }

    fn noop() -> Listener {
        Box::new(|_| {})
    }

    /// Cache with fresh, observed entries for workspace 7's list and the inbox.
    fn warm_cache() -> QueryCache {
        let mut cache = QueryCache::new();
        cache.subscribe(CacheKey::WorkspaceTasks(7), noop());
        cache.subscribe(CacheKey::MyTasks, noop());
        for ticket in cache.drain_fetches() {
            let data = match ticket.key {
                CacheKey::MyTasks => CacheData::Inbox(vec![]),
                _ => CacheData::Tasks(vec![task(1, 7, TaskStatus::Todo)]),
            };
            cache.complete_fetch(ticket, Ok(data));
        }
        cache
    }

    fn stale_keys(cache: &QueryCache) -> Vec<CacheKey> {
        cache
            .keys()
            .filter(|k| cache.read(*k).is_some_and(|e| e.is_stale))
            .collect()
    }

    #[test]
    fn create_invalidates_only_the_workspace_list() {
        let mut cache = warm_cache();
        let remote = Recorder::default();
        let created = MutationPipeline::new(&mut cache, &remote)
            .create(7, &TaskDraft::new("Write release notes"))
            .unwrap();
        assert_eq!(created.workspace_id, 7);
        assert_eq!(stale_keys(&cache), vec![CacheKey::WorkspaceTasks(7)]);
        assert_eq!(cache.drain_fetches().len(), 1);
    }

    #[test]
    fn update_invalidates_list_and_inbox() {
        let mut cache = warm_cache();
        let remote = Recorder::default();
        MutationPipeline::new(&mut cache, &remote)
            .update(1, &TaskPatch::status(TaskStatus::Done))
            .unwrap();
        assert_eq!(
            stale_keys(&cache),
            vec![CacheKey::WorkspaceTasks(7), CacheKey::MyTasks]
        );
    }

    #[test]
    fn delete_of_uncached_task_invalidates_every_list() {
        let mut cache = warm_cache();
        cache.patch(CacheKey::WorkspaceTasks(9), |_| Some(CacheData::Tasks(vec![])));
        let remote = Recorder::default();
        MutationPipeline::new(&mut cache, &remote).delete(404).unwrap();
        let stale = stale_keys(&cache);
        assert!(stale.contains(&CacheKey::WorkspaceTasks(7)));
        assert!(stale.contains(&CacheKey::WorkspaceTasks(9)));
        assert!(stale.contains(&CacheKey::MyTasks));
    }

    #[test]
    fn failure_leaves_cache_untouched() {
        let mut cache = warm_cache();
        let before: Vec<_> = cache.keys().filter_map(|k| cache.read(k)).collect();
        let remote = Recorder::failing(SyncError::from_status(404, "Task not found"));

        let err = MutationPipeline::new(&mut cache, &remote)
            .delete(1)
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation { status: 404, .. }));

        let after: Vec<_> = cache.keys().filter_map(|k| cache.read(k)).collect();
        assert_eq!(before, after);
        assert!(cache.drain_fetches().is_empty());
    }

    #[test]
    fn blank_draft_never_reaches_the_server() {
        let mut cache = warm_cache();
        let remote = Recorder::default();
        let err = MutationPipeline::new(&mut cache, &remote)
            .create(7, &TaskDraft::new(" "))
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
        assert!(remote.calls.borrow().is_empty());
    }

    #[test]
    fn member_writes_invalidate_member_list() {
        let mut cache = QueryCache::new();
        cache.subscribe(CacheKey::Members(7), noop());
        let ticket = cache.drain_fetches()[0];
        cache.complete_fetch(ticket, Ok(CacheData::Members(vec![])));

        let remote = Recorder::default();
        let mut pipeline = MutationPipeline::new(&mut cache, &remote);
        pipeline.invite_member(7, "ana@example.com").unwrap();
        pipeline.remove_member(7, 5).unwrap();
        assert_eq!(
            *remote.calls.borrow(),
            vec!["invite 7 ana@example.com", "remove 7 5"]
        );
        assert!(cache.read(CacheKey::Members(7)).unwrap().is_stale);
    }

    #[test]
    fn workspace_creation_invalidates_workspace_list() {
        let mut cache = QueryCache::new();
        cache.patch(CacheKey::Workspaces, |_| Some(CacheData::Workspaces(vec![])));
        let remote = Recorder::default();
        let ws = MutationPipeline::new(&mut cache, &remote)
            .create_workspace("  Launch ")
            .unwrap();
        assert_eq!(ws.name, "Launch");
        assert!(MutationPipeline::new(&mut cache, &remote).create_workspace("").is_err());
    }
}
