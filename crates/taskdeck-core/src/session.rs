//! One signed-in client: the cache, the remote it is filled from, and every
//! component that writes to it.
//!
//! The session is the only place fetch tickets are executed. Everything
//! else (mutations, push events, drag-drop, workspace switches) only issues
//! tickets; [`Session::settle`] runs them against the remote until the cache
//! is quiet.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::cache::{
    CacheData, CacheEntry, CacheKey, FetchOutcome, FetchTicket, Listener, QueryCache, Subscription,
    SubscriptionId,
};
use crate::dragdrop::{DragDropController, DropOutcome, DropTarget};
use crate::error::SyncError;
use crate::model::{
    Task, TaskDraft, TaskId, TaskPatch, TaskWithWorkspace, UserId, Workspace, WorkspaceId,
    WorkspaceMember,
};
use crate::mutation::MutationPipeline;
use crate::push::{ChannelEpoch, ChannelState, Delivery, PushEvent, PushReconciler};
use crate::remote::RemoteService;
use crate::scope::{ScopeStore, ScopedResource, WorkspaceScope};

pub struct Session<R: RemoteService> {
    remote: R,
    cache: QueryCache,
    scope: WorkspaceScope,
    push: PushReconciler,
    drag: DragDropController,
    /// Subscriptions that follow the active workspace.
    scoped: BTreeMap<SubscriptionId, ScopedResource>,
    expired: bool,
}

impl<R: RemoteService> Session<R> {
    /// Start a session, restoring the persisted workspace selection and
    /// opening its push channel.
    ///
    /// # Errors
    ///
    /// Propagates scope store read failures.
    pub fn new(remote: R, store: Box<dyn ScopeStore>) -> Result<Self, SyncError> {
        let scope = WorkspaceScope::load(store)?;
        let mut push = PushReconciler::new();
        if let Some(workspace_id) = scope.active() {
            push.open(workspace_id);
        }
        Ok(Self {
            remote,
            cache: QueryCache::new(),
            scope,
            push,
            drag: DragDropController::new(),
            scoped: BTreeMap::new(),
            expired: false,
        })
    }

    #[must_use]
    pub const fn remote(&self) -> &R {
        &self.remote
    }

    #[must_use]
    pub const fn cache(&self) -> &QueryCache {
        &self.cache
    }

    #[must_use]
    pub const fn active_workspace(&self) -> Option<WorkspaceId> {
        self.scope.active()
    }

    #[must_use]
    pub const fn channel(&self) -> ChannelState {
        self.push.state()
    }

    /// `true` once the server rejected the credential. Every further write
    /// fails fast until the user signs in again.
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        self.expired
    }

    #[must_use]
    pub fn read(&self, key: CacheKey) -> Option<Arc<CacheEntry>> {
        self.cache.read(key)
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    pub fn watch(&mut self, key: CacheKey, listener: Listener) -> Subscription {
        self.cache.subscribe(key, listener)
    }

    /// Subscribe to `resource` in the active workspace. The subscription
    /// moves along when the workspace changes. `None` with no workspace
    /// selected.
    pub fn watch_scoped(&mut self, resource: ScopedResource, listener: Listener) -> Option<Subscription> {
        let key = self.scope.key(resource)?;
        let subscription = self.cache.subscribe(key, listener);
        self.scoped.insert(subscription.id, resource);
        Some(subscription)
    }

    pub fn unwatch(&mut self, id: SubscriptionId) -> bool {
        self.scoped.remove(&id);
        self.cache.unsubscribe(id)
    }

    /// Execute queued fetches until none remain, then give observed stale
    /// entries one more round. Returns the number of requests made.
    ///
    /// A 401 stops the loop and expires the session.
    pub fn settle(&mut self) -> usize {
        let mut executed = self.run_outbox();
        if !self.expired && self.cache.revalidate_stale() > 0 {
            executed += self.run_outbox();
        }
        executed
    }

    fn run_outbox(&mut self) -> usize {
        let mut executed = 0;
        loop {
            let tickets = self.take_fetches();
            if tickets.is_empty() {
                return executed;
            }
            for ticket in tickets {
                let result = self.remote.fetch(ticket.key);
                executed += 1;
                self.complete_fetch(ticket, result);
                if self.expired {
                    return executed;
                }
            }
        }
    }

    /// Queued fetches, for drivers that execute them asynchronously instead
    /// of through [`settle`](Self::settle). Empty once the session expired.
    pub fn take_fetches(&mut self) -> Vec<FetchTicket> {
        if self.expired {
            return Vec::new();
        }
        self.cache.drain_fetches()
    }

    /// Report the result of a ticket from [`take_fetches`](Self::take_fetches).
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<CacheData, SyncError>,
    ) -> FetchOutcome {
        if let Err(err) = &result {
            self.note_error(err);
        }
        let outcome = self.cache.complete_fetch(ticket, result);
        debug!(%ticket, ?outcome, "fetch completed");
        outcome
    }

    /// Read `key` through the cache: subscribe, fetch if needed, settle,
    /// unsubscribe. The entry stays cached.
    ///
    /// # Errors
    ///
    /// The fetch error when there is no data to fall back on, or
    /// [`SyncError::Auth`] on an expired session.
    pub fn query(&mut self, key: CacheKey) -> Result<Arc<CacheEntry>, SyncError> {
        self.ensure_live()?;
        let subscription = self.cache.subscribe(key, Box::new(|_| {}));
        self.settle();
        self.cache.unsubscribe(subscription.id);
        self.ensure_live()?;

        let entry = self
            .cache
            .read(key)
            .ok_or_else(|| SyncError::Network(format!("{key} was never fetched")))?;
        match (&entry.data, &entry.error) {
            (None, Some(err)) => Err(err.clone()),
            _ => Ok(entry),
        }
    }

    /// Workspaces, auto-selecting the first one when nothing is active.
    ///
    /// # Errors
    ///
    /// See [`query`](Self::query); scope store failures on auto-select.
    pub fn load_workspaces(&mut self) -> Result<Vec<Workspace>, SyncError> {
        let entry = self.query(CacheKey::Workspaces)?;
        let workspaces = entry
            .data
            .as_ref()
            .and_then(CacheData::as_workspaces)
            .map(<[Workspace]>::to_vec)
            .unwrap_or_default();
        if let Some(selected) = self.scope.ensure_selected(&workspaces)? {
            self.retarget(selected);
        }
        Ok(workspaces)
    }

    /// Tasks of the active workspace.
    ///
    /// # Errors
    ///
    /// [`SyncError::Validation`] with no workspace selected, else see
    /// [`query`](Self::query).
    pub fn active_tasks(&mut self) -> Result<Vec<Task>, SyncError> {
        let workspace_id = self.require_workspace()?;
        let entry = self.query(CacheKey::WorkspaceTasks(workspace_id))?;
        Ok(entry.tasks().to_vec())
    }

    /// # Errors
    ///
    /// See [`query`](Self::query).
    pub fn inbox(&mut self) -> Result<Vec<TaskWithWorkspace>, SyncError> {
        let entry = self.query(CacheKey::MyTasks)?;
        Ok(entry
            .data
            .as_ref()
            .and_then(CacheData::as_inbox)
            .map(<[TaskWithWorkspace]>::to_vec)
            .unwrap_or_default())
    }

    /// # Errors
    ///
    /// See [`query`](Self::query).
    pub fn members(&mut self, workspace_id: WorkspaceId) -> Result<Vec<WorkspaceMember>, SyncError> {
        let entry = self.query(CacheKey::Members(workspace_id))?;
        Ok(entry
            .data
            .as_ref()
            .and_then(CacheData::as_members)
            .map(<[WorkspaceMember]>::to_vec)
            .unwrap_or_default())
    }

    // -----------------------------------------------------------------------
    // Workspace scope
    // -----------------------------------------------------------------------

    /// Make `workspace_id` active: persist it, move every scoped
    /// subscription to the new keys, and replace the push channel. Returns
    /// the new channel's epoch; selecting the active workspace again keeps
    /// the current channel.
    ///
    /// # Errors
    ///
    /// [`SyncError::Auth`] on an expired session, or scope store failures,
    /// with nothing changed in either case.
    pub fn switch_workspace(&mut self, workspace_id: WorkspaceId) -> Result<ChannelEpoch, SyncError> {
        self.ensure_live()?;
        let previous = self.scope.select(workspace_id)?;
        match self.push.state() {
            ChannelState::Open { epoch, .. } if previous == Some(workspace_id) => Ok(epoch),
            _ => Ok(self.retarget(workspace_id)),
        }
    }

    fn retarget(&mut self, workspace_id: WorkspaceId) -> ChannelEpoch {
        self.drag.cancel();
        let moves: Vec<(SubscriptionId, ScopedResource)> =
            self.scoped.iter().map(|(id, r)| (*id, *r)).collect();
        for (id, resource) in moves {
            if self.cache.rekey(id, resource.key(workspace_id)).is_none() {
                self.scoped.remove(&id);
            }
        }
        let epoch = self.push.open(workspace_id);

        // A list kept from an earlier visit missed every event while its
        // channel was closed.
        let tasks = CacheKey::WorkspaceTasks(workspace_id);
        if self
            .cache
            .read(tasks)
            .is_some_and(|e| e.has_data() && !e.is_loading)
        {
            self.cache.invalidate(tasks);
        }
        info!(workspace_id, epoch = epoch.get(), rekeyed = self.scoped.len(), "switched workspace");
        epoch
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// # Errors
    ///
    /// See [`MutationPipeline::create`].
    pub fn create_task(&mut self, workspace_id: WorkspaceId, draft: &TaskDraft) -> Result<Task, SyncError> {
        self.mutate(|p| p.create(workspace_id, draft))
    }

    /// # Errors
    ///
    /// See [`MutationPipeline::update`].
    pub fn update_task(&mut self, task_id: TaskId, patch: &TaskPatch) -> Result<Task, SyncError> {
        self.mutate(|p| p.update(task_id, patch))
    }

    /// # Errors
    ///
    /// See [`MutationPipeline::delete`].
    pub fn delete_task(&mut self, task_id: TaskId) -> Result<(), SyncError> {
        self.mutate(|p| p.delete(task_id))
    }

    /// # Errors
    ///
    /// See [`MutationPipeline::create_workspace`].
    pub fn create_workspace(&mut self, name: &str) -> Result<Workspace, SyncError> {
        self.mutate(|p| p.create_workspace(name))
    }

    /// # Errors
    ///
    /// See [`MutationPipeline::invite_member`].
    pub fn invite_member(&mut self, workspace_id: WorkspaceId, email: &str) -> Result<WorkspaceMember, SyncError> {
        self.mutate(|p| p.invite_member(workspace_id, email))
    }

    /// # Errors
    ///
    /// See [`MutationPipeline::remove_member`].
    pub fn remove_member(&mut self, workspace_id: WorkspaceId, user_id: UserId) -> Result<(), SyncError> {
        self.mutate(|p| p.remove_member(workspace_id, user_id))
    }

    /// Drag a cached task onto `target` and confirm with the server.
    ///
    /// # Errors
    ///
    /// 404-style validation error when the task is not in any cached list,
    /// otherwise see [`DragDropController::drop_and_commit`]. On error the
    /// task is back in its original column.
    pub fn move_task(&mut self, task_id: TaskId, target: DropTarget) -> Result<DropOutcome, SyncError> {
        self.ensure_live()?;
        let task = self.cache.find_task(task_id).ok_or_else(|| SyncError::Validation {
            status: 404,
            detail: format!("task {task_id} is not on a loaded board"),
        })?;
        self.drag.begin(&task);
        let result = self.drag.drop_and_commit(target, &mut self.cache, &self.remote);
        if let Err(err) = &result {
            self.note_error(err);
        }
        result
    }

    fn mutate<T>(
        &mut self,
        op: impl FnOnce(&mut MutationPipeline<'_, R>) -> Result<T, SyncError>,
    ) -> Result<T, SyncError> {
        self.ensure_live()?;
        let result = op(&mut MutationPipeline::new(&mut self.cache, &self.remote));
        if let Err(err) = &result {
            self.note_error(err);
        }
        result
    }

    // -----------------------------------------------------------------------
    // Push channel
    // -----------------------------------------------------------------------

    /// Feed one raw message received on the channel opened as `epoch`.
    pub fn handle_push(&mut self, epoch: ChannelEpoch, raw: &str) -> Delivery {
        self.push.deliver(&mut self.cache, epoch, raw)
    }

    /// Apply a decoded event to the active workspace.
    pub fn apply_push(&mut self, event: PushEvent) -> Delivery {
        self.push.apply(&mut self.cache, event)
    }

    /// The transport for the open channel dropped.
    pub fn push_interrupted(&mut self, reason: &str) -> Option<SyncError> {
        self.push.interrupt(reason)
    }

    /// Reopen the channel for the active workspace after an interruption.
    /// Lists are invalidated since events may have been missed.
    pub fn reconnect(&mut self) -> Option<ChannelEpoch> {
        let workspace_id = self.scope.active()?;
        if self.expired {
            return None;
        }
        let epoch = self.push.open(workspace_id);
        self.cache.invalidate(CacheKey::WorkspaceTasks(workspace_id));
        self.cache.invalidate(CacheKey::MyTasks);
        Some(epoch)
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Close the channel, forget the workspace selection and drop every
    /// cache entry without refetching.
    ///
    /// # Errors
    ///
    /// Scope store failures. The cache is dropped regardless.
    pub fn logout(&mut self) -> Result<(), SyncError> {
        self.push.close();
        self.drag.cancel();
        self.scoped.clear();
        self.cache.clear();
        info!("signed out");
        self.scope.clear()
    }

    fn note_error(&mut self, err: &SyncError) {
        if err.is_fatal() && !self.expired {
            error!(error = %err, "credential rejected, tearing down session");
            self.expired = true;
            self.push.close();
        }
    }

    fn ensure_live(&self) -> Result<(), SyncError> {
        if self.expired {
            return Err(SyncError::Auth("session expired".into()));
        }
        Ok(())
    }

    fn require_workspace(&self) -> Result<WorkspaceId, SyncError> {
        self.scope
            .active()
            .ok_or_else(|| SyncError::invalid("no workspace selected"))
    }
}

impl<R: RemoteService> std::fmt::Debug for Session<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("scope", &self.scope)
            .field("push", &self.push)
            .field("cache", &self.cache)
            .field("expired", &self.expired)
            .finish_non_exhaustive()
    }
}
