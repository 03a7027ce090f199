//! Live task events from the per-workspace push channel.
//!
//! Events patch the workspace task list directly (no refetch) through
//! [`reconcile_tasks`], the one routine that turns `(tasks, event)` into the
//! next task list. The inbox has no viewer identity here, so it is
//! invalidated instead of patched.
//!
//! Each [`PushReconciler::open`] yields a fresh [`ChannelEpoch`]. Deliveries
//! carry the epoch of the channel they arrived on; anything from a torn-down
//! channel is dropped, so a late message can never patch a workspace that is
//! no longer active.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CacheData, CacheKey, QueryCache};
use crate::error::SyncError;
use crate::model::{Task, TaskId, WorkspaceId};

// ---------------------------------------------------------------------------
// Wire events
// ---------------------------------------------------------------------------

/// One message on the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushEvent {
    TaskCreated { task: Task },
    TaskUpdated { task: Task },
    TaskDeleted { task_id: TaskId },
}

impl PushEvent {
    /// Decode one channel message.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Decode`] for invalid JSON, an unknown `type`, or
    /// a missing payload field.
    pub fn parse(raw: &str) -> Result<Self, SyncError> {
        Ok(serde_json::from_str(raw)?)
    }

    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        match self {
            Self::TaskCreated { task } | Self::TaskUpdated { task } => task.id,
            Self::TaskDeleted { task_id } => *task_id,
        }
    }

    /// Workspace named by the payload. Deletions only carry an id.
    #[must_use]
    pub const fn workspace_id(&self) -> Option<WorkspaceId> {
        match self {
            Self::TaskCreated { task } | Self::TaskUpdated { task } => Some(task.workspace_id),
            Self::TaskDeleted { .. } => None,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TaskCreated { .. } => "TASK_CREATED",
            Self::TaskUpdated { .. } => "TASK_UPDATED",
            Self::TaskDeleted { .. } => "TASK_DELETED",
        }
    }
}

impl fmt::Display for PushEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.kind(), self.task_id())
    }
}

/// Next task list after `event`.
///
/// - created: appended unless a task with that id is already present
/// - updated: replaces the task with that id, appended if absent
/// - deleted: removes the task with that id
///
/// Idempotent: applying the same event twice equals applying it once.
#[must_use]
pub fn reconcile_tasks(current: &[Task], event: &PushEvent) -> Vec<Task> {
    match event {
        PushEvent::TaskCreated { task } => {
            let mut next = current.to_vec();
            if !next.iter().any(|t| t.id == task.id) {
                next.push(task.clone());
            }
            next
        }
        PushEvent::TaskUpdated { task } => {
            let mut next = current.to_vec();
            match next.iter_mut().find(|t| t.id == task.id) {
                Some(slot) => slot.clone_from(task),
                None => next.push(task.clone()),
            }
            next
        }
        PushEvent::TaskDeleted { task_id } => {
            current.iter().filter(|t| t.id != *task_id).cloned().collect()
        }
    }
}

/// Apply `event` to workspace `workspace_id`'s cached task list and
/// invalidate the inbox.
///
/// A list that has not loaded yet is patched from empty. The patch supersedes
/// any in-flight fetch and leaves the entry stale, so the next revalidation
/// brings in the full list.
pub fn apply_event(cache: &mut QueryCache, workspace_id: WorkspaceId, event: &PushEvent) {
    let key = CacheKey::WorkspaceTasks(workspace_id);
    let entry = cache.patch(key, |data| {
        let tasks = data.and_then(CacheData::as_tasks).unwrap_or(&[]);
        Some(CacheData::Tasks(reconcile_tasks(tasks, event)))
    });
    debug!(%key, generation = entry.generation, stale = entry.is_stale, %event, "push event patched");
    cache.invalidate(CacheKey::MyTasks);
}

// ---------------------------------------------------------------------------
// Channel lifecycle
// ---------------------------------------------------------------------------

/// Identifies one opened channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelEpoch(u64);

impl ChannelEpoch {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Open {
        workspace_id: WorkspaceId,
        epoch: ChannelEpoch,
    },
}

/// What happened to one delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Applied(PushEvent),
    /// Arrived on a channel that has since been closed or replaced.
    StaleChannel,
    /// Names a task in a workspace other than the channel's.
    ForeignWorkspace(WorkspaceId),
    Malformed(SyncError),
}

impl Delivery {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Tracks the single live channel and routes its messages into the cache.
#[derive(Debug)]
pub struct PushReconciler {
    state: ChannelState,
    last_epoch: u64,
}

impl Default for PushReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl PushReconciler {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: ChannelState::Closed,
            last_epoch: 0,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ChannelState {
        self.state
    }

    #[must_use]
    pub const fn workspace_id(&self) -> Option<WorkspaceId> {
        match self.state {
            ChannelState::Open { workspace_id, .. } => Some(workspace_id),
            ChannelState::Closed => None,
        }
    }

    /// Open the channel for `workspace_id`, replacing any open channel.
    /// No backlog is replayed.
    pub fn open(&mut self, workspace_id: WorkspaceId) -> ChannelEpoch {
        self.close();
        self.last_epoch += 1;
        let epoch = ChannelEpoch(self.last_epoch);
        self.state = ChannelState::Open {
            workspace_id,
            epoch,
        };
        info!(workspace_id, epoch = epoch.0, "push channel opened");
        epoch
    }

    /// Planned teardown (workspace switch, logout). Returns the epoch that
    /// was retired.
    pub fn close(&mut self) -> Option<ChannelEpoch> {
        let ChannelState::Open {
            workspace_id,
            epoch,
        } = self.state
        else {
            return None;
        };
        self.state = ChannelState::Closed;
        info!(workspace_id, epoch = epoch.0, "push channel closed");
        Some(epoch)
    }

    /// The transport dropped or errored. The channel is closed and cached
    /// lists stop receiving patches; nothing is rolled back.
    pub fn interrupt(&mut self, reason: &str) -> Option<SyncError> {
        let workspace_id = self.workspace_id()?;
        self.state = ChannelState::Closed;
        let gap = SyncError::ReconciliationGap {
            workspace_id,
            reason: reason.to_string(),
        };
        warn!(workspace_id, error = %gap, "reconciliation gap");
        Some(gap)
    }

    /// Decode and apply one raw message received on `epoch`.
    pub fn deliver(&self, cache: &mut QueryCache, epoch: ChannelEpoch, raw: &str) -> Delivery {
        let ChannelState::Open {
            workspace_id,
            epoch: current,
        } = self.state
        else {
            debug!(epoch = epoch.0, "message after close, dropped");
            return Delivery::StaleChannel;
        };
        if epoch != current {
            debug!(epoch = epoch.0, current = current.0, "message from retired channel, dropped");
            return Delivery::StaleChannel;
        }

        match PushEvent::parse(raw) {
            Ok(event) => Self::apply_in(cache, workspace_id, event),
            Err(err) => {
                warn!(workspace_id, error = %err, "malformed push message dropped");
                Delivery::Malformed(err)
            }
        }
    }

    /// Apply an already-decoded event to the open channel's workspace.
    pub fn apply(&self, cache: &mut QueryCache, event: PushEvent) -> Delivery {
        match self.workspace_id() {
            Some(workspace_id) => Self::apply_in(cache, workspace_id, event),
            None => Delivery::StaleChannel,
        }
    }

    fn apply_in(cache: &mut QueryCache, workspace_id: WorkspaceId, event: PushEvent) -> Delivery {
        if let Some(other) = event.workspace_id().filter(|w| *w != workspace_id) {
            warn!(workspace_id, event_workspace = other, %event, "event for another workspace dropped");
            return Delivery::ForeignWorkspace(other);
        }
        apply_event(cache, workspace_id, &event);
        Delivery::Applied(event)
    }
}
