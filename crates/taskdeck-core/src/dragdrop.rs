//! Board drag-and-drop as an optimistic status transition.
//!
//! One gesture moves through `Idle -> Dragging -> Settled -> Idle`. A valid
//! drop patches the cached task list right away (the card jumps columns),
//! then the status change goes through the [`MutationPipeline`]. If the
//! server refuses, the card is patched back to where it started and the
//! error is returned; the cache is never left holding the optimistic status.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info, warn};

use crate::cache::{CacheData, CacheKey, QueryCache};
use crate::error::SyncError;
use crate::model::{Task, TaskId, TaskPatch, TaskStatus, WorkspaceId};
use crate::mutation::MutationPipeline;
use crate::remote::RemoteService;

/// Where a card was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropTarget {
    Column(TaskStatus),
    /// Released outside any column.
    Outside,
}

impl DropTarget {
    /// The status this target stands for, if it is a board column.
    #[must_use]
    pub const fn column(self) -> Option<TaskStatus> {
        match self {
            Self::Column(status) if status.is_board_column() => Some(status),
            Self::Column(_) | Self::Outside => None,
        }
    }
}

impl FromStr for DropTarget {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            return Ok(Self::Outside);
        }
        trimmed
            .parse::<TaskStatus>()
            .map(Self::Column)
            .map_err(|_| SyncError::InvalidDrop(trimmed.to_string()))
    }
}

impl fmt::Display for DropTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(status) => write!(f, "{status}"),
            Self::Outside => f.write_str("outside"),
        }
    }
}

/// The card being dragged and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DragSession {
    pub task_id: TaskId,
    pub workspace_id: WorkspaceId,
    pub origin: TaskStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(DragSession),
    /// Optimistic patch applied; waiting for [`DragDropController::commit`]
    /// or [`DragDropController::rollback`].
    Settled {
        session: DragSession,
        target: TaskStatus,
    },
}

/// Result of releasing a card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// Dropped on its own column. Nothing sent.
    NoOp,
    /// Not a valid column (outside, or BACKLOG). Nothing sent.
    Rejected(DropTarget),
    /// Optimistically moved, awaiting confirmation.
    Pending(TaskStatus),
    /// Server confirmed the move.
    Moved(Task),
}

#[derive(Debug, Default)]
pub struct DragDropController {
    state: DragState,
}

impl DragDropController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn state(&self) -> DragState {
        self.state
    }

    /// Pick up `task`. Any gesture already in progress is abandoned.
    pub fn begin(&mut self, task: &Task) -> DragSession {
        let session = DragSession {
            task_id: task.id,
            workspace_id: task.workspace_id,
            origin: task.status,
        };
        if !matches!(self.state, DragState::Idle) {
            debug!(state = ?self.state, "abandoning unfinished drag");
        }
        self.state = DragState::Dragging(session);
        debug!(task_id = task.id, origin = %task.status, "drag started");
        session
    }

    /// Abandon a drag that has not been dropped yet.
    pub fn cancel(&mut self) {
        if let DragState::Dragging(session) = self.state {
            debug!(task_id = session.task_id, "drag cancelled");
            self.state = DragState::Idle;
        }
    }

    /// Release the card on `target`.
    ///
    /// Invalid targets and same-column drops return to idle without touching
    /// the cache. A valid move patches the card's status in the cached list
    /// and leaves the controller `Settled`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidDrop`] when no drag is in progress.
    pub fn drop_on(
        &mut self,
        target: DropTarget,
        cache: &mut QueryCache,
    ) -> Result<DropOutcome, SyncError> {
        let DragState::Dragging(session) = self.state else {
            return Err(SyncError::InvalidDrop(format!(
                "{target} (no drag in progress)"
            )));
        };

        let Some(status) = target.column() else {
            debug!(task_id = session.task_id, %target, "drop rejected");
            self.state = DragState::Idle;
            return Ok(DropOutcome::Rejected(target));
        };
        if status == session.origin {
            self.state = DragState::Idle;
            return Ok(DropOutcome::NoOp);
        }

        set_status(cache, session, status);
        self.state = DragState::Settled {
            session,
            target: status,
        };
        Ok(DropOutcome::Pending(status))
    }

    /// Send the settled move to the server. On failure the optimistic patch
    /// is reverted before the error is returned.
    ///
    /// # Errors
    ///
    /// [`SyncError::InvalidDrop`] when nothing is settled, otherwise whatever
    /// the update returned.
    pub fn commit<R: RemoteService + ?Sized>(
        &mut self,
        cache: &mut QueryCache,
        remote: &R,
    ) -> Result<Task, SyncError> {
        let DragState::Settled { session, target } = self.state else {
            return Err(SyncError::InvalidDrop("nothing to commit".into()));
        };

        let result =
            MutationPipeline::new(cache, remote).update(session.task_id, &TaskPatch::status(target));
        match result {
            Ok(task) => {
                self.state = DragState::Idle;
                info!(task_id = task.id, from = %session.origin, to = %target, "task moved");
                Ok(task)
            }
            Err(err) => {
                warn!(task_id = session.task_id, error = %err, "move refused, rolling back");
                self.rollback(cache);
                Err(err)
            }
        }
    }

    /// Put the card back in its origin column and return to idle.
    pub fn rollback(&mut self, cache: &mut QueryCache) {
        if let DragState::Settled { session, .. } = self.state {
            set_status(cache, session, session.origin);
            debug!(task_id = session.task_id, origin = %session.origin, "drag rolled back");
        }
        self.state = DragState::Idle;
    }

    /// Drop and commit in one step, the way a board UI uses it.
    ///
    /// # Errors
    ///
    /// See [`drop_on`](Self::drop_on) and [`commit`](Self::commit).
    pub fn drop_and_commit<R: RemoteService + ?Sized>(
        &mut self,
        target: DropTarget,
        cache: &mut QueryCache,
        remote: &R,
    ) -> Result<DropOutcome, SyncError> {
        match self.drop_on(target, cache)? {
            DropOutcome::Pending(_) => self.commit(cache, remote).map(DropOutcome::Moved),
            other => Ok(other),
        }
    }
}

/// Rewrite one card's status in its workspace list. A card that is no
/// longer cached (deleted meanwhile) is left alone.
fn set_status(cache: &mut QueryCache, session: DragSession, status: TaskStatus) {
    let key = CacheKey::WorkspaceTasks(session.workspace_id);
    cache.patch(key, |data| {
        data.cloned().map(|data| match data {
            CacheData::Tasks(tasks) => CacheData::Tasks(
                tasks
                    .into_iter()
                    .map(|t| if t.id == session.task_id { t.with_status(status) } else { t })
                    .collect(),
            ),
            other => other,
        })
    });
}
