//! Keyed cache of server-derived collections.
//!
//! Every view reads through a [`CacheKey`]; the [`QueryCache`] holds one
//! [`CacheEntry`] per key and hands out shared `Arc` snapshots of it, so all
//! observers of a key always look at the same entry.
//!
//! # Fetch lifecycle
//!
//! The cache never talks to the network. When a read needs fresh data it
//! issues a [`FetchTicket`] (key + generation) into an outbox; whoever drives
//! the cache (the [`Session`](crate::session::Session), a test, the
//! simulator) performs the request and reports back with
//! [`QueryCache::complete_fetch`]. Only the ticket matching the entry's
//! current in-flight generation is applied; anything older is discarded.

pub mod query;

pub use query::{FetchOutcome, Listener, QueryCache, Subscription, SubscriptionId};

use std::fmt;

use crate::error::SyncError;
use crate::model::{Task, TaskId, TaskWithWorkspace, Workspace, WorkspaceId, WorkspaceMember};

// ---------------------------------------------------------------------------
// CacheKey
// ---------------------------------------------------------------------------

/// One cacheable resource view. The string form is the resource path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    /// `/workspaces`
    Workspaces,
    /// `/workspaces/{id}/tasks`
    WorkspaceTasks(WorkspaceId),
    /// `/tasks/me`, the cross-workspace inbox.
    MyTasks,
    /// `/workspaces/{id}/members`
    Members(WorkspaceId),
}

impl CacheKey {
    /// Resource path relative to the API prefix.
    #[must_use]
    pub fn path(self) -> String {
        match self {
            Self::Workspaces => "/workspaces".to_string(),
            Self::WorkspaceTasks(id) => format!("/workspaces/{id}/tasks"),
            Self::MyTasks => "/tasks/me".to_string(),
            Self::Members(id) => format!("/workspaces/{id}/members"),
        }
    }

    /// The workspace this key is scoped to, if any.
    #[must_use]
    pub const fn workspace_id(self) -> Option<WorkspaceId> {
        match self {
            Self::WorkspaceTasks(id) | Self::Members(id) => Some(id),
            Self::Workspaces | Self::MyTasks => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

// ---------------------------------------------------------------------------
// CacheData / CacheEntry
// ---------------------------------------------------------------------------

/// Payload stored under a key. The variant always matches the key's resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheData {
    Workspaces(Vec<Workspace>),
    Tasks(Vec<Task>),
    Inbox(Vec<TaskWithWorkspace>),
    Members(Vec<WorkspaceMember>),
}

impl CacheData {
    #[must_use]
    pub fn as_tasks(&self) -> Option<&[Task]> {
        match self {
            Self::Tasks(tasks) => Some(tasks),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_workspaces(&self) -> Option<&[Workspace]> {
        match self {
            Self::Workspaces(list) => Some(list),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_inbox(&self) -> Option<&[TaskWithWorkspace]> {
        match self {
            Self::Inbox(rows) => Some(rows),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_members(&self) -> Option<&[WorkspaceMember]> {
        match self {
            Self::Members(list) => Some(list),
            _ => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Workspaces(v) => v.len(),
            Self::Tasks(v) => v.len(),
            Self::Inbox(v) => v.len(),
            Self::Members(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable snapshot of one key's state. Replaced wholesale on every change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    /// Last good data. Survives failed fetches and invalidation.
    pub data: Option<CacheData>,
    /// Error from the most recent failed fetch, cleared by the next success.
    pub error: Option<SyncError>,
    /// A fetch for the current generation is in flight.
    pub is_loading: bool,
    /// Data may be out of date; the next observed read refetches.
    pub is_stale: bool,
    /// Monotonic per-key counter, advanced by every issued fetch, patch and cancellation.
    pub generation: u64,
}

impl CacheEntry {
    /// A never-fetched entry: no data, stale.
    #[must_use]
    pub const fn empty(key: CacheKey) -> Self {
        Self {
            key,
            data: None,
            error: None,
            is_loading: false,
            is_stale: true,
            generation: 0,
        }
    }

    /// Tasks held by a task-list entry, or an empty slice.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        self.data.as_ref().and_then(CacheData::as_tasks).unwrap_or(&[])
    }

    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks().iter().find(|t| t.id == id)
    }

    #[must_use]
    pub const fn has_data(&self) -> bool {
        self.data.is_some()
    }
}

/// Identifies one issued fetch. Completing a ticket whose generation is no
/// longer the key's in-flight generation is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchTicket {
    pub key: CacheKey,
    pub generation: u64,
}

impl fmt::Display for FetchTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.key, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_render_as_resource_paths() {
        assert_eq!(CacheKey::Workspaces.to_string(), "/workspaces");
        assert_eq!(CacheKey::WorkspaceTasks(7).to_string(), "/workspaces/7/tasks");
        assert_eq!(CacheKey::MyTasks.to_string(), "/tasks/me");
        assert_eq!(CacheKey::Members(9).to_string(), "/workspaces/9/members");
    }

    #[test]
    fn workspace_scoping() {
        assert_eq!(CacheKey::WorkspaceTasks(7).workspace_id(), Some(7));
        assert_eq!(CacheKey::Members(9).workspace_id(), Some(9));
        assert_eq!(CacheKey::MyTasks.workspace_id(), None);
    }

    #[test]
    fn empty_entry_is_stale_without_data() {
        let entry = CacheEntry::empty(CacheKey::MyTasks);
        assert!(entry.is_stale);
        assert!(!entry.has_data());
        assert!(entry.tasks().is_empty());
    }
}
