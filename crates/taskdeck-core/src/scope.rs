//! The single active workspace and the keys derived from it.

use tracing::{debug, info};

use crate::cache::CacheKey;
use crate::error::SyncError;
use crate::model::{Workspace, WorkspaceId};

/// Persistence for the active workspace id, one named slot.
pub trait ScopeStore {
    /// # Errors
    ///
    /// [`SyncError::Storage`] when the slot cannot be read.
    fn load(&self) -> Result<Option<WorkspaceId>, SyncError>;

    /// # Errors
    ///
    /// [`SyncError::Storage`] when the slot cannot be written.
    fn save(&mut self, active: Option<WorkspaceId>) -> Result<(), SyncError>;
}

/// In-process store, for tests and the simulator.
#[derive(Debug, Default, Clone)]
pub struct MemoryScopeStore {
    slot: Option<WorkspaceId>,
    writes: usize,
}

impl MemoryScopeStore {
    #[must_use]
    pub const fn with_active(active: WorkspaceId) -> Self {
        Self {
            slot: Some(active),
            writes: 0,
        }
    }

    #[must_use]
    pub const fn writes(&self) -> usize {
        self.writes
    }
}

impl ScopeStore for MemoryScopeStore {
    fn load(&self) -> Result<Option<WorkspaceId>, SyncError> {
        Ok(self.slot)
    }

    fn save(&mut self, active: Option<WorkspaceId>) -> Result<(), SyncError> {
        self.slot = active;
        self.writes += 1;
        Ok(())
    }
}

/// Resources whose cache key depends on the active workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopedResource {
    Tasks,
    Members,
}

impl ScopedResource {
    #[must_use]
    pub const fn key(self, workspace_id: WorkspaceId) -> CacheKey {
        match self {
            Self::Tasks => CacheKey::WorkspaceTasks(workspace_id),
            Self::Members => CacheKey::Members(workspace_id),
        }
    }
}

/// Tracks which workspace every scoped view points at.
pub struct WorkspaceScope {
    store: Box<dyn ScopeStore>,
    active: Option<WorkspaceId>,
    auto_selected: bool,
}

impl WorkspaceScope {
    /// Restore the persisted selection. Each call starts a new "load": the
    /// automatic first-workspace selection is available once again.
    ///
    /// # Errors
    ///
    /// Propagates [`ScopeStore::load`] failures.
    pub fn load(store: Box<dyn ScopeStore>) -> Result<Self, SyncError> {
        let active = store.load()?;
        debug!(?active, "workspace scope restored");
        Ok(Self {
            store,
            active,
            auto_selected: false,
        })
    }

    #[must_use]
    pub const fn active(&self) -> Option<WorkspaceId> {
        self.active
    }

    /// Key of `resource` in the active workspace.
    #[must_use]
    pub fn key(&self, resource: ScopedResource) -> Option<CacheKey> {
        self.active.map(|id| resource.key(id))
    }

    /// Make `workspace_id` active and persist it. Returns the previously
    /// active id; selecting the current workspace again changes nothing.
    ///
    /// # Errors
    ///
    /// Propagates [`ScopeStore::save`] failures, leaving the selection as is.
    pub fn select(&mut self, workspace_id: WorkspaceId) -> Result<Option<WorkspaceId>, SyncError> {
        let previous = self.active;
        if previous == Some(workspace_id) {
            return Ok(previous);
        }
        self.store.save(Some(workspace_id))?;
        self.active = Some(workspace_id);
        info!(workspace_id, ?previous, "active workspace changed");
        Ok(previous)
    }

    /// With nothing active, select the first of `workspaces` (server order).
    /// Happens at most once per load; returns the id when it did.
    ///
    /// # Errors
    ///
    /// Propagates [`ScopeStore::save`] failures.
    pub fn ensure_selected(
        &mut self,
        workspaces: &[Workspace],
    ) -> Result<Option<WorkspaceId>, SyncError> {
        if self.active.is_some() || self.auto_selected {
            return Ok(None);
        }
        let Some(first) = workspaces.first() else {
            return Ok(None);
        };
        self.select(first.id)?;
        self.auto_selected = true;
        info!(workspace_id = first.id, "auto-selected first workspace");
        Ok(Some(first.id))
    }

    /// Forget the selection (logout).
    ///
    /// # Errors
    ///
    /// Propagates [`ScopeStore::save`] failures.
    pub fn clear(&mut self) -> Result<(), SyncError> {
        self.store.save(None)?;
        self.active = None;
        Ok(())
    }
}

impl std::fmt::Debug for WorkspaceScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceScope")
            .field("active", &self.active)
            .field("auto_selected", &self.auto_selected)
            .finish_non_exhaustive()
    }
}
