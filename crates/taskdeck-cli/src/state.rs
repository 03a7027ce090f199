//! The persisted client state: bearer token and active workspace, one JSON
//! file.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use taskdeck_core::SyncError;
use taskdeck_core::model::WorkspaceId;
use taskdeck_core::scope::ScopeStore;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_workspace_id: Option<WorkspaceId>,
}

/// Handle on the state file. Every call re-reads the file, so two handles on
/// one path never disagree.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file reads as the empty state.
    pub fn load(&self) -> Result<ClientState, SyncError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).map_err(|err| {
                SyncError::Storage(format!("{} is not valid state: {err}", self.path.display()))
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(ClientState::default()),
            Err(err) => Err(storage_error(&self.path, &err)),
        }
    }

    /// Write through a sibling temp file so a crash never leaves half a file.
    pub fn save(&self, state: &ClientState) -> Result<(), SyncError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| storage_error(parent, &err))?;
        }
        let body = serde_json::to_string_pretty(state)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|err| storage_error(&tmp, &err))?;
        fs::rename(&tmp, &self.path).map_err(|err| storage_error(&self.path, &err))?;
        debug!(path = %self.path.display(), "saved client state");
        Ok(())
    }

    pub fn update(&self, f: impl FnOnce(&mut ClientState)) -> Result<ClientState, SyncError> {
        let mut state = self.load()?;
        f(&mut state);
        self.save(&state)?;
        Ok(state)
    }

    /// Forget token and workspace. Removing an absent file is fine.
    pub fn clear(&self) -> Result<(), SyncError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_error(&self.path, &err)),
        }
    }
}

fn storage_error(path: &Path, err: &std::io::Error) -> SyncError {
    SyncError::Storage(format!("{}: {err}", path.display()))
}

impl ScopeStore for StateFile {
    fn load(&self) -> Result<Option<WorkspaceId>, SyncError> {
        Ok(Self::load(self)?.active_workspace_id)
    }

    fn save(&mut self, active: Option<WorkspaceId>) -> Result<(), SyncError> {
        self.update(|state| state.active_workspace_id = active).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn state_file(dir: &TempDir) -> StateFile {
        StateFile::new(dir.path().join("nested/state.json"))
    }

    #[test]
    fn missing_file_is_empty_state() {
        let dir = TempDir::new().unwrap();
        assert_eq!(state_file(&dir).load().unwrap(), ClientState::default());
    }

    #[test]
    fn save_creates_parent_and_round_trips() {
        let dir = TempDir::new().unwrap();
        let file = state_file(&dir);
        let state = ClientState {
            token: Some("abc".into()),
            active_workspace_id: Some(7),
        };
        file.save(&state).unwrap();
        assert_eq!(file.load().unwrap(), state);
        assert!(!file.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn scope_store_keeps_the_token() {
        let dir = TempDir::new().unwrap();
        let mut file = state_file(&dir);
        file.update(|s| s.token = Some("abc".into())).unwrap();

        ScopeStore::save(&mut file, Some(9)).unwrap();
        assert_eq!(ScopeStore::load(&file).unwrap(), Some(9));
        assert_eq!(file.load().unwrap().token.as_deref(), Some("abc"));

        ScopeStore::save(&mut file, None).unwrap();
        let state = file.load().unwrap();
        assert_eq!(state.active_workspace_id, None);
        assert_eq!(state.token.as_deref(), Some("abc"));
    }

    #[test]
    fn clear_removes_everything_and_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let file = state_file(&dir);
        file.save(&ClientState {
            token: Some("abc".into()),
            active_workspace_id: Some(1),
        })
        .unwrap();
        file.clear().unwrap();
        file.clear().unwrap();
        assert_eq!(file.load().unwrap(), ClientState::default());
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = TempDir::new().unwrap();
        let file = state_file(&dir);
        fs::create_dir_all(file.path().parent().unwrap()).unwrap();
        fs::write(file.path(), "{not json").unwrap();
        assert!(matches!(file.load(), Err(SyncError::Storage(_))));
    }

    #[test]
    fn empty_fields_are_omitted_on_disk() {
        let dir = TempDir::new().unwrap();
        let file = state_file(&dir);
        file.save(&ClientState {
            token: Some("abc".into()),
            active_workspace_id: None,
        })
        .unwrap();
        let raw = fs::read_to_string(file.path()).unwrap();
        assert!(!raw.contains("active_workspace_id"));
    }
}
