pub mod auth;
pub mod completions;
pub mod inbox;
pub mod member;
pub mod sim;
pub mod task;
pub mod watch;
pub mod workspace;

use anyhow::Result;
use taskdeck_core::config::EffectiveConfig;
use taskdeck_core::model::WorkspaceId;
use taskdeck_core::{ErrorCode, Session};

use crate::http::HttpRemote;
use crate::output::{CliError, OutputMode};
use crate::state::StateFile;

/// What every command needs: resolved config and output mode.
pub struct Context {
    pub config: EffectiveConfig,
    pub output: OutputMode,
}

impl Context {
    pub fn state(&self) -> StateFile {
        StateFile::new(self.config.state_path.clone())
    }

    /// Remote without credentials, for login and register.
    pub fn anonymous_remote(&self) -> HttpRemote {
        HttpRemote::new(&self.config.client, None)
    }

    /// The stored token, or the not-logged-in error.
    pub fn token(&self) -> Result<String> {
        self.state()
            .load()?
            .token
            .ok_or_else(|| CliError::from_code(ErrorCode::NotLoggedIn).into())
    }

    /// A session for the signed-in user, restoring the saved workspace.
    pub fn session(&self) -> Result<Session<HttpRemote>> {
        let token = self.token()?;
        let remote = HttpRemote::new(&self.config.client, Some(token));
        Ok(Session::new(remote, Box::new(self.state()))?)
    }
}

/// `explicit`, else the active workspace, auto-selecting one if needed.
pub fn resolve_workspace(
    session: &mut Session<HttpRemote>,
    explicit: Option<WorkspaceId>,
) -> Result<WorkspaceId> {
    if let Some(id) = explicit {
        return Ok(id);
    }
    if let Some(id) = session.active_workspace() {
        return Ok(id);
    }
    session.load_workspaces()?;
    session.active_workspace().ok_or_else(|| {
        CliError {
            message: "no workspace to work in".into(),
            suggestion: Some("Create one with `td workspace create <name>`.".into()),
            error_code: None,
        }
        .into()
    })
}
