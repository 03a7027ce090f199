//! `td workspace list|create|use`.

use std::io::{self, Write};

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use taskdeck_core::SyncError;
use taskdeck_core::model::{Workspace, WorkspaceId};

use crate::cmd::Context;
use crate::output::{Renderable, pretty_kv, render_item, render_list};

#[derive(Args, Debug)]
pub struct WorkspaceArgs {
    #[command(subcommand)]
    pub command: WorkspaceCommand,
}

#[derive(Subcommand, Debug)]
pub enum WorkspaceCommand {
    /// List workspaces you belong to. Selects one if none is active.
    List,
    /// Create a team workspace.
    Create {
        /// Workspace name.
        name: String,
    },
    /// Make a workspace the active one.
    Use {
        /// Workspace id.
        id: WorkspaceId,
    },
}

#[derive(Debug, Serialize)]
struct WorkspaceRow {
    #[serde(flatten)]
    workspace: Workspace,
    active: bool,
}

impl Renderable for WorkspaceRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let marker = if self.active { "*" } else { " " };
        writeln!(
            w,
            "{marker} #{:<5} {:<32} {}",
            self.workspace.id, self.workspace.name, self.workspace.kind
        )
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}  {}  {}",
            self.workspace.id, self.workspace.kind, self.active, self.workspace.name
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "TYPE", "ACTIVE", "NAME"]
    }
}

#[derive(Debug, Serialize)]
struct SwitchOutput {
    workspace: Workspace,
    channel_epoch: u64,
}

impl Renderable for SwitchOutput {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        pretty_kv(w, "Active", format!("#{} {}", self.workspace.id, self.workspace.name))?;
        pretty_kv(w, "Type", self.workspace.kind.to_string())
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "active  {}  {}", self.workspace.id, self.workspace.name)
    }
}

pub fn run_workspace(args: &WorkspaceArgs, ctx: &Context) -> Result<()> {
    match &args.command {
        WorkspaceCommand::List => run_list(ctx),
        WorkspaceCommand::Create { name } => run_create(name, ctx),
        WorkspaceCommand::Use { id } => run_use(*id, ctx),
    }
}

fn run_list(ctx: &Context) -> Result<()> {
    let mut session = ctx.session()?;
    let workspaces = session.load_workspaces()?;
    let active = session.active_workspace();
    let rows: Vec<WorkspaceRow> = workspaces
        .into_iter()
        .map(|workspace| WorkspaceRow {
            active: Some(workspace.id) == active,
            workspace,
        })
        .collect();
    render_list(&rows, ctx.output)
}

fn run_create(name: &str, ctx: &Context) -> Result<()> {
    let mut session = ctx.session()?;
    let workspace = session.create_workspace(name)?;
    let active = session.active_workspace() == Some(workspace.id);
    render_item(&WorkspaceRow { workspace, active }, ctx.output)
}

fn run_use(id: WorkspaceId, ctx: &Context) -> Result<()> {
    let mut session = ctx.session()?;
    let workspaces = session.load_workspaces()?;
    let Some(workspace) = workspaces.into_iter().find(|w| w.id == id) else {
        return Err(SyncError::Validation {
            status: 404,
            detail: format!("workspace {id} not found or not a member"),
        }
        .into());
    };
    let epoch = session.switch_workspace(id)?;
    render_item(
        &SwitchOutput {
            workspace,
            channel_epoch: epoch.get(),
        },
        ctx.output,
    )
}
