//! `td member list|invite|remove`.

use std::io::{self, Write};

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use taskdeck_core::model::{UserId, WorkspaceId, WorkspaceMember};

use crate::cmd::{Context, resolve_workspace};
use crate::output::{Renderable, render_item, render_list, render_success};

#[derive(Args, Debug)]
pub struct MemberArgs {
    /// Workspace id (defaults to the active workspace).
    #[arg(long, short = 'w', global = true)]
    pub workspace: Option<WorkspaceId>,

    #[command(subcommand)]
    pub command: MemberCommand,
}

#[derive(Subcommand, Debug)]
pub enum MemberCommand {
    /// List members of a workspace.
    List,
    /// Add a registered user by email.
    Invite {
        /// Email of the user to add.
        email: String,
    },
    /// Remove a member.
    Remove {
        /// User id of the member.
        user_id: UserId,
    },
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct MemberRow(WorkspaceMember);

impl Renderable for MemberRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "#{:<6} {:<8} {}",
            self.0.user_id,
            self.0.role,
            self.0.display_name()
        )
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}  {}  {}",
            self.0.user_id,
            self.0.role,
            self.0.display_name()
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["USER_ID", "ROLE", "NAME"]
    }
}

pub fn run_member(args: &MemberArgs, ctx: &Context) -> Result<()> {
    let mut session = ctx.session()?;
    let workspace_id = resolve_workspace(&mut session, args.workspace)?;
    match &args.command {
        MemberCommand::List => {
            let rows: Vec<MemberRow> = session
                .members(workspace_id)?
                .into_iter()
                .map(MemberRow)
                .collect();
            render_list(&rows, ctx.output)
        }
        MemberCommand::Invite { email } => {
            let member = session.invite_member(workspace_id, email)?;
            render_item(&MemberRow(member), ctx.output)
        }
        MemberCommand::Remove { user_id } => {
            session.remove_member(workspace_id, *user_id)?;
            render_success(
                ctx.output,
                &format!("removed user {user_id} from workspace {workspace_id}"),
            )
        }
    }
}
