//! `td inbox`: tasks assigned to you across every workspace.

use std::io::{self, Write};

use anyhow::Result;
use serde::Serialize;
use taskdeck_core::model::TaskWithWorkspace;

use crate::cmd::Context;
use crate::output::{Renderable, render_list};

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct InboxRow(TaskWithWorkspace);

impl Renderable for InboxRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let task = &self.0.task;
        writeln!(
            w,
            "#{:<6} {:<12} {:<20} {}",
            task.id,
            format!("[{}]", task.status),
            self.0.workspace_name,
            task.title
        )
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        let task = &self.0.task;
        writeln!(
            w,
            "{}  {}  {}  {}  {}",
            task.id, task.status, task.workspace_id, self.0.workspace_name, task.title
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "STATUS", "WORKSPACE_ID", "WORKSPACE", "TITLE"]
    }
}

pub fn run_inbox(ctx: &Context) -> Result<()> {
    let mut session = ctx.session()?;
    let rows: Vec<InboxRow> = session.inbox()?.into_iter().map(InboxRow).collect();
    render_list(&rows, ctx.output)
}
