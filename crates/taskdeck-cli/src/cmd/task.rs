//! `td task list|board|create|edit|move|delete`.

use std::io::{self, Write};

use anyhow::{Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use taskdeck_core::board::{Board, TaskFilter};
use taskdeck_core::dragdrop::{DropOutcome, DropTarget};
use taskdeck_core::model::{
    Task, TaskDraft, TaskId, TaskPatch, TaskPriority, TaskStatus, UserId, WorkspaceId, timestamp,
};
use taskdeck_core::{CacheKey, Session, SyncError};

use crate::cmd::{Context, resolve_workspace};
use crate::http::HttpRemote;
use crate::output::{
    OutputMode, Renderable, pretty_section, render_item, render_list, render_mode, render_success,
};

#[derive(Args, Debug)]
pub struct TaskArgs {
    #[command(subcommand)]
    pub command: TaskCommand,
}

#[derive(Subcommand, Debug)]
pub enum TaskCommand {
    /// List tasks of a workspace.
    List(ListArgs),
    /// Show a workspace as a kanban board.
    Board(WorkspaceFlag),
    /// Create a task.
    Create(CreateArgs),
    /// Change fields of a task.
    Edit(EditArgs),
    /// Move a card to another board column.
    Move(MoveArgs),
    /// Delete a task.
    Delete {
        /// Task id.
        id: TaskId,
    },
}

#[derive(Args, Debug)]
pub struct WorkspaceFlag {
    /// Workspace id (defaults to the active workspace).
    #[arg(long, short = 'w')]
    pub workspace: Option<WorkspaceId>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub scope: WorkspaceFlag,

    /// Only tasks with this status (todo, in_progress, done, backlog).
    #[arg(long)]
    pub status: Option<TaskStatus>,

    /// Only tasks assigned to this user id.
    #[arg(long)]
    pub assignee: Option<UserId>,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub scope: WorkspaceFlag,

    /// Task title.
    pub title: String,

    #[arg(long, short = 'd')]
    pub description: Option<String>,

    #[arg(long)]
    pub status: Option<TaskStatus>,

    /// P0 (highest) to P3.
    #[arg(long, short = 'p')]
    pub priority: Option<TaskPriority>,

    /// Due date: `YYYY-MM-DD` or an RFC 3339 timestamp.
    #[arg(long, value_parser = parse_due)]
    pub due: Option<DateTime<Utc>>,

    /// Assignee user id.
    #[arg(long)]
    pub assignee: Option<UserId>,
}

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Task id.
    pub id: TaskId,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long, short = 'd')]
    pub description: Option<String>,

    #[arg(long)]
    pub status: Option<TaskStatus>,

    #[arg(long, short = 'p')]
    pub priority: Option<TaskPriority>,

    #[arg(long, value_parser = parse_due)]
    pub due: Option<DateTime<Utc>>,

    #[arg(long)]
    pub assignee: Option<UserId>,
}

#[derive(Args, Debug)]
pub struct MoveArgs {
    #[command(flatten)]
    pub scope: WorkspaceFlag,

    /// Task id.
    pub id: TaskId,

    /// Target column: todo, in_progress or done.
    pub target: String,
}

fn parse_due(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(date) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .ok_or_else(|| format!("invalid date '{raw}'"));
    }
    timestamp::parse(raw.trim()).map_err(|err| format!("invalid due date '{raw}': {err}"))
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct TaskRow(pub Task);

impl TaskRow {
    fn suffix(&self) -> String {
        let mut parts = Vec::new();
        if let Some(assignee) = self.0.assignee_id {
            parts.push(format!("@{assignee}"));
        }
        if let Some(due) = self.0.due_date {
            parts.push(format!("due {}", due.format("%Y-%m-%d")));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!("  ({})", parts.join(", "))
        }
    }
}

impl Renderable for TaskRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let task = &self.0;
        writeln!(
            w,
            "#{:<6} {:<12} {}  {}{}",
            task.id,
            format!("[{}]", task.status),
            task.priority,
            task.title,
            self.suffix()
        )?;
        if let Some(description) = task.description.as_deref().filter(|d| !d.is_empty()) {
            writeln!(w, "         {description}")?;
        }
        Ok(())
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        let task = &self.0;
        let assignee = task.assignee_id.map_or_else(|| "-".to_string(), |id| id.to_string());
        writeln!(
            w,
            "{}  {}  {}  {}  {}",
            task.id, task.status, task.priority, assignee, task.title
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &["ID", "STATUS", "PRIORITY", "ASSIGNEE", "TITLE"]
    }
}

/// Write `board` in text or pretty form.
pub fn write_board(w: &mut dyn Write, board: &Board, mode: OutputMode) -> io::Result<()> {
    match mode {
        OutputMode::Text => {
            writeln!(w, "STATUS  ID  TITLE")?;
            for column in &board.columns {
                for task in &column.tasks {
                    writeln!(w, "{}  {}  {}", column.status, task.id, task.title)?;
                }
            }
        }
        OutputMode::Pretty | OutputMode::Json => {
            for column in &board.columns {
                pretty_section(w, &format!("{} ({})", column.title, column.tasks.len()))?;
                for task in &column.tasks {
                    writeln!(w, "  #{:<6} {}  {}", task.id, task.priority, task.title)?;
                }
                writeln!(w)?;
            }
            if board.hidden_backlog > 0 {
                writeln!(w, "{} task(s) in backlog not shown", board.hidden_backlog)?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn run_task(args: &TaskArgs, ctx: &Context) -> Result<()> {
    match &args.command {
        TaskCommand::List(list) => run_list(list, ctx),
        TaskCommand::Board(scope) => run_board(scope, ctx),
        TaskCommand::Create(create) => run_create(create, ctx),
        TaskCommand::Edit(edit) => run_edit(edit, ctx),
        TaskCommand::Move(mv) => run_move(mv, ctx),
        TaskCommand::Delete { id } => run_delete(*id, ctx),
    }
}

/// Load one workspace's task list into the session cache.
fn load_tasks(
    session: &mut Session<HttpRemote>,
    scope: &WorkspaceFlag,
) -> Result<(WorkspaceId, Vec<Task>)> {
    let workspace_id = resolve_workspace(session, scope.workspace)?;
    let entry = session.query(CacheKey::WorkspaceTasks(workspace_id))?;
    Ok((workspace_id, entry.tasks().to_vec()))
}

fn run_list(args: &ListArgs, ctx: &Context) -> Result<()> {
    let mut session = ctx.session()?;
    let (_, tasks) = load_tasks(&mut session, &args.scope)?;
    let filter = TaskFilter {
        status: args.status,
        assignee_id: args.assignee,
    };
    let rows: Vec<TaskRow> = filter
        .apply(&tasks)
        .into_iter()
        .cloned()
        .map(TaskRow)
        .collect();
    render_list(&rows, ctx.output)
}

fn run_board(scope: &WorkspaceFlag, ctx: &Context) -> Result<()> {
    let mut session = ctx.session()?;
    let (_, tasks) = load_tasks(&mut session, scope)?;
    let board = Board::project(&tasks);
    render_mode(
        ctx.output,
        &board,
        |b, w| write_board(w, b, OutputMode::Text),
        |b, w| write_board(w, b, OutputMode::Pretty),
    )
}

fn run_create(args: &CreateArgs, ctx: &Context) -> Result<()> {
    let mut session = ctx.session()?;
    let workspace_id = resolve_workspace(&mut session, args.scope.workspace)?;
    let draft = TaskDraft {
        title: args.title.clone(),
        description: args.description.clone(),
        status: args.status,
        priority: args.priority,
        due_date: args.due,
        assignee_id: args.assignee,
    };
    let task = session.create_task(workspace_id, &draft)?;
    render_item(&TaskRow(task), ctx.output)
}

fn run_edit(args: &EditArgs, ctx: &Context) -> Result<()> {
    let patch = TaskPatch {
        title: args.title.clone(),
        description: args.description.clone(),
        status: args.status,
        priority: args.priority,
        due_date: args.due,
        assignee_id: args.assignee,
    };
    if patch.is_empty() {
        bail!("nothing to change: pass at least one of --title, --description, --status, --priority, --due, --assignee");
    }
    let mut session = ctx.session()?;
    let task = session.update_task(args.id, &patch)?;
    render_item(&TaskRow(task), ctx.output)
}

fn run_move(args: &MoveArgs, ctx: &Context) -> Result<()> {
    let target: DropTarget = args.target.parse()?;
    let mut session = ctx.session()?;
    load_tasks(&mut session, &args.scope)?;

    match session.move_task(args.id, target)? {
        DropOutcome::Moved(task) => render_item(&TaskRow(task), ctx.output),
        DropOutcome::NoOp => render_success(
            ctx.output,
            &format!("task {} is already in {target}", args.id),
        ),
        DropOutcome::Rejected(rejected) => Err(SyncError::InvalidDrop(rejected.to_string()).into()),
        DropOutcome::Pending(status) => render_success(
            ctx.output,
            &format!("task {} moving to {status}", args.id),
        ),
    }
}

fn run_delete(id: TaskId, ctx: &Context) -> Result<()> {
    let mut session = ctx.session()?;
    session.delete_task(id)?;
    render_success(ctx.output, &format!("deleted task {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn task(id: TaskId, status: TaskStatus) -> Task {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        Task {
            id,
            title: format!("task {id}"),
            description: None,
            status,
            priority: TaskPriority::P1,
            workspace_id: 1,
            assignee_id: Some(3),
            due_date: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn rendered(f: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn due_accepts_plain_dates() {
        let due = parse_due("2025-03-01").unwrap();
        assert_eq!((due.year(), due.month(), due.day(), due.hour()), (2025, 3, 1, 0));
    }

    #[test]
    fn due_accepts_timestamps() {
        let due = parse_due("2025-03-01T09:30:00Z").unwrap();
        assert_eq!(due.hour(), 9);
        let naive = parse_due("2025-03-01T09:30:00.5").unwrap();
        assert_eq!(naive.minute(), 30);
    }

    #[test]
    fn due_rejects_garbage() {
        assert!(parse_due("next tuesday").is_err());
    }

    #[test]
    fn task_row_text_matches_headers() {
        let row = TaskRow(task(7, TaskStatus::InProgress));
        let line = rendered(|w| row.render_table(w));
        let fields: Vec<&str> = line.trim_end().splitn(5, "  ").collect();
        assert_eq!(fields.len(), TaskRow::table_headers().len());
        assert_eq!(fields[0], "7");
        assert_eq!(fields[3], "3");
        assert_eq!(fields[4], "task 7");
    }

    #[test]
    fn task_row_serializes_as_the_task() {
        let value = serde_json::to_value(TaskRow(task(7, TaskStatus::Todo))).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["title"], "task 7");
    }

    #[test]
    fn board_text_lists_cards_by_column() {
        let board = Board::project(&[
            task(1, TaskStatus::Todo),
            task(2, TaskStatus::Done),
            task(3, TaskStatus::Backlog),
        ]);
        let text = rendered(|w| write_board(w, &board, OutputMode::Text));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].ends_with("1  task 1"));
        assert!(lines[2].ends_with("2  task 2"));
    }

    #[test]
    fn board_pretty_mentions_hidden_backlog() {
        let board = Board::project(&[task(1, TaskStatus::Todo), task(3, TaskStatus::Backlog)]);
        let pretty = rendered(|w| write_board(w, &board, OutputMode::Pretty));
        assert!(pretty.contains("(1)"));
        assert!(pretty.contains("1 task(s) in backlog not shown"));
    }
}
