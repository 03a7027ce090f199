//! `td watch`: feed a push message stream (one JSON message per line) into
//! the session and print the board after every applied event.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use serde::Serialize;
use taskdeck_core::board::Board;
use taskdeck_core::model::WorkspaceId;
use taskdeck_core::push::{ChannelState, Delivery, PushEvent};
use taskdeck_core::scope::ScopedResource;
use taskdeck_core::{CacheKey, Session, SyncError};
use tracing::{info, warn};

use crate::cmd::Context;
use crate::cmd::task::write_board;
use crate::http::HttpRemote;
use crate::output::{OutputMode, pretty_kv, render};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Workspace to watch (defaults to the active workspace).
    #[arg(long, short = 'w')]
    pub workspace: Option<WorkspaceId>,

    /// Read messages from this file instead of stdin.
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Print the push channel URL for the workspace and exit.
    #[arg(long, conflicts_with = "input")]
    pub print_url: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WatchSummary {
    pub applied: usize,
    pub dropped: usize,
    pub malformed: usize,
}

#[derive(Debug, Serialize)]
struct EventFrame<'a> {
    event: &'a PushEvent,
    board: &'a Board,
}

pub fn run_watch(args: &WatchArgs, ctx: &Context) -> Result<()> {
    let mut session = ctx.session()?;
    let workspace_id = match args.workspace.or_else(|| session.active_workspace()) {
        Some(id) => id,
        None => {
            session.load_workspaces()?;
            match session.active_workspace() {
                Some(id) => id,
                None => bail!("no workspace to watch"),
            }
        }
    };
    if args.print_url {
        let url = ctx.config.client.push_channel_url(workspace_id, &ctx.token()?);
        writeln!(io::stdout(), "{url}")?;
        return Ok(());
    }
    session.switch_workspace(workspace_id)?;
    info!(workspace_id, channel = %ctx.config.client.push_base(), "push channel");

    let input: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let summary = watch_stream(&mut session, input, &mut out, ctx.output)?;
    drop(out);

    render(ctx.output, &summary, |s, w| {
        pretty_kv(w, "Applied", s.applied.to_string())?;
        pretty_kv(w, "Dropped", s.dropped.to_string())?;
        pretty_kv(w, "Malformed", s.malformed.to_string())
    })
}

/// Drive `session` with every line of `input`, writing a frame per applied
/// event. The initial load may fail; events are still reconciled and the
/// board shows what the cache holds.
pub fn watch_stream(
    session: &mut Session<HttpRemote>,
    input: impl BufRead,
    out: &mut dyn Write,
    mode: OutputMode,
) -> Result<WatchSummary> {
    let ChannelState::Open { workspace_id, epoch } = session.channel() else {
        bail!("push channel is not open");
    };
    let board_key = CacheKey::WorkspaceTasks(workspace_id);
    let subscription = session.watch_scoped(ScopedResource::Tasks, Box::new(|_| {}));
    session.settle();
    check_live(session)?;
    if let Some(err) = session.read(board_key).and_then(|e| e.error.clone()) {
        warn!(workspace_id, error = %err, "initial load failed, showing pushed changes only");
    }
    info!(workspace_id, epoch = epoch.get(), "watching");

    let mut summary = WatchSummary::default();
    for line in input.lines() {
        let line = line.context("failed to read push stream")?;
        if line.trim().is_empty() {
            continue;
        }
        match session.handle_push(epoch, &line) {
            Delivery::Applied(event) => {
                summary.applied += 1;
                session.settle();
                check_live(session)?;
                let tasks = session.read(board_key).map(|e| e.tasks().to_vec()).unwrap_or_default();
                write_frame(out, &event, &Board::project(&tasks), mode)?;
            }
            Delivery::Malformed(_) => summary.malformed += 1,
            Delivery::StaleChannel | Delivery::ForeignWorkspace(_) => summary.dropped += 1,
        }
    }

    session.push_interrupted("input closed");
    if let Some(subscription) = subscription {
        session.unwatch(subscription.id);
    }
    Ok(summary)
}

fn check_live(session: &Session<HttpRemote>) -> Result<()> {
    if session.is_expired() {
        return Err(SyncError::Auth("credential rejected while watching".into()).into());
    }
    Ok(())
}

fn write_frame(out: &mut dyn Write, event: &PushEvent, board: &Board, mode: OutputMode) -> Result<()> {
    match mode {
        OutputMode::Json => {
            serde_json::to_writer(&mut *out, &EventFrame { event, board })?;
            writeln!(out)?;
        }
        OutputMode::Text => {
            writeln!(out, "event  {event}")?;
            write_board(out, board, mode)?;
        }
        OutputMode::Pretty => {
            writeln!(out, "» {event}")?;
            write_board(out, board, mode)?;
        }
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use taskdeck_core::config::ClientConfig;
    use taskdeck_core::scope::MemoryScopeStore;

    /// A session whose server is unreachable: every fetch fails.
    fn offline_session() -> Session<HttpRemote> {
        let config = ClientConfig {
            api_url: "http://127.0.0.1:9".into(),
            request_timeout_secs: 2,
            ..ClientConfig::default()
        };
        assert_eq!(config.request_timeout(), Duration::from_secs(2));
        let remote = HttpRemote::new(&config, Some("token".into()));
        Session::new(remote, Box::new(MemoryScopeStore::with_active(7))).unwrap()
    }

    const CREATED: &str = r#"{"type":"TASK_CREATED","task":{"id":5,"title":"Write docs","status":"TODO","priority":"P2","workspace_id":7,"created_at":"2025-03-01T09:30:00","updated_at":"2025-03-01T09:30:00"}}"#;

    #[test]
    fn lines_are_classified() {
        let mut session = offline_session();
        let foreign = CREATED.replace(r#""workspace_id":7"#, r#""workspace_id":8"#);
        let input = format!("{CREATED}\n\nnot json\n{foreign}\n");
        let mut out = Vec::new();
        let summary =
            watch_stream(&mut session, input.as_bytes(), &mut out, OutputMode::Json).unwrap();

        assert_eq!(
            summary,
            WatchSummary {
                applied: 1,
                dropped: 1,
                malformed: 1,
            }
        );
        let frames: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"]["type"], "TASK_CREATED");
        let todo = &frames[0]["board"]["columns"][0];
        assert_eq!(todo["status"], "TODO");
        assert_eq!(todo["tasks"][0]["id"], 5, "pushed task shows on the board");
        assert!(session.read(CacheKey::WorkspaceTasks(7)).unwrap().task(5).is_some());
    }

    #[test]
    fn channel_is_interrupted_at_end_of_input() {
        let mut session = offline_session();
        let mut out = Vec::new();
        watch_stream(&mut session, "".as_bytes(), &mut out, OutputMode::Text).unwrap();
        assert_eq!(session.channel(), ChannelState::Closed);
        assert!(out.is_empty());
    }
}
