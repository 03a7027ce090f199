#![forbid(unsafe_code)]

mod cmd;
mod http;
mod output;
mod state;

use clap::{CommandFactory, Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::process;
use taskdeck_core::config::resolve_config;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "td: live-synchronized collaborative task manager",
    long_about = None
)]
struct Cli {
    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    /// Task service base URL (overrides config and `TASKDECK_API_URL`).
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Account",
        about = "Sign in and store the access token",
        after_help = "EXAMPLES:\n    # Sign in, password on stdin\n    echo \"$PW\" | td login --email ada@example.com\n\n    # Emit machine-readable output\n    td login --email ada@example.com --password hunter2 --json"
    )]
    Login(cmd::auth::CredentialArgs),

    #[command(
        next_help_heading = "Account",
        about = "Create an account",
        after_help = "EXAMPLES:\n    # Register, then sign in\n    td register --email ada@example.com --password hunter2\n    td login --email ada@example.com --password hunter2"
    )]
    Register(cmd::auth::CredentialArgs),

    #[command(
        next_help_heading = "Account",
        about = "Forget the token and active workspace",
        long_about = "Close the session and delete the local state file. Works offline."
    )]
    Logout,

    #[command(next_help_heading = "Account", about = "Show the signed-in user")]
    Whoami,

    #[command(
        next_help_heading = "Workspaces",
        about = "List, create and select workspaces",
        after_help = "EXAMPLES:\n    # List workspaces (* marks the active one)\n    td workspace list\n\n    # Create a team workspace\n    td workspace create \"Platform team\"\n\n    # Switch the active workspace\n    td workspace use 7"
    )]
    Workspace(cmd::workspace::WorkspaceArgs),

    #[command(
        next_help_heading = "Tasks",
        about = "List, create, edit, move and delete tasks",
        after_help = "EXAMPLES:\n    # Open tasks assigned to user 3\n    td task list --status todo --assignee 3\n\n    # Kanban board of the active workspace\n    td task board\n\n    # Create a task due on a date\n    td task create \"Write release notes\" --priority P1 --due 2025-03-01\n\n    # Drag a card to DONE\n    td task move 42 done"
    )]
    Task(cmd::task::TaskArgs),

    #[command(
        next_help_heading = "Tasks",
        about = "Tasks assigned to you in every workspace"
    )]
    Inbox,

    #[command(
        next_help_heading = "Workspaces",
        about = "List, invite and remove workspace members",
        after_help = "EXAMPLES:\n    # Members of the active workspace\n    td member list\n\n    # Invite by email into workspace 7\n    td member invite grace@example.com --workspace 7"
    )]
    Member(cmd::member::MemberArgs),

    #[command(
        next_help_heading = "Live updates",
        about = "Apply a push message stream and print the board",
        long_about = "Read push channel messages, one JSON object per line, from stdin\n\
                      (or --input) and print the board after every applied event.",
        after_help = "EXAMPLES:\n    # Pipe the live channel of workspace 7\n    websocat \"$(td watch -w 7 --print-url)\" | td watch -w 7\n\n    # Replay a recorded stream as JSON frames\n    td watch --input events.ndjson --json"
    )]
    Watch(cmd::watch::WatchArgs),

    #[command(next_help_heading = "Developer", about = "Deterministic sync simulation")]
    Sim(cmd::sim::SimArgs),

    #[command(
        next_help_heading = "Developer",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    # Bash\n    td completions bash > /etc/bash_completion.d/td"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("TASKDECK_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "taskdeck=debug,info"
        } else {
            "taskdeck=info,warn"
        })
    });

    let format = env::var("TASKDECK_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let config = match resolve_config(cli.api_url.as_deref(), cli.json) {
        Ok(config) => config,
        Err(err) => {
            let mode = cli
                .format
                .unwrap_or(if cli.json { OutputMode::Json } else { OutputMode::Text });
            let mut error = CliError::from_code(taskdeck_core::ErrorCode::ConfigParseError);
            error.message = format!("{err:#}");
            exit_with(mode, &error);
        }
    };
    let output = resolve_output_mode(cli.format, &config.resolved_output);
    debug!(api = %config.client.api_base(), state = %config.state_path.display(), "resolved config");

    let ctx = cmd::Context { config, output };
    let result = match &cli.command {
        Commands::Login(args) => cmd::auth::run_login(args, &ctx),
        Commands::Register(args) => cmd::auth::run_register(args, &ctx),
        Commands::Logout => cmd::auth::run_logout(&ctx),
        Commands::Whoami => cmd::auth::run_whoami(&ctx),
        Commands::Workspace(args) => cmd::workspace::run_workspace(args, &ctx),
        Commands::Task(args) => cmd::task::run_task(args, &ctx),
        Commands::Inbox => cmd::inbox::run_inbox(&ctx),
        Commands::Member(args) => cmd::member::run_member(args, &ctx),
        Commands::Watch(args) => cmd::watch::run_watch(args, &ctx),
        Commands::Sim(args) => cmd::sim::run_sim(args, output),
        Commands::Completions(args) => {
            cmd::completions::run_completions(args.shell, &mut Cli::command())
        }
    };

    if let Err(err) = result {
        exit_with(output, &CliError::from_anyhow(&err));
    }
}

fn exit_with(mode: OutputMode, error: &CliError) -> ! {
    if render_error(mode, error).is_err() {
        eprintln!("error: {}", error.message);
    }
    process::exit(1);
}
