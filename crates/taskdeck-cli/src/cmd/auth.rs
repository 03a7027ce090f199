//! `td login`, `td register`, `td logout`, `td whoami`.

use std::io::{self, BufRead, Write};

use anyhow::{Context as _, Result, bail};
use clap::Args;
use serde::Serialize;
use taskdeck_core::Session;
use taskdeck_core::model::User;
use taskdeck_core::remote::AuthService;
use tracing::info;

use crate::cmd::Context;
use crate::http::HttpRemote;
use crate::output::{Renderable, pretty_kv, render, render_item, render_success};

#[derive(Args, Debug)]
pub struct CredentialArgs {
    /// Account email.
    #[arg(long)]
    pub email: String,

    /// Password. Read from the first line of stdin when omitted.
    #[arg(long)]
    pub password: Option<String>,
}

impl CredentialArgs {
    fn password(&self) -> Result<String> {
        if let Some(password) = &self.password {
            return Ok(password.clone());
        }
        read_password(&mut io::stdin().lock())
    }
}

fn read_password(input: &mut dyn BufRead) -> Result<String> {
    let mut line = String::new();
    input.read_line(&mut line).context("failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("no password given (pass --password or pipe it on stdin)");
    }
    Ok(password)
}

#[derive(Debug, Serialize)]
struct LoginOutput<'a> {
    email: &'a str,
    token_type: String,
    state_path: String,
}

pub fn run_login(args: &CredentialArgs, ctx: &Context) -> Result<()> {
    let password = args.password()?;
    let token = ctx.anonymous_remote().login(&args.email, &password)?;
    let state = ctx.state();
    state.update(|s| s.token = Some(token.access_token.clone()))?;
    info!(email = %args.email, "signed in");

    let out = LoginOutput {
        email: &args.email,
        token_type: token.token_type,
        state_path: state.path().display().to_string(),
    };
    render(ctx.output, &out, |o, w| writeln!(w, "✓ signed in as {}", o.email))
}

/// User rows for `register` and `whoami`.
#[derive(Debug, Serialize)]
struct UserView(User);

impl Renderable for UserView {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        pretty_kv(w, "User", format!("#{}", self.0.id))?;
        pretty_kv(w, "Email", &self.0.email)?;
        pretty_kv(w, "Active", if self.0.is_active { "yes" } else { "no" })
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "{}  {}  {}", self.0.id, self.0.email, self.0.is_active)
    }
}

pub fn run_register(args: &CredentialArgs, ctx: &Context) -> Result<()> {
    let password = args.password()?;
    let user = ctx.anonymous_remote().register(&args.email, &password)?;
    info!(user_id = user.id, "registered");
    render_item(&UserView(user), ctx.output)
}

pub fn run_whoami(ctx: &Context) -> Result<()> {
    let session = ctx.session()?;
    let user = session.remote().current_user()?;
    render_item(&UserView(user), ctx.output)
}

/// Works offline: nothing here talks to the server.
pub fn run_logout(ctx: &Context) -> Result<()> {
    let state = ctx.state();
    let Some(token) = state.load()?.token else {
        return render_success(ctx.output, "already signed out");
    };
    let remote = HttpRemote::new(&ctx.config.client, Some(token));
    let mut session = Session::new(remote, Box::new(state.clone()))?;
    session.logout()?;
    state.clear()?;
    render_success(ctx.output, "signed out")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_first_stdin_line() {
        let mut input = io::Cursor::new("hunter2\nignored\n");
        assert_eq!(read_password(&mut input).unwrap(), "hunter2");
    }

    #[test]
    fn crlf_is_stripped() {
        let mut input = io::Cursor::new("s3cret\r\n");
        assert_eq!(read_password(&mut input).unwrap(), "s3cret");
    }

    #[test]
    fn empty_stdin_is_rejected() {
        let mut input = io::Cursor::new("");
        assert!(read_password(&mut input).is_err());
    }

    #[test]
    fn flag_password_wins() {
        let args = CredentialArgs {
            email: "a@example.com".into(),
            password: Some("flag".into()),
        };
        assert_eq!(args.password().unwrap(), "flag");
    }
}
