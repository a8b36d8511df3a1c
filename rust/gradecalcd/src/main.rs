mod band;
mod calc;
mod db;
mod error;
mod exports;
mod ipc;
mod model;
mod reconcile;
mod sheet;
mod store;

use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Grade bookkeeping sidecar: newline-delimited JSON requests on stdin, responses on stdout.
#[derive(Parser, Debug)]
#[command(name = "gradecalcd", version)]
struct Cli {
    /// Open this workspace directory at startup
    #[arg(long)]
    workspace: Option<PathBuf>,
    /// Log filter used when RUST_LOG is not set (logs go to stderr)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.log_level) {
        eprintln!("gradecalcd: logging disabled: {e:#}");
    }

    let mut state = ipc::AppState::new();
    if let Some(path) = cli.workspace.as_deref() {
        if let Err(e) = ipc::open_workspace(&mut state, path) {
            tracing::error!(
                workspace = %path.display(),
                error = %format!("{e:#}"),
                "failed to open workspace"
            );
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer with.
                tracing::warn!(error = %e, "unparseable request line");
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}
