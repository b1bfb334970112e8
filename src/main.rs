//! Dullahan server CLI - a terminal multiplexer replicated to browsers.
//!
//! With no subcommand this binary runs the server: it owns the PTYs and
//! emulator state and replicates pane contents to WebSocket clients.
//! The subcommands are thin admin RPC clients talking to the running
//! server over its Unix control socket.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;

use dullahan::config::ServerConfig;
use dullahan::protocol::{DEFAULT_PORT, DEFAULT_SCROLLBACK};
use dullahan::socket::AdminRequest;
use dullahan::StartupError;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system
/// allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(
    name = "dullahan",
    version,
    about = "Terminal multiplexer server replicating PTY state to browser clients"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// WebSocket listen port (bound to loopback).
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Shell spawned in new panes (defaults to $SHELL).
    #[arg(long)]
    shell: Option<String>,

    /// Scrollback rows retained per pane.
    #[arg(long, default_value_t = DEFAULT_SCROLLBACK)]
    scrollback: usize,

    /// Dirty-row budget before deltas give way to a snapshot (0 = 2x rows).
    #[arg(long, default_value_t = 0)]
    delta_budget: usize,

    /// Layout template for the initial window.
    #[arg(long, default_value = "single")]
    template: String,

    /// TLS certificate (PEM) handed to a fronting proxy; validated at startup.
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// TLS private key (PEM) handed to a fronting proxy.
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,

    /// Redirect logs to a file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Write raw PTY output per pane into the runtime directory.
    #[arg(long)]
    pty_trace: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether a server is running.
    Ping,
    /// Show server status.
    Status,
    /// List panes with geometry and generation.
    Panes,
    /// Type text into a pane as if entered at the keyboard.
    SendText {
        /// Target pane id.
        pane: u16,
        /// Text to deliver verbatim.
        text: String,
    },
    /// Print the window/layout tree.
    Layout,
    /// Ask the server to shut down gracefully.
    Quit,
}

fn main() {
    let cli = Cli::parse();
    init_logger(cli.log_file.as_deref());

    let code = match dispatch(cli) {
        Ok(()) => 0,
        Err(e) => {
            log::error!("{e:#}");
            eprintln!("error: {e:#}");
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

/// Map startup failure classes to the documented exit codes.
fn exit_code_for(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<StartupError>() {
        Some(StartupError::Bind | StartupError::Cert) => 2,
        Some(StartupError::Spawn) => 3,
        None => 1,
    }
}

fn init_logger(log_file: Option<&std::path::Path>) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    );
    if let Some(path) = log_file {
        match std::fs::OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("warning: could not open log file {}: {e}", path.display()),
        }
    }
    builder.init();
}

fn dispatch(cli: Cli) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        None => {
            let config = ServerConfig {
                port: cli.port,
                shell: cli
                    .shell
                    .or_else(|| std::env::var("SHELL").ok())
                    .unwrap_or_else(|| "/bin/sh".to_string()),
                scrollback: cli.scrollback,
                delta_budget: cli.delta_budget,
                template: cli.template,
                cert: cli.cert,
                key: cli.key,
                pty_trace: cli.pty_trace,
            };
            runtime.block_on(dullahan::hub::run::run(config))
        }
        Some(command) => {
            let request = match command {
                Command::Ping => AdminRequest::Ping,
                Command::Status => AdminRequest::Status,
                Command::Panes => AdminRequest::Panes,
                Command::SendText { pane, text } => AdminRequest::SendText { pane, text },
                Command::Layout => AdminRequest::Layout,
                Command::Quit => AdminRequest::Quit,
            };
            let reply = runtime.block_on(dullahan::socket::client::request(&request))?;
            println!("{}", serde_json::to_string_pretty(&reply)?);
            if reply.get("ok") != Some(&serde_json::Value::Bool(true)) {
                bail!("server reported failure");
            }
            Ok(())
        }
    }
}
