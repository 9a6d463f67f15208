//! mcpchat CLI: the main entry point.
//!
//! Starts one interactive chat session. Type `exit`, `quit`, `bye` or
//! `goodbye` (or press Ctrl+C) to end it.

use clap::Parser;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;

use mcpchat::bootstrap::{self, StartupOptions};
use mcpchat::display;
use mcpchat::shell::InteractionShell;

#[derive(Parser)]
#[command(
    name = "mcpchat",
    about = "Chat with a Gemini model that can call MCP tools",
    version,
    author
)]
struct Cli {
    /// Override the configured model
    #[arg(short, long)]
    model: Option<String>,

    /// Path to the config file (default: ~/.mcpchat/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "error" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let options = StartupOptions {
        config_path: cli.config,
        model: cli.model,
    };

    let session = match bootstrap::start(options).await {
        Ok(session) => session,
        Err(e) => {
            display::startup_failure(&e);
            return Ok(());
        }
    };

    display::session_banner(&session);

    let mut shell = InteractionShell::new(
        session.controller,
        session.gateway,
        session.config.indicator.clone(),
    );
    // No spinner frames in piped output.
    if !std::io::stdout().is_terminal() {
        shell = shell.without_indicator();
    }
    let interrupt = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    shell.run(stdin_lines(), interrupt).await;

    Ok(())
}

/// Read stdin on a dedicated thread so a pending read never blocks
/// runtime shutdown.
fn stdin_lines() -> tokio_stream::wrappers::UnboundedReceiverStream<std::io::Result<String>> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let failed = line.is_err();
            if tx.send(line).is_err() || failed {
                break;
            }
        }
    });
    tokio_stream::wrappers::UnboundedReceiverStream::new(rx)
}
