//! Terminal output.
//!
//! Line builders return plain strings so they can be tested; the printing
//! wrappers add color.

use colored::Colorize;
use mcpchat_agent::{RetryReason, Turn};
use mcpchat_core::{GatewayError, ToolDefinition};
use mcpchat_telemetry::LogSummary;
use std::collections::BTreeSet;
use std::io::Write;
use std::time::Duration;

use crate::bootstrap::{Session, StartupError};

pub const APOLOGY: &str = "I apologize for the inconvenience. Please try your request again.";
pub const GENERATING: &str = "📝 Generating response...";
pub const SHOW_CURSOR: &str = "\x1b[?25h";

const ERROR_PREVIEW_CHARS: usize = 100;

// ── Line builders ─────────────────────────────────────────────────────────

/// Distinct tool categories, sorted.
pub fn tool_categories(tools: &[ToolDefinition]) -> Vec<String> {
    tools
        .iter()
        .map(ToolDefinition::category)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn tools_loaded_line(tools: &[ToolDefinition]) -> String {
    let categories = tool_categories(tools);
    if categories.is_empty() {
        format!("Loaded {} tools", tools.len())
    } else {
        format!("Loaded {} tools ({})", tools.len(), categories.join(", "))
    }
}

pub fn tool_call_line(ordinal: usize, name: &str) -> String {
    format!("🔧 Calling tool #{ordinal}: {name}...")
}

pub fn tools_used_line(tools: &[String]) -> Option<String> {
    (!tools.is_empty()).then(|| format!("✅ Tools used ({}): {}", tools.len(), tools.join(", ")))
}

pub fn total_tools_line(tools: &[String]) -> Option<String> {
    (!tools.is_empty()).then(|| format!("📊 Total tools called: {} - {}", tools.len(), tools.join(", ")))
}

pub fn retry_line(reason: &RetryReason, attempt: u32, max: u32) -> String {
    match reason {
        RetryReason::Empty => format!("⚠️  Empty response received. Retrying... ({attempt}/{max})"),
        RetryReason::Error(_) => format!("⚠️  Error occurred. Retrying... ({attempt}/{max})"),
    }
}

/// The first 100 characters of an error, for the retry notice.
pub fn error_preview(error: &str) -> String {
    let preview: String = error.chars().take(ERROR_PREVIEW_CHARS).collect();
    format!("Error: {preview}...")
}

pub fn server_dropped_line(server: &str, error: &GatewayError) -> String {
    format!("Optional server '{server}' unavailable ({error}); some functionality may be limited")
}

// ── Printing ──────────────────────────────────────────────────────────────

pub fn connecting(servers: &[String]) {
    println!(
        "{}",
        format!("⏳ Connecting to MCP servers: {}", servers.join(", ")).cyan()
    );
}

pub fn connect_retry(attempt: u32, attempts: u32, delay: Duration) {
    println!(
        "{}",
        format!("⚠️  MCP connection failed (attempt {attempt}/{attempts})").yellow()
    );
    println!("{}", format!("⏳ Retrying in {} seconds...", delay.as_secs()).cyan());
}

pub fn server_dropped(server: &str, error: &GatewayError) {
    println!("{}", format!("⚠️  {}", server_dropped_line(server, error)).yellow());
}

/// Report a startup failure with a hint on what to check.
pub fn startup_failure(error: &StartupError) {
    eprintln!("{}", format!("❌ {error}").red());
    let hint = match error {
        StartupError::Config(_) => "Check your config file (default: ~/.mcpchat/config.toml)",
        StartupError::Provider(_) => "Set GEMINI_API_KEY (or GOOGLE_API_KEY) in your environment or .env file",
        StartupError::Connect { .. } | StartupError::Tools(_) => {
            "Check the MCP server URLs and credentials in your config ([[servers]] or MCPCHAT_MCP_URL)"
        }
    };
    eprintln!("{}", format!("ℹ️  {hint}").bright_black());
}

pub fn session_banner(session: &Session) {
    println!();
    println!("{}", session.config.agent_name.bold().cyan());
    println!("{}", "─".repeat(40).bright_black());
    println!("  Model:    {}", session.config.model);
    println!("  Session:  {}", session.logger.session_id());
    println!("  Servers:  {}", session.servers.join(", "));
    println!("{}", format!("✅ {}", tools_loaded_line(&session.tools)).green());
    if let Some(path) = session.logger.summary().log_location {
        println!("{}", format!("📁 Logging to: {}", path.display()).bright_black());
    }
    println!(
        "{}",
        "Type your message and press Enter. Type 'exit' or press Ctrl+C to quit.".bright_black()
    );
    println!();
}

pub fn prompt() {
    print!("{} ", "You:".bold().green());
    let _ = std::io::stdout().flush();
}

pub fn tool_call(ordinal: usize, name: &str) {
    println!("{}", tool_call_line(ordinal, name).bright_black());
}

pub fn response_started(tools: &[String]) {
    if let Some(line) = tools_used_line(tools) {
        println!("{}", line.bright_black());
    }
    println!("{}", GENERATING.yellow());
}

pub fn retrying(reason: &RetryReason, attempt: u32, max: u32) {
    println!("{}", retry_line(reason, attempt, max).yellow());
    if let RetryReason::Error(e) = reason {
        println!("{}", error_preview(e).bright_black());
    }
}

pub fn assistant_reply(turn: &Turn) {
    println!();
    println!("{}", "Assistant:".bold().blue());
    println!("{}", turn.accumulated_text.trim());
    println!();
    if let Some(line) = total_tools_line(&turn.tool_calls_made) {
        println!("{}\n", line.bright_black());
    }
}

/// Render a turn that exhausted its retries.
pub fn turn_failed(turn: &Turn) {
    match &turn.last_error {
        Some(error) => {
            println!("\n{}", APOLOGY.yellow());
            println!(
                "{}\n",
                "If the issue persists, try rephrasing your request or restart the agent.".bright_black()
            );
            eprintln!("{}", format!("Final error: {error}").bright_black());
        }
        None => {
            println!();
            println!("{}", "Assistant:".bold().blue());
            println!("No response received after multiple attempts. Please try again.\n");
        }
    }
    if !turn.tool_calls_made.is_empty() {
        println!(
            "{}\n",
            format!("Tools called: {}", turn.tool_calls_made.join(", ")).bright_black()
        );
    }
}

pub fn goodbye(summary: &LogSummary) {
    println!(
        "\n{}",
        format!("Session ended at {}", chrono::Local::now().format("%H:%M:%S")).cyan()
    );
    if let Some(path) = &summary.log_location {
        println!("{}", format!("📁 Log saved: {}", path.display()).bright_black());
    }
    println!(
        "{}",
        format!("📊 Total calls made: {}", summary.total_calls).bright_black()
    );
    println!("{}\n", "─".repeat(30).bright_black());
    print!("{SHOW_CURSOR}");
    let _ = std::io::stdout().flush();
}
