//! Rotating progress indicator shown while a turn is in flight.

use colored::Colorize;
use mcpchat_config::IndicatorConfig;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const HIDE_CURSOR: &str = "\x1b[?25l";

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// A spinner running as its own task.
///
/// Stops when [`stop`](Self::stop) is called, when dropped, or by itself
/// after `max_ticks` frames. Stopping clears the line.
pub struct ProgressIndicator {
    task: Option<JoinHandle<()>>,
    out: SharedWriter,
    width: usize,
}

impl ProgressIndicator {
    /// Start spinning on stdout.
    pub fn start(config: &IndicatorConfig) -> Self {
        Self::start_with(config, Box::new(std::io::stdout()))
    }

    pub fn start_with(config: &IndicatorConfig, out: Box<dyn Write + Send>) -> Self {
        let out: SharedWriter = Arc::new(Mutex::new(out));
        let width = config.label.chars().count() + 6;
        let task = tokio::spawn(spin(config.clone(), out.clone(), width));
        Self {
            task: Some(task),
            out,
            width,
        }
    }

    #[cfg(test)]
    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel the spinner task and clear its line. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            clear_line(&self.out, self.width);
        }
    }
}

impl Drop for ProgressIndicator {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn spin(config: IndicatorConfig, out: SharedWriter, width: usize) {
    let tick = Duration::from_millis(config.tick_ms);
    for n in 0..config.max_ticks {
        let frame = FRAMES[n as usize % FRAMES.len()];
        write(
            &out,
            &format!("\r{HIDE_CURSOR}{} {}   ", frame.yellow(), config.label.cyan()),
        );
        tokio::time::sleep(tick).await;
    }
    clear_line(&out, width);
    tracing::debug!(max_ticks = config.max_ticks, "Progress indicator hit its tick ceiling");
}

fn write(out: &SharedWriter, text: &str) {
    let mut out = out.lock().unwrap_or_else(|e| e.into_inner());
    let _ = out.write_all(text.as_bytes());
    let _ = out.flush();
}

fn clear_line(out: &SharedWriter, width: usize) {
    write(out, &format!("\r{}\r{}", " ".repeat(width), crate::display::SHOW_CURSOR));
}
