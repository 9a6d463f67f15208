//! mcpchat terminal front end.
//!
//! - [`bootstrap`] loads configuration, opens the session log, connects the
//!   MCP gateway (with retries) and builds the retry controller.
//! - [`shell`] is the interactive loop.
//! - [`indicator`] is the progress spinner shown while a turn is in flight.
//! - [`display`] holds every user-facing string.

pub mod bootstrap;
pub mod display;
pub mod indicator;
pub mod shell;

pub use bootstrap::{Session, StartupError};
pub use indicator::ProgressIndicator;
pub use shell::{InteractionShell, ShellExit, is_exit_command};
