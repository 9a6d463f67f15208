//! Startup: everything that happens before the first prompt.

use mcpchat_agent::{ChatConfig, ConversationEngine, RetryController, RetryPolicy};
use mcpchat_config::{AppConfig, ConfigError, StartupConfig};
use mcpchat_core::{GatewayError, ProviderError, ToolDefinition, ToolGateway};
use mcpchat_gateway::McpGateway;
use mcpchat_telemetry::{CallId, SessionInfo, SessionLogger};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::display;

/// Reasons the interactive loop never starts.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Model provider unavailable: {0}")]
    Provider(#[from] ProviderError),

    #[error("Failed to connect to MCP servers after {attempts} attempt(s): {source}")]
    Connect {
        attempts: u32,
        #[source]
        source: GatewayError,
    },

    #[error("Failed to list MCP tools: {0}")]
    Tools(GatewayError),
}

#[derive(Debug, Default)]
pub struct StartupOptions {
    pub config_path: Option<PathBuf>,
    pub model: Option<String>,
}

/// Everything the shell needs, constructed once per run.
pub struct Session {
    pub config: AppConfig,
    pub logger: Arc<SessionLogger>,
    pub gateway: Arc<dyn ToolGateway>,
    /// Servers that are connected.
    pub servers: Vec<String>,
    pub tools: Vec<ToolDefinition>,
    /// Optional servers that could not be reached.
    pub dropped: Vec<(String, GatewayError)>,
    pub controller: RetryController,
}

/// Load configuration, open the session log, connect the gateway and build
/// the retry controller.
pub async fn start(options: StartupOptions) -> Result<Session, StartupError> {
    let mut config = AppConfig::load(options.config_path.as_deref())?;
    if let Some(model) = options.model {
        config.model = model;
    }

    // Fail on a missing key before touching the network.
    let provider = mcpchat_providers::build_from_config(&config)?;

    let logger = Arc::new(open_logger(&config));

    display::connecting(&config.server_names());
    let connected = connect_with_retry(&logger, &config.startup, || {
        McpGateway::connect(&config.servers)
    })
    .await;
    let (gateway, dropped) = match connected {
        Ok(connected) => connected,
        Err(e) => {
            logger.end_session();
            return Err(e);
        }
    };
    for (server, error) in &dropped {
        display::server_dropped(server, error);
    }
    let servers = gateway.server_names();
    let gateway: Arc<dyn ToolGateway> = Arc::new(gateway);

    let tools = match load_tools(&logger, gateway.as_ref(), &config.server_names()).await {
        Ok(tools) => tools,
        Err(e) => {
            gateway.close().await;
            logger.end_session();
            return Err(StartupError::Tools(e));
        }
    };

    let controller = build_controller(&config, provider, gateway.clone(), tools.clone(), logger.clone());

    Ok(Session {
        config,
        logger,
        gateway,
        servers,
        tools,
        dropped,
        controller,
    })
}

/// Open the session log described by `[logging]`, relative to the working
/// directory.
pub fn open_logger(config: &AppConfig) -> SessionLogger {
    let cwd = std::env::current_dir().unwrap_or_default();
    let info = SessionInfo {
        agent_name: config.agent_name.clone(),
        model: config.model.clone(),
        servers: config.server_names(),
        optional_servers: config.has_optional_servers(),
        execution_directory: cwd.clone(),
    };

    if config.logging.enabled {
        let path = config.logging.log_file(&cwd);
        SessionLogger::to_file(&path, &info, config.logging.max_payload_chars)
    } else {
        SessionLogger::disabled(&info)
    }
}

/// Wire the engine and retry controller for a connected gateway.
pub fn build_controller(
    config: &AppConfig,
    provider: Arc<dyn mcpchat_core::Provider>,
    gateway: Arc<dyn ToolGateway>,
    tools: Vec<ToolDefinition>,
    logger: Arc<SessionLogger>,
) -> RetryController {
    let chat = ChatConfig::new(config.model.clone())
        .with_system_instruction(config.render_system_instruction(chrono::Local::now()))
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_output_tokens)
        .with_max_tool_rounds(config.max_tool_rounds);
    let engine = ConversationEngine::with_tools(chat, provider, gateway, tools);
    RetryController::new(engine, logger, RetryPolicy::from_config(&config.retry))
}

/// Run `connect` up to `connect_attempts` times, waiting
/// `connect_backoff_secs * attempt` seconds between attempts. Every failure
/// is logged under the `SYSTEM` call id; errors that are not transient end
/// the loop at once.
pub async fn connect_with_retry<T, F, Fut>(
    logger: &SessionLogger,
    startup: &StartupConfig,
    mut connect: F,
) -> Result<T, StartupError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let attempts = startup.connect_attempts.max(1);
    let system = CallId::system();
    let mut attempt = 1;

    loop {
        match connect().await {
            Ok(connected) => {
                info!(attempt, "Connected to MCP servers");
                return Ok(connected);
            }
            Err(e) => {
                logger.log_error(
                    &system,
                    &e.to_string(),
                    Some(&format!("Connection attempt {attempt}/{attempts}")),
                );

                if attempt >= attempts || !e.is_transient() {
                    return Err(StartupError::Connect {
                        attempts: attempt,
                        source: e,
                    });
                }

                let delay = Duration::from_secs(startup.connect_backoff_secs * u64::from(attempt));
                warn!(attempt, attempts, error = %e, ?delay, "MCP connection failed, retrying");
                display::connect_retry(attempt, attempts, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// List the gateway's tools, logged as a `SYSTEM` tool call/response pair.
pub async fn load_tools(
    logger: &SessionLogger,
    gateway: &dyn ToolGateway,
    servers: &[String],
) -> Result<Vec<ToolDefinition>, GatewayError> {
    let server = servers.join(", ");
    let tool_call_id = logger.log_tool_call(
        &CallId::system(),
        "list_tools",
        &serde_json::Value::Null,
        Some(server.as_str()).filter(|s| !s.is_empty()),
    );

    match gateway.list_tools().await {
        Ok(tools) => {
            let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
            logger.log_tool_response(
                &tool_call_id,
                true,
                &format!("Found {} tools: {}", tools.len(), names.join(", ")),
            );
            debug!(count = tools.len(), "Tools loaded");
            Ok(tools)
        }
        Err(e) => {
            logger.log_tool_response(&tool_call_id, false, &e.to_string());
            Err(e)
        }
    }
}
