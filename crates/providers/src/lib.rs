//! Chat transport implementations for mcpchat.
//!
//! All providers implement the `mcpchat_core::Provider` trait.

pub mod gemini;

pub use gemini::GeminiProvider;

use mcpchat_core::{Provider, ProviderError};
use std::sync::Arc;

/// Build the chat transport described by the configuration.
pub fn build_from_config(
    config: &mcpchat_config::AppConfig,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config
        .api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            ProviderError::NotConfigured(
                "no API key found; set GEMINI_API_KEY or GOOGLE_API_KEY".into(),
            )
        })?;

    Ok(Arc::new(GeminiProvider::new(&config.api_url, api_key)))
}
