//! Lernwerk - token-metered billing and content generation for EdTech SaaS
//!
//! Lernwerk provides the billing core of an AI-assisted teaching platform:
//! an append-only token ledger, Stripe-driven subscription state, a spend
//! gate for metered generation operations, and a webhook reconciler.
//!
//! # Features
//!
//! - **Token ledger**: append-only signed transactions, derived balances
//! - **Subscriptions**: plan table and webhook-synced subscription state
//! - **Spend gate**: balance-checked, race-safe debits around generation
//! - **Webhooks**: signature verification and idempotent event processing
//! - **Generation**: pluggable text-generation collaborator with fallbacks
//!   and a content-hash response cache
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use lernwerk::billing::{default_plans, SpendGate, WebhookHandler};
//!
//! #[tokio::main]
//! async fn main() {
//!     // Initialize logging
//!     lernwerk::init_tracing();
//!
//!     let plans = default_plans();
//!     let handler = WebhookHandler::new(store.clone(), webhook_secret, plans);
//!
//!     // Incoming Stripe webhook
//!     let event = handler.verify_signature(&body, &signature_header)?;
//!     handler.handle_event(event).await?;
//!
//!     // Metered generation
//!     let gate = SpendGate::new(store.clone(), generator);
//!     let outcome = gate.spend("user-1", 1, request).await?;
//! }
//! ```

pub mod billing;
mod config;
mod error;
pub mod generation;
mod utils;

// Re-exports for public API
pub use config::{BillingConfig, Config, ConfigBuilder, GenerationConfig, LoggingConfig};
pub use error::{LernwerkError, Result};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// This should be called early in your application, typically in main().
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "lernwerk=debug")
/// - `LERNWERK_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("LERNWERK_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing with a custom configuration
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::new(&config.logging.level);

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
