//! # Logging
//!
//! Structured logging through `tracing`. Verbosity comes from `RUST_LOG`
//! and defaults to `info`; `RUST_LOG=quicd_quic=trace` shows every packet
//! and frame the engine sends or receives.
//!
//! Lines carry the time since process start, the target, and the source
//! location. Colour is used only when stdout is a terminal.

use anyhow::Result;
use std::io::IsTerminal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber. Call once, before anything logs.
pub fn init_logging() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = fmt::layer()
        .with_timer(fmt::time::uptime())
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(std::io::stdout().is_terminal());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing subscriber: {}", e))?;

    Ok(())
}
