//! Tracing configuration for the command-line front-end
//!
//! The library only emits events; the binary installs the subscriber. All
//! output goes to stderr so stdout carries nothing but the result line, and
//! nothing is printed at all unless verbosity or `RUST_LOG` asks for it.

use std::io::IsTerminal;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Tracing configuration builder
#[derive(Debug, Default)]
pub struct TracingConfig {
    /// Verbosity level (count of `-v` flags)
    pub verbosity: u8,
    /// Filter directive (overrides verbosity if set)
    pub env_filter: Option<String>,
}

impl TracingConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    #[must_use]
    pub fn with_env_filter<S: Into<String>>(mut self, filter: S) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// Convert verbosity level to a filter directive
    #[must_use]
    pub fn verbosity_to_filter(&self) -> &'static str {
        match self.verbosity {
            0 => "off",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Effective filter directive
    #[must_use]
    pub fn filter_directive(&self) -> String {
        self.env_filter
            .clone()
            .unwrap_or_else(|| self.verbosity_to_filter().to_string())
    }

    /// Install the global subscriber
    ///
    /// # Errors
    /// - Invalid filter directive
    /// - A global subscriber is already installed
    pub fn init(self) -> anyhow::Result<()> {
        let filter = EnvFilter::try_new(self.filter_directive())?;

        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(std::io::stderr().is_terminal())
            .with_target(false)
            .with_level(true)
            .compact();

        Registry::default().with(filter).with(fmt_layer).try_init()?;
        Ok(())
    }
}

/// Initialize tracing with CLI defaults, letting `RUST_LOG` override `-v`
///
/// An unparsable `RUST_LOG` is ignored in favor of the verbosity filter.
///
/// # Errors
/// - See [`TracingConfig::init`]
pub fn init_cli_tracing(verbosity: u8) -> anyhow::Result<()> {
    let mut config = TracingConfig::new().with_verbosity(verbosity);
    if let Some(directive) = usable_env_directive(std::env::var(EnvFilter::DEFAULT_ENV).ok()) {
        config = config.with_env_filter(directive);
    }
    config.init()
}

fn usable_env_directive(value: Option<String>) -> Option<String> {
    value.filter(|directive| {
        !directive.trim().is_empty() && EnvFilter::try_new(directive).is_ok()
    })
}
