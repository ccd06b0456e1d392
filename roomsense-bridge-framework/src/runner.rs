//! Bridge runner for lifecycle management.

use std::fmt::Display;
use std::future::Future;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use roomsense_common::{LoggingConfig, init_tracing};

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

/// Bridge runner that manages the lifecycle of a protocol bridge.
///
/// Handles:
/// - Logging initialization
/// - Graceful shutdown on Ctrl+C through a [`CancellationToken`]
/// - Running the bridge worker to completion
///
/// Connecting to the bus is left to the worker, since bridges must acquire
/// their device before announcing themselves.
///
/// # Example
///
/// ```ignore
/// use roomsense_bridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let args = BridgeArgs::parse_with_default("mybridge.json5");
///     let config = MyBridgeConfig::load(&args.config)?;
///
///     let runner = BridgeRunner::new_with_args("mybridge", config, Some(&args))?;
///
///     runner
///         .run(|config, shutdown| async move {
///             // Worker logic here, returning once `shutdown` is cancelled
///             Ok::<(), MyError>(())
///         })
///         .await?;
///     Ok(())
/// }
/// ```
pub struct BridgeRunner<C: BridgeConfig> {
    /// Bridge name for logging.
    name: String,
    /// Bridge version.
    version: String,
    /// The loaded configuration.
    config: C,
    /// Cancelled when the bridge should stop.
    shutdown: CancellationToken,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Create a new bridge runner and initialize logging from the config.
    pub fn new(name: impl Into<String>, config: C) -> Result<Self> {
        Self::new_with_args(name, config, None)
    }

    /// Create a new bridge runner with CLI args for log level override.
    pub fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        // Initialize logging with optional CLI override
        let log_config = match args.and_then(|args| args.log_level.as_ref()) {
            Some(level) => LoggingConfig {
                level: level.clone(),
                format: config.logging().format,
            },
            None => config.logging().clone(),
        };

        init_tracing(&log_config).map_err(|e| BridgeError::config(e.to_string()))?;

        let runner = Self::without_tracing(name, config);
        tracing::info!(bridge = %runner.name, version = %runner.version, "Starting bridge");

        Ok(runner)
    }

    /// Create a runner without touching the global tracing subscriber.
    pub fn without_tracing(name: impl Into<String>, config: C) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Get the bridge name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the bridge version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Token cancelled on Ctrl+C. Cancelling it manually also stops the bridge.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run `worker` until it returns.
    ///
    /// The worker receives the configuration and the shutdown token, and is
    /// expected to return once the token is cancelled. Ctrl+C cancels it.
    pub async fn run<F, Fut, E>(self, worker: F) -> Result<()>
    where
        F: FnOnce(C, CancellationToken) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: Display,
    {
        let listener = tokio::spawn(listen_for_shutdown(self.shutdown.clone()));

        tracing::info!(bridge = %self.name, "Bridge running. Press Ctrl+C to stop.");

        let result = worker(self.config, self.shutdown.clone()).await;

        self.shutdown.cancel();
        let _ = listener.await;

        match result {
            Ok(()) => {
                tracing::info!(bridge = %self.name, "Goodbye!");
                Ok(())
            }
            Err(e) => {
                tracing::error!(bridge = %self.name, error = %e, "Bridge failed");
                Err(BridgeError::worker(e.to_string()))
            }
        }
    }
}

/// Cancel `shutdown` on Ctrl+C; return early if it is cancelled elsewhere.
async fn listen_for_shutdown(shutdown: CancellationToken) {
    tokio::select! {
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => tracing::info!("Received shutdown signal"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C"),
            }
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
}
