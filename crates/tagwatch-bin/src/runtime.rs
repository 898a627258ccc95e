// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Monitor runtime orchestration.
//!
//! The runtime builds a [`TagMonitor`] from the loaded configuration,
//! registers the logging listener on every tag and runs until either a
//! shutdown is requested or the monitor stops on its own.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info};

use tagwatch_config::{ConfigLoader, TagwatchConfig};
use tagwatch_opcua::{
    ChangeNotification, LifecycleOutcome, OpcUaTransport, SimulatedTransport, TagListener,
    TagMonitor, TagRegistry,
};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// LoggingListener
// =============================================================================

/// Logs every tag change at info.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

#[async_trait]
impl TagListener for LoggingListener {
    async fn on_change(&self, notification: ChangeNotification) {
        info!(
            tag = %notification.tag,
            value = %notification.value,
            quality = %notification.quality,
            source_timestamp = ?notification.source_timestamp,
            "{} value has changed",
            notification.tag
        );
    }
}

// =============================================================================
// MonitorRuntime
// =============================================================================

/// Runs one tag monitor until shutdown.
pub struct MonitorRuntime {
    config: Arc<TagwatchConfig>,
    shutdown: ShutdownCoordinator,
    simulate: Option<Duration>,
}

impl MonitorRuntime {
    /// Creates a runtime for `config`.
    pub fn new(config: TagwatchConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: ShutdownCoordinator::new(),
            simulate: None,
        }
    }

    /// Uses the in-memory server, publishing a synthetic value every `interval`.
    pub fn with_simulation(mut self, interval: Duration) -> Self {
        self.simulate = Some(interval);
        self
    }

    /// Uses an existing shutdown coordinator.
    pub fn with_shutdown(mut self, shutdown: ShutdownCoordinator) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// The loaded configuration.
    pub fn config(&self) -> &TagwatchConfig {
        &self.config
    }

    /// The shutdown coordinator driving this runtime.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Runs the monitor until shutdown is signaled or it stops on its own.
    ///
    /// # Errors
    ///
    /// [`BinError::Fatal`] when the monitor stopped because of an
    /// unrecoverable error.
    pub async fn run(self) -> BinResult<()> {
        info!(
            version = tagwatch_opcua::VERSION,
            endpoint = %self.config.opcua.endpoint,
            simulate = self.simulate.is_some(),
            "Starting tagwatch"
        );

        let registry = self.config.registry()?;

        let outcome = match self.simulate {
            Some(interval) => {
                let (transport, sim) = SimulatedTransport::new(&self.config.opcua.endpoint);
                let generator = sim.spawn_value_generator(interval);
                let outcome = self.monitor(transport, registry).await;
                generator.abort();
                outcome?
            }
            None => self.run_real(registry).await?,
        };

        match outcome.fatal {
            Some(reason) => {
                error!(code = %reason.code, category = reason.category, "Tag monitor stopped: {}", reason.message);
                Err(BinError::Fatal(reason))
            }
            None => {
                info!("tagwatch shutdown complete");
                Ok(())
            }
        }
    }

    #[cfg(feature = "real-transport")]
    async fn run_real(&self, registry: TagRegistry) -> BinResult<LifecycleOutcome> {
        let transport = tagwatch_opcua::RealOpcUaTransport::new(&self.config.opcua);
        self.monitor(transport, registry).await
    }

    #[cfg(not(feature = "real-transport"))]
    async fn run_real(&self, _registry: TagRegistry) -> BinResult<LifecycleOutcome> {
        Err(BinError::init(
            "built without the real-transport feature; use --simulate or rebuild with --features real-transport",
        ))
    }

    async fn monitor<T: OpcUaTransport + 'static>(
        &self,
        transport: T,
        registry: TagRegistry,
    ) -> BinResult<LifecycleOutcome> {
        let monitor = TagMonitor::new(self.config.opcua.clone(), registry, transport)?;
        monitor.on_every_tag(Arc::new(LoggingListener))?;
        monitor.start()?;

        tokio::select! {
            reason = self.shutdown.wait_for_shutdown() => {
                info!(reason = %reason, "Stopping tag monitor");
            }
            _ = monitor.stopped() => {}
        }

        Ok(monitor.stop().await)
    }
}

impl std::fmt::Debug for MonitorRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorRuntime")
            .field("endpoint", &self.config.opcua.endpoint)
            .field("simulate", &self.simulate)
            .finish()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for constructing the monitor runtime.
#[derive(Debug, Default)]
pub struct RuntimeBuilder {
    config_path: Option<std::path::PathBuf>,
    config: Option<TagwatchConfig>,
    endpoint: Option<String>,
    simulate: Option<Duration>,
    shutdown: Option<ShutdownCoordinator>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration file path. A missing file falls back to defaults.
    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the configuration directly.
    pub fn config(mut self, config: TagwatchConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Overrides the configured endpoint.
    pub fn endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Enables simulation mode.
    pub fn simulate(mut self, interval: Option<Duration>) -> Self {
        self.simulate = interval;
        self
    }

    /// Uses an existing shutdown coordinator.
    pub fn shutdown(mut self, shutdown: ShutdownCoordinator) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> BinResult<MonitorRuntime> {
        let mut config = match (self.config, self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => ConfigLoader::new()
                .load_or_default(&path)
                .map_err(|e| BinError::load(&path, e))?,
            (None, None) => {
                return Err(BinError::Configuration("No configuration provided".into()));
            }
        };

        if let Some(endpoint) = self.endpoint {
            config.opcua.endpoint = endpoint;
            config.validate()?;
        }

        let mut runtime = MonitorRuntime::new(config);
        if let Some(interval) = self.simulate {
            runtime = runtime.with_simulation(interval);
        }
        if let Some(shutdown) = self.shutdown {
            runtime = runtime.with_shutdown(shutdown);
        }
        Ok(runtime)
    }
}

// =============================================================================
// Tests
// =============================================================================
