// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Application-facing tag monitor.
//!
//! [`TagMonitor`] wires the registry, router, connector and orchestrator
//! together. Listeners are registered while idle, [`TagMonitor::start`]
//! spawns the lifecycle task and [`TagMonitor::stop`] drains it.
//!
//! # Examples
//!
//! ```rust,ignore
//! use tagwatch_opcua::{ClientConfig, SimulatedTransport, TagMonitor, TagRegistry};
//!
//! let config = ClientConfig::new("opc.tcp://localhost:4840");
//! let registry = TagRegistry::builtin(config.namespace_index);
//! let (transport, _sim) = SimulatedTransport::new(&config.endpoint);
//!
//! let monitor = TagMonitor::new(config, registry, transport)?;
//! monitor.on_tag_changed_fn("T2m", |n| println!("{} = {}", n.tag, n.value))?;
//! monitor.start()?;
//! // ...
//! let outcome = monitor.stop().await;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::client::connector::TransportConnector;
use crate::client::router::{ChangeNotification, FnListener, NotificationRouter, TagListener};
use crate::client::transport::OpcUaTransport;
use crate::error::{ConfigurationError, ErrorCode, FatalReason, OpcUaError, OpcUaResult};
use crate::lifecycle::{
    HealthReport, LifecycleOrchestrator, LifecycleOutcome, LifecycleState, StateTransition,
};
use crate::registry::TagRegistry;
use crate::types::ClientConfig;

const TRANSITION_CAPACITY: usize = 64;

/// Monitors a set of tags on one OPC UA server.
pub struct TagMonitor<T: OpcUaTransport + 'static> {
    config: Arc<ClientConfig>,
    registry: Arc<TagRegistry>,
    router: Arc<NotificationRouter>,
    transport: Mutex<Option<T>>,

    health_tx: Mutex<Option<watch::Sender<HealthReport>>>,
    health_rx: watch::Receiver<HealthReport>,
    transitions_tx: broadcast::Sender<StateTransition>,
    shutdown_tx: watch::Sender<bool>,

    started: AtomicBool,
    task: Mutex<Option<JoinHandle<LifecycleOutcome>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    outcome: Mutex<Option<LifecycleOutcome>>,
}

impl<T: OpcUaTransport + 'static> TagMonitor<T> {
    /// Creates an idle monitor.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate.
    pub fn new(config: ClientConfig, registry: TagRegistry, transport: T) -> OpcUaResult<Self> {
        config.validate()?;

        let router = NotificationRouter::new(config.dispatch.queue_capacity, config.overflow_policy());
        let (health_tx, health_rx) = watch::channel(HealthReport::default());
        let (transitions_tx, _) = broadcast::channel(TRANSITION_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            router: Arc::new(router),
            transport: Mutex::new(Some(transport)),
            health_tx: Mutex::new(Some(health_tx)),
            health_rx,
            transitions_tx,
            shutdown_tx,
            started: AtomicBool::new(false),
            task: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
            outcome: Mutex::new(None),
        })
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The tag registry.
    pub fn registry(&self) -> &TagRegistry {
        &self.registry
    }

    /// The notification router.
    pub fn router(&self) -> &NotificationRouter {
        &self.router
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    fn ensure_idle(&self, operation: &'static str) -> OpcUaResult<()> {
        let state = self.state();
        if self.started.load(Ordering::Acquire) || state != LifecycleState::Idle {
            return Err(ConfigurationError::InvalidState {
                operation,
                state: state.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Registers `listener` for `tag`.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::UnknownTag`] if the tag is not in the registry,
    /// [`ConfigurationError::InvalidState`] once started.
    pub fn on_tag_changed(&self, tag: &str, listener: Arc<dyn TagListener>) -> OpcUaResult<()> {
        let tag = self
            .registry
            .get(tag)
            .cloned()
            .ok_or_else(|| ConfigurationError::UnknownTag { tag: tag.to_string() })?;
        self.ensure_idle("on_tag_changed")?;

        tracing::debug!(tag = %tag, "Listener registered");
        self.router.register(tag, listener)
    }

    /// Registers a closure for `tag`.
    pub fn on_tag_changed_fn<F>(&self, tag: &str, f: F) -> OpcUaResult<()>
    where
        F: Fn(ChangeNotification) + Send + Sync + 'static,
    {
        self.on_tag_changed(tag, Arc::new(FnListener::new(f)))
    }

    /// Registers `listener` for every tag in the registry.
    pub fn on_every_tag(&self, listener: Arc<dyn TagListener>) -> OpcUaResult<()> {
        self.ensure_idle("on_every_tag")?;
        self.router.register_all(listener)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawns the lifecycle task. Must be called from a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::InvalidState`] unless idle.
    pub fn start(&self) -> OpcUaResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(ConfigurationError::InvalidState {
                operation: "start",
                state: self.state().to_string(),
            }
            .into());
        }

        let (Some(mut transport), Some(health_tx)) =
            (self.transport.lock().take(), self.health_tx.lock().take())
        else {
            return Err(OpcUaError::invalid_config("transport", "transport already consumed"));
        };
        let Some(events) = transport.take_events() else {
            return Err(OpcUaError::invalid_config(
                "transport",
                "transport event stream already taken",
            ));
        };

        *self.workers.lock() = self.router.spawn_workers();

        let connector = TransportConnector::new(
            transport,
            self.config.endpoint.clone(),
            self.config.connection.clone(),
        );
        let orchestrator = LifecycleOrchestrator::new(
            self.config.clone(),
            self.registry.clone(),
            connector,
            self.router.clone(),
            health_tx,
            self.transitions_tx.clone(),
        );

        tracing::info!(
            endpoint = %self.config.endpoint,
            tags = self.registry.len(),
            listeners = self.router.listener_count(),
            "Starting tag monitor"
        );
        let task = tokio::spawn(orchestrator.run(events, self.shutdown_tx.subscribe()));
        *self.task.lock() = Some(task);
        Ok(())
    }

    /// Stops the monitor and waits for the drain to finish.
    ///
    /// Idempotent: later calls return the first outcome.
    pub async fn stop(&self) -> LifecycleOutcome {
        if let Some(outcome) = self.outcome.lock().clone() {
            return outcome;
        }

        self.shutdown_tx.send_replace(true);
        let was_started = self.started.swap(true, Ordering::AcqRel);
        let task = self.task.lock().take();

        let outcome = match task {
            Some(task) => match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "Lifecycle task failed");
                    LifecycleOutcome {
                        final_state: LifecycleState::Stopped,
                        fatal: Some(FatalReason {
                            code: ErrorCode::new(6, 2),
                            category: "startup",
                            message: format!("lifecycle task failed: {e}"),
                        }),
                    }
                }
            },
            None if !was_started => {
                self.stop_idle();
                LifecycleOutcome::clean()
            }
            None => self.stopped().await,
        };

        self.router.shutdown();
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.await;
        }

        tracing::info!(clean = outcome.is_clean(), "Tag monitor stopped");
        self.outcome.lock().get_or_insert(outcome).clone()
    }

    fn stop_idle(&self) {
        let _ = self.transitions_tx.send(StateTransition {
            from: LifecycleState::Idle,
            to: LifecycleState::Stopped,
            at: Utc::now(),
            reason: "stopped before start".to_string(),
        });
        if let Some(health_tx) = self.health_tx.lock().take() {
            health_tx.send_modify(|report| {
                report.lifecycle = LifecycleState::Stopped;
                report.updated_at = Utc::now();
            });
        }
    }

    /// Waits until the monitor has stopped, for whatever reason.
    pub async fn stopped(&self) -> LifecycleOutcome {
        let mut health = self.health_rx.clone();
        let terminal = health
            .wait_for(|report| report.lifecycle.is_terminal())
            .await
            .map(|report| report.fatal.clone());
        let fatal = match terminal {
            Ok(fatal) => fatal,
            // The orchestrator is gone; its last report is final.
            Err(_) => health.borrow().fatal.clone(),
        };
        LifecycleOutcome {
            final_state: LifecycleState::Stopped,
            fatal,
        }
    }

    // =========================================================================
    // Observability
    // =========================================================================

    /// Current orchestrator state.
    pub fn state(&self) -> LifecycleState {
        self.health_rx.borrow().lifecycle
    }

    /// Latest health snapshot.
    pub fn health(&self) -> HealthReport {
        self.health_rx.borrow().clone()
    }

    /// Subscribes to health snapshots.
    pub fn watch_health(&self) -> watch::Receiver<HealthReport> {
        self.health_rx.clone()
    }

    /// Subscribes to lifecycle transitions from now on.
    pub fn transitions(&self) -> broadcast::Receiver<StateTransition> {
        self.transitions_tx.subscribe()
    }
}

impl<T: OpcUaTransport + 'static> std::fmt::Debug for TagMonitor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagMonitor")
            .field("endpoint", &self.config.endpoint)
            .field("tags", &self.registry.len())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::sim::SimulatedTransport;

    fn monitor() -> TagMonitor<SimulatedTransport> {
        let config = ClientConfig::new("opc.tcp://sim:4840");
        let registry = TagRegistry::from_names(4, ["T2m", "RH2m"]).unwrap();
        let (transport, _sim) = SimulatedTransport::new(&config.endpoint);
        TagMonitor::new(config, registry, transport).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_tag_is_rejected() {
        let monitor = monitor();
        let err = monitor.on_tag_changed_fn("Nope", |_| {}).unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Configuration(ConfigurationError::UnknownTag { .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let monitor = monitor();
        let mut transitions = monitor.transitions();

        let outcome = monitor.stop().await;
        assert!(outcome.is_clean());
        assert_eq!(monitor.state(), LifecycleState::Stopped);

        let transition = transitions.recv().await.unwrap();
        assert_eq!(transition.from, LifecycleState::Idle);
        assert_eq!(transition.to, LifecycleState::Stopped);

        assert!(monitor.start().is_err());
        assert_eq!(monitor.stop().await, outcome);
    }

    #[tokio::test]
    async fn test_stopped_resolves_once_stopped() {
        let monitor = monitor();
        monitor.stop().await;

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(1), monitor.stopped())
            .await
            .expect("stopped() should resolve");
        assert_eq!(outcome.final_state, LifecycleState::Stopped);
        assert!(outcome.fatal.is_none());
    }

    #[tokio::test]
    async fn test_stopped_resolves_when_health_sender_is_gone() {
        let monitor = monitor();
        drop(monitor.health_tx.lock().take());

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(1), monitor.stopped())
            .await
            .expect("stopped() should resolve");
        assert!(outcome.fatal.is_none());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ClientConfig::new("http://wrong");
        let (transport, _sim) = SimulatedTransport::new(&config.endpoint);
        let registry = TagRegistry::builtin(4);
        assert!(TagMonitor::new(config, registry, transport).is_err());
    }
}
