// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Lifecycle orchestrator.
//!
//! # State Machine
//!
//! ```text
//!   Idle        --start ----------------> Starting
//!   Starting    --started ack ----------> Running
//!   Starting    --failed, budget left --> Starting
//!   Running     --loss or termination --> Recovering
//!   Recovering  --rebuilt --------------> Running
//!   Starting    --shutdown -------------> Draining
//!   Running     --shutdown -------------> Draining
//!   Recovering  --shutdown -------------> Draining
//!   Draining    --drained --------------> Stopped
//!   Starting    --budget spent ---------> Stopped
//!   Recovering  --budget spent ---------> Stopped
//!   Running     --events closed --------> Stopped
//!   Idle        --stop -----------------> Stopped
//! ```
//!
//! The orchestrator is a single task that owns the connection, the session
//! and the subscription. Transport events are handled one at a time in
//! arrival order on that task, so no two rebuilds can overlap and no lock
//! guards the handles. A shutdown request is observed at every await
//! point; a rebuild in progress is abandoned and whatever it already
//! created is torn down by the drain.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};

use crate::client::connector::TransportConnector;
use crate::client::router::{DispatchOutcome, NotificationRouter};
use crate::client::session::{SessionManager, SessionStats};
use crate::client::subscription::{ActiveSubscription, SubscriptionController, SubscriptionStats};
use crate::client::transport::{
    ConnectionState, EventStream, OpcUaTransport, SubscriptionHandle, TransportEvent,
};
use crate::client::SessionInfo;
use crate::error::{
    ConnectionError, FatalReason, OpcUaError, OpcUaResult, StartupError, SubscriptionError,
};
use crate::registry::{TagName, TagRegistry};
use crate::types::ClientConfig;

// =============================================================================
// LifecycleState
// =============================================================================

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Not started.
    #[default]
    Idle,

    /// Running the startup sequence for the first time.
    Starting,

    /// Subscription acknowledged, notifications flowing.
    Running,

    /// Rebuilding after a connection loss.
    Recovering,

    /// Tearing down after a shutdown request.
    Draining,

    /// Terminal.
    Stopped,
}

impl LifecycleState {
    /// Returns `true` if moving to `next` is a legal transition.
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        matches!(
            (self, next),
            (Idle, Starting)
                | (Idle, Stopped)
                | (Starting, Running)
                | (Starting, Draining)
                | (Starting, Stopped)
                | (Running, Recovering)
                | (Running, Draining)
                | (Running, Stopped)
                | (Recovering, Running)
                | (Recovering, Draining)
                | (Recovering, Stopped)
                | (Draining, Stopped)
        )
    }

    /// Returns `true` once stopped.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Returns `true` while notifications are being delivered.
    #[inline]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Starting => write!(f, "Starting"),
            Self::Running => write!(f, "Running"),
            Self::Recovering => write!(f, "Recovering"),
            Self::Draining => write!(f, "Draining"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

// =============================================================================
// StateTransition / HealthReport / LifecycleOutcome
// =============================================================================

/// One orchestrator transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    /// Previous state.
    pub from: LifecycleState,
    /// New state.
    pub to: LifecycleState,
    /// When it happened.
    pub at: DateTime<Utc>,
    /// Why it happened.
    pub reason: String,
}

/// Health snapshot published on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    /// Orchestrator state.
    pub lifecycle: LifecycleState,

    /// Transport connection state.
    pub connection: ConnectionState,

    /// Monitored items on the current subscription.
    pub active_items: usize,

    /// Tags that could not be monitored on the current subscription.
    pub failed_tags: Vec<TagName>,

    /// Completed or attempted rebuilds after a loss.
    pub rebuilds: u64,

    /// When the last keep-alive arrived.
    pub last_keep_alive: Option<DateTime<Utc>>,

    /// Why the orchestrator stopped, if it stopped on an error.
    pub fatal: Option<FatalReason>,

    /// When this report was produced.
    pub updated_at: DateTime<Utc>,
}

impl Default for HealthReport {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleState::Idle,
            connection: ConnectionState::Disconnected,
            active_items: 0,
            failed_tags: Vec::new(),
            rebuilds: 0,
            last_keep_alive: None,
            fatal: None,
            updated_at: Utc::now(),
        }
    }
}

impl HealthReport {
    /// Returns `true` if running with every tag monitored.
    pub fn is_healthy(&self) -> bool {
        self.lifecycle.is_running() && self.failed_tags.is_empty()
    }
}

/// How the orchestrator ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleOutcome {
    /// Always [`LifecycleState::Stopped`].
    pub final_state: LifecycleState,
    /// The fatal error, if the stop was not requested.
    pub fatal: Option<FatalReason>,
}

impl LifecycleOutcome {
    /// A requested stop.
    pub fn clean() -> Self {
        Self {
            final_state: LifecycleState::Stopped,
            fatal: None,
        }
    }

    /// Returns `true` if the stop was requested.
    pub fn is_clean(&self) -> bool {
        self.fatal.is_none()
    }
}

// =============================================================================
// LifecycleOrchestrator
// =============================================================================

enum Interruption {
    ConnectionLost(Option<String>),
    SubscriptionTerminated(SubscriptionHandle),
}

impl Interruption {
    fn into_error(self) -> OpcUaError {
        match self {
            Self::ConnectionLost(reason) => ConnectionError::lost(reason).into(),
            Self::SubscriptionTerminated(subscription) => {
                SubscriptionError::Terminated { subscription }.into()
            }
        }
    }
}

enum Establish {
    Ready,
    Shutdown,
    Fatal(OpcUaError),
}

/// Resolves once a stop is requested or the requester is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Sequences startup, recovery and shutdown.
pub struct LifecycleOrchestrator<T: OpcUaTransport> {
    config: Arc<ClientConfig>,
    registry: Arc<TagRegistry>,
    connector: TransportConnector<T>,
    sessions: SessionManager,
    subscriptions: SubscriptionController,
    router: Arc<NotificationRouter>,
    health_tx: watch::Sender<HealthReport>,
    transitions_tx: broadcast::Sender<StateTransition>,

    state: LifecycleState,
    session: Option<SessionInfo>,
    subscription: Option<ActiveSubscription>,
    failed_tags: Vec<TagName>,
    rebuilds: u64,
    last_keep_alive: Option<DateTime<Utc>>,
    fatal: Option<FatalReason>,
}

impl<T: OpcUaTransport> LifecycleOrchestrator<T> {
    /// Creates an orchestrator. Nothing happens until [`run`](Self::run).
    pub fn new(
        config: Arc<ClientConfig>,
        registry: Arc<TagRegistry>,
        connector: TransportConnector<T>,
        router: Arc<NotificationRouter>,
        health_tx: watch::Sender<HealthReport>,
        transitions_tx: broadcast::Sender<StateTransition>,
    ) -> Self {
        Self {
            config,
            registry,
            connector,
            sessions: SessionManager::new(),
            subscriptions: SubscriptionController::new(),
            router,
            health_tx,
            transitions_tx,
            state: LifecycleState::Idle,
            session: None,
            subscription: None,
            failed_tags: Vec::new(),
            rebuilds: 0,
            last_keep_alive: None,
            fatal: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Session statistics.
    pub fn session_stats(&self) -> Arc<SessionStats> {
        self.sessions.stats()
    }

    /// Subscription statistics.
    pub fn subscription_stats(&self) -> Arc<SubscriptionStats> {
        self.subscriptions.stats()
    }

    /// Runs until stopped, either by a `true` on `shutdown` or by a fatal error.
    pub async fn run(
        mut self,
        mut events: EventStream,
        mut shutdown: watch::Receiver<bool>,
    ) -> LifecycleOutcome {
        self.transition(LifecycleState::Starting, "start requested");

        let fatal = loop {
            match self.state {
                LifecycleState::Starting | LifecycleState::Recovering => {
                    match self.establish(&mut events, &mut shutdown).await {
                        Establish::Ready => {
                            self.transition(LifecycleState::Running, "subscription started")
                        }
                        Establish::Shutdown => {
                            self.drain().await;
                            break None;
                        }
                        Establish::Fatal(error) => break Some(error),
                    }
                }
                LifecycleState::Running => {
                    tokio::select! {
                        biased;
                        _ = shutdown_requested(&mut shutdown) => {
                            self.drain().await;
                            break None;
                        }
                        event = events.recv() => match event {
                            Some(event) => self.handle_running_event(event).await,
                            None => {
                                self.release().await;
                                break Some(ConnectionError::lost(Some(
                                    "transport event stream closed".to_string(),
                                )).into());
                            }
                        },
                    }
                }
                _ => break None,
            }
        };

        self.router.shutdown();

        let reason = match &fatal {
            Some(error) => {
                error.log("Lifecycle stopped");
                for hint in error.recovery_hints() {
                    tracing::info!(hint, "Recovery hint");
                }
                self.fatal = Some(FatalReason::from(error));
                error.to_string()
            }
            None => "shutdown complete".to_string(),
        };
        self.transition(LifecycleState::Stopped, &reason);

        LifecycleOutcome {
            final_state: self.state,
            fatal: self.fatal.clone(),
        }
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Runs the startup sequence until it succeeds, the budget is spent or
    /// a shutdown is requested.
    async fn establish(
        &mut self,
        events: &mut EventStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Establish {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => return Establish::Shutdown,
                result = self.build(events) => result,
            };
            let error = match result {
                Ok(()) => return Establish::Ready,
                Err(error) => error,
            };

            error.log("Startup sequence failed");
            self.release().await;

            if error.is_fatal() {
                return Establish::Fatal(error);
            }
            if !self.config.connection.allows_retry(attempt) {
                return Establish::Fatal(StartupError::new(attempt, error).into());
            }

            let delay = self.config.connection.delay_for_attempt(attempt);
            tracing::warn!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Retrying startup sequence"
            );
            tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => return Establish::Shutdown,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// connect → session → subscription → items → bind → await "started".
    ///
    /// Handles are stored as soon as they exist so an abandoned build can
    /// still be torn down.
    async fn build(&mut self, events: &mut EventStream) -> OpcUaResult<()> {
        let connection = self.connector.connect().await?;
        let connection_state = self.connector.state();

        let session = self
            .sessions
            .open(self.connector.transport_mut(), connection, connection_state)
            .await?;
        let session = self.session.insert(session).clone();

        let subscription = self
            .subscriptions
            .create_subscription(self.connector.transport_mut(), &session, &self.config.subscription)
            .await?;
        let subscription = self.subscription.insert(subscription);

        let report = self
            .subscriptions
            .add_monitored_items(
                self.connector.transport_mut(),
                subscription,
                self.registry.iter(),
                &self.config.monitoring,
            )
            .await;

        let handle = subscription.handle;
        self.router.bind_subscription(handle, subscription.bindings());

        if report.created.is_empty() && !self.registry.is_empty() {
            tracing::error!(subscription = %handle, "No tag could be monitored");
        }
        self.failed_tags = report.failed_tags();
        self.publish_health();

        self.await_started(events, handle).await
    }

    async fn await_started(
        &mut self,
        events: &mut EventStream,
        handle: SubscriptionHandle,
    ) -> OpcUaResult<()> {
        let waited = self.config.subscription.lifetime();
        let deadline = tokio::time::sleep(waited);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    return Err(SubscriptionError::NotStarted { subscription: handle, waited }.into());
                }
                event = events.recv() => {
                    let Some(event) = event else {
                        return Err(ConnectionError::lost(Some("transport event stream closed".to_string())).into());
                    };
                    if let Some(interruption) = self.apply_event(event) {
                        return Err(interruption.into_error());
                    }
                    if self.subscription.as_ref().is_some_and(|s| s.state.is_active()) {
                        return Ok(());
                    }
                }
            }
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Applies one transport event. Returns an interruption when the stack
    /// has to be rebuilt.
    fn apply_event(&mut self, event: TransportEvent) -> Option<Interruption> {
        match event {
            TransportEvent::ValueChanged {
                subscription,
                item,
                value,
            } => {
                if let DispatchOutcome::Delivered {
                    source_timestamp, ..
                } = self.router.dispatch(subscription, item, value)
                {
                    if let Some(item) = self
                        .subscription
                        .as_mut()
                        .filter(|s| s.handle == subscription)
                        .and_then(|s| s.item_by_handle_mut(item))
                    {
                        item.record_notification(source_timestamp);
                    }
                }
                None
            }
            TransportEvent::SubscriptionStarted(handle) => {
                match self.subscription.as_mut().filter(|s| s.handle == handle) {
                    Some(subscription) => {
                        self.subscriptions.mark_started(subscription);
                    }
                    None => tracing::debug!(subscription = %handle, "Ignoring stale start acknowledgement"),
                }
                None
            }
            TransportEvent::SubscriptionKeepAlive(handle) => {
                match self.subscription.as_mut().filter(|s| s.handle == handle) {
                    Some(subscription) => {
                        self.subscriptions.record_keep_alive(subscription);
                        self.last_keep_alive = Some(Utc::now());
                        self.publish_health();
                    }
                    None => tracing::debug!(subscription = %handle, "Ignoring stale keep-alive"),
                }
                None
            }
            TransportEvent::SubscriptionTerminated(handle) => {
                if self.subscription.as_ref().is_some_and(|s| s.handle == handle) {
                    tracing::warn!(subscription = %handle, "Subscription terminated by server");
                    Some(Interruption::SubscriptionTerminated(handle))
                } else {
                    tracing::debug!(subscription = %handle, "Ignoring stale termination");
                    None
                }
            }
            TransportEvent::ConnectionStateChanged {
                connection,
                state,
                reason,
            } if self.connector.handle() != Some(connection) => {
                tracing::debug!(connection = %connection, state = %state, reason = reason.as_deref().unwrap_or("unknown"), "Ignoring state change of a replaced connection");
                None
            }
            TransportEvent::ConnectionStateChanged { state, reason, .. } => match state {
                ConnectionState::Disconnected | ConnectionState::Reconnecting => {
                    self.connector.mark_lost(reason.as_deref());
                    Some(Interruption::ConnectionLost(reason))
                }
                ConnectionState::Connecting | ConnectionState::Connected => {
                    tracing::debug!(state = %state, "Transport reported connection state");
                    None
                }
            },
        }
    }

    async fn handle_running_event(&mut self, event: TransportEvent) {
        let Some(interruption) = self.apply_event(event) else {
            return;
        };

        let reason = interruption.into_error();
        self.rebuilds += 1;
        self.transition(LifecycleState::Recovering, &reason.to_string());

        if matches!(reason, OpcUaError::Subscription(_)) {
            // The server already dropped it; only the session and connection remain.
            self.subscriptions.discard(self.subscription.take());
        }
        self.release().await;
        self.publish_health();
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Releases everything built so far, highest layer first.
    ///
    /// Notifications still queued for listeners are dropped. With a live
    /// connection each layer is closed; after a loss the handles are only
    /// forgotten.
    async fn release(&mut self) {
        self.router.invalidate();
        self.failed_tags.clear();

        if self.connector.handle().is_some() {
            self.subscriptions
                .terminate(self.connector.transport_mut(), self.subscription.take())
                .await;
            self.sessions
                .close(self.connector.transport_mut(), self.session.take())
                .await;
            self.connector.disconnect().await;
        } else {
            self.subscriptions.discard(self.subscription.take());
            self.sessions.discard(self.session.take());
        }
    }

    /// terminate subscription → close session → disconnect. Never fails.
    async fn drain(&mut self) {
        self.transition(LifecycleState::Draining, "shutdown requested");
        self.router.clear_bindings();

        self.subscriptions
            .terminate(self.connector.transport_mut(), self.subscription.take())
            .await;
        self.sessions
            .close(self.connector.transport_mut(), self.session.take())
            .await;
        self.connector.disconnect().await;

        self.failed_tags.clear();
    }

    // =========================================================================
    // Observability
    // =========================================================================

    fn transition(&mut self, to: LifecycleState, reason: &str) {
        let from = self.state;
        if !from.can_transition_to(to) {
            tracing::warn!(from = %from, to = %to, "Ignoring illegal lifecycle transition");
            return;
        }

        self.state = to;
        tracing::info!(from = %from, to = %to, reason, "Lifecycle transition");

        // No subscriber is fine.
        let _ = self.transitions_tx.send(StateTransition {
            from,
            to,
            at: Utc::now(),
            reason: reason.to_string(),
        });
        self.publish_health();
    }

    fn publish_health(&self) {
        self.health_tx.send_replace(HealthReport {
            lifecycle: self.state,
            connection: self.connector.state(),
            active_items: self.subscription.as_ref().map_or(0, |s| s.item_count()),
            failed_tags: self.failed_tags.clone(),
            rebuilds: self.rebuilds,
            last_keep_alive: self.last_keep_alive,
            fatal: self.fatal.clone(),
            updated_at: Utc::now(),
        });
    }
}

impl<T: OpcUaTransport> fmt::Debug for LifecycleOrchestrator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleOrchestrator")
            .field("state", &self.state)
            .field("connector", &self.connector)
            .field("session", &self.session.as_ref().map(|s| s.handle))
            .field("subscription", &self.subscription.as_ref().map(|s| s.handle))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use LifecycleState::*;

        assert!(Idle.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Running.can_transition_to(Recovering));
        assert!(Recovering.can_transition_to(Running));
        assert!(Recovering.can_transition_to(Stopped));
        assert!(Running.can_transition_to(Draining));
        assert!(Draining.can_transition_to(Stopped));

        assert!(!Idle.can_transition_to(Running));
        assert!(!Draining.can_transition_to(Running));
        assert!(!Recovering.can_transition_to(Starting));
        for next in [Idle, Starting, Running, Recovering, Draining, Stopped] {
            assert!(!Stopped.can_transition_to(next));
        }
    }

    #[test]
    fn test_transition_table_is_complete() {
        use LifecycleState::*;

        let all = [Idle, Starting, Running, Recovering, Draining, Stopped];
        let legal: Vec<_> = all
            .iter()
            .flat_map(|from| all.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(
            legal,
            vec![
                (Idle, Starting),
                (Idle, Stopped),
                (Starting, Running),
                (Starting, Draining),
                (Starting, Stopped),
                (Running, Recovering),
                (Running, Draining),
                (Running, Stopped),
                (Recovering, Running),
                (Recovering, Draining),
                (Recovering, Stopped),
                (Draining, Stopped),
            ]
        );
    }

    #[test]
    fn test_health_report_default() {
        let report = HealthReport::default();
        assert_eq!(report.lifecycle, LifecycleState::Idle);
        assert_eq!(report.connection, ConnectionState::Disconnected);
        assert!(!report.is_healthy());
    }

    #[test]
    fn test_outcome_clean() {
        assert!(LifecycleOutcome::clean().is_clean());
        assert_eq!(LifecycleOutcome::clean().final_state, LifecycleState::Stopped);
    }
}
