// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Transport connector with retry and backoff.
//!
//! The connector owns the transport and the [`ConnectionState`]. It is the
//! only place where connection attempts are retried; the layers above it
//! report failures and let the orchestrator decide.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use super::transport::{ConnectionHandle, ConnectionState, EventStream, OpcUaTransport};
use crate::error::ConnectionError;
use crate::types::RetryConfig;

// =============================================================================
// ConnectorStats
// =============================================================================

/// Counters for connection activity.
#[derive(Debug, Default)]
pub struct ConnectorStats {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    disconnects: AtomicU64,
    losses: AtomicU64,
}

impl ConnectorStats {
    /// Total connection attempts.
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Attempts that established a connection.
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    /// Attempts that failed.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Deliberate disconnects.
    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }

    /// Connections lost without a disconnect.
    pub fn losses(&self) -> u64 {
        self.losses.load(Ordering::Relaxed)
    }
}

// =============================================================================
// TransportConnector
// =============================================================================

/// Owns the transport connection and its state.
pub struct TransportConnector<T> {
    transport: T,
    endpoint: String,
    retry: RetryConfig,
    handle: Option<ConnectionHandle>,
    state_tx: watch::Sender<ConnectionState>,
    stats: Arc<ConnectorStats>,
}

impl<T: OpcUaTransport> TransportConnector<T> {
    /// Creates a connector for `endpoint`.
    pub fn new(transport: T, endpoint: impl Into<String>, retry: RetryConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            endpoint: endpoint.into(),
            retry,
            handle: None,
            state_tx,
            stats: Arc::new(ConnectorStats::default()),
        }
    }

    /// The endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Subscribes to connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// The live connection, if any.
    pub fn handle(&self) -> Option<ConnectionHandle> {
        self.handle
    }

    /// Shared statistics.
    pub fn stats(&self) -> Arc<ConnectorStats> {
        self.stats.clone()
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Takes the transport's event stream.
    pub fn take_events(&mut self) -> Option<EventStream> {
        self.transport.take_events()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!(from = %current, to = %state, "Connection state changed");
            *current = state;
            true
        });
    }

    /// Connects, retrying with backoff until the budget is spent.
    ///
    /// Returns the existing handle when already connected. Errors that no
    /// retry can fix (such as a malformed endpoint) are returned at once.
    pub async fn connect(&mut self) -> Result<ConnectionHandle, ConnectionError> {
        if let Some(handle) = self.handle {
            return Ok(handle);
        }

        if self.state() != ConnectionState::Reconnecting {
            self.set_state(ConnectionState::Connecting);
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.stats.attempts.fetch_add(1, Ordering::Relaxed);

            match self.transport.connect(&self.endpoint).await {
                Ok(handle) => {
                    self.stats.successes.fetch_add(1, Ordering::Relaxed);
                    self.handle = Some(handle);
                    self.set_state(ConnectionState::Connected);
                    tracing::info!(
                        endpoint = %self.endpoint,
                        connection = %handle,
                        attempt,
                        "Connected to OPC UA server"
                    );
                    return Ok(handle);
                }
                Err(error) => {
                    self.stats.failures.fetch_add(1, Ordering::Relaxed);

                    if !error.is_retryable() {
                        self.set_state(ConnectionState::Disconnected);
                        return Err(error);
                    }
                    if !self.retry.allows_retry(attempt) {
                        self.set_state(ConnectionState::Disconnected);
                        return Err(ConnectionError::retries_exhausted(
                            self.endpoint.clone(),
                            attempt,
                            error,
                        ));
                    }

                    let delay = self.retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        endpoint = %self.endpoint,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retrying to connect"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Disconnects. Safe to call when already disconnected.
    pub async fn disconnect(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.stats.disconnects.fetch_add(1, Ordering::Relaxed);
            match self.transport.disconnect(handle).await {
                Ok(()) => tracing::info!(endpoint = %self.endpoint, connection = %handle, "Disconnected"),
                Err(e) => e.log("Disconnect failed"),
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    /// Records a connection lost outside of any call.
    ///
    /// The dead handle is forgotten without calling the transport.
    pub fn mark_lost(&mut self, reason: Option<&str>) {
        if let Some(handle) = self.handle.take() {
            self.stats.losses.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                endpoint = %self.endpoint,
                connection = %handle,
                reason = reason.unwrap_or("unknown"),
                "Connection lost"
            );
        }
        self.set_state(ConnectionState::Reconnecting);
    }
}

impl<T> std::fmt::Debug for TransportConnector<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConnector")
            .field("endpoint", &self.endpoint)
            .field("handle", &self.handle)
            .field("state", &*self.state_tx.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::client::sim::{SimulatedTransport, SimulatorHandle};

    const ENDPOINT: &str = "opc.tcp://sim:4840";

    fn connector(retries: u32) -> (TransportConnector<SimulatedTransport>, SimulatorHandle) {
        let (transport, sim) = SimulatedTransport::new(ENDPOINT);
        let retry = RetryConfig::new(retries).with_initial_delay(Duration::from_millis(100));
        (TransportConnector::new(transport, ENDPOINT, retry), sim)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_first_try() {
        let (mut connector, sim) = connector(1);
        let mut state = connector.watch_state();

        let handle = connector.connect().await.unwrap();
        assert_eq!(connector.handle(), Some(handle));
        assert_eq!(*state.borrow_and_update(), ConnectionState::Connected);
        assert_eq!(sim.connect_calls(), 1);

        // Already connected: no new attempt.
        assert_eq!(connector.connect().await.unwrap(), handle);
        assert_eq!(sim.connect_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_succeeds() {
        let (mut connector, sim) = connector(3);
        sim.fail_next_connects(2);

        let started = tokio::time::Instant::now();
        connector.connect().await.unwrap();

        assert_eq!(sim.connect_calls(), 3);
        assert_eq!(connector.stats().failures(), 2);
        // Exponential: 100ms + 200ms.
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhausted() {
        let (mut connector, sim) = connector(1);
        sim.set_reachable(false);

        let err = connector.connect().await.unwrap_err();
        match err {
            ConnectionError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sim.connect_calls(), 2);
        assert_eq!(connector.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let (transport, sim) = SimulatedTransport::new("http://wrong");
        let mut connector = TransportConnector::new(transport, "http://wrong", RetryConfig::new(5));

        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, ConnectionError::InvalidEndpoint { .. }));
        assert_eq!(sim.connect_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_idempotent() {
        let (mut connector, sim) = connector(0);
        connector.connect().await.unwrap();

        connector.disconnect().await;
        connector.disconnect().await;

        assert_eq!(sim.disconnect_calls(), 1);
        assert_eq!(connector.state(), ConnectionState::Disconnected);
        assert_eq!(connector.stats().disconnects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_lost_forgets_handle() {
        let (mut connector, sim) = connector(0);
        let first = connector.connect().await.unwrap();

        connector.mark_lost(Some("link down"));
        assert_eq!(connector.state(), ConnectionState::Reconnecting);
        assert_eq!(connector.handle(), None);

        // Disconnect after a loss does not touch the transport.
        connector.disconnect().await;
        assert_eq!(sim.disconnect_calls(), 0);

        let second = connector.connect().await.unwrap();
        assert_ne!(first, second);
        assert_eq!(connector.stats().losses(), 1);
    }
}
