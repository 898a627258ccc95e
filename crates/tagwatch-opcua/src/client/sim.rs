// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory OPC UA endpoint.
//!
//! [`SimulatedTransport`] implements [`OpcUaTransport`] without a network.
//! The paired [`SimulatorHandle`] stays with the caller and controls the
//! endpoint from outside: reachability, injected failures, published
//! values and call counters. The binary uses it for `run --simulate`;
//! the integration tests use it for fault injection.
//!
//! # Examples
//!
//! ```
//! use tagwatch_opcua::client::SimulatedTransport;
//!
//! let (transport, sim) = SimulatedTransport::new("opc.tcp://localhost:4840");
//! sim.set_reachable(false);
//! assert_eq!(sim.connect_calls(), 0);
//! # drop(transport);
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::transport::{
    ConnectionHandle, ConnectionState, DataValue, EventStream, ItemHandle, OpcUaTransport,
    SessionHandle, SubscriptionHandle, TransportEvent, UaValue,
};
use crate::error::{
    ConfigurationError, ConnectionError, OpcUaError, OpcUaResult, SessionError, SubscriptionError,
};
use crate::types::{MonitoredItemSettings, NodeId, SubscriptionSettings};

// =============================================================================
// Shared state
// =============================================================================

#[derive(Debug)]
struct SimSubscription {
    session: SessionHandle,
    items: BTreeMap<ItemHandle, NodeId>,
}

#[derive(Debug, Default)]
struct Counters {
    connect_calls: u64,
    disconnect_calls: u64,
    session_opens: u64,
    session_closes: u64,
    subscription_creates: u64,
    subscription_deletes: u64,
    item_creates: u64,
    item_deletes: u64,
}

#[derive(Debug)]
struct SimState {
    reachable: bool,
    failing_connects: u32,
    failing_sessions: u32,
    failing_subscriptions: u32,
    suppress_started: bool,
    rejected_nodes: HashSet<NodeId>,
    connection: Option<ConnectionHandle>,
    sessions: HashSet<SessionHandle>,
    subscriptions: BTreeMap<SubscriptionHandle, SimSubscription>,
    next_id: u32,
    counters: Counters,
}

impl SimState {
    fn new() -> Self {
        Self {
            reachable: true,
            failing_connects: 0,
            failing_sessions: 0,
            failing_subscriptions: 0,
            suppress_started: false,
            rejected_nodes: HashSet::new(),
            connection: None,
            sessions: HashSet::new(),
            subscriptions: BTreeMap::new(),
            next_id: 0,
            counters: Counters::default(),
        }
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn drop_everything(&mut self) -> Option<ConnectionHandle> {
        let dropped = self.connection.take();
        self.sessions.clear();
        self.subscriptions.clear();
        dropped
    }
}

// =============================================================================
// SimulatedTransport
// =============================================================================

/// An [`OpcUaTransport`] backed by in-process state.
#[derive(Debug)]
pub struct SimulatedTransport {
    endpoint: String,
    state: Arc<Mutex<SimState>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Option<EventStream>,
}

impl SimulatedTransport {
    /// Creates a reachable endpoint and its control handle.
    pub fn new(endpoint: impl Into<String>) -> (Self, SimulatorHandle) {
        let state = Arc::new(Mutex::new(SimState::new()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let handle = SimulatorHandle {
            state: state.clone(),
            events_tx: events_tx.clone(),
        };
        let transport = Self {
            endpoint: endpoint.into(),
            state,
            events_tx,
            events_rx: Some(events_rx),
        };
        (transport, handle)
    }

    fn emit(&self, event: TransportEvent) {
        // The receiver only goes away once the orchestrator has stopped.
        let _ = self.events_tx.send(event);
    }
}

#[async_trait]
impl OpcUaTransport for SimulatedTransport {
    fn take_events(&mut self) -> Option<EventStream> {
        self.events_rx.take()
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connect(&mut self, endpoint: &str) -> Result<ConnectionHandle, ConnectionError> {
        let mut state = self.state.lock();
        state.counters.connect_calls += 1;

        if !endpoint.starts_with("opc.tcp://") {
            return Err(ConnectionError::invalid_endpoint(
                endpoint,
                "Endpoint must start with opc.tcp://",
            ));
        }
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(ConnectionError::refused(endpoint, "injected connect failure"));
        }
        if !state.reachable {
            return Err(ConnectionError::refused(endpoint, "endpoint unreachable"));
        }

        let handle = ConnectionHandle(state.next_id());
        state.drop_everything();
        state.connection = Some(handle);
        Ok(handle)
    }

    async fn disconnect(&mut self, connection: ConnectionHandle) -> OpcUaResult<()> {
        let mut state = self.state.lock();
        state.counters.disconnect_calls += 1;
        if state.connection == Some(connection) {
            state.drop_everything();
        }
        Ok(())
    }

    async fn open_session(&mut self, connection: ConnectionHandle) -> OpcUaResult<SessionHandle> {
        let mut state = self.state.lock();
        if state.connection != Some(connection) {
            return Err(ConnectionError::NotConnected.into());
        }
        if state.failing_sessions > 0 {
            state.failing_sessions -= 1;
            return Err(SessionError::open_failed("injected session failure").into());
        }

        state.counters.session_opens += 1;
        let handle = SessionHandle(state.next_id());
        state.sessions.insert(handle);
        Ok(handle)
    }

    async fn close_session(&mut self, session: SessionHandle) -> OpcUaResult<()> {
        let mut state = self.state.lock();
        state.counters.session_closes += 1;
        if !state.sessions.remove(&session) {
            return Err(SessionError::close_failed(session, "session not found").into());
        }
        state.subscriptions.retain(|_, sub| sub.session != session);
        Ok(())
    }

    async fn create_subscription(
        &mut self,
        session: SessionHandle,
        _settings: &SubscriptionSettings,
    ) -> OpcUaResult<SubscriptionHandle> {
        let handle = {
            let mut state = self.state.lock();
            state.counters.subscription_creates += 1;
            if !state.sessions.contains(&session) {
                return Err(OpcUaError::not_connected());
            }
            if state.failing_subscriptions > 0 {
                state.failing_subscriptions -= 1;
                return Err(SubscriptionError::creation_failed("injected subscription failure").into());
            }

            let handle = SubscriptionHandle(state.next_id());
            state.subscriptions.insert(
                handle,
                SimSubscription {
                    session,
                    items: BTreeMap::new(),
                },
            );
            if state.suppress_started {
                return Ok(handle);
            }
            handle
        };

        self.emit(TransportEvent::SubscriptionStarted(handle));
        Ok(handle)
    }

    async fn delete_subscription(&mut self, subscription: SubscriptionHandle) -> OpcUaResult<()> {
        let mut state = self.state.lock();
        state.counters.subscription_deletes += 1;
        match state.subscriptions.remove(&subscription) {
            Some(_) => Ok(()),
            None => Err(SubscriptionError::delete_failed(subscription, "unknown subscription").into()),
        }
    }

    async fn create_monitored_item(
        &mut self,
        subscription: SubscriptionHandle,
        node_id: &NodeId,
        _settings: &MonitoredItemSettings,
    ) -> OpcUaResult<ItemHandle> {
        let mut state = self.state.lock();
        state.counters.item_creates += 1;

        if state.rejected_nodes.contains(node_id) {
            return Err(
                ConfigurationError::invalid_node_id(node_id.to_string(), "BadNodeIdUnknown").into(),
            );
        }

        let handle = ItemHandle(state.next_id());
        let sub = state
            .subscriptions
            .get_mut(&subscription)
            .ok_or_else(OpcUaError::not_connected)?;
        sub.items.insert(handle, node_id.clone());
        Ok(handle)
    }

    async fn delete_monitored_item(
        &mut self,
        subscription: SubscriptionHandle,
        item: ItemHandle,
    ) -> OpcUaResult<()> {
        let mut state = self.state.lock();
        state.counters.item_deletes += 1;
        state
            .subscriptions
            .get_mut(&subscription)
            .and_then(|sub| sub.items.remove(&item))
            .map(|_| ())
            .ok_or_else(OpcUaError::not_connected)
    }
}

// =============================================================================
// SimulatorHandle
// =============================================================================

/// Remote control for a [`SimulatedTransport`].
#[derive(Debug, Clone)]
pub struct SimulatorHandle {
    state: Arc<Mutex<SimState>>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl SimulatorHandle {
    fn emit(&self, event: TransportEvent) {
        let _ = self.events_tx.send(event);
    }

    // =========================================================================
    // Fault injection
    // =========================================================================

    /// Makes the endpoint reachable or unreachable for future connects.
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    /// Fails the next `count` connection attempts.
    pub fn fail_next_connects(&self, count: u32) {
        self.state.lock().failing_connects = count;
    }

    /// Drops the live connection and reports the loss on the event stream.
    ///
    /// Nothing is reported when no connection is established.
    pub fn drop_connection(&self, reason: &str) {
        let dropped = self.state.lock().drop_everything();
        if let Some(connection) = dropped {
            self.emit(TransportEvent::connection_lost(connection, reason));
        }
    }

    /// Rejects monitored items for `node_id`.
    pub fn reject_node(&self, node_id: NodeId) {
        self.state.lock().rejected_nodes.insert(node_id);
    }

    /// Fails the next session open.
    pub fn fail_next_session(&self) {
        self.state.lock().failing_sessions += 1;
    }

    /// Fails the next subscription creation.
    pub fn fail_next_subscription(&self) {
        self.state.lock().failing_subscriptions += 1;
    }

    /// Withholds the "started" acknowledgement of new subscriptions.
    pub fn suppress_started_ack(&self, suppress: bool) {
        self.state.lock().suppress_started = suppress;
    }

    // =========================================================================
    // Server-side events
    // =========================================================================

    /// Publishes a value for every live item monitoring `node_id`.
    ///
    /// Returns the number of notifications sent.
    pub fn publish(
        &self,
        node_id: &NodeId,
        value: impl Into<UaValue>,
        source_timestamp: DateTime<Utc>,
    ) -> usize {
        let value = DataValue::new(value, source_timestamp);
        let targets: Vec<_> = {
            let state = self.state.lock();
            state
                .subscriptions
                .iter()
                .flat_map(|(sub, s)| {
                    s.items
                        .iter()
                        .filter(move |(_, n)| *n == node_id)
                        .map(move |(item, _)| (*sub, *item))
                })
                .collect()
        };

        for (subscription, item) in &targets {
            self.publish_raw(*subscription, *item, value.clone());
        }
        targets.len()
    }

    /// Sends a value change for an arbitrary identity, live or not.
    pub fn publish_raw(&self, subscription: SubscriptionHandle, item: ItemHandle, value: DataValue) {
        self.emit(TransportEvent::ValueChanged {
            subscription,
            item,
            value,
        });
    }

    /// Sends a keep-alive for every live subscription.
    pub fn send_keep_alive(&self) {
        for sub in self.live_subscriptions() {
            self.emit(TransportEvent::SubscriptionKeepAlive(sub));
        }
    }

    /// Ends every live subscription from the server side.
    pub fn terminate_subscription(&self) {
        let ended: Vec<_> = {
            let mut state = self.state.lock();
            std::mem::take(&mut state.subscriptions).into_keys().collect()
        };
        for sub in ended {
            self.emit(TransportEvent::SubscriptionTerminated(sub));
        }
    }

    /// Sends a raw state change for `connection`, live or not.
    pub fn send_connection_state(
        &self,
        connection: ConnectionHandle,
        state: ConnectionState,
        reason: Option<String>,
    ) {
        self.emit(TransportEvent::ConnectionStateChanged {
            connection,
            state,
            reason,
        });
    }

    /// Publishes random values on random live items every `interval`.
    pub fn spawn_value_generator(&self, interval: Duration) -> JoinHandle<()> {
        let sim = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if sim.events_tx.is_closed() {
                    break;
                }

                let items: Vec<_> = {
                    let state = sim.state.lock();
                    state
                        .subscriptions
                        .iter()
                        .flat_map(|(sub, s)| s.items.keys().map(move |item| (*sub, *item)))
                        .collect()
                };
                if items.is_empty() {
                    continue;
                }

                let (subscription, item, value) = {
                    let mut rng = rand::thread_rng();
                    let (subscription, item) = items[rng.gen_range(0..items.len())];
                    (subscription, item, rng.gen_range(0.0..100.0_f64))
                };
                sim.publish_raw(subscription, item, DataValue::new(value, Utc::now()));
            }
        })
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Returns `true` while a connection is established.
    pub fn is_connected(&self) -> bool {
        self.state.lock().connection.is_some()
    }

    /// The established connection, if any.
    pub fn current_connection(&self) -> Option<ConnectionHandle> {
        self.state.lock().connection
    }

    /// Handles of live subscriptions.
    pub fn live_subscriptions(&self) -> Vec<SubscriptionHandle> {
        self.state.lock().subscriptions.keys().copied().collect()
    }

    /// Number of monitored items across live subscriptions.
    pub fn live_items(&self) -> usize {
        self.state
            .lock()
            .subscriptions
            .values()
            .map(|s| s.items.len())
            .sum()
    }

    /// Live item identities monitoring `node_id`.
    pub fn items_for(&self, node_id: &NodeId) -> Vec<(SubscriptionHandle, ItemHandle)> {
        let state = self.state.lock();
        state
            .subscriptions
            .iter()
            .flat_map(|(sub, s)| {
                s.items
                    .iter()
                    .filter(move |(_, n)| *n == node_id)
                    .map(move |(item, _)| (*sub, *item))
            })
            .collect()
    }

    /// Calls to `connect`.
    pub fn connect_calls(&self) -> u64 {
        self.state.lock().counters.connect_calls
    }

    /// Calls to `disconnect`.
    pub fn disconnect_calls(&self) -> u64 {
        self.state.lock().counters.disconnect_calls
    }

    /// Successful session opens.
    pub fn session_opens(&self) -> u64 {
        self.state.lock().counters.session_opens
    }

    /// Calls to `close_session`.
    pub fn session_closes(&self) -> u64 {
        self.state.lock().counters.session_closes
    }

    /// Calls to `create_subscription`.
    pub fn subscription_creates(&self) -> u64 {
        self.state.lock().counters.subscription_creates
    }

    /// Calls to `delete_subscription`.
    pub fn subscription_deletes(&self) -> u64 {
        self.state.lock().counters.subscription_deletes
    }

    /// Calls to `create_monitored_item`.
    pub fn item_creates(&self) -> u64 {
        self.state.lock().counters.item_creates
    }

    /// Calls to `delete_monitored_item`.
    pub fn item_deletes(&self) -> u64 {
        self.state.lock().counters.item_deletes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENDPOINT: &str = "opc.tcp://sim:4840";

    #[tokio::test]
    async fn test_connect_session_subscription() {
        let (mut transport, sim) = SimulatedTransport::new(ENDPOINT);
        let mut events = transport.take_events().unwrap();
        assert!(transport.take_events().is_none());

        let conn = transport.connect(ENDPOINT).await.unwrap();
        let session = transport.open_session(conn).await.unwrap();
        let sub = transport
            .create_subscription(session, &SubscriptionSettings::default())
            .await
            .unwrap();

        assert_eq!(events.recv().await, Some(TransportEvent::SubscriptionStarted(sub)));
        assert!(sim.is_connected());
        assert_eq!(sim.live_subscriptions(), vec![sub]);
    }

    #[tokio::test]
    async fn test_handles_are_never_reused() {
        let (mut transport, _sim) = SimulatedTransport::new(ENDPOINT);
        let first = transport.connect(ENDPOINT).await.unwrap();
        transport.disconnect(first).await.unwrap();
        let second = transport.connect(ENDPOINT).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_unreachable_and_injected_failures() {
        let (mut transport, sim) = SimulatedTransport::new(ENDPOINT);
        sim.set_reachable(false);
        assert!(transport.connect(ENDPOINT).await.unwrap_err().is_retryable());

        sim.set_reachable(true);
        sim.fail_next_connects(1);
        assert!(transport.connect(ENDPOINT).await.is_err());
        let conn = transport.connect(ENDPOINT).await.unwrap();

        sim.fail_next_session();
        assert!(transport.open_session(conn).await.is_err());
        assert!(transport.open_session(conn).await.is_ok());
        assert_eq!(sim.connect_calls(), 3);
        assert_eq!(sim.session_opens(), 1);

        assert!(!transport
            .connect("http://wrong")
            .await
            .unwrap_err()
            .is_retryable());
    }

    #[tokio::test]
    async fn test_publish_reaches_monitored_node() {
        let (mut transport, sim) = SimulatedTransport::new(ENDPOINT);
        let mut events = transport.take_events().unwrap();
        let node = NodeId::string(4, "ActLineSpeed");

        let conn = transport.connect(ENDPOINT).await.unwrap();
        let session = transport.open_session(conn).await.unwrap();
        let sub = transport
            .create_subscription(session, &SubscriptionSettings::default())
            .await
            .unwrap();
        let item = transport
            .create_monitored_item(sub, &node, &MonitoredItemSettings::default())
            .await
            .unwrap();
        let _started = events.recv().await;

        assert_eq!(sim.publish(&node, 12.5, Utc::now()), 1);
        match events.recv().await {
            Some(TransportEvent::ValueChanged {
                subscription,
                item: got,
                value,
            }) => {
                assert_eq!(subscription, sub);
                assert_eq!(got, item);
                assert_eq!(value.value, UaValue::Double(12.5));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_drop_connection_clears_state_and_reports() {
        let (mut transport, sim) = SimulatedTransport::new(ENDPOINT);
        let mut events = transport.take_events().unwrap();
        let conn = transport.connect(ENDPOINT).await.unwrap();
        let session = transport.open_session(conn).await.unwrap();

        sim.drop_connection("cable pulled");
        assert!(!sim.is_connected());
        assert_eq!(
            events.recv().await,
            Some(TransportEvent::connection_lost(conn, "cable pulled"))
        );
        assert!(transport.close_session(session).await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_node() {
        let (mut transport, sim) = SimulatedTransport::new(ENDPOINT);
        let node = NodeId::string(4, "Missing");
        sim.reject_node(node.clone());

        let conn = transport.connect(ENDPOINT).await.unwrap();
        let session = transport.open_session(conn).await.unwrap();
        let sub = transport
            .create_subscription(session, &SubscriptionSettings::default())
            .await
            .unwrap();
        assert!(transport
            .create_monitored_item(sub, &node, &MonitoredItemSettings::default())
            .await
            .is_err());
        assert_eq!(sim.live_items(), 0);
        assert_eq!(sim.item_creates(), 1);
    }
}
