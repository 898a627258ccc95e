// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Lifecycle integration tests.
//!
//! Every test drives a [`TagMonitor`] against the [`SimulatedTransport`]
//! with a paused clock, so backoff delays elapse instantly.
//!
//! ```bash
//! cargo test -p tagwatch-opcua --test lifecycle_integration
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::{broadcast, mpsc, Notify, Semaphore};

use tagwatch_opcua::client::{ChangeNotification, ChannelListener, DataValue};
use tagwatch_opcua::{
    ClientConfig, ConnectionState, HealthReport, LifecycleState, SimulatedTransport,
    SimulatorHandle, StateTransition, TagListener, TagMonitor, TagRegistry, UaValue,
};

const ENDPOINT: &str = "opc.tcp://sim:4840";
const WAIT: Duration = Duration::from_secs(3600);

// =============================================================================
// Helpers
// =============================================================================

fn config(max_retries: u32) -> ClientConfig {
    ClientConfig::builder()
        .endpoint(ENDPOINT)
        .max_retries(max_retries)
        .initial_delay(Duration::from_millis(500))
        .build()
        .unwrap()
}

fn monitor_with(
    config: ClientConfig,
    tags: &[&str],
) -> (TagMonitor<SimulatedTransport>, SimulatorHandle) {
    let registry = TagRegistry::from_names(config.namespace_index, tags.iter().copied()).unwrap();
    let (transport, sim) = SimulatedTransport::new(ENDPOINT);
    (TagMonitor::new(config, registry, transport).unwrap(), sim)
}

fn listen(
    monitor: &TagMonitor<SimulatedTransport>,
    tag: &str,
) -> mpsc::Receiver<ChangeNotification> {
    let (listener, rx) = ChannelListener::with_channel(64);
    monitor.on_tag_changed(tag, Arc::new(listener)).unwrap();
    rx
}

async fn wait_for_state(
    monitor: &TagMonitor<SimulatedTransport>,
    state: LifecycleState,
) -> HealthReport {
    let mut health = monitor.watch_health();
    let report = tokio::time::timeout(WAIT, health.wait_for(|h| h.lifecycle == state))
        .await
        .expect("timed out waiting for state")
        .expect("health channel closed")
        .clone();
    report
}

async fn expect_transition(
    rx: &mut broadcast::Receiver<StateTransition>,
    from: LifecycleState,
    to: LifecycleState,
) -> StateTransition {
    tokio::time::timeout(WAIT, async {
        loop {
            let transition = rx.recv().await.expect("transition channel closed");
            if transition.from == from && transition.to == to {
                return transition;
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {from} -> {to}"))
}

async fn next_value(rx: &mut mpsc::Receiver<ChangeNotification>) -> ChangeNotification {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a notification")
        .expect("listener channel closed")
}

fn at(secs: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

/// Forwards notifications, but only once the gate hands out a permit.
struct GatedListener {
    gate: Arc<Semaphore>,
    entered: Arc<Notify>,
    forward: mpsc::Sender<ChangeNotification>,
}

#[async_trait]
impl TagListener for GatedListener {
    async fn on_change(&self, notification: ChangeNotification) {
        self.entered.notify_one();
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        let _ = self.forward.send(notification).await;
    }
}

// =============================================================================
// Startup
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_reaches_running_on_first_try() {
    let (monitor, sim) = monitor_with(config(1), &["ActLineSpeed"]);
    let mut values = listen(&monitor, "ActLineSpeed");

    monitor.start().unwrap();
    let health = wait_for_state(&monitor, LifecycleState::Running).await;

    assert_eq!(health.active_items, 1);
    assert!(health.failed_tags.is_empty());
    assert_eq!(health.connection, ConnectionState::Connected);
    assert_eq!(sim.connect_calls(), 1);
    assert_eq!(sim.live_items(), 1);

    let node = monitor.registry().node_id("ActLineSpeed").unwrap().clone();
    assert_eq!(node.to_string(), "ns=4;s=ActLineSpeed");
    assert_eq!(sim.publish(&node, 12.5, at(1)), 1);

    let change = next_value(&mut values).await;
    assert_eq!(change.tag.as_str(), "ActLineSpeed");
    assert_eq!(change.value, UaValue::Double(12.5));
    assert_eq!(change.source_timestamp, Some(at(1)));

    assert!(monitor.stop().await.is_clean());
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_endpoint_stops_with_connection_error() {
    let (monitor, sim) = monitor_with(config(1), &["ActLineSpeed"]);
    sim.set_reachable(false);

    monitor.start().unwrap();
    let outcome = tokio::time::timeout(WAIT, monitor.stopped()).await.unwrap();

    assert_eq!(outcome.final_state, LifecycleState::Stopped);
    let fatal = outcome.fatal.expect("expected a fatal error");
    assert_eq!(fatal.category, "connection");

    assert_eq!(sim.connect_calls(), 2);
    assert_eq!(sim.session_opens(), 0);
    assert_eq!(sim.subscription_creates(), 0);
    assert_eq!(monitor.health().fatal, Some(fatal.clone()));

    // stop() after a fatal stop reports the same outcome.
    assert_eq!(monitor.stop().await.fatal, Some(fatal));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_tag_does_not_block_others() {
    let (monitor, sim) = monitor_with(config(1), &["T2m", "RH2m", "WS10m"]);
    let rejected = monitor.registry().node_id("RH2m").unwrap().clone();
    sim.reject_node(rejected);

    monitor.start().unwrap();
    let health = wait_for_state(&monitor, LifecycleState::Running).await;

    assert_eq!(health.active_items, 2);
    assert_eq!(health.failed_tags.len(), 1);
    assert_eq!(health.failed_tags[0].as_str(), "RH2m");
    assert!(!health.is_healthy());
    assert_eq!(sim.live_items(), 2);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_session_failure_retries_whole_sequence() {
    let (monitor, sim) = monitor_with(config(3), &["ActLineSpeed"]);
    sim.fail_next_session();

    monitor.start().unwrap();
    wait_for_state(&monitor, LifecycleState::Running).await;

    assert_eq!(sim.connect_calls(), 2);
    // The half-open connection was closed before the retry.
    assert_eq!(sim.disconnect_calls(), 1);
    assert_eq!(sim.session_opens(), 1);
    assert_eq!(sim.subscription_creates(), 1);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_missing_start_ack_is_retried() {
    let (monitor, sim) = monitor_with(config(2), &["ActLineSpeed"]);
    sim.suppress_started_ack(true);
    let mut transitions = monitor.transitions();

    monitor.start().unwrap();
    expect_transition(&mut transitions, LifecycleState::Idle, LifecycleState::Starting).await;

    // Let the first attempt time out, then acknowledge the next one.
    tokio::time::timeout(WAIT, async {
        while sim.subscription_creates() < 1 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await
    .unwrap();
    sim.suppress_started_ack(false);

    wait_for_state(&monitor, LifecycleState::Running).await;
    assert_eq!(sim.subscription_creates(), 2);
    assert_eq!(sim.subscription_deletes(), 1);
    assert_eq!(sim.live_subscriptions().len(), 1);

    monitor.stop().await;
}

// =============================================================================
// Recovery
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_connection_loss_rebuilds_everything() {
    let tags = ["T2m", "RH2m", "ActLineSpeed"];
    let (monitor, sim) = monitor_with(config(3), &tags);
    let mut values = listen(&monitor, "T2m");
    let mut transitions = monitor.transitions();

    monitor.start().unwrap();
    wait_for_state(&monitor, LifecycleState::Running).await;

    let node = monitor.registry().node_id("T2m").unwrap().clone();
    let (old_sub, old_item) = sim.items_for(&node)[0];

    sim.fail_next_connects(1);
    sim.drop_connection("link down");

    expect_transition(&mut transitions, LifecycleState::Running, LifecycleState::Recovering).await;
    expect_transition(&mut transitions, LifecycleState::Recovering, LifecycleState::Running).await;

    let health = monitor.health();
    assert_eq!(health.active_items, tags.len());
    assert_eq!(health.rebuilds, 1);
    assert_eq!(sim.item_creates(), 2 * tags.len() as u64);
    assert_eq!(sim.live_items(), tags.len());
    assert_eq!(sim.session_opens(), 2);

    // A late value from the torn-down subscription is discarded.
    sim.publish_raw(old_sub, old_item, DataValue::new(1.0, at(10)));
    assert_eq!(sim.publish(&node, 2.0, at(11)), 1);

    let change = next_value(&mut values).await;
    assert_eq!(change.value, UaValue::Double(2.0));
    assert!(monitor.router().stats().stale() >= 1);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_server_termination_triggers_rebuild() {
    let (monitor, sim) = monitor_with(config(3), &["T2m"]);
    let mut transitions = monitor.transitions();

    monitor.start().unwrap();
    wait_for_state(&monitor, LifecycleState::Running).await;

    sim.terminate_subscription();
    expect_transition(&mut transitions, LifecycleState::Running, LifecycleState::Recovering).await;
    expect_transition(&mut transitions, LifecycleState::Recovering, LifecycleState::Running).await;

    assert_eq!(sim.subscription_creates(), 2);
    assert_eq!(sim.live_subscriptions().len(), 1);
    // The old session was closed before the rebuild.
    assert_eq!(sim.session_closes(), 1);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_values_queued_before_rebuild_are_not_delivered() {
    let (monitor, sim) = monitor_with(config(3), &["T2m"]);
    let gate = Arc::new(Semaphore::new(0));
    let entered = Arc::new(Notify::new());
    let (forward, mut values) = mpsc::channel(16);
    monitor
        .on_tag_changed(
            "T2m",
            Arc::new(GatedListener {
                gate: gate.clone(),
                entered: entered.clone(),
                forward,
            }),
        )
        .unwrap();
    let mut transitions = monitor.transitions();

    monitor.start().unwrap();
    wait_for_state(&monitor, LifecycleState::Running).await;
    let node = monitor.registry().node_id("T2m").unwrap().clone();

    for i in 1..=3 {
        assert_eq!(sim.publish(&node, i as f64, at(i)), 1);
    }
    tokio::time::timeout(WAIT, entered.notified())
        .await
        .expect("listener should be called");

    sim.drop_connection("link down");
    expect_transition(&mut transitions, LifecycleState::Running, LifecycleState::Recovering).await;
    expect_transition(&mut transitions, LifecycleState::Recovering, LifecycleState::Running).await;

    gate.add_permits(16);
    assert_eq!(sim.publish(&node, 10.0, at(10)), 1);

    let change = next_value(&mut values).await;
    assert_eq!(change.value, UaValue::Double(10.0));
    assert!(values.try_recv().is_err());
    assert_eq!(monitor.router().queues()[0].discarded(), 3);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_of_replaced_connection_is_ignored() {
    let (monitor, sim) = monitor_with(config(0), &["T2m"]);
    let mut transitions = monitor.transitions();

    monitor.start().unwrap();
    wait_for_state(&monitor, LifecycleState::Running).await;
    let old = sim.current_connection().expect("connected");

    // Closing the old session makes the stack report its connection as gone.
    sim.terminate_subscription();
    sim.send_connection_state(old, ConnectionState::Disconnected, Some("session closed".into()));

    expect_transition(&mut transitions, LifecycleState::Running, LifecycleState::Recovering).await;
    expect_transition(&mut transitions, LifecycleState::Recovering, LifecycleState::Running).await;

    // Let the orchestrator consume everything still queued.
    sim.send_keep_alive();
    let mut health = monitor.watch_health();
    tokio::time::timeout(WAIT, health.wait_for(|h| h.last_keep_alive.is_some()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(monitor.state(), LifecycleState::Running);
    assert_eq!(monitor.health().rebuilds, 1);
    assert_eq!(sim.connect_calls(), 2);
    assert_eq!(sim.session_opens(), 2);
    assert_eq!(sim.subscription_creates(), 2);
    assert_eq!(sim.session_closes(), 1);
    assert_eq!(sim.disconnect_calls(), 1);
    assert_ne!(sim.current_connection(), Some(old));
    assert!(sim.is_connected());

    assert!(monitor.stop().await.is_clean());
}

#[tokio::test(start_paused = true)]
async fn test_recovery_budget_spent_stops() {
    let (monitor, sim) = monitor_with(config(1), &["T2m"]);

    monitor.start().unwrap();
    wait_for_state(&monitor, LifecycleState::Running).await;

    sim.set_reachable(false);
    sim.drop_connection("link down");

    let outcome = tokio::time::timeout(WAIT, monitor.stopped()).await.unwrap();
    assert!(!outcome.is_clean());
    assert_eq!(monitor.state(), LifecycleState::Stopped);
}

// =============================================================================
// Notifications
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_out_of_order_values_are_dropped() {
    let (monitor, sim) = monitor_with(config(1), &["T2m"]);
    let mut values = listen(&monitor, "T2m");

    monitor.start().unwrap();
    wait_for_state(&monitor, LifecycleState::Running).await;
    let node = monitor.registry().node_id("T2m").unwrap().clone();

    sim.publish(&node, 1.0, at(5));
    sim.publish(&node, 2.0, at(3));
    sim.publish(&node, 3.0, at(5));
    sim.publish(&node, 4.0, at(6));

    let received = [
        next_value(&mut values).await,
        next_value(&mut values).await,
        next_value(&mut values).await,
    ];
    let seen: Vec<_> = received.iter().map(|c| c.value.clone()).collect();
    assert_eq!(
        seen,
        vec![UaValue::Double(1.0), UaValue::Double(3.0), UaValue::Double(4.0)]
    );
    assert_eq!(monitor.router().stats().out_of_order(), 1);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_keep_alive_updates_health() {
    let (monitor, sim) = monitor_with(config(1), &["T2m"]);

    monitor.start().unwrap();
    let health = wait_for_state(&monitor, LifecycleState::Running).await;
    assert!(health.last_keep_alive.is_none());

    let mut watch = monitor.watch_health();
    sim.send_keep_alive();
    let health = tokio::time::timeout(WAIT, watch.wait_for(|h| h.last_keep_alive.is_some()))
        .await
        .unwrap()
        .unwrap()
        .clone();
    assert_eq!(health.lifecycle, LifecycleState::Running);

    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_listeners_cannot_be_added_after_start() {
    let (monitor, _sim) = monitor_with(config(1), &["T2m"]);
    monitor.start().unwrap();

    assert!(monitor.on_tag_changed_fn("T2m", |_| {}).is_err());
    assert!(monitor.start().is_err());

    monitor.stop().await;
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_drains_each_layer_once() {
    let (monitor, sim) = monitor_with(config(1), &["T2m", "RH2m"]);
    let mut transitions = monitor.transitions();

    monitor.start().unwrap();
    wait_for_state(&monitor, LifecycleState::Running).await;

    let outcome = monitor.stop().await;
    assert!(outcome.is_clean());
    assert_eq!(outcome.final_state, LifecycleState::Stopped);

    expect_transition(&mut transitions, LifecycleState::Running, LifecycleState::Draining).await;
    expect_transition(&mut transitions, LifecycleState::Draining, LifecycleState::Stopped).await;

    assert_eq!(sim.item_deletes(), 2);
    assert_eq!(sim.subscription_deletes(), 1);
    assert_eq!(sim.session_closes(), 1);
    assert_eq!(sim.disconnect_calls(), 1);
    assert!(!sim.is_connected());

    // Idempotent.
    assert_eq!(monitor.stop().await, outcome);
    assert_eq!(sim.subscription_deletes(), 1);
    assert_eq!(sim.session_closes(), 1);
    assert_eq!(sim.disconnect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_recovery_backoff() {
    let config = ClientConfig::builder()
        .endpoint(ENDPOINT)
        .max_retries(5)
        .initial_delay(Duration::from_secs(30))
        .build()
        .unwrap();
    let (monitor, sim) = monitor_with(config, &["T2m"]);
    let mut transitions = monitor.transitions();

    monitor.start().unwrap();
    wait_for_state(&monitor, LifecycleState::Running).await;

    sim.set_reachable(false);
    sim.drop_connection("link down");
    expect_transition(&mut transitions, LifecycleState::Running, LifecycleState::Recovering).await;

    let started = tokio::time::Instant::now();
    let outcome = monitor.stop().await;
    assert!(outcome.is_clean());
    assert!(started.elapsed() < Duration::from_secs(30));

    expect_transition(&mut transitions, LifecycleState::Recovering, LifecycleState::Draining).await;
    expect_transition(&mut transitions, LifecycleState::Draining, LifecycleState::Stopped).await;
    assert_eq!(sim.session_opens(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_connecting() {
    let (monitor, sim) = monitor_with(config(5), &["T2m"]);
    sim.set_reachable(false);

    monitor.start().unwrap();
    wait_for_state(&monitor, LifecycleState::Starting).await;

    let outcome = monitor.stop().await;
    assert!(outcome.is_clean());
    assert_eq!(sim.session_opens(), 0);
    assert_eq!(sim.disconnect_calls(), 0);
}
