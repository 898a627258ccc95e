// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA subscription controller.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            SubscriptionController            │
//! │   (at most one subscription per session)     │
//! └──────────────────────────────────────────────┘
//!                        │
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │  ActiveSubscription                          │
//! │  Created → Active → Terminating → Terminated │
//! └──────────────────────────────────────────────┘
//!                        │
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │  MonitoredItems (one per TagName)            │
//! │  [ActLineSpeed, ActThermo1, PIR_1_mA, ...]   │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Monitored items are created one by one. A rejected tag is reported in
//! the [`MonitoredItemReport`] and stays unmonitored until the next
//! rebuild; the other tags are unaffected.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::SessionInfo;
use super::transport::{ItemHandle, OpcUaTransport, SessionHandle, SubscriptionHandle};
use crate::error::{MonitoredItemError, OpcUaError, SubscriptionError};
use crate::registry::TagName;
use crate::types::{MonitoredItemSettings, NodeId, SubscriptionSettings};

// =============================================================================
// SubscriptionState
// =============================================================================

/// State of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Created, waiting for the server's "started" acknowledgement.
    Created,

    /// Acknowledged and publishing.
    Active,

    /// Items and subscription are being deleted.
    Terminating,

    /// Gone.
    Terminated,
}

impl SubscriptionState {
    /// Returns `true` if the subscription is active.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns `true` if the subscription still exists on the server.
    #[inline]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Created | Self::Active)
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Active => write!(f, "Active"),
            Self::Terminating => write!(f, "Terminating"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

// =============================================================================
// MonitoredItem
// =============================================================================

/// A monitored item registered for one tag.
#[derive(Debug, Clone)]
pub struct MonitoredItem {
    /// The tag.
    pub tag: TagName,

    /// Node being monitored.
    pub node_id: NodeId,

    /// Item handle assigned by the transport.
    pub handle: ItemHandle,

    /// Sampling parameters.
    pub settings: MonitoredItemSettings,

    /// Source timestamp of the most recent delivered notification.
    pub last_source_timestamp: Option<DateTime<Utc>>,

    /// Delivered notifications.
    pub notifications: u64,

    /// When the item was created.
    pub created_at: Instant,
}

impl MonitoredItem {
    /// Advances the notification cursor.
    pub fn record_notification(&mut self, source_timestamp: Option<DateTime<Utc>>) {
        self.notifications += 1;
        if source_timestamp > self.last_source_timestamp {
            self.last_source_timestamp = source_timestamp;
        }
    }
}

// =============================================================================
// ActiveSubscription
// =============================================================================

/// A subscription bound to one session, with its monitored items.
#[derive(Debug)]
pub struct ActiveSubscription {
    /// Subscription handle.
    pub handle: SubscriptionHandle,

    /// The owning session.
    pub session: SessionHandle,

    /// Subscription parameters.
    pub settings: SubscriptionSettings,

    /// Current state.
    pub state: SubscriptionState,

    /// Items keyed by tag.
    pub items: BTreeMap<TagName, MonitoredItem>,

    /// When the subscription was created.
    pub created_at: Instant,

    /// When the last keep-alive arrived.
    pub last_keep_alive: Option<Instant>,

    /// Keep-alives received.
    pub keep_alive_count: u64,

    by_handle: HashMap<ItemHandle, TagName>,
}

impl ActiveSubscription {
    /// Number of monitored items.
    #[inline]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Looks up the item for a tag.
    pub fn item(&self, tag: &str) -> Option<&MonitoredItem> {
        self.items.get(tag)
    }

    /// Looks up an item by its handle.
    pub fn item_by_handle_mut(&mut self, handle: ItemHandle) -> Option<&mut MonitoredItem> {
        let tag = self.by_handle.get(&handle)?;
        self.items.get_mut(tag)
    }

    /// `(item handle, tag)` pairs for the router.
    pub fn bindings(&self) -> impl Iterator<Item = (ItemHandle, TagName)> + '_ {
        self.items.values().map(|item| (item.handle, item.tag.clone()))
    }
}

// =============================================================================
// MonitoredItemReport
// =============================================================================

/// Outcome of registering monitored items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitoredItemReport {
    /// Tags that are now monitored.
    pub created: Vec<TagName>,

    /// Per-tag failures.
    pub failed: Vec<MonitoredItemError>,
}

impl MonitoredItemReport {
    /// Returns `true` if every tag was registered.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Tags that could not be monitored.
    pub fn failed_tags(&self) -> Vec<TagName> {
        self.failed.iter().map(|e| e.tag().clone()).collect()
    }
}

// =============================================================================
// SubscriptionStats
// =============================================================================

/// Counters for subscription activity.
#[derive(Debug, Default)]
pub struct SubscriptionStats {
    created: AtomicU64,
    terminated: AtomicU64,
    discarded: AtomicU64,
    items_created: AtomicU64,
    items_failed: AtomicU64,
    keep_alives: AtomicU64,
}

impl SubscriptionStats {
    /// Subscriptions created.
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Subscriptions terminated gracefully.
    pub fn terminated(&self) -> u64 {
        self.terminated.load(Ordering::Relaxed)
    }

    /// Subscriptions dropped after a connection loss.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Monitored items created.
    pub fn items_created(&self) -> u64 {
        self.items_created.load(Ordering::Relaxed)
    }

    /// Monitored items rejected.
    pub fn items_failed(&self) -> u64 {
        self.items_failed.load(Ordering::Relaxed)
    }

    /// Keep-alives received.
    pub fn keep_alives(&self) -> u64 {
        self.keep_alives.load(Ordering::Relaxed)
    }
}

// =============================================================================
// SubscriptionController
// =============================================================================

/// Creates and tears down the subscription and its monitored items.
#[derive(Debug, Default)]
pub struct SubscriptionController {
    live: Option<(SessionHandle, SubscriptionHandle)>,
    stats: Arc<SubscriptionStats>,
}

impl SubscriptionController {
    /// Creates a controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared statistics.
    pub fn stats(&self) -> Arc<SubscriptionStats> {
        self.stats.clone()
    }

    /// Creates the subscription for `session`.
    ///
    /// # Errors
    ///
    /// [`SubscriptionError::AlreadyExists`] if the session already has one.
    pub async fn create_subscription<T: OpcUaTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        session: &SessionInfo,
        settings: &SubscriptionSettings,
    ) -> Result<ActiveSubscription, SubscriptionError> {
        if let Some((owner, existing)) = self.live {
            if owner == session.handle {
                return Err(SubscriptionError::AlreadyExists {
                    session: owner,
                    existing,
                });
            }
        }

        let handle = transport
            .create_subscription(session.handle, settings)
            .await
            .map_err(|e| match e {
                OpcUaError::Subscription(inner) => inner,
                other => SubscriptionError::creation_failed(other.to_string()),
            })?;

        self.live = Some((session.handle, handle));
        self.stats.created.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            subscription = %handle,
            session = %session.handle,
            publishing_interval_ms = settings.publishing_interval.as_millis() as u64,
            "Subscription created"
        );

        Ok(ActiveSubscription {
            handle,
            session: session.handle,
            settings: settings.clone(),
            state: SubscriptionState::Created,
            items: BTreeMap::new(),
            created_at: Instant::now(),
            last_keep_alive: None,
            keep_alive_count: 0,
            by_handle: HashMap::new(),
        })
    }

    /// Registers one monitored item per tag.
    ///
    /// Each tag is attempted independently; failures are collected in the
    /// report and never abort the remaining tags.
    pub async fn add_monitored_items<'a, T, I>(
        &self,
        transport: &mut T,
        subscription: &mut ActiveSubscription,
        tags: I,
        settings: &MonitoredItemSettings,
    ) -> MonitoredItemReport
    where
        T: OpcUaTransport + ?Sized,
        I: IntoIterator<Item = (&'a TagName, &'a NodeId)>,
    {
        let mut report = MonitoredItemReport::default();

        for (tag, node_id) in tags {
            if subscription.items.contains_key(tag) {
                report.failed.push(MonitoredItemError::Duplicate { tag: tag.clone() });
                continue;
            }

            match transport
                .create_monitored_item(subscription.handle, node_id, settings)
                .await
            {
                Ok(handle) => {
                    tracing::trace!(tag = %tag, node_id = %node_id, item = %handle, "Monitored item created");
                    subscription.by_handle.insert(handle, tag.clone());
                    subscription.items.insert(
                        tag.clone(),
                        MonitoredItem {
                            tag: tag.clone(),
                            node_id: node_id.clone(),
                            handle,
                            settings: settings.clone(),
                            last_source_timestamp: None,
                            notifications: 0,
                            created_at: Instant::now(),
                        },
                    );
                    report.created.push(tag.clone());
                }
                Err(e) => {
                    let error = MonitoredItemError::rejected(tag.clone(), node_id.to_string(), e.to_string());
                    tracing::warn!(tag = %tag, error = %error, "Tag will not be monitored");
                    report.failed.push(error);
                }
            }
        }

        self.stats
            .items_created
            .fetch_add(report.created.len() as u64, Ordering::Relaxed);
        self.stats
            .items_failed
            .fetch_add(report.failed.len() as u64, Ordering::Relaxed);
        tracing::info!(
            subscription = %subscription.handle,
            created = report.created.len(),
            failed = report.failed.len(),
            "Monitored items registered"
        );
        report
    }

    /// Moves a subscription from Created to Active.
    ///
    /// Returns `false` if it was not waiting for the acknowledgement.
    pub fn mark_started(&self, subscription: &mut ActiveSubscription) -> bool {
        if subscription.state != SubscriptionState::Created {
            return false;
        }
        subscription.state = SubscriptionState::Active;
        tracing::info!(
            subscription = %subscription.handle,
            items = subscription.item_count(),
            "Subscription started"
        );
        true
    }

    /// Records a keep-alive.
    pub fn record_keep_alive(&self, subscription: &mut ActiveSubscription) {
        subscription.last_keep_alive = Some(Instant::now());
        subscription.keep_alive_count += 1;
        self.stats.keep_alives.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(subscription = %subscription.handle, "Keep-alive");
    }

    /// Deletes every monitored item, then the subscription.
    ///
    /// Never fails. `None` or an already terminated subscription is a no-op.
    pub async fn terminate<T: OpcUaTransport + ?Sized>(
        &mut self,
        transport: &mut T,
        subscription: Option<ActiveSubscription>,
    ) {
        let Some(mut subscription) = subscription else {
            tracing::debug!("No subscription to terminate");
            return;
        };
        if self.live.map(|(_, h)| h) == Some(subscription.handle) {
            self.live = None;
        }
        if !subscription.state.is_live() {
            return;
        }

        subscription.state = SubscriptionState::Terminating;
        let handle = subscription.handle;

        for item in std::mem::take(&mut subscription.items).into_values() {
            if let Err(e) = transport.delete_monitored_item(handle, item.handle).await {
                let error = MonitoredItemError::DeleteFailed {
                    tag: item.tag,
                    reason: e.to_string(),
                };
                tracing::warn!(subscription = %handle, error = %error, "Continuing teardown");
            }
        }
        subscription.by_handle.clear();

        match transport.delete_subscription(handle).await {
            Ok(()) => {
                self.stats.terminated.fetch_add(1, Ordering::Relaxed);
                tracing::info!(subscription = %handle, "Subscription terminated");
            }
            Err(e) => e.log("Subscription delete failed"),
        }
        subscription.state = SubscriptionState::Terminated;
    }

    /// Forgets a subscription whose session is gone.
    pub fn discard(&mut self, subscription: Option<ActiveSubscription>) {
        self.live = None;
        if let Some(subscription) = subscription {
            self.stats.discarded.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                subscription = %subscription.handle,
                items = subscription.item_count(),
                "Subscription discarded"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::session::SessionManager;
    use crate::client::sim::{SimulatedTransport, SimulatorHandle};
    use crate::client::transport::ConnectionState;
    use crate::registry::TagRegistry;

    const ENDPOINT: &str = "opc.tcp://sim:4840";

    async fn session() -> (SimulatedTransport, SimulatorHandle, SessionInfo) {
        let (mut transport, sim) = SimulatedTransport::new(ENDPOINT);
        let conn = transport.connect(ENDPOINT).await.unwrap();
        let session = SessionManager::new()
            .open(&mut transport, conn, ConnectionState::Connected)
            .await
            .unwrap();
        (transport, sim, session)
    }

    #[tokio::test]
    async fn test_create_and_register_items() {
        let (mut transport, sim, session) = session().await;
        let registry = TagRegistry::from_names(4, ["ActLineSpeed", "ActThermo1"]).unwrap();
        let mut controller = SubscriptionController::new();

        let mut sub = controller
            .create_subscription(&mut transport, &session, &SubscriptionSettings::default())
            .await
            .unwrap();
        assert_eq!(sub.state, SubscriptionState::Created);

        let report = controller
            .add_monitored_items(&mut transport, &mut sub, registry.iter(), &MonitoredItemSettings::default())
            .await;
        assert!(report.is_complete());
        assert_eq!(sub.item_count(), 2);
        assert_eq!(sim.live_items(), 2);

        assert!(controller.mark_started(&mut sub));
        assert!(!controller.mark_started(&mut sub));
        assert!(sub.state.is_active());
    }

    #[tokio::test]
    async fn test_one_subscription_per_session() {
        let (mut transport, _sim, session) = session().await;
        let mut controller = SubscriptionController::new();
        let settings = SubscriptionSettings::default();

        let first = controller
            .create_subscription(&mut transport, &session, &settings)
            .await
            .unwrap();
        let err = controller
            .create_subscription(&mut transport, &session, &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::AlreadyExists { existing, .. } if existing == first.handle));

        controller.discard(Some(first));
        assert!(controller
            .create_subscription(&mut transport, &session, &settings)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_partial_item_failure() {
        let (mut transport, sim, session) = session().await;
        sim.reject_node(NodeId::string(4, "ActThermo2"));
        let registry = TagRegistry::from_names(4, ["ActThermo1", "ActThermo2", "ActThermo3"]).unwrap();
        let mut controller = SubscriptionController::new();

        let mut sub = controller
            .create_subscription(&mut transport, &session, &SubscriptionSettings::default())
            .await
            .unwrap();
        let report = controller
            .add_monitored_items(&mut transport, &mut sub, registry.iter(), &MonitoredItemSettings::default())
            .await;

        assert_eq!(report.created.len(), 2);
        assert_eq!(report.failed_tags(), vec![TagName::new("ActThermo2")]);
        assert!(sub.item("ActThermo3").is_some());
        assert!(sub.item("ActThermo2").is_none());
    }

    #[tokio::test]
    async fn test_duplicate_tag_is_rejected_per_item() {
        let (mut transport, _sim, session) = session().await;
        let tag = TagName::new("ActLineSpeed");
        let node = NodeId::string(4, "ActLineSpeed");
        let mut controller = SubscriptionController::new();

        let mut sub = controller
            .create_subscription(&mut transport, &session, &SubscriptionSettings::default())
            .await
            .unwrap();
        let report = controller
            .add_monitored_items(
                &mut transport,
                &mut sub,
                [(&tag, &node), (&tag, &node)],
                &MonitoredItemSettings::default(),
            )
            .await;

        assert_eq!(report.created.len(), 1);
        assert!(matches!(report.failed[0], MonitoredItemError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let (mut transport, sim, session) = session().await;
        let registry = TagRegistry::from_names(4, ["ActLineSpeed"]).unwrap();
        let mut controller = SubscriptionController::new();

        let mut sub = controller
            .create_subscription(&mut transport, &session, &SubscriptionSettings::default())
            .await
            .unwrap();
        controller
            .add_monitored_items(&mut transport, &mut sub, registry.iter(), &MonitoredItemSettings::default())
            .await;

        controller.terminate(&mut transport, Some(sub)).await;
        controller.terminate(&mut transport, None).await;

        assert_eq!(sim.item_deletes(), 1);
        assert_eq!(sim.subscription_deletes(), 1);
        assert_eq!(sim.live_items(), 0);
        assert_eq!(controller.stats().terminated(), 1);
    }

    #[tokio::test]
    async fn test_terminate_on_dead_connection_does_not_fail() {
        let (mut transport, sim, session) = session().await;
        let mut controller = SubscriptionController::new();
        let sub = controller
            .create_subscription(&mut transport, &session, &SubscriptionSettings::default())
            .await
            .unwrap();

        sim.drop_connection("gone");
        controller.terminate(&mut transport, Some(sub)).await;
        assert_eq!(controller.stats().terminated(), 0);
    }

    #[test]
    fn test_item_cursor_never_moves_back() {
        let mut item = MonitoredItem {
            tag: TagName::new("ActEncoderIn"),
            node_id: NodeId::string(4, "ActEncoderIn"),
            handle: ItemHandle(1),
            settings: MonitoredItemSettings::default(),
            last_source_timestamp: None,
            notifications: 0,
            created_at: Instant::now(),
        };
        let later = Utc::now();
        let earlier = later - chrono::Duration::seconds(1);

        item.record_notification(Some(later));
        item.record_notification(Some(earlier));
        assert_eq!(item.last_source_timestamp, Some(later));
        assert_eq!(item.notifications, 2);
    }
}
