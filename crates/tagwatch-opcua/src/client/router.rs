// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Notification routing.
//!
//! The router maps a `(subscription, item)` identity to the tag that owns
//! it and hands the notification to every listener registered for that tag.
//!
//! # Delivery
//!
//! Each listener gets its own bounded [`DeliveryQueue`] drained by its own
//! task, so [`NotificationRouter::dispatch`] never waits on application
//! code. When a queue is full the [`OverflowPolicy`] decides which
//! notification is lost:
//!
//! - `DropOldest` (the default, matching `discard_oldest = true` on the
//!   monitored items) evicts the oldest queued notification, so a slow
//!   listener always sees the most recent values.
//! - `DropNewest` rejects the incoming notification.
//!
//! Either way a [`DispatchOverflowError`] is logged and counted.
//!
//! # Validity
//!
//! Notifications are discarded when their identity is not bound (for
//! example a value from a subscription that was torn down) or when their
//! source timestamp is older than the last one delivered for that item.
//!
//! Every queued notification carries the bind generation it was routed
//! under. [`NotificationRouter::invalidate`] starts a new generation: the
//! queues are purged, and a listener call still running for an older
//! generation is cancelled.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;

use super::transport::{DataValue, ItemHandle, Quality, SubscriptionHandle, UaValue};
use crate::error::{ConfigurationError, DispatchOverflowError, OpcUaResult};
use crate::registry::TagName;
use crate::types::OverflowPolicy;

// =============================================================================
// ChangeNotification
// =============================================================================

/// A value change for one tag.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    /// The tag that changed.
    pub tag: TagName,

    /// The new value.
    pub value: UaValue,

    /// When the value was produced at the source.
    pub source_timestamp: Option<DateTime<Utc>>,

    /// When the server processed the value.
    pub server_timestamp: Option<DateTime<Utc>>,

    /// Value quality.
    pub quality: Quality,
}

impl ChangeNotification {
    /// Builds a notification from a transport value.
    pub fn new(tag: TagName, value: DataValue) -> Self {
        let quality = value.quality();
        Self {
            tag,
            value: value.value,
            source_timestamp: value.source_timestamp,
            server_timestamp: value.server_timestamp,
            quality,
        }
    }
}

// =============================================================================
// TagListener
// =============================================================================

/// Receives change notifications.
///
/// Calls for one listener never overlap and arrive in queue order.
#[async_trait]
pub trait TagListener: Send + Sync + 'static {
    /// Called for every delivered notification.
    async fn on_change(&self, notification: ChangeNotification);
}

/// A listener backed by a closure.
pub struct FnListener<F> {
    f: F,
}

impl<F> FnListener<F>
where
    F: Fn(ChangeNotification) + Send + Sync + 'static,
{
    /// Wraps a closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> TagListener for FnListener<F>
where
    F: Fn(ChangeNotification) + Send + Sync + 'static,
{
    async fn on_change(&self, notification: ChangeNotification) {
        (self.f)(notification);
    }
}

/// A listener that forwards into a tokio channel.
pub struct ChannelListener {
    sender: mpsc::Sender<ChangeNotification>,
}

impl ChannelListener {
    /// Creates a channel listener.
    pub fn new(sender: mpsc::Sender<ChangeNotification>) -> Self {
        Self { sender }
    }

    /// Creates a channel listener with its receiver.
    pub fn with_channel(capacity: usize) -> (Self, mpsc::Receiver<ChangeNotification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl TagListener for ChannelListener {
    async fn on_change(&self, notification: ChangeNotification) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.sender.send(notification).await;
    }
}

// =============================================================================
// DeliveryQueue
// =============================================================================

struct Queued {
    generation: u64,
    notification: ChangeNotification,
}

/// Bounded queue between the router and one listener.
pub struct DeliveryQueue {
    label: String,
    capacity: usize,
    policy: OverflowPolicy,
    queue: Mutex<VecDeque<Queued>>,
    notify: Notify,
    generation: watch::Receiver<u64>,
    closed: AtomicBool,
    dropped: AtomicU64,
    discarded: AtomicU64,
    delivered: AtomicU64,
    listener: Arc<dyn TagListener>,
}

impl DeliveryQueue {
    fn new(
        label: impl Into<String>,
        capacity: usize,
        policy: OverflowPolicy,
        generation: watch::Receiver<u64>,
        listener: Arc<dyn TagListener>,
    ) -> Self {
        Self {
            label: label.into(),
            capacity: capacity.max(1),
            policy,
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            notify: Notify::new(),
            generation,
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            listener,
        }
    }

    /// Enqueues without waiting.
    fn push(
        &self,
        generation: u64,
        notification: ChangeNotification,
    ) -> Result<(), DispatchOverflowError> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }

        let overflow = {
            let mut queue = self.queue.lock();
            let entry = Queued {
                generation,
                notification,
            };
            if queue.len() < self.capacity {
                queue.push_back(entry);
                None
            } else {
                let tag = entry.notification.tag.clone();
                if self.policy == OverflowPolicy::DropOldest {
                    queue.pop_front();
                    queue.push_back(entry);
                }
                let dropped_total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                Some(DispatchOverflowError {
                    tag,
                    capacity: self.capacity,
                    policy: self.policy,
                    dropped_total,
                })
            }
        };

        self.notify.notify_one();
        overflow.map_or(Ok(()), Err)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    /// Empties the queue. Returns how many notifications were dropped.
    fn purge(&self) -> usize {
        let purged = {
            let mut queue = self.queue.lock();
            let purged = queue.len();
            queue.clear();
            purged
        };
        self.discarded.fetch_add(purged as u64, Ordering::Relaxed);
        purged
    }

    /// Drains the queue into the listener until closed and empty.
    async fn run(self: Arc<Self>) {
        let mut generation = self.generation.clone();
        loop {
            let next = self.queue.lock().pop_front();
            match next {
                Some(entry) => {
                    if entry.generation != *generation.borrow_and_update() {
                        self.discarded.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    tokio::select! {
                        biased;
                        _ = superseded(&mut generation) => {
                            self.discarded.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(listener = %self.label, "Cancelled delivery of a superseded notification");
                        }
                        _ = self.listener.on_change(entry.notification) => {
                            self.delivered.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                None if self.closed.load(Ordering::Acquire) => break,
                None => self.notify.notified().await,
            }
        }
        tracing::trace!(listener = %self.label, "Delivery worker stopped");
    }

    /// Notifications currently queued.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Notifications handed to the listener.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Notifications lost to overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Notifications dropped because a rebuild superseded them.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

/// Resolves once a newer generation is published.
async fn superseded(generation: &mut watch::Receiver<u64>) {
    if generation.changed().await.is_err() {
        // The router is gone, so no newer generation can appear.
        std::future::pending::<()>().await;
    }
}

impl fmt::Debug for DeliveryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryQueue")
            .field("label", &self.label)
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// DispatchOutcome
// =============================================================================

/// What happened to one notification.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Queued for every listener of the tag.
    Delivered {
        /// The tag.
        tag: TagName,
        /// Source timestamp of the value.
        source_timestamp: Option<DateTime<Utc>>,
        /// Listener queues that dropped a notification to make room.
        overflowed: usize,
    },
    /// The identity is not bound to any tag.
    Stale,
    /// Older than the last value delivered for the item.
    OutOfOrder {
        /// The tag.
        tag: TagName,
    },
    /// No listener is registered for the tag.
    Unlistened {
        /// The tag.
        tag: TagName,
    },
}

// =============================================================================
// RouterStats
// =============================================================================

/// Counters for routing decisions.
#[derive(Debug, Default)]
pub struct RouterStats {
    dispatched: AtomicU64,
    stale: AtomicU64,
    out_of_order: AtomicU64,
    unlistened: AtomicU64,
    overflows: AtomicU64,
    purged: AtomicU64,
}

impl RouterStats {
    /// Notifications queued for at least one listener.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Notifications with an unbound identity.
    pub fn stale(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }

    /// Notifications older than the item's cursor.
    pub fn out_of_order(&self) -> u64 {
        self.out_of_order.load(Ordering::Relaxed)
    }

    /// Notifications for tags nobody listens to.
    pub fn unlistened(&self) -> u64 {
        self.unlistened.load(Ordering::Relaxed)
    }

    /// Notifications dropped by full queues.
    pub fn overflows(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Queued notifications dropped by [`NotificationRouter::invalidate`].
    pub fn purged(&self) -> u64 {
        self.purged.load(Ordering::Relaxed)
    }
}

// =============================================================================
// NotificationRouter
// =============================================================================

#[derive(Debug)]
struct Binding {
    tag: TagName,
    cursor: Option<DateTime<Utc>>,
}

/// Routes transport notifications to tag listeners.
#[derive(Debug)]
pub struct NotificationRouter {
    capacity: usize,
    policy: OverflowPolicy,
    queues: RwLock<Vec<Arc<DeliveryQueue>>>,
    routes: RwLock<HashMap<TagName, Vec<usize>>>,
    wildcard: RwLock<Vec<usize>>,
    bindings: Mutex<HashMap<(SubscriptionHandle, ItemHandle), Binding>>,
    generation: watch::Sender<u64>,
    started: AtomicBool,
    stats: RouterStats,
}

impl NotificationRouter {
    /// Creates a router whose listener queues hold `capacity` notifications.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            capacity,
            policy,
            queues: RwLock::new(Vec::new()),
            routes: RwLock::new(HashMap::new()),
            wildcard: RwLock::new(Vec::new()),
            bindings: Mutex::new(HashMap::new()),
            generation: watch::channel(0).0,
            started: AtomicBool::new(false),
            stats: RouterStats::default(),
        }
    }

    /// The overflow policy.
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Routing statistics.
    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    fn add_queue(&self, label: String, listener: Arc<dyn TagListener>) -> OpcUaResult<usize> {
        if self.started.load(Ordering::Acquire) {
            return Err(ConfigurationError::InvalidState {
                operation: "register a listener",
                state: "running".to_string(),
            }
            .into());
        }
        let mut queues = self.queues.write();
        queues.push(Arc::new(DeliveryQueue::new(
            label,
            self.capacity,
            self.policy,
            self.generation.subscribe(),
            listener,
        )));
        Ok(queues.len() - 1)
    }

    /// Registers a listener for one tag. Only allowed before the workers start.
    pub fn register(&self, tag: TagName, listener: Arc<dyn TagListener>) -> OpcUaResult<()> {
        let index = self.add_queue(tag.to_string(), listener)?;
        self.routes.write().entry(tag).or_default().push(index);
        Ok(())
    }

    /// Registers a listener for every tag.
    pub fn register_all(&self, listener: Arc<dyn TagListener>) -> OpcUaResult<()> {
        let index = self.add_queue("*".to_string(), listener)?;
        self.wildcard.write().push(index);
        Ok(())
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.queues.read().len()
    }

    /// Returns `true` if a listener would receive notifications for `tag`.
    pub fn has_listener(&self, tag: &str) -> bool {
        !self.wildcard.read().is_empty() || self.routes.read().contains_key(tag)
    }

    /// Spawns one delivery task per listener.
    pub fn spawn_workers(&self) -> Vec<JoinHandle<()>> {
        self.started.store(true, Ordering::Release);
        self.queues
            .read()
            .iter()
            .map(|queue| tokio::spawn(queue.clone().run()))
            .collect()
    }

    /// Replaces all bindings with those of `subscription`.
    pub fn bind_subscription(
        &self,
        subscription: SubscriptionHandle,
        items: impl IntoIterator<Item = (ItemHandle, TagName)>,
    ) {
        let bindings: HashMap<_, _> = items
            .into_iter()
            .map(|(item, tag)| ((subscription, item), Binding { tag, cursor: None }))
            .collect();
        tracing::debug!(subscription = %subscription, items = bindings.len(), "Router bound");
        *self.bindings.lock() = bindings;
    }

    /// Drops every binding. Returns how many were removed.
    pub fn clear_bindings(&self) -> usize {
        let mut bindings = self.bindings.lock();
        let count = bindings.len();
        bindings.clear();
        count
    }

    /// Drops every binding and every notification not yet delivered.
    ///
    /// A listener call already running is cancelled. Returns how many
    /// bindings were removed.
    pub fn invalidate(&self) -> usize {
        let cleared = self.clear_bindings();
        self.generation.send_modify(|generation| *generation += 1);

        let purged: usize = self.queues.read().iter().map(|queue| queue.purge()).sum();
        if purged > 0 {
            self.stats.purged.fetch_add(purged as u64, Ordering::Relaxed);
            tracing::debug!(purged, "Dropped notifications queued before the rebuild");
        }
        cleared
    }

    /// The current bind generation.
    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Number of bound identities.
    pub fn bound_items(&self) -> usize {
        self.bindings.lock().len()
    }

    /// Routes one notification. Never waits on a listener.
    pub fn dispatch(
        &self,
        subscription: SubscriptionHandle,
        item: ItemHandle,
        value: DataValue,
    ) -> DispatchOutcome {
        let tag = {
            let mut bindings = self.bindings.lock();
            let Some(binding) = bindings.get_mut(&(subscription, item)) else {
                self.stats.stale.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(subscription = %subscription, item = %item, "Discarding stale notification");
                return DispatchOutcome::Stale;
            };

            if let (Some(ts), Some(cursor)) = (value.source_timestamp, binding.cursor) {
                if ts < cursor {
                    self.stats.out_of_order.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(tag = %binding.tag, source_timestamp = %ts, cursor = %cursor, "Discarding out-of-order notification");
                    return DispatchOutcome::OutOfOrder {
                        tag: binding.tag.clone(),
                    };
                }
            }
            if value.source_timestamp.is_some() {
                binding.cursor = value.source_timestamp;
            }
            binding.tag.clone()
        };

        let targets: Vec<usize> = {
            let routes = self.routes.read();
            let wildcard = self.wildcard.read();
            routes
                .get(&tag)
                .into_iter()
                .flatten()
                .chain(wildcard.iter())
                .copied()
                .collect()
        };
        if targets.is_empty() {
            self.stats.unlistened.fetch_add(1, Ordering::Relaxed);
            return DispatchOutcome::Unlistened { tag };
        }

        let notification = ChangeNotification::new(tag.clone(), value);
        let source_timestamp = notification.source_timestamp;
        tracing::trace!(tag = %tag, value = %notification.value, listeners = targets.len(), "Routing notification");

        let generation = self.generation();
        let queues = self.queues.read();
        let mut overflowed = 0;
        for index in targets {
            if let Some(queue) = queues.get(index) {
                if let Err(e) = queue.push(generation, notification.clone()) {
                    overflowed += 1;
                    self.stats.overflows.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(listener = %queue.label, error = %e, "Notification dropped");
                }
            }
        }

        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        DispatchOutcome::Delivered {
            tag,
            source_timestamp,
            overflowed,
        }
    }

    /// Closes every queue. Workers deliver what is queued, then exit.
    pub fn shutdown(&self) {
        self.clear_bindings();
        for queue in self.queues.read().iter() {
            queue.close();
        }
    }

    /// Snapshot of per-listener queues.
    pub fn queues(&self) -> Vec<Arc<DeliveryQueue>> {
        self.queues.read().clone()
    }
}
