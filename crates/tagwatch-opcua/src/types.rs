// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Identifier and configuration types.
//!
//! - **NodeId**: numeric and string node identifiers with `ns=..;s=..` parsing
//! - **SecurityMode/Policy**: message security selection
//! - **RetryConfig**: connection retry budget and backoff
//! - **SubscriptionSettings / MonitoredItemSettings**: fixed per-process
//!   subscription and sampling parameters
//! - **DispatchSettings**: listener queue sizing
//! - **ClientConfig**: everything above plus the endpoint, with a builder
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use tagwatch_opcua::types::{ClientConfig, NodeId};
//!
//! let node_id: NodeId = "ns=4;s=ActLineSpeed".parse().unwrap();
//! assert_eq!(node_id, NodeId::string(4, "ActLineSpeed"));
//!
//! let config = ClientConfig::builder()
//!     .endpoint("opc.tcp://172.30.10.2:4840")
//!     .max_retries(1)
//!     .initial_delay(Duration::from_secs(1))
//!     .build()
//!     .unwrap();
//! assert_eq!(config.connection.max_retries, 1);
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, OpcUaError, OpcUaResult};

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA node identifier.
///
/// Only numeric and string identifiers are needed to address tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a numeric node ID.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Returns `true` for string identifiers.
    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self.identifier, NodeIdentifier::String(_))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index == 0 {
            write!(f, "{}", self.identifier)
        } else {
            write!(f, "ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl FromStr for NodeId {
    type Err = OpcUaError;

    /// Parses `ns=4;s=Name`, `ns=2;i=1001`, `s=Name` or `i=85`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: &str| {
            OpcUaError::configuration(ConfigurationError::invalid_node_id(s, reason))
        };

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns, id) = rest
                    .split_once(';')
                    .ok_or_else(|| invalid("Missing identifier after namespace"))?;
                let ns: u16 = ns.parse().map_err(|_| invalid("Invalid namespace index"))?;
                (ns, id)
            }
            None => (0, s),
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            NodeIdentifier::Numeric(id.parse().map_err(|_| invalid("Invalid numeric identifier"))?)
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            if id.is_empty() {
                return Err(invalid("Empty string identifier"));
            }
            NodeIdentifier::String(id.to_string())
        } else {
            return Err(invalid("Unknown identifier type. Expected i= or s="));
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

impl Serialize for NodeId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The identifier part of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),
    /// String identifier.
    String(String),
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={}", v),
            Self::String(v) => write!(f, "s={}", v),
        }
    }
}

// =============================================================================
// SecurityMode / SecurityPolicy
// =============================================================================

/// OPC UA message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityMode {
    /// No security.
    #[default]
    None,
    /// Messages are signed.
    Sign,
    /// Messages are signed and encrypted.
    SignAndEncrypt,
}

impl SecurityMode {
    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Sign => "Sign",
            Self::SignAndEncrypt => "SignAndEncrypt",
        }
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// OPC UA security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecurityPolicy {
    /// No security policy.
    #[default]
    None,
    /// Basic256Sha256.
    Basic256Sha256,
    /// Aes128Sha256RsaOaep.
    Aes128Sha256RsaOaep,
    /// Aes256Sha256RsaPss.
    Aes256Sha256RsaPss,
}

impl SecurityPolicy {
    /// Returns the OPC UA policy URI.
    pub const fn uri(&self) -> &'static str {
        match self {
            Self::None => "http://opcfoundation.org/UA/SecurityPolicy#None",
            Self::Basic256Sha256 => "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256",
            Self::Aes128Sha256RsaOaep => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep"
            }
            Self::Aes256Sha256RsaPss => {
                "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss"
            }
        }
    }

    /// Returns the short name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Basic256Sha256 => "Basic256Sha256",
            Self::Aes128Sha256RsaOaep => "Aes128Sha256RsaOaep",
            Self::Aes256Sha256RsaPss => "Aes256Sha256RsaPss",
        }
    }
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// RetryStrategy / RetryConfig
// =============================================================================

/// Backoff curve between connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Fixed delay between retries.
    Fixed,

    /// Linear backoff (delay * attempt).
    Linear,

    /// Exponential backoff (delay * 2^(attempt - 1)).
    #[default]
    Exponential,
}

impl RetryStrategy {
    /// Calculates the un-capped delay before retry number `retry` (1-based).
    pub fn delay(&self, initial_delay: Duration, retry: u32) -> Duration {
        let retry = retry.max(1);
        let factor = match self {
            Self::Fixed => Some(1),
            Self::Linear => Some(retry),
            Self::Exponential => 2u32.checked_pow(retry - 1),
        };
        factor
            .and_then(|factor| initial_delay.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Linear => write!(f, "linear"),
            Self::Exponential => write!(f, "exponential"),
        }
    }
}

/// Retry budget and backoff for connecting and rebuilding.
///
/// `max_retries` counts retries after the first attempt, so a value of 1
/// means two attempts in total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry.
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Upper bound for any single delay.
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,

    /// Maximum number of retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff curve.
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Jitter factor (0.0 to 1.0) applied to each delay.
    #[serde(default)]
    pub jitter: f64,

    /// Ignore `max_retries` and keep retrying.
    #[serde(default)]
    pub retry_indefinitely: bool,
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retries() -> u32 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            max_retries: default_max_retries(),
            strategy: RetryStrategy::default(),
            jitter: 0.0,
            retry_indefinitely: false,
        }
    }
}

impl RetryConfig {
    /// Creates a retry configuration with the given budget.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Disables retries.
    pub fn no_retry() -> Self {
        Self::new(0)
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the retry strategy.
    pub fn with_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the jitter factor.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Retries without a budget.
    pub fn indefinitely(mut self) -> Self {
        self.retry_indefinitely = true;
        self
    }

    /// Returns `true` if retry number `retry` (1-based) is within budget.
    pub fn allows_retry(&self, retry: u32) -> bool {
        self.retry_indefinitely || retry <= self.max_retries
    }

    /// Returns the total number of attempts, or `None` when unbounded.
    pub fn max_attempts(&self) -> Option<u32> {
        (!self.retry_indefinitely).then(|| self.max_retries.saturating_add(1))
    }

    /// Calculates the delay before retry number `retry` (1-based).
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let delay = self.strategy.delay(self.initial_delay, retry).min(self.max_delay);
        if self.jitter <= 0.0 || delay.is_zero() {
            return delay;
        }

        let secs = delay.as_secs_f64();
        let range = secs * self.jitter;
        let jittered = secs + rand::thread_rng().gen_range(-range..=range);
        Duration::from_secs_f64(jittered.clamp(0.0, self.max_delay.as_secs_f64()))
    }
}

// =============================================================================
// SubscriptionSettings
// =============================================================================

/// Subscription parameters, fixed for the process lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSettings {
    /// Publishing interval.
    #[serde(default = "default_publishing_interval", with = "humantime_serde")]
    pub publishing_interval: Duration,

    /// Publishing intervals without a publish before the server drops the subscription.
    #[serde(default = "default_lifetime_count")]
    pub lifetime_count: u32,

    /// Publishing intervals without data before a keep-alive is sent.
    #[serde(default = "default_keepalive_count")]
    pub keepalive_count: u32,

    /// Maximum notifications per publish.
    #[serde(default = "default_max_notifications")]
    pub max_notifications_per_publish: u32,

    /// Priority (higher is more important).
    #[serde(default = "default_priority")]
    pub priority: u8,

    /// Publishing enabled.
    #[serde(default = "default_true")]
    pub publishing_enabled: bool,
}

fn default_publishing_interval() -> Duration {
    Duration::from_millis(5000)
}

fn default_lifetime_count() -> u32 {
    100
}

fn default_keepalive_count() -> u32 {
    10
}

fn default_max_notifications() -> u32 {
    100
}

fn default_priority() -> u8 {
    10
}

fn default_true() -> bool {
    true
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            publishing_interval: default_publishing_interval(),
            lifetime_count: default_lifetime_count(),
            keepalive_count: default_keepalive_count(),
            max_notifications_per_publish: default_max_notifications(),
            priority: default_priority(),
            publishing_enabled: true,
        }
    }
}

impl SubscriptionSettings {
    /// Creates settings with a custom publishing interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            publishing_interval: interval,
            ..Default::default()
        }
    }

    /// Time the server keeps a silent subscription alive.
    pub fn lifetime(&self) -> Duration {
        self.publishing_interval
            .checked_mul(self.lifetime_count)
            .unwrap_or(Duration::MAX)
    }

    /// Time between keep-alives on an idle subscription.
    pub fn keepalive_interval(&self) -> Duration {
        self.publishing_interval
            .checked_mul(self.keepalive_count)
            .unwrap_or(Duration::MAX)
    }
}

// =============================================================================
// MonitoredItemSettings
// =============================================================================

/// Sampling parameters applied to every monitored item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredItemSettings {
    /// Sampling interval.
    #[serde(default = "default_sampling_interval", with = "humantime_serde")]
    pub sampling_interval: Duration,

    /// Server-side queue size.
    #[serde(default = "default_queue_size")]
    pub queue_size: u32,

    /// Discard the oldest value when the queue is full.
    #[serde(default = "default_true")]
    pub discard_oldest: bool,
}

fn default_sampling_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_queue_size() -> u32 {
    10
}

impl Default for MonitoredItemSettings {
    fn default() -> Self {
        Self {
            sampling_interval: default_sampling_interval(),
            queue_size: default_queue_size(),
            discard_oldest: true,
        }
    }
}

impl MonitoredItemSettings {
    /// Creates settings with a custom sampling interval.
    pub fn with_sampling_interval(interval: Duration) -> Self {
        Self {
            sampling_interval: interval,
            ..Default::default()
        }
    }

    /// The overflow policy matching `discard_oldest`.
    pub fn overflow_policy(&self) -> OverflowPolicy {
        if self.discard_oldest {
            OverflowPolicy::DropOldest
        } else {
            OverflowPolicy::DropNewest
        }
    }
}

// =============================================================================
// OverflowPolicy / DispatchSettings
// =============================================================================

/// Which notification a full listener queue gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued notification to make room.
    #[default]
    DropOldest,
    /// Reject the incoming notification.
    DropNewest,
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DropOldest => write!(f, "drop-oldest"),
            Self::DropNewest => write!(f, "drop-newest"),
        }
    }
}

/// Listener queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Notifications buffered per listener before the overflow policy applies.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

// =============================================================================
// ClientConfig
// =============================================================================

/// Client configuration.
///
/// Defaults reproduce the deployment this client was written for: no
/// security, tags in namespace 4, a 5 second publishing interval and
/// 100 ms sampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server endpoint URL (e.g., "opc.tcp://localhost:4840").
    pub endpoint: String,

    /// Application name announced to the server.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Security mode.
    #[serde(default)]
    pub security_mode: SecurityMode,

    /// Security policy.
    #[serde(default)]
    pub security_policy: SecurityPolicy,

    /// Require the endpoint to be listed by the server's discovery service.
    #[serde(default)]
    pub endpoint_must_exist: bool,

    /// Namespace used for bare tag names.
    #[serde(default = "default_namespace_index")]
    pub namespace_index: u16,

    /// Connection retry budget.
    #[serde(default)]
    pub connection: RetryConfig,

    /// Subscription parameters.
    #[serde(default)]
    pub subscription: SubscriptionSettings,

    /// Monitored item parameters.
    #[serde(default)]
    pub monitoring: MonitoredItemSettings,

    /// Listener queue settings.
    #[serde(default)]
    pub dispatch: DispatchSettings,
}

fn default_application_name() -> String {
    "Compas OPCUA client".to_string()
}

fn default_namespace_index() -> u16 {
    4
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            application_name: default_application_name(),
            security_mode: SecurityMode::default(),
            security_policy: SecurityPolicy::default(),
            endpoint_must_exist: false,
            namespace_index: default_namespace_index(),
            connection: RetryConfig::default(),
            subscription: SubscriptionSettings::default(),
            monitoring: MonitoredItemSettings::default(),
            dispatch: DispatchSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Creates a configuration with just the endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Validates this configuration.
    pub fn validate(&self) -> OpcUaResult<()> {
        let invalid = |field: &str, message: &str| Err(OpcUaError::invalid_config(field, message));

        if self.endpoint.is_empty() {
            return invalid("endpoint", "Endpoint is required");
        }
        if !self.endpoint.starts_with("opc.tcp://") {
            return invalid("endpoint", "Endpoint must start with opc.tcp://");
        }
        if (self.security_mode == SecurityMode::None) != (self.security_policy == SecurityPolicy::None)
        {
            return invalid(
                "security_policy",
                "Security mode and policy must both be None or both be set",
            );
        }
        if self.connection.max_delay < self.connection.initial_delay {
            return invalid("connection.max_delay", "Must not be less than initial_delay");
        }
        if !(0.0..=1.0).contains(&self.connection.jitter) {
            return invalid("connection.jitter", "Must be between 0.0 and 1.0");
        }
        if self.subscription.publishing_interval.is_zero() {
            return invalid("subscription.publishing_interval", "Must be greater than 0");
        }
        if self.subscription.keepalive_count == 0 {
            return invalid("subscription.keepalive_count", "Must be greater than 0");
        }
        // The server revises lifetime up to 3x keep-alive, reject configs it would rewrite.
        if self.subscription.lifetime_count < self.subscription.keepalive_count.saturating_mul(3) {
            return invalid(
                "subscription.lifetime_count",
                "Must be at least three times keepalive_count",
            );
        }
        if self.monitoring.queue_size == 0 {
            return invalid("monitoring.queue_size", "Must be greater than 0");
        }
        if self.dispatch.queue_capacity == 0 {
            return invalid("dispatch.queue_capacity", "Must be greater than 0");
        }

        Ok(())
    }

    /// Overflow policy for listener queues.
    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.monitoring.overflow_policy()
    }
}

// =============================================================================
// ClientConfigBuilder
// =============================================================================

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Sets the server endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Sets the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.config.application_name = name.into();
        self
    }

    /// Sets the security mode and policy.
    pub fn security(mut self, mode: SecurityMode, policy: SecurityPolicy) -> Self {
        self.config.security_mode = mode;
        self.config.security_policy = policy;
        self
    }

    /// Sets the namespace used for bare tag names.
    pub fn namespace_index(mut self, namespace_index: u16) -> Self {
        self.config.namespace_index = namespace_index;
        self
    }

    /// Sets the whole retry configuration.
    pub fn connection(mut self, retry: RetryConfig) -> Self {
        self.config.connection = retry;
        self
    }

    /// Sets the retry budget.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.connection.max_retries = max_retries;
        self
    }

    /// Sets the initial retry delay.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.connection.initial_delay = delay;
        if self.config.connection.max_delay < delay {
            self.config.connection.max_delay = delay;
        }
        self
    }

    /// Sets the subscription parameters.
    pub fn subscription(mut self, settings: SubscriptionSettings) -> Self {
        self.config.subscription = settings;
        self
    }

    /// Sets the monitored item parameters.
    pub fn monitoring(mut self, settings: MonitoredItemSettings) -> Self {
        self.config.monitoring = settings;
        self
    }

    /// Sets the listener queue capacity.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.dispatch.queue_capacity = capacity;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> OpcUaResult<ClientConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_parse() {
        let node: NodeId = "ns=4;s=ActLineSpeed".parse().unwrap();
        assert_eq!(node.namespace_index, 4);
        assert_eq!(node.identifier, NodeIdentifier::String("ActLineSpeed".into()));

        let node: NodeId = "i=2258".parse().unwrap();
        assert_eq!(node, NodeId::numeric(0, 2258));

        assert!("ns=x;s=Foo".parse::<NodeId>().is_err());
        assert!("ns=2".parse::<NodeId>().is_err());
        assert!("ns=2;g=abc".parse::<NodeId>().is_err());
        assert!("ns=2;s=".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId::string(4, "PIR_1_mA").to_string(), "ns=4;s=PIR_1_mA");
        assert_eq!(NodeId::numeric(0, 85).to_string(), "i=85");
    }

    #[test]
    fn test_node_id_serde_as_string() {
        let node = NodeId::string(4, "ActThermo1");
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, "\"ns=4;s=ActThermo1\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_retry_strategy_delays() {
        let base = Duration::from_millis(100);
        assert_eq!(RetryStrategy::Fixed.delay(base, 3), base);
        assert_eq!(RetryStrategy::Linear.delay(base, 3), Duration::from_millis(300));
        assert_eq!(RetryStrategy::Exponential.delay(base, 1), base);
        assert_eq!(RetryStrategy::Exponential.delay(base, 4), Duration::from_millis(800));
        assert_eq!(RetryStrategy::Exponential.delay(base, 200), Duration::MAX);
        // 2^31 fits a u32 but the product does not fit a Duration.
        assert_eq!(RetryStrategy::Exponential.delay(Duration::MAX, 32), Duration::MAX);
        assert_eq!(
            RetryStrategy::Exponential.delay(Duration::from_secs(1), 32),
            Duration::from_secs(1 << 31)
        );
    }

    #[test]
    fn test_retry_config_budget() {
        let config = RetryConfig::new(1)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5));

        assert_eq!(config.max_attempts(), Some(2));
        assert!(config.allows_retry(1));
        assert!(!config.allows_retry(2));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));

        let unbounded = config.indefinitely();
        assert_eq!(unbounded.max_attempts(), None);
        assert!(unbounded.allows_retry(1000));
    }

    #[test]
    fn test_retry_jitter_stays_bounded() {
        let config = RetryConfig::new(3)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(150))
            .with_jitter(0.5);

        for retry in 1..5 {
            assert!(config.delay_for_attempt(retry) <= Duration::from_millis(150));
        }
    }

    #[test]
    fn test_default_settings_match_deployment() {
        let config = ClientConfig::new("opc.tcp://172.30.10.2:4840");
        assert_eq!(config.application_name, "Compas OPCUA client");
        assert_eq!(config.namespace_index, 4);
        assert_eq!(config.subscription.publishing_interval, Duration::from_secs(5));
        assert_eq!(config.subscription.lifetime_count, 100);
        assert_eq!(config.subscription.keepalive_count, 10);
        assert_eq!(config.subscription.priority, 10);
        assert_eq!(config.monitoring.sampling_interval, Duration::from_millis(100));
        assert_eq!(config.monitoring.queue_size, 10);
        assert_eq!(config.overflow_policy(), OverflowPolicy::DropOldest);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(ClientConfig::builder().build().is_err());
        assert!(ClientConfig::builder().endpoint("http://plc").build().is_err());
        assert!(ClientConfig::builder()
            .endpoint("opc.tcp://plc:4840")
            .security(SecurityMode::Sign, SecurityPolicy::None)
            .build()
            .is_err());
        assert!(ClientConfig::builder()
            .endpoint("opc.tcp://plc:4840")
            .queue_capacity(0)
            .build()
            .is_err());

        let mut config = ClientConfig::new("opc.tcp://plc:4840");
        config.subscription.lifetime_count = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_initial_delay_raises_max_delay() {
        let config = ClientConfig::builder()
            .endpoint("opc.tcp://plc:4840")
            .initial_delay(Duration::from_secs(60))
            .build()
            .unwrap();
        assert_eq!(config.connection.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_config_deserialize_humantime() {
        let json = r#"{
            "endpoint": "opc.tcp://plc:4840",
            "connection": { "initial_delay": "2s", "max_retries": 1 },
            "subscription": { "publishing_interval": "1s" },
            "monitoring": { "sampling_interval": "250ms", "discard_oldest": false }
        }"#;
        let config: ClientConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.connection.initial_delay, Duration::from_secs(2));
        assert_eq!(config.connection.max_retries, 1);
        assert_eq!(config.subscription.publishing_interval, Duration::from_secs(1));
        assert_eq!(config.subscription.lifetime_count, 100);
        assert_eq!(config.monitoring.sampling_interval, Duration::from_millis(250));
        assert_eq!(config.overflow_policy(), OverflowPolicy::DropNewest);
    }
}
