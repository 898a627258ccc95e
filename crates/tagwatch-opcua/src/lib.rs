// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA tag change monitoring.
//!
//! This crate keeps a single subscription alive on one OPC UA server and
//! delivers value changes for a fixed set of named tags to registered
//! listeners. Connection loss and server-side subscription termination are
//! recovered by rebuilding the connection, session and subscription as a
//! unit.
//!
//! # Features
//!
//! - Connection retry with fixed, linear or exponential backoff
//! - One subscription per session, one monitored item per tag
//! - Per-item partial failure: an unknown node does not block the others
//! - Bounded per-listener delivery queues with a drop policy
//! - Graceful drain on shutdown
//! - A simulated transport for tests and demos
//!
//! # Error Handling
//!
//! ```text
//! OpcUaError
//! ├── Connection     - Endpoint and connection failures
//! ├── Session        - Session open/close failures
//! ├── Subscription   - Subscription lifecycle errors
//! ├── MonitoredItem  - Per-tag monitoring failures
//! ├── Dispatch       - Listener queue overflow
//! ├── Startup        - Startup retry budget spent
//! └── Configuration  - Invalid settings or API misuse
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tagwatch_opcua::{ClientConfig, SimulatedTransport, TagMonitor, TagRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder()
//!         .endpoint("opc.tcp://localhost:4840")
//!         .build()?;
//!     let registry = TagRegistry::builtin(config.namespace_index);
//!     let (transport, _sim) = SimulatedTransport::new(&config.endpoint);
//!
//!     let monitor = TagMonitor::new(config, registry, transport)?;
//!     monitor.on_tag_changed_fn("T2m", |n| println!("{} value has changed", n.tag))?;
//!     monitor.start()?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     monitor.stop().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod lifecycle;
pub mod monitor;
pub mod registry;
pub mod types;

pub use error::{
    ConfigurationError, ConnectionError, DispatchOverflowError, ErrorCode, ErrorSeverity,
    FatalReason, MonitoredItemError, OpcUaError, OpcUaResult, SessionError, StartupError,
    SubscriptionError,
};

pub use types::{
    ClientConfig, ClientConfigBuilder, DispatchSettings, MonitoredItemSettings, NodeId,
    NodeIdentifier, OverflowPolicy, RetryConfig, RetryStrategy, SecurityMode, SecurityPolicy,
    SubscriptionSettings,
};

pub use registry::{TagDefinition, TagName, TagRegistry, BUILTIN_TAGS};

pub use client::{
    ChangeNotification, ChannelListener, ConnectionState, DataValue, FnListener, OpcUaTransport,
    Quality, SimulatedTransport, SimulatorHandle, TagListener, TransportEvent, UaValue,
};

#[cfg(feature = "real-transport")]
pub use client::RealOpcUaTransport;

pub use lifecycle::{
    HealthReport, LifecycleOrchestrator, LifecycleOutcome, LifecycleState, StateTransition,
};
pub use monitor::TagMonitor;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
