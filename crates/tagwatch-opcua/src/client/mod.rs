// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client layers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   LifecycleOrchestrator                         │
//! │         (startup, recovery and drain sequencing)                │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                  │                     │
//!          ▼                  ▼                     ▼
//! ┌─────────────────┐ ┌──────────────────┐ ┌──────────────────────┐
//! │ SessionManager  │ │ SubscriptionCtrl │ │ NotificationRouter   │
//! └─────────────────┘ └──────────────────┘ └──────────────────────┘
//!          │                  │
//!          ▼                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 TransportConnector                              │
//! │            (connection state, retry and backoff)                │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    OpcUaTransport                               │
//! │        (SimulatedTransport or RealOpcUaTransport)               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod connector;
pub mod router;
pub mod session;
pub mod sim;
pub mod subscription;
pub mod transport;

#[cfg(feature = "real-transport")]
mod real_transport;

pub use connector::{ConnectorStats, TransportConnector};
pub use router::{
    ChangeNotification, ChannelListener, DeliveryQueue, DispatchOutcome, FnListener,
    NotificationRouter, RouterStats, TagListener,
};
pub use session::{SessionInfo, SessionManager, SessionState, SessionStats};
pub use sim::{SimulatedTransport, SimulatorHandle};
pub use subscription::{
    ActiveSubscription, MonitoredItem, MonitoredItemReport, SubscriptionController,
    SubscriptionState, SubscriptionStats,
};
pub use transport::{
    ConnectionHandle, ConnectionState, DataValue, EventStream, ItemHandle, OpcUaTransport,
    Quality, SessionHandle, SubscriptionHandle, TransportEvent, UaValue,
};

#[cfg(feature = "real-transport")]
pub use real_transport::RealOpcUaTransport;
