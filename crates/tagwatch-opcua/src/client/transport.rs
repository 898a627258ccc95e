// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport abstraction layer.
//!
//! The protocol stack is consumed through the [`OpcUaTransport`] trait:
//! connection, session, subscription and monitored item primitives plus a
//! single ordered stream of [`TransportEvent`]s. Everything above this
//! module is written against the trait, so the lifecycle can be driven by
//! the in-memory simulator in tests and by the `opcua` crate in production.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{ConnectionError, OpcUaResult};
use crate::types::{MonitoredItemSettings, NodeId, SubscriptionSettings};

// =============================================================================
// Handles
// =============================================================================

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Returns the raw identifier.
            #[inline]
            pub const fn id(&self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

handle_type!(
    /// Identity of one transport connection.
    ConnectionHandle,
    "conn"
);
handle_type!(
    /// Identity of one session.
    SessionHandle,
    "sess"
);
handle_type!(
    /// Identity of one server-side subscription.
    SubscriptionHandle,
    "sub"
);
handle_type!(
    /// Identity of one monitored item, unique within its subscription.
    ItemHandle,
    "mi"
);

// =============================================================================
// ConnectionState
// =============================================================================

/// Connection state of the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Transport is not connected.
    #[default]
    Disconnected,

    /// Transport is establishing a connection.
    Connecting,

    /// Transport is connected and ready.
    Connected,

    /// Transport lost its connection and is being re-established.
    Reconnecting,
}

impl ConnectionState {
    /// Returns `true` if the transport is connected.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if the transport is in a transitional state.
    #[inline]
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}

// =============================================================================
// UaValue
// =============================================================================

/// A variable value as reported by the transport.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum UaValue {
    /// Boolean value.
    Boolean(bool),

    /// Signed byte.
    SByte(i8),

    /// Unsigned byte.
    Byte(u8),

    /// 16-bit signed integer.
    Int16(i16),

    /// 16-bit unsigned integer.
    UInt16(u16),

    /// 32-bit signed integer.
    Int32(i32),

    /// 32-bit unsigned integer.
    UInt32(u32),

    /// 64-bit signed integer.
    Int64(i64),

    /// 64-bit unsigned integer.
    UInt64(u64),

    /// 32-bit float.
    Float(f32),

    /// 64-bit double.
    Double(f64),

    /// String value.
    String(String),

    /// Date/time value.
    DateTime(DateTime<Utc>),

    /// Byte string.
    ByteString(Vec<u8>),

    /// Array of values.
    Array(Vec<UaValue>),

    /// Null value.
    #[default]
    Null,
}

impl UaValue {
    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to get the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            Self::SByte(v) => Some(*v != 0),
            Self::Byte(v) => Some(*v != 0),
            Self::Int16(v) => Some(*v != 0),
            Self::UInt16(v) => Some(*v != 0),
            Self::Int32(v) => Some(*v != 0),
            Self::UInt32(v) => Some(*v != 0),
            _ => None,
        }
    }

    /// Attempts to get the value as an i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Boolean(v) => Some(i64::from(*v)),
            Self::SByte(v) => Some(i64::from(*v)),
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Int16(v) => Some(i64::from(*v)),
            Self::UInt16(v) => Some(i64::from(*v)),
            Self::Int32(v) => Some(i64::from(*v)),
            Self::UInt32(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            Self::UInt64(v) => i64::try_from(*v).ok(),
            Self::Float(v) => Some(*v as i64),
            Self::Double(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Attempts to get the value as an f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Boolean(v) => Some(if *v { 1.0 } else { 0.0 }),
            Self::SByte(v) => Some(f64::from(*v)),
            Self::Byte(v) => Some(f64::from(*v)),
            Self::Int16(v) => Some(f64::from(*v)),
            Self::UInt16(v) => Some(f64::from(*v)),
            Self::Int32(v) => Some(f64::from(*v)),
            Self::UInt32(v) => Some(f64::from(*v)),
            Self::Int64(v) => Some(*v as f64),
            Self::UInt64(v) => Some(*v as f64),
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Attempts to get the value as a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for UaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::SByte(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Self::Array(v) => write!(f, "[{} items]", v.len()),
            Self::Null => write!(f, "null"),
        }
    }
}

// =============================================================================
// Quality / DataValue
// =============================================================================

/// Coarse quality derived from an OPC UA status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// Value is reliable.
    Good,
    /// Value may not be accurate.
    Uncertain,
    /// Value is not usable.
    Bad,
}

impl Quality {
    /// Maps the two severity bits of a status code.
    pub fn from_status_code(status: u32) -> Self {
        if status & 0x8000_0000 != 0 {
            Self::Bad
        } else if status & 0x4000_0000 != 0 {
            Self::Uncertain
        } else {
            Self::Good
        }
    }

    /// Returns `true` for good quality.
    #[inline]
    pub fn is_good(&self) -> bool {
        matches!(self, Self::Good)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => write!(f, "Good"),
            Self::Uncertain => write!(f, "Uncertain"),
            Self::Bad => write!(f, "Bad"),
        }
    }
}

/// A value with its status and timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The value.
    pub value: UaValue,

    /// OPC UA status code (0 = Good).
    pub status: u32,

    /// When the value was produced at the source.
    pub source_timestamp: Option<DateTime<Utc>>,

    /// When the server processed the value.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl DataValue {
    /// A good value stamped `source_timestamp`.
    pub fn new(value: impl Into<UaValue>, source_timestamp: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            status: 0,
            source_timestamp: Some(source_timestamp),
            server_timestamp: Some(Utc::now()),
        }
    }

    /// Sets the status code.
    pub fn with_status(mut self, status: u32) -> Self {
        self.status = status;
        self
    }

    /// Quality derived from the status code.
    #[inline]
    pub fn quality(&self) -> Quality {
        Quality::from_status_code(self.status)
    }
}

macro_rules! impl_from_for_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for UaValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_for_value!(
    bool => Boolean,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    String => String,
);

impl From<&str> for UaValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

// =============================================================================
// TransportEvent
// =============================================================================

/// Asynchronous events produced by the transport, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The underlying connection changed state.
    ConnectionStateChanged {
        /// The connection the change applies to.
        connection: ConnectionHandle,
        /// The new state.
        state: ConnectionState,
        /// Why the state changed, when known.
        reason: Option<String>,
    },

    /// The server acknowledged a new subscription.
    SubscriptionStarted(SubscriptionHandle),

    /// An idle subscription confirmed it is alive.
    SubscriptionKeepAlive(SubscriptionHandle),

    /// The server ended a subscription.
    SubscriptionTerminated(SubscriptionHandle),

    /// A monitored item reported a new value.
    ValueChanged {
        /// Subscription owning the item.
        subscription: SubscriptionHandle,
        /// The reporting item.
        item: ItemHandle,
        /// The value with its timestamps.
        value: DataValue,
    },
}

impl TransportEvent {
    /// Shorthand for the loss of `connection`.
    pub fn connection_lost(connection: ConnectionHandle, reason: impl Into<String>) -> Self {
        Self::ConnectionStateChanged {
            connection,
            state: ConnectionState::Disconnected,
            reason: Some(reason.into()),
        }
    }
}

/// The receiving end of a transport's event stream.
pub type EventStream = mpsc::UnboundedReceiver<TransportEvent>;

// =============================================================================
// OpcUaTransport Trait
// =============================================================================

/// Abstract transport trait for OPC UA communication.
///
/// Calls on a connection that has already failed must return an error
/// rather than hang. Faults that happen while no call is in flight are
/// reported as [`TransportEvent::ConnectionStateChanged`] on the event
/// stream.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so the owning task can be spawned.
#[async_trait]
pub trait OpcUaTransport: Send + Sync {
    /// Hands out the event stream. Returns `None` after the first call.
    fn take_events(&mut self) -> Option<EventStream>;

    /// The configured endpoint URL.
    fn endpoint(&self) -> &str;

    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Establishes a connection to the server.
    ///
    /// # Errors
    ///
    /// Returns a [`ConnectionError`] if the endpoint cannot be reached.
    async fn connect(&mut self, endpoint: &str) -> Result<ConnectionHandle, ConnectionError>;

    /// Closes a connection.
    async fn disconnect(&mut self, connection: ConnectionHandle) -> OpcUaResult<()>;

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Opens a session on a live connection.
    async fn open_session(&mut self, connection: ConnectionHandle) -> OpcUaResult<SessionHandle>;

    /// Closes a session.
    async fn close_session(&mut self, session: SessionHandle) -> OpcUaResult<()>;

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Creates a subscription. The server acknowledges it later with
    /// [`TransportEvent::SubscriptionStarted`].
    async fn create_subscription(
        &mut self,
        session: SessionHandle,
        settings: &SubscriptionSettings,
    ) -> OpcUaResult<SubscriptionHandle>;

    /// Deletes a subscription.
    async fn delete_subscription(&mut self, subscription: SubscriptionHandle) -> OpcUaResult<()>;

    /// Creates one monitored item on the value attribute of `node_id`.
    async fn create_monitored_item(
        &mut self,
        subscription: SubscriptionHandle,
        node_id: &NodeId,
        settings: &MonitoredItemSettings,
    ) -> OpcUaResult<ItemHandle>;

    /// Deletes one monitored item.
    async fn delete_monitored_item(
        &mut self,
        subscription: SubscriptionHandle,
        item: ItemHandle,
    ) -> OpcUaResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_display() {
        assert_eq!(ConnectionHandle(1).to_string(), "conn-1");
        assert_eq!(SessionHandle(2).to_string(), "sess-2");
        assert_eq!(SubscriptionHandle(3).to_string(), "sub-3");
        assert_eq!(ItemHandle(4).to_string(), "mi-4");
    }

    #[test]
    fn test_connection_state() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::Reconnecting.is_transitioning());
        assert!(!ConnectionState::Disconnected.is_transitioning());
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(UaValue::Int32(42).as_i64(), Some(42));
        assert_eq!(UaValue::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(UaValue::UInt16(1).as_bool(), Some(true));
        assert_eq!(UaValue::from("on").as_str(), Some("on"));
        assert_eq!(UaValue::UInt64(u64::MAX).as_i64(), None);
        assert!(UaValue::default().is_null());
        assert_eq!(UaValue::Double(2.25).to_string(), "2.25");
    }

    #[test]
    fn test_quality_from_status() {
        assert_eq!(Quality::from_status_code(0), Quality::Good);
        assert_eq!(Quality::from_status_code(0x4000_0000), Quality::Uncertain);
        assert_eq!(Quality::from_status_code(0x8000_0000), Quality::Bad);
        assert_eq!(Quality::from_status_code(0x803E_0000), Quality::Bad);
    }
}
