// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA transport backed by the `opcua` crate.
//!
//! The `opcua` client API is blocking, so every server call runs on the
//! blocking pool. Data change callbacks and connection status callbacks
//! feed the same event stream the orchestrator consumes.
//!
//! The crate's own session reconnect is disabled; reconnects are driven by
//! the lifecycle orchestrator.
//!
//! # Example
//!
//! ```rust,ignore
//! use tagwatch_opcua::client::RealOpcUaTransport;
//! use tagwatch_opcua::types::ClientConfig;
//!
//! let config = ClientConfig::new("opc.tcp://localhost:4840");
//! let transport = RealOpcUaTransport::new(&config);
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use opcua::client::prelude::*;
use opcua::sync::{Mutex as OpcUaMutex, RwLock as OpcUaRwLock};

use crate::client::transport::{
    ConnectionHandle, DataValue, EventStream, ItemHandle, OpcUaTransport, SessionHandle,
    SubscriptionHandle, TransportEvent, UaValue,
};
use crate::error::{
    ConfigurationError, ConnectionError, OpcUaError, OpcUaResult, SessionError, SubscriptionError,
};
use crate::types::{
    ClientConfig, MonitoredItemSettings, NodeId, NodeIdentifier, SecurityMode, SecurityPolicy,
    SubscriptionSettings,
};

type SharedSession = Arc<OpcUaRwLock<Session>>;

struct LiveConnection {
    handle: ConnectionHandle,
    client: Arc<OpcUaMutex<Client>>,
    endpoint: EndpointDescription,
}

struct LiveSession {
    handle: SessionHandle,
    session: SharedSession,
    stop: Option<tokio::sync::oneshot::Sender<SessionCommand>>,
}

/// Runs a blocking `opcua` call off the async runtime.
async fn blocking<R, E, F>(f: F) -> Result<R, E>
where
    F: FnOnce() -> Result<R, E> + Send + 'static,
    R: Send + 'static,
    E: From<ConnectionError> + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(ConnectionError::lost(Some(format!("blocking call failed: {e}"))).into()),
    }
}

// =============================================================================
// RealOpcUaTransport
// =============================================================================

/// Transport speaking OPC UA binary over TCP.
pub struct RealOpcUaTransport {
    endpoint: String,
    application_name: String,
    security_mode: SecurityMode,
    security_policy: SecurityPolicy,

    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Option<EventStream>,
    next_id: u32,

    connection: Option<LiveConnection>,
    session: Option<LiveSession>,
    subscriptions: HashMap<SubscriptionHandle, u32>,
    items: HashMap<(SubscriptionHandle, ItemHandle), u32>,
}

impl RealOpcUaTransport {
    /// Creates a transport for `config.endpoint`.
    pub fn new(config: &ClientConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            endpoint: config.endpoint.clone(),
            application_name: config.application_name.clone(),
            security_mode: config.security_mode,
            security_policy: config.security_policy,
            events_tx,
            events_rx: Some(events_rx),
            next_id: 0,
            connection: None,
            session: None,
            subscriptions: HashMap::new(),
            items: HashMap::new(),
        }
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn live_session(&self, handle: Option<SessionHandle>) -> OpcUaResult<SharedSession> {
        match &self.session {
            Some(live) if handle.map_or(true, |h| h == live.handle) => Ok(live.session.clone()),
            _ => Err(ConnectionError::NotConnected.into()),
        }
    }

    fn server_subscription(&self, subscription: SubscriptionHandle) -> OpcUaResult<u32> {
        self.subscriptions.get(&subscription).copied().ok_or_else(|| {
            SubscriptionError::Terminated { subscription }.into()
        })
    }

    fn message_security_mode(&self) -> MessageSecurityMode {
        match self.security_mode {
            SecurityMode::None => MessageSecurityMode::None,
            SecurityMode::Sign => MessageSecurityMode::Sign,
            SecurityMode::SignAndEncrypt => MessageSecurityMode::SignAndEncrypt,
        }
    }

    fn to_opcua_node_id(node_id: &NodeId) -> opcua::types::NodeId {
        match &node_id.identifier {
            NodeIdentifier::Numeric(v) => opcua::types::NodeId::new(node_id.namespace_index, *v),
            NodeIdentifier::String(v) => {
                opcua::types::NodeId::new(node_id.namespace_index, v.clone())
            }
        }
    }

    fn from_opcua_variant(variant: &Variant) -> UaValue {
        match variant {
            Variant::Empty => UaValue::Null,
            Variant::Boolean(v) => UaValue::Boolean(*v),
            Variant::SByte(v) => UaValue::SByte(*v),
            Variant::Byte(v) => UaValue::Byte(*v),
            Variant::Int16(v) => UaValue::Int16(*v),
            Variant::UInt16(v) => UaValue::UInt16(*v),
            Variant::Int32(v) => UaValue::Int32(*v),
            Variant::UInt32(v) => UaValue::UInt32(*v),
            Variant::Int64(v) => UaValue::Int64(*v),
            Variant::UInt64(v) => UaValue::UInt64(*v),
            Variant::Float(v) => UaValue::Float(*v),
            Variant::Double(v) => UaValue::Double(*v),
            Variant::String(v) => UaValue::String(v.as_ref().to_string()),
            Variant::DateTime(v) => UaValue::DateTime(v.as_chrono()),
            Variant::ByteString(v) => UaValue::ByteString(v.value.clone().unwrap_or_default()),
            Variant::Array(arr) => {
                UaValue::Array(arr.values.iter().map(Self::from_opcua_variant).collect())
            }
            other => UaValue::String(format!("{other:?}")),
        }
    }

    fn from_opcua_data_value(value: &opcua::types::DataValue) -> DataValue {
        DataValue {
            value: value
                .value
                .as_ref()
                .map(Self::from_opcua_variant)
                .unwrap_or_default(),
            status: value.status.map(|s| s.bits()).unwrap_or(0),
            source_timestamp: value.source_timestamp.map(|t| t.as_chrono()),
            server_timestamp: Some(
                value
                    .server_timestamp
                    .map(|t| t.as_chrono())
                    .unwrap_or_else(Utc::now),
            ),
        }
    }
}

#[async_trait]
impl OpcUaTransport for RealOpcUaTransport {
    fn take_events(&mut self) -> Option<EventStream> {
        self.events_rx.take()
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connect(&mut self, endpoint: &str) -> Result<ConnectionHandle, ConnectionError> {
        if !endpoint.starts_with("opc.tcp://") {
            return Err(ConnectionError::invalid_endpoint(
                endpoint,
                "expected an opc.tcp:// URL",
            ));
        }

        let url = endpoint.to_string();
        let application_name = self.application_name.clone();
        let policy_uri = self.security_policy.uri();
        let policy_name = self.security_policy.name();
        let mode = self.message_security_mode();

        let (client, description) = blocking(move || {
            let client = ClientBuilder::new()
                .application_name(application_name.as_str())
                .application_uri(format!("urn:{application_name}"))
                .create_sample_keypair(true)
                .trust_server_certs(true)
                .session_retry_limit(0)
                .client()
                .ok_or_else(|| {
                    ConnectionError::invalid_endpoint(url.as_str(), "client configuration rejected")
                })?;

            let endpoints = client
                .get_server_endpoints_from_url(url.as_str())
                .map_err(|status| ConnectionError::refused(url.as_str(), status.to_string()))?;

            let description = endpoints
                .into_iter()
                .find(|e| e.security_policy_uri.as_ref() == policy_uri && e.security_mode == mode)
                .ok_or_else(|| {
                    ConnectionError::no_suitable_endpoint(format!("{policy_name}/{mode:?}"))
                })?;
            Ok::<_, ConnectionError>((client, description))
        })
        .await?;

        let handle = ConnectionHandle(self.next_id());
        debug!(
            security_policy = %description.security_policy_uri,
            security_mode = ?description.security_mode,
            "Found matching endpoint"
        );
        self.connection = Some(LiveConnection {
            handle,
            client: Arc::new(OpcUaMutex::new(client)),
            endpoint: description,
        });
        Ok(handle)
    }

    async fn disconnect(&mut self, connection: ConnectionHandle) -> OpcUaResult<()> {
        match &self.connection {
            Some(live) if live.handle == connection => {}
            _ => return Ok(()),
        }
        self.connection = None;
        self.subscriptions.clear();
        self.items.clear();

        if let Some(mut live) = self.session.take() {
            if let Some(stop) = live.stop.take() {
                let _ = stop.send(SessionCommand::Stop);
            }
            let session = live.session;
            blocking(move || {
                session.read().disconnect();
                Ok::<_, OpcUaError>(())
            })
            .await?;
        }
        Ok(())
    }

    async fn open_session(&mut self, connection: ConnectionHandle) -> OpcUaResult<SessionHandle> {
        let Some(live) = self.connection.as_ref().filter(|c| c.handle == connection) else {
            return Err(ConnectionError::NotConnected.into());
        };
        let client = live.client.clone();
        let description = live.endpoint.clone();
        let events = self.events_tx.clone();

        let (session, stop) = blocking(move || {
            let session = client
                .lock()
                .connect_to_endpoint(description, IdentityToken::Anonymous)
                .map_err(|status| SessionError::open_failed(status.to_string()))?;

            session
                .write()
                .set_connection_status_callback(ConnectionStatusCallback::new(move |connected| {
                    // Fires on deliberate disconnects too; the handle lets the
                    // orchestrator ignore it once the connection is replaced.
                    if !connected {
                        let _ = events.send(TransportEvent::connection_lost(
                            connection,
                            "server connection closed",
                        ));
                    }
                }));
            let stop = Session::run_async(session.clone());
            Ok::<_, OpcUaError>((session, stop))
        })
        .await?;

        let handle = SessionHandle(self.next_id());
        self.session = Some(LiveSession {
            handle,
            session,
            stop: Some(stop),
        });
        info!(session = %handle, "OPC UA session activated");
        Ok(handle)
    }

    async fn close_session(&mut self, session: SessionHandle) -> OpcUaResult<()> {
        if self.session.as_ref().map(|s| s.handle) != Some(session) {
            return Err(SessionError::close_failed(session, "unknown session").into());
        }
        let Some(mut live) = self.session.take() else {
            return Err(SessionError::close_failed(session, "unknown session").into());
        };
        if let Some(stop) = live.stop.take() {
            let _ = stop.send(SessionCommand::Stop);
        }
        let shared = live.session;
        blocking(move || {
            shared.read().disconnect();
            Ok::<_, OpcUaError>(())
        })
        .await
    }

    async fn create_subscription(
        &mut self,
        session: SessionHandle,
        settings: &SubscriptionSettings,
    ) -> OpcUaResult<SubscriptionHandle> {
        let shared = self.live_session(Some(session))?;
        let handle = SubscriptionHandle(self.next_id());
        let events = self.events_tx.clone();
        let settings = settings.clone();

        let callback = DataChangeCallback::new(move |items: Vec<&MonitoredItem>| {
            for item in items {
                let _ = events.send(TransportEvent::ValueChanged {
                    subscription: handle,
                    item: ItemHandle(item.client_handle()),
                    value: Self::from_opcua_data_value(item.last_value()),
                });
            }
        });

        let server_id = blocking(move || {
            shared
                .read()
                .create_subscription(
                    settings.publishing_interval.as_millis() as f64,
                    settings.lifetime_count,
                    settings.keepalive_count,
                    settings.max_notifications_per_publish,
                    settings.priority,
                    settings.publishing_enabled,
                    callback,
                )
                .map_err(|status| SubscriptionError::creation_failed(status.to_string()).into())
        })
        .await?;

        self.subscriptions.insert(handle, server_id);
        // A successful CreateSubscription response is the server's acknowledgement.
        let _ = self.events_tx.send(TransportEvent::SubscriptionStarted(handle));
        debug!(subscription = %handle, server_id, "Subscription created");
        Ok(handle)
    }

    async fn delete_subscription(&mut self, subscription: SubscriptionHandle) -> OpcUaResult<()> {
        let server_id = self.server_subscription(subscription)?;
        let shared = self.live_session(None)?;
        self.subscriptions.remove(&subscription);
        self.items.retain(|(owner, _), _| *owner != subscription);

        blocking(move || {
            shared
                .read()
                .delete_subscription(server_id)
                .map(|_| ())
                .map_err(|status| SubscriptionError::delete_failed(subscription, status.to_string()).into())
        })
        .await
    }

    async fn create_monitored_item(
        &mut self,
        subscription: SubscriptionHandle,
        node_id: &NodeId,
        settings: &MonitoredItemSettings,
    ) -> OpcUaResult<ItemHandle> {
        let server_subscription = self.server_subscription(subscription)?;
        let shared = self.live_session(None)?;
        let handle = ItemHandle(self.next_id());

        let request = MonitoredItemCreateRequest::new(
            ReadValueId {
                node_id: Self::to_opcua_node_id(node_id),
                attribute_id: AttributeId::Value as u32,
                index_range: UAString::null(),
                data_encoding: QualifiedName::null(),
            },
            MonitoringMode::Reporting,
            MonitoringParameters {
                client_handle: handle.0,
                sampling_interval: settings.sampling_interval.as_millis() as f64,
                filter: ExtensionObject::null(),
                queue_size: settings.queue_size,
                discard_oldest: settings.discard_oldest,
            },
        );
        let rendered = node_id.to_string();

        let server_item = blocking(move || {
            let results = shared
                .read()
                .create_monitored_items(server_subscription, TimestampsToReturn::Both, &[request])
                .map_err(|status| {
                    OpcUaError::from(ConfigurationError::invalid_node_id(
                        rendered.as_str(),
                        status.to_string(),
                    ))
                })?;
            match results.first() {
                Some(result) if result.status_code.is_good() => Ok(result.monitored_item_id),
                Some(result) => Err(ConfigurationError::invalid_node_id(
                    rendered.as_str(),
                    result.status_code.to_string(),
                )
                .into()),
                None => Err(ConfigurationError::invalid_node_id(rendered.as_str(), "no result").into()),
            }
        })
        .await?;

        self.items.insert((subscription, handle), server_item);
        Ok(handle)
    }

    async fn delete_monitored_item(
        &mut self,
        subscription: SubscriptionHandle,
        item: ItemHandle,
    ) -> OpcUaResult<()> {
        let server_subscription = self.server_subscription(subscription)?;
        let Some(server_item) = self.items.remove(&(subscription, item)) else {
            warn!(subscription = %subscription, item = %item, "Unknown monitored item");
            return Ok(());
        };
        let shared = self.live_session(None)?;

        blocking(move || {
            shared
                .read()
                .delete_monitored_items(server_subscription, &[server_item])
                .map(|_| ())
                .map_err(|status| SubscriptionError::creation_failed(status.to_string()).into())
        })
        .await
    }
}

impl std::fmt::Debug for RealOpcUaTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealOpcUaTransport")
            .field("endpoint", &self.endpoint)
            .field("connection", &self.connection.as_ref().map(|c| c.handle))
            .field("session", &self.session.as_ref().map(|s| s.handle))
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}
