// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA session management.
//!
//! A session only exists on a connected transport and never survives a
//! reconnect. The manager has no retry logic of its own: a failed open is
//! reported upward and the orchestrator rebuilds the whole stack.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::transport::{ConnectionHandle, ConnectionState, OpcUaTransport, SessionHandle};
use crate::error::{OpcUaError, SessionError};

// =============================================================================
// SessionState
// =============================================================================

/// State of an OPC UA session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session open is in progress.
    Opening,

    /// Session is active and ready for use.
    Active,

    /// Session is being closed.
    Closing,

    /// Session is closed or was discarded.
    #[default]
    Closed,
}

impl SessionState {
    /// Returns `true` if the session is active.
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opening => write!(f, "Opening"),
            Self::Active => write!(f, "Active"),
            Self::Closing => write!(f, "Closing"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// =============================================================================
// SessionInfo
// =============================================================================

/// An open session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// Session handle.
    pub handle: SessionHandle,

    /// The connection hosting the session.
    pub connection: ConnectionHandle,

    /// Current state.
    pub state: SessionState,

    /// When the session was opened.
    pub opened_at: Instant,
}

// =============================================================================
// SessionStats
// =============================================================================

/// Counters for session activity.
#[derive(Debug, Default)]
pub struct SessionStats {
    opens: AtomicU64,
    failures: AtomicU64,
    closes: AtomicU64,
    discards: AtomicU64,
}

impl SessionStats {
    /// Sessions opened.
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    /// Failed open attempts.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Sessions closed gracefully.
    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }

    /// Sessions dropped after a connection loss.
    pub fn discards(&self) -> u64 {
        self.discards.load(Ordering::Relaxed)
    }
}

// =============================================================================
// SessionManager
// =============================================================================

/// Opens and closes sessions on behalf of the orchestrator.
#[derive(Debug, Default)]
pub struct SessionManager {
    stats: Arc<SessionStats>,
}

impl SessionManager {
    /// Creates a session manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared statistics.
    pub fn stats(&self) -> Arc<SessionStats> {
        self.stats.clone()
    }

    /// Opens a session on `connection`.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotConnected`] unless `state` is `Connected`,
    /// [`SessionError::OpenFailed`] when the transport refuses.
    pub async fn open<T: OpcUaTransport + ?Sized>(
        &self,
        transport: &mut T,
        connection: ConnectionHandle,
        state: ConnectionState,
    ) -> Result<SessionInfo, SessionError> {
        if !state.is_connected() {
            return Err(SessionError::NotConnected { state });
        }

        match transport.open_session(connection).await {
            Ok(handle) => {
                self.stats.opens.fetch_add(1, Ordering::Relaxed);
                tracing::info!(session = %handle, connection = %connection, "Session opened");
                Ok(SessionInfo {
                    handle,
                    connection,
                    state: SessionState::Active,
                    opened_at: Instant::now(),
                })
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                Err(match e {
                    OpcUaError::Session(inner) => inner,
                    other => SessionError::open_failed_with("Transport rejected session", other),
                })
            }
        }
    }

    /// Closes a session. Never fails; a missing or defunct session is a no-op.
    pub async fn close<T: OpcUaTransport + ?Sized>(
        &self,
        transport: &mut T,
        session: Option<SessionInfo>,
    ) {
        let Some(mut session) = session else {
            tracing::debug!("No session to close");
            return;
        };
        if !session.state.is_active() {
            return;
        }

        session.state = SessionState::Closing;
        match transport.close_session(session.handle).await {
            Ok(()) => {
                self.stats.closes.fetch_add(1, Ordering::Relaxed);
                tracing::info!(session = %session.handle, "Session closed");
            }
            Err(e) => e.log("Session close failed"),
        }
    }

    /// Forgets a session whose connection is gone.
    pub fn discard(&self, session: Option<SessionInfo>) {
        if let Some(session) = session {
            self.stats.discards.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(session = %session.handle, "Session discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::sim::SimulatedTransport;

    const ENDPOINT: &str = "opc.tcp://sim:4840";

    #[tokio::test]
    async fn test_open_requires_connected_state() {
        let (mut transport, _sim) = SimulatedTransport::new(ENDPOINT);
        let manager = SessionManager::new();

        let err = manager
            .open(&mut transport, ConnectionHandle(1), ConnectionState::Reconnecting)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::NotConnected {
                state: ConnectionState::Reconnecting
            }
        ));
    }

    #[tokio::test]
    async fn test_open_and_close() {
        let (mut transport, sim) = SimulatedTransport::new(ENDPOINT);
        let manager = SessionManager::new();
        let conn = transport.connect(ENDPOINT).await.unwrap();

        let session = manager
            .open(&mut transport, conn, ConnectionState::Connected)
            .await
            .unwrap();
        assert_eq!(session.connection, conn);
        assert!(session.state.is_active());

        manager.close(&mut transport, Some(session)).await;
        manager.close(&mut transport, None).await;
        assert_eq!(sim.session_closes(), 1);
        assert_eq!(manager.stats().closes(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_is_reported() {
        let (mut transport, sim) = SimulatedTransport::new(ENDPOINT);
        let manager = SessionManager::new();
        let conn = transport.connect(ENDPOINT).await.unwrap();
        sim.fail_next_session();

        let err = manager
            .open(&mut transport, conn, ConnectionState::Connected)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::OpenFailed { .. }));
        assert_eq!(manager.stats().failures(), 1);
    }

    #[tokio::test]
    async fn test_close_after_connection_drop_does_not_fail() {
        let (mut transport, sim) = SimulatedTransport::new(ENDPOINT);
        let manager = SessionManager::new();
        let conn = transport.connect(ENDPOINT).await.unwrap();
        let session = manager
            .open(&mut transport, conn, ConnectionState::Connected)
            .await
            .unwrap();

        sim.drop_connection("gone");
        manager.close(&mut transport, Some(session)).await;
        assert_eq!(manager.stats().closes(), 0);
    }

    #[tokio::test]
    async fn test_discard() {
        let manager = SessionManager::new();
        manager.discard(Some(SessionInfo {
            handle: SessionHandle(7),
            connection: ConnectionHandle(1),
            state: SessionState::Active,
            opened_at: Instant::now(),
        }));
        manager.discard(None);
        assert_eq!(manager.stats().discards(), 1);
    }
}
