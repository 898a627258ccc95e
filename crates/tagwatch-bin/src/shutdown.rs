// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Graceful shutdown coordination.
//!
//! Each termination signal gets its own handler task. Whichever fires
//! first initiates shutdown; later signals are only logged.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::{BinError, BinResult};

// =============================================================================
// ShutdownCoordinator
// =============================================================================

/// Coordinates graceful shutdown of the monitor.
///
/// # Example
///
/// ```ignore
/// use tagwatch_bin::shutdown::ShutdownCoordinator;
///
/// let coordinator = ShutdownCoordinator::new();
/// let _handlers = coordinator.install_signal_handlers()?;
///
/// let reason = coordinator.wait_for_shutdown().await;
/// println!("Stopping: {reason}");
/// ```
#[derive(Clone)]
pub struct ShutdownCoordinator {
    sender: Arc<watch::Sender<bool>>,
    reason: Arc<Mutex<Option<String>>>,
}

impl ShutdownCoordinator {
    /// Creates a new shutdown coordinator.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// Creates a future that resolves when shutdown is initiated.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Initiates shutdown. Only the first call has an effect.
    pub fn initiate_shutdown(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut slot = self.reason.lock();
        if slot.is_some() {
            debug!(reason = %reason, "Shutdown already in progress");
            return;
        }

        info!(reason = %reason, "Shutdown initiated");
        *slot = Some(reason);
        self.sender.send_replace(true);
    }

    /// Returns true if shutdown has been initiated.
    pub fn is_shutdown_initiated(&self) -> bool {
        *self.sender.borrow()
    }

    /// The reason given to the first [`Self::initiate_shutdown`] call.
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// Waits until shutdown is initiated and returns the reason.
    pub async fn wait_for_shutdown(&self) -> String {
        self.shutdown_signal().wait().await;
        self.reason().unwrap_or_default()
    }

    /// Installs one handler task per termination signal.
    ///
    /// On Unix these are SIGINT, SIGTERM and SIGQUIT; elsewhere Ctrl+C.
    /// Dropping the returned handles does not uninstall the handlers.
    pub fn install_signal_handlers(&self) -> BinResult<Vec<JoinHandle<()>>> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let kinds = [
                (SignalKind::interrupt(), "SIGINT"),
                (SignalKind::terminate(), "SIGTERM"),
                (SignalKind::quit(), "SIGQUIT"),
            ];

            let mut handles = Vec::with_capacity(kinds.len());
            for (kind, name) in kinds {
                let mut stream = signal(kind).map_err(|e| {
                    BinError::init(format!("failed to register {name} handler: {e}"))
                })?;
                let coordinator = self.clone();
                handles.push(tokio::spawn(async move {
                    while stream.recv().await.is_some() {
                        info!(signal = name, "Received signal");
                        coordinator.initiate_shutdown(name);
                    }
                }));
            }
            Ok(handles)
        }

        #[cfg(not(unix))]
        {
            let coordinator = self.clone();
            let handle = tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    info!(signal = "Ctrl+C", "Received signal");
                    coordinator.initiate_shutdown("Ctrl+C");
                }
            });
            Ok(vec![handle])
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("initiated", &self.is_shutdown_initiated())
            .field("reason", &self.reason())
            .finish()
    }
}

// =============================================================================
// ShutdownSignal
// =============================================================================

/// Resolves when shutdown is initiated.
#[derive(Debug)]
pub struct ShutdownSignal {
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// Waits for the shutdown signal.
    pub async fn wait(mut self) {
        // The sender lives in the coordinator, so a closed channel means
        // every coordinator is gone and nobody can request shutdown anymore.
        if self.receiver.wait_for(|initiated| *initiated).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_coordinator() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.is_shutdown_initiated());

        coordinator.initiate_shutdown("test");

        assert!(coordinator.is_shutdown_initiated());
        assert_eq!(coordinator.wait_for_shutdown().await, "test");
    }

    #[tokio::test]
    async fn test_shutdown_signal() {
        let coordinator = ShutdownCoordinator::new();
        let signal = coordinator.shutdown_signal();

        let coordinator_clone = coordinator.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            coordinator_clone.initiate_shutdown("SIGTERM");
        });

        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .expect("Shutdown signal should resolve");
    }

    #[tokio::test]
    async fn test_signal_after_initiation_resolves() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.initiate_shutdown("SIGINT");

        tokio::time::timeout(Duration::from_secs(1), coordinator.shutdown_signal().wait())
            .await
            .expect("Late subscribers should see the shutdown");
    }

    #[tokio::test]
    async fn test_first_reason_wins() {
        let coordinator = ShutdownCoordinator::new();

        coordinator.initiate_shutdown("SIGINT");
        coordinator.initiate_shutdown("SIGTERM");

        assert_eq!(coordinator.reason().as_deref(), Some("SIGINT"));
    }

    #[tokio::test]
    async fn test_install_signal_handlers() {
        let coordinator = ShutdownCoordinator::new();
        let handles = coordinator.install_signal_handlers().unwrap();

        #[cfg(unix)]
        assert_eq!(handles.len(), 3);
        assert!(!coordinator.is_shutdown_initiated());

        for handle in handles {
            handle.abort();
        }
    }
}
