//! BLE connection management.
//!
//! Tracks the connection state of one peripheral and makes disconnect safe
//! to call any number of times.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::ble::peripheral::PeripheralLink;
use crate::error::{Error, Result};

/// Connection state for a peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected to the peripheral.
    #[default]
    Disconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Connected to the peripheral.
    Connected,
    /// Currently disconnecting.
    Disconnecting,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Result of a disconnect request. Disconnect never fails past this boundary.
#[derive(Debug)]
pub enum DisconnectOutcome {
    /// The peripheral was connected and is now disconnected.
    Disconnected,
    /// The disconnect faulted (e.g. already disconnected); logged and ignored.
    Faulted(Error),
}

impl DisconnectOutcome {
    /// Whether the disconnect faulted.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Faulted(_))
    }
}

/// Manages the connection to one peripheral.
pub struct ConnectionManager<P> {
    /// The peripheral to manage.
    peripheral: P,
    /// Current connection state.
    state: Arc<RwLock<ConnectionState>>,
}

impl<P: PeripheralLink> ConnectionManager<P> {
    /// Create a new connection manager for a peripheral.
    pub fn new(peripheral: P) -> Self {
        Self {
            peripheral,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Get the peripheral.
    pub fn peripheral(&self) -> &P {
        &self.peripheral
    }

    /// Connect to the peripheral. No retries.
    pub async fn connect(&self) -> Result<()> {
        let current_state = self.state();

        if current_state.is_connected() {
            debug!("Already connected");
            return Ok(());
        }

        if current_state.is_transitioning() {
            return Err(Error::Internal(format!(
                "connection to {} already {}",
                self.peripheral.identifier(),
                current_state
            )));
        }

        self.set_state(ConnectionState::Connecting);

        // Check if already connected at BLE level
        if self.peripheral.is_connected().await.unwrap_or(false) {
            info!("Peripheral already connected at BLE level");
            self.set_state(ConnectionState::Connected);
            return Ok(());
        }

        match self.peripheral.connect().await {
            Ok(()) => {
                info!("Connected to {}", self.peripheral.identifier());
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", self.peripheral.identifier(), e);
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Disconnect from the peripheral.
    ///
    /// Disconnecting an already-disconnected peripheral, or a failure reported
    /// by the BLE stack, is logged as a [`Error::DisconnectFault`] and returned
    /// as [`DisconnectOutcome::Faulted`] rather than an error.
    pub async fn disconnect(&self) -> DisconnectOutcome {
        let current_state = self.state();

        if current_state != ConnectionState::Connected {
            let fault = Error::DisconnectFault {
                reason: format!(
                    "{} is {}",
                    self.peripheral.identifier(),
                    current_state.to_string().to_lowercase()
                ),
            };
            warn!("{}", fault);
            return DisconnectOutcome::Faulted(fault);
        }

        self.set_state(ConnectionState::Disconnecting);

        let result = self.peripheral.disconnect().await;
        self.set_state(ConnectionState::Disconnected);

        match result {
            Ok(()) => {
                info!("Disconnected from {}", self.peripheral.identifier());
                DisconnectOutcome::Disconnected
            }
            Err(e) => {
                let fault = Error::DisconnectFault {
                    reason: e.to_string(),
                };
                warn!("{}", fault);
                DisconnectOutcome::Faulted(fault)
            }
        }
    }

    /// Record that the adapter reported the link as dropped.
    ///
    /// Returns `true` only if the peripheral was connected. A drop reported
    /// while a local disconnect is in flight, or for a link already down, is
    /// not a loss.
    pub fn handle_disconnection(&self) -> bool {
        let was_connected = {
            let mut state = self.state.write();
            let was_connected = state.is_connected();
            if was_connected {
                *state = ConnectionState::Disconnected;
            }
            was_connected
        };

        if was_connected {
            warn!("Link to {} dropped", self.peripheral.identifier());
        }
        was_connected
    }

    /// Update the connection state.
    fn set_state(&self, new_state: ConnectionState) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };

        if old_state != new_state {
            debug!(
                "{}: {} -> {}",
                self.peripheral.identifier(),
                old_state,
                new_state
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::peripheral::MockPeripheralLink;

    fn mock_peripheral() -> MockPeripheralLink {
        let mut mock = MockPeripheralLink::new();
        mock.expect_identifier()
            .returning(|| "hci0/dev_AA_BB".to_string());
        mock.expect_is_connected().returning(|| Ok(false));
        mock
    }

    #[test]
    fn test_connection_state() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());

        assert!(ConnectionState::Connecting.is_transitioning());
        assert!(ConnectionState::Disconnecting.is_transitioning());
        assert!(!ConnectionState::Connected.is_transitioning());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(format!("{}", ConnectionState::Connected), "Connected");
        assert_eq!(format!("{}", ConnectionState::Disconnected), "Disconnected");
    }

    #[tokio::test]
    async fn test_connect_then_disconnect() {
        let mut mock = mock_peripheral();
        mock.expect_connect().times(1).returning(|| Ok(()));
        mock.expect_disconnect().times(1).returning(|| Ok(()));

        let manager = ConnectionManager::new(mock);

        manager.connect().await.unwrap();
        assert!(manager.is_connected());

        let outcome = manager.disconnect().await;
        assert!(matches!(outcome, DisconnectOutcome::Disconnected));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_benign() {
        let mut mock = mock_peripheral();
        mock.expect_connect().returning(|| Ok(()));
        mock.expect_disconnect().times(1).returning(|| Ok(()));

        let manager = ConnectionManager::new(mock);
        manager.connect().await.unwrap();

        assert!(!manager.disconnect().await.is_fault());

        match manager.disconnect().await {
            DisconnectOutcome::Faulted(err) => {
                assert!(matches!(err, Error::DisconnectFault { .. }));
                assert!(err.is_benign());
            }
            other => panic!("expected a fault, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_error_is_swallowed() {
        let mut mock = mock_peripheral();
        mock.expect_connect().returning(|| Ok(()));
        mock.expect_disconnect()
            .returning(|| Err(Error::Internal("runtime error".into())));

        let manager = ConnectionManager::new(mock);
        manager.connect().await.unwrap();

        let outcome = manager.disconnect().await;
        assert!(outcome.is_fault());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_dropped_link_is_reported_once() {
        let mut mock = mock_peripheral();
        mock.expect_connect().times(1).returning(|| Ok(()));
        mock.expect_disconnect().never();

        let manager = ConnectionManager::new(mock);
        assert!(!manager.handle_disconnection());

        manager.connect().await.unwrap();
        assert!(manager.handle_disconnection());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(!manager.handle_disconnection());

        // A later user disconnect is the benign already-down fault.
        assert!(manager.disconnect().await.is_fault());
    }

    #[test]
    fn test_failed_connect_returns_to_disconnected() {
        let mut mock = mock_peripheral();
        mock.expect_connect()
            .returning(|| Err(Error::NotConnected));

        let manager = ConnectionManager::new(mock);
        let result = tokio_test::block_on(manager.connect());
        assert!(result.is_err());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_already_connected_at_ble_level() {
        let mut mock = MockPeripheralLink::new();
        mock.expect_identifier().returning(|| "id".to_string());
        mock.expect_is_connected().returning(|| Ok(true));
        mock.expect_connect().never();

        let manager = ConnectionManager::new(mock);
        manager.connect().await.unwrap();
        assert!(manager.is_connected());
    }
}
