//! Connection lifecycle controller
//!
//! Turns ICE connection state changes into the two pipeline actions that
//! matter: open the sinks once the connection is up, and tear everything down
//! once when it fails.

use log::{info, warn};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;

/// Connection state as seen by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// No transition leaves a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Closed)
    }
}

impl From<RTCIceConnectionState> for ConnectionState {
    fn from(state: RTCIceConnectionState) -> Self {
        match state {
            RTCIceConnectionState::Unspecified | RTCIceConnectionState::New => {
                ConnectionState::New
            }
            RTCIceConnectionState::Checking => ConnectionState::Connecting,
            RTCIceConnectionState::Connected | RTCIceConnectionState::Completed => {
                ConnectionState::Connected
            }
            RTCIceConnectionState::Disconnected => ConnectionState::Disconnected,
            RTCIceConnectionState::Failed => ConnectionState::Failed,
            RTCIceConnectionState::Closed => ConnectionState::Closed,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "checking",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        write!(f, "{}", name)
    }
}

/// What the caller has to do after a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    None,
    /// First time the connection came up: start the sinks
    SinksReady,
    /// First failure: run the shutdown routine
    Teardown,
}

pub struct LifecycleController {
    state: Mutex<ConnectionState>,
    connected: watch::Sender<bool>,
    teardown_fired: AtomicBool,
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleController {
    pub fn new() -> Self {
        let (connected, _) = watch::channel(false);
        Self {
            state: Mutex::new(ConnectionState::New),
            connected,
            teardown_fired: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a state change reported by the transport.
    ///
    /// Safe to call from any callback thread; duplicate notifications are
    /// harmless.
    pub fn on_state_change(&self, next: ConnectionState) -> LifecycleAction {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.is_terminal() {
            info!("Connection state {} ignored, already {}", next, *state);
            return LifecycleAction::None;
        }

        info!("Connection State has changed {}", next);
        *state = next;

        match next {
            ConnectionState::Connected => {
                // send_if_modified only reports the first false -> true flip
                let opened = self.connected.send_if_modified(|ready| {
                    if *ready {
                        false
                    } else {
                        *ready = true;
                        true
                    }
                });
                if opened {
                    LifecycleAction::SinksReady
                } else {
                    LifecycleAction::None
                }
            }
            ConnectionState::Failed => {
                if self.teardown_fired.swap(true, Ordering::SeqCst) {
                    LifecycleAction::None
                } else {
                    LifecycleAction::Teardown
                }
            }
            ConnectionState::Disconnected => {
                warn!("Peer connection disconnected, waiting for it to recover or fail");
                LifecycleAction::None
            }
            _ => LifecycleAction::None,
        }
    }

    /// Resolve once the connection has come up at least once.
    pub async fn wait_connected(&self) {
        let mut rx = self.connected.subscribe();
        // The sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_ice_state_mapping() {
        assert_eq!(
            ConnectionState::from(RTCIceConnectionState::Checking),
            ConnectionState::Connecting
        );
        assert_eq!(
            ConnectionState::from(RTCIceConnectionState::Completed),
            ConnectionState::Connected
        );
        assert_eq!(
            ConnectionState::from(RTCIceConnectionState::Failed),
            ConnectionState::Failed
        );
    }

    #[test]
    fn test_connected_opens_gate_once() {
        let lc = LifecycleController::new();
        assert_eq!(lc.on_state_change(ConnectionState::Connecting), LifecycleAction::None);
        assert_eq!(lc.on_state_change(ConnectionState::Connected), LifecycleAction::SinksReady);
        assert_eq!(lc.on_state_change(ConnectionState::Disconnected), LifecycleAction::None);
        assert_eq!(lc.on_state_change(ConnectionState::Connected), LifecycleAction::None);
        assert!(*lc.connected.borrow());
    }

    #[test]
    fn test_failed_tears_down_once() {
        let lc = LifecycleController::new();
        lc.on_state_change(ConnectionState::Connected);
        assert_eq!(lc.on_state_change(ConnectionState::Failed), LifecycleAction::Teardown);
        assert_eq!(lc.on_state_change(ConnectionState::Failed), LifecycleAction::None);
        assert_eq!(lc.on_state_change(ConnectionState::Connected), LifecycleAction::None);
        assert_eq!(lc.state(), ConnectionState::Failed);
    }

    #[test]
    fn test_failed_before_connected_still_tears_down() {
        let lc = LifecycleController::new();
        assert_eq!(lc.on_state_change(ConnectionState::Failed), LifecycleAction::Teardown);
        assert!(!*lc.connected.borrow());
    }

    #[test]
    fn test_closed_is_terminal() {
        let lc = LifecycleController::new();
        lc.on_state_change(ConnectionState::Closed);
        assert_eq!(lc.on_state_change(ConnectionState::Failed), LifecycleAction::None);
        assert_eq!(lc.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_wait_connected_resolves() {
        let lc = Arc::new(LifecycleController::new());
        let waiter = {
            let lc = lc.clone();
            tokio::spawn(async move { lc.wait_connected().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        lc.on_state_change(ConnectionState::Connected);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("gate never opened")
            .expect("waiter panicked");

        // Late waiters pass straight through
        tokio::time::timeout(Duration::from_millis(50), lc.wait_connected())
            .await
            .expect("gate closed again");
    }
}
