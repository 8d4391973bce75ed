//! Session state definitions.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;
use trainrelay_training::{RunId, TrainingStatus};

/// Connection state of the upstream event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of the session, for status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub connection: ConnectionState,
    pub last_status: TrainingStatus,
    pub active_run: Option<RunId>,
}

/// The process-wide view of the remote job.
#[derive(Debug)]
pub struct SessionState {
    connection: AtomicU8,
    last_status: RwLock<TrainingStatus>,
    active_run: RwLock<Option<RunId>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Disconnected, idle, no active run.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connection: AtomicU8::new(ConnectionState::Disconnected.to_u8()),
            last_status: RwLock::new(TrainingStatus::idle()),
            active_run: RwLock::new(None),
        }
    }

    // ---- connection flag ----

    #[must_use]
    pub fn connection(&self) -> ConnectionState {
        ConnectionState::from_u8(self.connection.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection() == ConnectionState::Connected
    }

    /// Stores `state` and returns the previous one.
    pub fn set_connection(&self, state: ConnectionState) -> ConnectionState {
        let previous = ConnectionState::from_u8(self.connection.swap(state.to_u8(), Ordering::AcqRel));
        if previous != state {
            debug!(from = %previous, to = %state, "Connection state changed");
        }
        previous
    }

    /// Atomically moves `from` to `to`. Returns false if the current state was not `from`.
    pub fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let moved = self
            .connection
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if moved {
            debug!(from = %from, to = %to, "Connection state changed");
        }
        moved
    }

    // ---- last known status ----

    #[must_use]
    pub fn last_status(&self) -> TrainingStatus {
        self.last_status.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_last_status(&self, status: TrainingStatus) {
        *self.last_status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Updates the epoch counters of the last status, keeping its tag and message.
    pub fn record_epoch_progress(&self, current: u32, total: u32) {
        let mut guard = self.last_status.write().unwrap_or_else(PoisonError::into_inner);
        guard.current_epoch = Some(current);
        guard.total_epochs = Some(total);
    }

    // ---- active run ----

    #[must_use]
    pub fn active_run(&self) -> Option<RunId> {
        *self.active_run.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_active_run(&self, run_id: Option<RunId>) {
        *self.active_run.write().unwrap_or_else(PoisonError::into_inner) = run_id;
    }

    /// Back to idle with no active run. The connection flag is left to its owner.
    pub fn reset(&self) {
        self.set_last_status(TrainingStatus::idle());
        self.set_active_run(None);
        debug!("Session state reset");
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            connection: self.connection(),
            last_status: self.last_status(),
            active_run: self.active_run(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trainrelay_training::TrainingState;

    #[test]
    fn test_new_session_is_disconnected_and_idle() {
        let session = SessionState::new();
        assert_eq!(session.connection(), ConnectionState::Disconnected);
        assert_eq!(session.last_status().status, TrainingState::Idle);
        assert_eq!(session.active_run(), None);
    }

    #[test]
    fn test_transition_only_from_expected_state() {
        let session = SessionState::new();
        assert!(session.transition(ConnectionState::Disconnected, ConnectionState::Connecting));
        assert!(!session.transition(ConnectionState::Disconnected, ConnectionState::Connecting));
        assert!(session.transition(ConnectionState::Connecting, ConnectionState::Connected));
        assert!(session.is_connected());
    }

    #[test]
    fn test_set_connection_returns_previous() {
        let session = SessionState::new();
        assert_eq!(session.set_connection(ConnectionState::Connected), ConnectionState::Disconnected);
        assert_eq!(session.set_connection(ConnectionState::Disconnected), ConnectionState::Connected);
        assert_eq!(session.set_connection(ConnectionState::Disconnected), ConnectionState::Disconnected);
    }

    #[test]
    fn test_epoch_progress_keeps_status_tag() {
        let session = SessionState::new();
        session.set_last_status(TrainingStatus::remote(TrainingState::Running, "training"));
        session.record_epoch_progress(3, 50);

        let status = session.last_status();
        assert_eq!(status.status, TrainingState::Running);
        assert_eq!(status.current_epoch, Some(3));
        assert_eq!(status.total_epochs, Some(50));
    }

    #[test]
    fn test_reset_keeps_connection_flag() {
        let session = SessionState::new();
        session.set_connection(ConnectionState::Connected);
        session.set_active_run(Some(RunId(4)));
        session.set_last_status(TrainingStatus::remote(TrainingState::Running, "training"));

        session.reset();

        assert_eq!(session.active_run(), None);
        assert_eq!(session.last_status().status, TrainingState::Idle);
        assert!(session.is_connected());
    }

    #[test]
    fn test_concurrent_single_winner_transition() {
        let session = Arc::new(SessionState::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || {
                    session.transition(ConnectionState::Disconnected, ConnectionState::Connecting)
                })
            })
            .collect();
        let winners = handles.into_iter().map(|h| h.join().unwrap()).filter(|w| *w).count();
        assert_eq!(winners, 1);
    }
}
