//! Connection state and the per-instance lifecycle token.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Socket lifecycle state.
///
/// Driven only by transport callbacks inside the connection manager; it is
/// the single source of truth for whether a frame may be transmitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// Liveness handle shared by everything a session spawns.
///
/// Every asynchronous completion (socket open, camera acquisition, inbound
/// message) checks the token before acting, so a resolution that arrives
/// after teardown is discarded. Cancellation is one-way.
#[derive(Clone, Debug, Default)]
pub struct LifecycleToken {
    inner: CancellationToken,
}

impl LifecycleToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_live(&self) -> bool {
        !self.inner.is_cancelled()
    }

    /// Cancel the token. Returns `true` if it was still live.
    pub fn cancel(&self) -> bool {
        let was_live = self.is_live();
        self.inner.cancel();
        was_live
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }
}
