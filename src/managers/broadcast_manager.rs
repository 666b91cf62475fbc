// BroadcastChannelManager: Centralized tokio broadcast channel management
// Single Responsibility: Session output channels and their subscriptions

use tokio::sync::broadcast;

use crate::capture::DeviceStatus;
use crate::emergency::EmergencyEvent;
use crate::router::AnalysisResult;
use crate::stream::ConnectionState;

/// Fan-out channels a session publishes to
///
/// The presentation layer (CLI printer, debug HTTP, tests) subscribes here
/// instead of registering callbacks on the session. Publishing never blocks:
/// with no subscriber the value is discarded, and a slow subscriber lags.
///
/// # Channel Types
/// - State: connection state transitions
/// - Results: every analysis result, in arrival order
/// - Emergencies: results that evaluated to an emergency
/// - Server errors: `{"error": ...}` envelopes
/// - Device: camera acquisition status
pub struct BroadcastChannelManager {
    state: broadcast::Sender<ConnectionState>,
    results: broadcast::Sender<AnalysisResult>,
    emergencies: broadcast::Sender<EmergencyEvent>,
    server_errors: broadcast::Sender<String>,
    device: broadcast::Sender<DeviceStatus>,
}

impl BroadcastChannelManager {
    /// Create all channels up front
    ///
    /// # Notes
    /// - Results buffer: 100 messages (~20 s at the vision panel cadence)
    /// - Emergency buffer is smaller; emergencies are rare and each one matters
    pub fn new() -> Self {
        let (state, _) = broadcast::channel(32);
        let (results, _) = broadcast::channel(100);
        let (emergencies, _) = broadcast::channel(16);
        let (server_errors, _) = broadcast::channel(32);
        let (device, _) = broadcast::channel(8);
        Self {
            state,
            results,
            emergencies,
            server_errors,
            device,
        }
    }

    // ========================================================================
    // PUBLISH
    // ========================================================================

    pub fn publish_state(&self, state: ConnectionState) {
        let _ = self.state.send(state);
    }

    pub fn publish_result(&self, result: AnalysisResult) {
        let _ = self.results.send(result);
    }

    pub fn publish_emergency(&self, event: EmergencyEvent) {
        let _ = self.emergencies.send(event);
    }

    pub fn publish_server_error(&self, message: String) {
        let _ = self.server_errors.send(message);
    }

    pub fn publish_device(&self, status: DeviceStatus) {
        let _ = self.device.send(status);
    }

    // ========================================================================
    // SUBSCRIBE
    // ========================================================================

    /// Subscribe to connection state transitions
    ///
    /// Each subscriber gets an independent receiver starting at the next
    /// transition; earlier transitions are not replayed.
    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn subscribe_results(&self) -> broadcast::Receiver<AnalysisResult> {
        self.results.subscribe()
    }

    pub fn subscribe_emergencies(&self) -> broadcast::Receiver<EmergencyEvent> {
        self.emergencies.subscribe()
    }

    pub fn subscribe_server_errors(&self) -> broadcast::Receiver<String> {
        self.server_errors.subscribe()
    }

    pub fn subscribe_device(&self) -> broadcast::Receiver<DeviceStatus> {
        self.device.subscribe()
    }
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}
