// Guardian Link - camera-to-inference streaming client core
// Socket lifecycle, frame capture loop, message routing and emergency evaluation

// Module declarations
pub mod capture;
pub mod config;
pub mod emergency;
pub mod error;
pub mod http;
pub mod managers;
pub mod router;
pub mod session;
pub mod stream;
pub mod telemetry;
pub mod testing;

// Re-exports for convenience
pub use capture::{CameraDevice, DeviceStatus, EncodedFrame, FitMode, FrameEncoder};
pub use config::{AppConfig, DeploymentProfile};
pub use emergency::{EmergencyDecision, EmergencyEvaluator, EmergencyEvent, EvaluationMode};
pub use error::ErrorCode;
pub use router::{AnalysisResult, MessageRouter, RouteOutcome};
pub use session::StreamingSession;
pub use stream::{ConnectionManager, ConnectionState, SendOutcome, WebSocketTransport};
