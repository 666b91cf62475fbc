// Managers Module
//
// Focused manager classes used by the streaming session:
// - BroadcastChannelManager: Tokio broadcast channels for session outputs

pub mod broadcast_manager;

pub use broadcast_manager::BroadcastChannelManager;
