//! Testability harness utilities.
//!
//! Deterministic stand-ins for the network and camera edges so the
//! connection state machine and the capture loop can be driven without a
//! live inference service. Used by unit tests, the integration suite and the
//! CLI's offline mode.

pub mod scripted_transport;

pub use scripted_transport::{ConnectGate, ScriptedPeer, ScriptedTransport};
