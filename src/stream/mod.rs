//! Socket lifecycle: connection state, transports, and the connection manager.

pub mod manager;
pub mod state;
pub mod transport;

pub use manager::{ConnectionManager, MessageCallback, SendOutcome, StateCallback};
pub use state::{ConnectionState, LifecycleToken};
pub use transport::{
    LinkReader, LinkWriter, OutboundMessage, Transport, TransportEvent, TransportLink,
    WebSocketTransport,
};
