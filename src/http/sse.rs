use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

pub type EventStream = Sse<Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>>;

/// Turn a session broadcast channel into a Server-Sent Events stream.
///
/// Lagged receivers skip the missed items rather than closing the stream.
pub fn from_broadcast<T>(receiver: broadcast::Receiver<T>, event: &'static str) -> EventStream
where
    T: Serialize + Clone + Send + 'static,
{
    let stream = BroadcastStream::new(receiver).filter_map(move |item| async move {
        match item {
            Ok(value) => match serde_json::to_string(&value) {
                Ok(payload) => Some(Ok(Event::default().event(event).data(payload))),
                Err(_) => None,
            },
            Err(_) => None,
        }
    });

    Sse::new(Box::pin(stream) as Pin<Box<_>>).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(5))
            .text("guardian-keepalive"),
    )
}
