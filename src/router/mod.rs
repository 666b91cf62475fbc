//! Message router: parses inbound socket text and fans results out.
//!
//! Classification order: protocol control (`type` ping/pong) is swallowed,
//! an `error` envelope goes to the error consumers, and every other
//! well-formed object becomes an [`AnalysisResult`] delivered to each result
//! consumer in registration order. Malformed payloads are logged and dropped.

use log::debug;
use serde_json::Value;

use crate::error::{log_route_error, RouteError};
use crate::telemetry::{self, RouteKind};

pub mod wire;

pub use wire::{
    AnalysisResult, CaptionCandidate, ControlKind, DetectedObject, DetectedPerson,
    FrameMetadata, GestureDetection, ResultStatus,
};

/// One classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Control(ControlKind),
    ServerError(String),
    Result(Box<AnalysisResult>),
}

/// What `route` did with a message.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Control(ControlKind),
    ServerError(String),
    Delivered { consumers: usize },
    Dropped(RouteError),
}

pub type ResultConsumer = Box<dyn Fn(&AnalysisResult) + Send + Sync>;
pub type ErrorConsumer = Box<dyn Fn(&str) + Send + Sync>;

/// Classify raw inbound text without side effects.
pub fn classify(raw: &str) -> Result<InboundMessage, RouteError> {
    let value: Value = serde_json::from_str(raw).map_err(|err| RouteError::Malformed {
        reason: err.to_string(),
    })?;
    let Value::Object(envelope) = &value else {
        return Err(RouteError::UnsupportedShape {
            reason: format!("expected a JSON object, got {}", json_kind(&value)),
        });
    };

    if let Some(kind) = envelope
        .get("type")
        .and_then(Value::as_str)
        .and_then(ControlKind::parse)
    {
        return Ok(InboundMessage::Control(kind));
    }

    match envelope.get("error") {
        None | Some(Value::Null) => {}
        Some(Value::String(message)) => return Ok(InboundMessage::ServerError(message.clone())),
        Some(other) => return Ok(InboundMessage::ServerError(other.to_string())),
    }

    serde_json::from_value::<AnalysisResult>(value)
        .map(|result| InboundMessage::Result(Box::new(result)))
        .map_err(|err| RouteError::Malformed {
            reason: err.to_string(),
        })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Dispatches classified messages to registered consumers.
#[derive(Default)]
pub struct MessageRouter {
    consumers: Vec<ResultConsumer>,
    error_consumers: Vec<ErrorConsumer>,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a result consumer. Consumers run synchronously, in order.
    pub fn register<F>(&mut self, consumer: F)
    where
        F: Fn(&AnalysisResult) + Send + Sync + 'static,
    {
        self.consumers.push(Box::new(consumer));
    }

    /// Register a consumer for `{"error": ...}` envelopes.
    pub fn on_error<F>(&mut self, consumer: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.error_consumers.push(Box::new(consumer));
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    pub fn route(&self, raw: &str) -> RouteOutcome {
        match classify(raw) {
            Ok(InboundMessage::Control(kind)) => {
                debug!("[Router] Control message {:?} consumed", kind);
                telemetry::hub().record_route(RouteKind::Control);
                RouteOutcome::Control(kind)
            }
            Ok(InboundMessage::ServerError(message)) => {
                debug!("[Router] Server error: {}", message);
                telemetry::hub().record_route(RouteKind::ServerError);
                for consumer in &self.error_consumers {
                    consumer(&message);
                }
                RouteOutcome::ServerError(message)
            }
            Ok(InboundMessage::Result(result)) => {
                telemetry::hub().record_route(RouteKind::Result);
                for consumer in &self.consumers {
                    consumer(&result);
                }
                RouteOutcome::Delivered {
                    consumers: self.consumers.len(),
                }
            }
            Err(err) => {
                log_route_error(&err, "route");
                telemetry::hub().record_route(RouteKind::Malformed);
                RouteOutcome::Dropped(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording_router() -> (MessageRouter, Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<String>>>) {
        let results = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(Mutex::new(Vec::new()));
        let mut router = MessageRouter::new();
        let sink = Arc::clone(&results);
        router.register(move |r| {
            sink.lock()
                .unwrap()
                .push(r.headline().unwrap_or_default().to_string())
        });
        let sink = Arc::clone(&errors);
        router.on_error(move |e| sink.lock().unwrap().push(e.to_string()));
        (router, results, errors)
    }

    #[test]
    fn pong_is_never_forwarded() {
        let (router, results, errors) = recording_router();
        assert_eq!(
            router.route(r#"{"type":"pong"}"#),
            RouteOutcome::Control(ControlKind::Pong)
        );
        assert!(results.lock().unwrap().is_empty());
        assert!(errors.lock().unwrap().is_empty());
    }

    #[test]
    fn error_envelope_is_not_a_result() {
        let (router, results, errors) = recording_router();
        assert_eq!(
            router.route(r#"{"error":"model unavailable"}"#),
            RouteOutcome::ServerError("model unavailable".to_string())
        );
        assert!(results.lock().unwrap().is_empty());
        assert_eq!(*errors.lock().unwrap(), vec!["model unavailable"]);
    }

    #[test]
    fn null_error_field_is_a_result() {
        assert!(matches!(
            classify(r#"{"error":null,"caption":"ok"}"#),
            Ok(InboundMessage::Result(_))
        ));
    }

    #[test]
    fn results_are_delivered_in_arrival_order() {
        let (router, results, _) = recording_router();
        for caption in ["one", "two", "three"] {
            let raw = format!(r#"{{"caption":"{}"}}"#, caption);
            assert_eq!(router.route(&raw), RouteOutcome::Delivered { consumers: 1 });
        }
        assert_eq!(*results.lock().unwrap(), vec!["one", "two", "three"]);
    }

    #[test]
    fn consumers_run_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut router = MessageRouter::new();
        for id in 0..3 {
            let order = Arc::clone(&order);
            router.register(move |_| order.lock().unwrap().push(id));
        }
        router.route("{}");
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn malformed_payloads_are_dropped() {
        let (router, results, _) = recording_router();
        assert!(matches!(
            router.route("not json"),
            RouteOutcome::Dropped(RouteError::Malformed { .. })
        ));
        assert!(matches!(
            router.route("[1,2,3]"),
            RouteOutcome::Dropped(RouteError::UnsupportedShape { .. })
        ));
        assert!(matches!(
            router.route(r#"{"gestures":[{"tag":"Help"}]}"#),
            RouteOutcome::Dropped(RouteError::Malformed { .. })
        ));
        assert!(results.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_type_tag_falls_through_to_result() {
        assert!(matches!(
            classify(r#"{"type":"frame_ack"}"#),
            Ok(InboundMessage::Result(_))
        ));
    }
}
