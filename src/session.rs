//! StreamingSession: composition root for one camera-to-service stream.
//!
//! Wires a [`ConnectionManager`], a [`FrameLoop`], a [`MessageRouter`] and
//! the [`EmergencyEvaluator`] together and publishes everything observable
//! through a [`BroadcastChannelManager`]. One session corresponds to one
//! mounted panel: `start()` at mount, `stop()` at unmount. A stopped session
//! cannot be restarted.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::info;
use tokio::sync::broadcast;

use crate::capture::{
    CameraDevice, CameraRequest, DeviceStatus, FrameEncoder, FrameLoop, FrameLoopContext,
};
use crate::config::AppConfig;
use crate::emergency::{EmergencyDecision, EmergencyEvaluator, EmergencyEvent, EvaluationMode};
use crate::error::{log_stream_error, ConfigError, StreamError};
use crate::managers::BroadcastChannelManager;
use crate::router::{AnalysisResult, MessageRouter};
use crate::stream::{ConnectionManager, ConnectionState, LifecycleToken, Transport};
use crate::telemetry;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct StreamingSession {
    config: AppConfig,
    mode: EvaluationMode,
    token: LifecycleToken,
    manager: Arc<ConnectionManager>,
    camera: Arc<dyn CameraDevice>,
    encoder: FrameEncoder,
    channels: Arc<BroadcastChannelManager>,
    /// Taken on start; consumers can only be added before that
    router: Mutex<Option<MessageRouter>>,
    frame_loop: Mutex<Option<FrameLoop>>,
}

impl StreamingSession {
    /// Build a session. The configuration is validated up front so that no
    /// timer is ever created with a zero period.
    pub fn new(
        config: AppConfig,
        transport: Arc<dyn Transport>,
        camera: Arc<dyn CameraDevice>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let encoder = FrameEncoder::from_config(&config.capture)?;
        let mode = EvaluationMode::from_flag(config.emergency.simulation_mode);
        let token = LifecycleToken::new();
        let manager = Arc::new(ConnectionManager::with_token(
            config.stream.clone(),
            transport,
            token.clone(),
        ));
        let channels = Arc::new(BroadcastChannelManager::new());
        let router = Self::build_router(
            EmergencyEvaluator::from_config(&config.emergency),
            mode,
            Arc::clone(&channels),
        );

        Ok(Self {
            config,
            mode,
            token,
            manager,
            camera,
            encoder,
            channels,
            router: Mutex::new(Some(router)),
            frame_loop: Mutex::new(None),
        })
    }

    /// The evaluator is the first consumer, so emergencies are published
    /// before the result itself reaches anyone else.
    fn build_router(
        evaluator: EmergencyEvaluator,
        mode: EvaluationMode,
        channels: Arc<BroadcastChannelManager>,
    ) -> MessageRouter {
        let mut router = MessageRouter::new();

        let result_channels = Arc::clone(&channels);
        router.register(move |result: &AnalysisResult| {
            let decision = evaluator.evaluate(result, mode);
            if decision.is_emergency() {
                telemetry::hub().record_emergency(decision == EmergencyDecision::Explicit);
                info!("[Session] Emergency detected: {:?}", decision);
                result_channels.publish_emergency(EmergencyEvent::new(
                    decision,
                    result.clone(),
                    evaluator.help_signal(),
                ));
            }
            result_channels.publish_result(result.clone());
        });

        router.on_error(move |message: &str| {
            channels.publish_server_error(message.to_string());
        });
        router
    }

    /// Register an additional synchronous result consumer.
    ///
    /// # Errors
    /// `AlreadyStarted` once the session has started.
    pub fn add_result_consumer<F>(&self, consumer: F) -> Result<(), StreamError>
    where
        F: Fn(&AnalysisResult) + Send + Sync + 'static,
    {
        match lock(&self.router).as_mut() {
            Some(router) => {
                router.register(consumer);
                Ok(())
            }
            None => Err(StreamError::AlreadyStarted),
        }
    }

    /// Start connecting and capturing. Must run inside a tokio runtime.
    pub fn start(&self) -> Result<(), StreamError> {
        if !self.token.is_live() {
            return Err(StreamError::Stopped);
        }
        let router = lock(&self.router)
            .take()
            .ok_or(StreamError::AlreadyStarted)?;
        let router = Arc::new(router);

        let state_channels = Arc::clone(&self.channels);
        let on_state = Arc::new(move |state: ConnectionState| {
            state_channels.publish_state(state);
        });
        let on_message = Arc::new(move |text: String| {
            router.route(&text);
        });
        self.manager
            .start(&self.config.stream.endpoint, on_state, on_message)
            .map_err(|err| {
                log_stream_error(&err, "session_start");
                err
            })?;

        let device_channels = Arc::clone(&self.channels);
        let frame_loop = FrameLoop::spawn(FrameLoopContext {
            camera: Arc::clone(&self.camera),
            request: CameraRequest {
                width: self.config.capture.width,
                height: self.config.capture.height,
                facing: self.config.capture.facing,
            },
            encoder: self.encoder,
            cadence: self.config.capture.cadence(),
            manager: Arc::clone(&self.manager),
            token: self.token.clone(),
            on_device: Arc::new(move |status: DeviceStatus| {
                device_channels.publish_device(status);
            }),
        })?;
        *lock(&self.frame_loop) = Some(frame_loop);

        info!(
            "[Session] Started ({:?} mode, {} ms cadence) against {}",
            self.mode, self.config.capture.cadence_ms, self.config.stream.endpoint
        );
        Ok(())
    }

    /// Tear everything down in one step. Idempotent.
    pub fn stop(&self) {
        let was_live = self.token.is_live();
        self.manager.stop();
        if let Some(frame_loop) = lock(&self.frame_loop).take() {
            frame_loop.stop();
        }
        if was_live {
            info!("[Session] Stopped");
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn is_live(&self) -> bool {
        self.token.is_live()
    }

    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn channels(&self) -> &Arc<BroadcastChannelManager> {
        &self.channels
    }

    pub fn subscribe_state(&self) -> broadcast::Receiver<ConnectionState> {
        self.channels.subscribe_state()
    }

    pub fn subscribe_results(&self) -> broadcast::Receiver<AnalysisResult> {
        self.channels.subscribe_results()
    }

    pub fn subscribe_emergencies(&self) -> broadcast::Receiver<EmergencyEvent> {
        self.channels.subscribe_emergencies()
    }

    pub fn subscribe_server_errors(&self) -> broadcast::Receiver<String> {
        self.channels.subscribe_server_errors()
    }

    pub fn subscribe_device(&self) -> broadcast::Receiver<DeviceStatus> {
        self.channels.subscribe_device()
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticCamera;
    use crate::testing::ScriptedTransport;

    fn session(simulation: bool) -> (StreamingSession, Arc<ScriptedTransport>) {
        let mut config = AppConfig::default();
        config.emergency.simulation_mode = simulation;
        let transport = Arc::new(ScriptedTransport::new());
        let session = StreamingSession::new(
            config,
            transport.clone(),
            Arc::new(SyntheticCamera::new("synthetic")),
        )
        .unwrap();
        (session, transport)
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.capture.cadence_ms = 0;
        let result = StreamingSession::new(
            config,
            Arc::new(ScriptedTransport::new()),
            Arc::new(SyntheticCamera::new("synthetic")),
        );
        assert!(matches!(result, Err(ConfigError::ZeroInterval { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_and_restart_are_rejected() {
        let (session, _transport) = session(false);
        session.start().unwrap();
        assert_eq!(session.start(), Err(StreamError::AlreadyStarted));
        assert_eq!(
            session.add_result_consumer(|_| {}),
            Err(StreamError::AlreadyStarted)
        );

        session.stop();
        session.stop();
        assert!(!session.is_live());
        assert_eq!(session.start(), Err(StreamError::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn emergency_is_published_before_result() {
        let (session, transport) = session(true);
        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);
        session
            .add_result_consumer(move |_| seen.lock().unwrap().push("consumer"))
            .unwrap();
        let mut emergencies = session.subscribe_emergencies();
        let mut results = session.subscribe_results();

        session.start().unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let peer = transport.last_peer().unwrap();
        peer.push_text(r#"{"gestures":[{"tag":"Help","probability":0.95}]}"#);
        peer.push_text(r#"{"type":"pong"}"#);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        let event = emergencies.try_recv().unwrap();
        assert_eq!(
            event.decision,
            EmergencyDecision::SimulatedGesture { probability: 0.95 }
        );
        assert!(event.report.is_some());
        assert_eq!(results.try_recv().unwrap().gestures.len(), 1);
        assert!(results.try_recv().is_err(), "pong must not surface");
        assert_eq!(*order.lock().unwrap(), vec!["consumer"]);
        session.stop();
    }
}
