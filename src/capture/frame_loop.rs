//! Cadence-driven capture loop.
//!
//! Acquires the camera once, then on every tick grabs, encodes and hands a
//! frame to the connection manager. A tick is a no-op when the source is not
//! ready or the link is not connected; frames are never queued. The loop's
//! interval is independent of the manager's heartbeat.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::encoder::FrameEncoder;
use super::source::{CameraDevice, CameraRequest, CaptureHandle};
use crate::error::{log_device_error, log_frame_error, ErrorCode, StreamError};
use crate::stream::{ConnectionManager, LifecycleToken, OutboundMessage, SendOutcome};
use crate::telemetry;

/// Camera status as reported to the session consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeviceStatus {
    Acquiring,
    Ready { device: String },
    /// Terminal for this session; capture does not proceed
    Failed { code: i32, message: String },
}

pub type DeviceCallback = Arc<dyn Fn(DeviceStatus) + Send + Sync>;

/// Everything the loop needs, handed over at spawn time.
pub struct FrameLoopContext {
    pub camera: Arc<dyn CameraDevice>,
    pub request: CameraRequest,
    pub encoder: FrameEncoder,
    pub cadence: Duration,
    pub manager: Arc<ConnectionManager>,
    pub token: LifecycleToken,
    pub on_device: DeviceCallback,
}

/// Handle to a running capture loop.
pub struct FrameLoop {
    token: LifecycleToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FrameLoop {
    /// Spawn the loop on the current runtime.
    pub fn spawn(ctx: FrameLoopContext) -> Result<Self, StreamError> {
        let runtime = Handle::try_current().map_err(|err| StreamError::TransportUnavailable {
            endpoint: ctx.camera.name().to_string(),
            reason: err.to_string(),
        })?;
        let token = ctx.token.clone();
        let task = runtime.spawn(run(ctx));
        Ok(Self {
            token,
            task: Mutex::new(Some(task)),
        })
    }

    /// Cancel the loop and release the camera. Idempotent.
    pub fn stop(&self) {
        self.token.cancel();
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(true, |task| task.is_finished())
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn emit(ctx: &FrameLoopContext, status: DeviceStatus) {
    if ctx.token.is_live() {
        (ctx.on_device)(status);
    }
}

async fn run(ctx: FrameLoopContext) {
    emit(&ctx, DeviceStatus::Acquiring);

    let acquired = tokio::select! {
        biased;
        _ = ctx.token.cancelled() => return,
        result = ctx.camera.acquire(&ctx.request) => result,
    };
    let mut handle = match acquired {
        Ok(handle) => handle,
        Err(err) => {
            if ctx.token.is_live() {
                log_device_error(&err, "acquire");
                telemetry::hub().record_error(&err, "acquire");
                emit(
                    &ctx,
                    DeviceStatus::Failed {
                        code: err.code(),
                        message: err.message(),
                    },
                );
            }
            return;
        }
    };
    if !ctx.token.is_live() {
        // Acquisition resolved after teardown
        handle.release();
        return;
    }

    tracing::info!("[FrameLoop] Capturing from {}", handle.device());
    emit(
        &ctx,
        DeviceStatus::Ready {
            device: handle.device().to_string(),
        },
    );

    capture(&ctx, &mut handle).await;
    handle.release();
}

async fn capture(ctx: &FrameLoopContext, handle: &mut CaptureHandle) {
    let mut ticker = interval(ctx.cadence);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = ctx.token.cancelled() => return,
            _ = ticker.tick() => {}
        }
        if !ctx.manager.is_connected() {
            continue;
        }
        let raw = match handle.grab() {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::debug!("[FrameLoop] Source not ready, skipping tick");
                continue;
            }
            Err(err) => {
                log_device_error(&err, "grab");
                telemetry::hub().record_error(&err, "grab");
                return;
            }
        };

        let encoder = ctx.encoder;
        let encoded = match tokio::task::spawn_blocking(move || encoder.encode(&raw)).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(err)) => {
                log_frame_error(&err, "encode");
                telemetry::hub().record_error(&err, "encode");
                continue;
            }
            Err(err) => {
                tracing::warn!("[FrameLoop] Encode task failed: {}", err);
                continue;
            }
        };
        if !ctx.token.is_live() {
            return;
        }
        let bytes = encoded.len();
        if let SendOutcome::Dropped(reason) = ctx.manager.send(OutboundMessage::Frame(encoded)) {
            tracing::debug!("[FrameLoop] Frame of {} bytes dropped: {:?}", bytes, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FacingMode, FitMode, SyntheticCamera, SyntheticOptions};
    use crate::config::StreamConfig;
    use crate::error::DeviceError;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use crate::stream::ConnectionState;
    use crate::testing::ScriptedTransport;

    struct Harness {
        transport: Arc<ScriptedTransport>,
        manager: Arc<ConnectionManager>,
        token: LifecycleToken,
        statuses: Arc<Mutex<Vec<DeviceStatus>>>,
    }

    impl Harness {
        fn new() -> Self {
            let transport = Arc::new(ScriptedTransport::new());
            let token = LifecycleToken::new();
            let manager = Arc::new(ConnectionManager::with_token(
                StreamConfig::default(),
                transport.clone(),
                token.clone(),
            ));
            Self {
                transport,
                manager,
                token,
                statuses: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn spawn(&self, camera: Arc<dyn CameraDevice>, cadence_ms: u64) -> FrameLoop {
            let statuses = Arc::clone(&self.statuses);
            FrameLoop::spawn(FrameLoopContext {
                camera,
                request: CameraRequest {
                    width: 64,
                    height: 48,
                    facing: FacingMode::User,
                },
                encoder: FrameEncoder::new(64, 48, 0.6, FitMode::Letterbox).unwrap(),
                cadence: Duration::from_millis(cadence_ms),
                manager: Arc::clone(&self.manager),
                token: self.token.clone(),
                on_device: Arc::new(move |s| statuses.lock().unwrap().push(s)),
            })
            .unwrap()
        }

        fn statuses(&self) -> Vec<DeviceStatus> {
            self.statuses.lock().unwrap().clone()
        }
    }

    fn small_camera(options: SyntheticOptions) -> Arc<SyntheticCamera> {
        Arc::new(SyntheticCamera::with_options(
            "synthetic",
            SyntheticOptions {
                width: 80,
                height: 60,
                ..options
            },
        ))
    }

    async fn wait_for<F: FnMut() -> bool>(mut cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn frames_flow_only_while_connected() {
        let harness = Harness::new();
        let camera = small_camera(SyntheticOptions::default());
        let frame_loop = harness.spawn(camera.clone(), 20);

        // Not connected yet: ticks are no-ops
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(
            harness.statuses().last(),
            Some(DeviceStatus::Ready { .. })
        ));
        assert_eq!(harness.manager.state(), ConnectionState::Disconnected);

        harness
            .manager
            .start("ws://scripted", Arc::new(|_| {}), Arc::new(|_| {}))
            .unwrap();
        wait_for(|| harness.manager.is_connected()).await;
        let peer = harness.transport.last_peer().unwrap();

        let mut frames = Vec::new();
        wait_for(|| {
            frames.extend(peer.drain_sent());
            frames.len() >= 2
        })
        .await;
        for payload in &frames {
            let decoded = crate::capture::EncodedFrame::decode(payload).unwrap();
            assert_eq!(decoded.dimensions(), (64, 48));
        }

        frame_loop.stop();
        harness.manager.stop();
        assert!(frame_loop.is_finished());
        wait_for(|| !camera.is_held()).await;
    }

    #[tokio::test]
    async fn acquisition_failure_is_terminal() {
        let harness = Harness::new();
        let camera = small_camera(SyntheticOptions {
            deny_permission: true,
            ..SyntheticOptions::default()
        });
        let frame_loop = harness.spawn(camera, 20);

        wait_for(|| frame_loop.is_finished()).await;
        assert_eq!(
            harness.statuses(),
            vec![
                DeviceStatus::Acquiring,
                DeviceStatus::Failed {
                    code: 2002,
                    message: crate::error::DeviceError::PermissionDenied.message(),
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_acquisition() {
        let harness = Harness::new();
        let camera = small_camera(SyntheticOptions {
            acquire_delay: Duration::from_secs(1),
            ..SyntheticOptions::default()
        });
        let frame_loop = harness.spawn(camera.clone(), 20);
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        frame_loop.stop();
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(harness.statuses(), vec![DeviceStatus::Acquiring]);
        assert!(!camera.is_held());
        assert_eq!(camera.acquisitions(), 0);
    }

    /// Camera whose acquisition completes only after the session was torn
    /// down underneath it.
    struct TeardownDuringAcquire {
        inner: Arc<SyntheticCamera>,
        token: LifecycleToken,
    }

    impl CameraDevice for TeardownDuringAcquire {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn acquire(
            &self,
            request: &CameraRequest,
        ) -> BoxFuture<'static, Result<CaptureHandle, DeviceError>> {
            let acquire = self.inner.acquire(request);
            let token = self.token.clone();
            async move {
                let handle = acquire.await;
                token.cancel();
                handle
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn acquisition_completing_after_teardown_is_released() {
        let harness = Harness::new();
        let inner = small_camera(SyntheticOptions::default());
        let camera = Arc::new(TeardownDuringAcquire {
            inner: inner.clone(),
            token: harness.token.clone(),
        });
        let frame_loop = harness.spawn(camera, 20);

        wait_for(|| frame_loop.is_finished()).await;
        assert_eq!(inner.acquisitions(), 1);
        assert!(!inner.is_held());
        assert_eq!(harness.statuses(), vec![DeviceStatus::Acquiring]);
    }

    #[tokio::test]
    async fn warming_source_skips_ticks() {
        let harness = Harness::new();
        let camera = small_camera(SyntheticOptions {
            warmup_frames: 3,
            ..SyntheticOptions::default()
        });
        harness
            .manager
            .start("ws://scripted", Arc::new(|_| {}), Arc::new(|_| {}))
            .unwrap();
        wait_for(|| harness.manager.is_connected()).await;
        let frame_loop = harness.spawn(camera, 20);
        let peer = harness.transport.last_peer().unwrap();

        wait_for(|| !peer.drain_sent().is_empty()).await;
        frame_loop.stop();
        harness.manager.stop();
    }
}
