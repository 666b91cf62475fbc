//! Deterministic synthetic camera for tests and offline runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::source::{CameraDevice, CameraRequest, CaptureHandle, DeviceLease, FrameGrabber};
use crate::error::DeviceError;

/// Behaviour knobs for [`SyntheticCamera`].
#[derive(Debug, Clone)]
pub struct SyntheticOptions {
    /// Native sensor resolution, independent of the encoder target
    pub width: u32,
    pub height: u32,
    /// Grabs that return `None` before the stream is ready
    pub warmup_frames: u32,
    /// Simulated time to open the device
    pub acquire_delay: Duration,
    /// Fail acquisition with `PermissionDenied`
    pub deny_permission: bool,
    /// Amplitude of per-pixel noise added to the test pattern (0 disables)
    pub noise: u8,
    pub seed: u64,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            warmup_frames: 0,
            acquire_delay: Duration::ZERO,
            deny_permission: false,
            noise: 16,
            seed: 7,
        }
    }
}

/// Camera that renders a scrolling gradient with seeded noise.
pub struct SyntheticCamera {
    name: String,
    options: SyntheticOptions,
    lease: Arc<AtomicBool>,
    acquisitions: Arc<AtomicUsize>,
}

impl SyntheticCamera {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, SyntheticOptions::default())
    }

    pub fn with_options(name: impl Into<String>, options: SyntheticOptions) -> Self {
        Self {
            name: name.into(),
            options,
            lease: Arc::new(AtomicBool::new(false)),
            acquisitions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Whether some handle currently holds the device.
    pub fn is_held(&self) -> bool {
        self.lease.load(Ordering::Acquire)
    }

    /// Successful acquisitions so far.
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

struct PatternGrabber {
    width: u32,
    height: u32,
    warmup_left: u32,
    noise: u8,
    tick: u32,
    rng: StdRng,
}

impl FrameGrabber for PatternGrabber {
    fn grab(&mut self) -> Option<RgbImage> {
        if self.warmup_left > 0 {
            self.warmup_left -= 1;
            return None;
        }
        let tick = self.tick;
        self.tick = self.tick.wrapping_add(1);

        let (w, h) = (self.width, self.height);
        let mut frame = RgbImage::new(w, h);
        for (x, y, pixel) in frame.enumerate_pixels_mut() {
            let base_r = (x.wrapping_add(tick.wrapping_mul(4)) % w) * 255 / w;
            let base_g = y * 255 / h;
            let base_b = ((x + y) / 2).wrapping_add(tick) % 256;
            let jitter = if self.noise > 0 {
                self.rng.gen_range(0..=self.noise) as u32
            } else {
                0
            };
            *pixel = Rgb([
                (base_r + jitter).min(255) as u8,
                (base_g + jitter).min(255) as u8,
                (base_b + jitter).min(255) as u8,
            ]);
        }
        Some(frame)
    }
}

impl CameraDevice for SyntheticCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(
        &self,
        _request: &CameraRequest,
    ) -> BoxFuture<'static, Result<CaptureHandle, DeviceError>> {
        let name = self.name.clone();
        let options = self.options.clone();
        let lease = Arc::clone(&self.lease);
        let acquisitions = Arc::clone(&self.acquisitions);
        async move {
            if !options.acquire_delay.is_zero() {
                tokio::time::sleep(options.acquire_delay).await;
            }
            if options.deny_permission {
                return Err(DeviceError::PermissionDenied);
            }
            let lease = DeviceLease::try_acquire(&lease, &name)?;
            acquisitions.fetch_add(1, Ordering::SeqCst);
            let grabber = PatternGrabber {
                width: options.width.max(1),
                height: options.height.max(1),
                warmup_left: options.warmup_frames,
                noise: options.noise,
                tick: 0,
                rng: StdRng::seed_from_u64(options.seed),
            };
            Ok(CaptureHandle::new(name, Box::new(grabber), lease))
        }
        .boxed()
    }
}
