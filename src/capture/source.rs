//! Camera device abstraction.
//!
//! A [`CameraDevice`] is acquired asynchronously and yields a
//! [`CaptureHandle`]. Each device can be held by at most one handle at a
//! time; the exclusivity is tracked by a [`DeviceLease`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use image::RgbImage;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::DeviceError;

/// Preferred camera orientation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Front camera facing the operator
    #[default]
    User,
    /// Rear camera facing the scene
    Environment,
}

/// Parameters passed to the device on acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraRequest {
    pub width: u32,
    pub height: u32,
    pub facing: FacingMode,
}

/// Produces still frames from an acquired device.
pub trait FrameGrabber: Send {
    /// Latest frame, or `None` while the source is not ready yet.
    fn grab(&mut self) -> Option<RgbImage>;
}

/// A camera that can be acquired for exclusive use.
pub trait CameraDevice: Send + Sync {
    fn name(&self) -> &str;

    fn acquire(
        &self,
        request: &CameraRequest,
    ) -> BoxFuture<'static, Result<CaptureHandle, DeviceError>>;
}

/// Exclusive claim on a physical device; released on drop.
#[derive(Debug)]
pub struct DeviceLease {
    held: Arc<AtomicBool>,
}

impl DeviceLease {
    /// Claim the device flag, failing with `Busy` if someone else holds it.
    pub fn try_acquire(flag: &Arc<AtomicBool>, device: &str) -> Result<Self, DeviceError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DeviceError::Busy {
                device: device.to_string(),
            })?;
        Ok(Self {
            held: Arc::clone(flag),
        })
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

/// Live capture stream from an acquired device.
pub struct CaptureHandle {
    device: String,
    grabber: Option<Box<dyn FrameGrabber>>,
    lease: Option<DeviceLease>,
}

impl CaptureHandle {
    pub fn new(device: impl Into<String>, grabber: Box<dyn FrameGrabber>, lease: DeviceLease) -> Self {
        Self {
            device: device.into(),
            grabber: Some(grabber),
            lease: Some(lease),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    /// Grab a frame. A released handle never yields frames.
    /// Next frame, `None` while the source is warming up.
    ///
    /// # Errors
    /// `Released` once the handle has given the device back.
    pub fn grab(&mut self) -> Result<Option<RgbImage>, DeviceError> {
        let grabber = self.grabber.as_mut().ok_or(DeviceError::Released)?;
        Ok(grabber.grab())
    }

    /// Stop the stream and give the device back. Idempotent.
    pub fn release(&mut self) {
        if self.lease.take().is_some() {
            self.grabber.take();
            debug!("[Capture] Released device {}", self.device);
        }
    }

    pub fn is_released(&self) -> bool {
        self.lease.is_none()
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Camera backed by a single image file, replayed on every grab.
///
/// Used by the CLI to stream a fixed scene against a live service.
pub struct StillImageCamera {
    path: PathBuf,
    name: String,
    lease: Arc<AtomicBool>,
}

impl StillImageCamera {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("still:{}", path.display());
        Self {
            path,
            name,
            lease: Arc::new(AtomicBool::new(false)),
        }
    }
}

struct StillGrabber {
    frame: RgbImage,
}

impl FrameGrabber for StillGrabber {
    fn grab(&mut self) -> Option<RgbImage> {
        Some(self.frame.clone())
    }
}

impl CameraDevice for StillImageCamera {
    fn name(&self) -> &str {
        &self.name
    }

    fn acquire(
        &self,
        _request: &CameraRequest,
    ) -> BoxFuture<'static, Result<CaptureHandle, DeviceError>> {
        let path = self.path.clone();
        let name = self.name.clone();
        let lease = Arc::clone(&self.lease);
        async move {
            let lease = DeviceLease::try_acquire(&lease, &name)?;
            let load_path = path.clone();
            let loaded = tokio::task::spawn_blocking(move || image::open(&load_path))
                .await
                .map_err(|err| DeviceError::Io {
                    details: err.to_string(),
                })?;
            let frame = match loaded {
                Ok(img) => img.to_rgb8(),
                Err(image::ImageError::IoError(err)) => {
                    return Err(match err.kind() {
                        std::io::ErrorKind::NotFound => DeviceError::NotFound {
                            device: path.display().to_string(),
                        },
                        _ => DeviceError::from(err),
                    })
                }
                Err(err) => {
                    return Err(DeviceError::Io {
                        details: err.to_string(),
                    })
                }
            };
            info!(
                "[Capture] Opened {} ({}x{})",
                name,
                frame.width(),
                frame.height()
            );
            Ok(CaptureHandle::new(name, Box::new(StillGrabber { frame }), lease))
        }
        .boxed()
    }
}
