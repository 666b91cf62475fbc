//! Frame capture: camera devices, the fixed-resolution encoder, and the
//! cadence-driven frame loop that feeds the connection manager.

pub mod encoder;
pub mod frame_loop;
pub mod source;
pub mod synthetic;

pub use encoder::{EncodedFrame, FitMode, FrameEncoder};
pub use frame_loop::{DeviceCallback, DeviceStatus, FrameLoop, FrameLoopContext};
pub use source::{
    CameraDevice, CameraRequest, CaptureHandle, DeviceLease, FacingMode, FrameGrabber,
    StillImageCamera,
};
pub use synthetic::{SyntheticCamera, SyntheticOptions};
