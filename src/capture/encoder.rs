//! Fixed-resolution JPEG frame encoder.
//!
//! Every frame is fitted to the configured target resolution regardless of
//! the source size, JPEG-encoded at the configured quality and wrapped as a
//! base64 data URL, which is the text payload the inference service expects.
//! The JPEG byte count is capped by a per-pixel budget that grows with the
//! configured quality; frames that would exceed it are re-encoded at a lower
//! quality.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgb, RgbImage};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::{validate_encoder_settings, CaptureConfig};
use crate::error::{ConfigError, FrameError};

/// Room for JPEG markers, quantization and Huffman tables
const HEADER_ALLOWANCE: usize = 2048;

/// JPEG bytes allowed per target pixel at quality 0
const BASE_BYTES_PER_PIXEL: f32 = 0.25;

/// Extra bytes per pixel for each unit of quality
const BYTES_PER_PIXEL_PER_QUALITY: f32 = 1.0;

/// Lowest JPEG quality tried when shrinking an oversized frame
const FLOOR_QUALITY: u8 = 10;

/// Quality decrement per re-encode attempt
const QUALITY_STEP: u8 = 15;

/// How a source frame with a different aspect ratio reaches the target size
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    /// Scale each axis independently, distorting the aspect ratio
    Stretch,
    /// Scale to fit inside the target and pad with black bars
    #[default]
    Letterbox,
    /// Scale to cover the target and trim the overflow evenly
    Crop,
}

/// One encoded frame, ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    data_url: String,
    jpeg_len: usize,
    jpeg_quality: u8,
    width: u32,
    height: u32,
}

impl EncodedFrame {
    pub const PREFIX: &'static str = "data:image/jpeg;base64,";

    pub fn as_str(&self) -> &str {
        &self.data_url
    }

    /// Length of the textual payload in bytes.
    pub fn len(&self) -> usize {
        self.data_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_url.is_empty()
    }

    pub fn jpeg_len(&self) -> usize {
        self.jpeg_len
    }

    /// JPEG quality the frame was finally written at, on the 1-100 scale.
    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn into_string(self) -> String {
        self.data_url
    }

    /// Parse a data URL payload back into pixels.
    pub fn decode(payload: &str) -> Result<RgbImage, FrameError> {
        let encoded = payload
            .strip_prefix(Self::PREFIX)
            .ok_or_else(|| FrameError::Decode {
                reason: "missing JPEG data URL prefix".to_string(),
            })?;
        let bytes = STANDARD.decode(encoded).map_err(|err| FrameError::Decode {
            reason: err.to_string(),
        })?;
        let img = image::load_from_memory_with_format(&bytes, ImageFormat::Jpeg).map_err(
            |err| FrameError::Decode {
                reason: err.to_string(),
            },
        )?;
        Ok(img.to_rgb8())
    }
}

/// Converts raw frames into bounded-size JPEG data URLs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameEncoder {
    width: u32,
    height: u32,
    quality: f32,
    fit: FitMode,
}

impl FrameEncoder {
    /// # Errors
    /// `InvalidResolution` for a zero dimension, `QualityOutOfRange` when the
    /// quality is outside `0.1..=0.9`.
    pub fn new(width: u32, height: u32, quality: f32, fit: FitMode) -> Result<Self, ConfigError> {
        validate_encoder_settings(width, height, quality)?;
        Ok(Self {
            width,
            height,
            quality,
            fit,
        })
    }

    pub fn from_config(config: &CaptureConfig) -> Result<Self, ConfigError> {
        Self::new(config.width, config.height, config.quality, config.fit)
    }

    pub fn target(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn fit_mode(&self) -> FitMode {
        self.fit
    }

    /// Quality on the JPEG 1-100 scale.
    pub fn jpeg_quality(&self) -> u8 {
        (self.quality * 100.0).round().clamp(1.0, 100.0) as u8
    }

    /// Upper bound on JPEG bytes for one frame, scaled by resolution and quality.
    pub fn max_jpeg_len(&self) -> usize {
        let pixels = self.width as f64 * self.height as f64;
        let per_pixel = (BASE_BYTES_PER_PIXEL + BYTES_PER_PIXEL_PER_QUALITY * self.quality) as f64;
        (pixels * per_pixel).ceil() as usize + HEADER_ALLOWANCE
    }

    /// Upper bound on the data URL length for one frame.
    pub fn max_payload_len(&self) -> usize {
        EncodedFrame::PREFIX.len() + base64_len(self.max_jpeg_len())
    }

    pub fn encode(&self, frame: &RgbImage) -> Result<EncodedFrame, FrameError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(FrameError::EmptyFrame);
        }
        let fitted = self.fit(frame);

        let mut quality = self.jpeg_quality();
        let jpeg = loop {
            let jpeg = encode_jpeg(&fitted, quality)?;
            if jpeg.len() <= self.max_jpeg_len() {
                break jpeg;
            }
            if quality <= FLOOR_QUALITY {
                return Err(FrameError::Encode {
                    reason: format!(
                        "{} JPEG bytes exceed the {} byte bound at quality {}",
                        jpeg.len(),
                        self.max_jpeg_len(),
                        quality
                    ),
                });
            }
            debug!(
                "[Encoder] {} bytes at quality {}, retrying lower",
                jpeg.len(),
                quality
            );
            quality = quality.saturating_sub(QUALITY_STEP).max(FLOOR_QUALITY);
        };

        let mut data_url =
            String::with_capacity(EncodedFrame::PREFIX.len() + base64_len(jpeg.len()));
        data_url.push_str(EncodedFrame::PREFIX);
        STANDARD.encode_string(&jpeg, &mut data_url);

        Ok(EncodedFrame {
            data_url,
            jpeg_len: jpeg.len(),
            jpeg_quality: quality,
            width: self.width,
            height: self.height,
        })
    }

    fn fit(&self, frame: &RgbImage) -> RgbImage {
        let (tw, th) = (self.width, self.height);
        let (sw, sh) = frame.dimensions();
        if (sw, sh) == (tw, th) {
            return frame.clone();
        }

        match self.fit {
            FitMode::Stretch => imageops::resize(frame, tw, th, FilterType::Triangle),
            FitMode::Letterbox => {
                let scale = f64::min(tw as f64 / sw as f64, th as f64 / sh as f64);
                let nw = ((sw as f64 * scale).round() as u32).clamp(1, tw);
                let nh = ((sh as f64 * scale).round() as u32).clamp(1, th);
                let scaled = imageops::resize(frame, nw, nh, FilterType::Triangle);
                let mut canvas = RgbImage::from_pixel(tw, th, Rgb([0, 0, 0]));
                imageops::overlay(
                    &mut canvas,
                    &scaled,
                    ((tw - nw) / 2) as i64,
                    ((th - nh) / 2) as i64,
                );
                canvas
            }
            FitMode::Crop => {
                let scale = f64::max(tw as f64 / sw as f64, th as f64 / sh as f64);
                let nw = ((sw as f64 * scale).ceil() as u32).max(tw);
                let nh = ((sh as f64 * scale).ceil() as u32).max(th);
                let scaled = imageops::resize(frame, nw, nh, FilterType::Triangle);
                imageops::crop_imm(&scaled, (nw - tw) / 2, (nh - th) / 2, tw, th).to_image()
            }
        }
    }
}

fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>, FrameError> {
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(frame)
        .map_err(|err| FrameError::Encode {
            reason: err.to_string(),
        })?;
    Ok(out.into_inner())
}

fn base64_len(bytes: usize) -> usize {
    bytes.div_ceil(3) * 4
}
