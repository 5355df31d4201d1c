// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Client-owned decode buffer for received camera frames.
//!
//! The frame stream fills a [`DecodeBuffer`] owned by the session:
//!
//! 1. The session creates the buffer during initialization
//! 2. The stream writes raw chunk images into it on every complete frame
//! 3. The acquisition loop copies out the raw images it needs while holding
//!    the session lock, then encodes and publishes outside the lock
//!
//! Raw images keep the sensor's pixel-format tag untouched; interpretation
//! happens later in [`crate::msg`] so an unknown tag only affects the one
//! artifact being built.

use std::collections::HashMap;

/// Image chunk kinds delivered by the sensor data stream.
///
/// The discriminants are the on-wire chunk type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ChunkKind {
    /// Radial distance image.
    RadialDistance = 100,
    /// Normalized amplitude image.
    NormAmplitude = 101,
    /// Raw (non-normalized) amplitude image.
    Amplitude = 103,
    /// Distance noise estimate image.
    DistanceNoise = 105,
    /// Cartesian X/Y/Z composite image.
    CartesianAll = 203,
    /// Per-pixel unit vectors, constant for a given sensor.
    UnitVectors = 223,
    /// 2D monochrome overlay image.
    Monochrome2d = 251,
    /// JPEG-compressed 2D color image.
    Jpeg = 260,
    /// Per-pixel confidence/validity image.
    Confidence = 300,
    /// Extrinsic calibration vector (not an image payload).
    ExtrinsicCalib = 400,
}

impl ChunkKind {
    /// Map an on-wire chunk type to a known kind.
    ///
    /// Returns `None` for chunk types this driver does not consume; callers
    /// skip those chunks rather than failing the frame.
    pub fn from_wire(typ: u32) -> Option<ChunkKind> {
        match typ {
            100 => Some(ChunkKind::RadialDistance),
            101 => Some(ChunkKind::NormAmplitude),
            103 => Some(ChunkKind::Amplitude),
            105 => Some(ChunkKind::DistanceNoise),
            203 => Some(ChunkKind::CartesianAll),
            223 => Some(ChunkKind::UnitVectors),
            251 => Some(ChunkKind::Monochrome2d),
            260 => Some(ChunkKind::Jpeg),
            300 => Some(ChunkKind::Confidence),
            400 => Some(ChunkKind::ExtrinsicCalib),
            _ => None,
        }
    }
}

/// One raw image buffer as delivered by the sensor.
///
/// The pixel-format tag is kept verbatim; [`crate::formats`] interprets it.
#[derive(Debug, Clone, Default)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub format_tag: u32,
    pub data: Vec<u8>,
}

impl RawImage {
    /// A zero-dimension image with no payload.
    pub fn empty() -> RawImage {
        RawImage::default()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// The most recently received raw frame.
///
/// Mutated only by the frame stream while the session lock is held; the
/// acquisition loop copies artifacts out under the same lock.
#[derive(Debug, Clone, Default)]
pub struct DecodeBuffer {
    images: HashMap<ChunkKind, RawImage>,
    /// Extrinsic calibration: 3 translation + 3 rotation components.
    pub extrinsics: Vec<f32>,
    /// Sensor-reported capture time in nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,
}

impl DecodeBuffer {
    pub fn new() -> DecodeBuffer {
        DecodeBuffer::default()
    }

    /// Drop all frame contents while retaining the map allocation.
    pub fn clear(&mut self) {
        self.images.clear();
        self.extrinsics.clear();
        self.timestamp_ns = 0;
    }

    /// Store a raw image, replacing any previous image of the same kind.
    pub fn insert(&mut self, kind: ChunkKind, image: RawImage) {
        self.images.insert(kind, image);
    }

    pub fn image(&self, kind: ChunkKind) -> Option<&RawImage> {
        self.images.get(&kind)
    }

    /// Copy out the raw image of the given kind, or an empty image if the
    /// frame did not carry one.  Missing chunks are expected whenever the
    /// active mask excludes the kind.
    pub fn image_or_empty(&self, kind: ChunkKind) -> RawImage {
        self.images.get(&kind).cloned().unwrap_or_default()
    }
}
