// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Builders from raw sensor buffers to publishable ROS-schema messages.
//!
//! All builders are defensive: an empty buffer produces a zero-dimension
//! message with an empty payload, and an unsupported pixel format degrades
//! only the one artifact being built.  Neither case is an error; consumers
//! can distinguish "no data" from "never published".

use crate::formats::{standard_xyz_fields, PixelFormat};
use crate::frame::RawImage;
use edgefirst_schemas::{
    sensor_msgs::{CompressedImage, Image, PointCloud2},
    std_msgs::Header,
};
use log::warn;
use serde::{Deserialize, Serialize};

/// Extrinsic calibration of the camera head: translation in meters and
/// rotation in radians, in the optical frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Extrinsics {
    pub header: Header,
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
    pub rot_x: f64,
    pub rot_y: f64,
    pub rot_z: f64,
}

impl Default for Extrinsics {
    fn default() -> Self {
        Extrinsics {
            header: Header {
                stamp: edgefirst_schemas::builtin_interfaces::Time { sec: 0, nanosec: 0 },
                frame_id: String::new(),
            },
            tx: 0.0,
            ty: 0.0,
            tz: 0.0,
            rot_x: 0.0,
            rot_y: 0.0,
            rot_z: 0.0,
        }
    }
}

/// Number of components in a complete extrinsics vector.
pub const EXTRINSICS_LEN: usize = 6;

/// Convert a raw sensor image into a ROS Image message.
///
/// Unsupported pixel formats keep the image dimensions but leave the
/// encoding and payload empty.
pub fn to_image(raw: &RawImage, header: &Header) -> Image {
    let mut result = Image {
        header: header.clone(),
        height: raw.height,
        width: raw.width,
        encoding: String::new(),
        is_bigendian: 0,
        step: 0,
        data: Vec::new(),
    };

    if raw.is_empty() {
        return result;
    }

    let format = match PixelFormat::from_tag(raw.format_tag) {
        Some(format) => format,
        None => {
            warn!("unsupported pixel format {} for image", raw.format_tag);
            return result;
        }
    };

    let layout = format.layout();
    result.encoding = String::from(layout.encoding);
    result.step = layout.step(raw.width);

    let expected = result.step as usize * result.height as usize;
    let len = expected.min(raw.data.len());
    result.data.extend_from_slice(&raw.data[..len]);

    result
}

/// Convert an already-compressed raw buffer into a CompressedImage message.
///
/// The buffer must carry an 8-bit pixel format; anything else is a decode
/// failure for this artifact only and yields a header-only message.
pub fn to_compressed_image(raw: &RawImage, header: &Header, format: &str) -> CompressedImage {
    let mut result = CompressedImage {
        header: header.clone(),
        format: String::from(format),
        data: Vec::new(),
    };

    if raw.is_empty() {
        return result;
    }

    match PixelFormat::from_tag(raw.format_tag) {
        Some(pixel_format) if pixel_format.is_byte_depth() => {}
        _ => {
            warn!(
                "invalid pixel format {} for {} data",
                raw.format_tag, format
            );
            return result;
        }
    }

    let len = (raw.width as usize * raw.height as usize).min(raw.data.len());
    result.data.extend_from_slice(&raw.data[..len]);
    result
}

/// Convert a cartesian composite image into a PointCloud2 message.
///
/// Requires the interleaved three-channel float layout (or plain `F32`);
/// lays out x/y/z FLOAT32 fields with a 12-byte point step and marks the
/// cloud dense.
pub fn to_cloud(raw: &RawImage, header: &Header) -> PointCloud2 {
    let mut result = PointCloud2 {
        header: header.clone(),
        height: raw.height,
        width: raw.width,
        fields: Vec::new(),
        is_bigendian: false,
        point_step: 0,
        row_step: 0,
        data: Vec::new(),
        is_dense: false,
    };

    if raw.is_empty() {
        return result;
    }

    match PixelFormat::from_tag(raw.format_tag) {
        Some(PixelFormat::F32x3) | Some(PixelFormat::F32) => {}
        _ => {
            warn!(
                "unsupported pixel format {} for point cloud",
                raw.format_tag
            );
            return result;
        }
    }

    result.fields = standard_xyz_fields();
    result.point_step = result.fields.len() as u32 * 4;
    // Width is wire-controlled; saturate instead of wrapping
    result.row_step = result.point_step.saturating_mul(result.width);
    result.is_dense = true;

    let expected = result.row_step as usize * result.height as usize;
    let len = expected.min(raw.data.len());
    result.data.extend_from_slice(&raw.data[..len]);

    result
}

/// Build the extrinsics message from the sensor-reported vector.
///
/// Firmware has been seen to deliver short vectors; missing components
/// default to zero and the artifact still publishes as success.
pub fn to_extrinsics(values: &[f32], header: &Header) -> Extrinsics {
    if values.len() < EXTRINSICS_LEN {
        warn!(
            "short extrinsics vector ({} of {} components)",
            values.len(),
            EXTRINSICS_LEN
        );
    }

    let component = |index: usize| values.get(index).copied().unwrap_or(0.0) as f64;

    Extrinsics {
        header: header.clone(),
        tx: component(0),
        ty: component(1),
        tz: component(2),
        rot_x: component(3),
        rot_y: component(4),
        rot_z: component(5),
    }
}
