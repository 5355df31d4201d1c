// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Pixel format catalog for sensor-native image buffers.
//!
//! The sensor tags every image chunk with a numeric pixel-format identifier.
//! This module maps those tags to a destination layout: channel count, bit
//! depth, and the ROS image encoding string.  The mapping is pure and total
//! over the closed tag set; unknown tags yield `None` and callers treat that
//! as a recoverable per-artifact decode failure.

use edgefirst_schemas::sensor_msgs::PointField;

/// Pixel formats understood by the decoder.
///
/// The discriminants are the sensor's on-wire pixel-format tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PixelFormat {
    U8 = 0,
    S8 = 1,
    U16 = 2,
    S16 = 3,
    U32 = 4,
    S32 = 5,
    F32 = 6,
    U64 = 7,
    F64 = 8,
    /// Packed two-channel 16-bit format.
    U16x2 = 9,
    /// Interleaved three-channel float format used for cartesian data.
    F32x3 = 10,
}

/// Destination layout for a pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub channels: u32,
    pub bit_depth: u32,
    /// ROS image encoding string, e.g. `32FC1`.
    pub encoding: &'static str,
}

impl Layout {
    /// Bytes per pixel across all channels.
    pub fn bytes_per_pixel(&self) -> u32 {
        self.channels * self.bit_depth / 8
    }

    /// Row stride in bytes for the given image width.
    ///
    /// The width comes straight from the wire, so the multiply saturates
    /// rather than wrapping on a hostile value.
    pub fn step(&self, width: u32) -> u32 {
        width.saturating_mul(self.bytes_per_pixel())
    }
}

impl PixelFormat {
    /// Map an on-wire pixel-format tag to a known format.
    pub fn from_tag(tag: u32) -> Option<PixelFormat> {
        match tag {
            0 => Some(PixelFormat::U8),
            1 => Some(PixelFormat::S8),
            2 => Some(PixelFormat::U16),
            3 => Some(PixelFormat::S16),
            4 => Some(PixelFormat::U32),
            5 => Some(PixelFormat::S32),
            6 => Some(PixelFormat::F32),
            7 => Some(PixelFormat::U64),
            8 => Some(PixelFormat::F64),
            9 => Some(PixelFormat::U16x2),
            10 => Some(PixelFormat::F32x3),
            _ => None,
        }
    }

    /// Destination layout for this format.
    pub fn layout(self) -> Layout {
        match self {
            PixelFormat::U8 => Layout {
                channels: 1,
                bit_depth: 8,
                encoding: "8UC1",
            },
            PixelFormat::S8 => Layout {
                channels: 1,
                bit_depth: 8,
                encoding: "8SC1",
            },
            PixelFormat::U16 => Layout {
                channels: 1,
                bit_depth: 16,
                encoding: "16UC1",
            },
            PixelFormat::S16 => Layout {
                channels: 1,
                bit_depth: 16,
                encoding: "16SC1",
            },
            PixelFormat::U32 => Layout {
                channels: 1,
                bit_depth: 32,
                encoding: "32UC1",
            },
            PixelFormat::S32 => Layout {
                channels: 1,
                bit_depth: 32,
                encoding: "32SC1",
            },
            PixelFormat::F32 => Layout {
                channels: 1,
                bit_depth: 32,
                encoding: "32FC1",
            },
            PixelFormat::U64 => Layout {
                channels: 1,
                bit_depth: 64,
                encoding: "64UC1",
            },
            PixelFormat::F64 => Layout {
                channels: 1,
                bit_depth: 64,
                encoding: "64FC1",
            },
            PixelFormat::U16x2 => Layout {
                channels: 2,
                bit_depth: 16,
                encoding: "16UC2",
            },
            PixelFormat::F32x3 => Layout {
                channels: 3,
                bit_depth: 32,
                encoding: "32FC3",
            },
        }
    }

    /// True for the 8-bit formats accepted by the compressed image builder.
    pub fn is_byte_depth(self) -> bool {
        matches!(self, PixelFormat::U8 | PixelFormat::S8)
    }
}

/// Point field data types for PointCloud2 messages.
///
/// These values correspond to the ROS sensor_msgs/PointField datatype field.
/// All variants are defined for completeness, even if not all are currently
/// used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
#[allow(dead_code)]
pub enum PointFieldType {
    INT8 = 1,
    UINT8 = 2,
    INT16 = 3,
    UINT16 = 4,
    INT32 = 5,
    UINT32 = 6,
    FLOAT32 = 7,
    FLOAT64 = 8,
}

/// Build the standard XYZ point fields (12-byte stride).
///
/// Returns a vector of PointField definitions for:
/// - x: FLOAT32 at offset 0
/// - y: FLOAT32 at offset 4
/// - z: FLOAT32 at offset 8
pub fn standard_xyz_fields() -> Vec<PointField> {
    vec![
        PointField {
            name: String::from("x"),
            offset: 0,
            datatype: PointFieldType::FLOAT32 as u8,
            count: 1,
        },
        PointField {
            name: String::from("y"),
            offset: 4,
            datatype: PointFieldType::FLOAT32 as u8,
            count: 1,
        },
        PointField {
            name: String::from("z"),
            offset: 8,
            datatype: PointFieldType::FLOAT32 as u8,
            count: 1,
        },
    ]
}
