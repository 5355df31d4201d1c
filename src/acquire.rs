// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! The acquisition loop.
//!
//! This is the resilience core of the driver.  It owns the retry policy the
//! session deliberately does not have:
//!
//! 1. **Bootstrap**: initialize the session with the calibration-only mask,
//!    retrying forever with a fixed backoff so a camera that is not yet
//!    powered or plugged in at startup is simply waited for.
//! 2. **Calibration**: on the first acquired frame, publish the per-pixel
//!    unit vectors latched, then rebuild the session with the user's
//!    requested mask.
//! 3. **Streaming**: acquire, decode and publish; a single timeout is
//!    routine, but a stale stream (no frame within the tolerance window)
//!    forces a rebuild with the *currently active* mask since unit vectors
//!    need no refetch after the first bootstrap.
//!
//! Frame pull and raw-artifact extraction happen under the session lock;
//! encoding and publishing happen outside it so control operations and the
//! next frame are never starved by slow downstream consumers.
//!
//! The loop has no terminal state of its own; it runs until the stop token
//! is raised, which is checked at every loop head and before every retry
//! sleep.

use crate::camera::Mask;
use crate::frame::{ChunkKind, RawImage};
use crate::msg;
use crate::publish::PublishBoundary;
use crate::session::{self, LoopParams, SharedSession};
use cdr::{CdrLe, Infinite};
use edgefirst_schemas::{builtin_interfaces::Time, std_msgs::Header};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const IMAGE_TYPE: &str = "sensor_msgs/msg/Image";
const COMPRESSED_IMAGE_TYPE: &str = "sensor_msgs/msg/CompressedImage";
const CLOUD_TYPE: &str = "sensor_msgs/msg/PointCloud2";
const EXTRINSICS_TYPE: &str = "tofpub/msg/Extrinsics";

/// Static configuration of the acquisition loop.
#[derive(Debug, Clone)]
pub struct LoopOptions {
    /// The artifact mask requested by the user, applied after calibration.
    pub schema_mask: Mask,
    pub data_port: u16,
    /// Frame id for artifacts in the sensor/world frame (the point cloud).
    pub frame_id: String,
    /// Frame id for 2D artifacts and extrinsics, camera optical convention.
    pub optical_frame_id: String,
    /// Sensor/host clock difference in seconds beyond which the host
    /// receive time is substituted for the sensor capture time.
    pub frame_latency_thresh: f64,
    /// Backoff between initialization attempts.
    pub retry_interval: Duration,
}

impl Default for LoopOptions {
    fn default() -> LoopOptions {
        LoopOptions {
            schema_mask: Mask::all_images(),
            data_port: 50010,
            frame_id: String::from("tof_link"),
            optical_frame_id: String::from("tof_optical_link"),
            frame_latency_thresh: 60.0,
            retry_interval: Duration::from_secs(1),
        }
    }
}

/// Raw artifacts copied out of the decode buffer under the session lock.
struct FrameArtifacts {
    timestamp_ns: u64,
    unit_vectors: RawImage,
    confidence: RawImage,
    cartesian: RawImage,
    distance: RawImage,
    distance_noise: RawImage,
    amplitude: RawImage,
    raw_amplitude: RawImage,
    gray: RawImage,
    jpeg: RawImage,
    extrinsics: Vec<f32>,
}

pub struct AcquisitionLoop {
    session: SharedSession,
    boundary: Arc<dyn PublishBoundary>,
    options: LoopOptions,
}

impl AcquisitionLoop {
    pub fn new(
        session: SharedSession,
        boundary: Arc<dyn PublishBoundary>,
        options: LoopOptions,
    ) -> AcquisitionLoop {
        AcquisitionLoop {
            session,
            boundary,
            options,
        }
    }

    /// Drive the acquisition state machine until `stop` is raised.
    pub fn run(&self, stop: &AtomicBool) {
        // The camera may not be powered or plugged in yet; wait for it.
        if !self.reinitialize(Mask::calibration_only(), stop) {
            return;
        }

        let mut got_uvec = false;
        let mut last_frame = Instant::now();

        while !stop.load(Ordering::Relaxed) {
            let (received, params) = {
                let mut session = session::lock(&self.session);
                let params = session.params;
                (session.acquire_frame(params.timeout_millis), params)
            };

            if !received {
                self.note_timeout(&params);

                if last_frame.elapsed().as_secs_f64() > params.timeout_tolerance_secs {
                    warn!("no frame within tolerance, restarting frame grabber");
                    // Unit vectors need no refetch once the first bootstrap
                    // completed, so the rebuild keeps the active mask.
                    let mask = match got_uvec {
                        true => self.options.schema_mask,
                        false => Mask::calibration_only(),
                    };
                    if !self.reinitialize(mask, stop) {
                        return;
                    }
                    last_frame = Instant::now();
                }
                continue;
            }

            last_frame = Instant::now();

            let artifacts = self.extract();
            let stamp = self.frame_stamp(artifacts.timestamp_ns);
            let head = Header {
                stamp: stamp.clone(),
                frame_id: self.options.frame_id.clone(),
            };
            let optical_head = Header {
                stamp,
                frame_id: self.options.optical_frame_id.clone(),
            };

            if !got_uvec {
                // Publish unit vectors once, latched, then rebuild the
                // session with the mask the user actually asked for.
                let image = msg::to_image(&artifacts.unit_vectors, &optical_head);
                info!("unit vector image size: {}", image.height * image.width);
                self.publish_latched("unit_vectors", IMAGE_TYPE, &image);
                got_uvec = true;

                info!(
                    "got unit vectors, restarting frame grabber with mask {}",
                    self.options.schema_mask
                );
                if !self.reinitialize(self.options.schema_mask, stop) {
                    return;
                }
                info!("start streaming data");
                last_frame = Instant::now();
                continue;
            }

            self.publish_frame(&artifacts, &head, &optical_head);
        }
    }

    /// Copy the raw artifacts out of the decode buffer under the lock.
    fn extract(&self) -> FrameArtifacts {
        let session = session::lock(&self.session);
        let frame = &session.frame;
        FrameArtifacts {
            timestamp_ns: frame.timestamp_ns,
            unit_vectors: frame.image_or_empty(ChunkKind::UnitVectors),
            confidence: frame.image_or_empty(ChunkKind::Confidence),
            cartesian: frame.image_or_empty(ChunkKind::CartesianAll),
            distance: frame.image_or_empty(ChunkKind::RadialDistance),
            distance_noise: frame.image_or_empty(ChunkKind::DistanceNoise),
            amplitude: frame.image_or_empty(ChunkKind::NormAmplitude),
            raw_amplitude: frame.image_or_empty(ChunkKind::Amplitude),
            gray: frame.image_or_empty(ChunkKind::Monochrome2d),
            jpeg: frame.image_or_empty(ChunkKind::Jpeg),
            extrinsics: frame.extrinsics.clone(),
        }
    }

    /// Publish every artifact enabled by the mask, in fixed order.
    fn publish_frame(&self, artifacts: &FrameArtifacts, head: &Header, optical_head: &Header) {
        let mask = self.options.schema_mask;

        // Confidence carries validity regardless of the requested mask
        self.publish(
            "confidence",
            IMAGE_TYPE,
            &msg::to_image(&artifacts.confidence, optical_head),
        );

        if mask.contains(Mask::CARTESIAN) {
            self.publish("cloud", CLOUD_TYPE, &msg::to_cloud(&artifacts.cartesian, head));
        }

        if mask.contains(Mask::DISTANCE) {
            self.publish(
                "distance",
                IMAGE_TYPE,
                &msg::to_image(&artifacts.distance, optical_head),
            );
        }

        if mask.contains(Mask::DISTANCE_NOISE) {
            self.publish(
                "distance_noise",
                IMAGE_TYPE,
                &msg::to_image(&artifacts.distance_noise, optical_head),
            );
        }

        if mask.contains(Mask::AMPLITUDE) {
            self.publish(
                "amplitude",
                IMAGE_TYPE,
                &msg::to_image(&artifacts.amplitude, optical_head),
            );
        }

        if mask.contains(Mask::RAW_AMPLITUDE) {
            self.publish(
                "raw_amplitude",
                IMAGE_TYPE,
                &msg::to_image(&artifacts.raw_amplitude, optical_head),
            );
        }

        if mask.contains(Mask::GRAY) {
            self.publish(
                "gray_image",
                IMAGE_TYPE,
                &msg::to_image(&artifacts.gray, optical_head),
            );
        }

        // 2D color capture is not mask-selectable yet; publish whenever the
        // frame carries it.
        if artifacts.jpeg.width as u64 * artifacts.jpeg.height as u64 > 0 {
            self.publish(
                "rgb_image/compressed",
                COMPRESSED_IMAGE_TYPE,
                &msg::to_compressed_image(&artifacts.jpeg, optical_head, "jpeg"),
            );
        }

        self.publish(
            "extrinsics",
            EXTRINSICS_TYPE,
            &msg::to_extrinsics(&artifacts.extrinsics, optical_head),
        );
    }

    /// Initialize the session with `mask`, retrying with backoff until it
    /// succeeds or the stop token is raised.
    fn reinitialize(&self, mask: Mask, stop: &AtomicBool) -> bool {
        loop {
            if stop.load(Ordering::Relaxed) {
                return false;
            }

            if session::lock(&self.session).initialize(mask, self.options.data_port) {
                return true;
            }

            warn!("could not initialize pixel stream, retrying");
            if stop.load(Ordering::Relaxed) {
                return false;
            }
            sleep(self.options.retry_interval);
        }
    }

    fn note_timeout(&self, params: &LoopParams) {
        if !params.assume_triggered {
            warn!("timeout waiting for camera");
        } else {
            // The caller paces frames itself; just avoid busy-spinning
            debug!("no frame in triggered mode");
            sleep(Duration::from_millis(1));
        }
    }

    /// Frame timestamp with once-per-process unsynced-clock substitution.
    fn frame_stamp(&self, timestamp_ns: u64) -> Time {
        static UNSYNCED: Once = Once::new();

        let host_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0);

        let latency_secs = host_ns.saturating_sub(timestamp_ns) as f64 / 1e9;
        let stamp_ns = if latency_secs > self.options.frame_latency_thresh {
            UNSYNCED.call_once(|| info!("camera's time and client's time are not synced"));
            host_ns
        } else {
            timestamp_ns
        };

        Time {
            sec: (stamp_ns / 1_000_000_000) as i32,
            nanosec: (stamp_ns % 1_000_000_000) as u32,
        }
    }

    fn publish<T: serde::Serialize>(&self, name: &str, type_name: &'static str, message: &T) {
        match cdr::serialize::<_, _, CdrLe>(message, Infinite) {
            Ok(payload) => self.boundary.publish(name, type_name, payload),
            Err(err) => error!("{} encode error: {}", name, err),
        }
    }

    fn publish_latched<T: serde::Serialize>(
        &self,
        name: &str,
        type_name: &'static str,
        message: &T,
    ) {
        match cdr::serialize::<_, _, CdrLe>(message, Infinite) {
            Ok(payload) => self.boundary.publish_latched(name, type_name, payload),
            Err(err) => error!("{} encode error: {}", name, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{ScriptedBackend, SessionConfig};
    use crate::publish::RecordingBoundary;
    use crate::session::{Session, TimeoutPreset};

    fn acquisition_loop(options: LoopOptions) -> AcquisitionLoop {
        let config = SessionConfig {
            camera_ip: String::from("192.0.2.1"),
            control_port: 80,
            data_port: 50010,
            password: String::new(),
        };
        let preset = TimeoutPreset {
            timeout_millis: 500,
            timeout_tolerance_secs: 5.0,
        };
        let session = Session::new(
            Box::new(ScriptedBackend::new()),
            config,
            LoopParams::default(),
            preset,
            preset,
        )
        .shared();
        AcquisitionLoop::new(session, Arc::new(RecordingBoundary::new()), options)
    }

    #[test]
    fn test_frame_stamp_passes_synced_time() {
        let looper = acquisition_loop(LoopOptions::default());
        let now_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos() as u64;

        let stamp = looper.frame_stamp(now_ns);
        assert_eq!(stamp.sec, (now_ns / 1_000_000_000) as i32);
        assert_eq!(stamp.nanosec, (now_ns % 1_000_000_000) as u32);
    }

    #[test]
    fn test_frame_stamp_substitutes_unsynced_time() {
        let looper = acquisition_loop(LoopOptions::default());

        // A sensor clock at the epoch is far outside the latency threshold
        let before = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i32;
        let stamp = looper.frame_stamp(0);
        assert!(stamp.sec >= before);
    }

    #[test]
    fn test_stopped_loop_exits_without_initializing() {
        let looper = acquisition_loop(LoopOptions::default());
        let stop = AtomicBool::new(true);
        // Returns immediately instead of retrying forever
        looper.run(&stop);
    }
}
