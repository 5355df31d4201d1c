// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Camera session lifecycle.
//!
//! A [`Session`] owns the control connection, the frame stream and the
//! decode buffer.  It is only ever used behind a single [`Mutex`] shared by
//! the acquisition loop and the control facade; mutual exclusion with frame
//! acquisition is mandatory because the camera handle is not safely
//! shareable.
//!
//! The session moves between exactly two observable states: uninitialized
//! (no connection, no stream) and ready.  [`Session::initialize`] tears the
//! old resources down in order (buffer, stream, control) before building
//! fresh ones, and unwinds cleanly on any collaborator failure so a
//! half-built session is never visible.  It never retries; retry policy
//! belongs to the acquisition loop.

use crate::camera::{CameraControl, FrameStream, Mask, SensorBackend, SessionConfig};
use crate::frame::DecodeBuffer;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex};

/// Effective timing parameters of the acquisition loop.
///
/// Held inside the session lock so port-state transitions mutate them with
/// the same exclusivity as frame acquisition.
#[derive(Debug, Clone, Copy)]
pub struct LoopParams {
    pub timeout_millis: u64,
    pub timeout_tolerance_secs: f64,
    /// When the caller paces frames itself, timeouts are expected and only
    /// rate-limited rather than warned about.
    pub assume_triggered: bool,
}

impl Default for LoopParams {
    fn default() -> LoopParams {
        LoopParams {
            timeout_millis: 500,
            timeout_tolerance_secs: 5.0,
            assume_triggered: false,
        }
    }
}

/// Timeout preset applied when the sensor port changes state.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPreset {
    pub timeout_millis: u64,
    pub timeout_tolerance_secs: f64,
}

/// The exclusively-owned camera session.
pub struct Session {
    backend: Box<dyn SensorBackend>,
    config: SessionConfig,
    pub params: LoopParams,
    /// Preset applied when the port transitions to RUN.
    pub on_preset: TimeoutPreset,
    /// Preset applied when the port transitions to IDLE; the long tolerance
    /// keeps an idled port from thrashing reinitialization.
    pub idle_preset: TimeoutPreset,
    control: Option<Box<dyn CameraControl>>,
    stream: Option<Box<dyn FrameStream>>,
    /// Most recently received frame, mutated only under the session lock.
    pub frame: DecodeBuffer,
    active_mask: Mask,
}

/// Handle shared between the acquisition loop and the control facade.
pub type SharedSession = Arc<Mutex<Session>>;

/// Lock a shared session, recovering from a poisoned lock.
pub fn lock(session: &SharedSession) -> std::sync::MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|err| err.into_inner())
}

impl Session {
    pub fn new(
        backend: Box<dyn SensorBackend>,
        config: SessionConfig,
        params: LoopParams,
        on_preset: TimeoutPreset,
        idle_preset: TimeoutPreset,
    ) -> Session {
        Session {
            backend,
            config,
            params,
            on_preset,
            idle_preset,
            control: None,
            stream: None,
            frame: DecodeBuffer::new(),
            active_mask: Mask::calibration_only(),
        }
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Control connection, if the session is initialized.
    pub fn control(&mut self) -> Option<&mut (dyn CameraControl + 'static)> {
        self.control.as_deref_mut()
    }

    /// The mask the current stream was opened with.
    pub fn active_mask(&self) -> Mask {
        self.active_mask
    }

    /// Tear down any existing session and build a fresh one bound to `mask`
    /// and `data_port`.
    ///
    /// Returns `false` on any collaborator failure, with every partially
    /// constructed resource released.  Never retries internally.
    pub fn initialize(&mut self, mask: Mask, data_port: u16) -> bool {
        debug!("releasing existing session resources");
        self.frame.clear();
        self.stream = None;
        self.control = None;

        info!(
            "initializing camera at {}:{}",
            self.config.camera_ip, self.config.control_port
        );
        let control = match self.backend.connect(&self.config) {
            Ok(control) => control,
            Err(err) => {
                warn!("{}", err);
                return false;
            }
        };

        info!("opening frame stream, mask {}, port {}", mask, data_port);
        let stream = match self.backend.open_stream(&self.config, mask, data_port) {
            Ok(stream) => stream,
            Err(err) => {
                // control is dropped here: no half-initialized session
                warn!("{}", err);
                return false;
            }
        };

        self.control = Some(control);
        self.stream = Some(stream);
        self.frame = DecodeBuffer::new();
        self.active_mask = mask;
        true
    }

    /// Block up to `timeout_millis` for the next complete frame.
    ///
    /// Returns `false` on timeout or any collaborator error; both are
    /// expected, non-fatal outcomes (slow sensor, pulled cable) and the
    /// caller decides when accumulated failures warrant reinitialization.
    pub fn acquire_frame(&mut self, timeout_millis: u64) -> bool {
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return false,
        };

        match stream.wait_for_frame(&mut self.frame, timeout_millis) {
            Ok(received) => received,
            Err(err) => {
                warn!("{}", err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{FrameScript, ScriptedBackend};
    use crate::frame::{ChunkKind, RawImage};

    fn config() -> SessionConfig {
        SessionConfig {
            camera_ip: String::from("192.0.2.1"),
            control_port: 80,
            data_port: 50010,
            password: String::new(),
        }
    }

    fn session(backend: ScriptedBackend) -> Session {
        let preset = TimeoutPreset {
            timeout_millis: 500,
            timeout_tolerance_secs: 5.0,
        };
        Session::new(
            Box::new(backend),
            config(),
            LoopParams::default(),
            preset,
            preset,
        )
    }

    #[test]
    fn test_initialize_records_mask_and_port() {
        let backend = ScriptedBackend::new();
        let mut session = session(backend.clone());

        assert!(session.initialize(Mask::calibration_only(), 50012));
        assert_eq!(session.active_mask(), Mask::calibration_only());

        let state = backend.state.lock().unwrap();
        assert_eq!(state.streams_opened, vec![(Mask::calibration_only(), 50012)]);
    }

    #[test]
    fn test_initialize_connect_failure_is_clean() {
        let backend = ScriptedBackend::new();
        backend.state.lock().unwrap().connect_failures = 1;
        let mut session = session(backend.clone());

        assert!(!session.initialize(Mask::all_images(), 50010));
        assert!(session.control().is_none());
        assert!(!session.acquire_frame(500));

        // Next attempt succeeds; no stale state from the failed one
        assert!(session.initialize(Mask::all_images(), 50010));
        assert!(session.control().is_some());
    }

    #[test]
    fn test_initialize_stream_failure_releases_control() {
        let backend = ScriptedBackend::new();
        backend.state.lock().unwrap().stream_failures = 1;
        let mut session = session(backend.clone());

        assert!(!session.initialize(Mask::all_images(), 50010));
        assert!(session.control().is_none());
    }

    #[test]
    fn test_acquire_frame_outcomes() {
        let backend = ScriptedBackend::new();
        {
            let mut state = backend.state.lock().unwrap();
            let mut frame = DecodeBuffer::new();
            frame.insert(
                ChunkKind::Confidence,
                RawImage {
                    width: 2,
                    height: 2,
                    format_tag: 0,
                    data: vec![0; 4],
                },
            );
            state.frames.push_back(FrameScript::Deliver(frame));
            state.frames.push_back(FrameScript::Timeout);
            state.frames.push_back(FrameScript::Fail(-101, "disconnect"));
        }

        let mut session = session(backend);
        assert!(session.initialize(Mask::all_images(), 50010));

        assert!(session.acquire_frame(500));
        assert!(session.frame.image(ChunkKind::Confidence).is_some());

        assert!(!session.acquire_frame(500)); // timeout
        assert!(!session.acquire_frame(500)); // collaborator error, non-fatal
    }

    #[test]
    fn test_reinitialize_clears_previous_frame() {
        let backend = ScriptedBackend::new();
        {
            let mut state = backend.state.lock().unwrap();
            let mut frame = DecodeBuffer::new();
            frame.extrinsics = vec![1.0; 6];
            state.frames.push_back(FrameScript::Deliver(frame));
        }

        let mut session = session(backend);
        assert!(session.initialize(Mask::calibration_only(), 50010));
        assert!(session.acquire_frame(500));
        assert_eq!(session.frame.extrinsics.len(), 6);

        assert!(session.initialize(Mask::all_images(), 50010));
        assert!(session.frame.extrinsics.is_empty());
    }
}
