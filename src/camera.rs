// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Sensor collaborator boundary.
//!
//! The camera exposes two independent surfaces: a JSON configuration API on
//! the control port and a chunk-framed stream on the data port.  Both are
//! abstracted behind traits so the session logic can run against scripted
//! fakes:
//!
//! - [`CameraControl`]: configuration dump/apply
//! - [`FrameStream`]: timed delivery of complete frames into a
//!   [`DecodeBuffer`]
//! - [`SensorBackend`]: constructs both for a given session configuration
//!
//! All collaborator failures are carried as [`DeviceError`] values with a
//! numeric code and message; nothing on this boundary panics or unwinds.

use crate::frame::DecodeBuffer;
use crate::pcic;
use std::fmt;
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::ops::BitOr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Error reported by the sensor collaborator.
///
/// Device-originated failures carry the device's own status code; transport
/// and decode failures map to generic negative codes.
#[derive(Debug, Clone)]
pub struct DeviceError {
    pub code: i32,
    pub message: String,
}

impl DeviceError {
    pub fn new(code: i32, message: impl Into<String>) -> DeviceError {
        DeviceError {
            code,
            message: message.into(),
        }
    }
}

impl std::error::Error for DeviceError {}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "device error {}: {}", self.code, self.message)
    }
}

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> DeviceError {
        DeviceError::new(-1, err.to_string())
    }
}

impl From<ureq::Error> for DeviceError {
    fn from(err: ureq::Error) -> DeviceError {
        match err {
            ureq::Error::Status(code, response) => {
                DeviceError::new(code as i32, response.status_text().to_string())
            }
            ureq::Error::Transport(transport) => DeviceError::new(-1, transport.to_string()),
        }
    }
}

impl From<pcic::Error> for DeviceError {
    fn from(err: pcic::Error) -> DeviceError {
        DeviceError::new(-1, err.to_string())
    }
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// Bitmask selecting which artifact kinds a streaming session delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mask(pub u16);

impl Mask {
    pub const DISTANCE: Mask = Mask(1);
    pub const AMPLITUDE: Mask = Mask(1 << 1);
    pub const RAW_AMPLITUDE: Mask = Mask(1 << 2);
    pub const CARTESIAN: Mask = Mask(1 << 3);
    pub const UNIT_VECTORS: Mask = Mask(1 << 4);
    pub const GRAY: Mask = Mask(1 << 6);
    pub const DISTANCE_NOISE: Mask = Mask(1 << 11);

    /// The bootstrap mask: only per-pixel unit vectors, independent of what
    /// the user requested.
    pub fn calibration_only() -> Mask {
        Mask::UNIT_VECTORS
    }

    /// Default requested mask: every image kind.
    pub fn all_images() -> Mask {
        Mask::DISTANCE
            | Mask::AMPLITUDE
            | Mask::RAW_AMPLITUDE
            | Mask::CARTESIAN
            | Mask::GRAY
            | Mask::DISTANCE_NOISE
    }

    pub fn contains(self, other: Mask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Mask {
    type Output = Mask;

    fn bitor(self, rhs: Mask) -> Mask {
        Mask(self.0 | rhs.0)
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network identity of a camera session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub camera_ip: String,
    pub control_port: u16,
    pub data_port: u16,
    pub password: String,
}

/// Configuration surface of a connected camera.
pub trait CameraControl: Send {
    /// Serialize the device's current configuration.
    fn to_json(&mut self) -> DeviceResult<serde_json::Value>;

    /// Apply a configuration document to the device.
    ///
    /// No rollback is attempted on partial failure; the device keeps
    /// whatever state the apply left it in.
    fn from_json(&mut self, doc: &serde_json::Value) -> DeviceResult<()>;
}

/// Frame delivery surface of a streaming session.
pub trait FrameStream: Send {
    /// Block up to `timeout_millis` for the next complete frame, writing it
    /// into the client-owned buffer.
    ///
    /// # Returns
    /// - `Ok(true)` - a complete frame was decoded into `frame`
    /// - `Ok(false)` - the timeout elapsed (expected under normal operation)
    /// - `Err` - transport or framing failure
    fn wait_for_frame(&mut self, frame: &mut DecodeBuffer, timeout_millis: u64)
        -> DeviceResult<bool>;
}

/// Constructs the control and stream halves of a session.
pub trait SensorBackend: Send {
    fn connect(&self, config: &SessionConfig) -> DeviceResult<Box<dyn CameraControl>>;

    fn open_stream(
        &self,
        config: &SessionConfig,
        mask: Mask,
        data_port: u16,
    ) -> DeviceResult<Box<dyn FrameStream>>;
}

/// JSON-over-HTTP configuration client for the control port.
pub struct HttpControl {
    agent: ureq::Agent,
    base: String,
    password: String,
}

impl HttpControl {
    pub fn new(config: &SessionConfig) -> HttpControl {
        HttpControl {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(5))
                .build(),
            base: format!(
                "http://{}:{}/api/v1",
                config.camera_ip, config.control_port
            ),
            password: config.password.clone(),
        }
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let request = self.agent.request(method, &format!("{}{}", self.base, path));
        if self.password.is_empty() {
            request
        } else {
            request.set("x-password", &self.password)
        }
    }
}

impl CameraControl for HttpControl {
    fn to_json(&mut self) -> DeviceResult<serde_json::Value> {
        let response = self.request("GET", "/config").call()?;
        Ok(response.into_json::<serde_json::Value>()?)
    }

    fn from_json(&mut self, doc: &serde_json::Value) -> DeviceResult<()> {
        self.request("POST", "/config").send_json(doc)?;
        Ok(())
    }
}

/// Frame envelope magic on the data stream, "3DF1" little-endian.
const FRAME_MAGIC: u32 = 0x3144_4631;

/// Upper bound on a frame payload.  The largest sensor mode is well under
/// 16 MiB per frame, so anything beyond this is a corrupted length field,
/// not data.
const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Chunk-framed TCP stream on the data port.
///
/// Each frame on the wire is an 8-byte envelope (magic + payload length)
/// followed by the concatenated chunks parsed by [`crate::pcic`].
pub struct TcpFrameStream {
    stream: TcpStream,
    payload: Vec<u8>,
}

impl TcpFrameStream {
    pub fn connect(ip: &str, data_port: u16) -> DeviceResult<TcpFrameStream> {
        let addr = format!("{}:{}", ip, data_port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| DeviceError::new(-1, format!("cannot resolve {}", ip)))?;
        let stream = TcpStream::connect_timeout(&addr, Duration::from_secs(2))?;
        stream.set_nodelay(true)?;

        Ok(TcpFrameStream {
            stream,
            payload: Vec::new(),
        })
    }
}

impl FrameStream for TcpFrameStream {
    fn wait_for_frame(
        &mut self,
        frame: &mut DecodeBuffer,
        timeout_millis: u64,
    ) -> DeviceResult<bool> {
        // A zero read timeout would disable the timeout entirely
        let timeout = Duration::from_millis(timeout_millis.max(1));
        self.stream.set_read_timeout(Some(timeout))?;

        let mut envelope = [0u8; 8];
        match self.stream.read_exact(&mut envelope) {
            Ok(()) => {}
            Err(err)
                if err.kind() == std::io::ErrorKind::WouldBlock
                    || err.kind() == std::io::ErrorKind::TimedOut =>
            {
                return Ok(false);
            }
            Err(err) => return Err(err.into()),
        }

        let magic = u32::from_le_bytes([envelope[0], envelope[1], envelope[2], envelope[3]]);
        if magic != FRAME_MAGIC {
            return Err(DeviceError::new(
                -1,
                format!("bad frame magic: {:#010x}", magic),
            ));
        }

        let len = u32::from_le_bytes([envelope[4], envelope[5], envelope[6], envelope[7]]) as usize;
        if len > MAX_FRAME_LEN {
            return Err(DeviceError::new(
                -1,
                format!("oversized frame: {} bytes", len),
            ));
        }
        self.payload.resize(len, 0);
        self.stream.read_exact(&mut self.payload)?;

        pcic::parse_frame(&self.payload, frame)?;
        Ok(true)
    }
}

/// Production backend: HTTP control plus TCP data stream.
///
/// Connecting verifies the control surface with a configuration read so the
/// session never holds a handle to an unreachable device.
#[derive(Debug, Default)]
pub struct DeviceBackend;

impl SensorBackend for DeviceBackend {
    fn connect(&self, config: &SessionConfig) -> DeviceResult<Box<dyn CameraControl>> {
        let mut control = HttpControl::new(config);
        control.to_json()?;
        Ok(Box::new(control))
    }

    fn open_stream(
        &self,
        config: &SessionConfig,
        _mask: Mask,
        data_port: u16,
    ) -> DeviceResult<Box<dyn FrameStream>> {
        // The device streams every chunk it produces; the mask is applied
        // when artifacts are extracted.  TODO: push the mask down to the
        // device once the firmware's chunk-selection endpoint stabilizes.
        Ok(Box::new(TcpFrameStream::connect(
            &config.camera_ip,
            data_port,
        )?))
    }
}

/// Scripted wait-for-frame outcomes for tests.
#[derive(Debug, Clone)]
pub enum FrameScript {
    /// Deliver this frame content.
    Deliver(DecodeBuffer),
    /// Report a timeout.
    Timeout,
    /// Fail with a device error.
    Fail(i32, &'static str),
}

/// Shared state observed and mutated by a [`ScriptedBackend`].
#[derive(Debug, Default)]
pub struct ScriptState {
    /// Remaining `connect` attempts that should fail.
    pub connect_failures: usize,
    /// Remaining `open_stream` attempts that should fail.
    pub stream_failures: usize,
    /// `(mask, data_port)` of every `open_stream` call, in order.
    pub streams_opened: Vec<(Mask, u16)>,
    /// Outcomes handed out by `wait_for_frame`, consumed front to back.
    /// Once exhausted, every wait reports a timeout.
    pub frames: std::collections::VecDeque<FrameScript>,
    /// Configuration the fake device reports on dump.
    pub config: serde_json::Value,
    /// Documents applied through `from_json`, in order.
    pub applied: Vec<serde_json::Value>,
    /// When set, configuration operations fail with this code.
    pub control_failure: Option<(i32, &'static str)>,
}

/// Scripted sensor backend for driving the session and loop in tests
/// without hardware.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    pub state: Arc<Mutex<ScriptState>>,
}

impl ScriptedBackend {
    pub fn new() -> ScriptedBackend {
        ScriptedBackend::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }
}

struct ScriptedControl {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedControl {
    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }
}

impl CameraControl for ScriptedControl {
    fn to_json(&mut self) -> DeviceResult<serde_json::Value> {
        let state = self.lock();
        match state.control_failure {
            Some((code, message)) => Err(DeviceError::new(code, message)),
            None => Ok(state.config.clone()),
        }
    }

    fn from_json(&mut self, doc: &serde_json::Value) -> DeviceResult<()> {
        let mut state = self.lock();
        match state.control_failure {
            Some((code, message)) => Err(DeviceError::new(code, message)),
            None => {
                state.applied.push(doc.clone());
                Ok(())
            }
        }
    }
}

struct ScriptedStream {
    state: Arc<Mutex<ScriptState>>,
}

impl FrameStream for ScriptedStream {
    fn wait_for_frame(
        &mut self,
        frame: &mut DecodeBuffer,
        _timeout_millis: u64,
    ) -> DeviceResult<bool> {
        let script = {
            let mut state = self.state.lock().unwrap_or_else(|err| err.into_inner());
            state.frames.pop_front()
        };

        match script {
            Some(FrameScript::Deliver(content)) => {
                *frame = content;
                Ok(true)
            }
            Some(FrameScript::Timeout) | None => Ok(false),
            Some(FrameScript::Fail(code, message)) => Err(DeviceError::new(code, message)),
        }
    }
}

impl SensorBackend for ScriptedBackend {
    fn connect(&self, _config: &SessionConfig) -> DeviceResult<Box<dyn CameraControl>> {
        let mut state = self.lock();
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(DeviceError::new(-1, "connection refused"));
        }
        Ok(Box::new(ScriptedControl {
            state: self.state.clone(),
        }))
    }

    fn open_stream(
        &self,
        _config: &SessionConfig,
        mask: Mask,
        data_port: u16,
    ) -> DeviceResult<Box<dyn FrameStream>> {
        let mut state = self.lock();
        if state.stream_failures > 0 {
            state.stream_failures -= 1;
            return Err(DeviceError::new(-1, "stream refused"));
        }
        state.streams_opened.push((mask, data_port));
        Ok(Box::new(ScriptedStream {
            state: self.state.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_contains() {
        let mask = Mask::DISTANCE | Mask::CARTESIAN;
        assert!(mask.contains(Mask::DISTANCE));
        assert!(mask.contains(Mask::CARTESIAN));
        assert!(!mask.contains(Mask::GRAY));
        assert!(mask.contains(Mask::DISTANCE | Mask::CARTESIAN));
    }

    #[test]
    fn test_calibration_mask_is_unit_vectors_only() {
        let mask = Mask::calibration_only();
        assert!(mask.contains(Mask::UNIT_VECTORS));
        assert!(!mask.contains(Mask::DISTANCE));
        assert!(!Mask::all_images().contains(Mask::UNIT_VECTORS));
    }

    #[test]
    fn test_scripted_backend_connect_failures() {
        let backend = ScriptedBackend::new();
        backend.lock().connect_failures = 2;

        let config = SessionConfig {
            camera_ip: String::from("192.0.2.1"),
            control_port: 80,
            data_port: 50010,
            password: String::new(),
        };

        assert!(backend.connect(&config).is_err());
        assert!(backend.connect(&config).is_err());
        assert!(backend.connect(&config).is_ok());
    }

    #[test]
    fn test_tcp_stream_rejects_oversized_frame() {
        use std::io::Write;
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            // Valid magic, corrupted length field (~3.75 GiB)
            let mut envelope = Vec::new();
            envelope.extend_from_slice(&FRAME_MAGIC.to_le_bytes());
            envelope.extend_from_slice(&0xF000_0000u32.to_le_bytes());
            socket.write_all(&envelope).unwrap();
            std::thread::sleep(Duration::from_millis(200));
        });

        let mut stream = TcpFrameStream::connect("127.0.0.1", port).unwrap();
        let mut frame = DecodeBuffer::new();
        let err = stream.wait_for_frame(&mut frame, 1000).unwrap_err();
        assert_eq!(err.code, -1);
        assert!(err.message.contains("oversized frame"));

        server.join().unwrap();
    }

    #[test]
    fn test_scripted_stream_exhausts_to_timeout() {
        let backend = ScriptedBackend::new();
        backend
            .lock()
            .frames
            .push_back(FrameScript::Fail(-7, "cable pulled"));

        let config = SessionConfig {
            camera_ip: String::from("192.0.2.1"),
            control_port: 80,
            data_port: 50010,
            password: String::new(),
        };

        let mut stream = backend.open_stream(&config, Mask::all_images(), 50010).unwrap();
        let mut frame = DecodeBuffer::new();

        let err = stream.wait_for_frame(&mut frame, 500).unwrap_err();
        assert_eq!(err.code, -7);
        // Script exhausted: every further wait is a timeout
        assert!(!stream.wait_for_frame(&mut frame, 500).unwrap());
        assert!(!stream.wait_for_frame(&mut frame, 500).unwrap());
    }
}
