//! Chunk parsing for the camera data stream.
//!
//! Each complete frame delivered on the data port is a concatenation of
//! chunks.  Every chunk starts with a fixed 48-byte header of little-endian
//! `u32` fields followed by the pixel (or calibration) payload:
//!
//! ```text
//! ┌────────────┬────────────┬─────────────┬──────────┬───────┬────────┐
//! │ chunk_type │ chunk_size │ header_size │ version  │ width │ height │
//! ├────────────┼────────────┼─────────────┼──────────┼───────┴────────┤
//! │ pixel_fmt  │ time_stamp │ frame_count │ status   │ sec  │  nsec   │
//! └────────────┴────────────┴─────────────┴──────────┴──────┴─────────┘
//! ```
//!
//! `chunk_size` covers the header and payload, so a frame is walked by
//! advancing `chunk_size` bytes at a time.  Chunk types this driver does not
//! consume are skipped for forward compatibility.

use crate::frame::{ChunkKind, DecodeBuffer, RawImage};
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// Data ended before the current chunk header or payload completed.
    UnexpectedEndOfSlice(usize),
    /// The chunk's declared sizes are inconsistent.
    InvalidChunkSize(u32),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::UnexpectedEndOfSlice(len) => {
                write!(f, "unexpected end of slice: {} bytes", len)
            }
            Error::InvalidChunkSize(size) => write!(f, "invalid chunk size: {}", size),
        }
    }
}

/// Zero-copy view over a single chunk.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChunkSlice<'a> {
    slice: &'a [u8],
}

impl<'a> ChunkSlice<'a> {
    /// Length of the chunk header in bytes/octets.
    pub const HEADER_LEN: usize = 48;

    /// Validate the header and size fields at the start of `slice`.
    pub fn from_slice(slice: &'a [u8]) -> Result<ChunkSlice<'a>, Error> {
        if slice.len() < Self::HEADER_LEN {
            return Err(Error::UnexpectedEndOfSlice(slice.len()));
        }

        let chunk = ChunkSlice { slice };
        let chunk_size = chunk.chunk_size() as usize;
        let header_size = chunk.header_size() as usize;

        if header_size < Self::HEADER_LEN || header_size > chunk_size {
            return Err(Error::InvalidChunkSize(chunk.header_size()));
        }
        if chunk_size > slice.len() {
            return Err(Error::UnexpectedEndOfSlice(slice.len()));
        }

        Ok(ChunkSlice {
            slice: &slice[..chunk_size],
        })
    }

    fn field(&self, offset: usize) -> u32 {
        u32::from_le_bytes([
            self.slice[offset],
            self.slice[offset + 1],
            self.slice[offset + 2],
            self.slice[offset + 3],
        ])
    }

    pub fn chunk_type(&self) -> u32 {
        self.field(0)
    }

    pub fn chunk_size(&self) -> u32 {
        self.field(4)
    }

    pub fn header_size(&self) -> u32 {
        self.field(8)
    }

    pub fn header_version(&self) -> u32 {
        self.field(12)
    }

    pub fn width(&self) -> u32 {
        self.field(16)
    }

    pub fn height(&self) -> u32 {
        self.field(20)
    }

    pub fn pixel_format(&self) -> u32 {
        self.field(24)
    }

    pub fn frame_count(&self) -> u32 {
        self.field(32)
    }

    pub fn status_code(&self) -> u32 {
        self.field(36)
    }

    /// Capture time in nanoseconds since the Unix epoch.
    pub fn timestamp_ns(&self) -> u64 {
        self.field(40) as u64 * 1_000_000_000 + self.field(44) as u64
    }

    /// Payload bytes following the (possibly extended) header.
    pub fn payload(&self) -> &'a [u8] {
        &self.slice[self.header_size() as usize..]
    }
}

/// Parse one complete frame payload into the decode buffer.
///
/// The buffer is cleared first; on error it is left cleared so a torn frame
/// never mixes with the previous one.
pub fn parse_frame(payload: &[u8], frame: &mut DecodeBuffer) -> Result<(), Error> {
    frame.clear();

    let mut offset = 0;
    while offset < payload.len() {
        let chunk = ChunkSlice::from_slice(&payload[offset..])?;

        if frame.timestamp_ns == 0 {
            frame.timestamp_ns = chunk.timestamp_ns();
        }

        match ChunkKind::from_wire(chunk.chunk_type()) {
            Some(ChunkKind::ExtrinsicCalib) => {
                frame.extrinsics = chunk
                    .payload()
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
            }
            Some(kind) => {
                frame.insert(
                    kind,
                    RawImage {
                        width: chunk.width(),
                        height: chunk.height(),
                        format_tag: chunk.pixel_format(),
                        data: chunk.payload().to_vec(),
                    },
                );
            }
            None => {}
        }

        offset += chunk.chunk_size() as usize;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::PixelFormat;

    /// Build a chunk with the given type, dimensions, format and payload.
    pub(crate) fn make_chunk(
        chunk_type: u32,
        width: u32,
        height: u32,
        pixel_format: u32,
        payload: &[u8],
    ) -> Vec<u8> {
        let chunk_size = ChunkSlice::HEADER_LEN as u32 + payload.len() as u32;
        let mut chunk = Vec::with_capacity(chunk_size as usize);
        chunk.extend_from_slice(&chunk_type.to_le_bytes());
        chunk.extend_from_slice(&chunk_size.to_le_bytes());
        chunk.extend_from_slice(&(ChunkSlice::HEADER_LEN as u32).to_le_bytes());
        chunk.extend_from_slice(&2u32.to_le_bytes()); // header_version
        chunk.extend_from_slice(&width.to_le_bytes());
        chunk.extend_from_slice(&height.to_le_bytes());
        chunk.extend_from_slice(&pixel_format.to_le_bytes());
        chunk.extend_from_slice(&0u32.to_le_bytes()); // deprecated time_stamp
        chunk.extend_from_slice(&1u32.to_le_bytes()); // frame_count
        chunk.extend_from_slice(&0u32.to_le_bytes()); // status_code
        chunk.extend_from_slice(&100u32.to_le_bytes()); // sec
        chunk.extend_from_slice(&500u32.to_le_bytes()); // nsec
        chunk.extend_from_slice(payload);
        chunk
    }

    #[test]
    fn test_chunk_slice_accessors() {
        let data = make_chunk(100, 4, 2, PixelFormat::U16 as u32, &[0u8; 16]);
        let chunk = ChunkSlice::from_slice(&data).unwrap();
        assert_eq!(chunk.chunk_type(), 100);
        assert_eq!(chunk.width(), 4);
        assert_eq!(chunk.height(), 2);
        assert_eq!(chunk.pixel_format(), PixelFormat::U16 as u32);
        assert_eq!(chunk.frame_count(), 1);
        assert_eq!(chunk.timestamp_ns(), 100_000_000_500);
        assert_eq!(chunk.payload().len(), 16);
    }

    #[test]
    fn test_chunk_slice_too_short() {
        let data = [0u8; 20];
        assert!(matches!(
            ChunkSlice::from_slice(&data),
            Err(Error::UnexpectedEndOfSlice(20))
        ));
    }

    #[test]
    fn test_chunk_slice_truncated_payload() {
        let mut data = make_chunk(100, 4, 2, PixelFormat::U16 as u32, &[0u8; 16]);
        data.truncate(50);
        assert!(matches!(
            ChunkSlice::from_slice(&data),
            Err(Error::UnexpectedEndOfSlice(50))
        ));
    }

    #[test]
    fn test_parse_frame_multiple_chunks() {
        let mut payload = Vec::new();
        payload.extend(make_chunk(
            100,
            2,
            2,
            PixelFormat::U16 as u32,
            &[1u8; 8],
        ));
        payload.extend(make_chunk(300, 2, 2, PixelFormat::U8 as u32, &[2u8; 4]));

        let mut extrinsics = Vec::new();
        for value in [0.1f32, 0.2, 0.3, 0.4, 0.5, 0.6] {
            extrinsics.extend_from_slice(&value.to_le_bytes());
        }
        payload.extend(make_chunk(400, 0, 0, 0, &extrinsics));

        let mut frame = DecodeBuffer::new();
        parse_frame(&payload, &mut frame).unwrap();

        let distance = frame.image(ChunkKind::RadialDistance).unwrap();
        assert_eq!(distance.width, 2);
        assert_eq!(distance.data, vec![1u8; 8]);
        assert!(frame.image(ChunkKind::Confidence).is_some());
        assert_eq!(frame.extrinsics.len(), 6);
        assert!((frame.extrinsics[5] - 0.6).abs() < 1e-6);
        assert_eq!(frame.timestamp_ns, 100_000_000_500);
    }

    #[test]
    fn test_parse_frame_skips_unknown_chunks() {
        let mut payload = Vec::new();
        payload.extend(make_chunk(302, 1, 1, 0, &[0u8; 4])); // diagnostic
        payload.extend(make_chunk(100, 1, 1, PixelFormat::U16 as u32, &[0u8; 2]));

        let mut frame = DecodeBuffer::new();
        parse_frame(&payload, &mut frame).unwrap();
        assert!(frame.image(ChunkKind::RadialDistance).is_some());
    }

    #[test]
    fn test_parse_frame_torn_frame_clears_buffer() {
        let good = make_chunk(100, 1, 1, PixelFormat::U16 as u32, &[0u8; 2]);
        let mut frame = DecodeBuffer::new();
        parse_frame(&good, &mut frame).unwrap();

        let mut torn = make_chunk(300, 1, 1, PixelFormat::U8 as u32, &[0u8; 1]);
        torn.truncate(30);
        assert!(parse_frame(&torn, &mut frame).is_err());
        assert!(frame.image(ChunkKind::RadialDistance).is_none());
    }
}
