//! Record Module
//!
//! Tagged, length-prefixed records and the fixed-layout braid headers.
//!
//! ## Frame Format
//! ```text
//! ┌──────────┬──────────────┬──────────────────────────────┐
//! │ Tag (1)  │ Len (4, LE)  │ Payload (bincode, Len bytes) │
//! └──────────┴──────────────┴──────────────────────────────┘
//! ```
//!
//! bincode's default encoding writes fixed-width little-endian integers, so
//! a record made only of integers and booleans always encodes to the same
//! number of bytes. The braid relies on that to rewrite headers in place.

mod braid_header;
mod knot_header;

use std::io::{self, Read, SeekFrom, Write};

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{BraidError, Result};
use crate::stream::{IoTask, StreamHandle};

pub use braid_header::BraidHeader;
pub use knot_header::KnotHeader;

/// Tag (1) + payload length (4)
pub const FRAME_HEADER_SIZE: usize = 5;

/// Largest payload a frame may declare (32 KB)
pub const MAX_ENCODED_LENGTH: usize = 32 * 1024;

/// A type that can travel through encode/decode tasks
///
/// `TAG` identifies the record type on the medium; decoding a frame with a
/// different tag is an `Encoding` error.
pub trait Encodable: Serialize + DeserializeOwned {
    const TAG: u8;

    fn encode(&self) -> Result<EncodedValue> {
        EncodedValue::encode(self)
    }
}

// =============================================================================
// Encoded Value
// =============================================================================

/// A tagged, serialized value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedValue {
    tag: u8,
    payload: Bytes,
}

impl EncodedValue {
    /// Serialize `value` under its type's tag
    pub fn encode<T: Encodable + ?Sized>(value: &T) -> Result<Self> {
        let payload = bincode::serialize(value)?;

        if payload.len() > MAX_ENCODED_LENGTH {
            return Err(BraidError::Encoding(format!(
                "payload of {} bytes exceeds the {} byte limit",
                payload.len(),
                MAX_ENCODED_LENGTH
            )));
        }

        Ok(Self {
            tag: T::TAG,
            payload: Bytes::from(payload),
        })
    }

    /// Deserialize into `T`, checking the tag first
    pub fn decode<T: Encodable>(&self) -> Result<T> {
        if self.tag != T::TAG {
            return Err(BraidError::Encoding(format!(
                "expected record tag {:#04x}, found {:#04x}",
                T::TAG,
                self.tag
            )));
        }

        Ok(bincode::deserialize(&self.payload)?)
    }

    pub fn is<T: Encodable>(&self) -> bool {
        self.tag == T::TAG
    }

    pub fn tag(&self) -> u8 {
        self.tag
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Size of the full frame on the medium
    pub fn encoded_len(&self) -> u64 {
        (FRAME_HEADER_SIZE + self.payload.len()) as u64
    }

    /// The full frame as bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        bytes.push(self.tag);
        bytes.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Write the full frame, returning the number of bytes written
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<u64> {
        let mut header = [0u8; FRAME_HEADER_SIZE];
        header[0] = self.tag;
        header[1..].copy_from_slice(&(self.payload.len() as u32).to_le_bytes());

        writer.write_all(&header)?;
        writer.write_all(&self.payload)?;

        Ok(self.encoded_len())
    }

    /// Read one frame.
    ///
    /// A clean end of input before the tag byte is `EndOfMedium`; running
    /// out of input inside the frame is an `Encoding` error.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut tag = [0u8; 1];

        loop {
            match reader.read(&mut tag) {
                Ok(0) => return Err(BraidError::EndOfMedium),
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let mut len = [0u8; 4];
        read_frame_part(reader, &mut len, "length")?;
        let len = u32::from_le_bytes(len) as usize;

        if len > MAX_ENCODED_LENGTH {
            return Err(BraidError::Encoding(format!(
                "declared payload of {} bytes exceeds the {} byte limit",
                len, MAX_ENCODED_LENGTH
            )));
        }

        let mut payload = vec![0u8; len];
        read_frame_part(reader, &mut payload, "payload")?;

        Ok(Self {
            tag: tag[0],
            payload: Bytes::from(payload),
        })
    }
}

fn read_frame_part<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8], part: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => BraidError::Encoding(format!("truncated frame {}", part)),
        _ => BraidError::Io(e),
    })
}

/// Encoded size of a zero-valued record, the size every instance must keep
fn fixed_size<T: Encodable + Default>() -> u64 {
    // Integer/bool-only records cannot fail to serialize.
    let payload = bincode::serialized_size(&T::default()).unwrap_or_default();
    FRAME_HEADER_SIZE as u64 + payload
}

/// Queue an in-place overwrite of a fixed-size record at `position`
fn rewrite_in_place<T: Encodable>(
    record: &T,
    position: u64,
    expected_size: u64,
    handle: &mut StreamHandle<'_>,
) -> Result<IoTask> {
    let value = EncodedValue::encode(record)?;

    if value.encoded_len() != expected_size {
        return Err(BraidError::HeaderSizeChanged {
            expected: expected_size,
            actual: value.encoded_len(),
        });
    }

    handle.seek(SeekFrom::Start(position))?;
    handle.encode(value)
}
