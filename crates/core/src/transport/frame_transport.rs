//! Length-prefixed framing over a byte stream.
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────┐
//! │  Length (8 bytes BE) │  Payload (exactly `Length`)  │
//! └──────────────────────┴──────────────────────────────┘
//! ```
//!
//! The same framing carries the request image and the response image, so a
//! client and server can pair one request with one response on a connection.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::shared::constants::{FRAME_HEADER_LEN, FRAME_READ_CHUNK};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection closed before a frame started")]
    ConnectionClosed,
    #[error("connection closed mid-frame: expected {expected} bytes, received {received}")]
    IncompleteFrame { expected: u64, received: u64 },
    #[error("frame of {declared} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { declared: u64, limit: u64 },
    #[error("transport I/O failed: {0}")]
    Io(#[from] io::Error),
}

/// Writes one frame (header + payload) and flushes.
pub fn send_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<(), TransportError> {
    let len = payload.len() as u64;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Reads one frame, returning its payload.
///
/// Consumes exactly the header and the declared payload, leaving the stream
/// at the next frame boundary. When `max_len` is set, a larger declared
/// length fails with [`TransportError::FrameTooLarge`] before any payload is
/// read.
pub fn receive_frame<R: Read>(
    reader: &mut R,
    max_len: Option<u64>,
) -> Result<Vec<u8>, TransportError> {
    let declared = read_header(reader)?;

    if let Some(limit) = max_len {
        if declared > limit {
            return Err(TransportError::FrameTooLarge { declared, limit });
        }
    }
    let declared_usize = usize::try_from(declared).map_err(|_| TransportError::FrameTooLarge {
        declared,
        limit: usize::MAX as u64,
    })?;

    // Grow as bytes arrive; a lying header must not size the allocation.
    let mut payload = Vec::with_capacity(declared_usize.min(FRAME_READ_CHUNK));
    let mut chunk = [0u8; FRAME_READ_CHUNK];
    while payload.len() < declared_usize {
        let want = (declared_usize - payload.len()).min(FRAME_READ_CHUNK);
        match reader.read(&mut chunk[..want]) {
            Ok(0) => {
                return Err(TransportError::IncompleteFrame {
                    expected: declared,
                    received: payload.len() as u64,
                })
            }
            Ok(n) => payload.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Ok(payload)
}

fn read_header<R: Read>(reader: &mut R) -> Result<u64, TransportError> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Err(TransportError::ConnectionClosed),
            Ok(0) => {
                return Err(TransportError::IncompleteFrame {
                    expected: FRAME_HEADER_LEN as u64,
                    received: filled as u64,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(u64::from_be_bytes(header))
}
