//! Dome wire format: the on-wire layout of a video chunk datagram.
//!
//! Every datagram carries a 9-byte big-endian header followed by one
//! fragment of an encoded frame (typically JPEG). The header is a zerocopy
//! struct of unaligned big-endian integers, so parsing never allocates and
//! never touches unsafe code.
//!
//! ```text
//! [frame_id: u32][chunk_index: u16][total_chunks: u16][stream_id: u8][payload...]
//! ```

use static_assertions::assert_eq_size;
use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

// ── Chunk Header ─────────────────────────────────────────────────────────────

/// Header preceding every chunk payload.
///
/// Wire size: 9 bytes.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes, Unaligned)]
#[repr(C)]
pub struct ChunkHeader {
    /// Frame this chunk belongs to. Increments per frame, wraps at 2^32.
    pub frame_id: U32<BigEndian>,

    /// Zero-based position of this chunk within the frame.
    pub chunk_index: U16<BigEndian>,

    /// Number of chunks the sender split the frame into.
    pub total_chunks: U16<BigEndian>,

    /// Payload category sharing the port. Only `VIDEO_STREAM_ID` is video.
    pub stream_id: u8,
}

assert_eq_size!(ChunkHeader, [u8; HEADER_LEN]);

// ── Constants ─────────────────────────────────────────────────────────────────

/// Header length in bytes. Datagrams no longer than this carry no payload.
pub const HEADER_LEN: usize = 9;

/// Stream tag of the video stream.
pub const VIDEO_STREAM_ID: u8 = 2;

/// Default UDP port the receiver listens on.
pub const DEFAULT_LISTEN_PORT: u16 = 15001;

/// Default lifetime of an incomplete frame, measured from its first chunk.
pub const FRAME_TIMEOUT_MS: u64 = 1000;

/// Largest datagram a UDP socket can hand us.
pub const MAX_DATAGRAM: usize = 65535;

/// Default payload bytes per chunk on the sending side. Keeps datagrams
/// under a typical 1500-byte Ethernet MTU.
pub const DEFAULT_CHUNK_SIZE: usize = 1400;

// ── Packet ────────────────────────────────────────────────────────────────────

/// A validated chunk datagram. Borrows its payload from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub frame_id: u32,
    pub chunk_index: u16,
    pub total_chunks: u16,
    pub stream_id: u8,
    pub payload: &'a [u8],
}

impl<'a> Packet<'a> {
    /// Decode and validate one datagram.
    ///
    /// Rejects, in order: datagrams of `HEADER_LEN` bytes or fewer, chunks
    /// tagged with a stream other than `stream_filter`, frames announcing
    /// zero chunks, and chunk indices outside `0..total_chunks`.
    pub fn parse(datagram: &'a [u8], stream_filter: u8) -> Result<Self, WireError> {
        if datagram.len() <= HEADER_LEN {
            return Err(WireError::TooShort(datagram.len()));
        }

        let header = ChunkHeader::read_from_prefix(datagram)
            .ok_or(WireError::TooShort(datagram.len()))?;

        if header.stream_id != stream_filter {
            return Err(WireError::WrongStream(header.stream_id));
        }

        let frame_id = header.frame_id.get();
        let chunk_index = header.chunk_index.get();
        let total_chunks = header.total_chunks.get();

        if total_chunks == 0 {
            return Err(WireError::ZeroChunks { frame_id });
        }
        if chunk_index >= total_chunks {
            return Err(WireError::IndexOutOfRange {
                frame_id,
                chunk_index,
                total_chunks,
            });
        }

        Ok(Self {
            frame_id,
            chunk_index,
            total_chunks,
            stream_id: header.stream_id,
            payload: &datagram[HEADER_LEN..],
        })
    }

    /// Serialize into a datagram: header followed by payload.
    pub fn encode(&self) -> Vec<u8> {
        let header = ChunkHeader {
            frame_id: U32::new(self.frame_id),
            chunk_index: U16::new(self.chunk_index),
            total_chunks: U16::new(self.total_chunks),
            stream_id: self.stream_id,
        };
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(self.payload);
        out
    }
}

/// Split an encoded frame into ready-to-send datagrams.
///
/// Chunks carry at most `chunk_size` payload bytes each. The result is in
/// ascending chunk order; senders are free to shuffle it.
pub fn fragment_frame(
    frame_id: u32,
    stream_id: u8,
    frame: &[u8],
    chunk_size: usize,
) -> Result<Vec<Vec<u8>>, WireError> {
    if frame.is_empty() {
        return Err(WireError::EmptyFrame);
    }
    if chunk_size == 0 || chunk_size > MAX_DATAGRAM - HEADER_LEN {
        return Err(WireError::InvalidChunkSize(chunk_size));
    }

    let count = frame.len().div_ceil(chunk_size);
    let total_chunks =
        u16::try_from(count).map_err(|_| WireError::TooManyChunks(count))?;

    Ok(frame
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, payload)| {
            Packet {
                frame_id,
                chunk_index: i as u16,
                total_chunks,
                stream_id,
                payload,
            }
            .encode()
        })
        .collect())
}

// ── Frame ids ─────────────────────────────────────────────────────────────────

/// Circular comparison of frame ids.
///
/// `candidate` is newer than `latest` when their wrapping difference,
/// read as a signed 32-bit value, is positive. Ids therefore keep ordering
/// across the 2^32 wrap as long as the two are within 2^31 of each other.
pub fn is_newer(candidate: u32, latest: u32) -> bool {
    (candidate.wrapping_sub(latest) as i32) > 0
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Reasons a datagram is not accepted as a video chunk.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("datagram of {0} bytes has no payload after the {}-byte header", HEADER_LEN)]
    TooShort(usize),

    #[error("stream id {0} is not the video stream")]
    WrongStream(u8),

    #[error("frame {frame_id} announces zero chunks")]
    ZeroChunks { frame_id: u32 },

    #[error("frame {frame_id}: chunk index {chunk_index} outside 0..{total_chunks}")]
    IndexOutOfRange {
        frame_id: u32,
        chunk_index: u16,
        total_chunks: u16,
    },

    #[error("cannot fragment an empty frame")]
    EmptyFrame,

    #[error("chunk size {0} is outside 1..={}", MAX_DATAGRAM - HEADER_LEN)]
    InvalidChunkSize(usize),

    #[error("frame needs {0} chunks, more than a u16 index can address")]
    TooManyChunks(usize),
}

impl WireError {
    /// Expected noise on a shared port. Dropped without logging.
    pub fn is_silent(&self) -> bool {
        matches!(self, WireError::TooShort(_) | WireError::WrongStream(_))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
