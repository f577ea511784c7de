//! Gateway payload inflation.
//!
//! Discord offers two transport compression modes, selected by the
//! `compress` query parameter of the gateway URI. Both deliver zlib
//! data in binary frames; they differ in where a zlib stream starts and
//! ends. A compressor instance belongs to exactly one connection.

use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{Error, Result};

/// Marks a message boundary in `zlib-stream` mode.
const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// A payload-inflation strategy.
///
/// [`read`](Compressor::read) yields an inflated payload only once a
/// complete message has been assembled; `None` means more bytes are
/// needed.
pub trait Compressor: Send {
    /// Feed one binary frame's bytes into the inflater.
    fn read(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// Select a compressor by the gateway URI's `compress` parameter.
pub fn from_name(name: &str) -> Result<Box<dyn Compressor>> {
    match name {
        "zlib" => Ok(Box::new(Zlib::new())),
        "zlib-stream" => Ok(Box::new(ZlibStream::new())),
        other => Err(Error::UnknownCompressor(other.to_string())),
    }
}

/// Per-message compression: every frame is an independent zlib stream.
#[derive(Debug, Default)]
pub struct Zlib {
    buffer: Vec<u8>,
}

impl Zlib {
    /// Create a fresh per-message inflater.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Compressor for Zlib {
    fn read(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>> {
        self.buffer.extend_from_slice(chunk);

        // Each message is self-contained, so a fresh inflater re-reads
        // the accumulation until the stream-end marker shows up.
        let mut inflater = Decompress::new(true);
        let mut output = Vec::with_capacity(self.buffer.len().saturating_mul(4).max(64));
        loop {
            let consumed = usize::try_from(inflater.total_in()).unwrap_or(usize::MAX);
            let status =
                inflater.decompress_vec(&self.buffer[consumed..], &mut output, FlushDecompress::Finish)?;
            match status {
                Status::StreamEnd => {
                    // Buffer is cleared between messages so it cannot
                    // grow across the lifetime of the connection.
                    self.buffer.clear();
                    return Ok(Some(output));
                }
                Status::Ok | Status::BufError => {
                    if output.len() == output.capacity() {
                        output.reserve(output.capacity().max(64));
                        continue;
                    }
                    // Frame is still incomplete; keep the bytes buffered.
                    return Ok(None);
                }
            }
        }
    }
}

/// Shared-stream compression: a single zlib stream spans the whole
/// connection, with message boundaries marked by a 4-byte suffix.
///
/// The inflater is created lazily on first use and reused for every
/// message; its dictionary state carrying across frames is what makes
/// this mode cheap for Discord's highly repetitive payloads.
#[derive(Debug, Default)]
pub struct ZlibStream {
    buffer: Vec<u8>,
    inflater: Option<Decompress>,
}

impl ZlibStream {
    /// Create a fresh shared-stream inflater.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Compressor for ZlibStream {
    fn read(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>> {
        self.buffer.extend_from_slice(chunk);

        // Discord terminates every complete message's final frame with
        // the flush suffix; anything else is a partial message.
        if chunk.len() < 4 || chunk[chunk.len() - 4..] != ZLIB_SUFFIX {
            return Ok(None);
        }

        let inflater = self.inflater.get_or_insert_with(|| Decompress::new(true));
        let mut output = Vec::with_capacity(self.buffer.len().saturating_mul(4).max(64));
        let mut consumed = 0;
        loop {
            let in_before = inflater.total_in();
            let out_before = output.len();
            let status =
                inflater.decompress_vec(&self.buffer[consumed..], &mut output, FlushDecompress::Sync)?;
            consumed += usize::try_from(inflater.total_in() - in_before).unwrap_or(usize::MAX);
            if status == Status::StreamEnd {
                break;
            }
            if output.len() == output.capacity() {
                output.reserve(output.capacity().max(64));
                continue;
            }
            if consumed >= self.buffer.len() {
                break;
            }
            if inflater.total_in() == in_before && output.len() == out_before {
                // No forward progress; stop rather than spin.
                break;
            }
        }
        self.buffer.clear();
        Ok(Some(output))
    }
}
