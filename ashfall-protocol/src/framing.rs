use bytes::BytesMut;
use thiserror::Error;

/// Frame delimiter for both the client and upstream wire.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Per-frame limit on the client wire.
pub const MAX_FRAME_BYTES: usize = 8 * 1024;

/// The upstream replication payloads (full mob/item catalogs) run larger.
pub const MAX_UPSTREAM_FRAME_BYTES: usize = 12 * 1024;

/// Cap on buffered-but-unframed bytes per session.
pub const MAX_ACCUMULATOR_BYTES: usize = 64 * 1024;

/// Frames handled per read cycle, so one chatty peer cannot starve others.
pub const MAX_FRAMES_PER_READ: usize = 10;

/// Read scratch size.
pub const READ_CHUNK_BYTES: usize = 4 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("accumulated buffer exceeded {max} bytes")]
    AccumulatorOverflow { max: usize },
}

/// Newline framer over an accumulation buffer. Appends raw reads, yields
/// complete frames, and enforces the session buffer limits. Oversize frames
/// are skipped (the connection survives); accumulator overflow is fatal to
/// the session.
#[derive(Debug)]
pub struct FrameAccumulator {
    buffer: BytesMut,
    max_frame: usize,
    oversize_skipped: u64,
}

impl FrameAccumulator {
    pub fn new(max_frame: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(READ_CHUNK_BYTES),
            max_frame,
            oversize_skipped: 0,
        }
    }

    pub fn push(&mut self, data: &[u8]) -> Result<(), FramingError> {
        if self.buffer.len() + data.len() > MAX_ACCUMULATOR_BYTES {
            return Err(FramingError::AccumulatorOverflow {
                max: MAX_ACCUMULATOR_BYTES,
            });
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Next complete frame, or `None` when the buffer holds only a partial
    /// line. Oversize frames are dropped and counted, then the scan
    /// continues with the following frame.
    pub fn next_frame(&mut self) -> Option<String> {
        loop {
            let pos = self
                .buffer
                .iter()
                .position(|b| *b == FRAME_DELIMITER)?;
            let frame = self.buffer.split_to(pos + 1);
            let frame = &frame[..pos];

            if frame.len() > self.max_frame {
                self.oversize_skipped += 1;
                log::error!(
                    "skipping oversize frame of {} bytes (limit {})",
                    frame.len(),
                    self.max_frame
                );
                continue;
            }

            match std::str::from_utf8(frame) {
                Ok(text) => return Some(text.trim_end_matches('\r').to_owned()),
                Err(_) => {
                    log::error!("skipping non-utf8 frame of {} bytes", frame.len());
                    continue;
                }
            }
        }
    }

    /// Drop a partial buffer that bloated without ever seeing a delimiter.
    /// Returns true when the buffer was cleared.
    pub fn drop_stuck_partial(&mut self) -> bool {
        if self.buffer.len() > MAX_ACCUMULATOR_BYTES / 2
            && !self.buffer.contains(&FRAME_DELIMITER)
        {
            self.buffer.clear();
            return true;
        }
        false
    }

    /// Shed excess capacity after a burst drained.
    pub fn compact(&mut self) {
        if self.buffer.capacity() > MAX_ACCUMULATOR_BYTES
            && self.buffer.len() < MAX_ACCUMULATOR_BYTES / 4
        {
            let kept = self.buffer.split();
            self.buffer = BytesMut::with_capacity(READ_CHUNK_BYTES);
            self.buffer.extend_from_slice(&kept);
        }
    }

    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn oversize_skipped(&self) -> u64 {
        self.oversize_skipped
    }
}
