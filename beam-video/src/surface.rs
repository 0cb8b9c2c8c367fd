//! Frame plumbing between pipeline stages
//!
//! A `Surface` is the producer side of a bounded frame channel: capture
//! sources and the render stage push frames into it, and whoever created the
//! surface drains the other end.

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;

use beam_common::{BeamError, BeamResult, Size};

/// One raw frame written into a surface
#[derive(Debug, Clone)]
pub struct Frame {
    /// Pixel data (BGRA)
    pub data: Bytes,
    /// Frame dimensions
    pub size: Size,
    /// Capture timestamp in microseconds
    pub pts_us: u64,
}

impl Frame {
    pub fn new(data: Bytes, size: Size, pts_us: u64) -> Self {
        Self { data, size, pts_us }
    }
}

/// Producer handle of a frame channel
#[derive(Debug, Clone)]
pub struct Surface {
    tx: Sender<Frame>,
}

impl Surface {
    /// Push a frame, dropping this frame instead of blocking when the
    /// consumer is late and the channel is full.
    ///
    /// Fails with a broken-pipe capture error when the consumer is gone
    /// (the encoder session was torn down).
    pub fn push_frame(&self, frame: Frame) -> BeamResult<()> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Ok(()), // consumer is late, drop
            Err(TrySendError::Disconnected(_)) => Err(BeamError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "surface consumer is gone",
            ))),
        }
    }

}

/// Consumer handle of a frame channel
#[derive(Debug)]
pub struct FrameStream {
    rx: Receiver<Frame>,
}

impl FrameStream {
    /// Block until the next frame, or `None` when all producers are gone.
    pub fn recv(&self) -> Option<Frame> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<Frame, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected producer/consumer pair with the given channel capacity.
pub fn surface_pair(capacity: usize) -> (Surface, FrameStream) {
    let (tx, rx) = bounded(capacity);
    (Surface { tx }, FrameStream { rx })
}

/// Like [`surface_pair`], but exposing the raw receiver (needed to `select!`
/// frames against another channel).
pub(crate) fn surface_pair_raw(capacity: usize) -> (Surface, Receiver<Frame>) {
    let (tx, rx) = bounded(capacity);
    (Surface { tx }, rx)
}
