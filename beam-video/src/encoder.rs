//! Surface encoder
//!
//! Owns the capture/encode thread: repeatedly builds an encoder session
//! (prepare geometry, configure the encoder, connect the capture to the
//! encoder input surface, drain access units into the streamer) and rebuilds
//! it whenever the capture geometry is invalidated. On persistent encoder
//! errors before the first frame, retries at progressively smaller sizes.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use beam_common::{BeamError, BeamResult, Size};
use beam_stream::{Codec, EncodedPacket, Streamer, VideoCodec};

use crate::capture::{CaptureOptions, CaptureReset, SurfaceCapture};
use crate::surface::Surface;

/// Control surface of a running hardware encoder, callable from any thread.
pub trait EncoderControl: Send + Sync {
    /// Ask the encoder to emit an end-of-stream as soon as possible.
    fn signal_end_of_stream(&self);
}

/// One dequeued encoder event
pub enum EncoderOutput {
    Packet(EncodedPacket),
    EndOfStream,
}

/// Desired encoder configuration for one session
#[derive(Debug, Clone)]
pub struct EncoderFormat {
    pub codec: VideoCodec,
    pub size: Size,
    pub bit_rate: u32,
    /// 0 means unlimited
    pub max_fps: f32,
    pub i_frame_interval_secs: u32,
    /// Resubmit the previous frame if no new frame arrived within this delay
    pub repeat_frame_delay_us: u64,
}

/// Default key frame interval
pub const I_FRAME_INTERVAL_SECS: u32 = 10;
/// Default repeat-frame delay, keeps the stream alive on a static screen
pub const REPEAT_FRAME_DELAY_US: u64 = 100_000;

/// A hardware video encoder, driven from the encoder thread.
pub trait HardwareEncoder: Send {
    /// Configure for a new session. Must be callable again after `reset`.
    fn configure(&mut self, format: &EncoderFormat) -> BeamResult<()>;

    /// Create the surface the capture source will produce into. Valid between
    /// `configure` and `reset`.
    fn create_input_surface(&mut self) -> BeamResult<Surface>;

    fn start(&mut self) -> BeamResult<()>;

    fn stop(&mut self);

    /// Return to the unconfigured state, invalidating the input surface.
    fn reset(&mut self);

    /// Handle used to interrupt a blocked `dequeue_output` from another
    /// thread.
    fn control(&self) -> Arc<dyn EncoderControl>;

    /// Block until the next access unit or end-of-stream.
    fn dequeue_output(&mut self, timeout: Duration) -> BeamResult<EncoderOutput>;
}

/// Creates hardware encoders by codec, hiding the platform encoder list.
pub trait EncoderEngine: Send + Sync {
    /// `encoder_name` forces a specific encoder; an unknown name is a
    /// configuration error.
    fn create_encoder(
        &self,
        codec: VideoCodec,
        encoder_name: Option<&str>,
    ) -> BeamResult<Box<dyn HardwareEncoder>>;
}

// Downsize fallback ladder on early encoder errors
const MAX_SIZE_FALLBACK: [u32; 6] = [2560, 1920, 1600, 1280, 1024, 800];
const MAX_CONSECUTIVE_ERRORS: u32 = 3;
const RETRY_PAUSE: Duration = Duration::from_millis(50);
// An encoder stuck longer than this has failed
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

fn choose_fallback_size(current: u32) -> Option<u32> {
    MAX_SIZE_FALLBACK.iter().copied().find(|&value| value < current)
}

struct EncoderRunner {
    capture: Box<dyn SurfaceCapture>,
    streamer: Streamer<Box<dyn Write + Send>>,
    engine: Arc<dyn EncoderEngine>,
    encoder_name: Option<String>,
    codec: VideoCodec,
    bit_rate: u32,
    max_fps: f32,
    downsize_on_error: bool,
    stopped: Arc<AtomicBool>,
    reset: Arc<CaptureReset>,
    first_frame_sent: bool,
    consecutive_errors: u32,
}

impl EncoderRunner {
    fn stream_capture(&mut self) -> BeamResult<()> {
        let mut encoder = self.engine.create_encoder(self.codec, self.encoder_name.as_deref())?;
        self.capture.init(self.reset.clone())?;

        let result = self.run_sessions(encoder.as_mut());
        self.capture.release();
        result
    }

    fn run_sessions(&mut self, encoder: &mut dyn HardwareEncoder) -> BeamResult<()> {
        let mut header_written = false;

        loop {
            // A pending reset is implicitly fulfilled by building a session
            self.reset.consume_reset();

            self.capture.prepare()?;
            let size = self
                .capture
                .size()
                .ok_or_else(|| BeamError::Capture("Capture size not negotiated".into()))?;

            if !header_written {
                self.streamer.write_video_header(size)?;
                header_written = true;
            }

            let format = EncoderFormat {
                codec: self.codec,
                size,
                bit_rate: self.bit_rate,
                max_fps: self.max_fps,
                i_frame_interval_secs: I_FRAME_INTERVAL_SECS,
                repeat_frame_delay_us: REPEAT_FRAME_DELAY_US,
            };

            match self.run_session(encoder, &format) {
                Ok(true) => continue,
                Ok(false) => return Ok(()),
                Err(e) => {
                    if e.is_config() || e.is_broken_pipe() {
                        // Not an encoder error, propagate as is
                        return Err(e);
                    }
                    error!("Capture/encoding error: {e}");
                    if !self.prepare_retry(size) {
                        return Err(e);
                    }
                }
            }
        }
    }

    /// Run one encoder session. Returns whether the stream is still alive
    /// (`false` to end cleanly).
    fn run_session(
        &mut self,
        encoder: &mut dyn HardwareEncoder,
        format: &EncoderFormat,
    ) -> BeamResult<bool> {
        debug!("Starting encoder session at {}", format.size);

        let mut capture_started = false;
        let mut encoder_started = false;

        let result = (|| {
            encoder.configure(format)?;
            let surface = encoder.create_input_surface()?;

            self.capture.start(surface)?;
            capture_started = true;

            encoder.start()?;
            encoder_started = true;

            self.reset.set_running_encoder(Some(encoder.control()));

            // A stop or an invalidation may have occurred between the session
            // decision and the encoder registration; it could not interrupt
            // the encoder, so handle it now.
            let alive = if self.stopped.load(Ordering::SeqCst) {
                false
            } else if self.reset.consume_reset() {
                // Skip the drain, rebuild immediately (re-arm so the loop
                // consumes it)
                self.reset.reset();
                true
            } else {
                self.drain(encoder)?;
                !self.stopped.load(Ordering::SeqCst) && !self.capture.is_closed()
            };
            Ok(alive)
        })();

        self.reset.set_running_encoder(None);
        if capture_started {
            self.capture.stop();
        }
        if encoder_started {
            encoder.stop();
        }
        encoder.reset();

        result
    }

    /// Forward access units to the streamer until end-of-stream.
    fn drain(&mut self, encoder: &mut dyn HardwareEncoder) -> BeamResult<()> {
        loop {
            match encoder.dequeue_output(DRAIN_TIMEOUT)? {
                EncoderOutput::EndOfStream => return Ok(()),
                EncoderOutput::Packet(packet) => {
                    if !packet.config {
                        // A real frame was encoded, the encoder config works
                        self.first_frame_sent = true;
                        self.consecutive_errors = 0;
                    }
                    self.streamer.write_packet(&packet)?;
                }
            }
        }
    }

    /// Decide whether the session may be retried after an encoder error.
    fn prepare_retry(&mut self, current_size: Size) -> bool {
        if self.first_frame_sent {
            self.consecutive_errors += 1;
            if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                return false;
            }
            // The encoder worked before, wait for a transient failure to pass
            thread::sleep(RETRY_PAUSE);
            return true;
        }

        // Encoder failed before the first frame: the size is probably not
        // supported, downsize if allowed
        if !self.downsize_on_error {
            return false;
        }

        match choose_fallback_size(current_size.max_dim()) {
            Some(new_max_size) => {
                if !self.capture.set_max_size(new_max_size) {
                    return false;
                }
                info!("Retrying with a lower size limit: {new_max_size}");
                true
            }
            None => false,
        }
    }
}

/// Drives a capture source into a [`Streamer`] on a dedicated thread.
pub struct SurfaceEncoder {
    runner: Option<EncoderRunner>,
    thread: Option<thread::JoinHandle<()>>,
    stopped: Arc<AtomicBool>,
    reset: Arc<CaptureReset>,
}

impl SurfaceEncoder {
    pub fn new(
        capture: Box<dyn SurfaceCapture>,
        streamer: Streamer<Box<dyn Write + Send>>,
        engine: Arc<dyn EncoderEngine>,
        options: &CaptureOptions,
        encoder_name: Option<String>,
    ) -> BeamResult<Self> {
        let codec = match streamer.codec() {
            Codec::Video(codec) => codec,
            Codec::Audio(_) => {
                return Err(BeamError::Config("Video encoder requires a video codec".into()))
            }
        };

        let stopped = Arc::new(AtomicBool::new(false));
        let reset = Arc::new(CaptureReset::new());

        Ok(Self {
            runner: Some(EncoderRunner {
                capture,
                streamer,
                engine,
                encoder_name,
                codec,
                bit_rate: options.video_bit_rate,
                max_fps: options.max_fps,
                downsize_on_error: options.downsize_on_error,
                stopped: stopped.clone(),
                reset: reset.clone(),
                first_frame_sent: false,
                consecutive_errors: 0,
            }),
            thread: None,
            stopped,
            reset,
        })
    }

    /// The latch used to invalidate the capture geometry from outside.
    pub fn reset_handle(&self) -> Arc<CaptureReset> {
        self.reset.clone()
    }

    /// Spawn the capture/encode thread.
    ///
    /// `on_terminated` is invoked from the thread when streaming ends for any
    /// reason, with `true` when it died on an error the owner must react to
    /// (a clean stop or a closed peer connection report `false`).
    pub fn start<F>(&mut self, on_terminated: F) -> BeamResult<()>
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let mut runner = self
            .runner
            .take()
            .ok_or_else(|| BeamError::Config("Encoder already started".into()))?;

        let handle = thread::Builder::new()
            .name("video-encoder".into())
            .spawn(move || {
                let fatal = match runner.stream_capture() {
                    Ok(()) => false,
                    Err(e) if e.is_config() => {
                        // The configuration is not retryable, tell the peer
                        error!("Video capture configuration error: {e}");
                        let _ = runner.streamer.write_disable_stream(true);
                        true
                    }
                    Err(e) if e.is_broken_pipe() => {
                        // The peer is gone, this is a normal termination
                        debug!("Video stream interrupted: {e}");
                        false
                    }
                    Err(e) => {
                        error!("Video encoding error: {e}");
                        true
                    }
                };
                debug!("Video streaming stopped");
                on_terminated(fatal);
            })
            .map_err(|e| BeamError::Config(format!("Could not spawn encoder thread: {e}")))?;

        self.thread = Some(handle);
        Ok(())
    }

    /// Request the encoder thread to terminate.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        // Interrupt a session blocked in drain
        self.reset.reset();
    }

    /// Wait for the encoder thread to terminate.
    pub fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}
