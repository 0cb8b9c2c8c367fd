//! Capture source abstraction
//!
//! A capture source produces raw frames into a surface provided by the
//! encoder. Sources are driven through the same session lifecycle:
//!
//!  - `init` once, then for each encoder session `prepare` / `start` / `stop`,
//!  - `release` once at the end.
//!
//! Geometry invalidation (fold/rotation/resize) flows the other way, through
//! the [`CaptureListener`] given at init time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use beam_common::{Orientation, OrientationLock, Point, Position, Rect, Size};
use beam_stream::VideoCodec;

use crate::device::{CameraAspectRatio, CameraFacing, CameraServices, DisplayServices};
use crate::encoder::EncoderControl;
use crate::render::RenderWorker;
use crate::surface::Surface;
use crate::transform::{compose, AffineMatrix};

/// Receives capture geometry invalidations, from any thread.
pub trait CaptureListener: Send + Sync {
    fn on_invalidated(&self);
}

/// A source of raw video frames
pub trait SurfaceCapture: Send {
    /// Called once before the first session.
    fn init(&mut self, listener: Arc<dyn CaptureListener>) -> beam_common::BeamResult<()>;

    /// Compute the geometry for the upcoming session.
    fn prepare(&mut self) -> beam_common::BeamResult<()>;

    /// Start producing frames into `surface`.
    fn start(&mut self, surface: Surface) -> beam_common::BeamResult<()>;

    /// Stop producing frames (the session may be restarted by a later
    /// `prepare` + `start`).
    fn stop(&mut self);

    /// Called once after the last session.
    fn release(&mut self);

    /// The video size negotiated by the last `prepare`.
    fn size(&self) -> Option<Size>;

    /// Set the requested maximum size for the next `prepare`.
    ///
    /// Returns `false` if the source does not support resizing dynamically
    /// (then the current session keeps its size).
    fn set_max_size(&mut self, max_size: u32) -> bool;

    /// Whether the source has definitively stopped producing frames (for
    /// example the camera was disconnected).
    fn is_closed(&self) -> bool {
        false
    }

    /// Manually trigger an invalidation, as if the source geometry changed.
    fn request_invalidate(&mut self);
}

/// Capture invalidation latch.
///
/// Arms a reset flag and interrupts the running encoder session so that the
/// session loop tears down and rebuilds with fresh geometry. Consuming the
/// flag is an atomic read-and-clear: an invalidation arriving during a
/// rebuild is never lost, it re-arms the flag for the next iteration.
#[derive(Default)]
pub struct CaptureReset {
    reset: AtomicBool,
    running_encoder: Mutex<Option<Arc<dyn EncoderControl>>>,
}

impl CaptureReset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and clear the reset flag.
    pub fn consume_reset(&self) -> bool {
        self.reset.swap(false, Ordering::SeqCst)
    }

    /// Arm the reset flag and ask the running encoder (if any) to end its
    /// stream.
    pub fn reset(&self) {
        self.reset.store(true, Ordering::SeqCst);
        if let Some(encoder) = self.running_encoder.lock().as_ref() {
            encoder.signal_end_of_stream();
        }
    }

    /// Register (or unregister) the encoder to interrupt on reset.
    pub fn set_running_encoder(&self, encoder: Option<Arc<dyn EncoderControl>>) {
        *self.running_encoder.lock() = encoder;
    }
}

impl CaptureListener for CaptureReset {
    fn on_invalidated(&self) {
        self.reset();
    }
}

/// Maps client pointer positions (in video coordinates) back to device
/// coordinates.
#[derive(Debug, Clone)]
pub struct PositionMapper {
    video_size: Size,
    /// Video pixels to device pixels, `None` meaning identity
    video_to_device: Option<AffineMatrix>,
}

impl PositionMapper {
    /// `transform` maps video NDC to device NDC (the inverse of the filter
    /// transform); `target_size` is the coordinate space expected by the
    /// input injector.
    pub fn create(
        video_size: Size,
        transform: Option<AffineMatrix>,
        target_size: Size,
    ) -> PositionMapper {
        let convert_to_pixels = video_size != target_size || transform.is_some();
        let video_to_device = if convert_to_pixels {
            let input = AffineMatrix::ndc_from_pixels(video_size);
            let output = AffineMatrix::ndc_to_pixels(target_size);
            compose(compose(Some(output), transform), Some(input))
        } else {
            None
        };
        PositionMapper { video_size, video_to_device }
    }

    /// Map a client position to device coordinates.
    ///
    /// Returns `None` when the position was expressed against a stale video
    /// size (the event raced a resize and must be dropped).
    pub fn map(&self, position: Position) -> Option<Point> {
        if position.screen_size != self.video_size {
            return None;
        }
        match &self.video_to_device {
            Some(matrix) => Some(matrix.apply(position.point)),
            None => Some(position.point),
        }
    }
}

/// Notified when a capture source (re)creates its virtual display.
pub trait VirtualDisplayListener: Send + Sync {
    fn on_new_virtual_display(&self, display_id: u32, position_mapper: PositionMapper);
}

/// Parameters of a standalone new display
#[derive(Debug, Clone, Copy, Default)]
pub struct NewDisplay {
    /// Explicit size, or `None` to inherit the main display size
    pub size: Option<Size>,
    /// Explicit density, or `None` to scale the main display density
    pub dpi: Option<u32>,
}

/// Which device produces the video frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoSourceKind {
    #[default]
    Display,
    Camera,
}

/// User-facing capture and encoding options
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub video_source: VideoSourceKind,
    pub display_id: u32,
    pub new_display: Option<NewDisplay>,
    pub max_size: u32,
    pub crop: Option<Rect>,
    pub capture_orientation: Orientation,
    pub capture_orientation_lock: OrientationLock,
    /// Free rotation angle in degrees, clockwise
    pub angle: f64,
    pub video_codec: VideoCodec,
    pub video_bit_rate: u32,
    /// 0 means unlimited
    pub max_fps: f32,
    pub downsize_on_error: bool,
    pub camera_id: Option<String>,
    pub camera_facing: Option<CameraFacing>,
    pub camera_size: Option<Size>,
    pub camera_aspect_ratio: Option<CameraAspectRatio>,
    pub camera_fps: u32,
    pub camera_high_speed: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            video_source: VideoSourceKind::Display,
            display_id: 0,
            new_display: None,
            max_size: 0,
            crop: None,
            capture_orientation: Orientation::Orient0,
            capture_orientation_lock: OrientationLock::Unlocked,
            angle: 0.0,
            video_codec: VideoCodec::H264,
            video_bit_rate: 8_000_000,
            max_fps: 0.0,
            downsize_on_error: true,
            camera_id: None,
            camera_facing: None,
            camera_size: None,
            camera_aspect_ratio: None,
            camera_fps: 0,
            camera_high_speed: false,
        }
    }
}

/// Instantiate the capture source selected by the options.
pub fn create_capture(
    options: CaptureOptions,
    displays: Arc<dyn DisplayServices>,
    cameras: Arc<dyn CameraServices>,
    render_worker: Arc<RenderWorker>,
    vd_listener: Option<Arc<dyn VirtualDisplayListener>>,
) -> Box<dyn SurfaceCapture> {
    match options.video_source {
        VideoSourceKind::Camera => {
            Box::new(crate::camera::CameraCapture::new(options, cameras, render_worker))
        }
        VideoSourceKind::Display if options.new_display.is_some() => Box::new(
            crate::new_display::NewDisplayCapture::new(options, displays, render_worker, vd_listener),
        ),
        VideoSourceKind::Display => Box::new(crate::screen::ScreenCapture::new(
            options,
            displays,
            render_worker,
            vd_listener,
        )),
    }
}
