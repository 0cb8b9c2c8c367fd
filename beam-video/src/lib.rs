//! Video capture and encoding pipeline
//!
//! Device-side mirroring pipeline:
//!
//! - Capture sources (screen mirror, new virtual display, camera) producing
//!   raw frames into a surface
//! - A geometry filter (crop, orientation, rotation, resize) applied by an
//!   optional render stage
//! - An adaptive hardware-encoder session loop with automatic rebuild on
//!   geometry changes and downsize retry on encoder failures

pub mod camera;
pub mod capture;
pub mod device;
pub mod encoder;
pub mod filter;
pub mod monitor;
pub mod new_display;
pub mod render;
pub mod screen;
pub mod surface;
pub mod transform;

pub use capture::{
    create_capture, CaptureListener, CaptureOptions, CaptureReset, NewDisplay, PositionMapper,
    SurfaceCapture, VideoSourceKind, VirtualDisplayListener,
};
pub use encoder::{
    EncoderControl, EncoderEngine, EncoderFormat, EncoderOutput, HardwareEncoder, SurfaceEncoder,
};
pub use filter::VideoFilter;
pub use render::{AffineRenderer, RenderBackend, RenderWorker, SoftwareRenderBackend};
pub use surface::{surface_pair, Frame, FrameStream, Surface};
pub use transform::AffineMatrix;
