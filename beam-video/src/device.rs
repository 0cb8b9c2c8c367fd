//! Opaque device services consumed by the capture sources
//!
//! The pipeline never talks to the host OS directly: display and camera
//! managers are injected behind these traits, so the capture variants stay
//! testable and the service lookups live outside this crate.

use std::sync::Arc;

use beam_common::{BeamResult, Size};

use crate::surface::Surface;

/// Geometry of an existing display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayInfo {
    pub display_id: u32,
    /// Current logical size (post-rotation)
    pub size: Size,
    /// Counter-clockwise rotation in quarter turns (0..=3)
    pub rotation: u32,
    pub dpi: u32,
    pub layer_stack: u32,
}

/// Token identifying a registered display-change subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayListenerHandle(pub u64);

/// A created virtual display (either mirroring an existing display or a
/// brand-new standalone one)
pub trait VirtualDisplayHandle: Send {
    fn display_id(&self) -> u32;

    /// Swap the surface the display renders into, keeping the display alive.
    fn set_surface(&mut self, surface: Surface) -> BeamResult<()>;

    fn release(&mut self);
}

/// Display manager service, injected by the process bootstrap
pub trait DisplayServices: Send + Sync {
    fn display_info(&self, display_id: u32) -> Option<DisplayInfo>;

    /// Create a virtual display mirroring `mirrored_display_id` into `surface`.
    fn create_virtual_display(
        &self,
        name: &str,
        size: Size,
        mirrored_display_id: u32,
        surface: Surface,
    ) -> BeamResult<Box<dyn VirtualDisplayHandle>>;

    /// Create a brand-new standalone display rendering into `surface`.
    fn create_new_display(
        &self,
        name: &str,
        size: Size,
        dpi: u32,
        surface: Surface,
    ) -> BeamResult<Box<dyn VirtualDisplayHandle>>;

    /// Subscribe to change events of one display. The callback may be invoked
    /// from any device thread.
    fn register_display_listener(
        &self,
        display_id: u32,
        callback: Box<dyn Fn() + Send + Sync>,
    ) -> DisplayListenerHandle;

    fn unregister_display_listener(&self, handle: DisplayListenerHandle);
}

/// Which way a camera sensor faces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFacing {
    Front,
    Back,
    External,
}

impl CameraFacing {
    pub fn from_name(name: &str) -> Option<CameraFacing> {
        match name {
            "front" => Some(CameraFacing::Front),
            "back" => Some(CameraFacing::Back),
            "external" => Some(CameraFacing::External),
            _ => None,
        }
    }
}

/// Requested camera aspect ratio
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraAspectRatio {
    /// The sensor's native aspect ratio
    Sensor,
    Ratio(f32),
}

impl CameraAspectRatio {
    pub fn from_fraction(w: u32, h: u32) -> BeamResult<CameraAspectRatio> {
        if w == 0 || h == 0 {
            return Err(beam_common::BeamError::Config(format!("Invalid aspect ratio: {w}:{h}")));
        }
        Ok(CameraAspectRatio::Ratio(w as f32 / h as f32))
    }
}

/// Static capabilities advertised by a camera sensor
#[derive(Debug, Clone)]
pub struct CameraCharacteristics {
    pub facing: CameraFacing,
    /// Aspect ratio of the sensor's active array
    pub sensor_aspect_ratio: f32,
    /// Capture resolutions supported in regular mode
    pub capture_sizes: Vec<Size>,
    /// Capture resolutions supported in high-speed mode
    pub high_speed_capture_sizes: Vec<Size>,
}

/// Asynchronous camera device events, raised from the camera's own thread
pub trait CameraEvents: Send + Sync {
    fn on_disconnected(&self);
}

/// A configured repeating-capture session
pub trait CameraSession: Send {
    fn close(&mut self);
}

/// An opened camera device
pub trait CameraDevice: Send {
    /// Configure the device and start a repeating capture into `surface`.
    fn start_repeating(
        &mut self,
        surface: Surface,
        fps: u32,
        high_speed: bool,
    ) -> BeamResult<Box<dyn CameraSession>>;

    fn close(&mut self);
}

/// Camera manager service, injected by the process bootstrap
pub trait CameraServices: Send + Sync {
    fn camera_ids(&self) -> Vec<String>;

    fn characteristics(&self, camera_id: &str) -> Option<CameraCharacteristics>;

    fn open_camera(
        &self,
        camera_id: &str,
        events: Arc<dyn CameraEvents>,
    ) -> BeamResult<Box<dyn CameraDevice>>;
}
