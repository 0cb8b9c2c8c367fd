//! Screen mirroring capture
//!
//! Mirrors an existing display into the encoder surface through a virtual
//! display. When crop, orientation or angle require it, a render stage is
//! inserted between the virtual display and the encoder; otherwise the
//! virtual display renders directly at the output size.

use std::sync::Arc;

use tracing::debug;

use beam_common::{BeamError, BeamResult, Orientation, OrientationLock, Rect, Size};

use crate::capture::{
    CaptureListener, CaptureOptions, PositionMapper, SurfaceCapture, VirtualDisplayListener,
};
use crate::device::{DisplayInfo, DisplayServices, VirtualDisplayHandle};
use crate::filter::VideoFilter;
use crate::monitor::DisplaySizeMonitor;
use crate::render::{AffineRenderer, RenderWorker};
use crate::surface::Surface;
use crate::transform::AffineMatrix;

pub struct ScreenCapture {
    displays: Arc<dyn DisplayServices>,
    render_worker: Arc<RenderWorker>,
    vd_listener: Option<Arc<dyn VirtualDisplayListener>>,

    display_id: u32,
    max_size: u32,
    crop: Option<Rect>,
    orientation: Orientation,
    orientation_lock: OrientationLock,
    angle: f64,

    listener: Option<Arc<dyn CaptureListener>>,
    monitor: DisplaySizeMonitor,

    display_info: Option<DisplayInfo>,
    size: Option<Size>,
    /// Video to device transform, `None` meaning no render stage
    transform: Option<AffineMatrix>,

    renderer: Option<AffineRenderer>,
    virtual_display: Option<Box<dyn VirtualDisplayHandle>>,
}

impl ScreenCapture {
    pub fn new(
        options: CaptureOptions,
        displays: Arc<dyn DisplayServices>,
        render_worker: Arc<RenderWorker>,
        vd_listener: Option<Arc<dyn VirtualDisplayListener>>,
    ) -> Self {
        Self {
            displays,
            render_worker,
            vd_listener,
            display_id: options.display_id,
            max_size: options.max_size,
            crop: options.crop,
            orientation: options.capture_orientation,
            orientation_lock: options.capture_orientation_lock,
            angle: options.angle,
            listener: None,
            monitor: DisplaySizeMonitor::new(),
            display_info: None,
            size: None,
            transform: None,
            renderer: None,
            virtual_display: None,
        }
    }

    fn release_virtual_display(&mut self) {
        if let Some(mut vd) = self.virtual_display.take() {
            vd.release();
        }
    }
}

impl SurfaceCapture for ScreenCapture {
    fn init(&mut self, listener: Arc<dyn CaptureListener>) -> BeamResult<()> {
        self.monitor
            .start(self.displays.clone(), self.display_id, listener.clone());
        self.listener = Some(listener);
        Ok(())
    }

    fn prepare(&mut self) -> BeamResult<()> {
        let info = self.displays.display_info(self.display_id).ok_or_else(|| {
            BeamError::Config(format!("Display {} not found", self.display_id))
        })?;

        debug!("Display {}: {} rotation={}", self.display_id, info.size, info.rotation);
        self.monitor.set_session_display_size(info.size);

        if self.orientation_lock == OrientationLock::LockedInitial {
            // The lock value is the orientation at session start, then it
            // stays stable across restarts
            self.orientation = Orientation::from_ccw_rotation(info.rotation);
            self.orientation_lock = OrientationLock::LockedValue;
        }

        let mut filter = VideoFilter::new(info.size);

        if let Some(crop) = self.crop {
            // The crop is expressed in the natural orientation
            let transposed = info.rotation % 2 != 0;
            filter.add_crop(crop, transposed)?;
        }

        let locked = self.orientation_lock != OrientationLock::Unlocked;
        filter.add_orientation_locked(info.rotation, locked, self.orientation)?;
        filter.add_angle(self.angle);

        self.transform = filter.inverse_transform();
        self.size = Some(filter.output_size().limit(self.max_size).round8());
        self.display_info = Some(info);
        Ok(())
    }

    fn start(&mut self, surface: Surface) -> BeamResult<()> {
        self.release_virtual_display();

        let info = self
            .display_info
            .ok_or_else(|| BeamError::Capture("Capture not prepared".into()))?;
        let size = self
            .size
            .ok_or_else(|| BeamError::Capture("Capture not prepared".into()))?;

        let (input_size, display_surface) = match self.transform {
            Some(transform) => {
                // Render at the display resolution, the render stage scales
                // down to the video size
                let mut renderer = AffineRenderer::new(self.render_worker.clone(), &transform);
                let input_surface = renderer.start(info.size, size, surface)?;
                self.renderer = Some(renderer);
                (info.size, input_surface)
            }
            None => (size, surface),
        };

        let vd = self
            .displays
            .create_virtual_display("beam", input_size, self.display_id, display_surface)?;
        debug!("Display {} mirrored at {input_size} (id={})", self.display_id, vd.display_id());

        if let Some(listener) = &self.vd_listener {
            let mapper = PositionMapper::create(size, self.transform, input_size);
            listener.on_new_virtual_display(vd.display_id(), mapper);
        }

        self.virtual_display = Some(vd);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.stop_and_release();
        }
    }

    fn release(&mut self) {
        self.monitor.stop_and_release();
        self.release_virtual_display();
    }

    fn size(&self) -> Option<Size> {
        self.size
    }

    fn set_max_size(&mut self, max_size: u32) -> bool {
        self.max_size = max_size;
        true
    }

    fn request_invalidate(&mut self) {
        if let Some(listener) = &self.listener {
            listener.on_invalidated();
        }
    }
}
