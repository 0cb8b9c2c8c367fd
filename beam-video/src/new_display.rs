//! New virtual display capture
//!
//! Creates a brand-new standalone display (rather than mirroring an existing
//! one) and captures it. The display itself survives session restarts: on a
//! geometry change only the rendering surface is swapped, so running apps are
//! not disturbed.

use std::sync::Arc;

use tracing::{info, warn};

use beam_common::{BeamError, BeamResult, Orientation, OrientationLock, Rect, Size};

use crate::capture::{
    CaptureListener, CaptureOptions, NewDisplay, PositionMapper, SurfaceCapture,
    VirtualDisplayListener,
};
use crate::device::{DisplayServices, VirtualDisplayHandle};
use crate::filter::VideoFilter;
use crate::monitor::DisplaySizeMonitor;
use crate::render::{AffineRenderer, RenderWorker};
use crate::surface::Surface;
use crate::transform::{compose, AffineMatrix};

const MAIN_DISPLAY_ID: u32 = 0;
const FALLBACK_SIZE: Size = Size::new(1920, 1080);
const FALLBACK_DPI: u32 = 240;

/// Scale a density to a new display size, keeping physical item sizes
/// roughly constant.
fn scale_dpi(initial_size: Size, initial_dpi: u32, target_size: Size) -> u32 {
    initial_dpi * target_size.max_dim() / initial_size.max_dim()
}

pub struct NewDisplayCapture {
    displays: Arc<dyn DisplayServices>,
    render_worker: Arc<RenderWorker>,
    vd_listener: Option<Arc<dyn VirtualDisplayListener>>,

    new_display: NewDisplay,
    max_size: u32,
    crop: Option<Rect>,
    orientation: Orientation,
    orientation_lock: OrientationLock,
    angle: f64,

    listener: Option<Arc<dyn CaptureListener>>,
    monitor: DisplaySizeMonitor,

    main_display_size: Size,
    main_display_dpi: u32,

    /// Logical size of the created display
    display_size: Option<Size>,
    dpi: Option<u32>,
    /// Render size of the display in its natural orientation
    physical_size: Size,
    size: Option<Size>,
    /// Transform fed to the render stage (includes the display rotation)
    display_transform: Option<AffineMatrix>,
    /// Transform reported to the input mapper (excludes the display rotation)
    event_transform: Option<AffineMatrix>,

    renderer: Option<AffineRenderer>,
    virtual_display: Option<Box<dyn VirtualDisplayHandle>>,
}

impl NewDisplayCapture {
    pub fn new(
        options: CaptureOptions,
        displays: Arc<dyn DisplayServices>,
        render_worker: Arc<RenderWorker>,
        vd_listener: Option<Arc<dyn VirtualDisplayListener>>,
    ) -> Self {
        let new_display = options.new_display.unwrap_or_default();
        Self {
            displays,
            render_worker,
            vd_listener,
            new_display,
            max_size: options.max_size,
            crop: options.crop,
            orientation: options.capture_orientation,
            orientation_lock: options.capture_orientation_lock,
            angle: options.angle,
            listener: None,
            monitor: DisplaySizeMonitor::new(),
            main_display_size: FALLBACK_SIZE,
            main_display_dpi: FALLBACK_DPI,
            display_size: new_display.size,
            dpi: new_display.dpi,
            physical_size: FALLBACK_SIZE,
            size: None,
            display_transform: None,
            event_transform: None,
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

impl SurfaceCapture for NewDisplayCapture {
    fn init(&mut self, listener: Arc<dyn CaptureListener>) -> BeamResult<()> {
        if self.new_display.size.is_none() || self.new_display.dpi.is_none() {
            // Missing parameters are derived from the main display
            match self.displays.display_info(MAIN_DISPLAY_ID) {
                Some(info) => {
                    // Use the natural orientation of the main display
                    self.main_display_size = if info.rotation % 2 != 0 {
                        info.size.rotate()
                    } else {
                        info.size
                    };
                    self.main_display_dpi = info.dpi;
                }
                None => {
                    warn!(
                        "Main display not found, defaulting to {FALLBACK_SIZE}/{FALLBACK_DPI}dpi"
                    );
                }
            }
        }
        self.listener = Some(listener);
        Ok(())
    }

    fn prepare(&mut self) -> BeamResult<()> {
        let display_rotation;
        let display_size;
        let dpi;

        match &self.virtual_display {
            None => {
                // First session: decide the display parameters
                display_size = self.display_size.unwrap_or(self.main_display_size);
                dpi = self.dpi.unwrap_or_else(|| {
                    scale_dpi(self.main_display_size, self.main_display_dpi, display_size)
                });
                display_rotation = 0;
                self.monitor.set_session_display_size(display_size);
            }
            Some(vd) => {
                // The display already exists, it may have been rotated or
                // resized by the system
                let info = self.displays.display_info(vd.display_id()).ok_or_else(|| {
                    BeamError::Config(format!("Display {} not found", vd.display_id()))
                })?;
                display_size = info.size;
                dpi = info.dpi;
                display_rotation = info.rotation;
                self.monitor.set_session_display_size(display_size);
            }
        }

        self.display_size = Some(display_size);
        self.dpi = Some(dpi);

        let mut filter = VideoFilter::new(display_size);

        if let Some(crop) = self.crop {
            let transposed = display_rotation % 2 != 0;
            filter.add_crop(crop, transposed)?;
        }

        let locked = self.orientation_lock != OrientationLock::Unlocked;
        filter.add_orientation_locked(display_rotation, locked, self.orientation)?;
        filter.add_angle(self.angle);

        // The display renders at its own size, so size limits must go through
        // an explicit resize of the render stage
        let filter_size = filter.output_size();
        if !filter_size.is_multiple_of_8() || (self.max_size != 0 && filter_size.max_dim() > self.max_size)
        {
            let mut target = filter_size;
            if self.max_size != 0 {
                target = target.limit(self.max_size);
            }
            filter.add_resize(target.round8());
        }

        self.event_transform = filter.inverse_transform();
        self.size = Some(filter.output_size());

        // The virtual display always renders in its natural orientation
        self.physical_size = if display_rotation % 2 != 0 {
            display_size.rotate()
        } else {
            display_size
        };

        let mut display_filter = VideoFilter::new(self.physical_size);
        display_filter.add_rotation(display_rotation)?;
        self.display_transform = compose(display_filter.inverse_transform(), self.event_transform);

        Ok(())
    }

    fn start(&mut self, surface: Surface) -> BeamResult<()> {
        let display_size = self
            .display_size
            .ok_or_else(|| BeamError::Capture("Capture not prepared".into()))?;
        let size = self
            .size
            .ok_or_else(|| BeamError::Capture("Capture not prepared".into()))?;
        let dpi = self.dpi.unwrap_or(FALLBACK_DPI);

        let display_surface = match self.display_transform {
            Some(transform) => {
                let mut renderer = AffineRenderer::new(self.render_worker.clone(), &transform);
                let input_surface = renderer.start(self.physical_size, size, surface)?;
                self.renderer = Some(renderer);
                input_surface
            }
            None => surface,
        };

        match &mut self.virtual_display {
            None => {
                let vd = self
                    .displays
                    .create_new_display("beam", display_size, dpi, display_surface)?;
                info!("New display: {display_size}/{dpi}dpi (id={})", vd.display_id());

                let listener = self
                    .listener
                    .clone()
                    .ok_or_else(|| BeamError::Capture("Capture not initialized".into()))?;
                self.monitor.start(self.displays.clone(), vd.display_id(), listener);
                self.virtual_display = Some(vd);
            }
            Some(vd) => {
                // Keep the display (and the apps running on it), only swap
                // the surface
                vd.set_surface(display_surface)?;
            }
        }

        if let (Some(listener), Some(vd)) = (&self.vd_listener, &self.virtual_display) {
            let mapper = PositionMapper::create(size, self.event_transform, display_size);
            listener.on_new_virtual_display(vd.display_id(), mapper);
        }

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_dpi() {
        // Half the size, half the density
        assert_eq!(scale_dpi(Size::new(1920, 1080), 240, Size::new(960, 540)), 120);
        // Same size, same density
        assert_eq!(scale_dpi(Size::new(1920, 1080), 240, Size::new(1920, 1080)), 240);
    }
}
