//! Camera capture
//!
//! Captures a camera device into the encoder surface. Camera frames are
//! delivered bottom-up, so the render stage (when one is needed) flips them
//! with a texture matrix override. A camera disconnection definitively closes
//! the capture.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use beam_common::{BeamError, BeamResult, Orientation, Rect, Size};

use crate::capture::{CaptureListener, CaptureOptions, SurfaceCapture};
use crate::device::{
    CameraAspectRatio, CameraDevice, CameraEvents, CameraFacing, CameraServices, CameraSession,
};
use crate::filter::VideoFilter;
use crate::render::{AffineRenderer, RenderWorker, VFLIP_MATRIX};
use crate::surface::Surface;
use crate::transform::AffineMatrix;

// Tolerance around the requested aspect ratio when selecting a size
const ASPECT_RATIO_TOLERANCE: f32 = 0.1;

struct CameraEventForwarder {
    disconnected: Arc<AtomicBool>,
    listener: Arc<dyn CaptureListener>,
}

impl CameraEvents for CameraEventForwarder {
    fn on_disconnected(&self) {
        debug!("Camera disconnected");
        self.disconnected.store(true, Ordering::SeqCst);
        // Wake the session loop so it observes the closed state
        self.listener.on_invalidated();
    }
}

pub struct CameraCapture {
    cameras: Arc<dyn CameraServices>,
    render_worker: Arc<RenderWorker>,

    explicit_id: Option<String>,
    facing: Option<CameraFacing>,
    explicit_size: Option<Size>,
    max_size: u32,
    aspect_ratio: Option<CameraAspectRatio>,
    fps: u32,
    high_speed: bool,
    crop: Option<Rect>,
    orientation: Orientation,
    angle: f64,

    camera_id: Option<String>,
    capture_size: Option<Size>,
    size: Option<Size>,
    transform: Option<AffineMatrix>,

    disconnected: Arc<AtomicBool>,

    device: Option<Box<dyn CameraDevice>>,
    session: Option<Box<dyn CameraSession>>,
    renderer: Option<AffineRenderer>,
}

impl CameraCapture {
    pub fn new(
        options: CaptureOptions,
        cameras: Arc<dyn CameraServices>,
        render_worker: Arc<RenderWorker>,
    ) -> Self {
        Self {
            cameras,
            render_worker,
            explicit_id: options.camera_id,
            facing: options.camera_facing,
            explicit_size: options.camera_size,
            max_size: options.max_size,
            aspect_ratio: options.camera_aspect_ratio,
            fps: options.camera_fps,
            high_speed: options.camera_high_speed,
            crop: options.crop,
            orientation: options.capture_orientation,
            angle: options.angle,
            camera_id: None,
            capture_size: None,
            size: None,
            transform: None,
            disconnected: Arc::new(AtomicBool::new(false)),
            device: None,
            session: None,
            renderer: None,
        }
    }

    fn select_camera(&self) -> BeamResult<String> {
        if let Some(id) = &self.explicit_id {
            if !self.cameras.camera_ids().contains(id) {
                return Err(BeamError::Config(format!("Camera {id} not found")));
            }
            return Ok(id.clone());
        }

        let ids = self.cameras.camera_ids();
        if let Some(facing) = self.facing {
            return ids
                .into_iter()
                .find(|id| {
                    self.cameras
                        .characteristics(id)
                        .map(|c| c.facing == facing)
                        .unwrap_or(false)
                })
                .ok_or_else(|| {
                    BeamError::Config(format!("No camera with facing {facing:?} found"))
                });
        }

        ids.into_iter()
            .next()
            .ok_or_else(|| BeamError::Config("No camera found".into()))
    }

    fn select_size(&self, camera_id: &str) -> Option<Size> {
        if let Some(size) = self.explicit_size {
            return Some(size);
        }

        let chars = self.cameras.characteristics(camera_id)?;
        let sizes = if self.high_speed {
            &chars.high_speed_capture_sizes
        } else {
            &chars.capture_sizes
        };

        let target_ratio = self.aspect_ratio.map(|ar| match ar {
            CameraAspectRatio::Sensor => chars.sensor_aspect_ratio,
            CameraAspectRatio::Ratio(r) => r,
        });

        sizes
            .iter()
            .copied()
            .filter(|size| {
                self.max_size == 0
                    || (size.width <= self.max_size && size.height <= self.max_size)
            })
            .filter(|size| match target_ratio {
                Some(ratio) => {
                    let r = size.width as f32 / size.height as f32;
                    (r / ratio - 1.0).abs() <= ASPECT_RATIO_TOLERANCE
                }
                None => true,
            })
            .max_by(|lhs, rhs| {
                // Prefer the widest, then the closest to the requested
                // ratio, then the tallest
                let key = |size: &Size| {
                    let closeness = match target_ratio {
                        Some(ratio) => {
                            -((size.width as f32 / size.height as f32) / ratio - 1.0).abs()
                        }
                        None => 0.0,
                    };
                    (size.width, closeness, size.height)
                };
                let (lw, lc, lh) = key(lhs);
                let (rw, rc, rh) = key(rhs);
                lw.cmp(&rw)
                    .then(lc.partial_cmp(&rc).unwrap_or(std::cmp::Ordering::Equal))
                    .then(lh.cmp(&rh))
            })
    }
}

impl SurfaceCapture for CameraCapture {
    fn init(&mut self, listener: Arc<dyn CaptureListener>) -> BeamResult<()> {
        let camera_id = self.select_camera()?;
        debug!("Using camera '{camera_id}'");

        let events = Arc::new(CameraEventForwarder {
            disconnected: self.disconnected.clone(),
            listener,
        });
        let device = self.cameras.open_camera(&camera_id, events)?;

        self.camera_id = Some(camera_id);
        self.device = Some(device);
        Ok(())
    }

    fn prepare(&mut self) -> BeamResult<()> {
        let camera_id = self
            .camera_id
            .as_deref()
            .ok_or_else(|| BeamError::Capture("Camera not initialized".into()))?;

        let capture_size = self
            .select_size(camera_id)
            .ok_or_else(|| BeamError::Capture("Could not select any camera size".into()))?;
        debug!("Camera capture size: {capture_size}");

        let mut filter = VideoFilter::new(capture_size);
        if let Some(crop) = self.crop {
            filter.add_crop(crop, false)?;
        }
        if self.orientation != Orientation::Orient0 {
            filter.add_orientation(self.orientation)?;
        }
        filter.add_angle(self.angle);

        self.transform = filter.inverse_transform();
        self.size = Some(filter.output_size().limit(self.max_size).round8());
        self.capture_size = Some(capture_size);
        Ok(())
    }

    fn start(&mut self, surface: Surface) -> BeamResult<()> {
        let capture_size = self
            .capture_size
            .ok_or_else(|| BeamError::Capture("Capture not prepared".into()))?;
        let size = self
            .size
            .ok_or_else(|| BeamError::Capture("Capture not prepared".into()))?;

        let camera_surface = match self.transform {
            Some(transform) => {
                // Camera frames arrive bottom-up
                let mut renderer = AffineRenderer::new(self.render_worker.clone(), &transform)
                    .with_texture_matrix(VFLIP_MATRIX);
                let input_surface = renderer.start(capture_size, size, surface)?;
                self.renderer = Some(renderer);
                input_surface
            }
            None => surface,
        };

        let device = self
            .device
            .as_mut()
            .ok_or_else(|| BeamError::Capture("Camera not initialized".into()))?;

        match device.start_repeating(camera_surface, self.fps, self.high_speed) {
            Ok(session) => {
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                warn!("Could not start camera session: {e}");
                self.stop();
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        if let Some(mut renderer) = self.renderer.take() {
            renderer.stop_and_release();
        }
    }

    fn release(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.close();
        }
    }

    fn size(&self) -> Option<Size> {
        self.size
    }

    fn set_max_size(&mut self, max_size: u32) -> bool {
        if self.explicit_size.is_some() {
            // An explicit size is a hard requirement, never downgrade it
            return false;
        }
        self.max_size = max_size;
        true
    }

    fn is_closed(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    fn request_invalidate(&mut self) {
        // Camera geometry never changes behind our back, nothing to do
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CameraCharacteristics;
    use parking_lot::Mutex;

    struct FakeCameras {
        cameras: Vec<(String, CameraCharacteristics)>,
        opened: Mutex<Vec<String>>,
    }

    impl CameraServices for FakeCameras {
        fn camera_ids(&self) -> Vec<String> {
            self.cameras.iter().map(|(id, _)| id.clone()).collect()
        }

        fn characteristics(&self, camera_id: &str) -> Option<CameraCharacteristics> {
            self.cameras
                .iter()
                .find(|(id, _)| id == camera_id)
                .map(|(_, c)| c.clone())
        }

        fn open_camera(
            &self,
            camera_id: &str,
            _events: Arc<dyn CameraEvents>,
        ) -> BeamResult<Box<dyn CameraDevice>> {
            self.opened.lock().push(camera_id.to_string());
            Err(BeamError::Capture("not implemented".into()))
        }
    }

    fn chars(facing: CameraFacing, sizes: &[(u32, u32)]) -> CameraCharacteristics {
        CameraCharacteristics {
            facing,
            sensor_aspect_ratio: 4.0 / 3.0,
            capture_sizes: sizes.iter().map(|&(w, h)| Size::new(w, h)).collect(),
            high_speed_capture_sizes: vec![],
        }
    }

    fn capture_with(options: CaptureOptions, cameras: FakeCameras) -> CameraCapture {
        CameraCapture::new(options, Arc::new(cameras), Arc::new(RenderWorker::new()))
    }

    #[test]
    fn test_select_explicit_camera_not_found() {
        let capture = capture_with(
            CaptureOptions {
                camera_id: Some("42".into()),
                ..Default::default()
            },
            FakeCameras {
                cameras: vec![("0".into(), chars(CameraFacing::Back, &[(1920, 1080)]))],
                opened: Mutex::new(vec![]),
            },
        );
        assert!(matches!(capture.select_camera(), Err(BeamError::Config(_))));
    }

    #[test]
    fn test_select_camera_by_facing() {
        let capture = capture_with(
            CaptureOptions {
                camera_facing: Some(CameraFacing::Front),
                ..Default::default()
            },
            FakeCameras {
                cameras: vec![
                    ("0".into(), chars(CameraFacing::Back, &[(1920, 1080)])),
                    ("1".into(), chars(CameraFacing::Front, &[(1280, 720)])),
                ],
                opened: Mutex::new(vec![]),
            },
        );
        assert_eq!(capture.select_camera().unwrap(), "1");
    }

    #[test]
    fn test_select_size_respects_max_size() {
        let capture = capture_with(
            CaptureOptions { max_size: 1280, ..Default::default() },
            FakeCameras {
                cameras: vec![(
                    "0".into(),
                    chars(CameraFacing::Back, &[(1920, 1080), (1280, 720), (640, 480)]),
                )],
                opened: Mutex::new(vec![]),
            },
        );
        assert_eq!(capture.select_size("0"), Some(Size::new(1280, 720)));
    }

    #[test]
    fn test_select_size_filters_aspect_ratio() {
        let capture = capture_with(
            CaptureOptions {
                camera_aspect_ratio: Some(CameraAspectRatio::Ratio(4.0 / 3.0)),
                ..Default::default()
            },
            FakeCameras {
                cameras: vec![(
                    "0".into(),
                    chars(CameraFacing::Back, &[(1920, 1080), (1600, 1200), (640, 480)]),
                )],
                opened: Mutex::new(vec![]),
            },
        );
        // 1920x1080 is 16:9, outside the tolerance around 4:3
        assert_eq!(capture.select_size("0"), Some(Size::new(1600, 1200)));
    }

    #[test]
    fn test_explicit_size_wins() {
        let mut capture = capture_with(
            CaptureOptions {
                camera_size: Some(Size::new(320, 240)),
                ..Default::default()
            },
            FakeCameras {
                cameras: vec![("0".into(), chars(CameraFacing::Back, &[(1920, 1080)]))],
                opened: Mutex::new(vec![]),
            },
        );
        assert_eq!(capture.select_size("0"), Some(Size::new(320, 240)));
        // And the explicit size makes the capture refuse downsizing
        assert!(!capture.set_max_size(1024));
    }
}
