//! Render stage
//!
//! Applies an affine transform to raw frames between a capture source and the
//! encoder input surface. All backend calls happen on a dedicated render
//! thread owned by a [`RenderWorker`]; renderers hand work to it and
//! rendezvous on explicit ack channels, so start and teardown are
//! deterministic.

use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use beam_common::{BeamError, BeamResult, Size};
use bytes::Bytes;

use crate::surface::{Frame, Surface};
use crate::transform::AffineMatrix;

/// Renders transformed frames. Created and driven exclusively from the render
/// thread.
pub trait RenderBackend: Send {
    fn init(&mut self, input_size: Size, output_size: Size) -> BeamResult<()>;

    /// Transform one frame. `matrix` maps output texture coordinates (y-up,
    /// normalized) to input texture coordinates; samples falling outside
    /// [0,1]² are black.
    fn draw(&mut self, frame: &Frame, matrix: &[f32; 16]) -> BeamResult<Frame>;

    fn release(&mut self);
}

type RenderJob = Box<dyn FnOnce() + Send>;

struct WorkerInner {
    tx: Option<Sender<RenderJob>>,
    thread: Option<thread::JoinHandle<()>>,
    shut_down: bool,
}

/// Owns the render thread.
///
/// The thread is spawned lazily on the first job and lives until
/// [`RenderWorker::shutdown`]; renderer sessions come and go on it. The owner
/// decides the worker's lifetime explicitly, there is no global state.
pub struct RenderWorker {
    backend_factory: Box<dyn Fn() -> Box<dyn RenderBackend> + Send + Sync>,
    inner: Mutex<WorkerInner>,
}

impl RenderWorker {
    /// Worker using the built-in software backend.
    pub fn new() -> Self {
        Self::with_backend(|| Box::new(SoftwareRenderBackend::new()))
    }

    /// Worker using a custom backend (one instance per renderer session).
    pub fn with_backend<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn RenderBackend> + Send + Sync + 'static,
    {
        Self {
            backend_factory: Box::new(factory),
            inner: Mutex::new(WorkerInner { tx: None, thread: None, shut_down: false }),
        }
    }

    fn new_backend(&self) -> Box<dyn RenderBackend> {
        (self.backend_factory)()
    }

    /// Run a job on the render thread, spawning it if necessary.
    fn post(&self, job: RenderJob) -> BeamResult<()> {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return Err(BeamError::Render("render worker is shut down".into()));
        }
        if inner.tx.is_none() {
            let (tx, rx) = bounded::<RenderJob>(4);
            let handle = thread::Builder::new()
                .name("render".into())
                .spawn(move || {
                    debug!("Render thread started");
                    for job in rx {
                        job();
                    }
                    debug!("Render thread stopped");
                })
                .map_err(|e| BeamError::Render(format!("Could not spawn render thread: {e}")))?;
            inner.tx = Some(tx);
            inner.thread = Some(handle);
        }
        inner
            .tx
            .as_ref()
            .unwrap()
            .send(job)
            .map_err(|_| BeamError::Render("render thread is gone".into()))
    }

    /// Stop the render thread and wait for it. No renderer session must be
    /// active.
    pub fn shutdown(&self) {
        let thread = {
            let mut inner = self.inner.lock();
            inner.shut_down = true;
            inner.tx = None;
            inner.thread.take()
        };
        if let Some(handle) = thread {
            let _ = handle.join();
        }
    }
}

impl Default for RenderWorker {
    fn default() -> Self {
        Self::new()
    }
}

struct RendererSession {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
}

/// One renderer session: reads frames from an input surface, applies the
/// transform, writes the result to the output surface.
pub struct AffineRenderer {
    worker: std::sync::Arc<RenderWorker>,
    user_matrix: [f32; 16],
    texture_matrix: [f32; 16],
    session: Option<RendererSession>,
}

const IDENTITY_4X4: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
];

/// Texture matrix flipping the y axis, for sources delivering frames
/// bottom-up.
pub const VFLIP_MATRIX: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0,
    0.0, -1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 1.0, 0.0, 1.0,
];

fn mat4_multiply(lhs: &[f32; 16], rhs: &[f32; 16]) -> [f32; 16] {
    let mut out = [0.0; 16];
    for col in 0..4 {
        for row in 0..4 {
            let mut acc = 0.0;
            for k in 0..4 {
                acc += lhs[k * 4 + row] * rhs[col * 4 + k];
            }
            out[col * 4 + row] = acc;
        }
    }
    out
}

impl AffineRenderer {
    /// `transform` maps output coordinates back to input coordinates (the
    /// inverse of the geometry applied to the image).
    pub fn new(worker: std::sync::Arc<RenderWorker>, transform: &AffineMatrix) -> Self {
        Self {
            worker,
            user_matrix: transform.to_4x4(),
            texture_matrix: IDENTITY_4X4,
            session: None,
        }
    }

    /// Override the texture-native matrix (applied after the user transform).
    pub fn with_texture_matrix(mut self, matrix: [f32; 16]) -> Self {
        self.texture_matrix = matrix;
        self
    }

    /// Start the render loop and return the surface the capture source must
    /// produce into.
    ///
    /// Blocks until the backend is initialized on the render thread, so a
    /// backend failure is reported here and not at the first frame.
    pub fn start(
        &mut self,
        input_size: Size,
        output_size: Size,
        output_surface: Surface,
    ) -> BeamResult<Surface> {
        assert!(self.session.is_none(), "renderer already started");

        let (input_surface, frame_rx) = crate::surface::surface_pair_raw(4);
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<BeamResult<()>>(0);
        let (done_tx, done_rx) = bounded::<()>(0);

        let mut backend = self.worker.new_backend();
        let matrix = mat4_multiply(&self.texture_matrix, &self.user_matrix);

        self.worker.post(Box::new(move || {
            let init_result = backend.init(input_size, output_size);
            let ok = init_result.is_ok();
            let _ = ready_tx.send(init_result);
            if !ok {
                return;
            }

            render_loop(backend.as_mut(), &frame_rx, &stop_rx, &output_surface, &matrix);

            backend.release();
            let _ = done_tx.send(());
        }))?;

        ready_rx
            .recv()
            .map_err(|_| BeamError::Render("render thread died during init".into()))??;

        self.session = Some(RendererSession { stop_tx, done_rx });
        Ok(input_surface)
    }

    /// Stop the render loop and wait for the backend to be released.
    pub fn stop_and_release(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session.stop_tx.send(());
            let _ = session.done_rx.recv();
        }
    }
}

fn render_loop(
    backend: &mut dyn RenderBackend,
    frame_rx: &Receiver<Frame>,
    stop_rx: &Receiver<()>,
    output: &Surface,
    matrix: &[f32; 16],
) {
    loop {
        crossbeam_channel::select! {
            recv(stop_rx) -> _ => return,
            recv(frame_rx) -> msg => {
                let frame = match msg {
                    Ok(frame) => frame,
                    // All producers dropped their surface
                    Err(_) => return,
                };
                match backend.draw(&frame, matrix) {
                    Ok(out) => {
                        if output.push_frame(out).is_err() {
                            debug!("Render output surface is gone, stopping");
                            return;
                        }
                    }
                    Err(e) => warn!("Render error: {e}"),
                }
            }
        }
    }
}

/// CPU reference backend: inverse-maps every output pixel through the matrix
/// and samples the input nearest-neighbor.
pub struct SoftwareRenderBackend {
    input_size: Size,
    output_size: Size,
}

impl SoftwareRenderBackend {
    pub fn new() -> Self {
        Self { input_size: Size::new(0, 0), output_size: Size::new(0, 0) }
    }
}

impl Default for SoftwareRenderBackend {
    fn default() -> Self {
        Self::new()
    }
}

const BYTES_PER_PIXEL: usize = 4;

impl RenderBackend for SoftwareRenderBackend {
    fn init(&mut self, input_size: Size, output_size: Size) -> BeamResult<()> {
        if input_size.width == 0 || input_size.height == 0 {
            return Err(BeamError::Render(format!("Invalid render input size: {input_size}")));
        }
        if output_size.width == 0 || output_size.height == 0 {
            return Err(BeamError::Render(format!("Invalid render output size: {output_size}")));
        }
        self.input_size = input_size;
        self.output_size = output_size;
        Ok(())
    }

    fn draw(&mut self, frame: &Frame, matrix: &[f32; 16]) -> BeamResult<Frame> {
        let iw = self.input_size.width as usize;
        let ih = self.input_size.height as usize;
        let ow = self.output_size.width as usize;
        let oh = self.output_size.height as usize;

        let expected = iw * ih * BYTES_PER_PIXEL;
        if frame.data.len() < expected {
            return Err(BeamError::Render(format!(
                "Frame too small: {} bytes for {}",
                frame.data.len(),
                self.input_size
            )));
        }

        let input = frame.data.as_ref();
        let mut output = vec![0u8; ow * oh * BYTES_PER_PIXEL];

        for oy in 0..oh {
            // Normalized texture coordinates are y-up, rows are stored y-down
            let v = 1.0 - (oy as f32 + 0.5) / oh as f32;
            for ox in 0..ow {
                let u = (ox as f32 + 0.5) / ow as f32;

                let tx = matrix[0] * u + matrix[4] * v + matrix[12];
                let ty = matrix[1] * u + matrix[5] * v + matrix[13];

                if !(0.0..1.0).contains(&tx) || !(0.0..1.0).contains(&ty) {
                    continue; // out of the input area, keep black
                }

                let ix = ((tx * iw as f32) as usize).min(iw - 1);
                let iy_up = ((ty * ih as f32) as usize).min(ih - 1);
                let iy = ih - 1 - iy_up;

                let src = (iy * iw + ix) * BYTES_PER_PIXEL;
                let dst = (oy * ow + ox) * BYTES_PER_PIXEL;
                output[dst..dst + BYTES_PER_PIXEL]
                    .copy_from_slice(&input[src..src + BYTES_PER_PIXEL]);
            }
        }

        Ok(Frame::new(Bytes::from(output), self.output_size, frame.pts_us))
    }

    fn release(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::surface_pair;
    use std::sync::Arc;

    fn frame_2x2(pixels: [[u8; 4]; 4]) -> Frame {
        let mut data = Vec::new();
        for px in pixels {
            data.extend_from_slice(&px);
        }
        Frame::new(Bytes::from(data), Size::new(2, 2), 42)
    }

    #[test]
    fn test_software_backend_identity() {
        let mut backend = SoftwareRenderBackend::new();
        backend.init(Size::new(2, 2), Size::new(2, 2)).unwrap();

        let frame = frame_2x2([[1, 1, 1, 255], [2, 2, 2, 255], [3, 3, 3, 255], [4, 4, 4, 255]]);
        let out = backend.draw(&frame, &IDENTITY_4X4).unwrap();
        assert_eq!(out.size, Size::new(2, 2));
        assert_eq!(out.pts_us, 42);
        assert_eq!(out.data.as_ref(), frame.data.as_ref());
    }

    #[test]
    fn test_software_backend_hflip() {
        let mut backend = SoftwareRenderBackend::new();
        backend.init(Size::new(2, 2), Size::new(2, 2)).unwrap();

        // The renderer receives the inverse transform; hflip is its own
        // inverse.
        let matrix = AffineMatrix::hflip().to_4x4();
        let frame = frame_2x2([[1, 1, 1, 255], [2, 2, 2, 255], [3, 3, 3, 255], [4, 4, 4, 255]]);
        let out = backend.draw(&frame, &matrix).unwrap();

        let expected = frame_2x2([[2, 2, 2, 255], [1, 1, 1, 255], [4, 4, 4, 255], [3, 3, 3, 255]]);
        assert_eq!(out.data.as_ref(), expected.data.as_ref());
    }

    #[test]
    fn test_renderer_start_and_stop() {
        let worker = Arc::new(RenderWorker::new());
        let (output_surface, output_frames) = surface_pair(4);

        let mut renderer = AffineRenderer::new(worker.clone(), &AffineMatrix::IDENTITY);
        let input = renderer
            .start(Size::new(2, 2), Size::new(2, 2), output_surface)
            .unwrap();

        let frame = frame_2x2([[9, 9, 9, 255]; 4]);
        input.push_frame(frame.clone()).unwrap();

        let out = output_frames
            .recv_timeout(std::time::Duration::from_secs(5))
            .unwrap();
        assert_eq!(out.data.as_ref(), frame.data.as_ref());
        assert_eq!(out.pts_us, 42);

        renderer.stop_and_release();
        worker.shutdown();
    }

    #[test]
    fn test_worker_survives_renderer_restart() {
        let worker = Arc::new(RenderWorker::new());

        for _ in 0..2 {
            let (output_surface, _output_frames) = surface_pair(4);
            let mut renderer = AffineRenderer::new(worker.clone(), &AffineMatrix::IDENTITY);
            let _input = renderer
                .start(Size::new(2, 2), Size::new(2, 2), output_surface)
                .unwrap();
            renderer.stop_and_release();
        }

        worker.shutdown();
    }
}
