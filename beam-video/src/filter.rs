//! Geometry filter
//!
//! Folds an ordered sequence of requested geometric operations (crop,
//! orientation correction, user rotation angle, forced output size) into a
//! single transform plus the resulting output size. The inverse transform
//! maps client-reported coordinates in output space back to source space.

use beam_common::{BeamError, BeamResult, Orientation, Rect, Size};

use crate::transform::{compose, AffineMatrix};

/// Accumulates geometric operations against a running `(transform, size)` pair.
///
/// Order matters: crop must be applied in the pre-rotation coordinate space,
/// orientation next, angle last.
#[derive(Debug, Clone)]
pub struct VideoFilter {
    output_size: Size,
    transform: Option<AffineMatrix>,
}

impl VideoFilter {
    pub fn new(input_size: Size) -> Self {
        Self { output_size: input_size, transform: None }
    }

    pub fn output_size(&self) -> Size {
        self.output_size
    }

    /// The direct transform ("what happened to the image"), `None` meaning
    /// identity (no render stage needed).
    pub fn transform(&self) -> Option<AffineMatrix> {
        self.transform
    }

    /// The transform mapping output coordinates back to source coordinates.
    ///
    /// Recomputed on demand; `None` either if the direct transform is
    /// identity or if it is degenerate (no mapping exists).
    pub fn inverse_transform(&self) -> Option<AffineMatrix> {
        self.transform.as_ref().and_then(AffineMatrix::invert)
    }

    /// Crop a sub-rectangle of the current output.
    ///
    /// If `transposed`, the rectangle axes are swapped first (needed when the
    /// source is rotated 90°/270° relative to the crop's reference frame).
    pub fn add_crop(&mut self, crop: Rect, transposed: bool) -> BeamResult<()> {
        let crop = if transposed { crop.transposed() } else { crop };

        let input_width = self.output_size.width as f64;
        let input_height = self.output_size.height as f64;

        if crop.left < 0
            || crop.top < 0
            || crop.right as f64 > input_width
            || crop.bottom as f64 > input_height
        {
            return Err(BeamError::Config(format!(
                "Crop {crop} exceeds the input area ({})",
                self.output_size
            )));
        }

        // Normalized coordinates, y-up (the render stage's origin is at the
        // bottom-left corner)
        let x = crop.left as f64 / input_width;
        let y = 1.0 - crop.bottom as f64 / input_height;
        let w = crop.width() as f64 / input_width;
        let h = crop.height() as f64 / input_height;

        let reframe = AffineMatrix::reframe(x, y, w, h)?;
        self.transform = compose(Some(reframe), self.transform);
        self.output_size = crop.size();
        Ok(())
    }

    /// Orthogonal rotation by `ccw_rotation` counter-clockwise quarter turns.
    pub fn add_rotation(&mut self, ccw_rotation: u32) -> BeamResult<()> {
        let ccw_rotation = ccw_rotation % 4;
        if ccw_rotation == 0 {
            return Ok(());
        }

        let rotation = AffineMatrix::rotate_ortho(ccw_rotation)?;
        self.transform = compose(Some(rotation), self.transform);

        if ccw_rotation % 2 != 0 {
            self.output_size = self.output_size.rotate();
        }
        Ok(())
    }

    /// Apply a capture orientation: an optional horizontal flip followed by
    /// the rotation canceling the requested clockwise orientation.
    pub fn add_orientation(&mut self, orientation: Orientation) -> BeamResult<()> {
        if orientation.flipped() {
            self.transform = compose(Some(AffineMatrix::hflip()), self.transform);
        }

        // The requested orientation is clockwise, the transform rotation is
        // counter-clockwise
        let ccw_rotation = (4 - orientation.rotation()) % 4;
        self.add_rotation(ccw_rotation)
    }

    /// Apply a capture orientation taking the display rotation into account.
    ///
    /// If `locked`, the display's current rotation is canceled first so the
    /// video keeps the device's natural orientation.
    pub fn add_orientation_locked(
        &mut self,
        display_rotation: u32,
        locked: bool,
        orientation: Orientation,
    ) -> BeamResult<()> {
        if locked {
            let reverse_display_rotation = (4 - display_rotation % 4) % 4;
            self.add_rotation(reverse_display_rotation)?;
        }
        self.add_orientation(orientation)
    }

    /// Free rotation by `cw_degrees`, clockwise, about the frame center.
    ///
    /// The canvas size is unchanged; content may be clipped at the corners.
    pub fn add_angle(&mut self, cw_degrees: f64) {
        if cw_degrees == 0.0 {
            return;
        }

        let ccw_degrees = -cw_degrees;
        let rotation = AffineMatrix::rotate(ccw_degrees)
            .with_aspect_ratio_of(self.output_size)
            .from_center();
        self.transform = compose(Some(rotation), self.transform);
    }

    /// Force the output size.
    ///
    /// The actual scaling is performed by the render stage viewport, so this
    /// only has to guarantee that a render stage runs at all: the transform
    /// is promoted to identity if no other operation was recorded.
    pub fn add_resize(&mut self, target_size: Size) {
        if self.output_size == target_size {
            return;
        }

        if self.transform.is_none() {
            self.transform = Some(AffineMatrix::IDENTITY);
        }
        self.output_size = target_size;
    }
}
