//! 2D affine transforms
//!
//! Represents a 2D affine transform (a 3x3 matrix):
//!
//! ```text
//! / a c e \
//! | b d f |
//! \ 0 0 1 /
//! ```
//!
//! Or, a 4x4 matrix if we add a z axis:
//!
//! ```text
//! / a c 0 e \
//! | b d 0 f |
//! | 0 0 1 0 |
//! \ 0 0 0 1 /
//! ```
//!
//! Transforms compose by multiplication, applied right-to-left.

use beam_common::{BeamError, BeamResult, Point, Size};

/// Immutable 2D affine transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineMatrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl AffineMatrix {
    pub const IDENTITY: AffineMatrix = AffineMatrix::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

    pub const fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// Apply the transform to a point (`self` should be a matrix converted
    /// to pixel coordinates via [`AffineMatrix::ndc_to_pixels`]).
    pub fn apply(&self, point: Point) -> Point {
        let x = point.x as f64;
        let y = point.y as f64;
        let xx = self.a * x + self.c * y + self.e;
        let yy = self.b * x + self.d * y + self.f;
        Point::new(xx as i32, yy as i32)
    }

    /// Compute `self * rhs` (apply `rhs` first, then `self`).
    pub fn multiply(&self, rhs: &AffineMatrix) -> AffineMatrix {
        AffineMatrix::new(
            self.a * rhs.a + self.c * rhs.b,
            self.b * rhs.a + self.d * rhs.b,
            self.a * rhs.c + self.c * rhs.d,
            self.b * rhs.c + self.d * rhs.d,
            self.a * rhs.e + self.c * rhs.f + self.e,
            self.b * rhs.e + self.d * rhs.f + self.f,
        )
    }

    /// Invert the matrix, or `None` if it is degenerate (zero determinant).
    pub fn invert(&self) -> Option<AffineMatrix> {
        // The 3x3 matrix M decomposes into a translation times a linear part:
        //
        //         / 1 0 e \   / a c 0 \
        //     M = | 0 1 f | * | b d 0 |
        //         \ 0 0 1 /   \ 0 0 1 /
        //
        // so M⁻¹ is the inverse linear part times the opposite translation:
        //
        //            1   /  d -c  cf-de \
        //     M⁻¹ = ---- | -b  a  be-af |
        //           ad-cb \  0  0   1   /
        let det = self.a * self.d - self.c * self.b;
        if det == 0.0 {
            return None;
        }

        Some(AffineMatrix::new(
            self.d / det,
            -self.b / det,
            -self.c / det,
            self.a / det,
            (self.c * self.f - self.d * self.e) / det,
            (self.b * self.e - self.a * self.f) / det,
        ))
    }

    /// This transform applied about the point (0.5, 0.5) instead of the origin.
    pub fn from_center(&self) -> AffineMatrix {
        AffineMatrix::translate(0.5, 0.5)
            .multiply(self)
            .multiply(&AffineMatrix::translate(-0.5, -0.5))
    }

    /// This transform conjugated by a non-uniform scale, so that rotating a
    /// non-square frame does not skew it.
    pub fn with_aspect_ratio(&self, ar: f64) -> AffineMatrix {
        AffineMatrix::scale(1.0 / ar, 1.0)
            .multiply(self)
            .multiply(&AffineMatrix::scale(ar, 1.0))
    }

    pub fn with_aspect_ratio_of(&self, size: Size) -> AffineMatrix {
        self.with_aspect_ratio(size.aspect_ratio())
    }

    /// Export to a 4x4 column-major matrix suitable for a shader uniform.
    pub fn to_4x4(&self) -> [f32; 16] {
        [
            self.a as f32, self.b as f32, 0.0, 0.0,
            self.c as f32, self.d as f32, 0.0, 0.0,
            0.0, 0.0, 1.0, 0.0,
            self.e as f32, self.f as f32, 0.0, 1.0,
        ]
    }

    /// Conversion from Normalized Device Coordinates to pixels (y-down).
    pub fn ndc_to_pixels(size: Size) -> AffineMatrix {
        let w = size.width as f64;
        let h = size.height as f64;
        AffineMatrix::new(w, 0.0, 0.0, -h, 0.0, h)
    }

    /// Conversion from pixels to Normalized Device Coordinates (y-up).
    pub fn ndc_from_pixels(size: Size) -> AffineMatrix {
        let w = size.width as f64;
        let h = size.height as f64;
        AffineMatrix::new(1.0 / w, 0.0, 0.0, -1.0 / h, 0.0, 1.0)
    }

    pub fn translate(x: f64, y: f64) -> AffineMatrix {
        AffineMatrix::new(1.0, 0.0, 0.0, 1.0, x, y)
    }

    pub fn scale(x: f64, y: f64) -> AffineMatrix {
        AffineMatrix::new(x, 0.0, 0.0, y, 0.0, 0.0)
    }

    pub fn scale_sizes(from: Size, to: Size) -> AffineMatrix {
        let scale_x = to.width as f64 / from.width as f64;
        let scale_y = to.height as f64 / from.height as f64;
        AffineMatrix::scale(scale_x, scale_y)
    }

    /// Map a sub-rectangle of the normalized [0,1]² space (y-up, `(x, y)` is
    /// the bottom-left corner) to the full output space.
    pub fn reframe(x: f64, y: f64, w: f64, h: f64) -> BeamResult<AffineMatrix> {
        if w == 0.0 || h == 0.0 {
            return Err(BeamError::Config(format!("Cannot reframe to an empty area: {w}x{h}")));
        }
        Ok(AffineMatrix::scale(1.0 / w, 1.0 / h).multiply(&AffineMatrix::translate(-x, -y)))
    }

    /// Orthogonal rotation by `ccw_rotation` quarter turns, closed-form.
    pub fn rotate_ortho(ccw_rotation: u32) -> BeamResult<AffineMatrix> {
        match ccw_rotation {
            0 => Ok(AffineMatrix::IDENTITY),
            // 90° counter-clockwise
            1 => Ok(AffineMatrix::new(0.0, 1.0, -1.0, 0.0, 1.0, 0.0)),
            // 180°
            2 => Ok(AffineMatrix::new(-1.0, 0.0, 0.0, -1.0, 1.0, 1.0)),
            // 90° clockwise
            3 => Ok(AffineMatrix::new(0.0, -1.0, 1.0, 0.0, 0.0, 1.0)),
            _ => Err(BeamError::Config(format!("Invalid rotation: {ccw_rotation}"))),
        }
    }

    pub fn hflip() -> AffineMatrix {
        AffineMatrix::new(-1.0, 0.0, 0.0, 1.0, 1.0, 0.0)
    }

    pub fn vflip() -> AffineMatrix {
        AffineMatrix::new(1.0, 0.0, 0.0, -1.0, 0.0, 1.0)
    }

    /// Free-angle rotation (uses sin/cos; orthogonal rotations should use
    /// [`AffineMatrix::rotate_ortho`] instead).
    pub fn rotate(ccw_degrees: f64) -> AffineMatrix {
        let radians = ccw_degrees.to_radians();
        let cos = radians.cos();
        let sin = radians.sin();
        AffineMatrix::new(cos, sin, -sin, cos, 0.0, 0.0)
    }
}

impl std::fmt::Display for AffineMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}, {}, {}; {}, {}, {}]",
            self.a, self.c, self.e, self.b, self.d, self.f
        )
    }
}

/// Compose two optional transforms, where `None` means identity.
///
/// Returns `lhs * rhs` (apply `rhs` first).
pub fn compose(lhs: Option<AffineMatrix>, rhs: Option<AffineMatrix>) -> Option<AffineMatrix> {
    match (lhs, rhs) {
        (Some(l), Some(r)) => Some(l.multiply(&r)),
        (Some(l), None) => Some(l),
        (None, rhs) => rhs,
    }
}
