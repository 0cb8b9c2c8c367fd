//! Geometric value types used across Beam components

use serde::{Deserialize, Serialize};

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The larger of the two dimensions
    pub fn max_dim(&self) -> u32 {
        self.width.max(self.height)
    }

    /// Swap width and height
    pub fn rotate(&self) -> Size {
        Size::new(self.height, self.width)
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// Scale down uniformly so that the larger dimension does not exceed
    /// `max_size` (which must be a multiple of 8; 0 means no limit).
    pub fn limit(&self, max_size: u32) -> Size {
        debug_assert!(max_size % 8 == 0, "max size must be a multiple of 8");

        if max_size == 0 {
            return *self;
        }

        let portrait = self.height > self.width;
        let major = if portrait { self.height } else { self.width };
        if major <= max_size {
            return *self;
        }

        let minor = if portrait { self.width } else { self.height };

        let new_major = max_size;
        let new_minor = max_size * minor / major;

        if portrait {
            Size::new(new_minor, new_major)
        } else {
            Size::new(new_major, new_minor)
        }
    }

    /// Round both dimensions to a multiple of 8, as required by the encoder.
    ///
    /// The major dimension is rounded down so the size never grows; the minor
    /// dimension is rounded to the nearest multiple to minimize aspect-ratio
    /// distortion, then clamped so it never exceeds the major.
    pub fn round8(&self) -> Size {
        if self.is_multiple_of_8() {
            return *self;
        }

        let portrait = self.height > self.width;
        let mut major = if portrait { self.height } else { self.width };
        let mut minor = if portrait { self.width } else { self.height };

        major &= !7;
        minor = (minor + 4) & !7;
        if minor > major {
            minor = major;
        }

        if portrait {
            Size::new(minor, major)
        } else {
            Size::new(major, minor)
        }
    }

    pub fn is_multiple_of_8(&self) -> bool {
        self.width & 7 == 0 && self.height & 7 == 0
    }

    pub fn to_rect(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A point in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A point reported by the client, relative to the video size it was
/// rendering when the event was generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub point: Point,
    pub screen_size: Size,
}

impl Position {
    pub const fn new(point: Point, screen_size: Size) -> Self {
        Self { point, screen_size }
    }
}

/// Rectangle in pixel coordinates (left/top inclusive, right/bottom exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn size(&self) -> Size {
        Size::new(self.width() as u32, self.height() as u32)
    }

    /// Swap the x and y axes (used when the source is rotated 90°/270°
    /// relative to the rectangle's reference frame)
    pub fn transposed(&self) -> Rect {
        Rect::new(self.top, self.left, self.bottom, self.right)
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{},{},{},{}]", self.left, self.top, self.right, self.bottom)
    }
}

/// Requested capture orientation, expressed clockwise, optionally with a
/// horizontal flip applied first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Orient0,
    Orient90,
    Orient180,
    Orient270,
    Flip0,
    Flip90,
    Flip180,
    Flip270,
}

impl Orientation {
    /// The clockwise rotation component, in quarter turns (0..=3)
    pub fn rotation(&self) -> u32 {
        *self as u32 & 3
    }

    /// Whether a horizontal flip is applied before the rotation
    pub fn flipped(&self) -> bool {
        *self as u32 & 4 != 0
    }

    /// Parse from the option strings `"0"`, `"90"`, ..., `"flip270"`
    pub fn from_name(name: &str) -> Option<Orientation> {
        match name {
            "0" => Some(Orientation::Orient0),
            "90" => Some(Orientation::Orient90),
            "180" => Some(Orientation::Orient180),
            "270" => Some(Orientation::Orient270),
            "flip0" => Some(Orientation::Flip0),
            "flip90" => Some(Orientation::Flip90),
            "flip180" => Some(Orientation::Flip180),
            "flip270" => Some(Orientation::Flip270),
            _ => None,
        }
    }

    /// Orientation equivalent to a display rotation.
    ///
    /// Display rotation is expressed counter-clockwise while orientation is
    /// expressed clockwise, hence the conversion.
    pub fn from_ccw_rotation(ccw_rotation: u32) -> Orientation {
        assert!(ccw_rotation < 4, "rotation must be between 0 and 3");
        match (4 - ccw_rotation) % 4 {
            0 => Orientation::Orient0,
            1 => Orientation::Orient90,
            2 => Orientation::Orient180,
            _ => Orientation::Orient270,
        }
    }
}

/// How the capture orientation is locked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrientationLock {
    /// Follow the device rotation
    Unlocked,
    /// Lock to whatever the orientation is when capture starts
    LockedInitial,
    /// Lock to an explicitly requested orientation
    LockedValue,
}
