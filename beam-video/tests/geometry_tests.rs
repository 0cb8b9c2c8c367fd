//! Geometry filter invariants exercised through pixel-space round trips.

use beam_common::{BeamError, Orientation, Point, Rect, Size};
use beam_video::transform::compose;
use beam_video::{AffineMatrix, VideoFilter};

/// Map a pixel position in output space back to input space through the
/// filter's inverse transform.
fn map_back(filter: &VideoFilter, input_size: Size, point: Point) -> Point {
    let inverse = filter.inverse_transform().expect("no inverse transform");
    let to_pixels = AffineMatrix::ndc_to_pixels(input_size);
    let from_pixels = AffineMatrix::ndc_from_pixels(filter.output_size());
    to_pixels.multiply(&inverse).multiply(&from_pixels).apply(point)
}

fn assert_close(actual: Point, expected: Point) {
    let dx = (actual.x - expected.x).abs();
    let dy = (actual.y - expected.y).abs();
    assert!(dx <= 1 && dy <= 1, "{actual:?} too far from {expected:?}");
}

#[test]
fn test_inverse_round_trip() {
    let input_size = Size::new(1920, 1080);
    let mut filter = VideoFilter::new(input_size);
    filter.add_crop(Rect::new(100, 50, 1700, 950), false).unwrap();
    filter.add_orientation(Orientation::Orient90).unwrap();
    filter.add_angle(12.5);

    let transform = filter.transform().unwrap();
    let inverse = filter.inverse_transform().unwrap();

    // transform ∘ inverse must be the identity in pixel space
    let round_trip = AffineMatrix::ndc_to_pixels(input_size)
        .multiply(&inverse)
        .multiply(&transform)
        .multiply(&AffineMatrix::ndc_from_pixels(input_size));

    for point in [
        Point::new(0, 0),
        Point::new(1919, 0),
        Point::new(0, 1079),
        Point::new(960, 540),
        Point::new(123, 456),
    ] {
        assert_close(round_trip.apply(point), point);
    }
}

#[test]
fn test_rotation_and_counter_rotation_cancel() {
    let input_size = Size::new(1280, 720);

    for k in 1..4u32 {
        let mut filter = VideoFilter::new(input_size);
        filter.add_rotation(k).unwrap();
        filter.add_rotation(4 - k).unwrap();

        assert_eq!(filter.output_size(), input_size);

        // The composed transform is the identity, mapped points stay put
        let transform = filter.transform().unwrap();
        let pixel = AffineMatrix::ndc_to_pixels(input_size)
            .multiply(&transform)
            .multiply(&AffineMatrix::ndc_from_pixels(input_size));
        assert_close(pixel.apply(Point::new(100, 200)), Point::new(100, 200));
    }
}

#[test]
fn test_crop_maps_output_origin_to_crop_corner() {
    let input_size = Size::new(1920, 1080);
    let mut filter = VideoFilter::new(input_size);
    filter.add_crop(Rect::new(400, 300, 1200, 900), false).unwrap();

    assert_eq!(filter.output_size(), Size::new(800, 600));
    assert_close(map_back(&filter, input_size, Point::new(0, 0)), Point::new(400, 300));
    assert_close(map_back(&filter, input_size, Point::new(800, 600)), Point::new(1200, 900));
}

#[test]
fn test_crop_out_of_bounds_is_a_config_error() {
    let mut filter = VideoFilter::new(Size::new(1920, 1080));
    let result = filter.add_crop(Rect::new(0, 0, 2000, 1080), false);
    assert!(matches!(result, Err(BeamError::Config(_))));
}

#[test]
fn test_transposed_crop_checked_against_rotated_axes() {
    // 1080x1920 in portrait; a landscape crop becomes valid once transposed
    let mut filter = VideoFilter::new(Size::new(1080, 1920));
    filter.add_crop(Rect::new(0, 0, 1920, 1080), true).unwrap();
    assert_eq!(filter.output_size(), Size::new(1080, 1920));
}

#[test]
fn test_orientation_rotates_output_size() {
    let mut filter = VideoFilter::new(Size::new(1920, 1080));
    filter.add_orientation(Orientation::Orient90).unwrap();
    assert_eq!(filter.output_size(), Size::new(1080, 1920));
}

#[test]
fn test_flip_orientation_has_transform() {
    let mut filter = VideoFilter::new(Size::new(1920, 1080));
    filter.add_orientation(Orientation::Flip0).unwrap();
    assert_eq!(filter.output_size(), Size::new(1920, 1080));
    assert!(filter.transform().is_some());

    // A flipped left edge becomes the right edge
    let input_size = Size::new(1920, 1080);
    assert_close(map_back(&filter, input_size, Point::new(0, 540)), Point::new(1920, 540));
}

#[test]
fn test_locked_orientation_cancels_display_rotation() {
    // Display rotated 90° ccw, lock to the natural orientation
    let display_size = Size::new(1080, 1920);
    let mut filter = VideoFilter::new(display_size);
    filter
        .add_orientation_locked(1, true, Orientation::Orient0)
        .unwrap();

    // The output is back in landscape
    assert_eq!(filter.output_size(), Size::new(1920, 1080));
}

#[test]
fn test_angle_keeps_output_size() {
    let mut filter = VideoFilter::new(Size::new(1920, 1080));
    filter.add_angle(30.0);
    assert_eq!(filter.output_size(), Size::new(1920, 1080));
    assert!(filter.transform().is_some());
}

#[test]
fn test_resize_promotes_identity_transform() {
    let mut filter = VideoFilter::new(Size::new(1920, 1080));
    assert!(filter.transform().is_none());

    filter.add_resize(Size::new(1280, 720));
    assert_eq!(filter.output_size(), Size::new(1280, 720));
    // A render stage is required for the scaling to happen
    assert_eq!(filter.transform(), Some(AffineMatrix::IDENTITY));
}

#[test]
fn test_resize_to_same_size_is_a_no_op() {
    let mut filter = VideoFilter::new(Size::new(1920, 1080));
    filter.add_resize(Size::new(1920, 1080));
    assert!(filter.transform().is_none());
}

#[test]
fn test_compose_none_is_identity() {
    let m = AffineMatrix::hflip();
    assert_eq!(compose(Some(m), None), Some(m));
    assert_eq!(compose(None, Some(m)), Some(m));
    assert_eq!(compose(None, None), None);
}
