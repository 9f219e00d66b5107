use pizarra_shared::StrokeColor;

use super::*;
use crate::color::WHITE;

const INK: Rgb = Rgb::new(0, 0, 0);

fn surface() -> RasterSurface {
    RasterSurface::new(800, 500, WHITE).expect("surface")
}

fn line(from: (i32, i32), to: (i32, i32), color: &str, thickness: u32) -> StrokeSegment {
    StrokeSegment {
        from_x: from.0,
        from_y: from.1,
        to_x: to.0,
        to_y: to.1,
        color: StrokeColor::Css(color.to_string()),
        thickness,
    }
}

fn assert_uniform(surface: &RasterSurface, expected: Rgb) {
    for y in 0..surface.height() {
        for x in 0..surface.width() {
            assert_eq!(surface.pixel(x, y), Some(expected), "pixel ({x}, {y})");
        }
    }
}

#[test]
fn starts_filled_with_background() {
    let mut surface = surface();
    assert_uniform(&surface, WHITE);
    assert_eq!(
        surface.take_dirty(),
        Some(Rect {
            x: 0,
            y: 0,
            width: 800,
            height: 500
        })
    );
    assert_eq!(surface.take_dirty(), None);
}

#[test]
fn rejects_unusable_dimensions() {
    assert_eq!(
        RasterSurface::new(0, 500, WHITE).err(),
        Some(SurfaceError::InvalidDimensions {
            width: 0,
            height: 500
        })
    );
    assert_eq!(
        RasterSurface::new(MAX_SIDE + 1, 10, WHITE).err(),
        Some(SurfaceError::TooLarge {
            width: MAX_SIDE + 1,
            height: 10
        })
    );
}

#[test]
fn horizontal_line_covers_its_width_and_caps() {
    let mut surface = surface();
    surface.draw_segment(&line((10, 10), (20, 10), "#000000", 2));

    assert_eq!(surface.pixel(15, 10), Some(INK));
    assert_eq!(surface.pixel(15, 9), Some(INK));
    assert_eq!(surface.pixel(15, 11), Some(WHITE));
    assert_eq!(surface.pixel(15, 8), Some(WHITE));
    // round caps reach just past the endpoints
    assert_eq!(surface.pixel(9, 10), Some(INK));
    assert_eq!(surface.pixel(8, 10), Some(WHITE));
    assert_eq!(surface.pixel(20, 10), Some(INK));
    assert_eq!(surface.pixel(21, 10), Some(WHITE));
}

#[test]
fn zero_length_segments_draw_a_dot() {
    let mut surface = surface();
    surface.draw_segment(&line((100, 100), (100, 100), "#ff0000", 6));
    assert_eq!(surface.pixel(100, 100), Some(Rgb::new(255, 0, 0)));
    assert_eq!(surface.pixel(102, 100), Some(Rgb::new(255, 0, 0)));
    assert_eq!(surface.pixel(104, 100), Some(WHITE));
}

#[test]
fn zero_thickness_and_unreadable_colors_draw_nothing() {
    let mut surface = surface();
    surface.take_dirty();
    surface.draw_segment(&line((10, 10), (50, 50), "#000000", 0));
    surface.draw_segment(&line((10, 10), (50, 50), "not-a-color", 4));
    assert_uniform(&surface, WHITE);
    assert_eq!(surface.take_dirty(), None);
}

#[test]
fn eraser_paints_background() {
    let mut surface = surface();
    surface.draw_segment(&line((0, 50), (100, 50), "#00ff00", 10));
    assert_eq!(surface.pixel(50, 50), Some(Rgb::new(0, 255, 0)));

    let mut eraser = line((0, 50), (100, 50), "", 10);
    eraser.color = StrokeColor::BACKGROUND;
    surface.draw_segment(&eraser);
    assert_uniform(&surface, WHITE);
}

#[test]
fn clear_restores_every_pixel() {
    let mut surface = surface();
    surface.draw_segment(&line((0, 0), (800, 500), "#123456", 20));
    surface.draw_segment(&line((800, 0), (0, 500), "rgb(9, 9, 9)", 1));
    surface.clear();
    assert_uniform(&surface, WHITE);
}

#[test]
fn drawing_twice_matches_drawing_once() {
    let segment = line((3, 7), (640, 333), "#abcdef", 7);
    let mut once = surface();
    once.draw_segment(&segment);
    let mut twice = surface();
    twice.draw_segment(&segment);
    twice.draw_segment(&segment);
    assert_eq!(once.rgba(), twice.rgba());
}

#[test]
fn same_sequence_same_pixels() {
    let sequence = [
        line((10, 10), (300, 200), "#ff0000", 5),
        line((300, 200), (10, 400), "#00f", 12),
        line((0, 0), (0, 0), "black", 20),
        line((150, 50), (700, 480), "#888888", 3),
    ];
    let mut left = surface();
    let mut right = surface();
    for segment in &sequence {
        left.draw_segment(segment);
        right.draw_segment(segment);
    }
    left.clear();
    right.clear();
    for segment in sequence.iter().rev() {
        left.draw_segment(segment);
        right.draw_segment(segment);
    }
    assert_eq!(left.rgba(), right.rgba());
}

#[test]
fn dirty_region_tracks_the_union_of_draws() {
    let mut surface = surface();
    surface.take_dirty();
    surface.draw_segment(&line((10, 10), (20, 10), "#000", 2));
    surface.draw_segment(&line((100, 40), (100, 60), "#000", 2));
    let dirty = surface.take_dirty().expect("dirty");
    assert_eq!(
        dirty,
        Rect {
            x: 9,
            y: 9,
            width: 93,
            height: 53
        }
    );
    assert_eq!(surface.region_rgba(dirty).len(), 93 * 53 * 4);
}

#[test]
fn remote_segments_far_outside_are_clipped() {
    let mut surface = surface();
    surface.take_dirty();
    surface.draw_segment(&line((-5000, -5000), (-4000, -4000), "#000", 4));
    surface.draw_segment(&line((i32::MAX, 0), (i32::MAX, 10), "#000", 4));
    assert_eq!(surface.take_dirty(), None);

    surface.draw_segment(&line((-100, 250), (900, 250), "#000", 2));
    assert_eq!(surface.pixel(0, 250), Some(INK));
    assert_eq!(surface.pixel(799, 249), Some(INK));
}

#[test]
fn disposed_surfaces_ignore_work() {
    let mut surface = surface();
    surface.dispose();
    surface.draw_segment(&line((10, 10), (20, 20), "#000", 2));
    surface.clear();
    assert!(surface.is_disposed());
    assert_eq!(surface.pixel(0, 0), None);
    assert_eq!(surface.take_dirty(), None);
}
