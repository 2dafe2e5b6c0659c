//! Draw face boxes and name labels onto frames.

use crate::font;
use crate::types::DetectedFace;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

const KNOWN_COLOR: Rgb<u8> = Rgb([0, 200, 0]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([220, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: u32 = 2;
const LABEL_PAD: u32 = 3;

/// Return an annotated copy of `frame`.
pub fn annotate(frame: &RgbImage, faces: &[DetectedFace]) -> RgbImage {
    let mut out = frame.clone();
    annotate_in_place(&mut out, faces);
    out
}

/// Draw directly onto `frame`; used by the stream loop, which owns its frame.
pub fn annotate_in_place(frame: &mut RgbImage, faces: &[DetectedFace]) {
    for face in faces {
        let color = if face.is_known() { KNOWN_COLOR } else { UNKNOWN_COLOR };
        let Some(rect) = clip_box(face, frame.width(), frame.height()) else {
            continue;
        };

        for inset in 0..BOX_THICKNESS {
            let w = rect.width() as i32 - 2 * inset;
            let h = rect.height() as i32 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let ring = Rect::at(rect.left() + inset, rect.top() + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(frame, ring, color);
        }

        draw_label(frame, &rect, &face.label().to_uppercase(), color);
    }
}

/// Filled bar under the box (or inside its bottom edge near the frame bottom).
fn draw_label(frame: &mut RgbImage, rect: &Rect, text: &str, color: Rgb<u8>) {
    let bar_h = font::GLYPH_HEIGHT * LABEL_SCALE + 2 * LABEL_PAD;
    let bar_w = (font::text_width(text, LABEL_SCALE) + 2 * LABEL_PAD).max(rect.width());

    let below = rect.bottom() + 1;
    let top = if below + bar_h as i32 <= frame.height() as i32 {
        below
    } else {
        (rect.bottom() + 1 - bar_h as i32).max(0)
    };

    draw_filled_rect_mut(frame, Rect::at(rect.left(), top).of_size(bar_w, bar_h), color);
    font::draw_text(
        frame,
        rect.left() + LABEL_PAD as i32,
        top + LABEL_PAD as i32,
        text,
        LABEL_SCALE,
        TEXT_COLOR,
    );
}

/// Face box rounded to pixels and clipped to the frame; `None` if nothing is visible.
fn clip_box(face: &DetectedFace, width: u32, height: u32) -> Option<Rect> {
    let b = &face.bbox;
    if !(b.x.is_finite() && b.y.is_finite() && b.width.is_finite() && b.height.is_finite()) {
        return None;
    }
    let x0 = b.x.round().max(0.0) as i64;
    let y0 = b.y.round().max(0.0) as i64;
    let x1 = ((b.x + b.width).round() as i64).min(width as i64);
    let y1 = ((b.y + b.height).round() as i64).min(height as i64);

    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, Embedding};

    fn face(x: f32, y: f32, w: f32, h: f32, identity: Option<&str>) -> DetectedFace {
        let bbox = BoundingBox {
            x, y, width: w, height: h, confidence: 0.9, landmarks: None,
        };
        let mut f = DetectedFace::unmatched(bbox, Embedding::new(vec![0.0]));
        f.identity = identity.map(str::to_string);
        f.distance = if identity.is_some() { 0.3 } else { f32::INFINITY };
        f
    }

    #[test]
    fn test_annotate_leaves_input_untouched() {
        let frame = RgbImage::new(100, 100);
        let out = annotate(&frame, &[face(10.0, 10.0, 30.0, 30.0, Some("alice"))]);
        assert!(frame.pixels().all(|p| p == &Rgb([0, 0, 0])));
        assert_eq!(out.get_pixel(10, 10), &KNOWN_COLOR);
        assert_eq!(out.get_pixel(11, 20), &KNOWN_COLOR);
        // interior is untouched
        assert_eq!(out.get_pixel(25, 25), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_unknown_face_uses_unknown_color() {
        let out = annotate(&RgbImage::new(100, 100), &[face(10.0, 10.0, 30.0, 30.0, None)]);
        assert_eq!(out.get_pixel(10, 10), &UNKNOWN_COLOR);
    }

    #[test]
    fn test_label_bar_below_box() {
        let out = annotate(&RgbImage::new(200, 200), &[face(10.0, 10.0, 40.0, 40.0, Some("bob"))]);
        // bar starts one row under the box bottom edge (y = 49)
        let bar_pixel = out.get_pixel(11, 51);
        assert!(bar_pixel == &KNOWN_COLOR || bar_pixel == &TEXT_COLOR);
    }

    #[test]
    fn test_clip_box_partially_outside() {
        let f = face(-20.0, 90.0, 50.0, 50.0, None);
        let rect = clip_box(&f, 100, 100).unwrap();
        assert_eq!((rect.left(), rect.top()), (0, 90));
        assert_eq!((rect.width(), rect.height()), (30, 10));
    }

    #[test]
    fn test_clip_box_fully_outside_or_degenerate() {
        assert!(clip_box(&face(200.0, 200.0, 10.0, 10.0, None), 100, 100).is_none());
        assert!(clip_box(&face(10.0, 10.0, 0.0, 10.0, None), 100, 100).is_none());
        assert!(clip_box(&face(f32::NAN, 10.0, 5.0, 5.0, None), 100, 100).is_none());
    }

    #[test]
    fn test_annotate_face_at_frame_edge_does_not_panic() {
        let faces = [
            face(95.0, 95.0, 30.0, 30.0, Some("edge")),
            face(0.0, 0.0, 1.0, 1.0, None),
        ];
        let out = annotate(&RgbImage::new(100, 100), &faces);
        assert_eq!(out.dimensions(), (100, 100));
    }
}
