//! Bounding-box and label drawing.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::Detection;

/// Fixed drawing constants for one output path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnotationStyle {
    pub box_color: Rgb<u8>,
    pub text_color: Rgb<u8>,
    pub stroke: u32,
    pub text_scale: f32,
}

/// Annotated uploads: blue boxes and blue text.
pub const STILL_STYLE: AnnotationStyle = AnnotationStyle {
    box_color: Rgb([0, 0, 255]),
    text_color: Rgb([0, 0, 255]),
    stroke: 2,
    text_scale: 16.0,
};

/// Live camera frames: green boxes, white text.
pub const STREAM_STYLE: AnnotationStyle = AnnotationStyle {
    box_color: Rgb([0, 255, 0]),
    text_color: Rgb([255, 255, 255]),
    stroke: 2,
    text_scale: 14.0,
};

/// Gap between the label baseline area and the top edge of its box.
const LABEL_OFFSET: i32 = 12;

/// DejaVu Sans, see `assets/fonts/DejaVuSans-LICENSE.txt`.
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

pub struct Annotator {
    labels: Vec<String>,
    font: Option<FontArc>,
}

impl Annotator {
    /// Annotator using the bundled label font.
    pub fn new(labels: Vec<String>) -> Self {
        let font = match FontArc::try_from_slice(BUNDLED_FONT) {
            Ok(font) => Some(font),
            Err(err) => {
                log::error!("bundled label font unusable, labels disabled: {}", err);
                None
            }
        };
        Self { labels, font }
    }

    /// Replace the bundled font with a TrueType/OpenType file.
    pub fn with_font_file(mut self, path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("read label font {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .with_context(|| format!("parse label font {}", path.display()))?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// `"<class name> <confidence>"`, falling back to `"Class <index>"` for
    /// indices outside the label table.
    pub fn label_for(&self, det: &Detection) -> String {
        match self.labels.get(det.class_index) {
            Some(name) => format!("{} {:.2}", name, det.confidence),
            None => format!("Class {} {:.2}", det.class_index, det.confidence),
        }
    }

    /// Draw onto a copy; the source is left untouched.
    pub fn annotate(
        &self,
        image: &RgbImage,
        detections: &[Detection],
        style: AnnotationStyle,
    ) -> RgbImage {
        let mut copy = image.clone();
        self.annotate_in_place(&mut copy, detections, style);
        copy
    }

    /// Draw directly onto `image`. Only for buffers discarded after use.
    pub fn annotate_in_place(
        &self,
        image: &mut RgbImage,
        detections: &[Detection],
        style: AnnotationStyle,
    ) {
        for det in detections {
            let Some(rect) = box_rect(det) else {
                continue;
            };
            for inset in 0..style.stroke {
                let Some(inner) = inset_rect(rect, inset) else {
                    break;
                };
                draw_hollow_rect_mut(image, inner, style.box_color);
            }

            if let Some(font) = &self.font {
                let text = self.label_for(det);
                let y = (rect.top() - LABEL_OFFSET).max(0);
                draw_text_mut(
                    image,
                    style.text_color,
                    rect.left(),
                    y,
                    PxScale::from(style.text_scale),
                    font,
                    &text,
                );
            }
        }
    }
}

fn box_rect(det: &Detection) -> Option<Rect> {
    if !(det.x1.is_finite() && det.y1.is_finite() && det.x2.is_finite() && det.y2.is_finite()) {
        return None;
    }
    let left = det.x1.floor() as i32;
    let top = det.y1.floor() as i32;
    let width = (det.x2.round() as i32).saturating_sub(left);
    let height = (det.y2.round() as i32).saturating_sub(top);
    if width <= 0 || height <= 0 {
        return None;
    }
    Some(Rect::at(left, top).of_size(width as u32, height as u32))
}

fn inset_rect(rect: Rect, inset: u32) -> Option<Rect> {
    let shrink = inset * 2;
    if rect.width() <= shrink || rect.height() <= shrink {
        return None;
    }
    Some(
        Rect::at(rect.left() + inset as i32, rect.top() + inset as i32)
            .of_size(rect.width() - shrink, rect.height() - shrink),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotator() -> Annotator {
        Annotator::new(vec!["BigBag".to_string()])
    }

    #[test]
    fn labels_known_class_by_name() {
        let det = Detection::new(0.0, 0.0, 5.0, 5.0, 0.912, 0);
        assert_eq!(annotator().label_for(&det), "BigBag 0.91");
    }

    #[test]
    fn labels_unknown_class_with_fallback() {
        let det = Detection::new(0.0, 0.0, 5.0, 5.0, 0.9, 7);
        assert_eq!(annotator().label_for(&det), "Class 7 0.90");
    }

    #[test]
    fn annotate_leaves_source_untouched() {
        let source = RgbImage::new(64, 64);
        let dets = [Detection::new(4.0, 30.0, 40.0, 60.0, 0.9, 0)];
        let out = annotator().annotate(&source, &dets, STILL_STYLE);

        assert!(source.pixels().all(|p| *p == Rgb([0, 0, 0])));
        assert_eq!(*out.get_pixel(4, 30), STILL_STYLE.box_color);
        assert_eq!(*out.get_pixel(5, 31), STILL_STYLE.box_color);
        assert_eq!(*out.get_pixel(20, 45), Rgb([0, 0, 0]));
    }

    #[test]
    fn draws_label_text_above_the_box() {
        let annotator = annotator();
        assert!(annotator.has_font());

        let source = RgbImage::new(64, 64);
        let dets = [Detection::new(10.0, 30.0, 60.0, 60.0, 0.9, 0)];
        let out = annotator.annotate(&source, &dets, STILL_STYLE);

        let label_pixels = (0..30)
            .flat_map(|y| (0..64).map(move |x| (x, y)))
            .filter(|&(x, y)| *out.get_pixel(x, y) != Rgb([0, 0, 0]))
            .count();
        assert!(label_pixels > 0);
    }

    #[test]
    fn no_detections_draws_nothing() {
        let source = RgbImage::from_pixel(16, 16, Rgb([10, 20, 30]));
        let out = annotator().annotate(&source, &[], STILL_STYLE);
        assert_eq!(out, source);
    }

    #[test]
    fn out_of_bounds_and_degenerate_boxes_do_not_panic() {
        let mut image = RgbImage::new(16, 16);
        let dets = [
            Detection::new(-10.0, -10.0, 100.0, 100.0, 0.9, 0),
            Detection::new(5.0, 5.0, 5.0, 9.0, 0.9, 0),
            Detection::new(f32::NAN, 0.0, 4.0, 4.0, 0.9, 3),
        ];
        annotator().annotate_in_place(&mut image, &dets, STREAM_STYLE);
    }

    #[test]
    fn missing_font_file_is_an_error() {
        let result = annotator().with_font_file(Path::new("/nonexistent/font.ttf"));
        assert!(result.is_err());
    }
}
