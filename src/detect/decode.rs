//! YOLOv5 output decoding.
//!
//! Each output row is `[cx, cy, w, h, objectness, class scores...]` in model
//! input pixels. Decoding keeps rows above a loose pre-threshold, rescales them
//! to the source image and runs class-aware NMS. The service-level 0.85
//! cut is applied later by the pipeline filter, not here.

use crate::detect::result::{Detection, DetectionBatch};

/// Loose score floor applied before NMS.
pub const PRE_NMS_SCORE: f32 = 0.25;
/// IoU above which the weaker of two same-class boxes is suppressed.
pub const NMS_IOU: f32 = 0.45;

/// Scale factors from model input space back to source pixels.
#[derive(Clone, Copy, Debug)]
pub struct InputScale {
    pub x: f32,
    pub y: f32,
    pub source_width: f32,
    pub source_height: f32,
}

impl InputScale {
    pub fn new(source_width: u32, source_height: u32, input_width: u32, input_height: u32) -> Self {
        Self {
            x: source_width as f32 / input_width.max(1) as f32,
            y: source_height as f32 / input_height.max(1) as f32,
            source_width: source_width as f32,
            source_height: source_height as f32,
        }
    }
}

/// Decode flat YOLOv5 rows of `row_len` values each.
pub fn decode_rows(data: &[f32], row_len: usize, scale: InputScale) -> DetectionBatch {
    if row_len < 6 {
        return Vec::new();
    }
    let mut candidates = Vec::new();
    for row in data.chunks_exact(row_len) {
        let objectness = row[4];
        if objectness < PRE_NMS_SCORE {
            continue;
        }
        let Some((class_index, class_score)) = row[5..]
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            continue;
        };
        let confidence = (objectness * class_score).clamp(0.0, 1.0);
        if confidence < PRE_NMS_SCORE {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let x1 = ((cx - w / 2.0) * scale.x).clamp(0.0, scale.source_width);
        let y1 = ((cy - h / 2.0) * scale.y).clamp(0.0, scale.source_height);
        let x2 = ((cx + w / 2.0) * scale.x).clamp(0.0, scale.source_width);
        let y2 = ((cy + h / 2.0) * scale.y).clamp(0.0, scale.source_height);
        if x2 <= x1 || y2 <= y1 {
            continue;
        }
        candidates.push(Detection::new(x1, y1, x2, y2, confidence, class_index));
    }
    non_max_suppression(candidates, NMS_IOU)
}

/// Class-aware greedy NMS; output is ordered by descending confidence.
pub fn non_max_suppression(mut boxes: DetectionBatch, iou_threshold: f32) -> DetectionBatch {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: DetectionBatch = Vec::with_capacity(boxes.len());
    let mut suppressed = vec![false; boxes.len()];
    for i in 0..boxes.len() {
        if suppressed[i] {
            continue;
        }
        kept.push(boxes[i]);
        for j in (i + 1)..boxes.len() {
            if boxes[i].class_index == boxes[j].class_index
                && boxes[i].iou(&boxes[j]) > iou_threshold
            {
                suppressed[j] = true;
            }
        }
    }
    kept
}
