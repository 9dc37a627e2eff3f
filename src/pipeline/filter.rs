use crate::detect::{Detection, DetectionBatch};

/// Detections below this confidence are discarded.
pub const CONFIDENCE_THRESHOLD: f32 = 0.85;
/// Class index counted and persisted ("BigBag").
pub const TARGET_CLASS_INDEX: usize = 0;

/// Keep detections at or above [`CONFIDENCE_THRESHOLD`], preserving order.
pub fn filter_confident(batch: DetectionBatch) -> DetectionBatch {
    batch
        .into_iter()
        .filter(|det| det.confidence >= CONFIDENCE_THRESHOLD)
        .collect()
}

/// Number of detections of the target class.
pub fn count_target(batch: &[Detection]) -> usize {
    batch
        .iter()
        .filter(|det| det.class_index == TARGET_CLASS_INDEX)
        .count()
}

/// Filter a raw batch and count the target class in what remains.
pub fn filter_and_count(batch: DetectionBatch) -> (DetectionBatch, usize) {
    let filtered = filter_confident(batch);
    let count = count_target(&filtered);
    (filtered, count)
}
