use serde::Serialize;

/// One model-reported candidate object.
///
/// Coordinates are pixel positions in the source image with `x1 < x2` and
/// `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_index: usize,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_index: usize) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_index,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &Detection) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Detections for one image, in model order.
pub type DetectionBatch = Vec<Detection>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = Detection::new(0.0, 0.0, 10.0, 10.0, 0.9, 0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = Detection::new(0.0, 0.0, 10.0, 10.0, 0.9, 0);
        let b = Detection::new(20.0, 20.0, 30.0, 30.0, 0.9, 0);
        assert_eq!(a.iou(&b), 0.0);
    }
}
