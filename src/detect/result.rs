use serde::{Deserialize, Serialize};

/// One labelled detection returned by a detector for a single frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    /// Box in frame pixel coordinates, when the detector localises objects.
    pub bbox: Option<BoundingBox>,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox: None,
        }
    }

    pub fn with_box(mut self, bbox: BoundingBox) -> Self {
        self.bbox = Some(bbox);
        self
    }
}

/// Axis-aligned box in pixel coordinates (top-left and bottom-right corners).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Box as fractions of the image size: centre, width and height.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedBox {
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from centre coordinates and size.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn intersection(&self, other: &Self) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);
        (x2 - x1).max(0.0) * (y2 - y1).max(0.0)
    }

    /// Intersection over union; 0 when both boxes are empty.
    pub fn iou(&self, other: &Self) -> f32 {
        let inter = self.intersection(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Normalise against an image of `width` x `height` pixels.
    ///
    /// Corners are clamped to the image and truncated to whole pixels before
    /// normalising.
    pub fn normalized(&self, width: u32, height: u32) -> NormalizedBox {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        let x1 = self.x1.clamp(0.0, w).trunc();
        let y1 = self.y1.clamp(0.0, h).trunc();
        let x2 = self.x2.clamp(0.0, w).trunc();
        let y2 = self.y2.clamp(0.0, h).trunc();
        NormalizedBox {
            x_center: ((x1 + x2) / 2.0) / w,
            y_center: ((y1 + y2) / 2.0) / h,
            width: (x2 - x1).max(0.0) / w,
            height: (y2 - y1).max(0.0) / h,
        }
    }
}

impl NormalizedBox {
    /// One annotation line: `<class> <x_center> <y_center> <width> <height>`.
    pub fn annotation_line(&self, class_number: u32) -> String {
        format!(
            "{} {:.6} {:.6} {:.6} {:.6}",
            class_number, self.x_center, self.y_center, self.width, self.height
        )
    }
}

/// Greedy per-label non-maximum suppression.
///
/// Keeps the most confident detection and drops any later one with the same
/// label whose box overlaps it by more than `iou_threshold`. Detections
/// without a box are always kept.
pub fn non_maximum_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for candidate in detections {
        let suppressed = candidate.bbox.is_some_and(|bbox| {
            kept.iter().any(|existing| {
                existing.label == candidate.label
                    && existing
                        .bbox
                        .is_some_and(|other| other.iou(&bbox) > iou_threshold)
            })
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&a), 1.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn normalises_to_annotation_format() {
        let bbox = BoundingBox::new(10.7, 20.2, 110.9, 220.5);
        let norm = bbox.normalized(200, 400);
        assert_eq!(norm.annotation_line(0), "0 0.300000 0.300000 0.500000 0.500000");
    }

    #[test]
    fn clamps_boxes_that_leave_the_image() {
        let norm = BoundingBox::new(-20.0, -5.0, 50.0, 60.0).normalized(100, 100);
        assert_eq!(norm.annotation_line(3), "3 0.250000 0.300000 0.500000 0.600000");
    }

    #[test]
    fn suppresses_overlapping_boxes_of_the_same_label() {
        let boxed = |label: &str, conf: f32, x: f32| {
            Detection::new(label, conf).with_box(BoundingBox::new(x, 0.0, x + 10.0, 10.0))
        };
        let kept = non_maximum_suppression(
            vec![
                boxed("person", 0.6, 1.0),
                boxed("person", 0.9, 0.0),
                boxed("dog", 0.5, 0.0),
                boxed("person", 0.7, 50.0),
            ],
            0.5,
        );
        let summary: Vec<(&str, f32)> = kept
            .iter()
            .map(|d| (d.label.as_str(), d.confidence))
            .collect();
        assert_eq!(summary, vec![("person", 0.9), ("person", 0.7), ("dog", 0.5)]);
    }
}
