use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in source-frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }
}

/// One recognised object in a single frame.
///
/// Detections are rebuilt from detector output every cycle and never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub label: String,
    /// Confidence in [0, 1].
    pub score: f32,
}

impl Detection {
    pub fn new(label: impl Into<String>, score: f32, bbox: BoundingBox) -> Self {
        Self {
            bbox,
            label: label.into(),
            score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_clamps_negative_extent() {
        let b = BoundingBox::new(5.0, 6.0, -1.0, 3.0);
        assert_eq!(b.width, 0.0);
        assert_eq!(b.height, 3.0);
    }

    #[test]
    fn detection_serializes_with_label_and_score() {
        let d = Detection::new("dog", 0.75, BoundingBox::new(1.0, 2.0, 3.0, 4.0));
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["label"], "dog");
        assert_eq!(json["bbox"]["width"], 3.0);
    }
}
