use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};

/// One detector output for one object in one frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BBox<Ltrb>,
    #[serde(rename = "p")]
    pub confidence: f32,
    #[serde(rename = "c")]
    pub class: i32,
}

impl Detection {
    #[inline]
    pub fn new(bbox: BBox<Ltrb>, confidence: f32, class: i32) -> Self {
        Self {
            bbox,
            confidence,
            class,
        }
    }

    /// Builds a detection from the raw `(x1, y1, x2, y2, score, class_id)` row.
    #[inline]
    pub fn from_raw(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class: i32) -> Self {
        Self::new(BBox::ltrb(x1, y1, x2, y2), score, class)
    }
}

/// Keeps only detections whose class id is in the configured set.
#[derive(Debug, Clone)]
pub struct ClassFilter {
    classes: Vec<i32>,
}

impl ClassFilter {
    pub fn new(classes: Vec<i32>) -> Self {
        Self { classes }
    }

    #[inline]
    pub fn accepts(&self, det: &Detection) -> bool {
        self.classes.contains(&det.class)
    }

    pub fn apply(&self, dets: Vec<Detection>) -> Vec<Detection> {
        dets.into_iter().filter(|d| self.accepts(d)).collect()
    }
}
