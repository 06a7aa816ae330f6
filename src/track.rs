use serde_derive::Serialize;

use crate::bbox::{BBox, Ltrb};
use crate::predictor::Predictor;
use crate::Detection;

/// One vehicle's identity and kinematic state inside a tracker.
#[derive(Debug, Clone)]
pub struct Track {
    pub track_id: u32,
    /// sampled frames since creation
    pub age: u32,
    /// total successful matches, the creating detection included
    pub hits: u32,
    /// consecutive successful matches
    pub hit_streak: u32,
    pub time_since_update: u32,
    pub confidence: f32,
    predictor: Predictor,
}

impl Track {
    pub fn new(track_id: u32, det: &Detection) -> Self {
        Self {
            track_id,
            age: 0,
            hits: 1,
            hit_streak: 1,
            time_since_update: 0,
            confidence: det.confidence,
            predictor: Predictor::new(&det.bbox.as_xyah()),
        }
    }

    /// Moves the track one sampled frame forward and returns the predicted box.
    pub fn predict(&mut self) -> BBox<Ltrb> {
        self.age += 1;
        if self.time_since_update > 0 {
            self.hit_streak = 0;
        }
        self.time_since_update += 1;

        self.predictor.predict().as_ltrb()
    }

    pub fn update(&mut self, det: &Detection) {
        self.predictor.update(&det.bbox.as_xyah());
        self.time_since_update = 0;
        self.hits += 1;
        self.hit_streak += 1;
        self.confidence = det.confidence;
    }

    #[inline]
    pub fn bbox(&self) -> BBox<Ltrb> {
        self.predictor.bbox().as_ltrb()
    }

    #[inline]
    pub fn uncertainty(&self) -> f32 {
        self.predictor.uncertainty()
    }
}

/// A tracker output row: a vehicle box and the identity it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrackedBox {
    pub track_id: u32,
    pub bbox: BBox<Ltrb>,
    pub confidence: f32,
    /// `0` when the box comes from this frame's detection, otherwise it is a prediction
    pub time_since_update: u32,
}

impl From<&Track> for TrackedBox {
    fn from(t: &Track) -> TrackedBox {
        TrackedBox {
            track_id: t.track_id,
            bbox: t.bbox(),
            confidence: t.confidence,
            time_since_update: t.time_since_update,
        }
    }
}
