use std::sync::atomic::{AtomicU32, Ordering};

use munkres::{solve_assignment, WeightMatrix};
use serde_derive::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bbox::{BBox, Ltrb};
use crate::track::{Track, TrackedBox};
use crate::Detection;

static SEQ_ID: AtomicU32 = AtomicU32::new(1);

/// Resolution of IoU in assignment costs.
const COST_STEPS: i64 = 1_000_000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum IoU between a predicted track box and a detection for the pair to match.
    pub iou_threshold: f32,
    /// A track is retired once it has gone unmatched for more than this many sampled frames.
    pub max_age: u32,
    /// Matches required before a track is reported.
    pub min_hits: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.3,
            max_age: 3,
            min_hits: 1,
        }
    }
}

/// Where new track ids come from.
#[derive(Debug, Clone)]
pub enum TrackIds {
    /// Shared by every tracker in the process, ids never collide between runs.
    Global,
    /// Private counter holding the next id to hand out.
    Local(u32),
}

impl TrackIds {
    pub fn local() -> Self {
        TrackIds::Local(1)
    }

    fn next(&mut self) -> u32 {
        match self {
            TrackIds::Global => SEQ_ID.fetch_add(1, Ordering::SeqCst),
            TrackIds::Local(next) => {
                let id = *next;
                *next += 1;
                id
            }
        }
    }
}

/// SORT-style multi-object tracker: Kalman prediction, IoU matching solved as an
/// assignment problem, track spawning and retirement.
///
/// Must be fed frames in strict order; one instance belongs to one run.
#[derive(Debug)]
pub struct MultiObjectTracker {
    config: TrackerConfig,
    ids: TrackIds,
    tracks: Vec<Track>,
    frame_count: u64,
}

impl MultiObjectTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_ids(config, TrackIds::Global)
    }

    pub fn with_ids(config: TrackerConfig, ids: TrackIds) -> Self {
        Self {
            config,
            ids,
            tracks: Vec::with_capacity(64),
            frame_count: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Live tracks, reported or not.
    #[inline]
    pub fn live_tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Runs one sampled frame through the tracker and returns the reported tracks.
    pub fn update(&mut self, dets: &[Detection]) -> Vec<TrackedBox> {
        self.frame_count += 1;

        for t in &mut self.tracks {
            t.predict();
        }
        self.tracks.retain(|t| {
            let ok = t.bbox().is_finite();
            if !ok {
                warn!(track_id = t.track_id, "dropping track with diverged prediction");
            }
            ok
        });

        let predicted: Vec<BBox<Ltrb>> = self.tracks.iter().map(Track::bbox).collect();
        let (matched, missed) = self.assignment(&predicted, dets);

        for (ti, di) in matched {
            self.tracks[ti].update(&dets[di]);
        }

        let max_age = self.config.max_age;
        self.tracks.retain(|t| {
            let keep = t.time_since_update <= max_age;
            if !keep {
                debug!(
                    track_id = t.track_id,
                    age = t.age,
                    hits = t.hits,
                    uncertainty = t.uncertainty(),
                    "track retired"
                );
            }
            keep
        });

        for di in missed {
            let id = self.ids.next();
            debug!(track_id = id, "track spawned");
            self.tracks.push(Track::new(id, &dets[di]));
        }

        self.tracks()
    }

    /// Tracks currently reported: confirmed by enough matches and not yet retired.
    /// Coasting tracks are included with their predicted box.
    pub fn tracks(&self) -> Vec<TrackedBox> {
        let warming_up = self.frame_count <= self.config.min_hits as u64;

        self.tracks
            .iter()
            .filter(|t| warming_up || t.hits >= self.config.min_hits)
            .map(Into::into)
            .collect()
    }

    /// Solves one assignment between all predicted track boxes and `dets` that
    /// maximizes the summed IoU of the matched pairs. Pairs below `iou_threshold`
    /// cannot match. Among equally good assignments the one using earlier
    /// detections wins.
    ///
    /// Returns `(track index, detection index)` pairs and the unmatched detections.
    fn assignment(
        &self,
        predicted: &[BBox<Ltrb>],
        dets: &[Detection],
    ) -> (Vec<(usize, usize)>, Vec<usize>) {
        if predicted.is_empty() || dets.is_empty() {
            return (Vec::new(), (0..dets.len()).collect());
        }

        let threshold = self.config.iou_threshold;
        let n = predicted.len().max(dets.len());
        let rank_span = (n * n) as i64;

        // Integer costs keep the solver's zero tests exact. An unmatched row costs
        // the same as a zero-overlap match; the detection rank sits below one IoU
        // step, so it only decides between assignments of equal total overlap.
        let ineligible = COST_STEPS * rank_span;
        let cost = |(r, c): (usize, usize)| -> i64 {
            if r < dets.len() && c < predicted.len() {
                let iou = dets[r].bbox.iou(&predicted[c]);
                if iou >= threshold && iou > 0.0 {
                    let steps = ((1.0 - iou as f64) * COST_STEPS as f64).round() as i64;
                    return steps * rank_span + r as i64;
                }
            }

            ineligible
        };

        let mut weights = WeightMatrix::from_fn(n, &cost);
        let positions = match solve_assignment(&mut weights) {
            Ok(positions) => positions,
            Err(err) => {
                warn!(?err, "assignment could not be solved");
                return (Vec::new(), (0..dets.len()).collect());
            }
        };

        let mut taken = vec![false; dets.len()];
        let mut matched = Vec::new();
        for pos in positions {
            if cost((pos.row, pos.column)) < ineligible {
                taken[pos.row] = true;
                matched.push((pos.column, pos.row));
            }
        }

        let missed = (0..dets.len()).filter(|&d| !taken[d]).collect();

        (matched, missed)
    }
}
