use std::fmt;
use std::sync::Arc;

use serde_derive::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::association;
use crate::config::Config;
use crate::detection::ClassFilter;
use crate::detector::Models;
use crate::frame::Frame;
use crate::ocr::{self, OcrConfig, OcrGate};
use crate::source::{Acquired, Acquisition, FrameSource, Shutdown};
use crate::store::{PlateStore, UpsertOutcome};
use crate::tracker::{MultiObjectTracker, TrackIds, TrackerConfig};

pub use crate::source::Termination;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Every `frame_skip`-th frame is processed, the others are read and dropped.
    pub frame_skip: u64,
    /// Most frames a file run will read.
    pub max_frames: u64,
    /// Detector classes that count as vehicles.
    pub vehicle_classes: Vec<i32>,
    /// Pixels a plate box may stick out of its vehicle box and still belong to it.
    pub containment_tolerance: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_skip: 5,
            max_frames: 1000,
            vehicle_classes: vec![2, 3, 5, 7],
            containment_tolerance: 2.0,
        }
    }
}

/// Step of the per-frame work, used to tag log records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    DetectingVehicles,
    Tracking,
    DetectingPlates,
    Associating,
    Ocr,
    Storing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::DetectingVehicles => "detecting-vehicles",
            Stage::Tracking => "tracking",
            Stage::DetectingPlates => "detecting-plates",
            Stage::Associating => "associating",
            Stage::Ocr => "ocr",
            Stage::Storing => "storing",
        };

        f.write_str(s)
    }
}

/// What one run did.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub source_name: String,
    pub frames_read: u64,
    pub frames_sampled: u64,
    /// failed reads that were absorbed
    pub read_failures: u64,
    /// detector, OCR or store calls that failed
    pub collaborator_failures: u64,
    pub plates_detected: u64,
    pub unassociated_plates: u64,
    pub ocr_rejections: u64,
    pub readings_stored: u64,
    pub termination: Termination,
}

impl RunSummary {
    fn new(source_name: &str) -> Self {
        Self {
            source_name: source_name.to_string(),
            frames_read: 0,
            frames_sampled: 0,
            read_failures: 0,
            collaborator_failures: 0,
            plates_detected: 0,
            unassociated_plates: 0,
            ocr_rejections: 0,
            readings_stored: 0,
            termination: Termination::EndOfStream,
        }
    }
}

/// Frame pipeline controller.
///
/// One `run` call drives one source to termination: sample frames, track
/// vehicles, find plates, attach each plate to the vehicle containing it, read
/// the text and hand good readings to the store. The acquisition strategy is
/// the only thing that differs between files and streams.
#[derive(Clone)]
pub struct FramePipeline {
    models: Models,
    store: Arc<dyn PlateStore>,
    pipeline: PipelineConfig,
    tracker: TrackerConfig,
    ocr: OcrConfig,
    ids: TrackIds,
}

impl FramePipeline {
    pub fn new(models: Models, store: Arc<dyn PlateStore>, config: &Config) -> Self {
        Self {
            models,
            store,
            pipeline: config.pipeline.clone(),
            tracker: config.tracker.clone(),
            ocr: config.ocr.clone(),
            ids: TrackIds::Global,
        }
    }

    /// Id allocation for the trackers this pipeline creates.
    pub fn with_track_ids(mut self, ids: TrackIds) -> Self {
        self.ids = ids;
        self
    }

    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        acquisition: &mut dyn Acquisition,
        source_name: &str,
        shutdown: &Shutdown,
    ) -> RunSummary {
        let skip = self.pipeline.frame_skip.max(1);
        let mut ctx = RunContext {
            source_name,
            tracker: MultiObjectTracker::with_ids(self.tracker.clone(), self.ids.clone()),
            filter: ClassFilter::new(self.pipeline.vehicle_classes.clone()),
            gate: OcrGate::new(self.ocr.min_text_len),
            summary: RunSummary::new(source_name),
        };

        info!(source = source_name, skip, "run started");

        let termination = loop {
            if shutdown.is_triggered() {
                break Termination::Shutdown;
            }

            let image = match acquisition.acquire(source) {
                Acquired::Frame(image) => image,
                Acquired::Retry => continue,
                Acquired::Finished(reason) => break reason,
            };

            ctx.summary.frames_read += 1;
            let index = ctx.summary.frames_read;
            if index % skip != 0 {
                continue;
            }

            self.process(&mut ctx, Frame::new(index, image));
        };

        let mut summary = ctx.summary;
        summary.read_failures = acquisition.failures();
        summary.termination = termination;

        info!(
            source = source_name,
            ?termination,
            frames_read = summary.frames_read,
            frames_sampled = summary.frames_sampled,
            stored = summary.readings_stored,
            "run finished"
        );

        summary
    }

    fn process(&self, ctx: &mut RunContext<'_>, frame: Frame) {
        ctx.summary.frames_sampled += 1;

        let vehicles = match self.models.vehicles.detect(&frame) {
            Ok(dets) => ctx.filter.apply(dets),
            Err(err) => return ctx.failed(Stage::DetectingVehicles, frame.index, &err),
        };

        let tracked = ctx.tracker.update(&vehicles);
        debug!(
            stage = %Stage::Tracking,
            frame = frame.index,
            vehicles = vehicles.len(),
            tracked = tracked.len()
        );

        let plates = match self.models.plates.detect(&frame) {
            Ok(dets) => dets,
            Err(err) => return ctx.failed(Stage::DetectingPlates, frame.index, &err),
        };

        for plate in plates {
            ctx.summary.plates_detected += 1;

            let car_id = match association::resolve(
                &plate.bbox,
                &tracked,
                self.pipeline.containment_tolerance,
            ) {
                Some(id) => id,
                None => {
                    ctx.summary.unassociated_plates += 1;
                    debug!(
                        stage = %Stage::Associating,
                        frame = frame.index,
                        bbox = ?plate.bbox.as_slice(),
                        "plate outside every vehicle"
                    );
                    continue;
                }
            };

            let crop = match ocr::plate_crop(&frame.image, &plate.bbox, self.ocr.binarize_threshold)
            {
                Some(crop) => crop,
                None => {
                    ctx.summary.ocr_rejections += 1;
                    debug!(frame = frame.index, car_id, "plate box has no pixels in frame");
                    continue;
                }
            };

            let reading = match self.models.ocr.read(&crop) {
                Ok(reading) => reading,
                Err(err) => {
                    ctx.failed(Stage::Ocr, frame.index, &err);
                    continue;
                }
            };

            let reading = match ctx.gate.pass(reading) {
                Some(reading) => reading,
                None => {
                    ctx.summary.ocr_rejections += 1;
                    debug!(stage = %Stage::Ocr, frame = frame.index, car_id, "ocr text rejected");
                    continue;
                }
            };

            match self.store.upsert(
                car_id as i64,
                &reading.text,
                reading.score,
                ctx.source_name,
            ) {
                Ok(outcome @ (UpsertOutcome::Inserted | UpsertOutcome::Updated)) => {
                    ctx.summary.readings_stored += 1;
                    info!(
                        frame = frame.index,
                        car_id,
                        plate = %reading.text,
                        score = reading.score,
                        ?outcome,
                        "plate stored"
                    );
                }
                Ok(outcome) => {
                    debug!(frame = frame.index, car_id, plate = %reading.text, ?outcome);
                }
                Err(err) => ctx.failed(Stage::Storing, frame.index, &err),
            }
        }
    }
}

/// State owned by a single run.
struct RunContext<'a> {
    source_name: &'a str,
    tracker: MultiObjectTracker,
    filter: ClassFilter,
    gate: OcrGate,
    summary: RunSummary,
}

impl RunContext<'_> {
    fn failed(&mut self, stage: Stage, frame: u64, err: &crate::error::Error) {
        self.summary.collaborator_failures += 1;
        warn!(%stage, frame, %err, source = self.source_name, "frame step failed");
    }
}
