//! Vehicle tracking and license plate reading over video files and live streams.
//!
//! Each run samples frames from one source, tracks vehicles across them,
//! attaches detected plates to the vehicle containing them and keeps the
//! best-scored plate text per vehicle in a shared [`PlateStore`].

pub mod association;
pub mod bbox;
pub mod config;
pub mod detection;
pub mod detector;
pub mod error;
pub mod frame;
pub mod ocr;
pub mod pipeline;
pub mod service;
pub mod source;
pub mod store;
pub mod tracker;

mod predictor;
mod track;

pub use config::Config;
pub use detection::Detection;
pub use detector::{Detector, Models};
pub use error::Error;
pub use frame::Frame;
pub use ocr::{Ocr, OcrReading};
pub use pipeline::{FramePipeline, RunSummary, Termination};
pub use service::{PlateReader, RunHandle};
pub use source::{FrameSource, Shutdown, VideoBackend};
pub use store::{MemoryPlateStore, PlateRecord, PlateStore};
pub use track::{Track, TrackedBox};
pub use tracker::MultiObjectTracker;
