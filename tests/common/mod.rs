#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{GrayImage, RgbImage};
use parking_lot::Mutex;
use platetrack::source::Clock;
use platetrack::{Detection, Error, Frame, FrameSource, Models, Ocr, OcrReading, VideoBackend};

pub const WIDTH: u32 = 160;
pub const HEIGHT: u32 = 120;

/// Yields `remaining` blank frames, then reports end of stream.
pub struct Synthetic {
    remaining: u64,
}

impl Synthetic {
    pub fn new(remaining: u64) -> Self {
        Self { remaining }
    }
}

impl FrameSource for Synthetic {
    fn read(&mut self) -> Result<Option<RgbImage>, Error> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;

        Ok(Some(RgbImage::new(WIDTH, HEIGHT)))
    }
}

pub struct AlwaysFailing;

impl FrameSource for AlwaysFailing {
    fn read(&mut self) -> Result<Option<RgbImage>, Error> {
        Err(Error::Decode("no data".into()))
    }
}

/// Files open as `file_frames` synthetic frames. Streams whose url contains
/// `unreachable` fail to open, `broken` streams fail every read, the rest
/// yield `stream_frames` frames and then nothing.
pub struct FakeBackend {
    pub file_frames: u64,
    pub stream_frames: u64,
    pub opened: AtomicU32,
}

impl FakeBackend {
    pub fn new(file_frames: u64, stream_frames: u64) -> Arc<Self> {
        Arc::new(Self {
            file_frames,
            stream_frames,
            opened: AtomicU32::new(0),
        })
    }

    pub fn opened(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }
}

impl VideoBackend for FakeBackend {
    fn open_file(&self, _path: &Path) -> Result<Box<dyn FrameSource>, Error> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Synthetic::new(self.file_frames)))
    }

    fn open_stream(&self, url: &str) -> Result<Box<dyn FrameSource>, Error> {
        if url.contains("unreachable") {
            return Err(Error::SourceUnreachable {
                url: url.to_string(),
                reason: "connection refused".into(),
            });
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        if url.contains("broken") {
            Ok(Box::new(AlwaysFailing))
        } else {
            Ok(Box::new(Synthetic::new(self.stream_frames)))
        }
    }
}

/// Clock that only moves when something sleeps on it.
#[derive(Default)]
pub struct ManualClock(Mutex<Duration>);

impl ManualClock {
    pub fn elapsed(&self) -> Duration {
        *self.0.lock()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.0.lock()
    }

    fn sleep(&self, duration: Duration) {
        *self.0.lock() += duration;
    }
}

/// Returns `text` with a score rising by 0.01 on every call.
pub struct RisingOcr {
    text: &'static str,
    calls: AtomicU32,
}

impl RisingOcr {
    pub fn new(text: &'static str) -> Arc<Self> {
        Arc::new(Self {
            text,
            calls: AtomicU32::new(0),
        })
    }
}

impl Ocr for RisingOcr {
    fn read(&self, _plate: &GrayImage) -> Result<OcrReading, Error> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);

        Ok(OcrReading {
            text: self.text.to_string(),
            score: 0.5 + 0.01 * n as f32,
        })
    }
}

/// One car slowly moving right with its plate inside, plus a stray plate
/// outside every vehicle and a pedestrian that must not be tracked.
pub fn street_models(ocr: Arc<dyn Ocr>) -> Models {
    Models::new(
        Arc::new(|frame: &Frame| -> Result<Vec<Detection>, Error> {
            let dx = (frame.index % 20) as f32;
            Ok(vec![
                Detection::from_raw(10.0 + dx, 20.0, 110.0 + dx, 110.0, 0.9, 2),
                Detection::from_raw(130.0, 10.0, 150.0, 60.0, 0.8, 0),
            ])
        }),
        Arc::new(|frame: &Frame| -> Result<Vec<Detection>, Error> {
            let dx = (frame.index % 20) as f32;
            Ok(vec![
                Detection::from_raw(40.0 + dx, 85.0, 80.0 + dx, 100.0, 0.7, 0),
                Detection::from_raw(132.0, 100.0, 158.0, 115.0, 0.6, 0),
            ])
        }),
        ocr,
    )
}

/// Detectors that never find anything.
pub fn empty_models() -> Models {
    Models::new(
        Arc::new(|_: &Frame| -> Result<Vec<Detection>, Error> { Ok(Vec::new()) }),
        Arc::new(|_: &Frame| -> Result<Vec<Detection>, Error> { Ok(Vec::new()) }),
        RisingOcr::new("UNUSED"),
    )
}

/// Creates an empty file with a video extension.
pub fn video_file(dir: &Path, name: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"").unwrap();
    path
}
