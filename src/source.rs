use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;
use serde_derive::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;

/// Decoded frames of one opened video, in acquisition order.
pub trait FrameSource: Send {
    /// Next frame, `Ok(None)` when the source has nothing more to give.
    fn read(&mut self) -> Result<Option<RgbImage>, Error>;
}

/// Opens files and network streams as frame sources.
pub trait VideoBackend: Send + Sync {
    fn open_file(&self, path: &Path) -> Result<Box<dyn FrameSource>, Error>;

    /// Fails with [`Error::SourceUnreachable`] when the stream cannot be opened.
    fn open_stream(&self, url: &str) -> Result<Box<dyn FrameSource>, Error>;
}

/// Monotonic time plus the ability to wait, so stream retry timing can be driven by tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    #[inline]
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration)
    }
}

/// Caller-side stop request for a running pipeline.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a run stopped. All of these are normal terminal transitions.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    EndOfStream,
    FrameCeiling,
    Timeout,
    Shutdown,
}

#[derive(Debug)]
pub enum Acquired {
    Frame(RgbImage),
    /// nothing available right now, ask again
    Retry,
    Finished(Termination),
}

/// Source-specific read policy: when to stop and what a failed read means.
pub trait Acquisition {
    fn acquire(&mut self, source: &mut dyn FrameSource) -> Acquired;

    /// Failed reads absorbed so far.
    fn failures(&self) -> u64;
}

/// Finite source: stops at end of stream or after `max_frames` reads.
#[derive(Debug, Clone)]
pub struct FileAcquisition {
    max_frames: u64,
    frames_read: u64,
    failures: u64,
}

impl FileAcquisition {
    pub fn new(max_frames: u64) -> Self {
        Self {
            max_frames,
            frames_read: 0,
            failures: 0,
        }
    }
}

impl Acquisition for FileAcquisition {
    fn acquire(&mut self, source: &mut dyn FrameSource) -> Acquired {
        if self.frames_read >= self.max_frames {
            return Acquired::Finished(Termination::FrameCeiling);
        }

        match source.read() {
            Ok(Some(image)) => {
                self.frames_read += 1;
                Acquired::Frame(image)
            }
            Ok(None) => Acquired::Finished(Termination::EndOfStream),
            Err(err) => {
                // a broken file has nothing left to give
                self.failures += 1;
                warn!(%err, frame = self.frames_read + 1, "frame read failed, ending file run");
                Acquired::Finished(Termination::EndOfStream)
            }
        }
    }

    #[inline]
    fn failures(&self) -> u64 {
        self.failures
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Pause after a failed read before trying again.
    pub retry_pause_ms: u64,
    /// Wall-clock budget of a stream run.
    pub max_duration_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            retry_pause_ms: 500,
            max_duration_secs: 300,
        }
    }
}

impl StreamConfig {
    #[inline]
    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_pause_ms)
    }

    #[inline]
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

/// Unbounded source: failed reads are retried after a pause until the run's
/// time budget is spent.
pub struct StreamAcquisition {
    retry_pause: Duration,
    max_duration: Duration,
    clock: Arc<dyn Clock>,
    started: Duration,
    failures: u64,
}

impl StreamAcquisition {
    pub fn new(config: &StreamConfig, clock: Arc<dyn Clock>) -> Self {
        let started = clock.now();

        Self {
            retry_pause: config.retry_pause(),
            max_duration: config.max_duration(),
            clock,
            started,
            failures: 0,
        }
    }

    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.started)
    }
}

impl Acquisition for StreamAcquisition {
    fn acquire(&mut self, source: &mut dyn FrameSource) -> Acquired {
        if self.elapsed() > self.max_duration {
            return Acquired::Finished(Termination::Timeout);
        }

        let err = match source.read() {
            // a read that blocked past the budget does not count
            Ok(Some(_)) if self.elapsed() > self.max_duration => {
                return Acquired::Finished(Termination::Timeout);
            }
            Ok(Some(image)) => return Acquired::Frame(image),
            Ok(None) => None,
            Err(err) => Some(err),
        };

        self.failures += 1;
        match err {
            Some(err) => warn!(%err, "no frame, retrying"),
            None => warn!("no frame, retrying"),
        }
        self.clock.sleep(self.retry_pause);

        Acquired::Retry
    }

    #[inline]
    fn failures(&self) -> u64 {
        self.failures
    }
}
