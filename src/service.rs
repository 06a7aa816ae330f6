use std::path::Path;
use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

use crate::config::Config;
use crate::detector::Models;
use crate::error::Error;
use crate::pipeline::{FramePipeline, RunSummary};
use crate::source::{
    Clock, FileAcquisition, FrameSource, Shutdown, StreamAcquisition, SystemClock, VideoBackend,
};
use crate::store::{PlateRecord, PlateStore};

const VIDEO_EXTENSIONS: [&str; 3] = ["mp4", "avi", "mov"];
const STREAM_SCHEMES: [&str; 4] = ["http://", "https://", "rtsp://", "rtmp://"];

/// Entry point for callers: validates sources, runs pipelines over them and
/// exposes the stored readings. Cheap to clone, every clone shares the models
/// and the store.
#[derive(Clone)]
pub struct PlateReader {
    backend: Arc<dyn VideoBackend>,
    store: Arc<dyn PlateStore>,
    pipeline: FramePipeline,
    config: Config,
    clock: Arc<dyn Clock>,
}

impl PlateReader {
    pub fn new(
        backend: Arc<dyn VideoBackend>,
        models: Models,
        store: Arc<dyn PlateStore>,
        config: Config,
    ) -> Self {
        Self {
            pipeline: FramePipeline::new(models, store.clone(), &config),
            backend,
            store,
            config,
            clock: Arc::new(SystemClock::new()),
        }
    }

    /// Reader persisting to the SQLite database named in `config.store`.
    #[cfg(feature = "sqlite")]
    pub fn with_sqlite(
        backend: Arc<dyn VideoBackend>,
        models: Models,
        config: Config,
    ) -> Result<Self, Error> {
        let store = crate::store::SqlitePlateStore::open(&config.store.path)?;

        Ok(Self::new(backend, models, Arc::new(store), config))
    }

    /// Time source for stream timeouts and retry pauses.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_pipeline(mut self, f: impl FnOnce(FramePipeline) -> FramePipeline) -> Self {
        self.pipeline = f(self.pipeline);
        self
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs a video file to completion on the calling thread.
    ///
    /// `source_name` defaults to the file name.
    pub fn run_on_file<P: AsRef<Path>>(
        &self,
        path: P,
        source_name: Option<&str>,
    ) -> Result<RunSummary, Error> {
        let (source, name) = self.open_file(path.as_ref(), source_name)?;

        Ok(self.file_run(source, &name, &Shutdown::new()))
    }

    /// Runs a network stream on the calling thread until it times out or
    /// `shutdown` is triggered. Read failures after the stream opened are retried.
    pub fn run_on_stream(
        &self,
        url: &str,
        source_name: Option<&str>,
        shutdown: &Shutdown,
    ) -> Result<RunSummary, Error> {
        let (source, name) = self.open_stream(url, source_name)?;

        Ok(self.stream_run(source, &name, shutdown))
    }

    /// Validates and opens the file, then runs it on tokio's blocking pool.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_file<P: AsRef<Path>>(
        &self,
        path: P,
        source_name: Option<&str>,
    ) -> Result<RunHandle, Error> {
        let (source, name) = self.open_file(path.as_ref(), source_name)?;
        let shutdown = Shutdown::new();

        let this = self.clone();
        let (run_name, run_shutdown) = (name.clone(), shutdown.clone());
        let join =
            tokio::task::spawn_blocking(move || this.file_run(source, &run_name, &run_shutdown));

        Ok(RunHandle {
            source_name: name,
            shutdown,
            join,
        })
    }

    /// Validates and opens the stream, then runs it on tokio's blocking pool.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_stream(&self, url: &str, source_name: Option<&str>) -> Result<RunHandle, Error> {
        let (source, name) = self.open_stream(url, source_name)?;
        let shutdown = Shutdown::new();

        let this = self.clone();
        let (run_name, run_shutdown) = (name.clone(), shutdown.clone());
        let join =
            tokio::task::spawn_blocking(move || this.stream_run(source, &run_name, &run_shutdown));

        Ok(RunHandle {
            source_name: name,
            shutdown,
            join,
        })
    }

    /// Stored readings, most recent first.
    pub fn plates(&self) -> Result<Vec<PlateRecord>, Error> {
        self.store.list()
    }

    fn file_run(
        &self,
        mut source: Box<dyn FrameSource>,
        name: &str,
        shutdown: &Shutdown,
    ) -> RunSummary {
        let mut acquisition = FileAcquisition::new(self.config.pipeline.max_frames);

        self.pipeline.run(source.as_mut(), &mut acquisition, name, shutdown)
    }

    fn stream_run(
        &self,
        mut source: Box<dyn FrameSource>,
        name: &str,
        shutdown: &Shutdown,
    ) -> RunSummary {
        let mut acquisition = StreamAcquisition::new(&self.config.stream, self.clock.clone());

        self.pipeline.run(source.as_mut(), &mut acquisition, name, shutdown)
    }

    fn open_file(
        &self,
        path: &Path,
        source_name: Option<&str>,
    ) -> Result<(Box<dyn FrameSource>, String), Error> {
        check_video_path(path).map_err(|err| {
            error!(%err, "file run rejected");
            err
        })?;

        let name = match source_name {
            Some(name) => name.to_string(),
            None => file_source_name(path),
        };

        let source = self.backend.open_file(path).map_err(|err| {
            error!(%err, path = %path.display(), "cannot open video");
            err
        })?;
        info!(source = %name, path = %path.display(), "video opened");

        Ok((source, name))
    }

    fn open_stream(
        &self,
        url: &str,
        source_name: Option<&str>,
    ) -> Result<(Box<dyn FrameSource>, String), Error> {
        check_stream_url(url).map_err(|err| {
            error!(%err, "stream run rejected");
            err
        })?;

        let name = match source_name {
            Some(name) => name.to_string(),
            None => stream_source_name(url),
        };

        let source = self.backend.open_stream(url).map_err(|err| {
            error!(%err, url, "cannot open stream");
            err
        })?;
        info!(source = %name, url, "stream opened");

        Ok((source, name))
    }
}

/// A run executing in the background.
pub struct RunHandle {
    source_name: String,
    shutdown: Shutdown,
    join: JoinHandle<RunSummary>,
}

impl RunHandle {
    #[inline]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Asks the run to stop at its next loop iteration.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn wait(self) -> Result<RunSummary, JoinError> {
        self.join.await
    }
}

fn check_video_path(path: &Path) -> Result<(), Error> {
    if !path.is_file() {
        return Err(Error::NotFound(path.to_path_buf()));
    }

    let supported = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);

    if !supported {
        return Err(Error::UnsupportedFormat(path.to_path_buf()));
    }

    Ok(())
}

fn check_stream_url(url: &str) -> Result<(), Error> {
    let lower = url.to_ascii_lowercase();
    if STREAM_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        Ok(())
    } else {
        Err(Error::InvalidStreamUrl(url.to_string()))
    }
}

fn file_source_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Last non-empty path segment of the url, or `"stream"`.
fn stream_source_name(url: &str) -> String {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = rest.split(['?', '#']).next().unwrap_or(rest);

    path.split('/')
        .skip(1)
        .filter(|seg| !seg.is_empty())
        .last()
        .unwrap_or("stream")
        .to_string()
}
