mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{
    empty_models, street_models, video_file, FakeBackend, ManualClock, RisingOcr, Synthetic,
};
use image::RgbImage;
use parking_lot::Mutex;
use platetrack::config::Config;
use platetrack::source::{Clock, FrameSource, StreamAcquisition, StreamConfig, Termination};
use platetrack::{
    Detection, Error, Frame, FramePipeline, MemoryPlateStore, Models, PlateReader, PlateStore,
    Shutdown,
};

fn reader(backend: Arc<FakeBackend>, models: Models, store: Arc<MemoryPlateStore>) -> PlateReader {
    PlateReader::new(backend, models, store, Config::default())
}

#[test]
fn file_run_stops_at_frame_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let path = video_file(dir.path(), "long.mp4");

    let reader = reader(
        FakeBackend::new(1200, 0),
        empty_models(),
        Arc::new(MemoryPlateStore::new()),
    );
    let summary = reader.run_on_file(&path, None).unwrap();

    assert_eq!(summary.termination, Termination::FrameCeiling);
    assert_eq!(summary.frames_read, 1000);
    assert_eq!(summary.frames_sampled, 200);
    assert_eq!(summary.source_name, "long.mp4");
}

#[test]
fn file_run_ends_at_end_of_stream() {
    let dir = tempfile::tempdir().unwrap();
    let path = video_file(dir.path(), "short.avi");

    let reader = reader(
        FakeBackend::new(42, 0),
        empty_models(),
        Arc::new(MemoryPlateStore::new()),
    );
    let summary = reader.run_on_file(&path, Some("upload-7")).unwrap();

    assert_eq!(summary.termination, Termination::EndOfStream);
    assert_eq!(summary.frames_read, 42);
    assert_eq!(summary.frames_sampled, 8);
    assert_eq!(summary.source_name, "upload-7");
}

#[test]
fn best_reading_per_vehicle_is_stored() {
    let dir = tempfile::tempdir().unwrap();
    let path = video_file(dir.path(), "street.mp4");
    let store = Arc::new(MemoryPlateStore::new());

    let reader = reader(
        FakeBackend::new(50, 0),
        street_models(RisingOcr::new("ab 123")),
        store.clone(),
    );
    let summary = reader.run_on_file(&path, None).unwrap();

    assert_eq!(summary.frames_sampled, 10);
    assert_eq!(summary.plates_detected, 20);
    assert_eq!(summary.unassociated_plates, 10);
    assert_eq!(summary.readings_stored, 10);
    assert_eq!(summary.collaborator_failures, 0);

    let plates = reader.plates().unwrap();
    assert_eq!(plates.len(), 1);

    let rec = &plates[0];
    assert!(rec.car_id > 0);
    assert_eq!(rec.license_number, "AB123");
    assert_eq!(rec.video_source, "street.mp4");
    assert!((rec.score - 0.59).abs() < 1e-4);
}

#[test]
fn failed_detection_skips_only_that_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = video_file(dir.path(), "flaky.mp4");
    let store = Arc::new(MemoryPlateStore::new());

    let models = Models::new(
        Arc::new(|frame: &Frame| -> Result<Vec<Detection>, Error> {
            if frame.index == 10 {
                return Err(Error::Detector("gpu hiccup".into()));
            }
            Ok(vec![Detection::from_raw(10.0, 20.0, 110.0, 110.0, 0.9, 7)])
        }),
        Arc::new(|_: &Frame| -> Result<Vec<Detection>, Error> {
            Ok(vec![Detection::from_raw(40.0, 85.0, 80.0, 100.0, 0.7, 0)])
        }),
        RisingOcr::new("XYZ777"),
    );

    let summary = reader(FakeBackend::new(30, 0), models, store.clone())
        .run_on_file(&path, None)
        .unwrap();

    assert_eq!(summary.termination, Termination::EndOfStream);
    assert_eq!(summary.frames_sampled, 6);
    assert_eq!(summary.collaborator_failures, 1);
    assert_eq!(summary.plates_detected, 5);
    assert_eq!(store.len(), 1);
}

#[test]
fn failing_stream_runs_until_timeout() {
    let clock = Arc::new(ManualClock::default());
    let mut config = Config::default();
    config.stream = StreamConfig {
        retry_pause_ms: 500,
        max_duration_secs: 30,
    };

    let reader = PlateReader::new(
        FakeBackend::new(0, 0),
        empty_models(),
        Arc::new(MemoryPlateStore::new()),
        config,
    )
    .with_clock(clock.clone());

    let summary = reader
        .run_on_stream("rtsp://cam.local/broken", None, &Shutdown::new())
        .unwrap();

    assert_eq!(summary.termination, Termination::Timeout);
    assert_eq!(summary.frames_read, 0);
    assert_eq!(summary.read_failures, 61);
    assert!(clock.elapsed() > Duration::from_secs(30));
    assert!(clock.elapsed() <= Duration::from_millis(30_500));
}

#[test]
fn stream_keeps_retrying_after_frames_stop() {
    let clock = Arc::new(ManualClock::default());
    let mut config = Config::default();
    config.stream.max_duration_secs = 5;
    let store = Arc::new(MemoryPlateStore::new());

    let reader = PlateReader::new(
        FakeBackend::new(0, 25),
        street_models(RisingOcr::new("GATE01")),
        store.clone(),
        config,
    )
    .with_clock(clock.clone());

    let summary = reader
        .run_on_stream("rtsp://cam.local/parking/gate1", None, &Shutdown::new())
        .unwrap();

    assert_eq!(summary.termination, Termination::Timeout);
    assert_eq!(summary.frames_read, 25);
    assert_eq!(summary.frames_sampled, 5);
    assert_eq!(summary.read_failures, 11);

    let plates = store.list().unwrap();
    assert_eq!(plates.len(), 1);
    assert_eq!(plates[0].video_source, "gate1");
    assert_eq!(plates[0].license_number, "GATE01");
}

/// Live feed where every frame takes 200 ms of clock time to arrive.
struct LiveFeed {
    clock: Arc<ManualClock>,
    frames: Synthetic,
}

impl FrameSource for LiveFeed {
    fn read(&mut self) -> Result<Option<RgbImage>, Error> {
        self.clock.sleep(Duration::from_millis(200));
        self.frames.read()
    }
}

#[test]
fn live_stream_times_out_without_processing_late_frames() {
    let clock = Arc::new(ManualClock::default());
    let mut config = Config::default();
    config.pipeline.frame_skip = 1;
    config.stream.max_duration_secs = 3;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let models = {
        let (clock, seen) = (clock.clone(), seen.clone());
        Models::new(
            Arc::new(move |_: &Frame| -> Result<Vec<Detection>, Error> {
                seen.lock().push(clock.now());
                Ok(Vec::new())
            }),
            Arc::new(|_: &Frame| -> Result<Vec<Detection>, Error> { Ok(Vec::new()) }),
            RisingOcr::new("UNUSED"),
        )
    };

    let pipeline = FramePipeline::new(models, Arc::new(MemoryPlateStore::new()), &config);
    let mut source = LiveFeed {
        clock: clock.clone(),
        frames: Synthetic::new(u64::MAX),
    };
    let mut acquisition = StreamAcquisition::new(&config.stream, clock.clone());

    let summary = pipeline.run(&mut source, &mut acquisition, "lobby", &Shutdown::new());

    assert_eq!(summary.termination, Termination::Timeout);
    assert_eq!(summary.read_failures, 0);
    assert_eq!(summary.frames_sampled, 15);

    let seen = seen.lock();
    assert_eq!(seen.len(), 15);
    assert!(seen.iter().all(|t| *t <= Duration::from_secs(3)));
}

#[test]
fn fatal_sources_are_rejected_before_running() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FakeBackend::new(10, 10);
    let reader = reader(
        backend.clone(),
        empty_models(),
        Arc::new(MemoryPlateStore::new()),
    );

    let missing = dir.path().join("missing.mp4");
    assert!(matches!(
        reader.run_on_file(&missing, None),
        Err(Error::NotFound(_))
    ));

    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, b"not a video").unwrap();
    assert!(matches!(
        reader.run_on_file(&notes, None),
        Err(Error::UnsupportedFormat(_))
    ));

    let shutdown = Shutdown::new();
    assert!(matches!(
        reader.run_on_stream("ftp://cam.local/live", None, &shutdown),
        Err(Error::InvalidStreamUrl(_))
    ));
    assert!(matches!(
        reader.run_on_stream("rtsp://unreachable.local/live", None, &shutdown),
        Err(Error::SourceUnreachable { .. })
    ));

    assert_eq!(backend.opened(), 0);
}
