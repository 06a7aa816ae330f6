use std::sync::Arc;

use crate::error::Error;
use crate::frame::Frame;
use crate::ocr::Ocr;
use crate::Detection;

/// Object detector: one call per frame, one row per object found.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, Error>;
}

impl<F> Detector for F
where
    F: Fn(&Frame) -> Result<Vec<Detection>, Error> + Send + Sync,
{
    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, Error> {
        self(frame)
    }
}

/// Models loaded once and shared by every run.
#[derive(Clone)]
pub struct Models {
    /// General object detector, its output is narrowed to vehicle classes.
    pub vehicles: Arc<dyn Detector>,
    pub plates: Arc<dyn Detector>,
    pub ocr: Arc<dyn Ocr>,
}

impl Models {
    pub fn new(vehicles: Arc<dyn Detector>, plates: Arc<dyn Detector>, ocr: Arc<dyn Ocr>) -> Self {
        Self {
            vehicles,
            plates,
            ocr,
        }
    }
}
