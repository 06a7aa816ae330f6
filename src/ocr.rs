use image::{GrayImage, Luma, RgbImage};
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};
use crate::error::Error;

/// Best-guess text for one binarized plate crop.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrReading {
    pub text: String,
    pub score: f32,
}

/// Text recognizer for plate crops.
pub trait Ocr: Send + Sync {
    fn read(&self, plate: &GrayImage) -> Result<OcrReading, Error>;
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OcrConfig {
    /// Readings shorter than this (after normalization) are dropped.
    pub min_text_len: usize,
    /// Intensities above this become black, the rest white.
    pub binarize_threshold: u8,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            min_text_len: 4,
            binarize_threshold: 64,
        }
    }
}

/// Drops OCR noise before it can reach the plate store.
#[derive(Debug, Clone)]
pub struct OcrGate {
    min_text_len: usize,
}

impl OcrGate {
    pub fn new(min_text_len: usize) -> Self {
        Self { min_text_len }
    }

    /// Normalized reading, or `None` when the text is empty or too short.
    pub fn pass(&self, reading: OcrReading) -> Option<OcrReading> {
        let text: String = reading
            .text
            .chars()
            .filter(|c| !c.is_whitespace())
            .flat_map(char::to_uppercase)
            .collect();

        if text.is_empty() || text.chars().count() < self.min_text_len {
            return None;
        }

        Some(OcrReading {
            text,
            score: reading.score,
        })
    }
}

/// Cuts the plate region out of `frame` and binarizes it for OCR.
/// `None` when the box has no pixels inside the frame.
pub fn plate_crop(frame: &RgbImage, plate: &BBox<Ltrb>, threshold: u8) -> Option<GrayImage> {
    let (x, y, w, h) = plate.pixel_rect(frame.width(), frame.height())?;

    let crop = image::imageops::crop_imm(frame, x, y, w, h).to_image();
    let gray = image::imageops::grayscale(&crop);

    Some(binarize(&gray, threshold))
}

/// Inverted fixed-threshold binarization: `> threshold` maps to 0, everything else to 255.
pub fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = gray.clone();
    for px in out.pixels_mut() {
        *px = if px.0[0] > threshold { Luma([0]) } else { Luma([255]) };
    }

    out
}
