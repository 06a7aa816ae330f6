use image::RgbImage;

/// One decoded frame of a run.
pub struct Frame {
    /// 1-based position in acquisition order, skipped frames included
    pub index: u64,
    pub image: RgbImage,
}

impl Frame {
    #[inline]
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    #[inline]
    pub fn dims(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
