use serde_derive::{Deserialize, Serialize};
use std::marker::PhantomData;

pub trait BBoxFormat: std::fmt::Debug + Copy {}

/// Left-top-right-bottom format, contains left top and right bottom corners
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

/// X-y-aspect_ratio-height format, contains coordinates of the center of bbox and aspect_ratio-height
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Xyah;
impl BBoxFormat for Xyah {}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
#[serde(bound = "")]
pub struct BBox<F: BBoxFormat>([f32; 4], PhantomData<F>);

impl<F: BBoxFormat> From<BBox<F>> for [f32; 4] {
    fn from(bbox: BBox<F>) -> Self {
        bbox.0
    }
}

impl<F: BBoxFormat> BBox<F> {
    #[inline]
    pub fn as_slice(&self) -> &[f32; 4] {
        &self.0
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        BBox([left, top, right, bottom], PhantomData)
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.0[3]
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        (self.right() - self.left()).max(0.0)
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        (self.bottom() - self.top()).max(0.0)
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    #[inline]
    pub fn as_xyah(&self) -> BBox<Xyah> {
        self.into()
    }

    /// Intersection over union, `0.0` for disjoint or degenerate boxes.
    pub fn iou(&self, other: &BBox<Ltrb>) -> f32 {
        let i_l = self.left().max(other.left());
        let i_t = self.top().max(other.top());
        let i_r = self.right().min(other.right());
        let i_b = self.bottom().min(other.bottom());

        let inter = (i_r - i_l).max(0.0) * (i_b - i_t).max(0.0);
        let union = self.area() + other.area() - inter;

        if union <= f32::EPSILON {
            0.0
        } else {
            inter / union
        }
    }

    /// True when every edge of `inner` lies inside (or on) this box, allowing each edge
    /// to stick out by at most `tolerance` pixels.
    #[inline]
    pub fn contains(&self, inner: &BBox<Ltrb>, tolerance: f32) -> bool {
        inner.left() >= self.left() - tolerance
            && inner.top() >= self.top() - tolerance
            && inner.right() <= self.right() + tolerance
            && inner.bottom() <= self.bottom() + tolerance
    }

    /// Integer pixel rectangle `(x, y, w, h)` of this box clipped to a `width`x`height` image.
    /// Coordinates are truncated towards zero.
    pub fn pixel_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let clip = |v: f32, max: u32| (v.max(0.0) as u32).min(max);

        let x1 = clip(self.left(), width);
        let y1 = clip(self.top(), height);
        let x2 = clip(self.right(), width);
        let y2 = clip(self.bottom(), height);

        if x2 > x1 && y2 > y1 {
            Some((x1, y1, x2 - x1, y2 - y1))
        } else {
            None
        }
    }
}

impl BBox<Xyah> {
    #[inline]
    pub fn xyah(cx: f32, cy: f32, aspect_ratio: f32, height: f32) -> Self {
        BBox([cx, cy, aspect_ratio, height], PhantomData)
    }

    #[inline(always)]
    pub fn as_ltrb(&self) -> BBox<Ltrb> {
        self.into()
    }

    #[inline(always)]
    pub fn cx(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn cy(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn aspect_ratio(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3]
    }
}

impl<'a> From<&'a BBox<Ltrb>> for BBox<Xyah> {
    #[inline]
    fn from(v: &'a BBox<Ltrb>) -> Self {
        let width = v.0[2] - v.0[0];
        let height = (v.0[3] - v.0[1]).max(f32::EPSILON);

        Self(
            [v.0[0] + width / 2.0, v.0[1] + height / 2.0, width / height, height],
            PhantomData,
        )
    }
}

impl<'a> From<&'a BBox<Xyah>> for BBox<Ltrb> {
    #[inline]
    fn from(v: &'a BBox<Xyah>) -> Self {
        let half_w = v.0[2] * v.0[3] / 2.0;
        let half_h = v.0[3] / 2.0;

        Self(
            [v.0[0] - half_w, v.0[1] - half_h, v.0[0] + half_w, v.0[1] + half_h],
            PhantomData,
        )
    }
}
