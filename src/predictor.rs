use crate::bbox::{BBox, Xyah};
use nalgebra as na;

type StateVector = na::SVector<f32, 8>;
type StateMatrix = na::SMatrix<f32, 8, 8>;
type MeasurementMatrix = na::SMatrix<f32, 4, 8>;
type MeasurementVector = na::SVector<f32, 4>;

const STD_WEIGHT_POSITION: f32 = 1.0 / 20.0;
const STD_WEIGHT_VELOCITY: f32 = 1.0 / 160.0;

/// Constant-velocity Kalman filter over `(cx, cy, a, h)` and their velocities.
///
/// One step is one *sampled* frame, so the velocity is expressed in pixels per
/// sampled frame, whatever the skip factor is.
#[derive(Debug, Clone)]
pub struct Predictor {
    mean: StateVector,
    covariance: StateMatrix,
    motion: StateMatrix,
    projection: MeasurementMatrix,
}

impl Predictor {
    pub fn new(bbox: &BBox<Xyah>) -> Self {
        let h = bbox.height().abs().max(1.0);

        let mut mean = StateVector::zeros();
        mean.fixed_rows_mut::<4>(0)
            .copy_from(&MeasurementVector::from_column_slice(bbox.as_slice()));

        let std = StateVector::from_column_slice(&[
            2.0 * STD_WEIGHT_POSITION * h,
            2.0 * STD_WEIGHT_POSITION * h,
            1e-2,
            2.0 * STD_WEIGHT_POSITION * h,
            10.0 * STD_WEIGHT_VELOCITY * h,
            10.0 * STD_WEIGHT_VELOCITY * h,
            1e-5,
            10.0 * STD_WEIGHT_VELOCITY * h,
        ]);

        let mut motion = StateMatrix::identity();
        for i in 0..4 {
            motion[(i, i + 4)] = 1.0;
        }

        Self {
            mean,
            covariance: StateMatrix::from_diagonal(&std.component_mul(&std)),
            motion,
            projection: MeasurementMatrix::identity(),
        }
    }

    #[inline]
    pub fn bbox(&self) -> BBox<Xyah> {
        BBox::xyah(self.mean[0], self.mean[1], self.mean[2], self.mean[3])
    }

    /// Sum of the position/shape variances. Shrinks while observations keep
    /// coming and grows on every prediction without one.
    #[inline]
    pub fn uncertainty(&self) -> f32 {
        (0..4).map(|i| self.covariance[(i, i)]).sum()
    }

    /// Advances the state by one sampled frame and returns the predicted box.
    pub fn predict(&mut self) -> BBox<Xyah> {
        let h = self.mean[3].abs().max(1.0);
        let std = StateVector::from_column_slice(&[
            STD_WEIGHT_POSITION * h,
            STD_WEIGHT_POSITION * h,
            1e-2,
            STD_WEIGHT_POSITION * h,
            STD_WEIGHT_VELOCITY * h,
            STD_WEIGHT_VELOCITY * h,
            1e-5,
            STD_WEIGHT_VELOCITY * h,
        ]);
        let noise = StateMatrix::from_diagonal(&std.component_mul(&std));

        let prev_height = self.mean[3];
        self.mean = self.motion * self.mean;
        self.covariance = self.motion * self.covariance * self.motion.transpose() + noise;

        // a shrinking box must never collapse
        if self.mean[3] <= 1.0 {
            self.mean[3] = prev_height.max(1.0);
            self.mean[7] = 0.0;
        }

        self.bbox()
    }

    /// Blends an observed box into the state.
    pub fn update(&mut self, bbox: &BBox<Xyah>) {
        let h = self.mean[3].abs().max(1.0);
        let std = MeasurementVector::new(
            STD_WEIGHT_POSITION * h,
            STD_WEIGHT_POSITION * h,
            1e-1,
            STD_WEIGHT_POSITION * h,
        );
        let noise = na::SMatrix::<f32, 4, 4>::from_diagonal(&std.component_mul(&std));

        let measurement = MeasurementVector::from_column_slice(bbox.as_slice());
        let projected_mean = self.projection * self.mean;
        let projected_cov =
            self.projection * self.covariance * self.projection.transpose() + noise;

        let inv = match projected_cov.try_inverse() {
            Some(inv) => inv,
            None => {
                self.mean
                    .fixed_rows_mut::<4>(0)
                    .copy_from(&measurement);
                return;
            }
        };

        let gain = self.covariance * self.projection.transpose() * inv;
        self.mean += gain * (measurement - projected_mean);
        self.covariance -= gain * projected_cov * gain.transpose();
    }
}
