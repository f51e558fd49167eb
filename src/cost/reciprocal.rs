//! Reciprocal intensity cost
//!
//! Intensities are clamped to the bounds and normalised onto `[0, scale]`;
//! the cost of entering a voxel is the reciprocal of the normalised value,
//! floored at `epsilon` so dark voxels stay finite.

use super::IntensityCost;
use crate::volume::IntensityBounds;

#[derive(Clone, Debug)]
pub struct Reciprocal {
    min: f64,
    range: f64,
    scale: f64,
    epsilon: f64,
}

impl Reciprocal {
    /// Callers guarantee non-degenerate bounds, `scale > 0` and `epsilon > 0`.
    pub fn new(bounds: IntensityBounds, scale: f64, epsilon: f64) -> Self {
        Self {
            min: bounds.min,
            range: bounds.max - bounds.min,
            scale,
            epsilon,
        }
    }
}

impl IntensityCost for Reciprocal {
    #[inline]
    fn cost(&self, intensity: f64) -> f64 {
        if !intensity.is_finite() {
            return 1.0 / self.epsilon;
        }
        let clamped = (intensity - self.min).clamp(0.0, self.range);
        let normalised = self.scale * clamped / self.range;
        1.0 / normalised.max(self.epsilon)
    }

    fn min_cost(&self) -> f64 {
        1.0 / self.scale.max(self.epsilon)
    }
}
