//! Linear difference cost
//!
//! Cost grows linearly with the distance of a voxel's intensity below the
//! maximum: `max(scale * (max - I) / (max - min), epsilon) / scale`.

use super::IntensityCost;
use crate::volume::IntensityBounds;

#[derive(Clone, Debug)]
pub struct Difference {
    max: f64,
    range: f64,
    scale: f64,
    epsilon: f64,
}

impl Difference {
    pub fn new(bounds: IntensityBounds, scale: f64, epsilon: f64) -> Self {
        Self {
            max: bounds.max,
            range: bounds.max - bounds.min,
            scale,
            epsilon,
        }
    }
}

impl IntensityCost for Difference {
    #[inline]
    fn cost(&self, intensity: f64) -> f64 {
        if !intensity.is_finite() {
            return 1.0;
        }
        let below = (self.max - intensity).clamp(0.0, self.range);
        (self.scale * below / self.range).max(self.epsilon) / self.scale
    }

    fn min_cost(&self) -> f64 {
        self.epsilon / self.scale
    }
}
