//! Cost fields for cost-weighted fills
//!
//! A cost field assigns every voxel a finite, strictly positive traversal
//! cost that decreases with intensity (bright = cheap). It is built once per
//! volume and shared read-only by every fill on that volume.
//!
//! - `reciprocal`: `1 / max(normalised intensity, epsilon)` (default)
//! - `difference`: linear in the distance below the maximum intensity
//!
//! The fill engine only sees the `CostModel` trait, so other cost models can
//! be substituted without touching it.

pub mod reciprocal;
pub mod difference;

pub use difference::Difference;
pub use reciprocal::Reciprocal;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::FillError;
use crate::volume::{IntensityBounds, Volume, Voxel};

/// Coordinate to cost capability consumed by the fill engine.
pub trait CostModel: Send + Sync {
    /// Spatial dimensions (nx, ny, nz) the model is defined on
    fn dims(&self) -> (usize, usize, usize);

    /// Cost of entering `voxel`; finite and strictly positive
    fn cost(&self, voxel: Voxel) -> f64;

    /// Lower bound over all voxels
    fn min_cost(&self) -> f64;
}

/// Intensity to cost mapping used when building a `CostField`.
pub trait IntensityCost {
    fn cost(&self, intensity: f64) -> f64;
    fn min_cost(&self) -> f64;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostKind {
    #[default]
    Reciprocal,
    Difference,
}

/// Parameters for cost field construction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Cost model (default reciprocal)
    pub kind: CostKind,
    /// Explicit intensity bounds; scanned from the volume when absent
    pub bounds: Option<IntensityBounds>,
    /// Width of the normalised intensity range (default 255)
    pub scale: f64,
    /// Floor on the normalised intensity, keeps costs finite (default 0.5)
    pub epsilon: f64,
    /// Channel of a multi-channel volume to derive costs from (default 0)
    pub channel: usize,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            kind: CostKind::Reciprocal,
            bounds: None,
            scale: 255.0,
            epsilon: 0.5,
            channel: 0,
        }
    }
}

impl CostConfig {
    pub fn validate(&self) -> Result<(), FillError> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(FillError::InvalidConfig(format!(
                "cost scale must be positive and finite, got {}", self.scale
            )));
        }
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(FillError::InvalidConfig(format!(
                "cost epsilon must be positive and finite, got {}", self.epsilon
            )));
        }
        if let Some(b) = self.bounds {
            // Equal bounds are allowed and fall back to uniform cost
            if !(b.min <= b.max) {
                return Err(FillError::InvalidConfig(format!(
                    "cost bounds must satisfy min <= max, got [{}, {}]", b.min, b.max
                )));
            }
        }
        Ok(())
    }
}

/// Precomputed per-voxel costs for one channel of a volume.
#[derive(Clone, Debug)]
pub struct CostField {
    dims: (usize, usize, usize),
    costs: Vec<f64>,
    min_cost: f64,
    bounds: IntensityBounds,
    degenerate: bool,
}

impl CostField {
    /// Build the cost field for a volume
    ///
    /// Scans the whole volume for intensity bounds when `config.bounds` is
    /// `None`. A degenerate range (uniform intensity) is not an error: every
    /// voxel receives the unit step cost `1 / scale` and `is_degenerate()`
    /// reports it.
    pub fn build(volume: &Volume, config: &CostConfig) -> Result<Self, FillError> {
        config.validate()?;
        let samples = volume.channel(config.channel).ok_or_else(|| {
            FillError::InvalidConfig(format!(
                "channel {} requested but volume has {}",
                config.channel,
                volume.channels()
            ))
        })?;

        let bounds = config.bounds.unwrap_or_else(|| volume.intensity_bounds());
        debug!("Cost field bounds: min={} max={}", bounds.min, bounds.max);

        if bounds.is_degenerate() {
            warn!(
                "Degenerate intensity range [{}, {}]; using uniform cost",
                bounds.min, bounds.max
            );
            let unit = 1.0 / config.scale;
            return Ok(Self {
                dims: volume.dims(),
                costs: vec![unit; samples.len()],
                min_cost: unit,
                bounds,
                degenerate: true,
            });
        }

        let field = match config.kind {
            CostKind::Reciprocal => {
                Self::from_samples(volume, samples, bounds, &Reciprocal::new(bounds, config.scale, config.epsilon))
            }
            CostKind::Difference => {
                Self::from_samples(volume, samples, bounds, &Difference::new(bounds, config.scale, config.epsilon))
            }
        };
        Ok(field)
    }

    fn from_samples(
        volume: &Volume,
        samples: &[f64],
        bounds: IntensityBounds,
        model: &dyn IntensityCost,
    ) -> Self {
        let costs: Vec<f64> = samples.iter().map(|&v| model.cost(v)).collect();
        Self {
            dims: volume.dims(),
            costs,
            min_cost: model.min_cost(),
            bounds,
            degenerate: false,
        }
    }

    /// True when the volume had no usable intensity range.
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    pub fn bounds(&self) -> IntensityBounds {
        self.bounds
    }

    /// Flattened costs in Fortran order.
    pub fn costs(&self) -> &[f64] {
        &self.costs
    }
}

impl CostModel for CostField {
    fn dims(&self) -> (usize, usize, usize) {
        self.dims
    }

    #[inline]
    fn cost(&self, voxel: Voxel) -> f64 {
        let (nx, ny, _) = self.dims;
        self.costs[voxel[0] + voxel[1] * nx + voxel[2] * nx * ny]
    }

    fn min_cost(&self) -> f64 {
        self.min_cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::VolumeGeometry;

    fn ramp_volume() -> Volume {
        let geom = VolumeGeometry::isotropic(4, 1, 1);
        Volume::new(geom, vec![0.0, 10.0, 20.0, 40.0]).unwrap()
    }

    #[test]
    fn test_build_scans_bounds() {
        let vol = ramp_volume();
        let field = CostField::build(&vol, &CostConfig::default()).unwrap();
        assert_eq!(field.bounds(), IntensityBounds::new(0.0, 40.0));
        assert!(!field.is_degenerate());
        assert!((field.cost([3, 0, 0]) - 1.0 / 255.0).abs() < 1e-12);
        assert!((field.cost([0, 0, 0]) - 2.0).abs() < 1e-12);
        assert!(field.costs().windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let vol = ramp_volume();
        let config = CostConfig {
            bounds: Some(IntensityBounds::new(40.0, 0.0)),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(FillError::InvalidConfig(_))));
        assert!(matches!(CostField::build(&vol, &config), Err(FillError::InvalidConfig(_))));

        let config = CostConfig {
            bounds: Some(IntensityBounds::new(f64::NAN, 1.0)),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CostConfig {
            bounds: Some(IntensityBounds::new(5.0, 5.0)),
            ..Default::default()
        };
        assert!(CostField::build(&vol, &config).unwrap().is_degenerate());
    }

    #[test]
    fn test_explicit_bounds_clamp() {
        let vol = ramp_volume();
        let config = CostConfig {
            bounds: Some(IntensityBounds::new(10.0, 20.0)),
            ..Default::default()
        };
        let field = CostField::build(&vol, &config).unwrap();
        assert_eq!(field.cost([2, 0, 0]), field.cost([3, 0, 0]));
        assert_eq!(field.cost([0, 0, 0]), field.cost([1, 0, 0]));
    }

    #[test]
    fn test_uniform_volume_is_degenerate_not_error() {
        let geom = VolumeGeometry::isotropic(3, 3, 3);
        let vol = Volume::new(geom, vec![42.0; 27]).unwrap();
        let field = CostField::build(&vol, &CostConfig::default()).unwrap();
        assert!(field.is_degenerate());
        let first = field.costs()[0];
        assert!(first > 0.0 && first.is_finite());
        assert!(field.costs().iter().all(|&c| c == first));
    }

    #[test]
    fn test_costs_respect_floor() {
        let vol = ramp_volume();
        for kind in [CostKind::Reciprocal, CostKind::Difference] {
            let config = CostConfig { kind, ..Default::default() };
            let field = CostField::build(&vol, &config).unwrap();
            for &c in field.costs() {
                assert!(c.is_finite());
                assert!(c >= field.min_cost() - 1e-15, "{:?} cost {} below floor", kind, c);
            }
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let vol = ramp_volume();
        let config = CostConfig { epsilon: 0.0, ..Default::default() };
        assert!(matches!(CostField::build(&vol, &config), Err(FillError::InvalidConfig(_))));

        let config = CostConfig { channel: 1, ..Default::default() };
        assert!(matches!(CostField::build(&vol, &config), Err(FillError::InvalidConfig(_))));
    }
}
