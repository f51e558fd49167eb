//! Calibrated intensity volumes
//!
//! Samples are stored flat in Fortran order (x varies fastest) to match the
//! NIfTI convention: `index = x + y*nx + z*nx*ny + c*nx*ny*nz`.

use serde::{Deserialize, Serialize};

/// Integer spatial coordinate `[x, y, z]`.
pub type Voxel = [usize; 3];

/// Role of an axis in the volume.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisLabel {
    X,
    Y,
    Z,
    Channel,
}

/// Physical calibration of one axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisCalibration {
    pub label: AxisLabel,
    /// Physical unit of one step along this axis (e.g. "micron")
    pub unit: String,
    /// Physical size of one step
    pub scale: f64,
}

impl AxisCalibration {
    pub fn new(label: AxisLabel, unit: impl Into<String>, scale: f64) -> Self {
        Self {
            label,
            unit: unit.into(),
            scale,
        }
    }
}

/// Everything about a volume except its samples.
///
/// Masks derived from a volume carry an identical copy so that persisted
/// output lines up with the source stack.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeGeometry {
    /// Spatial dimensions (nx, ny, nz)
    pub dims: (usize, usize, usize),
    /// Number of channels; 1 for plain 3D data
    pub channels: usize,
    /// Axis calibrations in storage order: X, Y, Z, then Channel when present
    pub axes: Vec<AxisCalibration>,
    /// Affine transformation matrix (4x4, row-major)
    pub affine: [f64; 16],
}

impl VolumeGeometry {
    /// Isotropic geometry with unit voxels and no channel axis.
    pub fn isotropic(nx: usize, ny: usize, nz: usize) -> Self {
        Self::calibrated(nx, ny, nz, (1.0, 1.0, 1.0), "pixel")
    }

    /// 3D geometry with the given voxel sizes.
    pub fn calibrated(
        nx: usize, ny: usize, nz: usize,
        voxel_size: (f64, f64, f64),
        unit: &str,
    ) -> Self {
        let (vsx, vsy, vsz) = voxel_size;
        Self {
            dims: (nx, ny, nz),
            channels: 1,
            axes: vec![
                AxisCalibration::new(AxisLabel::X, unit, vsx),
                AxisCalibration::new(AxisLabel::Y, unit, vsy),
                AxisCalibration::new(AxisLabel::Z, unit, vsz),
            ],
            affine: [
                vsx, 0.0, 0.0, 0.0,
                0.0, vsy, 0.0, 0.0,
                0.0, 0.0, vsz, 0.0,
                0.0, 0.0, 0.0, 1.0,
            ],
        }
    }

    /// Adds a channel axis of the given length.
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.axes.retain(|a| a.label != AxisLabel::Channel);
        self.channels = channels.max(1);
        if self.channels > 1 {
            self.axes.push(AxisCalibration::new(AxisLabel::Channel, "", 1.0));
        }
        self
    }

    /// Number of voxels in one channel.
    pub fn spatial_len(&self) -> usize {
        self.dims.0 * self.dims.1 * self.dims.2
    }

    /// Number of samples across all channels.
    pub fn len(&self) -> usize {
        self.spatial_len() * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physical voxel sizes along X, Y, Z.
    pub fn voxel_size(&self) -> (f64, f64, f64) {
        let scale = |label: AxisLabel| {
            self.axes
                .iter()
                .find(|a| a.label == label)
                .map(|a| a.scale)
                .unwrap_or(1.0)
        };
        (scale(AxisLabel::X), scale(AxisLabel::Y), scale(AxisLabel::Z))
    }

    /// Unit of the X axis, taken as the spatial unit of the volume.
    pub fn spatial_unit(&self) -> &str {
        self.axes
            .iter()
            .find(|a| a.label == AxisLabel::X)
            .map(|a| a.unit.as_str())
            .unwrap_or("")
    }

    #[inline]
    pub fn index(&self, voxel: Voxel) -> usize {
        let (nx, ny, _) = self.dims;
        voxel[0] + voxel[1] * nx + voxel[2] * nx * ny
    }

    #[inline]
    pub fn voxel(&self, index: usize) -> Voxel {
        let (nx, ny, _) = self.dims;
        [index % nx, (index / nx) % ny, index / (nx * ny)]
    }

    #[inline]
    pub fn contains(&self, voxel: Voxel) -> bool {
        let (nx, ny, nz) = self.dims;
        voxel[0] < nx && voxel[1] < ny && voxel[2] < nz
    }
}

/// Intensity range used to normalise a cost field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntensityBounds {
    pub min: f64,
    pub max: f64,
}

impl IntensityBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// True when the range cannot be used to normalise intensities.
    pub fn is_degenerate(&self) -> bool {
        !(self.min.is_finite() && self.max.is_finite()) || self.max - self.min <= 0.0
    }
}

/// Immutable calibrated intensity array.
#[derive(Clone, Debug)]
pub struct Volume {
    geometry: VolumeGeometry,
    data: Vec<f64>,
}

impl Volume {
    /// Wraps flattened samples; `data.len()` must match the geometry.
    pub fn new(geometry: VolumeGeometry, data: Vec<f64>) -> Result<Self, String> {
        if data.len() != geometry.len() {
            return Err(format!(
                "Volume data has {} samples, geometry {:?}x{} needs {}",
                data.len(), geometry.dims, geometry.channels, geometry.len()
            ));
        }
        Ok(Self { geometry, data })
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        self.geometry.dims
    }

    pub fn channels(&self) -> usize {
        self.geometry.channels
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Samples of one channel, `None` if the channel does not exist.
    pub fn channel(&self, c: usize) -> Option<&[f64]> {
        if c >= self.geometry.channels {
            return None;
        }
        let n = self.geometry.spatial_len();
        Some(&self.data[c * n..(c + 1) * n])
    }

    /// Intensity at a voxel of channel 0.
    #[inline]
    pub fn intensity(&self, voxel: Voxel) -> f64 {
        self.data[self.geometry.index(voxel)]
    }

    /// Minimum and maximum over every sample (all channels).
    ///
    /// Non-finite samples are ignored. An empty or all-NaN volume yields
    /// infinite bounds, which downstream treat as degenerate.
    pub fn intensity_bounds(&self) -> IntensityBounds {
        let (min, max) = self
            .data
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        IntensityBounds { min, max }
    }
}
