//! Mask volumes produced from fills
//!
//! Masks are flattened `Vec<u8>` of 0/1 over the spatial grid using Fortran
//! (column-major) ordering, matching NIfTI: index = x + y*nx + z*nx*ny.
//! They carry the full geometry of the source volume so persisted output
//! keeps its dimensions, channel count and calibration.

use crate::volume::{VolumeGeometry, Voxel};

/// Boolean volume: 1 where any fill reached, 0 elsewhere.
#[derive(Clone, Debug, PartialEq)]
pub struct BinaryMask {
    geometry: VolumeGeometry,
    data: Vec<u8>,
}

impl BinaryMask {
    /// All-zero mask with the given geometry.
    pub fn new(geometry: VolumeGeometry) -> Self {
        let n = geometry.spatial_len();
        Self {
            geometry,
            data: vec![0u8; n],
        }
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        self.geometry.dims
    }

    /// Flattened spatial mask.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn get(&self, voxel: Voxel) -> bool {
        self.data[self.geometry.index(voxel)] != 0
    }

    #[inline]
    pub fn set(&mut self, voxel: Voxel) {
        let idx = self.geometry.index(voxel);
        self.data[idx] = 1;
    }

    /// Number of true voxels.
    pub fn count(&self) -> usize {
        self.data.iter().map(|&m| m as usize).sum()
    }

    /// Mask repeated once per channel, laid out like the source volume.
    pub fn to_volume_layout(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.geometry.len());
        for _ in 0..self.geometry.channels {
            out.extend_from_slice(&self.data);
        }
        out
    }
}

/// Minimum accumulated cost per voxel across fills; NaN where unfilled.
#[derive(Clone, Debug)]
pub struct CostMap {
    geometry: VolumeGeometry,
    data: Vec<f64>,
}

impl CostMap {
    pub fn new(geometry: VolumeGeometry) -> Self {
        let n = geometry.spatial_len();
        Self {
            geometry,
            data: vec![f64::NAN; n],
        }
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, voxel: Voxel) -> Option<f64> {
        let v = self.data[self.geometry.index(voxel)];
        if v.is_nan() { None } else { Some(v) }
    }

    /// Keep the smaller of the stored and offered cost.
    #[inline]
    pub fn offer(&mut self, voxel: Voxel, cost: f64) {
        let idx = self.geometry.index(voxel);
        let slot = &mut self.data[idx];
        if slot.is_nan() || cost < *slot {
            *slot = cost;
        }
    }
}
