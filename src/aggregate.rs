//! Merging independent fills into one mask
//!
//! Merging is a logical union: a voxel is set if any fill finalized it within
//! its threshold. Overlapping fills coalesce; nothing is counted or summed.

use log::debug;

use crate::error::FillError;
use crate::fill::FillResult;
use crate::mask::{BinaryMask, CostMap};
use crate::volume::{Volume, VolumeGeometry};

/// Accumulates fill results for one volume.
///
/// The aggregator is the join barrier of a file: it only ever sees finished
/// (or cancelled) results and produces the mask once all are added.
#[derive(Debug)]
pub struct FillAggregator {
    mask: BinaryMask,
    costs: Option<CostMap>,
    merged: usize,
}

impl FillAggregator {
    pub fn new(geometry: VolumeGeometry) -> Self {
        Self {
            mask: BinaryMask::new(geometry),
            costs: None,
            merged: 0,
        }
    }

    /// Also track the minimum accumulated cost per voxel.
    pub fn with_cost_map(mut self) -> Self {
        self.costs = Some(CostMap::new(self.mask.geometry().clone()));
        self
    }

    /// Union one result into the mask.
    pub fn add(&mut self, result: &FillResult) -> Result<(), FillError> {
        let expected = self.mask.dims();
        if result.dims != expected {
            return Err(FillError::DimensionMismatch {
                expected,
                found: result.dims,
            });
        }
        for node in &result.nodes {
            self.mask.set(node.voxel);
            if let Some(costs) = self.costs.as_mut() {
                costs.offer(node.voxel, node.cost);
            }
        }
        self.merged += 1;
        Ok(())
    }

    /// Number of results merged so far.
    pub fn merged(&self) -> usize {
        self.merged
    }

    pub fn finish(self) -> (BinaryMask, Option<CostMap>) {
        debug!(
            "Merged {} fills into {} voxels",
            self.merged,
            self.mask.count()
        );
        (self.mask, self.costs)
    }
}

/// Union a set of fills into a binary mask with the given geometry.
pub fn merge_fills(geometry: &VolumeGeometry, results: &[FillResult]) -> Result<BinaryMask, FillError> {
    let mut agg = FillAggregator::new(geometry.clone());
    for r in results {
        agg.add(r)?;
    }
    Ok(agg.finish().0)
}

/// Minimum accumulated cost per voxel across a set of fills.
pub fn merge_costs(geometry: &VolumeGeometry, results: &[FillResult]) -> Result<CostMap, FillError> {
    let mut map = CostMap::new(geometry.clone());
    for r in results {
        if r.dims != geometry.dims {
            return Err(FillError::DimensionMismatch {
                expected: geometry.dims,
                found: r.dims,
            });
        }
        for node in &r.nodes {
            map.offer(node.voxel, node.cost);
        }
    }
    Ok(map)
}

/// Copy the volume's intensities inside the mask, zero outside
///
/// Multi-channel volumes keep every channel.
pub fn masked_intensity(volume: &Volume, mask: &BinaryMask) -> Result<Vec<f64>, FillError> {
    if volume.dims() != mask.dims() {
        return Err(FillError::DimensionMismatch {
            expected: mask.dims(),
            found: volume.dims(),
        });
    }
    let n = mask.data().len();
    let out = volume
        .data()
        .iter()
        .enumerate()
        .map(|(i, &v)| if mask.data()[i % n] != 0 { v } else { 0.0 })
        .collect();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fill::{FillStatus, Node};

    fn result(voxels: &[[usize; 3]], dims: (usize, usize, usize)) -> FillResult {
        FillResult {
            path_name: "test".into(),
            nodes: voxels
                .iter()
                .enumerate()
                .map(|(i, &voxel)| Node { voxel, cost: i as f64 * 0.1 })
                .collect(),
            extra: Vec::new(),
            status: FillStatus::Completed,
            threshold: 1.0,
            dims,
        }
    }

    #[test]
    fn test_union_not_sum() {
        let geom = VolumeGeometry::isotropic(4, 4, 4);
        let a = result(&[[0, 0, 0], [1, 0, 0], [2, 0, 0]], geom.dims);
        let b = result(&[[2, 0, 0], [3, 0, 0]], geom.dims);
        let mask = merge_fills(&geom, &[a, b]).unwrap();
        assert_eq!(mask.count(), 4);
        assert_eq!(mask.geometry(), &geom);
    }

    #[test]
    fn test_merge_idempotent() {
        let geom = VolumeGeometry::calibrated(5, 5, 5, (0.3, 0.3, 1.2), "micron");
        let results = vec![
            result(&[[1, 1, 1], [1, 2, 1]], geom.dims),
            result(&[[1, 2, 1], [4, 4, 4]], geom.dims),
        ];
        let m1 = merge_fills(&geom, &results).unwrap();
        let m2 = merge_fills(&geom, &results).unwrap();
        assert_eq!(m1, m2);
    }

    #[test]
    fn test_empty_results_give_empty_mask() {
        let geom = VolumeGeometry::isotropic(3, 3, 3);
        let mask = merge_fills(&geom, &[result(&[], geom.dims)]).unwrap();
        assert_eq!(mask.count(), 0);
        assert_eq!(mask.data().len(), 27);
    }

    #[test]
    fn test_dimension_mismatch() {
        let geom = VolumeGeometry::isotropic(3, 3, 3);
        let err = merge_fills(&geom, &[result(&[[0, 0, 0]], (4, 4, 4))]).unwrap_err();
        assert!(matches!(err, FillError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_cost_map_takes_minimum() {
        let geom = VolumeGeometry::isotropic(3, 1, 1);
        // Costs are 0.0, 0.1, 0.2 by position
        let a = result(&[[0, 0, 0], [1, 0, 0], [2, 0, 0]], geom.dims);
        let b = result(&[[2, 0, 0]], geom.dims);
        let map = merge_costs(&geom, &[a.clone(), b.clone()]).unwrap();
        assert_eq!(map.get([2, 0, 0]), Some(0.0));
        assert_eq!(map.get([1, 0, 0]), Some(0.1));

        let mut agg = FillAggregator::new(geom.clone()).with_cost_map();
        agg.add(&a).unwrap();
        agg.add(&b).unwrap();
        assert_eq!(agg.merged(), 2);
        let (mask, costs) = agg.finish();
        assert_eq!(mask.count(), 3);
        assert_eq!(costs.unwrap().get([2, 0, 0]), Some(0.0));
    }

    #[test]
    fn test_masked_intensity() {
        let geom = VolumeGeometry::isotropic(2, 1, 1).with_channels(2);
        let vol = Volume::new(geom.clone(), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mut mask = BinaryMask::new(geom);
        mask.set([1, 0, 0]);
        assert_eq!(masked_intensity(&vol, &mask).unwrap(), vec![0.0, 2.0, 0.0, 4.0]);
    }
}
