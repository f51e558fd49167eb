//! Common test utilities for neurite-fill integration tests

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Arc;

use neurite_fill::cost::{CostConfig, CostField};
use neurite_fill::fill::{FillConfig, FillEngine};
use neurite_fill::nifti_io::save_volume;
use neurite_fill::volume::{IntensityBounds, Volume, VolumeGeometry, Voxel};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Volume filled with `background`, with every voxel in `bright` set to `foreground`.
pub fn volume_with(
    dims: (usize, usize, usize),
    background: f64,
    foreground: f64,
    bright: &[Voxel],
) -> Volume {
    let geom = VolumeGeometry::isotropic(dims.0, dims.1, dims.2);
    let mut data = vec![background; geom.len()];
    for &v in bright {
        data[geom.index(v)] = foreground;
    }
    Volume::new(geom, data).unwrap()
}

/// Voxels of the axis-aligned cube of side `2*half+1` around `center`.
pub fn cube(center: Voxel, half: usize) -> Vec<Voxel> {
    let mut out = Vec::new();
    for z in center[2] - half..=center[2] + half {
        for y in center[1] - half..=center[1] + half {
            for x in center[0] - half..=center[0] + half {
                out.push([x, y, z]);
            }
        }
    }
    out
}

/// 10x10x10 background of 100 with a 3x3x3 cube of 200 around (5, 5, 5).
pub fn bright_cube() -> Volume {
    volume_with((10, 10, 10), 100.0, 200.0, &cube([5, 5, 5], 1))
}

/// Dark volume with a bright run of voxels along x at (y, z) = (1, 1).
pub fn bright_line(nx: usize, from: usize, to: usize) -> Volume {
    let line: Vec<Voxel> = (from..=to).map(|x| [x, 1, 1]).collect();
    volume_with((nx, 3, 3), 0.0, 255.0, &line)
}

pub fn engine(volume: &Volume, config: FillConfig) -> Arc<FillEngine> {
    engine_with_bounds(volume, None, config)
}

pub fn engine_with_bounds(
    volume: &Volume,
    bounds: Option<IntensityBounds>,
    config: FillConfig,
) -> Arc<FillEngine> {
    let cost = CostConfig {
        bounds,
        ..CostConfig::default()
    };
    let field = CostField::build(volume, &cost).unwrap();
    Arc::new(FillEngine::new(Arc::new(field), volume.geometry().voxel_size(), config).unwrap())
}

/// `.traces` XML with one `<path>` per entry, points in voxel coordinates.
pub fn traces_xml(paths: &[(&str, Vec<[f64; 3]>)]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<tracings>\n");
    xml.push_str("  <samplespacing x=\"1.0\" y=\"1.0\" z=\"1.0\" units=\"pixel\"/>\n");
    for (id, (name, points)) in paths.iter().enumerate() {
        xml.push_str(&format!("  <path id=\"{}\" name=\"{}\">\n", id, name));
        for p in points {
            xml.push_str(&format!(
                "    <point x=\"{}\" y=\"{}\" z=\"{}\"/>\n",
                p[0], p[1], p[2]
            ));
        }
        xml.push_str("  </path>\n");
    }
    xml.push_str("</tracings>\n");
    xml
}

pub fn write_volume(path: &Path, volume: &Volume) {
    fs::write(path, save_volume(volume).unwrap()).unwrap();
}

pub fn write_traces(path: &Path, paths: &[(&str, Vec<[f64; 3]>)]) {
    fs::write(path, traces_xml(paths)).unwrap();
}
