//! NIfTI volume input and mask output
//!
//! Loads calibrated intensity volumes from NIfTI-1 bytes (plain or gzipped)
//! and writes masks back out as lossless uint8 NIfTI with the source
//! geometry preserved: dimensions, channel axis, voxel sizes, spatial unit
//! and affine.

use std::io::{Cursor, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use ndarray::Array;
use nifti::volume::ndarray::IntoNdArray;
use nifti::{InMemNiftiObject, NiftiHeader, NiftiObject};

use crate::mask::BinaryMask;
use crate::volume::{AxisCalibration, AxisLabel, Volume, VolumeGeometry};

const DT_UINT8: i16 = 2;
const DT_FLOAT32: i16 = 16;

/// Check if bytes are gzip compressed
pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Get header info for diagnostics
fn get_header_info(bytes: &[u8]) -> String {
    if bytes.len() < 348 {
        return format!("File too small ({} bytes, need at least 348)", bytes.len());
    }

    let sizeof_hdr = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let magic = String::from_utf8_lossy(&bytes[344..348]).to_string();
    let datatype = i16::from_le_bytes([bytes[70], bytes[71]]);

    format!("sizeof_hdr={}, magic='{}', datatype={}", sizeof_hdr, magic, datatype)
}

/// Spatial unit name from the NIfTI `xyzt_units` code
fn unit_name(xyzt_units: u8) -> &'static str {
    match xyzt_units & 0x07 {
        1 => "meter",
        2 => "mm",
        3 => "micron",
        _ => "pixel",
    }
}

fn unit_code(unit: &str) -> u8 {
    match unit {
        "meter" | "m" => 1,
        "mm" => 2,
        "micron" | "um" | "µm" | "microns" => 3,
        _ => 0,
    }
}

fn parse_object(bytes: &[u8]) -> Result<InMemNiftiObject, String> {
    if is_gzip(bytes) {
        InMemNiftiObject::from_reader(GzDecoder::new(Cursor::new(bytes)))
            .map_err(|e| {
                let mut decoder = GzDecoder::new(Cursor::new(bytes));
                let mut decompressed = Vec::new();
                let info = if std::io::Read::read_to_end(&mut decoder, &mut decompressed).is_ok() {
                    get_header_info(&decompressed)
                } else {
                    "Could not decompress".to_string()
                };
                format!("Failed to read gzipped NIfTI: {} ({})", e, info)
            })
    } else {
        let info = get_header_info(bytes);
        InMemNiftiObject::from_reader(Cursor::new(bytes))
            .map_err(|e| format!("Failed to read NIfTI: {} ({})", e, info))
    }
}

/// Load a calibrated volume from NIfTI bytes
///
/// A fourth dimension is read as a channel axis. Intensities have the header
/// scaling applied.
pub fn load_volume(bytes: &[u8]) -> Result<Volume, String> {
    let obj = parse_object(bytes)?;
    let header = obj.header().clone();

    let ndim = header.dim[0] as usize;
    if ndim < 3 {
        return Err(format!("Expected at least 3D volume, got {}D", ndim));
    }

    let affine = get_affine(&header);
    let unit = unit_name(header.xyzt_units);
    let (vsx, vsy, vsz) = (
        header.pixdim[1] as f64,
        header.pixdim[2] as f64,
        header.pixdim[3] as f64,
    );

    let array: Array<f64, _> = obj
        .into_volume()
        .into_ndarray()
        .map_err(|e| format!("Failed to convert to ndarray: {}", e))?;

    // Use the actual array shape (nifti-rs may drop trailing singleton dims)
    let shape = array.shape().to_vec();
    if shape.len() < 3 {
        return Err(format!("Expected at least 3D array, got {}D", shape.len()));
    }
    let (nx, ny, nz) = (shape[0], shape[1], shape[2]);
    let channels = if shape.len() >= 4 { shape[3] } else { 1 };

    // Fortran order, channel slowest: index = x + y*nx + z*nx*ny + c*nx*ny*nz
    let mut data = Vec::with_capacity(nx * ny * nz * channels);
    if shape.len() == 3 {
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    data.push(array[[i, j, k]]);
                }
            }
        }
    } else {
        // Higher dimensions beyond the channel axis are not supported; take index 0
        let mut index = vec![0usize; shape.len()];
        for c in 0..channels {
            for k in 0..nz {
                for j in 0..ny {
                    for i in 0..nx {
                        index[0] = i;
                        index[1] = j;
                        index[2] = k;
                        index[3] = c;
                        data.push(array[index.as_slice()]);
                    }
                }
            }
        }
    }

    // Zero pixdim is common in hand-made files; treat as unit voxels
    let sanitize = |v: f64| if v.is_finite() && v > 0.0 { v } else { 1.0 };
    let mut axes = vec![
        AxisCalibration::new(AxisLabel::X, unit, sanitize(vsx)),
        AxisCalibration::new(AxisLabel::Y, unit, sanitize(vsy)),
        AxisCalibration::new(AxisLabel::Z, unit, sanitize(vsz)),
    ];
    if channels > 1 {
        axes.push(AxisCalibration::new(AxisLabel::Channel, "", 1.0));
    }

    let geometry = VolumeGeometry {
        dims: (nx, ny, nz),
        channels,
        axes,
        affine,
    };
    Volume::new(geometry, data)
}

/// Get affine transformation matrix from header
fn get_affine(header: &NiftiHeader) -> [f64; 16] {
    // Prefer sform if available (sform_code > 0)
    if header.sform_code > 0 {
        let s = &header.srow_x;
        let t = &header.srow_y;
        let u = &header.srow_z;
        [
            s[0] as f64, s[1] as f64, s[2] as f64, s[3] as f64,
            t[0] as f64, t[1] as f64, t[2] as f64, t[3] as f64,
            u[0] as f64, u[1] as f64, u[2] as f64, u[3] as f64,
            0.0, 0.0, 0.0, 1.0,
        ]
    } else {
        let vsx = header.pixdim[1] as f64;
        let vsy = header.pixdim[2] as f64;
        let vsz = header.pixdim[3] as f64;
        [
            vsx, 0.0, 0.0, 0.0,
            0.0, vsy, 0.0, 0.0,
            0.0, 0.0, vsz, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ]
    }
}

/// NIfTI-1 single-file header for a volume with the given geometry.
fn build_header(geometry: &VolumeGeometry, datatype: i16, bitpix: i16, cal_max: f32) -> Result<[u8; 348], String> {
    let (nx, ny, nz) = geometry.dims;
    let (vsx, vsy, vsz) = geometry.voxel_size();
    let channels = geometry.channels;

    for (name, n) in [("nx", nx), ("ny", ny), ("nz", nz), ("channels", channels)] {
        if n > i16::MAX as usize {
            return Err(format!("Dimension {}={} exceeds NIfTI-1 limit", name, n));
        }
    }

    let mut header = [0u8; 348];

    // sizeof_hdr = 348
    header[0..4].copy_from_slice(&348i32.to_le_bytes());

    // dim[0..7]
    let ndim: i16 = if channels > 1 { 4 } else { 3 };
    let dim: [i16; 8] = [ndim, nx as i16, ny as i16, nz as i16, channels as i16, 1, 1, 1];
    for (i, &d) in dim.iter().enumerate() {
        let offset = 40 + i * 2;
        header[offset..offset + 2].copy_from_slice(&d.to_le_bytes());
    }

    header[70..72].copy_from_slice(&datatype.to_le_bytes());
    header[72..74].copy_from_slice(&bitpix.to_le_bytes());

    // pixdim[0..7]
    let pixdim: [f32; 8] = [1.0, vsx as f32, vsy as f32, vsz as f32, 1.0, 1.0, 1.0, 1.0];
    for (i, &p) in pixdim.iter().enumerate() {
        let offset = 76 + i * 4;
        header[offset..offset + 4].copy_from_slice(&p.to_le_bytes());
    }

    // vox_offset = 352 (header + 4 bytes extension)
    header[108..112].copy_from_slice(&352.0f32.to_le_bytes());

    // scl_slope = 1.0, scl_inter = 0.0
    header[112..116].copy_from_slice(&1.0f32.to_le_bytes());
    header[116..120].copy_from_slice(&0.0f32.to_le_bytes());

    // xyzt_units
    header[123] = unit_code(geometry.spatial_unit());

    // cal_max / cal_min for display range
    header[124..128].copy_from_slice(&cal_max.to_le_bytes());

    // sform_code = 1 (scanner anat)
    header[254..256].copy_from_slice(&1i16.to_le_bytes());

    // srow_x, srow_y, srow_z
    let affine = &geometry.affine;
    for row in 0..3 {
        for col in 0..4 {
            let offset = 280 + row * 16 + col * 4;
            header[offset..offset + 4].copy_from_slice(&(affine[row * 4 + col] as f32).to_le_bytes());
        }
    }

    // magic = "n+1\0" for NIfTI-1 single file
    header[344..348].copy_from_slice(b"n+1\0");

    Ok(header)
}

fn assemble(header: &[u8; 348], payload: &[u8]) -> Result<Vec<u8>, String> {
    let mut buffer = Vec::with_capacity(352 + payload.len());
    buffer.write_all(header).map_err(|e| format!("Write header failed: {}", e))?;
    // Extension (4 bytes, all zeros = no extension)
    buffer.write_all(&[0u8; 4]).map_err(|e| format!("Write extension failed: {}", e))?;
    buffer.write_all(payload).map_err(|e| format!("Write data failed: {}", e))?;
    Ok(buffer)
}

/// Encode a binary mask as uint8 NIfTI bytes
///
/// The mask is replicated across every channel of its geometry.
pub fn save_mask(mask: &BinaryMask) -> Result<Vec<u8>, String> {
    let header = build_header(mask.geometry(), DT_UINT8, 8, 1.0)?;
    assemble(&header, &mask.to_volume_layout())
}

/// Encode a spatial float map (cost map, masked intensities) as float32 NIfTI bytes
///
/// `data` may hold one spatial volume or one per channel of `geometry`.
pub fn save_map(data: &[f64], geometry: &VolumeGeometry) -> Result<Vec<u8>, String> {
    let mut geometry = geometry.clone();
    if data.len() == geometry.spatial_len() {
        geometry = geometry.with_channels(1);
    } else if data.len() != geometry.len() {
        return Err(format!(
            "Map has {} values, expected {} or {}",
            data.len(), geometry.spatial_len(), geometry.len()
        ));
    }
    let header = build_header(&geometry, DT_FLOAT32, 32, 0.0)?;
    let mut payload = Vec::with_capacity(data.len() * 4);
    for &val in data {
        payload.extend_from_slice(&(val as f32).to_le_bytes());
    }
    assemble(&header, &payload)
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(bytes)
        .map_err(|e| format!("Gzip compression failed: {}", e))?;
    encoder.finish().map_err(|e| format!("Gzip finish failed: {}", e))
}

fn write_bytes(path: &Path, bytes: Vec<u8>) -> Result<(), String> {
    let bytes = if path.to_string_lossy().ends_with(".gz") {
        gzip(&bytes)?
    } else {
        bytes
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create directory '{}': {}", parent.display(), e))?;
        }
    }
    std::fs::write(path, &bytes)
        .map_err(|e| format!("Failed to write file '{}': {}", path.display(), e))
}

/// Read a volume from a filesystem path
///
/// The content is decoded as NIfTI whatever the extension; gzip is auto-detected.
pub fn read_volume_file(path: &Path) -> Result<Volume, String> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("Failed to read file '{}': {}", path.display(), e))?;
    load_volume(&bytes)
}

/// Save a mask to a file, gzip compressed when the path ends with `.gz`.
pub fn save_mask_to_file(path: &Path, mask: &BinaryMask) -> Result<(), String> {
    write_bytes(path, save_mask(mask)?)
}

/// Save a float map to a file, gzip compressed when the path ends with `.gz`.
pub fn save_map_to_file(path: &Path, data: &[f64], geometry: &VolumeGeometry) -> Result<(), String> {
    write_bytes(path, save_map(data, geometry)?)
}

/// Encode a volume as float32 NIfTI bytes.
pub fn save_volume(volume: &Volume) -> Result<Vec<u8>, String> {
    save_map(volume.data(), volume.geometry())
}
