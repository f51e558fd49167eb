//! Traced centerlines and SNT `.traces` files
//!
//! A `.traces` file is XML, optionally gzip compressed:
//!
//! ```text
//! <tracings>
//!   <samplespacing x="0.2" y="0.2" z="1.0" units="micron"/>
//!   <imagesize width="512" height="512" depth="40"/>
//!   <path id="0" name="Path (0)">
//!     <point x="10" y="12" z="3" xd="2.0" yd="2.4" zd="3.0"/>
//!   </path>
//! </tracings>
//! ```
//!
//! Integer `x`/`y`/`z` are voxel coordinates. Files that only carry the
//! physical `xd`/`yd`/`zd` are mapped back through the sample spacing.

use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::nifti_io::is_gzip;

/// One traced centerline segment in voxel coordinates (sub-voxel precision).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TracePath {
    pub id: i64,
    pub name: String,
    pub points: Vec<[f64; 3]>,
}

impl TracePath {
    pub fn new(id: i64, name: impl Into<String>, points: Vec<[f64; 3]>) -> Self {
        Self {
            id,
            name: name.into(),
            points,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

/// All paths of one traced skeleton.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tree {
    pub paths: Vec<TracePath>,
    /// Sample spacing declared by the file (x, y, z)
    pub spacing: (f64, f64, f64),
    pub units: String,
    /// Image size declared by the file, if any
    pub image_size: Option<(usize, usize, usize)>,
}

impl Tree {
    pub fn total_points(&self) -> usize {
        self.paths.iter().map(|p| p.len()).sum()
    }
}

/// Read a `.traces` file from disk.
pub fn read_traces_file(path: &Path) -> Result<Tree, String> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("Failed to read file '{}': {}", path.display(), e))?;
    load_traces(&bytes)
}

/// Parse `.traces` bytes; gzip is auto-detected.
pub fn load_traces(bytes: &[u8]) -> Result<Tree, String> {
    let text = if is_gzip(bytes) {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = String::new();
        decoder
            .read_to_string(&mut out)
            .map_err(|e| format!("Failed to decompress traces: {}", e))?;
        out
    } else {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| format!("Traces file is not valid UTF-8: {}", e))?
    };
    parse_traces(&text)
}

/// Point as written in the file, before spacing is applied.
struct RawPoint {
    voxel: Option<[f64; 3]>,
    physical: Option<[f64; 3]>,
}

struct RawPath {
    id: i64,
    name: String,
    points: Vec<RawPoint>,
}

/// Parse the XML body of a `.traces` file.
pub fn parse_traces(text: &str) -> Result<Tree, String> {
    let mut reader = Reader::from_str(text);

    let mut spacing = (1.0, 1.0, 1.0);
    let mut units = String::new();
    let mut image_size = None;
    let mut raw_paths: Vec<RawPath> = Vec::new();
    let mut current: Option<RawPath> = None;
    let mut saw_root = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("Malformed traces XML at byte {}: {}", reader.buffer_position(), e))?;
        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.name().as_ref() {
                    b"tracings" => saw_root = true,
                    b"samplespacing" => {
                        spacing = (
                            attr_f64(e, b"x")?.unwrap_or(1.0),
                            attr_f64(e, b"y")?.unwrap_or(1.0),
                            attr_f64(e, b"z")?.unwrap_or(1.0),
                        );
                        units = attr_string(e, b"units")?.unwrap_or_default();
                    }
                    b"imagesize" => {
                        let w = attr_f64(e, b"width")?;
                        let h = attr_f64(e, b"height")?;
                        let d = attr_f64(e, b"depth")?;
                        if let (Some(w), Some(h), Some(d)) = (w, h, d) {
                            image_size = Some((w as usize, h as usize, d as usize));
                        }
                    }
                    b"path" => {
                        let path = RawPath {
                            id: attr_f64(e, b"id")?.map(|v| v as i64).unwrap_or(raw_paths.len() as i64),
                            name: attr_string(e, b"name")?
                                .unwrap_or_else(|| format!("Path ({})", raw_paths.len())),
                            points: Vec::new(),
                        };
                        if is_empty {
                            raw_paths.push(path);
                        } else {
                            current = Some(path);
                        }
                    }
                    b"point" => {
                        if let Some(path) = current.as_mut() {
                            path.points.push(read_point(e)?);
                        }
                    }
                    _ => {}
                }
            }
            Event::End(ref e) => {
                if e.name().as_ref() == b"path" {
                    if let Some(path) = current.take() {
                        raw_paths.push(path);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err("Traces file has no <tracings> element".to_string());
    }

    let paths = raw_paths
        .into_iter()
        .map(|raw| resolve_path(raw, spacing))
        .collect::<Result<Vec<_>, String>>()?;

    Ok(Tree {
        paths,
        spacing,
        units,
        image_size,
    })
}

fn resolve_path(raw: RawPath, spacing: (f64, f64, f64)) -> Result<TracePath, String> {
    let (sx, sy, sz) = spacing;
    let mut points = Vec::with_capacity(raw.points.len());
    for (i, p) in raw.points.into_iter().enumerate() {
        let coord = match (p.voxel, p.physical) {
            (Some(v), _) => v,
            (None, Some([xd, yd, zd])) => [xd / sx, yd / sy, zd / sz],
            (None, None) => {
                return Err(format!("Point {} of path '{}' has no coordinates", i, raw.name));
            }
        };
        points.push(coord);
    }
    Ok(TracePath::new(raw.id, raw.name, points))
}

fn read_point(e: &BytesStart) -> Result<RawPoint, String> {
    let voxel = match (attr_f64(e, b"x")?, attr_f64(e, b"y")?, attr_f64(e, b"z")?) {
        (Some(x), Some(y), Some(z)) => Some([x, y, z]),
        _ => None,
    };
    let physical = match (attr_f64(e, b"xd")?, attr_f64(e, b"yd")?, attr_f64(e, b"zd")?) {
        (Some(x), Some(y), Some(z)) => Some([x, y, z]),
        _ => None,
    };
    Ok(RawPoint { voxel, physical })
}

fn attr_string(e: &BytesStart, key: &[u8]) -> Result<Option<String>, String> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| format!("Bad attribute: {}", err))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|err| format!("Bad attribute value: {}", err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn attr_f64(e: &BytesStart, key: &[u8]) -> Result<Option<f64>, String> {
    match attr_string(e, key)? {
        Some(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("Attribute '{}' is not a number: '{}'", String::from_utf8_lossy(key), s)),
        None => Ok(None),
    }
}
