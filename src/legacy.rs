//! Grid persistence and legacy-format conversion.
//!
//! Grids are written as a one-byte format version followed by a
//! [`bincode`]-encoded payload. The version byte sits outside the payload
//! so readers can reject unknown formats before deserializing anything.
//!
//! [`convert_face_displacements`] upgrades the historical face-level
//! layout, where one displacement grid covered a whole quad in the face's
//! own parameterization, into the per-corner grids used everywhere else.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::debug;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grids::{DisplacementGrid, GridStore, MaskGrid};
use crate::mesh::{BaseMesh, Vector};
use crate::subdiv::grid_side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
enum FileVersion {
    V1 = 1,
}

#[derive(Serialize, Deserialize)]
struct StoredGrid {
    side: u32,
    data: Vec<[f32; 3]>,
}

#[derive(Serialize, Deserialize)]
struct StoredMask {
    side: u32,
    data: Vec<f32>,
}

#[derive(Serialize, Deserialize)]
struct GridFile {
    level: u8,
    grids: Vec<StoredGrid>,
    masks: Option<Vec<StoredMask>>,
}

/// Serialize a grid store, including mask grids when present.
pub fn save_grids<W: Write>(mut writer: W, store: &GridStore) -> Result<()> {
    let file = GridFile {
        level: store.level(),
        grids: (0..store.grid_count())
            .map(|index| {
                let grid = store.grid(index);
                StoredGrid {
                    side: grid.side(),
                    data: grid.data().iter().map(|v| [v.x, v.y, v.z]).collect(),
                }
            })
            .collect(),
        masks: store.mask_grids().map(|masks| {
            masks
                .iter()
                .map(|mask| StoredMask {
                    side: mask.side(),
                    data: mask.data().to_vec(),
                })
                .collect()
        }),
    };
    writer.write_all(&[FileVersion::V1.into()])?;
    bincode::serialize_into(writer, &file)
        .map_err(|error| Error::Serialization(error.to_string()))
}

/// Deserialize a grid store written by [`save_grids`].
pub fn load_grids<R: Read>(mut reader: R) -> Result<GridStore> {
    let mut version = [0u8; 1];
    reader.read_exact(&mut version)?;
    FileVersion::try_from(version[0]).map_err(|_| Error::UnsupportedVersion(version[0]))?;
    let file: GridFile = bincode::deserialize_from(reader)
        .map_err(|error| Error::Serialization(error.to_string()))?;

    let side = grid_side(file.level);
    let mut grids = Vec::with_capacity(file.grids.len());
    for stored in &file.grids {
        if stored.side != side || stored.data.len() != (side * side) as usize {
            return Err(Error::Serialization(format!(
                "grid sized {} does not match level {}",
                stored.side, file.level
            )));
        }
        let mut grid = DisplacementGrid::new(side);
        for y in 0..side {
            for x in 0..side {
                let v = stored.data[(y * side + x) as usize];
                grid.set_value(x, y, Vector::new(v[0], v[1], v[2]));
            }
        }
        grids.push(grid);
    }
    let masks = match file.masks {
        Some(stored_masks) => {
            if stored_masks.len() != grids.len() {
                return Err(Error::Serialization(format!(
                    "{} mask grids for {} displacement grids",
                    stored_masks.len(),
                    grids.len()
                )));
            }
            let mut masks = Vec::with_capacity(stored_masks.len());
            for stored in &stored_masks {
                if stored.side != side || stored.data.len() != (side * side) as usize {
                    return Err(Error::Serialization(format!(
                        "mask grid sized {} does not match level {}",
                        stored.side, file.level
                    )));
                }
                let mut mask = MaskGrid::new(side);
                for y in 0..side {
                    for x in 0..side {
                        mask.set_value(x, y, stored.data[(y * side + x) as usize]);
                    }
                }
                masks.push(mask);
            }
            Some(masks)
        }
        None => None,
    };
    debug!("loaded {} grids at level {}", grids.len(), file.level);
    Ok(GridStore::from_parts(file.level, grids, masks))
}

/// [`save_grids`] to a file path.
pub fn save_grids_to_path<P: AsRef<Path>>(path: P, store: &GridStore) -> Result<()> {
    save_grids(BufWriter::new(File::create(path)?), store)
}

/// [`load_grids`] from a file path.
pub fn load_grids_from_path<P: AsRef<Path>>(path: P) -> Result<GridStore> {
    load_grids(BufReader::new(File::open(path)?))
}

/// One whole-face displacement grid in the legacy layout: row-major with
/// `side * side` samples over the face's own `(u, v)` parameterization,
/// displacement axes aligned to that parameterization.
#[derive(Debug, Clone)]
pub struct FaceDisplacement {
    pub side: u32,
    pub data: Vec<[f32; 3]>,
}

impl FaceDisplacement {
    fn to_grid(&self) -> DisplacementGrid {
        let mut grid = DisplacementGrid::new(self.side);
        for y in 0..self.side {
            for x in 0..self.side {
                let d = self.data[(y * self.side + x) as usize];
                grid.set_value(x, y, Vector::new(d[0], d[1], d[2]));
            }
        }
        grid
    }
}

/// Convert legacy whole-face displacement (`faces`, one entry per base
/// face) into a per-corner grid store at `level`.
///
/// Quads split into four corner grids; each samples its quarter of the face
/// grid bilinearly and rotates the tangential displacement components into
/// the corner's frame. Non-quad faces predate per-corner storage and carry
/// no reliable parameterization, so every corner samples with the
/// corner-0 mapping and unrotated axes.
pub fn convert_face_displacements(
    base: &BaseMesh,
    faces: &[FaceDisplacement],
    level: u8,
) -> Result<GridStore> {
    if faces.len() != base.face_count() {
        return Err(Error::TopologyMismatch {
            stored: faces.len(),
            expected: base.face_count(),
        });
    }
    for face in faces {
        if face.data.len() != (face.side * face.side) as usize {
            return Err(Error::InvalidTopology(format!(
                "face displacement data length {} does not match side {}",
                face.data.len(),
                face.side
            )));
        }
    }

    let side = grid_side(level);
    let mut store = GridStore::allocate(base.corner_count(), level, false);
    let mut corner_base = 0usize;
    for (face_index, face) in faces.iter().enumerate() {
        let arity = base.vertices_per_face()[face_index];
        let source = face.to_grid();
        let source_max = (face.side - 1) as f32;
        for corner in 0..arity {
            let grid = store.grid_mut(corner_base + corner as usize);
            let corner = if arity == 4 { corner } else { 0 };
            for y in 0..side {
                for x in 0..side {
                    // Normalized grid coordinates, 0 at the face center.
                    let gx = if side == 1 { 0.0 } else { x as f32 / (side - 1) as f32 };
                    let gy = if side == 1 { 0.0 } else { y as f32 / (side - 1) as f32 };
                    let (u, v) = match corner {
                        0 => (0.5 * (1.0 - gx), 0.5 * (1.0 - gy)),
                        1 => (0.5 + 0.5 * gy, 0.5 - 0.5 * gx),
                        2 => (0.5 + 0.5 * gx, 0.5 + 0.5 * gy),
                        _ => (0.5 - 0.5 * gy, 0.5 + 0.5 * gx),
                    };
                    let d = source.bilinear(u * source_max, v * source_max);
                    // Tangential components rotate with the parameter
                    // mapping; the normal component is shared.
                    let rotated = match corner {
                        0 => Vector::new(-d.x, -d.y, d.z),
                        1 => Vector::new(-d.y, d.x, d.z),
                        2 => Vector::new(d.x, d.y, d.z),
                        _ => Vector::new(d.y, -d.x, d.z),
                    };
                    grid.set_value(x, y, rotated);
                }
            }
        }
        corner_base += arity as usize;
    }
    debug!(
        "converted {} face displacements into {} corner grids at level {}",
        faces.len(),
        store.grid_count(),
        level
    );
    Ok(store)
}
