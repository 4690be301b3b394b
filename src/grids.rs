//! Displacement grid storage.
//!
//! The [`GridStore`] maps every base-face corner to one
//! [`DisplacementGrid`]: a square, row-major grid of tangent-space offset
//! vectors, stored at the modifier's total level. Offsets are relative to a
//! sample's local `(tangent-u, tangent-v, normal)` frame rather than world
//! coordinates, so they remain valid under mesh deformation.
//!
//! A parallel set of scalar [`MaskGrid`]s can be allocated for sculpt/paint
//! masking; the mask grids always share the displacement resolution.

use std::collections::HashMap;

use log::{debug, trace};
use ultraviolet::mat::Mat3;

use crate::mesh::Vector;
use crate::subdiv::{grid_side, SubdivisionEvaluator};

static EPSILON: f32 = 0.00000001;

/// A square grid of displacement vectors for one base-face corner.
#[derive(Debug, Clone)]
pub struct DisplacementGrid {
    side: u32,
    data: Vec<Vector>,
}

impl DisplacementGrid {
    /// A zero-initialized grid.
    pub fn new(side: u32) -> Self {
        Self {
            side,
            data: vec![Vector::zero(); (side * side) as usize],
        }
    }

    #[inline]
    pub fn side(&self) -> u32 {
        self.side
    }

    #[inline]
    pub fn value(&self, x: u32, y: u32) -> Vector {
        debug_assert!(x < self.side && y < self.side);
        self.data[(y * self.side + x) as usize]
    }

    #[inline]
    pub fn set_value(&mut self, x: u32, y: u32, value: Vector) {
        debug_assert!(x < self.side && y < self.side);
        self.data[(y * self.side + x) as usize] = value;
    }

    #[inline]
    pub(crate) fn data(&self) -> &[Vector] {
        &self.data
    }

    /// Bilinear resampling onto a grid of `new_side`. Coincident sample
    /// points are preserved exactly: doubling maps old `(x, y)` onto
    /// `(2x, 2y)`, halving keeps every other sample.
    pub fn resampled(&self, new_side: u32) -> Self {
        let mut out = Self::new(new_side);
        if new_side == self.side {
            out.data.copy_from_slice(&self.data);
            return out;
        }
        // A side-1 grid holds only the face-center sample `(0, 0)`, which
        // is the coincident point in both directions.
        if new_side == 1 {
            out.set_value(0, 0, self.value(0, 0));
            return out;
        }
        if self.side == 1 {
            out.data.fill(self.value(0, 0));
            return out;
        }
        let scale = (self.side - 1) as f32 / (new_side - 1) as f32;
        for y in 0..new_side {
            for x in 0..new_side {
                let value = self.bilinear(x as f32 * scale, y as f32 * scale);
                out.set_value(x, y, value);
            }
        }
        out
    }

    /// Sample at fractional grid units (`0..=side-1`).
    pub(crate) fn bilinear(&self, u: f32, v: f32) -> Vector {
        if self.side == 1 {
            return self.value(0, 0);
        }
        let max = (self.side - 1) as f32;
        let u = u.clamp(0.0, max);
        let v = v.clamp(0.0, max);
        let x0 = (u.floor() as u32).min(self.side - 2);
        let y0 = (v.floor() as u32).min(self.side - 2);
        let fu = u - x0 as f32;
        let fv = v - y0 as f32;
        let a = self.value(x0, y0);
        let b = self.value(x0 + 1, y0);
        let c = self.value(x0, y0 + 1);
        let d = self.value(x0 + 1, y0 + 1);
        // Exact at lattice points: interpolation weights vanish there.
        (a * (1.0 - fu) + b * fu) * (1.0 - fv) + (c * (1.0 - fu) + d * fu) * fv
    }

    /// Doubling that leaves every new sample at zero; used by plain linear
    /// subdivision where added detail must not be invented.
    fn zero_extended(&self, new_side: u32) -> Self {
        let mut out = Self::new(new_side);
        if self.side == 1 {
            out.set_value(0, 0, self.value(0, 0));
            return out;
        }
        let step = (new_side - 1) / (self.side - 1);
        for y in 0..self.side {
            for x in 0..self.side {
                out.set_value(x * step, y * step, self.value(x, y));
            }
        }
        out
    }
}

/// A square grid of scalar paint-mask weights for one base-face corner.
#[derive(Debug, Clone)]
pub struct MaskGrid {
    side: u32,
    data: Vec<f32>,
}

impl MaskGrid {
    pub fn new(side: u32) -> Self {
        Self {
            side,
            data: vec![0.0; (side * side) as usize],
        }
    }

    #[inline]
    pub fn side(&self) -> u32 {
        self.side
    }

    #[inline]
    pub fn value(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.side + x) as usize]
    }

    #[inline]
    pub fn set_value(&mut self, x: u32, y: u32, value: f32) {
        self.data[(y * self.side + x) as usize] = value;
    }

    #[inline]
    pub(crate) fn data(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn resampled(&self, new_side: u32) -> Self {
        let mut out = Self::new(new_side);
        if new_side == self.side {
            out.data.copy_from_slice(&self.data);
            return out;
        }
        if new_side == 1 {
            out.set_value(0, 0, self.value(0, 0));
            return out;
        }
        if self.side == 1 {
            out.data.fill(self.value(0, 0));
            return out;
        }
        let scale = (self.side - 1) as f32 / (new_side - 1) as f32;
        for y in 0..new_side {
            for x in 0..new_side {
                let u = x as f32 * scale;
                let v = y as f32 * scale;
                let x0 = (u.floor() as u32).min(self.side - 2);
                let y0 = (v.floor() as u32).min(self.side - 2);
                let fu = u - x0 as f32;
                let fv = v - y0 as f32;
                let a = self.value(x0, y0);
                let b = self.value(x0 + 1, y0);
                let c = self.value(x0, y0 + 1);
                let d = self.value(x0 + 1, y0 + 1);
                out.set_value(
                    x,
                    y,
                    (a * (1.0 - fu) + b * fu) * (1.0 - fv) + (c * (1.0 - fu) + d * fu) * fv,
                );
            }
        }
        out
    }
}

/// How [`GridStore::change_level`] fills samples that have no coincident
/// source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleMode {
    /// Bilinear interpolation of the surrounding stored samples.
    Interpolate,
    /// Leave new samples at zero displacement.
    ZeroFill,
}

/// Owns one displacement grid per base-face corner, plus optional parallel
/// mask grids. Grid memory is exclusively owned here; evaluated meshes are
/// always copies.
#[derive(Debug, Clone)]
pub struct GridStore {
    level: u8,
    grids: Vec<DisplacementGrid>,
    masks: Option<Vec<MaskGrid>>,
}

impl GridStore {
    /// Create zero-initialized grids sized for `level`, one per corner.
    /// Replaces any existing grids.
    pub fn allocate(corner_count: usize, level: u8, with_masks: bool) -> Self {
        let side = grid_side(level);
        debug!(
            "allocating {} displacement grids at level {} (side {})",
            corner_count, level, side
        );
        Self {
            level,
            grids: (0..corner_count).map(|_| DisplacementGrid::new(side)).collect(),
            masks: with_masks
                .then(|| (0..corner_count).map(|_| MaskGrid::new(side)).collect()),
        }
    }

    #[inline]
    pub fn level(&self) -> u8 {
        self.level
    }

    #[inline]
    pub fn grid_count(&self) -> usize {
        self.grids.len()
    }

    #[inline]
    pub fn grid_side(&self) -> u32 {
        grid_side(self.level)
    }

    #[inline]
    pub fn grid(&self, index: usize) -> &DisplacementGrid {
        &self.grids[index]
    }

    #[inline]
    pub fn grid_mut(&mut self, index: usize) -> &mut DisplacementGrid {
        &mut self.grids[index]
    }

    #[inline]
    pub fn has_masks(&self) -> bool {
        self.masks.is_some()
    }

    #[inline]
    pub fn mask(&self, index: usize) -> Option<&MaskGrid> {
        self.masks.as_ref().map(|masks| &masks[index])
    }

    #[inline]
    pub fn mask_mut(&mut self, index: usize) -> Option<&mut MaskGrid> {
        self.masks.as_mut().map(|masks| &mut masks[index])
    }

    pub(crate) fn grids(&self) -> &[DisplacementGrid] {
        &self.grids
    }

    pub(crate) fn mask_grids(&self) -> Option<&[MaskGrid]> {
        self.masks.as_deref()
    }

    pub(crate) fn into_grids(self) -> Vec<DisplacementGrid> {
        self.grids
    }

    pub(crate) fn from_parts(
        level: u8,
        grids: Vec<DisplacementGrid>,
        masks: Option<Vec<MaskGrid>>,
    ) -> Self {
        Self { level, grids, masks }
    }

    /// Resample every grid onto the resolution of `new_level`. A no-op when
    /// the level is unchanged. Stored detail at coincident sample points
    /// survives exactly; detail beyond the new resolution is discarded.
    pub fn change_level(&mut self, new_level: u8, mode: ResampleMode) {
        if new_level == self.level {
            return;
        }
        let new_side = grid_side(new_level);
        trace!(
            "resampling {} grids: level {} -> {} ({:?})",
            self.grids.len(),
            self.level,
            new_level,
            mode
        );
        for grid in self.grids.iter_mut() {
            *grid = match mode {
                ResampleMode::Interpolate => grid.resampled(new_side),
                ResampleMode::ZeroFill if new_side > grid.side() => grid.zero_extended(new_side),
                ResampleMode::ZeroFill => grid.resampled(new_side),
            };
        }
        if let Some(masks) = self.masks.as_mut() {
            for mask in masks.iter_mut() {
                *mask = mask.resampled(new_side);
            }
        }
        self.level = new_level;
    }

    /// Uniformly rescale every displacement vector, e.g. after an object
    /// scale change.
    pub fn scale(&mut self, factor: f32) {
        for grid in self.grids.iter_mut() {
            for value in grid.data.iter_mut() {
                *value *= factor;
            }
        }
    }

    /// Reset all displacement (and leave masks untouched).
    pub fn zero_displacement(&mut self) {
        for grid in self.grids.iter_mut() {
            for value in grid.data.iter_mut() {
                *value = Vector::zero();
            }
        }
    }

    /// Reconcile duplicated samples along shared grid boundaries so
    /// adjacent grids do not show cracks after independent edits.
    ///
    /// Interior points are never touched. Samples shared by exactly two
    /// grids (edge runs) are reconciled first, then the multi-grid corner
    /// points (face centers, edge midpoints, vertex points), so corners are
    /// never blended twice. Agreement is established on the world-space
    /// offset; each grid stores the result back through its own tangent
    /// frame.
    pub fn stitch(&mut self, evaluator: &SubdivisionEvaluator) {
        debug_assert_eq!(evaluator.level(), self.level);
        debug_assert_eq!(evaluator.grid_count(), self.grid_count());
        let side = self.grid_side();
        if side < 2 {
            return;
        }

        let mut shared: HashMap<u32, Vec<(usize, u32, u32)>> = HashMap::new();
        for grid in 0..self.grid_count() {
            let index_grid = evaluator.topology().index_grid(grid);
            for y in 0..side {
                for x in 0..side {
                    if x != 0 && y != 0 && x != side - 1 && y != side - 1 {
                        continue;
                    }
                    shared
                        .entry(index_grid.index(x, y))
                        .or_default()
                        .push((grid, x, y));
                }
            }
        }

        let mut groups: Vec<_> = shared
            .into_iter()
            .filter(|(_, occurrences)| occurrences.len() > 1)
            .collect();
        // Deterministic order, edges before corners.
        groups.sort_unstable_by_key(|(vertex, occurrences)| (occurrences.len() > 2, *vertex));

        for (_, occurrences) in groups {
            let mut world = Vector::zero();
            let mut frames = Vec::with_capacity(occurrences.len());
            for &(grid, x, y) in &occurrences {
                let sample = evaluator.sample(grid, x, y);
                let matrix =
                    construct_tangent_matrix(sample.du, sample.dv, evaluator.ptex_corner(grid));
                world += matrix * self.grids[grid].value(x, y);
                frames.push(matrix);
            }
            world /= occurrences.len() as f32;
            for (&(grid, x, y), matrix) in occurrences.iter().zip(&frames) {
                self.grids[grid].set_value(x, y, invert_matrix(matrix) * world);
            }
        }
    }
}

/// For given partial derivatives of a ptex face, get the tangent matrix for
/// displacement.
///
/// The corner needs to be known to properly "rotate" the partial
/// derivatives when the matrix is being constructed for a quad. For
/// non-quads the corner is to be set to 0.
pub fn construct_tangent_matrix(du: Vector, dv: Vector, corner: u32) -> Mat3 {
    let (tangent_u, tangent_v) = match corner {
        0 => (-dv, -du),
        1 => (du, -dv),
        2 => (dv, du),
        _ => (-du, dv),
    };
    Mat3::new(
        safe_normalized(tangent_u),
        safe_normalized(tangent_v),
        safe_normalized(du.cross(dv)),
    )
}

/// `world = base + d.x * tangent_u + d.y * tangent_v + d.z * normal`.
#[inline]
pub fn apply_displacement(base: Vector, tangent_matrix: &Mat3, displacement: Vector) -> Vector {
    base + *tangent_matrix * displacement
}

/// Inverse via the adjugate; the tangent matrix is not orthonormal in
/// general, so a transpose is not enough.
pub(crate) fn invert_matrix(m: &Mat3) -> Mat3 {
    let [a, b, c] = m.cols;
    let r0 = b.cross(c);
    let r1 = c.cross(a);
    let r2 = a.cross(b);
    let det = a.dot(r0);
    if det.abs() < EPSILON {
        return Mat3::identity();
    }
    // Rows of the inverse are the scaled cross products.
    Mat3::new(
        Vector::new(r0.x, r1.x, r2.x) / det,
        Vector::new(r0.y, r1.y, r2.y) / det,
        Vector::new(r0.z, r1.z, r2.z) / det,
    )
}

#[inline]
fn safe_normalized(v: Vector) -> Vector {
    let mag_sq = v.mag_sq();
    if mag_sq < EPSILON {
        Vector::zero()
    } else {
        v / mag_sq.sqrt()
    }
}
