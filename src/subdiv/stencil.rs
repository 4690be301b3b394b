//! Tables of subdivision stencils.
//!
//! Every vertex of a refined level can be computed by linearly blending a
//! collection of vertices of the level below it. A stencil assigns a series
//! of source vertex indices with a blending weight to one refined vertex.
//! When the control vertices move in space, the refined level can be very
//! efficiently recomputed simply by re-applying the blending weights — the
//! weights themselves only depend on topology and crease sharpness.

use crate::mesh::Vector;
use crate::Index;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Gives read access to a single stencil in a [`StencilTable`].
pub struct Stencil<'a> {
    indices: &'a [u32],
    weights: &'a [f32],
}

impl<'a> Stencil<'a> {
    /// Returns the indices of the source vertices.
    pub fn indices(&self) -> &'a [u32] {
        self.indices
    }

    /// Returns the stencil interpolation weights.
    pub fn weights(&self) -> &'a [f32] {
        self.weights
    }
}

/// Container for stencil data of one refinement step.
#[derive(Debug, Clone)]
pub struct StencilTable {
    offsets: Vec<u32>,
    indices: Vec<u32>,
    weights: Vec<f32>,
    control_count: usize,
}

impl StencilTable {
    /// Returns the number of stencils (refined vertices) in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        0 == self.len()
    }

    /// Returns the number of control vertices indexed in the table.
    #[inline]
    pub fn control_vertex_count(&self) -> usize {
        self.control_count
    }

    /// Returns the stencil at index `i` in the table.
    #[inline]
    pub fn stencil(&self, i: Index) -> Option<Stencil<'_>> {
        let i: usize = i.into();
        if self.len() <= i {
            None
        } else {
            let start = self.offsets[i] as usize;
            let end = self.offsets[i + 1] as usize;
            Some(Stencil {
                indices: &self.indices[start..end],
                weights: &self.weights[start..end],
            })
        }
    }

    /// Blend `src` (one position per control vertex) into `dst` (one
    /// position per stencil).
    pub(crate) fn apply(&self, src: &[Vector], dst: &mut [Vector]) {
        debug_assert_eq!(src.len(), self.control_count);
        debug_assert_eq!(dst.len(), self.len());

        #[cfg(feature = "rayon")]
        {
            dst.par_iter_mut().enumerate().for_each(|(row, out)| {
                *out = self.blend_row(row, src);
            });
        }
        #[cfg(not(feature = "rayon"))]
        {
            for (row, out) in dst.iter_mut().enumerate() {
                *out = self.blend_row(row, src);
            }
        }
    }

    /// Like [`apply`](Self::apply) but only recomputes rows whose sources
    /// are flagged dirty, and flags the rows it touched in `dst_dirty`.
    /// Untouched rows keep their cached value.
    pub(crate) fn apply_masked(
        &self,
        src: &[Vector],
        dst: &mut [Vector],
        src_dirty: &[bool],
        dst_dirty: &mut [bool],
    ) {
        debug_assert_eq!(src_dirty.len(), self.control_count);
        debug_assert_eq!(dst_dirty.len(), self.len());

        for row in 0..self.len() {
            let start = self.offsets[row] as usize;
            let end = self.offsets[row + 1] as usize;
            let dirty = self.indices[start..end]
                .iter()
                .any(|&index| src_dirty[index as usize]);
            dst_dirty[row] = dirty;
            if dirty {
                dst[row] = self.blend_row(row, src);
            }
        }
    }

    #[inline]
    fn blend_row(&self, row: usize, src: &[Vector]) -> Vector {
        let start = self.offsets[row] as usize;
        let end = self.offsets[row + 1] as usize;
        self.indices[start..end]
            .iter()
            .zip(&self.weights[start..end])
            .fold(Vector::zero(), |acc, (&index, &weight)| {
                acc + src[index as usize] * weight
            })
    }
}

/// Incremental [`StencilTable`] construction. Rows must be pushed in
/// refined-vertex order.
pub(crate) struct StencilTableBuilder {
    table: StencilTable,
    scratch: Vec<(u32, f32)>,
}

impl StencilTableBuilder {
    pub fn new(control_count: usize) -> Self {
        Self {
            table: StencilTable {
                offsets: vec![0],
                indices: Vec::new(),
                weights: Vec::new(),
                control_count,
            },
            scratch: Vec::new(),
        }
    }

    /// Accumulate a weight for one source vertex of the current row.
    /// Duplicate indices are merged on [`end_row`](Self::end_row).
    #[inline]
    pub fn add(&mut self, index: u32, weight: f32) {
        debug_assert!((index as usize) < self.table.control_count);
        self.scratch.push((index, weight));
    }

    /// Finish the current row, merging duplicate source indices so each
    /// stencil stays canonical (sorted, unique).
    pub fn end_row(&mut self) {
        self.scratch.sort_unstable_by_key(|&(index, _)| index);
        let mut iter = self.scratch.drain(..).peekable();
        while let Some((index, mut weight)) = iter.next() {
            while let Some(&(next, w)) = iter.peek() {
                if next != index {
                    break;
                }
                weight += w;
                iter.next();
            }
            self.table.indices.push(index);
            self.table.weights.push(weight);
        }
        self.table.offsets.push(self.table.indices.len() as u32);
    }

    pub fn build(self) -> StencilTable {
        debug_assert!(self.scratch.is_empty());
        self.table
    }
}
