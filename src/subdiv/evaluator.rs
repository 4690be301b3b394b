//! Surface evaluation.
//!
//! [`SubdivisionEvaluator`] owns the [`RefinedTopology`] of one
//! (mesh, level, scheme) combination and a position cache for every level.
//! Refinement applies the per-level stencil tables; sampling reads the
//! final level through the per-corner index grids and derives a tangent
//! basis by finite differences over the grid.

use crate::error::{Error, Result};
use crate::mesh::{BaseMesh, Vector};
use crate::subdiv::topology::RefinedTopology;

/// The smoothing rule a refinement step applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Catmull-Clark limit-surface rules with semi-sharp creases.
    CatmullClark,
    /// Pure linear (bilinear on quads) subdivision; no smoothing.
    Simple,
}

/// Options applying to a [`SubdivisionEvaluator`].
#[derive(Debug, Clone, Copy)]
pub struct EvaluatorOptions {
    pub scheme: Scheme,
    pub level: u8,
}

impl Default for EvaluatorOptions {
    /// Create options with the following defaults:
    ///
    /// | Property | Value                                  |
    /// |----------|----------------------------------------|
    /// | `scheme` | [`CatmullClark`](Scheme::CatmullClark) |
    /// | `level`  | `1`                                    |
    fn default() -> Self {
        Self {
            scheme: Scheme::CatmullClark,
            level: 1,
        }
    }
}

/// One evaluated grid sample: a surface position with partial derivatives
/// in the ptex-face parameterization.
///
/// For quad faces the derivatives are rotated from grid space into the
/// face's single ptex parameterization, matching the fixed corner
/// convention used by the tangent matrix; non-quad faces use one ptex face
/// per corner and report grid-space derivatives directly.
#[derive(Debug, Clone, Copy)]
pub struct LimitSample {
    pub position: Vector,
    pub du: Vector,
    pub dv: Vector,
}

impl LimitSample {
    /// Surface normal at the sample.
    #[inline]
    pub fn normal(&self) -> Vector {
        self.du.cross(self.dv).normalized()
    }
}

/// Refines a base mesh and exposes the result as per-corner sample grids.
pub struct SubdivisionEvaluator {
    options: EvaluatorOptions,
    topology: RefinedTopology,
    /// Cached positions per level; `levels[0]` mirrors the base mesh.
    levels: Vec<Vec<Vector>>,
    /// Per-level dirty masks reused by partial refinement.
    dirty: Vec<Vec<bool>>,
}

impl SubdivisionEvaluator {
    /// Build the refined topology for `mesh` and evaluate all levels.
    pub fn new(mesh: &BaseMesh, options: EvaluatorOptions) -> Result<Self> {
        let topology = RefinedTopology::new(mesh, options.level, options.scheme)?;
        let levels = (0..=options.level)
            .map(|k| vec![Vector::zero(); topology.level_vertex_count(k)])
            .collect();
        let dirty = (0..=options.level)
            .map(|k| vec![false; topology.level_vertex_count(k)])
            .collect();
        let mut evaluator = Self {
            options,
            topology,
            levels,
            dirty,
        };
        evaluator.refine(mesh)?;
        Ok(evaluator)
    }

    #[inline]
    pub fn level(&self) -> u8 {
        self.options.level
    }

    #[inline]
    pub fn scheme(&self) -> Scheme {
        self.options.scheme
    }

    /// Number of per-corner grids (equals the base mesh corner count).
    #[inline]
    pub fn grid_count(&self) -> usize {
        self.topology.grid_count()
    }

    /// Side length of every sample grid.
    #[inline]
    pub fn grid_side(&self) -> u32 {
        super::grid_side(self.options.level)
    }

    /// Number of vertices at the final level.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.topology.final_vertex_count()
    }

    /// Positions of the final level.
    #[inline]
    pub fn positions(&self) -> &[Vector] {
        self.levels.last().unwrap()
    }

    #[inline]
    pub(crate) fn topology(&self) -> &RefinedTopology {
        &self.topology
    }

    /// Re-evaluate every level from the base mesh positions.
    ///
    /// Fails with [`Error::TopologyMismatch`] when the mesh no longer
    /// matches the refined topology; rebuild the evaluator after topology
    /// changes.
    pub fn refine(&mut self, mesh: &BaseMesh) -> Result<()> {
        self.check_mesh(mesh)?;
        self.levels[0].clear();
        self.levels[0].extend_from_slice(mesh.positions());
        for k in 0..self.options.level as usize {
            let (src, dst) = split_levels(&mut self.levels, k);
            self.topology.stencils()[k].apply(src, dst);
        }
        Ok(())
    }

    /// Re-evaluate only the region affected by `dirty_faces` (base face
    /// indices); everything else keeps its cached positions. Intended for
    /// interactive edits where a caller tracks modified regions.
    pub fn refine_faces(&mut self, mesh: &BaseMesh, dirty_faces: &[u32]) -> Result<()> {
        self.check_mesh(mesh)?;

        let base_dirty = &mut self.dirty[0];
        base_dirty.iter_mut().for_each(|flag| *flag = false);
        for &face in dirty_faces {
            let verts = mesh
                .face_vertices(crate::Index(face))
                .ok_or(Error::IndexOutOfBounds {
                    index: face as usize,
                    max: mesh.face_count(),
                })?;
            for &vertex in verts {
                base_dirty[vertex as usize] = true;
            }
        }
        for (vertex, position) in mesh.positions().iter().enumerate() {
            if self.dirty[0][vertex] {
                self.levels[0][vertex] = *position;
            }
        }

        for k in 0..self.options.level as usize {
            let (src, dst) = split_levels(&mut self.levels, k);
            let (src_dirty, dst_dirty) = split_dirty(&mut self.dirty, k);
            self.topology.stencils()[k].apply_masked(src, dst, src_dirty, dst_dirty);
        }
        Ok(())
    }

    /// Sample the grid of `grid` (a flat corner index) at `(x, y)`.
    ///
    /// Derivatives are scaled to the unit parameter range of the ptex face.
    pub fn sample(&self, grid: usize, x: u32, y: u32) -> LimitSample {
        let index_grid = self.topology.index_grid(grid);
        let n = index_grid.side();
        let positions = self.positions();
        let at = |x: u32, y: u32| positions[index_grid.index(x, y) as usize];

        let position = at(x, y);
        let scale = (n - 1) as f32;
        // Central differences in the interior, one-sided at the borders.
        let dgx = match x {
            0 => (at(1, y) - at(0, y)) * scale,
            _ if x == n - 1 => (at(n - 1, y) - at(n - 2, y)) * scale,
            _ => (at(x + 1, y) - at(x - 1, y)) * (0.5 * scale),
        };
        let dgy = match y {
            0 => (at(x, 1) - at(x, 0)) * scale,
            _ if y == n - 1 => (at(x, n - 1) - at(x, n - 2)) * scale,
            _ => (at(x, y + 1) - at(x, y - 1)) * (0.5 * scale),
        };

        let (du, dv) = if self.topology.grid_face_arity(grid) == 4 {
            // Rotate grid derivatives into the quad's ptex frame; one
            // quarter turn per corner.
            match self.topology.grid_corner(grid) {
                0 => (dgx * -2.0, dgy * -2.0),
                1 => (dgy * 2.0, dgx * -2.0),
                2 => (dgx * 2.0, dgy * 2.0),
                _ => (dgy * -2.0, dgx * 2.0),
            }
        } else {
            (dgx, dgy)
        };

        LimitSample { position, du, dv }
    }

    /// The tangent-matrix corner for a grid: the loop position for quads,
    /// 0 for every other arity.
    #[inline]
    pub fn ptex_corner(&self, grid: usize) -> u32 {
        if self.topology.grid_face_arity(grid) == 4 {
            self.topology.grid_corner(grid)
        } else {
            0
        }
    }

    fn check_mesh(&self, mesh: &BaseMesh) -> Result<()> {
        if mesh.vertex_count() != self.topology.base_vertex_count()
            || mesh.corner_count() != self.topology.grid_count()
        {
            return Err(Error::TopologyMismatch {
                stored: self.topology.grid_count(),
                expected: mesh.corner_count(),
            });
        }
        Ok(())
    }
}

/// Borrow level `k` and level `k + 1` simultaneously.
fn split_levels(levels: &mut [Vec<Vector>], k: usize) -> (&[Vector], &mut [Vector]) {
    let (head, tail) = levels.split_at_mut(k + 1);
    (&head[k], &mut tail[0])
}

fn split_dirty(dirty: &mut [Vec<bool>], k: usize) -> (&[bool], &mut [bool]) {
    let (head, tail) = dirty.split_at_mut(k + 1);
    (&head[k], &mut tail[0])
}
