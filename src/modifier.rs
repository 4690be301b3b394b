//! The multires modifier.
//!
//! [`MultiresModifier`] ties a [`SubdivisionEvaluator`](crate::subdiv::SubdivisionEvaluator)
//! and a [`GridStore`](crate::grids::GridStore) together: evaluation refines
//! the base mesh to the requested level, adds the stored tangent-space
//! displacement at every grid sample and emits a dense, caller-owned
//! [`EvaluatedMesh`]. Level management (subdivide, delete, apply-base)
//! lives here as well.
//!
//! A small tagged-variant [`ModifierStack`] stands in for the host
//! application's modifier-list polymorphism; every variant exposes the same
//! evaluate/set-levels capability set without virtual inheritance.

use log::debug;

use crate::error::{Error, Result};
use crate::grids::{
    apply_displacement, construct_tangent_matrix, DisplacementGrid, GridStore, ResampleMode,
};
use crate::mesh::{vertex_normals, BaseMesh, EvaluatedMesh, Vector};
use crate::reshape;
use crate::subdiv::{grid_side, EvaluatorOptions, Scheme, SubdivisionEvaluator};

/// Hard cap on total subdivision levels.
pub const MAX_LEVEL: u8 = 13;

/// Behavior flags of a multires modifier.
///
/// These mirror the host-facing configuration surface: `use_local_data`
/// selects modifier-local override data over object-linked data (consumed
/// by the embedding application), `use_render_params` switches level
/// selection to the render level, `alloc_paint_mask` requests the parallel
/// mask grids and `ignore_simplify` bypasses an external scene-wide level
/// cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MultiresFlags {
    pub use_local_data: bool,
    pub use_render_params: bool,
    pub alloc_paint_mask: bool,
    pub ignore_simplify: bool,
}

/// Level state of a multires modifier.
///
/// Invariant: `sculpt_level <= total_level <= MAX_LEVEL`. The render level
/// may exceed the viewport level independently; both are clamped to the
/// total level at evaluation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiresSettings {
    pub total_level: u8,
    pub sculpt_level: u8,
    pub render_level: u8,
    pub viewport_level: u8,
    pub flags: MultiresFlags,
}

impl MultiresSettings {
    fn with_levels(level: u8) -> Self {
        Self {
            total_level: level,
            sculpt_level: level,
            render_level: level,
            viewport_level: level,
            flags: MultiresFlags::default(),
        }
    }

    fn clamp_to_total(&mut self) {
        self.sculpt_level = self.sculpt_level.min(self.total_level);
        self.render_level = self.render_level.min(self.total_level);
        self.viewport_level = self.viewport_level.min(self.total_level);
    }
}

/// Which side of the current sculpt level
/// [`delete_levels`](MultiresModifier::delete_levels) discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteDirection {
    /// Keep the coarse levels: every level above the current sculpt level
    /// is discarded, including its displacement detail.
    Higher,
    /// Keep the fine levels: the surface at the current sculpt level
    /// becomes the new base mesh and the levels below it disappear.
    Lower,
}

/// Combines subdivision and stored displacement into a dense mesh, and
/// manages the level lifecycle of its [`GridStore`].
pub struct MultiresModifier {
    pub settings: MultiresSettings,
    scheme: Scheme,
    store: GridStore,
    cache: Option<SubdivisionEvaluator>,
}

impl MultiresModifier {
    /// Create a modifier for `base` with zero displacement at
    /// `total_level`.
    pub fn new(base: &BaseMesh, total_level: u8, scheme: Scheme) -> Result<Self> {
        Self::with_flags(base, total_level, scheme, MultiresFlags::default())
    }

    /// Like [`new()`](Self::new), also honoring `alloc_paint_mask`.
    pub fn with_flags(
        base: &BaseMesh,
        total_level: u8,
        scheme: Scheme,
        flags: MultiresFlags,
    ) -> Result<Self> {
        if total_level > MAX_LEVEL {
            return Err(Error::LevelOutOfRange {
                level: total_level,
                max: MAX_LEVEL,
            });
        }
        let mut settings = MultiresSettings::with_levels(total_level);
        settings.flags = flags;
        Ok(Self {
            settings,
            scheme,
            store: GridStore::allocate(base.corner_count(), total_level, flags.alloc_paint_mask),
            cache: None,
        })
    }

    #[inline]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    #[inline]
    pub fn store(&self) -> &GridStore {
        &self.store
    }

    #[inline]
    pub fn store_mut(&mut self) -> &mut GridStore {
        &mut self.store
    }

    pub(crate) fn replace_store(&mut self, store: GridStore) {
        self.store = store;
    }

    /// The level evaluation will run at for the given external parameters.
    /// `simplify` is an explicit scene-wide cap, applied unless the
    /// modifier asks to ignore it.
    pub fn level_for(&self, use_render_params: bool, simplify: Option<u8>) -> u8 {
        let settings = &self.settings;
        let mut level = if use_render_params || settings.flags.use_render_params {
            settings.render_level
        } else {
            settings.viewport_level
        };
        level = level.min(settings.total_level);
        if !settings.flags.ignore_simplify {
            if let Some(cap) = simplify {
                level = level.min(cap);
            }
        }
        level
    }

    /// Evaluate the displaced surface at `level`.
    ///
    /// Level 0 returns the base mesh itself (positions copied, normals
    /// recomputed). Any other level refines the base mesh, resamples the
    /// stored grids onto the requested resolution when it differs from the
    /// store's (without touching the stored detail), and applies
    /// displacement per grid sample.
    pub fn evaluate(&mut self, base: &BaseMesh, level: u8) -> Result<EvaluatedMesh> {
        self.evaluate_internal(base, level, None)
    }

    /// Evaluate at the level selected by the modifier flags and the
    /// explicit `simplify` cap.
    pub fn evaluate_with_params(
        &mut self,
        base: &BaseMesh,
        use_render_params: bool,
        simplify: Option<u8>,
    ) -> Result<EvaluatedMesh> {
        let level = self.level_for(use_render_params, simplify);
        self.evaluate_internal(base, level, None)
    }

    /// Evaluate at `level`, only recomputing the refinement of the given
    /// base faces. Positions of everything else come from the evaluator
    /// cache of the previous call at the same level.
    pub fn evaluate_dirty(
        &mut self,
        base: &BaseMesh,
        level: u8,
        dirty_faces: &[u32],
    ) -> Result<EvaluatedMesh> {
        self.evaluate_internal(base, level, Some(dirty_faces))
    }

    fn evaluate_internal(
        &mut self,
        base: &BaseMesh,
        level: u8,
        dirty_faces: Option<&[u32]>,
    ) -> Result<EvaluatedMesh> {
        if level > self.settings.total_level {
            return Err(Error::LevelOutOfRange {
                level,
                max: self.settings.total_level,
            });
        }
        if self.store.grid_count() != base.corner_count() {
            return Err(Error::TopologyMismatch {
                stored: self.store.grid_count(),
                expected: base.corner_count(),
            });
        }

        if level == 0 {
            let positions = base.positions().to_vec();
            let normals = vertex_normals(
                &positions,
                base.vertices_per_face(),
                base.face_vertex_indices(),
            );
            // Base vertices map to the corner sample of each grid.
            let masks = self.store.has_masks().then(|| {
                let corner = self.store.grid_side() - 1;
                let mut masks = vec![0.0f32; base.vertex_count()];
                let mut visited = vec![false; base.vertex_count()];
                for (grid, &vertex) in base.face_vertex_indices().iter().enumerate() {
                    let vertex = vertex as usize;
                    if visited[vertex] {
                        continue;
                    }
                    visited[vertex] = true;
                    if let Some(mask) = self.store.mask(grid) {
                        masks[vertex] = mask.value(corner, corner);
                    }
                }
                masks
            });
            return Ok(EvaluatedMesh {
                positions: positions.iter().map(|p| [p.x, p.y, p.z]).collect(),
                normals: normals.iter().map(|n| [n.x, n.y, n.z]).collect(),
                vertices_per_face: base.vertices_per_face().to_vec(),
                face_vertex_indices: base.face_vertex_indices().to_vec(),
                masks,
                level: 0,
            });
        }

        self.ensure_evaluator(base, level)?;
        let evaluator = self.cache.as_mut().unwrap();
        match dirty_faces {
            Some(faces) => evaluator.refine_faces(base, faces)?,
            None => evaluator.refine(base)?,
        }
        let evaluator = self.cache.as_ref().unwrap();

        // Lazy, non-destructive resample when the store resolution differs
        // from the evaluation level.
        let side = grid_side(level);
        let resampled: Option<Vec<DisplacementGrid>> = (self.store.level() != level).then(|| {
            self.store
                .grids()
                .iter()
                .map(|grid| grid.resampled(side))
                .collect()
        });
        let grid_at = |index: usize| -> &DisplacementGrid {
            resampled
                .as_ref()
                .map_or_else(|| self.store.grid(index), |grids| &grids[index])
        };
        let resampled_masks: Option<Vec<crate::grids::MaskGrid>> =
            (self.store.level() != level && self.store.has_masks()).then(|| {
                (0..self.store.grid_count())
                    .filter_map(|index| self.store.mask(index))
                    .map(|mask| mask.resampled(side))
                    .collect()
            });
        let mask_at = |index: usize| -> Option<&crate::grids::MaskGrid> {
            resampled_masks
                .as_ref()
                .map(|masks| &masks[index])
                .or_else(|| self.store.mask(index))
        };

        let vertex_count = evaluator.vertex_count();
        let mut positions = vec![Vector::zero(); vertex_count];
        let mut masks = self
            .store
            .has_masks()
            .then(|| vec![0.0f32; vertex_count]);
        let mut visited = vec![false; vertex_count];

        for grid in 0..evaluator.grid_count() {
            let index_grid = evaluator.topology().index_grid(grid);
            let corner = evaluator.ptex_corner(grid);
            let displacement = grid_at(grid);
            for y in 0..side {
                for x in 0..side {
                    let vertex = index_grid.index(x, y) as usize;
                    if visited[vertex] {
                        continue;
                    }
                    visited[vertex] = true;
                    let sample = evaluator.sample(grid, x, y);
                    let matrix = construct_tangent_matrix(sample.du, sample.dv, corner);
                    positions[vertex] =
                        apply_displacement(sample.position, &matrix, displacement.value(x, y));
                    if let Some(masks) = masks.as_mut() {
                        if let Some(mask) = mask_at(grid) {
                            masks[vertex] = mask.value(x, y);
                        }
                    }
                }
            }
        }

        let mut vertices_per_face = Vec::with_capacity(evaluator.topology().quads().len());
        let mut face_vertex_indices = Vec::with_capacity(evaluator.topology().quads().len() * 4);
        for quad in evaluator.topology().quads() {
            vertices_per_face.push(4);
            face_vertex_indices.extend_from_slice(quad);
        }
        let normals = vertex_normals(&positions, &vertices_per_face, &face_vertex_indices);

        Ok(EvaluatedMesh {
            positions: positions.iter().map(|p| [p.x, p.y, p.z]).collect(),
            normals: normals.iter().map(|n| [n.x, n.y, n.z]).collect(),
            vertices_per_face,
            face_vertex_indices,
            masks,
            level,
        })
    }

    /// Adjust the total level, resampling the grid store. Calling this
    /// twice with the same `n` produces identical grid contents.
    pub fn set_total_levels(&mut self, base: &BaseMesh, n: u8) -> Result<()> {
        if n > MAX_LEVEL {
            return Err(Error::LevelOutOfRange {
                level: n,
                max: MAX_LEVEL,
            });
        }
        if self.store.grid_count() != base.corner_count() {
            return Err(Error::TopologyMismatch {
                stored: self.store.grid_count(),
                expected: base.corner_count(),
            });
        }
        if n == self.settings.total_level {
            return Ok(());
        }
        debug!("set_total_levels: {} -> {}", self.settings.total_level, n);
        self.store.change_level(n, ResampleMode::Interpolate);
        self.settings.total_level = n;
        self.settings.clamp_to_total();
        Ok(())
    }

    /// Add one subdivision level. With `simple`, the new finest samples
    /// stay at zero displacement (pure linear subdivision); otherwise the
    /// stored detail is resampled onto the finer grid.
    pub fn subdivide(&mut self, simple: bool) -> Result<()> {
        let new_level = self.settings.total_level + 1;
        if new_level > MAX_LEVEL {
            return Err(Error::LevelOutOfRange {
                level: new_level,
                max: MAX_LEVEL,
            });
        }
        debug!("subdivide to level {} (simple: {})", new_level, simple);
        let mode = if simple {
            ResampleMode::ZeroFill
        } else {
            ResampleMode::Interpolate
        };
        self.store.change_level(new_level, mode);
        self.settings = MultiresSettings {
            flags: self.settings.flags,
            ..MultiresSettings::with_levels(new_level)
        };
        Ok(())
    }

    /// Discard subdivision levels on one side of the current sculpt level.
    ///
    /// This is destructive and never partial: discarded displacement detail
    /// is lost for good and a later
    /// [`set_total_levels`](Self::set_total_levels) only yields default
    /// displacement at the re-added levels. [`DeleteDirection::Lower`]
    /// rebases: the displaced surface at the sculpt level replaces the
    /// caller's base mesh (crease data does not survive the rebase; the
    /// displacement grids absorb the shape difference).
    pub fn delete_levels(
        &mut self,
        base: &mut BaseMesh,
        direction: DeleteDirection,
    ) -> Result<()> {
        let total = self.settings.total_level;
        if total == 0 {
            return Ok(());
        }
        let sculpt = self.settings.sculpt_level.clamp(1, total);
        match direction {
            DeleteDirection::Higher => {
                if sculpt == total {
                    return Ok(());
                }
                debug!("delete higher levels: total {} -> {}", total, sculpt);
                self.store.change_level(sculpt, ResampleMode::Interpolate);
                self.settings.total_level = sculpt;
                self.settings.clamp_to_total();
            }
            DeleteDirection::Lower => {
                debug!("delete lower levels: rebasing at level {}", sculpt);
                // Capture both surfaces before touching any state.
                let top = self.evaluate(base, total)?;
                let rebase = self.evaluate(base, sculpt)?;
                let new_total = total - sculpt;

                let new_base = BaseMesh::new(
                    rebase.positions,
                    rebase.vertices_per_face,
                    rebase.face_vertex_indices,
                )?;
                let targets: Vec<Vector> = top
                    .positions
                    .iter()
                    .map(|p| Vector::new(p[0], p[1], p[2]))
                    .collect();
                let store = if new_total == 0 {
                    GridStore::allocate(new_base.corner_count(), 0, self.store.has_masks())
                } else {
                    let mut evaluator = SubdivisionEvaluator::new(
                        &new_base,
                        EvaluatorOptions {
                            scheme: self.scheme,
                            level: new_total,
                        },
                    )?;
                    evaluator.refine(&new_base)?;
                    reshape::project_into_store(&evaluator, &targets, self.store.has_masks())?
                };

                // Commit.
                *base = new_base;
                self.store = store;
                self.settings.total_level = new_total;
                self.settings.clamp_to_total();
                self.cache = None;
            }
        }
        Ok(())
    }

    /// Bake the currently-displaced top-level corner positions into the
    /// base mesh, then reset all displacement ("freeze"). The top-level
    /// surface is captured before any grid is touched; on error the prior
    /// state is left untouched.
    pub fn base_apply(&mut self, base: &mut BaseMesh) -> Result<()> {
        let total = self.settings.total_level;
        let evaluated = self.evaluate(base, total)?;
        debug!("base_apply at level {}", total);
        // Base vertices keep their indices through refinement.
        for vertex in 0..base.vertex_count() {
            let p = evaluated.positions[vertex];
            base.set_position(vertex, Vector::new(p[0], p[1], p[2]));
        }
        self.store.zero_displacement();
        Ok(())
    }

    /// Relayout the grid set after an out-of-band base topology change
    /// (extrude, edge split, merge). Must be called before the next
    /// evaluation; grids are zeroed when the corner count changed, since
    /// the old per-corner association is gone.
    pub fn topology_changed(&mut self, base: &BaseMesh) {
        self.cache = None;
        if self.store.grid_count() != base.corner_count() {
            debug!(
                "topology changed: {} grids -> {} corners, reallocating",
                self.store.grid_count(),
                base.corner_count()
            );
            self.store = GridStore::allocate(
                base.corner_count(),
                self.settings.total_level,
                self.store.has_masks(),
            );
        }
    }

    /// Clamp the stored levels to what the grid store actually holds.
    pub fn sync_levels_from_grids(&mut self) {
        self.settings.total_level = self.store.level();
        self.settings.clamp_to_total();
    }

    fn ensure_evaluator(&mut self, base: &BaseMesh, level: u8) -> Result<()> {
        let valid = self.cache.as_ref().is_some_and(|evaluator| {
            evaluator.level() == level
                && evaluator.scheme() == self.scheme
                && evaluator.grid_count() == base.corner_count()
                && evaluator.topology().base_vertex_count() == base.vertex_count()
        });
        if !valid {
            self.cache = Some(SubdivisionEvaluator::new(
                base,
                EvaluatorOptions {
                    scheme: self.scheme,
                    level,
                },
            )?);
        }
        Ok(())
    }
}

/// Discriminant of a [`ModifierVariant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifierType {
    Multires,
    Deform,
}

/// A plain per-vertex deform: uniform scale about the origin plus a
/// translation. Stands in for arbitrary deform-chain members whose
/// transform is only available per vertex.
#[derive(Debug, Clone, Copy)]
pub struct DeformModifier {
    pub scale: f32,
    pub offset: Vector,
}

impl DeformModifier {
    #[inline]
    pub fn deform(&self, position: Vector) -> Vector {
        position * self.scale + self.offset
    }
}

/// The host's modifier-stack polymorphism as a tagged variant; each variant
/// exposes the same evaluate/set-levels capability set.
pub enum ModifierVariant {
    Multires(MultiresModifier),
    Deform(DeformModifier),
}

impl ModifierVariant {
    #[inline]
    pub fn modifier_type(&self) -> ModifierType {
        match self {
            ModifierVariant::Multires(_) => ModifierType::Multires,
            ModifierVariant::Deform(_) => ModifierType::Deform,
        }
    }
}

/// An ordered list of modifiers with multires lookups.
#[derive(Default)]
pub struct ModifierStack {
    entries: Vec<ModifierVariant>,
}

impl ModifierStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, modifier: ModifierVariant) {
        self.entries.push(modifier);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&ModifierVariant> {
        self.entries.get(index)
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut ModifierVariant> {
        self.entries.get_mut(index)
    }

    /// The first (or last) multires modifier in the stack.
    pub fn find_multires(&self, use_first: bool) -> Option<&MultiresModifier> {
        let mut iter = self.entries.iter().filter_map(|entry| match entry {
            ModifierVariant::Multires(modifier) => Some(modifier),
            _ => None,
        });
        if use_first {
            iter.next()
        } else {
            iter.last()
        }
    }

    pub fn find_multires_mut(&mut self, use_first: bool) -> Option<&mut MultiresModifier> {
        let mut iter = self.entries.iter_mut().filter_map(|entry| match entry {
            ModifierVariant::Multires(modifier) => Some(modifier),
            _ => None,
        });
        if use_first {
            iter.next()
        } else {
            iter.last()
        }
    }

    /// The last multires modifier strictly before `index`.
    pub fn find_multires_before(&self, index: usize) -> Option<&MultiresModifier> {
        self.entries[..index.min(self.entries.len())]
            .iter()
            .rev()
            .find_map(|entry| match entry {
                ModifierVariant::Multires(modifier) => Some(modifier),
                _ => None,
            })
    }
}
