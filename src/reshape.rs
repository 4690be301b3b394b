//! Reshape and sync operations.
//!
//! Reshaping rewrites the displacement grids so the modifier reproduces an
//! externally supplied surface: every grid sample projects the difference
//! between the target position and the smooth subdivided surface back
//! through the sample's inverse tangent matrix. The subdivided surface only
//! depends on the base mesh, so no grid state needs to be cleared first.

use log::debug;

use crate::error::{Error, Result};
use crate::grids::{construct_tangent_matrix, invert_matrix, DisplacementGrid, GridStore};
use crate::mesh::{BaseMesh, EvaluatedMesh, Vector};
use crate::modifier::{MultiresModifier, MAX_LEVEL};
use crate::subdiv::{EvaluatorOptions, SubdivisionEvaluator};

/// Overwrite the modifier's displacement so it reproduces `target`, an
/// evaluated mesh at the modifier's total level (same refined topology,
/// typically produced by [`MultiresModifier::evaluate`] on a mesh that was
/// deformed or sculpted elsewhere).
///
/// Fails with [`Error::ShapeMismatch`] when the vertex count differs from
/// the refined vertex count. With a total level of 0 there are no grids to
/// write; the call is a no-op.
pub fn reshape_from_mesh(
    modifier: &mut MultiresModifier,
    base: &BaseMesh,
    target: &EvaluatedMesh,
) -> Result<()> {
    reshape_from_positions(modifier, base, &target.positions)
}

/// [`reshape_from_mesh`] with bare target positions, indexed like the
/// refined vertices of the modifier's top level.
pub fn reshape_from_positions(
    modifier: &mut MultiresModifier,
    base: &BaseMesh,
    targets: &[[f32; 3]],
) -> Result<()> {
    let level = modifier.settings.total_level;
    if level == 0 {
        return if targets.len() == base.vertex_count() {
            Ok(())
        } else {
            Err(Error::ShapeMismatch {
                expected: base.vertex_count(),
                actual: targets.len(),
            })
        };
    }
    let evaluator = SubdivisionEvaluator::new(
        base,
        EvaluatorOptions {
            scheme: modifier.scheme(),
            level,
        },
    )?;
    let targets: Vec<Vector> = targets
        .iter()
        .map(|p| Vector::new(p[0], p[1], p[2]))
        .collect();
    let masks = modifier.store().mask_grids().map(<[_]>::to_vec);
    let store = project_into_store(&evaluator, &targets, false)?;
    debug!("reshaped {} grids at level {}", store.grid_count(), level);
    modifier.replace_store(GridStore::from_parts(level, store.into_grids(), masks));
    Ok(())
}

/// Apply a per-vertex deformation to the displaced top-level surface and
/// absorb the change into the grids: the evaluated surface afterwards
/// equals `deform` applied to the evaluated surface before.
pub fn reshape_from_deform<F>(
    modifier: &mut MultiresModifier,
    base: &BaseMesh,
    deform: F,
) -> Result<()>
where
    F: Fn(Vector) -> Vector,
{
    let level = modifier.settings.total_level;
    let current = modifier.evaluate(base, level)?;
    let targets: Vec<[f32; 3]> = current
        .positions
        .iter()
        .map(|p| {
            let out = deform(Vector::new(p[0], p[1], p[2]));
            [out.x, out.y, out.z]
        })
        .collect();
    reshape_from_positions(modifier, base, &targets)
}

/// Uniformly rescale the stored displacement, e.g. after the object scale
/// was applied to the base mesh.
pub fn scale_displacement(modifier: &mut MultiresModifier, factor: f32) {
    modifier.store_mut().scale(factor);
}

/// Bring two modifiers to a common total level before their meshes are
/// joined, resampling the coarser grid set up. Returns the common level.
///
/// Settings are host-mutable, so a total level beyond [`MAX_LEVEL`] can
/// reach this call; it is rejected with [`Error::IncompatibleLevels`]
/// before either store is touched.
pub fn prepare_join(
    left: &mut MultiresModifier,
    right: &mut MultiresModifier,
) -> Result<u8> {
    let target = left
        .settings
        .total_level
        .max(right.settings.total_level);
    if target > MAX_LEVEL {
        return Err(Error::IncompatibleLevels {
            left: left.settings.total_level,
            right: right.settings.total_level,
            max: MAX_LEVEL,
        });
    }
    debug!("prepare_join at level {}", target);
    left.store_mut()
        .change_level(target, crate::grids::ResampleMode::Interpolate);
    right
        .store_mut()
        .change_level(target, crate::grids::ResampleMode::Interpolate);
    for settings in [&mut left.settings, &mut right.settings] {
        settings.total_level = target;
        settings.sculpt_level = target;
        settings.render_level = target;
        settings.viewport_level = target;
    }
    Ok(target)
}

/// Project world-space `targets` (indexed like the evaluator's refined
/// vertices) into per-corner tangent-space grids that make the displaced
/// surface reproduce them exactly.
pub(crate) fn project_into_store(
    evaluator: &SubdivisionEvaluator,
    targets: &[Vector],
    with_masks: bool,
) -> Result<GridStore> {
    if targets.len() != evaluator.vertex_count() {
        return Err(Error::ShapeMismatch {
            expected: evaluator.vertex_count(),
            actual: targets.len(),
        });
    }
    let level = evaluator.level();
    let side = evaluator.grid_side();
    let mut store = GridStore::allocate(evaluator.grid_count(), level, with_masks);
    for grid in 0..evaluator.grid_count() {
        let index_grid = evaluator.topology().index_grid(grid);
        let corner = evaluator.ptex_corner(grid);
        let mut out = DisplacementGrid::new(side);
        for y in 0..side {
            for x in 0..side {
                let sample = evaluator.sample(grid, x, y);
                let matrix = construct_tangent_matrix(sample.du, sample.dv, corner);
                let world = targets[index_grid.index(x, y) as usize] - sample.position;
                out.set_value(x, y, invert_matrix(&matrix) * world);
            }
        }
        *store.grid_mut(grid) = out;
    }
    Ok(store)
}
