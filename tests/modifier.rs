//! Tests for the multires modifier.

use multires::mesh::BaseMesh;
use multires::modifier::{
    DeformModifier, DeleteDirection, ModifierStack, ModifierType, ModifierVariant,
    MultiresFlags, MultiresModifier, MAX_LEVEL,
};
use multires::subdiv::Scheme;
use multires::{Error, Index};
use ultraviolet::Vec3;

fn unit_quad() -> BaseMesh {
    BaseMesh::new(
        vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ],
        vec![4],
        vec![0, 1, 2, 3],
    )
    .expect("Failed to create quad mesh")
}

fn cube() -> BaseMesh {
    BaseMesh::new(
        vec![
            [-0.5, -0.5, 0.5],
            [0.5, -0.5, 0.5],
            [-0.5, 0.5, 0.5],
            [0.5, 0.5, 0.5],
            [-0.5, 0.5, -0.5],
            [0.5, 0.5, -0.5],
            [-0.5, -0.5, -0.5],
            [0.5, -0.5, -0.5],
        ],
        vec![4; 6],
        vec![
            0, 1, 3, 2, 2, 3, 5, 4, 4, 5, 7, 6, 6, 7, 1, 0, 1, 7, 5, 3, 6, 0, 2, 4,
        ],
    )
    .expect("Failed to create cube mesh")
}

/// Write `value` into every sample of every grid.
fn fill_grids(modifier: &mut MultiresModifier, value: Vec3) {
    let store = modifier.store_mut();
    let side = store.grid_side();
    for grid in 0..store.grid_count() {
        for y in 0..side {
            for x in 0..side {
                store.grid_mut(grid).set_value(x, y, value);
            }
        }
    }
}

#[test]
fn test_level_zero_is_base_mesh() {
    let base = cube();
    let mut modifier =
        MultiresModifier::new(&base, 2, Scheme::CatmullClark).expect("Failed to create modifier");
    let evaluated = modifier.evaluate(&base, 0).expect("Failed to evaluate");

    assert_eq!(evaluated.level, 0);
    assert_eq!(evaluated.vertex_count(), base.vertex_count());
    assert_eq!(evaluated.face_count(), base.face_count());
    for (vertex, position) in evaluated.positions.iter().enumerate() {
        let expected = base.position(Index::from(vertex));
        assert_eq!(position[0], expected.x);
        assert_eq!(position[1], expected.y);
        assert_eq!(position[2], expected.z);
    }
}

#[test]
fn test_level_out_of_range() {
    let base = unit_quad();
    let mut modifier =
        MultiresModifier::new(&base, 2, Scheme::Simple).expect("Failed to create modifier");
    match modifier.evaluate(&base, 3) {
        Err(Error::LevelOutOfRange { level: 3, max: 2 }) => {}
        other => panic!("Expected LevelOutOfRange, got {:?}", other.map(|_| ())),
    }
    assert!(MultiresModifier::new(&base, MAX_LEVEL + 1, Scheme::Simple).is_err());
}

#[test]
fn test_evaluate_rejects_foreign_mesh() {
    let quad = unit_quad();
    let mut modifier =
        MultiresModifier::new(&quad, 1, Scheme::Simple).expect("Failed to create modifier");
    let other = cube();
    match modifier.evaluate(&other, 1) {
        Err(Error::TopologyMismatch { stored: 4, expected: 24 }) => {}
        other => panic!("Expected TopologyMismatch, got {:?}", other.map(|_| ())),
    }

    // After announcing the change the modifier reallocates and evaluates.
    modifier.topology_changed(&other);
    let evaluated = modifier.evaluate(&other, 1).expect("Failed to evaluate");
    assert_eq!(evaluated.vertex_count(), 26);
}

#[test]
fn test_constant_normal_displacement() {
    let base = unit_quad();
    let mut modifier =
        MultiresModifier::new(&base, 1, Scheme::Simple).expect("Failed to create modifier");
    fill_grids(&mut modifier, Vec3::new(0.0, 0.0, 0.25));

    // A planar quad with constant normal displacement lifts rigidly.
    let evaluated = modifier.evaluate(&base, 1).expect("Failed to evaluate");
    assert_eq!(evaluated.vertex_count(), 9);
    for position in &evaluated.positions {
        assert!((position[2] - 0.25).abs() < 1e-6, "got z {}", position[2]);
    }
    // Quads only above level 0.
    assert!(evaluated.vertices_per_face.iter().all(|&arity| arity == 4));
    assert_eq!(evaluated.face_count(), 4);
}

#[test]
fn test_evaluate_below_store_level_resamples_lazily() {
    let base = unit_quad();
    let mut modifier =
        MultiresModifier::new(&base, 2, Scheme::Simple).expect("Failed to create modifier");
    fill_grids(&mut modifier, Vec3::new(0.0, 0.0, 0.25));

    let coarse = modifier.evaluate(&base, 1).expect("Failed to evaluate");
    for position in &coarse.positions {
        assert!((position[2] - 0.25).abs() < 1e-6);
    }
    // The store keeps its own resolution.
    assert_eq!(modifier.store().level(), 2);
    assert_eq!(modifier.store().grid_side(), 3);
}

#[test]
fn test_set_total_levels_is_idempotent() {
    let base = unit_quad();
    let mut modifier =
        MultiresModifier::new(&base, 1, Scheme::Simple).expect("Failed to create modifier");
    fill_grids(&mut modifier, Vec3::new(0.1, 0.2, 0.3));

    let snapshot_values = |modifier: &MultiresModifier| -> Vec<Vec3> {
        let store = modifier.store();
        let mut values = Vec::new();
        for grid in 0..store.grid_count() {
            for y in 0..store.grid_side() {
                for x in 0..store.grid_side() {
                    values.push(store.grid(grid).value(x, y));
                }
            }
        }
        values
    };

    modifier
        .set_total_levels(&base, 2)
        .expect("Failed to change levels");
    let snapshot = snapshot_values(&modifier);

    modifier
        .set_total_levels(&base, 2)
        .expect("Failed to change levels");
    let again = snapshot_values(&modifier);
    assert_eq!(snapshot.len(), again.len());
    for (a, b) in snapshot.iter().zip(&again) {
        assert_eq!(a.x, b.x);
        assert_eq!(a.y, b.y);
        assert_eq!(a.z, b.z);
    }
    assert_eq!(modifier.settings.total_level, 2);
}

#[test]
fn test_delete_higher_discards_detail_for_good() {
    let base = unit_quad();
    let mut modifier =
        MultiresModifier::new(&base, 2, Scheme::Simple).expect("Failed to create modifier");
    // Detail only at a level-2 sample that has no level-1 counterpart.
    modifier
        .store_mut()
        .grid_mut(0)
        .set_value(1, 1, Vec3::new(0.0, 0.0, 1.0));

    modifier.settings.sculpt_level = 1;
    let mut base_for_delete = base.clone();
    modifier
        .delete_levels(&mut base_for_delete, DeleteDirection::Higher)
        .expect("Failed to delete levels");
    assert_eq!(modifier.settings.total_level, 1);
    assert_eq!(modifier.store().grid_side(), 2);

    // Re-adding the level only restores interpolated (here: zero) detail.
    modifier
        .set_total_levels(&base, 2)
        .expect("Failed to change levels");
    let value = modifier.store().grid(0).value(1, 1);
    assert_eq!(value.z, 0.0);
}

#[test]
fn test_delete_lower_rebases_and_preserves_surface() {
    let base = unit_quad();
    let mut modifier =
        MultiresModifier::new(&base, 2, Scheme::Simple).expect("Failed to create modifier");
    fill_grids(&mut modifier, Vec3::new(0.0, 0.0, 0.5));
    let before = modifier.evaluate(&base, 2).expect("Failed to evaluate");

    modifier.settings.sculpt_level = 1;
    let mut rebased = base.clone();
    modifier
        .delete_levels(&mut rebased, DeleteDirection::Lower)
        .expect("Failed to delete levels");

    // The level-1 surface became the base mesh.
    assert_eq!(rebased.vertex_count(), 9);
    assert_eq!(rebased.face_count(), 4);
    assert_eq!(modifier.settings.total_level, 1);

    // The top-level surface survived the rebase.
    let after = modifier.evaluate(&rebased, 1).expect("Failed to evaluate");
    assert_eq!(after.vertex_count(), before.vertex_count());
    for (a, b) in before.positions.iter().zip(&after.positions) {
        assert!((a[0] - b[0]).abs() < 1e-3);
        assert!((a[1] - b[1]).abs() < 1e-3);
        assert!((a[2] - b[2]).abs() < 1e-3);
    }
}

#[test]
fn test_base_apply_freezes_displacement() {
    let base = unit_quad();
    let mut modifier =
        MultiresModifier::new(&base, 1, Scheme::Simple).expect("Failed to create modifier");
    fill_grids(&mut modifier, Vec3::new(0.0, 0.0, 0.25));
    let before = modifier.evaluate(&base, 1).expect("Failed to evaluate");

    let mut applied = base.clone();
    modifier
        .base_apply(&mut applied)
        .expect("Failed to apply base");

    // Base vertices moved onto the displaced surface, grids reset.
    for vertex in 0..applied.vertex_count() {
        assert!((applied.position(Index::from(vertex)).z - 0.25).abs() < 1e-6);
    }
    let store = modifier.store();
    for grid in 0..store.grid_count() {
        for y in 0..store.grid_side() {
            for x in 0..store.grid_side() {
                assert_eq!(store.grid(grid).value(x, y).mag_sq(), 0.0);
            }
        }
    }

    // The evaluated surface is unchanged by the freeze.
    let after = modifier.evaluate(&applied, 1).expect("Failed to evaluate");
    for (a, b) in before.positions.iter().zip(&after.positions) {
        assert!((a[0] - b[0]).abs() < 1e-6);
        assert!((a[1] - b[1]).abs() < 1e-6);
        assert!((a[2] - b[2]).abs() < 1e-6);
    }
}

#[test]
fn test_subdivide_simple_leaves_new_detail_at_zero() {
    let base = unit_quad();
    let mut modifier =
        MultiresModifier::new(&base, 1, Scheme::Simple).expect("Failed to create modifier");
    fill_grids(&mut modifier, Vec3::new(0.0, 0.0, 1.0));

    modifier.subdivide(true).expect("Failed to subdivide");
    assert_eq!(modifier.settings.total_level, 2);
    let grid = modifier.store().grid(0);
    // Coincident samples survive, in-between samples stay zero.
    assert_eq!(grid.value(0, 0).z, 1.0);
    assert_eq!(grid.value(2, 2).z, 1.0);
    assert_eq!(grid.value(1, 1).z, 0.0);
}

#[test]
fn test_subdivide_smooth_interpolates_detail() {
    let base = unit_quad();
    let mut modifier =
        MultiresModifier::new(&base, 1, Scheme::Simple).expect("Failed to create modifier");
    fill_grids(&mut modifier, Vec3::new(0.0, 0.0, 1.0));

    modifier.subdivide(false).expect("Failed to subdivide");
    let grid = modifier.store().grid(0);
    assert!((grid.value(1, 1).z - 1.0).abs() < 1e-6);
}

#[test]
fn test_subdivide_from_level_zero() {
    let base = unit_quad();
    let mut modifier =
        MultiresModifier::new(&base, 0, Scheme::Simple).expect("Failed to create modifier");
    // A level-0 store holds one face-center sample per grid.
    assert_eq!(modifier.store().grid_side(), 1);
    modifier
        .store_mut()
        .grid_mut(0)
        .set_value(0, 0, Vec3::new(0.0, 0.0, 1.0));

    modifier.subdivide(true).expect("Failed to subdivide");
    assert_eq!(modifier.settings.total_level, 1);
    assert_eq!(modifier.store().grid_side(), 2);
    // The face-center sample lands at (0, 0), new samples stay zero.
    assert_eq!(modifier.store().grid(0).value(0, 0).z, 1.0);
    assert_eq!(modifier.store().grid(0).value(1, 1).z, 0.0);

    let evaluated = modifier.evaluate(&base, 1).expect("Failed to evaluate");
    for position in &evaluated.positions {
        assert!(position.iter().all(|component| component.is_finite()));
    }
}

#[test]
fn test_set_total_levels_through_zero_stays_finite() {
    let base = unit_quad();
    let mut modifier =
        MultiresModifier::new(&base, 2, Scheme::Simple).expect("Failed to create modifier");
    modifier
        .store_mut()
        .grid_mut(0)
        .set_value(1, 1, Vec3::new(0.0, 0.0, 1.0));

    modifier
        .set_total_levels(&base, 0)
        .expect("Failed to change levels");
    assert_eq!(modifier.store().grid_side(), 1);
    modifier
        .set_total_levels(&base, 2)
        .expect("Failed to change levels");

    // Detail above level 0 is gone, and nothing went non-finite.
    assert_eq!(modifier.store().grid(0).value(1, 1).z, 0.0);
    let evaluated = modifier.evaluate(&base, 2).expect("Failed to evaluate");
    for position in &evaluated.positions {
        assert!(position.iter().all(|component| component.is_finite()));
    }
}

#[test]
fn test_evaluate_dirty_matches_full_evaluation() {
    let base = unit_quad();
    let mut modifier =
        MultiresModifier::new(&base, 1, Scheme::Simple).expect("Failed to create modifier");
    modifier.evaluate(&base, 1).expect("Failed to evaluate");

    // The same topology with one vertex lifted.
    let moved = BaseMesh::new(
        vec![
            [0.0, 0.0, 0.5],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ],
        vec![4],
        vec![0, 1, 2, 3],
    )
    .expect("Failed to create quad mesh");
    let incremental = modifier
        .evaluate_dirty(&moved, 1, &[0])
        .expect("Failed to evaluate");

    let mut fresh =
        MultiresModifier::new(&moved, 1, Scheme::Simple).expect("Failed to create modifier");
    let full = fresh.evaluate(&moved, 1).expect("Failed to evaluate");

    for (a, b) in incremental.positions.iter().zip(&full.positions) {
        assert!((a[0] - b[0]).abs() < 1e-6);
        assert!((a[1] - b[1]).abs() < 1e-6);
        assert!((a[2] - b[2]).abs() < 1e-6);
    }
}

#[test]
fn test_level_for_flags() {
    let base = unit_quad();
    let mut modifier =
        MultiresModifier::new(&base, 3, Scheme::CatmullClark).expect("Failed to create modifier");
    modifier.settings.viewport_level = 1;
    modifier.settings.render_level = 3;

    assert_eq!(modifier.level_for(false, None), 1);
    assert_eq!(modifier.level_for(true, None), 3);
    assert_eq!(modifier.level_for(true, Some(2)), 2);

    modifier.settings.flags.ignore_simplify = true;
    assert_eq!(modifier.level_for(true, Some(2)), 3);

    modifier.settings.flags.use_render_params = true;
    assert_eq!(modifier.level_for(false, None), 3);
}

#[test]
fn test_paint_masks_evaluate() {
    let base = unit_quad();
    let flags = MultiresFlags {
        alloc_paint_mask: true,
        ..Default::default()
    };
    let mut modifier = MultiresModifier::with_flags(&base, 1, Scheme::Simple, flags)
        .expect("Failed to create modifier");
    assert!(modifier.store().has_masks());
    for grid in 0..modifier.store().grid_count() {
        let mask = modifier.store_mut().mask_mut(grid).expect("Missing mask");
        mask.set_value(0, 0, 1.0);
        mask.set_value(1, 1, 1.0);
        mask.set_value(1, 0, 1.0);
        mask.set_value(0, 1, 1.0);
    }

    let evaluated = modifier.evaluate(&base, 1).expect("Failed to evaluate");
    let masks = evaluated.masks.as_ref().expect("Expected per-vertex masks");
    assert_eq!(masks.len(), evaluated.vertex_count());
    assert!(masks.iter().all(|&mask| (mask - 1.0).abs() < 1e-6));
}

#[test]
fn test_paint_masks_evaluate_at_level_zero() {
    let base = unit_quad();
    let flags = MultiresFlags {
        alloc_paint_mask: true,
        ..Default::default()
    };
    let mut modifier = MultiresModifier::with_flags(&base, 1, Scheme::Simple, flags)
        .expect("Failed to create modifier");
    // The corner sample (side-1, side-1) of grid `i` belongs to base
    // vertex `i` on a single quad.
    for grid in 0..modifier.store().grid_count() {
        let mask = modifier.store_mut().mask_mut(grid).expect("Missing mask");
        mask.set_value(1, 1, 0.25 * (grid + 1) as f32);
    }

    let evaluated = modifier.evaluate(&base, 0).expect("Failed to evaluate");
    let masks = evaluated.masks.expect("Expected per-vertex masks");
    assert_eq!(masks.len(), base.vertex_count());
    for (vertex, &mask) in masks.iter().enumerate() {
        let expected = 0.25 * (vertex + 1) as f32;
        assert!((mask - expected).abs() < 1e-6, "vertex {}: {}", vertex, mask);
    }
}

#[test]
fn test_modifier_stack_lookup() {
    let base = unit_quad();
    let mut stack = ModifierStack::new();
    assert!(stack.is_empty());
    assert!(stack.find_multires(true).is_none());

    stack.push(ModifierVariant::Deform(DeformModifier {
        scale: 2.0,
        offset: Vec3::zero(),
    }));
    stack.push(ModifierVariant::Multires(
        MultiresModifier::new(&base, 1, Scheme::Simple).expect("Failed to create modifier"),
    ));
    stack.push(ModifierVariant::Multires(
        MultiresModifier::new(&base, 2, Scheme::Simple).expect("Failed to create modifier"),
    ));
    assert_eq!(stack.len(), 3);
    assert_eq!(stack.get(0).map(ModifierVariant::modifier_type), Some(ModifierType::Deform));

    let first = stack.find_multires(true).expect("Missing multires");
    assert_eq!(first.settings.total_level, 1);
    let last = stack.find_multires(false).expect("Missing multires");
    assert_eq!(last.settings.total_level, 2);

    // Strictly-before lookup skips the entry at the index itself.
    let before = stack.find_multires_before(2).expect("Missing multires");
    assert_eq!(before.settings.total_level, 1);
    assert!(stack.find_multires_before(1).is_none());
}
