//! Tests for the subdivision evaluator.

use multires::mesh::BaseMesh;
use multires::subdiv::{grid_side, EvaluatorOptions, Scheme, SubdivisionEvaluator};

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

#[test]
fn test_grid_side() {
    assert_eq!(grid_side(0), 1);
    assert_eq!(grid_side(1), 2);
    assert_eq!(grid_side(2), 3);
    assert_eq!(grid_side(3), 5);
}

#[test]
fn test_quad_vertex_counts() {
    let base = unit_quad();
    let level1 = SubdivisionEvaluator::new(
        &base,
        EvaluatorOptions {
            scheme: Scheme::CatmullClark,
            level: 1,
        },
    )
    .expect("Failed to refine quad");
    // 4 vertex points + 4 edge points + 1 face point.
    assert_eq!(level1.vertex_count(), 9);
    assert_eq!(level1.grid_count(), 4);
    assert_eq!(level1.grid_side(), 2);

    let level2 = SubdivisionEvaluator::new(
        &base,
        EvaluatorOptions {
            scheme: Scheme::CatmullClark,
            level: 2,
        },
    )
    .expect("Failed to refine quad");
    // A 5×5 vertex patch.
    assert_eq!(level2.vertex_count(), 25);
    assert_eq!(level2.grid_side(), 3);
}

#[test]
fn test_cube_vertex_counts() {
    let base = cube();
    let level1 = SubdivisionEvaluator::new(
        &base,
        EvaluatorOptions {
            scheme: Scheme::CatmullClark,
            level: 1,
        },
    )
    .expect("Failed to refine cube");
    // 8 vertex points + 12 edge points + 6 face points.
    assert_eq!(level1.vertex_count(), 26);

    let level2 = SubdivisionEvaluator::new(
        &base,
        EvaluatorOptions {
            scheme: Scheme::CatmullClark,
            level: 2,
        },
    )
    .expect("Failed to refine cube");
    // 26 + 48 edge points + 24 face points.
    assert_eq!(level2.vertex_count(), 98);
    assert_eq!(level2.grid_count(), 24);
}

#[test]
fn test_simple_scheme_is_bilinear() {
    let base = unit_quad();
    let evaluator = SubdivisionEvaluator::new(
        &base,
        EvaluatorOptions {
            scheme: Scheme::Simple,
            level: 2,
        },
    )
    .expect("Failed to refine quad");

    // Linear subdivision of a planar quad stays on the quarter lattice.
    for position in evaluator.positions() {
        assert_eq!(position.z, 0.0);
        let x4 = position.x * 4.0;
        let y4 = position.y * 4.0;
        assert!((x4 - x4.round()).abs() < 1e-6, "x off-lattice: {}", position.x);
        assert!((y4 - y4.round()).abs() < 1e-6, "y off-lattice: {}", position.y);
        assert!((0.0..=1.0).contains(&position.x));
        assert!((0.0..=1.0).contains(&position.y));
    }
}

#[test]
fn test_catmull_clark_face_point_is_centroid() {
    let base = cube();
    let evaluator = SubdivisionEvaluator::new(
        &base,
        EvaluatorOptions {
            scheme: Scheme::CatmullClark,
            level: 1,
        },
    )
    .expect("Failed to refine cube");

    // Face points are appended after the 8 vertex and 12 edge points, in
    // face order. Face 0 is (0, 1, 3, 2), centroid (0, 0, 0.5).
    let face_point = evaluator.positions()[20];
    assert!((face_point.x - 0.0).abs() < 1e-6);
    assert!((face_point.y - 0.0).abs() < 1e-6);
    assert!((face_point.z - 0.5).abs() < 1e-6);
}

#[test]
fn test_catmull_clark_smooth_vertex_rule() {
    let base = cube();
    let evaluator = SubdivisionEvaluator::new(
        &base,
        EvaluatorOptions {
            scheme: Scheme::CatmullClark,
            level: 1,
        },
    )
    .expect("Failed to refine cube");

    // Valence-3 cube corner: (F + 2R + (n - 3)P) / n with F the average
    // adjacent face centroid and R the average incident edge midpoint.
    // For vertex 0 that works out to (-5/18, -5/18, 5/18).
    let v = evaluator.positions()[0];
    let expected = 5.0 / 18.0;
    assert!((v.x + expected).abs() < 1e-6, "got {:?}", v);
    assert!((v.y + expected).abs() < 1e-6, "got {:?}", v);
    assert!((v.z - expected).abs() < 1e-6, "got {:?}", v);
}

#[test]
fn test_sharp_crease_pins_edge_point() {
    let mut base = cube();
    // Fully sharp top rim.
    base.creases(&[2, 3, 3, 5, 5, 4, 4, 2], &[10.0; 4]);
    let evaluator = SubdivisionEvaluator::new(
        &base,
        EvaluatorOptions {
            scheme: Scheme::CatmullClark,
            level: 1,
        },
    )
    .expect("Failed to refine creased cube");

    // Edge (3, 2) is the third edge seen while walking face 0 (0, 1, 3, 2),
    // so its edge point is vertex 8 + 2. Fully sharp means plain midpoint.
    let edge_point = evaluator.positions()[10];
    assert!((edge_point.x - 0.0).abs() < 1e-6);
    assert!((edge_point.y - 0.5).abs() < 1e-6);
    assert!((edge_point.z - 0.5).abs() < 1e-6);
}

#[test]
fn test_smooth_edge_point_differs_from_midpoint() {
    let base = cube();
    let evaluator = SubdivisionEvaluator::new(
        &base,
        EvaluatorOptions {
            scheme: Scheme::CatmullClark,
            level: 1,
        },
    )
    .expect("Failed to refine cube");

    // Same edge (3, 2) without a crease: the smooth rule pulls the point
    // toward the adjacent face points, off the edge midpoint.
    let edge_point = evaluator.positions()[10];
    let midpoint = [0.0, 0.5, 0.5];
    let distance = (edge_point.x - midpoint[0]).abs()
        + (edge_point.y - midpoint[1]).abs()
        + (edge_point.z - midpoint[2]).abs();
    assert!(distance > 1e-3);
}

#[test]
fn test_catmull_clark_shrinks_cube() {
    let base = cube();
    let evaluator = SubdivisionEvaluator::new(
        &base,
        EvaluatorOptions {
            scheme: Scheme::CatmullClark,
            level: 2,
        },
    )
    .expect("Failed to refine cube");

    // The refined cage contracts strictly inside the control cage.
    for position in evaluator.positions() {
        assert!(position.x.abs() < 0.5);
        assert!(position.y.abs() < 0.5);
        assert!(position.z.abs() < 0.5);
    }
}

#[test]
fn test_refine_follows_moved_control_points() {
    let base = unit_quad();
    let mut evaluator = SubdivisionEvaluator::new(
        &base,
        EvaluatorOptions {
            scheme: Scheme::Simple,
            level: 1,
        },
    )
    .expect("Failed to refine quad");

    // Re-refining with a translated mesh translates every refined vertex.
    let moved = BaseMesh::new(
        vec![
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ],
        vec![4],
        vec![0, 1, 2, 3],
    )
    .expect("Failed to create quad mesh");
    evaluator.refine(&moved).expect("Failed to re-refine");
    for position in evaluator.positions() {
        assert!((position.z - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_refine_rejects_topology_mismatch() {
    let base = unit_quad();
    let mut evaluator = SubdivisionEvaluator::new(&base, EvaluatorOptions::default())
        .expect("Failed to refine quad");
    let other = cube();
    assert!(evaluator.refine(&other).is_err());
}

#[test]
fn test_sample_normal_on_planar_quad() {
    let base = unit_quad();
    let evaluator = SubdivisionEvaluator::new(
        &base,
        EvaluatorOptions {
            scheme: Scheme::Simple,
            level: 2,
        },
    )
    .expect("Failed to refine quad");

    // A counter-clockwise quad in the xy plane has +z normals everywhere,
    // for every corner grid.
    for grid in 0..evaluator.grid_count() {
        for y in 0..evaluator.grid_side() {
            for x in 0..evaluator.grid_side() {
                let normal = evaluator.sample(grid, x, y).normal();
                assert!(
                    (normal.z - 1.0).abs() < 1e-5,
                    "grid {} sample ({}, {}) normal {:?}",
                    grid,
                    x,
                    y,
                    normal
                );
            }
        }
    }
}

#[test]
fn test_invalid_topology_rejected() {
    // Arity sum does not match the index list.
    assert!(BaseMesh::new(vec![[0.0; 3]; 4], vec![4], vec![0, 1, 2]).is_err());
    // Degenerate two-corner face.
    assert!(BaseMesh::new(vec![[0.0; 3]; 4], vec![2], vec![0, 1]).is_err());
    // Out-of-range vertex index.
    #[cfg(feature = "topology_validation")]
    assert!(BaseMesh::new(vec![[0.0; 3]; 3], vec![4], vec![0, 1, 2, 7]).is_err());
}

#[test]
fn test_non_manifold_edge_rejected() {
    // Three quads sharing the edge (0, 1).
    let result = SubdivisionEvaluator::new(
        &BaseMesh::new(
            vec![[0.0; 3]; 8],
            vec![4, 4, 4],
            vec![0, 1, 2, 3, 1, 0, 4, 5, 0, 1, 6, 7],
        )
        .expect("Failed to create mesh"),
        EvaluatorOptions::default(),
    );
    assert!(result.is_err());
}
