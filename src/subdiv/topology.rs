//! Refined topology construction.
//!
//! [`RefinedTopology`] performs the topological half of refinement once per
//! (mesh, level, scheme) combination: it derives edge and adjacency
//! information, builds one [`StencilTable`] per refinement step, and lays
//! out the per-corner index grids that address the final level.
//!
//! ## Grid convention
//!
//! Every base-face corner owns one square grid. For corner `c` of a face
//! with vertices `v0..vm`, grid point `(x, y)` (row-major, side `n`) is
//! fixed as:
//!
//! * `(0, 0)` – the face center,
//! * `(n-1, 0)` – the midpoint of the edge *preceding* the corner
//!   (`v[c-1], v[c]`),
//! * `(0, n-1)` – the midpoint of the edge *following* it (`v[c], v[c+1]`),
//! * `(n-1, n-1)` – the corner vertex itself.
//!
//! Grids computed at different times for the same face are therefore always
//! index-compatible, which is what allows displacement reuse across level
//! changes. Neighboring grids share final-level vertex indices along their
//! boundaries, so the evaluated surface is crack-free by construction.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::mesh::BaseMesh;
use crate::subdiv::evaluator::Scheme;
use crate::subdiv::stencil::{StencilTable, StencilTableBuilder};

/// Sharpness assigned to topological boundaries; never decays.
const BOUNDARY_SHARPNESS: f32 = f32::INFINITY;

/// Side length of a per-corner grid at `level`. The full face resolution of
/// a quad at `level` is `2^level + 1` per side; each of its four corner
/// grids covers one quadrant.
#[inline]
pub fn grid_side(level: u8) -> u32 {
    if level == 0 {
        1
    } else {
        (1 << (level - 1)) + 1
    }
}

/// One edge of a level's mesh.
#[derive(Debug, Clone)]
pub(crate) struct Edge {
    pub verts: [u32; 2],
    pub faces: Vec<u32>,
    pub sharpness: f32,
}

impl Edge {
    /// Boundary edges behave as infinitely sharp creases.
    #[inline]
    pub fn effective_sharpness(&self) -> f32 {
        if self.faces.len() < 2 {
            BOUNDARY_SHARPNESS
        } else {
            self.sharpness
        }
    }
}

/// Full adjacency of one refinement level.
pub(crate) struct LevelTopology {
    pub vertex_count: usize,
    pub vertices_per_face: Vec<u32>,
    pub face_vertex_indices: Vec<u32>,
    pub face_offsets: Vec<usize>,
    pub edges: Vec<Edge>,
    pub edge_map: HashMap<(u32, u32), u32>,
    pub vertex_edges: Vec<Vec<u32>>,
    pub vertex_faces: Vec<Vec<u32>>,
    pub vertex_sharpness: Vec<f32>,
}

impl LevelTopology {
    fn from_faces(
        vertex_count: usize,
        vertices_per_face: Vec<u32>,
        face_vertex_indices: Vec<u32>,
        edge_sharpness: impl Fn(u32, u32) -> f32,
        vertex_sharpness: Vec<f32>,
    ) -> Result<Self> {
        debug_assert_eq!(vertex_sharpness.len(), vertex_count);

        let mut face_offsets = Vec::with_capacity(vertices_per_face.len() + 1);
        face_offsets.push(0);
        let mut offset = 0usize;
        for &arity in &vertices_per_face {
            offset += arity as usize;
            face_offsets.push(offset);
        }

        let mut edges: Vec<Edge> = Vec::new();
        let mut edge_map = HashMap::new();
        let mut vertex_edges = vec![Vec::new(); vertex_count];
        let mut vertex_faces = vec![Vec::new(); vertex_count];

        for face in 0..vertices_per_face.len() {
            let verts = &face_vertex_indices[face_offsets[face]..face_offsets[face + 1]];
            for (i, &a) in verts.iter().enumerate() {
                let b = verts[(i + 1) % verts.len()];
                if a == b {
                    return Err(Error::InvalidTopology(format!(
                        "Face {} repeats vertex {} on an edge.",
                        face, a
                    )));
                }
                vertex_faces[a as usize].push(face as u32);

                let key = (a.min(b), a.max(b));
                let edge_index = *edge_map.entry(key).or_insert_with(|| {
                    let index = edges.len() as u32;
                    edges.push(Edge {
                        verts: [key.0, key.1],
                        faces: Vec::new(),
                        sharpness: edge_sharpness(key.0, key.1),
                    });
                    vertex_edges[key.0 as usize].push(index);
                    vertex_edges[key.1 as usize].push(index);
                    index
                });
                let edge = &mut edges[edge_index as usize];
                edge.faces.push(face as u32);
                if edge.faces.len() > 2 {
                    return Err(Error::InvalidTopology(format!(
                        "Edge ({}, {}) is shared by more than two faces.",
                        key.0, key.1
                    )));
                }
            }
        }

        Ok(Self {
            vertex_count,
            vertices_per_face,
            face_vertex_indices,
            face_offsets,
            edges,
            edge_map,
            vertex_edges,
            vertex_faces,
            vertex_sharpness,
        })
    }

    #[inline]
    pub fn face_vertices(&self, face: usize) -> &[u32] {
        &self.face_vertex_indices[self.face_offsets[face]..self.face_offsets[face + 1]]
    }

    #[inline]
    pub fn edge_index(&self, a: u32, b: u32) -> u32 {
        self.edge_map[&(a.min(b), a.max(b))]
    }
}

/// A square grid of final-level vertex indices for one base-face corner.
#[derive(Debug, Clone)]
pub struct IndexGrid {
    side: u32,
    indices: Vec<u32>,
}

impl IndexGrid {
    #[inline]
    pub fn side(&self) -> u32 {
        self.side
    }

    /// The final-level vertex index at grid coordinate `(x, y)`.
    #[inline]
    pub fn index(&self, x: u32, y: u32) -> u32 {
        debug_assert!(x < self.side && y < self.side);
        self.indices[(y * self.side + x) as usize]
    }
}

/// Topological refinement of a base mesh to a fixed level: per-step stencil
/// tables plus the final-level grid and face layout.
pub struct RefinedTopology {
    level: u8,
    scheme: Scheme,
    base_vertex_count: usize,
    corner_count: usize,
    level_vertex_counts: Vec<usize>,
    stencils: Vec<StencilTable>,
    index_grids: Vec<IndexGrid>,
    /// Base face of each grid.
    grid_face: Vec<u32>,
    /// Loop position of each grid within its base face.
    grid_corner: Vec<u32>,
    /// Arity of each grid's base face.
    grid_face_arity: Vec<u32>,
    /// Quad list of the final level (empty at level 0).
    quads: Vec<[u32; 4]>,
}

struct StepResult {
    table: StencilTable,
    edge_point_offset: usize,
    face_point_offset: usize,
    vertex_count: usize,
    child_creases: HashMap<(u32, u32), f32>,
    child_vertex_sharpness: Vec<f32>,
}

impl RefinedTopology {
    pub(crate) fn new(mesh: &BaseMesh, level: u8, scheme: Scheme) -> Result<Self> {
        let base = LevelTopology::from_faces(
            mesh.vertex_count(),
            mesh.vertices_per_face().to_vec(),
            mesh.face_vertex_indices().to_vec(),
            |a, b| mesh.edge_crease(a, b),
            (0..mesh.vertex_count() as u32)
                .map(|v| mesh.vertex_sharpness(v))
                .collect(),
        )?;

        let corner_count = mesh.corner_count();
        let mut grid_face = Vec::with_capacity(corner_count);
        let mut grid_corner = Vec::with_capacity(corner_count);
        let mut grid_face_arity = Vec::with_capacity(corner_count);
        for (face, &arity) in mesh.vertices_per_face().iter().enumerate() {
            for corner in 0..arity {
                grid_face.push(face as u32);
                grid_corner.push(corner);
                grid_face_arity.push(arity);
            }
        }

        let mut refined = Self {
            level,
            scheme,
            base_vertex_count: mesh.vertex_count(),
            corner_count,
            level_vertex_counts: vec![mesh.vertex_count()],
            stencils: Vec::new(),
            index_grids: Vec::new(),
            grid_face,
            grid_corner,
            grid_face_arity,
            quads: Vec::new(),
        };
        if level == 0 {
            return Ok(refined);
        }

        // First step splits every n-gon into n quads, one per corner.
        let step = subdivide_step(&base, scheme);
        refined.level_vertex_counts.push(step.vertex_count);
        refined.index_grids = first_level_grids(&base, &step);
        let mut level_topology = refined.quad_level(&step)?;
        refined.stencils.push(step.table);

        // Remaining steps double every grid in place.
        for _ in 2..=level {
            let step = subdivide_step(&level_topology, scheme);
            refined.level_vertex_counts.push(step.vertex_count);
            refined.refine_grids(&level_topology, &step);
            level_topology = refined.quad_level(&step)?;
            refined.stencils.push(step.table);
        }

        refined.quads = refined.collect_quads();
        Ok(refined)
    }

    #[inline]
    pub fn level(&self) -> u8 {
        self.level
    }

    #[inline]
    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    #[inline]
    pub fn base_vertex_count(&self) -> usize {
        self.base_vertex_count
    }

    #[inline]
    pub fn grid_count(&self) -> usize {
        self.corner_count
    }

    /// Vertex count at refinement step `k` (0 = base).
    #[inline]
    pub fn level_vertex_count(&self, k: u8) -> usize {
        self.level_vertex_counts[k as usize]
    }

    /// Vertex count at the final level.
    #[inline]
    pub fn final_vertex_count(&self) -> usize {
        *self.level_vertex_counts.last().unwrap()
    }

    #[inline]
    pub fn stencils(&self) -> &[StencilTable] {
        &self.stencils
    }

    #[inline]
    pub fn index_grid(&self, grid: usize) -> &IndexGrid {
        &self.index_grids[grid]
    }

    #[inline]
    pub fn grid_base_face(&self, grid: usize) -> u32 {
        self.grid_face[grid]
    }

    /// Loop position of a grid within its base face; the tangent-matrix
    /// corner for quads, unused for other arities.
    #[inline]
    pub fn grid_corner(&self, grid: usize) -> u32 {
        self.grid_corner[grid]
    }

    #[inline]
    pub fn grid_face_arity(&self, grid: usize) -> u32 {
        self.grid_face_arity[grid]
    }

    #[inline]
    pub fn quads(&self) -> &[[u32; 4]] {
        &self.quads
    }

    /// Quads of the final level in grid enumeration order (grid-major,
    /// cell rows inner).
    fn collect_quads(&self) -> Vec<[u32; 4]> {
        let mut quads = Vec::new();
        for grid in &self.index_grids {
            let n = grid.side();
            for y in 0..n - 1 {
                for x in 0..n - 1 {
                    quads.push([
                        grid.index(x, y),
                        grid.index(x + 1, y),
                        grid.index(x + 1, y + 1),
                        grid.index(x, y + 1),
                    ]);
                }
            }
        }
        quads
    }

    /// Assemble the next level's adjacency from the current grids and the
    /// step that produced them.
    fn quad_level(&self, step: &StepResult) -> Result<LevelTopology> {
        let quads = self.collect_quads();
        let mut vertices_per_face = Vec::with_capacity(quads.len());
        let mut face_vertex_indices = Vec::with_capacity(quads.len() * 4);
        for quad in &quads {
            vertices_per_face.push(4);
            face_vertex_indices.extend_from_slice(quad);
        }
        let creases = step.child_creases.clone();
        LevelTopology::from_faces(
            step.vertex_count,
            vertices_per_face,
            face_vertex_indices,
            move |a, b| {
                creases
                    .get(&(a.min(b), a.max(b)))
                    .copied()
                    .unwrap_or(0.0)
            },
            step.child_vertex_sharpness.clone(),
        )
    }

    /// Double every grid: old points become vertex points at even
    /// coordinates, new odd coordinates take the step's edge and face
    /// points.
    fn refine_grids(&mut self, topology: &LevelTopology, step: &StepResult) {
        let mut quad_offset = 0u32;
        for grid in self.index_grids.iter_mut() {
            let n = grid.side;
            let m = 2 * n - 1;
            let cells = n - 1;
            let mut indices = vec![0u32; (m * m) as usize];

            for y in 0..n {
                for x in 0..n {
                    indices[(2 * y * m + 2 * x) as usize] = grid.index(x, y);
                }
            }
            for cy in 0..cells {
                for cx in 0..cells {
                    let face = quad_offset + cy * cells + cx;
                    indices[((2 * cy + 1) * m + 2 * cx + 1) as usize] =
                        (step.face_point_offset as u32) + face;
                }
            }
            for y in 0..n {
                for x in 0..cells {
                    let edge = topology.edge_index(grid.index(x, y), grid.index(x + 1, y));
                    indices[(2 * y * m + 2 * x + 1) as usize] =
                        (step.edge_point_offset as u32) + edge;
                }
            }
            for y in 0..cells {
                for x in 0..n {
                    let edge = topology.edge_index(grid.index(x, y), grid.index(x, y + 1));
                    indices[((2 * y + 1) * m + 2 * x) as usize] =
                        (step.edge_point_offset as u32) + edge;
                }
            }

            quad_offset += cells * cells;
            grid.side = m;
            grid.indices = indices;
        }
    }
}

/// Lay out the side-2 grids produced by the first (n-gon) step.
fn first_level_grids(base: &LevelTopology, step: &StepResult) -> Vec<IndexGrid> {
    let mut grids = Vec::new();
    for face in 0..base.vertices_per_face.len() {
        let verts = base.face_vertices(face);
        let arity = verts.len();
        for corner in 0..arity {
            let vertex = verts[corner];
            let prev = verts[(corner + arity - 1) % arity];
            let next = verts[(corner + 1) % arity];
            let face_point = (step.face_point_offset + face) as u32;
            let prev_edge_point = step.edge_point_offset as u32 + base.edge_index(prev, vertex);
            let next_edge_point = step.edge_point_offset as u32 + base.edge_index(vertex, next);
            grids.push(IndexGrid {
                side: 2,
                // Row-major: (0,0) center, (1,0) previous-edge midpoint,
                // (0,1) next-edge midpoint, (1,1) corner vertex.
                indices: vec![face_point, prev_edge_point, next_edge_point, vertex],
            });
        }
    }
    grids
}

/// One refinement step: stencils for vertex, edge and face points over the
/// previous level, plus the sharpness values the children inherit.
fn subdivide_step(topology: &LevelTopology, scheme: Scheme) -> StepResult {
    let vertex_count = topology.vertex_count;
    let edge_count = topology.edges.len();
    let face_count = topology.vertices_per_face.len();
    let new_vertex_count = vertex_count + edge_count + face_count;

    let mut builder = StencilTableBuilder::new(vertex_count);

    // Vertex points keep their indices.
    for vertex in 0..vertex_count as u32 {
        match scheme {
            Scheme::Simple => builder.add(vertex, 1.0),
            Scheme::CatmullClark => vertex_point_stencil(topology, vertex, &mut builder),
        }
        builder.end_row();
    }

    // Edge points at `vertex_count + edge`.
    for edge in &topology.edges {
        match scheme {
            Scheme::Simple => {
                builder.add(edge.verts[0], 0.5);
                builder.add(edge.verts[1], 0.5);
            }
            Scheme::CatmullClark => edge_point_stencil(topology, edge, &mut builder),
        }
        builder.end_row();
    }

    // Face points at `vertex_count + edge_count + face`.
    for face in 0..face_count {
        let verts = topology.face_vertices(face);
        let weight = 1.0 / verts.len() as f32;
        for &vertex in verts {
            builder.add(vertex, weight);
        }
        builder.end_row();
    }

    // Semi-sharp creases decay by one per level; both halves of a crease
    // edge inherit through the new edge point.
    let mut child_creases = HashMap::new();
    for (index, edge) in topology.edges.iter().enumerate() {
        if edge.sharpness > 1.0 {
            let edge_point = (vertex_count + index) as u32;
            let sharpness = edge.sharpness - 1.0;
            for &end in &edge.verts {
                let key = (end.min(edge_point), end.max(edge_point));
                child_creases.insert(key, sharpness);
            }
        }
    }
    let mut child_vertex_sharpness = vec![0.0; new_vertex_count];
    for vertex in 0..vertex_count {
        let sharpness = topology.vertex_sharpness[vertex];
        if sharpness > 1.0 {
            child_vertex_sharpness[vertex] = sharpness - 1.0;
        }
    }

    StepResult {
        table: builder.build(),
        edge_point_offset: vertex_count,
        face_point_offset: vertex_count + edge_count,
        vertex_count: new_vertex_count,
        child_creases,
        child_vertex_sharpness,
    }
}

/// Catmull-Clark edge point: the average of the endpoints and the two
/// adjacent face centroids, blended toward the plain midpoint by crease
/// sharpness. Boundary edges use the midpoint.
fn edge_point_stencil(topology: &LevelTopology, edge: &Edge, builder: &mut StencilTableBuilder) {
    let sharp = edge.effective_sharpness().clamp(0.0, 1.0);
    let smooth = 1.0 - sharp;

    builder.add(edge.verts[0], 0.5 * sharp);
    builder.add(edge.verts[1], 0.5 * sharp);

    if smooth > 0.0 {
        builder.add(edge.verts[0], 0.25 * smooth);
        builder.add(edge.verts[1], 0.25 * smooth);
        for &face in &edge.faces {
            let verts = topology.face_vertices(face as usize);
            let weight = 0.25 * smooth / verts.len() as f32;
            for &vertex in verts {
                builder.add(vertex, weight);
            }
        }
    }
}

/// Catmull-Clark vertex point. Rule selection follows the number of sharp
/// (or boundary) incident edges: fewer than two leaves the vertex smooth,
/// exactly two makes it a crease, more pins it as a corner. Fractional
/// sharpness blends the crease rule with the smooth rule; vertex corner
/// sharpness finally blends toward the unmoved position.
fn vertex_point_stencil(topology: &LevelTopology, vertex: u32, builder: &mut StencilTableBuilder) {
    let incident_edges = &topology.vertex_edges[vertex as usize];
    let incident_faces = &topology.vertex_faces[vertex as usize];
    let valence = incident_edges.len();

    let sharp_edges: Vec<&Edge> = incident_edges
        .iter()
        .map(|&edge| &topology.edges[edge as usize])
        .filter(|edge| edge.effective_sharpness() > 0.0)
        .collect();

    let vertex_blend = topology.vertex_sharpness[vertex as usize].clamp(0.0, 1.0);
    let moved = 1.0 - vertex_blend;
    if vertex_blend > 0.0 {
        builder.add(vertex, vertex_blend);
    }
    if moved == 0.0 {
        return;
    }

    match sharp_edges.len() {
        0 | 1 => smooth_vertex_stencil(topology, vertex, valence, incident_faces, moved, builder),
        2 => {
            let crease_blend = sharp_edges
                .iter()
                .map(|edge| edge.effective_sharpness().clamp(0.0, 1.0))
                .sum::<f32>()
                / 2.0;
            let smooth_blend = 1.0 - crease_blend;

            // Crease rule: 3/4 of the vertex, 1/8 of each opposite end of
            // the two crease edges.
            builder.add(vertex, 0.75 * crease_blend * moved);
            for edge in &sharp_edges {
                let other = if edge.verts[0] == vertex {
                    edge.verts[1]
                } else {
                    edge.verts[0]
                };
                builder.add(other, 0.125 * crease_blend * moved);
            }
            if smooth_blend > 0.0 {
                smooth_vertex_stencil(
                    topology,
                    vertex,
                    valence,
                    incident_faces,
                    smooth_blend * moved,
                    builder,
                );
            }
        }
        _ => builder.add(vertex, moved),
    }
}

/// The interior smooth rule `(F + 2R + (n-3)P) / n` over the previous
/// level, with face centroids expanded into their vertices.
fn smooth_vertex_stencil(
    topology: &LevelTopology,
    vertex: u32,
    valence: usize,
    incident_faces: &[u32],
    scale: f32,
    builder: &mut StencilTableBuilder,
) {
    let n = valence as f32;
    builder.add(vertex, scale * (n - 3.0) / n);

    // 2R/n: each incident edge midpoint contributes 1/n^2 per endpoint.
    let edge_weight = scale / (n * n);
    for &edge in &topology.vertex_edges[vertex as usize] {
        let edge = &topology.edges[edge as usize];
        builder.add(edge.verts[0], edge_weight);
        builder.add(edge.verts[1], edge_weight);
    }

    // F/n: incident face centroids.
    for &face in incident_faces {
        let verts = topology.face_vertices(face as usize);
        let weight = scale / (n * n * verts.len() as f32);
        for &v in verts {
            builder.add(v, weight);
        }
    }
}
