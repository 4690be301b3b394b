//! Base and evaluated mesh containers.
//!
//! [`BaseMesh`] holds the coarse control cage as flat index buffers: one
//! arity per face plus a flat list of vertex indices, the same shape a
//! topology descriptor takes in most subdivision libraries. Optional
//! semi-sharp creases can be attached to edges and vertices.
//!
//! ## Semi-sharp creases
//!
//! Sharpness values range from 0–10, with a value of 0 (or less) having no
//! effect on the surface and a value of 10 (or more) making the feature
//! completely sharp. Sharpness decays by one per subdivision level, so a
//! semi-sharp crease rounds off under magnification, similar to a fillet.
//! Boundary edges are implicitly infinitely sharp.
//!
//! ## Example
//! ```
//! use multires::mesh::BaseMesh;
//!
//! let mut cube = BaseMesh::new(
//!     vec![
//!         [-0.5, -0.5, 0.5],
//!         [0.5, -0.5, 0.5],
//!         [-0.5, 0.5, 0.5],
//!         [0.5, 0.5, 0.5],
//!         [-0.5, 0.5, -0.5],
//!         [0.5, 0.5, -0.5],
//!         [-0.5, -0.5, -0.5],
//!         [0.5, -0.5, -0.5],
//!     ],
//!     vec![4; 6],
//!     vec![
//!         0, 1, 3, 2, 2, 3, 5, 4, 4, 5, 7, 6, 6, 7, 1, 0, 1, 7, 5, 3, 6, 0, 2, 4,
//!     ],
//! )
//! .unwrap();
//!
//! // Crease the top rim with sharpness 2.
//! cube.creases(&[2, 3, 3, 5, 5, 4, 4, 2], &[2.0; 4]);
//! ```

use itertools::Itertools;
use slice_of_array::prelude::*;

use crate::error::{Error, Result};
use crate::Index;

static EPSILON: f32 = 0.00000001;

pub(crate) type Vector = ultraviolet::vec::Vec3;
pub(crate) type Point = Vector;
pub(crate) type Normal = Vector;

/// The coarse control mesh a multires modifier refines and displaces.
///
/// Owned by the calling application. The engine treats it as read-only
/// except for explicit rebase operations
/// ([`base_apply`](crate::modifier::MultiresModifier::base_apply) and
/// lower-level deletion), which take it by `&mut`.
#[derive(Debug, Clone)]
pub struct BaseMesh {
    positions: Vec<Point>,
    vertices_per_face: Vec<u32>,
    face_vertex_indices: Vec<u32>,
    face_offsets: Vec<u32>,
    creases: Vec<(u32, u32, f32)>,
    corner_sharpness: Vec<(u32, f32)>,
}

impl BaseMesh {
    /// Describes a mesh topology from per-face arities and a flat list of
    /// the vertex indices of each face.
    ///
    /// # Arguments
    ///
    /// * `positions` - One position per vertex.
    /// * `vertices_per_face` - The number of vertices of each face. The
    ///   length of this is the number of faces in the mesh.
    /// * `face_vertex_indices` - A flat list of the vertex indices for each
    ///   face in the mesh.
    pub fn new(
        positions: Vec<[f32; 3]>,
        vertices_per_face: Vec<u32>,
        face_vertex_indices: Vec<u32>,
    ) -> Result<Self> {
        if face_vertex_indices.len() != vertices_per_face.iter().sum::<u32>() as usize {
            return Err(Error::InvalidTopology(
                "The number of vertex indices is not equal to the sum of face arities.".to_string(),
            ));
        }
        for (face, &arity) in vertices_per_face.iter().enumerate() {
            if arity < 3 {
                return Err(Error::InvalidTopology(format!(
                    "Face {} has {} corners (minimum is 3).",
                    face, arity
                )));
            }
        }

        #[cfg(feature = "topology_validation")]
        for (i, &vertex_index) in face_vertex_indices.iter().enumerate() {
            if positions.len() <= vertex_index as usize {
                return Err(Error::InvalidTopology(format!(
                    "Vertex index[{}] = {} is out of range (should be < {}).",
                    i,
                    vertex_index,
                    positions.len()
                )));
            }
        }

        let face_offsets = std::iter::once(0)
            .chain(vertices_per_face.iter().scan(0u32, |offset, arity| {
                *offset += arity;
                Some(*offset)
            }))
            .collect();

        Ok(Self {
            positions: positions
                .into_iter()
                .map(|p| Point::new(p[0], p[1], p[2]))
                .collect(),
            vertices_per_face,
            face_vertex_indices,
            face_offsets,
            creases: Vec::new(),
            corner_sharpness: Vec::new(),
        })
    }

    /// Like [`new()`](BaseMesh::new) but taking positions as a flat `f32`
    /// buffer of `xyz` triples.
    pub fn from_flat(
        positions: &[f32],
        vertices_per_face: Vec<u32>,
        face_vertex_indices: Vec<u32>,
    ) -> Result<Self> {
        Self::new(
            positions.nest::<[f32; 3]>().to_vec(),
            vertices_per_face,
            face_vertex_indices,
        )
    }

    /// Add creases as vertex index pairs with corresponding sharpness.
    pub fn creases(&mut self, creases: &[u32], sharpness: &[f32]) -> &mut Self {
        assert!(creases.len() % 2 == 0);
        assert!(creases.len() / 2 <= sharpness.len());

        #[cfg(feature = "topology_validation")]
        for (i, &crease_vertex) in creases.iter().enumerate() {
            if self.positions.len() as u32 <= crease_vertex {
                panic!(
                    "Crease index[{}] = {} is out of range (should be < {}).",
                    i,
                    crease_vertex,
                    self.positions.len()
                );
            }
        }

        for (pair, &weight) in creases.chunks_exact(2).zip(sharpness) {
            let (a, b) = (pair[0].min(pair[1]), pair[0].max(pair[1]));
            self.creases.push((a, b, weight.clamp(0.0, 10.0)));
        }
        self
    }

    /// Add corners as vertex indices with corresponding sharpness.
    pub fn corners(&mut self, corners: &[u32], sharpness: &[f32]) -> &mut Self {
        assert!(corners.len() <= sharpness.len());

        #[cfg(feature = "topology_validation")]
        for (i, &corner) in corners.iter().enumerate() {
            if self.positions.len() as u32 <= corner {
                panic!(
                    "Corner index[{}] = {} is out of range (should be < {}).",
                    i,
                    corner,
                    self.positions.len()
                );
            }
        }

        for (&vertex, &weight) in corners.iter().zip(sharpness) {
            self.corner_sharpness.push((vertex, weight.clamp(0.0, 10.0)));
        }
        self
    }

    /// Returns the number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Returns the number of faces.
    #[inline]
    pub fn face_count(&self) -> usize {
        self.vertices_per_face.len()
    }

    /// Returns the total number of face corners (loops). This is also the
    /// number of displacement grids a multires modifier carries for this
    /// mesh.
    #[inline]
    pub fn corner_count(&self) -> usize {
        self.face_vertex_indices.len()
    }

    /// Returns the vertex indices of a face.
    #[inline]
    pub fn face_vertices(&self, face: Index) -> Option<&[u32]> {
        let face: usize = face.into();
        if face >= self.face_count() {
            return None;
        }
        let start = self.face_offsets[face] as usize;
        let end = self.face_offsets[face + 1] as usize;
        Some(&self.face_vertex_indices[start..end])
    }

    /// Returns the flat offset of a face's first corner.
    #[inline]
    pub fn face_corner_offset(&self, face: usize) -> usize {
        self.face_offsets[face] as usize
    }

    #[inline]
    pub fn position(&self, vertex: Index) -> Point {
        self.positions[usize::from(vertex)]
    }

    #[inline]
    pub(crate) fn positions(&self) -> &[Point] {
        &self.positions
    }

    #[inline]
    pub(crate) fn set_position(&mut self, vertex: usize, position: Point) {
        self.positions[vertex] = position;
    }

    #[inline]
    pub(crate) fn vertices_per_face(&self) -> &[u32] {
        &self.vertices_per_face
    }

    #[inline]
    pub(crate) fn face_vertex_indices(&self) -> &[u32] {
        &self.face_vertex_indices
    }

    /// Sharpness of the crease on edge `(a, b)`, if any.
    pub(crate) fn edge_crease(&self, a: u32, b: u32) -> f32 {
        let key = (a.min(b), a.max(b));
        self.creases
            .iter()
            .find(|&&(ca, cb, _)| (ca, cb) == key)
            .map(|&(_, _, weight)| weight)
            .unwrap_or(0.0)
    }

    /// Corner sharpness of a vertex, if any.
    pub(crate) fn vertex_sharpness(&self, vertex: u32) -> f32 {
        self.corner_sharpness
            .iter()
            .find(|&&(v, _)| v == vertex)
            .map(|&(_, weight)| weight)
            .unwrap_or(0.0)
    }

    pub(crate) fn crease_list(&self) -> &[(u32, u32, f32)] {
        &self.creases
    }
}

/// A dense evaluated mesh at some subdivision level.
///
/// This is a fresh, caller-owned value with no aliasing into the grid store
/// or the evaluator cache (copy-out, never a view), so editing it cannot
/// corrupt stored displacement.
#[derive(Debug, Clone)]
pub struct EvaluatedMesh {
    /// One position per vertex.
    pub positions: Vec<[f32; 3]>,
    /// One (recomputed) normal per vertex.
    pub normals: Vec<[f32; 3]>,
    /// The number of vertices of each face. All faces are quads for levels
    /// above 0.
    pub vertices_per_face: Vec<u32>,
    /// Flat vertex indices per face.
    pub face_vertex_indices: Vec<u32>,
    /// Optional per-vertex paint mask, present when the grid store carries
    /// mask grids.
    pub masks: Option<Vec<f32>>,
    /// The subdivision level this mesh was evaluated at.
    pub level: u8,
}

impl EvaluatedMesh {
    /// Returns the number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Returns the number of faces.
    #[inline]
    pub fn face_count(&self) -> usize {
        self.vertices_per_face.len()
    }

    /// Positions as a flat `f32` buffer.
    #[inline]
    pub fn positions_flat(&self) -> &[f32] {
        bytemuck::cast_slice(&self.positions)
    }

    /// Normals as a flat `f32` buffer.
    #[inline]
    pub fn normals_flat(&self) -> &[f32] {
        bytemuck::cast_slice(&self.normals)
    }
}

#[inline]
pub(crate) fn orthogonal(v0: &Point, v1: &Point, v2: &Point) -> Vector {
    (*v1 - *v0).cross(*v2 - *v1)
}

/// Computes the normal of a face. Tries to do the right thing if the face
/// is non-planar or degenerate.
#[inline]
pub(crate) fn face_normal(points: &[Point]) -> Option<Normal> {
    let mut considered_edges = 0;

    let normal = points.iter().circular_tuple_windows::<(_, _, _)>().fold(
        Vector::zero(),
        |normal, corner| {
            considered_edges += 1;
            let ortho_normal = orthogonal(corner.0, corner.1, corner.2);
            let mag_sq = ortho_normal.mag_sq();
            // Filter out collinear edge pairs.
            if mag_sq < EPSILON {
                normal
            } else {
                normal - ortho_normal / mag_sq.sqrt()
            }
        },
    );

    if 0 == considered_edges {
        None
    } else {
        Some(normal / considered_edges as f32)
    }
}

/// Area-weighted per-vertex normals for a polygon soup sharing one position
/// buffer.
pub(crate) fn vertex_normals(
    positions: &[Point],
    vertices_per_face: &[u32],
    face_vertex_indices: &[u32],
) -> Vec<Normal> {
    let mut normals = vec![Normal::zero(); positions.len()];

    let mut offset = 0;
    for &arity in vertices_per_face {
        let face = &face_vertex_indices[offset..offset + arity as usize];
        let points = face
            .iter()
            .map(|&index| positions[index as usize])
            .collect::<Vec<_>>();
        // `face_normal` accumulates the inward orientation; flip for
        // outward normals on counter-clockwise faces.
        if let Some(normal) = face_normal(&points) {
            for &index in face {
                normals[index as usize] -= normal;
            }
        }
        offset += arity as usize;
    }

    for normal in normals.iter_mut() {
        let mag_sq = normal.mag_sq();
        if mag_sq > EPSILON {
            *normal /= mag_sq.sqrt();
        }
    }
    normals
}
