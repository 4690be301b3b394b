//! # Multi-Resolution Subdivision Displacement
//!
//! `multires` reconstructs a dense, sculpted surface from three pieces of
//! data: a coarse polygonal *base mesh*, a [subdivision
//! surface](https://en.wikipedia.org/wiki/Subdivision_surface) refinement of
//! it, and per-face-corner grids of *tangent-space displacement* applied on
//! top of the smooth surface.
//!
//! The crate is split along those lines:
//!
//! * [`mesh`] – the [`BaseMesh`](mesh::BaseMesh) input description and the
//!   dense [`EvaluatedMesh`](mesh::EvaluatedMesh) output.
//! * [`subdiv`] – uniform refinement of the base mesh. Each refined vertex is
//!   a linear blend of the previous level, so refinement is expressed as
//!   per-level [stencil tables](subdiv::StencilTable) that can be re-applied
//!   cheaply whenever control points move.
//! * [`grids`] – the displacement [`GridStore`](grids::GridStore): one grid
//!   of offset vectors per base-face corner ("ptex face"), plus optional
//!   paint-mask grids.
//! * [`modifier`] – the [`MultiresModifier`](modifier::MultiresModifier)
//!   combining evaluator and store, with level management (subdivide, delete
//!   levels, apply base).
//! * [`reshape`] – rebuilding displacement from an externally edited dense
//!   mesh or a deform pass.
//! * [`legacy`] – the persisted grid layout and the loader for the old
//!   face-level displacement format.
//!
//! ## Example
//!
//! ```
//! use multires::mesh::BaseMesh;
//! use multires::modifier::MultiresModifier;
//! use multires::subdiv::Scheme;
//!
//! // A unit quad.
//! let base = BaseMesh::new(
//!     vec![
//!         [0.0, 0.0, 0.0],
//!         [1.0, 0.0, 0.0],
//!         [1.0, 1.0, 0.0],
//!         [0.0, 1.0, 0.0],
//!     ],
//!     vec![4],
//!     vec![0, 1, 2, 3],
//! )
//! .unwrap();
//!
//! let mut modifier = MultiresModifier::new(&base, 2, Scheme::Simple).unwrap();
//! let evaluated = modifier.evaluate(&base, 2).unwrap();
//!
//! // Level 2 of a single quad is a 5×5 vertex patch.
//! assert_eq!(evaluated.vertex_count(), 25);
//! ```

pub mod error;
pub mod grids;
pub mod legacy;
pub mod mesh;
pub mod modifier;
pub mod reshape;
pub mod subdiv;

pub use error::{Error, Result};

/// A vertex, edge, or face index in the topology.
///
/// # Examples
///
/// ```
/// use multires::Index;
///
/// let idx = Index::from(42u32);
/// assert_eq!(idx.0, 42);
///
/// let value: u32 = idx.into();
/// assert_eq!(value, 42);
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    derive_more::From,
    derive_more::Into,
    derive_more::Display,
)]
#[repr(transparent)]
pub struct Index(pub u32);

impl From<usize> for Index {
    fn from(value: usize) -> Self {
        Index(value as u32)
    }
}

impl From<Index> for usize {
    fn from(index: Index) -> Self {
        index.0 as usize
    }
}
