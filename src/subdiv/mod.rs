//! Uniform subdivision of a base mesh.
//!
//! The evaluator refines a [`BaseMesh`](crate::mesh::BaseMesh) a fixed
//! number of levels and exposes the result per base-face corner: every
//! corner owns a square sample grid with positions and a tangent basis at
//! each grid coordinate (see [`SubdivisionEvaluator`]).
//!
//! Subdivision weights are purely topological, so each refinement step is
//! recorded as a [`StencilTable`]: a sparse linear map from the previous
//! level's vertices to the next. Moving control points only requires
//! re-applying the tables, and an explicit dirty face set restricts that to
//! the affected rows.

mod evaluator;
mod stencil;
pub(crate) mod topology;

pub use evaluator::{EvaluatorOptions, LimitSample, Scheme, SubdivisionEvaluator};
pub use stencil::{Stencil, StencilTable};
pub use topology::grid_side;
