//! toy spacetime fabric: a lattice of metric tensors, their curvature, and
//! the scalar, spinor and electromagnetic fields that source it, with charged
//! test particles moving along geodesics.

pub mod config;
pub mod curvature;
pub mod dirac;
pub mod dump;
pub mod ecs;
pub mod electromagnetism;
pub mod error;
pub mod fabric;
pub mod geodesic;
pub mod gravity;
pub mod lattice;
pub mod metric;
pub mod relativity;
pub mod sanitize;
pub mod scalar_field;

pub use config::{Constants, FabricConfig};
pub use curvature::CurvatureField;
pub use error::{FabricError, FabricResult};
pub use fabric::Fabric;
pub use lattice::{Boundary, Lattice};
pub use metric::{Metric, MetricKind};
pub use relativity::{FourForce, FourVector, FourVelocity};
pub use sanitize::NanPolicy;
