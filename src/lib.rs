//! Voxel simulation core: chunked sparse volumes, connectivity analysis,
//! rigid-body detachment, and a fixed-timestep scene tick loop.
//!
//! This crate has no rendering, networking, or persistence surface — see
//! each module's header for what it does and does not own.

pub mod chunk;
pub mod connectivity;
pub mod detachment;
pub mod error;
pub mod material;
pub mod math;
pub mod object_world;
pub mod particle;
pub mod perf;
pub mod rigid_body;
pub mod rng;
pub mod scene;
pub mod spatial_hash;
pub mod volume;

pub use error::{SimError, SimResult};
pub use material::{MaterialDescriptor, MaterialId, MaterialRegistry, MATERIAL_EMPTY};
pub use math::{Aabb, Mat3, Quat, Vec3, EPSILON};
pub use rng::Rng;
pub use scene::{Scene, SceneKind};
pub use volume::Volume;
