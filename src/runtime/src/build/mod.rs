//! Ephemeral builder assembly.
//!
//! Turns a base builder image plus platform env and buildpack references
//! into a uniquely named builder carrying extra layers, and tracks the
//! image and volumes created for one build so they can be torn down.

pub mod buildpack;
pub mod inspect;
pub mod layer;
pub mod lifecycle;
pub mod names;

pub use buildpack::{parse_buildpack_ref, resolve_buildpacks, ResolvedBuildpacks};
pub use inspect::{inspect_builder, BuilderInfo};
pub use lifecycle::{BuilderHandoff, Lifecycle, LifecycleConfig};
pub use names::{NameGenerator, RandomNames};
