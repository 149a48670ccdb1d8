//! Named volumes used as build scratch space.

mod store;

pub use store::VolumeStore;
