//! Mathematical utilities and data structures

pub mod aabb;
pub mod interp;

pub use aabb::Aabb;
pub use interp::{lerp, smoothstep, tunable_smoothstep};
