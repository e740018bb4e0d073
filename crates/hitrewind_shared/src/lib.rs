//! # HITREWIND Shared
//!
//! Value types used by the rewind engine and by whoever feeds it poses.
//!
//! ## CRITICAL RULE
//!
//! Interpolation here must stay deterministic. The engine applies poses and
//! runs broad-phase tests with the same functions; any divergence between
//! the two produces hits against volumes that were never there.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;

pub use constants::{DEFAULT_HISTORY_DEPTH, DEFAULT_SAMPLING_INTERVAL, DEFAULT_TICK_RATE, TIME_ERROR_MARGIN};
pub use math::{lerp, Aabb, Mat4, Quaternion, Ray, Transform, Vec3};
