//! # HITREWIND Demo Server
//!
//! A headless fixed-step server that exercises the rewind engine end to
//! end: bots move, clients see them late and fire, and the server judges
//! each shot against the world the shooter saw.
//!
//! ## Data Flow
//!
//! ```text
//!  simulation thread                         client thread
//!  ─────────────────                         ─────────────
//!  drain shots ──> rewind, raycast, restore
//!  step bots   ──> capture frame
//!  send view   ───────── WorldView ────────> delay queue
//!                                            fire at visible view
//!  <──────────────────── ShotRequest ─────── (bounded channel)
//! ```
//!
//! Rewinds only ever happen on the simulation thread.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod client;
pub mod error;
pub mod scenario;
pub mod shots;
pub mod sim;

pub use client::{LaggedClient, WorldView};
pub use error::{ServerError, ServerResult};
pub use scenario::ScenarioConfig;
pub use shots::{shot_channel, ShotOutcome, ShotRequest, ShotResolver, ShotSender, ShotStats};
pub use sim::{Bot, Simulation, CHEST_HEIGHT, EYE_HEIGHT};
