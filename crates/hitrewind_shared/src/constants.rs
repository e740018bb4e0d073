//! # Engine Defaults
//!
//! Values used when no config file overrides them.

// =============================================================================
// HISTORY
// =============================================================================

/// Frames of history kept per entity (one second at the default tick rate)
pub const DEFAULT_HISTORY_DEPTH: usize = 60;

/// Capture a real snapshot every N frames
pub const DEFAULT_SAMPLING_INTERVAL: usize = 1;

// =============================================================================
// TIMING
// =============================================================================

/// Fixed simulation steps per second
pub const DEFAULT_TICK_RATE: u32 = 60;

/// Fraction of a frame within which a seconds-ago target snaps to a whole frame
pub const TIME_ERROR_MARGIN: f64 = 0.001;

/// Minimum supported tick rate
pub const MIN_TICK_RATE: u32 = 1;

/// Maximum supported tick rate
pub const MAX_TICK_RATE: u32 = 1000;
