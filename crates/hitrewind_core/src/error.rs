//! # Rewind Error Types
//!
//! All errors that can occur while capturing, rewinding or configuring.

use thiserror::Error;

use crate::clock::Frame;
use crate::entity::EntityId;
use crate::snapshot::RewindTarget;

/// Why a rewind target was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetRejection {
    /// Older than the history window.
    TooOld {
        /// Oldest frame still addressable.
        oldest: Frame,
    },
    /// At or after the current frame.
    InFuture,
    /// Nothing has been captured for that frame (frame 0, or an empty clock).
    NoHistory,
}

impl std::fmt::Display for TargetRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooOld { oldest } => write!(f, "older than frame {oldest}"),
            Self::InFuture => f.write_str("not in the past"),
            Self::NoHistory => f.write_str("no history captured"),
        }
    }
}

/// Errors that can occur in the rewind engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RewindError {
    /// Requested target cannot be served from history.
    #[error("invalid rewind target {target} at frame {current}: {reason}")]
    InvalidRewindTarget {
        /// The target that was asked for.
        target: RewindTarget,
        /// Clock frame when the request was made.
        current: Frame,
        /// Why it was refused.
        reason: TargetRejection,
    },

    /// A capture arrived for a frame not after the last captured one.
    #[error("capture order violation on entity {entity}: frame {frame} after {last}")]
    CaptureOrderViolation {
        /// Entity whose history rejected the capture.
        entity: EntityId,
        /// Frame that was offered.
        frame: Frame,
        /// Last frame already captured.
        last: Frame,
    },

    /// Live pose writes are refused while the entity shows a historical pose.
    #[error("entity {0} is rewound")]
    EntityRewound(EntityId),

    /// Hit-volume index past the end of the entity's volume list.
    #[error("volume index {index} out of range for entity {entity} ({count} volumes)")]
    VolumeIndexOutOfRange {
        /// Entity addressed.
        entity: EntityId,
        /// Index that was asked for.
        index: usize,
        /// Number of volumes the entity has.
        count: usize,
    },

    /// Entity history was sized for a different depth than the coordinator's.
    #[error("entity {entity} has history depth {actual}, coordinator expects {expected}")]
    HistoryDepthMismatch {
        /// Entity being registered.
        entity: EntityId,
        /// Coordinator depth.
        expected: usize,
        /// Entity depth.
        actual: usize,
    },

    /// Invalid configuration values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    ConfigIo(String),
}

impl RewindError {
    /// Attributes an entity-scoped error raised below the entity layer.
    #[must_use]
    pub fn for_entity(self, id: EntityId) -> Self {
        match self {
            Self::CaptureOrderViolation { frame, last, .. } => {
                Self::CaptureOrderViolation { entity: id, frame, last }
            }
            Self::VolumeIndexOutOfRange { index, count, .. } => {
                Self::VolumeIndexOutOfRange { entity: id, index, count }
            }
            other => other,
        }
    }
}

/// Result type for rewind operations.
pub type RewindResult<T> = Result<T, RewindError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RewindError::InvalidRewindTarget {
            target: RewindTarget::Frame(5),
            current: 90,
            reason: TargetRejection::TooOld { oldest: 31 },
        };
        assert_eq!(
            err.to_string(),
            "invalid rewind target frame 5 at frame 90: older than frame 31"
        );
    }

    #[test]
    fn test_for_entity_fills_owner() {
        let err = RewindError::CaptureOrderViolation { entity: EntityId::NULL, frame: 3, last: 4 }
            .for_entity(EntityId::new(7));
        assert_eq!(
            err,
            RewindError::CaptureOrderViolation { entity: EntityId::new(7), frame: 3, last: 4 }
        );
    }
}
