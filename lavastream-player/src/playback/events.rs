//! Track lifecycle events
//!
//! Broadcast by each [`TrackExecutor`](super::TrackExecutor) to whoever
//! subscribed. A lagging subscriber loses the oldest events rather than
//! slowing the worker down.

use super::stall::DiagnosticSnapshot;
use lavastream_common::FriendlyError;
use serde::Serialize;
use uuid::Uuid;

/// Events buffered per subscriber before the oldest are dropped
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Why a track stopped producing frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Reached the end of the stream
    Finished,
    /// Stopped on request
    Stopped,
    /// Failed to load or broke while playing
    LoadFailed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackEvent {
    Started {
        executor_id: Uuid,
    },

    /// No frame was produced for longer than the stall threshold
    ///
    /// Reported once per stall; the track keeps running.
    Stuck {
        executor_id: Uuid,
        threshold_ms: u64,
        snapshot: DiagnosticSnapshot,
    },

    Exception {
        executor_id: Uuid,
        error: FriendlyError,
    },

    Ended {
        executor_id: Uuid,
        reason: EndReason,
    },
}

impl TrackEvent {
    pub fn executor_id(&self) -> Uuid {
        match self {
            TrackEvent::Started { executor_id }
            | TrackEvent::Stuck { executor_id, .. }
            | TrackEvent::Exception { executor_id, .. }
            | TrackEvent::Ended { executor_id, .. } => *executor_id,
        }
    }
}
