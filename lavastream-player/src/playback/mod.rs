//! Track execution and the frame handoff to the playback side

pub mod events;
pub mod executor;
pub mod frame_buffer;
pub mod options;
pub mod stall;

pub use events::{EndReason, TrackEvent};
pub use executor::{ExecutorState, TrackExecutor, DECODE_FAILURE, PLAYBACK_FAILURE};
pub use frame_buffer::{ConsumeMode, ConsumeResult, FrameBuffer, ProduceOutcome};
pub use options::PlayerOptions;
pub use stall::{DiagnosticSnapshot, StallWatchdog};
