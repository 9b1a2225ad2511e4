//! Bounded frame handoff between a track's worker and its consumer
//!
//! **Architecture:**
//! - The execution loop produces encoded frames; the playback side consumes
//!   them. This buffer is the only point where the two threads meet.
//! - Capacity is measured in buffered milliseconds, not frames, because
//!   frame size depends on the output format.
//! - A full buffer blocks the producer until a frame is consumed, the
//!   buffer is cleared, or it is terminated.
//!
//! **Seek handling:** [`request_clear`](FrameBuffer::request_clear) marks
//! everything buffered as stale. From then until [`clear`](FrameBuffer::clear)
//! is called by the worker, consumers see no data and producers have their
//! frames discarded, so no pre-seek audio escapes after a seek request.

use crate::format::AudioFrame;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProduceOutcome {
    Accepted,
    /// Dropped because a clear is pending
    Discarded,
    /// Dropped because the buffer was terminated
    Terminated,
}

/// How long `consume` may wait for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeMode {
    NonBlocking,
    Timeout(Duration),
    Blocking,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeResult {
    Frame(AudioFrame),
    /// Nothing buffered yet; try again later
    NoDataYet,
    /// No more frames will ever arrive
    Terminated,
}

#[derive(Default)]
struct BufferState {
    frames: VecDeque<AudioFrame>,
    buffered_ms: i64,
    clear_pending: bool,
    finished: bool,
    terminated: bool,
}

impl BufferState {
    fn is_done(&self) -> bool {
        self.terminated || (self.finished && self.frames.is_empty())
    }
}

pub struct FrameBuffer {
    capacity_ms: i64,
    state: Mutex<BufferState>,
    frame_available: Condvar,
    space_available: Condvar,
}

impl FrameBuffer {
    pub fn new(capacity_ms: u64) -> Self {
        Self {
            capacity_ms: capacity_ms.max(1) as i64,
            state: Mutex::new(BufferState::default()),
            frame_available: Condvar::new(),
            space_available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity_ms(&self) -> i64 {
        self.capacity_ms
    }

    /// Adds a frame, blocking while the buffer is full
    ///
    /// An empty buffer always accepts, so a single frame longer than the
    /// capacity cannot wedge the producer.
    pub fn produce(&self, frame: AudioFrame) -> ProduceOutcome {
        let duration = frame.duration_ms();
        let mut state = self.lock();

        loop {
            if state.terminated || state.finished {
                return ProduceOutcome::Terminated;
            }
            if state.clear_pending {
                return ProduceOutcome::Discarded;
            }
            if state.frames.is_empty() || state.buffered_ms + duration <= self.capacity_ms {
                break;
            }
            state = self
                .space_available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        state.buffered_ms += duration;
        state.frames.push_back(frame);
        drop(state);

        self.frame_available.notify_one();
        ProduceOutcome::Accepted
    }

    /// Takes the oldest frame
    pub fn consume(&self, mode: ConsumeMode) -> ConsumeResult {
        let deadline = match mode {
            ConsumeMode::Timeout(timeout) => Some(Instant::now() + timeout),
            _ => None,
        };
        let mut state = self.lock();

        loop {
            if state.terminated {
                return ConsumeResult::Terminated;
            }
            if !state.clear_pending {
                if let Some(frame) = state.frames.pop_front() {
                    state.buffered_ms -= frame.duration_ms();
                    drop(state);
                    self.space_available.notify_one();
                    return ConsumeResult::Frame(frame);
                }
                if state.finished {
                    return ConsumeResult::Terminated;
                }
            }

            state = match (mode, deadline) {
                (ConsumeMode::NonBlocking, _) => return ConsumeResult::NoDataYet,
                (ConsumeMode::Timeout(_), Some(deadline)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return ConsumeResult::NoDataYet;
                    }
                    self.frame_available
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
                _ => self
                    .frame_available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    /// Marks buffered frames stale until the next [`clear`](Self::clear)
    ///
    /// Ignored once the producer has finished, since nobody would clear.
    pub fn request_clear(&self) {
        let mut state = self.lock();
        if state.finished || state.terminated {
            return;
        }
        state.clear_pending = true;
        drop(state);
        self.space_available.notify_all();
    }

    /// Drops every buffered frame and lifts a pending clear request
    pub fn clear(&self) {
        let mut state = self.lock();
        state.frames.clear();
        state.buffered_ms = 0;
        state.clear_pending = false;
        drop(state);
        self.space_available.notify_all();
    }

    /// No more frames will be produced; consumers drain what is left.
    /// Frames already marked stale are dropped instead.
    pub fn finish(&self) {
        let mut state = self.lock();
        state.finished = true;
        if state.clear_pending {
            state.frames.clear();
            state.buffered_ms = 0;
            state.clear_pending = false;
        }
        drop(state);
        self.frame_available.notify_all();
        self.space_available.notify_all();
    }

    /// Ends the buffer immediately, dropping buffered frames
    pub fn terminate(&self) {
        let mut state = self.lock();
        state.terminated = true;
        state.frames.clear();
        state.buffered_ms = 0;
        drop(state);
        self.frame_available.notify_all();
        self.space_available.notify_all();
    }

    /// Whether consumers have seen or will next see the end
    pub fn is_done(&self) -> bool {
        self.lock().is_done()
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    pub fn buffered_ms(&self) -> i64 {
        self.lock().buffered_ms
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::AudioDataFormat;
    use lavastream_common::settings::OutputFormat;
    use std::sync::Arc;
    use std::thread;

    fn frame(timecode_ms: i64) -> AudioFrame {
        let format = AudioDataFormat::from_output_format(OutputFormat::Opus);
        AudioFrame {
            timecode_ms,
            volume: 100,
            format,
            data: format.silence_bytes(),
        }
    }

    #[test]
    fn test_fifo_order() {
        let buffer = FrameBuffer::new(100);
        for t in [0, 20, 40] {
            assert_eq!(buffer.produce(frame(t)), ProduceOutcome::Accepted);
        }
        assert_eq!(buffer.buffered_ms(), 60);
        for t in [0, 20, 40] {
            assert_eq!(buffer.consume(ConsumeMode::NonBlocking), ConsumeResult::Frame(frame(t)));
        }
        assert_eq!(buffer.consume(ConsumeMode::NonBlocking), ConsumeResult::NoDataYet);
    }

    #[test]
    fn test_full_buffer_blocks_until_consumed() {
        let buffer = Arc::new(FrameBuffer::new(40));
        buffer.produce(frame(0));
        buffer.produce(frame(20));

        let producer = {
            let buffer = buffer.clone();
            thread::spawn(move || buffer.produce(frame(40)))
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());
        assert_eq!(buffer.len(), 2);

        assert!(matches!(buffer.consume(ConsumeMode::Blocking), ConsumeResult::Frame(_)));
        assert_eq!(producer.join().unwrap(), ProduceOutcome::Accepted);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_clear_drops_stale_frames() {
        let buffer = FrameBuffer::new(1000);
        buffer.produce(frame(0));
        buffer.produce(frame(20));

        buffer.request_clear();
        assert_eq!(buffer.consume(ConsumeMode::NonBlocking), ConsumeResult::NoDataYet);
        assert_eq!(buffer.produce(frame(40)), ProduceOutcome::Discarded);

        buffer.clear();
        buffer.produce(frame(5000));
        assert_eq!(
            buffer.consume(ConsumeMode::NonBlocking),
            ConsumeResult::Frame(frame(5000))
        );
    }

    #[test]
    fn test_terminate_releases_blocked_producer() {
        let buffer = Arc::new(FrameBuffer::new(20));
        buffer.produce(frame(0));

        let producer = {
            let buffer = buffer.clone();
            thread::spawn(move || buffer.produce(frame(20)))
        };
        thread::sleep(Duration::from_millis(20));
        buffer.terminate();

        assert_eq!(producer.join().unwrap(), ProduceOutcome::Terminated);
        assert_eq!(buffer.consume(ConsumeMode::Blocking), ConsumeResult::Terminated);
        assert_eq!(buffer.produce(frame(40)), ProduceOutcome::Terminated);
    }

    #[test]
    fn test_finish_drains_then_terminates() {
        let buffer = FrameBuffer::new(100);
        buffer.produce(frame(0));
        buffer.finish();
        assert!(!buffer.is_done());
        assert!(matches!(buffer.consume(ConsumeMode::Blocking), ConsumeResult::Frame(_)));
        assert_eq!(buffer.consume(ConsumeMode::Blocking), ConsumeResult::Terminated);
        assert!(buffer.is_done());
    }

    #[test]
    fn test_timeout_is_not_termination() {
        let buffer = FrameBuffer::new(100);
        let started = Instant::now();
        assert_eq!(
            buffer.consume(ConsumeMode::Timeout(Duration::from_millis(30))),
            ConsumeResult::NoDataYet
        );
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
