//! Per-track execution loop
//!
//! **State machine:**
//! ```text
//! Initializing -> Demuxing <-> SeekRequested
//!                    |
//!                 Draining -> Closed
//! (any non-terminal) -> Errored -> Closed
//! ```
//!
//! The loop runs on one dedicated worker thread per track. Seek and stop
//! requests are queued in atomics and picked up between packets; a stop
//! also terminates the frame buffer so a worker blocked on a full buffer
//! wakes immediately. Every exit path goes through the router and demuxer
//! destructors, so native handles and inputs are released exactly once.

use super::events::{EndReason, TrackEvent, EVENT_CHANNEL_CAPACITY};
use super::frame_buffer::{ConsumeMode, ConsumeResult, FrameBuffer, ProduceOutcome};
use super::options::PlayerOptions;
use super::stall::{DiagnosticSnapshot, StageStack};
use crate::codec::DecodeRouter;
use crate::container::{ContainerDetection, DetectionResult, Demuxer, ProbeRegistry};
use crate::error::{Error, Result};
use crate::filter::FrameSink;
use crate::format::{AudioDataFormat, AudioFrame};
use crate::io::{SavedHeadInput, SeekableInput, TrackSource};
use lavastream_common::friendly::{FriendlyError, Severity};
use lavastream_common::ContainerDescriptor;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Message for failures while demuxing or decoding
pub const DECODE_FAILURE: &str = "Something went wrong when decoding the track.";

/// Message for any other failure of the loop
pub const PLAYBACK_FAILURE: &str = "Something broke when playing the track.";

const NO_SEEK: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorState {
    Initializing,
    Demuxing,
    SeekRequested,
    Draining,
    Closed,
    Errored,
}

impl ExecutorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ExecutorState::Initializing,
            1 => ExecutorState::Demuxing,
            2 => ExecutorState::SeekRequested,
            3 => ExecutorState::Draining,
            4 => ExecutorState::Closed,
            _ => ExecutorState::Errored,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ExecutorState::Initializing => 0,
            ExecutorState::Demuxing => 1,
            ExecutorState::SeekRequested => 2,
            ExecutorState::Draining => 3,
            ExecutorState::Closed => 4,
            ExecutorState::Errored => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seekability {
    Unknown = 0,
    Seekable = 1,
    NotSeekable = 2,
}

/// What the worker needs to load the track
struct LoadJob {
    source: Arc<dyn TrackSource>,
    descriptor: Option<ContainerDescriptor>,
    registry: Arc<ProbeRegistry>,
}

/// State shared between the worker and the controlling side
struct Shared {
    id: Uuid,
    identifier: String,
    worker_name: String,
    options: Arc<PlayerOptions>,
    buffer: Arc<FrameBuffer>,
    events: broadcast::Sender<TrackEvent>,
    stages: StageStack,
    state: AtomicU8,
    seekability: AtomicU8,
    queued_seek: AtomicI64,
    queued_stop: AtomicBool,
    last_consumed_ms: AtomicI64,
    last_produced_ms: AtomicI64,
    created: Instant,
    last_progress_at_ms: AtomicU64,
    stuck_reported: AtomicBool,
}

impl Shared {
    fn state(&self) -> ExecutorState {
        ExecutorState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ExecutorState) {
        let previous = ExecutorState::from_u8(self.state.swap(state.as_u8(), Ordering::AcqRel));
        if previous != state {
            debug!(track = %self.identifier, "State {:?} -> {:?}", previous, state);
        }
    }

    fn emit(&self, event: TrackEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn elapsed_ms(&self) -> u64 {
        self.created.elapsed().as_millis() as u64
    }

    fn touch_progress(&self) {
        self.last_progress_at_ms
            .store(self.elapsed_ms(), Ordering::Release);
        self.stuck_reported.store(false, Ordering::Release);
    }

    fn frame_produced(&self, timecode_ms: i64) {
        self.last_produced_ms.store(timecode_ms, Ordering::Release);
        self.touch_progress();
    }

    fn idle_ms(&self) -> u64 {
        self.elapsed_ms()
            .saturating_sub(self.last_progress_at_ms.load(Ordering::Acquire))
    }
}

/// Hands encoded frames to the frame buffer from inside the filter chain
struct BufferSink {
    shared: Arc<Shared>,
}

impl FrameSink for BufferSink {
    fn deliver(&mut self, frame: AudioFrame) -> Result<()> {
        let timecode_ms = frame.timecode_ms;
        let _stage = self.shared.stages.enter("produce frame");

        match self.shared.buffer.produce(frame) {
            ProduceOutcome::Accepted => {
                self.shared.frame_produced(timecode_ms);
                Ok(())
            }
            ProduceOutcome::Discarded => Ok(()),
            ProduceOutcome::Terminated => Err(Error::Stopped),
        }
    }
}

/// Runs one track and exposes its frames to a consumer
pub struct TrackExecutor {
    shared: Arc<Shared>,
    job: Mutex<Option<LoadJob>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TrackExecutor {
    /// `descriptor` skips detection when the container is already known
    pub fn new(
        source: Arc<dyn TrackSource>,
        descriptor: Option<ContainerDescriptor>,
        registry: Arc<ProbeRegistry>,
        options: Arc<PlayerOptions>,
    ) -> Self {
        let id = Uuid::new_v4();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let buffer = Arc::new(FrameBuffer::new(options.frame_buffer_duration_ms()));
        let simple_id = id.simple().to_string();

        let shared = Arc::new(Shared {
            id,
            identifier: source.identifier().to_string(),
            worker_name: format!("track-{}", &simple_id[..8]),
            options,
            buffer,
            events,
            stages: StageStack::default(),
            state: AtomicU8::new(ExecutorState::Initializing.as_u8()),
            seekability: AtomicU8::new(Seekability::Unknown as u8),
            queued_seek: AtomicI64::new(NO_SEEK),
            queued_stop: AtomicBool::new(false),
            last_consumed_ms: AtomicI64::new(0),
            last_produced_ms: AtomicI64::new(-1),
            created: Instant::now(),
            last_progress_at_ms: AtomicU64::new(0),
            stuck_reported: AtomicBool::new(false),
        });

        Self {
            shared,
            job: Mutex::new(Some(LoadJob {
                source,
                descriptor,
                registry,
            })),
            worker: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn identifier(&self) -> &str {
        &self.shared.identifier
    }

    pub fn state(&self) -> ExecutorState {
        self.shared.state()
    }

    /// The track has reached `Closed`
    pub fn is_finished(&self) -> bool {
        self.state() == ExecutorState::Closed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackEvent> {
        self.shared.events.subscribe()
    }

    pub fn frame_buffer(&self) -> &Arc<FrameBuffer> {
        &self.shared.buffer
    }

    /// Spawns the worker thread. Calling it again does nothing.
    pub fn start(&self) -> Result<()> {
        let job = self
            .job
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(job) = job else {
            warn!(track = %self.shared.identifier, "Executor already started");
            return Ok(());
        };

        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name(self.shared.worker_name.clone())
            .spawn(move || run(shared, job))?;

        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Queues a seek. A seek queued before [`start`](Self::start) sets the
    /// start position.
    pub fn seek(&self, timecode_ms: i64) -> Result<()> {
        if self.shared.seekability.load(Ordering::Acquire) == Seekability::NotSeekable as u8 {
            return Err(Error::NotSeekable);
        }
        if self.is_finished() {
            return Ok(());
        }

        // the mark must precede the target so the worker's clear lifts it
        self.shared.buffer.request_clear();
        self.shared
            .queued_seek
            .store(timecode_ms.max(0), Ordering::Release);
        Ok(())
    }

    /// Asks the worker to stop; buffered frames are dropped
    pub fn stop(&self) {
        if !self.shared.queued_stop.swap(true, Ordering::AcqRel) {
            info!(track = %self.shared.identifier, "Stop requested");
        }
        self.shared.buffer.terminate();
    }

    /// Pending seek target, else the timecode of the last consumed frame
    pub fn position(&self) -> i64 {
        let seek = self.shared.queued_seek.load(Ordering::Acquire);
        if seek != NO_SEEK {
            seek
        } else {
            self.shared.last_consumed_ms.load(Ordering::Acquire)
        }
    }

    /// Consumer entry point: the next frame, or `None` if there is none yet
    /// or the track has ended
    pub fn provide(&self, mode: ConsumeMode) -> Option<AudioFrame> {
        match self.shared.buffer.consume(mode) {
            ConsumeResult::Frame(frame) => {
                self.shared
                    .last_consumed_ms
                    .store(frame.timecode_ms, Ordering::Release);
                Some(frame)
            }
            ConsumeResult::NoDataYet => {
                self.check_stall();
                None
            }
            ConsumeResult::Terminated => None,
        }
    }

    /// Reports a stall once if the consumer is starved while demuxing.
    /// Returns true when a new stall was reported.
    pub fn check_stall(&self) -> bool {
        let shared = &self.shared;
        if shared.state() != ExecutorState::Demuxing || !shared.buffer.is_empty() {
            return false;
        }

        let threshold_ms = shared.options.stall_threshold_ms();
        if shared.idle_ms() <= threshold_ms || shared.stuck_reported.swap(true, Ordering::AcqRel) {
            return false;
        }

        let snapshot = self.snapshot();
        warn!(
            track = %shared.identifier,
            threshold_ms,
            "Track got stuck: {}", snapshot
        );
        shared.emit(TrackEvent::Stuck {
            executor_id: shared.id,
            threshold_ms,
            snapshot,
        });
        true
    }

    pub fn snapshot(&self) -> DiagnosticSnapshot {
        let shared = &self.shared;
        let last_produced = shared.last_produced_ms.load(Ordering::Acquire);
        let started = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();

        DiagnosticSnapshot {
            state: shared.state(),
            stages: shared
                .stages
                .current()
                .into_iter()
                .map(String::from)
                .collect(),
            last_produced_timecode_ms: (last_produced >= 0).then_some(last_produced),
            idle_ms: shared.idle_ms(),
            worker: started.then(|| shared.worker_name.clone()),
        }
    }

    /// Waits for the worker to exit
    pub fn join(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(track = %self.shared.identifier, "Track worker panicked");
            }
        }
    }
}

impl Drop for TrackExecutor {
    fn drop(&mut self) {
        if !self.is_finished() {
            self.stop();
        }
    }
}

fn run(shared: Arc<Shared>, job: LoadJob) {
    info!(track = %shared.identifier, "Track started");
    shared.emit(TrackEvent::Started {
        executor_id: shared.id,
    });

    let reason = match execute(&shared, &job) {
        Ok(reason) => reason,
        Err(e) => {
            shared.set_state(ExecutorState::Errored);
            let friendly = e.wrap_unfriendly(PLAYBACK_FAILURE, Severity::Fault);
            error!(track = %shared.identifier, "Track failed: {}", friendly);
            shared.emit(TrackEvent::Exception {
                executor_id: shared.id,
                error: friendly,
            });
            EndReason::LoadFailed
        }
    };

    shared.buffer.finish();
    shared.set_state(ExecutorState::Closed);
    info!(track = %shared.identifier, ?reason, "Track ended");
    shared.emit(TrackEvent::Ended {
        executor_id: shared.id,
        reason,
    });
}

/// Wraps a failure while demuxing, keeping its own severity
fn decode_failure(error: Error) -> Error {
    let severity = error.severity();
    Error::Friendly(error.wrap_unfriendly(DECODE_FAILURE, severity))
}

fn execute(shared: &Arc<Shared>, job: &LoadJob) -> Result<EndReason> {
    shared.set_state(ExecutorState::Initializing);
    let mut demuxer = {
        let _stage = shared.stages.enter("open input");
        open_demuxer(shared, job)?
    };

    let seekability = if demuxer.is_seekable() {
        Seekability::Seekable
    } else {
        Seekability::NotSeekable
    };
    shared
        .seekability
        .store(seekability as u8, Ordering::Release);

    let track_format = demuxer
        .audio_format()
        .cloned()
        .ok_or_else(|| Error::Unsupported("No playable audio track.".to_string()))?;
    let output_format = AudioDataFormat::from_output_format(shared.options.output_format());
    debug!(track = %shared.identifier, codec = track_format.codec.name(), %output_format, "Pipeline ready");

    let mut router = DecodeRouter::new(
        track_format,
        output_format,
        shared.options.clone(),
        Box::new(BufferSink {
            shared: shared.clone(),
        }),
    );

    shared.set_state(ExecutorState::Demuxing);
    shared.touch_progress();

    loop {
        if shared.queued_stop.load(Ordering::Acquire) {
            shared.set_state(ExecutorState::Draining);
            router.close();
            return Ok(EndReason::Stopped);
        }

        let seek = shared.queued_seek.swap(NO_SEEK, Ordering::AcqRel);
        if seek != NO_SEEK {
            perform_seek(shared, demuxer.as_mut(), &mut router, seek)?;
            continue;
        }

        let packet = {
            let _stage = shared.stages.enter("read packet");
            demuxer.next_packet().map_err(decode_failure)?
        };
        let Some(packet) = packet else {
            break;
        };

        let result = {
            let _stage = shared.stages.enter("decode packet");
            router.process_packet(&packet)
        };
        match result {
            Ok(()) | Err(Error::Stopped) => {}
            Err(e) => return Err(decode_failure(e)),
        }
    }

    shared.set_state(ExecutorState::Draining);
    {
        let _stage = shared.stages.enter("drain");
        match router.flush() {
            Ok(()) | Err(Error::Stopped) => {}
            Err(e) => return Err(decode_failure(e)),
        }
    }
    router.close();

    if shared.queued_stop.load(Ordering::Acquire) {
        Ok(EndReason::Stopped)
    } else {
        Ok(EndReason::Finished)
    }
}

fn perform_seek(
    shared: &Shared,
    demuxer: &mut dyn Demuxer,
    router: &mut DecodeRouter,
    requested_ms: i64,
) -> Result<()> {
    shared.set_state(ExecutorState::SeekRequested);
    let requested_ms = match demuxer.duration_ms() {
        Some(duration) if requested_ms > duration => duration,
        _ => requested_ms,
    };

    let outcome = {
        let _stage = shared.stages.enter("seek");
        demuxer.seek(requested_ms)
    };
    shared.buffer.clear();

    match outcome {
        Ok(provided_ms) => {
            debug!(track = %shared.identifier, requested_ms, provided_ms, "Seek performed");
            router.seek_performed(requested_ms, provided_ms);
            shared
                .last_consumed_ms
                .store(requested_ms, Ordering::Release);
        }
        Err(Error::NotSeekable) => {
            warn!(track = %shared.identifier, "Ignoring seek on a track that cannot seek");
        }
        Err(e) => return Err(decode_failure(e)),
    }

    shared.set_state(ExecutorState::Demuxing);
    shared.touch_progress();
    Ok(())
}

fn open_demuxer(shared: &Shared, job: &LoadJob) -> Result<Box<dyn Demuxer>> {
    let mut input = SavedHeadInput::new(job.source.open()?);
    let start = input.position();

    let descriptor = match &job.descriptor {
        Some(descriptor) => descriptor.clone(),
        None => {
            let hints = job.source.hints();
            let detection = ContainerDetection::new(&job.registry, &shared.identifier, &hints);
            match detection.detect(&mut input)? {
                DetectionResult::Supported { descriptor, .. } => descriptor,
                DetectionResult::Unsupported { reason, .. } => {
                    return Err(FriendlyError::new(reason, Severity::Common).into())
                }
                DetectionResult::UnknownFormat => {
                    return Err(FriendlyError::new("Unknown file format.", Severity::Common).into())
                }
            }
        }
    };
    input.seek(start)?;

    let probe = job.registry.find(&descriptor.probe_name).ok_or_else(|| {
        Error::from(FriendlyError::new(
            format!("Unknown container type '{}'.", descriptor.probe_name),
            Severity::Suspicious,
        ))
    })?;
    debug!(track = %shared.identifier, %descriptor, "Opening demuxer");

    let mut demuxer = probe
        .create_demuxer(descriptor.parameters.as_deref(), Box::new(input))
        .map_err(decode_failure)?;
    demuxer.parse_headers().map_err(decode_failure)?;
    Ok(demuxer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{ForwardOnlyInput, MemorySource};
    use lavastream_common::params::GlobalParams;
    use lavastream_common::settings::OutputFormat;
    use std::io::{self, Cursor, Read};
    use std::time::Duration;

    fn wav_bytes(sample_rate: u32, channels: u16, duration_ms: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            let frames = sample_rate * duration_ms / 1000;
            for i in 0..frames {
                for _ in 0..channels {
                    writer.write_sample(((i % 200) as i16 - 100) * 100).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn options() -> Arc<PlayerOptions> {
        let options = PlayerOptions::from_params(&GlobalParams::default());
        options.set_output_format(OutputFormat::PcmS16le);
        Arc::new(options)
    }

    fn executor(source: Arc<dyn TrackSource>, options: Arc<PlayerOptions>) -> TrackExecutor {
        TrackExecutor::new(source, None, Arc::new(ProbeRegistry::default()), options)
    }

    fn drain(executor: &TrackExecutor) -> Vec<AudioFrame> {
        let mut frames = Vec::new();
        while let Some(frame) = executor.provide(ConsumeMode::Timeout(Duration::from_secs(5))) {
            frames.push(frame);
        }
        frames
    }

    fn events(receiver: &mut broadcast::Receiver<TrackEvent>) -> Vec<TrackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_plays_wav_to_end() {
        let source = Arc::new(MemorySource::new("tone.wav", wav_bytes(48_000, 2, 1000)));
        let executor = executor(source, options());
        let mut receiver = executor.subscribe();
        executor.start().unwrap();

        let frames = drain(&executor);
        executor.join();

        assert!((49..=51).contains(&frames.len()), "{} frames", frames.len());
        assert!(frames.windows(2).all(|w| w[0].timecode_ms < w[1].timecode_ms));
        assert_eq!(executor.state(), ExecutorState::Closed);

        let events = events(&mut receiver);
        assert!(matches!(events.first(), Some(TrackEvent::Started { .. })));
        assert!(matches!(
            events.last(),
            Some(TrackEvent::Ended {
                reason: EndReason::Finished,
                ..
            })
        ));
    }

    #[test]
    fn test_seek_before_start_sets_start_position() {
        let source = Arc::new(MemorySource::new("tone.wav", wav_bytes(48_000, 2, 1000)));
        let executor = executor(source, options());
        executor.seek(500).unwrap();
        assert_eq!(executor.position(), 500);
        executor.start().unwrap();

        let frames = drain(&executor);
        assert_eq!(frames[0].timecode_ms, 500);
        assert!((24..=26).contains(&frames.len()));
        assert_eq!(executor.position(), frames.last().unwrap().timecode_ms);
    }

    #[test]
    fn test_repeated_seeks_keep_frames_flowing() {
        let source = Arc::new(MemorySource::new("tone.wav", wav_bytes(48_000, 2, 3000)));
        let options = options();
        options.set_frame_buffer_duration_ms(100);
        let executor = executor(source, options);
        executor.start().unwrap();
        assert!(executor.provide(ConsumeMode::Timeout(Duration::from_secs(5))).is_some());

        for round in 0..50i64 {
            let target = round * 37 % 2500;
            executor.seek(target).unwrap();
            let frame = executor
                .provide(ConsumeMode::Timeout(Duration::from_secs(2)))
                .unwrap_or_else(|| panic!("no frame after seek to {}", target));
            assert!(frame.timecode_ms >= target, "{} < {}", frame.timecode_ms, target);
        }

        executor.stop();
        executor.join();
    }

    #[test]
    fn test_stop_ends_with_stopped() {
        let source = Arc::new(MemorySource::new("tone.wav", wav_bytes(48_000, 2, 3000)));
        let options = options();
        options.set_frame_buffer_duration_ms(200);
        let executor = executor(source, options);
        let mut receiver = executor.subscribe();
        executor.start().unwrap();

        assert!(executor.provide(ConsumeMode::Timeout(Duration::from_secs(5))).is_some());
        executor.stop();
        executor.join();

        assert!(executor.provide(ConsumeMode::Blocking).is_none());
        assert!(events(&mut receiver).iter().any(|e| matches!(
            e,
            TrackEvent::Ended {
                reason: EndReason::Stopped,
                ..
            }
        )));
    }

    #[test]
    fn test_unknown_format_reports_exception() {
        let source = Arc::new(MemorySource::new("noise.bin", vec![0x5Au8; 4096]));
        let executor = executor(source, options());
        let mut receiver = executor.subscribe();
        executor.start().unwrap();

        assert!(drain(&executor).is_empty());
        executor.join();

        let events = events(&mut receiver);
        let error = events
            .iter()
            .find_map(|e| match e {
                TrackEvent::Exception { error, .. } => Some(error.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(error.message.as_deref(), Some("Unknown file format."));
        assert_eq!(error.severity, Severity::Common);
        assert!(matches!(
            events.last(),
            Some(TrackEvent::Ended {
                reason: EndReason::LoadFailed,
                ..
            })
        ));
    }

    /// Delivers its bytes normally, then pauses once partway through
    struct PausingReader {
        data: Cursor<Vec<u8>>,
        pause_at: u64,
        paused: bool,
    }

    impl Read for PausingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.paused && self.data.position() >= self.pause_at {
                self.paused = true;
                std::thread::sleep(Duration::from_millis(1000));
            }
            self.data.read(buf)
        }
    }

    struct PausingSource {
        data: Vec<u8>,
    }

    impl TrackSource for PausingSource {
        fn identifier(&self) -> &str {
            "pausing.wav"
        }

        fn hints(&self) -> crate::container::MediaContainerHints {
            Default::default()
        }

        fn open(&self) -> io::Result<Box<dyn SeekableInput>> {
            Ok(Box::new(ForwardOnlyInput::new(PausingReader {
                data: Cursor::new(self.data.clone()),
                pause_at: 16_384,
                paused: false,
            })))
        }
    }

    #[test]
    fn test_stall_reported_once_while_starved() {
        let options = options();
        options.set_stall_threshold_ms(200);
        let source = Arc::new(PausingSource {
            data: wav_bytes(48_000, 2, 1000),
        });
        let executor = executor(source, options);
        let mut receiver = executor.subscribe();
        executor.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline && !executor.is_finished() {
            executor.provide(ConsumeMode::Timeout(Duration::from_millis(20)));
        }
        executor.join();

        let mut stuck = 0;

        for event in events(&mut receiver) {
            if let TrackEvent::Stuck { snapshot, threshold_ms, .. } = event {
                assert_eq!(threshold_ms, 200);
                assert_eq!(snapshot.state, ExecutorState::Demuxing);
                assert!(snapshot.stages.contains(&"read packet".to_string()));
                stuck += 1;
            }
        }
        assert_eq!(stuck, 1);
        // forward-only input
        assert!(matches!(executor.seek(0), Err(Error::NotSeekable)));
    }
}
