//! End-to-end playback through the track executor and the filter chain

mod helpers;

use helpers::*;
use lavastream_common::params::GlobalParams;
use lavastream_common::{ContainerDescriptor, OutputFormat, Severity};
use lavastream_player::codec::PcmShape;
use lavastream_player::container::ProbeRegistry;
use lavastream_player::filter::{build_chain, FrameSink};
use lavastream_player::format::{AudioDataFormat, AudioFrame};
use lavastream_player::io::{FileSource, MemorySource, TrackSource};
use lavastream_player::playback::{
    ConsumeMode, EndReason, ExecutorState, PlayerOptions, StallWatchdog, TrackEvent, TrackExecutor,
    DECODE_FAILURE,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn pcm_options() -> Arc<PlayerOptions> {
    let options = PlayerOptions::from_params(&GlobalParams::default());
    options.set_output_format(OutputFormat::PcmS16le);
    Arc::new(options)
}

fn executor(
    source: Arc<dyn TrackSource>,
    descriptor: Option<ContainerDescriptor>,
    options: Arc<PlayerOptions>,
) -> TrackExecutor {
    TrackExecutor::new(source, descriptor, Arc::new(ProbeRegistry::default()), options)
}

fn samples_le(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect()
}

fn ended_with(events: &[TrackEvent]) -> Option<EndReason> {
    events.iter().find_map(|e| match e {
        TrackEvent::Ended { reason, .. } => Some(*reason),
        _ => None,
    })
}

#[test]
fn test_file_track_frames_cover_its_duration() {
    let file = wav_file(48_000, 2, 1000);
    let source = Arc::new(FileSource::new(file.path()));
    let executor = executor(source, None, pcm_options());
    let mut receiver = executor.subscribe();
    executor.start().unwrap();

    let frames = drain_frames(&executor);
    executor.join();

    let covered: i64 = frames.iter().map(AudioFrame::duration_ms).sum();
    assert!((980..=1020).contains(&covered), "frames cover {} ms", covered);
    assert_eq!(frames[0].timecode_ms, 0);
    assert!(frames.windows(2).all(|w| w[1].timecode_ms == w[0].timecode_ms + 20));
    assert_eq!(executor.state(), ExecutorState::Closed);

    let events = received_events(&mut receiver);
    assert!(matches!(events.first(), Some(TrackEvent::Started { .. })));
    assert_eq!(ended_with(&events), Some(EndReason::Finished));
    assert!(events.iter().all(|e| e.executor_id() == executor.id()));
}

#[test]
fn test_resampled_mono_track_becomes_stereo_chunks() {
    let source = Arc::new(MemorySource::new("mono.wav", wav_bytes(44_100, 1, 1000)));
    let executor = executor(source, None, pcm_options());
    executor.start().unwrap();

    let frames = drain_frames(&executor);
    executor.join();

    let format = AudioDataFormat::from_output_format(OutputFormat::PcmS16le);
    assert!(frames.iter().all(|f| f.format == format));
    assert!(frames.iter().all(|f| f.data.len() == format.expected_chunk_size()));

    // resampler latency may add up to one more chunk
    let covered: i64 = frames.iter().map(AudioFrame::duration_ms).sum();
    assert!((980..=1040).contains(&covered), "frames cover {} ms", covered);

    // mono is duplicated into both output channels
    let samples = samples_le(&frames[10].data);
    assert!(samples.chunks(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn test_seek_during_playback_drops_earlier_frames() {
    let source = Arc::new(MemorySource::new("long.wav", wav_bytes(48_000, 2, 3000)));
    let options = pcm_options();
    // keeps the worker well behind the end of the track
    options.set_frame_buffer_duration_ms(100);
    let executor = executor(source, None, options);
    executor.start().unwrap();

    for _ in 0..3 {
        assert!(executor
            .provide(ConsumeMode::Timeout(Duration::from_secs(5)))
            .is_some());
    }

    executor.seek(2000).unwrap();
    assert_eq!(executor.position(), 2000);

    let frames = drain_frames(&executor);
    executor.join();

    let first = frames.first().unwrap().timecode_ms;
    assert!((2000..=2020).contains(&first), "first frame after seek at {}", first);
    assert!(frames.iter().all(|f| f.timecode_ms >= 2000));
    assert!((49..=51).contains(&frames.len()), "{} frames", frames.len());
}

#[test]
fn test_known_descriptor_skips_detection() {
    // no hints and no probing; the descriptor alone selects the demuxer
    let source = Arc::new(MemorySource::new("track-42", wav_bytes(48_000, 2, 200)));
    let descriptor = ContainerDescriptor::new("wav", None).unwrap();
    let executor = executor(source, Some(descriptor), pcm_options());
    executor.start().unwrap();

    let frames = drain_frames(&executor);
    executor.join();
    assert_eq!(frames.len(), 10);
}

#[test]
fn test_truncated_matroska_fails_as_suspicious() {
    let source = Arc::new(MemorySource::new("broken.webm", truncated_matroska_file()));
    let descriptor = ContainerDescriptor::new("matroska/webm", None).unwrap();
    let executor = executor(source, Some(descriptor), pcm_options());
    let mut receiver = executor.subscribe();
    executor.start().unwrap();

    assert!(drain_frames(&executor).is_empty());
    executor.join();

    let events = received_events(&mut receiver);
    let error = events
        .iter()
        .find_map(|e| match e {
            TrackEvent::Exception { error, .. } => Some(error.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(error.message.as_deref(), Some(DECODE_FAILURE));
    assert_eq!(error.severity, Severity::Suspicious);
    assert!(error.cause.is_some());
    assert_eq!(ended_with(&events), Some(EndReason::LoadFailed));
    assert_eq!(executor.state(), ExecutorState::Closed);
}

#[tokio::test]
async fn test_watchdog_stops_with_its_executor() {
    let source = Arc::new(MemorySource::new("short.wav", wav_bytes(48_000, 2, 300)));
    let executor = Arc::new(executor(source, None, pcm_options()));
    let watchdog = StallWatchdog::spawn(executor.clone(), Duration::from_millis(10));
    executor.start().unwrap();

    let frames = {
        let executor = executor.clone();
        tokio::task::spawn_blocking(move || {
            let frames = drain_frames(&executor);
            executor.join();
            frames
        })
        .await
        .unwrap()
    };
    assert_eq!(frames.len(), 15);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!watchdog.is_running());
}

#[derive(Clone, Default)]
struct CollectFrames(Arc<Mutex<Vec<AudioFrame>>>);

impl FrameSink for CollectFrames {
    fn deliver(&mut self, frame: AudioFrame) -> lavastream_player::Result<()> {
        self.0.lock().unwrap().push(frame);
        Ok(())
    }
}

#[test]
fn test_volume_changes_never_jump_more_than_ramp_step() {
    let options = pcm_options();
    let step = options.volume_ramp_step() as i64;
    let level = 10_000i16;
    let sink = CollectFrames::default();
    let format = AudioDataFormat::from_output_format(OutputFormat::PcmS16le);
    let mut chain = build_chain(
        PcmShape::new(48_000, 1),
        format,
        options.clone(),
        Box::new(sink.clone()),
    )
    .unwrap();

    let block = vec![level; 960];
    for volume in [100, 0, 100] {
        options.set_volume(volume);
        for _ in 0..60 {
            chain.process(&block).unwrap();
        }
    }
    chain.flush().unwrap();
    chain.close();

    let left: Vec<i64> = sink
        .0
        .lock()
        .unwrap()
        .iter()
        .flat_map(|frame| samples_le(&frame.data))
        .step_by(2)
        .map(i64::from)
        .collect();
    assert_eq!(left.len(), 180 * 960);

    let bound = level as i64 * step / 65_536 + 1;
    let largest = left.windows(2).map(|w| (w[1] - w[0]).abs()).max().unwrap();
    assert!(largest <= bound, "jump of {} exceeds {}", largest, bound);

    // both ends of the ramp were reached
    assert!(left.contains(&0));
    assert_eq!(*left.last().unwrap(), level as i64);
}
