//! Resample Performance Benchmark
//!
//! Measures the filter chain's sample-rate conversion throughput per
//! quality setting, and the full PCM chain into Opus chunks.
//!
//! **Goal:** Conversion should be far faster than realtime
//! **Target:** >50x realtime at high quality
//!
//! ## Test Scenarios
//!
//! - 44100 Hz → 48000 Hz stereo, 1 s of input, each quality
//! - 44100 Hz mono → 48000 Hz stereo PCM chunks (full chain)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lavastream_common::{OutputFormat, ResamplingQuality};
use lavastream_player::codec::PcmShape;
use lavastream_player::filter::{build_chain, FrameSink, PcmFilter, ResampleFilter};
use lavastream_player::format::{AudioDataFormat, AudioFrame};
use lavastream_player::playback::PlayerOptions;
use lavastream_player::Result;
use std::sync::Arc;

const INPUT_RATE: u32 = 44_100;

/// Discards whatever reaches it
struct Discard;

impl PcmFilter for Discard {
    fn process(&mut self, samples: &[i16]) -> Result<()> {
        black_box(samples);
        Ok(())
    }

    fn seek_performed(&mut self, _requested_ms: i64, _provided_ms: i64) {}

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) {}
}

impl FrameSink for Discard {
    fn deliver(&mut self, frame: AudioFrame) -> Result<()> {
        black_box(frame);
        Ok(())
    }
}

/// One second of a 440 Hz tone, interleaved
fn tone(channels: usize) -> Vec<i16> {
    (0..INPUT_RATE as usize)
        .flat_map(|i| {
            let t = i as f32 / INPUT_RATE as f32;
            let sample = ((t * 440.0 * std::f32::consts::TAU).sin() * 12_000.0) as i16;
            std::iter::repeat(sample).take(channels)
        })
        .collect()
}

fn bench_resample_quality(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample_44k_to_48k");
    let input = tone(2);
    group.throughput(Throughput::Elements(INPUT_RATE as u64));

    for quality in [
        ResamplingQuality::High,
        ResamplingQuality::Medium,
        ResamplingQuality::Low,
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(quality), &quality, |b, &quality| {
            let mut filter =
                ResampleFilter::new(INPUT_RATE, 48_000, 2, quality, Box::new(Discard)).unwrap();
            b.iter(|| {
                // 20 ms slices, as a decoder would push them
                for slice in input.chunks(882 * 2) {
                    filter.process(black_box(slice)).unwrap();
                }
            });
        });
    }

    group.finish();
}

fn bench_full_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_chain");
    let input = tone(1);
    group.throughput(Throughput::Elements(INPUT_RATE as u64));

    group.bench_function("mono_44k_to_pcm_48k_stereo", |b| {
        let options = Arc::new(PlayerOptions::default());
        options.set_volume(80);
        let format = AudioDataFormat::from_output_format(OutputFormat::PcmS16le);
        let mut chain = build_chain(
            PcmShape::new(INPUT_RATE, 1),
            format,
            options,
            Box::new(Discard),
        )
        .unwrap();

        b.iter(|| {
            for slice in input.chunks(1152) {
                chain.process(black_box(slice)).unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_resample_quality, bench_full_chain);
criterion_main!(benches);
