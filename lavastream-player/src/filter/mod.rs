//! PCM filter chain
//!
//! Decoded PCM flows through a chain of [`PcmFilter`] stages, each owning
//! the next one: resampler, volume, channel adapter and finally the
//! [`ChunkOutput`] that cuts chunks, encodes them and hands them to a
//! [`FrameSink`]. Stages that would be a no-op for the decoded shape are
//! left out.

mod channels;
mod output;
mod resample;
mod volume;

pub use channels::ChannelAdapter;
pub use output::{ChunkOutput, FrameSink};
pub use resample::ResampleFilter;
pub use volume::VolumeFilter;

use crate::codec::PcmShape;
use crate::encoder::create_encoder;
use crate::error::Result;
use crate::format::AudioDataFormat;
use crate::playback::PlayerOptions;
use std::sync::Arc;
use tracing::debug;

pub trait PcmFilter: Send {
    /// Processes interleaved samples and passes the result downstream
    fn process(&mut self, samples: &[i16]) -> Result<()>;

    /// The source jumped. `provided_ms` is where it actually landed, which
    /// may be before `requested_ms`.
    fn seek_performed(&mut self, requested_ms: i64, provided_ms: i64);

    /// Pushes any buffered tail through the rest of the chain
    fn flush(&mut self) -> Result<()>;

    /// Releases this stage and everything after it
    fn close(&mut self);
}

/// Builds the chain converting `input` PCM into chunks of `format`
pub fn build_chain(
    input: PcmShape,
    format: AudioDataFormat,
    options: Arc<PlayerOptions>,
    sink: Box<dyn FrameSink>,
) -> Result<Box<dyn PcmFilter>> {
    let encoder = create_encoder(&format)?;
    let mut chain: Box<dyn PcmFilter> = Box::new(ChunkOutput::new(format, encoder, options.clone(), sink));

    if input.channels != format.channel_count {
        chain = Box::new(ChannelAdapter::new(input.channels, format.channel_count, chain));
    }

    chain = Box::new(VolumeFilter::new(input.channels, options.clone(), chain));

    if input.sample_rate != format.sample_rate {
        chain = Box::new(ResampleFilter::new(
            input.sample_rate,
            format.sample_rate,
            input.channels,
            options.resampling_quality(),
            chain,
        )?);
    }

    debug!(
        input_rate = input.sample_rate,
        input_channels = input.channels,
        %format,
        "Filter chain built"
    );
    Ok(chain)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::format::AudioFrame;
    use std::sync::Mutex;

    /// Collects frames so tests can inspect them after the chain owns the sink
    #[derive(Clone, Default)]
    pub struct CollectingSink {
        pub frames: Arc<Mutex<Vec<AudioFrame>>>,
    }

    impl FrameSink for CollectingSink {
        fn deliver(&mut self, frame: AudioFrame) -> Result<()> {
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }
    }

    /// Records what reached it, for checking upstream stages
    #[derive(Clone, Default)]
    pub struct RecordingFilter {
        pub samples: Arc<Mutex<Vec<i16>>>,
        pub seeks: Arc<Mutex<Vec<(i64, i64)>>>,
        pub flushed: Arc<Mutex<bool>>,
        pub closed: Arc<Mutex<u32>>,
    }

    impl PcmFilter for RecordingFilter {
        fn process(&mut self, samples: &[i16]) -> Result<()> {
            self.samples.lock().unwrap().extend_from_slice(samples);
            Ok(())
        }

        fn seek_performed(&mut self, requested_ms: i64, provided_ms: i64) {
            self.seeks.lock().unwrap().push((requested_ms, provided_ms));
        }

        fn flush(&mut self) -> Result<()> {
            *self.flushed.lock().unwrap() = true;
            Ok(())
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::CollectingSink;
    use super::*;
    use lavastream_common::params::GlobalParams;
    use lavastream_common::settings::OutputFormat;

    #[test]
    fn test_chain_converts_mono_44k_to_stereo_48k() {
        let options = Arc::new(PlayerOptions::from_params(&GlobalParams::default()));
        let format = AudioDataFormat::from_output_format(OutputFormat::PcmS16le);
        let sink = CollectingSink::default();
        let mut chain = build_chain(
            PcmShape::new(44_100, 1),
            format,
            options,
            Box::new(sink.clone()),
        )
        .unwrap();

        // one second of input
        chain.process(&vec![1000i16; 44_100]).unwrap();
        chain.flush().unwrap();
        chain.close();

        let frames = sink.frames.lock().unwrap();
        let produced_ms: i64 = frames.iter().map(|f| f.duration_ms()).sum();
        assert!((produced_ms - 1000).abs() <= 2 * format.frame_duration_ms());
        assert!(frames.iter().all(|f| f.data.len() == format.maximum_chunk_size()));
        assert_eq!(frames[0].timecode_ms, 0);
    }
}
