//! # Lavastream Player Library
//!
//! Turns a track source into a stream of fixed-size encoded audio frames.
//!
//! **Pipeline:** container detection picks a demuxer, the demuxer yields
//! codec packets, a decoder turns them into PCM, the filter chain adapts
//! channels, volume and sample rate, and the chunk encoder packs the result
//! into frames handed to the consumer through a bounded buffer.
//!
//! **Threading:** each track runs on its own worker thread owned by a
//! [`playback::TrackExecutor`]; consumers pull frames without blocking the
//! worker beyond the buffer's capacity.

pub mod codec;
pub mod container;
pub mod encoder;
pub mod error;
pub mod filter;
pub mod format;
pub mod io;
pub mod natives;
pub mod playback;

pub use error::{Error, Result};
