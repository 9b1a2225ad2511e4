//! # Lavastream Common Library
//!
//! Code shared by the player and anything talking to it:
//! - Track metadata and its versioned binary encoding
//! - Message framing and friendly error serialization
//! - Container descriptors
//! - Global parameters and configuration loading

pub mod config;
pub mod descriptor;
pub mod error;
pub mod friendly;
pub mod params;
pub mod settings;
pub mod track_codec;
pub mod track_info;
pub mod wire;

pub use descriptor::ContainerDescriptor;
pub use error::{Error, Result};
pub use friendly::{DecodedError, FriendlyError, Severity};
pub use settings::{OutputFormat, ResamplingQuality};
pub use track_info::TrackInfo;
