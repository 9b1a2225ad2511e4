//! Native library resolution and native handle ownership

mod handle;
mod loader;
mod system;

pub use handle::{live_handle_count, HandleSlot, NativeHandle};
pub use loader::{LoadedLibrary, NativeLibraryLoader, SystemFilter};
pub use system::{OsType, SystemType};

use lavastream_common::params::PARAMS;
use once_cell::sync::Lazy;

/// Entry points the Opus decoder and encoder need from libopus
pub const OPUS_SYMBOLS: &[&str] = &[
    "opus_decoder_create",
    "opus_decode",
    "opus_decoder_destroy",
    "opus_encoder_create",
    "opus_encode",
    "opus_encoder_destroy",
];

/// Process-wide loader for the Opus codec library
///
/// Explicit path and directory come from the global parameters at first use.
static OPUS_LOADER: Lazy<NativeLibraryLoader> = Lazy::new(|| {
    NativeLibraryLoader::new("opus")
        .with_library_path(PARAMS.native_library_path())
        .with_library_dir(PARAMS.native_library_dir())
        .with_required_symbols(OPUS_SYMBOLS)
});

pub fn opus_loader() -> &'static NativeLibraryLoader {
    &OPUS_LOADER
}
