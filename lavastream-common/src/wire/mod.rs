//! Serialized track metadata wire format

pub mod data;
pub mod exception;
pub mod message;

pub use data::{DataRead, DataWrite};
pub use exception::{read_friendly_error, write_friendly_error};
pub use message::{Message, MessageInput, MessageOutput};
