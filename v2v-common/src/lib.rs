//! # V2V Common Library
//!
//! Shared code for the voice-to-voice client crates including:
//! - Error type
//! - Event types (PlayerEvent enum) and the EventBus
//! - Configuration file discovery and TOML loading

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, PlayerErrorKind, PlayerEvent, PlayerState};
