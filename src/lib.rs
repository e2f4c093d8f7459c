//! Rotary encoder decoding for Raspberry Pi GPIO, and the volume daemon built
//! on it.
pub mod accumulator;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod gpio;
pub mod guard;
pub mod metrics;
pub mod pins;
pub mod volume;

pub use decoder::{Direction, Mode};
pub use encoder::{ChannelPair, Encoder, Encoders, Pulse};
