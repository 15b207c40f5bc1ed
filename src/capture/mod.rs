//! The concurrent recording pipeline: periodic frame capture, the host
//! audio subprocess, caption scraping, and final MP4 encoding.

pub mod audio;
pub mod captions;
pub mod encoder;
pub mod frames;

pub use audio::AudioRecorder;
pub use encoder::{Encoder, EncoderError};
