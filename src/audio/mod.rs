//! Audio capture - blocking, block-oriented sample acquisition
//!
//! This module provides:
//! - Lock-free sample queue between the capture callback and the control thread
//! - Microphone capture with a blocking block read

mod buffer;
mod input;

pub use input::AudioInput;

use thiserror::Error;

/// Errors that can occur during sample acquisition
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no audio input device available")]
    NoDevice,

    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to open audio stream: {0}")]
    Stream(String),

    #[error("audio device failed: {0}")]
    Device(String),

    #[error("capture interrupted")]
    Interrupted,
}

/// One fixed-size chunk of signed 16-bit mono samples, read per loop
/// iteration.
///
/// Blocks are never empty, so loudness math may assume at least one sample.
#[derive(Debug, Clone)]
pub struct SampleBlock(Vec<i16>);

impl SampleBlock {
    pub fn new(samples: Vec<i16>) -> Self {
        assert!(!samples.is_empty(), "sample block must not be empty");
        Self(samples)
    }

    pub fn samples(&self) -> &[i16] {
        &self.0
    }
}

/// Blocking source of sample blocks.
///
/// `read_block` suspends the caller until `n` samples are available. Input
/// overflow at the backend degrades the data but still yields a full block;
/// only device failure or shutdown ends a read early.
pub trait SampleSource {
    fn read_block(&mut self, n: usize) -> Result<SampleBlock, CaptureError>;
}
