//! Microphone capture
//!
//! Opens the default input device and runs a cpal stream that feeds the
//! sample queue from the audio callback. `read_block` blocks the control
//! thread until a full block is available, polling the queue and checking
//! the shutdown flag so a pending read never holds up shutdown.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::control::ShutdownFlag;

use super::buffer::{sample_queue, QueueConsumer};
use super::{CaptureError, SampleBlock, SampleSource};

/// How long to sleep between polls of the sample queue
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Queue capacity in blocks; samples beyond this are dropped as overflow
const QUEUE_BLOCKS: usize = 8;

/// Microphone input implementing [`SampleSource`].
///
/// The stream captures on cpal's own thread and pushes mono i16 samples
/// into the queue. Dropping the handle stops the stream and releases the
/// device.
pub struct AudioInput {
    stream: Option<cpal::Stream>,
    consumer: QueueConsumer,
    device_error: Arc<Mutex<Option<String>>>,
    shutdown: ShutdownFlag,
}

impl AudioInput {
    /// Open the default input device at `sample_rate` Hz.
    pub fn open(
        sample_rate: u32,
        chunk_size: usize,
        shutdown: ShutdownFlag,
    ) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::NoDevice)?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        log::info!("Using input device: {}", device_name);

        let default_config = device
            .default_input_config()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;
        let channels = default_config.channels() as usize;
        let stream_config = cpal::StreamConfig {
            channels: default_config.channels(),
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        log::info!(
            "Capture config: {} Hz, {} channel(s), {:?}",
            sample_rate,
            channels,
            default_config.sample_format()
        );

        let (mut producer, consumer) = sample_queue(chunk_size * QUEUE_BLOCKS);

        let device_error = Arc::new(Mutex::new(None));
        let error_slot = Arc::clone(&device_error);
        let on_error = move |err: cpal::StreamError| {
            log::error!("Audio stream error: {}", err);
            if let Ok(mut slot) = error_slot.lock() {
                slot.get_or_insert_with(|| err.to_string());
            }
        };

        // Capture channel 0 of each frame as the mono signal
        let stream_result = match default_config.sample_format() {
            cpal::SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks(channels) {
                        producer.push(frame[0]);
                    }
                },
                on_error,
                None,
            ),
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    for frame in data.chunks(channels) {
                        let sample = (frame[0].clamp(-1.0, 1.0) * 32767.0) as i16;
                        producer.push(sample);
                    }
                },
                on_error,
                None,
            ),
            format => {
                return Err(CaptureError::UnsupportedFormat(format!("{:?}", format)));
            }
        };

        let stream = stream_result.map_err(|e| CaptureError::Stream(e.to_string()))?;
        stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;
        log::info!("Capture started");

        Ok(Self {
            stream: Some(stream),
            consumer,
            device_error,
            shutdown,
        })
    }

    fn take_device_error(&self) -> Option<String> {
        self.device_error.lock().ok().and_then(|mut slot| slot.take())
    }
}

impl SampleSource for AudioInput {
    /// Block until `n` samples are available.
    ///
    /// Queue overflow is non-fatal: the block still fills, with the dropped
    /// samples reported as a warning. A stream error or a tripped shutdown
    /// flag ends the read instead.
    fn read_block(&mut self, n: usize) -> Result<SampleBlock, CaptureError> {
        debug_assert!(n > 0);

        let mut samples = Vec::with_capacity(n);
        loop {
            self.consumer.pop_into(&mut samples, n);
            if samples.len() == n {
                break;
            }
            if let Some(message) = self.take_device_error() {
                return Err(CaptureError::Device(message));
            }
            if self.shutdown.is_set() {
                return Err(CaptureError::Interrupted);
            }
            thread::sleep(POLL_INTERVAL);
        }

        let dropped = self.consumer.take_dropped();
        if dropped > 0 {
            log::warn!("Input overflow: dropped {} sample(s)", dropped);
        }

        Ok(SampleBlock::new(samples))
    }
}

impl Drop for AudioInput {
    fn drop(&mut self) {
        self.stream.take();
        log::info!("Audio device released");
    }
}
