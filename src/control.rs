//! The control loop
//!
//! One cooperative loop: read a block, estimate loudness, classify it,
//! commit the matching LED pattern, pause. The lifecycle runs
//! Uninitialized -> Running -> Stopping -> Terminated, and teardown (all
//! outputs off, audio device released) executes exactly once no matter how
//! Running ends - interrupt, device failure or setup error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::audio::{CaptureError, SampleSource};
use crate::config::PatternMap;
use crate::lights::LedBank;
use crate::meter::{self, ThresholdTable};

/// Cooperative cancellation flag, shared with the SIGINT handler and the
/// blocking sample read.
#[derive(Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Fatal control-loop failures. Non-fatal conditions (input overflow,
/// partial LED writes) are logged where they occur and never surface here.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("audio capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("LED bank failed during setup: {0}")]
    Lights(#[from] crate::lights::LightError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Uninitialized,
    Running,
    Stopping,
    Terminated,
}

pub struct ControlLoop<S: SampleSource> {
    source: S,
    bank: LedBank,
    table: ThresholdTable,
    patterns: PatternMap,
    chunk_size: usize,
    pause: Duration,
    shutdown: ShutdownFlag,
    state: LoopState,
}

impl<S: SampleSource> ControlLoop<S> {
    pub fn new(
        source: S,
        bank: LedBank,
        table: ThresholdTable,
        patterns: PatternMap,
        chunk_size: usize,
        pause: Duration,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            source,
            bank,
            table,
            patterns,
            chunk_size,
            pause,
            shutdown,
            state: LoopState::Uninitialized,
        }
    }

    /// Run until interrupted or a fatal error.
    ///
    /// Consumes the loop. On return the outputs are off and the audio
    /// device has been released, whichever way the loop ended; an interrupt
    /// reports as a normal stop, not an error.
    pub fn run(mut self) -> Result<(), LoopError> {
        let result = self.setup().and_then(|()| self.run_iterations());

        self.set_state(LoopState::Stopping);
        self.teardown();
        self.set_state(LoopState::Terminated);

        match result {
            Err(LoopError::Capture(CaptureError::Interrupted)) => {
                log::info!("Interrupt received during capture, stopping");
                Ok(())
            }
            other => other,
        }
    }

    fn setup(&mut self) -> Result<(), LoopError> {
        // Start from a known all-off state
        self.bank.all_off()?;
        self.set_state(LoopState::Running);
        Ok(())
    }

    fn run_iterations(&mut self) -> Result<(), LoopError> {
        loop {
            if self.shutdown.is_set() {
                log::info!("Interrupt received, stopping");
                return Ok(());
            }

            let block = self.source.read_block(self.chunk_size)?;
            let loudness = meter::rms(&block);
            let bracket = self.table.classify(loudness);
            log::debug!("loudness {:.1} -> {:?}", loudness, bracket);

            if let Err(e) = self.bank.set_active(self.patterns.get(bracket)) {
                log::warn!("LED update incomplete: {}", e);
            }

            thread::sleep(self.pause);
        }
    }

    /// Runs exactly once, on every exit path. The audio device itself is
    /// released when `self.source` drops at the end of `run`.
    fn teardown(&mut self) {
        if let Err(e) = self.bank.all_off() {
            log::warn!("Failed to clear outputs during shutdown: {}", e);
        }
    }

    fn set_state(&mut self, next: LoopState) {
        log::debug!("control loop {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SampleBlock;
    use crate::config::Config;
    use crate::lights::{DigitalOutput, OutputError};
    use std::sync::Mutex;

    /// Scripted source: yields its blocks in order, then reports the
    /// configured end of capture.
    struct ScriptedSource {
        blocks: std::vec::IntoIter<Vec<i16>>,
        end: Option<CaptureError>,
        released: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        fn new(blocks: Vec<Vec<i16>>, end: CaptureError) -> Self {
            Self {
                blocks: blocks.into_iter(),
                end: Some(end),
                released: Arc::new(AtomicBool::new(false)),
            }
        }

        fn release_probe(&self) -> Arc<AtomicBool> {
            Arc::clone(&self.released)
        }
    }

    impl Drop for ScriptedSource {
        fn drop(&mut self) {
            self.released.store(true, Ordering::Relaxed);
        }
    }

    impl SampleSource for ScriptedSource {
        fn read_block(&mut self, n: usize) -> Result<SampleBlock, CaptureError> {
            match self.blocks.next() {
                Some(samples) => {
                    assert_eq!(samples.len(), n);
                    Ok(SampleBlock::new(samples))
                }
                None => Err(self.end.take().unwrap_or(CaptureError::Interrupted)),
            }
        }
    }

    type Writes = Arc<Mutex<Vec<(String, bool)>>>;

    struct RecordingOutput {
        name: String,
        writes: Writes,
    }

    impl DigitalOutput for RecordingOutput {
        fn write(&mut self, high: bool) -> Result<(), OutputError> {
            self.writes.lock().unwrap().push((self.name.clone(), high));
            Ok(())
        }
    }

    const NAMES: &[&str] = &["white", "yellow", "blue", "red", "green"];

    fn recording_bank(writes: &Writes) -> LedBank {
        let outputs = NAMES
            .iter()
            .map(|&name| {
                let output = RecordingOutput {
                    name: name.to_string(),
                    writes: Arc::clone(writes),
                };
                (name.to_string(), Box::new(output) as Box<dyn DigitalOutput>)
            })
            .collect();
        LedBank::new(outputs).unwrap()
    }

    fn control_loop(source: ScriptedSource, writes: &Writes) -> ControlLoop<ScriptedSource> {
        let config = Config::default();
        ControlLoop::new(
            source,
            recording_bank(writes),
            config.thresholds.clone(),
            config.pattern_map(),
            1024,
            Duration::ZERO,
            ShutdownFlag::new(),
        )
    }

    fn final_level(writes: &Writes, name: &str) -> Option<bool> {
        writes
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|&(_, high)| high)
    }

    #[test]
    fn loud_block_lights_red_then_everything_ends_off() {
        let writes = Writes::default();
        let source = ScriptedSource::new(vec![vec![4000; 1024]], CaptureError::Interrupted);
        let released = source.release_probe();

        control_loop(source, &writes).run().unwrap();

        // Red was lit while the loud block was current
        assert!(writes.lock().unwrap().contains(&("red".to_string(), true)));
        // Teardown left every output off and dropped the source
        for name in NAMES {
            assert_eq!(final_level(&writes, name), Some(false));
        }
        assert!(released.load(Ordering::Relaxed));
    }

    #[test]
    fn silent_block_never_lights_anything() {
        let writes = Writes::default();
        let source = ScriptedSource::new(vec![vec![0; 1024]], CaptureError::Interrupted);

        control_loop(source, &writes).run().unwrap();

        assert!(writes.lock().unwrap().iter().all(|&(_, high)| !high));
    }

    #[test]
    fn interrupt_during_read_is_a_normal_stop() {
        let writes = Writes::default();
        let source = ScriptedSource::new(Vec::new(), CaptureError::Interrupted);

        assert!(control_loop(source, &writes).run().is_ok());
    }

    #[test]
    fn device_failure_is_fatal_but_still_clears_outputs() {
        let writes = Writes::default();
        let source = ScriptedSource::new(
            vec![vec![4000; 1024]],
            CaptureError::Device("device gone".to_string()),
        );
        let released = source.release_probe();

        let result = control_loop(source, &writes).run();
        assert!(matches!(
            result,
            Err(LoopError::Capture(CaptureError::Device(_)))
        ));
        for name in NAMES {
            assert_eq!(final_level(&writes, name), Some(false));
        }
        assert!(released.load(Ordering::Relaxed));
    }

    #[test]
    fn preset_shutdown_flag_stops_before_any_read() {
        let writes = Writes::default();
        // A source that would report a device failure if it were ever read
        let source =
            ScriptedSource::new(Vec::new(), CaptureError::Device("device gone".to_string()));
        let config = Config::default();
        let shutdown = ShutdownFlag::new();
        shutdown.trigger();

        let control = ControlLoop::new(
            source,
            recording_bank(&writes),
            config.thresholds.clone(),
            config.pattern_map(),
            1024,
            Duration::ZERO,
            shutdown,
        );

        assert!(control.run().is_ok());
        for name in NAMES {
            assert_eq!(final_level(&writes, name), Some(false));
        }
    }
}
