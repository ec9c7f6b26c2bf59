//! loudlight-rs - sound-reactive LED controller
//!
//! Reads the microphone in fixed-size blocks, reduces each block to an RMS
//! loudness, classifies it into a bracket and lights the matching LED
//! pattern, until Ctrl+C or a fatal device error. Outputs are always
//! cleared and the audio device released on the way out.

use std::process::ExitCode;

mod audio;
mod config;
mod control;
mod gpio;
mod lights;
mod meter;

use audio::AudioInput;
use config::Config;
use control::{ControlLoop, ShutdownFlag};
use lights::{DigitalOutput, LedBank, OutputError};

fn main() -> ExitCode {
    env_logger::init();
    log::info!("Starting loudlight-rs");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load config: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        log::error!("Invalid config: {}", e);
        return ExitCode::FAILURE;
    }

    let shutdown = ShutdownFlag::new();
    let handler_flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_flag.trigger()) {
        log::error!("Failed to install interrupt handler: {}", e);
        return ExitCode::FAILURE;
    }

    let outputs = match claim_outputs(&config) {
        Ok(outputs) => outputs,
        Err(e) => {
            log::error!("Failed to claim outputs: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let mut bank = match LedBank::new(outputs) {
        Ok(bank) => bank,
        Err(e) => {
            log::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let source = match AudioInput::open(config.sample_rate, config.chunk_size, shutdown.clone()) {
        Ok(source) => source,
        Err(e) => {
            log::error!("Failed to open audio input: {}", e);
            // The pins were already claimed; leave them in a known state
            let _ = bank.all_off();
            return ExitCode::FAILURE;
        }
    };

    println!("Sound-reactive LED controller running (Ctrl+C to stop)");

    let control = ControlLoop::new(
        source,
        bank,
        config.thresholds.clone(),
        config.pattern_map(),
        config.chunk_size,
        config.pause(),
        shutdown,
    );

    match control.run() {
        Ok(()) => {
            println!("Stopped.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Fatal: {}", e);
            println!("Stopped on error.");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "rpi")]
fn claim_outputs(config: &Config) -> Result<Vec<(String, Box<dyn DigitalOutput>)>, OutputError> {
    let mut outputs: Vec<(String, Box<dyn DigitalOutput>)> = Vec::new();
    for (name, &pin) in &config.pins {
        let output = gpio::GpioOutput::claim(pin)
            .map_err(|e| OutputError(format!("'{}' (BCM {}): {}", name, pin, e)))?;
        log::info!("Claimed output '{}' on BCM pin {}", name, pin);
        outputs.push((name.clone(), Box::new(output)));
    }
    Ok(outputs)
}

#[cfg(not(feature = "rpi"))]
fn claim_outputs(config: &Config) -> Result<Vec<(String, Box<dyn DigitalOutput>)>, OutputError> {
    log::info!(
        "GPIO backend disabled (built without the 'rpi' feature), simulating {} output(s)",
        config.pins.len()
    );
    Ok(config
        .pins
        .keys()
        .map(|name| {
            (
                name.clone(),
                Box::new(gpio::SimOutput::new(name)) as Box<dyn DigitalOutput>,
            )
        })
        .collect())
}
