//! Digital output backends
//!
//! With the `rpi` feature the bank drives BCM-numbered GPIO pins through
//! rppal. Without it, `SimOutput` stands in and logs level changes, which
//! keeps the binary runnable on machines without GPIO hardware.

use crate::lights::{DigitalOutput, OutputError};

/// One GPIO pin claimed as an output, starting low.
#[cfg(feature = "rpi")]
pub struct GpioOutput {
    pin: rppal::gpio::OutputPin,
}

#[cfg(feature = "rpi")]
impl GpioOutput {
    pub fn claim(bcm: u8) -> Result<Self, OutputError> {
        let pin = rppal::gpio::Gpio::new()
            .and_then(|gpio| gpio.get(bcm))
            .map_err(|e| OutputError(e.to_string()))?
            .into_output_low();
        Ok(Self { pin })
    }
}

#[cfg(feature = "rpi")]
impl DigitalOutput for GpioOutput {
    fn write(&mut self, high: bool) -> Result<(), OutputError> {
        if high {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        Ok(())
    }
}

/// Stand-in output that logs level changes instead of touching hardware.
#[cfg(not(feature = "rpi"))]
pub struct SimOutput {
    name: String,
}

#[cfg(not(feature = "rpi"))]
impl SimOutput {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[cfg(not(feature = "rpi"))]
impl DigitalOutput for SimOutput {
    fn write(&mut self, high: bool) -> Result<(), OutputError> {
        log::info!("[sim] {} -> {}", self.name, if high { "on" } else { "off" });
        Ok(())
    }
}
