//! LED bank - named digital outputs driven as one unit
//!
//! The bank owns every output and commits a whole active subset per update:
//! members of the subset go high, everything else goes low. The last
//! committed level is cached per output, so repeating an update performs no
//! hardware writes, and a failed write invalidates the cache entry so the
//! next update retries that output.

use std::collections::HashSet;

use thiserror::Error;

/// A single digital output line.
///
/// Implementations wrap the actual hardware; the bank only needs level
/// writes.
pub trait DigitalOutput {
    fn write(&mut self, high: bool) -> Result<(), OutputError>;
}

/// Failure writing or claiming one output line
#[derive(Debug, Error)]
#[error("{0}")]
pub struct OutputError(pub String);

/// Errors from the bank as a whole
#[derive(Debug, Error)]
pub enum LightError {
    #[error("LED bank needs at least one output")]
    Empty,

    #[error("{failed} of {total} output writes failed")]
    PartialWrite { failed: usize, total: usize },
}

struct Led {
    name: String,
    line: Box<dyn DigitalOutput>,
    /// Last committed level; `None` until the first write and after a
    /// failed one, forcing a real write next update.
    level: Option<bool>,
}

/// The actuator bank: every named output, driven together
pub struct LedBank {
    leds: Vec<Led>,
}

impl LedBank {
    pub fn new(outputs: Vec<(String, Box<dyn DigitalOutput>)>) -> Result<Self, LightError> {
        if outputs.is_empty() {
            return Err(LightError::Empty);
        }
        let leds = outputs
            .into_iter()
            .map(|(name, line)| Led {
                name,
                line,
                level: None,
            })
            .collect();
        Ok(Self { leds })
    }

    /// Drive the named outputs high and every other output low.
    ///
    /// Every output ends at a known level, so no stale LED is left on when
    /// the pattern changes. Idempotent: repeating a call with the same set
    /// changes nothing and skips the hardware entirely. A failed write is
    /// logged, the remaining outputs are still attempted, and the failures
    /// surface as one aggregate error for the iteration.
    pub fn set_active(&mut self, active: &HashSet<String>) -> Result<(), LightError> {
        let total = self.leds.len();
        let mut failed = 0;
        for led in &mut self.leds {
            let desired = active.contains(&led.name);
            if led.level == Some(desired) {
                continue;
            }
            match led.line.write(desired) {
                Ok(()) => led.level = Some(desired),
                Err(e) => {
                    log::warn!("Failed to drive output '{}': {}", led.name, e);
                    led.level = None;
                    failed += 1;
                }
            }
        }
        if failed > 0 {
            Err(LightError::PartialWrite { failed, total })
        } else {
            Ok(())
        }
    }

    /// Turn every output off. Used at startup and teardown.
    pub fn all_off(&mut self) -> Result<(), LightError> {
        self.set_active(&HashSet::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    type Writes = Rc<RefCell<Vec<(&'static str, bool)>>>;

    struct MockOutput {
        name: &'static str,
        writes: Writes,
        fail: Rc<Cell<bool>>,
    }

    impl DigitalOutput for MockOutput {
        fn write(&mut self, high: bool) -> Result<(), OutputError> {
            if self.fail.get() {
                return Err(OutputError("write failed".to_string()));
            }
            self.writes.borrow_mut().push((self.name, high));
            Ok(())
        }
    }

    fn mock(name: &'static str, writes: &Writes) -> (String, Box<dyn DigitalOutput>) {
        let output = MockOutput {
            name,
            writes: Rc::clone(writes),
            fail: Rc::new(Cell::new(false)),
        };
        (name.to_string(), Box::new(output))
    }

    fn bank_of(names: &[&'static str], writes: &Writes) -> LedBank {
        LedBank::new(names.iter().map(|&name| mock(name, writes)).collect()).unwrap()
    }

    fn active(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    /// Last committed level per output, from the write log.
    fn final_level(writes: &Writes, name: &str) -> Option<bool> {
        writes
            .borrow()
            .iter()
            .rev()
            .find(|(n, _)| *n == name)
            .map(|&(_, high)| high)
    }

    #[test]
    fn first_update_drives_every_output() {
        let writes = Writes::default();
        let mut bank = bank_of(&["blue", "red"], &writes);

        bank.set_active(&active(&["blue"])).unwrap();

        assert!(writes.borrow().contains(&("blue", true)));
        assert!(writes.borrow().contains(&("red", false)));
    }

    #[test]
    fn repeated_update_performs_no_writes() {
        let writes = Writes::default();
        let mut bank = bank_of(&["blue", "red"], &writes);

        bank.set_active(&active(&["blue"])).unwrap();
        let count = writes.borrow().len();

        bank.set_active(&active(&["blue"])).unwrap();
        assert_eq!(writes.borrow().len(), count);
    }

    #[test]
    fn switching_patterns_leaves_no_stale_output() {
        let writes = Writes::default();
        let mut bank = bank_of(&["red", "green"], &writes);

        bank.set_active(&active(&["red"])).unwrap();
        bank.set_active(&active(&["green"])).unwrap();

        assert_eq!(final_level(&writes, "red"), Some(false));
        assert_eq!(final_level(&writes, "green"), Some(true));
    }

    #[test]
    fn all_off_clears_everything() {
        let writes = Writes::default();
        let mut bank = bank_of(&["blue", "yellow", "red"], &writes);

        bank.set_active(&active(&["blue", "red"])).unwrap();
        bank.all_off().unwrap();

        for name in ["blue", "yellow", "red"] {
            assert_eq!(final_level(&writes, name), Some(false));
        }
    }

    #[test]
    fn failed_write_continues_with_remaining_outputs() {
        let writes = Writes::default();
        let fail = Rc::new(Cell::new(true));
        let broken = MockOutput {
            name: "blue",
            writes: Rc::clone(&writes),
            fail: Rc::clone(&fail),
        };
        let outputs: Vec<(String, Box<dyn DigitalOutput>)> = vec![
            ("blue".to_string(), Box::new(broken)),
            mock("red", &writes),
        ];
        let mut bank = LedBank::new(outputs).unwrap();

        let result = bank.set_active(&active(&["blue", "red"]));
        assert!(matches!(
            result,
            Err(LightError::PartialWrite { failed: 1, total: 2 })
        ));
        // The healthy output was still driven
        assert_eq!(final_level(&writes, "red"), Some(true));
    }

    #[test]
    fn failed_output_is_retried_after_recovery() {
        let writes = Writes::default();
        let fail = Rc::new(Cell::new(true));
        let flaky = MockOutput {
            name: "blue",
            writes: Rc::clone(&writes),
            fail: Rc::clone(&fail),
        };
        let outputs: Vec<(String, Box<dyn DigitalOutput>)> =
            vec![("blue".to_string(), Box::new(flaky))];
        let mut bank = LedBank::new(outputs).unwrap();

        assert!(bank.set_active(&active(&["blue"])).is_err());

        fail.set(false);
        bank.set_active(&active(&["blue"])).unwrap();
        assert_eq!(final_level(&writes, "blue"), Some(true));
    }

    #[test]
    fn empty_bank_is_rejected() {
        assert!(matches!(LedBank::new(Vec::new()), Err(LightError::Empty)));
    }
}
