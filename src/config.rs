//! Static configuration
//!
//! Loaded once at startup from the platform config directory and validated
//! before any resource is acquired. A missing file means defaults; a file
//! that fails to parse or validate is fatal rather than silently replaced,
//! because the threshold table and pin map decide what the hardware does.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::meter::{Bracket, TableError, ThresholdTable};

/// Returns the path to the config file: `~/.config/loudlight-rs/config.json`
fn config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("loudlight-rs");
    path.push("config.json");
    path
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Thresholds(#[from] TableError),

    #[error("sample rate must be positive")]
    ZeroSampleRate,

    #[error("chunk size must be positive")]
    ZeroChunk,

    #[error("no outputs configured")]
    NoOutputs,

    #[error("no pattern configured for bracket {0:?}")]
    MissingBracket(Bracket),

    #[error("pattern for bracket {bracket:?} references unknown output '{name}'")]
    UnknownOutput { bracket: Bracket, name: String },
}

/// Static configuration for the whole system.
///
/// Fields use `#[serde(default)]` so a partial config file only overrides
/// what it names.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Capture sample rate in Hz
    pub sample_rate: u32,

    /// Samples per block, one block per loop iteration
    pub chunk_size: usize,

    /// Pause after each iteration, in milliseconds
    pub pause_ms: u64,

    /// Loudness bracket boundaries
    pub thresholds: ThresholdTable,

    /// Which outputs are lit for each bracket
    pub patterns: HashMap<Bracket, HashSet<String>>,

    /// Output name to BCM pin number
    pub pins: BTreeMap<String, u8>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            chunk_size: 1024,
            pause_ms: 50,
            thresholds: ThresholdTable::default(),
            patterns: HashMap::from([
                (Bracket::Silent, HashSet::new()),
                (Bracket::Low, HashSet::from(["blue".to_string()])),
                (Bracket::Medium, HashSet::from(["yellow".to_string()])),
                (Bracket::High, HashSet::from(["red".to_string()])),
            ]),
            pins: BTreeMap::from([
                ("white".to_string(), 24),
                ("yellow".to_string(), 23),
                ("blue".to_string(), 17),
                ("red".to_string(), 27),
                ("green".to_string(), 22),
            ]),
        }
    }
}

impl Config {
    /// Load from disk; a missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path();
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                let config = serde_json::from_str(&contents)?;
                log::info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check the invariants the rest of the system assumes: positive sizes,
    /// ascending thresholds, a pattern for every bracket, and patterns that
    /// only name configured outputs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunk);
        }
        if self.pins.is_empty() {
            return Err(ConfigError::NoOutputs);
        }
        self.thresholds.validate()?;
        for &bracket in Bracket::ALL {
            let pattern = self
                .patterns
                .get(&bracket)
                .ok_or(ConfigError::MissingBracket(bracket))?;
            for name in pattern {
                if !self.pins.contains_key(name) {
                    return Err(ConfigError::UnknownOutput {
                        bracket,
                        name: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    /// Pattern lookup table for the control loop. Call after `validate`.
    pub fn pattern_map(&self) -> PatternMap {
        let get = |bracket: Bracket| self.patterns.get(&bracket).cloned().unwrap_or_default();
        PatternMap {
            silent: get(Bracket::Silent),
            low: get(Bracket::Low),
            medium: get(Bracket::Medium),
            high: get(Bracket::High),
        }
    }
}

/// Output pattern per bracket; total over the bracket enumeration, so a
/// lookup can never miss.
#[derive(Debug, Clone)]
pub struct PatternMap {
    silent: HashSet<String>,
    low: HashSet<String>,
    medium: HashSet<String>,
    high: HashSet<String>,
}

impl PatternMap {
    pub fn get(&self, bracket: Bracket) -> &HashSet<String> {
        match bracket {
            Bracket::Silent => &self.silent,
            Bracket::Low => &self.low,
            Bracket::Medium => &self.medium,
            Bracket::High => &self.high,
        }
    }
}
