//! Loudness metering and bracket classification
//!
//! A block of samples reduces to a single RMS loudness value, and a
//! threshold table maps that value onto one of four ordered brackets. The
//! table is configuration: bounds are validated once at startup and the
//! classification algorithm itself never changes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::SampleBlock;

/// A loudness tier used to select an LED pattern
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Bracket {
    Silent,
    Low,
    Medium,
    High,
}

impl Bracket {
    pub const ALL: &[Bracket] = &[Self::Silent, Self::Low, Self::Medium, Self::High];
}

/// Root-mean-square amplitude of a block.
///
/// Squares accumulate in i64 - i16 squares overflow 32 bits after a few
/// thousand samples - with the mean and root taken in f64.
pub fn rms(block: &SampleBlock) -> f64 {
    let samples = block.samples();
    let energy: i64 = samples.iter().map(|&s| i64::from(s) * i64::from(s)).sum();
    (energy as f64 / samples.len() as f64).sqrt()
}

/// One classification band: loudness below `upper` falls in `bracket`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Band {
    pub upper: f64,
    pub bracket: Bracket,
}

/// Ordered loudness-bound-to-bracket table.
///
/// Bands are half-open intervals `[previous upper, upper)` in ascending
/// order; anything at or above the last bound classifies as `top`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdTable {
    pub bands: Vec<Band>,
    pub top: Bracket,
}

/// Threshold table validation failures
#[derive(Debug, Error)]
pub enum TableError {
    #[error("threshold bound {0} is not finite")]
    NonFiniteBound(f64),

    #[error("threshold bounds must be strictly ascending ({0} follows {1})")]
    NonAscending(f64, f64),
}

impl ThresholdTable {
    /// Check the strictly-ascending-bounds invariant. Must pass before the
    /// table is used for classification.
    pub fn validate(&self) -> Result<(), TableError> {
        let mut previous: Option<f64> = None;
        for band in &self.bands {
            if !band.upper.is_finite() {
                return Err(TableError::NonFiniteBound(band.upper));
            }
            if let Some(prev) = previous {
                if band.upper <= prev {
                    return Err(TableError::NonAscending(band.upper, prev));
                }
            }
            previous = Some(band.upper);
        }
        Ok(())
    }

    /// Map a loudness value to its bracket: the first band whose bound
    /// exceeds the value, or `top` when none does.
    pub fn classify(&self, loudness: f64) -> Bracket {
        for band in &self.bands {
            if loudness < band.upper {
                return band.bracket;
            }
        }
        self.top
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            bands: vec![
                Band {
                    upper: 500.0,
                    bracket: Bracket::Silent,
                },
                Band {
                    upper: 1500.0,
                    bracket: Bracket::Low,
                },
                Band {
                    upper: 3000.0,
                    bracket: Bracket::Medium,
                },
            ],
            top: Bracket::High,
        }
    }
}
