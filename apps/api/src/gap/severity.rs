use serde::{Deserialize, Serialize};

use crate::gap::engine::GapError;

/// Coarse, ordered classification of gap magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minimal,
    Moderate,
    Significant,
    Severe,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Minimal => "minimal",
            Severity::Moderate => "moderate",
            Severity::Significant => "significant",
            Severity::Severe => "severe",
        }
    }
}

/// Cut points (in percent) between severity bands.
///
/// `|gap| < minimal_below` → Minimal, `< moderate_below` → Moderate,
/// `< significant_below` → Significant, anything else → Severe.
/// Construct through [`SeverityBands::new`] so the cut points are guaranteed ascending.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeverityBands {
    minimal_below: f64,
    moderate_below: f64,
    significant_below: f64,
}

impl Default for SeverityBands {
    fn default() -> Self {
        Self {
            minimal_below: 2.0,
            moderate_below: 5.0,
            significant_below: 10.0,
        }
    }
}

impl SeverityBands {
    pub fn new(
        minimal_below: f64,
        moderate_below: f64,
        significant_below: f64,
    ) -> Result<Self, GapError> {
        let cuts = [minimal_below, moderate_below, significant_below];
        if cuts.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(GapError::InvalidInput(format!(
                "severity cut points must be finite and non-negative, got {cuts:?}"
            )));
        }
        if !(minimal_below < moderate_below && moderate_below < significant_below) {
            return Err(GapError::InvalidInput(format!(
                "severity cut points must be strictly ascending, got {cuts:?}"
            )));
        }
        Ok(Self {
            minimal_below,
            moderate_below,
            significant_below,
        })
    }

    /// Maps a signed percentage gap to exactly one band, using its magnitude.
    pub fn classify(&self, percentage_gap: f64) -> Severity {
        let magnitude = percentage_gap.abs();
        if magnitude < self.minimal_below {
            Severity::Minimal
        } else if magnitude < self.moderate_below {
            Severity::Moderate
        } else if magnitude < self.significant_below {
            Severity::Significant
        } else {
            // NaN lands here as well, keeping the mapping total.
            Severity::Severe
        }
    }

    pub fn cut_points(&self) -> (f64, f64, f64) {
        (self.minimal_below, self.moderate_below, self.significant_below)
    }
}
