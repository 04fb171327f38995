//! Phase-banded progress model.

use serde::{Deserialize, Serialize};

/// Known pipeline phases. Records store the phase as a free-form string so
/// workers may also report custom labels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initializing,
    Download,
    Chunking,
    Extraction,
    Merge,
    Save,
    Complete,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Initializing,
        Phase::Download,
        Phase::Chunking,
        Phase::Extraction,
        Phase::Merge,
        Phase::Save,
        Phase::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initializing => "initializing",
            Phase::Download => "download",
            Phase::Chunking => "chunking",
            Phase::Extraction => "extraction",
            Phase::Merge => "merge",
            Phase::Save => "save",
            Phase::Complete => "complete",
        }
    }

    /// Parses a phase tag. Returns `None` for custom labels.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower bound of the extraction band.
const EXTRACTION_START: u64 = 10;
/// Width of the extraction band, spread across chunks.
const EXTRACTION_SPAN: u64 = 60;
/// Upper bound of the extraction band.
const EXTRACTION_END: u64 = EXTRACTION_START + EXTRACTION_SPAN;

/// Maps a phase and unit counters to an overall 0-100 progress value.
///
/// The bands are fixed: 0, 5, 10, 10-70 (extraction, proportional to
/// completed units), 75, 95, 100. Unknown phases map to 0.
pub fn calculate_progress(phase: &str, completed_units: u32, total_units: u32) -> u8 {
    let Some(phase) = Phase::parse(phase) else {
        return 0;
    };

    match phase {
        Phase::Initializing => 0,
        Phase::Download => 5,
        Phase::Chunking => 10,
        Phase::Extraction => {
            if total_units == 0 {
                return EXTRACTION_START as u8;
            }
            let done = u64::from(completed_units) * EXTRACTION_SPAN / u64::from(total_units);
            (EXTRACTION_START + done).min(EXTRACTION_END) as u8
        }
        Phase::Merge => 75,
        Phase::Save => 95,
        Phase::Complete => 100,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_bands() {
        assert_eq!(calculate_progress("initializing", 0, 0), 0);
        assert_eq!(calculate_progress("download", 0, 0), 5);
        assert_eq!(calculate_progress("chunking", 3, 9), 10);
        assert_eq!(calculate_progress("merge", 0, 0), 75);
        assert_eq!(calculate_progress("save", 7, 2), 95);
        assert_eq!(calculate_progress("complete", 0, 0), 100);
    }

    #[test]
    fn test_extraction_band() {
        assert_eq!(calculate_progress("extraction", 0, 0), 10);
        assert_eq!(calculate_progress("extraction", 0, 6), 10);
        assert_eq!(calculate_progress("extraction", 3, 6), 40);
        assert_eq!(calculate_progress("extraction", 6, 6), 70);
        assert_eq!(calculate_progress("extraction", 1, 7), 18);
    }

    #[test]
    fn test_extraction_clamped_when_overcounted() {
        assert_eq!(calculate_progress("extraction", 12, 6), 70);
        assert_eq!(calculate_progress("extraction", u32::MAX, 1), 70);
    }

    #[test]
    fn test_unknown_phase() {
        assert_eq!(calculate_progress("unknown", 5, 10), 0);
        assert_eq!(calculate_progress("Extraction", 5, 10), 0);
        assert_eq!(calculate_progress("", 0, 0), 0);
    }

    #[test]
    fn test_phase_round_trip_through_tag() {
        for phase in Phase::ALL {
            assert_eq!(Phase::parse(phase.as_str()), Some(phase));
        }
        assert_eq!(Phase::parse("finalizing"), None);
    }
}
