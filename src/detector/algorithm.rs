// Detector algorithms
// Closed set of QRS detectors the benchmark knows how to name

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::detector::backend::DetectorError;

/// Benchmarked QRS detectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Algorithm {
    PanTompkins,
    Hamilton,
    Christov,
    EngelseZeelenberg,
    Swt,
    /// Template based; templates exist for 250 Hz and 360 Hz only
    MatchedFilter,
    TwoAverage,
    HamiltonBiosppy,
    ChristovBiosppy,
    EngelseZeelenbergBiosppy,
    GamboaBiosppy,
    MneEcg,
    Heartpy,
    GqrsWfdb,
    XqrsWfdb,
}

impl Algorithm {
    pub const ALL: [Algorithm; 15] = [
        Algorithm::PanTompkins,
        Algorithm::Hamilton,
        Algorithm::Christov,
        Algorithm::EngelseZeelenberg,
        Algorithm::Swt,
        Algorithm::MatchedFilter,
        Algorithm::TwoAverage,
        Algorithm::HamiltonBiosppy,
        Algorithm::ChristovBiosppy,
        Algorithm::EngelseZeelenbergBiosppy,
        Algorithm::GamboaBiosppy,
        Algorithm::MneEcg,
        Algorithm::Heartpy,
        Algorithm::GqrsWfdb,
        Algorithm::XqrsWfdb,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::PanTompkins => "Pan-Tompkins-ecg-detector",
            Algorithm::Hamilton => "Hamilton-ecg-detector",
            Algorithm::Christov => "Christov-ecg-detector",
            Algorithm::EngelseZeelenberg => "Engelse-Zeelenberg-ecg-detector",
            Algorithm::Swt => "SWT-ecg-detector",
            Algorithm::MatchedFilter => "Matched-filter-ecg-detector",
            Algorithm::TwoAverage => "Two-average-ecg-detector",
            Algorithm::HamiltonBiosppy => "Hamilton-biosppy",
            Algorithm::ChristovBiosppy => "Christov-biosppy",
            Algorithm::EngelseZeelenbergBiosppy => "Engelse-Zeelenberg-biosppy",
            Algorithm::GamboaBiosppy => "Gamboa-biosppy",
            Algorithm::MneEcg => "mne-ecg",
            Algorithm::Heartpy => "heartpy",
            Algorithm::GqrsWfdb => "gqrs-wfdb",
            Algorithm::XqrsWfdb => "xqrs-wfdb",
        }
    }

    /// Sampling frequencies the detector can run at; `None` means any
    pub fn supported_sampling_frequencies(&self) -> Option<&'static [u32]> {
        match self {
            Algorithm::MatchedFilter => Some(&[250, 360]),
            _ => None,
        }
    }

    pub fn supports(&self, sampling_frequency_hz: u32) -> bool {
        self.supported_sampling_frequencies()
            .map_or(true, |rates| rates.contains(&sampling_frequency_hz))
    }

    pub fn valid_names() -> String {
        Algorithm::ALL
            .iter()
            .map(|a| a.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = DetectorError;

    /// Algorithm names are case-sensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .iter()
            .find(|a| a.name() == s)
            .copied()
            .ok_or_else(|| DetectorError::UnknownAlgorithm {
                name: s.to_string(),
                valid: Algorithm::valid_names(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_every_name() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.name().parse::<Algorithm>().unwrap(), algorithm);
        }
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert!("HEARTPY".parse::<Algorithm>().is_err());
        let err = "pan-tompkins-ecg-detector".parse::<Algorithm>().unwrap_err();
        assert!(err.to_string().contains("Pan-Tompkins-ecg-detector"));
    }

    #[test]
    fn test_matched_filter_frequencies() {
        assert!(Algorithm::MatchedFilter.supports(360));
        assert!(Algorithm::MatchedFilter.supports(250));
        assert!(!Algorithm::MatchedFilter.supports(128));
        assert!(Algorithm::XqrsWfdb.supports(128));
    }
}
