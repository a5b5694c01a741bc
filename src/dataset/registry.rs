// Dataset registry
// Closed set of benchmark databases, their sampling frequencies and record tables

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("Unknown dataset '{name}'. Valid datasets: {valid}")]
    UnknownDataset { name: String, valid: String },

    #[error("Record {record_id} of {dataset} has no channel '{channel}' (available: {available})")]
    UnknownChannel {
        dataset: Dataset,
        record_id: String,
        channel: String,
        available: String,
    },
}

pub type DatasetResult<T> = Result<T, DatasetError>;

/// Benchmark databases with reference beat annotations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dataset {
    MitBihArrhythmia,
    NoiseStressE24,
    NoiseStressE18,
    NoiseStressE12,
    NoiseStressE06,
    NoiseStressE00,
    NoiseStressEMinus6,
    EuropeanStt,
    MitBihSupraventricularArrhythmia,
    MitBihLongTermEcg,
}

/// One record and its channel names, first channel first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub id: String,
    pub channels: Vec<String>,
}

impl RecordEntry {
    fn new(id: impl Into<String>, channels: &[&str]) -> Self {
        RecordEntry {
            id: id.into(),
            channels: channels.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Channel evaluated by default
    pub fn primary_channel(&self) -> Option<&str> {
        self.channels.first().map(String::as_str)
    }
}

fn table(rows: &[(&str, &[&str])]) -> Vec<RecordEntry> {
    rows.iter()
        .map(|(id, channels)| RecordEntry::new(*id, channels))
        .collect()
}

impl Dataset {
    pub const ALL: [Dataset; 10] = [
        Dataset::MitBihArrhythmia,
        Dataset::NoiseStressE24,
        Dataset::NoiseStressE18,
        Dataset::NoiseStressE12,
        Dataset::NoiseStressE06,
        Dataset::NoiseStressE00,
        Dataset::NoiseStressEMinus6,
        Dataset::EuropeanStt,
        Dataset::MitBihSupraventricularArrhythmia,
        Dataset::MitBihLongTermEcg,
    ];

    /// Noise stress test levels, lowest SNR first
    pub const NOISE_STRESS: [Dataset; 6] = [
        Dataset::NoiseStressEMinus6,
        Dataset::NoiseStressE00,
        Dataset::NoiseStressE06,
        Dataset::NoiseStressE12,
        Dataset::NoiseStressE18,
        Dataset::NoiseStressE24,
    ];

    /// Databases compared in the cross-dataset overview
    pub const REFERENCE: [Dataset; 4] = [
        Dataset::MitBihArrhythmia,
        Dataset::MitBihSupraventricularArrhythmia,
        Dataset::MitBihLongTermEcg,
        Dataset::EuropeanStt,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Dataset::MitBihArrhythmia => "mit-bih-arrhythmia",
            Dataset::NoiseStressE24 => "mit-bih-noise-stress-test-e24",
            Dataset::NoiseStressE18 => "mit-bih-noise-stress-test-e18",
            Dataset::NoiseStressE12 => "mit-bih-noise-stress-test-e12",
            Dataset::NoiseStressE06 => "mit-bih-noise-stress-test-e06",
            Dataset::NoiseStressE00 => "mit-bih-noise-stress-test-e00",
            Dataset::NoiseStressEMinus6 => "mit-bih-noise-stress-test-e_6",
            Dataset::EuropeanStt => "european-stt",
            Dataset::MitBihSupraventricularArrhythmia => "mit-bih-supraventricular-arrhythmia",
            Dataset::MitBihLongTermEcg => "mit-bih-long-term-ecg",
        }
    }

    pub fn sampling_frequency(&self) -> u32 {
        match self {
            Dataset::MitBihArrhythmia
            | Dataset::NoiseStressE24
            | Dataset::NoiseStressE18
            | Dataset::NoiseStressE12
            | Dataset::NoiseStressE06
            | Dataset::NoiseStressE00
            | Dataset::NoiseStressEMinus6 => 360,
            Dataset::EuropeanStt => 250,
            Dataset::MitBihSupraventricularArrhythmia | Dataset::MitBihLongTermEcg => 128,
        }
    }

    /// Signal-to-noise ratio of a noise stress test level, in dB
    pub fn snr_db(&self) -> Option<i32> {
        match self {
            Dataset::NoiseStressE24 => Some(24),
            Dataset::NoiseStressE18 => Some(18),
            Dataset::NoiseStressE12 => Some(12),
            Dataset::NoiseStressE06 => Some(6),
            Dataset::NoiseStressE00 => Some(0),
            Dataset::NoiseStressEMinus6 => Some(-6),
            _ => None,
        }
    }

    /// Record table in canonical order. A fresh copy on every call, so nothing
    /// a run does to it leaks into the next run.
    pub fn records(&self) -> Vec<RecordEntry> {
        match self {
            Dataset::MitBihArrhythmia => table(MIT_BIH_ARRHYTHMIA),
            Dataset::EuropeanStt => table(EUROPEAN_STT),
            Dataset::MitBihLongTermEcg => table(MIT_BIH_LONG_TERM),
            Dataset::MitBihSupraventricularArrhythmia => (800..=812)
                .chain(820..=829)
                .chain(840..=894)
                .map(|id: u32| RecordEntry::new(id.to_string(), &["ECG1", "ECG2"]))
                .collect(),
            noise => {
                // "mit-bih-noise-stress-test-e24" -> records 118e24 and 119e24
                let level = noise.name().trim_start_matches("mit-bih-noise-stress-test-");
                ["118", "119"]
                    .iter()
                    .map(|base| RecordEntry::new(format!("{}{}", base, level), &["MLII", "V1"]))
                    .collect()
            }
        }
    }

    pub fn record_count(&self) -> usize {
        self.records().len()
    }

    /// Channel to evaluate for a record: the override when given, else the first channel
    pub fn channel_for<'a>(
        &self,
        record: &'a RecordEntry,
        channel_override: Option<&'a str>,
    ) -> DatasetResult<&'a str> {
        let unknown = |channel: &str| DatasetError::UnknownChannel {
            dataset: *self,
            record_id: record.id.clone(),
            channel: channel.to_string(),
            available: record.channels.join(", "),
        };

        match channel_override {
            Some(channel) if record.channels.iter().any(|c| c == channel) => Ok(channel),
            Some(channel) => Err(unknown(channel)),
            None => record.primary_channel().ok_or_else(|| unknown("<none>")),
        }
    }

    pub fn valid_names() -> String {
        Dataset::ALL
            .iter()
            .map(|d| d.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dataset {
    type Err = DatasetError;

    /// Dataset names are matched case-insensitively
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dataset::ALL
            .iter()
            .find(|d| d.name().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| DatasetError::UnknownDataset {
                name: s.to_string(),
                valid: Dataset::valid_names(),
            })
    }
}

const MIT_BIH_ARRHYTHMIA: &[(&str, &[&str])] = &[
    ("100", &["MLII", "V5"]),
    ("101", &["MLII", "V1"]),
    ("102", &["V5", "V2"]),
    ("103", &["MLII", "V2"]),
    ("104", &["V5", "V2"]),
    ("105", &["MLII", "V1"]),
    ("106", &["MLII", "V1"]),
    ("107", &["MLII", "V1"]),
    ("108", &["MLII", "V1"]),
    ("109", &["MLII", "V1"]),
    ("111", &["MLII", "V1"]),
    ("112", &["MLII", "V1"]),
    ("113", &["MLII", "V1"]),
    ("114", &["MLII", "V5"]),
    ("115", &["MLII", "V1"]),
    ("116", &["MLII", "V1"]),
    ("117", &["MLII", "V2"]),
    ("118", &["MLII", "V1"]),
    ("119", &["MLII", "V1"]),
    ("121", &["MLII", "V1"]),
    ("122", &["MLII", "V1"]),
    ("123", &["MLII", "V5"]),
    ("124", &["MLII", "V4"]),
    ("200", &["MLII", "V1"]),
    ("201", &["MLII", "V1"]),
    ("202", &["MLII", "V1"]),
    ("203", &["MLII", "V1"]),
    ("205", &["MLII", "V1"]),
    ("207", &["MLII", "V1"]),
    ("208", &["MLII", "V1"]),
    ("209", &["MLII", "V1"]),
    ("210", &["MLII", "V1"]),
    ("212", &["MLII", "V1"]),
    ("213", &["MLII", "V1"]),
    ("214", &["MLII", "V1"]),
    ("215", &["MLII", "V1"]),
    ("217", &["MLII", "V1"]),
    ("219", &["MLII", "V1"]),
    ("220", &["MLII", "V1"]),
    ("221", &["MLII", "V1"]),
    ("222", &["MLII", "V1"]),
    ("223", &["MLII", "V1"]),
    ("228", &["MLII", "V1"]),
    ("230", &["MLII", "V1"]),
    ("231", &["MLII", "V1"]),
    ("232", &["MLII", "V1"]),
    ("233", &["MLII", "V1"]),
    ("234", &["MLII", "V1"]),
];

const EUROPEAN_STT: &[(&str, &[&str])] = &[
    ("e0103", &["V4", "MLIII"]),
    ("e0104", &["MLIII", "V4"]),
    ("e0105", &["MLIII", "V4"]),
    ("e0106", &["MLIII", "V3"]),
    ("e0107", &["D3", "V4"]),
    ("e0108", &["V4", "MLIII"]),
    ("e0110", &["V3", "MLIII"]),
    ("e0111", &["MLIII", "V4"]),
    ("e0112", &["MLIII", "V4"]),
    ("e0113", &["MLIII", "V4"]),
    ("e0114", &["MLIII", "V4"]),
    ("e0115", &["V5", "MLIII"]),
    ("e0116", &["V4", "MLIII"]),
    ("e0118", &["V4", "MLIII"]),
    ("e0119", &["V4", "MLIII"]),
    ("e0121", &["V4", "MLIII"]),
    ("e0122", &["V4", "MLIII"]),
    ("e0123", &["V4", "MLIII"]),
    ("e0124", &["V4", "MLIII"]),
    ("e0125", &["V4", "MLIII"]),
    ("e0126", &["V4", "MLIII"]),
    ("e0127", &["V4", "MLIII"]),
    ("e0129", &["MLIII", "V3"]),
    ("e0133", &["MLIII", "V3"]),
    ("e0136", &["MLIII", "V4"]),
    ("e0139", &["MLIII", "V4"]),
    ("e0147", &["MLIII", "V4"]),
    ("e0148", &["MLIII", "V4"]),
    ("e0151", &["V3", "MLIII"]),
    ("e0154", &["MLIII", "V4"]),
    ("e0155", &["MLIII", "V4"]),
    ("e0159", &["MLIII", "V4"]),
    ("e0161", &["V4", "MLIII"]),
    ("e0162", &["MLIII", "V4"]),
    ("e0163", &["MLIII", "V4"]),
    ("e0166", &["V4", "MLIII"]),
    ("e0170", &["V4", "MLIII"]),
    ("e0202", &["V5", "MLI"]),
    ("e0203", &["V5", "MLI"]),
    ("e0204", &["V5", "MLI"]),
    ("e0205", &["V5", "MLI"]),
    ("e0206", &["V5", "MLI"]),
    ("e0207", &["V5", "MLI"]),
    ("e0208", &["V5", "MLI"]),
    ("e0210", &["V5", "MLI"]),
    ("e0211", &["V5", "MLI"]),
    ("e0212", &["V5", "MLI"]),
    ("e0213", &["V5", "MLI"]),
    ("e0302", &["V3", "V5"]),
    ("e0303", &["V2", "V5"]),
    ("e0304", &["V3", "V5"]),
    ("e0305", &["V2", "V5"]),
    ("e0306", &["V2", "V5"]),
    ("e0403", &["V5", "V1"]),
    ("e0404", &["V5", "MLI"]),
    ("e0405", &["V5", "V1"]),
    ("e0406", &["V5", "MLI"]),
    ("e0408", &["V5", "MLI"]),
    ("e0409", &["V5", "MLI"]),
    ("e0410", &["V5", "MLI"]),
    ("e0411", &["V5", "MLI"]),
    ("e0413", &["V2", "V5"]),
    ("e0415", &["V2", "V5"]),
    ("e0417", &["V5", "MLI"]),
    ("e0418", &["V5", "MLI"]),
    ("e0501", &["V2", "V4"]),
    ("e0509", &["V2", "V4"]),
    ("e0515", &["V2", "V5"]),
    ("e0601", &["V5", "MLIII"]),
    ("e0602", &["V5", "MLIII"]),
    ("e0603", &["V5", "V2"]),
    ("e0604", &["V2", "MLIII"]),
    ("e0605", &["V5", "MLIII"]),
    ("e0606", &["V5", "MLIII"]),
    ("e0607", &["V5", "V4"]),
    ("e0609", &["V5", "MLIII"]),
    ("e0610", &["V5", "MLIII"]),
    ("e0611", &["V5", "MLIII"]),
    ("e0612", &["V5", "MLIII"]),
    ("e0613", &["V5", "MLIII"]),
    ("e0614", &["V5", "V1"]),
    ("e0615", &["V5", "MLIII"]),
    ("e0704", &["V5", "V1"]),
    ("e0801", &["V1", "V5"]),
    ("e0808", &["V5", "V1"]),
    ("e0817", &["V5", "V1"]),
    ("e0818", &["V5", "V1"]),
    ("e1301", &["V1", "V5"]),
    ("e1302", &["V1", "V5"]),
    ("e1304", &["V1", "V5"]),
];

const MIT_BIH_LONG_TERM: &[(&str, &[&str])] = &[
    ("14046", &["ECG1", "ECG2"]),
    ("14134", &["ECG1", "ECG2"]),
    ("14149", &["ECG1", "ECG2"]),
    ("14157", &["ECG1", "ECG2"]),
    ("14172", &["ECG1", "ECG2"]),
    ("14184", &["ECG1", "ECG2"]),
    ("15814", &["ECG1", "ECG2", "ECG3"]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("European-STT".parse::<Dataset>().unwrap(), Dataset::EuropeanStt);
        assert_eq!(
            "MIT-BIH-NOISE-STRESS-TEST-E_6".parse::<Dataset>().unwrap(),
            Dataset::NoiseStressEMinus6
        );
        for dataset in Dataset::ALL {
            assert_eq!(dataset.name().parse::<Dataset>().unwrap(), dataset);
        }
    }

    #[test]
    fn test_unknown_dataset_lists_valid_set() {
        let err = "mit-bih".parse::<Dataset>().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("mit-bih-arrhythmia"));
        assert!(message.contains("european-stt"));
    }

    #[test]
    fn test_sampling_frequencies() {
        assert_eq!(Dataset::MitBihArrhythmia.sampling_frequency(), 360);
        assert_eq!(Dataset::NoiseStressE00.sampling_frequency(), 360);
        assert_eq!(Dataset::EuropeanStt.sampling_frequency(), 250);
        assert_eq!(Dataset::MitBihLongTermEcg.sampling_frequency(), 128);
    }

    #[test]
    fn test_record_counts() {
        assert_eq!(Dataset::MitBihArrhythmia.record_count(), 48);
        assert_eq!(Dataset::EuropeanStt.record_count(), 90);
        assert_eq!(Dataset::MitBihSupraventricularArrhythmia.record_count(), 78);
        assert_eq!(Dataset::MitBihLongTermEcg.record_count(), 7);
        for level in Dataset::NOISE_STRESS {
            assert_eq!(level.record_count(), 2);
        }
    }

    #[test]
    fn test_noise_stress_records() {
        let records = Dataset::NoiseStressEMinus6.records();
        assert_eq!(records[0].id, "118e_6");
        assert_eq!(records[1].id, "119e_6");
        assert_eq!(records[0].primary_channel(), Some("MLII"));
        assert_eq!(Dataset::NoiseStressEMinus6.snr_db(), Some(-6));
        assert_eq!(Dataset::EuropeanStt.snr_db(), None);
    }

    #[test]
    fn test_canonical_order_and_channels() {
        let records = Dataset::MitBihArrhythmia.records();
        assert_eq!(records[0].id, "100");
        assert_eq!(records[2].primary_channel(), Some("V5"));
        assert_eq!(records.last().map(|r| r.id.as_str()), Some("234"));

        let long_term = Dataset::MitBihLongTermEcg.records();
        assert_eq!(long_term[6].channels, vec!["ECG1", "ECG2", "ECG3"]);
    }

    #[test]
    fn test_channel_selection() {
        let dataset = Dataset::EuropeanStt;
        let records = dataset.records();
        let first = &records[0];

        assert_eq!(dataset.channel_for(first, None).unwrap(), "V4");
        assert_eq!(dataset.channel_for(first, Some("MLIII")).unwrap(), "MLIII");
        assert!(matches!(
            dataset.channel_for(first, Some("V9")),
            Err(DatasetError::UnknownChannel { .. })
        ));
    }

    #[test]
    fn test_records_are_fresh_copies() {
        let mut records = Dataset::MitBihLongTermEcg.records();
        records.clear();
        assert_eq!(Dataset::MitBihLongTermEcg.record_count(), 7);
    }
}
