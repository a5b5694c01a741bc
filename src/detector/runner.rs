// Detection runner
// Runs one detector over every channel of every record of a dataset

use std::collections::BTreeMap;

use crate::dataset::{Dataset, RecordEntry};
use crate::detector::algorithm::Algorithm;
use crate::detector::backend::{DetectorError, DetectorResult, DetectorSet};
use crate::events::SampleIndex;
use crate::report::{write_detections, ArtifactInfo, Detections, OutputLayout};

/// Supplies raw waveforms; parsing the recording format is up to the implementor
pub trait SignalSource {
    fn load_channel(
        &self,
        dataset: Dataset,
        record: &RecordEntry,
        channel: &str,
    ) -> Result<Vec<f32>, String>;
}

/// Keep non-negative indices; a detector reporting a position before the
/// start of the signal is logged and the position discarded
fn sanitize(events: Vec<SampleIndex>, record_id: &str, channel: &str) -> Vec<SampleIndex> {
    let total = events.len();
    let kept: Vec<SampleIndex> = events.into_iter().filter(|&e| e >= 0).collect();
    if kept.len() < total {
        log::warn!(
            "Dropped {} negative detections on record {} channel {}",
            total - kept.len(),
            record_id,
            channel
        );
    }
    kept
}

/// Detections for every (record, channel) of the dataset
pub fn run_detection(
    dataset: Dataset,
    algorithm: Algorithm,
    detectors: &DetectorSet,
    source: &dyn SignalSource,
) -> DetectorResult<Detections> {
    let sampling_frequency_hz = dataset.sampling_frequency();
    let detector = detectors.resolve(algorithm, sampling_frequency_hz)?;

    let records = dataset.records();
    let total = records.len();
    let mut detections = Detections::new();

    log::info!("Detection with {} on {} is running", algorithm, dataset);
    for (n, record) in records.iter().enumerate() {
        let mut channels = BTreeMap::new();
        for channel in &record.channels {
            let signal = source
                .load_channel(dataset, record, channel)
                .map_err(|reason| DetectorError::SignalLoad {
                    record_id: record.id.clone(),
                    channel: channel.clone(),
                    reason,
                })?;
            let events = detector.detect(&signal, sampling_frequency_hz);
            channels.insert(channel.clone(), sanitize(events, &record.id, channel));
        }
        detections.insert(record.id.clone(), channels);
        log::info!("{}/{}", n + 1, total);
    }
    log::info!("Detection with {} on {} finished", algorithm, dataset);

    Ok(detections)
}

/// Run detection and persist the result where the evaluator expects it
pub fn run_and_store_detection(
    layout: &OutputLayout,
    dataset: Dataset,
    algorithm: Algorithm,
    detectors: &DetectorSet,
    source: &dyn SignalSource,
) -> DetectorResult<ArtifactInfo> {
    let detections = run_detection(dataset, algorithm, detectors, source)?;
    Ok(write_detections(
        layout,
        algorithm.name(),
        dataset.name(),
        &detections,
    )?)
}
