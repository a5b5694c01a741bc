// Delay statistics
// Summaries of the offsets between annotations and their matched detections

use serde::{Deserialize, Serialize};

use crate::events::SampleIndex;

/// Summary of a delay list, in samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayStats {
    pub count: usize,
    pub mean: f64,

    /// Population standard deviation
    pub std_dev: f64,
    pub median: f64,
    pub min: SampleIndex,
    pub max: SampleIndex,
}

impl DelayStats {
    /// Summarize a delay list; `None` when there is nothing to summarize
    pub fn from_delays(delays: &[SampleIndex]) -> Option<Self> {
        if delays.is_empty() {
            return None;
        }

        let count = delays.len();
        let mean = delays.iter().sum::<i64>() as f64 / count as f64;
        let variance = delays
            .iter()
            .map(|&d| (d as f64 - mean).powi(2))
            .sum::<f64>()
            / count as f64;

        let mut sorted = delays.to_vec();
        sorted.sort_unstable();
        let median = if count % 2 == 1 {
            sorted[count / 2] as f64
        } else {
            (sorted[count / 2 - 1] + sorted[count / 2]) as f64 / 2.0
        };

        Some(DelayStats {
            count,
            mean,
            std_dev: variance.sqrt(),
            median,
            min: sorted[0],
            max: sorted[count - 1],
        })
    }

    /// Convert a sample statistic to milliseconds
    pub fn to_ms(samples: f64, sampling_frequency_hz: u32) -> f64 {
        if sampling_frequency_hz == 0 {
            return 0.0;
        }
        samples * 1000.0 / sampling_frequency_hz as f64
    }
}

/// Count of matches per integer delay over `[-radius, radius]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayHistogram {
    pub radius: SampleIndex,

    /// `counts[i]` is the number of delays equal to `i - radius`
    pub counts: Vec<usize>,

    /// Delays outside the range (possible when reading a log written
    /// at a different sampling frequency)
    pub out_of_range: usize,
}

impl DelayHistogram {
    pub fn build(delays: &[SampleIndex], radius: SampleIndex) -> Self {
        let radius = radius.max(0);
        let mut counts = vec![0usize; (2 * radius + 1) as usize];
        let mut out_of_range = 0;

        for &delay in delays {
            if delay.unsigned_abs() <= radius as u64 {
                counts[(delay + radius) as usize] += 1;
            } else {
                out_of_range += 1;
            }
        }

        DelayHistogram {
            radius,
            counts,
            out_of_range,
        }
    }

    /// `(delay, count)` pairs in ascending delay order
    pub fn bins(&self) -> impl Iterator<Item = (SampleIndex, usize)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .map(move |(i, &count)| (i as SampleIndex - self.radius, count))
    }

    /// Most frequent delay, lowest on ties
    pub fn mode(&self) -> Option<SampleIndex> {
        let (index, &count) = self
            .counts
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))?;
        if count == 0 {
            return None;
        }
        Some(index as SampleIndex - self.radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_empty() {
        assert!(DelayStats::from_delays(&[]).is_none());
    }

    #[test]
    fn test_stats_values() {
        let stats = DelayStats::from_delays(&[2, 0, -2, 4]).unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, 1.0);
        assert_eq!(stats.median, 1.0);
        assert_eq!(stats.min, -2);
        assert_eq!(stats.max, 4);
        // Deviations: 1, -1, -3, 3 -> variance 5
        assert!((stats.std_dev - 5f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_stats_odd_median() {
        let stats = DelayStats::from_delays(&[5, -1, 3]).unwrap();
        assert_eq!(stats.median, 3.0);
    }

    #[test]
    fn test_to_ms() {
        assert_eq!(DelayStats::to_ms(36.0, 360), 100.0);
        assert_eq!(DelayStats::to_ms(36.0, 0), 0.0);
    }

    #[test]
    fn test_histogram() {
        let histogram = DelayHistogram::build(&[-2, 0, 0, 1, 7], 2);
        assert_eq!(histogram.counts, vec![1, 0, 2, 1, 0]);
        assert_eq!(histogram.out_of_range, 1);
        assert_eq!(histogram.mode(), Some(0));

        let bins: Vec<_> = histogram.bins().collect();
        assert_eq!(bins[0], (-2, 1));
        assert_eq!(bins[4], (2, 0));
    }

    #[test]
    fn test_histogram_extreme_delays_out_of_range() {
        let histogram = DelayHistogram::build(&[SampleIndex::MIN, SampleIndex::MAX, 0], 2);
        assert_eq!(histogram.out_of_range, 2);
        assert_eq!(histogram.counts, vec![0, 0, 1, 0, 0]);
    }

    #[test]
    fn test_histogram_mode_ties_go_low() {
        let histogram = DelayHistogram::build(&[-1, 1], 1);
        assert_eq!(histogram.mode(), Some(-1));

        let empty = DelayHistogram::build(&[], 3);
        assert_eq!(empty.mode(), None);
    }
}
