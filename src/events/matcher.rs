// Event matcher
// Classifies each annotation as detected or missed under a tolerance window

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::events::types::{ConfusionCounts, MatchOutcome, SampleIndex, ToleranceWindow};

/// How detections may be shared between annotations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// A detection confirms every annotation whose window contains it.
    /// FP is derived as `|detections| - TP` and can therefore undercount
    /// (or go negative) when windows overlap. Matches the published results.
    #[default]
    Shared,

    /// Each detection confirms at most one annotation (maximum matching).
    /// FP equals the number of unmatched detections. Changes numeric outputs
    /// relative to `Shared` on records with overlapping windows.
    OneToOne,
}

impl MatchPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchPolicy::Shared => "shared",
            MatchPolicy::OneToOne => "one-to-one",
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown match policy '{0}', expected one of: shared, one-to-one")]
pub struct UnknownPolicy(pub String);

impl FromStr for MatchPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shared" => Ok(MatchPolicy::Shared),
            "one-to-one" | "one_to_one" => Ok(MatchPolicy::OneToOne),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

/// Matches detections against reference annotations.
///
/// The matcher is a pure function of its inputs: repeated calls with the same
/// detections, annotations and window give identical counts and delays.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventMatcher {
    policy: MatchPolicy,
}

impl EventMatcher {
    pub fn new(policy: MatchPolicy) -> Self {
        EventMatcher { policy }
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// Match one detection set against one annotation set.
    ///
    /// For every annotation `a` the inclusive window `[a - r, a + r]` is searched.
    /// When several detections fall inside it, the one closest to `a` is chosen
    /// and ties go to the lower sample index. Delays are reported in annotation
    /// order as `detection - a`.
    pub fn match_events(
        &self,
        detections: &[SampleIndex],
        annotations: &[SampleIndex],
        window: ToleranceWindow,
    ) -> MatchOutcome {
        match self.policy {
            MatchPolicy::Shared => match_shared(detections, annotations, window),
            MatchPolicy::OneToOne => match_one_to_one(detections, annotations, window),
        }
    }
}

/// Convenience wrapper using the default shared policy
pub fn match_events(
    detections: &[SampleIndex],
    annotations: &[SampleIndex],
    window: ToleranceWindow,
) -> MatchOutcome {
    EventMatcher::default().match_events(detections, annotations, window)
}

fn match_shared(
    detections: &[SampleIndex],
    annotations: &[SampleIndex],
    window: ToleranceWindow,
) -> MatchOutcome {
    // Membership only: duplicates collapse for lookup but still count toward |detections|
    let mut sorted = detections.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut true_positive = 0i64;
    let mut false_negative = 0i64;
    let mut delays = Vec::with_capacity(annotations.len());

    for &annotation in annotations {
        match nearest_in_window(&sorted, annotation, window) {
            Some(detection) => {
                true_positive += 1;
                delays.push(detection - annotation);
            }
            None => false_negative += 1,
        }
    }

    let false_positive = detections.len() as i64 - true_positive;

    MatchOutcome {
        counts: ConfusionCounts::new(true_positive, false_positive, false_negative),
        delays,
    }
}

/// Closest detection inside the window, lower index on ties
fn nearest_in_window(
    sorted: &[SampleIndex],
    annotation: SampleIndex,
    window: ToleranceWindow,
) -> Option<SampleIndex> {
    let (lo, hi) = window.bounds(annotation);
    let start = sorted.partition_point(|&d| d < lo);
    let end = sorted.partition_point(|&d| d <= hi);

    sorted[start..end]
        .iter()
        .copied()
        .min_by_key(|&d| ((d - annotation).abs(), d))
}

fn match_one_to_one(
    detections: &[SampleIndex],
    annotations: &[SampleIndex],
    window: ToleranceWindow,
) -> MatchOutcome {
    let mut sorted_detections = detections.to_vec();
    sorted_detections.sort_unstable();

    // Visit annotations in time order, remembering where each one came from
    let mut order: Vec<usize> = (0..annotations.len()).collect();
    order.sort_by_key(|&i| (annotations[i], i));

    // All windows share one radius, so taking the earliest still-unused detection
    // for each annotation in ascending order yields a maximum matching.
    let mut matched: Vec<Option<SampleIndex>> = vec![None; annotations.len()];
    let mut next = 0usize;
    for &i in &order {
        let (lo, hi) = window.bounds(annotations[i]);
        while next < sorted_detections.len() && sorted_detections[next] < lo {
            next += 1;
        }
        if next < sorted_detections.len() && sorted_detections[next] <= hi {
            matched[i] = Some(sorted_detections[next]);
            next += 1;
        }
    }

    let mut true_positive = 0i64;
    let mut false_negative = 0i64;
    let mut delays = Vec::with_capacity(annotations.len());
    for (annotation, detection) in annotations.iter().zip(matched) {
        match detection {
            Some(detection) => {
                true_positive += 1;
                delays.push(detection - annotation);
            }
            None => false_negative += 1,
        }
    }

    MatchOutcome {
        counts: ConfusionCounts::new(
            true_positive,
            detections.len() as i64 - true_positive,
            false_negative,
        ),
        delays,
    }
}
