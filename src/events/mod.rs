// Event matching module
// Tolerance windows, confusion counts and the annotation/detection matcher

pub mod matcher;
pub mod types;

pub use matcher::{match_events, EventMatcher, MatchPolicy, UnknownPolicy};
pub use types::{ConfusionCounts, MatchOutcome, SampleIndex, ToleranceWindow};
