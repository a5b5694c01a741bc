// Beat annotations
// Filters reference annotations down to the symbols that mark a heartbeat

use crate::events::SampleIndex;

/// Annotation symbols that denote a beat
pub const BEAT_SYMBOLS: [&str; 19] = [
    "N", "L", "R", "B", "A", "a", "J", "S", "V", "r", "F", "e", "j", "n", "E", "/", "f", "Q", "?",
];

pub fn is_beat_symbol(symbol: &str) -> bool {
    BEAT_SYMBOLS.contains(&symbol)
}

/// Sample positions of the beat annotations among `(sample, symbol)` pairs,
/// in input order. Rhythm changes, noise markers and other non-beat
/// annotations are dropped.
pub fn beat_annotations<'a, I>(annotations: I) -> Vec<SampleIndex>
where
    I: IntoIterator<Item = (SampleIndex, &'a str)>,
{
    annotations
        .into_iter()
        .filter(|(_, symbol)| is_beat_symbol(symbol))
        .map(|(sample, _)| sample)
        .collect()
}
