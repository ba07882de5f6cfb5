//! The single overlap primitive and its collection form. Every write path
//! that must not produce overlapping windows goes through `has_conflict`.

use crate::time::TimeWindow;

/// Half-open interval test: the candidate starts inside the existing window,
/// ends inside it, or swallows it whole. Touching endpoints do not overlap.
pub fn overlaps<T: PartialOrd>(
    existing_start: T,
    existing_end: T,
    candidate_start: T,
    candidate_end: T,
) -> bool {
    (candidate_start >= existing_start && candidate_start < existing_end)
        || (candidate_end > existing_start && candidate_end <= existing_end)
        || (candidate_start <= existing_start && candidate_end >= existing_end)
}

pub fn has_conflict<'a, I>(candidate: &TimeWindow, existing: I) -> bool
where
    I: IntoIterator<Item = &'a TimeWindow>,
{
    existing
        .into_iter()
        .any(|w| overlaps(w.start, w.end, candidate.start, candidate.end))
}
