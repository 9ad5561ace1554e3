//! Gap detection against the cached range.
//!
//! Coverage is treated as one contiguous span between the oldest and newest
//! cached message. A requested window therefore splits into at most three
//! parts: a gap before the span, the covered part, and a gap after it.
//! Boundaries are offset by one millisecond so a gap never overlaps the
//! messages that define the span.

use crate::cache::core::window::{TimeWindow, one_milli};

/// A requested window split against the cached span.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CoverageSplit {
    /// Missing part older than the cached span.
    pub before: Option<TimeWindow>,
    /// Part already cached.
    pub covered: Option<TimeWindow>,
    /// Missing part newer than the cached span.
    pub after: Option<TimeWindow>,
}

impl CoverageSplit {
    /// Split `window` against `coverage` (`None` when nothing is cached).
    #[must_use]
    pub fn compute(window: TimeWindow, coverage: Option<TimeWindow>) -> Self {
        let Some(covered) = coverage else {
            return Self {
                before: Some(window),
                ..Self::default()
            };
        };
        let (s, e) = (window.start, window.end);
        let (lo, hi) = (covered.start, covered.end);

        let before = if s < lo {
            lo.checked_sub_signed(one_milli())
                .map(|edge| TimeWindow { start: s, end: edge.min(e) })
        } else {
            None
        };

        let after = if e > hi {
            hi.checked_add_signed(one_milli())
                .map(|edge| TimeWindow { start: edge.max(s), end: e })
        } else {
            None
        };

        let (from, to) = (s.max(lo), e.min(hi));
        let covered = (from <= to).then_some(TimeWindow { start: from, end: to });

        Self {
            before,
            covered,
            after,
        }
    }

    /// Missing parts in ascending order.
    #[must_use]
    pub fn gaps(&self) -> Vec<TimeWindow> {
        self.before.into_iter().chain(self.after).collect()
    }
}

/// Sub-windows of `window` not covered by `coverage`, ascending and disjoint.
#[must_use]
pub fn find_gaps(window: TimeWindow, coverage: Option<TimeWindow>) -> Vec<TimeWindow> {
    CoverageSplit::compute(window, coverage).gaps()
}

/// The part of `window` that is already cached, if any.
#[must_use]
pub fn covered_part(window: TimeWindow, coverage: Option<TimeWindow>) -> Option<TimeWindow> {
    CoverageSplit::compute(window, coverage).covered
}
