//! Segment plan for one stream request.

use crate::cache::core::window::{Direction, TimeWindow};
use crate::cache::ingest::gaps::CoverageSplit;

/// Where a segment's messages come from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SegmentSource {
    /// Served from the range store.
    Cached,
    /// Fetched from the remote, committed, then read back.
    Pending,
}

/// One disjoint piece of the requested window.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimelineSegment {
    /// Inclusive bounds.
    pub window: TimeWindow,
    /// Data source.
    pub source: SegmentSource,
}

/// Split `window` into cached and pending segments, ordered by `direction`.
///
/// The segments are disjoint and their union is exactly `window`. With
/// `force_refresh` the whole window is one pending segment.
#[must_use]
pub fn plan(
    window: TimeWindow,
    coverage: Option<TimeWindow>,
    direction: Direction,
    force_refresh: bool,
) -> Vec<TimelineSegment> {
    let mut segments = if force_refresh {
        vec![TimelineSegment {
            window,
            source: SegmentSource::Pending,
        }]
    } else {
        let split = CoverageSplit::compute(window, coverage);
        let pending = |window| TimelineSegment {
            window,
            source: SegmentSource::Pending,
        };
        split
            .before
            .map(pending)
            .into_iter()
            .chain(split.covered.map(|window| TimelineSegment {
                window,
                source: SegmentSource::Cached,
            }))
            .chain(split.after.map(pending))
            .collect()
    };

    segments.sort_by_key(|segment| segment.window.start);
    if direction == Direction::Descending {
        segments.reverse();
    }
    segments
}
