//! Sequence continuity between consecutive packets of the same stream.
//!
//! The tracking state, the last packet seen per identifier, is owned by the caller.
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::packet::{Id, Info, Packet, View};

/// What a sequence discontinuity most likely means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapKind {
    /// The counter jumped forward; packets were lost.
    Loss,
    /// The counter went backwards or repeated; the stream was restarted.
    Reset,
}

/// A discontinuity in a stream's sequence counter.
///
/// `before` and `starts` come from the earlier packet, `after` and `ends` from the later one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub id: Id,
    /// Last sequence seen before the gap.
    pub before: i64,
    /// First sequence seen after the gap.
    pub after: i64,
    pub starts: DateTime<Utc>,
    pub ends: DateTime<Utc>,
    /// `|after - before| - 1`, never negative.
    pub missing: u64,
    pub kind: GapKind,
}

impl Gap {
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.ends - self.starts
    }

    /// Packets lost to this gap; resets never count.
    #[must_use]
    pub fn lost(&self) -> u64 {
        match self.kind {
            GapKind::Loss => self.missing,
            GapKind::Reset => 0,
        }
    }
}

/// Compare two consecutive descriptors of the same stream.
///
/// A gap is reported when the sequence does not advance by exactly one, unless `max` is a
/// non-zero duration and more than `max` elapsed between the two, in which case the
/// discontinuity is taken to be an intentional restart.
#[must_use]
pub fn detect(prev: &Info, curr: &Info, max: Option<Duration>) -> Option<Gap> {
    let diff = curr.sequence - prev.sequence;
    if diff == 1 {
        return None;
    }
    if let Some(max) = max.filter(|m| !m.is_zero()) {
        if curr.time - prev.time > max {
            return None;
        }
    }
    Some(Gap {
        id: curr.id,
        before: prev.sequence,
        after: curr.sequence,
        starts: prev.time,
        ends: curr.time,
        missing: diff.unsigned_abs().saturating_sub(1),
        kind: if diff > 1 {
            GapKind::Loss
        } else {
            GapKind::Reset
        },
    })
}

/// [detect] for two packets, using the identifier, sequence and time of `view`.
#[must_use]
pub fn detect_gap(prev: &Packet, curr: &Packet, view: View, max: Option<Duration>) -> Option<Gap> {
    detect(&prev.info(view), &curr.info(view), max)
}
