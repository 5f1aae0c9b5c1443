//! Single pass folds over a packet stream.
//!
//! Packets of one identifier must arrive in time order; identifiers may interleave.
use std::collections::{BTreeMap, HashMap};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::config::QueryOpts;
use crate::continuity::{detect, Gap};
use crate::packet::{Id, Info, Packet, View};

/// Statistics for one identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coze {
    pub id: Id,
    /// Total declared packet bytes.
    pub size: u64,
    pub count: u64,
    /// Packets lost to forward sequence jumps.
    pub missing: u64,
    /// Packets failing their checksum or flagged by the ground segment.
    pub error: u64,
}

/// Folds packets into one [Coze] per identifier.
#[derive(Debug)]
pub struct Stats {
    view: View,
    max_gap: Option<Duration>,
    include_invalid: bool,
    cozes: BTreeMap<Id, Coze>,
    last: HashMap<Id, Info>,
}

impl Stats {
    pub fn new(opts: &QueryOpts) -> Self {
        Stats {
            view: opts.view,
            max_gap: opts.gap_limit(),
            include_invalid: opts.include_invalid,
            cozes: BTreeMap::default(),
            last: HashMap::default(),
        }
    }

    /// Count `packet`. Invalid packets are always counted but only take part in sequence
    /// tracking when invalid packets are included.
    pub fn push(&mut self, packet: &Packet) {
        let info = packet.info(self.view);
        let coze = self.cozes.entry(info.id).or_insert_with(|| Coze {
            id: info.id,
            ..Coze::default()
        });
        coze.count += 1;
        coze.size += info.size as u64;
        if !packet.is_valid() || packet.error_flags() != 0 {
            coze.error += 1;
        }
        if !packet.is_valid() && !self.include_invalid {
            return;
        }
        if let Some(gap) = self
            .last
            .get(&info.id)
            .and_then(|prev| detect(prev, &info, self.max_gap))
        {
            coze.missing += gap.lost();
        }
        self.last.insert(info.id, info);
    }

    /// Statistics sorted by identifier.
    #[must_use]
    pub fn finish(self) -> Vec<Coze> {
        self.cozes.into_values().collect()
    }
}

/// Reports every gap as packets stream by.
#[derive(Debug)]
pub struct Gaps {
    view: View,
    max_gap: Option<Duration>,
    last: HashMap<Id, Info>,
}

impl Gaps {
    pub fn new(opts: &QueryOpts) -> Self {
        Gaps {
            view: opts.view,
            max_gap: opts.gap_limit(),
            last: HashMap::default(),
        }
    }

    pub fn push(&mut self, packet: &Packet) -> Option<Gap> {
        let info = packet.info(self.view);
        let gap = self
            .last
            .get(&info.id)
            .and_then(|prev| detect(prev, &info, self.max_gap));
        self.last.insert(info.id, info);
        gap
    }
}

/// Fold `packets` into per-identifier statistics.
pub fn stats<I>(packets: I, opts: &QueryOpts) -> Vec<Coze>
where
    I: IntoIterator<Item = Packet>,
{
    let mut stats = Stats::new(opts);
    for packet in packets {
        stats.push(&packet);
    }
    stats.finish()
}

/// Every gap in `packets`, in arrival order.
pub fn gaps<I>(packets: I, opts: &QueryOpts) -> Vec<Gap>
where
    I: IntoIterator<Item = Packet>,
{
    let mut gaps = Gaps::new(opts);
    packets
        .into_iter()
        .filter_map(|packet| gaps.push(&packet))
        .collect()
}
