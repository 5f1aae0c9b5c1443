use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Duration;
use rtarchive::aggregate::{self, Coze};
use rtarchive::config::QueryOpts;
use rtarchive::continuity::Gap;
use rtarchive::multireader::MultiReader;
use rtarchive::packet::{Decoder, Filter};
use rtarchive::{Family, Id, Packet, View};
use tracing::debug;

use crate::query::{output, Format};

/// Raw input files and how to read them.
pub struct Inputs<'a> {
    pub paths: &'a [PathBuf],
    pub family: Family,
    pub id: Option<Id>,
}

impl Inputs<'_> {
    /// Feed every decoded packet to `fold`. A decode error other than a truncated tail
    /// stops the fold and is returned.
    fn fold<T, F>(&self, view: View, include_invalid: bool, fold: F) -> Result<T>
    where
        F: FnOnce(&mut dyn Iterator<Item = Packet>) -> T,
    {
        debug!(inputs = ?self.paths, family = %self.family, "scanning");
        let mut decoder = Decoder::new(MultiReader::new(self.paths), self.family);
        if let Some(id) = self.id {
            decoder = decoder.with_filter(Filter::ById { id, view });
        }
        let mut failed = None;
        let result = fold(
            &mut decoder
                .packets(include_invalid)
                .map_while(|p| p.map_err(|err| failed = Some(err)).ok()),
        );
        match failed {
            Some(err) => Err(err).context("decoding inputs"),
            None => Ok(result),
        }
    }

    /// Per identifier statistics. Invalid packets are always counted; `include_invalid`
    /// only decides whether they take part in sequence tracking.
    pub fn count(&self, view: View, include_invalid: bool) -> Result<Vec<Coze>> {
        let opts = QueryOpts::builder()
            .view(view)
            .include_invalid(include_invalid)
            .build();
        self.fold(view, true, |packets| aggregate::stats(packets, &opts))
    }

    /// Gaps no longer than `max_gap`; zero is unbounded.
    pub fn diff(&self, view: View, include_invalid: bool, max_gap: Duration) -> Result<Vec<Gap>> {
        let opts = QueryOpts::builder()
            .view(view)
            .include_invalid(include_invalid)
            .max_gap(max_gap)
            .build();
        self.fold(view, include_invalid, |packets| aggregate::gaps(packets, &opts))
    }
}

pub fn count(inputs: &Inputs, view: View, include_invalid: bool, format: Format) -> Result<()> {
    output(&inputs.count(view, include_invalid)?, format)
}

pub fn diff(
    inputs: &Inputs,
    view: View,
    include_invalid: bool,
    max_gap: Duration,
    format: Format,
) -> Result<()> {
    output(&inputs.diff(view, include_invalid, max_gap)?, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rtarchive::continuity::GapKind;
    use rtarchive::encode::VmuRecord;
    use rtarchive::timecode::gps_epoch;

    fn record(channel: u8, sequence: u32, secs: i64) -> VmuRecord {
        VmuRecord::builder()
            .channel(channel)
            .sequence(sequence)
            .time(gps_epoch() + Duration::seconds(secs))
            .build()
    }

    /// Writes the records split over two files.
    fn files(dir: &tempfile::TempDir, records: &[VmuRecord]) -> Vec<PathBuf> {
        let (a, b) = records.split_at(records.len() / 2);
        [("a.dat", a), ("b.dat", b)]
            .into_iter()
            .map(|(name, records)| {
                let path = dir.path().join(name);
                let dat: Vec<u8> = records.iter().flat_map(VmuRecord::encode).collect();
                std::fs::write(&path, dat).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn count_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut bad = record(1, 3, 3);
        bad.corrupt = true;
        let paths = files(
            &dir,
            &[
                record(1, 1, 1),
                record(2, 50, 1),
                bad,
                record(1, 5, 5),
            ],
        );
        let inputs = Inputs {
            paths: &paths,
            family: Family::Vmu,
            id: None,
        };

        let cozes = inputs.count(View::Channel, false).unwrap();
        let summary: Vec<(Id, u64, u64, u64)> = cozes
            .iter()
            .map(|c| (c.id, c.count, c.missing, c.error))
            .collect();
        assert_eq!(summary, vec![(1, 3, 3, 1), (2, 1, 0, 0)]);

        // the invalid packet now takes part in sequence tracking
        let cozes = inputs.count(View::Channel, true).unwrap();
        assert_eq!((cozes[0].missing, cozes[0].error), (2, 1));
    }

    #[test]
    fn diff_honours_max_gap_and_id() {
        let dir = tempfile::tempdir().unwrap();
        let paths = files(
            &dir,
            &[
                record(1, 1, 0),
                record(2, 7, 0),
                record(1, 3, 1),
                record(2, 9, 1),
                // a restart long after the previous packet
                record(1, 0, 60),
                record(2, 10, 2),
            ],
        );
        let inputs = Inputs {
            paths: &paths,
            family: Family::Vmu,
            id: Some(1),
        };

        let gaps = inputs
            .diff(View::Channel, false, Duration::seconds(1))
            .unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!((gaps[0].id, gaps[0].before, gaps[0].after), (1, 1, 3));
        assert_eq!(gaps[0].kind, GapKind::Loss);

        let gaps = inputs.diff(View::Channel, false, Duration::zero()).unwrap();
        assert_eq!(gaps.len(), 2);
        assert_eq!(gaps[1].kind, GapKind::Reset);
    }
}
