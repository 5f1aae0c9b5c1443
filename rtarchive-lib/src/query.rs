//! Archive queries and result rendering.
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use crossbeam::channel::bounded;
use serde::Serialize;
use threadpool::ThreadPool;
use tracing::{debug, info, warn};

use crate::aggregate::{self, Coze};
use crate::archive::{bucket, list_paths, path_time, Cancel, Walker, BUCKET};
use crate::config::{Config, QueryOpts};
use crate::continuity::Gap;
use crate::dedup::NoDuplicate;
use crate::packet::{Filter, Id, Info};
use crate::{Error, Family, Result};

/// Validated, bucket aligned query interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Longest interval allowed for statistics and gap queries.
    pub const MAX_BOUNDED: Duration = Duration::hours(24);

    /// Span of a single listing worker.
    pub const WINDOW: Duration = Duration::hours(4);

    /// Snap `start` down and `end` up to bucket boundaries.
    ///
    /// # Errors
    /// [Error::InvalidRequest] if `end` is before `start`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if end < start {
            return Err(Error::InvalidRequest("invalid interval".to_string()));
        }
        Ok(TimeRange {
            start: bucket(start),
            end: bucket(end + BUCKET),
        })
    }

    /// Build a range from optional RFC3339 query parameters.
    ///
    /// Without any bound the range is the 24 hours ending at `now`. Empty strings count as
    /// absent.
    ///
    /// # Errors
    /// [Error::InvalidRequest] if a bound is malformed, only one bound is given, `dtend`
    /// is before `dtstart` or the span exceeds `max_span`.
    pub fn from_query(
        dtstart: Option<&str>,
        dtend: Option<&str>,
        max_span: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let start = parse_bound("dtstart", dtstart)?;
        let end = parse_bound("dtend", dtend)?;
        let (start, end) = match (start, end) {
            (None, None) => (now - Duration::hours(24), now),
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(Error::InvalidRequest(
                    "both dtstart and dtend should be provided".to_string(),
                ))
            }
        };
        if max_span.is_some_and(|max| end - start > max) {
            return Err(Error::InvalidRequest("invalid interval".to_string()));
        }
        Self::new(start, end)
    }

    #[must_use]
    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    /// Split into consecutive sub-ranges of at most `size`.
    #[must_use]
    pub fn windows(&self, size: Duration) -> Vec<TimeRange> {
        let mut windows = Vec::default();
        let mut from = self.start;
        while from < self.end {
            let to = (from + size).min(self.end);
            windows.push(TimeRange {
                start: from,
                end: to,
            });
            from = to;
        }
        windows
    }

    #[must_use]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

fn parse_bound(name: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    match value.filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => DateTime::parse_from_rfc3339(v)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| Error::InvalidRequest(format!("bad format {name} query parameter"))),
    }
}

/// Capacity of the channels between archive walkers and query consumers.
pub const CHANNEL_CAPACITY: usize = 1000;

/// Queries over a single archive tree.
#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
    family: Family,
    opts: QueryOpts,
    cancel: Cancel,
}

impl Archive {
    pub fn new<P: Into<PathBuf>>(root: P, family: Family, opts: QueryOpts) -> Self {
        Archive {
            root: root.into(),
            family,
            opts,
            cancel: Cancel::default(),
        }
    }

    /// # Errors
    /// [Error::UnknownFamily] or [Error::Config] for invalid config values.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.datadir.clone(),
            config.family()?,
            config.query_opts()?,
        ))
    }

    /// Share `cancel` with every walker started by this archive.
    #[must_use]
    pub fn with_cancel(mut self, cancel: Cancel) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn family(&self) -> Family {
        self.family
    }

    fn filter(&self, id: Option<Id>) -> Option<Filter> {
        id.map(|id| Filter::ById {
            id,
            view: self.opts.view,
        })
    }

    /// Walker over every archive file in `range`.
    ///
    /// # Errors
    /// [Error::Io] if the archive root cannot be read.
    pub fn walker(&self, range: &TimeRange, id: Option<Id>) -> Result<Walker> {
        let paths = list_paths(&self.root, range.start, range.end)?;
        debug!(
            files = paths.len(),
            start = %range.start,
            end = %range.end,
            "walking archive"
        );
        Ok(Walker::new(paths, self.family)
            .with_filter(self.filter(id))
            .include_invalid(self.opts.include_invalid)
            .with_cancel(self.cancel.clone()))
    }

    /// Per-identifier statistics, sorted by identifier.
    ///
    /// # Errors
    /// [Error::Io] if the archive root cannot be read or a walker cannot be started.
    pub fn stats(&self, range: &TimeRange, id: Option<Id>) -> Result<Vec<Coze>> {
        let packets = self
            .walker(range, id)?
            .include_invalid(true)
            .spawn(CHANNEL_CAPACITY)?;
        let cozes = aggregate::stats(packets, &self.opts);
        info!(ids = cozes.len(), "stats done");
        Ok(cozes)
    }

    /// Every gap in `range`, in arrival order.
    ///
    /// # Errors
    /// Same as [Archive::stats].
    pub fn gaps(&self, range: &TimeRange, id: Option<Id>) -> Result<Vec<Gap>> {
        let packets = self.walker(range, id)?.spawn(CHANNEL_CAPACITY)?;
        let gaps = aggregate::gaps(packets, &self.opts);
        info!(gaps = gaps.len(), "gaps done");
        Ok(gaps)
    }

    /// One [Info] per packet.
    ///
    /// The range is split into [TimeRange::WINDOW] sized windows decoded concurrently;
    /// records are in time order within a window but windows interleave.
    ///
    /// # Errors
    /// Same as [Archive::stats].
    pub fn list(&self, range: &TimeRange, id: Option<Id>) -> Result<Vec<Info>> {
        let paths = list_paths(&self.root, range.start, range.end)?;
        let pool = ThreadPool::with_name("list_worker".into(), self.opts.workers.max(1));
        let (tx, rx) = bounded(CHANNEL_CAPACITY);

        for window in range.windows(TimeRange::WINDOW) {
            let paths: Vec<PathBuf> = paths
                .iter()
                .filter(|p| path_time(&self.root, p).is_some_and(|t| window.contains(t)))
                .cloned()
                .collect();
            if paths.is_empty() {
                continue;
            }
            let walker = Walker::new(paths, self.family)
                .with_filter(self.filter(id))
                .include_invalid(self.opts.include_invalid)
                .with_cancel(self.cancel.clone());
            let cancel = self.cancel.clone();
            let view = self.opts.view;
            let tx = tx.clone();
            pool.execute(move || {
                for packet in walker.packets() {
                    if cancel.is_cancelled() || tx.send(packet.info(view)).is_err() {
                        debug!(start = %window.start, "listing window stopped");
                        break;
                    }
                }
            });
        }

        thread::Builder::new()
            .name("list_supervisor".into())
            .spawn(move || {
                pool.join();
                drop(tx);
            })?;

        let infos: Vec<Info> = rx.iter().collect();
        info!(packets = infos.len(), "listing done");
        Ok(infos)
    }

    /// Write the payload of every packet in `range` to `writer`, dropping adjacent
    /// duplicates. Returns the number of payload bytes written.
    ///
    /// # Errors
    /// Same as [Archive::stats], plus [Error::Io] if `writer` fails.
    pub fn download<W: Write>(&self, range: &TimeRange, id: Option<Id>, writer: W) -> Result<u64> {
        let packets = self.walker(range, id)?.spawn(CHANNEL_CAPACITY)?;
        let mut writer = NoDuplicate::new(writer);
        let mut written = 0u64;
        for packet in packets {
            let payload = packet.payload();
            let dropped = writer.dropped();
            writer.write_all(payload)?;
            if writer.dropped() == dropped {
                written += payload.len() as u64;
            }
        }
        writer.flush()?;
        if writer.dropped() > 0 {
            warn!(dropped = writer.dropped(), "dropped duplicate packets");
        }
        Ok(written)
    }
}

/// Output encoding of a result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Json,
    Csv,
}

impl std::str::FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" | "application/json" => Ok(Format::Json),
            "csv" | "text/csv" => Ok(Format::Csv),
            other => Err(Error::InvalidRequest(format!("unsupported format {other}"))),
        }
    }
}

/// A result record with a fixed CSV column order.
pub trait Record: Serialize {
    const HEADER: &'static [&'static str];

    /// Write this record as one CSV row.
    ///
    /// # Errors
    /// [Error::Io] if writing fails.
    fn write_row<W: Write>(&self, w: &mut W) -> Result<()>;
}

fn rfc3339(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

impl Record for Coze {
    const HEADER: &'static [&'static str] = &["id", "size", "count", "missing", "error"];

    fn write_row<W: Write>(&self, w: &mut W) -> Result<()> {
        writeln!(
            w,
            "{},{},{},{},{}",
            self.id, self.size, self.count, self.missing, self.error
        )?;
        Ok(())
    }
}

impl Record for Gap {
    const HEADER: &'static [&'static str] = &[
        "id",
        "starts",
        "ends",
        "duration_seconds",
        "before",
        "after",
        "missing",
    ];

    fn write_row<W: Write>(&self, w: &mut W) -> Result<()> {
        let secs = self.duration().num_nanoseconds().map_or(f64::NAN, |n| n as f64 / 1e9);
        writeln!(
            w,
            "{},{},{},{},{},{},{}",
            self.id,
            rfc3339(&self.starts),
            rfc3339(&self.ends),
            secs,
            self.before,
            self.after,
            self.missing
        )?;
        Ok(())
    }
}

impl Record for Info {
    const HEADER: &'static [&'static str] = &["id", "time", "sequence", "size", "sum"];

    fn write_row<W: Write>(&self, w: &mut W) -> Result<()> {
        writeln!(
            w,
            "{},{},{},{},{}",
            self.id,
            rfc3339(&self.time),
            self.sequence,
            self.size,
            self.sum
        )?;
        Ok(())
    }
}

/// Render `records` in `format`. An empty set renders nothing; see [crate::Status::for_len].
///
/// # Errors
/// [Error::Io] if writing fails.
pub fn render<R: Record, W: Write>(records: &[R], format: Format, mut w: W) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    match format {
        Format::Json => {
            serde_json::to_writer(&mut w, records).map_err(std::io::Error::from)?;
            writeln!(w)?;
        }
        Format::Csv => {
            writeln!(w, "{}", R::HEADER.join(","))?;
            for record in records {
                record.write_row(&mut w)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuity::GapKind;
    use crate::Status;
    use test_case::test_case;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn range_defaults_to_last_day() {
        let now = utc("2024-03-01T12:02:00Z");
        let range = TimeRange::from_query(None, Some(""), Some(TimeRange::MAX_BOUNDED), now).unwrap();
        assert_eq!(range.start, utc("2024-02-29T12:00:00Z"));
        assert_eq!(range.end, utc("2024-03-01T12:05:00Z"));
    }

    #[test]
    fn range_snaps_outward() {
        let range = TimeRange::from_query(
            Some("2024-03-01T10:07:00Z"),
            Some("2024-03-01T11:00:00Z"),
            None,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(range.start, utc("2024-03-01T10:05:00Z"));
        assert_eq!(range.end, utc("2024-03-01T11:05:00Z"));
    }

    #[test_case(Some("2024-03-01T00:00:00Z"), None, None; "start only")]
    #[test_case(None, Some("2024-03-01T00:00:00Z"), None; "end only")]
    #[test_case(Some("2024-03-02T00:00:00Z"), Some("2024-03-01T00:00:00Z"), None; "end before start")]
    #[test_case(Some("yesterday"), Some("2024-03-01T00:00:00Z"), None; "malformed start")]
    #[test_case(Some("2024-03-01T00:00:00Z"), Some("2024-03-03T00:00:00Z"), Some(TimeRange::MAX_BOUNDED); "over cap")]
    fn rejected_ranges(start: Option<&str>, end: Option<&str>, cap: Option<Duration>) {
        let err = TimeRange::from_query(start, end, cap, Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)), "{err}");
        assert_eq!(err.status(), Status::BadRequest);
    }

    #[test]
    fn uncapped_range_allows_long_spans() {
        let range = TimeRange::from_query(
            Some("2024-03-01T00:00:00Z"),
            Some("2024-03-11T00:00:00Z"),
            None,
            Utc::now(),
        )
        .unwrap();
        assert!(range.span() > TimeRange::MAX_BOUNDED);
    }

    #[test]
    fn windows_cover_range() {
        let range = TimeRange::new(utc("2024-03-01T00:00:00Z"), utc("2024-03-01T09:00:00Z")).unwrap();
        let windows = range.windows(TimeRange::WINDOW);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].start, range.start);
        assert_eq!(windows[1].start, windows[0].end);
        assert_eq!(windows[2].end, range.end);
        assert_eq!(windows[2].span(), Duration::minutes(65));
    }

    #[test]
    fn csv_rows() {
        let gap = Gap {
            id: 7,
            before: 11,
            after: 13,
            starts: utc("2024-03-01T00:00:01Z"),
            ends: utc("2024-03-01T00:00:02.5Z"),
            missing: 1,
            kind: GapKind::Loss,
        };
        let mut buf = Vec::new();
        render(&[gap], Format::Csv, &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "id,starts,ends,duration_seconds,before,after,missing\n\
             7,2024-03-01T00:00:01Z,2024-03-01T00:00:02.500Z,1.5,11,13,1\n"
        );

        let coze = Coze {
            id: 3,
            size: 100,
            count: 2,
            missing: 0,
            error: 1,
        };
        let mut buf = Vec::new();
        render(&[coze], Format::Csv, &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "id,size,count,missing,error\n3,100,2,0,1\n"
        );
    }

    #[test]
    fn json_array() {
        let info = Info {
            id: 1,
            time: utc("2024-03-01T00:00:00Z"),
            sequence: 5,
            size: 10,
            sum: 99,
        };
        let mut buf = Vec::new();
        render(&[info.clone()], Format::Json, &mut buf).unwrap();
        let back: Vec<Info> = serde_json::from_slice(&buf).unwrap();
        assert_eq!(back, vec![info]);
    }

    #[test]
    fn empty_renders_nothing() {
        let mut buf = Vec::new();
        render::<Coze, _>(&[], Format::Json, &mut buf).unwrap();
        assert!(buf.is_empty());
    }

    #[test_case("json", Format::Json)]
    #[test_case("text/csv", Format::Csv)]
    fn formats(name: &str, format: Format) {
        assert_eq!(name.parse::<Format>().unwrap(), format);
    }
}
