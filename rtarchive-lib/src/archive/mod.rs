//! Time-bucketed archive layout.
//!
//! Records acquired at time `t` live in `<root>/<YYYY>/<DDD>/<HH>/rt_<MM>_<MM+4>.dat`, where
//! `DDD` is the day of the year and `MM` the start minute of the 5 minute bucket holding `t`.
mod walk;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, DurationRound, NaiveDate, TimeZone, Timelike, Utc};
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use crate::Result;

pub use walk::{Cancel, WalkPackets, Walker};

/// Archive file time granularity.
pub const BUCKET: Duration = Duration::minutes(5);

/// Truncate `t` to the start of its bucket.
#[must_use]
pub fn bucket(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(BUCKET).unwrap_or(t)
}

/// Canonical path of the file holding records acquired at `t`.
#[must_use]
pub fn archive_path<P: AsRef<Path>>(root: P, t: DateTime<Utc>) -> PathBuf {
    let t = bucket(t);
    root.as_ref()
        .join(format!("{:04}", t.year()))
        .join(format!("{:03}", t.ordinal()))
        .join(format!("{:02}", t.hour()))
        .join(format!("rt_{:02}_{:02}.dat", t.minute(), t.minute() + 4))
}

/// Bucket start time of an archive path relative to `root`.
///
/// Returns `None` for paths not following the archive layout.
#[must_use]
pub fn path_time<P: AsRef<Path>>(root: P, path: &Path) -> Option<DateTime<Utc>> {
    let parts = components(root.as_ref(), path)?;
    let [year, day, hour, name] = parts.as_slice() else {
        return None;
    };
    let hour = hour_start(year, day, hour)?;
    let minute = file_minute(name)?;
    Some(hour + Duration::minutes(i64::from(minute)))
}

fn components<'a>(root: &Path, path: &'a Path) -> Option<Vec<&'a str>> {
    path.strip_prefix(root)
        .ok()?
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect()
}

fn number<T: std::str::FromStr>(s: &str, width: usize) -> Option<T> {
    if s.len() != width || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn day_start(year: &str, day: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_yo_opt(number(year, 4)?, number(day, 3)?)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

fn hour_start(year: &str, day: &str, hour: &str) -> Option<DateTime<Utc>> {
    let hour: u32 = number(hour, 2)?;
    if hour > 23 {
        return None;
    }
    Some(day_start(year, day)? + Duration::hours(i64::from(hour)))
}

/// Start minute of a `rt_<MM>_<MM+4>.dat` file name.
fn file_minute(name: &str) -> Option<u32> {
    let stem = name.strip_prefix("rt_")?.strip_suffix(".dat")?;
    let (start, end) = stem.split_once('_')?;
    let start: u32 = number(start, 2)?;
    let end: u32 = number(end, 2)?;
    if start > 59 || start % 5 != 0 || end != start + 4 {
        return None;
    }
    Some(start)
}

/// True if `[from, from + span)` overlaps `[start, end)`.
fn overlaps(from: DateTime<Utc>, span: Duration, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    from < end && from + span > start
}

/// All archive files under `root` whose bucket starts in `[start, end)`, sorted.
///
/// Directories that cannot hold a matching file are not descended into and names that do
/// not follow the layout are skipped. Unreadable sub-trees are logged and skipped.
///
/// # Errors
/// [crate::Error::Io] if `root` itself cannot be read.
pub fn list_paths<P: AsRef<Path>>(
    root: P,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(4)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let Some(parts) = components(root, entry.path()) else {
                return false;
            };
            match (entry.depth(), parts.as_slice()) {
                (1, [year]) => number::<i32>(year, 4)
                    .is_some_and(|y| (start.year()..=end.year()).contains(&y)),
                (2, [year, day]) => day_start(year, day)
                    .is_some_and(|t| overlaps(t, Duration::days(1), start, end)),
                (3, [year, day, hour]) => hour_start(year, day, hour)
                    .is_some_and(|t| overlaps(t, Duration::hours(1), start, end)),
                (4, _) => entry.file_type().is_file(),
                _ => false,
            }
        });

    let mut paths = Vec::default();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => return Err(std::io::Error::from(err).into()),
            Err(err) => {
                warn!("skipping unreadable archive entry: {err}");
                continue;
            }
        };
        if entry.depth() != 4 {
            continue;
        }
        match path_time(root, entry.path()) {
            Some(t) if t >= start && t < end => paths.push(entry.into_path()),
            Some(_) => trace!(path = ?entry.path(), "outside range"),
            None => debug!(path = ?entry.path(), "not an archive file"),
        }
    }
    paths.sort();
    Ok(paths)
}
