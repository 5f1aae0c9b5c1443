use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use rtarchive::archive::archive_path;
use rtarchive::encode::{TmRecord, VmuRecord};

pub fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("valid RFC3339 test time")
        .with_timezone(&Utc)
}

/// Append `record` to the archive file bucketing `t`.
pub fn append(root: &Path, t: DateTime<Utc>, record: &[u8]) {
    let path = archive_path(root, t);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .unwrap();
    file.write_all(record).unwrap();
}

/// A synthetic archive of VMU records.
pub struct VmuArchive {
    pub dir: tempfile::TempDir,
}

impl VmuArchive {
    pub fn new() -> Self {
        VmuArchive {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn add(&self, record: VmuRecord) -> &Self {
        append(self.root(), record.time, &record.encode());
        self
    }

    pub fn add_packet(&self, channel: u8, sequence: u32, t: DateTime<Utc>) -> &Self {
        self.add(
            VmuRecord::builder()
                .channel(channel)
                .sequence(sequence)
                .time(t)
                .archived(t)
                .build(),
        )
    }
}

pub fn add_tm(root: &Path, apid: u16, sequence: u16, t: DateTime<Utc>) {
    let record = TmRecord::builder()
        .apid(apid)
        .sequence(sequence)
        .time(t)
        .build();
    append(root, t, &record.encode());
}
