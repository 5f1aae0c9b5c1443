use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{bounded, Receiver};
use tracing::{debug, error, trace};

use crate::packet::{Decoder, Filter, Packets};
use crate::{Family, Packet, Result};

/// Cooperative cancellation shared between a query and its walkers.
#[derive(Debug, Clone, Default)]
pub struct Cancel(Arc<AtomicBool>);

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Decodes the packets of a list of archive files, one file after the other.
///
/// A file that ends in a partial record only loses that record. A file that cannot be
/// opened or read ends the walk.
#[derive(Debug, Clone)]
pub struct Walker {
    paths: Vec<PathBuf>,
    family: Family,
    filter: Option<Filter>,
    include_invalid: bool,
    cancel: Cancel,
}

impl Walker {
    pub fn new(paths: Vec<PathBuf>, family: Family) -> Self {
        Walker {
            paths,
            family,
            filter: None,
            include_invalid: false,
            cancel: Cancel::default(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn include_invalid(mut self, include: bool) -> Self {
        self.include_invalid = include;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: Cancel) -> Self {
        self.cancel = cancel;
        self
    }

    /// Decode synchronously on the calling thread.
    pub fn packets(self) -> WalkPackets {
        WalkPackets {
            paths: self.paths.into_iter(),
            family: self.family,
            filter: self.filter,
            include_invalid: self.include_invalid,
            cancel: self.cancel,
            current: None,
            done: false,
        }
    }

    /// Decode on a background thread feeding a channel holding at most `capacity` packets.
    ///
    /// The channel closes when the walk ends. Dropping the receiver stops the walk.
    ///
    /// # Errors
    /// [crate::Error::Io] if the thread cannot be spawned.
    pub fn spawn(self, capacity: usize) -> Result<Receiver<Packet>> {
        let (tx, rx) = bounded(capacity);
        thread::Builder::new()
            .name("archive_walker".into())
            .spawn(move || {
                for packet in self.packets() {
                    if tx.send(packet).is_err() {
                        debug!("receiver dropped; stopping walk");
                        break;
                    }
                }
            })?;
        Ok(rx)
    }
}

/// Iterator returned by [Walker::packets].
pub struct WalkPackets {
    paths: std::vec::IntoIter<PathBuf>,
    family: Family,
    filter: Option<Filter>,
    include_invalid: bool,
    cancel: Cancel,
    current: Option<(PathBuf, Packets<BufReader<File>>)>,
    done: bool,
}

impl WalkPackets {
    fn open(&self, path: &PathBuf) -> Result<Packets<BufReader<File>>> {
        let mut decoder = Decoder::new(BufReader::new(File::open(path)?), self.family);
        if let Some(filter) = self.filter {
            decoder = decoder.with_filter(filter);
        }
        Ok(decoder.packets(self.include_invalid))
    }
}

impl Iterator for WalkPackets {
    type Item = Packet;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if self.cancel.is_cancelled() {
                debug!("walk cancelled");
                self.done = true;
                break;
            }
            match self.current.as_mut() {
                Some((path, packets)) => match packets.next() {
                    Some(Ok(packet)) => return Some(packet),
                    Some(Err(err)) => {
                        error!(?path, "read failed, ending walk: {err}");
                        self.done = true;
                    }
                    None => {
                        trace!(
                            ?path,
                            invalid = packets.invalid(),
                            skipped = packets.skipped(),
                            "done"
                        );
                        self.current = None;
                    }
                },
                None => {
                    let Some(path) = self.paths.next() else {
                        self.done = true;
                        break;
                    };
                    match self.open(&path) {
                        Ok(packets) => self.current = Some((path, packets)),
                        Err(err) => {
                            error!(?path, "open failed, ending walk: {err}");
                            self.done = true;
                        }
                    }
                }
            }
        }
        None
    }
}
