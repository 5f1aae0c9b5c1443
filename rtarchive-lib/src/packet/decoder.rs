use std::io::{ErrorKind, Read};

use tracing::{debug, error, trace};

use super::{Family, Id, Packet, View, SIZE_LEN};
use crate::{Error, Result};

/// Result of decoding a single record.
#[derive(Debug, Clone)]
pub enum Decoded {
    /// A packet whose checksum matched.
    Valid(Packet),
    /// A complete record whose checksum did not match or whose declared packet size does
    /// not fit the record.
    Invalid(Packet),
    /// A complete record too small to hold its own headers. The stream continues after it.
    Malformed,
    /// A filter rejected the record; the caller should read again.
    Skip,
    /// No more bytes.
    End,
}

impl Decoded {
    #[must_use]
    pub fn packet(&self) -> Option<&Packet> {
        match self {
            Decoded::Valid(p) | Decoded::Invalid(p) => Some(p),
            _ => None,
        }
    }
}

/// Transforms applied to every [Decoded] record, in the order they were added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Only pass packets whose identifier in `view` is `id`.
    ById { id: Id, view: View },
}

impl Filter {
    #[must_use]
    pub fn apply(&self, decoded: Decoded) -> Decoded {
        match self {
            Filter::ById { id, view } => match decoded.packet() {
                Some(p) if p.id(*view) != *id => Decoded::Skip,
                _ => decoded,
            },
        }
    }
}

/// Reads archive records from a continuous byte source.
///
/// Every record starts with a 4 byte little-endian size counting the bytes that follow it.
pub struct Decoder<R>
where
    R: Read,
{
    reader: R,
    family: Family,
    filters: Vec<Filter>,
    offset: usize,
}

impl<R> Decoder<R>
where
    R: Read,
{
    pub fn new(reader: R, family: Family) -> Self {
        Decoder {
            reader,
            family,
            filters: Vec::default(),
            offset: 0,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Number of bytes consumed from the reader.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Decode the next record.
    ///
    /// # Errors
    /// [Error::ShortBuffer] if the source ends before a full record could be read;
    /// [Error::Io] for read failures.
    pub fn decode(&mut self) -> Result<Decoded> {
        let mut size = [0u8; SIZE_LEN];
        let n = read_full(&mut self.reader, &mut size)?;
        if n == 0 {
            return Ok(Decoded::End);
        }
        self.offset += n;
        if n < SIZE_LEN {
            return Err(Error::ShortBuffer {
                wanted: SIZE_LEN,
                actual: n,
            });
        }

        let want = u32::from_le_bytes(size) as usize;
        let mut record = Vec::with_capacity(SIZE_LEN + want.min(1 << 20));
        record.extend_from_slice(&size);
        let got = (&mut self.reader)
            .take(want as u64)
            .read_to_end(&mut record)?;
        self.offset += got;
        if got < want {
            return Err(Error::ShortBuffer {
                wanted: want,
                actual: got,
            });
        }

        let packet = match self.family.decode(record) {
            Ok(packet) => packet,
            Err(err) if err.is_short() => {
                debug!(offset = self.offset, "malformed record: {err}");
                return Ok(Decoded::Malformed);
            }
            Err(err) => return Err(err),
        };
        let mut decoded = if packet.is_valid() {
            Decoded::Valid(packet)
        } else {
            trace!(offset = self.offset, sum = packet.sum(), "invalid packet");
            Decoded::Invalid(packet)
        };
        for filter in &self.filters {
            decoded = filter.apply(decoded);
        }
        Ok(decoded)
    }

    /// Iterator over the decoded packets.
    ///
    /// Skipped records are retried and invalid packets are dropped unless `include_invalid`.
    /// Malformed records count as invalid and are always dropped. A short read ends the
    /// iteration.
    pub fn packets(self, include_invalid: bool) -> Packets<R> {
        Packets {
            decoder: self,
            include_invalid,
            invalid: 0,
            skipped: 0,
            done: false,
        }
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut n = 0;
    while n < buf.len() {
        match reader.read(&mut buf[n..]) {
            Ok(0) => break,
            Ok(x) => n += x,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
    Ok(n)
}

/// See [Decoder::packets].
pub struct Packets<R>
where
    R: Read,
{
    decoder: Decoder<R>,
    include_invalid: bool,
    invalid: usize,
    skipped: usize,
    done: bool,
}

impl<R> Packets<R>
where
    R: Read,
{
    /// Number of invalid packets seen so far, kept or not.
    pub fn invalid(&self) -> usize {
        self.invalid
    }

    /// Number of records rejected by filters so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<R> Iterator for Packets<R>
where
    R: Read,
{
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.decoder.decode() {
                Ok(Decoded::Valid(p)) => return Some(Ok(p)),
                Ok(Decoded::Invalid(p)) => {
                    self.invalid += 1;
                    if self.include_invalid {
                        return Some(Ok(p));
                    }
                }
                Ok(Decoded::Malformed) => self.invalid += 1,
                Ok(Decoded::Skip) => self.skipped += 1,
                Ok(Decoded::End) => break,
                Err(err) if err.is_short() => {
                    debug!(offset = self.decoder.offset(), "{err}; end of usable input");
                    break;
                }
                Err(err) => {
                    error!(offset = self.decoder.offset(), "decode failed: {err}");
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        self.done = true;
        None
    }
}
