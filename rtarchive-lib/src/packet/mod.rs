pub mod checksum;
mod decoder;
pub mod header;

use std::cmp::Ordering;
use std::fmt::Display;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub use decoder::{Decoded, Decoder, Filter, Packets};
pub use header::{ChannelHeader, CommonHeader, EnvelopeHeader, EsaHeader, PrimaryHeader, PthHeader};

/// Grouping key of a logical stream; see [View].
pub type Id = u32;

/// Length of the size field leading every archive record.
pub const SIZE_LEN: usize = 4;

/// The packet families found in archives. Each family has its own record layout,
/// identifier and sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// HRD packets: envelope, channel header, common payload header, data, checksum.
    Vmu,
    /// Telemetry packets: PTH envelope, CCSDS primary header, ESA secondary header, data.
    Tm,
}

impl FromStr for Family {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "vmu" | "hrd" => Ok(Family::Vmu),
            "tm" | "pth" | "pt" => Ok(Family::Tm),
            "" => Err(Error::UnknownFamily("no packet type provided".to_string())),
            other => Err(Error::UnknownFamily(other.to_string())),
        }
    }
}

impl Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Family::Vmu => write!(f, "vmu"),
            Family::Tm => write!(f, "tm"),
        }
    }
}

impl Family {
    /// Number of leading record bytes that are archive framing rather than packet.
    #[must_use]
    pub fn envelope_len(&self) -> usize {
        match self {
            Family::Vmu => EnvelopeHeader::LEN,
            Family::Tm => PthHeader::LEN,
        }
    }

    /// Sort order for records of this family.
    #[must_use]
    pub fn order(&self, a: &Info, b: &Info) -> Ordering {
        match self {
            Family::Vmu => a.time.cmp(&b.time).then_with(|| {
                if a.id == b.id {
                    a.sequence.cmp(&b.sequence)
                } else {
                    a.size.cmp(&b.size)
                }
            }),
            Family::Tm => a
                .time
                .cmp(&b.time)
                .then_with(|| a.sequence.cmp(&b.sequence)),
        }
    }

    /// Decode a full archive record, including its leading size field.
    ///
    /// A record that holds its headers but not the packet size they declare decodes as an
    /// invalid packet.
    ///
    /// # Errors
    /// [Error::ShortBuffer] if `record` cannot hold the headers.
    pub fn decode(&self, record: Vec<u8>) -> Result<Packet> {
        match self {
            Family::Vmu => decode_vmu(record),
            Family::Tm => decode_tm(record),
        }
    }
}

fn decode_vmu(record: Vec<u8>) -> Result<Packet> {
    let envelope = EnvelopeHeader::decode(&record)?;
    let body = &record[EnvelopeHeader::LEN..];
    let channel = ChannelHeader::decode(body)?;

    let sum_end = ChannelHeader::SUM_OFFSET + channel.size as usize + checksum::TRAILER_LEN;
    let data_end = sum_end - checksum::TRAILER_LEN;
    // A channel size disagreeing with the record framing leaves an invalid packet whose
    // common header is read from whatever follows the channel header.
    let (common, sum, valid) = match body.get(ChannelHeader::SUM_OFFSET..sum_end) {
        Some(checked) if data_end >= ChannelHeader::LEN + CommonHeader::LEN => {
            let common = CommonHeader::decode(&body[ChannelHeader::LEN..data_end])?;
            match checksum::check(checked) {
                Some(checked) => (common, checked.sum, checked.is_valid()),
                None => (common, 0, false),
            }
        }
        _ => {
            let common = CommonHeader::decode(&body[ChannelHeader::LEN..])?;
            (common, 0, false)
        }
    };

    Ok(Packet {
        header: Header::Vmu {
            envelope,
            channel,
            common,
        },
        data: record,
        sum,
        valid,
    })
}

fn decode_tm(record: Vec<u8>) -> Result<Packet> {
    let pth = PthHeader::decode(&record)?;
    let body = &record[PthHeader::LEN..];
    let primary = PrimaryHeader::decode(body)?;
    let esa = EsaHeader::decode(&body[PrimaryHeader::LEN..])?;

    // packet length must fit the record framing
    let want = PrimaryHeader::LEN + primary.len_minus1 as usize + 1;
    let valid = body.len() >= want;

    Ok(Packet {
        header: Header::Tm { pth, primary, esa },
        data: record,
        sum: 0,
        valid,
    })
}

/// Which header fields identify a stream and drive its sequence tracking.
///
/// The two views are mutually exclusive groupings of the same packets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    /// Channel id, channel sequence counter and channel time.
    #[default]
    Channel,
    /// Origin byte, common header counter and acquisition time.
    Origin,
}

impl FromStr for View {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "channel" | "" => Ok(View::Channel),
            "origin" => Ok(View::Origin),
            other => Err(Error::Config(format!("unknown grouping {other}"))),
        }
    }
}

/// Decoded headers, one variant per [Family].
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    Vmu {
        envelope: EnvelopeHeader,
        channel: ChannelHeader,
        common: CommonHeader,
    },
    Tm {
        pth: PthHeader,
        primary: PrimaryHeader,
        esa: EsaHeader,
    },
}

/// A single decoded archive record.
///
/// Validity is decided when the record is decoded and never changes afterwards.
#[derive(Debug, Clone)]
pub struct Packet {
    header: Header,
    /// All record bytes, including the size field and envelope.
    data: Vec<u8>,
    sum: u32,
    valid: bool,
}

impl Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Packet{{family: {}, id: {}, sequence: {}, data:[len={}], valid: {}}}",
            self.family(),
            self.id(View::Channel),
            self.sequence(View::Channel),
            self.data.len(),
            self.valid
        )
    }
}

impl Packet {
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[must_use]
    pub fn family(&self) -> Family {
        match self.header {
            Header::Vmu { .. } => Family::Vmu,
            Header::Tm { .. } => Family::Tm,
        }
    }

    /// All record bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Record bytes without the family's envelope.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[self.family().envelope_len()..]
    }

    /// Computed checksum; always 0 for families without a checksum trailer.
    #[must_use]
    pub fn sum(&self) -> u32 {
        self.sum
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Error flags reported by the ground segment in the envelope.
    #[must_use]
    pub fn error_flags(&self) -> u16 {
        match self.header {
            Header::Vmu { envelope, .. } => envelope.error,
            Header::Tm { .. } => 0,
        }
    }

    /// Declared packet size.
    #[must_use]
    pub fn len(&self) -> usize {
        match self.header {
            Header::Vmu { channel, .. } => channel.size as usize,
            Header::Tm { primary, .. } => primary.len_minus1 as usize + 1,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn id(&self, view: View) -> Id {
        match (self.header, view) {
            (Header::Vmu { channel, .. }, View::Channel) => Id::from(channel.channel),
            (Header::Vmu { common, .. }, View::Origin) => Id::from(common.origin),
            (Header::Tm { primary, .. }, _) => Id::from(primary.apid),
        }
    }

    #[must_use]
    pub fn sequence(&self, view: View) -> i64 {
        match (self.header, view) {
            (Header::Vmu { channel, .. }, View::Channel) => i64::from(channel.sequence),
            (Header::Vmu { common, .. }, View::Origin) => i64::from(common.counter),
            (Header::Tm { primary, .. }, _) => i64::from(primary.sequence_id),
        }
    }

    #[must_use]
    pub fn timestamp(&self, view: View) -> DateTime<Utc> {
        match (self.header, view) {
            (Header::Vmu { channel, .. }, View::Channel) => channel.timestamp(),
            (Header::Vmu { common, .. }, View::Origin) => common.acquisition(),
            (Header::Tm { esa, .. }, _) => esa.timestamp(),
        }
    }

    /// Time the record was written to the archive.
    #[must_use]
    pub fn archived(&self) -> DateTime<Utc> {
        match self.header {
            Header::Vmu { envelope, .. } => envelope.archive(),
            Header::Tm { pth, .. } => pth.archive(),
        }
    }

    /// True when a VMU packet was received on the same origin it was produced for.
    #[must_use]
    pub fn is_realtime(&self) -> bool {
        match self.header {
            Header::Vmu {
                channel, common, ..
            } => channel.origin == common.origin,
            Header::Tm { .. } => true,
        }
    }

    #[must_use]
    pub fn info(&self, view: View) -> Info {
        Info {
            id: self.id(view),
            time: self.timestamp(view),
            sequence: self.sequence(view),
            size: self.len(),
            sum: self.sum,
        }
    }
}

/// Lightweight description of a packet used for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    pub id: Id,
    pub time: DateTime<Utc>,
    pub sequence: i64,
    pub size: usize,
    pub sum: u32,
}
