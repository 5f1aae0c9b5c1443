//! Fixed layout header decoding.
//!
//! Byte order is per field and differs between (and within) header families, so every
//! field is decoded explicitly.
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::timecode::{from_gps_nanos, join5, join6};
use crate::{Error, Result};

/// Length of the user identifier field of a [CommonHeader].
pub const UPI_LEN: usize = 32;

fn want(buf: &[u8], len: usize) -> Result<()> {
    if buf.len() < len {
        return Err(Error::ShortBuffer {
            wanted: len,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn be_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn le_i64(buf: &[u8], at: usize) -> i64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[at..at + 8]);
    i64::from_le_bytes(b)
}

/// Outer framing header of an HRD archive record.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    /// Number of record bytes following this field.
    pub size: u32,
    pub error: u16,
    pub payload: u8,
    pub channel: u8,
    pub packet_coarse: u32,
    pub packet_fine: u8,
    pub archive_coarse: u32,
    pub archive_fine: u8,
}

impl EnvelopeHeader {
    pub const LEN: usize = 18;

    /// # Errors
    /// [Error::ShortBuffer] if `buf` is smaller than [Self::LEN].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        want(buf, Self::LEN)?;
        Ok(EnvelopeHeader {
            size: le_u32(buf, 0),
            error: u16::from_be_bytes([buf[4], buf[5]]),
            payload: buf[6],
            channel: buf[7],
            packet_coarse: be_u32(buf, 8),
            packet_fine: buf[12],
            archive_coarse: be_u32(buf, 13),
            archive_fine: buf[17],
        })
    }

    /// Time the packet was packetized onboard.
    #[must_use]
    pub fn acquisition(&self) -> DateTime<Utc> {
        join5(self.packet_coarse, self.packet_fine)
    }

    /// Time the packet was archived on ground.
    #[must_use]
    pub fn archive(&self) -> DateTime<Utc> {
        join5(self.archive_coarse, self.archive_fine)
    }
}

/// Per-packet header identifying the channel, origin and sequence of a packet.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelHeader {
    pub sync: u32,
    /// Number of bytes from the channel field to the end of the packet data, excluding
    /// the checksum trailer.
    pub size: u32,
    pub channel: u8,
    pub origin: u8,
    pub sequence: u32,
    pub coarse: u32,
    pub fine: u16,
}

impl ChannelHeader {
    pub const LEN: usize = 24;
    /// Offset of the first checksummed byte.
    pub const SUM_OFFSET: usize = 8;

    /// # Errors
    /// [Error::ShortBuffer] if `buf` is smaller than [Self::LEN].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        want(buf, Self::LEN)?;
        Ok(ChannelHeader {
            sync: be_u32(buf, 0),
            size: le_u32(buf, 4),
            channel: buf[8],
            origin: buf[9],
            sequence: le_u32(buf, 12),
            coarse: le_u32(buf, 16),
            fine: le_u16(buf, 20),
        })
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        join6(self.coarse, self.fine)
    }
}

/// Class of payload selected by the high nibble of [CommonHeader::property].
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyClass {
    Science,
    Image,
    Other,
}

/// Secondary header at the start of every channel payload.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommonHeader {
    pub property: u8,
    pub stream: u16,
    pub counter: u32,
    /// Nanoseconds from the GPS epoch.
    pub acq_time: i64,
    /// Nanoseconds from the GPS epoch.
    pub aux_time: i64,
    pub origin: u8,
    pub upi: [u8; UPI_LEN],
}

impl CommonHeader {
    pub const LEN: usize = 24;
    const SCIENCE_UPI_OFFSET: usize = 24;
    const IMAGE_UPI_OFFSET: usize = 44;

    /// Decode the fixed part of the header and, depending on the property class, as much
    /// of the user identifier as `buf` holds.
    ///
    /// # Errors
    /// [Error::ShortBuffer] if `buf` is smaller than [Self::LEN].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        want(buf, Self::LEN)?;
        let mut hdr = CommonHeader {
            property: buf[0],
            stream: le_u16(buf, 1),
            counter: le_u32(buf, 3),
            acq_time: le_i64(buf, 7),
            aux_time: le_i64(buf, 15),
            origin: buf[23],
            upi: [0u8; UPI_LEN],
        };
        let offset = match hdr.class() {
            PropertyClass::Science => Self::SCIENCE_UPI_OFFSET,
            PropertyClass::Image => Self::IMAGE_UPI_OFFSET,
            PropertyClass::Other => return Ok(hdr),
        };
        if offset < buf.len() {
            let upi = &buf[offset..buf.len().min(offset + UPI_LEN)];
            hdr.upi[..upi.len()].copy_from_slice(upi);
        }
        Ok(hdr)
    }

    #[must_use]
    pub fn class(&self) -> PropertyClass {
        match self.property >> 4 {
            1 => PropertyClass::Science,
            2 => PropertyClass::Image,
            _ => PropertyClass::Other,
        }
    }

    #[must_use]
    pub fn acquisition(&self) -> DateTime<Utc> {
        from_gps_nanos(self.acq_time)
    }

    /// The printable prefix of the user identifier; stops at the first NUL or character
    /// that is not alphanumeric, `-` or `_`.
    #[must_use]
    pub fn user_info(&self) -> String {
        self.upi
            .iter()
            .map(|b| *b as char)
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect()
    }
}

/// Outer framing header of a telemetry (PTH) archive record.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PthHeader {
    /// Number of record bytes following this field.
    pub size: u32,
    pub kind: u8,
    pub coarse: u32,
    pub fine: u8,
}

impl PthHeader {
    pub const LEN: usize = 10;

    /// # Errors
    /// [Error::ShortBuffer] if `buf` is smaller than [Self::LEN].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        want(buf, Self::LEN)?;
        Ok(PthHeader {
            size: le_u32(buf, 0),
            kind: buf[4],
            coarse: be_u32(buf, 5),
            fine: buf[9],
        })
    }

    /// Time the packet was archived on ground.
    #[must_use]
    pub fn archive(&self) -> DateTime<Utc> {
        join5(self.coarse, self.fine)
    }
}

/// CCSDS Primary Header
///
/// The primary header format is common to all CCSDS space packets.
#[derive(Serialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrimaryHeader {
    pub version: u8,
    pub type_flag: u8,
    pub has_secondary_header: bool,
    pub apid: u16,
    pub sequence_flags: u8,
    pub sequence_id: u16,
    pub len_minus1: u16,
}

impl PrimaryHeader {
    pub const LEN: usize = 6;

    /// # Errors
    /// [Error::ShortBuffer] if `buf` is smaller than [Self::LEN].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        want(buf, Self::LEN)?;
        let d1 = u16::from_be_bytes([buf[0], buf[1]]);
        let d2 = u16::from_be_bytes([buf[2], buf[3]]);
        let d3 = u16::from_be_bytes([buf[4], buf[5]]);

        Ok(PrimaryHeader {
            version: (d1 >> 13 & 0x7) as u8,
            type_flag: (d1 >> 12 & 0x1) as u8,
            has_secondary_header: (d1 >> 11 & 0x1) == 1,
            apid: (d1 & 0x7ff),
            sequence_flags: (d2 >> 14 & 0x3) as u8,
            sequence_id: (d2 & 0x3fff),
            len_minus1: d3,
        })
    }
}

/// ESA packet secondary header following the [PrimaryHeader] of telemetry packets.
#[derive(Serialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct EsaHeader {
    pub coarse: u32,
    pub fine: u8,
    pub info: u8,
    pub sid: u32,
}

impl EsaHeader {
    pub const LEN: usize = 10;

    /// # Errors
    /// [Error::ShortBuffer] if `buf` is smaller than [Self::LEN].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        want(buf, Self::LEN)?;
        Ok(EsaHeader {
            coarse: be_u32(buf, 0),
            fine: buf[4],
            info: buf[5],
            sid: be_u32(buf, 6),
        })
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        join5(self.coarse, self.fine)
    }
}
