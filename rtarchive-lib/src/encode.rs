//! Record encoding, the inverse of the packet decoders.
//!
//! Used to produce synthetic archives for tests and benchmarks.
use chrono::{DateTime, Utc};
use typed_builder::TypedBuilder;

use crate::packet::{checksum, ChannelHeader, CommonHeader, EnvelopeHeader, SIZE_LEN};
use crate::timecode::{gps_epoch, split5, split6};

/// Sync word written at the start of every channel header.
pub const SYNC: u32 = 0xf82e_3553;

/// A [Family::Vmu](crate::Family::Vmu) record.
#[derive(Debug, Clone, TypedBuilder)]
pub struct VmuRecord {
    #[builder(default = 1)]
    pub channel: u8,
    #[builder(default = 0x33)]
    pub origin: u8,
    #[builder(default)]
    pub sequence: u32,
    /// Common header counter; defaults to the channel sequence.
    #[builder(default, setter(strip_option))]
    pub counter: Option<u32>,
    #[builder(default = gps_epoch())]
    pub time: DateTime<Utc>,
    #[builder(default = gps_epoch())]
    pub archived: DateTime<Utc>,
    #[builder(default = 0x10)]
    pub property: u8,
    #[builder(default = b"SCIENCE-1".to_vec())]
    pub upi: Vec<u8>,
    #[builder(default = vec![0xa5; 16])]
    pub data: Vec<u8>,
    #[builder(default)]
    pub error: u16,
    /// Overrides the channel header size field.
    #[builder(default, setter(strip_option))]
    pub declared: Option<u32>,
    /// Corrupts the checksum trailer.
    #[builder(default)]
    pub corrupt: bool,
}

impl VmuRecord {
    /// Length of the common header plus the user identifier area.
    const COMMON_AREA: usize = 76;

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        // common header + user identifier area + data
        let mut payload = vec![0u8; Self::COMMON_AREA];
        payload[0] = self.property;
        payload[3..7].copy_from_slice(&self.counter.unwrap_or(self.sequence).to_le_bytes());
        let acq = (self.time - gps_epoch()).num_nanoseconds().unwrap_or(0);
        payload[7..15].copy_from_slice(&acq.to_le_bytes());
        payload[15..23].copy_from_slice(&acq.to_le_bytes());
        payload[23] = self.origin;
        let upi_at = if self.property >> 4 == 2 { 44 } else { 24 };
        let n = self.upi.len().min(32);
        payload[upi_at..upi_at + n].copy_from_slice(&self.upi[..n]);
        payload.extend_from_slice(&self.data);

        let size = (ChannelHeader::LEN - ChannelHeader::SUM_OFFSET + payload.len()) as u32;
        let (coarse, fine) = split6(self.time);
        let mut channel = vec![0u8; ChannelHeader::LEN];
        channel[0..4].copy_from_slice(&SYNC.to_be_bytes());
        channel[4..8].copy_from_slice(&self.declared.unwrap_or(size).to_le_bytes());
        channel[8] = self.channel;
        channel[9] = self.origin;
        channel[12..16].copy_from_slice(&self.sequence.to_le_bytes());
        channel[16..20].copy_from_slice(&coarse.to_le_bytes());
        channel[20..22].copy_from_slice(&fine.to_le_bytes());
        channel.extend_from_slice(&payload);
        let mut sum = checksum::sum(&channel[ChannelHeader::SUM_OFFSET..]);
        if self.corrupt {
            sum = sum.wrapping_add(1);
        }
        channel.extend_from_slice(&sum.to_le_bytes());

        let record_len = EnvelopeHeader::LEN + channel.len();
        let (pc, pf) = split5(self.time);
        let (ac, af) = split5(self.archived);
        let mut record = Vec::with_capacity(record_len);
        record.extend_from_slice(&((record_len - SIZE_LEN) as u32).to_le_bytes());
        record.extend_from_slice(&self.error.to_be_bytes());
        record.push(0);
        record.push(self.channel);
        record.extend_from_slice(&pc.to_be_bytes());
        record.push(pf);
        record.extend_from_slice(&ac.to_be_bytes());
        record.push(af);
        record.extend_from_slice(&channel);
        record
    }
}

/// A [Family::Tm](crate::Family::Tm) record.
#[derive(Debug, Clone, TypedBuilder)]
pub struct TmRecord {
    #[builder(default = 100)]
    pub apid: u16,
    #[builder(default)]
    pub sequence: u16,
    #[builder(default = gps_epoch())]
    pub time: DateTime<Utc>,
    #[builder(default = vec![0x5a; 8])]
    pub data: Vec<u8>,
}

impl TmRecord {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let (coarse, fine) = split5(self.time);
        let mut esa = Vec::with_capacity(10 + self.data.len());
        esa.extend_from_slice(&coarse.to_be_bytes());
        esa.push(fine);
        esa.push(0);
        esa.extend_from_slice(&1u32.to_be_bytes());
        esa.extend_from_slice(&self.data);

        let d1: u16 = 0x0800 | (self.apid & 0x7ff);
        let d2: u16 = 0xc000 | (self.sequence & 0x3fff);
        let d3 = (esa.len() - 1) as u16;

        let mut record = Vec::new();
        let size = (10 - SIZE_LEN + 6 + esa.len()) as u32;
        record.extend_from_slice(&size.to_le_bytes());
        record.push(1);
        record.extend_from_slice(&coarse.to_be_bytes());
        record.push(fine);
        record.extend_from_slice(&d1.to_be_bytes());
        record.extend_from_slice(&d2.to_be_bytes());
        record.extend_from_slice(&d3.to_be_bytes());
        record.extend_from_slice(&esa);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{Family, Header, View};
    use chrono::Duration;

    #[test]
    fn vmu_record_decodes() {
        let t = gps_epoch() + Duration::milliseconds(1_500);
        let rec = VmuRecord::builder()
            .channel(2)
            .origin(0x51)
            .sequence(42)
            .counter(7)
            .time(t)
            .error(4)
            .build()
            .encode();
        let p = Family::Vmu.decode(rec.clone()).unwrap();

        assert!(p.is_valid());
        assert_eq!(p.bytes(), &rec[..]);
        assert_eq!(p.id(View::Channel), 2);
        assert_eq!(p.id(View::Origin), 0x51);
        assert_eq!(p.sequence(View::Channel), 42);
        assert_eq!(p.sequence(View::Origin), 7);
        assert_eq!(p.timestamp(View::Channel), t);
        assert_eq!(p.timestamp(View::Origin), t);
        assert_eq!(p.error_flags(), 4);
        assert!(p.is_realtime());
        let Header::Vmu { common, .. } = p.header() else {
            panic!("expected vmu header");
        };
        assert_eq!(common.user_info(), "SCIENCE-1");
        assert_eq!(p.len(), 16 + 76 + 16);
    }

    #[test]
    fn corrupt_vmu_record_is_invalid() {
        let rec = VmuRecord::builder().corrupt(true).build().encode();
        let p = Family::Vmu.decode(rec).unwrap();
        assert!(!p.is_valid());
    }

    #[test]
    fn tm_record_decodes() {
        let t = gps_epoch() + Duration::milliseconds(250);
        let rec = TmRecord::builder().apid(1369).sequence(16383).time(t).build().encode();
        let p = Family::Tm.decode(rec).unwrap();
        assert_eq!(p.id(View::Channel), 1369);
        assert_eq!(p.sequence(View::Channel), 16383);
        assert_eq!(p.timestamp(View::Channel), t);
        assert_eq!(p.len(), 18);
    }
}
