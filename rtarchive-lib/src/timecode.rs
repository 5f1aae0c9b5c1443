//! Coarse/fine time fields.
//!
//! All onboard and ground times carried by packet headers are offsets from the GPS epoch
//! (1980-01-06T00:00:00Z). No leap second correction is applied.
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Seconds between the Unix epoch and the GPS epoch.
const GPS_UNIX_DELTA_SECS: i64 = 315_964_800;

/// The GPS epoch as a UTC time.
#[must_use]
pub fn gps_epoch() -> DateTime<Utc> {
    DateTime::from_timestamp(GPS_UNIX_DELTA_SECS, 0).unwrap_or_default()
}

/// Join a 4 byte coarse and 1 byte fine time; `fine` is in units of 1/256 s.
#[must_use]
pub fn join5(coarse: u32, fine: u8) -> DateTime<Utc> {
    let nanos = (u64::from(fine) * 1_000_000_000) >> 8;
    from_gps(coarse, nanos)
}

/// Join a 4 byte coarse and 2 byte fine time; `fine` is in units of 1/65536 s.
#[must_use]
pub fn join6(coarse: u32, fine: u16) -> DateTime<Utc> {
    let nanos = (u64::from(fine) * 1_000_000_000) >> 16;
    from_gps(coarse, nanos)
}

/// A signed number of nanoseconds from the GPS epoch.
#[must_use]
pub fn from_gps_nanos(nanos: i64) -> DateTime<Utc> {
    gps_epoch() + Duration::nanoseconds(nanos)
}

fn from_gps(coarse: u32, nanos: u64) -> DateTime<Utc> {
    // nanos < 1s by construction
    Utc.timestamp_opt(GPS_UNIX_DELTA_SECS + i64::from(coarse), nanos as u32)
        .single()
        .unwrap_or_default()
}

/// Coarse seconds and a fine part of `bits` bits. The fine part is rounded up so it joins
/// back to the same time; a fraction rounding up to a full second carries into the seconds.
fn split(t: DateTime<Utc>, bits: u32) -> (u32, u64) {
    let delta = t - gps_epoch();
    let secs = delta.num_seconds();
    let nanos = (delta - Duration::seconds(secs)).num_nanoseconds().unwrap_or(0);
    let fine = ((nanos as u64) << bits).div_ceil(1_000_000_000);
    if fine >> bits == 0 {
        (secs as u32, fine)
    } else {
        (secs as u32 + 1, 0)
    }
}

/// Split a time into GPS coarse seconds and a 1/65536 s fine part. Inverse of [join6],
/// truncating any precision the fine field cannot carry.
#[must_use]
pub fn split6(t: DateTime<Utc>) -> (u32, u16) {
    let (secs, fine) = split(t, 16);
    (secs, fine as u16)
}

/// Split a time into GPS coarse seconds and a 1/256 s fine part. Inverse of [join5].
#[must_use]
pub fn split5(t: DateTime<Utc>) -> (u32, u8) {
    let (secs, fine) = split(t, 8);
    (secs, fine as u8)
}
