use std::collections::HashMap;
use std::io::{stdout, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rtarchive::continuity::detect;
use rtarchive::multireader::MultiReader;
use rtarchive::packet::{Decoded, Decoder, Filter, Header};
use rtarchive::{Family, Id, Info, Packet, View};
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

fn time(t: DateTime<Utc>) -> String {
    t.format(TIME_FORMAT).to_string()
}

fn channel_name(channel: u8) -> &'static str {
    match channel {
        1 => "vic1",
        2 => "vic2",
        3 => "lrsd",
        _ => "***",
    }
}

fn write_row<W: Write>(w: &mut W, packet: &Packet, missing: u64) -> std::io::Result<()> {
    let state = if packet.is_valid() { "-" } else { "invalid" };
    let hash = xxh3_64(packet.payload());
    match packet.header() {
        Header::Vmu {
            envelope,
            channel,
            common,
        } => writeln!(
            w,
            "{:>7} {:04x} {} {} {:>9} {:>3} {:^8} {:^4} {:02x} {} {:>9} {:<16} {:08x} {:^8} {:016x}",
            channel.size,
            envelope.error,
            time(packet.archived()),
            time(channel.timestamp()),
            channel.sequence,
            missing,
            if packet.is_realtime() { "realtime" } else { "playback" },
            channel_name(channel.channel),
            common.origin,
            time(common.acquisition()),
            common.counter,
            common.user_info(),
            packet.sum(),
            state,
            hash,
        ),
        Header::Tm { primary, esa, .. } => writeln!(
            w,
            "{:>7} {} {} {:>5} {:>6} {:>3} {:08x} {:016x}",
            packet.len(),
            time(packet.archived()),
            time(esa.timestamp()),
            primary.apid,
            primary.sequence_id,
            missing,
            esa.sid,
            hash,
        ),
    }
}

pub fn dump(
    inputs: &[PathBuf],
    family: Family,
    view: View,
    include_invalid: bool,
    id: Option<Id>,
) -> Result<()> {
    debug!(?inputs, %family, "dumping");
    let mut decoder = Decoder::new(MultiReader::new(inputs), family);
    if let Some(id) = id {
        decoder = decoder.with_filter(Filter::ById { id, view });
    }

    let mut w = BufWriter::new(stdout().lock());
    let mut last: HashMap<Id, Info> = HashMap::default();
    let (mut count, mut size, mut invalid, mut missing, mut skipped) = (0usize, 0usize, 0, 0, 0);
    loop {
        let packet = match decoder.decode() {
            Ok(Decoded::Valid(packet)) => packet,
            Ok(Decoded::Invalid(packet)) => {
                invalid += 1;
                if !include_invalid {
                    continue;
                }
                packet
            }
            Ok(Decoded::Malformed) => {
                invalid += 1;
                continue;
            }
            Ok(Decoded::Skip) => {
                skipped += 1;
                continue;
            }
            Ok(Decoded::End) => break,
            Err(err) if err.is_short() => {
                debug!(offset = decoder.offset(), "{err}; stopping");
                break;
            }
            Err(err) => return Err(err).context("decoding input"),
        };

        let info = packet.info(view);
        let diff = last
            .get(&info.id)
            .and_then(|prev| detect(prev, &info, None))
            .map_or(0, |gap| gap.lost());
        missing += diff;
        count += 1;
        size += packet.len();
        write_row(&mut w, &packet, diff)?;
        last.insert(info.id, info);
    }
    w.flush()?;

    info!(
        "{count} packets ({}MB, {invalid} invalid, {missing} missing, {skipped} skipped)",
        size >> 20
    );
    Ok(())
}
