use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use rtarchive::dedup::NoDuplicate;
use rtarchive::multireader::MultiReader;
use rtarchive::packet::Decoder;
use rtarchive::{Family, Packet, View};
use tracing::info;

/// Order `packets` with the sort order of `family`. Equal packets keep their input order.
fn sort_packets(packets: &mut [Packet], family: Family, view: View) {
    packets.sort_by(|a, b| family.order(&a.info(view), &b.info(view)));
}

pub fn sort(
    inputs: &[PathBuf],
    output: &Path,
    family: Family,
    view: View,
    unique: bool,
    clobber: bool,
) -> Result<()> {
    if !clobber && output.exists() {
        bail!("{output:?} exists; use --clobber");
    }
    let mut packets = Decoder::new(MultiReader::new(inputs), family)
        .packets(true)
        .collect::<rtarchive::Result<Vec<Packet>>>()
        .context("decoding inputs")?;
    sort_packets(&mut packets, family, view);

    let dest = BufWriter::new(
        File::create(output).with_context(|| format!("failed to create output {output:?}"))?,
    );
    let mut dest: Box<dyn Write> = if unique {
        Box::new(NoDuplicate::new(dest))
    } else {
        Box::new(dest)
    };
    for packet in &packets {
        dest.write_all(packet.bytes())?;
    }
    dest.flush()?;
    info!("sorted {} packets into {output:?}", packets.len());
    Ok(())
}
