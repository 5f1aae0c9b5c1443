use std::fs::File;
use std::io::{stdout, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{Duration, SecondsFormat, Utc};
use clap::ValueEnum;
use rtarchive::aggregate::Coze;
use rtarchive::config::Config;
use rtarchive::continuity::Gap;
use rtarchive::query::{self, Archive, TimeRange};
use rtarchive::{Info, Status};
use tracing::{debug, info};

use crate::QueryArgs;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Format {
    Text,
    Json,
    Csv,
}

fn range(args: &QueryArgs, max_span: Option<Duration>) -> Result<TimeRange> {
    Ok(TimeRange::from_query(
        args.start.as_deref(),
        args.end.as_deref(),
        max_span,
        Utc::now(),
    )?)
}

pub(crate) trait Text {
    fn write_text<W: Write>(&self, w: &mut W) -> std::io::Result<()>;
}

impl Text for Coze {
    fn write_text<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        writeln!(
            w,
            "{:>6} {:>8} {:>8} {:>6} {:>12}",
            self.id, self.count, self.missing, self.error, self.size
        )
    }
}

impl Text for Gap {
    fn write_text<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        let secs = self.duration().num_milliseconds() as f64 / 1000.0;
        writeln!(
            w,
            "{:>6} {} {} {:>8} {:>8} {:>8} {:>10.3}s {:?}",
            self.id,
            self.starts.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.ends.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.before,
            self.after,
            self.missing,
            secs,
            self.kind
        )
    }
}

impl Text for Info {
    fn write_text<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        writeln!(
            w,
            "{:>6} {} {:>10} {:>8} {:08x}",
            self.id,
            self.time.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.sequence,
            self.size,
            self.sum
        )
    }
}

pub(crate) fn output<R: query::Record + Text>(records: &[R], format: Format) -> Result<()> {
    let status = Status::for_len(records.len());
    info!(records = records.len(), status = status.code(), "done");
    let mut w = BufWriter::new(stdout().lock());
    match format {
        Format::Text => {
            for record in records {
                record.write_text(&mut w)?;
            }
        }
        Format::Json => query::render(records, query::Format::Json, &mut w)?,
        Format::Csv => query::render(records, query::Format::Csv, &mut w)?,
    }
    w.flush()?;
    Ok(())
}

fn open(
    config: &Config,
    args: &QueryArgs,
    max_span: Option<Duration>,
) -> Result<(Archive, TimeRange)> {
    let archive = Archive::from_config(config)?;
    let range = range(args, max_span)?;
    debug!(
        root = ?archive.root(),
        family = %archive.family(),
        start = %range.start,
        span = %range.span(),
        "querying"
    );
    Ok((archive, range))
}

pub fn stats(config: &Config, args: &QueryArgs, format: &Format) -> Result<()> {
    let (archive, range) = open(config, args, Some(TimeRange::MAX_BOUNDED))?;
    let cozes = archive.stats(&range, args.id).context("stats query")?;
    output(&cozes, *format)
}

pub fn gaps(config: &Config, args: &QueryArgs, format: &Format) -> Result<()> {
    let (archive, range) = open(config, args, Some(TimeRange::MAX_BOUNDED))?;
    let gaps = archive.gaps(&range, args.id).context("gaps query")?;
    output(&gaps, *format)
}

pub fn packets(config: &Config, args: &QueryArgs, format: &Format) -> Result<()> {
    let (archive, range) = open(config, args, None)?;
    let infos = archive.list(&range, args.id).context("packets query")?;
    output(&infos, *format)
}

pub fn download(config: &Config, args: &QueryArgs, output: &Path, clobber: bool) -> Result<()> {
    if !clobber && output.exists() {
        bail!("{output:?} exists; use --clobber");
    }
    let (archive, range) = open(config, args, None)?;
    let dest = File::create(output).with_context(|| format!("failed to create output {output:?}"))?;
    let written = archive
        .download(&range, args.id, BufWriter::new(dest))
        .context("download")?;
    info!("wrote {written} payload bytes to {output:?}");
    Ok(())
}
