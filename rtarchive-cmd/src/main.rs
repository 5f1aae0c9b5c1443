mod dump;
mod query;
mod scan;
mod sort;

use std::io::stderr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Duration;
use clap::{Args, Parser, Subcommand};
use rtarchive::config::Config;
use rtarchive::{Family, Id, View};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options selecting an archive and a time range.
#[derive(Args, Debug)]
struct QueryArgs {
    /// Archive configuration file (TOML).
    #[arg(short, long, value_name = "path")]
    config: PathBuf,

    /// Range start (RFC3339). Must be used with --end; without both the last 24 hours are
    /// used.
    #[arg(short, long, value_name = "timestamp")]
    start: Option<String>,

    /// Range end (RFC3339).
    #[arg(short, long, value_name = "timestamp")]
    end: Option<String>,

    /// Only consider packets with this channel, origin or APID.
    #[arg(short, long)]
    id: Option<Id>,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode raw record files and print one row per packet.
    ///
    /// Files are read as one continuous stream, in the order given.
    Dump {
        /// Packet family of the input files.
        #[arg(short = 't', long = "type", default_value = "vmu")]
        family: Family,

        /// Track sequences by channel or origin.
        #[arg(short, long, default_value = "channel")]
        by: View,

        /// Also print packets failing their checksum.
        #[arg(short = 'e', long, action)]
        include_invalid: bool,

        /// Only print packets with this identifier.
        #[arg(short, long)]
        id: Option<Id>,

        /// Input record files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Per identifier counts of raw record files.
    Count {
        /// Packet family of the input files.
        #[arg(short = 't', long = "type", default_value = "vmu")]
        family: Family,

        /// Count packets by channel or origin.
        #[arg(short, long, default_value = "channel")]
        by: View,

        /// Track sequences through packets failing their checksum.
        #[arg(short = 'e', long, action)]
        include_invalid: bool,

        /// Only count packets with this identifier.
        #[arg(short, long)]
        id: Option<Id>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: query::Format,

        /// Input record files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Sequence gaps of raw record files.
    Diff {
        /// Packet family of the input files.
        #[arg(short = 't', long = "type", default_value = "vmu")]
        family: Family,

        /// Track sequences by channel or origin.
        #[arg(short, long, default_value = "channel")]
        by: View,

        /// Also track packets failing their checksum.
        #[arg(short = 'e', long, action)]
        include_invalid: bool,

        /// Only report gaps for this identifier.
        #[arg(short, long)]
        id: Option<Id>,

        /// Longest gap reported, in seconds. 0 reports every gap.
        #[arg(short = 'd', long, default_value_t = 1.0, value_name = "seconds")]
        max_gap: f64,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: query::Format,

        /// Input record files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Per identifier packet counts, sizes, missing and error counts. At most 24 hours.
    Stats {
        #[command(flatten)]
        query: QueryArgs,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: query::Format,
    },
    /// Sequence gaps in arrival order. At most 24 hours.
    Gaps {
        #[command(flatten)]
        query: QueryArgs,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: query::Format,
    },
    /// One line per packet.
    Packets {
        #[command(flatten)]
        query: QueryArgs,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: query::Format,
    },
    /// Write packet payloads, without archive envelopes, to a file.
    ///
    /// Adjacent duplicate packets are written once.
    Download {
        #[command(flatten)]
        query: QueryArgs,

        /// Delete output file if it already exists
        #[arg(long, action)]
        clobber: bool,

        /// Output file path.
        #[arg(short, long, default_value = "archive.dat", value_name = "path")]
        output: PathBuf,
    },
    /// Sort the records of raw files by time.
    Sort {
        /// Packet family of the input files.
        #[arg(short = 't', long = "type", default_value = "vmu")]
        family: Family,

        /// Sort using channel or origin times.
        #[arg(short, long, default_value = "channel")]
        by: View,

        /// Drop adjacent duplicate records after sorting.
        #[arg(short, long, action)]
        unique: bool,

        /// Delete output file if it already exists
        #[arg(long, action)]
        clobber: bool,

        /// Output file path.
        #[arg(short, long, default_value = "sorted.dat", value_name = "path")]
        output: PathBuf,

        /// Input record files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

/// Load the query config and start logging at the level it asks for.
fn setup(args: &QueryArgs) -> Result<Config> {
    let config =
        Config::load(&args.config).with_context(|| format!("loading config {:?}", args.config))?;
    init_logging(config.devel);
    Ok(config)
}

fn init_logging(devel: bool) {
    let default = if devel { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("RTARCHIVE_LOG").unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Dump {
            family,
            by,
            include_invalid,
            id,
            inputs,
        } => {
            init_logging(false);
            dump::dump(inputs, *family, *by, *include_invalid, *id)
        }
        Commands::Count {
            family,
            by,
            include_invalid,
            id,
            format,
            inputs,
        } => {
            init_logging(false);
            let inputs = scan::Inputs {
                paths: inputs,
                family: *family,
                id: *id,
            };
            scan::count(&inputs, *by, *include_invalid, *format)
        }
        Commands::Diff {
            family,
            by,
            include_invalid,
            id,
            max_gap,
            format,
            inputs,
        } => {
            init_logging(false);
            let inputs = scan::Inputs {
                paths: inputs,
                family: *family,
                id: *id,
            };
            let max_gap = Duration::milliseconds((max_gap.max(0.0) * 1000.0) as i64);
            scan::diff(&inputs, *by, *include_invalid, max_gap, *format)
        }
        Commands::Sort {
            family,
            by,
            unique,
            clobber,
            output,
            inputs,
        } => {
            init_logging(false);
            sort::sort(inputs, output, *family, *by, *unique, *clobber)
        }
        Commands::Stats { query, format } => query::stats(&setup(query)?, query, format),
        Commands::Gaps { query, format } => query::gaps(&setup(query)?, query, format),
        Commands::Packets { query, format } => query::packets(&setup(query)?, query, format),
        Commands::Download {
            query,
            clobber,
            output,
        } => query::download(&setup(query)?, query, output, *clobber),
    }
}
