//! seisgate CLI
//!
//! Offline inspection of archive day files and the NRT tree.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use seisgate::archive::{ArchiveStore, DayFile, DayFileIndex, LocalArchive, RecordIndex};
use seisgate::merge::parse_time;
use seisgate::{IdentityPattern, NrtCache, Result, StreamIdentity};
use tracing_subscriber::{fmt, EnvFilter};

/// seisgate CLI
#[derive(Parser, Debug)]
#[command(name = "seisgate-cli")]
#[command(about = "Inspect seisgate archive and NRT stores")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the record index of one day file
    Index {
        /// Path to the day file
        file: PathBuf,
    },

    /// Print the byte range served for a window of one day file
    Range {
        /// Archive root
        #[arg(short, long, default_value = "./archive")]
        archive_root: PathBuf,

        /// Stream identity as NET.STA.LOC.CHA
        identity: String,

        /// Day of the file (YYYY-MM-DD)
        date: NaiveDate,

        /// Window start
        start: String,

        /// Window end
        end: String,
    },

    /// List archive day files matching FDSN wildcards
    List {
        /// Archive root
        #[arg(short, long, default_value = "./archive")]
        archive_root: PathBuf,

        #[arg(long, default_value = "*")]
        net: String,
        #[arg(long, default_value = "*")]
        sta: String,
        #[arg(long, default_value = "*")]
        loc: String,
        #[arg(long, default_value = "*")]
        cha: String,

        /// Window start
        start: String,

        /// Window end
        end: String,
    },

    /// List identities present in the NRT tree
    NrtList {
        /// NRT root
        #[arg(short, long, default_value = "./nrt")]
        nrt_root: PathBuf,

        #[arg(long, default_value = "*")]
        net: String,
        #[arg(long, default_value = "*")]
        sta: String,
        #[arg(long, default_value = "*")]
        loc: String,
        #[arg(long, default_value = "*")]
        cha: String,
    },
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args.command).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Index { file } => {
            let data = tokio::fs::read(&file).await?;
            let index = RecordIndex::build(&data)?;
            for entry in index.entries() {
                println!("{:>6}  {}  {}", entry.seq, entry.start, entry.end);
            }
            println!("{} records", index.len());
        }

        Commands::Range {
            archive_root,
            identity,
            date,
            start,
            end,
        } => {
            let index = open_index(archive_root);
            let file = DayFile::new(StreamIdentity::parse(&identity)?, date);
            match index
                .range(&file, parse_time(&start)?, parse_time(&end)?)
                .await?
            {
                Some((from, to)) => println!(
                    "{} [{}, {}) {} bytes, {} records",
                    file,
                    from,
                    to,
                    to - from,
                    (to - from) / seisgate::record::RECORD_LEN as u64
                ),
                None => println!("{} no records in window", file),
            }
        }

        Commands::List {
            archive_root,
            net,
            sta,
            loc,
            cha,
            start,
            end,
        } => {
            let index = open_index(archive_root);
            let pattern = IdentityPattern::from_glob(&net, &sta, &loc, &cha)?;
            let files = index
                .list(&pattern, parse_time(&start)?, parse_time(&end)?)
                .await?;
            for file in &files {
                println!("{}  {}", file, index.store().object_key(file));
            }
            println!("{} day files", files.len());
        }

        Commands::NrtList {
            nrt_root,
            net,
            sta,
            loc,
            cha,
        } => {
            let cache = NrtCache::new(nrt_root, 1, 1);
            cache.refresh().await?;
            let pattern = IdentityPattern::from_glob(&net, &sta, &loc, &cha)?;
            let identities = cache.list(&pattern);
            for identity in &identities {
                println!("{}", identity);
            }
            println!("{} identities", identities.len());
        }
    }
    Ok(())
}

fn open_index(archive_root: PathBuf) -> DayFileIndex {
    DayFileIndex::new(Arc::new(LocalArchive::new(archive_root)), 16, 16)
}
