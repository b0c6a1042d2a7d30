//! exthash Inspect Binary
//!
//! Prints metadata and block fill statistics of snapshots and file-backed
//! indexes without knowing their key/value types.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use exthash::serializer::SNAPSHOT_VERSION;
use exthash::store::{BLOCKS_FILENAME, INDEX_FILENAME};
use exthash::{BlockStore, FileStore, IndexSerializer, SnapshotInfo};
use tracing_subscriber::{fmt, EnvFilter};

/// exthash inspector
#[derive(Parser, Debug)]
#[command(name = "exthash-inspect")]
#[command(about = "Inspect exthash snapshots and data directories")]
#[command(version)]
struct Args {
    /// Read buffer size in bytes
    #[arg(short, long, default_value = "65536")]
    chunk_size: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect a snapshot stream written by IndexSerializer
    Snapshot {
        /// Snapshot file
        path: PathBuf,
    },

    /// Inspect a file-backed index
    Store {
        /// Directory holding the index table and block files
        data_dir: PathBuf,
    },
}

fn main() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,exthash=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut serializer = IndexSerializer::new(args.chunk_size);

    let info = match args.command {
        Commands::Snapshot { path } => inspect_snapshot(&mut serializer, &path),
        Commands::Store { data_dir } => inspect_store(&mut serializer, &data_dir),
    };

    match info {
        Ok(info) => println!("{}", info),
        Err(e) => {
            tracing::error!("Inspection failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn inspect_snapshot(serializer: &mut IndexSerializer, path: &Path) -> exthash::Result<SnapshotInfo> {
    tracing::info!("Reading snapshot {}", path.display());
    let mut reader = BufReader::new(File::open(path)?);
    serializer.read_info(&mut reader)
}

fn inspect_store(serializer: &mut IndexSerializer, data_dir: &Path) -> exthash::Result<SnapshotInfo> {
    tracing::info!("Reading index files in {}", data_dir.display());
    let table = FileStore::open(&data_dir.join(INDEX_FILENAME), false)?;
    let blocks = FileStore::open(&data_dir.join(BLOCKS_FILENAME), false)?;

    if table.is_empty() {
        return Err(exthash::IndexError::Storage(format!(
            "No index table in {}",
            data_dir.display()
        )));
    }

    // Same layout as a snapshot stream once the version tag is prepended
    let version = SNAPSHOT_VERSION.to_le_bytes();
    let mut reader = (&version[..]).chain(table.region()).chain(blocks.region());
    serializer.read_info(&mut reader)
}
