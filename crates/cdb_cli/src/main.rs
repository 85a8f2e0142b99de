use anyhow::{Context, Result};
use cdb_core::{build, ConstantDatabase};
use clap::{Parser, Subcommand};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cdbmake;

/// Exit status of `get` when the key is absent.
const EXIT_NOT_FOUND: i32 = 100;

#[derive(Parser)]
#[command(name = "cdb", about = "Constant database tool: build, query, dump")]
struct Cli {
    /// Debug logging on stderr (RUST_LOG overrides)
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Build a database from cdbmake-format records
    Make {
        #[arg(long)]
        out: PathBuf,
        /// Input file; stdin when omitted
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Look up a key; exits with 100 when it is absent
    Get {
        #[arg(long)]
        db: PathBuf,
        key: String,
        /// Key is hex encoded; values are printed as hex lines
        #[arg(long, default_value_t = false)]
        hex: bool,
        /// Print every value stored under the key, one per line
        #[arg(long, default_value_t = false)]
        all: bool,
    },

    /// Write every record in cdbmake format
    Dump {
        #[arg(long)]
        db: PathBuf,
    },

    /// Slot occupancy and probe distances
    Stats {
        #[arg(long)]
        db: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Check every slot and record against the index
    Verify {
        #[arg(long)]
        db: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn open_db(path: &Path) -> Result<ConstantDatabase> {
    ConstantDatabase::open(path).with_context(|| format!("open {}", path.display()))
}

fn read_input(input: Option<&Path>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    match input {
        Some(p) => {
            std::fs::File::open(p)
                .with_context(|| format!("open {}", p.display()))?
                .read_to_end(&mut buf)?;
        }
        None => {
            io::stdin().lock().read_to_end(&mut buf)?;
        }
    }
    Ok(buf)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.cmd {
        Cmd::Make { out, input } => {
            let raw = read_input(input.as_deref())?;
            let records = cdbmake::parse(&raw).context("parse cdbmake input")?;
            debug!(records = records.len(), bytes = raw.len(), "parsed cdbmake input");
            let stats = build(&out, records.iter().map(|(k, v)| (k, v))).with_context(|| format!("build {}", out.display()))?;
            println!(
                "make: {} records, {} bytes -> {}",
                stats.records,
                stats.file_len,
                out.display()
            );
        }
        Cmd::Get { db, key, hex, all } => {
            let key = if hex { ::hex::decode(&key).context("decode hex key")? } else { key.into_bytes() };
            let db = open_db(&db)?;
            let values = if all {
                db.get_all(&key)?
            } else {
                db.get(&key)?.into_iter().collect()
            };
            if values.is_empty() {
                std::process::exit(EXIT_NOT_FOUND);
            }
            let stdout = io::stdout();
            let mut w = stdout.lock();
            for v in &values {
                if hex {
                    writeln!(w, "{}", ::hex::encode(v))?;
                } else {
                    w.write_all(v)?;
                    if all {
                        w.write_all(b"\n")?;
                    }
                }
            }
            w.flush()?;
        }
        Cmd::Dump { db } => {
            let db = open_db(&db)?;
            let mut w = BufWriter::new(io::stdout().lock());
            for rec in db.iter() {
                let rec = rec?;
                cdbmake::write_record(&mut w, &rec.key, &rec.value)?;
            }
            cdbmake::write_end(&mut w)?;
            w.flush()?;
        }
        Cmd::Stats { db, json } => {
            let db = open_db(&db)?;
            let s = db.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&s)?);
            } else {
                println!("records : {}", s.records);
                println!("size    : {} bytes", s.file_len);
                println!("buckets : {} used / 256, largest {}", s.buckets_used, s.max_bucket_len);
                let last = s.probe_distances.len() - 1;
                for (d, n) in s.probe_distances.iter().enumerate() {
                    let label = if d == last { format!("{d}+") } else { d.to_string() };
                    println!("probe {label:>3}: {n}");
                }
            }
        }
        Cmd::Verify { db } => {
            let handle = open_db(&db)?;
            let s = handle
                .verify()
                .with_context(|| format!("verify {}", db.display()))?;
            println!("verify: ok, records={} buckets={}", s.records, s.buckets_used);
        }
    }
    Ok(())
}
