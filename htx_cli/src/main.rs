use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;

use htx_index::{merge_to, BgzfWriter, TabixIndex};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "htx",
    about = "Block-compress files and inspect or merge tabix indexes",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Block-compress a file into a BGZF stream
    Bgzip {
        /// Source file ("-" reads stdin)
        input: PathBuf,
        /// Destination BGZF file
        output: PathBuf,
    },
    /// Print a tabix index's descriptor, sequences, and bin statistics
    Inspect {
        /// Tabix index to inspect
        index: PathBuf,
        /// Emit machine-readable JSON instead of text
        #[arg(long)]
        json: bool,
        /// Print per-bin chunk details
        #[arg(long)]
        bins: bool,
    },
    /// Merge per-part tabix indexes of a partitioned, concatenated file
    ///
    /// Each part is given as INDEX:LENGTH where LENGTH is the part's
    /// compressed byte count in the concatenated output, or as INDEX:FILE
    /// where FILE is the part's data file (its size is used).
    Merge {
        /// Destination for the merged index
        output: PathBuf,
        /// Part specs in concatenation order
        #[arg(short, long = "part", required = true)]
        parts: Vec<String>,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

/// Parse an INDEX:LENGTH-or-FILE part spec.
fn parse_part(spec: &str) -> anyhow::Result<(PathBuf, u64)> {
    let (index, rest) = spec.rsplit_once(':').with_context(|| {
        format!("part spec '{}' is missing the ':LENGTH' suffix", spec)
    })?;
    let length = match rest.parse::<u64>() {
        Ok(n) => n,
        Err(_) => std::fs::metadata(rest)
            .with_context(|| format!("part spec '{}': '{}' is neither a length nor a file", spec, rest))?
            .len(),
    };
    Ok((PathBuf::from(index), length))
}

// ── Inspect output model ───────────────────────────────────────────────────

#[derive(Serialize)]
struct InspectReport {
    format: i32,
    col_seq: i32,
    col_beg: i32,
    col_end: i32,
    meta_char: String,
    skip_lines: i32,
    sequences: Vec<SequenceReport>,
}

#[derive(Serialize)]
struct SequenceReport {
    name: String,
    bins: usize,
    chunks: usize,
    linear_windows: usize,
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_bgzip(input: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let mut src: Box<dyn Read> = if input.as_os_str() == "-" {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(&input).with_context(|| format!("opening {}", input.display()))?,
        ))
    };

    let sink = File::create(&output).with_context(|| format!("creating {}", output.display()))?;
    let mut writer = BgzfWriter::new(sink);

    let mut raw_total = 0u64;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        raw_total += n as u64;
        writer.write_all(&buf[..n])?;
    }
    writer.finish()?;

    let compressed = std::fs::metadata(&output)?.len();
    eprintln!(
        "{} -> {} ({} -> {})",
        input.display(),
        output.display(),
        human_bytes(raw_total),
        human_bytes(compressed)
    );
    Ok(())
}

fn run_inspect(index_path: PathBuf, json: bool, bins: bool) -> anyhow::Result<()> {
    let file =
        File::open(&index_path).with_context(|| format!("opening {}", index_path.display()))?;
    let index = TabixIndex::read(BufReader::new(file))
        .with_context(|| format!("reading {}", index_path.display()))?;

    let report = InspectReport {
        format: index.header.format,
        col_seq: index.header.col_seq,
        col_beg: index.header.col_beg,
        col_end: index.header.col_end,
        meta_char: (index.header.meta_char as char).to_string(),
        skip_lines: index.header.skip_lines,
        sequences: index
            .names
            .iter()
            .zip(&index.refs)
            .map(|(name, content)| SequenceReport {
                name: name.clone(),
                bins: content.bins.len(),
                chunks: content.bins.values().map(Vec::len).sum(),
                linear_windows: content.linear.len(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("format: {}  columns: seq={} beg={} end={}  meta: '{}'  skip: {}",
        report.format, report.col_seq, report.col_beg, report.col_end,
        report.meta_char, report.skip_lines);
    println!("sequences: {}", report.sequences.len());
    for seq in &report.sequences {
        println!(
            "  {:<20} bins: {:<6} chunks: {:<6} linear windows: {}",
            seq.name, seq.bins, seq.chunks, seq.linear_windows
        );
    }

    if bins {
        for (name, content) in index.names.iter().zip(&index.refs) {
            for (bin, chunks) in &content.bins {
                for chunk in chunks {
                    println!(
                        "  {} bin {:<6} chunk {}..{}",
                        name, bin, chunk.begin, chunk.end
                    );
                }
            }
        }
    }
    Ok(())
}

fn run_merge(output: PathBuf, part_specs: Vec<String>) -> anyhow::Result<()> {
    let mut parts = Vec::with_capacity(part_specs.len());
    let mut lengths = Vec::with_capacity(part_specs.len());
    for spec in &part_specs {
        let (index_path, length) = parse_part(spec)?;
        let file = File::open(&index_path)
            .with_context(|| format!("opening {}", index_path.display()))?;
        parts.push(
            TabixIndex::read(BufReader::new(file))
                .with_context(|| format!("reading {}", index_path.display()))?,
        );
        lengths.push(length);
    }

    let sink = File::create(&output).with_context(|| format!("creating {}", output.display()))?;
    let mut sink = merge_to(&parts, &lengths, sink)?;
    sink.flush()?;
    eprintln!(
        "merged {} parts into {}",
        parts.len(),
        output.display()
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Bgzip { input, output } => run_bgzip(input, output),
        Commands::Inspect { index, json, bins } => run_inspect(index, json, bins),
        Commands::Merge { output, parts } => run_merge(output, parts),
    }
}
