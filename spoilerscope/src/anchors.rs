//! spoilerscope-anchors - capture and relocate text anchors across edits
//!
//! `capture` records a span of a manuscript file as a snapshot; `resolve`
//! finds every stored snapshot again in an edited version of the text.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spoilerscope_core::{AnchorResolver, Config, ResolutionReport, ResolveOptions, SceneSnap};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "spoilerscope-anchors")]
#[command(about = "Capture and relocate text anchors across manuscript edits")]
#[command(version)]
struct Args {
    /// Bytes searched around a stale offset (default: from config)
    #[arg(long, global = true)]
    corridor: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Snapshot a span of a text file
    Capture {
        /// Manuscript text file
        #[arg(short, long)]
        text: PathBuf,

        /// Anchor identifier
        #[arg(long)]
        id: String,

        /// Byte offset of the span
        #[arg(long)]
        offset: usize,

        /// Byte length of the span
        #[arg(long)]
        length: usize,

        /// Snapshot file to update (JSON array); prints the snapshot if omitted
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Relocate stored snapshots in an edited text file
    Resolve {
        /// Snapshot file (JSON array)
        #[arg(short, long)]
        snapshots: PathBuf,

        /// Edited manuscript text file
        #[arg(short, long)]
        text: PathBuf,

        /// Output format: text (default) or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = spoilerscope_core::logging::init(&config.logging)
        .context("failed to initialize logging")?;

    match args.command {
        Command::Capture {
            text,
            id,
            offset,
            length,
            out,
        } => cmd_capture(&text, &id, offset, length, out.as_deref()),
        Command::Resolve {
            snapshots,
            text,
            format,
        } => {
            let corridor = args.corridor.unwrap_or(config.resolver.corridor);
            if corridor == 0 {
                anyhow::bail!("--corridor must be greater than 0");
            }
            let resolver = AnchorResolver::new(ResolveOptions { corridor });
            cmd_resolve(&resolver, &snapshots, &text, &format)
        }
    }
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn load_snapshots(path: &Path) -> Result<Vec<SceneSnap>> {
    let content = read_text(path)?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse snapshots {}", path.display()))
}

fn cmd_capture(
    text_path: &Path,
    id: &str,
    offset: usize,
    length: usize,
    out: Option<&Path>,
) -> Result<()> {
    let text = read_text(text_path)?;
    let Some(snap) = SceneSnap::capture(id, &text, offset, length) else {
        anyhow::bail!(
            "span {}..{} is outside {} or splits a character",
            offset,
            offset.saturating_add(length),
            text_path.display()
        );
    };

    let Some(out) = out else {
        println!("{}", serde_json::to_string_pretty(&snap)?);
        return Ok(());
    };

    let mut snaps = if out.exists() {
        load_snapshots(out)?
    } else {
        Vec::new()
    };
    // Re-capturing an id replaces the old snapshot
    match snaps.iter_mut().find(|s| s.id == snap.id) {
        Some(existing) => *existing = snap,
        None => snaps.push(snap),
    }

    fs::write(out, serde_json::to_string_pretty(&snaps)?)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("Captured '{}' ({} snapshot(s) in {})", id, snaps.len(), out.display());
    Ok(())
}

fn cmd_resolve(
    resolver: &AnchorResolver,
    snapshots_path: &Path,
    text_path: &Path,
    format: &str,
) -> Result<()> {
    let snaps = load_snapshots(snapshots_path)?;
    let text = read_text(text_path)?;
    let report = resolver.resolve_batch(&snaps, &text);

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "text" => print_report(&report),
        other => anyhow::bail!("Unknown format '{}' (expected text or json)", other),
    }
    Ok(())
}

fn print_report(report: &ResolutionReport) {
    println!(
        "{:<24} {:>4} {:>10} {:>10}",
        "ANCHOR", "TIER", "CONFIDENCE", "POSITION"
    );
    for outcome in &report.outcomes {
        match &outcome.result {
            Some(r) => println!(
                "{:<24} {:>4} {:>10.2} {:>10}",
                outcome.id,
                r.tier.number(),
                r.confidence,
                r.position
            ),
            None => println!("{:<24} {:>4} {:>10} {:>10}", outcome.id, "-", "-", "-"),
        }
    }

    println!("\n---");
    println!(
        "Resolved {}/{} anchor(s), {:.0}% at tier 1-2",
        report.resolved_count(),
        report.outcomes.len(),
        report.cheap_tier_ratio() * 100.0
    );

    let unresolved = report.unresolved_ids();
    if !unresolved.is_empty() {
        println!("Needs manual review: {}", unresolved.join(", "));
    }
}
