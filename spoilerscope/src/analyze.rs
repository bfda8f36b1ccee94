//! spoilerscope-analyze - CLI tool to find premature reveals in alternate openings
//!
//! Extracts reveals from a manuscript, builds the reveal dependency graph and
//! reports every spoiler each candidate opening would cause.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use spoilerscope_core::{
    AnalysisOptions, AnalysisPipeline, CandidateReport, Config, Manuscript, OpeningCandidate,
    RevealDependencyGraph, RevealGraphEntry, StaticSuggester, Verdict,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "spoilerscope-analyze")]
#[command(about = "Find premature reveals in alternate openings")]
#[command(version)]
struct Args {
    /// Manuscript JSON file with scenes and candidate openings
    #[arg(short, long)]
    manuscript: PathBuf,

    /// Candidate ID to analyze (partial match supported)
    /// If not provided, analyzes all candidates
    #[arg(short, long)]
    candidate: Option<String>,

    /// Ad-hoc opening: comma-separated scene IDs read first
    #[arg(long, value_delimiter = ',', conflicts_with = "candidate")]
    opening: Vec<String>,

    /// Skip dependency inference (every reveal depends on all earlier ones)
    #[arg(long)]
    fast: bool,

    /// JSON file of dependency suggestions applied over the inferred graph
    #[arg(short, long)]
    dependencies: Option<PathBuf>,

    /// Include the dependency graph in the output
    #[arg(long)]
    graph: bool,

    /// Output format: text (default) or json
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Verbose output (show fixes and missing prerequisites)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    reports: &'a [CandidateReport],
    #[serde(skip_serializing_if = "Option::is_none")]
    graph: Option<Vec<RevealGraphEntry>>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging
    let _log_guard = spoilerscope_core::logging::init(&config.logging)
        .context("failed to initialize logging")?;

    let json = match args.format.as_str() {
        "json" => true,
        "text" => false,
        other => anyhow::bail!("Unknown format '{}' (expected text or json)", other),
    };

    let manuscript = Manuscript::load(&args.manuscript)
        .with_context(|| format!("failed to load manuscript {}", args.manuscript.display()))?;

    let candidates = select_candidates(&manuscript, &args)?;
    if candidates.is_empty() {
        println!("No candidate openings found in manuscript.");
        println!("Add a 'candidates' list or pass --opening.");
        return Ok(());
    }

    let mut options = AnalysisOptions::from_config(&config);
    options.fast_mode |= args.fast;
    let mut pipeline = AnalysisPipeline::new(options);

    if !json {
        println!(
            "Analyzing {} candidate(s) over {} scene(s)...\n",
            candidates.len(),
            manuscript.scenes.len()
        );
    }

    let pb = if json {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(manuscript.scenes.len() as u64)
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );
    pb.set_message("extracting reveals");

    let reveals = pipeline
        .extract_all_with_progress(&manuscript.scenes, |done, total| {
            pb.set_length(total as u64);
            pb.set_position(done as u64);
        })
        .context("reveal extraction failed")?;
    pb.finish_and_clear();

    let graph = match &args.dependencies {
        Some(path) => {
            let suggester = StaticSuggester::from_file(path).with_context(|| {
                format!("failed to load dependency suggestions {}", path.display())
            })?;
            tracing::info!(
                suggestions = suggester.len(),
                path = %path.display(),
                "Applying dependency suggestions"
            );
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("failed to start async runtime")?;
            runtime.block_on(pipeline.graph_enriched(&reveals, &suggester))
        }
        None => pipeline.graph(&reveals),
    };

    let reports = pipeline.evaluate(&candidates, &manuscript.scenes, &graph);

    if json {
        let output = JsonOutput {
            reports: &reports,
            graph: args.graph.then(|| graph.materialize()),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if args.graph {
        print_graph(&graph);
    }

    for (candidate, report) in candidates.iter().zip(&reports) {
        print_report(candidate, report, &graph, args.verbose);
    }

    let count = |verdict: Verdict| {
        reports
            .iter()
            .filter(|r| r.summary.verdict == verdict)
            .count()
    };
    println!("---");
    println!(
        "Analyzed {} candidate(s) against {} reveal(s): {} accept, {} revise, {} reject",
        reports.len(),
        graph.len(),
        count(Verdict::Accept),
        count(Verdict::Revise),
        count(Verdict::Reject)
    );

    Ok(())
}

/// Resolve `--opening` / `--candidate` into the candidates to analyze.
fn select_candidates(manuscript: &Manuscript, args: &Args) -> Result<Vec<OpeningCandidate>> {
    if !args.opening.is_empty() {
        let ids: Vec<&str> = args.opening.iter().map(String::as_str).collect();
        return Ok(vec![OpeningCandidate::new("ad-hoc", &ids)]);
    }

    let Some(ref wanted) = args.candidate else {
        return Ok(manuscript.candidates.clone());
    };

    // Try exact match first
    if let Some(candidate) = manuscript.candidate(wanted) {
        return Ok(vec![candidate.clone()]);
    }

    let matches: Vec<OpeningCandidate> = manuscript
        .candidates
        .iter()
        .filter(|c| c.id.contains(wanted.as_str()))
        .cloned()
        .collect();
    if matches.is_empty() {
        anyhow::bail!("No candidate found matching '{}'", wanted);
    }
    Ok(matches)
}

fn print_graph(graph: &RevealDependencyGraph) {
    println!("Dependency graph: {} reveal(s)", graph.len());
    for entry in graph.entries() {
        println!(
            "  [{}] {} {:<12} {:<8} {}",
            entry.chronological_index,
            short_id(&entry.id),
            entry.reveal_type.as_str(),
            entry.first_exposure_scene_id,
            entry.description
        );
        for prerequisite in &entry.prerequisites {
            let description = graph
                .entry(prerequisite)
                .map(|p| p.description.as_str())
                .unwrap_or("?");
            println!("        <- {} {}", short_id(prerequisite), description);
        }
    }
    if !graph.broken_edges().is_empty() {
        println!("  Broken cycle edges:");
        for edge in graph.broken_edges() {
            println!(
                "    {} -/-> {}",
                short_id(&edge.dependent),
                short_id(&edge.prerequisite)
            );
        }
    }
    println!();
}

fn print_report(
    candidate: &OpeningCandidate,
    report: &CandidateReport,
    graph: &RevealDependencyGraph,
    verbose: bool,
) {
    let summary = &report.summary;
    let analysis = &report.analysis;

    println!(
        "Candidate: {} [{}]",
        candidate.id,
        candidate.scene_ids.join(", ")
    );
    println!(
        "  Verdict: {}  spoilers: {}  score: {}  edit burden: {:.1}%  confidence: {:.2}",
        summary.verdict.as_str().to_uppercase(),
        summary.spoiler_count,
        analysis.total_severity_score,
        summary.edit_burden_percent,
        summary.confidence
    );
    println!("  {}", summary.rationale);

    for violation in &analysis.violations {
        println!(
            "    {:<8} {:<8} {}",
            violation.severity.as_str(),
            violation.mentioned_in.scene_id,
            violation.reveal_description
        );
        if !verbose {
            continue;
        }

        let fix = &violation.fix;
        println!(
            "             fix: {} \"{}\" -> \"{}\" at {}+{}",
            fix.fix_type.as_str(),
            fix.original,
            fix.suggested,
            fix.anchor.offset,
            fix.anchor.length
        );
        println!("             reason: {}", fix.reason);
        println!(
            "             introduce in: {}",
            violation.should_reveal_at.scene_id
        );
        for missing in &violation.missing_prerequisites {
            let description = graph
                .entry(missing)
                .map(|p| p.description.as_str())
                .unwrap_or("?");
            println!("             missing: {}", description);
        }
        if !violation.spoiled_dependents.is_empty() {
            println!(
                "             spoils {} later reveal(s)",
                violation.spoiled_dependents.len()
            );
        }
    }
    println!();
}

fn short_id(id: &str) -> &str {
    id.get(..11).unwrap_or(id)
}
