// Tue Jan 13 2026 - Alex

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use vtable_explorer::{
    config::AnalysisConfig,
    hierarchy::HierarchySnapshot,
    memory::load_binary,
    registry::InMemoryRegistry,
    report::{self, HierarchyStatistics},
    session::{AnalysisSession, CancelToken},
    utils::LoggingUtils,
    vtable::OverrideStatus,
};

#[derive(Parser, Debug)]
#[command(author = "Alex")]
#[command(version)]
#[command(about = "Reconstruct C++ class hierarchies from vtables and RTTI", long_about = None)]
struct Cli {
    /// ELF, PE or Mach-O image to analyze
    binary: PathBuf,

    /// JSON file overriding the default scan bounds
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, global = true)]
    no_progress: bool,

    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every class with its vtable summary
    Classes,
    /// Show the valid slots of a class's vtable
    Entries { class: String },
    /// Compare a class's vtable against a base (primary base by default)
    Compare { derived: String, base: Option<String> },
    /// Show ancestors and descendants of a class
    Lineage { class: String },
    /// Comment vtable slots and register their targets as functions
    Annotate { class: Option<String> },
    /// Hierarchy statistics
    Stats,
}

fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    LoggingUtils::init(cli.verbose, !cli.no_color);

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "[!]".red(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let start_time = Instant::now();

    let config = match &cli.config {
        Some(path) => AnalysisConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };

    let binary = load_binary(&cli.binary)
        .with_context(|| format!("Failed to load binary {}", cli.binary.display()))?;

    let registry = Arc::new(InMemoryRegistry::with_functions(binary.function_addresses()));
    let session = AnalysisSession::new(Arc::new(binary.image), Arc::new(binary.symbols))
        .with_registry(registry)
        .with_config(config);

    let snapshot = refresh(&session, cli.no_progress || cli.json)?;
    log::debug!("Analysis took {:.2}s", start_time.elapsed().as_secs_f64());

    match cli.command {
        Command::Classes => print_classes(&snapshot, cli.json),
        Command::Entries { class } => {
            let entries = session.get_entries(&class)?;
            if cli.json {
                println!("{}", report::to_json(&entries, true)?);
            } else {
                println!("{} {} ({} slots)", "[+]".green(), class.cyan().bold(), entries.len());
                for entry in &entries {
                    println!("  {}", report::entry_line(entry));
                }
            }
            Ok(())
        }
        Command::Compare { derived, base } => {
            let comparison = match base {
                Some(base) => session.compare(&derived, &base)?,
                None => session
                    .compare_with_primary_base(&derived)?
                    .with_context(|| format!("{} has no base class", derived))?,
            };
            if cli.json {
                println!("{}", report::to_json(&comparison, true)?);
            } else {
                println!(
                    "{} {} vs {}",
                    "[+]".green(),
                    comparison.derived_class.cyan().bold(),
                    comparison.base_class.cyan()
                );
                let lines = report::comparison_lines(&comparison);
                for (entry, line) in comparison.entries.iter().zip(&lines) {
                    let line = match entry.status {
                        OverrideStatus::Inherited => line.normal(),
                        OverrideStatus::NewVirtual => line.green(),
                        _ => line.yellow(),
                    };
                    println!("  {}", line);
                }
                if let Some(total) = lines.last() {
                    println!("{}", total.bold());
                }
            }
            Ok(())
        }
        Command::Lineage { class } => {
            let ancestors = session.ancestors(&class)?;
            let descendants = session.descendants(&class)?;
            if cli.json {
                let value = serde_json::json!({
                    "class": class,
                    "ancestors": ancestors.iter().collect::<Vec<_>>(),
                    "descendants": descendants.iter().collect::<Vec<_>>(),
                    "lineage": session.lineage(&class)?,
                });
                println!("{}", report::to_json(&value, true)?);
            } else {
                println!("{} {}", "[+]".green(), class.cyan().bold());
                println!("  {} {}", "ancestors:".yellow(), join(ancestors.iter()));
                println!("  {} {}", "descendants:".yellow(), join(descendants.iter()));
            }
            Ok(())
        }
        Command::Annotate { class } => {
            let count = match &class {
                Some(class) => session.annotate(class)?,
                None => session.annotate_all(),
            };
            println!("{} Annotated {} slots", "[+]".green(), count);
            Ok(())
        }
        Command::Stats => {
            let stats = HierarchyStatistics::collect(&snapshot);
            if cli.json {
                println!("{}", report::to_json(&stats, true)?);
            } else {
                println!("{}", "Hierarchy Statistics".cyan().bold());
                println!("{}", "-".repeat(40).cyan());
                for line in stats.lines() {
                    println!("  {}", line);
                }
                if let Some(layout) = session.rtti_config() {
                    println!(
                        "  RTTI layout:          {} {} offset {}",
                        layout.abi, layout.width, layout.rtti_offset
                    );
                }
            }
            Ok(())
        }
    }
}

fn refresh(session: &AnalysisSession, quiet: bool) -> Result<Arc<HierarchySnapshot>> {
    let cancel = CancelToken::new();
    if quiet {
        return Ok(session.refresh_hierarchy_with(&cancel, |_, _| {})?);
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message("Scanning vtables...");

    let snapshot = session.refresh_hierarchy_with(&cancel, |done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    })?;

    pb.finish_with_message(format!("{} classes", snapshot.len()));
    Ok(snapshot)
}

fn print_classes(snapshot: &HierarchySnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", report::to_json(&snapshot.nodes(), true)?);
        return Ok(());
    }

    println!("{}", "Classes".cyan().bold());
    println!("{}", "-".repeat(40).cyan());
    for node in snapshot.nodes() {
        let line = report::summary_line(node);
        if node.is_synthetic {
            println!("  {}", line.dimmed());
        } else {
            println!("  {}", line);
        }
    }
    println!("{} {} classes", "[+]".green(), snapshot.len());
    Ok(())
}

fn join<'a>(names: impl Iterator<Item = &'a String>) -> String {
    let joined: Vec<&str> = names.map(|s| s.as_str()).collect();
    if joined.is_empty() {
        "(none)".to_string()
    } else {
        joined.join(", ")
    }
}
