use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tinyprof::{
    check_descriptor, discover, scan_loops, CompilationDatabase, Config, DescriptorError,
    Dialect, InstrumentError, Instrumenter, LocationTable, Mode, SourceUnit,
};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "tinyprof")]
#[command(about = "Insert rdtsc loop timers into C and C++ sources", long_about = None)]
#[command(version)]
struct Cli {
    /// Trace every match and insertion to stderr
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Instrument sources in place
    Instrument {
        /// Loop descriptor (defaults to ./locs)
        #[arg(short, long)]
        locs: Option<PathBuf>,

        /// Number every loop in main in traversal order instead of reading a descriptor
        #[arg(long)]
        sequential: bool,

        /// Build directory holding compile_commands.json
        #[arg(short = 'p', long)]
        build_dir: Option<PathBuf>,

        /// Config file (defaults to ./tinyprof.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dry run - print the insertions without modifying files
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Show unified diff of changes
        #[arg(short, long)]
        diff: bool,

        /// Source files or directories
        sources: Vec<PathBuf>,

        /// Compiler arguments, accepted and ignored
        #[arg(last = true)]
        compiler_args: Vec<String>,
    },

    /// Print a descriptor skeleton listing every top-level loop
    Loops {
        /// Source files or directories
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },

    /// Report descriptor records that match no loop
    Check {
        /// Loop descriptor (defaults to ./locs)
        #[arg(short, long)]
        locs: Option<PathBuf>,

        /// Config file (defaults to ./tinyprof.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Source files or directories
        #[arg(required = true)]
        sources: Vec<PathBuf>,
    },
}

/// Initialize tracing subscriber on stderr
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Instrument {
            locs,
            sequential,
            build_dir,
            config,
            dry_run,
            diff,
            sources,
            compiler_args,
        } => cmd_instrument(InstrumentArgs {
            locs,
            sequential,
            build_dir,
            config,
            dry_run,
            diff,
            sources,
            compiler_args,
        }),

        Commands::Loops { sources } => cmd_loops(&sources),

        Commands::Check {
            locs,
            config,
            sources,
        } => cmd_check(locs, config, &sources),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            exit_code_for(&err)
        }
    }
}

/// Descriptor problems exit with 2 so scripts can tell them apart.
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    let descriptor = err.chain().any(|cause| {
        cause.is::<DescriptorError>()
            || matches!(
                cause.downcast_ref::<InstrumentError>(),
                Some(InstrumentError::Descriptor(_))
            )
    });

    if descriptor {
        ExitCode::from(2)
    } else {
        ExitCode::FAILURE
    }
}

struct InstrumentArgs {
    locs: Option<PathBuf>,
    sequential: bool,
    build_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    dry_run: bool,
    diff: bool,
    sources: Vec<PathBuf>,
    compiler_args: Vec<String>,
}

/// Load the config file and apply command-line overrides.
fn resolve_config(
    explicit: Option<&Path>,
    locs: Option<PathBuf>,
    sequential: bool,
) -> Result<Config> {
    let mut config = discover(explicit, &env::current_dir()?)?;

    if let Some(locs) = locs {
        config.instrument.descriptor = locs;
    }
    if sequential {
        config.instrument.mode = Mode::Sequential;
    }

    config.validate()?;
    Ok(config)
}

/// Expand directories into the C/C++ sources below them.
fn collect_sources(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(path) {
            let entry = entry?;
            if entry.file_type().is_file() && Dialect::is_source_file(entry.path()) {
                found.push(entry.path().to_path_buf());
            }
        }
        found.sort();
        files.extend(found);
    }

    Ok(files)
}

fn load_units(paths: &[PathBuf]) -> Result<Vec<SourceUnit>> {
    let mut units = Vec::with_capacity(paths.len());
    for path in paths {
        units.push(SourceUnit::load(path)?);
    }
    Ok(units)
}

/// Helper: Show unified diff between original and instrumented content
fn display_diff(file: &Path, original: &str, modified: &str) {
    println!(
        "\n{}",
        format!("--- {} (original)", file.display()).dimmed()
    );
    println!(
        "{}",
        format!("+++ {} (instrumented)", file.display()).dimmed()
    );

    let diff = TextDiff::from_lines(original, modified);

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => format!("-{}", change).red(),
            ChangeTag::Insert => format!("+{}", change).green(),
            ChangeTag::Equal => format!(" {}", change).normal(),
        };
        print!("{}", sign);
    }
}

fn cmd_instrument(args: InstrumentArgs) -> Result<ExitCode> {
    let config = resolve_config(args.config.as_deref(), args.locs, args.sequential)?;

    if !args.compiler_args.is_empty() {
        tracing::debug!(args = ?args.compiler_args, "ignoring compiler arguments");
    }

    let mut paths = collect_sources(&args.sources)?;
    if paths.is_empty() {
        if let Some(build_dir) = &args.build_dir {
            paths = CompilationDatabase::load(build_dir)?.source_files(&env::current_dir()?);
        }
    }
    if paths.is_empty() {
        anyhow::bail!("no source files given");
    }

    // The descriptor is read before any source, so a missing one aborts
    // without touching anything.
    let instrumenter = Instrumenter::new(config.instrument, None)?;
    let units = load_units(&paths)?;
    let report = instrumenter.instrument(&units)?;

    println!("{}", "Replacements collected:".bold());
    for line in report.serialize() {
        println!("{line}");
    }

    for position in &report.skipped_loops {
        println!(
            "{} {}:{}: not in descriptor, left alone",
            "⊘".cyan(),
            position.file.display(),
            position.line
        );
    }

    if args.diff {
        for unit in &units {
            if let Some(edited) = report.outputs.get(&unit.path) {
                display_diff(&unit.path, &unit.source, edited);
            }
        }
    }

    println!();
    if args.dry_run {
        println!("{}", "[DRY RUN - no files written]".cyan());
    } else {
        for file in report.write_back()? {
            println!("{} {}", "✓".green(), file.display());
        }
    }

    println!("{}", "Summary:".bold());
    println!(
        "  {} loops instrumented",
        format!("{}", report.instrumented_loops.len()).green()
    );
    println!(
        "  {} loops skipped",
        format!("{}", report.skipped_loops.len()).cyan()
    );
    println!("  {} counter slots", report.loop_count);

    Ok(ExitCode::SUCCESS)
}

fn cmd_loops(sources: &[PathBuf]) -> Result<ExitCode> {
    let units = load_units(&collect_sources(sources)?)?;

    for position in scan_loops(&units)? {
        println!("{} {}", position.file.display(), position.line);
    }

    Ok(ExitCode::SUCCESS)
}

fn cmd_check(
    locs: Option<PathBuf>,
    config: Option<PathBuf>,
    sources: &[PathBuf],
) -> Result<ExitCode> {
    let config = resolve_config(config.as_deref(), locs, false)?;
    let table = LocationTable::load(&config.instrument.descriptor)?;
    let units = load_units(&collect_sources(sources)?)?;

    let stale = check_descriptor(&table, &units)?;
    if stale.is_empty() {
        println!(
            "{} all {} descriptor records match a loop",
            "✓".green(),
            table.count()
        );
        return Ok(ExitCode::SUCCESS);
    }

    for record in &stale {
        let lines: Vec<String> = record.lines.iter().map(ToString::to_string).collect();
        eprintln!(
            "{} record {} ({} {}): no top-level loop starts there",
            "✗".red(),
            record.id,
            record.file,
            lines.join(" ")
        );
    }
    eprintln!(
        "{}",
        format!("{} of {} records are stale", stale.len(), table.count()).yellow()
    );

    Ok(ExitCode::FAILURE)
}
