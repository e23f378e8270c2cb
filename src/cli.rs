//! Command-line argument parsing for cappy.
//!
//! Hand-rolled rather than a derive-macro parser, matching the flag-walking
//! style the rest of the ambient CLI stack uses: each command gets its own
//! `parse_*_args` function walking `--flag value` pairs, dispatched from
//! [`parse_args`] on `argv[1]`.

use std::path::PathBuf;

use anyhow::Result;

use crate::output::OutputFormat;
use crate::retrieval::SearchMode;

#[derive(Debug, Clone)]
pub enum Command {
    Scan {
        root: PathBuf,
        config: Option<PathBuf>,
        output_format: OutputFormat,
    },
    Watch {
        root: PathBuf,
        config: Option<PathBuf>,
        scan_initial: bool,
        output_format: OutputFormat,
    },
    Search {
        root: PathBuf,
        config: Option<PathBuf>,
        query: String,
        mode: SearchMode,
        k: Option<usize>,
        depth: Option<usize>,
        output_format: OutputFormat,
    },
    Status {
        root: PathBuf,
        config: Option<PathBuf>,
        output_format: OutputFormat,
    },
}

pub fn print_usage() {
    eprintln!("cappy - incremental code-knowledge indexer");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  cappy <command> [arguments]");
    eprintln!("  cappy --help");
    eprintln!();
    eprintln!("  cappy scan <ROOT> [--config <FILE>] [--format human|json]");
    eprintln!("  cappy watch <ROOT> [--config <FILE>] [--no-scan-initial] [--format human|json]");
    eprintln!("  cappy search <ROOT> --query <TEXT> [--mode local|global|hybrid|mix] [--k <N>] [--depth <N>] [--config <FILE>] [--format human|json]");
    eprintln!("  cappy status <ROOT> [--config <FILE>] [--format human|json]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  scan     One-shot index of every eligible file under ROOT");
    eprintln!("  watch    Index ROOT, then keep indexing as files change until interrupted");
    eprintln!("  search   Run a retrieval query against an already-indexed ROOT");
    eprintln!("  status   Show queue and graph counts for ROOT");
    eprintln!();
    eprintln!("Global arguments:");
    eprintln!("  --format <FORMAT>   Output format: human (default) or json");
    eprintln!("  --config <FILE>     Explicit config file path (default: ROOT/cappy.toml, or $CAPPY_CONFIG)");
}

fn parse_required_arg(args: &[String], i: &mut usize, flag: &str) -> Result<String> {
    if *i + 1 >= args.len() {
        return Err(anyhow::anyhow!("{flag} requires an argument"));
    }
    let value = args[*i + 1].clone();
    *i += 2;
    Ok(value)
}

fn parse_optional_flag_value(args: &[String], i: &mut usize, flag: &str) -> Result<Option<String>> {
    Ok(Some(parse_required_arg(args, i, flag)?))
}

fn parse_output_format(value: &str) -> Result<OutputFormat> {
    OutputFormat::parse(value).ok_or_else(|| anyhow::anyhow!("invalid --format: {value} (expected human or json)"))
}

fn parse_search_mode(value: &str) -> Result<SearchMode> {
    SearchMode::parse(value).ok_or_else(|| anyhow::anyhow!("invalid --mode: {value} (expected local, global, hybrid, or mix)"))
}

/// Parse `scan <ROOT> [--config FILE] [--format FORMAT]`.
fn parse_scan_args(args: &[String]) -> Result<Command> {
    let mut root: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut output_format = OutputFormat::Human;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => config = parse_optional_flag_value(args, &mut i, "--config")?.map(PathBuf::from),
            "--format" => output_format = parse_output_format(&parse_required_arg(args, &mut i, "--format")?)?,
            value if root.is_none() && !value.starts_with("--") => {
                root = Some(PathBuf::from(value));
                i += 1;
            }
            other => return Err(anyhow::anyhow!("unknown argument: {other}")),
        }
    }

    let root = root.ok_or_else(|| anyhow::anyhow!("scan requires a workspace root argument"))?;
    Ok(Command::Scan { root, config, output_format })
}

/// Parse `watch <ROOT> [--config FILE] [--no-scan-initial] [--format FORMAT]`.
fn parse_watch_args(args: &[String]) -> Result<Command> {
    let mut root: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut scan_initial = true;
    let mut output_format = OutputFormat::Human;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => config = parse_optional_flag_value(args, &mut i, "--config")?.map(PathBuf::from),
            "--format" => output_format = parse_output_format(&parse_required_arg(args, &mut i, "--format")?)?,
            "--no-scan-initial" => {
                scan_initial = false;
                i += 1;
            }
            value if root.is_none() && !value.starts_with("--") => {
                root = Some(PathBuf::from(value));
                i += 1;
            }
            other => return Err(anyhow::anyhow!("unknown argument: {other}")),
        }
    }

    let root = root.ok_or_else(|| anyhow::anyhow!("watch requires a workspace root argument"))?;
    Ok(Command::Watch { root, config, scan_initial, output_format })
}

/// Parse `search <ROOT> --query TEXT [--mode MODE] [--k N] [--depth N] [--config FILE] [--format FORMAT]`.
fn parse_search_args(args: &[String]) -> Result<Command> {
    let mut root: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut query: Option<String> = None;
    let mut mode = SearchMode::Hybrid;
    let mut k: Option<usize> = None;
    let mut depth: Option<usize> = None;
    let mut output_format = OutputFormat::Human;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => config = parse_optional_flag_value(args, &mut i, "--config")?.map(PathBuf::from),
            "--query" => query = Some(parse_required_arg(args, &mut i, "--query")?),
            "--mode" => mode = parse_search_mode(&parse_required_arg(args, &mut i, "--mode")?)?,
            "--k" => {
                let value = parse_required_arg(args, &mut i, "--k")?;
                k = Some(value.parse().map_err(|e| anyhow::anyhow!("invalid --k: {e}"))?);
            }
            "--depth" => {
                let value = parse_required_arg(args, &mut i, "--depth")?;
                depth = Some(value.parse().map_err(|e| anyhow::anyhow!("invalid --depth: {e}"))?);
            }
            "--format" => output_format = parse_output_format(&parse_required_arg(args, &mut i, "--format")?)?,
            value if root.is_none() && !value.starts_with("--") => {
                root = Some(PathBuf::from(value));
                i += 1;
            }
            other => return Err(anyhow::anyhow!("unknown argument: {other}")),
        }
    }

    let root = root.ok_or_else(|| anyhow::anyhow!("search requires a workspace root argument"))?;
    let query = query.ok_or_else(|| anyhow::anyhow!("--query is required"))?;
    Ok(Command::Search { root, config, query, mode, k, depth, output_format })
}

/// Parse `status <ROOT> [--config FILE] [--format FORMAT]`.
fn parse_status_args(args: &[String]) -> Result<Command> {
    let mut root: Option<PathBuf> = None;
    let mut config: Option<PathBuf> = None;
    let mut output_format = OutputFormat::Human;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => config = parse_optional_flag_value(args, &mut i, "--config")?.map(PathBuf::from),
            "--format" => output_format = parse_output_format(&parse_required_arg(args, &mut i, "--format")?)?,
            value if root.is_none() && !value.starts_with("--") => {
                root = Some(PathBuf::from(value));
                i += 1;
            }
            other => return Err(anyhow::anyhow!("unknown argument: {other}")),
        }
    }

    let root = root.ok_or_else(|| anyhow::anyhow!("status requires a workspace root argument"))?;
    Ok(Command::Status { root, config, output_format })
}

/// Parse `std::env::args()` into a [`Command`]. Handles `--version`/`--help`
/// by printing and exiting before dispatching to a per-command parser.
pub fn parse_args_impl<F>(print_version: F) -> Result<Command>
where
    F: FnOnce(),
{
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        return Err(anyhow::anyhow!("missing command"));
    }

    let command = &args[1];

    if command == "--version" || command == "-V" {
        print_version();
        std::process::exit(0);
    }

    if command == "--help" || command == "-h" {
        print_usage();
        std::process::exit(0);
    }

    match command.as_str() {
        "scan" => parse_scan_args(&args[2..]),
        "watch" => parse_watch_args(&args[2..]),
        "search" => parse_search_args(&args[2..]),
        "status" => parse_status_args(&args[2..]),
        other => Err(anyhow::anyhow!("unknown command: {other}")),
    }
}

pub fn parse_args() -> Result<Command> {
    parse_args_impl(|| println!("cappy {}", env!("CARGO_PKG_VERSION")))
}
