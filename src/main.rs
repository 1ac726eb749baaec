//! machpatch - rewrites source-path prefixes in Mach-O debug information.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use machpatch::{patch_file, PatchSettings, PrefixMap};

/// Exit code for malformed invocations, distinct from patching failures.
const USAGE_ERROR: u8 = 127;

/// Rewrites source-path prefixes in Mach-O debug information.
#[derive(Parser, Debug)]
#[command(name = "machpatch")]
#[command(author, version, long_about = None)]
#[command(about = "Replaces path prefixes inside LLVM coverage maps and DWARF debug info")]
#[command(
    override_usage = "machpatch <options> <file>... <old_prefix> <new_prefix>\n       \
                      machpatch <options> -m <map_file> <file>..."
)]
struct Cli {
    /// Print progress while parsing and patching
    #[arg(short, long)]
    verbose: bool,

    /// Patch paths in LLVM coverage maps
    #[arg(short, long)]
    covmap: bool,

    /// Patch paths in DWARF strings, line info, and string references
    #[arg(short, long)]
    dwarf: bool,

    /// Read sed-style prefix rewrites from FILE (one per line, first
    /// character selects the separator)
    #[arg(short = 'm', long = "prefix-map", value_name = "FILE")]
    prefix_map: Option<PathBuf>,

    /// Files to patch, followed by <old_prefix> <new_prefix> unless
    /// --prefix-map is given
    #[arg(required = true, value_name = "ARG")]
    args: Vec<String>,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version print to stdout and are not errors.
            let code = if err.use_stderr() { USAGE_ERROR } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    // At least one mode flag is required.
    if !cli.verbose && !cli.covmap && !cli.dwarf {
        eprintln!("error: at least one of --verbose, --covmap, or --dwarf is required");
        return ExitCode::from(USAGE_ERROR);
    }

    setup_logging(cli.verbose);

    let (files, prefix_map) = match &cli.prefix_map {
        Some(map_path) => match PrefixMap::from_map_file(map_path) {
            Ok(map) => (cli.args.clone(), map),
            Err(message) => {
                eprintln!("error: {message}");
                return ExitCode::from(USAGE_ERROR);
            }
        },
        None => {
            if cli.args.len() < 3 {
                eprintln!("error: expected <file>... <old_prefix> <new_prefix>");
                return ExitCode::from(USAGE_ERROR);
            }
            let split = cli.args.len() - 2;
            let map = PrefixMap::from_pair(&cli.args[split], &cli.args[split + 1]);
            (cli.args[..split].to_vec(), map)
        }
    };

    let settings = PatchSettings {
        patch_coverage_maps: cli.covmap,
        patch_dwarf: cli.dwarf,
        prefix_map,
    };

    for file in &files {
        if let Err(err) = patch_file(Path::new(file), &settings) {
            error!("{file}: {err}");
            return ExitCode::from(err.exit_code());
        }
    }

    info!("patching completed successfully");
    ExitCode::SUCCESS
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .finish();

    tracing::subscriber::set_global_default(subscriber).ok();
}
