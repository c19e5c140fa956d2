use std::ffi::OsString;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, CommandFactory, Parser};
use fastdl::{Gmad, PipelineBuilder, RetryPolicy, RunReport, UnitReport};
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use path_slash::PathExt;

/// Extract every addon archive below a directory with gmad and merge them into one FastDL folder.
///
/// Run without arguments for interactive mode.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory containing the archives, searched recursively. Also accepted as -dir=<DIR>
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Output directory the extracted files are merged into
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to gmad. Defaults to gmad next to this executable
    #[arg(short, long)]
    extractor: Option<PathBuf>,

    /// Archives extracted at once. Defaults to the number of logical processors
    #[arg(short, long)]
    jobs: Option<usize>,

    /// File name pattern of the archives
    #[arg(short, long, default_value = fastdl::DEFAULT_PATTERN)]
    pattern: String,

    /// How many times a failed file move is retried
    #[arg(long, default_value_t = 1)]
    retries: u32,

    /// Milliseconds to wait before retrying a failed move
    #[arg(long, default_value_t = 500)]
    retry_delay: u64,

    /// Multiply the retry delay by this after every retry
    #[arg(long, default_value_t = 1)]
    backoff: u32,

    /// Fail if any file could not be merged or a scratch directory could not be removed
    #[arg(long, default_value = "false")]
    strict: bool,

    /// Verbose, repeat for extractor output
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Rewrite the single dash `-dir=` and `-O=` spellings (any case) into ones clap understands.
fn normalize_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    const LEGACY: [(&str, &str); 2] = [("-dir=", "--dir="), ("-o=", "-o=")];
    args.into_iter()
        .map(|arg| {
            let Some(s) = arg.to_str() else {
                return arg;
            };
            for (legacy, flag) in LEGACY {
                if let Some(prefix) = s.get(..legacy.len()) {
                    if prefix.eq_ignore_ascii_case(legacy) {
                        return format!("{flag}{}", &s[legacy.len()..]).into();
                    }
                }
            }
            arg
        })
        .collect()
}

fn main() -> Result<(), fastdl::Error> {
    let args = Args::parse_from(normalize_args(std::env::args_os()));

    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();

    banner();

    let (source, output) = match (args.dir, args.output) {
        (Some(dir), Some(output)) => {
            println!("Target Directory: {}", dir.display());
            println!("Output Directory: {}", output.display());
            (dir, output)
        }
        (None, None) => match prompt()? {
            Some(paths) => paths,
            None => return Ok(()),
        },
        _ => {
            println!("--dir and -o must be given together");
            println!("{}", Args::command().render_usage());
            return Ok(());
        }
    };

    if !source.is_dir() {
        println!("Directory does not exist.");
        return Ok(());
    }

    let extractor = match args.extractor {
        Some(path) => Gmad::new(path),
        None => Gmad::beside_current_exe()?,
    };
    extractor.ensure_exists()?;
    log::info!("using extractor {}", extractor.path().display());

    let retry = RetryPolicy::retries(args.retries, Duration::from_millis(args.retry_delay))
        .backoff(args.backoff);
    let mut builder = PipelineBuilder::new()
        .extractor(extractor)
        .pattern(args.pattern)
        .retry(retry);
    if let Some(jobs) = args.jobs {
        builder = builder.jobs(jobs);
    }
    let pipeline = builder.build()?;

    let archives = pipeline.locate(&source)?;
    println!(
        "Found {} archives, extracting {} at a time",
        archives.len(),
        pipeline.jobs()
    );

    let pb = ProgressBar::new(archives.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    let report = pipeline.run_with(&archives, &output, |unit| {
        if !unit.is_clean() {
            pb.println(format!("WARN: {} did not merge cleanly", label(unit)));
        }
        pb.set_message(label(unit));
        pb.inc(1);
    })?;
    pb.finish_and_clear();

    print_summary(&report, &output);
    println!(
        "Operation completed in {:.2} seconds.",
        report.elapsed.as_secs_f64()
    );

    if args.strict && !report.is_clean() {
        return Err(fastdl::Error::UnitsFailed {
            units: report.failed_units().count(),
            archives: report.archives(),
        });
    }
    Ok(())
}

fn banner() {
    println!("=====================================================");
    println!("           fastdl - FastDL folder builder");
    println!("=====================================================");
    println!("Archives are unpacked by gmad. Some addons may fail to extract, check the log.");
    println!("Large collections take a while.");
    println!();
}

/// Interactive mode. Returns the source and output directory, or `None` if nothing should run.
fn prompt() -> io::Result<Option<(PathBuf, PathBuf)>> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    println!("Select Mode:");
    println!("1. fastdl (Create FastDL folder quickly, uses every processor core)");
    let selection = lines.next().transpose()?.unwrap_or_default();
    if selection.trim() != "1" {
        println!("Invalid selection or mode unavailable.");
        return Ok(None);
    }

    println!("Enter the target directory containing GMAs:");
    let source = lines.next().transpose()?.unwrap_or_default();
    let exe = std::env::current_exe()?;
    let output = exe
        .parent()
        .map(|dir| dir.join("merged"))
        .unwrap_or_else(|| PathBuf::from("merged"));
    Ok(Some((PathBuf::from(source.trim()), output)))
}

fn label(unit: &UnitReport) -> String {
    unit.archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn print_summary(report: &RunReport, output: &Path) {
    println!(
        "Merged {} files from {} archives into {}",
        report.files_moved(),
        report.archives(),
        output.display()
    );

    let retried: usize = report.units.iter().map(|u| u.retried.len()).sum();
    if retried > 0 {
        println!("{retried} files needed a retry");
    }

    let not_extracted = report
        .units
        .iter()
        .filter(|u| u.spawn_error.is_some() || u.exit_status.is_some_and(|s| !s.success()))
        .map(label)
        .collect_vec();
    if !not_extracted.is_empty() {
        println!(
            "gmad reported problems with {} archives: {}",
            not_extracted.len(),
            not_extracted.iter().join(", ")
        );
    }

    for unit in report.failed_units() {
        println!("{}:", label(unit));
        for abandoned in &unit.abandoned {
            println!(
                "  not merged {}: {}",
                abandoned.path.to_slash_lossy(),
                abandoned.reason
            );
        }
        if let Some(e) = &unit.cleanup_error {
            println!(
                "  could not delete {}: {e}",
                unit.scratch.display()
            );
        }
        if let Some(e) = &unit.panicked {
            println!("  crashed: {e}");
        }
    }
}
