//! Batch runner: feed a directory of images through the external
//! recognition application and report a per-unit tally.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use bscan_core::batch::{BatchResult, BatchRunner, UnitOutcome, WorkUnit};
use bscan_core::errors::DriveError;
use bscan_core::profile::AppProfile;
use bscan_core::sim::{SimApp, SimClock};

#[derive(Parser)]
#[command(
    name = "bscan",
    about = "Batch-convert images through an external recognition application"
)]
struct Args {
    /// Directory holding the input images (*.png).
    #[arg(long)]
    input: PathBuf,

    /// Directory receiving the exported artifacts (created if absent).
    #[arg(long)]
    output: PathBuf,

    /// Target executable to attach to or start.
    #[arg(long, default_value = "capscan.exe")]
    exe: PathBuf,

    /// Run against the in-process simulator instead of a live application.
    #[arg(long)]
    dry_run: bool,

    /// Emit the full run report as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Override the recognition deadline, in seconds.
    #[arg(long)]
    recognition_timeout: Option<u64>,

    /// Override the poll interval, in milliseconds.
    #[arg(long)]
    poll_interval: Option<u64>,
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .try_init();

    let args = Args::parse();

    let mut profile = AppProfile::capella_scan_9();
    if let Some(secs) = args.recognition_timeout {
        profile.timeouts.recognition = Duration::from_secs(secs);
    }
    if let Some(ms) = args.poll_interval {
        profile.poll_interval = Duration::from_millis(ms);
    }

    let units = match collect_units(&args.input, &args.output, &profile.output_extension) {
        Ok(units) => units,
        Err(err) => {
            eprintln!("failed to enumerate {}: {err}", args.input.display());
            return ExitCode::from(2);
        }
    };
    if units.is_empty() {
        println!("no *.png files in {}", args.input.display());
        return ExitCode::SUCCESS;
    }

    let outcome = if args.dry_run {
        profile.verify_output = false;
        let app = SimApp::new(&profile);
        let clock = SimClock::new();
        BatchRunner::new(&app, &clock, profile).run(units)
    } else {
        if let Err(err) = fs::create_dir_all(&args.output) {
            eprintln!("failed to create {}: {err}", args.output.display());
            return ExitCode::from(2);
        }
        run_live(profile, units, &args.exe)
    };

    match outcome {
        Ok(result) => report(&result, args.json),
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(2)
        }
    }
}

#[cfg(windows)]
fn run_live(
    profile: AppProfile,
    units: Vec<WorkUnit>,
    exe: &Path,
) -> Result<BatchResult, DriveError> {
    use bscan_core::clock::SystemClock;
    use bscan_core::win::UiaDriver;

    let driver = UiaDriver::new(exe.to_path_buf())?;
    let clock = SystemClock::new();
    BatchRunner::new(&driver, &clock, profile).run(units)
}

#[cfg(not(windows))]
fn run_live(
    _profile: AppProfile,
    _units: Vec<WorkUnit>,
    _exe: &Path,
) -> Result<BatchResult, DriveError> {
    Err(DriveError::Startup(
        "live runs drive the Windows UI Automation interface; use --dry-run on this platform"
            .into(),
    ))
}

/// Enumerate `*.png` inputs (case-insensitive extension) and derive their
/// output locators.  Order is irrelevant here; the runner sorts.
fn collect_units(input_dir: &Path, output_dir: &Path, extension: &str) -> io::Result<Vec<WorkUnit>> {
    let mut units = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("png"))
            .unwrap_or(false);
        if is_png && path.is_file() {
            units.push(WorkUnit::new(path, output_dir, extension));
        }
    }
    Ok(units)
}

fn report(result: &BatchResult, json: bool) -> ExitCode {
    for unit in &result.units {
        match &unit.outcome {
            UnitOutcome::Done => println!("ok    {} -> {}", unit.input, unit.output),
            UnitOutcome::Failed { stage, reason } => {
                println!("FAIL  {} ({stage}: {reason})", unit.input)
            }
        }
    }
    println!(
        "{} total, {} succeeded, {} failed",
        result.total, result.succeeded, result.failed
    );
    if json {
        match serde_json::to_string_pretty(result) {
            Ok(text) => println!("{text}"),
            Err(err) => eprintln!("failed to serialise report: {err}"),
        }
    }
    if result.failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_units_filters_by_png_extension() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.png", "b.PNG", "notes.txt", "c.png"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        // A directory with a matching name must be skipped.
        fs::create_dir(dir.path().join("nested.png")).unwrap();

        let out = Path::new("csc_out");
        let mut units = collect_units(dir.path(), out, "csc").unwrap();
        units.sort_by(|a, b| a.input.cmp(&b.input));

        assert_eq!(units.len(), 3);
        assert!(units.iter().all(|u| u.output.starts_with(out)));
        assert!(units.iter().any(|u| u.output.ends_with("b.csc")));
    }

    #[test]
    fn test_missing_input_directory_is_an_error() {
        let missing = Path::new("no_such_dir_anywhere");
        assert!(collect_units(missing, Path::new("out"), "csc").is_err());
    }
}
