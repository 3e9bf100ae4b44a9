//! Diagnostic probe: dump the currently observed surfaces of the target
//! application, with their classified states, as JSON.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

#[derive(Parser)]
#[command(
    name = "bscan-probe",
    about = "Dump the target application's observed surfaces and their classified states as JSON"
)]
struct Args {
    /// Target executable to attach to or start.
    #[arg(long, default_value = "capscan.exe")]
    exe: PathBuf,

    /// Compact JSON output (no pretty-printing)
    #[arg(long)]
    compact: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    run(&args)
}

#[cfg(windows)]
#[derive(serde::Serialize)]
struct SurfaceReport {
    title: String,
    class_name: String,
    visible: bool,
    state: String,
    children: Vec<SurfaceReport>,
}

#[cfg(windows)]
fn snapshot(
    surface: &dyn bscan_core::surface::Surface,
    sigs: &bscan_core::state::StateSignatures,
    depth: usize,
) -> SurfaceReport {
    SurfaceReport {
        title: surface.title(),
        class_name: surface.class_name(),
        visible: surface.is_visible(),
        state: bscan_core::state::classify(surface, sigs).to_string(),
        children: if depth == 0 {
            Vec::new()
        } else {
            surface
                .children()
                .iter()
                .map(|child| snapshot(child.as_ref(), sigs, depth - 1))
                .collect()
        },
    }
}

#[cfg(windows)]
fn run(args: &Args) -> ExitCode {
    use bscan_core::errors::DriveError;
    use bscan_core::profile::AppProfile;
    use bscan_core::surface::UiDriver;
    use bscan_core::win::UiaDriver;

    let probe = || -> Result<String, DriveError> {
        let profile = AppProfile::capella_scan_9();
        let driver = UiaDriver::new(args.exe.clone())?;
        driver.connect()?;
        let reports: Vec<SurfaceReport> = driver
            .list_surfaces()?
            .iter()
            .map(|s| snapshot(s.as_ref(), &profile.signatures, 1))
            .collect();
        let json = if args.compact {
            serde_json::to_string(&reports)
        } else {
            serde_json::to_string_pretty(&reports)
        };
        json.map_err(|e| DriveError::Introspection(e.to_string()))
    };

    match probe() {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(2)
        }
    }
}

#[cfg(not(windows))]
fn run(args: &Args) -> ExitCode {
    let _ = (&args.exe, args.compact);
    eprintln!("bscan-probe drives the Windows UI Automation interface and only runs on Windows");
    ExitCode::from(2)
}
