//! Interactive free space calibration of the bend section.
//!
//! Walks the operator through collecting averaged marker transforms at
//! different bend commands, fits the calibration curves and persists the
//! whole session into a timestamped output directory after every step.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing::{debug, info};

use rs_dh_kinematics::arm::Rate;
use rs_dh_kinematics::calibration::{
    CalibrationError, CalibrationFit, CalibrationSession, SweepPlan,
};
use rs_dh_kinematics::simulator::{SyntheticTendonRig, TendonRig};

/// How long a settling window is sampled after a manual Enter.
const MANUAL_COLLECT: Duration = Duration::from_millis(2000);
/// How long to wait after commanding a sweep point before sampling starts.
const SWEEP_SETTLE: Duration = Duration::from_millis(3000);
/// How long a settling window is sampled during the automatic sweep.
const SWEEP_COLLECT: Duration = Duration::from_millis(500);

/// Free space calibration of the tendon driven bend section
#[derive(Parser, Debug)]
#[command(name = "free-space-calibrate")]
#[command(about = "Interactive free space calibration of the bend section")]
#[command(version)]
struct Args {
    /// Root directory for calibration output; each run writes into a
    /// timestamped subdirectory
    #[arg(long, default_value = "calibration_output")]
    output_root: PathBuf,

    /// Conversion from simulator length units to meters
    #[arg(long, default_value = "0.1")]
    units_to_meter: f64,

    /// Sample rate while a collection window is open, in Hz
    #[arg(long, default_value = "120.0")]
    sample_rate_hz: f64,

    /// Extreme bend command of the automatic sweep; it runs from the
    /// negative of this value up to it and back
    #[arg(long, default_value = "0.2")]
    sweep_max: f64,

    /// Points of the automatic up sweep
    #[arg(long, default_value = "101")]
    sweep_points: usize,

    /// Repetitions of the automatic sweep
    #[arg(long, default_value = "1")]
    sweep_reps: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    anyhow::ensure!(args.sample_rate_hz > 0.0, "sample rate must be positive");
    anyhow::ensure!(args.units_to_meter > 0.0, "units-to-meter must be positive");

    let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let output_dir = args.output_root.join(&timestamp);
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating output directory {}", output_dir.display()))?;
    info!("Calibration output goes to {}", output_dir.display());

    let mut rig = SyntheticTendonRig::new(1.0 / args.units_to_meter);
    let mut session = CalibrationSession::new(args.units_to_meter);
    let plan = SweepPlan {
        motor_min: -args.sweep_max,
        motor_max: args.sweep_max,
        points: args.sweep_points,
        repetitions: args.sweep_reps,
    };

    loop {
        print!(
            "Press Enter to collect datapoint, 'X' to exit, 'F' to fit, \
             'Z' to set zero transform, 'A' to auto calibrate, 'L' to load: "
        );
        io::stdout().flush()?;
        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break; // stdin closed
        }

        match input.trim() {
            "X" => break,
            "L" => {
                print!("Enter directory to load from: ");
                io::stdout().flush()?;
                let mut directory = String::new();
                io::stdin().read_line(&mut directory)?;
                match CalibrationSession::load(Path::new(directory.trim()), args.units_to_meter) {
                    Ok(loaded) => session = loaded,
                    Err(err @ CalibrationError::PathNotFound(_)) => println!("{}", err),
                    Err(err) => return Err(err).context("reloading a saved session"),
                }
            }
            "A" => {
                auto_sweep(
                    &mut session,
                    &mut rig,
                    &plan,
                    args.sample_rate_hz,
                    &output_dir,
                )?;
            }
            "F" => match session.fit() {
                Ok(fit) => {
                    let prefix = Local::now().format("%Y%m%d_%H%M%S").to_string();
                    fit.save_coefficients(&output_dir, &prefix)
                        .context("saving fit coefficients")?;
                    report_fit(&fit);
                }
                Err(
                    err @ (CalibrationError::NoSamples
                    | CalibrationError::SampleCountMismatch { .. }),
                ) => {
                    println!("Cannot fit yet: {}", err);
                }
                Err(err) => return Err(err).context("fitting the calibration"),
            },
            command @ ("" | "Z") => {
                collect_window(&mut session, &mut rig, MANUAL_COLLECT, args.sample_rate_hz)?;
                if command == "Z" {
                    match session.set_zero_reference() {
                        Ok(()) => println!("Zero transform set"),
                        Err(err) => println!("Could not set zero transform: {}", err),
                    }
                }
                session.save(&output_dir).context("saving the session")?;
                println!("Collected window {} of this session", session.sample_count());
            }
            other => {
                println!("Unrecognized command '{}'", other);
            }
        }
    }

    Ok(())
}

/// Samples the rig at the given rate for the given duration, then commits
/// the window into the session.
fn collect_window(
    session: &mut CalibrationSession,
    rig: &mut SyntheticTendonRig,
    duration: Duration,
    sample_rate_hz: f64,
) -> Result<()> {
    let samples = ((duration.as_secs_f64() * sample_rate_hz).round() as usize).max(1);
    let mut rate = Rate::new(sample_rate_hz);
    session.begin_window();
    for _ in 0..samples {
        session.ingest_sample(rig.base_marker(), rig.tip_marker(), rig.bend_position());
        rate.sleep();
    }
    session
        .commit_window()
        .context("committing a collection window")?;
    Ok(())
}

/// Walks the bend command range up and down, collecting and persisting one
/// window per command. The session is saved after every point, so an
/// aborted sweep keeps everything it measured.
fn auto_sweep(
    session: &mut CalibrationSession,
    rig: &mut SyntheticTendonRig,
    plan: &SweepPlan,
    sample_rate_hz: f64,
    output_dir: &Path,
) -> Result<()> {
    let commands = plan.commands();
    info!(
        "Sweeping {} commands x {} repetitions",
        commands.len(),
        plan.repetitions
    );
    for repetition in 0..plan.repetitions {
        for (index, &command) in commands.iter().enumerate() {
            debug!(
                "sweep repetition {} point {}/{}: command {:.4}",
                repetition + 1,
                index + 1,
                commands.len(),
                command
            );
            session.record_command(command);
            rig.command_bend(command);
            thread::sleep(SWEEP_SETTLE);
            collect_window(session, rig, SWEEP_COLLECT, sample_rate_hz)?;
            session.save(output_dir).context("saving the session")?;
        }
    }
    info!("Sweep finished with {} windows", session.sample_count());
    Ok(())
}

fn report_fit(fit: &CalibrationFit) {
    println!("Tip curves vs bend command (coefficients highest degree first):");
    println!("  x:   {:?}", fit.tip_curves.x.coefficients());
    println!("  y:   {:?}", fit.tip_curves.y.coefficients());
    println!("  z:   {:?}", fit.tip_curves.z.coefficients());
    println!("  thz: {:?}", fit.tip_curves.thz.coefficients());
    println!("Derivative curves vs bend angle:");
    println!("  dx:   {:?}", fit.derivative_curves.x.coefficients());
    println!("  dy:   {:?}", fit.derivative_curves.y.coefficients());
    println!("  dz:   {:?}", fit.derivative_curves.z.coefficients());
    println!("  dthz: {:?}", fit.derivative_curves.thz.coefficients());
}
