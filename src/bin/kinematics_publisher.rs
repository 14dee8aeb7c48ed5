//! Publishes forward kinematics and the geometric Jacobian of a simulated
//! UR arm at a fixed rate.

use std::sync::atomic::AtomicBool;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use rs_dh_kinematics::arm::{PUBLISH_RATE_HZ, UrArm};
use rs_dh_kinematics::parameters_robots::dh_kinematics::RobotModel;
use rs_dh_kinematics::simulator::{LoggingPublisher, SimulatedUr};
use rs_dh_kinematics::utils::dump_joints;

/// Forward kinematics and Jacobian publisher for a simulated UR arm
#[derive(Parser, Debug)]
#[command(name = "kinematics-publisher")]
#[command(about = "Publishes tip pose and Jacobian of a simulated UR arm")]
#[command(version)]
struct Args {
    /// Robot model to publish for (ur5 or ur10)
    #[arg(long, default_value = "ur5")]
    model: RobotModel,

    /// Robot name used in the published joint states
    #[arg(long, default_value = "ur5")]
    name: String,

    /// Publish rate in Hz
    #[arg(long, default_value_t = PUBLISH_RATE_HZ)]
    rate_hz: f64,

    /// Stop after this many ticks; 0 runs until the process is killed
    #[arg(long, default_value = "0")]
    ticks: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    anyhow::ensure!(args.rate_hz > 0.0, "publish rate must be positive");

    let mut arm = UrArm::new(
        SimulatedUr::new(&args.name),
        &args.name,
        args.model,
        Box::new(LoggingPublisher::new("measured_js")),
        Box::new(LoggingPublisher::new("measured_cp")),
        Box::new(LoggingPublisher::new("jacobian")),
    );

    info!("{} starting from joints:", args.name);
    dump_joints(&arm.measured_js());

    let shutdown = AtomicBool::new(false);
    let budget = if args.ticks == 0 { None } else { Some(args.ticks) };
    let published = arm.run(args.rate_hz, budget, &shutdown);
    info!("Published {} samples", published);
    Ok(())
}
