//! Free space calibration of a tendon driven bend section.
//!
//! The session correlates bend motor commands with the rigid body transforms
//! of two markers, one on the stationary stick and one on the bending tip.
//! Samples are collected in settling windows, averaged per window, and the
//! averaged relative tip poses are fitted against the commands with cubic
//! polynomials. The fitted derivatives are refitted against the bend angle,
//! which yields the Jacobian terms of the bend section.

#[cfg(feature = "allow_filesystem")]
use std::fs;
use std::io;
#[cfg(feature = "allow_filesystem")]
use std::path::Path;
use std::path::PathBuf;

#[cfg(feature = "allow_filesystem")]
use serde::de::DeserializeOwned;
#[cfg(feature = "allow_filesystem")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::averaging::{MeasuredTransform, average_measured_transforms};
use crate::kinematic_traits::Pose;
use crate::polynomial::{Polynomial, linspace, polyfit};

/// Degree of every fitted calibration curve.
pub const FIT_DEGREE: usize = 3;

/// Number of grid points the fitted curves are resampled on when the
/// derivatives are refitted against the bend angle.
pub const FIT_GRID_POINTS: usize = 50;

#[cfg(feature = "allow_filesystem")]
const BASE_SAMPLES_FILE: &str = "base_transforms_measured_all.json";
#[cfg(feature = "allow_filesystem")]
const TIP_SAMPLES_FILE: &str = "tip_transforms_measured_all.json";
#[cfg(feature = "allow_filesystem")]
const BASE_AVERAGES_FILE: &str = "base_transforms_measured_avg.json";
#[cfg(feature = "allow_filesystem")]
const TIP_AVERAGES_FILE: &str = "tip_transforms_measured_avg.json";
#[cfg(feature = "allow_filesystem")]
const BASE_ZERO_FILE: &str = "base_zero_transform.json";
#[cfg(feature = "allow_filesystem")]
const TIP_ZERO_FILE: &str = "tip_zero_transform.json";
#[cfg(feature = "allow_filesystem")]
const BEND_POSITIONS_FILE: &str = "bend_motor_pos_all.json";
#[cfg(feature = "allow_filesystem")]
const BEND_COMMANDS_FILE: &str = "bend_motor_cmd_all.json";

/// Errors of the calibration workflow.
#[derive(Debug)]
pub enum CalibrationError {
    /// An averaging window or a fit input contained no samples.
    NoSamples,
    /// The command history and the averaged pose history have diverged, so
    /// pairing them index by index would correlate unrelated measurements.
    SampleCountMismatch { poses: usize, commands: usize },
    /// The directory given for reloading does not exist.
    PathNotFound(PathBuf),
    FitFailed(&'static str),
    IoError(io::Error),
    SerdeError(serde_json::Error),
}

impl std::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match *self {
            CalibrationError::NoSamples =>
                write!(f, "No samples to work with"),
            CalibrationError::SampleCountMismatch { poses, commands } =>
                write!(f, "Sample count mismatch: {} averaged poses, {} commands", poses, commands),
            CalibrationError::PathNotFound(ref path) =>
                write!(f, "Directory {} does not exist", path.display()),
            CalibrationError::FitFailed(msg) =>
                write!(f, "Fit failed: {}", msg),
            CalibrationError::IoError(ref err) =>
                write!(f, "IO Error: {}", err),
            CalibrationError::SerdeError(ref err) =>
                write!(f, "Serialization Error: {}", err),
        }
    }
}

impl std::error::Error for CalibrationError {}

impl From<io::Error> for CalibrationError {
    fn from(err: io::Error) -> Self {
        CalibrationError::IoError(err)
    }
}

impl From<serde_json::Error> for CalibrationError {
    fn from(err: serde_json::Error) -> Self {
        CalibrationError::SerdeError(err)
    }
}

impl From<&'static str> for CalibrationError {
    fn from(msg: &'static str) -> Self {
        CalibrationError::FitFailed(msg)
    }
}

/// Rotation of a pose collapsed to a signed angle about z: the rotation angle
/// times the sign of the z component of the rotation axis. A rotation whose
/// axis has no z component at all maps to zero. The axis-angle representative
/// is ambiguous up to simultaneous negation, but this product is invariant
/// under it, so the extracted value does not depend on which representative
/// the decomposition returns.
pub fn signed_z_angle(pose: &Pose) -> f64 {
    match pose.rotation.axis_angle() {
        Some((axis, angle)) => angle * zero_aware_sign(axis.z),
        None => 0.0,
    }
}

fn zero_aware_sign(value: f64) -> f64 {
    if value > 0.0 {
        1.0
    } else if value < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// The four fitted curves of one family: tip x, y, z and the signed bend
/// angle thz.
#[derive(Debug, Clone)]
pub struct ComponentCurves {
    pub x: Polynomial,
    pub y: Polynomial,
    pub z: Polynomial,
    pub thz: Polynomial,
}

#[cfg(feature = "allow_filesystem")]
#[derive(Serialize, Deserialize)]
struct CoefficientsFile {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    thz: Vec<f64>,
}

#[cfg(feature = "allow_filesystem")]
impl CoefficientsFile {
    fn from_curves(curves: &ComponentCurves) -> Self {
        CoefficientsFile {
            x: curves.x.coefficients().to_vec(),
            y: curves.y.coefficients().to_vec(),
            z: curves.z.coefficients().to_vec(),
            thz: curves.thz.coefficients().to_vec(),
        }
    }
}

/// Result of fitting a calibration session.
#[derive(Debug, Clone)]
pub struct CalibrationFit {
    /// Relative base to tip pose at the zero reference. Diagnostic only, the
    /// curves are fitted on absolute relative poses.
    pub zero_offset: Pose,
    /// Tip position components and bend angle as functions of the command.
    pub tip_curves: ComponentCurves,
    /// Derivatives dx, dy, dz and dthz, refitted as functions of the bend
    /// angle. These are the Jacobian terms of the bend section.
    pub derivative_curves: ComponentCurves,
}

impl CalibrationFit {
    /// Predicted relative tip position and bend angle for a bend command.
    pub fn predict_tip(&self, command: f64) -> ([f64; 3], f64) {
        (
            [
                self.tip_curves.x.value(command),
                self.tip_curves.y.value(command),
                self.tip_curves.z.value(command),
            ],
            self.tip_curves.thz.value(command),
        )
    }

    /// Write both coefficient families into `dir`, one file per family,
    /// prefixed with the given timestamp. Returns the two paths written.
    #[cfg(feature = "allow_filesystem")]
    pub fn save_coefficients(
        &self,
        dir: &Path,
        timestamp: &str,
    ) -> Result<(PathBuf, PathBuf), CalibrationError> {
        let tip_path = dir.join(format!("{}_xyzthz_polyfit_coeffs.json", timestamp));
        let derivative_path = dir.join(format!("{}_dxdydzdthz_polyfit_coeffs.json", timestamp));
        write_json(&tip_path, &CoefficientsFile::from_curves(&self.tip_curves))?;
        write_json(
            &derivative_path,
            &CoefficientsFile::from_curves(&self.derivative_curves),
        )?;
        info!("Coefficients saved to {}", derivative_path.display());
        Ok((tip_path, derivative_path))
    }
}

/// Parameters of the automatic sweep over the bend command range.
#[derive(Debug, Clone, Copy)]
pub struct SweepPlan {
    pub motor_min: f64,
    pub motor_max: f64,
    /// Points of the up sweep. One repetition visits twice this many
    /// commands, since the sweep comes back down through the same points.
    pub points: usize,
    pub repetitions: usize,
}

impl Default for SweepPlan {
    fn default() -> Self {
        SweepPlan {
            motor_min: -0.2,
            motor_max: 0.2,
            points: 101,
            repetitions: 1,
        }
    }
}

impl SweepPlan {
    /// Commands of one repetition: an up sweep immediately followed by the
    /// same points in reverse, so both tendon travel directions are sampled.
    pub fn commands(&self) -> Vec<f64> {
        let up = linspace(self.motor_min, self.motor_max, self.points);
        let mut commands = up.clone();
        commands.extend(up.iter().rev());
        commands
    }
}

/// State of one calibration run: the raw sample windows, the per window
/// averages, the commands of the automatic sweep and the zero reference.
/// All histories are explicit so a session can be saved, inspected, trimmed
/// outside and reloaded.
pub struct CalibrationSession {
    units_to_meter: f64,

    base_window: Vec<MeasuredTransform>,
    tip_window: Vec<MeasuredTransform>,
    bend_window: Vec<f64>,

    base_samples_all: Vec<Vec<MeasuredTransform>>,
    tip_samples_all: Vec<Vec<MeasuredTransform>>,
    bend_positions_all: Vec<Vec<f64>>,

    base_averages: Vec<Pose>,
    tip_averages: Vec<Pose>,
    bend_commands: Vec<f64>,

    base_zero: Pose,
    tip_zero: Pose,
}

impl CalibrationSession {
    /// Creates an empty session. `units_to_meter` converts the length units
    /// of incoming marker transforms into meters on ingestion; the zero
    /// references start out as identity.
    pub fn new(units_to_meter: f64) -> Self {
        CalibrationSession {
            units_to_meter,
            base_window: Vec::new(),
            tip_window: Vec::new(),
            bend_window: Vec::new(),
            base_samples_all: Vec::new(),
            tip_samples_all: Vec::new(),
            bend_positions_all: Vec::new(),
            base_averages: Vec::new(),
            tip_averages: Vec::new(),
            bend_commands: Vec::new(),
            base_zero: Pose::identity(),
            tip_zero: Pose::identity(),
        }
    }

    /// Discards whatever is in the current collection window.
    pub fn begin_window(&mut self) {
        self.base_window.clear();
        self.tip_window.clear();
        self.bend_window.clear();
    }

    /// Adds one matched sample to the current window. Marker translations
    /// are scaled into meters here, everything stored downstream is metric.
    pub fn ingest_sample(
        &mut self,
        base: MeasuredTransform,
        tip: MeasuredTransform,
        bend_position: f64,
    ) {
        self.base_window.push(base.scaled(self.units_to_meter));
        self.tip_window.push(tip.scaled(self.units_to_meter));
        self.bend_window.push(bend_position);
    }

    /// Closes the current window: averages it, appends the raw window and
    /// the averages to the histories. Fails with [CalibrationError::NoSamples]
    /// on an empty window, in which case nothing is appended and the window
    /// is kept for further sampling.
    pub fn commit_window(&mut self) -> Result<(), CalibrationError> {
        let base_average = average_measured_transforms(&self.base_window)?;
        let tip_average = average_measured_transforms(&self.tip_window)?;

        self.base_samples_all.push(std::mem::take(&mut self.base_window));
        self.tip_samples_all.push(std::mem::take(&mut self.tip_window));
        self.bend_positions_all.push(std::mem::take(&mut self.bend_window));

        self.base_averages.push(base_average);
        self.tip_averages.push(tip_average);
        Ok(())
    }

    /// Records the bend command about to be applied. Only the automatic
    /// sweep records commands; manual collections leave the command history
    /// alone and therefore cannot be fitted.
    pub fn record_command(&mut self, command: f64) {
        self.bend_commands.push(command);
    }

    /// Takes the most recently committed window averages as the zero
    /// reference of the session.
    pub fn set_zero_reference(&mut self) -> Result<(), CalibrationError> {
        match (self.base_averages.last(), self.tip_averages.last()) {
            (Some(base), Some(tip)) => {
                self.base_zero = *base;
                self.tip_zero = *tip;
                Ok(())
            }
            _ => Err(CalibrationError::NoSamples),
        }
    }

    /// Number of committed windows.
    pub fn sample_count(&self) -> usize {
        self.base_averages.len()
    }

    /// Number of recorded sweep commands.
    pub fn command_count(&self) -> usize {
        self.bend_commands.len()
    }

    /// Relative base to tip pose at the zero reference.
    pub fn zero_offset(&self) -> Pose {
        self.base_zero.inverse() * self.tip_zero
    }

    /// Tip pose relative to the base marker for committed window `index`.
    /// Panics if `index` is beyond either averaged pose history.
    pub fn relative_tip_pose(&self, index: usize) -> Pose {
        self.base_averages[index].inverse() * self.tip_averages[index]
    }

    /// Fits the calibration curves over the recorded commands and the
    /// averaged window poses, paired index by index. The histories must have
    /// the same length; mixing manual collections into a sweep breaks that
    /// pairing and is reported as [CalibrationError::SampleCountMismatch].
    pub fn fit(&self) -> Result<CalibrationFit, CalibrationError> {
        let commands = &self.bend_commands;
        if commands.is_empty() {
            return Err(CalibrationError::NoSamples);
        }
        // Both pose histories must pair up with the commands index by index.
        // They can also disagree with each other, after a session trimmed by
        // hand in unequal ways was reloaded.
        if commands.len() != self.base_averages.len()
            || commands.len() != self.tip_averages.len()
        {
            return Err(CalibrationError::SampleCountMismatch {
                poses: self.base_averages.len().min(self.tip_averages.len()),
                commands: commands.len(),
            });
        }

        let zero_offset = self.zero_offset();
        debug!(
            "zero offset: translation ({:.6}, {:.6}, {:.6}), angle {:.6} rad",
            zero_offset.translation.x,
            zero_offset.translation.y,
            zero_offset.translation.z,
            zero_offset.rotation.angle()
        );

        let count = commands.len();
        let mut x = Vec::with_capacity(count);
        let mut y = Vec::with_capacity(count);
        let mut z = Vec::with_capacity(count);
        let mut thz = Vec::with_capacity(count);
        for i in 0..count {
            let relative = self.relative_tip_pose(i);
            x.push(relative.translation.x);
            y.push(relative.translation.y);
            z.push(relative.translation.z);
            thz.push(signed_z_angle(&relative));
        }

        let tip_curves = ComponentCurves {
            x: polyfit(commands, &x, FIT_DEGREE)?,
            y: polyfit(commands, &y, FIT_DEGREE)?,
            z: polyfit(commands, &z, FIT_DEGREE)?,
            thz: polyfit(commands, &thz, FIT_DEGREE)?,
        };

        // Resample the fitted curves on an even command grid, evaluate the
        // analytic derivatives there, and refit those against the fitted
        // bend angle on the same grid.
        let low = commands.iter().cloned().fold(f64::INFINITY, f64::min);
        let high = commands.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let grid = linspace(low, high, FIT_GRID_POINTS);
        let angle_on_grid: Vec<f64> = grid.iter().map(|&l| tip_curves.thz.value(l)).collect();

        let dx = tip_curves.x.derivative();
        let dy = tip_curves.y.derivative();
        let dz = tip_curves.z.derivative();
        let dthz = tip_curves.thz.derivative();
        let dx_on_grid: Vec<f64> = grid.iter().map(|&l| dx.value(l)).collect();
        let dy_on_grid: Vec<f64> = grid.iter().map(|&l| dy.value(l)).collect();
        let dz_on_grid: Vec<f64> = grid.iter().map(|&l| dz.value(l)).collect();
        let dthz_on_grid: Vec<f64> = grid.iter().map(|&l| dthz.value(l)).collect();

        let derivative_curves = ComponentCurves {
            x: polyfit(&angle_on_grid, &dx_on_grid, FIT_DEGREE)?,
            y: polyfit(&angle_on_grid, &dy_on_grid, FIT_DEGREE)?,
            z: polyfit(&angle_on_grid, &dz_on_grid, FIT_DEGREE)?,
            thz: polyfit(&angle_on_grid, &dthz_on_grid, FIT_DEGREE)?,
        };

        info!("Fitted calibration curves over {} samples", count);
        Ok(CalibrationFit {
            zero_offset,
            tip_curves,
            derivative_curves,
        })
    }

    /// Writes the whole session state into `dir` as one JSON file per
    /// history, under fixed names, overwriting previous dumps. Called after
    /// every collection so an aborted run loses at most one window.
    #[cfg(feature = "allow_filesystem")]
    pub fn save(&self, dir: &Path) -> Result<(), CalibrationError> {
        write_json(&dir.join(BASE_SAMPLES_FILE), &self.base_samples_all)?;
        write_json(&dir.join(TIP_SAMPLES_FILE), &self.tip_samples_all)?;

        let base_averages: Vec<MeasuredTransform> =
            self.base_averages.iter().map(MeasuredTransform::from_pose).collect();
        let tip_averages: Vec<MeasuredTransform> =
            self.tip_averages.iter().map(MeasuredTransform::from_pose).collect();
        write_json(&dir.join(BASE_AVERAGES_FILE), &base_averages)?;
        write_json(&dir.join(TIP_AVERAGES_FILE), &tip_averages)?;

        write_json(
            &dir.join(BASE_ZERO_FILE),
            &MeasuredTransform::from_pose(&self.base_zero),
        )?;
        write_json(
            &dir.join(TIP_ZERO_FILE),
            &MeasuredTransform::from_pose(&self.tip_zero),
        )?;

        write_json(&dir.join(BEND_POSITIONS_FILE), &self.bend_positions_all)?;
        write_json(&dir.join(BEND_COMMANDS_FILE), &self.bend_commands)?;

        debug!("session saved to {}", dir.display());
        Ok(())
    }

    /// Reloads a previously saved session from `dir`. The current window is
    /// empty afterwards; collection can continue where the saved run left
    /// off. A directory that does not exist is reported as
    /// [CalibrationError::PathNotFound] so the caller can reprompt instead
    /// of aborting.
    #[cfg(feature = "allow_filesystem")]
    pub fn load(dir: &Path, units_to_meter: f64) -> Result<Self, CalibrationError> {
        if !dir.exists() {
            return Err(CalibrationError::PathNotFound(dir.to_path_buf()));
        }

        let base_samples_all: Vec<Vec<MeasuredTransform>> =
            read_json(&dir.join(BASE_SAMPLES_FILE))?;
        let tip_samples_all: Vec<Vec<MeasuredTransform>> =
            read_json(&dir.join(TIP_SAMPLES_FILE))?;

        let base_averages: Vec<Pose> = read_json::<Vec<MeasuredTransform>>(
            &dir.join(BASE_AVERAGES_FILE),
        )?
        .iter()
        .map(MeasuredTransform::to_pose)
        .collect();
        let tip_averages: Vec<Pose> = read_json::<Vec<MeasuredTransform>>(
            &dir.join(TIP_AVERAGES_FILE),
        )?
        .iter()
        .map(MeasuredTransform::to_pose)
        .collect();

        let base_zero = read_json::<MeasuredTransform>(&dir.join(BASE_ZERO_FILE))?.to_pose();
        let tip_zero = read_json::<MeasuredTransform>(&dir.join(TIP_ZERO_FILE))?.to_pose();

        let bend_positions_all: Vec<Vec<f64>> = read_json(&dir.join(BEND_POSITIONS_FILE))?;
        let bend_commands: Vec<f64> = read_json(&dir.join(BEND_COMMANDS_FILE))?;

        info!(
            "Loaded session with {} windows and {} commands from {}",
            base_averages.len(),
            bend_commands.len(),
            dir.display()
        );
        Ok(CalibrationSession {
            units_to_meter,
            base_window: Vec::new(),
            tip_window: Vec::new(),
            bend_window: Vec::new(),
            base_samples_all,
            tip_samples_all,
            bend_positions_all,
            base_averages,
            tip_averages,
            bend_commands,
            base_zero,
            tip_zero,
        })
    }
}

#[cfg(feature = "allow_filesystem")]
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CalibrationError> {
    let contents = serde_json::to_string(value)?;
    fs::write(path, contents)?;
    Ok(())
}

#[cfg(feature = "allow_filesystem")]
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CalibrationError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn sample_at(translation: [f64; 3]) -> MeasuredTransform {
        MeasuredTransform {
            translation,
            quaternion: [0.0, 0.0, 0.0, 1.0],
        }
    }

    #[test]
    fn window_lifecycle_scales_and_averages() {
        let mut session = CalibrationSession::new(0.1);
        session.begin_window();
        session.ingest_sample(sample_at([10.0, 0.0, 0.0]), sample_at([20.0, 0.0, 0.0]), 0.05);
        session.ingest_sample(sample_at([30.0, 0.0, 0.0]), sample_at([40.0, 0.0, 0.0]), 0.07);
        session.commit_window().expect("non-empty window");

        assert_eq!(session.sample_count(), 1);
        // Units scaled on ingestion: (10 + 30) / 2 * 0.1 = 2.0.
        // Only visible through the fit input, so check via zero reference.
        session.set_zero_reference().expect("have averages");
        let zero = session.zero_offset();
        // base average x = 2.0, tip average x = 3.0, relative x = 1.0.
        assert!((zero.translation.x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn commit_of_empty_window_is_rejected_and_harmless() {
        let mut session = CalibrationSession::new(1.0);
        session.begin_window();
        match session.commit_window() {
            Err(CalibrationError::NoSamples) => {}
            other => panic!("expected NoSamples, got {:?}", other.err()),
        }
        assert_eq!(session.sample_count(), 0);
    }

    #[test]
    fn zero_reference_requires_a_committed_window() {
        let mut session = CalibrationSession::new(1.0);
        assert!(matches!(
            session.set_zero_reference(),
            Err(CalibrationError::NoSamples)
        ));
    }

    #[test]
    fn fit_requires_matching_histories() {
        let mut session = CalibrationSession::new(1.0);

        // A manual collection without a recorded command desynchronizes the
        // histories, which the fit must refuse to pair up.
        session.begin_window();
        session.ingest_sample(sample_at([0.0; 3]), sample_at([1.0, 0.0, 0.0]), 0.0);
        session.commit_window().expect("non-empty window");

        match session.fit() {
            Err(CalibrationError::NoSamples) => {}
            other => panic!("expected NoSamples for empty commands, got fit: {}", other.is_ok()),
        }

        session.record_command(0.1);
        session.record_command(0.2);
        match session.fit() {
            Err(CalibrationError::SampleCountMismatch { poses: 1, commands: 2 }) => {}
            other => panic!("expected SampleCountMismatch, got fit: {}", other.is_ok()),
        }
    }

    #[test]
    fn signed_z_angle_follows_the_axis_sign() {
        let positive = Pose::rotation(Vector3::z() * 0.4);
        assert!((signed_z_angle(&positive) - 0.4).abs() < 1e-12);

        let negative = Pose::rotation(Vector3::z() * -0.4);
        assert!((signed_z_angle(&negative) + 0.4).abs() < 1e-12);

        // Axis without any z component maps to zero, not to the raw angle.
        let sideways = Pose::rotation(Vector3::x() * 0.4);
        assert_eq!(signed_z_angle(&sideways), 0.0);

        let identity = Pose::identity();
        assert_eq!(signed_z_angle(&identity), 0.0);
    }

    #[test]
    fn sweep_plan_walks_up_then_back_down() {
        let plan = SweepPlan::default();
        let commands = plan.commands();
        assert_eq!(commands.len(), 202);
        assert_eq!(commands[0], -0.2);
        assert_eq!(commands[100], 0.2);
        assert_eq!(commands[101], 0.2);
        assert_eq!(commands[201], -0.2);
        // The way back visits the same points in reverse order.
        for i in 0..101 {
            assert_eq!(commands[i], commands[201 - i]);
        }
    }
}
