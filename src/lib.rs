//! Forward kinematics, geometric Jacobians and free space calibration for
//! six-axis robots described by Denavit-Hartenberg tables.
//!
//! Forward kinematics composes one transform per joint: translation _d_ along
//! z, rotation _theta_ about z, translation _a_ along x and rotation _alpha_
//! about x, in exactly that order. Shipped parameter tables cover the
//! Universal Robots UR5 and UR10; any other six-axis serial arm can be used
//! by filling out a `dh_kinematics::Parameters` data structure or loading it
//! from a YAML file.
//!
//! # Features
//!
//! - Forward kinematics and per joint origin frames for any 6 joint DH table.
//! - Geometric Jacobian assembled from the joint origins, with tip
//!   velocities, joint velocities (falling back to the pseudo inverse near
//!   singularities) and joint torques.
//! - A fixed rate arm publisher that reads the joints of a simulated robot
//!   once per tick and publishes joint state, tip pose and Jacobian computed
//!   from that single sample.
//! - Free space calibration of a tendon driven bend section: marker
//!   transforms averaged over settling windows, cubic polynomial fits of the
//!   tip motion against the bend command, and derivative curves refitted
//!   against the bend angle.
//! - The calibration session is persisted after every collection window, so
//!   an interrupted run can be reloaded and continued.
//!
//! # Binaries
//!
//! - **free-space-calibrate**: interactive calibration of the bend section,
//!   driving the automatic sweep and fitting the curves.
//! - **kinematics-publisher**: publishes tip pose and Jacobian of a simulated
//!   UR arm at a fixed rate.

pub mod parameters;
pub mod parameters_robots;

#[cfg(feature = "allow_filesystem")]
pub mod parameters_from_file;

pub mod utils;
pub mod kinematic_traits;
pub mod kinematics_impl;

pub mod jacobian;

#[cfg(feature = "allow_filesystem")]
pub mod parameter_error;

pub mod averaging;
pub mod polynomial;
pub mod calibration;

pub mod simulator;
pub mod arm;

#[cfg(test)]
#[cfg(feature = "allow_filesystem")]
mod tests;
